//! HTTP API served on an ephemeral port and exercised with reqwest

use std::sync::Arc;
use std::time::Duration;

use fleetwarden::{
    HeartbeatResponse,
    agent::{AgentConfig, AgentHandle},
    api::{AcceptedResponse, ApiConfig, ApiState, HealthResponse, spawn_api_server},
    control_plane::ControlPlane,
    deploy::{Deployment, DeploymentStatus},
};
use reqwest::{Client, StatusCode};
use serde_json::{Value, json};

use crate::helpers::{
    FakeRuntime, FixedSampler, create_heartbeat, create_test_component, create_test_config,
    eventually,
};

struct TestHub {
    plane: Arc<ControlPlane>,
    base: String,
    client: Client,
}

impl TestHub {
    async fn start(auth_token: Option<&str>) -> Self {
        let plane = Arc::new(ControlPlane::start(&create_test_config(json!({}))).await.unwrap());
        let config = ApiConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            auth_token: auth_token.map(str::to_string),
            enable_cors: false,
        };
        let addr = spawn_api_server(config, ApiState::new(plane.clone()))
            .await
            .unwrap();

        Self {
            plane,
            base: format!("http://{addr}"),
            client: Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    async fn deployment(&self, id: &str) -> Deployment {
        self.client
            .get(self.url(&format!("/api/v1/deployments/{id}")))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap()
    }
}

#[tokio::test]
async fn test_health_reports_ok() {
    let hub = TestHub::start(None).await;

    let response = hub.client.get(hub.url("/api/v1/health")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let health: HealthResponse = response.json().await.unwrap();
    assert_eq!(health.status, "ok");
    assert_eq!(health.hosts, 0);
    assert_eq!(health.pending_commands, 0);

    hub.plane.shutdown().await;
}

#[tokio::test]
async fn test_component_registration_and_deploy() {
    let hub = TestHub::start(None).await;
    let component = create_test_component(3);

    let created = hub
        .client
        .post(hub.url("/api/v1/components"))
        .json(&component)
        .send()
        .await
        .unwrap();
    assert_eq!(created.status(), StatusCode::CREATED);

    let replaced = hub
        .client
        .post(hub.url("/api/v1/components"))
        .json(&component)
        .send()
        .await
        .unwrap();
    assert_eq!(replaced.status(), StatusCode::OK);

    let accepted = hub
        .client
        .post(hub.url("/api/v1/hosts/9/deployments"))
        .json(&json!({ "component_id": 3 }))
        .send()
        .await
        .unwrap();
    assert_eq!(accepted.status(), StatusCode::ACCEPTED);
    let accepted: AcceptedResponse = accepted.json().await.unwrap();
    let deployment_id = accepted.deployment_id.unwrap();

    assert_eq!(hub.deployment(&deployment_id).await.status, DeploymentStatus::Installing);

    let duplicate = hub
        .client
        .post(hub.url("/api/v1/hosts/9/deployments"))
        .json(&json!({ "component_id": 3 }))
        .send()
        .await
        .unwrap();
    assert_eq!(duplicate.status(), StatusCode::CONFLICT);

    let unknown = hub
        .client
        .post(hub.url("/api/v1/hosts/9/deployments"))
        .json(&json!({ "component_id": 77 }))
        .send()
        .await
        .unwrap();
    assert_eq!(unknown.status(), StatusCode::NOT_FOUND);
    let body: Value = unknown.json().await.unwrap();
    assert!(body["error"].as_str().is_some());

    hub.plane.shutdown().await;
}

#[tokio::test]
async fn test_invalid_requests_are_rejected() {
    let hub = TestHub::start(None).await;

    let bad_rule = hub
        .client
        .post(hub.url("/api/v1/alert-rules"))
        .json(&json!({ "name": "x", "metric_name": "cpu_usage", "operator": "~", "threshold": 1.0 }))
        .send()
        .await
        .unwrap();
    assert_eq!(bad_rule.status(), StatusCode::BAD_REQUEST);

    let missing = hub.client.get(hub.url("/api/v1/alert-events/12")).send().await.unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);

    let missing_deployment = hub
        .client
        .get(hub.url("/api/v1/deployments/INSTALL_1_1_0_0"))
        .send()
        .await
        .unwrap();
    assert_eq!(missing_deployment.status(), StatusCode::NOT_FOUND);

    hub.plane.shutdown().await;
}

#[tokio::test]
async fn test_alert_rule_and_event_endpoints() {
    let hub = TestHub::start(None).await;

    let created = hub
        .client
        .post(hub.url("/api/v1/alert-rules"))
        .json(&json!({ "name": "cpu high", "metric_name": "cpu_usage", "operator": ">", "threshold": 90.0 }))
        .send()
        .await
        .unwrap();
    assert_eq!(created.status(), StatusCode::CREATED);

    let heartbeat = hub
        .client
        .post(hub.url("/api/v1/agent/heartbeat"))
        .json(&create_heartbeat(2, 99.0, 1.0))
        .send()
        .await
        .unwrap();
    assert_eq!(heartbeat.status(), StatusCode::OK);

    let events: Value = hub
        .client
        .get(hub.url("/api/v1/alert-events?status=OPEN"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let event_id = events["events"][0]["id"].as_u64().unwrap();

    let acknowledged = hub
        .client
        .post(hub.url(&format!("/api/v1/alert-events/{event_id}/acknowledge")))
        .json(&json!({ "user": "oncall" }))
        .send()
        .await
        .unwrap();
    assert_eq!(acknowledged.status(), StatusCode::OK);

    let again = hub
        .client
        .post(hub.url(&format!("/api/v1/alert-events/{event_id}/acknowledge")))
        .json(&json!({ "user": "oncall" }))
        .send()
        .await
        .unwrap();
    assert_eq!(again.status(), StatusCode::CONFLICT);

    let stats: Value = hub
        .client
        .get(hub.url("/api/v1/alert-events/stats"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stats["total"], json!(1));
    assert_eq!(stats["acknowledged"], json!(1));

    hub.plane.shutdown().await;
}

#[tokio::test]
async fn test_operator_endpoints_require_token() {
    let hub = TestHub::start(Some("s3cret")).await;

    let anonymous = hub.client.get(hub.url("/api/v1/hosts")).send().await.unwrap();
    assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

    let wrong = hub
        .client
        .get(hub.url("/api/v1/hosts"))
        .bearer_auth("guess")
        .send()
        .await
        .unwrap();
    assert_eq!(wrong.status(), StatusCode::FORBIDDEN);

    let authorized = hub
        .client
        .get(hub.url("/api/v1/hosts"))
        .bearer_auth("s3cret")
        .send()
        .await
        .unwrap();
    assert_eq!(authorized.status(), StatusCode::OK);

    // Agents never carry the token.
    let heartbeat = hub
        .client
        .post(hub.url("/api/v1/agent/heartbeat"))
        .json(&create_heartbeat(1, 1.0, 1.0))
        .send()
        .await
        .unwrap();
    assert_eq!(heartbeat.status(), StatusCode::OK);
    let response: HeartbeatResponse = heartbeat.json().await.unwrap();
    assert!(response.commands.is_empty());

    let health = hub.client.get(hub.url("/api/v1/health")).send().await.unwrap();
    assert_eq!(health.status(), StatusCode::OK);

    hub.plane.shutdown().await;
}

#[tokio::test]
async fn test_agent_installs_component_through_hub() {
    let hub = TestHub::start(None).await;
    hub.plane.registry.register_component(create_test_component(1)).await;

    let accepted: AcceptedResponse = hub
        .client
        .post(hub.url("/api/v1/hosts/21/deployments"))
        .json(&json!({ "component_id": 1 }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let deployment_id = accepted.deployment_id.unwrap();

    let mut config = AgentConfig::new(hub.base.clone(), 21);
    config.heartbeat_interval = Duration::from_millis(200);
    let runtime = Arc::new(FakeRuntime::default());
    let agent = AgentHandle::spawn(config, Box::new(FixedSampler { cpu_usage: 3.0 }), runtime.clone())
        .unwrap();

    let hub_ref = &hub;
    let deployment_ref = deployment_id.as_str();
    assert!(
        eventually(Duration::from_secs(5), move || async move {
            hub_ref.deployment(deployment_ref).await.status == DeploymentStatus::Installed
        })
        .await
    );

    agent.shutdown().await;

    let host: Value = hub
        .client
        .get(hub.url("/api/v1/hosts/21"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(host["status"], json!("ONLINE"));
    assert_eq!(runtime.installs.lock().unwrap().len(), 1);

    let metrics: Value = hub
        .client
        .get(hub.url("/api/v1/hosts/21/metrics?metric=cpu_usage"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(metrics["count"].as_u64().unwrap() > 0);

    hub.plane.shutdown().await;
}
