//! Alert notifications delivered to mocked Discord and webhook endpoints

use std::time::Duration;

use fleetwarden::{
    control_plane::ControlPlane,
    notify::{DeliveryStatus, NotificationAudit},
};
use serde_json::{Value, json};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::{create_heartbeat, create_test_config, eventually};

async fn start_plane(server: &MockServer, targets: Value, notification_ids: Value) -> ControlPlane {
    let mut targets = targets;
    if let Some(list) = targets.as_array_mut() {
        for target in list {
            if let Some(channel) = target["channel"].as_object_mut() {
                for settings in channel.values_mut() {
                    let route = settings["url"].as_str().unwrap_or("/").to_string();
                    settings["url"] = json!(format!("{}{route}", server.uri()));
                }
            }
        }
    }

    let config = create_test_config(json!({
        "notifications": { "timeout_secs": 2, "targets": targets },
        "alert_rules": [{
            "name": "cpu high",
            "metric_name": "cpu_usage",
            "operator": ">",
            "threshold": 90.0,
            "severity": "CRITICAL",
            "notification_ids": notification_ids,
        }],
    }));

    ControlPlane::start(&config).await.unwrap()
}

async fn wait_for_records(audit: &NotificationAudit, count: usize) -> bool {
    eventually(Duration::from_secs(3), move || async move { audit.len() >= count }).await
}

#[tokio::test]
async fn test_webhook_receives_alert() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/hooks/ops"))
        .and(header("x-team", "storage"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let plane = start_plane(
        &server,
        json!([{
            "id": 1,
            "name": "ops",
            "channel": { "webhook": { "url": "/hooks/ops", "method": "put", "headers": { "x-team": "storage" } } }
        }]),
        json!([1]),
    )
    .await;

    plane.intake.handle_heartbeat(create_heartbeat(4, 97.0, 1.0)).await.unwrap();
    assert!(wait_for_records(&plane.audit, 1).await);
    plane.shutdown().await;
    server.verify().await;

    let record = &plane.audit.history(None)[0];
    assert_eq!(record.status, DeliveryStatus::Success);
    assert_eq!(record.channel, "webhook");
    assert_eq!(record.target_id, 1);

    let body: Value = server.received_requests().await.unwrap()[0].body_json().unwrap();
    assert_eq!(body["metric"], json!("cpu_usage"));
    assert_eq!(body["severity"], json!("CRITICAL"));
    assert_eq!(body["host_id"], json!(4));
}

#[tokio::test]
async fn test_discord_receives_embed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/discord"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let plane = start_plane(
        &server,
        json!([{
            "id": 2,
            "name": "discord",
            "channel": { "discord": { "url": "/discord", "user_id": "1234" } }
        }]),
        json!([2]),
    )
    .await;

    plane.intake.handle_heartbeat(create_heartbeat(4, 97.0, 1.0)).await.unwrap();
    assert!(wait_for_records(&plane.audit, 1).await);
    plane.shutdown().await;

    let body: Value = server.received_requests().await.unwrap()[0].body_json().unwrap();
    assert!(body["content"].as_str().unwrap_or_default().contains("1234"));
    assert!(!body["embeds"].as_array().unwrap().is_empty());
    assert_eq!(plane.audit.history(None)[0].status, DeliveryStatus::Success);
}

#[tokio::test]
async fn test_failed_and_unknown_targets_are_audited() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let plane = start_plane(
        &server,
        json!([
            { "id": 1, "name": "broken", "channel": { "webhook": { "url": "/broken" } } },
            { "id": 2, "name": "muted", "enabled": false, "channel": { "webhook": { "url": "/muted" } } }
        ]),
        json!([1, 2, 9]),
    )
    .await;

    plane.intake.handle_heartbeat(create_heartbeat(4, 97.0, 1.0)).await.unwrap();
    assert!(wait_for_records(&plane.audit, 2).await);
    plane.shutdown().await;

    let mut history = plane.audit.history(None);
    history.sort_by_key(|record| record.target_id);

    // The disabled target is skipped without a record.
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].target_id, 1);
    assert_eq!(history[0].status, DeliveryStatus::Failed);
    assert!(history[0].message.contains("500"));
    assert_eq!(history[1].target_id, 9);
    assert_eq!(history[1].status, DeliveryStatus::Failed);
    assert_eq!(history[1].channel, "unknown");

    let event_id = history[0].alert_event_id;
    assert_eq!(plane.audit.history(Some(event_id)).len(), 2);
    assert!(plane.audit.history(Some(event_id + 100)).is_empty());
}

#[tokio::test]
async fn test_slow_endpoint_times_out_without_blocking_evaluation() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(10)))
        .mount(&server)
        .await;

    let plane = start_plane(
        &server,
        json!([{ "id": 1, "name": "slow", "channel": { "webhook": { "url": "/slow" } } }]),
        json!([1]),
    )
    .await;

    let started = std::time::Instant::now();
    plane.intake.handle_heartbeat(create_heartbeat(4, 97.0, 1.0)).await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(1));

    assert!(wait_for_records(&plane.audit, 1).await);
    let record = &plane.audit.history(None)[0];
    assert_eq!(record.status, DeliveryStatus::Failed);
    assert!(record.message.contains("timed out"));

    plane.shutdown().await;
}
