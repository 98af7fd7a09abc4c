//! Deployment lifecycle across control plane, command channel and agent executor
//!
//! The agent side is driven in-process: heartbeat responses are handed to a `CommandExecutor`
//! backed by a fake runtime, and its responses go back through the metric intake.

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use futures::future::join_all;
use fleetwarden::{
    AgentCommand, CommandKind, FleetError, HostId,
    agent::CommandExecutor,
    control_plane::ControlPlane,
    deploy::DeploymentStatus,
};
use serde_json::json;

use crate::helpers::{
    FakeRuntime, create_heartbeat, create_test_component, create_test_config, eventually,
};

async fn plane_with_component() -> ControlPlane {
    let plane = ControlPlane::start(&create_test_config(json!({}))).await.unwrap();
    plane.registry.register_component(create_test_component(1)).await;
    plane
}

/// One agent round: heartbeat, execute every returned command, report the results.
async fn agent_round(plane: &ControlPlane, executor: &CommandExecutor, host_id: HostId) -> Vec<AgentCommand> {
    let response = plane
        .intake
        .handle_heartbeat(create_heartbeat(host_id, 5.0, 5.0))
        .await
        .unwrap();

    for command in &response.commands {
        let result = executor.execute(command).await;
        plane.intake.handle_command_result(result).unwrap();
    }

    response.commands
}

async fn wait_for_terminal(plane: &ControlPlane, deployment_id: &str) -> bool {
    eventually(Duration::from_secs(2), move || async move {
        plane
            .registry
            .get_deployment(deployment_id)
            .await
            .map(|d| d.status.is_terminal())
            .unwrap_or(false)
    })
    .await
}

#[tokio::test]
async fn test_deploy_reaches_installed() {
    let plane = plane_with_component().await;
    let runtime = Arc::new(FakeRuntime::default());
    let executor = CommandExecutor::new(runtime.clone(), "/srv/agent");

    let deployment_id = plane.registry.deploy(1, 1).await.unwrap();
    assert_eq!(
        plane.registry.get_deployment(&deployment_id).await.unwrap().status,
        DeploymentStatus::Installing
    );

    let commands = agent_round(&plane, &executor, 1).await;
    assert_eq!(commands.len(), 1);
    assert_eq!(commands[0].kind, CommandKind::Install);
    assert_eq!(commands[0].command_id, deployment_id);

    assert!(wait_for_terminal(&plane, &deployment_id).await);
    let deployment = plane.registry.get_deployment(&deployment_id).await.unwrap();
    assert_eq!(deployment.status, DeploymentStatus::Installed);
    assert!(deployment.end_time.is_some());
    assert!(deployment.error_message.is_none());

    let installs = runtime.installs.lock().unwrap().clone();
    assert_eq!(installs.len(), 1);
    assert_eq!(installs[0].1.to_str(), Some("/opt/component-1"));
    assert_eq!(installs[0].2, "https://packages.test/component-1.tgz");

    plane.shutdown().await;
}

#[tokio::test]
async fn test_failed_install_is_terminal() {
    let plane = plane_with_component().await;
    let executor = CommandExecutor::new(Arc::new(FakeRuntime::failing("checksum mismatch")), "/srv/agent");

    let deployment_id = plane.registry.deploy(1, 1).await.unwrap();
    agent_round(&plane, &executor, 1).await;

    assert!(wait_for_terminal(&plane, &deployment_id).await);
    let deployment = plane.registry.get_deployment(&deployment_id).await.unwrap();
    assert_eq!(deployment.status, DeploymentStatus::Failed);
    assert!(deployment.end_time.is_some());
    assert!(deployment.error_message.unwrap().contains("checksum mismatch"));

    // A new attempt needs an explicit request and gets its own id.
    let retry_id = plane.registry.deploy(1, 1).await.unwrap();
    assert_ne!(retry_id, deployment_id);
    assert_eq!(plane.registry.get_deployments(1).await.len(), 2);

    plane.shutdown().await;
}

#[tokio::test]
async fn test_lost_install_result_expires_and_allows_redeploy() {
    let plane = ControlPlane::start(&create_test_config(json!({
        "commands": { "result_timeout_secs": 0 }
    })))
    .await
    .unwrap();
    plane.registry.register_component(create_test_component(1)).await;

    let deployment_id = plane.registry.deploy(1, 1).await.unwrap();
    assert_matches!(plane.registry.deploy(1, 1).await, Err(FleetError::InvalidState(_)));

    // The agent takes the command but its result never arrives.
    plane
        .intake
        .handle_heartbeat(create_heartbeat(1, 5.0, 5.0))
        .await
        .unwrap();

    let report = plane.housekeeping.run_now().await.unwrap();
    assert_eq!(report.commands_expired, vec![deployment_id.clone()]);

    let deployment = plane.registry.get_deployment(&deployment_id).await.unwrap();
    assert_eq!(deployment.status, DeploymentStatus::Failed);
    assert!(deployment.end_time.is_some());

    let retry_id = plane.registry.deploy(1, 1).await.unwrap();
    assert_ne!(retry_id, deployment_id);

    plane.shutdown().await;
}

#[tokio::test]
async fn test_unknown_component_creates_nothing() {
    let plane = plane_with_component().await;

    assert_matches!(
        plane.registry.deploy(1, 99).await,
        Err(FleetError::NotFound { .. })
    );
    assert!(plane.registry.get_deployments(1).await.is_empty());
    assert_eq!(plane.pending_commands(), 0);

    plane.shutdown().await;
}

#[tokio::test]
async fn test_concurrent_duplicate_deploys_are_serialized() {
    let plane = Arc::new(plane_with_component().await);

    let attempts = join_all((0..8).map(|_| {
        let plane = plane.clone();
        tokio::spawn(async move { plane.registry.deploy(4, 1).await })
    }))
    .await;

    let mut accepted = 0;
    for attempt in attempts {
        match attempt.unwrap() {
            Ok(_) => accepted += 1,
            Err(e) => assert_matches!(e, FleetError::InvalidState(_)),
        }
    }

    assert_eq!(accepted, 1);
    let in_progress = plane
        .registry
        .get_deployments(4)
        .await
        .into_iter()
        .filter(|d| d.status == DeploymentStatus::Installing)
        .count();
    assert_eq!(in_progress, 1);

    plane.shutdown().await;
}

#[tokio::test]
async fn test_start_without_deployment_round_trips() {
    let plane = plane_with_component().await;
    let runtime = Arc::new(FakeRuntime::default());
    let executor = CommandExecutor::new(runtime.clone(), "/srv/agent");

    let command_id = plane.registry.start_component(2, 1).await.unwrap();
    let commands = agent_round(&plane, &executor, 2).await;

    assert_eq!(commands[0].command_id, command_id);
    assert!(plane.registry.get_deployments(2).await.is_empty());
    assert!(runtime.running.lock().unwrap().contains_key(&1));

    // The start result is applied without error and the command is no longer in flight.
    let registry = &plane.registry;
    assert!(
        eventually(Duration::from_secs(2), move || async move {
            registry.in_flight_commands().await == 0
        })
        .await
    );

    plane.shutdown().await;
}

#[tokio::test]
async fn test_commands_reach_only_their_host() {
    let plane = plane_with_component().await;

    let for_one = plane.registry.start_component(1, 1).await.unwrap();
    let for_two = plane.registry.stop_component(2, 1).await.unwrap();

    let first = plane
        .intake
        .handle_heartbeat(create_heartbeat(2, 1.0, 1.0))
        .await
        .unwrap();
    let second = plane
        .intake
        .handle_heartbeat(create_heartbeat(1, 1.0, 1.0))
        .await
        .unwrap();

    assert_eq!(first.commands.len(), 1);
    assert_eq!(first.commands[0].command_id, for_two);
    assert_eq!(second.commands.len(), 1);
    assert_eq!(second.commands[0].command_id, for_one);

    plane.shutdown().await;
}

#[tokio::test]
async fn test_per_host_order_is_issue_order() {
    let plane = plane_with_component().await;

    let install = plane.registry.deploy(3, 1).await.unwrap();
    let start = plane.registry.start_component(3, 1).await.unwrap();
    let stop = plane.registry.stop_component(3, 1).await.unwrap();

    let response = plane
        .intake
        .handle_heartbeat(create_heartbeat(3, 1.0, 1.0))
        .await
        .unwrap();

    let ids: Vec<_> = response.commands.iter().map(|c| c.command_id.clone()).collect();
    assert_eq!(ids, vec![install, start, stop]);

    plane.shutdown().await;
}

#[tokio::test]
async fn test_reregistering_component_keeps_history() {
    let plane = plane_with_component().await;
    plane.registry.deploy(1, 1).await.unwrap();
    let before = plane.registry.get_deployments(1).await;

    let previous = plane.registry.register_component(create_test_component(1)).await;

    assert_eq!(previous, Some(create_test_component(1)));
    assert_eq!(plane.registry.get_deployments(1).await, before);

    plane.shutdown().await;
}

#[tokio::test]
async fn test_configure_reaches_agent_runtime() {
    let plane = plane_with_component().await;
    let runtime = Arc::new(FakeRuntime::default());
    let executor = CommandExecutor::new(runtime.clone(), "/srv/agent");

    let mut config = serde_json::Map::new();
    config.insert("heap".into(), json!("2g"));
    plane.registry.configure_component(5, 1, config).await.unwrap();

    agent_round(&plane, &executor, 5).await;

    let configs = runtime.configs.lock().unwrap().clone();
    assert_eq!(configs.len(), 1);
    assert_eq!(configs[0].0.to_str(), Some("/opt/component-1"));
    assert_eq!(configs[0].1["heap"], json!("2g"));

    plane.shutdown().await;
}
