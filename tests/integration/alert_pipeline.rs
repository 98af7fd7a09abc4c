//! Heartbeat samples flowing through the alert evaluator

use std::time::Duration;

use assert_matches::assert_matches;
use chrono::Utc;
use fleetwarden::{
    FleetError, MetricSample,
    alerting::{AlertStatus, EventFilter, MetricObservation, Severity},
    control_plane::ControlPlane,
    hosts::HostStatus,
};
use pretty_assertions::assert_eq;
use serde_json::json;

use crate::helpers::{create_heartbeat, create_test_config, create_test_rule};

async fn plane_with_rules(rules: serde_json::Value, auto_resolve: bool) -> ControlPlane {
    let config = create_test_config(json!({
        "alerting": { "auto_resolve": auto_resolve },
        "alert_rules": rules,
    }));
    ControlPlane::start(&config).await.unwrap()
}

#[tokio::test]
async fn test_breach_opens_exactly_one_event() {
    let plane = plane_with_rules(
        json!([{ "name": "cpu high", "metric_name": "cpu_usage", "operator": ">", "threshold": 90.0 }]),
        false,
    )
    .await;

    plane.intake.handle_heartbeat(create_heartbeat(1, 95.0, 10.0)).await.unwrap();
    plane.intake.handle_heartbeat(create_heartbeat(1, 96.0, 10.0)).await.unwrap();

    let events = plane.evaluator.list_events(&EventFilter::default()).await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].status, AlertStatus::Open);
    assert_eq!(events[0].metric_value, 95.0);
    assert_eq!(events[0].hostname.as_deref(), Some("node-1"));
    assert!(events[0].message.contains("cpu high"));
    assert!(events[0].message.contains("95.00"));

    plane.shutdown().await;
}

#[tokio::test]
async fn test_global_and_host_rules_fire_independently() {
    let plane = plane_with_rules(
        json!([
            { "name": "memory", "metric_name": "memory_usage", "operator": ">", "threshold": 80.0, "severity": "WARNING" },
            { "name": "memory on 7", "metric_name": "memory_usage", "operator": ">", "threshold": 80.0, "severity": "CRITICAL", "host_id": 7 }
        ]),
        false,
    )
    .await;

    plane.intake.handle_heartbeat(create_heartbeat(7, 1.0, 85.0)).await.unwrap();
    plane.intake.handle_heartbeat(create_heartbeat(8, 1.0, 85.0)).await.unwrap();

    let on_seven = plane
        .evaluator
        .list_events(&EventFilter {
            host_id: Some(7),
            ..EventFilter::default()
        })
        .await;
    let mut severities: Vec<_> = on_seven.iter().map(|e| e.severity).collect();
    severities.sort();
    assert_eq!(severities, vec![Severity::Warning, Severity::Critical]);
    assert!(on_seven.iter().all(|e| e.status == AlertStatus::Open));

    let stats = plane.evaluator.statistics().await;
    assert_eq!(stats.total, 3);
    assert_eq!(stats.open, 3);
    assert_eq!(stats.critical, 1);

    plane.shutdown().await;
}

#[tokio::test]
async fn test_event_state_machine_is_forward_only() {
    let plane = plane_with_rules(json!([]), false).await;
    plane
        .evaluator
        .create_rule(create_test_rule("disk_usage", ">=", 10.0))
        .await
        .unwrap();

    plane.intake.handle_heartbeat(create_heartbeat(1, 1.0, 1.0)).await.unwrap();
    let event = plane.evaluator.list_events(&EventFilter::default()).await[0].clone();

    let acknowledged = plane.evaluator.acknowledge(event.id, "oncall").await.unwrap();
    assert_eq!(acknowledged.status, AlertStatus::Acknowledged);
    assert_eq!(acknowledged.acknowledged_by.as_deref(), Some("oncall"));
    assert_matches!(
        plane.evaluator.acknowledge(event.id, "oncall").await,
        Err(FleetError::InvalidState(_))
    );

    let resolved = plane.evaluator.resolve(event.id).await.unwrap();
    assert_eq!(resolved.status, AlertStatus::Resolved);
    assert!(resolved.resolved_at.is_some());
    assert_matches!(plane.evaluator.resolve(event.id).await, Err(FleetError::InvalidState(_)));
    assert_matches!(
        plane.evaluator.acknowledge(event.id, "oncall").await,
        Err(FleetError::InvalidState(_))
    );

    // Once resolved, the next breach opens a fresh event.
    plane.intake.handle_heartbeat(create_heartbeat(1, 1.0, 1.0)).await.unwrap();
    let open = plane
        .evaluator
        .list_events(&EventFilter {
            status: Some(AlertStatus::Open),
            ..EventFilter::default()
        })
        .await;
    assert_eq!(open.len(), 1);
    assert_ne!(open[0].id, event.id);

    plane.shutdown().await;
}

#[tokio::test]
async fn test_custom_samples_are_evaluated() {
    let plane = plane_with_rules(
        json!([{ "name": "load", "metric_name": "load1", "operator": ">", "threshold": 4.0 }]),
        false,
    )
    .await;

    let mut heartbeat = create_heartbeat(2, 1.0, 1.0);
    heartbeat.metrics.push(MetricSample::new("load1", 6.5, Utc::now()));
    plane.intake.handle_heartbeat(heartbeat).await.unwrap();

    let events = plane.evaluator.list_events(&EventFilter::default()).await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].metric_name, "load1");

    plane.shutdown().await;
}

#[tokio::test]
async fn test_duration_rule_waits_for_sustained_breach() {
    let plane = plane_with_rules(
        json!([{ "name": "hot", "metric_name": "cpu_usage", "operator": ">", "threshold": 90.0, "duration_secs": 60 }]),
        false,
    )
    .await;
    let start = Utc::now();
    let observation = MetricObservation::new(3, "cpu_usage", 95.0);
    let recovered = MetricObservation::new(3, "cpu_usage", 50.0);
    let evaluator = &plane.evaluator;

    assert!(evaluator.process_metric_at(&observation, start).await.is_empty());
    assert!(
        evaluator
            .process_metric_at(&observation, start + chrono::Duration::seconds(30))
            .await
            .is_empty()
    );

    // Recovery resets the pending state.
    evaluator
        .process_metric_at(&recovered, start + chrono::Duration::seconds(40))
        .await;
    assert!(
        evaluator
            .process_metric_at(&observation, start + chrono::Duration::seconds(70))
            .await
            .is_empty()
    );

    let opened = evaluator
        .process_metric_at(&observation, start + chrono::Duration::seconds(130))
        .await;
    assert_eq!(opened.len(), 1);

    plane.shutdown().await;
}

#[tokio::test]
async fn test_auto_resolve_on_recovery() {
    let plane = plane_with_rules(
        json!([{ "name": "cpu high", "metric_name": "cpu_usage", "operator": ">", "threshold": 90.0 }]),
        true,
    )
    .await;

    plane.intake.handle_heartbeat(create_heartbeat(1, 95.0, 1.0)).await.unwrap();
    plane.intake.handle_heartbeat(create_heartbeat(1, 20.0, 1.0)).await.unwrap();

    let events = plane.evaluator.list_events(&EventFilter::default()).await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].status, AlertStatus::Resolved);

    plane.shutdown().await;
}

#[tokio::test]
async fn test_rule_changes_apply_to_later_samples_only() {
    let plane = plane_with_rules(json!([]), false).await;

    plane.intake.handle_heartbeat(create_heartbeat(1, 95.0, 1.0)).await.unwrap();
    let rule = plane
        .evaluator
        .create_rule(create_test_rule("cpu_usage", ">", 90.0))
        .await
        .unwrap();
    assert!(plane.evaluator.list_events(&EventFilter::default()).await.is_empty());

    let mut stricter = create_test_rule("cpu_usage", ">", 99.0);
    stricter.name = "cpu critical".into();
    plane.evaluator.update_rule(rule.id, stricter).await.unwrap();
    plane.intake.handle_heartbeat(create_heartbeat(1, 95.0, 1.0)).await.unwrap();
    assert!(plane.evaluator.list_events(&EventFilter::default()).await.is_empty());

    plane.evaluator.delete_rule(rule.id).await.unwrap();
    assert_matches!(
        plane.evaluator.get_rule(rule.id).await,
        Err(FleetError::NotFound { .. })
    );

    plane.shutdown().await;
}

#[tokio::test]
async fn test_invalid_operator_is_rejected_at_creation() {
    let plane = plane_with_rules(json!([]), false).await;

    assert_matches!(
        plane
            .evaluator
            .create_rule(create_test_rule("cpu_usage", "=>", 90.0))
            .await,
        Err(FleetError::InvalidInput(_))
    );
    assert!(plane.evaluator.list_rules().await.is_empty());

    plane.shutdown().await;
}

#[tokio::test]
async fn test_silent_hosts_go_offline() {
    let config = create_test_config(json!({ "hosts": { "offline_after_secs": 0 } }));
    let plane = ControlPlane::start(&config).await.unwrap();

    plane.intake.handle_heartbeat(create_heartbeat(1, 1.0, 1.0)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;

    let report = plane.housekeeping.run_now().await.unwrap();
    assert_eq!(report.hosts_offline, vec![1]);
    assert_eq!(plane.hosts.get(1).await.unwrap().status, HostStatus::Offline);

    // The next heartbeat brings it back.
    plane.intake.handle_heartbeat(create_heartbeat(1, 1.0, 1.0)).await.unwrap();
    assert_eq!(plane.hosts.get(1).await.unwrap().status, HostStatus::Online);

    plane.shutdown().await;
}
