//! Host endpoints: liveness, metrics, component state and commands

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde_json::{Value, json};

use crate::api::{
    error::ApiResult,
    state::ApiState,
    types::{AcceptedResponse, ConfigureRequest, DeployRequest, MetricQuery},
};
use crate::hosts::HostRecord;
use crate::{ComponentId, HostId};

/// GET /api/v1/hosts
pub async fn list_hosts(State(state): State<ApiState>) -> Json<Value> {
    let hosts = state.hosts.list().await;

    Json(json!({
        "hosts": hosts,
        "count": hosts.len(),
    }))
}

/// GET /api/v1/hosts/:id
pub async fn get_host(
    State(state): State<ApiState>,
    Path(host_id): Path<HostId>,
) -> ApiResult<Json<HostRecord>> {
    Ok(Json(state.hosts.get(host_id).await?))
}

/// GET /api/v1/hosts/:id/metrics
///
/// Stored samples of a host within a time range (default: the last hour)
pub async fn get_host_metrics(
    State(state): State<ApiState>,
    Path(host_id): Path<HostId>,
    Query(query): Query<MetricQuery>,
) -> ApiResult<Json<Value>> {
    let range = query.into_range(host_id);
    let metrics = state.metrics.query_range(&range).await?;

    Ok(Json(json!({
        "host_id": host_id,
        "start": range.start.map(|t| t.to_rfc3339()),
        "end": range.end.map(|t| t.to_rfc3339()),
        "count": metrics.len(),
        "metrics": metrics,
    })))
}

/// GET /api/v1/hosts/:id/components
///
/// Component states as last reported by the host's agent
pub async fn get_component_statuses(
    State(state): State<ApiState>,
    Path(host_id): Path<HostId>,
) -> Json<Value> {
    let components = state.registry.component_statuses(host_id).await;

    Json(json!({
        "host_id": host_id,
        "components": components,
    }))
}

/// GET /api/v1/hosts/:id/deployments
pub async fn list_deployments(
    State(state): State<ApiState>,
    Path(host_id): Path<HostId>,
) -> Json<Value> {
    let deployments = state.registry.get_deployments(host_id).await;

    Json(json!({
        "host_id": host_id,
        "deployments": deployments,
        "count": deployments.len(),
    }))
}

/// POST /api/v1/hosts/:id/deployments
pub async fn deploy(
    State(state): State<ApiState>,
    Path(host_id): Path<HostId>,
    Json(request): Json<DeployRequest>,
) -> ApiResult<(StatusCode, Json<AcceptedResponse>)> {
    let deployment_id = state.registry.deploy(host_id, request.component_id).await?;
    Ok((StatusCode::ACCEPTED, Json(AcceptedResponse::deployment(deployment_id))))
}

/// POST /api/v1/hosts/:id/components/:component_id/start
pub async fn start_component(
    State(state): State<ApiState>,
    Path((host_id, component_id)): Path<(HostId, ComponentId)>,
) -> ApiResult<(StatusCode, Json<AcceptedResponse>)> {
    let command_id = state.registry.start_component(host_id, component_id).await?;
    Ok((StatusCode::ACCEPTED, Json(AcceptedResponse::command(command_id))))
}

/// POST /api/v1/hosts/:id/components/:component_id/stop
pub async fn stop_component(
    State(state): State<ApiState>,
    Path((host_id, component_id)): Path<(HostId, ComponentId)>,
) -> ApiResult<(StatusCode, Json<AcceptedResponse>)> {
    let command_id = state.registry.stop_component(host_id, component_id).await?;
    Ok((StatusCode::ACCEPTED, Json(AcceptedResponse::command(command_id))))
}

/// POST /api/v1/hosts/:id/components/:component_id/configure
pub async fn configure_component(
    State(state): State<ApiState>,
    Path((host_id, component_id)): Path<(HostId, ComponentId)>,
    Json(request): Json<ConfigureRequest>,
) -> ApiResult<(StatusCode, Json<AcceptedResponse>)> {
    let command_id = state
        .registry
        .configure_component(host_id, component_id, request.config)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(AcceptedResponse::command(command_id))))
}
