//! Alert rule CRUD and alert event endpoints

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde_json::{Value, json};

use crate::alerting::{AlertEvent, AlertRule, AlertRuleDraft, AlertStatistics, EventFilter, EventId, RuleId};
use crate::api::{error::ApiResult, state::ApiState, types::AcknowledgeRequest};

/// GET /api/v1/alert-rules
pub async fn list_rules(State(state): State<ApiState>) -> Json<Value> {
    let rules = state.evaluator.list_rules().await;

    Json(json!({
        "rules": rules,
        "count": rules.len(),
    }))
}

/// POST /api/v1/alert-rules
pub async fn create_rule(
    State(state): State<ApiState>,
    Json(draft): Json<AlertRuleDraft>,
) -> ApiResult<(StatusCode, Json<AlertRule>)> {
    let rule = state.evaluator.create_rule(draft).await?;
    Ok((StatusCode::CREATED, Json(rule)))
}

/// GET /api/v1/alert-rules/:id
pub async fn get_rule(
    State(state): State<ApiState>,
    Path(rule_id): Path<RuleId>,
) -> ApiResult<Json<AlertRule>> {
    Ok(Json(state.evaluator.get_rule(rule_id).await?))
}

/// PUT /api/v1/alert-rules/:id
pub async fn update_rule(
    State(state): State<ApiState>,
    Path(rule_id): Path<RuleId>,
    Json(draft): Json<AlertRuleDraft>,
) -> ApiResult<Json<AlertRule>> {
    Ok(Json(state.evaluator.update_rule(rule_id, draft).await?))
}

/// DELETE /api/v1/alert-rules/:id
pub async fn delete_rule(
    State(state): State<ApiState>,
    Path(rule_id): Path<RuleId>,
) -> ApiResult<Json<AlertRule>> {
    Ok(Json(state.evaluator.delete_rule(rule_id).await?))
}

/// GET /api/v1/alert-events
///
/// Newest first, filtered by `status`, `severity`, `host_id` and `limit`
pub async fn list_events(
    State(state): State<ApiState>,
    Query(filter): Query<EventFilter>,
) -> Json<Value> {
    let events = state.evaluator.list_events(&filter).await;

    Json(json!({
        "events": events,
        "count": events.len(),
    }))
}

/// GET /api/v1/alert-events/stats
pub async fn event_statistics(State(state): State<ApiState>) -> Json<AlertStatistics> {
    Json(state.evaluator.statistics().await)
}

/// GET /api/v1/alert-events/:id
pub async fn get_event(
    State(state): State<ApiState>,
    Path(event_id): Path<EventId>,
) -> ApiResult<Json<AlertEvent>> {
    Ok(Json(state.evaluator.get_event(event_id).await?))
}

/// POST /api/v1/alert-events/:id/acknowledge
pub async fn acknowledge_event(
    State(state): State<ApiState>,
    Path(event_id): Path<EventId>,
    Json(request): Json<AcknowledgeRequest>,
) -> ApiResult<Json<AlertEvent>> {
    Ok(Json(state.evaluator.acknowledge(event_id, &request.user).await?))
}

/// POST /api/v1/alert-events/:id/resolve
pub async fn resolve_event(
    State(state): State<ApiState>,
    Path(event_id): Path<EventId>,
) -> ApiResult<Json<AlertEvent>> {
    Ok(Json(state.evaluator.resolve(event_id).await?))
}
