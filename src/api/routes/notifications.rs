//! Notification target and delivery history endpoints

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde_json::{Value, json};

use crate::api::{error::ApiResult, state::ApiState, types::HistoryQuery};
use crate::notify::{NotificationTarget, TargetId};

/// GET /api/v1/notification-targets
pub async fn list_targets(State(state): State<ApiState>) -> Json<Value> {
    let targets = state.targets.list().await;

    Json(json!({
        "targets": targets,
        "count": targets.len(),
    }))
}

/// POST /api/v1/notification-targets
pub async fn upsert_target(
    State(state): State<ApiState>,
    Json(target): Json<NotificationTarget>,
) -> ApiResult<Json<NotificationTarget>> {
    state.targets.upsert(target.clone()).await?;
    Ok(Json(target))
}

/// PUT /api/v1/notification-targets/:id
pub async fn replace_target(
    State(state): State<ApiState>,
    Path(target_id): Path<TargetId>,
    Json(mut target): Json<NotificationTarget>,
) -> ApiResult<Json<NotificationTarget>> {
    target.id = target_id;
    state.targets.upsert(target.clone()).await?;
    Ok(Json(target))
}

/// GET /api/v1/notification-targets/:id
pub async fn get_target(
    State(state): State<ApiState>,
    Path(target_id): Path<TargetId>,
) -> ApiResult<Json<NotificationTarget>> {
    Ok(Json(state.targets.get(target_id).await?))
}

/// DELETE /api/v1/notification-targets/:id
pub async fn delete_target(
    State(state): State<ApiState>,
    Path(target_id): Path<TargetId>,
) -> ApiResult<Json<NotificationTarget>> {
    Ok(Json(state.targets.remove(target_id).await?))
}

/// GET /api/v1/notifications/history
///
/// Delivery attempts, newest first, optionally for a single alert event
pub async fn delivery_history(
    State(state): State<ApiState>,
    Query(query): Query<HistoryQuery>,
) -> Json<Value> {
    let history = state.audit.history(query.alert_event_id);

    Json(json!({
        "history": history,
        "count": history.len(),
    }))
}
