//! Component catalogue endpoints

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde_json::{Value, json};

use crate::ComponentId;
use crate::api::{error::ApiResult, state::ApiState};
use crate::deploy::Component;

/// GET /api/v1/components
pub async fn list_components(State(state): State<ApiState>) -> Json<Value> {
    let components = state.registry.list_components().await;

    Json(json!({
        "components": components,
        "count": components.len(),
    }))
}

/// POST /api/v1/components
///
/// Upsert by id. 201 for a new component, 200 when it replaced one.
pub async fn register_component(
    State(state): State<ApiState>,
    Json(component): Json<Component>,
) -> ApiResult<(StatusCode, Json<Component>)> {
    component.validate()?;

    let status = match state.registry.register_component(component.clone()).await {
        Some(_) => StatusCode::OK,
        None => StatusCode::CREATED,
    };

    Ok((status, Json(component)))
}

/// GET /api/v1/components/:id
pub async fn get_component(
    State(state): State<ApiState>,
    Path(component_id): Path<ComponentId>,
) -> ApiResult<Json<Component>> {
    Ok(Json(state.registry.get_component(component_id).await?))
}
