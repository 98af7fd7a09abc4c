//! Deployment lookup endpoint

use axum::{
    Json,
    extract::{Path, State},
};

use crate::api::{error::ApiResult, state::ApiState};
use crate::deploy::Deployment;

/// GET /api/v1/deployments/:id
pub async fn get_deployment(
    State(state): State<ApiState>,
    Path(deployment_id): Path<String>,
) -> ApiResult<Json<Deployment>> {
    Ok(Json(state.registry.get_deployment(&deployment_id).await?))
}
