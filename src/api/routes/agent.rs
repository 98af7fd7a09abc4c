//! Agent-facing endpoints

use axum::{Json, extract::State, http::StatusCode};

use crate::api::{error::ApiResult, state::ApiState};
use crate::{AgentCommandResponse, HeartbeatRequest, HeartbeatResponse};

/// POST /api/v1/agent/heartbeat
///
/// Stores the report and returns the commands queued for the host
pub async fn heartbeat(
    State(state): State<ApiState>,
    Json(request): Json<HeartbeatRequest>,
) -> ApiResult<Json<HeartbeatResponse>> {
    let response = state.intake.handle_heartbeat(request).await?;
    Ok(Json(response))
}

/// POST /api/v1/agent/command-result
pub async fn command_result(
    State(state): State<ApiState>,
    Json(result): Json<AgentCommandResponse>,
) -> ApiResult<StatusCode> {
    state.intake.handle_command_result(result)?;
    Ok(StatusCode::ACCEPTED)
}
