//! Health check endpoint

use axum::{Json, extract::State};
use chrono::Utc;

use crate::api::{state::ApiState, types::HealthResponse};

/// GET /api/v1/health
pub async fn health_check(State(state): State<ApiState>) -> Json<HealthResponse> {
    let now = Utc::now();

    Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: now.to_rfc3339(),
        uptime_secs: (now - state.started_at()).num_seconds(),
        hosts: state.hosts.list().await.len(),
        pending_commands: state.pending_commands(),
        in_flight_commands: state.registry.in_flight_commands().await,
    })
}
