//! REST API of the fleet hub
//!
//! Agents and operators talk to the same axum server. Agent endpoints are never behind the
//! bearer token; operator endpoints are when a token is configured.
//!
//! ## Endpoints
//!
//! - `GET /api/v1/health` - Health check
//! - `POST /api/v1/agent/heartbeat` - Agent heartbeat, returns queued commands
//! - `POST /api/v1/agent/command-result` - Agent command result
//! - `GET|POST /api/v1/components`, `GET /api/v1/components/{id}`
//! - `GET /api/v1/hosts`, `GET /api/v1/hosts/{id}`, `GET /api/v1/hosts/{id}/metrics`
//! - `GET /api/v1/hosts/{id}/components` - Agent-reported component states
//! - `GET|POST /api/v1/hosts/{id}/deployments` - Deployment history / deploy
//! - `POST /api/v1/hosts/{id}/components/{cid}/{start,stop,configure}`
//! - `GET /api/v1/deployments/{id}`
//! - `GET|POST /api/v1/alert-rules`, `GET|PUT|DELETE /api/v1/alert-rules/{id}`
//! - `GET /api/v1/alert-events`, `GET /api/v1/alert-events/stats`, `GET /api/v1/alert-events/{id}`
//! - `POST /api/v1/alert-events/{id}/{acknowledge,resolve}`
//! - `GET|POST /api/v1/notification-targets`, `GET|PUT|DELETE /api/v1/notification-targets/{id}`
//! - `GET /api/v1/notifications/history`

#[cfg(feature = "api")]
pub mod error;
#[cfg(feature = "api")]
pub mod middleware;
#[cfg(feature = "api")]
pub mod routes;
#[cfg(feature = "api")]
pub mod state;
#[cfg(feature = "api")]
pub mod types;

#[cfg(feature = "api")]
pub use error::{ApiError, ApiResult};
#[cfg(feature = "api")]
pub use state::ApiState;
#[cfg(feature = "api")]
pub use types::{AcceptedResponse, HealthResponse};

#[cfg(feature = "api")]
use axum::{
    Router,
    routing::{get, post},
};
use std::net::SocketAddr;
#[cfg(feature = "api")]
use tracing::info;

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Bind address (e.g., "0.0.0.0:8080")
    pub bind_addr: SocketAddr,

    /// Bearer token for operator endpoints
    pub auth_token: Option<String>,

    /// Enable CORS for browser clients
    pub enable_cors: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], crate::util::DEFAULT_HUB_PORT)),
            auth_token: None,
            enable_cors: true,
        }
    }
}

/// Build the router with all routes and layers
#[cfg(feature = "api")]
pub fn router(config: &ApiConfig, state: ApiState) -> Router {
    use tower_http::cors::{Any, CorsLayer};
    use tower_http::trace::TraceLayer;

    let agent = Router::new()
        .route("/api/v1/health", get(routes::health::health_check))
        .route("/api/v1/agent/heartbeat", post(routes::agent::heartbeat))
        .route(
            "/api/v1/agent/command-result",
            post(routes::agent::command_result),
        );

    let mut operator = Router::new()
        .route(
            "/api/v1/components",
            get(routes::components::list_components).post(routes::components::register_component),
        )
        .route(
            "/api/v1/components/:id",
            get(routes::components::get_component),
        )
        .route("/api/v1/hosts", get(routes::hosts::list_hosts))
        .route("/api/v1/hosts/:id", get(routes::hosts::get_host))
        .route(
            "/api/v1/hosts/:id/metrics",
            get(routes::hosts::get_host_metrics),
        )
        .route(
            "/api/v1/hosts/:id/components",
            get(routes::hosts::get_component_statuses),
        )
        .route(
            "/api/v1/hosts/:id/deployments",
            get(routes::hosts::list_deployments).post(routes::hosts::deploy),
        )
        .route(
            "/api/v1/hosts/:id/components/:component_id/start",
            post(routes::hosts::start_component),
        )
        .route(
            "/api/v1/hosts/:id/components/:component_id/stop",
            post(routes::hosts::stop_component),
        )
        .route(
            "/api/v1/hosts/:id/components/:component_id/configure",
            post(routes::hosts::configure_component),
        )
        .route(
            "/api/v1/deployments/:id",
            get(routes::deployments::get_deployment),
        )
        .route(
            "/api/v1/alert-rules",
            get(routes::alerts::list_rules).post(routes::alerts::create_rule),
        )
        .route(
            "/api/v1/alert-rules/:id",
            get(routes::alerts::get_rule)
                .put(routes::alerts::update_rule)
                .delete(routes::alerts::delete_rule),
        )
        .route("/api/v1/alert-events", get(routes::alerts::list_events))
        .route(
            "/api/v1/alert-events/stats",
            get(routes::alerts::event_statistics),
        )
        .route("/api/v1/alert-events/:id", get(routes::alerts::get_event))
        .route(
            "/api/v1/alert-events/:id/acknowledge",
            post(routes::alerts::acknowledge_event),
        )
        .route(
            "/api/v1/alert-events/:id/resolve",
            post(routes::alerts::resolve_event),
        )
        .route(
            "/api/v1/notification-targets",
            get(routes::notifications::list_targets).post(routes::notifications::upsert_target),
        )
        .route(
            "/api/v1/notification-targets/:id",
            get(routes::notifications::get_target)
                .put(routes::notifications::replace_target)
                .delete(routes::notifications::delete_target),
        )
        .route(
            "/api/v1/notifications/history",
            get(routes::notifications::delivery_history),
        );

    if let Some(token) = config.auth_token.clone() {
        operator = operator.route_layer(axum::middleware::from_fn_with_state(
            token,
            middleware::auth::auth_middleware,
        ));
    }

    let mut app = agent
        .merge(operator)
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if config.enable_cors {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        app = app.layer(cors);
    }

    app
}

/// Spawn the API server
///
/// This starts an Axum HTTP server in a background task.
/// Returns the server's local address.
#[cfg(feature = "api")]
pub async fn spawn_api_server(config: ApiConfig, state: ApiState) -> anyhow::Result<SocketAddr> {
    info!("starting API server on {}", config.bind_addr);

    let app = router(&config, state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    let addr = listener.local_addr()?;

    info!("API server listening on {}", addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("API server error: {}", e);
        }
    });

    Ok(addr)
}
