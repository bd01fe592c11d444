//! Admin HTTP API.

mod error;
pub mod health;
pub mod routines;

use axum::{
    Router,
    routing::{delete, get, post},
};
pub use error::{ApiError, ErrorInfo, ErrorResponse};
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};

use crate::{AppState, config::ServerConfig};

pub fn build_app(config: &ServerConfig, state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/health/live", get(health::liveness))
        .route("/metrics", get(health::metrics))
        .route("/v1/routines", get(routines::list))
        .route("/v1/routines/recurring", post(routines::start_recurring))
        .route("/v1/routines/interval", post(routines::start_interval))
        .route("/v1/routines/batch", post(routines::start_batch))
        .route(
            "/v1/routines/{id}",
            get(routines::get).delete(routines::cancel),
        )
        .route(
            "/v1/channels/{channel}/routines",
            delete(routines::stop_channel),
        )
        .route("/v1/shutdown", post(routines::shutdown))
        .layer(TraceLayer::new_for_http())
        .layer(RequestBodyLimitLayer::new(config.body_limit_bytes))
        .with_state(state)
}
