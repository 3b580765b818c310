pub mod error;
pub mod routes;

use crate::state::PlateServiceState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

pub use error::ApiError;

/// Build the API router
pub fn router(state: PlateServiceState) -> Router {
    Router::new()
        // Health and metrics endpoints
        .route("/healthz", get(routes::healthz))
        .route("/readyz", get(routes::readyz))
        .route("/metrics", get(routes::metrics))
        // Detection endpoints
        .route("/v1/plates/detect", post(routes::detect))
        .route("/v1/plates/check", post(routes::check))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
