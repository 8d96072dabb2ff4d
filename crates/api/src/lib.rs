//! Control-plane HTTP API
//!
//! A thin request/response layer over `CoreServices`. The heavy lifting
//! (scans, classification, the approval workflow) lives behind it; the
//! handlers translate HTTP into the core's command and query operations.

pub mod handlers;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use felarr_workflow::CoreServices;
use tower_http::trace::TraceLayer;

pub fn router(services: Arc<CoreServices>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/status", get(handlers::status))
        .route("/api/scan", post(handlers::trigger_scan))
        .route("/api/verify", post(handlers::trigger_verify))
        .route("/api/pending", get(handlers::list_pending))
        .route("/api/history", get(handlers::recent_history))
        .route("/api/movies", get(handlers::list_movies))
        .route(
            "/api/policy",
            get(handlers::get_policy).put(handlers::update_policy),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(services)
}
