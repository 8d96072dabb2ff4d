//! HTTP handlers over CoreServices

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use felarr_core::{FelarrError, UpgradePolicy};
use felarr_workflow::CoreServices;
use serde::Deserialize;
use serde_json::json;

/// Error wrapper translating the core taxonomy to HTTP responses.
pub struct ApiError(FelarrError);

impl From<FelarrError> for ApiError {
    fn from(err: FelarrError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            FelarrError::NotFound { .. } => StatusCode::NOT_FOUND,
            FelarrError::ValidationError { .. } | FelarrError::ConfigurationError { .. } => {
                StatusCode::BAD_REQUEST
            }
            FelarrError::StoreUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::BAD_GATEWAY,
        };
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

pub async fn status(State(services): State<Arc<CoreServices>>) -> impl IntoResponse {
    Json(services.status())
}

pub async fn trigger_scan(
    State(services): State<Arc<CoreServices>>,
) -> Result<impl IntoResponse, ApiError> {
    let summary = services.trigger_scan().await?;
    Ok(Json(json!({
        "total": summary.total,
        "dv": summary.dv_count,
        "p7_fel": summary.p7_fel_count,
        "atmos": summary.atmos_count,
        "skipped": summary.skipped,
        "collections_added": summary.collections_added,
    })))
}

pub async fn trigger_verify(
    State(services): State<Arc<CoreServices>>,
) -> Result<impl IntoResponse, ApiError> {
    let verify = services.trigger_verify().await?;
    Ok(Json(json!({
        "total": verify.scan.total,
        "dv": verify.scan.dv_count,
        "p7_fel": verify.scan.p7_fel_count,
        "atmos": verify.scan.atmos_count,
        "removed": verify.removed,
    })))
}

pub async fn list_pending(
    State(services): State<Arc<CoreServices>>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(services.list_pending().await?))
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    #[serde(default = "default_history_limit")]
    pub limit: i64,
}

fn default_history_limit() -> i64 {
    50
}

pub async fn recent_history(
    State(services): State<Arc<CoreServices>>,
    Query(params): Query<HistoryParams>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(services.recent_history(params.limit).await?))
}

pub async fn list_movies(
    State(services): State<Arc<CoreServices>>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(services.all_capabilities().await?))
}

pub async fn get_policy(State(services): State<Arc<CoreServices>>) -> impl IntoResponse {
    Json(services.current_policy().await)
}

pub async fn update_policy(
    State(services): State<Arc<CoreServices>>,
    Json(policy): Json<UpgradePolicy>,
) -> Result<impl IntoResponse, ApiError> {
    services.update_policy(policy).await?;
    Ok(StatusCode::NO_CONTENT)
}
