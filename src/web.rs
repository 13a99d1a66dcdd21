//! # Web Endpoints
//!
//! - `GET /stats/requests` - Polling payload (cached)
//! - `GET /stats/requests/csv` - Per-operation summary download
//! - `GET /stats/distribution/csv` - Percentile distribution download
//! - `GET /exceptions` - Every exception as JSON
//! - `GET /exceptions/csv` - Every exception as a download
//! - `GET /stats/reset` - Clear all statistics, answers `ok`
//!
//! A failed report is answered with `200 OK` and a
//! `{"success": false, "message": ...}` body so that polling dashboards can
//! show the message in place of the table. Panics inside a handler are caught
//! and answered the same way.

use crate::{
    error::ReportError,
    export::{Download, StatusPayload, JSON_CONTENT_TYPE},
    service::ReportingService,
};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use std::any::Any;
use std::sync::Arc;
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};
use tracing::error;

/// Build the reporting router around a shared service
pub fn router(service: Arc<ReportingService>) -> Router {
    Router::new()
        .route("/stats/requests", get(request_stats))
        .route("/stats/requests/csv", get(requests_csv))
        .route("/stats/distribution/csv", get(distribution_csv))
        .route("/exceptions", get(exceptions))
        .route("/exceptions/csv", get(exceptions_csv))
        .route("/stats/reset", get(reset_stats))
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

/// A report failure rendered as a failure body
#[derive(Debug)]
pub struct ApiError(ReportError);

impl From<ReportError> for ApiError {
    fn from(err: ReportError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        error!("Report request failed: {}", self.0);
        (StatusCode::OK, Json(StatusPayload::failure(self.0.to_string()))).into_response()
    }
}

type ApiResult = std::result::Result<Response, ApiError>;

/// Run a report builder off the async workers
async fn blocking<T, F>(service: Arc<ReportingService>, build: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&ReportingService) -> crate::error::Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(move || build(&service))
        .await
        .map_err(|e| ReportError::Internal(format!("report task failed: {}", e)))?
        .map_err(ApiError::from)
}

async fn request_stats(State(service): State<Arc<ReportingService>>) -> ApiResult {
    let payload = blocking(service, |s| s.request_stats()).await?;
    Ok(json_response(payload.to_string()))
}

async fn requests_csv(State(service): State<Arc<ReportingService>>) -> ApiResult {
    let download = blocking(service, |s| s.requests_csv()).await?;
    Ok(download_response(download))
}

async fn distribution_csv(State(service): State<Arc<ReportingService>>) -> ApiResult {
    let download = blocking(service, |s| s.distribution_csv()).await?;
    Ok(download_response(download))
}

async fn exceptions(State(service): State<Arc<ReportingService>>) -> ApiResult {
    let body = blocking(service, |s| s.exceptions()).await?;
    Ok(json_response(body))
}

async fn exceptions_csv(State(service): State<Arc<ReportingService>>) -> ApiResult {
    let download = blocking(service, |s| s.exceptions_csv()).await?;
    Ok(download_response(download))
}

async fn reset_stats(State(service): State<Arc<ReportingService>>) -> &'static str {
    service.reset();
    "ok"
}

fn json_response(body: String) -> Response {
    ([(header::CONTENT_TYPE, JSON_CONTENT_TYPE)], body).into_response()
}

fn download_response(download: Download) -> Response {
    let disposition = download.disposition();
    (
        [
            (header::CONTENT_TYPE, download.content_type.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        download.body,
    )
        .into_response()
}

fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };
    error!("Report handler panicked: {}", detail);
    (
        StatusCode::OK,
        Json(StatusPayload::failure(format!("internal error: {}", detail))),
    )
        .into_response()
}
