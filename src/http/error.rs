//! Maps the core's error taxonomy onto the HTTP surface (spec.md §6/§7:
//! Validation -> 400, business rule -> 409, transient -> 503, fatal -> 500).
//! Grounded on the pack's axum handlers
//! (`cooprefr-bettersys/rust-backend/src/api/routes.rs`), which return
//! `Result<Json<T>, StatusCode>` from each handler; generalized here to carry
//! a structured JSON body instead of a bare status code.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::error::{CoreError, ExecutionError, MonitorError, PlannerError};

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn not_found(what: &str) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: format!("{what} not found"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorBody { error: self.message })).into_response()
    }
}

fn status_from_u16(code: u16) -> StatusCode {
    StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

impl From<PlannerError> for ApiError {
    fn from(e: PlannerError) -> Self {
        let message = e.to_string();
        let status = status_from_u16(CoreError::Validation(e).http_status());
        Self { status, message }
    }
}

impl From<ExecutionError> for ApiError {
    fn from(e: ExecutionError) -> Self {
        let message = e.to_string();
        let status = status_from_u16(CoreError::Execution(e).http_status());
        Self { status, message }
    }
}

impl From<MonitorError> for ApiError {
    fn from(e: MonitorError) -> Self {
        let message = e.to_string();
        let status = status_from_u16(CoreError::Monitor(e).http_status());
        Self { status, message }
    }
}

/// Repository/infrastructure failures surface as 500s: the HTTP surface
/// never distinguishes individual datastore error causes from its callers,
/// it only distinguishes the taxonomy kinds above (spec.md §7).
impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: e.to_string(),
        }
    }
}
