use std::sync::atomic::{AtomicBool, Ordering};

use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::error::{AppError, ErrorKind};

static EXPOSE_DETAILS: AtomicBool = AtomicBool::new(false);

const GENERIC_SERVER_MESSAGE: &str = "An internal error occurred";

/// Whether server-side error messages reach clients. Off in production.
pub fn expose_error_details(expose: bool) {
    EXPOSE_DETAILS.store(expose, Ordering::Relaxed);
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::Authentication => StatusCode::UNAUTHORIZED,
        ErrorKind::Authorization => StatusCode::FORBIDDEN,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::RateLimit => StatusCode::TOO_MANY_REQUESTS,
        ErrorKind::Server | ErrorKind::Database => StatusCode::INTERNAL_SERVER_ERROR,
        ErrorKind::External => StatusCode::BAD_GATEWAY,
    }
}

fn body(error: &AppError, expose: bool) -> serde_json::Value {
    let kind = error.kind();
    if !kind.is_server_side() {
        return serde_json::json!({ "message": error.message(), "type": kind.as_str() });
    }

    if expose {
        serde_json::json!({
            "message": error.message(),
            "type": kind.as_str(),
            "details": error.to_string(),
        })
    } else {
        serde_json::json!({ "message": GENERIC_SERVER_MESSAGE, "type": kind.as_str() })
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        if kind.is_server_side() {
            tracing::error!(kind = kind.as_str(), "{self}");
        }

        let body = body(&self, EXPOSE_DETAILS.load(Ordering::Relaxed));
        (status_for(kind), axum::Json(body)).into_response()
    }
}

// Extractor rejections share the error body of every other failure.

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl From<MultipartRejection> for AppError {
    fn from(rejection: MultipartRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}
