//! Maps `peek_datastore::PeekError` onto HTTP status codes (spec §7:
//! "Invalid-timestamp requests return 400").

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use peek_datastore::{ErrorKind, PeekError};
use serde_json::json;

pub struct AppError(pub PeekError);

impl From<PeekError> for AppError {
    fn from(e: PeekError) -> Self {
        AppError(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self.0.kind() {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::Auth => StatusCode::UNAUTHORIZED,
            ErrorKind::Version => StatusCode::UPGRADE_REQUIRED,
            ErrorKind::Transport | ErrorKind::Storage => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}
