//! Request errors and their HTTP rendering

use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Why a signing request was refused.
///
/// Every variant is the caller's fault and renders as `400 {"error": ..}`.
#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid request body: {0}")]
    InvalidBody(String),

    #[error(transparent)]
    Signing(#[from] opened_auth::Error),
}

impl Error {
    pub fn status(&self) -> StatusCode {
        StatusCode::BAD_REQUEST
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "error": self.to_string() });
        (
            self.status(),
            [(CONTENT_TYPE, "application/json")],
            body.to_string(),
        )
            .into_response()
    }
}
