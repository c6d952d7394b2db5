//! Error types for OpenEd REST API calls

use reqwest::StatusCode;

/// Errors from [`crate::ApiClient`] operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The request never produced a response (DNS, connect, timeout).
    #[error("{method} {url} failed: {message}")]
    Transport {
        method: String,
        url: String,
        message: String,
    },

    /// The backend answered with a status the call does not accept.
    #[error("{method} {url} returned {status}: {body}")]
    Status {
        method: String,
        url: String,
        status: StatusCode,
        body: String,
    },

    /// The response body was not the JSON the call expects.
    #[error("decoding response from {url}: {message}")]
    Decode { url: String, message: String },

    /// Arguments rejected before any request was made.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The call needs an access token and none is installed.
    #[error("no access token installed")]
    Unauthenticated,

    /// Token acquisition through the auth library failed.
    #[error(transparent)]
    Auth(#[from] opened_auth::Error),
}

/// Result alias for API calls.
pub type Result<T> = std::result::Result<T, Error>;
