//! Error types for OpenEd authentication operations

/// Errors from token lifecycle and signed-request operations.
///
/// Asynchronous operations never panic on these; they come back through the
/// returned `Result` exactly once.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Missing or malformed client configuration (e.g. blank `client_id`).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Transport failure or an HTTP status >= 400 from the backend.
    #[error("network error: {0}")]
    Network(String),

    /// Introspection reports a token issued to another application.
    #[error("token belongs to client {actual:?}, expected {expected}")]
    WrongClient {
        expected: String,
        actual: Option<String>,
    },

    /// The locally stored expiry has passed; no request was made.
    #[error("access token has expired")]
    Expired,

    /// No access token is stored.
    #[error("not logged in")]
    LoggedOut,

    /// The authorization server redirected back with an OAuth error.
    #[error("authorization failed: {0}")]
    Authorization(String),

    /// The backend answered with a body this client cannot interpret.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Caller-supplied input to the signed-request generator was rejected.
    #[error("invalid signed request input: {0}")]
    InvalidInput(String),

    /// A signed request failed verification.
    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    /// The token store could not be read or written.
    #[error("token storage error: {0}")]
    Storage(String),
}

/// Result alias for auth operations.
pub type Result<T> = std::result::Result<T, Error>;
