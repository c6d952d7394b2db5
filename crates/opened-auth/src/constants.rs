//! OpenEd OAuth constants
//!
//! Hosts are defaults only; every session can point at a different
//! deployment (e.g. staging). Paths are fixed by the backend and must be
//! reproduced exactly.

/// REST API host serving the token, revoke and introspection endpoints
pub const DEFAULT_API_HOST: &str = "https://api.opened.io";

/// Web host serving the interactive authorization page
pub const DEFAULT_AUTH_HOST: &str = "https://www.opened.com";

/// Namespace for persisted token fields (`{prefix}.{field}`)
pub const DEFAULT_TOKEN_PREFIX: &str = "_openEd";

/// Interactive implicit-flow login page (auth host)
pub const AUTHORIZE_PATH: &str = "/oauth/authorize";

/// Resource-owner password exchange (server-side only)
pub const TOKEN_PATH: &str = "/oauth/token";

/// Signed-request exchange for trusted logins
pub const SILENT_LOGIN_PATH: &str = "/oauth/silent_login";

/// Token revocation
pub const REVOKE_PATH: &str = "/oauth/revoke";

/// Introspection of the bearer token sent with the request
pub const TOKEN_INFO_PATH: &str = "/oauth/token/info";

/// Value of the `algorithm` field in every signed envelope
pub const SIGNING_ALGORITHM: &str = "HMAC-SHA256";

/// Random bytes behind each envelope nonce (hex-encoded to 128 chars)
pub const NONCE_BYTES: usize = 64;
