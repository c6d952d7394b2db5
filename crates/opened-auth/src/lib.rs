//! OpenEd OAuth client library
//!
//! Signed-request generation for trusted logins, token exchange and
//! introspection against the OpenEd backend, and a [`Session`] that manages a
//! bearer token from login to revocation. The crate does no I/O of its own
//! beyond HTTP; token persistence goes through [`TokenStore`].
//!
//! Token flow:
//! 1. Trusted server calls `signed_request::generate()` with its client secret
//! 2. Client calls `Session::silent_login()` with the result, or
//!    `Session::login()` + `Session::consume_redirect_token()` for the
//!    interactive implicit flow
//! 3. `Session::verify_token()` checks expiry locally, then introspects
//! 4. `Session::logout()` revokes and clears the stored fields

pub mod constants;
pub mod error;
pub mod record;
pub mod session;
pub mod signed_request;
pub mod storage;
pub mod token;

pub use constants::*;
pub use error::{Error, Result};
pub use record::TokenRecord;
pub use session::{
    Clock, EventKind, ListenerId, Session, SessionBuilder, SessionConfig, SessionEvent,
    SessionState, SystemClock, UserAgent,
};
pub use signed_request::Envelope;
pub use storage::{FileStore, MemoryStore, TokenStore};
pub use token::{Endpoints, TokenInfo, TokenResponse};
