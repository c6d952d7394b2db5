//! Shared types for the OpenEd client workspace
//!
//! Holds the pieces every crate needs but none owns: the redacting
//! [`Secret`] wrapper used for client secrets and passwords, and the
//! configuration error type returned by config loaders.

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
