//! OpenEd REST API client
//!
//! [`ApiClient`] wraps the teacher-facing endpoints of the OpenEd API:
//! the resource catalog, classes and student accounts. It carries a bearer
//! token obtained from an [`opened_auth::Session`], a password grant or a
//! signed-request exchange.
//!
//! Bodies come back as `serde_json::Value`; the backend schema is not
//! versioned and callers pick the fields they need.

pub mod classes;
pub mod client;
pub mod error;
pub mod resources;
pub mod students;

#[cfg(test)]
pub(crate) mod test_support;

pub use classes::validate_grade_range;
pub use client::{ApiClient, ApiResponse};
pub use error::{Error, Result};
pub use resources::{RESOURCE_QUERY_KEYS, ResourceQuery};
pub use students::{NewStudent, StudentUpdate};
