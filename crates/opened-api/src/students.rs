//! Teacher-managed student accounts

use std::fmt;

use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde_json::{Value, json};

use crate::client::{ApiClient, Expect};
use crate::error::{Error, Result};

/// Student account to create. Every field except `class_ids` is required.
#[derive(Clone, Serialize)]
pub struct NewStudent {
    pub first_name: String,
    pub last_name: String,
    pub username: String,
    pub password: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub class_ids: Vec<u64>,
}

impl NewStudent {
    pub fn validate(&self) -> Result<()> {
        let missing: Vec<&str> = [
            ("first_name", &self.first_name),
            ("last_name", &self.last_name),
            ("username", &self.username),
            ("password", &self.password),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::InvalidArgument(format!(
                "missing required student field(s): {}",
                missing.join(", ")
            )))
        }
    }
}

impl fmt::Debug for NewStudent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewStudent")
            .field("first_name", &self.first_name)
            .field("last_name", &self.last_name)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("class_ids", &self.class_ids)
            .finish()
    }
}

/// Partial update; `None` fields are left unchanged.
#[derive(Clone, Default, Serialize)]
pub struct StudentUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_ids: Option<Vec<u64>>,
}

impl StudentUpdate {
    pub fn is_empty(&self) -> bool {
        self.first_name.is_none()
            && self.last_name.is_none()
            && self.username.is_none()
            && self.password.is_none()
            && self.class_ids.is_none()
    }
}

impl fmt::Debug for StudentUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StudentUpdate")
            .field("first_name", &self.first_name)
            .field("last_name", &self.last_name)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("class_ids", &self.class_ids)
            .finish()
    }
}

impl ApiClient {
    pub async fn create_student(&self, student: &NewStudent) -> Result<Value> {
        student.validate()?;
        let body = json!({ "student": student });
        self.call(
            Method::POST,
            "/teachers/students",
            &[],
            Some(&body),
            Expect::Status(StatusCode::CREATED),
        )
        .await
    }

    /// Change a student. Returns `None` without a request when nothing changes.
    pub async fn update_student(&self, id: u64, update: &StudentUpdate) -> Result<Option<Value>> {
        if update.is_empty() {
            return Ok(None);
        }
        let body = json!({ "student": update });
        self.call(
            Method::PUT,
            &format!("/teachers/students/{id}"),
            &[],
            Some(&body),
            Expect::Success,
        )
        .await
        .map(Some)
    }

    pub async fn student(&self, id: u64) -> Result<Value> {
        self.get(&format!("/teachers/students/{id}"), &[]).await
    }

    pub async fn delete_student(&self, id: u64) -> Result<()> {
        self.call(
            Method::DELETE,
            &format!("/teachers/students/{id}"),
            &[],
            None,
            Expect::Status(StatusCode::NO_CONTENT),
        )
        .await?;
        Ok(())
    }
}
