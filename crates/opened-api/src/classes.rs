//! Teacher class management

use reqwest::{Method, StatusCode};
use serde_json::{Map, Value, json};

use crate::client::{ApiClient, Expect};
use crate::error::{Error, Result};

/// Accept a single grade (`5`) or a range of single grades (`5-6`).
pub fn validate_grade_range(range: &str) -> Result<()> {
    let valid = match range.as_bytes() {
        [a] => a.is_ascii_digit(),
        [a, b'-', b] => a.is_ascii_digit() && b.is_ascii_digit(),
        _ => false,
    };
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidArgument(format!(
            "invalid grade range `{range}`, valid formats are: 5, 5-6"
        )))
    }
}

/// Reject an empty student id list.
pub(crate) fn require_ids(ids: &[u64], what: &str) -> Result<()> {
    if ids.is_empty() {
        return Err(Error::InvalidArgument(format!("{what} must not be empty")));
    }
    Ok(())
}

impl ApiClient {
    /// Classes of the current teacher, all of them when `ids` is empty.
    pub async fn classes(&self, ids: &[u64]) -> Result<Value> {
        let params: Vec<(&str, String)> = ids.iter().map(|id| ("ids[]", id.to_string())).collect();
        self.get("/teachers/classes", &params).await
    }

    pub async fn class(&self, id: u64) -> Result<Value> {
        self.get(&format!("/teachers/classes/{id}"), &[]).await
    }

    pub async fn create_class(&self, title: &str, grades_range: Option<&str>) -> Result<Value> {
        if title.trim().is_empty() {
            return Err(Error::InvalidArgument("class title is required".into()));
        }
        let mut fields = Map::new();
        fields.insert("title".into(), title.into());
        if let Some(range) = grades_range {
            validate_grade_range(range)?;
            fields.insert("grades_range".into(), range.into());
        }

        let body = json!({ "class": fields });
        self.call(
            Method::POST,
            "/teachers/classes",
            &[],
            Some(&body),
            Expect::Status(StatusCode::CREATED),
        )
        .await
    }

    /// Change a class. Returns `None` without a request when nothing changes.
    pub async fn update_class(
        &self,
        id: u64,
        title: Option<&str>,
        grades_range: Option<&str>,
    ) -> Result<Option<Value>> {
        let mut fields = Map::new();
        if let Some(title) = title.filter(|t| !t.trim().is_empty()) {
            fields.insert("title".into(), title.into());
        }
        if let Some(range) = grades_range {
            validate_grade_range(range)?;
            fields.insert("grades_range".into(), range.into());
        }
        if fields.is_empty() {
            return Ok(None);
        }

        let body = json!({ "class": fields });
        self.call(
            Method::PUT,
            &format!("/teachers/classes/{id}"),
            &[],
            Some(&body),
            Expect::Success,
        )
        .await
        .map(Some)
    }

    pub async fn delete_class(&self, id: u64) -> Result<()> {
        self.call(
            Method::DELETE,
            &format!("/teachers/classes/{id}"),
            &[],
            None,
            Expect::Status(StatusCode::NO_CONTENT),
        )
        .await?;
        Ok(())
    }

    pub async fn add_students_to_class(&self, student_ids: &[u64], class_id: u64) -> Result<Value> {
        self.change_membership(student_ids, class_id, "add_students").await
    }

    pub async fn add_student_to_class(&self, student_id: u64, class_id: u64) -> Result<Value> {
        self.add_students_to_class(&[student_id], class_id).await
    }

    pub async fn remove_students_from_class(
        &self,
        student_ids: &[u64],
        class_id: u64,
    ) -> Result<Value> {
        self.change_membership(student_ids, class_id, "remove_students")
            .await
    }

    pub async fn remove_student_from_class(&self, student_id: u64, class_id: u64) -> Result<Value> {
        self.remove_students_from_class(&[student_id], class_id)
            .await
    }

    async fn change_membership(&self, student_ids: &[u64], class_id: u64, action: &str) -> Result<Value> {
        require_ids(student_ids, "student_ids")?;
        let body = json!({ "student_ids": student_ids });
        self.call(
            Method::POST,
            &format!("/teachers/classes/{class_id}/{action}"),
            &[],
            Some(&body),
            Expect::Success,
        )
        .await
    }
}
