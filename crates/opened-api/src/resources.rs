//! Read-only catalog endpoints: standards, resources, grade groups

use std::collections::BTreeMap;

use serde_json::Value;

use crate::client::ApiClient;
use crate::error::{Error, Result};

/// Filters accepted by `/resources.json`.
pub const RESOURCE_QUERY_KEYS: [&str; 12] = [
    "descriptive",
    "limit",
    "offset",
    "standard_group",
    "category",
    "standard",
    "area",
    "subject",
    "grade",
    "grade_group",
    "contribution_name",
    "resource_types",
];

/// Validated query for [`ApiClient::resources`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceQuery {
    params: BTreeMap<String, String>,
}

impl ResourceQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a filter. Unknown keys are rejected with the list of valid ones.
    pub fn with(mut self, key: &str, value: impl Into<String>) -> Result<Self> {
        if !RESOURCE_QUERY_KEYS.contains(&key) {
            return Err(Error::InvalidArgument(format!(
                "invalid resource parameter `{key}`; valid parameters are: {}",
                RESOURCE_QUERY_KEYS.join(", ")
            )));
        }
        self.params.insert(key.to_owned(), value.into());
        Ok(self)
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    fn to_params(&self) -> Vec<(&str, String)> {
        self.params
            .iter()
            .map(|(k, v)| (k.as_str(), v.clone()))
            .collect()
    }
}

impl ApiClient {
    pub async fn standard_groups(&self) -> Result<Value> {
        self.get("/standard_groups.json", &[]).await
    }

    pub async fn resources(&self, query: &ResourceQuery) -> Result<Value> {
        self.get("/resources.json", &query.to_params()).await
    }

    pub async fn resource(&self, id: u64) -> Result<Value> {
        self.get(&format!("/resources/{id}.json"), &[]).await
    }

    /// Grade groups, optionally limited to one standards group.
    pub async fn grade_groups(&self, standards_group: Option<&str>) -> Result<Value> {
        let params: Vec<(&str, String)> = standards_group
            .map(|group| ("standards_group", group.to_owned()))
            .into_iter()
            .collect();
        self.get("/grade_groups.json", &params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeApi;

    #[test]
    fn unknown_query_key_is_rejected() {
        let err = ResourceQuery::new().with("sort", "asc").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("`sort`"), "got: {msg}");
        assert!(msg.contains("resource_types"), "should list valid keys: {msg}");
    }

    #[tokio::test]
    async fn resources_sends_filters_in_query() {
        let fake = FakeApi::start().await;
        let client = ApiClient::new(reqwest::Client::new(), &fake.base_url).with_access_token("t");

        let query = ResourceQuery::new()
            .with("limit", "5")
            .unwrap()
            .with("grade", "K")
            .unwrap();
        client.resources(&query).await.unwrap();

        assert_eq!(fake.last().path_and_query, "/resources.json?grade=K&limit=5");
    }

    #[tokio::test]
    async fn catalog_paths() {
        let fake = FakeApi::start().await;
        let client = ApiClient::new(reqwest::Client::new(), &fake.base_url);

        client.standard_groups().await.unwrap();
        client.resource(42).await.unwrap();
        client.grade_groups(None).await.unwrap();
        client.grade_groups(Some("CCSS")).await.unwrap();

        let paths: Vec<String> = fake
            .requests()
            .into_iter()
            .map(|r| r.path_and_query)
            .collect();
        assert_eq!(
            paths,
            [
                "/standard_groups.json",
                "/resources/42.json",
                "/grade_groups.json",
                "/grade_groups.json?standards_group=CCSS",
            ]
        );
    }

    #[tokio::test]
    async fn resource_body_is_decoded() {
        let fake = FakeApi::start().await;
        let client = ApiClient::new(reqwest::Client::new(), &fake.base_url);

        let body = client.resource(7).await.unwrap();
        assert_eq!(body["path"], "/resources/7.json");
    }
}
