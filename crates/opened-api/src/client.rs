//! Authenticated HTTP core shared by every endpoint group
//!
//! [`ApiClient::request`] is the single place that builds URLs, attaches the
//! bearer token and decodes bodies. The endpoint modules only choose method,
//! path and the status they accept.

use opened_auth::token::{self, Endpoints, TokenResponse};
use opened_auth::record::ACCESS_TOKEN_FIELD;
use opened_auth::{SILENT_LOGIN_PATH, Session};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Method, StatusCode};
use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result};

/// Decoded response from [`ApiClient::request`].
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: StatusCode,
    /// JSON body when the response is JSON, the raw text otherwise, `Null` when empty
    pub body: Value,
}

/// Status a call accepts.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Expect {
    /// Any 2xx
    Success,
    /// Exactly this status
    Status(StatusCode),
}

impl Expect {
    fn accepts(self, status: StatusCode) -> bool {
        match self {
            Expect::Success => status.is_success(),
            Expect::Status(expected) => status == expected,
        }
    }
}

/// Client for the OpenEd REST API.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    access_token: Option<String>,
}

impl ApiClient {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            access_token: None,
        }
    }

    pub fn with_access_token(mut self, access_token: impl Into<String>) -> Self {
        self.access_token = Some(access_token.into());
        self
    }

    /// Replace the bearer token sent with every request.
    pub fn use_access_token(&mut self, access_token: impl Into<String>) {
        self.access_token = Some(access_token.into());
    }

    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Client sharing the session's HTTP client, API host and current token.
    pub async fn from_session(session: &Session) -> Result<Self> {
        let access_token = session
            .get_access_token()
            .await?
            .ok_or(Error::Unauthenticated)?;
        Ok(Self::new(session.http_client().clone(), session.endpoints().api_host.clone())
            .with_access_token(access_token))
    }

    /// Obtain a token with the password grant and install it.
    ///
    /// Sends the client secret; only for trusted servers.
    pub async fn password_grant(
        &mut self,
        client_id: &str,
        client_secret: &str,
        username: &str,
        password: &str,
    ) -> Result<TokenResponse> {
        if username.is_empty() || password.is_empty() {
            return Err(Error::InvalidArgument(
                "username and password are required".into(),
            ));
        }
        let response = token::password_grant(
            &self.http,
            &self.endpoints(),
            client_id,
            client_secret,
            username,
            password,
        )
        .await?;
        self.use_access_token(response.access_token.clone());
        debug!(username, "installed token from password grant");
        Ok(response)
    }

    /// Exchange a signed request and install the resulting token.
    pub async fn silent_login(&mut self, signed_request: &str) -> Result<String> {
        let fields = token::exchange_signed_request(&self.http, &self.endpoints(), signed_request).await?;
        let access_token = fields
            .get(ACCESS_TOKEN_FIELD)
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Decode {
                url: self.url(SILENT_LOGIN_PATH, &[]),
                message: "response has no access_token".into(),
            })?
            .to_owned();
        self.use_access_token(access_token.clone());
        Ok(access_token)
    }

    /// Send one request.
    ///
    /// `params` become the query string (repeat a key for array values). A
    /// JSON `body` sets `Content-Type: application/json`. Statuses >= 400
    /// fail with [`Error::Status`].
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<ApiResponse> {
        let url = self.url(path, params);
        debug!(method = %method, url = %url, "api request");

        let mut builder = self.http.request(method.clone(), &url);
        if let Some(access_token) = &self.access_token {
            builder = builder.bearer_auth(access_token);
        }
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let transport = |e: reqwest::Error| Error::Transport {
            method: method.to_string(),
            url: url.clone(),
            message: e.to_string(),
        };

        let response = builder.send().await.map_err(transport)?;
        let status = response.status();
        let is_json = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.contains("json"));
        let text = response.text().await.map_err(transport)?;

        if status.is_client_error() || status.is_server_error() {
            return Err(Error::Status {
                method: method.to_string(),
                url,
                status,
                body: text,
            });
        }

        let body = if text.is_empty() {
            Value::Null
        } else if is_json {
            serde_json::from_str(&text).map_err(|e| Error::Decode {
                url: url.clone(),
                message: e.to_string(),
            })?
        } else {
            Value::String(text)
        };

        Ok(ApiResponse { status, body })
    }

    /// `request` plus a check of the accepted status; returns the body.
    pub(crate) async fn call(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, String)],
        body: Option<&Value>,
        expect: Expect,
    ) -> Result<Value> {
        let response = self.request(method.clone(), path, params, body).await?;
        if !expect.accepts(response.status) {
            return Err(Error::Status {
                method: method.to_string(),
                url: self.url(path, params),
                status: response.status,
                body: response.body.to_string(),
            });
        }
        Ok(response.body)
    }

    pub(crate) async fn get(&self, path: &str, params: &[(&str, String)]) -> Result<Value> {
        self.call(Method::GET, path, params, None, Expect::Success)
            .await
    }

    fn url(&self, path: &str, params: &[(&str, String)]) -> String {
        let mut url = format!("{}{path}", self.base_url.trim_end_matches('/'));
        if !params.is_empty() {
            let mut query = url::form_urlencoded::Serializer::new(String::new());
            for (key, value) in params {
                query.append_pair(key, value);
            }
            url.push(if path.contains('?') { '&' } else { '?' });
            url.push_str(&query.finish());
        }
        url
    }

    fn endpoints(&self) -> Endpoints {
        Endpoints {
            api_host: self.base_url.clone(),
            ..Endpoints::default()
        }
    }
}
