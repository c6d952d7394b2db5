//! OpenEd token endpoint calls
//!
//! Four backend interactions, all on the API host:
//! 1. Password grant (`/oauth/token`), server-side only since it needs the client secret
//! 2. Signed-request exchange (`/oauth/silent_login`)
//! 3. Revocation (`/oauth/revoke`)
//! 4. Introspection (`/oauth/token/info`)
//!
//! Transport failures and HTTP statuses >= 400 all surface as
//! [`Error::Network`] with the status and response body in the message.

use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::constants::{
    AUTHORIZE_PATH, DEFAULT_API_HOST, DEFAULT_AUTH_HOST, REVOKE_PATH, SILENT_LOGIN_PATH,
    TOKEN_INFO_PATH, TOKEN_PATH,
};
use crate::error::{Error, Result};

/// Hosts a session talks to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    /// REST API host (token, revoke, introspection)
    pub api_host: String,
    /// Web host serving the interactive authorization page
    pub auth_host: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            api_host: DEFAULT_API_HOST.to_owned(),
            auth_host: DEFAULT_AUTH_HOST.to_owned(),
        }
    }
}

impl Endpoints {
    /// Absolute URL for a path on the API host.
    pub fn api_url(&self, path: &str) -> String {
        format!("{}{path}", self.api_host.trim_end_matches('/'))
    }

    /// Implicit-flow authorization URL.
    ///
    /// `{auth_host}/oauth/authorize?mode=implicit&client_id=..[&redirect_uri=..]`
    pub fn authorize_url(&self, client_id: &str, redirect_uri: Option<&str>) -> String {
        let mut query = url::form_urlencoded::Serializer::new(String::new());
        query.append_pair("mode", "implicit");
        query.append_pair("client_id", client_id);
        if let Some(redirect_uri) = redirect_uri {
            query.append_pair("redirect_uri", redirect_uri);
        }
        format!(
            "{}{AUTHORIZE_PATH}?{}",
            self.auth_host.trim_end_matches('/'),
            query.finish()
        )
    }
}

/// Response from the password grant.
///
/// `expires_in` is a delta in seconds from the response time, when present.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

/// Body of the password grant request.
#[derive(Serialize)]
struct PasswordGrantRequest<'a> {
    username: &'a str,
    password: &'a str,
    client_id: &'a str,
    client_secret: &'a str,
    grant_type: &'a str,
}

/// Application that a token was issued to.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TokenApplication {
    #[serde(default)]
    pub uid: Option<String>,
}

/// Introspection result for the current bearer token.
///
/// Only `application.uid` is interpreted; everything else the backend sends
/// (owner id, scopes, remaining lifetime) is kept in `extra`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TokenInfo {
    #[serde(default)]
    pub application: Option<TokenApplication>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl TokenInfo {
    /// Client identifier the token belongs to, if reported.
    pub fn client_uid(&self) -> Option<&str> {
        self.application.as_ref()?.uid.as_deref()
    }
}

/// Exchange username and password for a token (resource-owner password grant).
///
/// Needs the client secret, so it must only run on trusted servers.
pub async fn password_grant(
    client: &reqwest::Client,
    endpoints: &Endpoints,
    client_id: &str,
    client_secret: &str,
    username: &str,
    password: &str,
) -> Result<TokenResponse> {
    let body = PasswordGrantRequest {
        username,
        password,
        client_id,
        client_secret,
        grant_type: "password",
    };

    let response = client
        .post(endpoints.api_url(TOKEN_PATH))
        .json(&body)
        .send()
        .await
        .map_err(|e| Error::Network(format!("password grant request failed: {e}")))?;
    let response = ensure_success(response, "password grant").await?;

    response
        .json::<TokenResponse>()
        .await
        .map_err(|e| Error::InvalidResponse(format!("invalid token response: {e}")))
}

/// Exchange a signed request for token fields.
///
/// The signed request is posted verbatim as `text/plain`; it is not JSON.
pub async fn exchange_signed_request(
    client: &reqwest::Client,
    endpoints: &Endpoints,
    signed_request: &str,
) -> Result<serde_json::Map<String, serde_json::Value>> {
    let response = client
        .post(endpoints.api_url(SILENT_LOGIN_PATH))
        .header(CONTENT_TYPE, "text/plain")
        .body(signed_request.to_owned())
        .send()
        .await
        .map_err(|e| Error::Network(format!("silent login request failed: {e}")))?;
    let response = ensure_success(response, "silent login").await?;

    let body = response
        .json::<serde_json::Value>()
        .await
        .map_err(|e| Error::InvalidResponse(format!("invalid silent login response: {e}")))?;

    match body {
        serde_json::Value::Object(fields) => Ok(fields),
        other => Err(Error::InvalidResponse(format!(
            "silent login returned non-object body: {other}"
        ))),
    }
}

/// Revoke an access token.
pub async fn revoke(client: &reqwest::Client, endpoints: &Endpoints, access_token: &str) -> Result<()> {
    let response = client
        .post(endpoints.api_url(REVOKE_PATH))
        .bearer_auth(access_token)
        .json(&serde_json::json!({ "token": access_token }))
        .send()
        .await
        .map_err(|e| Error::Network(format!("revoke request failed: {e}")))?;
    ensure_success(response, "revoke").await?;
    debug!("access token revoked");
    Ok(())
}

/// Introspect an access token.
pub async fn token_info(
    client: &reqwest::Client,
    endpoints: &Endpoints,
    access_token: &str,
) -> Result<TokenInfo> {
    let response = client
        .get(endpoints.api_url(TOKEN_INFO_PATH))
        .bearer_auth(access_token)
        .send()
        .await
        .map_err(|e| Error::Network(format!("token info request failed: {e}")))?;
    let response = ensure_success(response, "token info").await?;

    response
        .json::<TokenInfo>()
        .await
        .map_err(|e| Error::InvalidResponse(format!("invalid token info response: {e}")))
}

async fn ensure_success(response: reqwest::Response, operation: &str) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_client_error() || status.is_server_error() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));
        return Err(Error::Network(format!(
            "{operation} returned {status}: {body}"
        )));
    }
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{get, post};
    use tokio::net::TcpListener;

    /// Serve `app` on an ephemeral port and return its base URL.
    async fn serve(app: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn endpoints(api_host: &str) -> Endpoints {
        Endpoints {
            api_host: api_host.to_owned(),
            auth_host: "https://auth.example".to_owned(),
        }
    }

    #[test]
    fn authorize_url_has_implicit_mode_and_encoded_params() {
        let url = Endpoints::default()
            .authorize_url("client-1", Some("https://app.example/cb?x=1"));
        assert_eq!(
            url,
            "https://www.opened.com/oauth/authorize?mode=implicit&client_id=client-1\
             &redirect_uri=https%3A%2F%2Fapp.example%2Fcb%3Fx%3D1"
        );
    }

    #[test]
    fn authorize_url_omits_missing_redirect_uri() {
        let url = endpoints("http://api").authorize_url("client-1", None);
        assert_eq!(
            url,
            "https://auth.example/oauth/authorize?mode=implicit&client_id=client-1"
        );
    }

    #[test]
    fn api_url_tolerates_trailing_slash() {
        assert_eq!(
            endpoints("http://api.test/").api_url(TOKEN_INFO_PATH),
            "http://api.test/oauth/token/info"
        );
    }

    #[test]
    fn token_info_reads_application_uid() {
        let json = r#"{"resource_owner_id":7,"scopes":["public"],"application":{"uid":"client-1"}}"#;
        let info: TokenInfo = serde_json::from_str(json).unwrap();
        assert_eq!(info.client_uid(), Some("client-1"));
        assert!(info.extra.contains_key("resource_owner_id"));
    }

    #[test]
    fn token_info_without_application_has_no_uid() {
        let info: TokenInfo = serde_json::from_str("{}").unwrap();
        assert_eq!(info.client_uid(), None);
    }

    #[tokio::test]
    async fn password_grant_posts_json_body() {
        let app = Router::new().route(
            TOKEN_PATH,
            post(|axum::Json(body): axum::Json<serde_json::Value>| async move {
                assert_eq!(body["grant_type"], "password");
                assert_eq!(body["client_secret"], "s3cret");
                assert_eq!(body["username"], "teacher");
                axum::Json(serde_json::json!({
                    "access_token": "pw-token",
                    "token_type": "bearer",
                    "expires_in": 7200
                }))
            }),
        );
        let base = serve(app).await;

        let token = password_grant(
            &reqwest::Client::new(),
            &endpoints(&base),
            "client-1",
            "s3cret",
            "teacher",
            "hunter2",
        )
        .await
        .unwrap();
        assert_eq!(token.access_token, "pw-token");
        assert_eq!(token.expires_in, Some(7200));
    }

    #[tokio::test]
    async fn exchange_sends_plain_text_body() {
        let app = Router::new().route(
            SILENT_LOGIN_PATH,
            post(|headers: HeaderMap, body: String| async move {
                assert_eq!(headers[CONTENT_TYPE.as_str()], "text/plain");
                assert_eq!(body, "sig.envelope");
                axum::Json(serde_json::json!({ "access_token": "silent" }))
            }),
        );
        let base = serve(app).await;

        let fields = exchange_signed_request(&reqwest::Client::new(), &endpoints(&base), "sig.envelope")
            .await
            .unwrap();
        assert_eq!(fields["access_token"], "silent");
    }

    #[tokio::test]
    async fn error_status_maps_to_network_error_with_body() {
        let app = Router::new().route(
            TOKEN_INFO_PATH,
            get(|| async { (StatusCode::UNAUTHORIZED, r#"{"error":"invalid_token"}"#) }),
        );
        let base = serve(app).await;

        let err = token_info(&reqwest::Client::new(), &endpoints(&base), "stale")
            .await
            .unwrap_err();
        match err {
            Error::Network(msg) => {
                assert!(msg.contains("401"), "got: {msg}");
                assert!(msg.contains("invalid_token"), "got: {msg}");
            }
            other => panic!("expected Network, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn revoke_sends_bearer_and_token_body() {
        let app = Router::new().route(
            REVOKE_PATH,
            post(|headers: HeaderMap, axum::Json(body): axum::Json<serde_json::Value>| async move {
                assert_eq!(headers["authorization"], "Bearer abc");
                assert_eq!(body["token"], "abc");
                axum::Json(serde_json::json!({}))
            }),
        );
        let base = serve(app).await;

        revoke(&reqwest::Client::new(), &endpoints(&base), "abc")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn unreachable_host_is_network_error() {
        let err = revoke(&reqwest::Client::new(), &endpoints("http://127.0.0.1:1"), "abc")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Network(_)), "got: {err:?}");
    }
}
