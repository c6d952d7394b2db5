//! Fake OpenEd API for endpoint tests

use std::sync::{Arc, Mutex};

use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use tokio::net::TcpListener;

/// One request as the fake saw it.
#[derive(Debug, Clone)]
pub(crate) struct Captured {
    pub method: String,
    pub path_and_query: String,
    pub authorization: Option<String>,
    pub content_type: Option<String>,
    pub body: String,
}

/// Records every request and answers by method:
/// POST 201, PUT 200, DELETE 204, GET 200 echoing the path.
/// `/fail` answers 500 and `/plain` answers `text/plain`.
pub(crate) struct FakeApi {
    pub base_url: String,
    requests: Arc<Mutex<Vec<Captured>>>,
}

impl FakeApi {
    pub async fn start() -> Self {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let app = Router::new().fallback(record).with_state(requests.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{addr}"),
            requests,
        }
    }

    pub fn requests(&self) -> Vec<Captured> {
        self.requests.lock().unwrap().clone()
    }

    pub fn last(&self) -> Captured {
        self.requests().pop().expect("no request reached the fake")
    }

    pub fn last_json(&self) -> serde_json::Value {
        serde_json::from_str(&self.last().body).unwrap()
    }
}

async fn record(
    State(requests): State<Arc<Mutex<Vec<Captured>>>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: String,
) -> Response {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned)
    };
    requests.lock().unwrap().push(Captured {
        method: method.to_string(),
        path_and_query: uri
            .path_and_query()
            .map(|pq| pq.as_str().to_owned())
            .unwrap_or_default(),
        authorization: header("authorization"),
        content_type: header("content-type"),
        body,
    });

    match uri.path() {
        "/fail" => return (StatusCode::INTERNAL_SERVER_ERROR, "boom").into_response(),
        "/plain" => return (StatusCode::OK, "hello").into_response(),
        _ => {}
    }

    let echo = axum::Json(serde_json::json!({ "path": uri.path() }));
    match method {
        Method::POST => (StatusCode::CREATED, echo).into_response(),
        Method::DELETE => StatusCode::NO_CONTENT.into_response(),
        _ => (StatusCode::OK, echo).into_response(),
    }
}
