//! HTTP surface: signing, health and metrics

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use axum::Router;
use axum::body::Bytes;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use common::Secret;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;
use tracing::{info, warn};

use crate::error::Error;
use crate::metrics;

/// Counters behind `/health`
#[derive(Debug)]
pub struct ServerStats {
    pub started_at: Instant,
    pub signed_requests: AtomicU64,
    /// Requests between admission and response, reported when a drain times out
    pub in_flight: AtomicU64,
}

impl ServerStats {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            signed_requests: AtomicU64::new(0),
            in_flight: AtomicU64::new(0),
        }
    }
}

impl Default for ServerStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Holds one `in_flight` slot until dropped.
struct InFlightGuard(Arc<ServerStats>);

impl InFlightGuard {
    fn enter(stats: Arc<ServerStats>) -> Self {
        stats.in_flight.fetch_add(1, Ordering::Relaxed);
        Self(stats)
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Shared application state accessible from all handlers
#[derive(Clone)]
pub struct AppState {
    pub client_id: Arc<str>,
    pub client_secret: Arc<Secret<String>>,
    pub stats: Arc<ServerStats>,
    pub prometheus: PrometheusHandle,
}

/// Body of `POST /generate_signed_request`
#[derive(Debug, Deserialize)]
struct SignRequest {
    username: String,
    /// Just-in-time account fields copied into the envelope
    #[serde(flatten)]
    extra: BTreeMap<String, String>,
}

/// Build the router with all routes and shared state.
///
/// `max_connections` caps concurrently handled requests.
pub fn build_router(state: AppState, max_connections: usize) -> Router {
    Router::new()
        .route("/generate_signed_request", post(generate_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .layer(middleware::from_fn_with_state(state.clone(), track_in_flight))
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
        .with_state(state)
}

/// Count every admitted request until its response is produced.
async fn track_in_flight(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let _guard = InFlightGuard::enter(state.stats.clone());
    next.run(request).await
}

fn json_response(status: StatusCode, body: serde_json::Value) -> Response {
    (
        status,
        [(CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
        .into_response()
}

/// Sign an identity assertion for the configured client.
async fn generate_handler(State(state): State<AppState>, body: Bytes) -> Response {
    let request_id = format!("req_{}", uuid::Uuid::new_v4().as_simple());
    let start = Instant::now();
    let result = sign(&state, &body);
    let elapsed = start.elapsed().as_secs_f64();

    match result {
        Ok((username, signed_request)) => {
            state.stats.signed_requests.fetch_add(1, Ordering::Relaxed);
            metrics::record_request("signed", elapsed);
            info!(request_id = %request_id, username = %username, "signed request issued");
            json_response(
                StatusCode::OK,
                serde_json::json!({
                    "signed_request": signed_request,
                    "client_id": &*state.client_id,
                }),
            )
        }
        Err(e) => {
            metrics::record_request("rejected", elapsed);
            warn!(request_id = %request_id, error = %e, "signing request rejected");
            e.into_response()
        }
    }
}

fn sign(state: &AppState, body: &[u8]) -> Result<(String, String), Error> {
    let request: SignRequest =
        serde_json::from_slice(body).map_err(|e| Error::InvalidBody(e.to_string()))?;
    let signed = opened_auth::signed_request::generate(
        &request.username,
        &state.client_id,
        state.client_secret.expose(),
        &request.extra,
    )?;
    Ok((request.username, signed))
}

/// Liveness plus a few counters.
async fn health_handler(State(state): State<AppState>) -> Response {
    json_response(
        StatusCode::OK,
        serde_json::json!({
            "status": "healthy",
            "uptime_seconds": state.stats.started_at.elapsed().as_secs(),
            "signed_requests": state.stats.signed_requests.load(Ordering::Relaxed),
            "in_flight": state.stats.in_flight.load(Ordering::Relaxed),
        }),
    )
}

/// Prometheus metrics endpoint in text exposition format.
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        state.prometheus.render(),
    )
}
