//! HTTP server
//!
//! hyper http1 with TokioIo, one task per connection. Each analytics request
//! builds its own subgraph client; nothing is shared between requests.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::header::{self, HeaderValue};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Serialize;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

use crate::config::{FetchConfig, FoldOptions};
use crate::error::{AnalyticsError, Result};
use crate::pipeline;
use crate::report::{CoverageReport, ErrorBody};
use crate::subgraph::SubgraphClient;

pub const ANALYTICS_PATH: &str = "/api/analytics";

/// Shared application state
pub struct AppState {
    /// `None` when no endpoint is configured; every analytics request then
    /// fails without touching the network.
    pub fetch: Option<FetchConfig>,
    pub fold: FoldOptions,
}

pub async fn run(state: Arc<AppState>, listen: SocketAddr) -> Result<()> {
    let listener = TcpListener::bind(listen).await?;

    match &state.fetch {
        Some(fetch) => info!("Serving {} on {} (subgraph {})", ANALYTICS_PATH, listen, fetch.endpoint),
        None => error!("Serving on {} without a subgraph endpoint: {}", listen, AnalyticsError::NotConfigured),
    }

    let mut accept_failures: u32 = 0;
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                accept_failures = 0;
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { handle_request(state, addr, req).await }
                    });

                    if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                        error!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                // Errors like EMFILE persist until descriptors free up.
                accept_failures = accept_failures.saturating_add(1);
                let pause = accept_backoff(accept_failures);
                error!("Error accepting connection: {:?} (retrying in {:?})", e, pause);
                tokio::time::sleep(pause).await;
            }
        }
    }
}

const ACCEPT_BACKOFF_BASE: Duration = Duration::from_millis(10);
const ACCEPT_BACKOFF_MAX: Duration = Duration::from_secs(1);

/// Pause before retrying after the `failures`-th consecutive accept error.
fn accept_backoff(failures: u32) -> Duration {
    let doublings = failures.saturating_sub(1).min(16);
    ACCEPT_BACKOFF_BASE.saturating_mul(1 << doublings).min(ACCEPT_BACKOFF_MAX)
}

async fn handle_request(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> std::result::Result<Response<Full<Bytes>>, hyper::Error> {
    debug!("{} {} from {}", req.method(), req.uri().path(), addr);
    Ok(route(&state, req.method(), req.uri().path()).await)
}

/// Route a request by method and path.
pub async fn route(state: &AppState, method: &Method, path: &str) -> Response<Full<Bytes>> {
    match (method, path) {
        (&Method::OPTIONS, _) => preflight_response(),
        (&Method::GET, ANALYTICS_PATH) => match analytics(state).await {
            Ok(report) => json_response(StatusCode::OK, &report),
            Err(e) => {
                error!("Analytics request failed: {}", e);
                json_response(StatusCode::INTERNAL_SERVER_ERROR, &ErrorBody::new(&e))
            }
        },
        (&Method::GET, "/health") => json_response(StatusCode::OK, &serde_json::json!({ "status": "ok" })),
        _ => not_found_response(path),
    }
}

async fn analytics(state: &AppState) -> Result<CoverageReport> {
    let fetch = state.fetch.as_ref().ok_or(AnalyticsError::NotConfigured)?;
    let client = SubgraphClient::from_config(fetch)?;
    pipeline::build_report(&client, &state.fold).await
}

fn json_response(status: StatusCode, body: &impl Serialize) -> Response<Full<Bytes>> {
    let (status, bytes) = match serde_json::to_vec(body) {
        Ok(bytes) => (status, bytes),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            serde_json::json!({ "error": e.to_string() }).to_string().into_bytes(),
        ),
    };
    let mut response = Response::new(Full::new(Bytes::from(bytes)));
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}

/// CORS preflight response
fn preflight_response() -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::new()));
    let headers = response.headers_mut();
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(header::ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_static("*"));
    headers.insert(header::ACCESS_CONTROL_ALLOW_METHODS, HeaderValue::from_static("GET, OPTIONS"));
    response
}

/// Not found response
fn not_found_response(path: &str) -> Response<Full<Bytes>> {
    let body = serde_json::json!({
        "error": "Not Found",
        "path": path,
        "hint": format!("GET {ANALYTICS_PATH}")
    });
    json_response(StatusCode::NOT_FOUND, &body)
}
