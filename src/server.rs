//!
//! dendrite HTTP server
//! --------------------
//! This module defines the Axum-based HTTP API for dendrite.
//!
//! Responsibilities:
//! - Router wiring for the ping and file endpoints.
//! - The JSON:API error document every failing request is translated into.
//! - Request logging middleware with a per-request id.
//! - Graceful shutdown on SIGINT/SIGTERM; shutdown cancels in-flight
//!   directory listings through the shared cancellation token.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use axum::extract::Request;
use axum::http::{header, HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::Config;
use crate::files::{self, handler, FilesError, Service};
use crate::ping;

/// The JSON:API media type used for every JSON response.
pub const JSON_API_CONTENT_TYPE: &str = "application/vnd.api+json";

/// Shared server state injected into all handlers. The file service is
/// immutable after construction, so no locking is needed; the cancellation
/// token fans the shutdown signal out to in-flight listings.
#[derive(Clone)]
pub struct AppState {
    pub files: Arc<Service>,
    pub shutdown: CancellationToken,
}

/// Build the file service from configuration and serve until shutdown.
pub async fn run(cfg: &Config) -> anyhow::Result<()> {
    let roots = cfg
        .file_roots
        .iter()
        .map(|r| files::Root {
            virtual_name: r.virtual_name.clone(),
            source: PathBuf::from(&r.source),
        })
        .collect();
    let service = Service::new(roots).context("init file service")?;
    run_with_service(cfg, service).await
}

/// Serve an already-constructed file service. Split out so tests and callers
/// with independently configured instances can reuse the transport setup.
pub async fn run_with_service(cfg: &Config, service: Service) -> anyhow::Result<()> {
    let shutdown = CancellationToken::new();
    let state = AppState {
        files: Arc::new(service),
        shutdown: shutdown.clone(),
    };

    let app = build_router(state);

    let addr: SocketAddr = format!("{}:{}", cfg.main.listen, cfg.main.port)
        .parse()
        .with_context(|| format!("bind address {}:{}", cfg.main.listen, cfg.main.port))?;
    info!("starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;

    Ok(())
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/ping", get(ping::handler))
        .route("/api/v1/files", get(handler::list_collection))
        .route("/api/v1/files/{*path}", get(handler::get_resource))
        .fallback(|| async { ApiError::not_found("Not Found") })
        .layer(middleware::from_fn(log_request))
        .with_state(state)
}

async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => error!("install SIGTERM handler: {e}"),
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
    shutdown.cancel();
}

/// Log each request at debug with a generated id, echoed as `x-request-id`.
async fn log_request(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let request_id = uuid::Uuid::new_v4().to_string();
    let started = Instant::now();

    let mut response = next.run(req).await;

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert("x-request-id", value);
    }
    debug!(
        target: "http",
        request_id = %request_id,
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "request"
    );

    response
}

/// One JSON:API error object; the envelope carries a list of them.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorObject {
    pub status: String,
    pub title: String,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub errors: Vec<ErrorObject>,
}

/// Transport-level error: an HTTP status plus a client-safe detail string.
/// Internal detail never leaks; filesystem failures are reported generically
/// with at most the virtual path the caller already knows.
#[derive(Debug, Clone)]
pub struct ApiError {
    pub status: StatusCode,
    pub detail: String,
}

impl ApiError {
    pub fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }

    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, detail)
    }

    pub fn not_found(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, detail)
    }

    pub fn internal() -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "An unexpected error occurred.",
        )
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.status.as_u16(), self.detail)
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let title = self
            .status
            .canonical_reason()
            .unwrap_or("Error")
            .to_string();
        let payload = ErrorResponse {
            errors: vec![ErrorObject {
                status: self.status.as_u16().to_string(),
                title,
                detail: self.detail,
            }],
        };
        (
            self.status,
            [(header::CONTENT_TYPE, JSON_API_CONTENT_TYPE)],
            axum::Json(payload),
        )
            .into_response()
    }
}

impl From<FilesError> for ApiError {
    fn from(err: FilesError) -> Self {
        match err {
            FilesError::RootNotFound(_) => ApiError::not_found("file root not found"),
            FilesError::OutsideRoot(_) => ApiError::bad_request("path escapes configured root"),
            FilesError::NotADirectory(_) => ApiError::bad_request("not a directory"),
            FilesError::Canceled => ApiError::new(StatusCode::REQUEST_TIMEOUT, "request canceled"),
            FilesError::InvalidQuery(detail) => ApiError::bad_request(detail),
            FilesError::Stat { ref source, .. } => match source.kind() {
                std::io::ErrorKind::NotFound => ApiError::not_found("file not found"),
                std::io::ErrorKind::PermissionDenied => {
                    ApiError::new(StatusCode::FORBIDDEN, "permission denied")
                }
                _ => {
                    error!("filesystem error: {err}");
                    ApiError::internal()
                }
            },
            FilesError::EmptyRoots
            | FilesError::DuplicateRoot(_)
            | FilesError::ResolveRoot { .. } => {
                error!("construction error surfaced at request time: {err}");
                ApiError::internal()
            }
        }
    }
}
