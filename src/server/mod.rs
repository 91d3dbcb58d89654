//! HTTP API for the concept graph.
//!
//! Serves JSON over axum. Store work runs on the blocking pool under a
//! per-request deadline; every response carries permissive CORS headers.

pub mod routes;

use std::future::{Future, IntoFuture};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::Request;
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use tokio::net::TcpListener;
use tokio::sync::Notify;

use crate::config::ConceptGraphConfig;
use crate::error::{ConceptGraphError, Result};
use crate::graph::{ConceptService, NeighborhoodEngine};
use crate::store::GraphStore;

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Shared handler state. Cheap to clone: everything inside is behind `Arc`.
#[derive(Debug, Clone)]
pub struct AppState {
    pub engine: NeighborhoodEngine,
    pub concepts: ConceptService,
    pub max_depth: i64,
    pub request_timeout: Duration,
}

impl AppState {
    pub fn new(store: Arc<dyn GraphStore>, config: &ConceptGraphConfig) -> Self {
        let request_timeout = config.server.request_timeout();
        Self {
            engine: NeighborhoodEngine::new(store.clone())
                .with_strategy(config.traversal.strategy),
            concepts: ConceptService::new(store).with_timeout(request_timeout),
            max_depth: config.traversal.max_depth,
            request_timeout,
        }
    }
}

// ---------------------------------------------------------------------------
// ApiError
// ---------------------------------------------------------------------------

/// An error rendered as `{"error": message}` with a matching status code.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

/// Status code for a domain error, looking through traversal annotations.
pub fn status_for(err: &ConceptGraphError) -> StatusCode {
    match err.root_cause() {
        ConceptGraphError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
        ConceptGraphError::ConceptNotFound(_) => StatusCode::NOT_FOUND,
        ConceptGraphError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        ConceptGraphError::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<ConceptGraphError> for ApiError {
    fn from(err: ConceptGraphError) -> Self {
        Self {
            status: status_for(&err),
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(status = %self.status, "{}", self.message);
        } else {
            tracing::warn!(status = %self.status, "rejected request: {}", self.message);
        }
        (
            self.status,
            Json(serde_json::json!({ "error": self.message })),
        )
            .into_response()
    }
}

// ---------------------------------------------------------------------------
// CORS
// ---------------------------------------------------------------------------

/// Set the permissive CORS headers the browser frontend relies on.
pub fn apply_cors_headers(headers: &mut HeaderMap) {
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET,POST,PUT,DELETE"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Origin, Content-Type, Authorization"),
    );
}

/// Answer preflight requests directly and decorate every other response.
async fn cors(request: Request, next: Next) -> Response {
    if request.method() == Method::OPTIONS {
        let mut response = StatusCode::OK.into_response();
        apply_cors_headers(response.headers_mut());
        return response;
    }
    let mut response = next.run(request).await;
    apply_cors_headers(response.headers_mut());
    response
}

// ---------------------------------------------------------------------------
// Server entry point
// ---------------------------------------------------------------------------

/// Build the API Router (extracted for testability).
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(routes::index))
        .route("/concept/all", get(routes::all_concepts))
        .route("/concept/search", get(routes::search_concepts))
        .route("/concept/new", post(routes::create_concept))
        .route("/concept/link", post(routes::link_concepts))
        .route("/concept/around", post(routes::concepts_around_body))
        .route("/concept/around/{id}", get(routes::concepts_around))
        .route("/concept/update/{id}", put(routes::update_concept))
        .route("/concept/delete/{id}", delete(routes::delete_concept))
        .route("/concept/{id}", get(routes::get_concept))
        .layer(middleware::from_fn(cors))
        .with_state(state)
}

/// Resolves on Ctrl-C. If the signal handler cannot be installed the server
/// keeps running until killed.
pub async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("cannot listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}

/// Serve `state` on an already-bound listener until `shutdown` resolves,
/// then give in-flight requests up to `graceful` to finish.
pub async fn serve<S>(
    listener: TcpListener,
    state: AppState,
    shutdown: S,
    graceful: Duration,
) -> Result<()>
where
    S: Future<Output = ()> + Send + 'static,
{
    let app = build_router(Arc::new(state));

    let stopping = Arc::new(Notify::new());
    let notify = stopping.clone();
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.await;
            notify.notify_one();
        })
        .into_future();
    tokio::pin!(server);

    tokio::select! {
        result = &mut server => return result.map_err(ConceptGraphError::from),
        _ = stopping.notified() => {}
    }

    match tokio::time::timeout(graceful, server).await {
        Ok(result) => result.map_err(ConceptGraphError::from)?,
        Err(_) => tracing::warn!(
            timeout_secs = graceful.as_secs(),
            "graceful shutdown timed out; dropping open connections"
        ),
    }
    tracing::info!("server stopped");
    Ok(())
}

/// Bind `config.server.bind` and serve until Ctrl-C.
pub async fn run_server(store: Arc<dyn GraphStore>, config: &ConceptGraphConfig) -> Result<()> {
    let listener = TcpListener::bind(&config.server.bind).await?;
    let addr = listener.local_addr()?;
    tracing::info!(
        %addr,
        strategy = %config.traversal.strategy,
        max_depth = config.traversal.max_depth,
        "conceptgraph listening"
    );

    let state = AppState::new(store, config);
    serve(
        listener,
        state,
        shutdown_signal(),
        config.server.graceful_timeout(),
    )
    .await
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
