//! HTTP server setup.

use arc_swap::ArcSwap;
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::timeout::TimeoutLayer;

use crate::config::schema::AppConfig;
use crate::http::request::{RequestIdLayer, REQUEST_ID_HEADER};
use crate::observability::logging::{err_field, fields, Logger};
use crate::resources::cache::CacheError;
use crate::resources::database::DatabaseHandle;
use crate::resources::{Fingerprint, ResourceCache};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub logger: Logger,
    pub database: ResourceCache<DatabaseHandle>,
    /// Fingerprint of the configuration currently in effect; the reload
    /// loop swaps it when credentials rotate.
    pub database_fingerprint: Arc<ArcSwap<Fingerprint>>,
}

/// HTTP server hosting the service.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(config: &AppConfig, state: AppState) -> Self {
        Self {
            router: Self::build_router(config, state),
        }
    }

    fn build_router(config: &AppConfig, state: AppState) -> Router {
        Router::new()
            .route("/healthz", get(health_handler))
            .fallback(not_found)
            .with_state(state)
            .layer(TimeoutLayer::new(Duration::from_secs(
                config.server.request_timeout_secs,
            )))
            .layer(RequestIdLayer)
    }

    /// Accept connections until the drain notification fires, then stop
    /// accepting and let in-flight requests finish.
    pub async fn run(
        self,
        listener: TcpListener,
        mut drain: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = drain.recv().await;
            })
            .await
    }
}

/// Liveness plus a database connectivity probe.
async fn health_handler(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    let request_id = headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();
    let logger = state
        .logger
        .child(fields(json!({ "request_id": request_id.clone() })));

    let fingerprint = state.database_fingerprint.load_full();
    let (status, body) = match state.database.acquire(&fingerprint).await {
        Ok(handle) => match handle.ping().await {
            Ok(()) => (
                StatusCode::OK,
                json!({ "status": "ok", "database": handle.transport() }),
            ),
            Err(e) => {
                logger.error_with("Database probe failed", err_field(&e));
                (StatusCode::SERVICE_UNAVAILABLE, json!({ "status": "degraded" }))
            }
        },
        Err(e @ CacheError::Conflict { .. }) => {
            // Drift was rejected; the running handle stays in service and
            // the process keeps serving against it.
            logger.warn_with("Database configuration drift rejected", err_field(&e));
            (
                StatusCode::CONFLICT,
                json!({ "status": "configuration-conflict" }),
            )
        }
        Err(e) => {
            logger.error_with("Database unavailable", err_field(&e));
            (
                StatusCode::SERVICE_UNAVAILABLE,
                json!({ "status": "unavailable" }),
            )
        }
    };

    (status, [(REQUEST_ID_HEADER, request_id)], Json(body))
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Json(json!({ "error": "not found" })))
}
