//! HTTP ingestion server
//!
//! Axum router plus the ordered middleware pipeline. Stage order on the
//! way in: request logging → gzip decode → payload decryption → signature
//! verification → trusted-subnet check → handler. Logging is mandatory;
//! every other stage toggles off when its configuration is absent.
//!
//! ## Endpoints
//!
//! - `POST /update/` — one record, JSON body
//! - `POST /updates/` — batch of records, JSON body
//! - `POST /value/` — JSON query by id + type
//! - `GET /value/{type}/{name}` — plain-text value
//! - `POST /update/{type}/{name}/{value}` — path-parameter form
//! - `GET /` — plain-text listing of the whole store
//! - `GET /ping` — storage liveness

pub mod handlers;
pub mod middleware;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use ipnet::IpNet;
use rsa::RsaPrivateKey;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::service::{MetricService, ServiceError};

/// Toggles for the optional ingestion stages.
#[derive(Clone, Default)]
pub struct IngressConfig {
    /// Shared secret for signature verification
    pub key: Option<String>,

    /// Private key for payload decryption
    pub private_key: Option<Arc<RsaPrivateKey>>,

    /// CIDR of trusted sources
    pub trusted_subnet: Option<IpNet>,
}

/// Shared state behind every handler.
#[derive(Clone)]
pub struct AppState {
    pub service: MetricService,
}

/// Error taxonomy surfaced by the HTTP front-end.
#[derive(Debug)]
pub enum ApiError {
    /// Bad type/value or malformed body
    InvalidRequest(String),

    /// Unknown id/type on retrieve
    NotFound,

    /// Backend failure
    Storage(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::InvalidRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound => (StatusCode::NOT_FOUND, "metric not found".to_string()),
            ApiError::Storage(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::InvalidMetricType | ServiceError::InvalidValue => {
                ApiError::InvalidRequest(err.to_string())
            }
            ServiceError::NotFound => ApiError::NotFound,
            ServiceError::Storage(inner) => ApiError::Storage(inner.to_string()),
        }
    }
}

/// Build the full router with the ordered middleware pipeline applied.
pub fn router(service: MetricService, ingress: IngressConfig) -> Router {
    let state = AppState { service };

    // Layers run top-down per request in the reverse order they are added:
    // the logger added last is outermost, the subnet check sits closest to
    // the handlers.
    Router::new()
        .route("/", get(handlers::list_metrics))
        .route("/ping", get(handlers::ping))
        .route("/value/", post(handlers::value_json))
        .route("/value/:kind/:name", get(handlers::value_path))
        .route("/update/", post(handlers::update_json))
        .route("/update/:kind/:name/:value", post(handlers::update_path))
        .route("/updates/", post(handlers::update_batch))
        .with_state(state)
        .layer(axum::middleware::from_fn_with_state(
            ingress.trusted_subnet,
            middleware::trusted_subnet,
        ))
        .layer(axum::middleware::from_fn_with_state(
            ingress.key,
            middleware::verify_signature,
        ))
        .layer(axum::middleware::from_fn_with_state(
            ingress.private_key,
            middleware::decrypt_body,
        ))
        .layer(axum::middleware::from_fn(middleware::gzip))
        .layer(axum::middleware::from_fn(middleware::request_logger))
}

/// Serve until the cancellation token trips, then shut down gracefully.
pub async fn serve(
    address: &str,
    app: Router,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(address).await?;
    info!("listening on {address}");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move { cancel.cancelled().await })
    .await?;

    info!("http server stopped");
    Ok(())
}
