//! Thin HTTP adapters over the metric service
//!
//! Handlers only translate between wire shapes and [`MetricRecord`]; all
//! business rules live in the service. Bodies are parsed from raw bytes
//! because the middleware pipeline may already have rewritten them.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;

use super::{ApiError, AppState};
use crate::service::ServiceError;
use crate::{MetricKind, MetricRecord};

fn parse_kind(kind: &str) -> Result<MetricKind, ApiError> {
    kind.parse().map_err(|_| ServiceError::InvalidMetricType.into())
}

fn parse_json<T: serde::de::DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|err| ApiError::InvalidRequest(err.to_string()))
}

/// `POST /update/` — save one record from a JSON body, echo the stored value.
pub async fn update_json(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<MetricRecord>, ApiError> {
    let record: MetricRecord = parse_json(&body)?;
    state.service.save(&record).await?;
    let stored = state.service.retrieve(&record.id, record.kind).await?;
    Ok(Json(stored))
}

/// `POST /updates/` — save a batch atomically.
pub async fn update_batch(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let records: Vec<MetricRecord> = parse_json(&body)?;
    state.service.save_all(&records).await?;
    Ok(StatusCode::OK)
}

/// `POST /update/{type}/{name}/{value}` — path-parameter form.
pub async fn update_path(
    State(state): State<AppState>,
    Path((kind, name, value)): Path<(String, String, String)>,
) -> Result<Response, ApiError> {
    let record = match parse_kind(&kind)? {
        MetricKind::Gauge => {
            let value: f64 = value
                .parse()
                .map_err(|_| ApiError::InvalidRequest(format!("invalid gauge value: {value}")))?;
            MetricRecord::gauge(name, value)
        }
        MetricKind::Counter => {
            let delta: i64 = value
                .parse()
                .map_err(|_| ApiError::InvalidRequest(format!("invalid counter value: {value}")))?;
            MetricRecord::counter(name, delta)
        }
    };

    state.service.save(&record).await?;
    Ok(([(header::CONTENT_TYPE, "text/plain")], StatusCode::OK).into_response())
}

/// `POST /value/` — JSON query by id + type, full record in the response.
pub async fn value_json(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<MetricRecord>, ApiError> {
    let query: MetricRecord = parse_json(&body)?;
    let stored = state.service.retrieve(&query.id, query.kind).await?;
    Ok(Json(stored))
}

/// `GET /value/{type}/{name}` — plain-text value.
pub async fn value_path(
    State(state): State<AppState>,
    Path((kind, name)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let kind = parse_kind(&kind)?;
    let stored = state.service.retrieve(&name, kind).await?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain")],
        render_value(&stored),
    )
        .into_response())
}

/// `GET /` — plain-text listing of every stored metric.
pub async fn list_metrics(State(state): State<AppState>) -> Result<Response, ApiError> {
    let mut records = state.service.get_all().await?;
    records.sort_by(|a, b| a.id.cmp(&b.id));

    let mut listing = String::new();
    for record in &records {
        listing.push_str(&record.id);
        listing.push_str(": ");
        listing.push_str(&render_value(record));
        listing.push('\n');
    }
    Ok(([(header::CONTENT_TYPE, "text/plain")], listing).into_response())
}

/// `GET /ping` — storage liveness probe.
pub async fn ping(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    state
        .service
        .ping_storage()
        .await
        .map_err(|err| ApiError::Storage(err.to_string()))?;
    Ok(StatusCode::OK)
}

/// Shortest-form text rendering: `123.5` for gauges, `12` for counters.
fn render_value(record: &MetricRecord) -> String {
    match record.kind {
        MetricKind::Gauge => record.value.unwrap_or_default().to_string(),
        MetricKind::Counter => record.delta.unwrap_or_default().to_string(),
    }
}
