//! Ordered ingestion middleware
//!
//! Each stage is an `axum::middleware::from_fn` function so the pipeline
//! order is spelled out in one place (the router). Stages that depend on
//! configuration receive it as their state and pass through untouched when
//! it is absent.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Instant;

use axum::body::{to_bytes, Body};
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use ipnet::IpNet;
use rsa::RsaPrivateKey;
use tracing::{info, warn};

use crate::transport::{crypto, REAL_IP_HEADER, SIGNATURE_HEADER};

/// Upper bound when buffering bodies in middleware.
const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

async fn buffer_request(request: Request) -> Result<(axum::http::request::Parts, Vec<u8>), Response> {
    let (parts, body) = request.into_parts();
    match to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => Ok((parts, bytes.to_vec())),
        Err(err) => Err((StatusCode::BAD_REQUEST, format!("unreadable body: {err}")).into_response()),
    }
}

/// Request/response logging: method, path, duration, status, byte size.
pub async fn request_logger(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    let response = next.run(request).await;

    let status = response.status().as_u16();
    let (parts, body) = response.into_parts();
    let bytes = match to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!(%method, path, "failed to buffer response body: {err}");
            return (StatusCode::INTERNAL_SERVER_ERROR, "response buffering failed")
                .into_response();
        }
    };

    info!(
        %method,
        path,
        status,
        duration_ms = start.elapsed().as_millis() as u64,
        size = bytes.len(),
        "request handled"
    );

    Response::from_parts(parts, Body::from(bytes))
}

/// Transparent gzip: decode request bodies carrying the encoding marker,
/// encode responses when the caller declared `Accept-Encoding: gzip`.
pub async fn gzip(request: Request, next: Next) -> Response {
    let request_is_gzip = request
        .headers()
        .get(header::CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("gzip"));

    let caller_accepts_gzip = request
        .headers()
        .get(header::ACCEPT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("gzip"));

    let request = if request_is_gzip {
        let (mut parts, bytes) = match buffer_request(request).await {
            Ok(buffered) => buffered,
            Err(response) => return response,
        };
        let decoded = match crypto::decompress(&bytes) {
            Ok(decoded) => decoded,
            Err(err) => {
                return (StatusCode::BAD_REQUEST, format!("bad gzip body: {err}"))
                    .into_response();
            }
        };
        parts.headers.remove(header::CONTENT_ENCODING);
        Request::from_parts(parts, Body::from(decoded))
    } else {
        request
    };

    let response = next.run(request).await;

    if !caller_accepts_gzip {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(_) => return (StatusCode::INTERNAL_SERVER_ERROR, "").into_response(),
    };
    match crypto::compress(&bytes) {
        Ok(compressed) => {
            parts
                .headers
                .insert(header::CONTENT_ENCODING, HeaderValue::from_static("gzip"));
            parts.headers.remove(header::CONTENT_LENGTH);
            Response::from_parts(parts, Body::from(compressed))
        }
        Err(err) => {
            warn!("response compression failed: {err}");
            (StatusCode::INTERNAL_SERVER_ERROR, "").into_response()
        }
    }
}

/// Payload decryption; pass-through when no private key is configured.
pub async fn decrypt_body(
    State(private_key): State<Option<Arc<RsaPrivateKey>>>,
    request: Request,
    next: Next,
) -> Response {
    let Some(private_key) = private_key else {
        return next.run(request).await;
    };

    let (parts, bytes) = match buffer_request(request).await {
        Ok(buffered) => buffered,
        Err(response) => return response,
    };

    // GETs carry no payload; nothing to decrypt
    if bytes.is_empty() {
        return next.run(Request::from_parts(parts, Body::empty())).await;
    }

    match crypto::decrypt(&bytes, &private_key) {
        Ok(plain) => next.run(Request::from_parts(parts, Body::from(plain))).await,
        Err(err) => {
            warn!("failed to decrypt request payload: {err}");
            (StatusCode::BAD_REQUEST, "failed to decrypt request data").into_response()
        }
    }
}

/// Signature check over the (decrypted) body.
///
/// Absence of the signature header skips verification entirely. That is
/// fail-open: an unsigned request passes even when a key is configured.
pub async fn verify_signature(
    State(key): State<Option<String>>,
    request: Request,
    next: Next,
) -> Response {
    let signature = request
        .headers()
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    let (key, signature) = match (key, signature) {
        (Some(key), Some(signature)) => (key, signature),
        _ => return next.run(request).await,
    };

    let (parts, bytes) = match buffer_request(request).await {
        Ok(buffered) => buffered,
        Err(response) => return response,
    };

    if !crypto::verify(&bytes, &key, &signature) {
        warn!("signature mismatch on {}", parts.uri.path());
        return (StatusCode::BAD_REQUEST, "hash mismatch").into_response();
    }

    next.run(Request::from_parts(parts, Body::from(bytes))).await
}

/// Trusted-subnet check: reject sources outside the configured CIDR.
///
/// The explicit `X-Real-IP` override wins over the peer address; with no
/// CIDR configured every request is accepted.
pub async fn trusted_subnet(
    State(subnet): State<Option<IpNet>>,
    request: Request,
    next: Next,
) -> Response {
    let Some(subnet) = subnet else {
        return next.run(request).await;
    };

    let source = request
        .headers()
        .get(REAL_IP_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<IpAddr>().ok())
        .or_else(|| {
            request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|info| info.0.ip())
        });

    match source {
        Some(ip) if subnet.contains(&ip) => next.run(request).await,
        other => {
            warn!(source = ?other, "rejected request from outside the trusted subnet");
            (
                StatusCode::FORBIDDEN,
                "request from this ip-address was rejected",
            )
                .into_response()
        }
    }
}
