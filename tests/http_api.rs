//! HTTP front-end tests driven through the router without a socket
//!
//! Covers the endpoint surface, the error taxonomy, and the optional
//! middleware stages (gzip, signature, trusted subnet) one toggle at a
//! time.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use metrion::server::{router, IngressConfig};
use metrion::service::MetricService;
use metrion::storage::MemoryStorage;
use metrion::transport::{crypto, OutboundCodec};
use metrion::{MetricKind, MetricRecord};
use pretty_assertions::assert_eq;
use rsa::{RsaPrivateKey, RsaPublicKey};
use tower::ServiceExt;

fn plain_router() -> axum::Router {
    let service = MetricService::new(Arc::new(MemoryStorage::new()));
    router(service, IngressConfig::default())
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn post(uri: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn post_json(uri: &str, json: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn gauge_update_and_read_via_path_params() {
    let app = plain_router();

    let response = app
        .clone()
        .oneshot(post("/update/gauge/Alloc/123.5"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.oneshot(get("/value/gauge/Alloc")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "123.5");
}

#[tokio::test]
async fn counter_accumulates_across_updates() {
    let app = plain_router();

    for value in ["5", "7"] {
        let response = app
            .clone()
            .oneshot(post(&format!("/update/counter/Hits/{value}")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app.oneshot(get("/value/counter/Hits")).await.unwrap();
    assert_eq!(body_string(response).await, "12");
}

#[tokio::test]
async fn invalid_metric_type_is_client_error() {
    let app = plain_router();
    let response = app
        .oneshot(post("/update/histogram/x/1"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body_string(response).await.contains("invalid metric type"));
}

#[tokio::test]
async fn invalid_gauge_value_is_client_error() {
    let app = plain_router();
    let response = app
        .oneshot(post("/update/gauge/Alloc/not-a-number"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_metric_is_not_found() {
    let app = plain_router();
    let response = app.oneshot(get("/value/gauge/Ghost")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn json_update_echoes_stored_value() {
    let app = plain_router();

    let response = app
        .clone()
        .oneshot(post_json(
            "/update/",
            r#"{"id":"Hits","type":"counter","delta":4}"#,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let echoed: MetricRecord = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(echoed.delta, Some(4));

    // Second update echoes the accumulated value
    let response = app
        .oneshot(post_json(
            "/update/",
            r#"{"id":"Hits","type":"counter","delta":6}"#,
        ))
        .await
        .unwrap();
    let echoed: MetricRecord = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(echoed.delta, Some(10));
}

#[tokio::test]
async fn json_value_query_returns_full_record() {
    let app = plain_router();

    app.clone()
        .oneshot(post("/update/gauge/HeapInuse/42.25"))
        .await
        .unwrap();

    let response = app
        .oneshot(post_json("/value/", r#"{"id":"HeapInuse","type":"gauge"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let record: MetricRecord = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(record.kind, MetricKind::Gauge);
    assert_eq!(record.value, Some(42.25));
}

#[tokio::test]
async fn malformed_batch_leaves_store_unchanged() {
    let app = plain_router();

    let response = app
        .clone()
        .oneshot(post_json("/updates/", "{not json"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app.oneshot(get("/")).await.unwrap();
    assert_eq!(body_string(response).await, "");
}

#[tokio::test]
async fn batch_update_applies_all_records() {
    let app = plain_router();

    let batch = serde_json::to_string(&vec![
        MetricRecord::gauge("Alloc", 1.5),
        MetricRecord::counter("Hits", 3),
        MetricRecord::counter("Hits", 4),
    ])
    .unwrap();

    let response = app
        .clone()
        .oneshot(post_json("/updates/", &batch))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.oneshot(get("/value/counter/Hits")).await.unwrap();
    assert_eq!(body_string(response).await, "7");
}

#[tokio::test]
async fn listing_shows_every_metric() {
    let app = plain_router();

    app.clone()
        .oneshot(post("/update/gauge/Alloc/1.5"))
        .await
        .unwrap();
    app.clone()
        .oneshot(post("/update/counter/Hits/2"))
        .await
        .unwrap();

    let response = app.oneshot(get("/")).await.unwrap();
    let listing = body_string(response).await;
    assert_eq!(listing, "Alloc: 1.5\nHits: 2\n");
}

#[tokio::test]
async fn ping_succeeds_on_memory_storage() {
    let app = plain_router();
    let response = app.oneshot(get("/ping")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn gzip_request_body_is_decoded() {
    let app = plain_router();

    let json = r#"{"id":"Alloc","type":"gauge","value":9.5}"#;
    let compressed = crypto::compress(json.as_bytes()).unwrap();

    let request = Request::builder()
        .method("POST")
        .uri("/update/")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::CONTENT_ENCODING, "gzip")
        .body(Body::from(compressed))
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.oneshot(get("/value/gauge/Alloc")).await.unwrap();
    assert_eq!(body_string(response).await, "9.5");
}

#[tokio::test]
async fn response_compression_is_negotiated() {
    let app = plain_router();

    app.clone()
        .oneshot(post("/update/gauge/Alloc/3.5"))
        .await
        .unwrap();

    let request = Request::builder()
        .uri("/value/gauge/Alloc")
        .header(header::ACCEPT_ENCODING, "gzip")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(
        response.headers().get(header::CONTENT_ENCODING).unwrap(),
        "gzip"
    );
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(crypto::decompress(&bytes).unwrap(), b"3.5");
}

fn signed_router(key: &str) -> axum::Router {
    let service = MetricService::new(Arc::new(MemoryStorage::new()));
    router(
        service,
        IngressConfig {
            key: Some(key.to_string()),
            ..Default::default()
        },
    )
}

#[tokio::test]
async fn valid_signature_is_accepted() {
    let app = signed_router("secret");

    let json = r#"{"id":"Hits","type":"counter","delta":1}"#;
    let signature = crypto::sign(json.as_bytes(), "secret");

    let request = Request::builder()
        .method("POST")
        .uri("/update/")
        .header(header::CONTENT_TYPE, "application/json")
        .header("HashSHA256", signature)
        .body(Body::from(json))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn signature_mismatch_is_rejected() {
    let app = signed_router("secret");

    let json = r#"{"id":"Hits","type":"counter","delta":1}"#;
    let signature = crypto::sign(b"different body", "secret");

    let request = Request::builder()
        .method("POST")
        .uri("/update/")
        .header(header::CONTENT_TYPE, "application/json")
        .header("HashSHA256", signature)
        .body(Body::from(json))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unsigned_request_passes_when_key_configured() {
    // Fail-open: no signature header means no verification
    let app = signed_router("secret");

    let response = app
        .oneshot(post_json(
            "/update/",
            r#"{"id":"Hits","type":"counter","delta":1}"#,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

fn encrypted_router(private: RsaPrivateKey, key: Option<&str>) -> axum::Router {
    let service = MetricService::new(Arc::new(MemoryStorage::new()));
    router(
        service,
        IngressConfig {
            key: key.map(str::to_string),
            private_key: Some(Arc::new(private)),
            ..Default::default()
        },
    )
}

#[tokio::test]
async fn encrypted_signed_request_round_trips() {
    let mut rng = rand::thread_rng();
    let private = RsaPrivateKey::new(&mut rng, 2048).unwrap();
    let public = RsaPublicKey::from(&private);
    let app = encrypted_router(private, Some("secret"));

    // The full outbound pipeline: the MAC covers the plaintext, so the
    // decrypt stage must run before the signature check
    let codec = OutboundCodec::new(Some("secret".into()), Some(public));
    let sealed = codec.seal(&MetricRecord::gauge("Alloc", 123.5)).unwrap();

    let request = Request::builder()
        .method("POST")
        .uri("/update/")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::CONTENT_ENCODING, "gzip")
        .header("HashSHA256", sealed.signature.unwrap())
        .body(Body::from(sealed.body))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.oneshot(get("/value/gauge/Alloc")).await.unwrap();
    assert_eq!(body_string(response).await, "123.5");
}

#[tokio::test]
async fn undecryptable_payload_is_rejected() {
    let mut rng = rand::thread_rng();
    let private = RsaPrivateKey::new(&mut rng, 2048).unwrap();
    let app = encrypted_router(private, None);

    // Valid gzip wrapping garbage that is not a ciphertext
    let garbage = crypto::compress(b"not an rsa block").unwrap();
    let request = Request::builder()
        .method("POST")
        .uri("/update/")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::CONTENT_ENCODING, "gzip")
        .body(Body::from(garbage))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

fn subnet_router(cidr: &str) -> axum::Router {
    let service = MetricService::new(Arc::new(MemoryStorage::new()));
    router(
        service,
        IngressConfig {
            trusted_subnet: Some(cidr.parse().unwrap()),
            ..Default::default()
        },
    )
}

#[tokio::test]
async fn request_inside_trusted_subnet_is_accepted() {
    let app = subnet_router("10.0.0.0/8");

    let request = Request::builder()
        .method("POST")
        .uri("/update/gauge/Alloc/1.0")
        .header("X-Real-IP", "10.1.2.3")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn request_outside_trusted_subnet_is_rejected() {
    let app = subnet_router("10.0.0.0/8");

    let request = Request::builder()
        .method("POST")
        .uri("/update/gauge/Alloc/1.0")
        .header("X-Real-IP", "192.168.0.1")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn no_subnet_configured_accepts_everyone() {
    let app = plain_router();
    let response = app
        .oneshot(post("/update/gauge/Alloc/1.0"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
