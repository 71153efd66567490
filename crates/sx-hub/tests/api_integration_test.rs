//! Integration tests for the metadata read API
//!
//! Builds the real router over an in-memory store (or a ClickHouse store
//! pointed at a local stand-in server) and drives it with
//! tower::ServiceExt, reading streamed bodies to completion.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;

use sx_hub::config::ClickHouseConfig;
use sx_hub::query::TableNames;
use sx_hub::store::clickhouse::ClickHouseProvider;
use sx_hub::store::memory::{MemoryStore, StoredSeries};
use sx_hub::{create_router, AppState, MetadataService};

fn series(name: &str, kind: &str, help: &str, unit: &str, ts: u64) -> StoredSeries {
    StoredSeries::from_labels(
        &[
            ("__name__", name),
            ("instance", "localhost:9090"),
            ("__metric_type__", kind),
            ("__metric_help__", help),
            ("__metric_unit__", unit),
        ],
        ts,
    )
}

fn test_app(store: &MemoryStore) -> axum::Router {
    let service = MetadataService::new(Arc::new(store.clone()), TableNames::default(), 2);
    create_router(Arc::new(AppState::new(service)))
}

fn seeded_store() -> MemoryStore {
    let store = MemoryStore::new();
    store.insert(vec![
        series("http_requests_total", "counter", "Total HTTP requests", "", 10),
        series("http_requests_total", "counter", "HTTP requests (old help)", "", 5),
        series("process_cpu_seconds_total", "counter", "CPU time", "seconds", 7),
        series("up", "gauge", "Target is up", "", 3),
        StoredSeries::from_labels(&[("__name__", "no_metadata")], 1),
    ]);
    store
}

async fn get(app: axum::Router, uri: &str) -> (StatusCode, Option<String>, serde_json::Value) {
    let resp = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = resp.status();
    let content_type = resp
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(String::from);
    let body = resp.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&body).unwrap();
    (status, content_type, json)
}

// ---------------------------------------------------------------
// Metadata endpoint
// ---------------------------------------------------------------

#[tokio::test]
async fn test_metadata_defaults_to_latest_entry_per_metric() {
    let (status, content_type, json) = get(test_app(&seeded_store()), "/api/v1/metadata").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type.as_deref(), Some("application/json"));
    assert_eq!(json["status"], "success");

    let data = json["data"].as_object().unwrap();
    assert_eq!(
        data.keys().map(String::as_str).collect::<Vec<_>>(),
        vec!["http_requests_total", "process_cpu_seconds_total", "up"]
    );
    assert_eq!(
        json["data"]["http_requests_total"],
        serde_json::json!([{"type": "counter", "help": "Total HTTP requests", "unit": ""}])
    );
    assert_eq!(json["data"]["process_cpu_seconds_total"][0]["unit"], "seconds");
}

#[tokio::test]
async fn test_metadata_limit_per_metric() {
    let (_, _, json) = get(
        test_app(&seeded_store()),
        "/api/v1/metadata?limit_per_metric=5",
    )
    .await;
    let entries = json["data"]["http_requests_total"].as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["help"], "Total HTTP requests");
    assert_eq!(entries[1]["help"], "HTTP requests (old help)");
}

#[tokio::test]
async fn test_metadata_metric_filter() {
    let (status, _, json) = get(test_app(&seeded_store()), "/api/v1/metadata?metric=up").await;
    assert_eq!(status, StatusCode::OK);
    let data = json["data"].as_object().unwrap();
    assert_eq!(data.len(), 1);
    assert_eq!(data["up"][0]["type"], "gauge");
}

#[tokio::test]
async fn test_metadata_unknown_metric_is_empty_success() {
    let (status, _, json) = get(
        test_app(&seeded_store()),
        "/api/v1/metadata?metric=does_not_exist",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, serde_json::json!({"status": "success", "data": {}}));
}

#[tokio::test]
async fn test_metadata_overall_limit() {
    let (_, _, json) = get(test_app(&seeded_store()), "/api/v1/metadata?limit=2").await;
    assert_eq!(json["data"].as_object().unwrap().len(), 2);
}

#[tokio::test]
async fn test_metadata_bad_limits_fall_back_to_defaults() {
    let (status, _, json) = get(
        test_app(&seeded_store()),
        "/api/v1/metadata?limit=abc&limit_per_metric=-3",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"].as_object().unwrap().len(), 3);
    assert_eq!(json["data"]["http_requests_total"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_metadata_store_unavailable_is_503() {
    let store = seeded_store();
    store.set_available(false);
    let (status, _, json) = get(test_app(&store), "/api/v1/metadata").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["statusCode"], 503);
    assert_eq!(json["error"], "Service Unavailable");
}

#[tokio::test]
async fn test_metadata_truncated_stream_is_still_valid_json() {
    let store = seeded_store();
    store.fail_reads_after(Some(1));
    let (status, _, json) = get(test_app(&store), "/api/v1/metadata").await;
    assert_eq!(status, StatusCode::OK);
    let data = json["data"].as_object().unwrap();
    assert_eq!(data.keys().collect::<Vec<_>>(), vec!["http_requests_total"]);
}

#[tokio::test]
async fn test_metadata_clustered_store_uses_distributed_table() {
    let store = MemoryStore::with_cluster("replicated");
    store.insert(vec![series("up", "gauge", "Target is up", "", 1)]);
    let (status, _, json) = get(test_app(&store), "/api/v1/metadata").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["up"][0]["help"], "Target is up");
    assert!(store.executed()[0].contains("time_series_dist"));
}

// ---------------------------------------------------------------
// ClickHouse store behind the router
// ---------------------------------------------------------------

/// An app whose ClickHouse store lives at `url`.
fn clickhouse_app(url: String) -> axum::Router {
    let config = ClickHouseConfig {
        url,
        timeout_secs: 5,
        ..ClickHouseConfig::default()
    };
    let tables = config.tables();
    let provider = ClickHouseProvider::new(config).unwrap();
    let service = MetadataService::new(Arc::new(provider), tables, 2);
    create_router(Arc::new(AppState::new(service)))
}

#[tokio::test]
async fn test_metadata_store_rejection_is_500_without_details() {
    let store = axum::Router::new().route(
        "/",
        axum::routing::post(|| async {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Code: 62. DB::Exception: Syntax error",
            )
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move { axum::serve(listener, store).await.unwrap() });

    let (status, _, json) = get(clickhouse_app(url), "/api/v1/metadata").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["statusCode"], 500);
    assert_eq!(json["message"], "Internal Server Error");
}

#[tokio::test]
async fn test_metadata_unreachable_clickhouse_is_503() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let (status, _, json) = get(clickhouse_app(url), "/api/v1/metadata").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["statusCode"], 503);
}

// ---------------------------------------------------------------
// Status endpoint
// ---------------------------------------------------------------

#[tokio::test]
async fn test_status_reports_store_kind() {
    let (status, _, json) = get(test_app(&MemoryStore::new()), "/api/status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["store"], "memory");
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
    assert!(json["rows_streamed"].is_u64());
}
