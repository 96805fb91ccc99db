//! HTTP surface tests driving the router with `oneshot`
//!
//! Tests cover:
//! - Capability checks on both routes
//! - Archive download headers and content
//! - Restore over multipart, including malformed uploads
//! - The single-operation gate

mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use catalyst_backup::{ArchiveReader, Collection};
use common::*;
use std::io::Cursor;

#[tokio::test]
async fn test_create_requires_token() {
    let harness = Harness::new();
    let response = harness.send(create_request(None)).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["kind"], "unauthorized");
}

#[tokio::test]
async fn test_restore_requires_restore_capability() {
    let harness = Harness::scenario().await;
    let response = harness
        .send(restore_request(READER_TOKEN, "backup", b"irrelevant"))
        .await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(harness.documents.count(Collection::Tickets).await, 1);
}

#[tokio::test]
async fn test_create_serves_zip_archive() {
    let harness = Harness::scenario().await;
    let response = harness.send(create_request(Some(READER_TOKEN))).await;

    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers().clone();
    assert_eq!(headers[header::CONTENT_TYPE], "application/zip");
    assert_eq!(
        headers[header::CONTENT_DISPOSITION],
        "attachment; filename=\"backup.zip\""
    );

    let bytes = body_bytes(response).await;
    assert_eq!(
        headers[header::CONTENT_LENGTH].to_str().unwrap(),
        bytes.len().to_string()
    );

    let reader = ArchiveReader::open(Cursor::new(bytes)).unwrap();
    assert!(reader.contains("arango/ENCRYPTION"));
    assert!(reader.contains("minio/catalyst-8125/test.txt"));
    assert!(reader
        .collection_entries(Collection::Tickets)
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn test_bearer_token_is_accepted() {
    let harness = Harness::new();
    let request = Request::builder()
        .uri("/api/backup/create")
        .header("authorization", format!("Bearer {}", ADMIN_TOKEN))
        .body(Body::empty())
        .unwrap();

    assert_eq!(harness.send(request).await.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_routes_live_under_prefix() {
    let harness = Harness::new();
    let request = Request::builder()
        .uri("/backup/create")
        .header("PRIVATE-TOKEN", ADMIN_TOKEN)
        .body(Body::empty())
        .unwrap();

    assert_eq!(harness.send(request).await.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_backup_then_restore_over_http() {
    let harness = Harness::scenario().await;
    let archive = body_bytes(harness.send(create_request(Some(ADMIN_TOKEN))).await).await;

    harness.wipe().await;
    assert_eq!(harness.documents.count(Collection::Tickets).await, 0);

    let response = harness
        .send(restore_request(ADMIN_TOKEN, "backup", &archive))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let report = body_json(response).await;
    assert_eq!(report["collections"], 11);
    assert_eq!(report["documents"], 1);
    assert_eq!(report["objects"], 1);
    assert_eq!(report["bucketsCreated"], 1);
    assert_eq!(report["sourceEncryption"], "none");

    let ticket = harness
        .documents
        .document(Collection::Tickets, TEST_TICKET_KEY)
        .await
        .unwrap();
    assert_eq!(ticket["_key"], TEST_TICKET_KEY);
    assert_eq!(
        harness
            .objects
            .object(TEST_BUCKET, TEST_OBJECT_KEY)
            .await
            .unwrap()
            .as_ref(),
        TEST_OBJECT_CONTENT.as_bytes()
    );
}

#[tokio::test]
async fn test_restore_rejects_non_archive() {
    let harness = Harness::scenario().await;
    let response = harness
        .send(restore_request(ADMIN_TOKEN, "backup", b"definitely not a zip"))
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["kind"], "corrupt_archive");
    assert!(body["error"].as_str().unwrap().starts_with("Corrupt archive"));
    assert_eq!(harness.documents.count(Collection::Tickets).await, 1);
}

#[tokio::test]
async fn test_restore_requires_backup_field() {
    let harness = Harness::scenario().await;
    let response = harness
        .send(restore_request(ADMIN_TOKEN, "file", b"PK"))
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["kind"], "invalid_upload");
    assert!(body["error"].as_str().unwrap().contains("backup"));
}

#[tokio::test]
async fn test_restore_requires_multipart_body() {
    let harness = Harness::new();
    let request = Request::builder()
        .method("POST")
        .uri("/api/backup/restore")
        .header("PRIVATE-TOKEN", ADMIN_TOKEN)
        .header("content-type", "application/zip")
        .body(Body::from("PK"))
        .unwrap();

    let response = harness.send(request).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["kind"], "invalid_upload");
}

#[tokio::test]
async fn test_concurrent_operation_is_refused() {
    let harness = Harness::scenario().await;
    let guard = harness.state.try_begin().unwrap();

    let response = harness.send(create_request(Some(ADMIN_TOKEN))).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(response).await["kind"], "busy");

    drop(guard);
    let response = harness.send(create_request(Some(ADMIN_TOKEN))).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_store_failure_is_internal_error() {
    let harness = Harness::scenario().await;
    harness.objects.fail_listing(TEST_BUCKET).await;

    let response = harness.send(create_request(Some(ADMIN_TOKEN))).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_json(response).await["kind"], "store_failure");
}
