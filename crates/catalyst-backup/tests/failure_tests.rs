//! Failure behaviour of backup and restore
//!
//! Tests cover:
//! - Rejected uploads never truncate live data
//! - Pairing violations, unknown collections and malformed structures
//! - Corrupt data streams after truncation (no rollback)
//! - Backup aborts on dump and listing failures

mod common;

use catalyst_backup::{
    BackupConfig, BackupManager, Collection, DocumentStore, ErrorKind, RestoreManager,
};
use common::*;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{Cursor, Write};

async fn restore_raw(env: &Environment, archive: Cursor<Vec<u8>>) -> catalyst_backup::Error {
    RestoreManager::new(&env.documents, &env.objects)
        .restore(archive)
        .await
        .unwrap_err()
}

fn gzip(content: &str) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(content.as_bytes()).unwrap();
    encoder.finish().unwrap()
}

#[tokio::test]
async fn test_non_archive_upload_leaves_data_untouched() {
    let env = Environment::scenario().await;

    let err = restore_raw(&env, Cursor::new(b"this is not a zip archive".to_vec())).await;
    assert_eq!(err.code(), "corrupt_archive");
    assert_eq!(err.kind(), ErrorKind::BadInput);

    assert_eq!(env.documents.count(Collection::Tickets).await, 1);
}

#[tokio::test]
async fn test_zip_without_marker_is_not_a_backup() {
    let env = Environment::scenario().await;
    let err = restore_raw(&env, raw_archive(&[("notes.txt", b"hello")])).await;

    assert_eq!(err.code(), "corrupt_archive");
    assert_eq!(env.documents.count(Collection::Tickets).await, 1);
}

#[tokio::test]
async fn test_data_without_structure_is_rejected_before_truncation() {
    let env = Environment::scenario().await;
    let data = gzip("{\"_key\":\"1\"}\n");
    let err = restore_raw(
        &env,
        raw_archive(&[
            ("arango/ENCRYPTION", b"none"),
            ("arango/tickets_r.data.json.gz", &data),
        ]),
    )
    .await;

    assert_eq!(err.code(), "missing_collection_dump");
    assert!(err.to_string().contains("tickets"));
    assert_eq!(env.documents.count(Collection::Tickets).await, 1);
}

#[tokio::test]
async fn test_structure_without_data_is_rejected() {
    let env = Environment::scenario().await;
    let err = restore_raw(
        &env,
        raw_archive(&[
            ("arango/ENCRYPTION", b"none"),
            ("arango/users_r.structure.json", b"{\"parameters\":{\"name\":\"users\",\"type\":2}}"),
        ]),
    )
    .await;

    assert_eq!(err.code(), "missing_collection_dump");
    assert_eq!(err.kind(), ErrorKind::BadInput);
}

#[tokio::test]
async fn test_unknown_collection_is_rejected() {
    let env = Environment::scenario().await;
    let err = restore_raw(
        &env,
        raw_archive(&[
            ("arango/ENCRYPTION", b"none"),
            ("arango/secrets_r.structure.json", b"{}"),
            ("arango/secrets_r.data.json.gz", b""),
        ]),
    )
    .await;

    assert_eq!(err.code(), "unknown_collection");
    assert_eq!(env.documents.count(Collection::Tickets).await, 1);
}

#[tokio::test]
async fn test_malformed_structure_leaves_data_intact() {
    let env = Environment::scenario().await;
    let data = gzip("{\"_key\":\"1\"}\n");
    let err = restore_raw(
        &env,
        raw_archive(&[
            ("arango/ENCRYPTION", b"none"),
            ("arango/tickets_x.structure.json", b"{}"),
            ("arango/tickets_x.data.json.gz", &data),
        ]),
    )
    .await;

    assert_eq!(err.code(), "corrupt_data_stream");
    assert!(err.to_string().contains("arango/tickets_x.structure.json"));
    assert_eq!(env.documents.count(Collection::Tickets).await, 1);
    assert!(env
        .documents
        .document(Collection::Tickets, TEST_TICKET_KEY)
        .await
        .is_some());
}

#[tokio::test]
async fn test_corrupt_data_after_truncation_is_not_rolled_back() {
    let env = Environment::scenario().await;
    let structure = b"{\"parameters\":{\"name\":\"logs\",\"type\":2},\"indexes\":[]}";
    let err = restore_raw(
        &env,
        raw_archive(&[
            ("arango/ENCRYPTION", b"none"),
            ("arango/logs_r.structure.json", structure),
            ("arango/logs_r.data.json.gz", b"garbage, not gzip"),
        ]),
    )
    .await;

    assert_eq!(err.code(), "corrupt_data_stream");
    assert_eq!(err.kind(), ErrorKind::BadInput);

    // Truncation already happened and stays in effect.
    assert_eq!(env.documents.count(Collection::Tickets).await, 0);
}

#[tokio::test]
async fn test_empty_backup_archive_restores_to_empty_state() {
    let env = Environment::scenario().await;
    let report = restore_raw_ok(&env, raw_archive(&[("arango/ENCRYPTION", b"none")])).await;

    assert_eq!(report.collections, 0);
    assert_eq!(report.objects, 0);
    assert_eq!(env.documents.count(Collection::Tickets).await, 0);
}

async fn restore_raw_ok(
    env: &Environment,
    archive: Cursor<Vec<u8>>,
) -> catalyst_backup::RestoreReport {
    RestoreManager::new(&env.documents, &env.objects)
        .restore(archive)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_truncation_is_idempotent() {
    let env = Environment::empty();
    for _ in 0..3 {
        for collection in Collection::ALL {
            env.documents.truncate(collection).await.unwrap();
        }
    }

    let archive = env.backup().await;
    restore_raw_ok(&env, Cursor::new(archive_bytes(archive))).await;
    restore_raw_ok(&env, raw_archive(&[("arango/ENCRYPTION", b"none")])).await;
}

#[tokio::test]
async fn test_backup_aborts_on_dump_failure() {
    let env = Environment::scenario().await;
    env.documents.fail_exports(Collection::Tickets).await;

    let err = BackupManager::new(&env.documents, &env.objects, BackupConfig::default())
        .create()
        .await
        .unwrap_err();
    assert_eq!(err.code(), "store_failure");
    assert_eq!(err.kind(), ErrorKind::Internal);
}

#[tokio::test]
async fn test_backup_aborts_on_bucket_listing_failure() {
    let env = Environment::scenario().await;
    env.objects.fail_listing(TEST_BUCKET).await;

    let err = BackupManager::new(&env.documents, &env.objects, BackupConfig::default())
        .create()
        .await
        .unwrap_err();
    assert_eq!(err.code(), "store_failure");
    assert!(err.to_string().contains(TEST_BUCKET));
}
