//! Common test infrastructure for catalyst-stores tests
//!
//! Wiremock helpers that answer like an ArangoDB server or an S3 endpoint.

#![allow(dead_code)]

use catalyst_stores::{ArangoConfig, ArangoDocumentStore, S3Config, S3ObjectStore};
use serde_json::{json, Value};
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const DATABASE: &str = "catalyst";

/// Store pointed at the mock server with `root:secret` credentials.
pub fn store_for(server: &MockServer) -> ArangoDocumentStore {
    ArangoDocumentStore::new(ArangoConfig {
        url: server.uri(),
        database: DATABASE.to_string(),
        username: "root".to_string(),
        password: Some("secret".to_string()),
        ..Default::default()
    })
    .unwrap()
}

pub fn api(path_suffix: &str) -> String {
    format!("/_db/{}{}", DATABASE, path_suffix)
}

/// ArangoDB error envelope.
pub fn arango_error(code: u16, error_num: i64, message: &str) -> ResponseTemplate {
    ResponseTemplate::new(code).set_body_json(json!({
        "error": true,
        "code": code,
        "errorNum": error_num,
        "errorMessage": message,
    }))
}

pub async fn mock_properties(server: &MockServer, collection: &str, properties: Value) {
    Mock::given(method("GET"))
        .and(path(api(&format!("/_api/collection/{}/properties", collection))))
        .respond_with(ResponseTemplate::new(200).set_body_json(properties))
        .mount(server)
        .await;
}

/// Every collection exists, is empty and has only its primary index.
pub async fn mock_empty_database(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path_regex(r"^/_db/catalyst/_api/collection/[a-z]+/properties$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "error": false,
            "code": 200,
            "type": 2,
            "waitForSync": false,
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path(api("/_api/index")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "error": false,
            "code": 200,
            "indexes": [{"id": "x/0", "type": "primary", "fields": ["_key"], "unique": true, "sparse": false}],
        })))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path(api("/_api/cursor")))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "result": [],
            "hasMore": false,
        })))
        .mount(server)
        .await;
}

/// S3 store pointed at the mock server with static credentials.
pub async fn s3_store_for(server: &MockServer) -> S3ObjectStore {
    s3_store_in(server, "us-east-1").await
}

pub async fn s3_store_in(server: &MockServer, region: &str) -> S3ObjectStore {
    S3ObjectStore::new(&S3Config {
        endpoint: Some(server.uri()),
        region: region.to_string(),
        access_key: Some("minio".to_string()),
        secret_key: Some("minio-secret".to_string()),
    })
    .await
    .unwrap()
}

/// Matches the path-style URL of `bucket` itself, with or without a trailing slash.
pub fn bucket_path(bucket: &str) -> String {
    format!(r"^/{}/?$", bucket)
}

pub fn xml(body: impl Into<String>) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-type", "application/xml")
        .set_body_string(body.into())
}

/// One ListObjectsV2 page.
pub fn list_page(bucket: &str, keys: &[&str], next_token: Option<&str>) -> ResponseTemplate {
    let contents: String = keys
        .iter()
        .map(|key| format!("<Contents><Key>{}</Key><Size>1</Size></Contents>", key))
        .collect();
    let next = next_token
        .map(|token| format!("<NextContinuationToken>{}</NextContinuationToken>", token))
        .unwrap_or_default();

    xml(format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<ListBucketResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/"><Name>{}</Name><KeyCount>{}</KeyCount><IsTruncated>{}</IsTruncated>{}{}</ListBucketResult>"#,
        bucket,
        keys.len(),
        next_token.is_some(),
        next,
        contents
    ))
}
