//! Common test infrastructure for catalyst-server tests

#![allow(dead_code)]

use axum::body::{to_bytes, Body};
use axum::http::{Request, Response};
use axum::Router;
use catalyst_backup::{bytes_body, Collection, DocumentStore, MemoryDocumentStore, MemoryObjectStore, ObjectStore};
use catalyst_server::{routes, AppState, Capability, TokenAuthorizer, TokenConfig};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

pub const PREFIX: &str = "/api";
pub const ADMIN_TOKEN: &str = "admin-token";
pub const READER_TOKEN: &str = "reader-token";
pub const BOUNDARY: &str = "catalyst-test-boundary";

pub const TEST_BUCKET: &str = "catalyst-8125";
pub const TEST_OBJECT_KEY: &str = "test.txt";
pub const TEST_OBJECT_CONTENT: &str = "test text";
pub const TEST_TICKET_KEY: &str = "8125";

/// Router over in-memory stores plus handles on those stores.
pub struct Harness {
    pub documents: Arc<MemoryDocumentStore>,
    pub objects: Arc<MemoryObjectStore>,
    pub state: AppState,
}

impl Harness {
    pub fn new() -> Self {
        let documents = Arc::new(MemoryDocumentStore::default());
        let objects = Arc::new(MemoryObjectStore::new());
        let authorizer = TokenAuthorizer::new([
            TokenConfig {
                name: "admin".into(),
                token: ADMIN_TOKEN.into(),
                capabilities: vec![Capability::BackupCreate, Capability::BackupRestore],
            },
            TokenConfig {
                name: "reader".into(),
                token: READER_TOKEN.into(),
                capabilities: vec![Capability::BackupCreate],
            },
        ]);
        let state = AppState::new(documents.clone(), objects.clone(), Arc::new(authorizer));

        Self {
            documents,
            objects,
            state,
        }
    }

    /// One ticket and one object, as in a freshly seeded Catalyst.
    pub async fn scenario() -> Self {
        let harness = Self::new();
        harness
            .documents
            .insert_documents(
                Collection::Tickets,
                vec![json!({"_key": TEST_TICKET_KEY, "name": "phishing from selenafadel@von.com detected"})],
            )
            .await
            .unwrap();
        harness.objects.create_bucket(TEST_BUCKET).await.unwrap();
        harness
            .objects
            .put_object(TEST_BUCKET, TEST_OBJECT_KEY, bytes_body(TEST_OBJECT_CONTENT))
            .await
            .unwrap();
        harness
    }

    pub fn router(&self) -> Router {
        routes::router(self.state.clone(), PREFIX, 64 * 1024 * 1024)
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router().oneshot(request).await.unwrap()
    }

    pub async fn wipe(&self) {
        for collection in Collection::ALL {
            self.documents.truncate(collection).await.unwrap();
        }
        for bucket in self.objects.list_buckets().await.unwrap() {
            self.objects.delete_bucket(&bucket).await.unwrap();
        }
    }
}

pub fn create_request(token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("GET")
        .uri(format!("{}/backup/create", PREFIX));
    if let Some(token) = token {
        builder = builder.header("PRIVATE-TOKEN", token);
    }
    builder.body(Body::empty()).unwrap()
}

/// Restore request with `content` in a multipart field named `field`.
pub fn restore_request(token: &str, field: &str, content: &[u8]) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(format!("{}/backup/restore", PREFIX))
        .header("PRIVATE-TOKEN", token)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(multipart_body(field, content)))
        .unwrap()
}

pub fn multipart_body(field: &str, content: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{}\"; filename=\"backup.zip\"\r\n",
            field
        )
        .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: application/zip\r\n\r\n");
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
    body
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

pub async fn body_json(response: Response<Body>) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}
