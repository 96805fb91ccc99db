//! Production store adapters for Catalyst backup and restore.
//!
//! - [`ArangoDocumentStore`]: the document database over ArangoDB's HTTP API
//! - [`S3ObjectStore`]: object storage over S3 (AWS or MinIO)

pub mod arango;
pub mod s3;

pub use arango::{ArangoConfig, ArangoDocumentStore};
pub use s3::{S3Config, S3ObjectStore};
