//! ArangoDB document store over the HTTP API.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use catalyst_backup::{
    Collection, CollectionStructure, DocumentBatch, DocumentStore, IndexDefinition,
};
use catalyst_backup::structure::CollectionParameters;
use reqwest::{Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::{debug, info};

const USER_AGENT: &str = concat!("catalyst-backup/", env!("CARGO_PKG_VERSION"));

/// Collection properties accepted when a collection is recreated.
const CREATE_PARAMETERS: &[&str] = &[
    "waitForSync",
    "keyOptions",
    "schema",
    "computedValues",
    "cacheEnabled",
    "numberOfShards",
    "shardKeys",
    "replicationFactor",
    "writeConcern",
];

/// Index attributes assigned by the server, never sent back on creation.
const SERVER_INDEX_ATTRIBUTES: &[&str] = &["id", "selectivityEstimate", "figures", "isNewlyCreated"];

/// Properties response fields that are not collection parameters.
const RESPONSE_ENVELOPE: &[&str] = &["error", "code", "name", "type"];

/// Connection settings for an ArangoDB database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArangoConfig {
    /// Base URL of the coordinator or single server
    pub url: String,

    pub database: String,

    pub username: String,

    pub password: Option<String>,

    /// Whether the server runs with encryption at rest
    pub encryption_at_rest: bool,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for ArangoConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8529".to_string(),
            database: "catalyst".to_string(),
            username: "root".to_string(),
            password: None,
            encryption_at_rest: false,
            timeout_secs: 300,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CursorResponse {
    #[serde(default)]
    result: Vec<Value>,

    #[serde(default, rename = "hasMore")]
    has_more: bool,

    #[serde(default)]
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IndexListResponse {
    #[serde(default)]
    indexes: Vec<IndexDefinition>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(rename = "errorMessage")]
    error_message: String,

    #[serde(default, rename = "errorNum")]
    error_num: i64,
}

/// Document store backed by an ArangoDB database.
pub struct ArangoDocumentStore {
    client: reqwest::Client,
    config: ArangoConfig,
}

impl ArangoDocumentStore {
    pub fn new(config: ArangoConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { client, config })
    }

    /// Checks that the database is reachable with the configured credentials.
    pub async fn ping(&self) -> Result<String> {
        let response = self
            .request(reqwest::Method::GET, "/_api/version")
            .send()
            .await
            .with_context(|| format!("Failed to reach ArangoDB at {}", self.config.url))?;
        let version: Value = check(response, "version").await?.json().await?;
        let version = version["version"].as_str().unwrap_or("unknown").to_string();
        info!("Connected to ArangoDB {} ({})", version, self.config.database);
        Ok(version)
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/_db/{}{}",
            self.config.url.trim_end_matches('/'),
            self.config.database,
            path
        )
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, self.url(path))
            .basic_auth(&self.config.username, self.config.password.as_ref())
    }

    async fn properties(&self, collection: Collection) -> Result<Option<Map<String, Value>>> {
        let response = self
            .request(
                reqwest::Method::GET,
                &format!("/_api/collection/{}/properties", collection),
            )
            .send()
            .await
            .with_context(|| format!("Failed to read properties of {}", collection))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let properties = check(response, "collection properties").await?.json().await?;
        Ok(Some(properties))
    }

    async fn indexes(&self, collection: Collection) -> Result<Vec<IndexDefinition>> {
        let response = self
            .request(reqwest::Method::GET, "/_api/index")
            .query(&[("collection", collection.name())])
            .send()
            .await
            .with_context(|| format!("Failed to list indexes of {}", collection))?;

        let list: IndexListResponse = check(response, "index listing").await?.json().await?;
        Ok(list.indexes)
    }

    async fn create_collection(
        &self,
        collection: Collection,
        structure: &CollectionStructure,
    ) -> Result<()> {
        let mut body = creation_parameters(&structure.parameters);
        body.insert("name".into(), Value::from(collection.name()));
        body.insert("type".into(), Value::from(structure.parameters.collection_type));

        let response = self
            .request(reqwest::Method::POST, "/_api/collection")
            .json(&body)
            .send()
            .await
            .with_context(|| format!("Failed to create collection {}", collection))?;
        check(response, "collection creation").await?;

        info!("Created collection {}", collection);
        Ok(())
    }

    async fn ensure_index(&self, collection: Collection, index: &IndexDefinition) -> Result<()> {
        let response = self
            .request(reqwest::Method::POST, "/_api/index")
            .query(&[("collection", collection.name())])
            .json(&index_body(index))
            .send()
            .await
            .with_context(|| format!("Failed to create index on {}", collection))?;
        check(response, "index creation").await?;

        debug!(
            "Ensured {} index on {} {:?}",
            index.index_type, collection, index.fields
        );
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for ArangoDocumentStore {
    fn database_name(&self) -> &str {
        &self.config.database
    }

    fn encryption_at_rest(&self) -> bool {
        self.config.encryption_at_rest
    }

    async fn structure(&self, collection: Collection) -> Result<CollectionStructure> {
        let properties = self
            .properties(collection)
            .await?
            .ok_or_else(|| anyhow!("collection {} not found", collection))?;

        Ok(CollectionStructure {
            parameters: parameters_from_properties(collection, properties),
            indexes: self.indexes(collection).await?,
        })
    }

    async fn export_batch(
        &self,
        collection: Collection,
        cursor: Option<String>,
        batch_size: usize,
    ) -> Result<DocumentBatch> {
        let response = match cursor {
            None => self
                .request(reqwest::Method::POST, "/_api/cursor")
                .json(&json!({
                    "query": "FOR d IN @@collection SORT d._key RETURN d",
                    "bindVars": {"@collection": collection.name()},
                    "batchSize": batch_size.max(1),
                }))
                .send()
                .await,
            Some(id) => self
                .request(reqwest::Method::PUT, &format!("/_api/cursor/{}", id))
                .send()
                .await,
        }
        .with_context(|| format!("Failed to export {}", collection))?;

        let page: CursorResponse = check(response, "cursor").await?.json().await?;
        let cursor = match (page.has_more, page.id) {
            (true, Some(id)) => Some(id),
            (true, None) => bail!("cursor on {} has more results but no id", collection),
            (false, _) => None,
        };

        Ok(DocumentBatch {
            documents: page.result,
            cursor,
        })
    }

    async fn discard_cursor(&self, cursor: &str) -> Result<()> {
        let response = self
            .request(reqwest::Method::DELETE, &format!("/_api/cursor/{}", cursor))
            .send()
            .await
            .with_context(|| format!("Failed to delete cursor {}", cursor))?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!("Cursor {} already expired", cursor);
            return Ok(());
        }
        check(response, "cursor deletion").await?;
        Ok(())
    }

    async fn truncate(&self, collection: Collection) -> Result<()> {
        let response = self
            .request(
                reqwest::Method::PUT,
                &format!("/_api/collection/{}/truncate", collection),
            )
            .send()
            .await
            .with_context(|| format!("Failed to truncate {}", collection))?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!("Collection {} does not exist, nothing to truncate", collection);
            return Ok(());
        }
        check(response, "truncate").await?;
        Ok(())
    }

    async fn apply_structure(
        &self,
        collection: Collection,
        structure: &CollectionStructure,
    ) -> Result<()> {
        if structure.parameters.name != collection.name() {
            bail!(
                "structure for {} cannot be applied to {}",
                structure.parameters.name,
                collection
            );
        }

        if self.properties(collection).await?.is_none() {
            self.create_collection(collection, structure).await?;
        }
        for index in structure.secondary_indexes() {
            self.ensure_index(collection, index).await?;
        }
        Ok(())
    }

    async fn insert_documents(
        &self,
        collection: Collection,
        documents: Vec<Value>,
    ) -> Result<usize> {
        if documents.is_empty() {
            return Ok(0);
        }

        let response = self
            .request(
                reqwest::Method::POST,
                &format!("/_api/document/{}", collection),
            )
            .query(&[("overwriteMode", "replace")])
            .json(&documents)
            .send()
            .await
            .with_context(|| format!("Failed to insert into {}", collection))?;

        let results: Vec<Value> = check(response, "document insert").await?.json().await?;
        let failures: Vec<&Value> = results
            .iter()
            .filter(|result| result["error"].as_bool() == Some(true))
            .collect();
        if let Some(first) = failures.first() {
            bail!(
                "{} of {} documents rejected by {}: {}",
                failures.len(),
                results.len(),
                collection,
                first["errorMessage"].as_str().unwrap_or("unknown error")
            );
        }

        Ok(results.len())
    }
}

impl std::fmt::Debug for ArangoDocumentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArangoDocumentStore")
            .field("url", &self.config.url)
            .field("database", &self.config.database)
            .finish_non_exhaustive()
    }
}

async fn check(response: Response, operation: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    match serde_json::from_str::<ErrorBody>(&body) {
        Ok(error) => Err(anyhow!(
            "ArangoDB {} failed ({}): {} [{}]",
            operation,
            status,
            error.error_message,
            error.error_num
        )),
        Err(_) => Err(anyhow!("ArangoDB {} failed ({}): {}", operation, status, body)),
    }
}

fn parameters_from_properties(
    collection: Collection,
    mut properties: Map<String, Value>,
) -> CollectionParameters {
    let collection_type = properties
        .get("type")
        .and_then(Value::as_u64)
        .map(|t| t as u32)
        .unwrap_or_else(|| collection.kind().type_id());
    properties.retain(|key, _| !RESPONSE_ENVELOPE.contains(&key.as_str()));

    CollectionParameters {
        name: collection.name().to_string(),
        collection_type,
        extra: properties,
    }
}

fn creation_parameters(parameters: &CollectionParameters) -> Map<String, Value> {
    parameters
        .extra
        .iter()
        .filter(|(key, _)| CREATE_PARAMETERS.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

fn index_body(index: &IndexDefinition) -> IndexDefinition {
    let mut index = index.clone();
    index
        .extra
        .retain(|key, _| !SERVER_INDEX_ATTRIBUTES.contains(&key.as_str()));
    index
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ArangoConfig::default();
        assert_eq!(config.url, "http://localhost:8529");
        assert_eq!(config.database, "catalyst");
        assert!(!config.encryption_at_rest);
    }

    #[test]
    fn test_url_joins_database_path() {
        let store = ArangoDocumentStore::new(ArangoConfig {
            url: "http://arango:8529/".into(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(
            store.url("/_api/cursor"),
            "http://arango:8529/_db/catalyst/_api/cursor"
        );
    }

    #[test]
    fn test_properties_drop_response_envelope() {
        let properties = json!({
            "error": false,
            "code": 200,
            "name": "tickets",
            "type": 2,
            "waitForSync": true,
            "globallyUniqueId": "h1/123",
        });
        let parameters = parameters_from_properties(
            Collection::Tickets,
            properties.as_object().cloned().unwrap(),
        );
        assert_eq!(parameters.collection_type, 2);
        assert!(parameters.extra.contains_key("waitForSync"));
        assert!(!parameters.extra.contains_key("error"));
        assert!(!parameters.extra.contains_key("name"));

        let create = creation_parameters(&parameters);
        assert!(create.contains_key("waitForSync"));
        assert!(!create.contains_key("globallyUniqueId"));
    }

    #[test]
    fn test_index_body_strips_server_attributes() {
        let mut index = IndexDefinition::new("persistent", vec!["name".into()]).unique();
        index.extra.insert("id".into(), json!("tickets/42"));
        index.extra.insert("deduplicate".into(), json!(true));

        let body = serde_json::to_value(index_body(&index)).unwrap();
        assert_eq!(body["type"], "persistent");
        assert_eq!(body["unique"], true);
        assert_eq!(body["deduplicate"], true);
        assert!(body.get("id").is_none());
    }
}
