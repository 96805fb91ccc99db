//! Collection structure descriptors.
//!
//! A structure descriptor is the schema half of a collection dump: collection
//! parameters plus index definitions, in the `{"parameters": .., "indexes": ..}`
//! layout of ArangoDB dump files. Fields this crate does not model are kept in
//! `extra` so they survive a backup/restore cycle untouched.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::collection::Collection;

/// Index types every collection carries implicitly; they are never created on restore.
pub const IMPLICIT_INDEX_TYPES: &[&str] = &["primary", "edge"];

/// Schema and index metadata for one collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionStructure {
    pub parameters: CollectionParameters,

    #[serde(default)]
    pub indexes: Vec<IndexDefinition>,
}

/// Collection-level parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionParameters {
    pub name: String,

    /// 2 = document collection, 3 = edge collection
    #[serde(rename = "type")]
    pub collection_type: u32,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A secondary index definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDefinition {
    #[serde(rename = "type")]
    pub index_type: String,

    /// Attribute paths, or field objects for inverted indexes
    #[serde(default)]
    pub fields: Vec<Value>,

    #[serde(default)]
    pub unique: bool,

    #[serde(default)]
    pub sparse: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CollectionStructure {
    /// Bare structure for a collection with no secondary indexes.
    pub fn for_collection(collection: Collection) -> Self {
        Self {
            parameters: CollectionParameters {
                name: collection.name().to_string(),
                collection_type: collection.kind().type_id(),
                extra: Map::new(),
            },
            indexes: Vec::new(),
        }
    }

    pub fn with_index(mut self, index: IndexDefinition) -> Self {
        self.indexes.push(index);
        self
    }

    /// Indexes that must be created explicitly when the structure is applied.
    pub fn secondary_indexes(&self) -> impl Iterator<Item = &IndexDefinition> {
        self.indexes.iter().filter(|index| !index.is_implicit())
    }

    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec_pretty(self)
    }

    pub fn from_json(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}

impl IndexDefinition {
    pub fn new(index_type: impl Into<String>, fields: Vec<String>) -> Self {
        Self {
            index_type: index_type.into(),
            fields: fields.into_iter().map(Value::String).collect(),
            unique: false,
            sparse: false,
            name: None,
            extra: Map::new(),
        }
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn is_implicit(&self) -> bool {
        IMPLICIT_INDEX_TYPES.contains(&self.index_type.as_str())
    }
}
