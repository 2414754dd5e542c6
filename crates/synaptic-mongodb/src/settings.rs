use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use synaptic_core::SynapticError;

use crate::collection::DocCollection;
use crate::docstore::{MongoDocStore, DEFAULT_INSERT_BATCH_SIZE};
use crate::parent_document::{ParentDocumentConfig, DEFAULT_ID_KEY, DEFAULT_PARENT_COLLECTION};
use crate::vector_store::MongoVectorConfig;

/// The `[mongodb]` section of a Synaptic config file.
///
/// ```toml
/// [mongodb]
/// uri = "${MONGODB_URI}"
/// database = "rag"
/// collection = "document_with_chunks"
/// k = 6
/// ```
///
/// Every field is optional.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MongoSettings {
    pub uri: String,
    pub database: String,
    pub collection: String,
    pub index_name: String,
    pub text_key: String,
    pub embedding_key: String,
    pub oversampling_factor: usize,
    /// Batch size for embedded chunk inserts.
    pub insert_batch_size: usize,
    /// Batch size for doc store `mset`.
    pub docstore_batch_size: usize,
    pub ordered_inserts: bool,
    pub id_key: String,
    pub k: usize,
    pub child_metadata_fields: Option<Vec<String>>,
}

impl Default for MongoSettings {
    fn default() -> Self {
        let vector = MongoVectorConfig::new("synaptic", DEFAULT_PARENT_COLLECTION);
        let parent = ParentDocumentConfig::default();
        Self {
            uri: "mongodb://localhost:27017".to_string(),
            database: vector.database,
            collection: vector.collection,
            index_name: vector.index_name,
            text_key: vector.text_key,
            embedding_key: vector.embedding_key,
            oversampling_factor: vector.oversampling_factor,
            insert_batch_size: vector.insert_batch_size,
            docstore_batch_size: DEFAULT_INSERT_BATCH_SIZE,
            ordered_inserts: false,
            id_key: DEFAULT_ID_KEY.to_string(),
            k: parent.k,
            child_metadata_fields: None,
        }
    }
}

impl MongoSettings {
    /// Load the `[mongodb]` section from `path`, or from the discovered
    /// Synaptic config file when `path` is `None`.
    pub fn load(path: Option<&Path>) -> Result<Self, SynapticError> {
        synaptic_config::discover_section(path, "mongodb")
    }

    /// Like [`load`](Self::load) with `None`, but falls back to defaults
    /// when no config file exists. A file that exists and fails to load is
    /// still an error.
    pub fn load_or_default() -> Result<Self, SynapticError> {
        Self::from_found(synaptic_config::find_config_file().as_deref())
    }

    fn from_found(found: Option<&Path>) -> Result<Self, SynapticError> {
        match found {
            Some(path) => Self::load(Some(path)),
            None => Ok(Self::default()),
        }
    }

    /// `"database.collection"`.
    pub fn namespace(&self) -> String {
        format!("{}.{}", self.database, self.collection)
    }

    pub fn vector_config(&self) -> MongoVectorConfig {
        MongoVectorConfig::new(&self.database, &self.collection)
            .with_index_name(&self.index_name)
            .with_text_key(&self.text_key)
            .with_embedding_key(&self.embedding_key)
            .with_oversampling_factor(self.oversampling_factor)
            .with_insert_batch_size(self.insert_batch_size)
    }

    pub fn parent_config(&self) -> ParentDocumentConfig {
        let config = ParentDocumentConfig::new()
            .with_id_key(&self.id_key)
            .with_k(self.k);
        match &self.child_metadata_fields {
            Some(fields) => config.with_child_metadata_fields(fields.clone()),
            None => config,
        }
    }

    /// A [`MongoDocStore`] over `collection` with these batch and text settings.
    pub fn docstore(&self, collection: Arc<dyn DocCollection>) -> MongoDocStore {
        MongoDocStore::new(collection)
            .with_text_key(&self.text_key)
            .with_batch_size(self.docstore_batch_size)
            .with_ordered_inserts(self.ordered_inserts)
    }
}
