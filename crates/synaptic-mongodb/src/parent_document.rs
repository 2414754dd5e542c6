use std::sync::Arc;

use async_trait::async_trait;
use bson::{doc, Document as Record};
use serde_json::Value;
use synaptic_core::{
    DocStore, Document, Embeddings, Retriever, SynapticError, TextSplitter, VectorStore,
};

use crate::collection::{connect, DocCollection};
use crate::convert::record_to_document;
use crate::docstore::MongoDocStore;
use crate::vector_store::{vector_search_stage, MongoVectorConfig, MongoVectorStore};

/// Default collection holding parents and their chunks together.
pub const DEFAULT_PARENT_COLLECTION: &str = "document_with_chunks";

/// Default field linking a chunk to its parent's `_id`.
pub const DEFAULT_ID_KEY: &str = "doc_id";

/// Configuration for [`MongoParentDocumentRetriever`].
#[derive(Debug, Clone)]
pub struct ParentDocumentConfig {
    /// Field on chunk records holding the parent `_id` (default `"doc_id"`).
    /// Records without it are parents.
    pub id_key: String,
    /// Parents returned when `retrieve` is called with `top_k = 0`.
    pub k: usize,
    /// Parent metadata keys copied onto chunks. `None` copies everything.
    pub child_metadata_fields: Option<Vec<String>>,
}

impl Default for ParentDocumentConfig {
    fn default() -> Self {
        Self {
            id_key: DEFAULT_ID_KEY.to_string(),
            k: 4,
            child_metadata_fields: None,
        }
    }
}

impl ParentDocumentConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id_key(mut self, id_key: impl Into<String>) -> Self {
        self.id_key = id_key.into();
        self
    }

    pub fn with_k(mut self, k: usize) -> Self {
        self.k = k;
        self
    }

    pub fn with_child_metadata_fields(mut self, fields: Vec<String>) -> Self {
        self.child_metadata_fields = Some(fields);
        self
    }
}

/// Searches small chunks and returns the parent documents they came from.
///
/// Parents and chunks live in the same collection. A chunk carries the
/// parent's `_id` in `id_key` plus an embedding; a parent has neither. One
/// aggregation does the whole retrieval: vector search over chunks, a
/// self-`$lookup` of each chunk's parent, then dedup by parent `_id` keeping
/// the best-ranked occurrence.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use synaptic_core::{Retriever, TextSplitter};
/// use synaptic_embeddings::FakeEmbeddings;
/// use synaptic_mongodb::{MongoParentDocumentRetriever, MongoVectorConfig, ParentDocumentConfig};
///
/// # async fn example(splitter: Arc<dyn TextSplitter>) -> Result<(), synaptic_core::SynapticError> {
/// let retriever = MongoParentDocumentRetriever::from_connection_string(
///     "mongodb+srv://...",
///     MongoVectorConfig::new("rag", "document_with_chunks"),
///     Arc::new(FakeEmbeddings::default()),
///     splitter,
///     ParentDocumentConfig::new(),
/// )
/// .await?;
/// let parents = retriever.retrieve("how do I rotate keys?", 0).await?;
/// # Ok(())
/// # }
/// ```
pub struct MongoParentDocumentRetriever {
    vector_store: MongoVectorStore,
    docstore: MongoDocStore,
    embeddings: Arc<dyn Embeddings>,
    child_splitter: Arc<dyn TextSplitter>,
    parent_splitter: Option<Arc<dyn TextSplitter>>,
    config: ParentDocumentConfig,
}

impl MongoParentDocumentRetriever {
    /// Build a retriever whose vector store and doc store share `collection`.
    ///
    /// Parents are written with the vector store's text field so both kinds
    /// of record read back the same way.
    pub fn new(
        collection: Arc<dyn DocCollection>,
        vector_config: MongoVectorConfig,
        embeddings: Arc<dyn Embeddings>,
        child_splitter: Arc<dyn TextSplitter>,
        config: ParentDocumentConfig,
    ) -> Self {
        let docstore =
            MongoDocStore::new(collection.clone()).with_text_key(vector_config.text_key.clone());
        let vector_store = MongoVectorStore::new(collection, vector_config);
        Self {
            vector_store,
            docstore,
            embeddings,
            child_splitter,
            parent_splitter: None,
            config,
        }
    }

    /// Connect, build the retriever over `vector_config`'s collection and
    /// [`initialize`](Self::initialize) it.
    pub async fn from_connection_string(
        connection_string: &str,
        vector_config: MongoVectorConfig,
        embeddings: Arc<dyn Embeddings>,
        child_splitter: Arc<dyn TextSplitter>,
        config: ParentDocumentConfig,
    ) -> Result<Self, SynapticError> {
        let client = connect(connection_string).await?;
        let collection = client
            .database(&vector_config.database)
            .collection::<Record>(&vector_config.collection);
        let retriever = Self::new(
            Arc::new(collection),
            vector_config,
            embeddings,
            child_splitter,
            config,
        );
        retriever.initialize().await?;
        Ok(retriever)
    }

    /// Split parents with `splitter` before chunking them.
    pub fn with_parent_splitter(mut self, splitter: Arc<dyn TextSplitter>) -> Self {
        self.parent_splitter = Some(splitter);
        self
    }

    /// Create the ascending index on `id_key` used by the parent lookup.
    pub async fn initialize(&self) -> Result<(), SynapticError> {
        let mut keys = Record::new();
        keys.insert(self.config.id_key.as_str(), 1);
        tracing::debug!(
            collection = self.vector_store.collection().name(),
            id_key = %self.config.id_key,
            "creating parent id index"
        );
        self.vector_store.collection().create_index(keys).await
    }

    pub fn vector_store(&self) -> &MongoVectorStore {
        &self.vector_store
    }

    pub fn docstore(&self) -> &MongoDocStore {
        &self.docstore
    }

    pub fn config(&self) -> &ParentDocumentConfig {
        &self.config
    }

    /// The aggregation pipeline `retrieve` runs for `query_vector`.
    pub fn build_pipeline(&self, query_vector: &[f32], k: usize) -> Vec<Record> {
        let vector_config = self.vector_store.config();
        let id_key = self.config.id_key.as_str();
        let collection = self.vector_store.collection().name();

        let mut exclude_embedding = Record::new();
        exclude_embedding.insert(vector_config.embedding_key.as_str(), 0);

        let mut parents_only = Record::new();
        parents_only.insert(id_key, doc! { "$exists": false });

        vec![
            vector_search_stage(
                query_vector,
                &vector_config.embedding_key,
                &vector_config.index_name,
                k,
                vector_config.oversampling_factor,
                vector_config.pre_filter.as_ref(),
            ),
            doc! { "$set": { "score": { "$meta": "vectorSearchScore" } } },
            doc! { "$project": exclude_embedding },
            doc! {
                "$lookup": {
                    "from": collection,
                    "localField": id_key,
                    "foreignField": "_id",
                    "as": "parent_context",
                    "pipeline": [{ "$match": parents_only }],
                }
            },
            doc! { "$unwind": "$parent_context" },
            doc! {
                "$group": {
                    "_id": "$parent_context._id",
                    "uniqueDocument": { "$first": "$parent_context" },
                    "score": { "$first": "$score" },
                }
            },
            // $group output is unordered; restore best-child rank.
            doc! { "$sort": { "score": -1, "_id": 1 } },
            doc! { "$replaceRoot": { "newRoot": "$uniqueDocument" } },
        ]
    }

    /// Store parents and index their chunks.
    ///
    /// Each parent (after the optional parent splitter) gets its own id or a
    /// fresh UUID, is split into chunks stamped with `id_key`, and the chunks
    /// are embedded into the vector store before the parents are written to
    /// the doc store. Returns the parent ids.
    pub async fn add_documents(&self, docs: Vec<Document>) -> Result<Vec<String>, SynapticError> {
        let parents = match &self.parent_splitter {
            Some(splitter) => splitter.split_documents(&docs),
            None => docs,
        };
        let id_key = self.config.id_key.as_str();

        let mut ids = Vec::with_capacity(parents.len());
        let mut pairs = Vec::with_capacity(parents.len());
        let mut children = Vec::new();
        for mut parent in parents {
            if parent.id.is_empty() {
                parent.id = uuid::Uuid::new_v4().to_string();
            }
            // A parent must never carry the link field or it would read as a chunk.
            parent.metadata.remove(id_key);

            let mut chunks = self
                .child_splitter
                .split_documents(std::slice::from_ref(&parent));
            for chunk in &mut chunks {
                if let Some(fields) = &self.config.child_metadata_fields {
                    chunk.metadata.retain(|key, _| fields.contains(key));
                }
                chunk
                    .metadata
                    .insert(id_key.to_string(), Value::String(parent.id.clone()));
            }
            children.extend(chunks);

            ids.push(parent.id.clone());
            pairs.push((parent.id.clone(), parent));
        }

        tracing::debug!(
            parents = pairs.len(),
            chunks = children.len(),
            "adding parent documents"
        );
        if !children.is_empty() {
            self.vector_store
                .add_documents(children, self.embeddings.as_ref())
                .await?;
        }
        self.docstore.mset(pairs).await?;
        Ok(ids)
    }
}

#[async_trait]
impl Retriever for MongoParentDocumentRetriever {
    async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<Document>, SynapticError> {
        let k = if top_k == 0 { self.config.k } else { top_k };
        if k == 0 {
            return Ok(Vec::new());
        }

        let query_vector = self.embeddings.embed_query(query).await?;
        let pipeline = self.build_pipeline(&query_vector, k);
        tracing::debug!(
            collection = self.vector_store.collection().name(),
            k,
            "retrieving parent documents"
        );

        let text_key = self.vector_store.config().text_key.as_str();
        self.vector_store
            .collection()
            .aggregate(pipeline)
            .await?
            .into_iter()
            .map(|record| record_to_document(record, text_key))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config = ParentDocumentConfig::new();
        assert_eq!(config.id_key, "doc_id");
        assert_eq!(config.k, 4);
        assert!(config.child_metadata_fields.is_none());
    }
}
