use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bson::{doc, Document as Record};
use futures::{stream, StreamExt, TryStreamExt};
use synaptic_core::{DocStore, Document, KeyStream, SynapticError};

use crate::collection::{connect, parse_namespace, DocCollection};
use crate::convert::{document_to_record, id_to_string, record_to_document};

/// Default number of records sent per `insert_many` call.
pub const DEFAULT_INSERT_BATCH_SIZE: usize = 100_000;

/// Default field holding a document's text.
pub const DEFAULT_DOCSTORE_TEXT_KEY: &str = "page_content";

/// Key-value [`DocStore`] backed by a MongoDB collection.
///
/// Each document is stored as one record `{ _id: key, <text_key>: content,
/// ...metadata }` with metadata flattened into the top level.
///
/// Writes never overwrite: storing a key that already exists fails that
/// record and the call returns [`SynapticError::Store`]. Inserts are
/// unordered by default, so the other records of a failing batch are still
/// written; use [`with_ordered_inserts`](Self::with_ordered_inserts) to stop
/// at the first conflict instead.
///
/// # Example
///
/// ```rust,no_run
/// use synaptic_mongodb::{DocStore, Document, MongoDocStore};
///
/// # async fn example() -> Result<(), synaptic_core::SynapticError> {
/// let store = MongoDocStore::from_connection_string("mongodb://localhost:27017", "rag.parents").await?;
/// store
///     .mset(vec![("intro".to_string(), Document::new("intro", "Hello"))])
///     .await?;
/// let docs = store.mget(&["intro", "missing"]).await?;
/// assert!(docs[1].is_none());
/// # Ok(())
/// # }
/// ```
pub struct MongoDocStore {
    collection: Arc<dyn DocCollection>,
    text_key: String,
    batch_size: usize,
    ordered_inserts: bool,
}

impl MongoDocStore {
    /// Create a store over an existing collection handle.
    pub fn new(collection: Arc<dyn DocCollection>) -> Self {
        Self {
            collection,
            text_key: DEFAULT_DOCSTORE_TEXT_KEY.to_string(),
            batch_size: DEFAULT_INSERT_BATCH_SIZE,
            ordered_inserts: false,
        }
    }

    /// Connect to `connection_string` and use the `"database.collection"`
    /// namespace.
    pub async fn from_connection_string(
        connection_string: &str,
        namespace: &str,
    ) -> Result<Self, SynapticError> {
        let (db_name, collection_name) = parse_namespace(namespace)?;
        let client = connect(connection_string).await?;
        let collection = client
            .database(db_name)
            .collection::<Record>(collection_name);
        Ok(Self::new(Arc::new(collection)))
    }

    /// Field holding the document text (default `"page_content"`).
    pub fn with_text_key(mut self, text_key: impl Into<String>) -> Self {
        self.text_key = text_key.into();
        self
    }

    /// Records per `insert_many` call used by [`DocStore::mset`].
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Stop each batch at its first failing record instead of inserting the
    /// rest.
    pub fn with_ordered_inserts(mut self, ordered: bool) -> Self {
        self.ordered_inserts = ordered;
        self
    }

    pub fn collection(&self) -> &Arc<dyn DocCollection> {
        &self.collection
    }

    pub fn text_key(&self) -> &str {
        &self.text_key
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Store documents, sending `batch_size` records per insert.
    ///
    /// Batches go out sequentially. The first failing batch returns its
    /// error; later batches are not attempted and earlier ones stay written.
    pub async fn mset_with_batch_size(
        &self,
        pairs: Vec<(String, Document)>,
        batch_size: usize,
    ) -> Result<(), SynapticError> {
        if batch_size == 0 {
            return Err(SynapticError::Validation(
                "batch_size must be greater than zero".to_string(),
            ));
        }
        if pairs.is_empty() {
            return Ok(());
        }

        let total = pairs.len();
        let mut pairs = pairs.into_iter().peekable();
        let mut batch_no = 0usize;
        while pairs.peek().is_some() {
            let records = pairs
                .by_ref()
                .take(batch_size)
                .map(|(key, doc)| document_to_record(&key, &doc, &self.text_key))
                .collect::<Result<Vec<Record>, SynapticError>>()?;
            let size = records.len();

            tracing::debug!(
                collection = self.collection.name(),
                batch = batch_no,
                size,
                total,
                "inserting document batch"
            );
            if let Err(e) = self
                .collection
                .insert_many(records, self.ordered_inserts)
                .await
            {
                tracing::warn!(
                    collection = self.collection.name(),
                    batch = batch_no,
                    size,
                    error = %e,
                    "document batch insert failed, skipping remaining batches"
                );
                return Err(e);
            }
            batch_no += 1;
        }
        Ok(())
    }
}

#[async_trait]
impl DocStore for MongoDocStore {
    async fn mget(&self, keys: &[&str]) -> Result<Vec<Option<Document>>, SynapticError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let filter = doc! { "_id": { "$in": keys.to_vec() } };
        let mut found: HashMap<String, Document> = HashMap::new();
        let mut cursor = self.collection.find(filter, None).await?;
        while let Some(record) = cursor.try_next().await? {
            let doc = record_to_document(record, &self.text_key)?;
            found.insert(doc.id.clone(), doc);
        }

        Ok(keys.iter().map(|key| found.get(*key).cloned()).collect())
    }

    async fn mset(&self, pairs: Vec<(String, Document)>) -> Result<(), SynapticError> {
        self.mset_with_batch_size(pairs, self.batch_size).await
    }

    async fn mdelete(&self, keys: &[&str]) -> Result<(), SynapticError> {
        if keys.is_empty() {
            return Ok(());
        }
        let deleted = self
            .collection
            .delete_many(doc! { "_id": { "$in": keys.to_vec() } })
            .await?;
        tracing::debug!(
            collection = self.collection.name(),
            requested = keys.len(),
            deleted,
            "deleted documents"
        );
        Ok(())
    }

    fn yield_keys<'a>(&'a self, prefix: Option<&'a str>) -> KeyStream<'a> {
        let filter = match prefix {
            Some(p) => doc! { "_id": { "$regex": format!("^{}", regex::escape(p)) } },
            None => doc! {},
        };
        stream::once(async move {
            self.collection
                .find(filter, Some(doc! { "_id": 1 }))
                .await
        })
        .try_flatten()
        .map_ok(|record| record.get("_id").map(id_to_string).unwrap_or_default())
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryCollection;

    #[tokio::test]
    async fn zero_batch_size_is_rejected() {
        let store = MongoDocStore::new(Arc::new(InMemoryCollection::new("c")));
        let err = store
            .mset_with_batch_size(vec![("a".into(), Document::new("a", "x"))], 0)
            .await
            .unwrap_err();
        assert!(matches!(err, SynapticError::Validation(_)));
    }

    #[tokio::test]
    async fn empty_mset_issues_no_inserts() {
        let coll = Arc::new(InMemoryCollection::new("c"));
        let store = MongoDocStore::new(coll.clone());
        store.mset(Vec::new()).await.unwrap();
        assert!(coll.insert_batches().await.is_empty());
    }
}
