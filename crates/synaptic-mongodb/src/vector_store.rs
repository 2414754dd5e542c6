use std::sync::Arc;

use async_trait::async_trait;
use bson::{doc, Bson, Document as Record};
use synaptic_core::{Document, Embeddings, SynapticError, VectorStore};

use crate::collection::{connect, DocCollection};
use crate::convert::{document_to_record, record_to_document};

/// Field the `$set` stage writes the search score to.
const SCORE_FIELD: &str = "score";

/// Configuration for [`MongoVectorStore`].
#[derive(Debug, Clone)]
pub struct MongoVectorConfig {
    /// Database name.
    pub database: String,
    /// Collection name.
    pub collection: String,
    /// Name of the Atlas Vector Search index (default `"vector_index"`).
    pub index_name: String,
    /// Field holding document text (default `"text"`).
    pub text_key: String,
    /// Field holding the embedding vector (default `"embedding"`).
    pub embedding_key: String,
    /// `numCandidates = k * oversampling_factor` (default `10`).
    pub oversampling_factor: usize,
    /// Optional MQL filter applied inside `$vectorSearch`.
    pub pre_filter: Option<Record>,
    /// Records per `insert_many` call in `add_documents` (default `100`).
    pub insert_batch_size: usize,
}

impl MongoVectorConfig {
    pub fn new(database: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            collection: collection.into(),
            index_name: "vector_index".to_string(),
            text_key: "text".to_string(),
            embedding_key: "embedding".to_string(),
            oversampling_factor: 10,
            pre_filter: None,
            insert_batch_size: 100,
        }
    }

    pub fn with_index_name(mut self, index_name: impl Into<String>) -> Self {
        self.index_name = index_name.into();
        self
    }

    pub fn with_text_key(mut self, text_key: impl Into<String>) -> Self {
        self.text_key = text_key.into();
        self
    }

    pub fn with_embedding_key(mut self, embedding_key: impl Into<String>) -> Self {
        self.embedding_key = embedding_key.into();
        self
    }

    pub fn with_oversampling_factor(mut self, factor: usize) -> Self {
        self.oversampling_factor = factor;
        self
    }

    pub fn with_pre_filter(mut self, filter: Record) -> Self {
        self.pre_filter = Some(filter);
        self
    }

    pub fn with_insert_batch_size(mut self, batch_size: usize) -> Self {
        self.insert_batch_size = batch_size;
        self
    }
}

/// Build a `$vectorSearch` aggregation stage.
///
/// `numCandidates` is `k * oversampling_factor`; `filter` is included only
/// when given.
pub fn vector_search_stage(
    query_vector: &[f32],
    path: &str,
    index: &str,
    k: usize,
    oversampling_factor: usize,
    filter: Option<&Record>,
) -> Record {
    let query: Vec<f64> = query_vector.iter().map(|v| *v as f64).collect();
    let num_candidates = k.saturating_mul(oversampling_factor.max(1));

    let mut search = doc! {
        "index": index,
        "path": path,
        "queryVector": query,
        "numCandidates": num_candidates as i64,
        "limit": k as i64,
    };
    if let Some(filter) = filter {
        search.insert("filter", filter.clone());
    }
    doc! { "$vectorSearch": search }
}

/// MongoDB Atlas Vector Search implementation of [`VectorStore`].
///
/// Records are flattened as `{ _id, <text_key>, <embedding_key>, ...metadata }`.
/// The search index itself must be created in Atlas beforehand.
pub struct MongoVectorStore {
    collection: Arc<dyn DocCollection>,
    config: MongoVectorConfig,
}

impl MongoVectorStore {
    /// Create a store over an existing collection handle.
    pub fn new(collection: Arc<dyn DocCollection>, config: MongoVectorConfig) -> Self {
        Self { collection, config }
    }

    /// Connect to `uri` and open `config.database`/`config.collection`.
    pub async fn from_uri(uri: &str, config: MongoVectorConfig) -> Result<Self, SynapticError> {
        let client = connect(uri).await?;
        let collection = client
            .database(&config.database)
            .collection::<Record>(&config.collection);
        Ok(Self::new(Arc::new(collection), config))
    }

    pub fn config(&self) -> &MongoVectorConfig {
        &self.config
    }

    pub fn collection(&self) -> &Arc<dyn DocCollection> {
        &self.collection
    }

    async fn search(
        &self,
        query_vector: &[f32],
        k: usize,
    ) -> Result<Vec<(Document, f32)>, SynapticError> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut exclude_embedding = Record::new();
        exclude_embedding.insert(self.config.embedding_key.as_str(), 0);

        let pipeline = vec![
            vector_search_stage(
                query_vector,
                &self.config.embedding_key,
                &self.config.index_name,
                k,
                self.config.oversampling_factor,
                self.config.pre_filter.as_ref(),
            ),
            doc! { "$set": { "score": { "$meta": "vectorSearchScore" } } },
            doc! { "$project": exclude_embedding },
        ];

        tracing::debug!(
            collection = self.collection.name(),
            index = %self.config.index_name,
            k,
            "running vector search"
        );
        let records = self.collection.aggregate(pipeline).await?;

        records
            .into_iter()
            .map(|record| {
                let mut doc = record_to_document(record, &self.config.text_key)?;
                let score = doc
                    .metadata
                    .remove(SCORE_FIELD)
                    .and_then(|v| v.as_f64())
                    .unwrap_or(0.0) as f32;
                Ok((doc, score))
            })
            .collect()
    }
}

#[async_trait]
impl VectorStore for MongoVectorStore {
    async fn add_documents(
        &self,
        docs: Vec<Document>,
        embeddings: &dyn Embeddings,
    ) -> Result<Vec<String>, SynapticError> {
        if docs.is_empty() {
            return Ok(Vec::new());
        }
        if self.config.insert_batch_size == 0 {
            return Err(SynapticError::Validation(
                "insert_batch_size must be greater than zero".to_string(),
            ));
        }

        let texts: Vec<&str> = docs.iter().map(|d| d.content.as_str()).collect();
        let vectors = embeddings.embed_documents(&texts).await?;
        if vectors.len() != docs.len() {
            return Err(SynapticError::Embedding(format!(
                "expected {} embeddings, got {}",
                docs.len(),
                vectors.len()
            )));
        }

        let mut ids = Vec::with_capacity(docs.len());
        let mut records = Vec::with_capacity(docs.len());
        for (doc, vector) in docs.into_iter().zip(vectors) {
            let id = if doc.id.is_empty() {
                uuid::Uuid::new_v4().to_string()
            } else {
                doc.id.clone()
            };
            let mut record = document_to_record(&id, &doc, &self.config.text_key)?;
            let embedding: Vec<f64> = vector.into_iter().map(f64::from).collect();
            record.insert(self.config.embedding_key.as_str(), Bson::from(embedding));
            records.push(record);
            ids.push(id);
        }

        let mut records = records.into_iter().peekable();
        while records.peek().is_some() {
            let batch: Vec<Record> = records
                .by_ref()
                .take(self.config.insert_batch_size)
                .collect();
            tracing::debug!(
                collection = self.collection.name(),
                size = batch.len(),
                "inserting embedded documents"
            );
            self.collection.insert_many(batch, true).await?;
        }

        Ok(ids)
    }

    async fn similarity_search(
        &self,
        query: &str,
        k: usize,
        embeddings: &dyn Embeddings,
    ) -> Result<Vec<Document>, SynapticError> {
        let results = self
            .similarity_search_with_score(query, k, embeddings)
            .await?;
        Ok(results.into_iter().map(|(doc, _)| doc).collect())
    }

    async fn similarity_search_with_score(
        &self,
        query: &str,
        k: usize,
        embeddings: &dyn Embeddings,
    ) -> Result<Vec<(Document, f32)>, SynapticError> {
        let query_vector = embeddings.embed_query(query).await?;
        self.search(&query_vector, k).await
    }

    async fn similarity_search_by_vector(
        &self,
        embedding: &[f32],
        k: usize,
    ) -> Result<Vec<Document>, SynapticError> {
        let results = self.search(embedding, k).await?;
        Ok(results.into_iter().map(|(doc, _)| doc).collect())
    }

    async fn delete(&self, ids: &[&str]) -> Result<(), SynapticError> {
        if ids.is_empty() {
            return Ok(());
        }
        self.collection
            .delete_many(doc! { "_id": { "$in": ids.to_vec() } })
            .await?;
        Ok(())
    }
}
