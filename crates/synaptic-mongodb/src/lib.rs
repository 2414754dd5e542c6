//! MongoDB integration for Synaptic.
//!
//! This crate provides three components over one MongoDB collection:
//!
//! - [`MongoDocStore`], a key-value [`DocStore`] keyed by `_id`,
//! - [`MongoVectorStore`], a [`VectorStore`] backed by
//!   [MongoDB Atlas Vector Search](https://www.mongodb.com/docs/atlas/atlas-vector-search/),
//! - [`MongoParentDocumentRetriever`], which searches chunks and returns the
//!   parent documents they were cut from.
//!
//! All of them talk to the database through [`DocCollection`], implemented
//! for the driver's collection and for [`InMemoryCollection`].
//!
//! # Example
//!
//! ```rust,no_run
//! use synaptic_mongodb::{DocStore, MongoDocStore};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = MongoDocStore::from_connection_string("mongodb+srv://...", "rag.parents").await?;
//! let docs = store.mget(&["intro"]).await?;
//! # Ok(())
//! # }
//! ```

mod collection;
mod convert;
mod docstore;
mod memory;
mod parent_document;
mod settings;
mod vector_store;

pub use collection::{connect, parse_namespace, DocCollection, RecordStream};
pub use convert::{bson_to_json, document_to_record, record_to_document};
pub use docstore::{MongoDocStore, DEFAULT_DOCSTORE_TEXT_KEY, DEFAULT_INSERT_BATCH_SIZE};
pub use memory::InMemoryCollection;
pub use parent_document::{
    MongoParentDocumentRetriever, ParentDocumentConfig, DEFAULT_ID_KEY, DEFAULT_PARENT_COLLECTION,
};
pub use settings::MongoSettings;
pub use vector_store::{vector_search_stage, MongoVectorConfig, MongoVectorStore};

// Re-export core traits for convenience.
pub use synaptic_core::{DocStore, Document, Embeddings, Retriever, TextSplitter, VectorStore};
