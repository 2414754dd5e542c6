use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::{Document, SynapticError};

/// Lazily produced stream of store keys.
pub type KeyStream<'a> = BoxStream<'a, Result<String, SynapticError>>;

/// Key-value storage of documents, keyed by string.
///
/// This is the storage side of parent-document retrieval: parents are kept
/// here while their chunks go into a [`VectorStore`](crate::VectorStore).
#[async_trait]
pub trait DocStore: Send + Sync {
    /// Get the documents for `keys`, one entry per key in input order.
    /// Missing keys map to `None`.
    async fn mget(&self, keys: &[&str]) -> Result<Vec<Option<Document>>, SynapticError>;

    /// Store documents under the given keys.
    async fn mset(&self, pairs: Vec<(String, Document)>) -> Result<(), SynapticError>;

    /// Delete the given keys. Absent keys are ignored.
    async fn mdelete(&self, keys: &[&str]) -> Result<(), SynapticError>;

    /// Stream all keys, optionally only those starting with `prefix`.
    ///
    /// Nothing is read until the stream is polled, and each call starts a
    /// fresh scan.
    fn yield_keys<'a>(&'a self, prefix: Option<&'a str>) -> KeyStream<'a>;
}
