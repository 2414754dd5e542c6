//! Core traits and types shared by every Synaptic crate.
//!
//! Integrations depend on this crate only: backends implement [`DocStore`],
//! [`VectorStore`] or [`Retriever`], and take model-side collaborators
//! ([`Embeddings`], [`TextSplitter`]) as trait objects.

mod document;
mod error;
mod retriever;
mod splitter;
mod store;

pub use document::Document;
pub use error::SynapticError;
pub use retriever::{Embeddings, Retriever, VectorStore};
pub use splitter::TextSplitter;
pub use store::{DocStore, KeyStream};
