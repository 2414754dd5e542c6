use thiserror::Error;

/// Error type shared by all Synaptic crates.
///
/// Backends wrap their driver errors into the variant matching the
/// abstraction they implement, keeping the driver's message.
#[derive(Debug, Error)]
pub enum SynapticError {
    #[error("store error: {0}")]
    Store(String),
    #[error("vector store error: {0}")]
    VectorStore(String),
    #[error("retriever error: {0}")]
    Retriever(String),
    #[error("embedding error: {0}")]
    Embedding(String),
    #[error("splitter error: {0}")]
    Splitter(String),
    #[error("config error: {0}")]
    Config(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("parsing error: {0}")]
    Parsing(String),
}
