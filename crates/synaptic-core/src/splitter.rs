use crate::Document;

/// Splits text into chunks.
///
/// Concrete splitters live outside the core; retrievers that need chunking
/// take one as `Arc<dyn TextSplitter>`.
pub trait TextSplitter: Send + Sync {
    /// Split a text into chunks.
    fn split_text(&self, text: &str) -> Vec<String>;

    /// Split each document, copying its metadata onto every chunk.
    ///
    /// Chunk ids are left empty so the receiving store can assign them.
    fn split_documents(&self, docs: &[Document]) -> Vec<Document> {
        docs.iter()
            .flat_map(|doc| {
                self.split_text(&doc.content)
                    .into_iter()
                    .map(|chunk| Document {
                        id: String::new(),
                        content: chunk,
                        metadata: doc.metadata.clone(),
                    })
            })
            .collect()
    }
}
