use std::sync::Arc;

use futures::TryStreamExt;
use synaptic_core::{DocStore, Document, Retriever, TextSplitter};
use synaptic_embeddings::FakeEmbeddings;
use synaptic_mongodb::{
    DocCollection, InMemoryCollection, MongoParentDocumentRetriever, MongoSettings,
};
use tracing_subscriber::EnvFilter;

/// One chunk per sentence.
struct SentenceSplitter;

impl TextSplitter for SentenceSplitter {
    fn split_text(&self, text: &str) -> Vec<String> {
        text.split_inclusive('.')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect()
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    println!("=== MongoDB Parent Document Retrieval Demo ===\n");

    // [mongodb] from ./synaptic.toml or ~/.synaptic/config.toml, if present.
    let mut settings = MongoSettings::load_or_default()?;
    let live_uri = std::env::var("MONGODB_URI").ok();
    if let Some(uri) = &live_uri {
        settings.uri = uri.clone();
    }

    let collection: Arc<dyn DocCollection> = match &live_uri {
        Some(_) => {
            println!("Using {} on the configured cluster", settings.namespace());
            let client = synaptic_mongodb::connect(&settings.uri).await?;
            Arc::new(
                client
                    .database(&settings.database)
                    .collection::<bson::Document>(&settings.collection),
            )
        }
        None => {
            println!("MONGODB_URI not set, using an in-memory collection");
            Arc::new(InMemoryCollection::new(&settings.collection))
        }
    };

    let retriever = MongoParentDocumentRetriever::new(
        collection.clone(),
        settings.vector_config(),
        Arc::new(FakeEmbeddings::default()),
        Arc::new(SentenceSplitter),
        settings.parent_config(),
    );
    retriever.initialize().await?;

    // --- Index parents ---
    println!("\n--- Indexing ---");
    let ids = retriever
        .add_documents(vec![
            Document::new(
                "ownership",
                "Every value in Rust has a single owner. When the owner goes out of scope the value is dropped. Borrowing lets code use a value without taking ownership.",
            )
            .with_metadata("source", "book/ch04.md"),
            Document::new(
                "async",
                "Async functions return futures. A future does nothing until it is polled. Runtimes such as Tokio drive futures to completion.",
            )
            .with_metadata("source", "book/ch17.md"),
        ])
        .await?;
    println!("Stored parents: {ids:?}");

    // --- Retrieve ---
    println!("\n--- Retrieval ---");
    for query in ["what happens when the owner goes out of scope", "who polls a future"] {
        let docs = retriever.retrieve(query, 0).await?;
        println!("Query: {query}");
        for doc in &docs {
            let source = doc
                .metadata
                .get("source")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown");
            println!("  [{}] {} (source: {source})", doc.id, doc.content);
        }
    }

    // --- The doc store view ---
    println!("\n--- Doc store ---");
    let docstore = retriever.docstore();
    let keys: Vec<String> = docstore.yield_keys(Some("own")).try_collect().await?;
    println!("Keys with prefix 'own': {keys:?}");

    let id_refs: Vec<&str> = ids.iter().map(String::as_str).collect();
    docstore.mdelete(&id_refs).await?;
    let remaining = docstore.mget(&id_refs).await?;
    println!("After delete: {remaining:?}");

    println!("\nDone.");
    Ok(())
}
