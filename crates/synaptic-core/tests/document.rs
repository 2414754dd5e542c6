use serde_json::json;
use synaptic_core::{Document, TextSplitter};

struct LineSplitter;

impl TextSplitter for LineSplitter {
    fn split_text(&self, text: &str) -> Vec<String> {
        text.lines().map(String::from).collect()
    }
}

#[test]
fn document_builder() {
    let doc = Document::new("d1", "hello").with_metadata("page", 3);
    assert_eq!(doc.id, "d1");
    assert_eq!(doc.content, "hello");
    assert_eq!(doc.metadata.get("page"), Some(&json!(3)));
}

#[test]
fn document_deserializes_without_id_or_metadata() {
    let doc: Document = serde_json::from_value(json!({"content": "text only"})).unwrap();
    assert!(doc.id.is_empty());
    assert!(doc.metadata.is_empty());
}

#[test]
fn split_documents_copies_metadata() {
    let doc = Document::new("parent", "first line\nsecond line").with_metadata("source", "a.md");
    let chunks = LineSplitter.split_documents(&[doc]);

    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0].content, "first line");
    assert_eq!(chunks[1].content, "second line");
    for chunk in &chunks {
        assert!(chunk.id.is_empty());
        assert_eq!(chunk.metadata.get("source"), Some(&json!("a.md")));
    }
}
