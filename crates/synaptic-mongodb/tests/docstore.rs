use std::sync::Arc;

use futures::TryStreamExt;
use serde_json::json;
use synaptic_core::{DocStore, Document, SynapticError};
use synaptic_mongodb::{InMemoryCollection, MongoDocStore};

fn store() -> (Arc<InMemoryCollection>, MongoDocStore) {
    let coll = Arc::new(InMemoryCollection::new("parents"));
    let store = MongoDocStore::new(coll.clone());
    (coll, store)
}

fn pair(key: &str, text: &str) -> (String, Document) {
    (key.to_string(), Document::new(key, text))
}

async fn keys(store: &MongoDocStore, prefix: Option<&str>) -> Vec<String> {
    let mut keys: Vec<String> = store.yield_keys(prefix).try_collect().await.unwrap();
    keys.sort();
    keys
}

#[tokio::test]
async fn mget_preserves_input_order_and_misses() {
    let (_, store) = store();
    store
        .mset(vec![pair("a", "alpha"), pair("b", "beta")])
        .await
        .unwrap();

    let docs = store.mget(&["b", "missing", "a", "b"]).await.unwrap();
    assert_eq!(docs.len(), 4);
    assert_eq!(docs[0].as_ref().unwrap().content, "beta");
    assert!(docs[1].is_none());
    assert_eq!(docs[2].as_ref().unwrap().content, "alpha");
    assert_eq!(docs[3].as_ref().unwrap().id, "b");
}

#[tokio::test]
async fn mget_empty_is_empty() {
    let (_, store) = store();
    assert!(store.mget(&[]).await.unwrap().is_empty());
}

#[tokio::test]
async fn round_trip_keeps_metadata() {
    let (coll, store) = store();
    let doc = Document::new("guide", "How to deploy")
        .with_metadata("source", "docs/deploy.md")
        .with_metadata("tags", json!(["ops", "k8s"]));
    store
        .mset(vec![("guide".to_string(), doc.clone())])
        .await
        .unwrap();

    let back = store.mget(&["guide"]).await.unwrap().remove(0).unwrap();
    assert_eq!(back, doc);

    // Stored flattened under the text key.
    let record = &coll.records().await[0];
    assert_eq!(record.get_str("page_content").unwrap(), "How to deploy");
    assert_eq!(record.get_str("source").unwrap(), "docs/deploy.md");
}

#[tokio::test]
async fn custom_text_key() {
    let coll = Arc::new(InMemoryCollection::new("parents"));
    let store = MongoDocStore::new(coll.clone()).with_text_key("body");
    store.mset(vec![pair("k", "content")]).await.unwrap();

    assert_eq!(coll.records().await[0].get_str("body").unwrap(), "content");
    let doc = store.mget(&["k"]).await.unwrap().remove(0).unwrap();
    assert_eq!(doc.content, "content");
    assert!(doc.metadata.is_empty());
}

#[tokio::test]
async fn mdelete_removes_and_ignores_absent() {
    let (_, store) = store();
    store
        .mset(vec![pair("a", "1"), pair("b", "2"), pair("c", "3")])
        .await
        .unwrap();

    store.mdelete(&["a", "c", "never-stored"]).await.unwrap();

    let docs = store.mget(&["a", "b", "c"]).await.unwrap();
    assert!(docs[0].is_none());
    assert!(docs[1].is_some());
    assert!(docs[2].is_none());
}

#[tokio::test]
async fn yield_keys_all_and_by_prefix() {
    let (_, store) = store();
    store
        .mset(vec![
            pair("apple", "1"),
            pair("apricot", "2"),
            pair("banana", "3"),
        ])
        .await
        .unwrap();

    assert_eq!(keys(&store, None).await, vec!["apple", "apricot", "banana"]);
    assert_eq!(keys(&store, Some("ap")).await, vec!["apple", "apricot"]);
    assert!(keys(&store, Some("z")).await.is_empty());
}

#[tokio::test]
async fn yield_keys_prefix_is_literal() {
    let (_, store) = store();
    store
        .mset(vec![pair("a.b", "1"), pair("axb", "2"), pair("a*", "3")])
        .await
        .unwrap();

    assert_eq!(keys(&store, Some("a.")).await, vec!["a.b"]);
    assert_eq!(keys(&store, Some("a*")).await, vec!["a*"]);
}

#[tokio::test]
async fn yield_keys_is_restartable() {
    let (_, store) = store();
    store.mset(vec![pair("k1", "1")]).await.unwrap();

    let stream = store.yield_keys(None);
    // Written before the first poll, so it is visible.
    store.mset(vec![pair("k2", "2")]).await.unwrap();
    let mut first: Vec<String> = stream.try_collect().await.unwrap();
    first.sort();
    assert_eq!(first, vec!["k1", "k2"]);

    assert_eq!(keys(&store, None).await, vec!["k1", "k2"]);
}

#[tokio::test]
async fn large_mset_is_split_into_batches() {
    let (coll, store) = store();
    let pairs: Vec<(String, Document)> = (0..250_000)
        .map(|i| {
            let key = format!("doc-{i}");
            (key.clone(), Document::new(key, "x"))
        })
        .collect();

    store.mset(pairs).await.unwrap();

    assert_eq!(coll.insert_batches().await, vec![100_000, 100_000, 50_000]);
    assert_eq!(coll.len().await, 250_000);
}

#[tokio::test]
async fn explicit_batch_size() {
    let (coll, store) = store();
    let pairs = (0..5).map(|i| pair(&format!("k{i}"), "v")).collect();
    store.mset_with_batch_size(pairs, 2).await.unwrap();
    assert_eq!(coll.insert_batches().await, vec![2, 2, 1]);
}

#[tokio::test]
async fn collision_fails_batch_and_halts_later_batches() {
    let (coll, store) = store();
    let store = store.with_batch_size(2);
    store.mset(vec![pair("c", "existing")]).await.unwrap();

    let err = store
        .mset(vec![
            pair("a", "1"),
            pair("b", "2"),
            pair("c", "3"),
            pair("d", "4"),
            pair("e", "5"),
        ])
        .await
        .unwrap_err();
    assert!(matches!(err, SynapticError::Store(_)));
    assert!(err.to_string().contains("duplicate key"));

    // Third batch was never sent.
    assert_eq!(coll.insert_batches().await, vec![1, 2, 2]);

    let docs = store.mget(&["a", "b", "c", "d", "e"]).await.unwrap();
    assert!(docs[0].is_some());
    assert!(docs[1].is_some());
    assert_eq!(docs[2].as_ref().unwrap().content, "existing");
    // Unordered inserts keep the non-conflicting record of the failed batch.
    assert!(docs[3].is_some());
    assert!(docs[4].is_none());
}

#[tokio::test]
async fn ordered_inserts_stop_at_conflict() {
    let (_, store) = store();
    let store = store.with_batch_size(10).with_ordered_inserts(true);
    store.mset(vec![pair("b", "existing")]).await.unwrap();

    assert!(store
        .mset(vec![pair("a", "1"), pair("b", "2"), pair("c", "3")])
        .await
        .is_err());

    let docs = store.mget(&["a", "c"]).await.unwrap();
    assert!(docs[0].is_some());
    assert!(docs[1].is_none());
}

#[tokio::test]
async fn record_without_text_field_is_an_error() {
    let coll = Arc::new(InMemoryCollection::new("parents"));
    synaptic_mongodb::DocCollection::insert_many(
        coll.as_ref(),
        vec![bson::doc! { "_id": "raw", "other": 1 }],
        true,
    )
    .await
    .unwrap();

    let store = MongoDocStore::new(coll);
    let err = store.mget(&["raw"]).await.unwrap_err();
    assert!(matches!(err, SynapticError::Store(_)));
}

#[tokio::test]
async fn invalid_namespace_fails_construction() {
    let err = MongoDocStore::from_connection_string("mongodb://localhost:27017", "no_separator")
        .await
        .err()
        .unwrap();
    assert!(matches!(err, SynapticError::Config(_)));
}
