//! Conversions between Synaptic documents and stored records.

use std::collections::HashMap;

use bson::{Bson, Document as Record};
use serde_json::Value;
use synaptic_core::{Document, SynapticError};

/// Convert a BSON value into plain JSON.
///
/// Driver-specific types are flattened to something a caller can serialize
/// directly: ObjectIds become hex strings and dates become RFC 3339 strings.
/// Everything else follows relaxed extended JSON.
pub fn bson_to_json(value: Bson) -> Value {
    match value {
        Bson::ObjectId(oid) => Value::String(oid.to_hex()),
        Bson::DateTime(dt) => match dt.try_to_rfc3339_string() {
            Ok(s) => Value::String(s),
            Err(_) => Value::from(dt.timestamp_millis()),
        },
        Bson::Document(doc) => Value::Object(
            doc.into_iter()
                .map(|(k, v)| (k, bson_to_json(v)))
                .collect(),
        ),
        Bson::Array(items) => Value::Array(items.into_iter().map(bson_to_json).collect()),
        other => other.into_relaxed_extjson(),
    }
}

/// Convert a JSON metadata value into BSON for storage.
pub fn json_to_bson(value: &Value) -> Result<Bson, SynapticError> {
    bson::to_bson(value)
        .map_err(|e| SynapticError::Store(format!("BSON serialize error: {e}")))
}

/// Render an `_id` as the string key used by Synaptic documents.
pub fn id_to_string(id: &Bson) -> String {
    match id {
        Bson::String(s) => s.clone(),
        Bson::ObjectId(oid) => oid.to_hex(),
        other => bson_to_json(other.clone()).to_string(),
    }
}

/// Build the flattened record `{ _id, <text_key>: content, ...metadata }`.
///
/// `_id` and the text field take precedence over metadata keys with the same
/// name; such metadata entries are dropped.
pub fn document_to_record(
    id: &str,
    doc: &Document,
    text_key: &str,
) -> Result<Record, SynapticError> {
    let mut record = Record::new();
    record.insert("_id", id);
    record.insert(text_key, doc.content.as_str());
    for (key, value) in &doc.metadata {
        if key == "_id" || key == text_key {
            continue;
        }
        record.insert(key.as_str(), json_to_bson(value)?);
    }
    Ok(record)
}

/// Turn a stored record back into a [`Document`].
///
/// The text field becomes `content`, `_id` becomes `id`, and every other
/// field lands in `metadata`.
pub fn record_to_document(mut record: Record, text_key: &str) -> Result<Document, SynapticError> {
    let id = record.remove("_id").map(|id| id_to_string(&id)).unwrap_or_default();

    let content = match record.remove(text_key) {
        Some(Bson::String(s)) => s,
        Some(other) => {
            return Err(SynapticError::Store(format!(
                "record '{id}' has a non-string '{text_key}' field: {other}"
            )))
        }
        None => {
            return Err(SynapticError::Store(format!(
                "record '{id}' has no '{text_key}' field"
            )))
        }
    };

    let metadata: HashMap<String, Value> = record
        .into_iter()
        .map(|(k, v)| (k, bson_to_json(v)))
        .collect();

    Ok(Document {
        id,
        content,
        metadata,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use bson::oid::ObjectId;
    use serde_json::json;

    #[test]
    fn record_round_trip() {
        let doc = Document::new("k1", "hello")
            .with_metadata("source", "a.md")
            .with_metadata("page", 2)
            .with_metadata("tags", json!(["x", "y"]));

        let record = document_to_record("k1", &doc, "page_content").unwrap();
        assert_eq!(record.get_str("_id").unwrap(), "k1");
        assert_eq!(record.get_str("page_content").unwrap(), "hello");

        let back = record_to_document(record, "page_content").unwrap();
        assert_eq!(back, doc);
    }

    #[test]
    fn reserved_metadata_keys_do_not_override() {
        let doc = Document::new("", "body")
            .with_metadata("_id", "spoofed")
            .with_metadata("text", "other");
        let record = document_to_record("real", &doc, "text").unwrap();
        assert_eq!(record.get_str("_id").unwrap(), "real");
        assert_eq!(record.get_str("text").unwrap(), "body");
        assert_eq!(record.len(), 2);
    }

    #[test]
    fn missing_text_field_is_an_error() {
        let err = record_to_document(doc! { "_id": "x", "other": 1 }, "text").unwrap_err();
        assert!(err.to_string().contains("no 'text' field"));
    }

    #[test]
    fn object_ids_and_dates_become_strings() {
        let oid = ObjectId::new();
        let record = doc! {
            "_id": oid,
            "text": "t",
            "parent": oid,
            "created": bson::DateTime::from_millis(0),
            "nested": { "ref": oid },
        };
        let doc = record_to_document(record, "text").unwrap();
        assert_eq!(doc.id, oid.to_hex());
        assert_eq!(doc.metadata["parent"], json!(oid.to_hex()));
        assert_eq!(doc.metadata["created"], json!("1970-01-01T00:00:00Z"));
        assert_eq!(doc.metadata["nested"]["ref"], json!(oid.to_hex()));
    }
}
