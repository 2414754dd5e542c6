use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use bson::oid::ObjectId;
use bson::{Bson, Document as Record};
use futures::StreamExt;
use regex::RegexBuilder;
use synaptic_core::SynapticError;
use tokio::sync::{Mutex, RwLock};

use crate::collection::{DocCollection, RecordStream};

/// In-process stand-in for a MongoDB collection.
///
/// Understands the query and aggregation operators the Synaptic MongoDB
/// components emit, including an exact-cosine `$vectorSearch`, so stores and
/// retrievers can be exercised without a cluster. Records keep insertion
/// order. Every `insert_many` call and every created index is recorded for
/// inspection.
///
/// Supported filter operators: equality, `$eq`, `$ne`, `$in`, `$nin`,
/// `$exists`, `$regex` (with `$options: "i"`), `$and`, `$or`.
/// Supported stages: `$vectorSearch`, `$set`/`$addFields`, `$project`,
/// `$match`, `$lookup` (same collection only), `$unwind`, `$group`
/// (`$first`, `$push`), `$sort`, `$replaceRoot`, `$limit`.
///
/// Numeric values compare by value across `Int32`, `Int64` and `Double`,
/// both for `_id` uniqueness and in filters, joins and grouping.
pub struct InMemoryCollection {
    name: String,
    records: RwLock<Vec<Record>>,
    insert_batches: Mutex<Vec<usize>>,
    indexes: Mutex<Vec<Record>>,
}

impl InMemoryCollection {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            records: RwLock::new(Vec::new()),
            insert_batches: Mutex::new(Vec::new()),
            indexes: Mutex::new(Vec::new()),
        }
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// Snapshot of every stored record, in insertion order.
    pub async fn records(&self) -> Vec<Record> {
        self.records.read().await.clone()
    }

    /// Size of each `insert_many` call received so far.
    pub async fn insert_batches(&self) -> Vec<usize> {
        self.insert_batches.lock().await.clone()
    }

    /// Key specifications passed to `create_index`.
    pub async fn indexes(&self) -> Vec<Record> {
        self.indexes.lock().await.clone()
    }
}

#[async_trait]
impl DocCollection for InMemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn find(
        &self,
        filter: Record,
        projection: Option<Record>,
    ) -> Result<RecordStream, SynapticError> {
        let records = self.records.read().await;
        let mut found = Vec::new();
        for record in records.iter() {
            if matches(record, &filter)? {
                found.push(match &projection {
                    Some(p) => project(record.clone(), p),
                    None => record.clone(),
                });
            }
        }
        Ok(futures::stream::iter(found.into_iter().map(Ok)).boxed())
    }

    async fn insert_many(
        &self,
        records: Vec<Record>,
        ordered: bool,
    ) -> Result<(), SynapticError> {
        self.insert_batches.lock().await.push(records.len());

        let mut stored = self.records.write().await;
        let mut ids: HashSet<String> = stored
            .iter()
            .filter_map(|r| r.get("_id"))
            .map(value_key)
            .collect();

        let mut duplicates: Vec<Bson> = Vec::new();
        for mut record in records {
            if !record.contains_key("_id") {
                record.insert("_id", ObjectId::new());
            }
            let id = record.get("_id").cloned().unwrap_or(Bson::Null);
            if !ids.insert(value_key(&id)) {
                duplicates.push(id);
                if ordered {
                    break;
                }
                continue;
            }
            stored.push(record);
        }

        match duplicates.first() {
            None => Ok(()),
            Some(first) => Err(SynapticError::Store(format!(
                "E11000 duplicate key error collection: {} index: _id_ dup key: {{ _id: {first} }} ({} write error(s))",
                self.name,
                duplicates.len()
            ))),
        }
    }

    async fn delete_many(&self, filter: Record) -> Result<u64, SynapticError> {
        let mut stored = self.records.write().await;
        let doomed = stored
            .iter()
            .map(|r| matches(r, &filter))
            .collect::<Result<Vec<bool>, _>>()?;
        let mut flags = doomed.iter();
        stored.retain(|_| !flags.next().copied().unwrap_or(false));
        Ok(doomed.iter().filter(|d| **d).count() as u64)
    }

    async fn aggregate(&self, pipeline: Vec<Record>) -> Result<Vec<Record>, SynapticError> {
        let records = self.records.read().await;
        let ctx = Pipeline {
            name: &self.name,
            collection: records.as_slice(),
        };
        let initial = records.iter().map(|r| (r.clone(), None)).collect();
        let out = ctx.run(initial, &pipeline, true)?;
        Ok(out.into_iter().map(|(r, _)| r).collect())
    }

    async fn create_index(&self, keys: Record) -> Result<(), SynapticError> {
        let mut indexes = self.indexes.lock().await;
        if !indexes.contains(&keys) {
            indexes.push(keys);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Aggregation
// ---------------------------------------------------------------------------

/// A record flowing through the pipeline with its `$vectorSearch` score.
type Scored = (Record, Option<f64>);

struct Pipeline<'a> {
    name: &'a str,
    collection: &'a [Record],
}

impl Pipeline<'_> {
    fn run(
        &self,
        mut docs: Vec<Scored>,
        stages: &[Record],
        top_level: bool,
    ) -> Result<Vec<Scored>, SynapticError> {
        for (i, stage) in stages.iter().enumerate() {
            let (op, spec) = stage_parts(stage)?;
            docs = match op {
                "$vectorSearch" => {
                    if !top_level || i != 0 {
                        return Err(unsupported("$vectorSearch must be the first stage"));
                    }
                    self.vector_search(as_doc(spec, op)?)?
                }
                "$set" | "$addFields" => {
                    let spec = as_doc(spec, op)?;
                    docs.into_iter()
                        .map(|(mut doc, score)| {
                            for (field, expr) in spec {
                                if let Some(value) = eval(expr, &doc, score)? {
                                    set_path(&mut doc, field, value);
                                }
                            }
                            Ok((doc, score))
                        })
                        .collect::<Result<_, SynapticError>>()?
                }
                "$project" => {
                    let spec = as_doc(spec, op)?;
                    docs.into_iter()
                        .map(|(doc, score)| (project(doc, spec), score))
                        .collect()
                }
                "$match" => {
                    let filter = as_doc(spec, op)?;
                    let mut kept = Vec::with_capacity(docs.len());
                    for (doc, score) in docs {
                        if matches(&doc, filter)? {
                            kept.push((doc, score));
                        }
                    }
                    kept
                }
                "$lookup" => self.lookup(docs, as_doc(spec, op)?)?,
                "$unwind" => unwind(docs, spec)?,
                "$group" => group(docs, as_doc(spec, op)?)?,
                "$replaceRoot" => {
                    let spec = as_doc(spec, op)?;
                    let expr = spec
                        .get("newRoot")
                        .ok_or_else(|| unsupported("$replaceRoot requires newRoot"))?;
                    docs.into_iter()
                        .map(|(doc, score)| match eval(expr, &doc, score)? {
                            Some(Bson::Document(root)) => Ok((root, score)),
                            _ => Err(SynapticError::Store(
                                "$replaceRoot newRoot must evaluate to a document".to_string(),
                            )),
                        })
                        .collect::<Result<_, SynapticError>>()?
                }
                "$sort" => {
                    let keys = sort_keys(as_doc(spec, op)?)?;
                    docs.sort_by(|(a, _), (b, _)| {
                        for (field, descending) in &keys {
                            let ord = compare_values(lookup_path(a, field), lookup_path(b, field));
                            let ord = if *descending { ord.reverse() } else { ord };
                            if ord != Ordering::Equal {
                                return ord;
                            }
                        }
                        Ordering::Equal
                    });
                    docs
                }
                "$limit" => {
                    let n = as_usize(spec).ok_or_else(|| unsupported("$limit must be a number"))?;
                    docs.truncate(n);
                    docs
                }
                other => return Err(unsupported(&format!("stage {other}"))),
            };
        }
        Ok(docs)
    }

    fn vector_search(&self, spec: &Record) -> Result<Vec<Scored>, SynapticError> {
        let path = spec
            .get_str("path")
            .map_err(|_| unsupported("$vectorSearch requires a string path"))?;
        let query = spec
            .get_array("queryVector")
            .map_err(|_| unsupported("$vectorSearch requires queryVector"))?
            .iter()
            .map(as_f64)
            .collect::<Option<Vec<f64>>>()
            .ok_or_else(|| unsupported("$vectorSearch queryVector must be numeric"))?;
        let limit = spec
            .get("limit")
            .and_then(as_usize)
            .ok_or_else(|| unsupported("$vectorSearch requires limit"))?;
        let num_candidates = spec.get("numCandidates").and_then(as_usize).unwrap_or(limit);
        if num_candidates < limit {
            return Err(SynapticError::Store(format!(
                "$vectorSearch numCandidates ({num_candidates}) must be >= limit ({limit})"
            )));
        }
        let filter = match spec.get("filter") {
            Some(Bson::Document(f)) => Some(f),
            _ => None,
        };

        let mut scored: Vec<Scored> = Vec::new();
        for record in self.collection {
            if let Some(f) = filter {
                if !matches(record, f)? {
                    continue;
                }
            }
            let Some(Bson::Array(stored)) = lookup_path(record, path) else {
                continue;
            };
            let Some(vector) = stored.iter().map(as_f64).collect::<Option<Vec<f64>>>() else {
                continue;
            };
            let score = (1.0 + cosine_similarity(&query, &vector)) / 2.0;
            scored.push((record.clone(), Some(score)));
        }

        // Stable sort keeps insertion order among equal scores.
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        scored.truncate(limit);
        Ok(scored)
    }

    fn lookup(&self, docs: Vec<Scored>, spec: &Record) -> Result<Vec<Scored>, SynapticError> {
        let from = spec
            .get_str("from")
            .map_err(|_| unsupported("$lookup requires from"))?;
        if from != self.name {
            return Err(unsupported(&format!(
                "$lookup from another collection ('{from}')"
            )));
        }
        let local_field = spec
            .get_str("localField")
            .map_err(|_| unsupported("$lookup requires localField"))?;
        let foreign_field = spec
            .get_str("foreignField")
            .map_err(|_| unsupported("$lookup requires foreignField"))?;
        let as_field = spec
            .get_str("as")
            .map_err(|_| unsupported("$lookup requires as"))?;
        let sub_pipeline: Vec<Record> = match spec.get("pipeline") {
            Some(Bson::Array(stages)) => stages
                .iter()
                .map(|s| match s {
                    Bson::Document(d) => Ok(d.clone()),
                    _ => Err(unsupported("$lookup pipeline stages must be documents")),
                })
                .collect::<Result<_, _>>()?,
            _ => Vec::new(),
        };

        docs.into_iter()
            .map(|(mut doc, score)| {
                let local = lookup_path(&doc, local_field).cloned().unwrap_or(Bson::Null);
                let joined: Vec<Scored> = self
                    .collection
                    .iter()
                    .filter(|candidate| {
                        let foreign = lookup_path(candidate, foreign_field)
                            .cloned()
                            .unwrap_or(Bson::Null);
                        bson_eq(&foreign, &local)
                    })
                    .map(|candidate| (candidate.clone(), None))
                    .collect();
                let joined = self.run(joined, &sub_pipeline, false)?;
                doc.insert(
                    as_field,
                    Bson::Array(joined.into_iter().map(|(r, _)| Bson::Document(r)).collect()),
                );
                Ok((doc, score))
            })
            .collect()
    }
}

fn unwind(docs: Vec<Scored>, spec: &Bson) -> Result<Vec<Scored>, SynapticError> {
    let (path, preserve) = match spec {
        Bson::String(p) => (p.as_str(), false),
        Bson::Document(d) => (
            d.get_str("path")
                .map_err(|_| unsupported("$unwind requires path"))?,
            d.get_bool("preserveNullAndEmptyArrays").unwrap_or(false),
        ),
        _ => return Err(unsupported("$unwind spec")),
    };
    let field = path
        .strip_prefix('$')
        .ok_or_else(|| unsupported("$unwind path must start with '$'"))?;

    let mut out = Vec::new();
    for (doc, score) in docs {
        match lookup_path(&doc, field).cloned() {
            Some(Bson::Array(items)) if !items.is_empty() => {
                for item in items {
                    let mut unwound = doc.clone();
                    set_path(&mut unwound, field, item);
                    out.push((unwound, score));
                }
            }
            Some(Bson::Array(_)) | Some(Bson::Null) | None => {
                if preserve {
                    out.push((doc, score));
                }
            }
            Some(_) => out.push((doc, score)),
        }
    }
    Ok(out)
}

fn group(docs: Vec<Scored>, spec: &Record) -> Result<Vec<Scored>, SynapticError> {
    let id_expr = spec
        .get("_id")
        .ok_or_else(|| unsupported("$group requires _id"))?;

    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, Record> = HashMap::new();

    for (doc, score) in docs {
        let id = eval(id_expr, &doc, score)?.unwrap_or(Bson::Null);
        let key = value_key(&id);
        let is_new = !groups.contains_key(&key);
        let out = groups.entry(key.clone()).or_insert_with(|| {
            let mut g = Record::new();
            g.insert("_id", id);
            g
        });
        if is_new {
            order.push(key);
        }

        for (field, acc) in spec.iter().filter(|(k, _)| k.as_str() != "_id") {
            let (acc_op, expr) = match acc {
                Bson::Document(d) if d.len() == 1 => stage_parts(d)?,
                _ => return Err(unsupported("$group accumulator")),
            };
            let value = eval(expr, &doc, score)?.unwrap_or(Bson::Null);
            match acc_op {
                "$first" => {
                    if is_new {
                        out.insert(field, value);
                    }
                }
                "$push" => match out.get_mut(field) {
                    Some(Bson::Array(items)) => items.push(value),
                    _ => {
                        out.insert(field, Bson::Array(vec![value]));
                    }
                },
                other => return Err(unsupported(&format!("accumulator {other}"))),
            }
        }
    }

    Ok(order
        .into_iter()
        .filter_map(|k| groups.remove(&k))
        .map(|g| (g, None))
        .collect())
}

/// Evaluate an aggregation expression against a document.
///
/// `"$a.b"` resolves a field path, `{ "$meta": "vectorSearchScore" }` yields
/// the search score, anything else is a literal. `None` means the path is
/// missing.
fn eval(expr: &Bson, doc: &Record, score: Option<f64>) -> Result<Option<Bson>, SynapticError> {
    match expr {
        Bson::String(s) if s.starts_with('$') => Ok(lookup_path(doc, &s[1..]).cloned()),
        Bson::Document(d) if d.contains_key("$meta") => match d.get_str("$meta") {
            Ok("vectorSearchScore") => score.map(|s| Some(Bson::Double(s))).ok_or_else(|| {
                SynapticError::Store(
                    "$meta vectorSearchScore is only available after $vectorSearch".to_string(),
                )
            }),
            _ => Err(unsupported("$meta value")),
        },
        other => Ok(Some(other.clone())),
    }
}

// ---------------------------------------------------------------------------
// Query matching and projection
// ---------------------------------------------------------------------------

fn matches(record: &Record, filter: &Record) -> Result<bool, SynapticError> {
    for (key, cond) in filter {
        let ok = match key.as_str() {
            "$and" | "$or" => {
                let clauses = match cond {
                    Bson::Array(items) => items,
                    _ => return Err(unsupported("$and/$or requires an array")),
                };
                let mut results = Vec::with_capacity(clauses.len());
                for clause in clauses {
                    match clause {
                        Bson::Document(sub) => results.push(matches(record, sub)?),
                        _ => return Err(unsupported("$and/$or clauses must be documents")),
                    }
                }
                if key == "$and" {
                    results.iter().all(|r| *r)
                } else {
                    results.iter().any(|r| *r)
                }
            }
            field => matches_condition(lookup_path(record, field), cond)?,
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn matches_condition(value: Option<&Bson>, cond: &Bson) -> Result<bool, SynapticError> {
    let ops = match cond {
        Bson::Document(d) if d.keys().next().is_some_and(|k| k.starts_with('$')) => d,
        literal => return Ok(equals(value, literal)),
    };

    for (op, arg) in ops {
        let ok = match op.as_str() {
            "$eq" => equals(value, arg),
            "$ne" => !equals(value, arg),
            "$in" | "$nin" => {
                let candidates = match arg {
                    Bson::Array(items) => items,
                    _ => return Err(unsupported("$in/$nin requires an array")),
                };
                let found = candidates.iter().any(|c| equals(value, c));
                if op == "$in" {
                    found
                } else {
                    !found
                }
            }
            "$exists" => value.is_some() == truthy(arg),
            "$regex" => {
                let pattern = match arg {
                    Bson::String(p) => p,
                    _ => return Err(unsupported("$regex requires a string pattern")),
                };
                let case_insensitive = ops
                    .get_str("$options")
                    .map(|o| o.contains('i'))
                    .unwrap_or(false);
                let re = RegexBuilder::new(pattern)
                    .case_insensitive(case_insensitive)
                    .build()
                    .map_err(|e| SynapticError::Store(format!("invalid $regex: {e}")))?;
                matches!(value, Some(Bson::String(s)) if re.is_match(s))
            }
            "$options" => true,
            other => return Err(unsupported(&format!("query operator {other}"))),
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Equality with MongoDB's array semantics: a scalar target matches an
/// array field containing it, and a missing field equals `null`.
fn equals(value: Option<&Bson>, target: &Bson) -> bool {
    match (value, target) {
        (None, Bson::Null) => true,
        (None, _) => false,
        (Some(Bson::Array(items)), t) if !matches!(t, Bson::Array(_)) => {
            items.iter().any(|item| bson_eq(item, t))
        }
        (Some(v), t) => bson_eq(v, t),
    }
}

fn project(record: Record, spec: &Record) -> Record {
    let inclusion = spec.iter().any(|(_, v)| truthy(v));
    if !inclusion {
        let mut out = record;
        for (field, _) in spec {
            out.remove(field);
        }
        return out;
    }

    let mut out = Record::new();
    let keep_id = spec.get("_id").map(truthy).unwrap_or(true);
    if keep_id {
        if let Some(id) = record.get("_id") {
            out.insert("_id", id.clone());
        }
    }
    for (field, flag) in spec {
        if field != "_id" && truthy(flag) {
            if let Some(value) = record.get(field) {
                out.insert(field.as_str(), value.clone());
            }
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn lookup_path<'a>(record: &'a Record, path: &str) -> Option<&'a Bson> {
    let mut parts = path.split('.');
    let mut current = record.get(parts.next()?)?;
    for part in parts {
        current = match current {
            Bson::Document(d) => d.get(part)?,
            _ => return None,
        };
    }
    Some(current)
}

fn set_path(record: &mut Record, path: &str, value: Bson) {
    match path.split_once('.') {
        None => {
            record.insert(path, value);
        }
        Some((head, rest)) => {
            if !matches!(record.get(head), Some(Bson::Document(_))) {
                record.insert(head, Record::new());
            }
            if let Some(Bson::Document(child)) = record.get_mut(head) {
                set_path(child, rest, value);
            }
        }
    }
}

fn stage_parts(stage: &Record) -> Result<(&str, &Bson), SynapticError> {
    let mut iter = stage.iter();
    match (iter.next(), iter.next()) {
        (Some((op, spec)), None) => Ok((op.as_str(), spec)),
        _ => Err(unsupported("stages must have exactly one operator")),
    }
}

fn as_doc<'a>(spec: &'a Bson, op: &str) -> Result<&'a Record, SynapticError> {
    match spec {
        Bson::Document(d) => Ok(d),
        _ => Err(unsupported(&format!("{op} requires a document"))),
    }
}

fn as_f64(value: &Bson) -> Option<f64> {
    match value {
        Bson::Double(f) => Some(*f),
        Bson::Int32(i) => Some(*i as f64),
        Bson::Int64(i) => Some(*i as f64),
        _ => None,
    }
}

fn as_usize(value: &Bson) -> Option<usize> {
    match value {
        Bson::Int32(i) if *i >= 0 => Some(*i as usize),
        Bson::Int64(i) if *i >= 0 => Some(*i as usize),
        Bson::Double(f) if *f >= 0.0 => Some(*f as usize),
        _ => None,
    }
}

fn truthy(value: &Bson) -> bool {
    match value {
        Bson::Boolean(b) => *b,
        Bson::Int32(i) => *i != 0,
        Bson::Int64(i) => *i != 0,
        Bson::Double(f) => *f != 0.0,
        Bson::Null => false,
        _ => true,
    }
}

/// Hashable identity for a BSON value. Integral numbers share one key
/// whatever their BSON type.
fn value_key(value: &Bson) -> String {
    match value {
        Bson::Int32(i) => format!("Int({i})"),
        Bson::Int64(i) => format!("Int({i})"),
        Bson::Double(f) if f.fract() == 0.0 && f.abs() < 9.0e15 => format!("Int({})", *f as i64),
        Bson::Double(f) => format!("Double({f:?})"),
        other => format!("{other:?}"),
    }
}

/// Equality with numeric types compared by value.
fn bson_eq(a: &Bson, b: &Bson) -> bool {
    match (as_f64(a), as_f64(b)) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn sort_keys(spec: &Record) -> Result<Vec<(&str, bool)>, SynapticError> {
    spec.iter()
        .map(|(field, direction)| match as_f64(direction) {
            Some(d) if d == 1.0 => Ok((field.as_str(), false)),
            Some(d) if d == -1.0 => Ok((field.as_str(), true)),
            _ => Err(unsupported("$sort direction (use 1 or -1)")),
        })
        .collect()
}

/// Ascending order over the value types the pipelines sort on:
/// missing/null, then numbers, then strings, then everything else.
fn compare_values(a: Option<&Bson>, b: Option<&Bson>) -> Ordering {
    fn rank(value: Option<&Bson>) -> u8 {
        match value {
            None | Some(Bson::Null) => 0,
            Some(v) if as_f64(v).is_some() => 1,
            Some(Bson::String(_)) => 2,
            Some(Bson::Boolean(_)) => 4,
            Some(_) => 3,
        }
    }

    if let (Some(x), Some(y)) = (a.and_then(as_f64), b.and_then(as_f64)) {
        return x.partial_cmp(&y).unwrap_or(Ordering::Equal);
    }
    match (a, b) {
        (Some(Bson::String(x)), Some(Bson::String(y))) => x.cmp(y),
        (Some(Bson::Boolean(x)), Some(Bson::Boolean(y))) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

fn unsupported(what: &str) -> SynapticError {
    SynapticError::Store(format!("InMemoryCollection: unsupported {what}"))
}

/// Compute cosine similarity between two vectors.
fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f64 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f64 = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let mag_b: f64 = b.iter().map(|x| x * x).sum::<f64>().sqrt();

    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }

    dot / (mag_a * mag_b)
}
