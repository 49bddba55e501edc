//! In-memory storage implementation.
//!
//! Documents are kept per collection in insertion order inside async-aware
//! read-write locks, so the "natural return order" of an unsorted query is
//! the order documents were written. Unique indexes are enforced on insert
//! and replace, and the counter primitive is atomic under the collection
//! write lock.

use async_trait::async_trait;
use bson::{Bson, Document, doc};
use mea::rwlock::RwLock;
use std::{
    cmp::Ordering,
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering as AtomicOrdering},
    },
};

use modelbind_core::{
    backend::{ConnectionTarget, Connector, DatabaseBackend, FindQuery},
    error::{ModelError, ModelResult},
    index::{IndexSpec, SortDirection},
};

use crate::evaluator::{compare_field, matches_filter, values_eq};

type CollectionMap = HashMap<String, Vec<Document>>;

/// Thread-safe in-memory document storage backend.
///
/// Cloneable: clones share the same underlying state, so a connector can
/// hand the registry a handle while tests keep another for inspection.
///
/// Queries scan every document in a collection; indexes are bookkeeping for
/// uniqueness enforcement and reconciliation, not an access path. That is
/// fine for the datasets this backend is meant for (development and tests).
#[derive(Default, Clone, Debug)]
pub struct MemoryBackend {
    /// collection name -> documents in insertion order
    collections: Arc<RwLock<CollectionMap>>,
    /// collection name -> created index specifications
    indexes: Arc<RwLock<HashMap<String, Vec<IndexSpec>>>>,
    /// total create_index calls, for reconciliation tests
    index_creates: Arc<AtomicUsize>,
    closed: Arc<AtomicBool>,
}

impl MemoryBackend {
    /// Creates a new empty in-memory backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// How many times `create_index` has been called on this backend.
    pub fn index_create_calls(&self) -> usize {
        self.index_creates.load(AtomicOrdering::SeqCst)
    }

    fn ensure_open(&self) -> ModelResult<()> {
        if self.closed.load(AtomicOrdering::SeqCst) {
            return Err(ModelError::StorageUnavailable(
                "in-memory backend is closed".to_string(),
            ));
        }
        Ok(())
    }

    /// Finds the unique index (implicit `_id` included) that `candidate`
    /// would violate against `existing`, skipping the document at `skip`.
    fn unique_violation(
        specs: &[IndexSpec],
        existing: &[Document],
        candidate: &Document,
        skip: Option<usize>,
    ) -> Option<String> {
        let candidate_id = candidate.get("_id");
        for (position, doc) in existing.iter().enumerate() {
            if Some(position) == skip {
                continue;
            }
            if let (Some(a), Some(b)) = (candidate_id, doc.get("_id")) {
                if values_eq(a, b) {
                    return Some("_id_".to_string());
                }
            }
        }

        for spec in specs.iter().filter(|spec| spec.unique) {
            for (position, doc) in existing.iter().enumerate() {
                if Some(position) == skip {
                    continue;
                }
                let collides = spec.keys.iter().all(|(field, _)| {
                    match (candidate.get(field), doc.get(field)) {
                        (Some(a), Some(b)) => values_eq(a, b),
                        (None, None) => true,
                        _ => false,
                    }
                });
                if collides {
                    return Some(spec.effective_name());
                }
            }
        }

        None
    }

    fn apply_sort(documents: &mut [Document], field: &str, direction: SortDirection) {
        documents.sort_by(|a, b| {
            let ordering = compare_field(a, b, field);
            match direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            }
        });
    }
}

#[async_trait]
impl DatabaseBackend for MemoryBackend {
    async fn insert_many(&self, collection: &str, documents: Vec<Document>) -> ModelResult<()> {
        self.ensure_open()?;
        let mut store = self.collections.write().await;
        let specs = self
            .indexes
            .read()
            .await
            .get(collection)
            .cloned()
            .unwrap_or_default();
        let docs = store.entry(collection.to_string()).or_default();

        // Ordered batch: documents before an offending one stay persisted.
        for document in documents {
            if let Some(index) = Self::unique_violation(&specs, docs, &document, None) {
                return Err(ModelError::DuplicateKey {
                    collection: collection.to_string(),
                    message: format!("index {index} violated"),
                });
            }
            docs.push(document);
        }

        Ok(())
    }

    async fn find_one(&self, collection: &str, filter: Document) -> ModelResult<Option<Document>> {
        Ok(self
            .find(collection, filter, FindQuery::default().limit(1))
            .await?
            .into_iter()
            .next())
    }

    async fn find(
        &self,
        collection: &str,
        filter: Document,
        query: FindQuery,
    ) -> ModelResult<Vec<Document>> {
        self.ensure_open()?;
        let store = self.collections.read().await;
        let Some(docs) = store.get(collection) else {
            return Ok(Vec::new());
        };

        let mut matched = Vec::new();
        for doc in docs {
            if matches_filter(doc, &filter)? {
                matched.push(doc.clone());
            }
        }

        if let Some(sort) = &query.sort {
            Self::apply_sort(&mut matched, &sort.field, sort.direction);
        }

        let skip = query.skip.unwrap_or(0) as usize;
        let limit = query.limit.map_or(usize::MAX, |l| l as usize);
        Ok(matched.into_iter().skip(skip).take(limit).collect())
    }

    async fn replace_one(
        &self,
        collection: &str,
        filter: Document,
        replacement: Document,
    ) -> ModelResult<u64> {
        self.ensure_open()?;
        let mut store = self.collections.write().await;
        let specs = self
            .indexes
            .read()
            .await
            .get(collection)
            .cloned()
            .unwrap_or_default();
        let Some(docs) = store.get_mut(collection) else {
            return Ok(0);
        };

        let mut position = None;
        for (i, doc) in docs.iter().enumerate() {
            if matches_filter(doc, &filter)? {
                position = Some(i);
                break;
            }
        }

        match position {
            None => Ok(0),
            Some(i) => {
                if let Some(index) = Self::unique_violation(&specs, docs, &replacement, Some(i)) {
                    return Err(ModelError::DuplicateKey {
                        collection: collection.to_string(),
                        message: format!("index {index} violated"),
                    });
                }
                docs[i] = replacement;
                Ok(1)
            }
        }
    }

    async fn delete_many(&self, collection: &str, filter: Document) -> ModelResult<u64> {
        self.ensure_open()?;
        let mut store = self.collections.write().await;
        let Some(docs) = store.get_mut(collection) else {
            return Ok(0);
        };

        let mut kept = Vec::with_capacity(docs.len());
        let mut removed = 0;
        for doc in std::mem::take(docs) {
            if matches_filter(&doc, &filter)? {
                removed += 1;
            } else {
                kept.push(doc);
            }
        }
        *docs = kept;

        Ok(removed)
    }

    async fn count(&self, collection: &str, filter: Document) -> ModelResult<u64> {
        self.ensure_open()?;
        let store = self.collections.read().await;
        let Some(docs) = store.get(collection) else {
            return Ok(0);
        };

        let mut count = 0;
        for doc in docs {
            if matches_filter(doc, &filter)? {
                count += 1;
            }
        }

        Ok(count)
    }

    async fn distinct(
        &self,
        collection: &str,
        field: &str,
        filter: Document,
    ) -> ModelResult<Vec<Bson>> {
        self.ensure_open()?;
        let store = self.collections.read().await;
        let Some(docs) = store.get(collection) else {
            return Ok(Vec::new());
        };

        let mut values: Vec<Bson> = Vec::new();
        for doc in docs {
            if !matches_filter(doc, &filter)? {
                continue;
            }
            if let Some(value) = doc.get(field) {
                if !values.iter().any(|existing| values_eq(existing, value)) {
                    values.push(value.clone());
                }
            }
        }

        Ok(values)
    }

    async fn aggregate(
        &self,
        collection: &str,
        pipeline: Vec<Document>,
    ) -> ModelResult<Vec<Document>> {
        self.ensure_open()?;
        let mut docs = {
            let store = self.collections.read().await;
            store.get(collection).cloned().unwrap_or_default()
        };

        for stage in &pipeline {
            let mut elements = stage.iter();
            let Some((operator, spec)) = elements.next() else {
                return Err(ModelError::Backend("empty aggregation stage".to_string()));
            };
            if elements.next().is_some() {
                return Err(ModelError::Backend(
                    "aggregation stages must contain exactly one operator".to_string(),
                ));
            }

            match operator.as_str() {
                "$match" => {
                    let filter = spec.as_document().ok_or_else(|| {
                        ModelError::Backend("$match requires a document".to_string())
                    })?;
                    let mut retained = Vec::with_capacity(docs.len());
                    for doc in docs {
                        if matches_filter(&doc, filter)? {
                            retained.push(doc);
                        }
                    }
                    docs = retained;
                }
                "$sort" => {
                    let keys = spec.as_document().ok_or_else(|| {
                        ModelError::Backend("$sort requires a document".to_string())
                    })?;
                    docs.sort_by(|a, b| {
                        for (field, direction) in keys {
                            let mut ordering = compare_field(a, b, field);
                            if matches!(direction, Bson::Int32(v) if *v < 0)
                                || matches!(direction, Bson::Int64(v) if *v < 0)
                            {
                                ordering = ordering.reverse();
                            }
                            if ordering != Ordering::Equal {
                                return ordering;
                            }
                        }
                        Ordering::Equal
                    });
                }
                "$skip" => {
                    let n = stage_integer(spec, "$skip")?;
                    docs = docs.into_iter().skip(n).collect();
                }
                "$limit" => {
                    let n = stage_integer(spec, "$limit")?;
                    docs.truncate(n);
                }
                "$count" => {
                    let name = spec.as_str().ok_or_else(|| {
                        ModelError::Backend("$count requires a field name".to_string())
                    })?;
                    docs = vec![doc! { name: docs.len() as i64 }];
                }
                other => {
                    return Err(ModelError::Backend(format!(
                        "unsupported aggregation stage {other}"
                    )));
                }
            }
        }

        Ok(docs)
    }

    async fn increment_counter(&self, collection: &str, key: &str) -> ModelResult<i64> {
        self.ensure_open()?;
        let mut store = self.collections.write().await;
        let docs = store.entry(collection.to_string()).or_default();

        for doc in docs.iter_mut() {
            if doc.get("_id").and_then(|id| id.as_str()) == Some(key) {
                let current = match doc.get("seq") {
                    Some(Bson::Int64(v)) => *v,
                    Some(Bson::Int32(v)) => i64::from(*v),
                    _ => {
                        return Err(ModelError::Backend(format!(
                            "malformed counter document for {key}"
                        )));
                    }
                };
                let next = current + 1;
                doc.insert("seq", Bson::Int64(next));
                return Ok(next);
            }
        }

        docs.push(doc! { "_id": key, "seq": 1_i64 });
        Ok(1)
    }

    async fn list_indexes(&self, collection: &str) -> ModelResult<Vec<IndexSpec>> {
        self.ensure_open()?;
        Ok(self
            .indexes
            .read()
            .await
            .get(collection)
            .cloned()
            .unwrap_or_default())
    }

    async fn create_index(&self, collection: &str, spec: IndexSpec) -> ModelResult<()> {
        self.ensure_open()?;
        self.index_creates.fetch_add(1, AtomicOrdering::SeqCst);

        let mut indexes = self.indexes.write().await;
        let specs = indexes.entry(collection.to_string()).or_default();
        if let Some(existing) = specs
            .iter()
            .find(|existing| existing.key_pattern() == spec.key_pattern())
        {
            if existing.unique == spec.unique {
                return Ok(());
            }
            return Err(ModelError::IndexConflict {
                collection: collection.to_string(),
                index: spec.key_pattern(),
            });
        }
        specs.push(spec);

        Ok(())
    }

    async fn close(&self) -> ModelResult<()> {
        self.closed.store(true, AtomicOrdering::SeqCst);
        Ok(())
    }
}

fn stage_integer(spec: &Bson, stage: &str) -> ModelResult<usize> {
    match spec {
        Bson::Int32(v) if *v >= 0 => Ok(*v as usize),
        Bson::Int64(v) if *v >= 0 => Ok(*v as usize),
        _ => Err(ModelError::Backend(format!(
            "{stage} requires a non-negative integer"
        ))),
    }
}

/// Connector handing every target the same shared in-memory store.
///
/// Keep a clone of the connector (or its [`backend`](MemoryConnector::backend))
/// to inspect state from tests; [`connect_count`](MemoryConnector::connect_count)
/// reports how many times the registry actually connected.
#[derive(Debug, Default, Clone)]
pub struct MemoryConnector {
    backend: MemoryBackend,
    connects: Arc<AtomicUsize>,
}

impl MemoryConnector {
    /// Creates a connector over a fresh backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// A handle sharing the connector's backend state.
    pub fn backend(&self) -> MemoryBackend {
        self.backend.clone()
    }

    /// How many times `connect` has been called.
    pub fn connect_count(&self) -> usize {
        self.connects.load(AtomicOrdering::SeqCst)
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, _target: &ConnectionTarget) -> ModelResult<Arc<dyn DatabaseBackend>> {
        self.connects.fetch_add(1, AtomicOrdering::SeqCst);
        Ok(Arc::new(self.backend.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::join_all;

    #[tokio::test]
    async fn documents_return_in_insertion_order() {
        let backend = MemoryBackend::new();
        backend
            .insert_many(
                "items",
                vec![
                    doc! { "_id": 1_i64, "rank": 3 },
                    doc! { "_id": 2_i64, "rank": 1 },
                    doc! { "_id": 3_i64, "rank": 2 },
                ],
            )
            .await
            .unwrap();

        let docs = backend
            .find("items", doc! {}, FindQuery::default())
            .await
            .unwrap();
        let ids: Vec<i64> = docs.iter().map(|d| d.get_i64("_id").unwrap()).collect();
        assert_eq!(ids, vec![1, 2, 3]);

        let sorted = backend
            .find(
                "items",
                doc! {},
                FindQuery::default().sort("rank", SortDirection::Asc),
            )
            .await
            .unwrap();
        let ranks: Vec<i32> = sorted.iter().map(|d| d.get_i32("rank").unwrap()).collect();
        assert_eq!(ranks, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn ordered_insert_stops_at_the_first_duplicate() {
        let backend = MemoryBackend::new();
        backend
            .create_index("users", IndexSpec::single("email", true))
            .await
            .unwrap();

        let err = backend
            .insert_many(
                "users",
                vec![
                    doc! { "_id": 1_i64, "email": "a@example.com" },
                    doc! { "_id": 2_i64, "email": "a@example.com" },
                    doc! { "_id": 3_i64, "email": "b@example.com" },
                ],
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ModelError::DuplicateKey { .. }));
        assert_eq!(backend.count("users", doc! {}).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn duplicate_ids_are_rejected() {
        let backend = MemoryBackend::new();
        backend
            .insert_many("items", vec![doc! { "_id": 1_i64 }])
            .await
            .unwrap();
        let err = backend
            .insert_many("items", vec![doc! { "_id": 1_i64 }])
            .await
            .unwrap_err();
        assert!(matches!(err, ModelError::DuplicateKey { .. }));
    }

    #[tokio::test]
    async fn replace_one_reports_matches() {
        let backend = MemoryBackend::new();
        backend
            .insert_many("items", vec![doc! { "_id": 1_i64, "state": "new" }])
            .await
            .unwrap();

        let matched = backend
            .replace_one(
                "items",
                doc! { "_id": 1_i64 },
                doc! { "_id": 1_i64, "state": "done" },
            )
            .await
            .unwrap();
        assert_eq!(matched, 1);

        let missed = backend
            .replace_one("items", doc! { "_id": 9_i64 }, doc! { "_id": 9_i64 })
            .await
            .unwrap();
        assert_eq!(missed, 0);

        let doc = backend
            .find_one("items", doc! { "_id": 1_i64 })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(doc.get_str("state").unwrap(), "done");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn counter_is_atomic_and_monotonic() {
        let backend = MemoryBackend::new();

        let tasks: Vec<_> = (0..100)
            .map(|_| {
                let backend = backend.clone();
                tokio::spawn(async move {
                    backend
                        .increment_counter("_model_id_counters", "user")
                        .await
                        .unwrap()
                })
            })
            .collect();

        let mut issued: Vec<i64> = join_all(tasks)
            .await
            .into_iter()
            .map(|task| task.unwrap())
            .collect();
        issued.sort_unstable();

        let expected: Vec<i64> = (1..=100).collect();
        assert_eq!(issued, expected);
    }

    #[tokio::test]
    async fn aggregation_supports_the_basic_stages() {
        let backend = MemoryBackend::new();
        backend
            .insert_many(
                "posts",
                vec![
                    doc! { "_id": 1_i64, "published": true, "views": 10 },
                    doc! { "_id": 2_i64, "published": false, "views": 5 },
                    doc! { "_id": 3_i64, "published": true, "views": 20 },
                ],
            )
            .await
            .unwrap();

        let results = backend
            .aggregate(
                "posts",
                vec![
                    doc! { "$match": { "published": true } },
                    doc! { "$sort": { "views": -1 } },
                    doc! { "$limit": 1_i64 },
                ],
            )
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].get_i64("_id").unwrap(), 3);

        let counted = backend
            .aggregate(
                "posts",
                vec![
                    doc! { "$match": { "published": true } },
                    doc! { "$count": "published_posts" },
                ],
            )
            .await
            .unwrap();
        assert_eq!(counted, vec![doc! { "published_posts": 2_i64 }]);

        let err = backend
            .aggregate("posts", vec![doc! { "$lookup": { } }])
            .await
            .unwrap_err();
        assert!(matches!(err, ModelError::Backend(_)));
    }

    #[tokio::test]
    async fn closed_backends_refuse_operations() {
        let backend = MemoryBackend::new();
        backend.close().await.unwrap();

        let err = backend
            .insert_many("items", vec![doc! { "_id": 1_i64 }])
            .await
            .unwrap_err();
        assert!(matches!(err, ModelError::StorageUnavailable(_)));
    }
}
