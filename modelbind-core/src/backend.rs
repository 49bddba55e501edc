//! Storage backend abstraction.
//!
//! This module defines the traits that abstract over concrete document-store
//! drivers. The executor, sequencer, and index manager all speak to storage
//! exclusively through [`DatabaseBackend`]; the [`Connector`] turns a
//! [`ConnectionTarget`] into a shared backend handle.
//!
//! Implementations are required to be thread-safe and to translate their
//! native driver errors into [`ModelError`](crate::error::ModelError)
//! variants before returning; driver error types never cross this boundary.
//! Single-document writes and [`increment_counter`](DatabaseBackend::increment_counter)
//! must be atomic at the document level.

use async_trait::async_trait;
use bson::{Bson, Document};
use std::{fmt::Debug, sync::Arc};

use crate::{
    error::ModelResult,
    index::{IndexSpec, SortDirection},
};

/// A distinct connection destination: one live client handle exists per
/// target at any time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionTarget {
    /// Connection string understood by the backend (e.g. a MongoDB URI).
    pub uri: String,
    /// The database name within that deployment.
    pub database: String,
}

impl ConnectionTarget {
    /// Creates a connection target.
    pub fn new(uri: impl Into<String>, database: impl Into<String>) -> Self {
        Self { uri: uri.into(), database: database.into() }
    }
}

/// Sort specification for query results.
#[derive(Debug, Clone)]
pub struct Sort {
    /// The field name to sort by.
    pub field: String,
    /// The sort direction.
    pub direction: SortDirection,
}

/// Options applied to a `find`: slicing and ordering.
///
/// The default requests the store's natural return order with no limit;
/// no sort is ever applied implicitly.
#[derive(Debug, Clone, Default)]
pub struct FindQuery {
    /// Maximum number of documents to return.
    pub limit: Option<u64>,
    /// Number of documents to skip.
    pub skip: Option<u64>,
    /// Requested ordering, if any.
    pub sort: Option<Sort>,
}

impl FindQuery {
    /// Sets the maximum number of documents to return.
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Sets the number of documents to skip.
    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = Some(skip);
        self
    }

    /// Requests an ordering on `field`.
    pub fn sort(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.sort = Some(Sort { field: field.into(), direction });
        self
    }
}

/// Abstract interface to a document store.
///
/// All methods are async suspension points; CPU-bound work stays outside this
/// trait. Filters and aggregation pipelines are passed through in the store's
/// native document format.
#[async_trait]
pub trait DatabaseBackend: Send + Sync + Debug {
    /// Inserts documents into a collection as one ordered batch.
    ///
    /// A uniqueness violation surfaces as
    /// [`ModelError::DuplicateKey`](crate::error::ModelError::DuplicateKey);
    /// with an ordered batch, documents before the offending one remain
    /// persisted.
    async fn insert_many(&self, collection: &str, documents: Vec<Document>) -> ModelResult<()>;

    /// Returns the first document matching `filter`, in natural order.
    async fn find_one(&self, collection: &str, filter: Document) -> ModelResult<Option<Document>>;

    /// Returns all documents matching `filter`, honoring `query` slicing and
    /// ordering. No sort is applied unless requested.
    async fn find(
        &self,
        collection: &str,
        filter: Document,
        query: FindQuery,
    ) -> ModelResult<Vec<Document>>;

    /// Replaces the first document matching `filter` entirely.
    ///
    /// Returns the number of documents matched (`0` or `1`).
    async fn replace_one(
        &self,
        collection: &str,
        filter: Document,
        replacement: Document,
    ) -> ModelResult<u64>;

    /// Deletes all documents matching `filter`; an empty filter deletes every
    /// document in the collection. Returns the number deleted.
    async fn delete_many(&self, collection: &str, filter: Document) -> ModelResult<u64>;

    /// Counts documents matching `filter`.
    async fn count(&self, collection: &str, filter: Document) -> ModelResult<u64>;

    /// Returns the distinct values of `field` across documents matching
    /// `filter`.
    async fn distinct(
        &self,
        collection: &str,
        field: &str,
        filter: Document,
    ) -> ModelResult<Vec<Bson>>;

    /// Runs a store-native aggregation pipeline and returns the raw result
    /// documents.
    async fn aggregate(
        &self,
        collection: &str,
        pipeline: Vec<Document>,
    ) -> ModelResult<Vec<Document>>;

    /// Atomically increments the counter document keyed `key` in
    /// `collection`, creating it at `1` if absent, and returns the new value.
    ///
    /// This is the find-and-modify primitive behind the identifier sequencer:
    /// concurrent callers across processes must never observe the same value.
    async fn increment_counter(&self, collection: &str, key: &str) -> ModelResult<i64>;

    /// Lists the indexes that exist on a collection.
    ///
    /// Indexes whose key patterns this layer cannot represent (e.g. text
    /// indexes) are omitted.
    async fn list_indexes(&self, collection: &str) -> ModelResult<Vec<IndexSpec>>;

    /// Creates an index. The caller is responsible for reconciliation; see
    /// [`ensure_indexes`](crate::index::ensure_indexes).
    async fn create_index(&self, collection: &str, spec: IndexSpec) -> ModelResult<()>;

    /// Releases the backend's resources. Further use of this handle fails
    /// with [`ModelError::StorageUnavailable`](crate::error::ModelError::StorageUnavailable).
    async fn close(&self) -> ModelResult<()>;
}

/// Factory turning a [`ConnectionTarget`] into a live backend handle.
///
/// The [`ConnectionRegistry`](crate::connection::ConnectionRegistry) calls
/// this at most once per distinct target and shares the returned handle.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Establishes a connection to `target`.
    async fn connect(&self, target: &ConnectionTarget) -> ModelResult<Arc<dyn DatabaseBackend>>;
}
