//! Monotonic integer identifier issuance.
//!
//! Counters are durable documents in a reserved collection, one per managed
//! collection name, advanced exclusively through the backend's atomic
//! upsert-and-return increment. There is no non-atomic fallback: if the
//! counter store is unreachable the call fails with `StorageUnavailable` and
//! the caller decides what to do.

use std::sync::Arc;

use crate::{backend::DatabaseBackend, error::ModelResult};

/// The reserved collection holding one `{ _id: <collection>, seq }` document
/// per managed collection.
pub const COUNTER_COLLECTION: &str = "_model_id_counters";

/// Issues strictly increasing integer identifiers for sequential-id models.
///
/// Only engaged for record types whose identifier type opts into the
/// sequential strategy; native-id types never touch the counter store.
#[derive(Debug, Clone)]
pub struct IdSequencer {
    backend: Arc<dyn DatabaseBackend>,
}

impl IdSequencer {
    /// Creates a sequencer issuing ids through `backend`.
    pub fn new(backend: Arc<dyn DatabaseBackend>) -> Self {
        Self { backend }
    }

    /// Returns the next identifier for `collection`.
    ///
    /// Atomic and monotonic: issuance order equals arrival order at the
    /// counter store, values are never reused, and the first id issued for a
    /// collection is `1`.
    pub async fn next_id(&self, collection: &str) -> ModelResult<i64> {
        self.backend
            .increment_counter(COUNTER_COLLECTION, collection)
            .await
    }
}
