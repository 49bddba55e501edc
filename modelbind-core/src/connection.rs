//! Process-wide cache of backend handles, one per connection target.
//!
//! The registry is an explicit, constructed object with a documented
//! lifecycle (`get_or_create`, `close_all`) rather than hidden module-level
//! state. Handles are created lazily, shared read-only by every record type
//! bound to the same target, and closed only during orderly shutdown.

use mea::rwlock::RwLock;
use std::{collections::HashMap, sync::Arc};

use crate::{
    backend::{ConnectionTarget, Connector, DatabaseBackend},
    error::{ModelError, ModelResult},
};

/// Caches one live [`DatabaseBackend`] handle per distinct
/// [`ConnectionTarget`].
pub struct ConnectionRegistry {
    connector: Box<dyn Connector>,
    clients: RwLock<HashMap<ConnectionTarget, Arc<dyn DatabaseBackend>>>,
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRegistry").finish_non_exhaustive()
    }
}

impl ConnectionRegistry {
    /// Creates an empty registry backed by `connector`.
    pub fn new(connector: impl Connector) -> Self {
        Self { connector: Box::new(connector), clients: RwLock::new(HashMap::new()) }
    }

    /// Returns the shared handle for `target`, connecting on first use.
    ///
    /// Creation holds the registry lock so a target never receives two live
    /// clients; callers that hit the cache take only a read lock.
    pub async fn get_or_create(
        &self,
        target: &ConnectionTarget,
    ) -> ModelResult<Arc<dyn DatabaseBackend>> {
        if let Some(client) = self.clients.read().await.get(target) {
            return Ok(client.clone());
        }

        let mut clients = self.clients.write().await;
        if let Some(client) = clients.get(target) {
            return Ok(client.clone());
        }

        tracing::info!(uri = %target.uri, database = %target.database, "connecting");
        let client = self.connector.connect(target).await?;
        clients.insert(target.clone(), client.clone());

        Ok(client)
    }

    /// The number of live handles.
    pub async fn len(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Whether no handle has been created yet.
    pub async fn is_empty(&self) -> bool {
        self.clients.read().await.is_empty()
    }

    /// Closes every cached handle and empties the cache.
    ///
    /// Each handle is closed even if an earlier one fails; the first failure
    /// is returned after the sweep completes.
    pub async fn close_all(&self) -> ModelResult<()> {
        let drained: Vec<(ConnectionTarget, Arc<dyn DatabaseBackend>)> =
            self.clients.write().await.drain().collect();

        let mut first_error: Option<ModelError> = None;
        for (target, client) in drained {
            if let Err(err) = client.close().await {
                tracing::warn!(uri = %target.uri, error = %err, "failed to close connection");
                first_error.get_or_insert(err);
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
