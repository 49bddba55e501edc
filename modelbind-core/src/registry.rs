//! Model registration and one-time, single-flight initialization.
//!
//! Each record type owns an initialization cell: an async mutex around its
//! state plus an atomic phase for cheap observation. The first caller to use
//! a type performs the resolve-name → acquire-connection → ensure-indexes
//! sequence while holding the cell's lock; concurrent callers suspend on that
//! per-type lock and observe the same outcome. Unrelated record types use
//! unrelated cells and initialize independently.
//!
//! A failed initialization is cached so repeated use surfaces the same
//! diagnosable error; [`ModelRegistry::reinitialize`] is the explicit retry.

use futures::future::BoxFuture;
use mea::{mutex::Mutex, rwlock::RwLock};
use std::{
    any::TypeId,
    collections::{BTreeMap, HashMap},
    sync::{
        Arc,
        atomic::{AtomicU8, Ordering},
    },
};

use crate::{
    backend::{ConnectionTarget, Connector, DatabaseBackend},
    collection::ModelCollection,
    connection::ConnectionRegistry,
    error::{ModelError, ModelResult},
    index::ensure_indexes,
    model::{CollectionBinding, IdStrategy, Model, ModelIdentifier},
    naming::resolve_collection_name,
    schema::ModelSchema,
};

/// Process-wide defaults consumed by the registry.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// The default connection target for record types without an override.
    pub target: ConnectionTarget,
    /// Whether [`ModelRegistry::register_all`] stops at the first failure.
    /// Defaults to `false`: one type's failure does not block the others.
    pub fail_fast: bool,
}

impl RegistryConfig {
    /// Configuration with the given default target.
    pub fn new(uri: impl Into<String>, database: impl Into<String>) -> Self {
        Self { target: ConnectionTarget::new(uri, database), fail_fast: false }
    }

    /// Reads the default target from the `MONGO_URI` and `MONGO_DATABASE`
    /// environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Configuration`] when either variable is unset.
    pub fn from_env() -> ModelResult<Self> {
        let uri = std::env::var("MONGO_URI")
            .map_err(|_| ModelError::Configuration("MONGO_URI is not set".to_string()))?;
        let database = std::env::var("MONGO_DATABASE")
            .map_err(|_| ModelError::Configuration("MONGO_DATABASE is not set".to_string()))?;

        Ok(Self::new(uri, database))
    }

    /// Makes [`ModelRegistry::register_all`] abort on the first failure.
    pub fn fail_fast(mut self) -> Self {
        self.fail_fast = true;
        self
    }
}

/// Observable initialization state of a record type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum InitPhase {
    /// Declared but never used.
    Uninitialized = 0,
    /// A caller is running the setup sequence right now.
    Initializing = 1,
    /// Setup completed; operations are available.
    Ready = 2,
    /// Setup failed; the error is cached on the type.
    Failed = 3,
}

impl InitPhase {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => InitPhase::Initializing,
            2 => InitPhase::Ready,
            3 => InitPhase::Failed,
            _ => InitPhase::Uninitialized,
        }
    }
}

/// Everything a ready record type needs to execute operations.
#[derive(Debug)]
pub struct ModelRuntime {
    pub(crate) binding: CollectionBinding,
    pub(crate) schema: ModelSchema,
    pub(crate) backend: Arc<dyn DatabaseBackend>,
}

enum CellState {
    Uninitialized,
    Ready(Arc<ModelRuntime>),
    Failed(ModelError),
}

/// Per-type initialization cell: the single-flight lock plus the phase.
struct ModelCell {
    state: Mutex<CellState>,
    phase: AtomicU8,
}

impl ModelCell {
    fn new() -> Self {
        Self {
            state: Mutex::new(CellState::Uninitialized),
            phase: AtomicU8::new(InitPhase::Uninitialized as u8),
        }
    }

    fn store_phase(&self, phase: InitPhase) {
        self.phase.store(phase as u8, Ordering::Release);
    }

    fn load_phase(&self) -> InitPhase {
        InitPhase::from_u8(self.phase.load(Ordering::Acquire))
    }
}

/// An explicit, caller-built set of record-type declarations for
/// [`ModelRegistry::register_all`].
///
/// Replaces ambient module scanning: the scope is a finite list the caller
/// assembles at startup.
///
/// # Example
///
/// ```ignore
/// let scope = ModelScope::new().with::<User>().with::<BlogPost>();
/// let report = registry.register_all(&scope).await;
/// ```
#[derive(Default)]
pub struct ModelScope {
    entries: Vec<ScopeEntry>,
}

type InitFn =
    Box<dyn for<'r> Fn(&'r ModelRegistry) -> BoxFuture<'r, ModelResult<CollectionBinding>> + Send + Sync>;

struct ScopeEntry {
    name: &'static str,
    init: InitFn,
}

impl ModelScope {
    /// Creates an empty scope.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a record type to the scope (builder form).
    pub fn with<M: Model>(mut self) -> Self {
        self.add::<M>();
        self
    }

    /// Adds a record type to the scope.
    pub fn add<M: Model>(&mut self) {
        fn initialize_entry<M: Model>(
            registry: &ModelRegistry,
        ) -> BoxFuture<'_, ModelResult<CollectionBinding>> {
            Box::pin(async move {
                registry
                    .runtime_for::<M>()
                    .await
                    .map(|runtime| runtime.binding.clone())
            })
        }

        self.entries.push(ScopeEntry {
            name: M::type_name(),
            init: Box::new(initialize_entry::<M>),
        });
    }

    /// The number of declared record types.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the scope is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Orchestrates per-type initialization and hands out operation surfaces.
pub struct ModelRegistry {
    config: RegistryConfig,
    connections: ConnectionRegistry,
    cells: RwLock<HashMap<TypeId, Arc<ModelCell>>>,
}

impl std::fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelRegistry")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ModelRegistry {
    /// Creates a registry connecting through `connector`.
    pub fn new(connector: impl Connector, config: RegistryConfig) -> Self {
        Self {
            config,
            connections: ConnectionRegistry::new(connector),
            cells: RwLock::new(HashMap::new()),
        }
    }

    /// Initializes a record type, performing real work exactly once.
    ///
    /// Safe to call any number of times, from any number of concurrent
    /// tasks: one caller runs the setup sequence, the rest suspend until it
    /// completes and observe the same outcome. A cached failure is returned
    /// as-is until [`reinitialize`](Self::reinitialize).
    pub async fn initialize<M: Model>(&self) -> ModelResult<()> {
        self.runtime_for::<M>().await.map(|_| ())
    }

    /// Returns the operation surface for a record type, initializing it
    /// lazily if needed.
    pub async fn collection<M: Model>(&self) -> ModelResult<ModelCollection<M>> {
        let runtime = self.runtime_for::<M>().await?;
        Ok(ModelCollection::new(runtime))
    }

    /// Returns the operation surface only if the record type already reached
    /// the ready state.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::NotInitialized`] when the type was never
    /// initialized (or is mid-initialization), or the cached error when its
    /// initialization failed.
    pub async fn try_collection<M: Model>(&self) -> ModelResult<ModelCollection<M>> {
        let cell = self
            .existing_cell(TypeId::of::<M>())
            .await
            .ok_or_else(|| ModelError::NotInitialized { model: M::type_name().to_string() })?;

        match cell.load_phase() {
            InitPhase::Ready | InitPhase::Failed => {
                let state = cell.state.lock().await;
                match &*state {
                    CellState::Ready(runtime) => Ok(ModelCollection::new(runtime.clone())),
                    CellState::Failed(err) => Err(err.clone()),
                    CellState::Uninitialized => {
                        Err(ModelError::NotInitialized { model: M::type_name().to_string() })
                    }
                }
            }
            InitPhase::Uninitialized | InitPhase::Initializing => {
                Err(ModelError::NotInitialized { model: M::type_name().to_string() })
            }
        }
    }

    /// The record type's current initialization phase.
    pub async fn phase<M: Model>(&self) -> InitPhase {
        match self.existing_cell(TypeId::of::<M>()).await {
            Some(cell) => cell.load_phase(),
            None => InitPhase::Uninitialized,
        }
    }

    /// Discards a record type's cached state (including a cached failure) and
    /// initializes it again.
    pub async fn reinitialize<M: Model>(&self) -> ModelResult<()> {
        self.cells.write().await.remove(&TypeId::of::<M>());
        self.initialize::<M>().await
    }

    /// Initializes every record type in `scope`, independently.
    ///
    /// Returns the outcome per type name: the established binding on
    /// success, the initialization error otherwise. With
    /// [`RegistryConfig::fail_fast`] the walk stops after the first failure
    /// and later types are absent from the report.
    pub async fn register_all(
        &self,
        scope: &ModelScope,
    ) -> BTreeMap<&'static str, ModelResult<CollectionBinding>> {
        let mut report = BTreeMap::new();

        for entry in &scope.entries {
            let outcome = (entry.init)(self).await;
            let failed = outcome.is_err();
            report.insert(entry.name, outcome);

            if failed && self.config.fail_fast {
                break;
            }
        }

        report
    }

    /// Closes every cached connection and resets every record type to
    /// uninitialized, for orderly shutdown.
    ///
    /// Operation surfaces handed out earlier keep their (now closed) handles
    /// and will fail with `StorageUnavailable`; fresh use of the registry
    /// reconnects lazily.
    pub async fn close_all_connections(&self) -> ModelResult<()> {
        self.cells.write().await.clear();
        self.connections.close_all().await
    }

    async fn existing_cell(&self, type_id: TypeId) -> Option<Arc<ModelCell>> {
        self.cells.read().await.get(&type_id).cloned()
    }

    async fn cell(&self, type_id: TypeId) -> Arc<ModelCell> {
        if let Some(cell) = self.existing_cell(type_id).await {
            return cell;
        }

        self.cells
            .write()
            .await
            .entry(type_id)
            .or_insert_with(|| Arc::new(ModelCell::new()))
            .clone()
    }

    async fn runtime_for<M: Model>(&self) -> ModelResult<Arc<ModelRuntime>> {
        let cell = self.cell(TypeId::of::<M>()).await;

        // Single flight: concurrent callers suspend here until the first one
        // finishes, then observe the recorded outcome.
        let mut state = cell.state.lock().await;
        match &*state {
            CellState::Ready(runtime) => return Ok(runtime.clone()),
            CellState::Failed(err) => return Err(err.clone()),
            CellState::Uninitialized => {}
        }

        cell.store_phase(InitPhase::Initializing);
        match self.setup::<M>().await {
            Ok(runtime) => {
                let runtime = Arc::new(runtime);
                *state = CellState::Ready(runtime.clone());
                cell.store_phase(InitPhase::Ready);
                tracing::info!(
                    model = M::type_name(),
                    collection = %runtime.binding.collection,
                    "model initialized"
                );
                Ok(runtime)
            }
            Err(err) => {
                *state = CellState::Failed(err.clone());
                cell.store_phase(InitPhase::Failed);
                tracing::error!(model = M::type_name(), error = %err, "model initialization failed");
                Err(err)
            }
        }
    }

    async fn setup<M: Model>(&self) -> ModelResult<ModelRuntime> {
        let settings = M::settings();
        let collection = resolve_collection_name(M::type_name(), settings.collection_name);
        let binding = CollectionBinding {
            model: M::type_name(),
            collection: collection.clone(),
            sequential_ids: <M::Id as ModelIdentifier>::STRATEGY == IdStrategy::Sequential,
            auto_create_indexes: settings.auto_create_indexes(),
        };

        let target = settings
            .connection
            .unwrap_or_else(|| self.config.target.clone());
        let backend = self.connections.get_or_create(&target).await?;

        if binding.auto_create_indexes {
            let created = ensure_indexes(backend.as_ref(), &collection, &M::indexes()).await?;
            tracing::debug!(model = M::type_name(), created, "reconciled declared indexes");
        }

        Ok(ModelRuntime { binding, schema: M::schema(), backend })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::IndexSpec;
    use async_trait::async_trait;
    use bson::{Bson, Document};
    use serde::{Deserialize, Serialize};
    use std::sync::atomic::AtomicUsize;

    #[derive(Debug, Default)]
    struct StubBackend {
        index_creates: AtomicUsize,
        indexes: std::sync::Mutex<Vec<IndexSpec>>,
    }

    #[async_trait]
    impl DatabaseBackend for StubBackend {
        async fn insert_many(&self, _: &str, _: Vec<Document>) -> ModelResult<()> {
            Ok(())
        }
        async fn find_one(&self, _: &str, _: Document) -> ModelResult<Option<Document>> {
            Ok(None)
        }
        async fn find(
            &self,
            _: &str,
            _: Document,
            _: crate::backend::FindQuery,
        ) -> ModelResult<Vec<Document>> {
            Ok(Vec::new())
        }
        async fn replace_one(&self, _: &str, _: Document, _: Document) -> ModelResult<u64> {
            Ok(0)
        }
        async fn delete_many(&self, _: &str, _: Document) -> ModelResult<u64> {
            Ok(0)
        }
        async fn count(&self, _: &str, _: Document) -> ModelResult<u64> {
            Ok(0)
        }
        async fn distinct(&self, _: &str, _: &str, _: Document) -> ModelResult<Vec<Bson>> {
            Ok(Vec::new())
        }
        async fn aggregate(&self, _: &str, _: Vec<Document>) -> ModelResult<Vec<Document>> {
            Ok(Vec::new())
        }
        async fn increment_counter(&self, _: &str, _: &str) -> ModelResult<i64> {
            Ok(1)
        }
        async fn list_indexes(&self, _: &str) -> ModelResult<Vec<IndexSpec>> {
            Ok(self.indexes.lock().unwrap().clone())
        }
        async fn create_index(&self, _: &str, spec: IndexSpec) -> ModelResult<()> {
            self.index_creates.fetch_add(1, Ordering::SeqCst);
            self.indexes.lock().unwrap().push(spec);
            Ok(())
        }
        async fn close(&self) -> ModelResult<()> {
            Ok(())
        }
    }

    struct StubConnector {
        backend: Arc<StubBackend>,
        connects: Arc<AtomicUsize>,
        fail: bool,
    }

    #[async_trait]
    impl Connector for StubConnector {
        async fn connect(
            &self,
            _target: &ConnectionTarget,
        ) -> ModelResult<Arc<dyn DatabaseBackend>> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ModelError::StorageUnavailable("refused".to_string()));
            }
            Ok(self.backend.clone())
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Widget {
        #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
        id: Option<i64>,
        label: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        created_at: Option<bson::DateTime>,
        #[serde(skip_serializing_if = "Option::is_none")]
        updated_at: Option<bson::DateTime>,
    }

    impl Model for Widget {
        type Id = i64;

        fn type_name() -> &'static str {
            "Widget"
        }

        fn indexes() -> Vec<IndexSpec> {
            vec![IndexSpec::single("label", true)]
        }

        fn id(&self) -> Option<i64> {
            self.id
        }
        fn set_id(&mut self, id: i64) {
            self.id = Some(id);
        }
        fn created_at(&self) -> Option<bson::DateTime> {
            self.created_at
        }
        fn set_created_at(&mut self, at: bson::DateTime) {
            self.created_at = Some(at);
        }
        fn updated_at(&self) -> Option<bson::DateTime> {
            self.updated_at
        }
        fn set_updated_at(&mut self, at: bson::DateTime) {
            self.updated_at = Some(at);
        }
    }

    fn registry(fail: bool) -> (Arc<ModelRegistry>, Arc<AtomicUsize>, Arc<StubBackend>) {
        let backend = Arc::new(StubBackend::default());
        let connects = Arc::new(AtomicUsize::new(0));
        let connector =
            StubConnector { backend: backend.clone(), connects: connects.clone(), fail };
        let registry = Arc::new(ModelRegistry::new(
            connector,
            RegistryConfig::new("mongodb://localhost:27017", "test_db"),
        ));
        (registry, connects, backend)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_initialization_is_single_flight() {
        let (registry, connects, backend) = registry(false);

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let registry = registry.clone();
                tokio::spawn(async move { registry.initialize::<Widget>().await })
            })
            .collect();
        for task in futures::future::join_all(tasks).await {
            task.unwrap().unwrap();
        }

        assert_eq!(connects.load(Ordering::SeqCst), 1);
        assert_eq!(backend.index_creates.load(Ordering::SeqCst), 1);
        assert_eq!(registry.phase::<Widget>().await, InitPhase::Ready);
    }

    #[tokio::test]
    async fn initialization_failures_are_cached() {
        let (registry, connects, _) = registry(true);

        let first = registry.initialize::<Widget>().await.unwrap_err();
        let second = registry.initialize::<Widget>().await.unwrap_err();

        assert_eq!(first, second);
        assert_eq!(connects.load(Ordering::SeqCst), 1);
        assert_eq!(registry.phase::<Widget>().await, InitPhase::Failed);

        // try_collection surfaces the cached error, not NotInitialized.
        let err = registry.try_collection::<Widget>().await.unwrap_err();
        assert_eq!(err, first);
    }

    #[tokio::test]
    async fn reinitialize_retries_after_failure() {
        let (registry, connects, _) = registry(true);

        registry.initialize::<Widget>().await.unwrap_err();
        registry.reinitialize::<Widget>().await.unwrap_err();

        assert_eq!(connects.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn try_collection_requires_prior_initialization() {
        let (registry, _, _) = registry(false);

        let err = registry.try_collection::<Widget>().await.unwrap_err();
        assert_eq!(err, ModelError::NotInitialized { model: "Widget".to_string() });

        registry.initialize::<Widget>().await.unwrap();
        assert!(registry.try_collection::<Widget>().await.is_ok());
    }

    #[tokio::test]
    async fn register_all_reports_every_binding() {
        let (registry, _, _) = registry(false);

        let scope = ModelScope::new().with::<Widget>();
        let report = registry.register_all(&scope).await;

        assert_eq!(report.len(), 1);
        let binding = report["Widget"].as_ref().unwrap();
        assert_eq!(binding.collection, "widget");
        assert!(binding.sequential_ids);
        assert!(binding.auto_create_indexes);
    }
}
