//! The typed per-model operation surface.
//!
//! A [`ModelCollection`] is handed out by the registry once its record type
//! reached the ready state, so every operation here runs against an
//! initialized binding. Validation and identifier assignment happen before
//! any write; transport failures arrive already mapped into the error
//! taxonomy by the backend.

use bson::{Bson, Document, doc};
use std::{collections::BTreeMap, marker::PhantomData, sync::Arc};

use crate::{
    backend::{DatabaseBackend, FindQuery},
    error::{ModelError, ModelResult},
    index::{IndexSpec, SortDirection, ensure_indexes},
    model::{CollectionBinding, IdStrategy, Model, ModelExt, ModelIdentifier, now},
    registry::ModelRuntime,
    sequence::IdSequencer,
};

/// Type-safe operations on one record type's collection.
///
/// Obtained from [`ModelRegistry::collection`](crate::registry::ModelRegistry::collection)
/// (lazy) or [`try_collection`](crate::registry::ModelRegistry::try_collection)
/// (ready-only). Cheap to clone; clones share the same runtime.
#[derive(Debug)]
pub struct ModelCollection<M: Model> {
    runtime: Arc<ModelRuntime>,
    sequencer: IdSequencer,
    _marker: PhantomData<M>,
}

impl<M: Model> Clone for ModelCollection<M> {
    fn clone(&self) -> Self {
        Self {
            runtime: self.runtime.clone(),
            sequencer: self.sequencer.clone(),
            _marker: PhantomData,
        }
    }
}

impl<M: Model> ModelCollection<M> {
    pub(crate) fn new(runtime: Arc<ModelRuntime>) -> Self {
        let sequencer = IdSequencer::new(runtime.backend.clone());
        Self { runtime, sequencer, _marker: PhantomData }
    }

    /// The physical collection name this record type is bound to.
    pub fn name(&self) -> &str {
        &self.runtime.binding.collection
    }

    /// The binding established at initialization.
    pub fn binding(&self) -> &CollectionBinding {
        &self.runtime.binding
    }

    fn backend(&self) -> &dyn DatabaseBackend {
        self.runtime.backend.as_ref()
    }

    /// Serializes and validates an instance against the declared schema.
    fn validated_document(&self, model: &M) -> ModelResult<Document> {
        let document = model.to_document()?;
        self.runtime.schema.validate(&document)?;
        Ok(document)
    }

    /// Returns the instance's identifier, assigning one per the binding's
    /// strategy if absent. Only the sequential strategy touches storage.
    async fn assign_id(&self, model: &mut M) -> ModelResult<M::Id> {
        if let Some(id) = model.id() {
            return Ok(id);
        }

        let id = match M::Id::STRATEGY {
            IdStrategy::Sequential => {
                let value = self
                    .sequencer
                    .next_id(&self.runtime.binding.collection)
                    .await?;
                M::Id::from_sequence(value)
            }
            IdStrategy::Native => M::Id::generate(),
        }
        .ok_or_else(|| {
            ModelError::Configuration(format!(
                "identifier type for {} does not match its strategy",
                M::type_name(),
            ))
        })?;

        model.set_id(id.clone());
        Ok(id)
    }

    /// Validates, stamps, persists, and returns one new instance.
    ///
    /// Both timestamps are set to the same instant; an identifier is
    /// assigned per the binding's strategy unless the caller preset one.
    /// Validation runs before identifier assignment, so an invalid instance
    /// performs no I/O at all.
    pub async fn create(&self, mut model: M) -> ModelResult<M> {
        let stamp = now();
        model.set_created_at(stamp);
        model.set_updated_at(stamp);

        let mut document = self.validated_document(&model)?;
        let id = self.assign_id(&mut model).await?;
        document.insert("_id", id.to_bson());

        self.backend()
            .insert_many(self.name(), vec![document])
            .await?;

        Ok(model)
    }

    /// Looks up one instance by identifier. Absence is a normal empty
    /// result, not an error.
    pub async fn get_by_id(&self, id: M::Id) -> ModelResult<Option<M>> {
        match self
            .backend()
            .find_one(self.name(), doc! { "_id": id.to_bson() })
            .await?
        {
            Some(document) => Ok(Some(M::from_document(document)?)),
            None => Ok(None),
        }
    }

    /// Returns all instances matching an equality-predicate filter, in the
    /// store's natural return order. The empty filter matches everything.
    pub async fn filter(&self, filter: Document) -> ModelResult<Vec<M>> {
        self.find(filter, FindQuery::default()).await
    }

    /// Like [`filter`](Self::filter), with explicit slicing and ordering.
    pub async fn find(&self, filter: Document, query: FindQuery) -> ModelResult<Vec<M>> {
        self.backend()
            .find(self.name(), filter, query)
            .await?
            .into_iter()
            .map(M::from_document)
            .collect()
    }

    /// Returns every instance in the collection.
    pub async fn all(&self) -> ModelResult<Vec<M>> {
        self.filter(Document::new()).await
    }

    /// Persists the instance's current state as a full-document update and
    /// refreshes its modification timestamp. The creation timestamp is left
    /// untouched.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::DocumentNotFound`] when the identifier no
    /// longer exists (or was never assigned).
    pub async fn save(&self, model: &mut M) -> ModelResult<()> {
        let id = model.id().ok_or_else(|| ModelError::DocumentNotFound {
            collection: self.name().to_string(),
            id: "<unassigned>".to_string(),
        })?;

        let previous = model.updated_at();
        model.set_updated_at(now());

        let outcome = match self.validated_document(model) {
            Ok(document) => {
                self.backend()
                    .replace_one(self.name(), doc! { "_id": id.to_bson() }, document)
                    .await
            }
            Err(err) => Err(err),
        };

        match outcome {
            Ok(0) => {
                if let Some(at) = previous {
                    model.set_updated_at(at);
                }
                Err(ModelError::DocumentNotFound {
                    collection: self.name().to_string(),
                    id: format!("{id:?}"),
                })
            }
            Ok(_) => Ok(()),
            Err(err) => {
                if let Some(at) = previous {
                    model.set_updated_at(at);
                }
                Err(err)
            }
        }
    }

    /// Deletes the instance by identifier. Returns whether a document was
    /// removed; an instance without an identifier was never persisted.
    pub async fn delete(&self, model: &M) -> ModelResult<bool> {
        match model.id() {
            Some(id) => Ok(self
                .backend()
                .delete_many(self.name(), doc! { "_id": id.to_bson() })
                .await?
                > 0),
            None => Ok(false),
        }
    }

    /// Deletes all matching documents and returns the count removed.
    ///
    /// Passing `None` deletes **every document in the collection**; the
    /// unfiltered form is logged as a warning because it is destructive.
    pub async fn delete_many(&self, filter: impl Into<Option<Document>>) -> ModelResult<u64> {
        let filter = match filter.into() {
            Some(filter) => filter,
            None => {
                tracing::warn!(
                    collection = self.name(),
                    "delete_many called without a predicate; deleting every document"
                );
                Document::new()
            }
        };

        self.backend().delete_many(self.name(), filter).await
    }

    /// Validates, stamps, and persists a batch of instances with a single
    /// batched write.
    ///
    /// Every item is validated before any identifier is issued or any write
    /// attempted: one invalid item rejects the whole batch with zero side
    /// effects. If the store rejects a document mid-batch (e.g. a uniqueness
    /// violation) earlier documents remain persisted and sequential
    /// identifiers already issued for later items become permanent gaps;
    /// the storage boundary offers no multi-document rollback.
    pub async fn bulk_create(&self, models: Vec<M>) -> ModelResult<Vec<M>> {
        if models.is_empty() {
            return Ok(models);
        }

        let stamp = now();
        let mut prepared = Vec::with_capacity(models.len());
        for (position, mut model) in models.into_iter().enumerate() {
            model.set_created_at(stamp);
            model.set_updated_at(stamp);

            let document = model.to_document()?;
            self.runtime
                .schema
                .validate(&document)
                .map_err(|err| match err {
                    ModelError::Validation { field, reason } => ModelError::Validation {
                        field,
                        reason: format!("item {position}: {reason}"),
                    },
                    other => other,
                })?;
            prepared.push((model, document));
        }

        let mut hydrated = Vec::with_capacity(prepared.len());
        let mut documents = Vec::with_capacity(prepared.len());
        for (mut model, mut document) in prepared {
            let id = self.assign_id(&mut model).await?;
            document.insert("_id", id.to_bson());
            documents.push(document);
            hydrated.push(model);
        }

        self.backend().insert_many(self.name(), documents).await?;

        Ok(hydrated)
    }

    /// Counts matching documents; `None` counts the whole collection.
    pub async fn count(&self, filter: impl Into<Option<Document>>) -> ModelResult<u64> {
        self.backend()
            .count(self.name(), filter.into().unwrap_or_default())
            .await
    }

    /// Returns the distinct values of a field across the collection.
    pub async fn distinct(&self, field: &str) -> ModelResult<Vec<Bson>> {
        self.backend()
            .distinct(self.name(), field, Document::new())
            .await
    }

    /// Runs a store-native aggregation pipeline and returns the raw result
    /// documents without schema validation, since aggregation results need
    /// not match the declared record shape.
    pub async fn aggregate(&self, pipeline: Vec<Document>) -> ModelResult<Vec<Document>> {
        self.backend().aggregate(self.name(), pipeline).await
    }

    /// Declares a single-field ascending index, reconciling against what
    /// exists. Available even when auto-indexing is disabled for the type.
    pub async fn create_index(&self, field: &str, unique: bool) -> ModelResult<()> {
        ensure_indexes(self.backend(), self.name(), &[IndexSpec::single(field, unique)])
            .await
            .map(|_| ())
    }

    /// Declares a compound index with per-field direction, reconciling
    /// against what exists.
    pub async fn create_compound_index(
        &self,
        keys: Vec<(String, SortDirection)>,
    ) -> ModelResult<()> {
        ensure_indexes(self.backend(), self.name(), &[IndexSpec::compound(keys)])
            .await
            .map(|_| ())
    }

    /// Lists the collection's indexes, keyed by effective name.
    pub async fn list_indexes(&self) -> ModelResult<BTreeMap<String, IndexSpec>> {
        Ok(self
            .backend()
            .list_indexes(self.name())
            .await?
            .into_iter()
            .map(|spec| (spec.effective_name(), spec))
            .collect())
    }
}
