//! Core traits and types for declaring record types.
//!
//! A record type is a plain struct implementing [`Model`]. The framework
//! injects two implicit timestamp fields (`created_at`, `updated_at`) and an
//! identifier; all three are owned by the framework and set during
//! [`create`](crate::collection::ModelCollection::create) /
//! [`save`](crate::collection::ModelCollection::save), never by caller code.
//!
//! The identifier *type* selects the identifier strategy: `i64` opts into
//! framework-assigned sequential integers, [`ObjectId`] delegates to the
//! database's native identifier. The field set of a record type is fixed at
//! declaration time by the struct definition itself.

use bson::{
    Bson, Document, de::deserialize_from_bson, oid::ObjectId, ser::serialize_to_bson,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, from_value, to_value};

use crate::{
    backend::ConnectionTarget,
    error::{ModelError, ModelResult},
    index::IndexSpec,
    naming::resolve_collection_name,
    schema::ModelSchema,
};

/// How identifiers are assigned to new documents of a record type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdStrategy {
    /// Framework-assigned, strictly increasing integers issued by the
    /// [`IdSequencer`](crate::sequence::IdSequencer).
    Sequential,
    /// The store's native identifier, generated client-side.
    Native,
}

/// Trait implemented by the types usable as a model identifier.
///
/// The strategy is a property of the type: `i64` is sequential, [`ObjectId`]
/// is native. Models pick a strategy by picking their id field's type.
pub trait ModelIdentifier: Clone + PartialEq + std::fmt::Debug + Send + Sync + 'static {
    /// The identifier strategy this type selects.
    const STRATEGY: IdStrategy;

    /// Builds an identifier from a sequencer-issued integer.
    ///
    /// Returns `None` for types that do not use the sequential strategy.
    fn from_sequence(value: i64) -> Option<Self>;

    /// Generates a fresh native identifier.
    ///
    /// Returns `None` for types that do not use the native strategy.
    fn generate() -> Option<Self>;

    /// The BSON representation used in `_id` filters.
    fn to_bson(&self) -> Bson;
}

impl ModelIdentifier for i64 {
    const STRATEGY: IdStrategy = IdStrategy::Sequential;

    fn from_sequence(value: i64) -> Option<Self> {
        Some(value)
    }

    fn generate() -> Option<Self> {
        None
    }

    fn to_bson(&self) -> Bson {
        Bson::Int64(*self)
    }
}

impl ModelIdentifier for ObjectId {
    const STRATEGY: IdStrategy = IdStrategy::Native;

    fn from_sequence(_value: i64) -> Option<Self> {
        None
    }

    fn generate() -> Option<Self> {
        Some(ObjectId::new())
    }

    fn to_bson(&self) -> Bson {
        Bson::ObjectId(*self)
    }
}

/// Per-type declaration options.
///
/// Everything here has a sensible default; most record types never override
/// any of it.
#[derive(Debug, Clone, Default)]
pub struct ModelSettings {
    /// Explicit collection name, used verbatim instead of the derived one.
    pub collection_name: Option<&'static str>,
    /// Whether declared indexes are reconciled during initialization.
    /// Defaults to `true`; the explicit index operations on
    /// [`ModelCollection`](crate::collection::ModelCollection) remain
    /// available either way.
    pub auto_create_indexes: Option<bool>,
    /// Per-type connection target overriding the registry default.
    pub connection: Option<ConnectionTarget>,
}

impl ModelSettings {
    /// Settings with an explicit collection name.
    pub fn named(collection_name: &'static str) -> Self {
        Self { collection_name: Some(collection_name), ..Self::default() }
    }

    pub(crate) fn auto_create_indexes(&self) -> bool {
        self.auto_create_indexes.unwrap_or(true)
    }
}

/// The association between a record type and a physical collection,
/// established during initialization and immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionBinding {
    /// The record type's name.
    pub model: &'static str,
    /// The physical collection name (derived or overridden).
    pub collection: String,
    /// Whether identifiers are framework-assigned sequential integers.
    pub sequential_ids: bool,
    /// Whether declared indexes were reconciled during initialization.
    pub auto_create_indexes: bool,
}

/// Core trait that all record types must implement.
///
/// Every record type has a unique identifier, the two framework timestamps,
/// and optionally a declared schema, declared indexes, and settings.
///
/// # Example
///
/// ```ignore
/// use modelbind_core::model::Model;
/// use serde::{Serialize, Deserialize};
///
/// #[derive(Debug, Clone, Serialize, Deserialize)]
/// pub struct User {
///     #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
///     pub id: Option<i64>,
///     pub name: String,
///     pub email: String,
///     #[serde(skip_serializing_if = "Option::is_none")]
///     pub created_at: Option<bson::DateTime>,
///     #[serde(skip_serializing_if = "Option::is_none")]
///     pub updated_at: Option<bson::DateTime>,
/// }
///
/// impl Model for User {
///     type Id = i64;
///
///     fn type_name() -> &'static str { "User" }
///     fn id(&self) -> Option<i64> { self.id }
///     fn set_id(&mut self, id: i64) { self.id = Some(id); }
///     fn created_at(&self) -> Option<bson::DateTime> { self.created_at }
///     fn set_created_at(&mut self, at: bson::DateTime) { self.created_at = Some(at); }
///     fn updated_at(&self) -> Option<bson::DateTime> { self.updated_at }
///     fn set_updated_at(&mut self, at: bson::DateTime) { self.updated_at = Some(at); }
/// }
/// ```
pub trait Model:
    Serialize + for<'de> Deserialize<'de> + Send + Sync + Clone + 'static
{
    /// The identifier type; selects the identifier strategy.
    type Id: ModelIdentifier;

    /// The record type's name as declared, e.g. `"BlogPost"`.
    ///
    /// The collection name is derived from this unless
    /// [`settings`](Model::settings) overrides it.
    fn type_name() -> &'static str;

    /// Per-type options. The default has no overrides.
    fn settings() -> ModelSettings {
        ModelSettings::default()
    }

    /// The declared field constraints checked before every write.
    ///
    /// The default schema is empty, which accepts any document the struct
    /// itself can serialize.
    fn schema() -> ModelSchema {
        ModelSchema::new()
    }

    /// The indexes reconciled during initialization.
    fn indexes() -> Vec<IndexSpec> {
        Vec::new()
    }

    /// Returns this instance's identifier, if assigned.
    fn id(&self) -> Option<Self::Id>;

    /// Assigns this instance's identifier.
    fn set_id(&mut self, id: Self::Id);

    /// The framework-managed creation timestamp.
    fn created_at(&self) -> Option<bson::DateTime>;

    /// Sets the creation timestamp. Called by the framework only.
    fn set_created_at(&mut self, at: bson::DateTime);

    /// The framework-managed last-modified timestamp.
    fn updated_at(&self) -> Option<bson::DateTime>;

    /// Sets the last-modified timestamp. Called by the framework only.
    fn set_updated_at(&mut self, at: bson::DateTime);

    /// The collection this record type is bound to.
    fn collection_name() -> String {
        resolve_collection_name(Self::type_name(), Self::settings().collection_name)
    }
}

/// Extension trait providing serialization utilities for models.
///
/// Automatically implemented for every [`Model`].
pub trait ModelExt: Model {
    /// Serializes this instance to a BSON document.
    fn to_document(&self) -> ModelResult<Document>;

    /// Deserializes an instance from a BSON document.
    fn from_document(document: Document) -> ModelResult<Self>;

    /// Converts this instance to a JSON value.
    fn to_json(&self) -> ModelResult<Value>;

    /// Creates an instance from a JSON value.
    fn from_json(value: Value) -> ModelResult<Self>;
}

impl<M: Model> ModelExt for M {
    fn to_document(&self) -> ModelResult<Document> {
        match serialize_to_bson(self)? {
            Bson::Document(doc) => Ok(doc),
            _ => Err(ModelError::Serialization(format!(
                "model {} did not serialize to a document",
                M::type_name(),
            ))),
        }
    }

    fn from_document(document: Document) -> ModelResult<Self> {
        Ok(deserialize_from_bson(Bson::Document(document))?)
    }

    fn to_json(&self) -> ModelResult<Value> {
        Ok(to_value(self)?)
    }

    fn from_json(value: Value) -> ModelResult<Self> {
        Ok(from_value(value)?)
    }
}

/// The current instant as a BSON datetime, the representation used for the
/// framework timestamps.
pub fn now() -> bson::DateTime {
    bson::DateTime::from_chrono(chrono::Utc::now())
}
