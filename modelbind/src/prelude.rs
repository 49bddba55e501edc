//! Convenient re-exports of commonly used types from modelbind.
//!
//! Import this prelude module to quickly access the most frequently used
//! types and traits without needing to import from multiple sub-modules:
//!
//! ```ignore
//! use modelbind::prelude::*;
//! ```

pub use modelbind_core::{
    backend::{ConnectionTarget, Connector, DatabaseBackend, FindQuery, Sort},
    collection::ModelCollection,
    connection::ConnectionRegistry,
    error::{ModelError, ModelResult},
    index::{IndexSpec, SortDirection},
    model::{
        CollectionBinding, IdStrategy, Model, ModelExt, ModelIdentifier, ModelSettings,
    },
    naming::{camel_to_snake, resolve_collection_name},
    registry::{InitPhase, ModelRegistry, ModelScope, RegistryConfig},
    schema::{FieldKind, FieldSpec, ModelSchema},
    sequence::{COUNTER_COLLECTION, IdSequencer},
};
