//! Main modelbind crate: typed record types bound to document-database
//! collections.
//!
//! This crate is the primary entry point for users of the modelbind
//! framework. It re-exports the core types from the sub-crates and provides
//! convenient access to the storage backends.
//!
//! # Features
//!
//! - **Declarative record types** - Plain serde structs bound to collections,
//!   with derived names (`BlogPost` → `blog_post`) or explicit overrides
//! - **One-time, single-flight initialization** - Concurrent first use of a
//!   record type performs setup exactly once; everyone observes the outcome
//! - **Sequential or native identifiers** - The id field's type picks the
//!   strategy: `i64` for framework-issued monotonic integers, `ObjectId` for
//!   the store's native ids
//! - **Idempotent index reconciliation** - Declared indexes are diffed
//!   against what exists; conflicts are reported, never resolved by dropping
//! - **Typed error taxonomy** - Driver errors never escape in native form
//!
//! # Quick Start
//!
//! ```ignore
//! use modelbind::{memory::MemoryConnector, prelude::*};
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! pub struct User {
//!     #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
//!     pub id: Option<i64>,
//!     pub name: String,
//!     pub email: String,
//!     #[serde(skip_serializing_if = "Option::is_none")]
//!     pub created_at: Option<bson::DateTime>,
//!     #[serde(skip_serializing_if = "Option::is_none")]
//!     pub updated_at: Option<bson::DateTime>,
//! }
//!
//! impl Model for User {
//!     type Id = i64;
//!
//!     fn type_name() -> &'static str { "User" }
//!     fn schema() -> ModelSchema {
//!         ModelSchema::new()
//!             .field(FieldSpec::required("name", FieldKind::String).non_empty())
//!             .field(FieldSpec::required("email", FieldKind::String).non_empty())
//!     }
//!     fn indexes() -> Vec<IndexSpec> {
//!         vec![IndexSpec::single("email", true)]
//!     }
//!
//!     fn id(&self) -> Option<i64> { self.id }
//!     fn set_id(&mut self, id: i64) { self.id = Some(id); }
//!     fn created_at(&self) -> Option<bson::DateTime> { self.created_at }
//!     fn set_created_at(&mut self, at: bson::DateTime) { self.created_at = Some(at); }
//!     fn updated_at(&self) -> Option<bson::DateTime> { self.updated_at }
//!     fn set_updated_at(&mut self, at: bson::DateTime) { self.updated_at = Some(at); }
//! }
//!
//! #[tokio::main]
//! async fn main() -> ModelResult<()> {
//!     let registry = ModelRegistry::new(
//!         MemoryConnector::new(),
//!         RegistryConfig::new("memory://local", "example_db"),
//!     );
//!
//!     // First use initializes the type: resolves `user`, connects,
//!     // reconciles the declared indexes.
//!     let users = registry.collection::<User>().await?;
//!
//!     let user = users
//!         .create(User {
//!             id: None,
//!             name: "John".to_string(),
//!             email: "john@example.com".to_string(),
//!             created_at: None,
//!             updated_at: None,
//!         })
//!         .await?;
//!
//!     let found = users.get_by_id(user.id.unwrap()).await?;
//!     println!("found: {found:?}");
//!
//!     registry.close_all_connections().await
//! }
//! ```
//!
//! # Registering a whole scope
//!
//! Declarations are gathered into an explicit [`ModelScope`](prelude::ModelScope)
//! and registered in one sweep; one type's failure does not block the others
//! unless the configuration says so:
//!
//! ```ignore
//! let scope = ModelScope::new().with::<User>().with::<BlogPost>();
//! for (name, outcome) in registry.register_all(&scope).await {
//!     match outcome {
//!         Ok(binding) => println!("{name} -> {}", binding.collection),
//!         Err(err) => eprintln!("{name} failed: {err}"),
//!     }
//! }
//! ```
//!
//! # Backends
//!
//! - [`memory`] - Fast in-memory storage for development and testing
//! - [`mongodb`] - Persistent MongoDB backend (requires the `mongodb` feature)

pub mod prelude;

pub use modelbind_core::{
    backend, collection, connection, error, index, model, naming, registry, schema, sequence,
};

// Re-export BSON types for convenience
pub use bson;

/// In-memory storage backend implementations.
pub mod memory {
    pub use modelbind_memory::{MemoryBackend, MemoryConnector};
}

/// MongoDB storage backend implementations.
///
/// This module is only available when the `mongodb` feature is enabled.
#[cfg(feature = "mongodb")]
pub mod mongodb {
    pub use modelbind_mongodb::{MongoBackend, MongoConnector};
}
