//! A typed model-to-collection mapping layer for document databases.
//!
//! This crate is the core of the modelbind project and provides:
//!
//! - **Model traits** ([`model`]) - Core traits for declaring record types and their identifiers
//! - **Collection naming** ([`naming`]) - Canonical collection-name derivation from type names
//! - **Schema validation** ([`schema`]) - Declared field lists checked before every write
//! - **Index management** ([`index`]) - Idempotent reconciliation of declared indexes
//! - **Storage backend abstraction** ([`backend`]) - Traits for implementing database backends
//! - **Connection registry** ([`connection`]) - Shared, lazily-created backend handles
//! - **Identifier sequencing** ([`sequence`]) - Atomic, monotonic integer identifiers
//! - **Model registry** ([`registry`]) - One-time, single-flight model initialization
//! - **Typed operations** ([`collection`]) - The per-model CRUD/aggregation surface
//! - **Error handling** ([`error`]) - The error taxonomy and result type
//!
//! # Example
//!
//! ```ignore
//! use modelbind_core::{model::{Model, ModelSettings}, registry::ModelRegistry};
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
//!     fn type_name() -> &'static str {
//!         "User"
//!     }
//!
//!     // id/timestamp accessors elided
//!     # fn id(&self) -> Option<i64> { self.id }
//!     # fn set_id(&mut self, id: i64) { self.id = Some(id); }
//!     # fn created_at(&self) -> Option<bson::DateTime> { self.created_at }
//!     # fn set_created_at(&mut self, at: bson::DateTime) { self.created_at = Some(at); }
//!     # fn updated_at(&self) -> Option<bson::DateTime> { self.updated_at }
//!     # fn set_updated_at(&mut self, at: bson::DateTime) { self.updated_at = Some(at); }
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as modelbind_core;

pub mod backend;
pub mod collection;
pub mod connection;
pub mod error;
pub mod index;
pub mod model;
pub mod naming;
pub mod registry;
pub mod schema;
pub mod sequence;
