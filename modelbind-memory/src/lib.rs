//! In-memory backend for modelbind.
//!
//! This crate provides an in-memory implementation of the `DatabaseBackend`
//! trait, suitable for development and tests: it keeps documents in
//! insertion order (so the store's "natural return order" is observable),
//! enforces unique indexes, implements the atomic counter primitive behind
//! sequential identifiers, and evaluates a small subset of the native filter
//! and aggregation syntax.
//!
//! # Example
//!
//! ```ignore
//! use modelbind_core::registry::{ModelRegistry, RegistryConfig};
//! use modelbind_memory::MemoryConnector;
//!
//! let registry = ModelRegistry::new(
//!     MemoryConnector::new(),
//!     RegistryConfig::new("memory://", "test_db"),
//! );
//! ```

#[allow(unused_extern_crates)]
extern crate self as modelbind_memory;

pub mod evaluator;
pub mod store;

pub use store::{MemoryBackend, MemoryConnector};
