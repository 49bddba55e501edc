//! MongoDB backend for modelbind.
//!
//! This crate implements the `DatabaseBackend` trait on the official MongoDB
//! driver, giving registered models persistent storage with the driver's
//! built-in connection pooling. Driver errors are translated into the core
//! error taxonomy at this boundary (uniqueness violations become
//! `DuplicateKey`, transport failures become `StorageUnavailable`/`Timeout`)
//! and never escape in their native form.
//!
//! To use this backend, include the `mongodb` feature in your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! modelbind = { version = "x.y.z", features = ["mongodb"] }
//! ```
//!
//! # Example
//!
//! ```ignore
//! use modelbind_core::registry::{ModelRegistry, RegistryConfig};
//! use modelbind_mongodb::MongoConnector;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = ModelRegistry::new(
//!         MongoConnector::new(),
//!         RegistryConfig::from_env()?,
//!     );
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as modelbind_mongodb;

pub mod store;

pub use store::{MongoBackend, MongoConnector};
