//! Error types and result types for model operations.
//!
//! This module provides the error taxonomy used across the crate. Backends are
//! required to translate their native driver errors into these variants before
//! they cross the storage boundary; callers never see driver error types.
//! Use [`ModelResult<T>`] as the return type for fallible operations.

use bson::error::Error as BsonError;
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

/// Represents all possible errors that can occur when working with registered models.
///
/// The enum is `Clone` so that a failed initialization can be cached on the
/// record type and surfaced verbatim to every later caller.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    /// Input fields fail schema constraints (wrong type, missing required
    /// field, empty value where disallowed). Raised before any write.
    #[error("validation failed for field `{field}`: {reason}")]
    Validation {
        /// The offending field name.
        field: String,
        /// What the field failed to satisfy.
        reason: String,
    },
    /// An operation requiring an existing document found none.
    #[error("document {id} not found in collection {collection}")]
    DocumentNotFound {
        /// The collection that was searched.
        collection: String,
        /// The identifier that produced no match.
        id: String,
    },
    /// An operation was invoked before the record type reached the ready state.
    #[error("model {model} is not initialized")]
    NotInitialized {
        /// The record type's name.
        model: String,
    },
    /// A declared index specification conflicts with an existing index of the
    /// same key pattern but different options.
    #[error("index {index} conflicts with an existing index on collection {collection}")]
    IndexConflict {
        /// The collection carrying the conflicting index.
        collection: String,
        /// The offending specification's key pattern.
        index: String,
    },
    /// The storage boundary is unreachable.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),
    /// A storage-facing operation exceeded its deadline.
    #[error("operation timed out: {0}")]
    Timeout(String),
    /// A write violated a uniqueness constraint.
    #[error("duplicate key in collection {collection}: {message}")]
    DuplicateKey {
        /// The collection the write targeted.
        collection: String,
        /// The backend's description of the violated constraint.
        message: String,
    },
    /// Serialization/deserialization error when converting between document formats (BSON, JSON).
    #[error("serialization error: {0}")]
    Serialization(String),
    /// Invalid or missing configuration (connection target, identifier strategy).
    #[error("configuration error: {0}")]
    Configuration(String),
    /// Any other error reported by the underlying storage backend.
    #[error("backend error: {0}")]
    Backend(String),
}

/// A specialized `Result` type for model operations.
pub type ModelResult<T> = Result<T, ModelError>;

impl From<BsonError> for ModelError {
    fn from(err: BsonError) -> Self {
        ModelError::Serialization(err.to_string())
    }
}

impl From<SerdeJsonError> for ModelError {
    fn from(err: SerdeJsonError) -> Self {
        ModelError::Serialization(err.to_string())
    }
}
