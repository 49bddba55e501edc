//! Index specifications and idempotent reconciliation.
//!
//! Declared specifications are diffed against the indexes that already exist
//! on a collection: an index with the same key pattern and matching options is
//! skipped, a missing one is created, and a same-pattern index with different
//! options raises [`ModelError::IndexConflict`]. Nothing is ever dropped or
//! recreated implicitly.

use crate::{
    backend::DatabaseBackend,
    error::{ModelError, ModelResult},
};

/// Sort/index direction for a single key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    /// Ascending order (A to Z, 0 to 9, earliest to latest).
    Asc,
    /// Descending order (Z to A, 9 to 0, latest to earliest).
    Desc,
}

impl SortDirection {
    /// The MongoDB wire representation (`1` / `-1`).
    pub fn as_i32(self) -> i32 {
        match self {
            SortDirection::Asc => 1,
            SortDirection::Desc => -1,
        }
    }
}

/// A declared index: ordered keys with per-key direction, an optional
/// uniqueness constraint, and an optional name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    /// The indexed fields in declaration order.
    pub keys: Vec<(String, SortDirection)>,
    /// Whether the index enforces uniqueness.
    pub unique: bool,
    /// Explicit index name; the store's convention applies when absent.
    pub name: Option<String>,
}

impl IndexSpec {
    /// A single-field ascending index.
    pub fn single(field: impl Into<String>, unique: bool) -> Self {
        Self { keys: vec![(field.into(), SortDirection::Asc)], unique, name: None }
    }

    /// A compound index over the given keys.
    pub fn compound(keys: Vec<(String, SortDirection)>) -> Self {
        Self { keys, unique: false, name: None }
    }

    /// Marks the index unique.
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Sets an explicit name.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Canonical representation of the key set, used to decide whether two
    /// specifications target the same index.
    pub fn key_pattern(&self) -> String {
        self.keys
            .iter()
            .map(|(field, direction)| format!("{field}:{}", direction.as_i32()))
            .collect::<Vec<_>>()
            .join("|")
    }

    /// The name the store would assign by convention (`field_1_other_-1`).
    pub fn default_name(&self) -> String {
        self.keys
            .iter()
            .map(|(field, direction)| format!("{field}_{}", direction.as_i32()))
            .collect::<Vec<_>>()
            .join("_")
    }

    /// The effective name: explicit, or the conventional default.
    pub fn effective_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| self.default_name())
    }
}

/// Computes the creation plan for `declared` given the `existing` indexes.
///
/// Pure: performs no I/O. A declared spec whose key pattern already exists
/// with matching uniqueness is dropped from the plan; a uniqueness mismatch
/// on the same pattern is a conflict.
///
/// # Errors
///
/// Returns [`ModelError::IndexConflict`] naming the offending specification.
pub fn reconcile(
    collection: &str,
    existing: &[IndexSpec],
    declared: &[IndexSpec],
) -> ModelResult<Vec<IndexSpec>> {
    let mut plan = Vec::new();

    for spec in declared {
        let pattern = spec.key_pattern();
        match existing.iter().find(|e| e.key_pattern() == pattern) {
            Some(live) if live.unique == spec.unique => {}
            Some(_) => {
                return Err(ModelError::IndexConflict {
                    collection: collection.to_string(),
                    index: pattern,
                });
            }
            None => plan.push(spec.clone()),
        }
    }

    Ok(plan)
}

/// Reconciles declared specifications against a live collection, creating
/// only what is missing. Returns the number of indexes created.
///
/// Calling this twice with an identical specification performs zero
/// index-creation calls the second time.
///
/// # Errors
///
/// Returns [`ModelError::IndexConflict`] on a uniqueness mismatch, or any
/// error the backend reports while listing/creating.
pub async fn ensure_indexes(
    backend: &dyn DatabaseBackend,
    collection: &str,
    declared: &[IndexSpec],
) -> ModelResult<usize> {
    if declared.is_empty() {
        return Ok(0);
    }

    let existing = backend.list_indexes(collection).await?;
    let plan = reconcile(collection, &existing, declared)?;
    let created = plan.len();

    for spec in plan {
        tracing::debug!(collection, index = %spec.effective_name(), "creating index");
        backend.create_index(collection, spec).await?;
    }

    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_specs_produce_an_empty_plan() {
        let declared = vec![IndexSpec::single("email", true)];
        let plan = reconcile("user", &declared.clone(), &declared).unwrap();
        assert!(plan.is_empty());
    }

    #[test]
    fn missing_specs_are_planned() {
        let declared = vec![
            IndexSpec::single("email", true),
            IndexSpec::compound(vec![
                ("author_id".to_string(), SortDirection::Asc),
                ("published".to_string(), SortDirection::Desc),
            ]),
        ];
        let existing = vec![IndexSpec::single("email", true)];

        let plan = reconcile("blog_post", &existing, &declared).unwrap();
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].key_pattern(), "author_id:1|published:-1");
    }

    #[test]
    fn uniqueness_mismatch_is_a_conflict() {
        let existing = vec![IndexSpec::single("email", false)];
        let declared = vec![IndexSpec::single("email", true)];

        let err = reconcile("user", &existing, &declared).unwrap_err();
        assert_eq!(
            err,
            ModelError::IndexConflict {
                collection: "user".to_string(),
                index: "email:1".to_string(),
            }
        );
    }

    #[test]
    fn direction_changes_the_pattern() {
        let existing = vec![IndexSpec::single("score", false)];
        let declared = vec![IndexSpec {
            keys: vec![("score".to_string(), SortDirection::Desc)],
            unique: false,
            name: None,
        }];

        // A different direction is a different index, not a conflict.
        let plan = reconcile("game", &existing, &declared).unwrap();
        assert_eq!(plan.len(), 1);
    }

    #[test]
    fn default_names_follow_store_convention() {
        let spec = IndexSpec::compound(vec![
            ("author_id".to_string(), SortDirection::Asc),
            ("created_at".to_string(), SortDirection::Desc),
        ]);
        assert_eq!(spec.default_name(), "author_id_1_created_at_-1");
        assert_eq!(spec.named("by_author").effective_name(), "by_author");
    }
}
