//! Filter evaluation for in-memory document matching.
//!
//! Evaluates the subset of the native filter-document syntax the mapping
//! layer produces: top-level equality predicates plus the `$eq`, `$ne`,
//! `$gt`, `$gte`, `$lt`, `$lte`, `$in`, `$nin` and `$exists` operators.
//! Numeric values are compared through a normalized representation so an
//! `Int32` in a filter matches an `Int64` in a document, the way the real
//! store compares them.

use bson::{Bson, Document, datetime::DateTime};
use std::cmp::Ordering;

use modelbind_core::error::{ModelError, ModelResult};

/// Type-erased, orderable representation of BSON values.
///
/// Normalizes all numeric types to f64. Values of types without a defined
/// ordering (arrays, documents, object ids) map to `Null` and compare as
/// incomparable.
#[derive(Debug, PartialEq)]
pub(crate) enum Comparable<'a> {
    /// Null or a value without a defined ordering
    Null,
    /// Boolean value
    Bool(bool),
    /// Numeric value (all integers and floats normalized to f64)
    Number(f64),
    /// DateTime value
    DateTime(DateTime),
    /// String value
    String(&'a str),
}

impl<'a> From<&'a Bson> for Comparable<'a> {
    fn from(bson: &'a Bson) -> Self {
        match bson {
            Bson::Boolean(value) => Comparable::Bool(*value),
            Bson::Int32(value) => Comparable::Number(f64::from(*value)),
            Bson::Int64(value) => Comparable::Number(*value as f64),
            Bson::Double(value) => Comparable::Number(*value),
            Bson::DateTime(value) => Comparable::DateTime(*value),
            Bson::String(value) => Comparable::String(value),
            _ => Comparable::Null,
        }
    }
}

impl<'a> PartialOrd for Comparable<'a> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Comparable::Bool(a), Comparable::Bool(b)) => a.partial_cmp(b),
            (Comparable::Number(a), Comparable::Number(b)) => a.partial_cmp(b),
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a.partial_cmp(b),
            (Comparable::String(a), Comparable::String(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

fn as_f64(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(v) => Some(f64::from(*v)),
        Bson::Int64(v) => Some(*v as f64),
        Bson::Double(v) => Some(*v),
        _ => None,
    }
}

/// Equality with numeric-width normalization; everything else (strings,
/// object ids, embedded documents, arrays) compares structurally.
pub(crate) fn values_eq(left: &Bson, right: &Bson) -> bool {
    match (as_f64(left), as_f64(right)) {
        (Some(l), Some(r)) => l == r,
        _ => left == right,
    }
}

/// Whether `document` satisfies every predicate in `filter`.
///
/// The empty filter matches every document.
pub(crate) fn matches_filter(document: &Document, filter: &Document) -> ModelResult<bool> {
    for (field, condition) in filter {
        if !condition_matches(document.get(field), condition)? {
            return Ok(false);
        }
    }

    Ok(true)
}

fn condition_matches(value: Option<&Bson>, condition: &Bson) -> ModelResult<bool> {
    if let Bson::Document(operators) = condition {
        if !operators.is_empty() && operators.keys().all(|k| k.starts_with('$')) {
            for (op, operand) in operators {
                if !operator_matches(value, op, operand)? {
                    return Ok(false);
                }
            }
            return Ok(true);
        }
    }

    // Plain value: equality predicate.
    Ok(value.is_some_and(|v| values_eq(v, condition)))
}

fn operator_matches(value: Option<&Bson>, op: &str, operand: &Bson) -> ModelResult<bool> {
    match op {
        "$eq" => Ok(value.is_some_and(|v| values_eq(v, operand))),
        "$ne" => Ok(!value.is_some_and(|v| values_eq(v, operand))),
        "$gt" | "$gte" | "$lt" | "$lte" => {
            let Some(value) = value else { return Ok(false) };
            match Comparable::from(value).partial_cmp(&Comparable::from(operand)) {
                Some(ordering) => Ok(match op {
                    "$gt" => ordering == Ordering::Greater,
                    "$gte" => ordering != Ordering::Less,
                    "$lt" => ordering == Ordering::Less,
                    _ => ordering != Ordering::Greater,
                }),
                None => Ok(false),
            }
        }
        "$in" => match operand {
            Bson::Array(candidates) => Ok(
                value.is_some_and(|v| candidates.iter().any(|candidate| values_eq(v, candidate)))
            ),
            _ => Err(ModelError::Backend("$in requires an array operand".to_string())),
        },
        "$nin" => match operand {
            Bson::Array(candidates) => Ok(
                !value.is_some_and(|v| candidates.iter().any(|candidate| values_eq(v, candidate)))
            ),
            _ => Err(ModelError::Backend("$nin requires an array operand".to_string())),
        },
        "$exists" => match operand {
            Bson::Boolean(should_exist) => Ok(value.is_some() == *should_exist),
            _ => Err(ModelError::Backend("$exists requires a boolean operand".to_string())),
        },
        other => Err(ModelError::Backend(format!("unsupported filter operator {other}"))),
    }
}

/// Comparator for sort stages: missing and unordered values sort as null.
pub(crate) fn compare_field(a: &Document, b: &Document, field: &str) -> Ordering {
    let left = a.get(field).map(Comparable::from).unwrap_or(Comparable::Null);
    let right = b.get(field).map(Comparable::from).unwrap_or(Comparable::Null);
    left.partial_cmp(&right).unwrap_or(Ordering::Equal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::{doc, oid::ObjectId};

    #[test]
    fn empty_filter_matches_everything() {
        let doc = doc! { "name": "Alice" };
        assert!(matches_filter(&doc, &doc! {}).unwrap());
    }

    #[test]
    fn equality_normalizes_numeric_widths() {
        let doc = doc! { "age": 30_i64 };
        assert!(matches_filter(&doc, &doc! { "age": 30_i32 }).unwrap());
        assert!(!matches_filter(&doc, &doc! { "age": 31_i32 }).unwrap());
    }

    #[test]
    fn object_ids_compare_by_value() {
        let a = ObjectId::new();
        let b = ObjectId::new();
        let doc = doc! { "_id": a };
        assert!(matches_filter(&doc, &doc! { "_id": a }).unwrap());
        assert!(!matches_filter(&doc, &doc! { "_id": b }).unwrap());
    }

    #[test]
    fn missing_fields_never_match_equality() {
        let doc = doc! { "name": "Alice" };
        assert!(!matches_filter(&doc, &doc! { "email": "a@b.com" }).unwrap());
    }

    #[test]
    fn comparison_operators() {
        let doc = doc! { "age": 30_i64 };
        assert!(matches_filter(&doc, &doc! { "age": { "$gt": 18 } }).unwrap());
        assert!(matches_filter(&doc, &doc! { "age": { "$gte": 30 } }).unwrap());
        assert!(!matches_filter(&doc, &doc! { "age": { "$lt": 30 } }).unwrap());
        assert!(matches_filter(&doc, &doc! { "age": { "$lte": 30, "$gte": 21 } }).unwrap());
    }

    #[test]
    fn membership_and_existence_operators() {
        let doc = doc! { "status": "active" };
        assert!(matches_filter(&doc, &doc! { "status": { "$in": ["active", "idle"] } }).unwrap());
        assert!(matches_filter(&doc, &doc! { "status": { "$nin": ["gone"] } }).unwrap());
        assert!(matches_filter(&doc, &doc! { "status": { "$exists": true } }).unwrap());
        assert!(matches_filter(&doc, &doc! { "missing": { "$exists": false } }).unwrap());
        assert!(matches_filter(&doc, &doc! { "missing": { "$ne": "x" } }).unwrap());
    }

    #[test]
    fn unknown_operators_are_rejected() {
        let doc = doc! { "name": "Alice" };
        assert!(matches_filter(&doc, &doc! { "name": { "$regex": "A.*" } }).is_err());
    }

    #[test]
    fn embedded_documents_compare_structurally() {
        let doc = doc! { "links": { "github": "alice" } };
        assert!(matches_filter(&doc, &doc! { "links": { "github": "alice" } }).unwrap());
    }

    #[test]
    fn sort_comparator_orders_by_field() {
        let a = doc! { "age": 20 };
        let b = doc! { "age": 30 };
        assert_eq!(compare_field(&a, &b, "age"), Ordering::Less);
        assert_eq!(compare_field(&b, &a, "age"), Ordering::Greater);
        assert_eq!(compare_field(&a, &a, "missing"), Ordering::Equal);
    }
}
