//! Declared field constraints, checked against serialized documents.
//!
//! The struct definition already fixes the field set and the Rust-side types;
//! the schema adds the constraints the type system cannot express (required
//! non-empty strings, the BSON type a field must land as) and is the source
//! of the `ValidationError` contract: validation runs before any write and
//! names the offending field.

use bson::{Bson, Document};

use crate::error::{ModelError, ModelResult};

/// The semantic type a declared field must serialize to.
///
/// Numeric kinds accept safe widenings: `Int` matches both 32- and 64-bit
/// integers, `Float` additionally matches doubles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// A UTF-8 string.
    String,
    /// A 32- or 64-bit integer.
    Int,
    /// A double, or an integer coerced losslessly.
    Float,
    /// A boolean.
    Bool,
    /// A BSON datetime.
    DateTime,
    /// An array of any element type.
    Array,
    /// An embedded document.
    Document,
    /// Any non-null value.
    Any,
}

impl FieldKind {
    fn matches(self, value: &Bson) -> bool {
        match self {
            FieldKind::String => matches!(value, Bson::String(_)),
            FieldKind::Int => matches!(value, Bson::Int32(_) | Bson::Int64(_)),
            FieldKind::Float => {
                matches!(value, Bson::Double(_) | Bson::Int32(_) | Bson::Int64(_))
            }
            FieldKind::Bool => matches!(value, Bson::Boolean(_)),
            FieldKind::DateTime => matches!(value, Bson::DateTime(_)),
            FieldKind::Array => matches!(value, Bson::Array(_)),
            FieldKind::Document => matches!(value, Bson::Document(_)),
            FieldKind::Any => !matches!(value, Bson::Null),
        }
    }

    fn describe(self) -> &'static str {
        match self {
            FieldKind::String => "string",
            FieldKind::Int => "integer",
            FieldKind::Float => "number",
            FieldKind::Bool => "boolean",
            FieldKind::DateTime => "datetime",
            FieldKind::Array => "array",
            FieldKind::Document => "document",
            FieldKind::Any => "any value",
        }
    }
}

/// A single declared field constraint.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    name: String,
    kind: FieldKind,
    required: bool,
    allow_empty: bool,
}

impl FieldSpec {
    /// A field that must be present and non-null.
    pub fn required(name: impl Into<String>, kind: FieldKind) -> Self {
        Self { name: name.into(), kind, required: true, allow_empty: true }
    }

    /// A field that may be absent or null; when present it must match `kind`.
    pub fn optional(name: impl Into<String>, kind: FieldKind) -> Self {
        Self { name: name.into(), kind, required: false, allow_empty: true }
    }

    /// Rejects the empty string for this field.
    pub fn non_empty(mut self) -> Self {
        self.allow_empty = false;
        self
    }

    /// The field name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// The declared schema of a record type: an ordered list of field constraints.
///
/// Computed once at declaration (the registry stores it on the runtime) and
/// applied to the serialized document of every `create`/`save`/`bulk_create`.
/// An empty schema accepts anything the struct can serialize.
#[derive(Debug, Clone, Default)]
pub struct ModelSchema {
    fields: Vec<FieldSpec>,
}

impl ModelSchema {
    /// Creates an empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a field constraint.
    pub fn field(mut self, spec: FieldSpec) -> Self {
        self.fields.push(spec);
        self
    }

    /// The declared field constraints.
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Whether no constraints are declared.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Validates a serialized document against the declared constraints.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Validation`] naming the first offending field.
    pub fn validate(&self, document: &Document) -> ModelResult<()> {
        for spec in &self.fields {
            match document.get(&spec.name) {
                None | Some(Bson::Null) => {
                    if spec.required {
                        return Err(ModelError::Validation {
                            field: spec.name.clone(),
                            reason: "missing required field".to_string(),
                        });
                    }
                }
                Some(value) => {
                    if !spec.kind.matches(value) {
                        return Err(ModelError::Validation {
                            field: spec.name.clone(),
                            reason: format!("expected {}", spec.kind.describe()),
                        });
                    }
                    if let Bson::String(s) = value {
                        if s.is_empty() && !spec.allow_empty {
                            return Err(ModelError::Validation {
                                field: spec.name.clone(),
                                reason: "must not be empty".to_string(),
                            });
                        }
                    }
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn schema() -> ModelSchema {
        ModelSchema::new()
            .field(FieldSpec::required("name", FieldKind::String).non_empty())
            .field(FieldSpec::required("email", FieldKind::String).non_empty())
            .field(FieldSpec::optional("age", FieldKind::Int))
    }

    #[test]
    fn accepts_a_well_formed_document() {
        let doc = doc! { "name": "John", "email": "john@example.com", "age": 25_i64 };
        assert!(schema().validate(&doc).is_ok());
    }

    #[test]
    fn optional_fields_may_be_absent_or_null() {
        assert!(schema().validate(&doc! { "name": "a", "email": "b" }).is_ok());
        assert!(schema()
            .validate(&doc! { "name": "a", "email": "b", "age": Bson::Null })
            .is_ok());
    }

    #[test]
    fn missing_required_field_is_named() {
        let err = schema().validate(&doc! { "name": "John" }).unwrap_err();
        assert_eq!(
            err,
            ModelError::Validation {
                field: "email".to_string(),
                reason: "missing required field".to_string(),
            }
        );
    }

    #[test]
    fn wrong_type_is_rejected() {
        let doc = doc! { "name": "John", "email": "j@e.com", "age": "twenty" };
        match schema().validate(&doc).unwrap_err() {
            ModelError::Validation { field, .. } => assert_eq!(field, "age"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn empty_string_is_rejected_where_disallowed() {
        let doc = doc! { "name": "", "email": "j@e.com" };
        match schema().validate(&doc).unwrap_err() {
            ModelError::Validation { field, reason } => {
                assert_eq!(field, "name");
                assert_eq!(reason, "must not be empty");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn integers_coerce_into_numeric_kinds() {
        let schema = ModelSchema::new()
            .field(FieldSpec::required("count", FieldKind::Int))
            .field(FieldSpec::required("score", FieldKind::Float));

        assert!(schema
            .validate(&doc! { "count": 3_i32, "score": 4_i32 })
            .is_ok());
        assert!(schema
            .validate(&doc! { "count": 3_i64, "score": 4.5_f64 })
            .is_ok());
        assert!(schema
            .validate(&doc! { "count": 3.5_f64, "score": 1.0_f64 })
            .is_err());
    }
}
