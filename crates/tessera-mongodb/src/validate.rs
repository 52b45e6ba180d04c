//! Field validation
//!
//! Type-checks BSON values against [`FieldDescriptor`]s and applies the
//! optional per-field [`Strategy`]. Every failure is returned as an error;
//! nothing is swallowed here.
//!
//! # Legal strategies per type
//!
//! | type                        | pattern | max | one-of | predicate |
//! |-----------------------------|---------|-----|--------|-----------|
//! | string                      | yes     | length | yes | yes       |
//! | number                      | no      | value  | yes | yes       |
//! | boolean                     | no      | no  | yes    | yes       |
//! | date, objectId, array       | no      | no  | no     | yes       |
//! | embedded object             | no      | no  | no     | yes       |

use std::fmt;
use std::sync::Arc;

use bson::{Bson, Document as BsonDocument};
use regex::Regex;
use tessera_common::{Result, TesseraError};

use crate::hooks::FieldHookMap;
use crate::resolver::resolve;
use crate::schema::{FieldDescriptor, FieldKind, FieldType, Schema, ID_FIELD};

/// Predicate used as a validation strategy
pub type Predicate = Arc<dyn Fn(&Bson) -> bool + Send + Sync>;

/// Extra validation rule attached to a field
#[derive(Clone)]
pub enum Strategy {
    /// String must match
    Pattern(Regex),
    /// Maximum string length or maximum numeric value, inclusive
    Max(f64),
    /// Value must be one of these
    OneOf(Vec<Bson>),
    /// Must return true
    Predicate(Predicate),
}

impl Strategy {
    /// Compile a pattern strategy
    pub fn pattern(pattern: &str) -> Result<Self> {
        Regex::new(pattern)
            .map(Strategy::Pattern)
            .map_err(|e| TesseraError::Schema(format!("invalid pattern '{}': {}", pattern, e)))
    }

    pub fn max(limit: impl Into<f64>) -> Self {
        Strategy::Max(limit.into())
    }

    pub fn one_of<T: Into<Bson>>(values: impl IntoIterator<Item = T>) -> Self {
        Strategy::OneOf(values.into_iter().map(Into::into).collect())
    }

    pub fn predicate(f: impl Fn(&Bson) -> bool + Send + Sync + 'static) -> Self {
        Strategy::Predicate(Arc::new(f))
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Strategy::Pattern(_) => "pattern",
            Strategy::Max(_) => "max",
            Strategy::OneOf(_) => "one-of",
            Strategy::Predicate(_) => "predicate",
        }
    }

    fn is_predicate(&self) -> bool {
        matches!(self, Strategy::Predicate(_))
    }
}

impl fmt::Debug for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Pattern(re) => f.debug_tuple("Pattern").field(&re.as_str()).finish(),
            Strategy::Max(n) => f.debug_tuple("Max").field(n).finish(),
            Strategy::OneOf(values) => f.debug_tuple("OneOf").field(values).finish(),
            Strategy::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

/// How much of a document [`validate_document`] checks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationMode {
    /// Every declared field, so absent required fields fail
    Full,
    /// Only the keys present in the document, resolved with dot notation
    Present,
}

/// Get the BSON type name for error messages
fn bson_type_name(value: &Bson) -> &'static str {
    match value {
        Bson::Double(_) => "double",
        Bson::String(_) => "string",
        Bson::Array(_) => "array",
        Bson::Document(_) => "object",
        Bson::Boolean(_) => "bool",
        Bson::Null => "null",
        Bson::Int32(_) => "int32",
        Bson::Int64(_) => "int64",
        Bson::Timestamp(_) => "timestamp",
        Bson::Binary(_) => "binary",
        Bson::ObjectId(_) => "objectid",
        Bson::DateTime(_) => "datetime",
        Bson::Symbol(_) => "symbol",
        Bson::Decimal128(_) => "decimal128",
        _ => "unknown",
    }
}

fn kind_matches(kind: FieldKind, value: &Bson) -> bool {
    match kind {
        FieldKind::String => matches!(value, Bson::String(_)),
        FieldKind::Number => as_number(value).is_some(),
        FieldKind::Boolean => matches!(value, Bson::Boolean(_)),
        FieldKind::Date => matches!(value, Bson::DateTime(_)),
        FieldKind::ObjectId => matches!(value, Bson::ObjectId(_)),
        FieldKind::Array => matches!(value, Bson::Array(_)),
    }
}

pub(crate) fn as_number(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(n) => Some(*n as f64),
        Bson::Int64(n) => Some(*n as f64),
        Bson::Double(n) => Some(*n),
        Bson::Decimal128(d) => d.to_string().parse::<f64>().ok(),
        _ => None,
    }
}

/// Equality for one-of membership; numbers compare by value across widths
fn same_value(a: &Bson, b: &Bson) -> bool {
    match (as_number(a), as_number(b)) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn type_mismatch(path: &str, expected: &str, value: &Bson) -> TesseraError {
    TesseraError::Validation(format!(
        "field '{}' expected type '{}', got '{}'",
        path,
        expected,
        bson_type_name(value)
    ))
}

fn unsupported(path: &str, strategy: &Strategy, type_name: &str) -> TesseraError {
    TesseraError::Validation(format!(
        "field '{}': {} strategy is not supported for type '{}'",
        path,
        strategy.kind_name(),
        type_name
    ))
}

fn check_predicate(path: &str, predicate: &Predicate, value: &Bson) -> Result<()> {
    if predicate(value) {
        Ok(())
    } else {
        Err(TesseraError::Validation(format!(
            "field '{}' failed predicate validation with value {}",
            path, value
        )))
    }
}

fn check_one_of(path: &str, allowed: &[Bson], value: &Bson) -> Result<()> {
    if allowed.iter().any(|candidate| same_value(candidate, value)) {
        Ok(())
    } else {
        Err(TesseraError::Validation(format!(
            "field '{}' value {} is not one of {:?}",
            path, value, allowed
        )))
    }
}

/// Validate one value against its descriptor and optional strategy
///
/// `path` names the field in error messages. `None` and `Bson::Null` pass
/// unless the descriptor is required.
///
/// # Errors
/// Returns a validation error for a missing required value, a type mismatch,
/// a failed strategy, or a strategy the field type does not support
pub fn validate(
    path: &str,
    value: Option<&Bson>,
    descriptor: &FieldDescriptor,
    strategy: Option<&Strategy>,
) -> Result<()> {
    let value = match value {
        None | Some(Bson::Null) => {
            return if descriptor.required {
                Err(TesseraError::Validation(format!("field '{}' is required", path)))
            } else {
                Ok(())
            };
        }
        Some(value) => value,
    };

    match &descriptor.field_type {
        FieldType::Primitive(kind) => validate_primitive(path, value, *kind, strategy),

        FieldType::TypedArray(element) => {
            let Bson::Array(items) = value else {
                return Err(type_mismatch(path, &descriptor.field_type.type_name(), value));
            };
            let element_descriptor = descriptor.with_type((**element).clone());
            let element_strategy = strategy.filter(|s| !s.is_predicate());
            for (index, item) in items.iter().enumerate() {
                let item_path = format!("{}[{}]", path, index);
                validate(&item_path, Some(item), &element_descriptor, element_strategy)?;
            }
            match strategy {
                Some(Strategy::Predicate(predicate)) => check_predicate(path, predicate, value),
                _ => Ok(()),
            }
        }

        FieldType::Embedded(fields) => {
            let Bson::Document(document) = value else {
                return Err(type_mismatch(path, "object", value));
            };
            if let Some(other) = strategy.filter(|s| !s.is_predicate()) {
                return Err(unsupported(path, other, "object"));
            }
            for (name, sub) in fields {
                let nested_path = format!("{}.{}", path, name);
                validate(&nested_path, document.get(name), sub, None)?;
            }
            match strategy {
                Some(Strategy::Predicate(predicate)) => check_predicate(path, predicate, value),
                _ => Ok(()),
            }
        }
    }
}

fn validate_primitive(
    path: &str,
    value: &Bson,
    kind: FieldKind,
    strategy: Option<&Strategy>,
) -> Result<()> {
    if !kind_matches(kind, value) {
        return Err(type_mismatch(path, kind.name(), value));
    }

    let Some(strategy) = strategy else {
        return Ok(());
    };

    match (kind, strategy) {
        (_, Strategy::Predicate(predicate)) => check_predicate(path, predicate, value),

        (FieldKind::String, Strategy::Pattern(re)) => {
            let text = value.as_str().unwrap_or_default();
            if re.is_match(text) {
                Ok(())
            } else {
                Err(TesseraError::Validation(format!(
                    "field '{}' value '{}' does not match pattern '{}'",
                    path,
                    text,
                    re.as_str()
                )))
            }
        }
        (FieldKind::String, Strategy::Max(limit)) => {
            let length = value.as_str().map(|s| s.chars().count()).unwrap_or_default();
            if length as f64 <= *limit {
                Ok(())
            } else {
                Err(TesseraError::Validation(format!(
                    "field '{}' length {} exceeds maximum of {}",
                    path, length, limit
                )))
            }
        }
        (FieldKind::Number, Strategy::Max(limit)) => {
            let number = as_number(value).unwrap_or_default();
            if number <= *limit {
                Ok(())
            } else {
                Err(TesseraError::Validation(format!(
                    "field '{}' value {} exceeds maximum of {}",
                    path, number, limit
                )))
            }
        }
        (FieldKind::String | FieldKind::Number | FieldKind::Boolean, Strategy::OneOf(allowed)) => {
            check_one_of(path, allowed, value)
        }

        (kind, other) => Err(unsupported(path, other, kind.name())),
    }
}

/// Validate a whole document against a schema
///
/// `hooks` supplies per-field strategies keyed by top-level field name. Dotted
/// keys in `Present` mode are checked for type and required-ness only.
pub fn validate_document(
    schema: &Schema,
    document: &BsonDocument,
    hooks: &FieldHookMap,
    mode: ValidationMode,
) -> Result<()> {
    let strategy_for = |key: &str| {
        if key.contains('.') {
            return None;
        }
        hooks.get(key).and_then(|h| h.strategy.as_ref())
    };

    match mode {
        ValidationMode::Full => {
            for (name, descriptor) in &schema.fields {
                validate(name, document.get(name), descriptor, strategy_for(name))?;
            }
        }
        ValidationMode::Present => {
            for (key, value) in document {
                if key == ID_FIELD || schema.is_timestamp(key) {
                    continue;
                }
                if let Some(descriptor) = resolve(&schema.fields, key) {
                    validate(key, Some(value), descriptor, strategy_for(key))?;
                }
            }
        }
    }
    Ok(())
}
