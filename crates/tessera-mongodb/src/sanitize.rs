//! Document sanitization
//!
//! Sanitization is silently lossy: keys the schema does not declare are
//! dropped, never rejected, and so are null values. Filters, inserts and
//! update descriptors all pass through here before anything else looks at
//! them.

use bson::{Bson, Document as BsonDocument};

use crate::resolver::resolve;
use crate::schema::{Schema, ID_FIELD};

/// Options for [`sanitize`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SanitizeOptions {
    /// Accept `"embedded.sub"` keys that resolve through embedded fields
    pub account_for_dot_notation: bool,
}

impl SanitizeOptions {
    pub fn dot_notation() -> Self {
        Self {
            account_for_dot_notation: true,
        }
    }
}

/// Update operators whose fragments are kept by [`sanitize_update`]
const UPDATE_OPERATORS: &[&str] = &[
    "$set",
    "$unset",
    "$setOnInsert",
    "$addToSet",
    "$push",
    "$pull",
    "$pullAll",
    "$pop",
    "$inc",
    "$mul",
    "$min",
    "$max",
    "$currentDate",
];

/// True if `key` may survive sanitization against `schema`
pub fn is_declared(schema: &Schema, key: &str, options: SanitizeOptions) -> bool {
    if key == ID_FIELD {
        return true;
    }
    if crate::schema::is_timestamp_key(key) {
        return schema.timestamps;
    }
    if options.account_for_dot_notation {
        resolve(&schema.fields, key).is_some()
    } else {
        schema.fields.contains_key(key)
    }
}

/// Keep only `_id`, managed timestamps and declared fields, without null values
///
/// Values are copied verbatim.
pub fn sanitize(schema: &Schema, fragment: &BsonDocument, options: SanitizeOptions) -> BsonDocument {
    fragment
        .iter()
        .filter(|(key, value)| !matches!(value, Bson::Null) && is_declared(schema, key, options))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// Bring an update descriptor into sanitized operator form
///
/// A plain fragment is treated as `$set`. Fragments under each known operator
/// are sanitized with dot notation on. Null values under `$set` are moved to
/// `$unset`; `_id` is never updated; empty operators and unknown operators are
/// dropped.
pub fn sanitize_update(schema: &Schema, update: &BsonDocument) -> BsonDocument {
    let options = SanitizeOptions::dot_notation();

    let mut set = BsonDocument::new();
    let mut operators: Vec<(String, BsonDocument)> = Vec::new();

    for (key, value) in update {
        if !key.starts_with('$') {
            set.insert(key.clone(), value.clone());
            continue;
        }
        if !UPDATE_OPERATORS.contains(&key.as_str()) {
            continue;
        }
        if let Bson::Document(fragment) = value {
            if key == "$set" {
                for (field, field_value) in fragment {
                    set.insert(field.clone(), field_value.clone());
                }
            } else {
                operators.push((key.clone(), fragment.clone()));
            }
        }
    }

    let mut unset = BsonDocument::new();
    let mut clean_set = BsonDocument::new();
    for (key, value) in set {
        if key == ID_FIELD || !is_declared(schema, &key, options) {
            continue;
        }
        if matches!(value, Bson::Null) {
            unset.insert(key, "");
        } else {
            clean_set.insert(key, value);
        }
    }

    let mut result = BsonDocument::new();
    if !clean_set.is_empty() {
        result.insert("$set", clean_set);
    }

    for (operator, fragment) in operators {
        if operator == "$unset" {
            for key in fragment.keys() {
                if key != ID_FIELD && is_declared(schema, key, options) {
                    unset.insert(key.clone(), "");
                }
            }
            continue;
        }

        let mut clean = sanitize(schema, &fragment, options);
        clean.remove(ID_FIELD);
        if clean.is_empty() {
            continue;
        }
        match result.get_document_mut(&operator) {
            Ok(existing) => {
                for (field, field_value) in clean {
                    existing.insert(field, field_value);
                }
            }
            Err(_) => {
                result.insert(operator, clean);
            }
        }
    }

    if !unset.is_empty() {
        result.insert("$unset", unset);
    }

    result
}
