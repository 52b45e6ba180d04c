//! Stage factories

use bson::{doc, oid::ObjectId, Bson, Document as BsonDocument};
use tessera_common::{Result, TesseraError};

use super::{prefixed, Stage};
use crate::registry::Registry;
use crate::sanitize::{sanitize, SanitizeOptions};
use crate::schema::{FieldDescriptor, Schema, CREATED_AT, ID_FIELD, UPDATED_AT};

// =====================
// $match
// =====================

/// What a `$match` stage filters on
#[derive(Debug, Clone, PartialEq)]
pub enum MatchSpec {
    /// Filter document, sanitized against the schema
    Filter(BsonDocument),
    /// Match a single identifier
    Id(ObjectId),
    /// Match a single identifier given as 24 hex characters
    IdString(String),
}

impl From<BsonDocument> for MatchSpec {
    fn from(filter: BsonDocument) -> Self {
        MatchSpec::Filter(filter)
    }
}

impl From<&BsonDocument> for MatchSpec {
    fn from(filter: &BsonDocument) -> Self {
        MatchSpec::Filter(filter.clone())
    }
}

impl From<ObjectId> for MatchSpec {
    fn from(id: ObjectId) -> Self {
        MatchSpec::Id(id)
    }
}

impl From<&str> for MatchSpec {
    fn from(id: &str) -> Self {
        MatchSpec::IdString(id.to_string())
    }
}

impl From<String> for MatchSpec {
    fn from(id: String) -> Self {
        MatchSpec::IdString(id)
    }
}

impl TryFrom<&Bson> for MatchSpec {
    type Error = TesseraError;

    fn try_from(value: &Bson) -> Result<Self> {
        match value {
            Bson::Document(filter) => Ok(MatchSpec::Filter(filter.clone())),
            Bson::ObjectId(id) => Ok(MatchSpec::Id(*id)),
            Bson::String(id) => Ok(MatchSpec::IdString(id.clone())),
            other => Err(TesseraError::Query(format!(
                "match spec must be a filter document or an identifier, got {}",
                other
            ))),
        }
    }
}

/// Unprefixed filter document for `spec`
///
/// Filters are sanitized with dot notation; identifiers become `{ _id: id }`.
pub(crate) fn match_filter(schema: &Schema, spec: &MatchSpec) -> Result<BsonDocument> {
    Ok(match spec {
        MatchSpec::Filter(filter) => sanitize(schema, filter, SanitizeOptions::dot_notation()),
        MatchSpec::Id(id) => doc! { "_id": *id },
        MatchSpec::IdString(hex) => {
            let id = ObjectId::parse_str(hex)?;
            doc! { "_id": id }
        }
    })
}

/// Build one `$match` stage
///
/// Filters keep only `_id`, managed timestamps and declared (dot-notation)
/// fields; identifiers become `{ _id: id }`. Every surviving key gets `prefix`.
///
/// # Errors
/// Returns a validation error if an identifier string is not a valid ObjectId
pub fn match_stage(schema: &Schema, spec: &MatchSpec, prefix: &str) -> Result<Vec<Stage>> {
    let body: BsonDocument = match_filter(schema, spec)?
        .into_iter()
        .map(|(key, value)| (prefixed(prefix, &key), value))
        .collect();

    Ok(vec![doc! { "$match": body }])
}

// =====================
// $lookup / $unwind
// =====================

/// Path prefixes for [`lookup_stages`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LookupOptions {
    /// Prefix of the local foreign-key path
    pub from_prefix: String,
    /// Prefix of the joined output path
    pub to_prefix: String,
}

impl LookupOptions {
    pub fn new(from_prefix: impl Into<String>, to_prefix: impl Into<String>) -> Self {
        Self {
            from_prefix: from_prefix.into(),
            to_prefix: to_prefix.into(),
        }
    }

    /// Same prefix on both sides
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        Self {
            from_prefix: prefix.clone(),
            to_prefix: prefix,
        }
    }
}

/// How a populate request reads: `true`, `false` or a nested spec
fn populate_request<'a>(field: &str, value: &'a Bson) -> Result<Option<Option<&'a BsonDocument>>> {
    match value {
        Bson::Boolean(true) => Ok(Some(None)),
        Bson::Boolean(false) => Ok(None),
        Bson::Document(nested) => Ok(Some(Some(nested))),
        other => Err(TesseraError::Query(format!(
            "populate value for '{}' must be a boolean or a document, got {}",
            field, other
        ))),
    }
}

/// Descriptor and referenced model of a field asked to populate
fn referenced_schema<'a>(
    registry: &Registry,
    schema: &'a Schema,
    field: &str,
) -> Result<(&'a FieldDescriptor, std::sync::Arc<Schema>)> {
    let reference = schema
        .field(field)
        .and_then(|descriptor| descriptor.reference.as_deref().map(|r| (descriptor, r)));

    let Some((descriptor, model)) = reference else {
        return Err(TesseraError::MissingReference(format!(
            "field '{}' of model '{}' has no ref to populate",
            field, schema.model
        )));
    };

    Ok((descriptor, registry.get_schema(model)?))
}

/// Build `$lookup` + `$unwind` pairs for every requested field
///
/// `spec` maps field names to `true` or a nested spec for the referenced
/// model; nested specs recurse with both prefixes advanced to the joined path.
/// Recursion follows the spec, so it ends when the spec does. Every `$unwind`
/// preserves null and empty arrays, which keeps parents whose reference is
/// absent.
///
/// # Errors
/// Returns a missing-reference error for a field without `ref`, and a
/// model-not-found error when the referenced model is not registered
pub fn lookup_stages(
    registry: &Registry,
    schema: &Schema,
    spec: &BsonDocument,
    options: &LookupOptions,
) -> Result<Vec<Stage>> {
    let mut stages = Vec::new();

    for (field, value) in spec {
        let Some(nested) = populate_request(field, value)? else {
            continue;
        };

        let (_, referenced) = referenced_schema(registry, schema, field)?;
        let local_field = prefixed(&options.from_prefix, field);
        let output = prefixed(&options.to_prefix, field);

        stages.push(doc! {
            "$lookup": {
                "from": referenced.collection.as_str(),
                "localField": local_field,
                "foreignField": "_id",
                "as": output.as_str(),
            }
        });
        stages.push(doc! {
            "$unwind": {
                "path": format!("${}", output),
                "preserveNullAndEmptyArrays": true,
            }
        });

        if let Some(nested) = nested {
            let next = LookupOptions::with_prefix(format!("{}.", output));
            stages.extend(lookup_stages(registry, &referenced, nested, &next)?);
        }
    }

    Ok(stages)
}

// =====================
// $group / $sort
// =====================

/// What a `$group` stage groups by
#[derive(Debug, Clone, PartialEq)]
pub enum GroupSpec {
    /// Group on one field path
    Field(String),
    /// Raw group body, passed through verbatim
    Expression(BsonDocument),
}

impl From<&str> for GroupSpec {
    fn from(field: &str) -> Self {
        GroupSpec::Field(field.to_string())
    }
}

impl From<String> for GroupSpec {
    fn from(field: String) -> Self {
        GroupSpec::Field(field)
    }
}

impl From<BsonDocument> for GroupSpec {
    fn from(expression: BsonDocument) -> Self {
        GroupSpec::Expression(expression)
    }
}

/// Build one `$group` stage
pub fn group_stage(_schema: &Schema, spec: &GroupSpec) -> Vec<Stage> {
    let body = match spec {
        GroupSpec::Field(field) => doc! { "_id": format!("${}", field) },
        GroupSpec::Expression(expression) => expression.clone(),
    };
    vec![doc! { "$group": body }]
}

/// Build one `$sort` stage from a key/direction document
pub fn sort_stage(_schema: &Schema, spec: &BsonDocument) -> Vec<Stage> {
    vec![doc! { "$sort": spec.clone() }]
}

// =====================
// $project
// =====================

/// Options for [`project_body`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectOptions {
    pub to_prefix: String,
    pub from_prefix: String,
    /// Field name to `true`, `false` or a nested populate map
    pub populate: BsonDocument,
    pub exclude: Vec<String>,
}

impl ProjectOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn prefixes(mut self, from_prefix: impl Into<String>, to_prefix: impl Into<String>) -> Self {
        self.from_prefix = from_prefix.into();
        self.to_prefix = to_prefix.into();
        self
    }

    pub fn populate(mut self, populate: BsonDocument) -> Self {
        self.populate = populate;
        self
    }

    pub fn exclude<S: Into<String>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        self.exclude = fields.into_iter().map(Into::into).collect();
        self
    }

    fn excludes(&self, field: &str) -> bool {
        self.exclude.iter().any(|excluded| excluded == field)
    }
}

/// Build the body of a `$project` stage
///
/// `_id` is always projected. Declared fields are renamed from `from_prefix`
/// to `to_prefix` unless excluded or populated with `false`; a populated
/// reference field becomes the nested projection of the referenced model,
/// computed without prefixes.
///
/// # Errors
/// Returns a missing-reference error when a populated field has no `ref`, and a
/// model-not-found error when the referenced model is not registered
pub fn project_body(registry: &Registry, schema: &Schema, options: &ProjectOptions) -> Result<BsonDocument> {
    let mut body = BsonDocument::new();
    let rename = |field: &str| format!("${}", prefixed(&options.from_prefix, field));

    body.insert(prefixed(&options.to_prefix, ID_FIELD), rename(ID_FIELD));

    for field in schema.fields.keys() {
        if options.excludes(field) {
            continue;
        }

        let request = match options.populate.get(field) {
            Some(value) => populate_request(field, value)?.map(Some),
            None => Some(None),
        };

        match request {
            // populated with `false`
            None => continue,
            Some(Some(nested)) => {
                let (_, referenced) = referenced_schema(registry, schema, field)?;
                let nested_options = ProjectOptions {
                    populate: nested.cloned().unwrap_or_default(),
                    ..ProjectOptions::default()
                };
                let nested_body = project_body(registry, &referenced, &nested_options)?;
                body.insert(prefixed(&options.to_prefix, field), nested_body);
            }
            Some(None) => {
                body.insert(prefixed(&options.to_prefix, field), rename(field));
            }
        }
    }

    if schema.timestamps {
        for field in [UPDATED_AT, CREATED_AT] {
            if !options.excludes(field) {
                body.insert(prefixed(&options.to_prefix, field), rename(field));
            }
        }
    }

    Ok(body)
}

/// Build one `$project` stage
pub fn project_stage(registry: &Registry, schema: &Schema, options: &ProjectOptions) -> Result<Vec<Stage>> {
    Ok(vec![doc! { "$project": project_body(registry, schema, options)? }])
}
