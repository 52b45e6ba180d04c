//! Schema model for a collection
//!
//! A [`Schema`] is an immutable description of one model: its collection, its
//! field descriptors, secondary indexes, cascade targets and the flags that
//! gate CRUD operations. Schemas are built once, either through
//! [`Schema::builder`] or from a JSON declaration ([`SchemaDefinition`]), and
//! never mutated afterwards.

use bson::Document as BsonDocument;
use indexmap::IndexMap;
use serde::Deserialize;
use tessera_common::{Result, TesseraError};

/// Name of the automatically managed creation timestamp
pub const CREATED_AT: &str = "createdAt";

/// Name of the automatically managed update timestamp
pub const UPDATED_AT: &str = "updatedAt";

/// Name of the identifier field
pub const ID_FIELD: &str = "_id";

/// Maximum allowed length for collection names (MongoDB limit is 255, we're more conservative)
const MAX_COLLECTION_NAME_LENGTH: usize = 120;

/// Ordered mapping from field name to descriptor
pub type FieldMap = IndexMap<String, FieldDescriptor>;

/// Primitive field kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    String,
    Number,
    Boolean,
    Date,
    ObjectId,
    /// Untyped array
    Array,
}

impl FieldKind {
    /// Human-readable kind name, as used in declarations and error messages
    pub fn name(&self) -> &'static str {
        match self {
            FieldKind::String => "string",
            FieldKind::Number => "number",
            FieldKind::Boolean => "boolean",
            FieldKind::Date => "date",
            FieldKind::ObjectId => "objectId",
            FieldKind::Array => "array",
        }
    }

    /// Parse a declared kind name
    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "string" => Ok(FieldKind::String),
            "number" => Ok(FieldKind::Number),
            "boolean" => Ok(FieldKind::Boolean),
            "date" => Ok(FieldKind::Date),
            "objectId" | "id" => Ok(FieldKind::ObjectId),
            "array" => Ok(FieldKind::Array),
            other => Err(TesseraError::Schema(format!("unknown field type '{}'", other))),
        }
    }
}

impl std::fmt::Display for FieldKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Declared type of a field
#[derive(Debug, Clone, PartialEq)]
pub enum FieldType {
    Primitive(FieldKind),
    /// Array whose every element has the inner type
    TypedArray(Box<FieldType>),
    /// Embedded document with its own fields
    Embedded(FieldMap),
}

impl FieldType {
    pub fn type_name(&self) -> String {
        match self {
            FieldType::Primitive(kind) => kind.name().to_string(),
            FieldType::TypedArray(inner) => format!("[{}]", inner.type_name()),
            FieldType::Embedded(_) => "object".to_string(),
        }
    }

    /// Nested fields, when this is an embedded document type
    pub fn embedded_fields(&self) -> Option<&FieldMap> {
        match self {
            FieldType::Embedded(fields) => Some(fields),
            _ => None,
        }
    }
}

/// Descriptor of a single field
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    pub field_type: FieldType,
    /// Model name this field's identifier points to
    pub reference: Option<String>,
    pub required: bool,
    /// Replace the value with a one-way hash before persistence
    pub encrypted: bool,
}

impl FieldDescriptor {
    pub fn new(field_type: FieldType) -> Self {
        Self {
            field_type,
            reference: None,
            required: false,
            encrypted: false,
        }
    }

    pub fn primitive(kind: FieldKind) -> Self {
        Self::new(FieldType::Primitive(kind))
    }

    pub fn string() -> Self {
        Self::primitive(FieldKind::String)
    }

    pub fn number() -> Self {
        Self::primitive(FieldKind::Number)
    }

    pub fn boolean() -> Self {
        Self::primitive(FieldKind::Boolean)
    }

    pub fn date() -> Self {
        Self::primitive(FieldKind::Date)
    }

    pub fn object_id() -> Self {
        Self::primitive(FieldKind::ObjectId)
    }

    pub fn array() -> Self {
        Self::primitive(FieldKind::Array)
    }

    /// Array of elements of the given type
    pub fn array_of(element: FieldType) -> Self {
        Self::new(FieldType::TypedArray(Box::new(element)))
    }

    /// Embedded document with the given fields
    pub fn embedded(fields: FieldMap) -> Self {
        Self::new(FieldType::Embedded(fields))
    }

    /// Mark the field as required
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Mark the field as a foreign key into `model`
    pub fn references(mut self, model: impl Into<String>) -> Self {
        self.reference = Some(model.into());
        self
    }

    /// Mark the field as hashed on write
    pub fn encrypted(mut self) -> Self {
        self.encrypted = true;
        self
    }

    /// Copy of this descriptor with a different type
    pub fn with_type(&self, field_type: FieldType) -> Self {
        Self {
            field_type,
            ..self.clone()
        }
    }
}

/// Secondary index declaration, passed through to the driver
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct IndexSpec {
    pub keys: BsonDocument,
    #[serde(default)]
    pub options: Option<BsonDocument>,
}

impl IndexSpec {
    pub fn new(keys: BsonDocument) -> Self {
        Self { keys, options: None }
    }

    pub fn with_options(mut self, options: BsonDocument) -> Self {
        self.options = Some(options);
        self
    }
}

/// Flags gating operation categories
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OperationFlags {
    pub allow_upserts: bool,
    pub no_inserts: bool,
    pub no_insert_many: bool,
    pub no_updates: bool,
    pub no_update_many: bool,
    pub no_deletes: bool,
    pub no_delete_many: bool,
}

/// Description of one model and its collection
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    pub model: String,
    pub collection: String,
    /// `createdAt`/`updatedAt` are managed automatically
    pub timestamps: bool,
    pub fields: FieldMap,
    pub indexes: Vec<IndexSpec>,
    /// Models whose documents are deleted along with ours
    pub cascade: Vec<String>,
    pub flags: OperationFlags,
}

impl Schema {
    pub fn builder(model: impl Into<String>, collection: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder::new(model, collection)
    }

    /// Parse a JSON schema declaration
    pub fn from_json(source: &str) -> Result<Self> {
        let definition: SchemaDefinition = serde_json::from_str(source)?;
        Schema::try_from(definition)
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.get(name)
    }

    /// True if `key` is a timestamp field managed by this schema
    pub fn is_timestamp(&self, key: &str) -> bool {
        self.timestamps && is_timestamp_key(key)
    }

    /// Top-level fields whose `ref` points at `model`
    pub fn fields_referencing<'a>(&'a self, model: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.fields
            .iter()
            .filter(move |(_, descriptor)| descriptor.reference.as_deref() == Some(model))
            .map(|(name, _)| name.as_str())
    }
}

pub(crate) fn is_timestamp_key(key: &str) -> bool {
    key == CREATED_AT || key == UPDATED_AT
}

/// Builder for [`Schema`]
#[derive(Debug, Clone)]
pub struct SchemaBuilder {
    schema: Schema,
}

impl SchemaBuilder {
    pub fn new(model: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            schema: Schema {
                model: model.into(),
                collection: collection.into(),
                timestamps: false,
                fields: FieldMap::new(),
                indexes: Vec::new(),
                cascade: Vec::new(),
                flags: OperationFlags::default(),
            },
        }
    }

    pub fn timestamps(mut self, enabled: bool) -> Self {
        self.schema.timestamps = enabled;
        self
    }

    pub fn field(mut self, name: impl Into<String>, descriptor: FieldDescriptor) -> Self {
        self.schema.fields.insert(name.into(), descriptor);
        self
    }

    pub fn index(mut self, index: IndexSpec) -> Self {
        self.schema.indexes.push(index);
        self
    }

    pub fn cascade(mut self, model: impl Into<String>) -> Self {
        self.schema.cascade.push(model.into());
        self
    }

    pub fn flags(mut self, flags: OperationFlags) -> Self {
        self.schema.flags = flags;
        self
    }

    /// Check the declaration and produce the schema
    pub fn build(self) -> Result<Schema> {
        let schema = self.schema;

        if schema.model.is_empty() {
            return Err(TesseraError::Schema("Model name cannot be empty".to_string()));
        }
        check_collection_name(&schema.collection)?;
        check_fields(&schema.fields, "")?;

        if schema.timestamps {
            if let Some(name) = schema.fields.keys().find(|name| is_timestamp_key(name)) {
                return Err(TesseraError::Schema(format!(
                    "field '{}' of model '{}' collides with a managed timestamp",
                    name, schema.model
                )));
            }
        }

        Ok(schema)
    }
}

fn check_collection_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(TesseraError::Schema("Collection name cannot be empty".to_string()));
    }
    if name.len() > MAX_COLLECTION_NAME_LENGTH {
        return Err(TesseraError::Schema(format!(
            "Collection name exceeds maximum length of {} characters",
            MAX_COLLECTION_NAME_LENGTH
        )));
    }
    if name.contains('\0') {
        return Err(TesseraError::Schema("Collection name cannot contain null bytes".to_string()));
    }
    if name.starts_with("system.") {
        return Err(TesseraError::Schema(format!(
            "Collection name '{}' targets a system. collection",
            name
        )));
    }
    if name.contains('$') {
        return Err(TesseraError::Schema(format!(
            "Collection name '{}' cannot contain '$'",
            name
        )));
    }
    Ok(())
}

fn check_fields(fields: &FieldMap, parent: &str) -> Result<()> {
    for (name, descriptor) in fields {
        let path = if parent.is_empty() {
            name.clone()
        } else {
            format!("{}.{}", parent, name)
        };

        if name.is_empty() {
            return Err(TesseraError::Schema(format!(
                "empty field name under '{}'",
                parent
            )));
        }
        if name.contains('.') || name.starts_with('$') || name.contains('\0') {
            return Err(TesseraError::Schema(format!("illegal field name '{}'", path)));
        }
        if parent.is_empty() && name == ID_FIELD {
            return Err(TesseraError::Schema(
                "'_id' is managed by the database and cannot be declared".to_string(),
            ));
        }

        check_type(&descriptor.field_type, &path)?;
    }
    Ok(())
}

fn check_type(field_type: &FieldType, path: &str) -> Result<()> {
    match field_type {
        FieldType::Primitive(_) => Ok(()),
        FieldType::TypedArray(inner) => check_type(inner, path),
        FieldType::Embedded(fields) => check_fields(fields, path),
    }
}

// =====================
// JSON declarations
// =====================

/// Declared field type, as written in a JSON schema declaration
///
/// A kind name (`"string"`), a one-element list (`["number"]`) or an object of
/// nested field definitions.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TypeDefinition {
    Kind(String),
    List(Vec<TypeDefinition>),
    Fields(IndexMap<String, FieldDefinition>),
}

#[derive(Debug, Clone, Deserialize)]
pub struct FieldDefinition {
    #[serde(rename = "type")]
    pub field_type: TypeDefinition,
    #[serde(rename = "ref", default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub encrypted: bool,
}

/// Serde form of a [`Schema`]
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaDefinition {
    pub model: String,
    pub collection: String,
    #[serde(default)]
    pub timestamps: bool,
    #[serde(default)]
    pub fields: IndexMap<String, FieldDefinition>,
    #[serde(default)]
    pub indexes: Vec<IndexSpec>,
    #[serde(default)]
    pub cascade: Vec<String>,
    #[serde(flatten)]
    pub flags: OperationFlags,
}

impl TryFrom<&TypeDefinition> for FieldType {
    type Error = TesseraError;

    fn try_from(definition: &TypeDefinition) -> Result<Self> {
        match definition {
            TypeDefinition::Kind(name) => Ok(FieldType::Primitive(FieldKind::parse(name)?)),
            TypeDefinition::List(items) => match items.as_slice() {
                [element] => Ok(FieldType::TypedArray(Box::new(FieldType::try_from(element)?))),
                _ => Err(TesseraError::Schema(format!(
                    "typed array must declare exactly one element type, got {}",
                    items.len()
                ))),
            },
            TypeDefinition::Fields(fields) => Ok(FieldType::Embedded(field_map(fields)?)),
        }
    }
}

impl TryFrom<&FieldDefinition> for FieldDescriptor {
    type Error = TesseraError;

    fn try_from(definition: &FieldDefinition) -> Result<Self> {
        Ok(FieldDescriptor {
            field_type: FieldType::try_from(&definition.field_type)?,
            reference: definition.reference.clone(),
            required: definition.required,
            encrypted: definition.encrypted,
        })
    }
}

fn field_map(definitions: &IndexMap<String, FieldDefinition>) -> Result<FieldMap> {
    definitions
        .iter()
        .map(|(name, definition)| Ok((name.clone(), FieldDescriptor::try_from(definition)?)))
        .collect()
}

impl TryFrom<SchemaDefinition> for Schema {
    type Error = TesseraError;

    fn try_from(definition: SchemaDefinition) -> Result<Self> {
        let mut builder = Schema::builder(definition.model, definition.collection)
            .timestamps(definition.timestamps)
            .flags(definition.flags);

        for (name, descriptor) in field_map(&definition.fields)? {
            builder = builder.field(name, descriptor);
        }
        for index in definition.indexes {
            builder = builder.index(index);
        }
        for model in definition.cascade {
            builder = builder.cascade(model);
        }

        builder.build()
    }
}
