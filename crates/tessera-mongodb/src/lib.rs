//! Schema-driven document mapping for MongoDB
//!
//! This crate turns declarative schemas into sanitized, validated documents and
//! MongoDB aggregation pipelines.
//!
//! # Features
//! - Schema model with builder and JSON declarations
//! - Silently lossy sanitization of filters, inserts and update descriptors
//! - Type and strategy validation, per-field formatting and hashing
//! - Aggregation pipeline synthesis (`$match`, `$lookup`/`$unwind`, `$group`,
//!   `$sort`, `$project`)
//! - CRUD orchestration with lifecycle hooks and cascade delete

pub mod connection;
pub mod driver;
pub mod format;
pub mod hooks;
pub mod model;
pub mod pipeline;
pub mod registry;
pub mod resolver;
pub mod sanitize;
pub mod schema;
pub mod validate;

pub use connection::{Connection, PoolConfig};
pub use driver::{CollectionHandle, DatabaseHandle, UpdateOutcome};
pub use format::{format, hash_value};
pub use hooks::{DefaultValue, FieldHookMap, FieldHooks, ModelHooks, NoHooks};
pub use model::{Model, ModelBuilder, UpdateOptions};
pub use pipeline::{build_pipeline, GroupSpec, MatchSpec, PipelineOptions, PipelineSpec, Stage};
pub use registry::Registry;
pub use resolver::resolve;
pub use sanitize::{sanitize, sanitize_update, SanitizeOptions};
pub use schema::{
    FieldDescriptor, FieldKind, FieldMap, FieldType, IndexSpec, OperationFlags, Schema, SchemaBuilder,
    SchemaDefinition,
};
pub use tessera_common::{Result, TesseraError};
pub use validate::{validate, validate_document, Strategy, ValidationMode};
