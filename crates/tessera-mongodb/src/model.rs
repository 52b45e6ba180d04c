//! CRUD orchestration
//!
//! A [`Model`] closes over one schema and runs every operation through the same
//! shape: sanitize, lifecycle hook, defaults, format, validate, driver call,
//! lifecycle hook. Deletes then cascade to dependent models.
//!
//! Filters for updates, replacements and deletes accept anything that converts
//! into a [`MatchSpec`]: a filter document is sanitized with dot notation, and
//! an `ObjectId` or 24-hex string matches on `_id`.
//!
//! Mutating operations come in two forms. `*_strict` methods propagate every
//! error; the plain methods log the error at `warn` and return a neutral value
//! (`None`, `0` or an empty list).
//!
//! # Example
//!
//! ```ignore
//! let users = Model::builder(&registry, "User", connection.handle())?
//!     .field("email", FieldHooks::new().format(lowercase))
//!     .build()?;
//!
//! let created = users.insert_one_strict(&doc! { "email": "ADA@EXAMPLE.COM" }).await?;
//! let found = users.find(&doc! { "$match": { "email": "ada@example.com" }, "$lookup": { "team": true } }).await?;
//! ```

use std::sync::Arc;

use bson::{doc, oid::ObjectId, Bson, Document as BsonDocument};
use tessera_common::{Result, TesseraError};
use tracing::{debug, info, instrument, warn};

use crate::driver::{CollectionHandle, DatabaseHandle, UpdateOutcome};
use crate::format::format;
use crate::hooks::{FieldHookMap, FieldHooks, ModelHooks, NoHooks};
use crate::pipeline::{build_pipeline, match_filter, match_stage, MatchSpec, PipelineOptions, PipelineSpec, Stage};
use crate::registry::Registry;
use crate::resolver::resolve;
use crate::sanitize::{sanitize, sanitize_update, SanitizeOptions};
use crate::schema::{Schema, CREATED_AT, ID_FIELD, UPDATED_AT};
use crate::validate::{validate_document, ValidationMode};

/// Options for updates and replacements
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOptions {
    /// Insert when nothing matches; requires `allowUpserts` on the schema
    pub upsert: bool,
}

impl UpdateOptions {
    pub fn upsert() -> Self {
        Self { upsert: true }
    }
}

/// Builder for [`Model`]
pub struct ModelBuilder {
    schema: Arc<Schema>,
    registry: Registry,
    database: Arc<dyn DatabaseHandle>,
    fields: FieldHookMap,
    hooks: Arc<dyn ModelHooks>,
}

impl std::fmt::Debug for ModelBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelBuilder")
            .field("model", &self.schema.model)
            .field("collection", &self.schema.collection)
            .field("fields", &self.fields)
            .finish()
    }
}

impl ModelBuilder {
    /// Attach per-field hooks
    pub fn field(mut self, name: impl Into<String>, hooks: FieldHooks) -> Self {
        self.fields.insert(name.into(), hooks);
        self
    }

    /// Attach lifecycle hooks
    pub fn hooks(mut self, hooks: impl ModelHooks + 'static) -> Self {
        self.hooks = Arc::new(hooks);
        self
    }

    /// # Errors
    /// Returns a schema error if field hooks name a field the schema does not declare
    pub fn build(self) -> Result<Model> {
        if let Some(name) = self.fields.keys().find(|name| !self.schema.fields.contains_key(*name)) {
            return Err(TesseraError::Schema(format!(
                "hooks given for '{}', which is not a field of model '{}'",
                name, self.schema.model
            )));
        }

        let collection = self.database.collection(&self.schema.collection);

        Ok(Model {
            schema: self.schema,
            registry: self.registry,
            database: self.database,
            collection,
            fields: self.fields,
            hooks: self.hooks,
        })
    }
}

/// One schema bound to a database
#[derive(Clone)]
pub struct Model {
    schema: Arc<Schema>,
    registry: Registry,
    database: Arc<dyn DatabaseHandle>,
    collection: Arc<dyn CollectionHandle>,
    fields: FieldHookMap,
    hooks: Arc<dyn ModelHooks>,
}

impl std::fmt::Debug for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Model")
            .field("model", &self.schema.model)
            .field("collection", &self.schema.collection)
            .field("fields", &self.fields)
            .finish()
    }
}

fn now() -> bson::DateTime {
    bson::DateTime::from_chrono(chrono::Utc::now())
}

/// True for filter values that are operator expressions rather than literals
fn is_operator_expression(value: &Bson) -> bool {
    match value {
        Bson::Document(expression) => expression.keys().any(|key| key.starts_with('$')),
        Bson::RegularExpression(_) => true,
        _ => false,
    }
}

/// True if `keys` sets `field` itself or a path below it
fn touches<'a>(mut keys: impl Iterator<Item = &'a String>, field: &str) -> bool {
    keys.any(|key| key == field || key.strip_prefix(field).is_some_and(|rest| rest.starts_with('.')))
}

/// Insert `value` at the dotted `path`, creating embedded documents on the way
fn insert_path(document: &mut BsonDocument, path: &str, value: Bson) {
    match path.split_once('.') {
        None => {
            document.insert(path, value);
        }
        Some((head, rest)) => {
            if !matches!(document.get(head), Some(Bson::Document(_))) {
                document.insert(head, BsonDocument::new());
            }
            if let Ok(nested) = document.get_document_mut(head) {
                insert_path(nested, rest, value);
            }
        }
    }
}

impl Model {
    /// Start building the model registered as `model`
    ///
    /// # Errors
    /// Returns a model-not-found error if the registry does not know `model`
    pub fn builder(registry: &Registry, model: &str, database: Arc<dyn DatabaseHandle>) -> Result<ModelBuilder> {
        Ok(ModelBuilder {
            schema: registry.get_schema(model)?,
            registry: registry.clone(),
            database,
            fields: FieldHookMap::new(),
            hooks: Arc::new(NoHooks),
        })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn collection_name(&self) -> &str {
        self.collection.name()
    }

    // =====================
    // Shared steps
    // =====================

    fn ensure_enabled(&self, disabled: bool, operation: &str) -> Result<()> {
        if disabled {
            return Err(TesseraError::OperationDisabled(format!(
                "{} is disabled for model '{}'",
                operation, self.schema.model
            )));
        }
        Ok(())
    }

    fn ensure_upsert_allowed(&self, options: UpdateOptions) -> Result<()> {
        self.ensure_enabled(options.upsert && !self.schema.flags.allow_upserts, "upsert")
    }

    fn soften<T>(&self, operation: &str, result: Result<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(error) => {
                warn!(model = %self.schema.model, operation, %error, "Operation failed");
                None
            }
        }
    }

    /// Sanitized filter for a mutating operation
    fn write_filter(&self, filter: MatchSpec) -> Result<BsonDocument> {
        match_filter(&self.schema, &filter)
    }

    /// Values for declared fields that `document` lacks
    fn defaults_for(&self, document: &BsonDocument) -> BsonDocument {
        let mut defaults = BsonDocument::new();
        for name in self.schema.fields.keys() {
            if matches!(document.get(name), Some(value) if !matches!(value, Bson::Null)) {
                continue;
            }
            if let Some(value) = self.fields.get(name).and_then(FieldHooks::fill) {
                defaults.insert(name.clone(), value);
            }
        }
        defaults
    }

    /// Format the declared top-level keys, leaving every other key as it is
    async fn format_declared(&self, document: BsonDocument) -> Result<BsonDocument> {
        let declared: BsonDocument = document
            .iter()
            .filter(|(key, _)| self.schema.fields.contains_key(key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        let mut formatted = format(&self.schema, &self.fields, &declared).await?;

        Ok(document
            .into_iter()
            .map(|(key, value)| {
                let value = formatted.remove(&key).unwrap_or(value);
                (key, value)
            })
            .collect())
    }

    /// Insert-style preparation shared by inserts and replacements
    async fn prepare_document(&self, mut document: BsonDocument) -> Result<BsonDocument> {
        for (key, value) in self.defaults_for(&document) {
            document.insert(key, value);
        }

        if self.schema.timestamps {
            let stamp = now();
            if !matches!(document.get(CREATED_AT), Some(Bson::DateTime(_))) {
                document.insert(CREATED_AT, stamp);
            }
            document.insert(UPDATED_AT, stamp);
        }

        let document = self.format_declared(document).await?;
        validate_document(&self.schema, &document, &self.fields, ValidationMode::Full)?;
        Ok(document)
    }

    async fn prepare_insert(&self, document: &BsonDocument) -> Result<BsonDocument> {
        let sanitized = sanitize(&self.schema, document, SanitizeOptions::default());
        let document = self.hooks.before_insert(sanitized).await?;
        self.prepare_document(document).await
    }

    /// Sanitize, hook, format, validate and stamp an update
    async fn prepare_update(
        &self,
        filter: BsonDocument,
        update: &BsonDocument,
        options: UpdateOptions,
    ) -> Result<(BsonDocument, BsonDocument)> {
        let sanitized = sanitize_update(&self.schema, update);
        let (filter, mut update) = self.hooks.before_update(filter, sanitized).await?;

        for operator in ["$set", "$setOnInsert"] {
            if let Ok(fragment) = update.get_document(operator) {
                let formatted = self.format_declared(fragment.clone()).await?;
                validate_document(&self.schema, &formatted, &self.fields, ValidationMode::Present)?;
                update.insert(operator, formatted);
            }
        }

        if let Ok(unset) = update.get_document("$unset") {
            for key in unset.keys() {
                if resolve(&self.schema.fields, key).is_some_and(|descriptor| descriptor.required) {
                    return Err(TesseraError::Validation(format!(
                        "cannot unset required field '{}' of model '{}'",
                        key, self.schema.model
                    )));
                }
            }
        }

        if update.is_empty() {
            return Err(TesseraError::Query(format!(
                "update for model '{}' has no declared fields",
                self.schema.model
            )));
        }

        if options.upsert {
            self.prepare_upsert(&filter, &mut update).await?;
        }

        if self.schema.timestamps {
            let stamp = now();
            set_in(&mut update, "$set", UPDATED_AT, stamp);
            if options.upsert {
                set_in(&mut update, "$setOnInsert", CREATED_AT, stamp);
            }
        }

        Ok((filter, update))
    }

    /// Default-fill `$setOnInsert` from the document an upsert would create
    ///
    /// The pre-image is the sanitized filter's literal values plus `$set` and
    /// `$setOnInsert`, with dotted keys folded into embedded documents; it must
    /// satisfy every required field.
    async fn prepare_upsert(&self, filter: &BsonDocument, update: &mut BsonDocument) -> Result<()> {
        let mut pre_image = BsonDocument::new();
        for (key, value) in sanitize(&self.schema, filter, SanitizeOptions::dot_notation()) {
            if !is_operator_expression(&value) {
                insert_path(&mut pre_image, &key, value);
            }
        }
        for operator in ["$set", "$setOnInsert"] {
            if let Ok(fragment) = update.get_document(operator) {
                for (key, value) in fragment {
                    insert_path(&mut pre_image, key, value.clone());
                }
            }
        }

        let set_keys: Vec<String> = update
            .get_document("$set")
            .map(|set| set.keys().cloned().collect())
            .unwrap_or_default();
        let defaults: BsonDocument = self
            .defaults_for(&pre_image)
            .into_iter()
            .filter(|(key, _)| !touches(set_keys.iter(), key))
            .collect();
        let defaults = self.format_declared(defaults).await?;

        for (key, value) in &defaults {
            pre_image.insert(key.clone(), value.clone());
        }
        validate_document(&self.schema, &pre_image, &self.fields, ValidationMode::Full)?;

        for (key, value) in defaults {
            set_in(update, "$setOnInsert", &key, value);
        }
        Ok(())
    }

    /// Delete every dependent document that references `id`
    ///
    /// Runs one `delete_many` per referencing field, in order. Earlier deletions
    /// stay committed if a later one fails.
    async fn cascade(&self, id: &Bson) -> Result<u64> {
        let mut total = 0u64;

        for model in &self.schema.cascade {
            let dependent = self.registry.get_schema(model).map_err(|_| {
                TesseraError::Cascade(format!(
                    "cascade model '{}' of '{}' is not registered",
                    model, self.schema.model
                ))
            })?;
            let collection = self.database.collection(&dependent.collection);

            for field in dependent.fields_referencing(&self.schema.model) {
                let mut filter = BsonDocument::new();
                filter.insert(field, id.clone());

                let deleted = collection.delete_many(filter).await?;
                debug!(target_model = %dependent.model, field, deleted, "Cascaded delete");
                total += deleted;
            }
        }

        Ok(total)
    }

    /// Lifecycle hook and cascade for one deleted document
    async fn finish_delete(&self, document: &BsonDocument) -> Result<()> {
        self.hooks.after_delete(document).await?;
        if let Some(id) = document.get(ID_FIELD) {
            if !self.schema.cascade.is_empty() {
                let cascaded = self.cascade(id).await?;
                debug!(cascaded, "Cascade complete");
            }
        }
        Ok(())
    }

    /// Pipeline for a read query
    ///
    /// Keys starting with `$` make the query an operator bag for
    /// [`build_pipeline`]; anything else is a plain filter.
    fn read_pipeline(&self, query: &BsonDocument) -> Result<Vec<Stage>> {
        if query.keys().any(|key| key.starts_with('$')) {
            let spec = PipelineSpec::from_document(query)?;
            build_pipeline(&self.registry, &self.schema, &spec, PipelineOptions::default())
        } else {
            Ok(vec![doc! { "$match": query.clone() }])
        }
    }

    // =====================
    // Reads
    // =====================

    #[instrument(skip(self, query), fields(model = %self.schema.model, collection = %self.schema.collection))]
    pub async fn find(&self, query: &BsonDocument) -> Result<Vec<BsonDocument>> {
        let pipeline = self.read_pipeline(query)?;
        let documents = self.collection.aggregate(pipeline).await?;
        debug!(found = documents.len(), "Find complete");
        Ok(documents)
    }

    #[instrument(skip(self, query), fields(model = %self.schema.model, collection = %self.schema.collection))]
    pub async fn find_one(&self, query: &BsonDocument) -> Result<Option<BsonDocument>> {
        let mut pipeline = self.read_pipeline(query)?;
        pipeline.push(doc! { "$limit": 1 });
        Ok(self.collection.aggregate(pipeline).await?.into_iter().next())
    }

    #[instrument(skip(self, id), fields(model = %self.schema.model, id = %id))]
    pub async fn find_by_id(&self, id: ObjectId) -> Result<Option<BsonDocument>> {
        let mut pipeline = match_stage(&self.schema, &MatchSpec::Id(id), "")?;
        pipeline.push(doc! { "$limit": 1 });
        Ok(self.collection.aggregate(pipeline).await?.into_iter().next())
    }

    #[instrument(skip(self, query), fields(model = %self.schema.model, collection = %self.schema.collection))]
    pub async fn count(&self, query: &BsonDocument) -> Result<u64> {
        let mut pipeline = self.read_pipeline(query)?;
        pipeline.push(doc! { "$count": "count" });

        let result = self.collection.aggregate(pipeline).await?;
        let count = match result.first().and_then(|document| document.get("count")) {
            Some(Bson::Int32(n)) => u64::try_from(*n).unwrap_or_default(),
            Some(Bson::Int64(n)) => u64::try_from(*n).unwrap_or_default(),
            _ => 0,
        };
        Ok(count)
    }

    // =====================
    // Inserts
    // =====================

    /// Insert one document and return it as stored, `_id` included
    #[instrument(skip(self, document), fields(model = %self.schema.model, collection = %self.schema.collection))]
    pub async fn insert_one_strict(&self, document: &BsonDocument) -> Result<BsonDocument> {
        self.ensure_enabled(self.schema.flags.no_inserts, "insert")?;
        info!("Inserting document");

        let mut document = self.prepare_insert(document).await?;
        let id = self.collection.insert_one(document.clone()).await?;
        if !document.contains_key(ID_FIELD) {
            document.insert(ID_FIELD, id);
        }

        self.hooks.after_insert(&document).await?;
        info!("Insert complete");
        Ok(document)
    }

    pub async fn insert_one(&self, document: &BsonDocument) -> Option<BsonDocument> {
        let result = self.insert_one_strict(document).await;
        self.soften("insert_one", result)
    }

    /// Insert documents in order, returning them as stored
    #[instrument(skip(self, documents), fields(model = %self.schema.model, collection = %self.schema.collection, count = documents.len()))]
    pub async fn insert_many_strict(&self, documents: &[BsonDocument]) -> Result<Vec<BsonDocument>> {
        self.ensure_enabled(self.schema.flags.no_inserts, "insert")?;
        self.ensure_enabled(self.schema.flags.no_insert_many, "insert many")?;
        info!("Inserting documents");

        let mut prepared = Vec::with_capacity(documents.len());
        for document in documents {
            prepared.push(self.prepare_insert(document).await?);
        }
        if prepared.is_empty() {
            return Ok(prepared);
        }

        let ids = self.collection.insert_many(prepared.clone()).await?;
        for (document, id) in prepared.iter_mut().zip(ids) {
            if !document.contains_key(ID_FIELD) {
                document.insert(ID_FIELD, id);
            }
        }

        for document in &prepared {
            self.hooks.after_insert(document).await?;
        }
        info!(inserted = prepared.len(), "Insert complete");
        Ok(prepared)
    }

    pub async fn insert_many(&self, documents: &[BsonDocument]) -> Vec<BsonDocument> {
        let result = self.insert_many_strict(documents).await;
        self.soften("insert_many", result).unwrap_or_default()
    }

    // =====================
    // Updates
    // =====================

    /// Update one document and return it as it is after the update
    #[instrument(skip(self, filter, update), fields(model = %self.schema.model, collection = %self.schema.collection, upsert = options.upsert))]
    pub async fn update_one_strict(
        &self,
        filter: impl Into<MatchSpec>,
        update: &BsonDocument,
        options: UpdateOptions,
    ) -> Result<Option<BsonDocument>> {
        self.ensure_enabled(self.schema.flags.no_updates, "update")?;
        self.ensure_upsert_allowed(options)?;
        info!("Updating document");

        let filter = self.write_filter(filter.into())?;
        let (filter, update) = self.prepare_update(filter, update, options).await?;
        let document = self.collection.find_one_and_update(filter, update, options.upsert).await?;

        self.hooks.after_update(document.as_ref()).await?;
        info!(found = document.is_some(), "Update complete");
        Ok(document)
    }

    pub async fn update_one(
        &self,
        filter: impl Into<MatchSpec>,
        update: &BsonDocument,
        options: UpdateOptions,
    ) -> Option<BsonDocument> {
        let result = self.update_one_strict(filter, update, options).await;
        self.soften("update_one", result).flatten()
    }

    #[instrument(skip(self, filter, update), fields(model = %self.schema.model, collection = %self.schema.collection, upsert = options.upsert))]
    pub async fn update_many_strict(
        &self,
        filter: impl Into<MatchSpec>,
        update: &BsonDocument,
        options: UpdateOptions,
    ) -> Result<UpdateOutcome> {
        self.ensure_enabled(self.schema.flags.no_updates, "update")?;
        self.ensure_enabled(self.schema.flags.no_update_many, "update many")?;
        self.ensure_upsert_allowed(options)?;
        info!("Updating documents");

        let filter = self.write_filter(filter.into())?;
        let (filter, update) = self.prepare_update(filter, update, options).await?;
        let outcome = self.collection.update_many(filter, update, options.upsert).await?;

        self.hooks.after_update(None).await?;
        info!(matched = outcome.matched, modified = outcome.modified, "Update complete");
        Ok(outcome)
    }

    /// Returns the number of modified documents, `0` on failure
    pub async fn update_many(&self, filter: impl Into<MatchSpec>, update: &BsonDocument, options: UpdateOptions) -> u64 {
        let result = self.update_many_strict(filter, update, options).await;
        self.soften("update_many", result).map(|outcome| outcome.modified).unwrap_or_default()
    }

    /// Replace one document and return the replacement as stored
    #[instrument(skip(self, filter, replacement), fields(model = %self.schema.model, collection = %self.schema.collection, upsert = options.upsert))]
    pub async fn replace_one_strict(
        &self,
        filter: impl Into<MatchSpec>,
        replacement: &BsonDocument,
        options: UpdateOptions,
    ) -> Result<Option<BsonDocument>> {
        self.ensure_enabled(self.schema.flags.no_updates, "replace")?;
        self.ensure_upsert_allowed(options)?;
        info!("Replacing document");

        let filter = self.write_filter(filter.into())?;
        let sanitized = sanitize(&self.schema, replacement, SanitizeOptions::default());
        let (filter, replacement) = self.hooks.before_replace(filter, sanitized).await?;
        let mut replacement = self.prepare_document(replacement).await?;
        replacement.remove(ID_FIELD);

        let document = self
            .collection
            .find_one_and_replace(filter, replacement, options.upsert)
            .await?;

        self.hooks.after_replace(document.as_ref()).await?;
        info!(found = document.is_some(), "Replace complete");
        Ok(document)
    }

    pub async fn replace_one(
        &self,
        filter: impl Into<MatchSpec>,
        replacement: &BsonDocument,
        options: UpdateOptions,
    ) -> Option<BsonDocument> {
        let result = self.replace_one_strict(filter, replacement, options).await;
        self.soften("replace_one", result).flatten()
    }

    // =====================
    // Deletes
    // =====================

    /// Delete one document, cascade, and return the deleted document
    #[instrument(skip(self, filter), fields(model = %self.schema.model, collection = %self.schema.collection))]
    pub async fn delete_one_strict(&self, filter: impl Into<MatchSpec>) -> Result<Option<BsonDocument>> {
        self.ensure_enabled(self.schema.flags.no_deletes, "delete")?;
        info!("Deleting document");

        let filter = self.write_filter(filter.into())?;
        let filter = self.hooks.before_delete(filter).await?;
        let document = self.collection.find_one_and_delete(filter).await?;

        if let Some(document) = &document {
            self.finish_delete(document).await?;
        }
        info!(deleted = document.is_some(), "Delete complete");
        Ok(document)
    }

    pub async fn delete_one(&self, filter: impl Into<MatchSpec>) -> Option<BsonDocument> {
        let result = self.delete_one_strict(filter).await;
        self.soften("delete_one", result).flatten()
    }

    /// Delete every matching document, cascading for each
    #[instrument(skip(self, filter), fields(model = %self.schema.model, collection = %self.schema.collection))]
    pub async fn delete_many_strict(&self, filter: impl Into<MatchSpec>) -> Result<u64> {
        self.ensure_enabled(self.schema.flags.no_deletes, "delete")?;
        self.ensure_enabled(self.schema.flags.no_delete_many, "delete many")?;
        info!("Deleting documents");

        let filter = self.write_filter(filter.into())?;
        let filter = self.hooks.before_delete(filter).await?;
        let documents = self.collection.aggregate(vec![doc! { "$match": filter }]).await?;
        let ids: Vec<Bson> = documents
            .iter()
            .filter_map(|document| document.get(ID_FIELD).cloned())
            .collect();
        if ids.is_empty() {
            info!(deleted = 0, "Delete complete");
            return Ok(0);
        }

        let deleted = self.collection.delete_many(doc! { "_id": { "$in": ids } }).await?;

        for document in &documents {
            self.finish_delete(document).await?;
        }
        info!(deleted, "Delete complete");
        Ok(deleted)
    }

    pub async fn delete_many(&self, filter: impl Into<MatchSpec>) -> u64 {
        let result = self.delete_many_strict(filter).await;
        self.soften("delete_many", result).unwrap_or_default()
    }

    // =====================
    // Indexes
    // =====================

    /// Create every index the schema declares, returning their names
    #[instrument(skip(self), fields(model = %self.schema.model, collection = %self.schema.collection))]
    pub async fn ensure_indexes(&self) -> Result<Vec<String>> {
        let mut names = Vec::with_capacity(self.schema.indexes.len());
        for index in &self.schema.indexes {
            names.push(self.collection.create_index(index).await?);
        }
        info!(indexes = names.len(), "Indexes ensured");
        Ok(names)
    }
}

/// Insert `key` into the operator fragment `operator`, creating it if needed
fn set_in(update: &mut BsonDocument, operator: &str, key: &str, value: impl Into<Bson>) {
    match update.get_document_mut(operator) {
        Ok(fragment) => {
            fragment.insert(key, value);
        }
        Err(_) => {
            let mut fragment = BsonDocument::new();
            fragment.insert(key, value);
            update.insert(operator, fragment);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_touches_matches_field_and_sub_paths() {
        let keys = vec!["name".to_string(), "address.city".to_string()];
        assert!(touches(keys.iter(), "name"));
        assert!(touches(keys.iter(), "address"));
        assert!(!touches(keys.iter(), "addr"));
        assert!(!touches(keys.iter(), "nickname"));
    }

    #[test]
    fn test_operator_expressions_are_not_literals() {
        assert!(is_operator_expression(&Bson::Document(doc! { "$in": [1, 2] })));
        assert!(!is_operator_expression(&Bson::Document(doc! { "city": "Oslo" })));
        assert!(!is_operator_expression(&Bson::String("x".into())));
    }

    #[test]
    fn test_insert_path_folds_dotted_keys() {
        let mut document = doc! { "address": { "zip": 1 }, "name": "x" };
        insert_path(&mut document, "address.city", Bson::String("Oslo".into()));
        insert_path(&mut document, "name.first", Bson::String("Ada".into()));
        insert_path(&mut document, "age", Bson::Int32(3));

        assert_eq!(
            document,
            doc! { "address": { "zip": 1, "city": "Oslo" }, "name": { "first": "Ada" }, "age": 3 }
        );
    }

    #[test]
    fn test_set_in_creates_and_extends_operators() {
        let mut update = doc! {};
        set_in(&mut update, "$set", "a", 1);
        set_in(&mut update, "$set", "b", 2);
        set_in(&mut update, "$setOnInsert", "c", 3);
        assert_eq!(update, doc! { "$set": { "a": 1, "b": 2 }, "$setOnInsert": { "c": 3 } });
    }
}
