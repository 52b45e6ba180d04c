//! In-memory database double for model tests
//!
//! Supports just enough of MongoDB for the model layer: equality and `$in`
//! filters, `$set`/`$unset`/`$setOnInsert`, and `$match`/`$limit`/`$count`
//! pipelines. Other stages are recorded and passed through.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bson::{oid::ObjectId, Bson, Document};
use parking_lot::Mutex;
use tessera_mongodb::{
    CollectionHandle, DatabaseHandle, FieldDescriptor, FieldType, IndexSpec, OperationFlags, Registry,
    Result, Schema, Stage, UpdateOutcome,
};

#[derive(Default)]
pub struct MemoryDatabase {
    collections: Mutex<HashMap<String, Arc<MemoryCollection>>>,
}

impl MemoryDatabase {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn get(&self, name: &str) -> Arc<MemoryCollection> {
        self.collections
            .lock()
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(MemoryCollection::new(name)))
            .clone()
    }
}

impl DatabaseHandle for MemoryDatabase {
    fn collection(&self, name: &str) -> Arc<dyn CollectionHandle> {
        self.get(name)
    }
}

pub struct MemoryCollection {
    name: String,
    documents: Mutex<Vec<Document>>,
    pipelines: Mutex<Vec<Vec<Stage>>>,
    calls: Mutex<Vec<String>>,
    updates: Mutex<Vec<Document>>,
}

impl MemoryCollection {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            documents: Mutex::new(Vec::new()),
            pipelines: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
            updates: Mutex::new(Vec::new()),
        }
    }

    pub fn documents(&self) -> Vec<Document> {
        self.documents.lock().clone()
    }

    pub fn seed(&self, documents: impl IntoIterator<Item = Document>) {
        self.documents.lock().extend(documents);
    }

    /// Every pipeline passed to `aggregate`, oldest first
    pub fn pipelines(&self) -> Vec<Vec<Stage>> {
        self.pipelines.lock().clone()
    }

    /// Names of the driver methods called, oldest first
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    /// Every update descriptor received, oldest first
    pub fn updates(&self) -> Vec<Document> {
        self.updates.lock().clone()
    }

    fn record(&self, call: &str) {
        self.calls.lock().push(call.to_string());
    }
}

fn matches(document: &Document, filter: &Document) -> bool {
    filter.iter().all(|(key, expected)| {
        let actual = document.get(key);
        match expected {
            Bson::Document(expression) if expression.contains_key("$in") => match expression.get("$in") {
                Some(Bson::Array(options)) => actual.is_some_and(|value| options.contains(value)),
                _ => false,
            },
            _ => actual == Some(expected),
        }
    })
}

fn apply_update(document: &mut Document, update: &Document, inserting: bool) {
    if let Ok(set) = update.get_document("$set") {
        for (key, value) in set {
            document.insert(key.clone(), value.clone());
        }
    }
    if let Ok(unset) = update.get_document("$unset") {
        for key in unset.keys() {
            document.remove(key);
        }
    }
    if inserting {
        if let Ok(on_insert) = update.get_document("$setOnInsert") {
            for (key, value) in on_insert {
                document.insert(key.clone(), value.clone());
            }
        }
    }
}

/// Document an upsert creates: literal filter values plus the update
fn upserted(filter: &Document, update: &Document) -> Document {
    let mut document = Document::new();
    document.insert("_id", ObjectId::new());
    for (key, value) in filter {
        if !matches!(value, Bson::Document(_)) {
            document.insert(key.clone(), value.clone());
        }
    }
    apply_update(&mut document, update, true);
    document
}

#[async_trait]
impl CollectionHandle for MemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn aggregate(&self, pipeline: Vec<Stage>) -> Result<Vec<Document>> {
        self.record("aggregate");
        self.pipelines.lock().push(pipeline.clone());

        let mut results = self.documents.lock().clone();
        for stage in &pipeline {
            if let Ok(filter) = stage.get_document("$match") {
                results.retain(|document| matches(document, filter));
            } else if let Some(limit) = stage.get("$limit").and_then(Bson::as_i32) {
                results.truncate(usize::try_from(limit).unwrap_or_default());
            } else if let Ok(field) = stage.get_str("$count") {
                let count = i32::try_from(results.len()).unwrap_or(i32::MAX);
                let mut counted = Document::new();
                counted.insert(field, count);
                results = if count == 0 { Vec::new() } else { vec![counted] };
            }
        }
        Ok(results)
    }

    async fn insert_one(&self, mut document: Document) -> Result<Bson> {
        self.record("insert_one");
        let id = document.get("_id").cloned().unwrap_or_else(|| Bson::ObjectId(ObjectId::new()));
        document.insert("_id", id.clone());
        self.documents.lock().push(document);
        Ok(id)
    }

    async fn insert_many(&self, documents: Vec<Document>) -> Result<Vec<Bson>> {
        self.record("insert_many");
        let mut ids = Vec::new();
        let mut stored = self.documents.lock();
        for mut document in documents {
            let id = document.get("_id").cloned().unwrap_or_else(|| Bson::ObjectId(ObjectId::new()));
            document.insert("_id", id.clone());
            stored.push(document);
            ids.push(id);
        }
        Ok(ids)
    }

    async fn update_one(&self, filter: Document, update: Document, upsert: bool) -> Result<UpdateOutcome> {
        self.record("update_one");
        self.updates.lock().push(update.clone());
        let mut stored = self.documents.lock();
        if let Some(document) = stored.iter_mut().find(|document| matches(document, &filter)) {
            apply_update(document, &update, false);
            return Ok(UpdateOutcome { matched: 1, modified: 1, upserted_id: None });
        }
        if upsert {
            let document = upserted(&filter, &update);
            let id = document.get("_id").cloned();
            stored.push(document);
            return Ok(UpdateOutcome { matched: 0, modified: 0, upserted_id: id });
        }
        Ok(UpdateOutcome::default())
    }

    async fn update_many(&self, filter: Document, update: Document, upsert: bool) -> Result<UpdateOutcome> {
        self.record("update_many");
        self.updates.lock().push(update.clone());
        let mut stored = self.documents.lock();
        let mut matched = 0;
        for document in stored.iter_mut().filter(|document| matches(document, &filter)) {
            apply_update(document, &update, false);
            matched += 1;
        }
        if matched == 0 && upsert {
            let document = upserted(&filter, &update);
            let id = document.get("_id").cloned();
            stored.push(document);
            return Ok(UpdateOutcome { matched: 0, modified: 0, upserted_id: id });
        }
        Ok(UpdateOutcome { matched, modified: matched, upserted_id: None })
    }

    async fn find_one_and_update(&self, filter: Document, update: Document, upsert: bool) -> Result<Option<Document>> {
        self.record("find_one_and_update");
        self.updates.lock().push(update.clone());
        let mut stored = self.documents.lock();
        if let Some(document) = stored.iter_mut().find(|document| matches(document, &filter)) {
            apply_update(document, &update, false);
            return Ok(Some(document.clone()));
        }
        if upsert {
            let document = upserted(&filter, &update);
            stored.push(document.clone());
            return Ok(Some(document));
        }
        Ok(None)
    }

    async fn delete_one(&self, filter: Document) -> Result<u64> {
        self.record("delete_one");
        let mut stored = self.documents.lock();
        match stored.iter().position(|document| matches(document, &filter)) {
            Some(index) => {
                stored.remove(index);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn delete_many(&self, filter: Document) -> Result<u64> {
        self.record("delete_many");
        let mut stored = self.documents.lock();
        let before = stored.len();
        stored.retain(|document| !matches(document, &filter));
        Ok((before - stored.len()) as u64)
    }

    async fn find_one_and_delete(&self, filter: Document) -> Result<Option<Document>> {
        self.record("find_one_and_delete");
        let mut stored = self.documents.lock();
        Ok(stored
            .iter()
            .position(|document| matches(document, &filter))
            .map(|index| stored.remove(index)))
    }

    async fn find_one_and_replace(
        &self,
        filter: Document,
        mut replacement: Document,
        upsert: bool,
    ) -> Result<Option<Document>> {
        self.record("find_one_and_replace");
        let mut stored = self.documents.lock();
        if let Some(document) = stored.iter_mut().find(|document| matches(document, &filter)) {
            if let Some(id) = document.get("_id").cloned() {
                replacement.insert("_id", id);
            }
            *document = replacement.clone();
            return Ok(Some(replacement));
        }
        if upsert {
            replacement.insert("_id", ObjectId::new());
            stored.push(replacement.clone());
            return Ok(Some(replacement));
        }
        Ok(None)
    }

    async fn create_index(&self, index: &IndexSpec) -> Result<String> {
        self.record("create_index");
        let name = index
            .keys
            .iter()
            .map(|(key, direction)| format!("{}_{}", key, direction))
            .collect::<Vec<_>>()
            .join("_");
        Ok(name)
    }
}

// =====================
// Fixtures
// =====================

/// `Team` cascades to `User`; `User` references `Team` and allows upserts;
/// `Audit` forbids most writes
pub fn registry() -> Registry {
    let team = Schema::builder("Team", "teams")
        .field("name", FieldDescriptor::string().required())
        .cascade("User")
        .build()
        .unwrap();

    let user = Schema::builder("User", "users")
        .timestamps(true)
        .field("name", FieldDescriptor::string().required())
        .field("email", FieldDescriptor::string())
        .field("password", FieldDescriptor::string().encrypted())
        .field("age", FieldDescriptor::number())
        .field("role", FieldDescriptor::string())
        .field("team", FieldDescriptor::object_id().references("Team"))
        .field("tags", FieldDescriptor::array_of(FieldType::Primitive(tessera_mongodb::FieldKind::String)))
        .index(IndexSpec::new(bson::doc! { "email": 1 }))
        .index(IndexSpec::new(bson::doc! { "team": 1, "name": -1 }))
        .flags(OperationFlags {
            allow_upserts: true,
            ..OperationFlags::default()
        })
        .build()
        .unwrap();

    let audit = Schema::builder("Audit", "audits")
        .field("message", FieldDescriptor::string().required())
        .flags(OperationFlags {
            no_insert_many: true,
            no_updates: true,
            no_deletes: true,
            ..OperationFlags::default()
        })
        .build()
        .unwrap();

    Registry::new([team, user, audit]).unwrap()
}
