//! Deletes and cascade behavior against the in-memory double

mod common;

use std::sync::Arc;

use bson::{doc, oid::ObjectId, Document};
use common::{registry, MemoryDatabase};
use tessera_mongodb::{FieldDescriptor, Model, ModelHooks, Registry, Result, Schema, TesseraError};

fn teams(database: &Arc<MemoryDatabase>) -> Model {
    Model::builder(&registry(), "Team", database.clone()).unwrap().build().unwrap()
}

/// Two teams, three users: two on `core`, one on `web`, one without a team
fn seed(database: &Arc<MemoryDatabase>) -> (ObjectId, ObjectId) {
    let core = ObjectId::new();
    let web = ObjectId::new();
    database
        .get("teams")
        .seed([doc! { "_id": core, "name": "core" }, doc! { "_id": web, "name": "web" }]);
    database.get("users").seed([
        doc! { "_id": ObjectId::new(), "name": "Ada", "team": core },
        doc! { "_id": ObjectId::new(), "name": "Bob", "team": core },
        doc! { "_id": ObjectId::new(), "name": "Cy", "team": web },
        doc! { "_id": ObjectId::new(), "name": "Dee" },
    ]);
    (core, web)
}

fn user_names(database: &Arc<MemoryDatabase>) -> Vec<String> {
    database
        .get("users")
        .documents()
        .iter()
        .map(|d| d.get_str("name").unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn test_delete_one_cascades_to_referencing_documents() {
    let database = MemoryDatabase::new();
    let (core, _) = seed(&database);

    let deleted = teams(&database).delete_one_strict(&doc! { "_id": core }).await.unwrap().unwrap();

    assert_eq!(deleted.get_str("name").unwrap(), "core");
    assert_eq!(user_names(&database), vec!["Cy", "Dee"]);
    assert_eq!(database.get("users").calls(), vec!["delete_many"]);
}

#[tokio::test]
async fn test_delete_one_without_match_does_not_cascade() {
    let database = MemoryDatabase::new();
    seed(&database);

    let deleted = teams(&database).delete_one_strict(&doc! { "_id": ObjectId::new() }).await.unwrap();

    assert!(deleted.is_none());
    assert_eq!(user_names(&database).len(), 4);
    assert!(database.get("users").calls().is_empty());
}

#[tokio::test]
async fn test_delete_filters_accept_identifiers_and_drop_undeclared_keys() {
    let database = MemoryDatabase::new();
    let (core, web) = seed(&database);
    let model = teams(&database);

    let deleted = model.delete_one_strict(core).await.unwrap().unwrap();
    assert_eq!(deleted.get_object_id("_id").unwrap(), core);
    assert_eq!(user_names(&database), vec!["Cy", "Dee"]);

    let deleted = model.delete_one_strict(web.to_hex().as_str()).await.unwrap();
    assert!(deleted.is_some());
    assert_eq!(user_names(&database), vec!["Dee"]);

    let err = model.delete_one_strict("zz").await.unwrap_err();
    assert!(err.is_validation_error());

    database.get("teams").seed([doc! { "_id": ObjectId::new(), "name": "ops" }]);
    let deleted = model.delete_many_strict(&doc! { "name": "ops", "bogus": 1 }).await.unwrap();
    assert_eq!(deleted, 1);
    assert!(database.get("teams").documents().is_empty());
}

#[tokio::test]
async fn test_delete_many_cascades_for_each_deleted_document() {
    let database = MemoryDatabase::new();
    seed(&database);

    let deleted = teams(&database).delete_many_strict(&doc! {}).await.unwrap();

    assert_eq!(deleted, 2);
    assert!(database.get("teams").documents().is_empty());
    assert_eq!(user_names(&database), vec!["Dee"]);
    assert_eq!(database.get("users").calls(), vec!["delete_many", "delete_many"]);
}

#[tokio::test]
async fn test_delete_many_with_no_match_issues_no_delete() {
    let database = MemoryDatabase::new();
    seed(&database);

    let deleted = teams(&database).delete_many_strict(&doc! { "name": "ops" }).await.unwrap();

    assert_eq!(deleted, 0);
    assert_eq!(database.get("teams").calls(), vec!["aggregate"]);
}

#[tokio::test]
async fn test_cascade_does_not_recurse() {
    // Org -> Team -> User: deleting an org removes its teams but leaves users
    let org = Schema::builder("Org", "orgs")
        .field("name", FieldDescriptor::string())
        .cascade("Team")
        .build()
        .unwrap();
    let team = Schema::builder("Team", "teams")
        .field("name", FieldDescriptor::string())
        .field("org", FieldDescriptor::object_id().references("Org"))
        .cascade("User")
        .build()
        .unwrap();
    let user = Schema::builder("User", "users")
        .field("team", FieldDescriptor::object_id().references("Team"))
        .build()
        .unwrap();
    let registry = Registry::new([org, team, user]).unwrap();

    let database = MemoryDatabase::new();
    let org_id = ObjectId::new();
    let team_id = ObjectId::new();
    database.get("orgs").seed([doc! { "_id": org_id }]);
    database.get("teams").seed([doc! { "_id": team_id, "org": org_id }]);
    database.get("users").seed([doc! { "_id": ObjectId::new(), "team": team_id }]);

    let orgs = Model::builder(&registry, "Org", database.clone()).unwrap().build().unwrap();
    orgs.delete_one_strict(&doc! { "_id": org_id }).await.unwrap();

    assert!(database.get("teams").documents().is_empty());
    assert_eq!(database.get("users").documents().len(), 1);
}

#[tokio::test]
async fn test_unregistered_cascade_model_is_a_cascade_error() {
    let lonely = Schema::builder("Lonely", "lonely")
        .field("name", FieldDescriptor::string())
        .cascade("Ghost")
        .build()
        .unwrap();
    let registry = Registry::new([lonely]).unwrap();

    let database = MemoryDatabase::new();
    let id = ObjectId::new();
    database.get("lonely").seed([doc! { "_id": id, "name": "x" }]);

    let model = Model::builder(&registry, "Lonely", database.clone()).unwrap().build().unwrap();
    let err = model.delete_one_strict(&doc! { "_id": id }).await.unwrap_err();

    assert!(matches!(err, TesseraError::Cascade(_)));
    // the primary deletion stays committed
    assert!(database.get("lonely").documents().is_empty());

    database.get("lonely").seed([doc! { "_id": id, "name": "x" }]);
    assert!(model.delete_one(&doc! { "_id": id }).await.is_none());
}

#[derive(Default)]
struct Recording {
    deleted: parking_lot::Mutex<Vec<String>>,
}

#[async_trait::async_trait]
impl ModelHooks for Recording {
    async fn before_delete(&self, mut filter: Document) -> Result<Document> {
        filter.insert("name", "web");
        Ok(filter)
    }

    async fn after_delete(&self, document: &Document) -> Result<()> {
        self.deleted.lock().push(document.get_str("name").unwrap_or_default().to_string());
        Ok(())
    }
}

#[tokio::test]
async fn test_delete_hooks_rewrite_filter_and_see_each_document() {
    let database = MemoryDatabase::new();
    seed(&database);

    let hooks = Arc::new(Recording::default());
    let model = Model::builder(&registry(), "Team", database.clone())
        .unwrap()
        .hooks(SharedHooks(hooks.clone()))
        .build()
        .unwrap();

    let deleted = model.delete_many_strict(&doc! {}).await.unwrap();

    assert_eq!(deleted, 1);
    assert_eq!(*hooks.deleted.lock(), vec!["web".to_string()]);
    assert_eq!(user_names(&database), vec!["Ada", "Bob", "Dee"]);
}

/// Lets a test keep a handle on hooks it hands to a model
struct SharedHooks(Arc<Recording>);

#[async_trait::async_trait]
impl ModelHooks for SharedHooks {
    async fn before_delete(&self, filter: Document) -> Result<Document> {
        self.0.before_delete(filter).await
    }

    async fn after_delete(&self, document: &Document) -> Result<()> {
        self.0.after_delete(document).await
    }
}
