//! Driver boundary
//!
//! [`Model`](crate::Model) talks to storage only through these traits. The
//! `mongodb` crate's `Collection<Document>` and `Database` implement them; tests
//! substitute an in-memory double.

use std::sync::Arc;

use async_trait::async_trait;
use bson::{Bson, Document as BsonDocument};
use futures::TryStreamExt;
use mongodb::options::{IndexOptions, ReturnDocument};
use mongodb::{Collection, Database, IndexModel};
use tessera_common::Result;

use crate::pipeline::Stage;
use crate::schema::IndexSpec;

/// Result of an update call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateOutcome {
    pub matched: u64,
    pub modified: u64,
    /// Identifier of the document created by an upsert
    pub upserted_id: Option<Bson>,
}

/// One collection, as seen by the model layer
#[async_trait]
pub trait CollectionHandle: Send + Sync {
    fn name(&self) -> &str;

    /// Run an aggregation pipeline and collect every result
    async fn aggregate(&self, pipeline: Vec<Stage>) -> Result<Vec<BsonDocument>>;

    /// Insert one document, returning its identifier
    async fn insert_one(&self, document: BsonDocument) -> Result<Bson>;

    /// Insert documents in order, returning identifiers in the same order
    async fn insert_many(&self, documents: Vec<BsonDocument>) -> Result<Vec<Bson>>;

    async fn update_one(&self, filter: BsonDocument, update: BsonDocument, upsert: bool) -> Result<UpdateOutcome>;

    async fn update_many(&self, filter: BsonDocument, update: BsonDocument, upsert: bool) -> Result<UpdateOutcome>;

    /// Update one document and return it as it is after the update
    async fn find_one_and_update(
        &self,
        filter: BsonDocument,
        update: BsonDocument,
        upsert: bool,
    ) -> Result<Option<BsonDocument>>;

    /// Delete at most one document, returning the deleted count
    async fn delete_one(&self, filter: BsonDocument) -> Result<u64>;

    async fn delete_many(&self, filter: BsonDocument) -> Result<u64>;

    /// Delete one document and return it
    async fn find_one_and_delete(&self, filter: BsonDocument) -> Result<Option<BsonDocument>>;

    /// Replace one document and return the replacement as stored
    async fn find_one_and_replace(
        &self,
        filter: BsonDocument,
        replacement: BsonDocument,
        upsert: bool,
    ) -> Result<Option<BsonDocument>>;

    /// Create an index, returning its name
    async fn create_index(&self, index: &IndexSpec) -> Result<String>;
}

/// Source of collection handles
pub trait DatabaseHandle: Send + Sync {
    fn collection(&self, name: &str) -> Arc<dyn CollectionHandle>;
}

#[async_trait]
impl CollectionHandle for Collection<BsonDocument> {
    fn name(&self) -> &str {
        Collection::name(self)
    }

    async fn aggregate(&self, pipeline: Vec<Stage>) -> Result<Vec<BsonDocument>> {
        let cursor = Collection::aggregate(self, pipeline).await?;
        let documents: Vec<BsonDocument> = cursor.try_collect().await?;
        Ok(documents)
    }

    async fn insert_one(&self, document: BsonDocument) -> Result<Bson> {
        let result = Collection::insert_one(self, document).await?;
        Ok(result.inserted_id)
    }

    async fn insert_many(&self, documents: Vec<BsonDocument>) -> Result<Vec<Bson>> {
        let result = Collection::insert_many(self, documents).await?;

        let mut ids: Vec<(usize, Bson)> = result.inserted_ids.into_iter().collect();
        ids.sort_by_key(|(index, _)| *index);
        Ok(ids.into_iter().map(|(_, id)| id).collect())
    }

    async fn update_one(&self, filter: BsonDocument, update: BsonDocument, upsert: bool) -> Result<UpdateOutcome> {
        let result = Collection::update_one(self, filter, update).upsert(upsert).await?;
        Ok(UpdateOutcome {
            matched: result.matched_count,
            modified: result.modified_count,
            upserted_id: result.upserted_id,
        })
    }

    async fn update_many(&self, filter: BsonDocument, update: BsonDocument, upsert: bool) -> Result<UpdateOutcome> {
        let result = Collection::update_many(self, filter, update).upsert(upsert).await?;
        Ok(UpdateOutcome {
            matched: result.matched_count,
            modified: result.modified_count,
            upserted_id: result.upserted_id,
        })
    }

    async fn find_one_and_update(
        &self,
        filter: BsonDocument,
        update: BsonDocument,
        upsert: bool,
    ) -> Result<Option<BsonDocument>> {
        let document = Collection::find_one_and_update(self, filter, update)
            .upsert(upsert)
            .return_document(ReturnDocument::After)
            .await?;
        Ok(document)
    }

    async fn delete_one(&self, filter: BsonDocument) -> Result<u64> {
        let result = Collection::delete_one(self, filter).await?;
        Ok(result.deleted_count)
    }

    async fn delete_many(&self, filter: BsonDocument) -> Result<u64> {
        let result = Collection::delete_many(self, filter).await?;
        Ok(result.deleted_count)
    }

    async fn find_one_and_delete(&self, filter: BsonDocument) -> Result<Option<BsonDocument>> {
        let document = Collection::find_one_and_delete(self, filter).await?;
        Ok(document)
    }

    async fn find_one_and_replace(
        &self,
        filter: BsonDocument,
        replacement: BsonDocument,
        upsert: bool,
    ) -> Result<Option<BsonDocument>> {
        let document = Collection::find_one_and_replace(self, filter, replacement)
            .upsert(upsert)
            .return_document(ReturnDocument::After)
            .await?;
        Ok(document)
    }

    async fn create_index(&self, index: &IndexSpec) -> Result<String> {
        let options = match &index.options {
            Some(options) => Some(bson::from_document::<IndexOptions>(options.clone())?),
            None => None,
        };
        let model = IndexModel::builder().keys(index.keys.clone()).options(options).build();

        let result = Collection::create_index(self, model).await?;
        Ok(result.index_name)
    }
}

impl DatabaseHandle for Database {
    fn collection(&self, name: &str) -> Arc<dyn CollectionHandle> {
        Arc::new(Database::collection::<BsonDocument>(self, name))
    }
}
