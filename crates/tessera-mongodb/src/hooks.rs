//! Per-field providers and model lifecycle hooks
//!
//! Field hooks carry the behavior a schema cannot express as data: random
//! value generators, default providers, formatters and validation strategies.
//! Lifecycle hooks run around every CRUD operation of a [`Model`](crate::Model).

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bson::{Bson, Document as BsonDocument};
use futures::future::BoxFuture;
use futures::FutureExt;
use tessera_common::Result;

use crate::validate::Strategy;

/// Produces a fresh value for an absent field
pub type Generator = Arc<dyn Fn() -> Bson + Send + Sync>;

/// Asynchronous value transform applied before persistence
pub type FormatFn = Arc<dyn Fn(Bson) -> BoxFuture<'static, Result<Bson>> + Send + Sync>;

/// Per-field hooks keyed by field name
pub type FieldHookMap = HashMap<String, FieldHooks>;

/// Default for an absent field
#[derive(Clone)]
pub enum DefaultValue {
    Value(Bson),
    Thunk(Generator),
}

impl DefaultValue {
    pub fn produce(&self) -> Bson {
        match self {
            DefaultValue::Value(value) => value.clone(),
            DefaultValue::Thunk(thunk) => thunk(),
        }
    }
}

/// Optional behavior attached to one field
#[derive(Clone, Default)]
pub struct FieldHooks {
    pub random: Option<Generator>,
    pub default: Option<DefaultValue>,
    pub format: Option<FormatFn>,
    pub strategy: Option<Strategy>,
}

impl FieldHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate a random value when the field is absent
    pub fn random(mut self, generator: impl Fn() -> Bson + Send + Sync + 'static) -> Self {
        self.random = Some(Arc::new(generator));
        self
    }

    /// Fixed default value
    pub fn default_value(mut self, value: impl Into<Bson>) -> Self {
        self.default = Some(DefaultValue::Value(value.into()));
        self
    }

    /// Default computed on every insert
    pub fn default_with(mut self, thunk: impl Fn() -> Bson + Send + Sync + 'static) -> Self {
        self.default = Some(DefaultValue::Thunk(Arc::new(thunk)));
        self
    }

    /// Synchronous formatter
    pub fn format(mut self, f: impl Fn(Bson) -> Bson + Send + Sync + 'static) -> Self {
        let f = Arc::new(f);
        let formatter: FormatFn = Arc::new(move |value: Bson| -> BoxFuture<'static, Result<Bson>> {
            let f = Arc::clone(&f);
            async move { Ok(f(value)) }.boxed()
        });
        self.format = Some(formatter);
        self
    }

    /// Asynchronous, fallible formatter
    pub fn format_async<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Bson) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<Bson>> + Send + 'static,
    {
        let formatter: FormatFn =
            Arc::new(move |value: Bson| -> BoxFuture<'static, Result<Bson>> { f(value).boxed() });
        self.format = Some(formatter);
        self
    }

    pub fn strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    /// Value for an absent field: the random generator wins over the default
    pub fn fill(&self) -> Option<Bson> {
        if let Some(generator) = &self.random {
            return Some(generator());
        }
        self.default.as_ref().map(DefaultValue::produce)
    }
}

impl fmt::Debug for FieldHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldHooks")
            .field("random", &self.random.is_some())
            .field("default", &self.default.is_some())
            .field("format", &self.format.is_some())
            .field("strategy", &self.strategy)
            .finish()
    }
}

/// Lifecycle hooks around model operations
///
/// Every method has a pass-through default. `before_*` hooks may rewrite what
/// is about to be sent; an error from any hook aborts the operation.
#[async_trait]
pub trait ModelHooks: Send + Sync {
    async fn before_insert(&self, document: BsonDocument) -> Result<BsonDocument> {
        Ok(document)
    }

    async fn after_insert(&self, _document: &BsonDocument) -> Result<()> {
        Ok(())
    }

    async fn before_update(
        &self,
        filter: BsonDocument,
        update: BsonDocument,
    ) -> Result<(BsonDocument, BsonDocument)> {
        Ok((filter, update))
    }

    /// Receives the updated document when one was returned
    async fn after_update(&self, _document: Option<&BsonDocument>) -> Result<()> {
        Ok(())
    }

    async fn before_replace(
        &self,
        filter: BsonDocument,
        replacement: BsonDocument,
    ) -> Result<(BsonDocument, BsonDocument)> {
        Ok((filter, replacement))
    }

    async fn after_replace(&self, _document: Option<&BsonDocument>) -> Result<()> {
        Ok(())
    }

    async fn before_delete(&self, filter: BsonDocument) -> Result<BsonDocument> {
        Ok(filter)
    }

    /// Runs once per deleted document
    async fn after_delete(&self, _document: &BsonDocument) -> Result<()> {
        Ok(())
    }
}

/// Hooks that do nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHooks;

impl ModelHooks for NoHooks {}
