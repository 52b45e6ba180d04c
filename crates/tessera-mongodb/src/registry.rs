//! Immutable model registry
//!
//! The registry maps model names to their schemas. It is populated once, when
//! the application is configured, and handed explicitly to everything that
//! needs to follow a `ref` to another model.

use std::collections::HashMap;
use std::sync::Arc;

use tessera_common::{Result, TesseraError};
use tracing::debug;

use crate::schema::Schema;

/// Read-only handle to every registered schema
///
/// Cloning is cheap; clones share the same underlying map.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    schemas: Arc<HashMap<String, Arc<Schema>>>,
}

impl Registry {
    /// Register all schemas at once
    ///
    /// # Errors
    /// Returns a schema error if two schemas declare the same model name
    pub fn new(schemas: impl IntoIterator<Item = Schema>) -> Result<Self> {
        let mut map = HashMap::new();
        for schema in schemas {
            let name = schema.model.clone();
            if map.insert(name.clone(), Arc::new(schema)).is_some() {
                return Err(TesseraError::Schema(format!(
                    "model '{}' is registered more than once",
                    name
                )));
            }
        }
        debug!(models = map.len(), "Schema registry initialized");
        Ok(Self {
            schemas: Arc::new(map),
        })
    }

    /// Look up a schema by model name
    pub fn get_schema(&self, model: &str) -> Result<Arc<Schema>> {
        self.schemas
            .get(model)
            .cloned()
            .ok_or_else(|| TesseraError::ModelNotFound(model.to_string()))
    }

    pub fn contains(&self, model: &str) -> bool {
        self.schemas.contains_key(model)
    }

    /// Registered model names, sorted
    pub fn models(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.schemas.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}
