//! Pipeline factory

use bson::{Bson, Document as BsonDocument};
use tessera_common::{Result, TesseraError};
use tracing::debug;

use super::stages::{group_stage, lookup_stages, match_stage, sort_stage, GroupSpec, LookupOptions, MatchSpec};
use super::Stage;
use crate::registry::Registry;
use crate::schema::Schema;

/// Which stages to synthesize
///
/// Every part is optional. `filter` runs before lookups; `prune` is a second
/// filter that runs after them and may reference joined paths.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineSpec {
    pub filter: Option<MatchSpec>,
    pub lookup: Option<BsonDocument>,
    pub prune: Option<MatchSpec>,
    pub group: Option<GroupSpec>,
    pub sort: Option<BsonDocument>,
}

impl PipelineSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, spec: impl Into<MatchSpec>) -> Self {
        self.filter = Some(spec.into());
        self
    }

    pub fn lookup(mut self, spec: BsonDocument) -> Self {
        self.lookup = Some(spec);
        self
    }

    pub fn prune(mut self, spec: impl Into<MatchSpec>) -> Self {
        self.prune = Some(spec.into());
        self
    }

    pub fn group(mut self, spec: impl Into<GroupSpec>) -> Self {
        self.group = Some(spec.into());
        self
    }

    pub fn sort(mut self, spec: BsonDocument) -> Self {
        self.sort = Some(spec);
        self
    }

    /// Read a spec written as a document with `$match`, `$lookup`, `$prune`,
    /// `$group` and `$sort` keys
    ///
    /// # Errors
    /// Returns a query error for an unknown key or a value of the wrong shape
    pub fn from_document(spec: &BsonDocument) -> Result<Self> {
        let mut parsed = Self::default();

        for (key, value) in spec {
            match key.as_str() {
                "$match" => parsed.filter = Some(MatchSpec::try_from(value)?),
                "$prune" => parsed.prune = Some(MatchSpec::try_from(value)?),
                "$lookup" => parsed.lookup = Some(expect_document(key, value)?),
                "$sort" => parsed.sort = Some(expect_document(key, value)?),
                "$group" => {
                    parsed.group = Some(match value {
                        Bson::String(field) => GroupSpec::Field(field.clone()),
                        Bson::Document(expression) => GroupSpec::Expression(expression.clone()),
                        other => {
                            return Err(TesseraError::Query(format!(
                                "$group must be a field name or a document, got {}",
                                other
                            )))
                        }
                    })
                }
                other => {
                    return Err(TesseraError::Query(format!("unknown pipeline spec key '{}'", other)));
                }
            }
        }

        Ok(parsed)
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

fn expect_document(key: &str, value: &Bson) -> Result<BsonDocument> {
    match value {
        Bson::Document(doc) => Ok(doc.clone()),
        other => Err(TesseraError::Query(format!("{} must be a document, got {}", key, other))),
    }
}

/// Prefix and existing stages for [`build_pipeline`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineOptions {
    /// Prefix for `$match` keys and lookup paths
    pub prefix: String,
    /// Stages already present, kept between the synthesized prefix and suffix
    pub pipeline: Vec<Stage>,
}

impl PipelineOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn pipeline(mut self, pipeline: Vec<Stage>) -> Self {
        self.pipeline = pipeline;
        self
    }
}

/// Compose a pipeline from a spec
///
/// Output order is fixed: `$match`, lookup pairs, the existing pipeline,
/// then the prune `$match`, `$group` and `$sort`.
///
/// # Errors
/// Propagates errors from the stage factories
pub fn build_pipeline(
    registry: &Registry,
    schema: &Schema,
    spec: &PipelineSpec,
    options: PipelineOptions,
) -> Result<Vec<Stage>> {
    let PipelineOptions { prefix, pipeline: existing } = options;
    let mut pipeline = Vec::with_capacity(existing.len() + 4);

    if let Some(filter) = &spec.filter {
        pipeline.extend(match_stage(schema, filter, &prefix)?);
    }

    if let Some(lookup) = &spec.lookup {
        pipeline.extend(lookup_stages(registry, schema, lookup, &LookupOptions::with_prefix(prefix.as_str()))?);
    }

    pipeline.extend(existing);

    if let Some(prune) = &spec.prune {
        pipeline.extend(match_stage(schema, prune, "")?);
    }

    if let Some(group) = &spec.group {
        pipeline.extend(group_stage(schema, group));
    }

    if let Some(sort) = &spec.sort {
        pipeline.extend(sort_stage(schema, sort));
    }

    debug!(model = %schema.model, stages = pipeline.len(), "Built aggregation pipeline");

    Ok(pipeline)
}
