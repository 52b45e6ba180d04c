//! Aggregation pipeline synthesis
//!
//! Stage factories are pure functions from a schema and a stage-specific spec
//! to an ordered list of stage documents. [`build_pipeline`] composes them
//! around an existing pipeline fragment.
//!
//! # Examples
//!
//! ```ignore
//! use bson::doc;
//! use tessera_mongodb::pipeline::{build_pipeline, PipelineOptions, PipelineSpec};
//!
//! let spec = PipelineSpec::new()
//!     .filter("507f1f77bcf86cd799439011")
//!     .lookup(doc! { "author": true })
//!     .sort(doc! { "createdAt": -1 });
//!
//! let stages = build_pipeline(&registry, &posts, &spec, PipelineOptions::default())?;
//! // [$match, $lookup, $unwind, $sort]
//! ```
//!
//! Prefixes are prepended verbatim when they end with `.`, and dot-joined
//! otherwise, so `"foo."` and `"foo"` both turn `aBar` into `foo.aBar`.

mod factory;
mod stages;


pub use factory::{build_pipeline, PipelineOptions, PipelineSpec};
pub use stages::{
    group_stage, lookup_stages, match_stage, project_body, project_stage, sort_stage, GroupSpec,
    LookupOptions, MatchSpec, ProjectOptions,
};
pub(crate) use stages::match_filter;

/// One aggregation stage: a single-key document such as `{ "$match": {..} }`
pub type Stage = bson::Document;

/// Join a path prefix and a key
pub(crate) fn prefixed(prefix: &str, key: &str) -> String {
    if prefix.is_empty() || prefix.ends_with('.') {
        format!("{}{}", prefix, key)
    } else {
        format!("{}.{}", prefix, key)
    }
}
