//! Error types for tessera

use thiserror::Error;

/// Result type alias for tessera operations
pub type Result<T> = std::result::Result<T, TesseraError>;

/// Unified error type for all tessera operations
#[derive(Error, Debug, Clone)]
pub enum TesseraError {
    #[error("MongoDB error: {0}")]
    MongoDB(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query error: {0}")]
    Query(String),

    /// Data did not satisfy a field descriptor or strategy
    #[error("Validation error: {0}")]
    Validation(String),

    // Schema-definition errors: the declaration itself is wrong

    /// Malformed schema or field declaration
    #[error("Schema error: {0}")]
    Schema(String),

    /// A model name was not found in the registry
    #[error("Model not found: {0}")]
    ModelNotFound(String),

    /// A field was asked to populate but declares no `ref`
    #[error("Missing reference: {0}")]
    MissingReference(String),

    /// The schema flags forbid this operation
    #[error("Operation disabled: {0}")]
    OperationDisabled(String),

    /// Cascade delete could not resolve a dependent model
    #[error("Cascade error: {0}")]
    Cascade(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl TesseraError {
    /// Returns true if the error points at a broken schema declaration
    pub fn is_schema_error(&self) -> bool {
        matches!(
            self,
            TesseraError::Schema(_)
                | TesseraError::ModelNotFound(_)
                | TesseraError::MissingReference(_)
        )
    }

    /// Returns true if the error was raised while checking document data
    pub fn is_validation_error(&self) -> bool {
        matches!(self, TesseraError::Validation(_))
    }

    /// Returns true if the error was raised before any I/O because of schema flags
    pub fn is_operation_disabled(&self) -> bool {
        matches!(self, TesseraError::OperationDisabled(_))
    }
}

impl From<serde_json::Error> for TesseraError {
    fn from(err: serde_json::Error) -> Self {
        TesseraError::Serialization(err.to_string())
    }
}

// MongoDB-specific error conversions (when mongodb-errors feature is enabled)
#[cfg(feature = "mongodb-errors")]
impl From<mongodb::error::Error> for TesseraError {
    fn from(err: mongodb::error::Error) -> Self {
        TesseraError::MongoDB(err.to_string())
    }
}

#[cfg(feature = "mongodb-errors")]
impl From<bson::ser::Error> for TesseraError {
    fn from(err: bson::ser::Error) -> Self {
        TesseraError::Serialization(format!("BSON serialization error: {}", err))
    }
}

#[cfg(feature = "mongodb-errors")]
impl From<bson::de::Error> for TesseraError {
    fn from(err: bson::de::Error) -> Self {
        TesseraError::Deserialization(format!("BSON deserialization error: {}", err))
    }
}

#[cfg(feature = "mongodb-errors")]
impl From<bson::oid::Error> for TesseraError {
    fn from(err: bson::oid::Error) -> Self {
        TesseraError::Validation(format!("invalid ObjectId: {}", err))
    }
}
