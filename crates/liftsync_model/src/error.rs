//! Error types for the model crate.

use thiserror::Error;

/// Result type for model operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors raised while mapping records across the remote boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// A timestamp column could not be parsed as ISO-8601.
    #[error("invalid timestamp in column {column}: {value:?}")]
    InvalidTimestamp {
        /// Remote column name.
        column: &'static str,
        /// Raw value received.
        value: String,
    },

    /// An identifier column could not be parsed.
    #[error("invalid identifier in column {column}: {value:?}")]
    InvalidId {
        /// Remote column name.
        column: &'static str,
        /// Raw value received.
        value: String,
    },

    /// A numeric column was outside the range the local model accepts.
    #[error("value out of range in column {column}: {value}")]
    OutOfRange {
        /// Remote column name.
        column: &'static str,
        /// Raw value received.
        value: i64,
    },
}

/// A live record has a field that prevents it from being pushed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{entity} {id}: field `{field}` {problem}")]
pub struct ValidationError {
    /// Entity kind name.
    pub entity: &'static str,
    /// Record identifier.
    pub id: String,
    /// Name of the offending field.
    pub field: &'static str,
    /// What is wrong with it.
    pub problem: &'static str,
}

impl ValidationError {
    /// A required field is missing or blank.
    pub fn missing(entity: &'static str, id: impl ToString, field: &'static str) -> Self {
        Self::invalid(entity, id, field, "is required")
    }

    /// A field holds a value the remote store cannot represent.
    pub fn invalid(
        entity: &'static str,
        id: impl ToString,
        field: &'static str,
        problem: &'static str,
    ) -> Self {
        Self {
            entity,
            id: id.to_string(),
            field,
            problem,
        }
    }
}
