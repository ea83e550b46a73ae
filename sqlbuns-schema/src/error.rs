//! Error types for schema construction and validation.

use miette::Diagnostic;
use thiserror::Error;

/// Result type for schema operations.
pub type SchemaResult<T> = Result<T, SchemaError>;

/// Errors that can occur while building or validating a schema.
#[derive(Error, Debug, Diagnostic)]
pub enum SchemaError {
    /// Structural violation that makes the schema unusable as a whole.
    #[error("invalid schema: {message}")]
    #[diagnostic(code(sqlbuns::schema::invalid_schema))]
    InvalidSchema { message: String },

    /// Invalid field definition.
    #[error("invalid field `{field}`: {message}")]
    #[diagnostic(code(sqlbuns::schema::invalid_field))]
    InvalidField { field: String, message: String },

    /// Invalid relation definition.
    #[error("invalid relation `{relation}`: {message}")]
    #[diagnostic(code(sqlbuns::schema::invalid_relation))]
    InvalidRelation { relation: String, message: String },

    /// Invalid trigger definition.
    #[error("invalid trigger `{trigger}`: {message}")]
    #[diagnostic(code(sqlbuns::schema::invalid_trigger))]
    InvalidTrigger { trigger: String, message: String },

    /// Parameter assertion failure from [`crate::assert_params`].
    #[error("invalid parameter `{param}`: {message}")]
    #[diagnostic(code(sqlbuns::schema::invalid_param))]
    InvalidParam { param: String, message: String },
}

impl SchemaError {
    /// Create an invalid schema error.
    pub fn invalid_schema(message: impl Into<String>) -> Self {
        Self::InvalidSchema {
            message: message.into(),
        }
    }

    /// Create an invalid field error.
    pub fn invalid_field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create an invalid relation error.
    pub fn invalid_relation(relation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidRelation {
            relation: relation.into(),
            message: message.into(),
        }
    }

    /// Create an invalid trigger error.
    pub fn invalid_trigger(trigger: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidTrigger {
            trigger: trigger.into(),
            message: message.into(),
        }
    }

    /// Create an invalid parameter error.
    pub fn invalid_param(param: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParam {
            param: param.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SchemaError::invalid_field("users.level", "choices must not be empty");
        let msg = err.to_string();
        assert!(msg.contains("users.level"));
        assert!(msg.contains("choices"));
    }
}
