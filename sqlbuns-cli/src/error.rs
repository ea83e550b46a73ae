//! CLI error types and result alias.

use miette::Diagnostic;
use thiserror::Error;

/// Result type alias for CLI operations.
pub type CliResult<T> = Result<T, CliError>;

/// CLI error types.
#[derive(Error, Debug, Diagnostic)]
pub enum CliError {
    /// IO error.
    #[error("IO error: {0}")]
    #[diagnostic(code(sqlbuns::io))]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    #[diagnostic(code(sqlbuns::config))]
    Config(String),

    /// Model definition error.
    #[error("model error: {0}")]
    #[diagnostic(code(sqlbuns::models))]
    Models(String),

    /// Schema validation error.
    #[error(transparent)]
    #[diagnostic(code(sqlbuns::schema))]
    Schema(#[from] sqlbuns_schema::SchemaError),

    /// Migration engine error.
    #[error(transparent)]
    #[diagnostic(code(sqlbuns::migration))]
    Migration(#[from] sqlbuns_migrate::MigrationError),

    /// Database error.
    #[error("database error: {0}")]
    #[diagnostic(code(sqlbuns::database))]
    Database(#[from] sqlbuns_db::DbError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    #[diagnostic(code(sqlbuns::json))]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a model definition error.
    pub fn models(msg: impl Into<String>) -> Self {
        Self::Models(msg.into())
    }
}
