//! Error types for the migration engine.

use thiserror::Error;

/// Result type alias for migration operations.
pub type MigrateResult<T> = Result<T, MigrationError>;

/// Errors that can occur during migration operations.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// File system error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Database operation error.
    #[error("database error: {0}")]
    Database(#[from] sqlbuns_db::DbError),

    /// Schema validation error, surfaced from model construction or the
    /// differ.
    #[error(transparent)]
    Schema(#[from] sqlbuns_schema::SchemaError),

    /// Snapshot or artifact (de)serialization error.
    #[error("snapshot serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// The relation graph is not a DAG. Carries the cycle path.
    #[error("cyclic schema: {}", path.join(" -> "))]
    CyclicSchema { path: Vec<String> },

    /// Local artifact files exist that are not recorded in history.
    #[error(
        "local migrations are ahead of the database ({}); run `up` before creating a new migration",
        files.join(", ")
    )]
    LocalAhead { files: Vec<String> },

    /// The database history checksum disagrees with the local snapshot.
    #[error("schema drift detected: history records {expected}, local snapshot hashes to {actual}")]
    SchemaDrift {
        expected: String,
        actual: String,
        /// The would-be diff between the local snapshot and the current
        /// models, printed for triage.
        pending_diff: Vec<String>,
    },

    /// DDL failed while applying a migration artifact.
    #[error("failed to apply migration '{name}': {cause}")]
    ApplyFailed { name: String, cause: String },

    /// `DATABASE_ENGINE` is missing or names an unknown dialect.
    #[error("unsupported database engine `{0}`; expected postgres, mysql, or sqlite")]
    DialectUnsupported(String),

    /// A SQLite table rebuild is blocked by external references.
    #[error("cannot rebuild table `{table}`: {reason}")]
    RebuildBlocked { table: String, reason: String },

    /// No schema changes detected.
    #[error("no schema changes detected")]
    NoChanges,

    /// Invalid migration artifact or history state.
    #[error("invalid migration: {0}")]
    InvalidMigration(String),
}

impl MigrationError {
    /// Create an invalid migration error.
    pub fn invalid_migration(msg: impl Into<String>) -> Self {
        Self::InvalidMigration(msg.into())
    }

    /// Create an apply-failed error.
    pub fn apply_failed(name: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        Self::ApplyFailed {
            name: name.into(),
            cause: cause.to_string(),
        }
    }

    /// Create a rebuild-blocked error.
    pub fn rebuild_blocked(table: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::RebuildBlocked {
            table: table.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_display() {
        let err = MigrationError::CyclicSchema {
            path: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "cyclic schema: a -> b -> a");
    }

    #[test]
    fn test_local_ahead_display() {
        let err = MigrationError::LocalAhead {
            files: vec!["1700000000000_add_users".into()],
        };
        assert!(err.to_string().contains("run `up`"));
    }
}
