//! # sqlbuns - Declarative Schema Migrations for Rust
//!
//! sqlbuns evolves a live SQL database toward a set of declarative model
//! definitions. It computes the minimal DDL between the last recorded
//! snapshot and the current models, writes it as a paired forward/reverse
//! migration artifact, and applies artifacts transactionally while detecting
//! drift and lost updates. PostgreSQL, MySQL, and SQLite are supported.
//!
//! ## Crates
//!
//! - [`schema`] - the in-memory model: fields, relations, indexes, triggers,
//!   and their canonical snapshot views.
//! - [`migrate`] - the differ, dialect adapters, snapshot and history stores,
//!   and the create/up/down lifecycle.
//! - [`db`] - the connection seam the engine consumes, with adapters for the
//!   three dialects behind cargo features.
//!
//! ## Example
//!
//! ```rust,no_run
//! use sqlbuns::prelude::*;
//!
//! # async fn demo(db: &dyn sqlbuns::db::Database, introspect: &dyn sqlbuns::db::Introspect) -> Result<(), Box<dyn std::error::Error>> {
//! let users = Model::new("users")
//!     .field("id", Field::new(FieldKind::Integer).primary_key().auto_increment())
//!     .field("email", Field::new(FieldKind::varchar()).unique());
//! let schema = Schema::from_models([("users", users)])?;
//!
//! let config = MigrationConfig::new(Dialect::Sqlite).migrations_dir("database/migrations");
//! let engine = MigrationEngine::new(config, db, introspect, &NoPrompt);
//!
//! let created = engine.create("add_users", &schema).await?;
//! println!("wrote {}", created.path.display());
//! engine.up().await?;
//! # Ok(())
//! # }
//! ```

pub use sqlbuns_db as db;
pub use sqlbuns_migrate as migrate;
pub use sqlbuns_schema as schema;

pub use sqlbuns_migrate::{
    Dialect, MigrateResult, MigrationConfig, MigrationEngine, MigrationError,
};
pub use sqlbuns_schema::{Field, FieldKind, Model, Schema, SchemaError};

/// The common imports for driving migrations.
pub mod prelude {
    pub use crate::db::{Database, Introspect, NoPrompt, RenameOracle};
    pub use crate::migrate::{
        Dialect, DiffReport, MigrationConfig, MigrationEngine, MigrationError, SchemaDiffer,
    };
    pub use crate::schema::{
        assert_params, Field, FieldKind, Index, Model, ModelMeta, Relation, RelationKind, Schema,
        TriggerSlot, TriggerStatement,
    };
}
