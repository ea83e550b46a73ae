//! # sqlbuns-migrate
//!
//! The schema differencer and migration lifecycle for sqlbuns.
//!
//! This crate turns declarative model definitions into ordered DDL:
//! - Schema snapshots are canonicalized and checksummed (SHA-256) so drift
//!   and no-op runs are detected cheaply.
//! - Models are topologically sorted over their relation dependencies, with
//!   cycle detection.
//! - The differ computes forward DDL and its exact inverse across tables,
//!   columns, relations, indexes, and triggers, deferring foreign keys whose
//!   referents are created in the same batch.
//! - Dialect adapters cover PostgreSQL, MySQL, and SQLite, including the
//!   SQLite full-table rebuild for mutations it cannot express in place.
//! - The engine applies artifacts one at a time, each inside a transaction
//!   that also writes the `_sqlbuns_migrations` history row.
//!
//! ```text
//! ┌──────────────┐     ┌────────────────┐     ┌──────────────┐
//! │ Models       │────▶│ Topo sort +    │────▶│ Dialect SQL  │
//! │ (sqlbuns-    │     │ Schema differ  │     │ generation   │
//! │  schema)     │     └────────────────┘     └──────────────┘
//! └──────────────┘             │                     │
//!                              ▼                     ▼
//!                      ┌────────────────┐     ┌──────────────┐
//!                      │ snapshot.json  │     │ Apply + his- │
//!                      │ + artifacts    │────▶│ tory row     │
//!                      └────────────────┘     └──────────────┘
//! ```

pub mod checksum;
pub mod dialect;
pub mod diff;
pub mod engine;
pub mod error;
pub mod history;
pub mod rebuild;
pub mod resolve;
pub mod snapshot;
pub mod trigger_check;

pub use checksum::{
    canonicalize, checksum, normalize_index_names, schema_checksum, text_checksum,
    to_canonical_json,
};
pub use dialect::{enum_type_name, Dialect};
pub use diff::{DiffReport, SchemaDiffer};
pub use engine::{CreateOutcome, MigrationConfig, MigrationEngine, MigrationStatus};
pub use error::{MigrateResult, MigrationError};
pub use history::{Direction, HistoryRow, HistoryStore, HISTORY_TABLE};
pub use resolve::{sort_keys, sort_schema};
pub use snapshot::{
    extract_checksum, sanitize_slug, Artifact, SnapshotStore, CHECKSUM_PREFIX, SNAPSHOT_FILE,
};
pub use trigger_check::{CheckVerdict, TriggerCheck};
