//! The migration lifecycle: create, up, down, status.
//!
//! `create` turns the delta between the last snapshot and the current models
//! into a forward/reverse artifact pair and a new snapshot; `up` applies the
//! next pending artifact inside a transaction that also records the history
//! row; `down` reverses the latest applied artifact the same way. Drift and
//! local-ahead checks run before any new artifact is written.

use std::collections::HashSet;
use std::path::PathBuf;

use tracing::{debug, warn};

use sqlbuns_db::{Database, Introspect, RenameOracle};
use sqlbuns_schema::{Schema, SchemaView};

use crate::checksum::{normalize_index_names, schema_checksum};
use crate::dialect::Dialect;
use crate::diff::{DiffReport, SchemaDiffer};
use crate::error::{MigrateResult, MigrationError};
use crate::history::HistoryStore;
use crate::resolve;
use crate::snapshot::{self, SnapshotStore};

/// Configuration for the migration engine.
#[derive(Debug, Clone)]
pub struct MigrationConfig {
    /// Path to the migrations directory.
    pub migrations_dir: PathBuf,
    /// The target dialect.
    pub dialect: Dialect,
}

impl MigrationConfig {
    /// Create a configuration for a dialect with the conventional
    /// `database/migrations` directory.
    pub fn new(dialect: Dialect) -> Self {
        Self {
            migrations_dir: PathBuf::from("database/migrations"),
            dialect,
        }
    }

    /// Set the migrations directory.
    pub fn migrations_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.migrations_dir = dir.into();
        self
    }
}

/// Result of a successful `create`.
#[derive(Debug)]
pub struct CreateOutcome {
    /// The artifact stem (also the future history row name).
    pub stem: String,
    /// Path of the forward artifact.
    pub path: PathBuf,
    /// Non-blocking warnings from the differ.
    pub warnings: Vec<String>,
}

/// Applied/pending breakdown for status reporting.
#[derive(Debug)]
pub struct MigrationStatus {
    /// Names recorded as applied, oldest first.
    pub applied: Vec<String>,
    /// On-disk artifacts with no history row, oldest first.
    pub pending: Vec<String>,
}

/// The migration engine.
pub struct MigrationEngine<'a> {
    config: MigrationConfig,
    db: &'a dyn Database,
    introspect: &'a dyn Introspect,
    oracle: &'a dyn RenameOracle,
    store: SnapshotStore,
}

impl<'a> MigrationEngine<'a> {
    /// Create an engine over the collaborator seams.
    pub fn new(
        config: MigrationConfig,
        db: &'a dyn Database,
        introspect: &'a dyn Introspect,
        oracle: &'a dyn RenameOracle,
    ) -> Self {
        let store = SnapshotStore::new(&config.migrations_dir);
        Self {
            config,
            db,
            introspect,
            oracle,
            store,
        }
    }

    fn history(&self) -> HistoryStore<'_> {
        HistoryStore::new(self.db, self.config.dialect)
    }

    fn differ(&self) -> SchemaDiffer<'_> {
        SchemaDiffer::new(self.config.dialect, self.db, self.introspect, self.oracle)
    }

    /// Create a new migration from the current models.
    ///
    /// Fails with [`MigrationError::NoChanges`] when the schema checksum is
    /// unchanged, [`MigrationError::LocalAhead`] when unapplied artifacts
    /// exist on disk, and [`MigrationError::SchemaDrift`] when the database
    /// history disagrees with the local snapshot. Nothing is written to disk
    /// on any error path.
    pub async fn create(&self, name: &str, schema: &Schema) -> MigrateResult<CreateOutcome> {
        self.store.ensure_dir().await?;

        let sorted = resolve::sort_schema(schema)?;
        let current = sorted.view();

        let old_raw = self.store.read_snapshot().await?.unwrap_or_default();
        let mut old = old_raw.clone();
        normalize_index_names(&mut old, &current);

        let current_checksum = schema_checksum(&current)?;
        if schema_checksum(&old)? == current_checksum {
            return Err(MigrationError::NoChanges);
        }

        let history = self.history();
        history.ensure().await?;

        // Local files not yet in history must be applied first.
        let applied: HashSet<String> = history
            .applied()
            .await?
            .into_iter()
            .map(|row| row.name)
            .collect();
        let unapplied: Vec<String> = self
            .store
            .list_artifacts()
            .await?
            .into_iter()
            .map(|a| a.stem)
            .filter(|stem| !applied.contains(stem))
            .collect();
        if !unapplied.is_empty() {
            return Err(MigrationError::LocalAhead { files: unapplied });
        }

        self.detect_drift(&old_raw, &old, &current).await?;

        let report = self.differ().diff(&old, &current).await?;
        debug!(summary = %report.summary(), "diff ready");
        for warning in &report.warnings {
            warn!("{warning}");
        }

        let stem = self.store.make_stem(name);
        let path = self
            .store
            .write_artifact(
                &stem,
                &render_script(&report.forward, Some(&current_checksum)),
                &render_script(&report.reverse, None),
            )
            .await?;
        self.store.write_snapshot(&current).await?;

        debug!(%stem, "migration created");
        Ok(CreateOutcome {
            stem,
            path,
            warnings: report.warnings,
        })
    }

    /// Compare the latest applied history checksum with the local old
    /// snapshot. Equality means the database was last modified only through
    /// this tool; anything else is drift.
    async fn detect_drift(
        &self,
        old_raw: &SchemaView,
        old_normalized: &SchemaView,
        current: &SchemaView,
    ) -> MigrateResult<()> {
        let Some(latest) = self.history().latest_applied().await? else {
            return Ok(());
        };

        let local = schema_checksum(old_raw)?;
        if latest.checksum == local {
            return Ok(());
        }

        // Reconstruct the would-be diff for triage before failing.
        let pending_diff = match self.differ().diff(old_normalized, current).await {
            Ok(report) => report.forward,
            Err(_) => Vec::new(),
        };
        Err(MigrationError::SchemaDrift {
            expected: latest.checksum,
            actual: local,
            pending_diff,
        })
    }

    /// Apply the next pending migration, if any. Returns its name.
    ///
    /// At most one migration is applied per invocation; run `up` again to
    /// drain the queue. The artifact executes as a single script inside one
    /// transaction together with its history row.
    pub async fn up(&self) -> MigrateResult<Option<String>> {
        let history = self.history();
        history.ensure().await?;

        let applied: HashSet<String> = history
            .applied()
            .await?
            .into_iter()
            .map(|row| row.name)
            .collect();
        let pending = self
            .store
            .list_artifacts()
            .await?
            .into_iter()
            .find(|a| !applied.contains(&a.stem));
        let Some(artifact) = pending else {
            return Ok(None);
        };

        let script = self.store.read_forward(&artifact.stem).await?;
        // The snapshot file belongs to `create`; the checksum travels inside
        // the artifact. Hand-authored artifacts without one hash as raw text,
        // which makes later drift checks refuse rather than guess.
        let checksum = snapshot::extract_checksum(&script)
            .unwrap_or_else(|| crate::checksum::text_checksum(&script));
        let previous = history.latest_applied().await?.map(|row| row.checksum);

        self.db.begin().await?;
        if let Err(e) = self.db.exec(&script).await {
            self.db.rollback().await.ok();
            return Err(MigrationError::apply_failed(&artifact.stem, e));
        }
        if let Err(e) = history
            .insert_applied(&artifact.stem, &checksum, previous.as_deref())
            .await
        {
            self.db.rollback().await.ok();
            return Err(MigrationError::apply_failed(&artifact.stem, e));
        }
        self.db.commit().await?;

        debug!(name = %artifact.stem, "migration applied");
        Ok(Some(artifact.stem))
    }

    /// Revert the latest applied migration, if any. Returns its name.
    pub async fn down(&self) -> MigrateResult<Option<String>> {
        let history = self.history();
        history.ensure().await?;

        let Some(latest) = history.latest_applied().await? else {
            return Ok(None);
        };

        let script = self.store.read_reverse(&latest.name).await?;

        self.db.begin().await?;
        if let Err(e) = self.db.exec(&script).await {
            self.db.rollback().await.ok();
            return Err(MigrationError::apply_failed(&latest.name, e));
        }
        if let Err(e) = history.mark_rolled_back(&latest.name).await {
            self.db.rollback().await.ok();
            return Err(MigrationError::apply_failed(&latest.name, e));
        }
        self.db.commit().await?;

        debug!(name = %latest.name, "migration rolled back");
        Ok(Some(latest.name))
    }

    /// The applied/pending breakdown.
    pub async fn status(&self) -> MigrateResult<MigrationStatus> {
        let history = self.history();
        history.ensure().await?;

        let applied: Vec<String> = history
            .applied()
            .await?
            .into_iter()
            .map(|row| row.name)
            .collect();
        let applied_set: HashSet<&str> = applied.iter().map(String::as_str).collect();
        let pending = self
            .store
            .list_artifacts()
            .await?
            .into_iter()
            .map(|a| a.stem)
            .filter(|stem| !applied_set.contains(stem.as_str()))
            .collect();

        Ok(MigrationStatus { applied, pending })
    }

    /// Compute the diff without writing anything, for diagnostics.
    pub async fn plan(&self, schema: &Schema) -> MigrateResult<DiffReport> {
        let sorted = resolve::sort_schema(schema)?;
        let current = sorted.view();
        let mut old = self.store.read_snapshot().await?.unwrap_or_default();
        normalize_index_names(&mut old, &current);
        self.differ().diff(&old, &current).await
    }
}

/// Join statements into a script file, one statement per line. Forward
/// scripts embed the snapshot checksum they were created against.
fn render_script(statements: &[String], checksum: Option<&str>) -> String {
    let mut script = String::from("-- Generated by sqlbuns. Do not edit applied migrations.\n");
    if let Some(checksum) = checksum {
        script.push_str(snapshot::CHECKSUM_PREFIX);
        script.push_str(checksum);
        script.push('\n');
    }
    for statement in statements {
        script.push_str(statement);
        script.push('\n');
    }
    script
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = MigrationConfig::new(Dialect::Sqlite).migrations_dir("/tmp/mig");
        assert_eq!(config.migrations_dir, PathBuf::from("/tmp/mig"));
        assert_eq!(config.dialect, Dialect::Sqlite);
    }

    #[test]
    fn test_render_script_embeds_checksum() {
        let script = render_script(&["A;".to_string(), "B;".to_string()], Some("abc123"));
        assert!(script.starts_with("-- Generated by sqlbuns"));
        assert!(script.contains("-- sqlbuns:checksum abc123\n"));
        assert!(script.contains("A;\nB;\n"));
        assert_eq!(snapshot::extract_checksum(&script).as_deref(), Some("abc123"));

        let reverse = render_script(&["A;".to_string()], None);
        assert!(snapshot::extract_checksum(&reverse).is_none());
    }
}
