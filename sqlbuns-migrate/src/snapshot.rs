//! The snapshot file and migration artifacts on disk.
//!
//! The migrations directory holds one `schema_snapshot.json` plus a pair of
//! files per migration: `<epoch-ms>_<slug>.sql` (forward) and
//! `<epoch-ms>_<slug>.down.sql` (reverse). The epoch prefix makes
//! lexicographic listing coincide with chronological order.

use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::debug;

use sqlbuns_schema::SchemaView;

use crate::error::{MigrateResult, MigrationError};

/// File name of the schema snapshot inside the migrations directory.
pub const SNAPSHOT_FILE: &str = "schema_snapshot.json";

/// Header line carrying the snapshot checksum inside a forward artifact.
///
/// `up` never reads the snapshot file; the checksum it records travels with
/// the artifact itself.
pub const CHECKSUM_PREFIX: &str = "-- sqlbuns:checksum ";

const REVERSE_SUFFIX: &str = ".down.sql";

/// A migration artifact on disk, identified by its file stem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// The `<epoch-ms>_<slug>` stem, which is also the history row name.
    pub stem: String,
    /// Path of the forward SQL file.
    pub path: PathBuf,
}

/// Reader/writer for the snapshot and artifact files.
pub struct SnapshotStore {
    migrations_dir: PathBuf,
}

impl SnapshotStore {
    /// Create a store rooted at the migrations directory.
    pub fn new(migrations_dir: impl Into<PathBuf>) -> Self {
        Self {
            migrations_dir: migrations_dir.into(),
        }
    }

    /// The migrations directory.
    pub fn migrations_dir(&self) -> &Path {
        &self.migrations_dir
    }

    /// Ensure the migrations directory exists.
    pub async fn ensure_dir(&self) -> MigrateResult<()> {
        tokio::fs::create_dir_all(&self.migrations_dir).await?;
        Ok(())
    }

    fn snapshot_path(&self) -> PathBuf {
        self.migrations_dir.join(SNAPSHOT_FILE)
    }

    /// Read the snapshot, or `None` if it has never been written.
    pub async fn read_snapshot(&self) -> MigrateResult<Option<SchemaView>> {
        let path = self.snapshot_path();
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => Ok(Some(serde_json::from_str(&contents)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Write the snapshot atomically: serialize to a temp file in the same
    /// directory, then rename over the target.
    pub async fn write_snapshot(&self, view: &SchemaView) -> MigrateResult<()> {
        self.ensure_dir().await?;
        let path = self.snapshot_path();
        let tmp = path.with_extension("json.tmp");

        let mut contents = serde_json::to_string_pretty(view)?;
        contents.push('\n');
        tokio::fs::write(&tmp, contents).await?;
        tokio::fs::rename(&tmp, &path).await?;
        debug!(path = %path.display(), "snapshot written");
        Ok(())
    }

    /// List forward artifacts in lexicographic (= chronological) order.
    pub async fn list_artifacts(&self) -> MigrateResult<Vec<Artifact>> {
        let mut artifacts = Vec::new();

        if !self.migrations_dir.exists() {
            return Ok(artifacts);
        }

        let mut entries = tokio::fs::read_dir(&self.migrations_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !name.ends_with(".sql") || name.ends_with(REVERSE_SUFFIX) {
                continue;
            }
            let stem = name.trim_end_matches(".sql").to_string();
            artifacts.push(Artifact { stem, path });
        }

        artifacts.sort_by(|a, b| a.stem.cmp(&b.stem));
        Ok(artifacts)
    }

    /// Write a forward/reverse artifact pair.
    pub async fn write_artifact(
        &self,
        stem: &str,
        forward: &str,
        reverse: &str,
    ) -> MigrateResult<PathBuf> {
        self.ensure_dir().await?;
        let forward_path = self.migrations_dir.join(format!("{stem}.sql"));
        let reverse_path = self.migrations_dir.join(format!("{stem}{REVERSE_SUFFIX}"));

        tokio::fs::write(&forward_path, forward).await?;
        tokio::fs::write(&reverse_path, reverse).await?;
        debug!(stem, "artifact pair written");
        Ok(forward_path)
    }

    /// Read a forward artifact by stem.
    pub async fn read_forward(&self, stem: &str) -> MigrateResult<String> {
        let path = self.migrations_dir.join(format!("{stem}.sql"));
        Ok(tokio::fs::read_to_string(&path).await?)
    }

    /// Read a reverse artifact by stem.
    pub async fn read_reverse(&self, stem: &str) -> MigrateResult<String> {
        let path = self.migrations_dir.join(format!("{stem}{REVERSE_SUFFIX}"));
        tokio::fs::read_to_string(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                MigrationError::invalid_migration(format!(
                    "migration '{stem}' has no reverse artifact"
                ))
            } else {
                e.into()
            }
        })
    }

    /// Generate a new artifact stem from a user-supplied name.
    pub fn make_stem(&self, name: &str) -> String {
        format!("{}_{}", Utc::now().timestamp_millis(), sanitize_slug(name))
    }
}

/// Extract the embedded snapshot checksum from a forward artifact script.
pub fn extract_checksum(script: &str) -> Option<String> {
    script
        .lines()
        .find_map(|line| line.strip_prefix(CHECKSUM_PREFIX))
        .map(|sum| sum.trim().to_string())
}

/// Sanitize a migration name into a slug: lowercase, anything outside
/// `[a-z0-9_-]` replaced by `_`, leading/trailing underscores trimmed.
pub fn sanitize_slug(name: &str) -> String {
    let slug: String = name
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    slug.trim_matches('_').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlbuns_schema::{Field, FieldKind, Model, Schema};

    fn sample_view() -> SchemaView {
        let users = Model::new("users").field(
            "id",
            Field::new(FieldKind::Integer).primary_key().auto_increment(),
        );
        Schema::from_models([("users", users)]).unwrap().view()
    }

    #[test]
    fn test_sanitize_slug() {
        assert_eq!(sanitize_slug("Add Users!"), "add_users");
        assert_eq!(sanitize_slug("__trim__"), "trim");
        assert_eq!(sanitize_slug("keep-dash_ok2"), "keep-dash_ok2");
        assert_eq!(sanitize_slug("añadir"), "a_adir");
    }

    #[tokio::test]
    async fn test_snapshot_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());

        assert!(store.read_snapshot().await.unwrap().is_none());

        let view = sample_view();
        store.write_snapshot(&view).await.unwrap();
        let back = store.read_snapshot().await.unwrap().unwrap();
        assert_eq!(back, view);

        // Pretty-printed with two-space indent.
        let raw = std::fs::read_to_string(dir.path().join(SNAPSHOT_FILE)).unwrap();
        assert!(raw.starts_with("{\n  \""));
    }

    #[tokio::test]
    async fn test_artifact_listing_skips_reverse_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());

        store
            .write_artifact("1700000000001_b", "B;", "RB;")
            .await
            .unwrap();
        store
            .write_artifact("1700000000000_a", "A;", "RA;")
            .await
            .unwrap();

        let artifacts = store.list_artifacts().await.unwrap();
        let stems: Vec<&str> = artifacts.iter().map(|a| a.stem.as_str()).collect();
        assert_eq!(stems, ["1700000000000_a", "1700000000001_b"]);

        assert_eq!(store.read_forward("1700000000000_a").await.unwrap(), "A;");
        assert_eq!(store.read_reverse("1700000000000_a").await.unwrap(), "RA;");
    }

    #[tokio::test]
    async fn test_missing_reverse_artifact_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());
        store.ensure_dir().await.unwrap();
        tokio::fs::write(dir.path().join("1700_x.sql"), "A;")
            .await
            .unwrap();

        let err = store.read_reverse("1700_x").await.unwrap_err();
        assert!(err.to_string().contains("no reverse artifact"));
    }

    #[test]
    fn test_make_stem_shape() {
        let store = SnapshotStore::new("/tmp/unused");
        let stem = store.make_stem("Add Users");
        let (epoch, slug) = stem.split_once('_').unwrap();
        assert!(epoch.chars().all(|c| c.is_ascii_digit()));
        assert_eq!(slug, "add_users");
    }
}
