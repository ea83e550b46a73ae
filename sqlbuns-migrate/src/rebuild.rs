//! SQLite table rebuilds.
//!
//! SQLite cannot `ALTER COLUMN`, `ADD CONSTRAINT`, or drop columns in the
//! general case, so any such mutation on an existing table is expressed as a
//! full rebuild: create `<table>_new` with the target shape, copy rows
//! column-by-column, swap the tables, and recreate indexes and triggers. The
//! reverse migration is symmetric against a provisional `<table>_old`.

use serde_json::Value;

use sqlbuns_db::Database;
use sqlbuns_schema::ModelView;

use crate::dialect::Dialect;
use crate::diff::create_table_sql;
use crate::error::{MigrateResult, MigrationError};

/// The statement pair a rebuild expands into, plus copy warnings.
#[derive(Debug, Default)]
pub struct Rebuild {
    pub forward: Vec<String>,
    pub reverse: Vec<String>,
    pub warnings: Vec<String>,
}

/// Plan the rebuild of `table` from `old` to `new`.
///
/// `renames` maps old column names to confirmed new names. `new_fks` /
/// `old_fks` are the table-level FOREIGN KEY clauses each side carries, since
/// SQLite can only express constraints inline.
#[allow(clippy::too_many_arguments)]
pub async fn rebuild_table(
    db: &dyn Database,
    dialect: Dialect,
    table: &str,
    old: &ModelView,
    new: &ModelView,
    renames: &[(String, String)],
    new_fks: &[String],
    old_fks: &[String],
) -> MigrateResult<Rebuild> {
    guard_external_references(db, table).await?;

    let mut out = Rebuild::default();

    out.forward.push("PRAGMA foreign_keys=OFF;".to_string());
    out.reverse.push("PRAGMA foreign_keys=OFF;".to_string());

    // Forward: build the target shape next to the old table, copy, swap.
    let staging = format!("{table}_new");
    out.forward
        .push(create_table_sql(dialect, &staging, new, new_fks)?);
    out.forward
        .push(copy_sql(dialect, &staging, table, new, old, renames, true, &mut out.warnings));
    out.forward.push(format!("DROP TABLE {table};"));
    out.forward.push(format!(
        "ALTER TABLE {} RENAME TO {table};",
        dialect.quote_ident(&staging)
    ));
    recreate_objects(dialect, table, new, &mut out.forward);
    out.forward.push("PRAGMA foreign_keys=ON;".to_string());

    // Reverse: the same dance against a provisional <table>_old.
    let staging = format!("{table}_old");
    out.reverse
        .push(create_table_sql(dialect, &staging, old, old_fks)?);
    out.reverse
        .push(copy_sql(dialect, &staging, table, old, new, renames, false, &mut Vec::new()));
    out.reverse.push(format!("DROP TABLE {table};"));
    out.reverse.push(format!(
        "ALTER TABLE {} RENAME TO {table};",
        dialect.quote_ident(&staging)
    ));
    recreate_objects(dialect, table, old, &mut out.reverse);
    out.reverse.push("PRAGMA foreign_keys=ON;".to_string());

    Ok(out)
}

/// Reject the rebuild when another table's DDL references this table, or a
/// trigger on another table mentions it. The trigger scan is a conservative
/// substring match; over-refusing beats corrupting a dependent trigger.
async fn guard_external_references(db: &dyn Database, table: &str) -> MigrateResult<()> {
    let rows = db
        .query(
            "SELECT name, tbl_name, sql FROM sqlite_master WHERE type = 'table'",
            &[],
        )
        .await?;
    for row in &rows {
        let name = row.get("name").and_then(Value::as_str).unwrap_or_default();
        let sql = row
            .get("sql")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_lowercase();
        if name == table {
            continue;
        }
        let target = table.to_lowercase();
        if sql.contains(&format!("references {target}"))
            || sql.contains(&format!("references \"{target}\""))
            || sql.contains(&format!("references `{target}`"))
        {
            return Err(MigrationError::rebuild_blocked(
                table,
                format!("table `{name}` declares a foreign key against it"),
            ));
        }
    }

    let rows = db
        .query(
            "SELECT name, tbl_name, sql FROM sqlite_master WHERE type = 'trigger'",
            &[],
        )
        .await?;
    for row in &rows {
        let name = row.get("name").and_then(Value::as_str).unwrap_or_default();
        let tbl = row.get("tbl_name").and_then(Value::as_str).unwrap_or_default();
        let sql = row.get("sql").and_then(Value::as_str).unwrap_or_default();
        if tbl == table {
            // The table's own triggers are captured and recreated.
            continue;
        }
        if sql.to_lowercase().contains(&table.to_lowercase()) {
            return Err(MigrationError::rebuild_blocked(
                table,
                format!("trigger `{name}` mentions it"),
            ));
        }
    }

    Ok(())
}

/// `INSERT INTO <staging> (<cols>) SELECT <expr-per-column> FROM <source>;`
///
/// Each destination column is fed by: the same-named source column if it
/// exists, else the confirmed-rename source column, else the column's default
/// literal, else NULL.
#[allow(clippy::too_many_arguments)]
fn copy_sql(
    dialect: Dialect,
    staging: &str,
    source: &str,
    dest: &ModelView,
    src: &ModelView,
    renames: &[(String, String)],
    forward: bool,
    warnings: &mut Vec<String>,
) -> String {
    let mut columns = Vec::new();
    let mut exprs = Vec::new();

    for (name, field) in &dest.fields {
        columns.push(name.clone());

        let renamed_from = renames.iter().find_map(|(old, new)| {
            if forward && new == name {
                Some(old.as_str())
            } else if !forward && old == name {
                Some(new.as_str())
            } else {
                None
            }
        });

        let expr = if src.fields.contains_key(name) {
            name.clone()
        } else if let Some(source_col) = renamed_from {
            source_col.to_string()
        } else if let Some(default) = &field.default {
            dialect.render_default(default)
        } else {
            if forward && !field.nullable {
                warnings.push(format!(
                    "column `{}.{name}` is NOT NULL with no default; existing rows get NULL",
                    dest.table()
                ));
            }
            "NULL".to_string()
        };
        exprs.push(expr);
    }

    format!(
        "INSERT INTO {} ({}) SELECT {} FROM {source};",
        dialect.quote_ident(staging),
        columns.join(", "),
        exprs.join(", ")
    )
}

/// Recreate a model's captured indexes and triggers after the swap. The
/// foreign-key support indexes (`idx_<table>_<fk>`) are part of the captured
/// set: dropping the old table took them with it.
fn recreate_objects(dialect: Dialect, table: &str, model: &ModelView, out: &mut Vec<String>) {
    for index in &model.indexes {
        let columns: Vec<&str> = index.fields.iter().map(|f| f.as_str()).collect();
        out.push(dialect.create_index(
            &index.effective_name(table),
            table,
            &columns,
            index.unique,
            false,
        ));
    }

    for relation in model.relations.values() {
        if matches!(
            relation.kind,
            sqlbuns_schema::RelationKind::HasOne | sqlbuns_schema::RelationKind::HasMany
        ) {
            let fk = relation.foreign_key.as_str();
            out.push(dialect.create_index(
                &format!("idx_{table}_{fk}"),
                table,
                &[fk],
                false,
                true,
            ));
        }
    }

    for trigger in model.triggers.values() {
        for (i, statement) in trigger.statements.iter().enumerate() {
            out.extend(dialect.create_trigger(
                table,
                &trigger.statement_name(table, i),
                trigger.timing,
                trigger.event,
                &statement.body,
                statement.when.as_deref(),
            ));
        }
    }
}
