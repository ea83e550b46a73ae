//! Trigger-body validation.
//!
//! Before a trigger statement is emitted, its body is parsed just enough to
//! find the tables and columns it touches, and each is checked against the
//! live database or the current batch. A statement targeting a batch table
//! that does not exist yet defers the whole trigger to the post-batch pass.

use sqlbuns_db::Introspect;
use sqlbuns_schema::{SchemaError, SchemaView, TriggerStatement};

use crate::error::MigrateResult;

/// Outcome of validating one trigger statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckVerdict {
    /// Every referenced object exists; the trigger can be created in place.
    Valid,
    /// A referenced table is part of the batch but not yet in the database;
    /// create the trigger after the batch's tables.
    Defer,
}

/// What a statement body was parsed into.
#[derive(Debug, Clone, PartialEq)]
struct StatementRefs {
    table: String,
    columns: Vec<String>,
    warnings: Vec<String>,
}

/// Validator over the introspection seam and the current batch.
pub struct TriggerCheck<'a> {
    introspect: &'a dyn Introspect,
    batch: &'a SchemaView,
}

impl<'a> TriggerCheck<'a> {
    /// Create a validator.
    pub fn new(introspect: &'a dyn Introspect, batch: &'a SchemaView) -> Self {
        Self { introspect, batch }
    }

    /// Validate one statement body. Returns the verdict plus any warnings.
    pub async fn check_statement(
        &self,
        trigger: &str,
        body: &str,
    ) -> MigrateResult<(CheckVerdict, Vec<String>)> {
        let Some(refs) = parse_statement(body) else {
            // Unrecognized leading keyword: assumed safe.
            return Ok((CheckVerdict::Valid, Vec::new()));
        };

        let table = &refs.table;
        if self.introspect.table_exists(table).await {
            for column in &refs.columns {
                if !self.introspect.column_exists(table, column).await {
                    return Err(SchemaError::invalid_trigger(
                        trigger,
                        format!("column `{table}.{column}` does not exist"),
                    )
                    .into());
                }
            }
            return Ok((CheckVerdict::Valid, refs.warnings));
        }

        if let Some((_, model)) = self.batch.by_table(table) {
            for column in &refs.columns {
                if !model.fields.contains_key(column) {
                    return Err(SchemaError::invalid_trigger(
                        trigger,
                        format!("column `{table}.{column}` is not a field of model `{}`", model.name),
                    )
                    .into());
                }
            }
            // In batch but not in the database yet.
            return Ok((CheckVerdict::Defer, refs.warnings));
        }

        Err(SchemaError::invalid_trigger(
            trigger,
            format!("referenced table `{table}` does not exist and is not in the batch"),
        )
        .into())
    }

    /// Validate a whole statement list: [`CheckVerdict::Defer`] wins if any
    /// statement defers.
    pub async fn check_statements(
        &self,
        trigger: &str,
        statements: &[TriggerStatement],
    ) -> MigrateResult<(CheckVerdict, Vec<String>)> {
        let mut verdict = CheckVerdict::Valid;
        let mut warnings = Vec::new();
        for statement in statements {
            let (v, w) = self.check_statement(trigger, &statement.body).await?;
            warnings.extend(w);
            if v == CheckVerdict::Defer {
                verdict = CheckVerdict::Defer;
            }
        }
        Ok((verdict, warnings))
    }
}

/// Strip enclosing double quotes, backticks, or single quotes from an
/// identifier.
fn unquote(ident: &str) -> String {
    let trimmed = ident.trim();
    for quote in ['"', '`', '\''] {
        if trimmed.len() >= 2 && trimmed.starts_with(quote) && trimmed.ends_with(quote) {
            return trimmed[1..trimmed.len() - 1].to_string();
        }
    }
    trimmed.to_string()
}

fn is_ident(s: &str) -> bool {
    !s.is_empty()
        && s.chars().next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Byte-safe, ASCII case-insensitive substring search.
fn find_ci(haystack: &str, needle: &str) -> Option<usize> {
    haystack
        .as_bytes()
        .windows(needle.len())
        .position(|window| window.eq_ignore_ascii_case(needle.as_bytes()))
}

/// Parse the leading keyword of a statement body into table/column refs.
/// Returns `None` for statements the validator does not recognize.
fn parse_statement(body: &str) -> Option<StatementRefs> {
    let text = body.trim().trim_end_matches(';');
    let tokens: Vec<&str> = text.split_whitespace().collect();
    let first = tokens.first()?.to_lowercase();

    match first.as_str() {
        "insert" => {
            // INSERT INTO <t> (<cols>) ...
            let into = tokens.iter().position(|t| t.eq_ignore_ascii_case("into"))?;
            let after = text.split_whitespace().skip(into + 1).collect::<Vec<_>>().join(" ");
            let (table_token, rest) = split_leading_ident(&after)?;
            let columns = rest
                .trim_start()
                .strip_prefix('(')
                .and_then(|r| r.split_once(')'))
                .map(|(cols, _)| {
                    cols.split(',')
                        .map(|c| unquote(c))
                        .filter(|c| is_ident(c))
                        .collect()
                })
                .unwrap_or_default();
            Some(StatementRefs {
                table: unquote(&table_token),
                columns,
                warnings: Vec::new(),
            })
        }
        "update" => {
            // UPDATE <t> SET <col> = ..., <col> = ...
            let table = unquote(tokens.get(1)?);
            let set_pos = find_ci(text, " set ")?;
            let assignments = &text[set_pos + 5..];
            let columns = assignments
                .split(',')
                .filter_map(|part| part.split('=').next())
                .map(|lhs| unquote(lhs))
                .map(|lhs| lhs.rsplit('.').next().unwrap_or(&lhs).to_string())
                .filter(|c| is_ident(c))
                .collect();
            Some(StatementRefs {
                table,
                columns,
                warnings: Vec::new(),
            })
        }
        "delete" => {
            // DELETE FROM <t> ...
            let from = tokens.iter().position(|t| t.eq_ignore_ascii_case("from"))?;
            Some(StatementRefs {
                table: unquote(tokens.get(from + 1)?),
                columns: Vec::new(),
                warnings: Vec::new(),
            })
        }
        "select" => {
            // SELECT <cols> FROM <t> ...
            let from_pos = find_ci(text, " from ")?;
            let select_list = &text[6..from_pos];
            let after_from = text[from_pos + 6..].split_whitespace().next()?;

            let mut warnings = Vec::new();
            if find_ci(text, " join ").is_some() {
                warnings.push("trigger SELECT uses JOIN; only the first table is validated".into());
            }
            if select_list.contains('(') || find_ci(&text[from_pos..], "select").is_some() {
                warnings.push("trigger SELECT uses a subselect; it is not validated".into());
            }

            let columns = if select_list.trim() == "*" {
                Vec::new()
            } else {
                select_list
                    .split(',')
                    .map(|c| unquote(c.split_whitespace().next().unwrap_or("")))
                    .map(|c| c.rsplit('.').next().unwrap_or(&c).to_string())
                    .filter(|c| is_ident(c))
                    .collect()
            };

            Some(StatementRefs {
                table: unquote(after_from),
                columns,
                warnings,
            })
        }
        _ => None,
    }
}

/// Split `"users (a, b) ..."` into the leading identifier and the remainder.
fn split_leading_ident(text: &str) -> Option<(String, &str)> {
    let trimmed = text.trim_start();
    let end = trimmed
        .find(|c: char| c.is_whitespace() || c == '(')
        .unwrap_or(trimmed.len());
    if end == 0 {
        return None;
    }
    Some((trimmed[..end].to_string(), &trimmed[end..]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlbuns_db::memory::MemoryDatabase;
    use sqlbuns_schema::{Field, FieldKind, Model, Schema};

    fn batch_with(table: &str, fields: &[&str]) -> SchemaView {
        let mut model = Model::new(table);
        for field in fields {
            model = model.field(*field, Field::new(FieldKind::Integer).nullable());
        }
        Schema::from_models([(table, model)]).unwrap().view()
    }

    #[test]
    fn test_parse_insert() {
        let refs = parse_statement("INSERT INTO audit (user_id, action) VALUES (NEW.id, 'x')")
            .unwrap();
        assert_eq!(refs.table, "audit");
        assert_eq!(refs.columns, ["user_id", "action"]);
    }

    #[test]
    fn test_parse_insert_without_column_list() {
        let refs = parse_statement("INSERT INTO audit VALUES (1)").unwrap();
        assert_eq!(refs.table, "audit");
        assert!(refs.columns.is_empty());
    }

    #[test]
    fn test_parse_update() {
        let refs = parse_statement("UPDATE `stats` SET views = views + 1, touched = 1").unwrap();
        assert_eq!(refs.table, "stats");
        assert_eq!(refs.columns, ["views", "touched"]);
    }

    #[test]
    fn test_parse_delete() {
        let refs = parse_statement("DELETE FROM sessions WHERE user_id = OLD.id").unwrap();
        assert_eq!(refs.table, "sessions");
        assert!(refs.columns.is_empty());
    }

    #[test]
    fn test_parse_select_star_skips_columns() {
        let refs = parse_statement("SELECT * FROM users WHERE id = NEW.id").unwrap();
        assert_eq!(refs.table, "users");
        assert!(refs.columns.is_empty());
    }

    #[test]
    fn test_parse_select_warns_on_join() {
        let refs =
            parse_statement("SELECT u.id FROM users u JOIN posts p ON p.user_id = u.id").unwrap();
        assert_eq!(refs.table, "users");
        assert_eq!(refs.warnings.len(), 1);
    }

    #[test]
    fn test_unrecognized_statement_is_skipped() {
        assert!(parse_statement("RAISE(ABORT, 'no')").is_none());
    }

    #[tokio::test]
    async fn test_existing_table_valid_columns() {
        let db = MemoryDatabase::new().with_table("audit", ["user_id", "action"]);
        let batch = SchemaView::default();
        let check = TriggerCheck::new(&db, &batch);

        let (verdict, warnings) = check
            .check_statement("trg", "INSERT INTO audit (user_id, action) VALUES (1, 'x')")
            .await
            .unwrap();
        assert_eq!(verdict, CheckVerdict::Valid);
        assert!(warnings.is_empty());
    }

    #[tokio::test]
    async fn test_existing_table_unknown_column_fails() {
        let db = MemoryDatabase::new().with_table("audit", ["user_id"]);
        let batch = SchemaView::default();
        let check = TriggerCheck::new(&db, &batch);

        let err = check
            .check_statement("trg", "INSERT INTO audit (user_id, action) VALUES (1, 'x')")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("audit.action"));
    }

    #[tokio::test]
    async fn test_batch_table_defers() {
        let db = MemoryDatabase::new();
        let batch = batch_with("stats", &["views"]);
        let check = TriggerCheck::new(&db, &batch);

        let (verdict, _) = check
            .check_statement("trg", "UPDATE stats SET views = views + 1")
            .await
            .unwrap();
        assert_eq!(verdict, CheckVerdict::Defer);
    }

    #[tokio::test]
    async fn test_batch_table_unknown_field_fails() {
        let db = MemoryDatabase::new();
        let batch = batch_with("stats", &["views"]);
        let check = TriggerCheck::new(&db, &batch);

        assert!(check
            .check_statement("trg", "UPDATE stats SET missing = 1")
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_unknown_table_fails() {
        let db = MemoryDatabase::new();
        let batch = SchemaView::default();
        let check = TriggerCheck::new(&db, &batch);

        let err = check
            .check_statement("trg", "DELETE FROM ghosts")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("ghosts"));
    }
}
