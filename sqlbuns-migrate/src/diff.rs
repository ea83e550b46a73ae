//! The schema differ.
//!
//! `diff(old, current)` walks the current schema in topological order and
//! emits forward DDL plus its exact inverse, so that applying the forward
//! list and then the reverse list returns the database to `old`. Statement
//! groups are collected as (forward, reverse) pairs; the reverse list is the
//! pairs' inverses in reverse order.
//!
//! Per-table emission order is fixed: create-table, meta (rename, indexes),
//! field diff, non-deferred relations, triggers. Dropped tables follow all
//! current models, and deferred work (relations and triggers whose referents
//! were created in this batch) comes last.

use std::collections::HashSet;

use indexmap::IndexMap;
use tracing::debug;

use sqlbuns_db::{Database, Introspect, RenameKind, RenameOracle};
use sqlbuns_schema::{
    FieldKind, FieldView, ModelView, Relation, RelationKind, SchemaError, SchemaView, Trigger,
};

use crate::dialect::{enum_type_name, Dialect};
use crate::error::MigrateResult;
use crate::rebuild;
use crate::trigger_check::{CheckVerdict, TriggerCheck};

/// The differ's output: ordered forward DDL, its exact inverse, and
/// non-blocking warnings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiffReport {
    pub forward: Vec<String>,
    pub reverse: Vec<String>,
    pub warnings: Vec<String>,
}

impl DiffReport {
    /// Check if the diff is empty.
    pub fn is_empty(&self) -> bool {
        self.forward.is_empty() && self.reverse.is_empty() && self.warnings.is_empty()
    }

    /// A one-line human summary.
    pub fn summary(&self) -> String {
        if self.forward.is_empty() {
            "No changes".to_string()
        } else {
            format!(
                "{} forward statements, {} reverse statements, {} warnings",
                self.forward.len(),
                self.reverse.len(),
                self.warnings.len()
            )
        }
    }
}

/// A statement group paired with its inverse.
type Op = (Vec<String>, Vec<String>);

#[derive(Debug, Clone, Copy, PartialEq)]
enum Decision {
    CreateNow,
    Defer,
}

/// Relation work planned for one model before emission starts, so a new
/// table's CREATE can inline the foreign keys of deferred relations.
#[derive(Default)]
struct RelationPlan {
    /// Table-level FOREIGN KEY clauses inlined into this model's CREATE.
    inline_clauses: Vec<String>,
    /// Ops emitted in this model's relation slot.
    immediate: Vec<Op>,
    /// Ops emitted after every table of the batch.
    deferred: Vec<Op>,
    /// SQLite only: a constraint change on an existing table forces a
    /// rebuild.
    needs_rebuild: bool,
}

struct Pairing<'v> {
    key: &'v String,
    cur: &'v ModelView,
    old: Option<&'v ModelView>,
    /// The old effective table name when the pair was matched by model key
    /// and the effective name changed.
    renamed_from: Option<String>,
}

/// Computes forward and reverse DDL between two schema views.
pub struct SchemaDiffer<'a> {
    dialect: Dialect,
    db: &'a dyn Database,
    introspect: &'a dyn Introspect,
    oracle: &'a dyn RenameOracle,
}

impl<'a> SchemaDiffer<'a> {
    /// Create a differ.
    pub fn new(
        dialect: Dialect,
        db: &'a dyn Database,
        introspect: &'a dyn Introspect,
        oracle: &'a dyn RenameOracle,
    ) -> Self {
        Self {
            dialect,
            db,
            introspect,
            oracle,
        }
    }

    /// Diff two schema views. `current` must already be in topological order.
    pub async fn diff(&self, old: &SchemaView, current: &SchemaView) -> MigrateResult<DiffReport> {
        let mut ops: Vec<Op> = Vec::new();
        let mut deferred: Vec<Op> = Vec::new();
        let mut warnings: Vec<String> = Vec::new();
        let check = TriggerCheck::new(self.introspect, current);

        let pairings: Vec<Pairing> = current
            .0
            .iter()
            .map(|(key, cur)| {
                let table = cur.table();
                if let Some((_, old_model)) = old.by_table(table) {
                    Pairing {
                        key,
                        cur,
                        old: Some(old_model),
                        renamed_from: None,
                    }
                } else if let Some(old_model) = old.by_key(key) {
                    Pairing {
                        key,
                        cur,
                        old: Some(old_model),
                        renamed_from: Some(old_model.table().to_string()),
                    }
                } else {
                    Pairing {
                        key,
                        cur,
                        old: None,
                        renamed_from: None,
                    }
                }
            })
            .collect();

        let mut claimed: HashSet<String> = HashSet::new();

        for pairing in &pairings {
            let plan = self.plan_relations(pairing, current).await?;
            match pairing.old {
                None => {
                    self.emit_new_table(pairing, plan, &check, &mut ops, &mut deferred, &mut warnings)
                        .await?;
                }
                Some(old_model) => {
                    claimed.insert(old_model.table().to_string());
                    self.emit_existing_table(
                        pairing,
                        old_model,
                        plan,
                        current,
                        &check,
                        &mut ops,
                        &mut deferred,
                        &mut warnings,
                    )
                    .await?;
                }
            }
        }

        // Dropped tables: anything in the old snapshot no current model claims.
        for (_, old_model) in &old.0 {
            let table = old_model.table();
            if claimed.contains(table) {
                continue;
            }
            let regenerated = create_table_sql(self.dialect, table, old_model, &[])?;
            ops.push((
                vec![format!("DROP TABLE IF EXISTS {table};")],
                vec![regenerated],
            ));
            warnings.push(format!(
                "table `{table}` is dropped; the reverse migration recreates it empty"
            ));
        }

        ops.extend(deferred);

        let forward: Vec<String> = ops.iter().flat_map(|(f, _)| f.iter().cloned()).collect();
        let reverse: Vec<String> = ops
            .iter()
            .rev()
            .flat_map(|(_, r)| r.iter().cloned())
            .collect();

        debug!(
            forward = forward.len(),
            reverse = reverse.len(),
            "diff computed"
        );
        Ok(DiffReport {
            forward,
            reverse,
            warnings,
        })
    }

    // ------------------------------------------------------------------
    // Relations
    // ------------------------------------------------------------------

    async fn plan_relations(
        &self,
        pairing: &Pairing<'_>,
        current: &SchemaView,
    ) -> MigrateResult<RelationPlan> {
        let mut plan = RelationPlan::default();
        let table = pairing.cur.table();
        let empty = IndexMap::new();
        let old_rels = pairing.old.map(|o| &o.relations).unwrap_or(&empty);
        let old_table = pairing
            .old
            .map(|o| o.table().to_string())
            .unwrap_or_else(|| table.to_string());

        for (name, old_rel) in old_rels {
            if pairing.cur.relations.get(name) != Some(old_rel) {
                self.plan_removal(&mut plan, &old_table, table, pairing, old_rel, current);
            }
        }

        for (name, rel) in &pairing.cur.relations {
            if old_rels.get(name) == Some(rel) {
                continue;
            }
            self.plan_addition(&mut plan, pairing, rel, current).await?;
        }

        Ok(plan)
    }

    fn plan_removal(
        &self,
        plan: &mut RelationPlan,
        old_table: &str,
        table: &str,
        pairing: &Pairing<'_>,
        rel: &Relation,
        current: &SchemaView,
    ) {
        let base = resolve_target_table(current, &rel.target);
        match rel.kind {
            RelationKind::HasOne | RelationKind::HasMany => {
                if !self.dialect.supports_add_constraint() {
                    plan.needs_rebuild = true;
                    return;
                }
                let fk = rel.foreign_key.as_str();
                let constraint = format!("fk_{old_table}_{fk}");
                let index = format!("idx_{old_table}_{fk}");
                plan.immediate.push((
                    vec![
                        self.dialect.drop_index(&index, table),
                        self.dialect.drop_constraint(table, &constraint),
                    ],
                    vec![
                        format!(
                            "ALTER TABLE {table} ADD CONSTRAINT {constraint} \
                             FOREIGN KEY({fk}) REFERENCES {base}(id);"
                        ),
                        self.dialect.create_index(&index, table, &[fk], false, true),
                    ],
                ));
            }
            RelationKind::ManyToMany => {
                let owner_name = pairing
                    .old
                    .map(|o| o.name.as_str())
                    .unwrap_or(pairing.cur.name.as_str());
                let through = rel.through_table(owner_name);
                let recreate = self.through_table_sql(&through, rel, &base, old_table);
                plan.immediate.push((
                    vec![format!("DROP TABLE IF EXISTS {through};")],
                    vec![recreate],
                ));
            }
        }
    }

    async fn plan_addition(
        &self,
        plan: &mut RelationPlan,
        pairing: &Pairing<'_>,
        rel: &Relation,
        current: &SchemaView,
    ) -> MigrateResult<()> {
        let table = pairing.cur.table();
        let owner_is_new = pairing.old.is_none();
        let batch_target = current.0.values().find(|m| m.name == rel.target);
        let base = resolve_target_table(current, &rel.target);
        let decision = self.decide(rel, &base, batch_target).await?;

        match rel.kind {
            RelationKind::HasOne | RelationKind::HasMany => {
                let fk = rel.foreign_key.as_str();
                let index_op = (
                    vec![self
                        .dialect
                        .create_index(&format!("idx_{table}_{fk}"), table, &[fk], false, true)],
                    vec![self.dialect.drop_index(&format!("idx_{table}_{fk}"), table)],
                );

                let inline = owner_is_new
                    && (decision == Decision::Defer || !self.dialect.supports_add_constraint());
                if inline {
                    plan.inline_clauses
                        .push(format!("FOREIGN KEY({fk}) REFERENCES {base}(id)"));
                    plan.immediate.push(index_op);
                } else if !self.dialect.supports_add_constraint() {
                    // Existing SQLite table: constraints only exist inline.
                    plan.needs_rebuild = true;
                } else {
                    let constraint = format!("fk_{table}_{fk}");
                    let op = (
                        vec![
                            format!(
                                "ALTER TABLE {table} ADD CONSTRAINT {constraint} \
                                 FOREIGN KEY({fk}) REFERENCES {base}(id);"
                            ),
                            index_op.0[0].clone(),
                        ],
                        vec![
                            index_op.1[0].clone(),
                            self.dialect.drop_constraint(table, &constraint),
                        ],
                    );
                    match decision {
                        Decision::CreateNow => plan.immediate.push(op),
                        Decision::Defer => plan.deferred.push(op),
                    }
                }
            }
            RelationKind::ManyToMany => {
                let through = rel.through_table(&pairing.cur.name);
                let op = (
                    vec![self.through_table_sql(&through, rel, &base, table)],
                    vec![format!("DROP TABLE IF EXISTS {through};")],
                );
                match decision {
                    Decision::CreateNow => plan.immediate.push(op),
                    Decision::Defer => plan.deferred.push(op),
                }
            }
        }
        Ok(())
    }

    /// The decision table: create the constraint now, defer it until the
    /// batch's tables exist, or reject the relation.
    async fn decide(
        &self,
        rel: &Relation,
        base_table: &str,
        batch_target: Option<&ModelView>,
    ) -> MigrateResult<Decision> {
        let target_defines_key = batch_target
            .map(|m| m.fields.contains_key("id"))
            .unwrap_or(false);

        if self.introspect.table_exists(base_table).await {
            if self.introspect.column_exists(base_table, "id").await {
                return Ok(Decision::CreateNow);
            }
            if batch_target.is_some() {
                if target_defines_key {
                    return Ok(Decision::Defer);
                }
                return Err(SchemaError::invalid_schema(format!(
                    "relation target `{}` does not define key `id`",
                    rel.target
                ))
                .into());
            }
            return Err(SchemaError::invalid_schema(format!(
                "relation target table `{base_table}` has no `id` column"
            ))
            .into());
        }

        if batch_target.is_some() {
            if target_defines_key {
                return Ok(Decision::Defer);
            }
            return Err(SchemaError::invalid_schema(format!(
                "relation target `{}` does not define key `id`",
                rel.target
            ))
            .into());
        }

        Err(SchemaError::invalid_schema(format!(
            "relation target `{}` exists neither in the database nor in the batch",
            rel.target
        ))
        .into())
    }

    fn through_table_sql(&self, through: &str, rel: &Relation, base: &str, owner: &str) -> String {
        let fk = rel.foreign_key.as_str();
        let other = rel.other_key.as_deref().unwrap_or("other_id");
        format!(
            "CREATE TABLE IF NOT EXISTS {through}({fk} INTEGER REFERENCES {base}(id), \
             {other} INTEGER REFERENCES {owner}(id), PRIMARY KEY({fk},{other}));"
        )
    }

    // ------------------------------------------------------------------
    // Tables
    // ------------------------------------------------------------------

    async fn emit_new_table(
        &self,
        pairing: &Pairing<'_>,
        plan: RelationPlan,
        check: &TriggerCheck<'_>,
        ops: &mut Vec<Op>,
        deferred: &mut Vec<Op>,
        warnings: &mut Vec<String>,
    ) -> MigrateResult<()> {
        let table = pairing.cur.table();

        for (name, field) in &pairing.cur.fields {
            if let Some(prelude) = self.dialect.enum_prelude(&field.kind, table, name) {
                ops.push((vec![prelude], vec![self.enum_drop(&field.kind, table, name)]));
            }
        }

        let create = create_table_sql(self.dialect, table, pairing.cur, &plan.inline_clauses)?;
        ops.push((vec![create], vec![format!("DROP TABLE IF EXISTS {table};")]));

        for index in &pairing.cur.indexes {
            ops.push(self.index_op(table, index));
        }

        ops.extend(plan.immediate);
        deferred.extend(plan.deferred);

        for trigger in pairing.cur.triggers.values() {
            let (verdict, trigger_warnings) = check
                .check_statements(&trigger.base_name(table), &trigger.statements)
                .await?;
            warnings.extend(trigger_warnings);
            let op = self.create_trigger_op(table, trigger);
            match verdict {
                CheckVerdict::Valid => ops.push(op),
                CheckVerdict::Defer => deferred.push(op),
            }
        }

        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn emit_existing_table(
        &self,
        pairing: &Pairing<'_>,
        old_model: &ModelView,
        plan: RelationPlan,
        current: &SchemaView,
        check: &TriggerCheck<'_>,
        ops: &mut Vec<Op>,
        deferred: &mut Vec<Op>,
        warnings: &mut Vec<String>,
    ) -> MigrateResult<()> {
        let table = pairing.cur.table();
        let old_table = pairing.renamed_from.clone().unwrap_or_else(|| table.to_string());

        if let Some(from) = &pairing.renamed_from {
            ops.push((
                vec![format!("ALTER TABLE {from} RENAME TO {table};")],
                vec![format!("ALTER TABLE {table} RENAME TO {from};")],
            ));
        }

        // Classify columns.
        let mut dropped: Vec<(&String, &FieldView)> = old_model
            .fields
            .iter()
            .filter(|(name, _)| !pairing.cur.fields.contains_key(*name))
            .collect();
        let mut added: Vec<(&String, &FieldView)> = pairing
            .cur
            .fields
            .iter()
            .filter(|(name, _)| !old_model.fields.contains_key(*name))
            .collect();
        let modified: Vec<(&String, &FieldView, &FieldView)> = pairing
            .cur
            .fields
            .iter()
            .filter_map(|(name, new_field)| {
                old_model.fields.get(name).and_then(|old_field| {
                    let changed = old_field.kind != new_field.kind
                        || old_field.nullable != new_field.nullable
                        || old_field.default != new_field.default;
                    changed.then_some((name, old_field, new_field))
                })
            })
            .collect();

        // Rename detection: candidate pairs with identical shape, confirmed
        // by the oracle.
        let mut renames: Vec<(String, String)> = Vec::new();
        added.retain(|(new_name, new_field)| {
            let candidate = dropped.iter().position(|(old_name, old_field)| {
                old_field.same_shape(new_field)
                    && self
                        .oracle
                        .confirm_rename(table, old_name, new_name, RenameKind::Column)
            });
            match candidate {
                Some(pos) => {
                    renames.push((dropped[pos].0.clone(), (*new_name).clone()));
                    dropped.remove(pos);
                    false
                }
                None => true,
            }
        });

        let constrained_add = added
            .iter()
            .any(|(_, field)| !self.dialect.supports_add_column(field));
        let needs_rebuild = self.dialect == Dialect::Sqlite
            && (plan.needs_rebuild || !modified.is_empty() || !dropped.is_empty() || constrained_add);

        if needs_rebuild {
            let new_fks = fk_clauses(pairing.cur, current);
            let old_fks = fk_clauses(old_model, current);
            let rebuilt = rebuild::rebuild_table(
                self.db,
                self.dialect,
                table,
                old_model,
                pairing.cur,
                &renames,
                &new_fks,
                &old_fks,
            )
            .await?;
            warnings.extend(rebuilt.warnings);
            ops.push((rebuilt.forward, rebuilt.reverse));

            // Join tables are separate objects; their ops still apply.
            ops.extend(plan.immediate);
            deferred.extend(plan.deferred);
            return Ok(());
        }

        // Meta: index diff by effective name.
        let old_indexes: Vec<(String, &sqlbuns_schema::Index)> = old_model
            .indexes
            .iter()
            .map(|i| (i.effective_name(&old_table), i))
            .collect();
        let cur_indexes: Vec<(String, &sqlbuns_schema::Index)> = pairing
            .cur
            .indexes
            .iter()
            .map(|i| (i.effective_name(table), i))
            .collect();

        for (name, index) in &cur_indexes {
            if !old_indexes.iter().any(|(old_name, _)| old_name == name) {
                ops.push(self.index_op(table, index));
            }
        }
        for (name, index) in &old_indexes {
            if !cur_indexes.iter().any(|(cur_name, _)| cur_name == name) {
                let columns: Vec<&str> = index.fields.iter().map(|f| f.as_str()).collect();
                ops.push((
                    vec![self.dialect.drop_index(name, table)],
                    vec![self
                        .dialect
                        .create_index(name, table, &columns, index.unique, false)],
                ));
            }
        }

        // Fields: renames, drops, adds, modifies.
        for (old_name, new_name) in &renames {
            ops.push((
                vec![format!(
                    "ALTER TABLE {table} RENAME COLUMN {old_name} TO {new_name};"
                )],
                vec![format!(
                    "ALTER TABLE {table} RENAME COLUMN {new_name} TO {old_name};"
                )],
            ));
        }

        for (name, field) in &dropped {
            ops.push((
                vec![format!("ALTER TABLE {table} DROP COLUMN {name};")],
                vec![format!(
                    "ALTER TABLE {table} ADD COLUMN {};",
                    self.dialect.column_def(table, name, field, false)
                )],
            ));
        }

        for (name, field) in &added {
            if !field.nullable && field.default.is_none() {
                warnings.push(format!(
                    "column `{table}.{name}` is NOT NULL without a default; \
                     the migration fails if the table has rows"
                ));
            }
            if let Some(prelude) = self.dialect.enum_prelude(&field.kind, table, name) {
                ops.push((vec![prelude], vec![self.enum_drop(&field.kind, table, name)]));
            }
            ops.push((
                vec![format!(
                    "ALTER TABLE {table} ADD COLUMN {};",
                    self.dialect.column_def(table, name, field, false)
                )],
                vec![format!("ALTER TABLE {table} DROP COLUMN {name};")],
            ));
        }

        for (name, old_field, new_field) in &modified {
            ops.extend(self.modify_ops(table, name, old_field, new_field));
        }

        ops.extend(plan.immediate);
        deferred.extend(plan.deferred);

        self.diff_triggers(
            table, &old_table, old_model, pairing.cur, check, ops, deferred, warnings,
        )
        .await?;

        Ok(())
    }

    // ------------------------------------------------------------------
    // Columns
    // ------------------------------------------------------------------

    /// Separate ALTER statements per changed aspect: type, nullability,
    /// default. Each carries its own inverse.
    fn modify_ops(
        &self,
        table: &str,
        column: &str,
        old: &FieldView,
        new: &FieldView,
    ) -> Vec<Op> {
        let mut ops = Vec::new();
        let type_changed = old.kind != new.kind;
        let null_changed = old.nullable != new.nullable;
        let default_changed = old.default != new.default;

        match self.dialect {
            Dialect::Postgres => {
                if type_changed {
                    let new_type = self.dialect.column_type(&new.kind, table, column);
                    let old_type = self.dialect.column_type(&old.kind, table, column);
                    ops.push((
                        vec![format!(
                            "ALTER TABLE {table} ALTER COLUMN {column} TYPE {new_type};"
                        )],
                        vec![format!(
                            "ALTER TABLE {table} ALTER COLUMN {column} TYPE {old_type};"
                        )],
                    ));
                }
                if null_changed {
                    let (forward, reverse) = if new.nullable {
                        ("DROP NOT NULL", "SET NOT NULL")
                    } else {
                        ("SET NOT NULL", "DROP NOT NULL")
                    };
                    ops.push((
                        vec![format!("ALTER TABLE {table} ALTER COLUMN {column} {forward};")],
                        vec![format!("ALTER TABLE {table} ALTER COLUMN {column} {reverse};")],
                    ));
                }
            }
            Dialect::MySql => {
                if type_changed || null_changed {
                    ops.push((
                        vec![format!(
                            "ALTER TABLE {table} MODIFY COLUMN {};",
                            self.modify_def(table, column, new)
                        )],
                        vec![format!(
                            "ALTER TABLE {table} MODIFY COLUMN {};",
                            self.modify_def(table, column, old)
                        )],
                    ));
                }
            }
            // SQLite cannot ALTER COLUMN; the caller rebuilds instead.
            Dialect::Sqlite => {}
        }

        if default_changed && self.dialect != Dialect::Sqlite {
            let set = |field: &FieldView| match &field.default {
                Some(default) => format!(
                    "ALTER TABLE {table} ALTER COLUMN {column} SET DEFAULT {};",
                    self.dialect.render_default(default)
                ),
                None => format!("ALTER TABLE {table} ALTER COLUMN {column} DROP DEFAULT;"),
            };
            ops.push((vec![set(new)], vec![set(old)]));
        }

        ops
    }

    /// `<name> <type> [NOT NULL] [DEFAULT ...]` for MySQL MODIFY COLUMN,
    /// which restates the whole definition.
    fn modify_def(&self, table: &str, column: &str, field: &FieldView) -> String {
        let mut parts = vec![
            column.to_string(),
            self.dialect.column_type(&field.kind, table, column),
        ];
        if !field.nullable {
            parts.push("NOT NULL".to_string());
        }
        if let Some(default) = &field.default {
            parts.push(format!("DEFAULT {}", self.dialect.render_default(default)));
        }
        parts.join(" ")
    }

    // ------------------------------------------------------------------
    // Triggers
    // ------------------------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    async fn diff_triggers(
        &self,
        table: &str,
        old_table: &str,
        old_model: &ModelView,
        cur: &ModelView,
        check: &TriggerCheck<'_>,
        ops: &mut Vec<Op>,
        deferred: &mut Vec<Op>,
        warnings: &mut Vec<String>,
    ) -> MigrateResult<()> {
        // Old triggers whose slot is gone: drop every instance.
        for (slot, old_trigger) in &old_model.triggers {
            if !cur.triggers.contains_key(slot) {
                ops.push(self.drop_trigger_op(old_table, old_trigger));
            }
        }

        for (slot, trigger) in &cur.triggers {
            let old_trigger = old_model.triggers.get(slot);
            let unchanged = old_table == table
                && old_trigger.is_some_and(|o| o.statements == trigger.statements);
            if unchanged {
                continue;
            }

            let (verdict, trigger_warnings) = check
                .check_statements(&trigger.base_name(table), &trigger.statements)
                .await?;
            warnings.extend(trigger_warnings);

            let mut forward = Vec::new();
            let mut reverse = Vec::new();

            if let Some(old_trigger) = old_trigger {
                for i in 0..old_trigger.statements.len() {
                    forward.extend(
                        self.dialect
                            .drop_trigger(old_table, &old_trigger.statement_name(old_table, i)),
                    );
                }
            }
            for (i, statement) in trigger.statements.iter().enumerate() {
                forward.extend(self.dialect.create_trigger(
                    table,
                    &trigger.statement_name(table, i),
                    trigger.timing,
                    trigger.event,
                    &statement.body,
                    statement.when.as_deref(),
                ));
            }

            for i in 0..trigger.statements.len() {
                reverse.extend(
                    self.dialect
                        .drop_trigger(table, &trigger.statement_name(table, i)),
                );
            }
            if let Some(old_trigger) = old_trigger {
                for (i, statement) in old_trigger.statements.iter().enumerate() {
                    reverse.extend(self.dialect.create_trigger(
                        old_table,
                        &old_trigger.statement_name(old_table, i),
                        old_trigger.timing,
                        old_trigger.event,
                        &statement.body,
                        statement.when.as_deref(),
                    ));
                }
            }

            match verdict {
                CheckVerdict::Valid => ops.push((forward, reverse)),
                CheckVerdict::Defer => deferred.push((forward, reverse)),
            }
        }

        Ok(())
    }

    fn create_trigger_op(&self, table: &str, trigger: &Trigger) -> Op {
        let mut forward = Vec::new();
        let mut reverse = Vec::new();
        for (i, statement) in trigger.statements.iter().enumerate() {
            let name = trigger.statement_name(table, i);
            forward.extend(self.dialect.create_trigger(
                table,
                &name,
                trigger.timing,
                trigger.event,
                &statement.body,
                statement.when.as_deref(),
            ));
            reverse.extend(self.dialect.drop_trigger(table, &name));
        }
        (forward, reverse)
    }

    fn drop_trigger_op(&self, table: &str, trigger: &Trigger) -> Op {
        let mut forward = Vec::new();
        let mut reverse = Vec::new();
        for (i, statement) in trigger.statements.iter().enumerate() {
            let name = trigger.statement_name(table, i);
            forward.extend(self.dialect.drop_trigger(table, &name));
            reverse.extend(self.dialect.create_trigger(
                table,
                &name,
                trigger.timing,
                trigger.event,
                &statement.body,
                statement.when.as_deref(),
            ));
        }
        (forward, reverse)
    }

    fn index_op(&self, table: &str, index: &sqlbuns_schema::Index) -> Op {
        let name = index.effective_name(table);
        let columns: Vec<&str> = index.fields.iter().map(|f| f.as_str()).collect();
        (
            vec![self
                .dialect
                .create_index(&name, table, &columns, index.unique, false)],
            vec![self.dialect.drop_index(&name, table)],
        )
    }

    fn enum_drop(&self, kind: &FieldKind, table: &str, column: &str) -> String {
        let name = match kind {
            FieldKind::Enum {
                type_name: Some(name),
                ..
            } => name.clone(),
            FieldKind::Enum { choices, .. } => enum_type_name(table, column, choices),
            _ => unreachable!("enum_drop called for a non-enum column"),
        };
        format!("DROP TYPE IF EXISTS {name};")
    }
}

/// Resolve a relation target (a model name) to its effective table: the
/// batch model of that name if present, else the target string itself.
fn resolve_target_table(current: &SchemaView, target: &str) -> String {
    current
        .0
        .values()
        .find(|m| m.name == target)
        .map(|m| m.table().to_string())
        .unwrap_or_else(|| target.to_string())
}

/// Table-level FOREIGN KEY clauses for every to-one relation of a model.
/// SQLite rebuilds need the full set, since constraints only exist inline.
fn fk_clauses(model: &ModelView, current: &SchemaView) -> Vec<String> {
    model
        .relations
        .values()
        .filter(|rel| matches!(rel.kind, RelationKind::HasOne | RelationKind::HasMany))
        .map(|rel| {
            let base = resolve_target_table(current, &rel.target);
            format!("FOREIGN KEY({}) REFERENCES {base}(id)", rel.foreign_key)
        })
        .collect()
}

/// Render a CREATE TABLE statement: every column, the primary-key form, and
/// any table-level foreign-key clauses.
///
/// The single-column auto-increment key is inlined where the dialect supports
/// it; any other key becomes an explicit `PRIMARY KEY (...)` clause. A
/// composite key combined with auto-increment is rejected.
pub(crate) fn create_table_sql(
    dialect: Dialect,
    table: &str,
    model: &ModelView,
    extra_clauses: &[String],
) -> MigrateResult<String> {
    let pk = model.primary_key_fields();
    let has_auto = model.fields.values().any(|f| f.auto_increment);
    if has_auto && pk.len() > 1 {
        return Err(SchemaError::invalid_schema(format!(
            "model `{}` combines auto-increment with a composite primary key",
            model.name
        ))
        .into());
    }
    let inline_pk = has_auto && pk.len() == 1;

    let mut parts: Vec<String> = model
        .fields
        .iter()
        .map(|(name, field)| {
            dialect.column_def(table, name, field, inline_pk && field.auto_increment)
        })
        .collect();

    if !pk.is_empty() && !inline_pk {
        parts.push(format!("PRIMARY KEY ({})", pk.join(", ")));
    }
    parts.extend(extra_clauses.iter().cloned());

    Ok(format!(
        "CREATE TABLE IF NOT EXISTS \"{table}\" ( {} );",
        parts.join(", ")
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sqlbuns_db::memory::MemoryDatabase;
    use sqlbuns_db::{FixedRenames, NoPrompt};
    use sqlbuns_schema::{
        Field, FieldKind, Index, Model, ModelMeta, Relation, Schema, TriggerSlot, TriggerStatement,
    };

    fn view(models: Vec<(&str, Model)>) -> SchemaView {
        Schema::from_models(models).unwrap().view()
    }

    fn users_model() -> Model {
        Model::new("users")
            .field(
                "id",
                Field::new(FieldKind::Integer).primary_key().auto_increment(),
            )
            .field("email", Field::new(FieldKind::varchar()).unique())
            .field(
                "level",
                Field::new(FieldKind::enumeration(["A", "B"])).with_default(json!("A")),
            )
    }

    async fn run_diff(
        dialect: Dialect,
        db: &MemoryDatabase,
        oracle: &dyn RenameOracle,
        old: &SchemaView,
        current: &SchemaView,
    ) -> DiffReport {
        SchemaDiffer::new(dialect, db, db, oracle)
            .diff(old, current)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_new_single_table_sqlite() {
        let db = MemoryDatabase::new();
        let old = SchemaView::default();
        let current = view(vec![("users", users_model())]);

        let report = run_diff(Dialect::Sqlite, &db, &NoPrompt, &old, &current).await;
        assert_eq!(
            report.forward,
            ["CREATE TABLE IF NOT EXISTS \"users\" ( \
              id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL, \
              email VARCHAR UNIQUE NOT NULL, \
              level TEXT CHECK(level IN ('A','B')) NOT NULL DEFAULT 'A' );"]
        );
        assert_eq!(report.reverse, ["DROP TABLE IF EXISTS users;"]);
        assert!(report.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_add_column_postgres() {
        let db = MemoryDatabase::new().with_table("users", ["id", "email"]);
        let base = Model::new("users")
            .field(
                "id",
                Field::new(FieldKind::Integer).primary_key().auto_increment(),
            )
            .field("email", Field::new(FieldKind::varchar()));
        let old = view(vec![("users", base.clone())]);
        let current = view(vec![(
            "users",
            base.field("age", Field::new(FieldKind::Integer).nullable()),
        )]);

        let report = run_diff(Dialect::Postgres, &db, &NoPrompt, &old, &current).await;
        assert_eq!(report.forward, ["ALTER TABLE users ADD COLUMN age INTEGER;"]);
        assert_eq!(report.reverse, ["ALTER TABLE users DROP COLUMN age;"]);
        assert!(report.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_confirmed_rename_mysql() {
        let db = MemoryDatabase::new().with_table("users", ["id", "nickname"]);
        let old = view(vec![(
            "users",
            Model::new("users")
                .field(
                    "id",
                    Field::new(FieldKind::Integer).primary_key().auto_increment(),
                )
                .field("nickname", Field::new(FieldKind::varchar())),
        )]);
        let current = view(vec![(
            "users",
            Model::new("users")
                .field(
                    "id",
                    Field::new(FieldKind::Integer).primary_key().auto_increment(),
                )
                .field("handle", Field::new(FieldKind::varchar())),
        )]);

        let oracle = FixedRenames::default().confirm("users", "nickname", "handle");
        let report = run_diff(Dialect::MySql, &db, &oracle, &old, &current).await;
        assert_eq!(
            report.forward,
            ["ALTER TABLE users RENAME COLUMN nickname TO handle;"]
        );
        assert_eq!(
            report.reverse,
            ["ALTER TABLE users RENAME COLUMN handle TO nickname;"]
        );
    }

    #[tokio::test]
    async fn test_unconfirmed_rename_is_drop_and_add() {
        let db = MemoryDatabase::new().with_table("users", ["id", "nickname"]);
        let old = view(vec![(
            "users",
            Model::new("users")
                .field("id", Field::new(FieldKind::Integer).primary_key().auto_increment())
                .field("nickname", Field::new(FieldKind::varchar()).nullable()),
        )]);
        let current = view(vec![(
            "users",
            Model::new("users")
                .field("id", Field::new(FieldKind::Integer).primary_key().auto_increment())
                .field("handle", Field::new(FieldKind::varchar()).nullable()),
        )]);

        let report = run_diff(Dialect::Postgres, &db, &NoPrompt, &old, &current).await;
        assert_eq!(
            report.forward,
            [
                "ALTER TABLE users DROP COLUMN nickname;",
                "ALTER TABLE users ADD COLUMN handle VARCHAR;",
            ]
        );
    }

    #[tokio::test]
    async fn test_deferred_fk_within_batch() {
        // posts declared before users; the FK is inlined into the posts
        // CREATE, which the topological order places after users.
        let db = MemoryDatabase::new();
        let old = SchemaView::default();

        let posts = Model::new("posts")
            .field(
                "id",
                Field::new(FieldKind::Integer).primary_key().auto_increment(),
            )
            .field("user_id", Field::new(FieldKind::Integer))
            .relation("author", Relation::has_many("users", "user_id"));
        let users = Model::new("users").field(
            "id",
            Field::new(FieldKind::Integer).primary_key().auto_increment(),
        );

        let schema = Schema::from_models([("posts", posts), ("users", users)]).unwrap();
        let sorted = crate::resolve::sort_schema(&schema).unwrap();
        let current = sorted.view();

        let report = run_diff(Dialect::Postgres, &db, &NoPrompt, &old, &current).await;
        assert!(report.forward[0].contains("CREATE TABLE IF NOT EXISTS \"users\""));
        assert!(report.forward[1].contains("CREATE TABLE IF NOT EXISTS \"posts\""));
        assert!(report.forward[1].contains("FOREIGN KEY(user_id) REFERENCES users(id)"));
        assert!(report.forward[2].contains("CREATE INDEX IF NOT EXISTS idx_posts_user_id"));
    }

    #[tokio::test]
    async fn test_relation_target_in_db_creates_now() {
        let db = MemoryDatabase::new()
            .with_table("users", ["id"])
            .with_table("posts", ["id", "user_id"]);

        let posts = Model::new("posts")
            .field(
                "id",
                Field::new(FieldKind::Integer).primary_key().auto_increment(),
            )
            .field("user_id", Field::new(FieldKind::Integer));
        let old = view(vec![("posts", posts.clone())]);
        let current = view(vec![(
            "posts",
            posts.relation("author", Relation::has_many("users", "user_id")),
        )]);

        let report = run_diff(Dialect::Postgres, &db, &NoPrompt, &old, &current).await;
        assert_eq!(
            report.forward,
            [
                "ALTER TABLE posts ADD CONSTRAINT fk_posts_user_id \
                 FOREIGN KEY(user_id) REFERENCES users(id);",
                "CREATE INDEX IF NOT EXISTS idx_posts_user_id ON posts(user_id);",
            ]
        );
        assert_eq!(
            report.reverse,
            [
                "DROP INDEX IF EXISTS idx_posts_user_id;",
                "ALTER TABLE posts DROP CONSTRAINT fk_posts_user_id;",
            ]
        );
    }

    #[tokio::test]
    async fn test_relation_error_when_target_missing_everywhere() {
        let db = MemoryDatabase::new().with_table("posts", ["id", "user_id"]);
        let posts = Model::new("posts")
            .field(
                "id",
                Field::new(FieldKind::Integer).primary_key().auto_increment(),
            )
            .field("user_id", Field::new(FieldKind::Integer));
        let old = view(vec![("posts", posts.clone())]);
        let current = view(vec![(
            "posts",
            posts.relation("author", Relation::has_many("users", "user_id")),
        )]);

        let differ = SchemaDiffer::new(Dialect::Postgres, &db, &db, &NoPrompt);
        let err = differ.diff(&old, &current).await.unwrap_err();
        assert!(err.to_string().contains("users"));
    }

    #[tokio::test]
    async fn test_relation_error_when_batch_target_lacks_key() {
        let db = MemoryDatabase::new();
        let old = SchemaView::default();
        let users = Model::new("users").field("uuid", Field::new(FieldKind::Uuid).primary_key());
        let posts = Model::new("posts")
            .field(
                "id",
                Field::new(FieldKind::Integer).primary_key().auto_increment(),
            )
            .field("user_id", Field::new(FieldKind::Integer))
            .relation("author", Relation::has_many("users", "user_id"));
        let current = view(vec![("users", users), ("posts", posts)]);

        let differ = SchemaDiffer::new(Dialect::Postgres, &db, &db, &NoPrompt);
        let err = differ.diff(&old, &current).await.unwrap_err();
        assert!(err.to_string().contains("does not define key `id`"));
    }

    #[tokio::test]
    async fn test_many_to_many_through_table() {
        let db = MemoryDatabase::new().with_table("tags", ["id"]).with_table("posts", ["id"]);
        let posts = Model::new("posts").field(
            "id",
            Field::new(FieldKind::Integer).primary_key().auto_increment(),
        );
        let old = view(vec![("posts", posts.clone())]);
        let current = view(vec![(
            "posts",
            // The foreign key points at the target, the opposite key back at
            // the owner, as with to-one relations.
            posts.relation("tags", Relation::many_to_many("tags", "tag_id", "post_id")),
        )]);

        let report = run_diff(Dialect::Postgres, &db, &NoPrompt, &old, &current).await;
        assert_eq!(
            report.forward,
            ["CREATE TABLE IF NOT EXISTS posts_tags_link(tag_id INTEGER REFERENCES tags(id), \
              post_id INTEGER REFERENCES posts(id), PRIMARY KEY(tag_id,post_id));"]
        );
        assert_eq!(report.reverse, ["DROP TABLE IF EXISTS posts_tags_link;"]);
    }

    #[tokio::test]
    async fn test_diff_identity_is_empty() {
        let db = MemoryDatabase::new();
        let current = view(vec![(
            "users",
            users_model()
                .meta(ModelMeta {
                    indexes: vec![Index::unique(["email"])],
                    ..Default::default()
                })
                .trigger(
                    TriggerSlot::AfterInsert,
                    vec![TriggerStatement::new("UPDATE users SET level = 'A'")],
                ),
        )]);

        let report = run_diff(Dialect::Postgres, &db, &NoPrompt, &current.clone(), &current).await;
        assert!(report.forward.is_empty());
        assert!(report.reverse.is_empty());
        assert!(report.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_trigger_replacement_preserves_order() {
        let db = MemoryDatabase::new().with_table("users", ["id", "email", "level"]);
        let base = || {
            Model::new("users")
                .field(
                    "id",
                    Field::new(FieldKind::Integer).primary_key().auto_increment(),
                )
                .field("email", Field::new(FieldKind::varchar()))
                .field("level", Field::new(FieldKind::varchar()).nullable())
        };
        let old = view(vec![(
            "users",
            base().trigger(
                TriggerSlot::AfterInsert,
                vec![
                    TriggerStatement::new("UPDATE users SET level = 'a'"),
                    TriggerStatement::new("UPDATE users SET level = 'b'"),
                ],
            ),
        )]);

        // Identical statements: nothing to do.
        let same = run_diff(Dialect::Sqlite, &db, &NoPrompt, &old, &old).await;
        assert!(same.forward.is_empty());

        // Second statement changes: drop both instances, recreate both.
        let current = view(vec![(
            "users",
            base().trigger(
                TriggerSlot::AfterInsert,
                vec![
                    TriggerStatement::new("UPDATE users SET level = 'a'"),
                    TriggerStatement::new("UPDATE users SET level = 'c'"),
                ],
            ),
        )]);
        let report = run_diff(Dialect::Sqlite, &db, &NoPrompt, &old, &current).await;
        assert_eq!(
            report.forward,
            [
                "DROP TRIGGER IF EXISTS trg_users_insert_after_0;",
                "DROP TRIGGER IF EXISTS trg_users_insert_after_1;",
                "CREATE TRIGGER trg_users_insert_after_0 AFTER INSERT ON users FOR EACH ROW \
                 BEGIN UPDATE users SET level = 'a'; END;",
                "CREATE TRIGGER trg_users_insert_after_1 AFTER INSERT ON users FOR EACH ROW \
                 BEGIN UPDATE users SET level = 'c'; END;",
            ]
        );
    }

    #[tokio::test]
    async fn test_dropped_table_warns_and_reverses() {
        let db = MemoryDatabase::new();
        let old = view(vec![("users", users_model())]);
        let current = SchemaView::default();

        let report = run_diff(Dialect::Sqlite, &db, &NoPrompt, &old, &current).await;
        assert_eq!(report.forward, ["DROP TABLE IF EXISTS users;"]);
        assert!(report.reverse[0].starts_with("CREATE TABLE IF NOT EXISTS \"users\""));
        assert_eq!(report.warnings.len(), 1);
    }

    #[tokio::test]
    async fn test_table_rename_via_meta() {
        let db = MemoryDatabase::new().with_table("users", ["id"]);
        let old = view(vec![(
            "users",
            Model::new("users").field(
                "id",
                Field::new(FieldKind::Integer).primary_key().auto_increment(),
            ),
        )]);
        let current = view(vec![(
            "users",
            Model::new("users")
                .field(
                    "id",
                    Field::new(FieldKind::Integer).primary_key().auto_increment(),
                )
                .meta(ModelMeta {
                    table_name: Some("app_users".into()),
                    ..Default::default()
                }),
        )]);

        let report = run_diff(Dialect::Postgres, &db, &NoPrompt, &old, &current).await;
        assert_eq!(report.forward, ["ALTER TABLE users RENAME TO app_users;"]);
        assert_eq!(report.reverse, ["ALTER TABLE app_users RENAME TO users;"]);
    }

    #[tokio::test]
    async fn test_sqlite_modify_routes_through_rebuild() {
        let db = MemoryDatabase::new().with_table("users", ["id", "age"]);
        let old = view(vec![(
            "users",
            Model::new("users")
                .field(
                    "id",
                    Field::new(FieldKind::Integer).primary_key().auto_increment(),
                )
                .field("age", Field::new(FieldKind::Integer).nullable()),
        )]);
        let current = view(vec![(
            "users",
            Model::new("users")
                .field(
                    "id",
                    Field::new(FieldKind::Integer).primary_key().auto_increment(),
                )
                .field("age", Field::new(FieldKind::Text).nullable()),
        )]);

        let report = run_diff(Dialect::Sqlite, &db, &NoPrompt, &old, &current).await;
        assert_eq!(report.forward[0], "PRAGMA foreign_keys=OFF;");
        assert!(report.forward[1].contains("CREATE TABLE IF NOT EXISTS \"users_new\""));
        assert!(report
            .forward
            .iter()
            .any(|s| s == "ALTER TABLE users_new RENAME TO users;"));
        assert!(report
            .reverse
            .iter()
            .any(|s| s.contains("CREATE TABLE IF NOT EXISTS \"users_old\"")));
    }

    #[tokio::test]
    async fn test_postgres_modify_emits_separate_alters() {
        let db = MemoryDatabase::new().with_table("users", ["id", "age"]);
        let old = view(vec![(
            "users",
            Model::new("users")
                .field(
                    "id",
                    Field::new(FieldKind::Integer).primary_key().auto_increment(),
                )
                .field("age", Field::new(FieldKind::Integer).nullable()),
        )]);
        let current = view(vec![(
            "users",
            Model::new("users")
                .field(
                    "id",
                    Field::new(FieldKind::Integer).primary_key().auto_increment(),
                )
                .field(
                    "age",
                    Field::new(FieldKind::Text).with_default(json!("0")),
                ),
        )]);

        let report = run_diff(Dialect::Postgres, &db, &NoPrompt, &old, &current).await;
        assert_eq!(
            report.forward,
            [
                "ALTER TABLE users ALTER COLUMN age TYPE TEXT;",
                "ALTER TABLE users ALTER COLUMN age SET NOT NULL;",
                "ALTER TABLE users ALTER COLUMN age SET DEFAULT '0';",
            ]
        );
        assert_eq!(
            report.reverse,
            [
                "ALTER TABLE users ALTER COLUMN age DROP DEFAULT;",
                "ALTER TABLE users ALTER COLUMN age DROP NOT NULL;",
                "ALTER TABLE users ALTER COLUMN age TYPE INTEGER;",
            ]
        );
    }

    #[tokio::test]
    async fn test_index_diff() {
        let db = MemoryDatabase::new().with_table("users", ["id", "email"]);
        let base = Model::new("users")
            .field(
                "id",
                Field::new(FieldKind::Integer).primary_key().auto_increment(),
            )
            .field("email", Field::new(FieldKind::varchar()));
        let old = view(vec![(
            "users",
            base.clone().meta(ModelMeta {
                indexes: vec![Index::new(["id"])],
                ..Default::default()
            }),
        )]);
        let current = view(vec![(
            "users",
            base.meta(ModelMeta {
                indexes: vec![Index::unique(["email"])],
                ..Default::default()
            }),
        )]);

        let report = run_diff(Dialect::Postgres, &db, &NoPrompt, &old, &current).await;
        assert_eq!(
            report.forward,
            [
                "CREATE UNIQUE INDEX idx_users_email ON users(email);",
                "DROP INDEX IF EXISTS idx_users_id;",
            ]
        );
        assert_eq!(
            report.reverse,
            [
                "CREATE INDEX idx_users_id ON users(id);",
                "DROP INDEX IF EXISTS idx_users_email;",
            ]
        );
    }

    #[tokio::test]
    async fn test_postgres_new_table_emits_enum_type() {
        let db = MemoryDatabase::new();
        let old = SchemaView::default();
        let current = view(vec![("users", users_model())]);

        let report = run_diff(Dialect::Postgres, &db, &NoPrompt, &old, &current).await;
        assert!(report.forward[0].starts_with("CREATE TYPE enum_users_level_"));
        assert!(report.forward[1].contains("level enum_users_level_"));
        assert_eq!(report.reverse[0], "DROP TABLE IF EXISTS users;");
        assert!(report.reverse[1].starts_with("DROP TYPE IF EXISTS enum_users_level_"));
    }

    #[tokio::test]
    async fn test_new_table_trigger_on_own_table_is_deferred_after_create() {
        let db = MemoryDatabase::new();
        let old = SchemaView::default();
        let current = view(vec![(
            "users",
            users_model().trigger(
                TriggerSlot::AfterInsert,
                vec![TriggerStatement::new("UPDATE users SET level = 'B'")],
            ),
        )]);

        let report = run_diff(Dialect::Sqlite, &db, &NoPrompt, &old, &current).await;
        assert!(report.forward[0].starts_with("CREATE TABLE IF NOT EXISTS \"users\""));
        assert!(report.forward[1].starts_with("CREATE TRIGGER trg_users_insert_after_0"));
    }
}
