//! Trigger definitions and canonicalization.

use serde::{Deserialize, Serialize};

use crate::error::{SchemaError, SchemaResult};

/// The row event a trigger fires on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TriggerEvent {
    Insert,
    Update,
    Delete,
}

impl TriggerEvent {
    /// The SQL keyword for this event.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        }
    }

    /// The lowercase form used in canonical trigger names.
    pub fn as_lower(&self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

/// Whether a trigger fires before or after its event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TriggerTiming {
    Before,
    After,
}

impl TriggerTiming {
    /// The SQL keyword for this timing.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Before => "BEFORE",
            Self::After => "AFTER",
        }
    }

    /// The lowercase form used in canonical trigger names.
    pub fn as_lower(&self) -> &'static str {
        match self {
            Self::Before => "before",
            Self::After => "after",
        }
    }
}

/// The six trigger slots a model exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TriggerSlot {
    BeforeInsert,
    AfterInsert,
    BeforeUpdate,
    AfterUpdate,
    BeforeDelete,
    AfterDelete,
}

impl TriggerSlot {
    /// All slots, in the order they appear in the snapshot.
    pub const ALL: [TriggerSlot; 6] = [
        Self::BeforeInsert,
        Self::AfterInsert,
        Self::BeforeUpdate,
        Self::AfterUpdate,
        Self::BeforeDelete,
        Self::AfterDelete,
    ];

    /// Parse a slot from its authoring-surface name.
    pub fn parse(name: &str) -> SchemaResult<Self> {
        match name {
            "beforeInsert" => Ok(Self::BeforeInsert),
            "afterInsert" => Ok(Self::AfterInsert),
            "beforeUpdate" => Ok(Self::BeforeUpdate),
            "afterUpdate" => Ok(Self::AfterUpdate),
            "beforeDelete" => Ok(Self::BeforeDelete),
            "afterDelete" => Ok(Self::AfterDelete),
            other => Err(SchemaError::invalid_trigger(
                other,
                "slot must be one of beforeInsert, afterInsert, beforeUpdate, \
                 afterUpdate, beforeDelete, afterDelete",
            )),
        }
    }

    /// The slot's authoring-surface name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BeforeInsert => "beforeInsert",
            Self::AfterInsert => "afterInsert",
            Self::BeforeUpdate => "beforeUpdate",
            Self::AfterUpdate => "afterUpdate",
            Self::BeforeDelete => "beforeDelete",
            Self::AfterDelete => "afterDelete",
        }
    }

    /// The timing this slot implies.
    pub fn timing(&self) -> TriggerTiming {
        match self {
            Self::BeforeInsert | Self::BeforeUpdate | Self::BeforeDelete => TriggerTiming::Before,
            Self::AfterInsert | Self::AfterUpdate | Self::AfterDelete => TriggerTiming::After,
        }
    }

    /// The event this slot implies.
    pub fn event(&self) -> TriggerEvent {
        match self {
            Self::BeforeInsert | Self::AfterInsert => TriggerEvent::Insert,
            Self::BeforeUpdate | Self::AfterUpdate => TriggerEvent::Update,
            Self::BeforeDelete | Self::AfterDelete => TriggerEvent::Delete,
        }
    }
}

impl std::fmt::Display for TriggerSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One statement of a trigger: a body, optionally guarded by a row predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerStatement {
    /// The statement body.
    pub body: String,
    /// Optional row predicate (`WHEN` clause content).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<String>,
}

impl TriggerStatement {
    /// A bare statement with no predicate.
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            when: None,
        }
    }

    /// A statement guarded by a row predicate.
    pub fn when(body: impl Into<String>, when: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            when: Some(when.into()),
        }
    }
}

/// A trigger attached to a model slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trigger {
    pub timing: TriggerTiming,
    pub event: TriggerEvent,
    /// Ordered statements; each becomes its own trigger instance.
    pub statements: Vec<TriggerStatement>,
}

impl Trigger {
    /// Build a trigger for a slot from its statements.
    pub fn for_slot(slot: TriggerSlot, statements: Vec<TriggerStatement>) -> Self {
        Self {
            timing: slot.timing(),
            event: slot.event(),
            statements,
        }
    }

    /// The base name shared by this trigger's per-statement instances:
    /// `trg_<table>_<event>_<timing>`.
    pub fn base_name(&self, table: &str) -> String {
        format!(
            "trg_{}_{}_{}",
            table,
            self.event.as_lower(),
            self.timing.as_lower()
        )
    }

    /// The canonical name of the i-th statement's trigger instance.
    pub fn statement_name(&self, table: &str, index: usize) -> String {
        format!("{}_{}", self.base_name(table), index)
    }

    /// The canonical snapshot view: statements normalized for stable hashing.
    pub fn view(&self) -> Trigger {
        Trigger {
            timing: self.timing,
            event: self.event,
            statements: self
                .statements
                .iter()
                .map(|s| TriggerStatement {
                    body: canonical_statement(&s.body),
                    when: s.when.as_ref().map(|w| w.trim().to_string()),
                })
                .collect(),
        }
    }
}

/// Normalize a trigger statement body for stable hashing.
///
/// Outer quotes and backticks are stripped, whitespace runs collapse to a
/// single space, trailing semicolons collapse to exactly one, and double
/// quotes are rewritten to single quotes so the stored form is
/// dialect-neutral. The emitted DDL always uses the original text.
pub fn canonical_statement(body: &str) -> String {
    let mut text = body.trim();

    // Strip one layer of enclosing quotes or backticks.
    for quote in ['\'', '"', '`'] {
        if text.len() >= 2 && text.starts_with(quote) && text.ends_with(quote) {
            text = &text[1..text.len() - 1];
            break;
        }
    }

    let collapsed: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let trimmed = collapsed.trim_end_matches([';', ' ']);

    let mut out = trimmed.replace('"', "'");
    out.push(';');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_parse_round_trip() {
        for slot in TriggerSlot::ALL {
            assert_eq!(TriggerSlot::parse(slot.as_str()).unwrap(), slot);
        }
        assert!(TriggerSlot::parse("onInsert").is_err());
    }

    #[test]
    fn test_slot_timing_and_event() {
        assert_eq!(TriggerSlot::AfterInsert.timing(), TriggerTiming::After);
        assert_eq!(TriggerSlot::AfterInsert.event(), TriggerEvent::Insert);
        assert_eq!(TriggerSlot::BeforeDelete.timing(), TriggerTiming::Before);
        assert_eq!(TriggerSlot::BeforeDelete.event(), TriggerEvent::Delete);
    }

    #[test]
    fn test_statement_names() {
        let trg = Trigger::for_slot(
            TriggerSlot::AfterInsert,
            vec![TriggerStatement::new("UPDATE stats SET n = n + 1")],
        );
        assert_eq!(trg.base_name("users"), "trg_users_insert_after");
        assert_eq!(trg.statement_name("users", 0), "trg_users_insert_after_0");
    }

    #[test]
    fn test_canonical_statement_collapses_whitespace() {
        assert_eq!(
            canonical_statement("UPDATE   t\n  SET a = 1"),
            "UPDATE t SET a = 1;"
        );
    }

    #[test]
    fn test_canonical_statement_semicolons() {
        assert_eq!(canonical_statement("DELETE FROM t;;;"), "DELETE FROM t;");
        assert_eq!(canonical_statement("DELETE FROM t"), "DELETE FROM t;");
    }

    #[test]
    fn test_canonical_statement_quotes() {
        // Outer backticks stripped, inner double quotes become single quotes.
        assert_eq!(
            canonical_statement("`UPDATE t SET a = \"x\"`"),
            "UPDATE t SET a = 'x';"
        );
        // Inner single quotes preserved.
        assert_eq!(
            canonical_statement("UPDATE t SET a = 'x'"),
            "UPDATE t SET a = 'x';"
        );
    }

    #[test]
    fn test_view_normalizes_statements() {
        let trg = Trigger::for_slot(
            TriggerSlot::AfterUpdate,
            vec![TriggerStatement::when("UPDATE  t SET a = \"x\";;", " NEW.a <> OLD.a ")],
        );
        let view = trg.view();
        assert_eq!(view.statements[0].body, "UPDATE t SET a = 'x';");
        assert_eq!(view.statements[0].when.as_deref(), Some("NEW.a <> OLD.a"));
    }
}
