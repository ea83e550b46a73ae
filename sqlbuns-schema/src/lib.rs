//! # sqlbuns-schema
//!
//! The in-memory schema model for the sqlbuns migration engine.
//!
//! This crate defines the entities a host program declares (models, fields,
//! relations, indexes, triggers) together with their validation rules and
//! the canonical snapshot views the differ and checksum protocol consume.
//!
//! Entities are constructed through validating constructors and frozen when a
//! [`Schema`] is built; nothing here touches a database or the filesystem.
//!
//! ```rust
//! use sqlbuns_schema::{Field, FieldKind, Model, Schema};
//!
//! let users = Model::new("users")
//!     .field("id", Field::new(FieldKind::Integer).primary_key().auto_increment())
//!     .field("email", Field::new(FieldKind::varchar()).unique());
//!
//! let schema = Schema::from_models([("users", users)]).unwrap();
//! assert_eq!(schema.view().0["users"].table(), "users");
//! ```

pub mod error;
pub mod field;
pub mod model;
pub mod params;
pub mod relation;
pub mod trigger;

pub use error::{SchemaError, SchemaResult};
pub use field::{Field, FieldKind, FieldView};
pub use model::{Model, ModelMeta, ModelView, Schema, SchemaView};
pub use params::{assert_params, ParamRule, ParamType};
pub use relation::{Index, Relation, RelationKind};
pub use trigger::{
    canonical_statement, Trigger, TriggerEvent, TriggerSlot, TriggerStatement, TriggerTiming,
};
