//! # sqlbuns-cli
//!
//! The sqlbuns command-line front-end: `create`, `up`, `down`/`rollback`,
//! and `inspectdb`. The CLI resolves the environment (`DATABASE_ENGINE`,
//! `DATABASE_URL`, `package.json`), loads the declarative model file, opens
//! the right dialect adapter, and drives the migration engine.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod loader;
pub mod output;

pub use cli::{Cli, Command};
pub use config::ProjectConfig;
pub use error::{CliError, CliResult};
