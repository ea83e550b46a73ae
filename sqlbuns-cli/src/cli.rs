//! CLI argument definitions using clap.

use clap::{Args, Parser, Subcommand};

/// sqlbuns - declarative schema migrations for SQL databases
#[derive(Parser, Debug)]
#[command(name = "sqlbuns")]
#[command(version)]
#[command(about = "Declarative schema migrations for PostgreSQL, MySQL, and SQLite", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a migration from the current model definitions
    Create(CreateArgs),

    /// Apply the next pending migration
    Up,

    /// Revert the latest applied migration
    #[command(alias = "rollback")]
    Down,

    /// Bootstrap model definitions and a baseline from a live database
    Inspectdb(InspectArgs),
}

/// Arguments for the `create` command
#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Name for the migration (sanitized into the file stem)
    pub name: String,
}

/// Arguments for the `inspectdb` command
#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Overwrite an existing model definition file
    #[arg(short, long)]
    pub force: bool,
}
