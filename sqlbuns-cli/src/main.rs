//! sqlbuns - declarative schema migrations for SQL databases.

use clap::Parser;

use sqlbuns_cli::cli::{Cli, Command};
use sqlbuns_cli::error::CliResult;
use sqlbuns_cli::{commands, output};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        output::newline();
        output::error(&e.to_string());
        std::process::exit(1);
    }
}

async fn run() -> CliResult<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Create(args) => commands::create::run(args).await,
        Command::Up => commands::up::run().await,
        Command::Down => commands::down::run().await,
        Command::Inspectdb(args) => commands::inspectdb::run(args).await,
    }
}
