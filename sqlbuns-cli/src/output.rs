//! Styled terminal output utilities.

use std::io::IsTerminal;

use owo_colors::OwoColorize;

use sqlbuns_db::{RenameKind, RenameOracle};

/// Print a header/title
pub fn header(text: &str) {
    println!();
    println!("{}", text.bold().cyan());
    println!("{}", "─".repeat(text.len()).dimmed());
    println!();
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

/// Print a success message
pub fn success(text: &str) {
    println!("{} {}", "✔".green().bold(), text.green());
}

/// Print an info message
pub fn info(text: &str) {
    println!("{} {}", "ℹ".blue().bold(), text);
}

/// Print a warning message
pub fn warn(text: &str) {
    println!("{} {}", "⚠".yellow().bold(), text.yellow());
}

/// Print an error message
pub fn error(text: &str) {
    eprintln!("{} {}", "✖".red().bold(), text.red());
}

/// Print a step indicator
pub fn step(current: usize, total: usize, text: &str) {
    println!("{} {}", format!("[{}/{}]", current, total).dimmed(), text);
}

/// Print a list item
pub fn list_item(text: &str) {
    println!("  {} {}", "•".dimmed(), text);
}

/// Print a newline
pub fn newline() {
    println!();
}

/// Print differ warnings under a `Warnings:` banner. Warnings never block.
pub fn warnings(items: &[String]) {
    if items.is_empty() {
        return;
    }
    println!("{}", "Warnings:".yellow().bold());
    for item in items {
        list_item(&item.yellow().to_string());
    }
}

/// Ask for confirmation
pub fn confirm(prompt: &str) -> bool {
    use std::io::{self, Write};

    print!("{} {} ", prompt, "[y/N]".dimmed());
    io::stdout().flush().ok();

    let mut input = String::new();
    if io::stdin().read_line(&mut input).is_err() {
        return false;
    }

    matches!(input.trim().to_lowercase().as_str(), "y" | "yes")
}

/// The interactive rename oracle: prompts on a terminal, answers `false` in
/// non-interactive runs so drop-and-add is emitted instead of a guess.
#[derive(Debug, Default, Clone, Copy)]
pub struct PromptOracle;

impl RenameOracle for PromptOracle {
    fn confirm_rename(&self, table: &str, old: &str, new: &str, kind: RenameKind) -> bool {
        if !std::io::stdin().is_terminal() {
            return false;
        }
        confirm(&format!(
            "Did you rename {kind} `{old}` to `{new}` on `{table}`?"
        ))
    }
}
