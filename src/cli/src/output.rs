//! Output formatting for the Cinegate CLI: table, JSON or YAML.

use anyhow::Result;
use clap::ValueEnum;
use colored::*;
use serde::Serialize;
use tabled::{
    settings::{object::Columns, Alignment, Modify, Style},
    Table, Tabled,
};

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
pub enum OutputFormat {
    /// Render as a formatted table
    #[default]
    Table,
    /// Render as JSON
    Json,
    /// Render as YAML
    Yaml,
}

pub fn print_success(msg: &str) {
    println!("{} {}", "[OK]".green().bold(), msg);
}

pub fn print_warning(msg: &str) {
    println!("{} {}", "[WARN]".yellow().bold(), msg);
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", "[ERROR]".red().bold(), msg);
}

pub fn print_info(msg: &str) {
    println!("{} {}", "[INFO]".blue().bold(), msg);
}

/// Print rows as a table, or serialize them for JSON/YAML.
pub fn print_list<T: Tabled + Serialize>(items: &[T], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => {
            if items.is_empty() {
                println!("{}", "No results found.".dimmed());
                return Ok(());
            }
            let table = Table::new(items)
                .with(Style::rounded())
                .with(Modify::new(Columns::first()).with(Alignment::right()))
                .to_string();
            println!("{}", table);
            Ok(())
        }
        _ => print_item(&items, format),
    }
}

/// Print a single serializable value. Table format falls back to pretty JSON.
pub fn print_item<T: Serialize + ?Sized>(item: &T, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table | OutputFormat::Json => println!("{}", serde_json::to_string_pretty(item)?),
        OutputFormat::Yaml => print!("{}", serde_yaml::to_string(item)?),
    }
    Ok(())
}

pub fn print_detail(key: &str, value: &str) {
    println!("  {}: {}", key.cyan(), value);
}

pub fn print_header(title: &str) {
    println!();
    println!("{}", title.bold().underline());
    println!();
}

/// Colorize a health or outcome status word.
pub fn status_word(status: &str) -> ColoredString {
    match status {
        "healthy" | "found" | "HIT" | "true" => status.green(),
        "degraded" | "not_found" | "STALE" => status.yellow(),
        "MISS" => status.normal(),
        _ => status.red(),
    }
}
