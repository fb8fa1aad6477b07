//! CLI command definitions and execution
//!
//! This module contains all CLI commands and their implementations.
//! Each command exposes `execute(args, ...) -> ExitCode`; failures are
//! reported through the [`Formatter`] and mapped onto an [`ExitCode`].

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};

mod cache;
mod cat;
mod completions;
mod context;
mod fetch;
mod ls;
mod selection;
mod split;

/// statcache - cached access to timestamped statistics files on S3
///
/// Selects objects by prefix, date range and file-name pattern, and serves
/// their content through a local disk cache.
#[derive(Parser, Debug)]
#[command(name = "statcache")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output format: human-readable or JSON
    #[arg(long, global = true, default_value = "false")]
    pub json: bool,

    /// Disable colored output
    #[arg(long, global = true, default_value = "false")]
    pub no_color: bool,

    /// Disable progress bar
    #[arg(long, global = true, default_value = "false")]
    pub no_progress: bool,

    /// Suppress non-error output
    #[arg(short, long, global = true, default_value = "false")]
    pub quiet: bool,

    /// Enable debug logging
    #[arg(long, global = true, default_value = "false")]
    pub debug: bool,

    /// Configuration file (defaults to the platform config dir)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List the objects of a range selection
    Ls(ls::LsArgs),

    /// Display object contents, served through the cache
    Cat(cat::CatArgs),

    /// Warm the cache for a range selection
    Fetch(fetch::FetchArgs),

    /// Decompose object keys into their fields
    Split(split::SplitArgs),

    /// Build an object key from its fields
    Join(split::JoinArgs),

    /// Inspect and maintain the local cache
    #[command(subcommand)]
    Cache(cache::CacheCommands),

    /// Generate shell completion scripts
    Completions(completions::CompletionsArgs),
}

/// Execute the CLI command and return an exit code
pub async fn execute(cli: Cli) -> ExitCode {
    let output_config = OutputConfig {
        json: cli.json,
        no_color: cli.no_color,
        no_progress: cli.no_progress,
        quiet: cli.quiet,
    };
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Ls(args) => ls::execute(args, output_config, config_path).await,
        Commands::Cat(args) => cat::execute(args, output_config, config_path).await,
        Commands::Fetch(args) => fetch::execute(args, output_config, config_path).await,
        Commands::Split(args) => split::execute(args, output_config, config_path),
        Commands::Join(args) => split::execute_join(args, output_config, config_path),
        Commands::Cache(cmd) => cache::execute(cmd, output_config, config_path).await,
        Commands::Completions(args) => completions::execute(args),
    }
}

/// Print a failure and pick the exit code for it
fn fail(formatter: &Formatter, err: anyhow::Error) -> ExitCode {
    formatter.error(&format!("{err:#}"));
    ExitCode::from_anyhow(&err)
}
