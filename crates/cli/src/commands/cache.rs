//! cache commands - Inspect and maintain the local cache
//!
//! These commands only touch the cache directory; the remote store is
//! never contacted.

use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use clap::Subcommand;
use comfy_table::{presets, Cell, CellAlignment, Table};
use sc_core::{parse_path, CacheEntry, ExpireReport};

use super::context::Context;
use crate::exit_code::ExitCode;
use crate::output::{format_date, Formatter, OutputConfig};

const SECS_PER_DAY: f64 = 86_400.0;
const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

#[derive(Subcommand, Debug)]
pub enum CacheCommands {
    /// List cached objects
    List,

    /// Remove old entries and trim the cache to a size budget
    Expire {
        /// Remove entries neither fetched nor read in this many days
        #[arg(long, value_name = "DAYS")]
        age_days: Option<f64>,

        /// Keep at most this many MiB, dropping the least recently used first
        #[arg(long, value_name = "MB")]
        max_mb: Option<f64>,
    },

    /// Drop the cached copy of an object (bucket/key)
    Rm {
        /// Object path
        path: String,
    },

    /// Print the cache directory
    Path,
}

/// Execute a cache subcommand
pub async fn execute(cmd: CacheCommands, output_config: OutputConfig, config: Option<&Path>) -> ExitCode {
    let formatter = Formatter::new(output_config);
    match run(cmd, &formatter, config).await {
        Ok(code) => code,
        Err(e) => super::fail(&formatter, e),
    }
}

async fn run(cmd: CacheCommands, formatter: &Formatter, config: Option<&Path>) -> Result<ExitCode> {
    let ctx = Context::load(config)?;
    let cache = ctx.local_cache()?;

    match cmd {
        CacheCommands::List => {
            let entries = cache.entries().await?;
            if formatter.is_json() {
                formatter.json(&entries);
            } else if entries.is_empty() {
                formatter.println("Cache is empty");
            } else {
                formatter.println(&render_entries(&entries, formatter.colors_enabled()));
            }
        }
        CacheCommands::Expire { age_days, max_mb } => {
            let max_age = age_days.map(days_to_duration).transpose()?;
            let max_bytes = max_mb.map(mb_to_bytes).transpose()?;
            let report = cache.expire(max_age, max_bytes).await?;
            if formatter.is_json() {
                formatter.json(&report);
            } else {
                formatter.success(&render_report(&report));
            }
        }
        CacheCommands::Rm { path } => {
            let path = parse_path(&path)?;
            if cache.invalidate(&path).await? {
                formatter.success(&format!("Removed {path} from cache"));
            } else {
                formatter.warning(&format!("{path} is not cached"));
            }
        }
        CacheCommands::Path => {
            formatter.println(&cache.root().display().to_string());
        }
    }

    Ok(ExitCode::Success)
}

fn days_to_duration(days: f64) -> Result<Duration> {
    if !days.is_finite() || days < 0.0 {
        return Err(sc_core::Error::Config(format!("invalid age: {days} days")).into());
    }
    Duration::try_from_secs_f64(days * SECS_PER_DAY)
        .map_err(|e| sc_core::Error::Config(format!("invalid age: {days} days: {e}")).into())
}

fn mb_to_bytes(mb: f64) -> Result<u64> {
    if !mb.is_finite() || mb < 0.0 {
        return Err(sc_core::Error::Config(format!("invalid size budget: {mb} MB")).into());
    }
    Ok((mb * BYTES_PER_MB) as u64)
}

fn render_entries(entries: &[CacheEntry], utf8: bool) -> String {
    let mut table = Table::new();
    table
        .load_preset(if utf8 { presets::UTF8_FULL } else { presets::ASCII_FULL })
        .set_header(vec!["Object", "Size", "Last modified", "Fetched", "Last used"]);

    for entry in entries {
        let size = entry
            .size_bytes
            .map(|s| humansize::format_size(s.max(0) as u64, humansize::BINARY))
            .unwrap_or_default();
        table.add_row(vec![
            Cell::new(entry.path()),
            Cell::new(size).set_alignment(CellAlignment::Right),
            Cell::new(format_date(entry.last_modified)),
            Cell::new(format_date(Some(entry.fetched_at))),
            Cell::new(format_date(Some(entry.last_used()))),
        ]);
    }
    table.to_string()
}

fn render_report(report: &ExpireReport) -> String {
    format!(
        "Removed {} entries ({}), {} remain ({})",
        report.removed,
        humansize::format_size(report.freed_bytes, humansize::BINARY),
        report.remaining,
        humansize::format_size(report.remaining_bytes, humansize::BINARY),
    )
}
