//! ls command - List the objects of a range selection
//!
//! Lists every object under `<initial prefix>/<prefix>/` whose range segment
//! lies in `--from..=--to` and whose file name matches the pattern.

use std::path::Path;

use anyhow::Result;
use clap::Args;
use futures::TryStreamExt;
use sc_core::{ObjectInfo, RangeSelector};
use serde::Serialize;

use super::context::Context;
use super::selection::{total_size, SelectionArgs};
use crate::exit_code::ExitCode;
use crate::output::{format_object, Formatter, OutputConfig};

/// List the objects of a range selection
#[derive(Args, Debug)]
pub struct LsArgs {
    #[command(flatten)]
    pub selection: SelectionArgs,

    /// Summarize output (show totals only)
    #[arg(long)]
    pub summarize: bool,
}

/// Output structure for ls command (JSON format)
#[derive(Debug, Serialize)]
struct LsOutput {
    bucket: String,
    items: Vec<ObjectInfo>,
    summary: Summary,
}

#[derive(Debug, Serialize)]
struct Summary {
    total_objects: usize,
    total_size_bytes: i64,
    total_size_human: String,
}

impl Summary {
    fn of(items: &[ObjectInfo]) -> Self {
        let total_size_bytes = total_size(items);
        Self {
            total_objects: items.len(),
            total_size_bytes,
            total_size_human: humansize::format_size(total_size_bytes.max(0) as u64, humansize::BINARY),
        }
    }
}

/// Execute the ls command
pub async fn execute(args: LsArgs, output_config: OutputConfig, config: Option<&Path>) -> ExitCode {
    let formatter = Formatter::new(output_config);
    match run(&args, &formatter, config).await {
        Ok(code) => code,
        Err(e) => super::fail(&formatter, e),
    }
}

async fn run(args: &LsArgs, formatter: &Formatter, config: Option<&Path>) -> Result<ExitCode> {
    let ctx = Context::load(config)?;
    let bucket = ctx.bucket(args.selection.bucket.as_deref())?;
    let selector = RangeSelector::new(ctx.store().await?, bucket.clone());

    let mut selection = args.selection.select(&ctx, &selector).await?;

    let print_lines = !formatter.is_json() && !formatter.is_quiet() && !args.summarize;
    let mut items = Vec::new();
    while let Some(item) = selection.try_next().await? {
        if print_lines {
            formatter.println(&format_object(&item));
        }
        items.push(item);
    }

    let summary = Summary::of(&items);
    if formatter.is_json() {
        formatter.json(&LsOutput {
            bucket,
            items,
            summary,
        });
    } else {
        formatter.println(&render_summary(&summary));
    }

    Ok(ExitCode::Success)
}

fn render_summary(summary: &Summary) -> String {
    format!(
        "{} objects are selected, {}",
        summary.total_objects, summary.total_size_human
    )
}
