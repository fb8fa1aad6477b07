//! split and join commands - Convert between object keys and their fields
//!
//! Neither command talks to the remote store; they only need the key
//! convention from the configuration.

use std::path::Path;

use anyhow::Result;
use clap::Args;
use sc_core::{KeyCodec, KeyParts};
use serde::Serialize;

use super::context::Context;
use crate::exit_code::ExitCode;
use crate::output::{format_date, Formatter, OutputConfig};

/// Decompose object keys into their fields
#[derive(Args, Debug)]
pub struct SplitArgs {
    /// Object keys, e.g. dar5/ApDetails/2021/03/30/1617107308000_ApDetailsv2.csv
    #[arg(required = true)]
    pub keys: Vec<String>,
}

/// Build an object key from its fields
#[derive(Args, Debug)]
pub struct JoinArgs {
    /// Everything before the file name
    #[arg(long)]
    pub prefix: String,

    /// Epoch milliseconds
    #[arg(long)]
    pub msec: u64,

    /// Table name; subtables are written `<base><sep><subtable>`
    #[arg(long)]
    pub table: String,

    /// Schema version
    #[arg(id = "table_version", long = "table-version", value_name = "N")]
    pub version: Option<u32>,

    /// File suffix without the leading dot
    #[arg(long, default_value = "csv")]
    pub suffix: String,
}

#[derive(Debug, Serialize)]
struct SplitOutput {
    key: String,
    #[serde(flatten)]
    parts: Option<KeyParts>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Execute the split command
pub fn execute(args: SplitArgs, output_config: OutputConfig, config: Option<&Path>) -> ExitCode {
    let formatter = Formatter::new(output_config);
    let codec = match load_codec(config) {
        Ok(codec) => codec,
        Err(e) => return super::fail(&formatter, e),
    };

    let outputs = split_keys(&codec, &args.keys);
    let failed = outputs.iter().any(|o| o.error.is_some());

    if formatter.is_json() {
        formatter.json(&outputs);
    } else {
        for output in &outputs {
            match (&output.parts, &output.error) {
                (Some(parts), _) => formatter.println(&render_parts(&output.key, parts)),
                (None, Some(error)) => formatter.error(error),
                (None, None) => {}
            }
        }
    }

    if failed {
        ExitCode::UsageError
    } else {
        ExitCode::Success
    }
}

/// Execute the join command
pub fn execute_join(args: JoinArgs, output_config: OutputConfig, config: Option<&Path>) -> ExitCode {
    let formatter = Formatter::new(output_config);
    let result = load_codec(config).and_then(|codec| {
        let parts = KeyParts {
            prefix: args.prefix.trim_end_matches('/').to_string(),
            msec: args.msec,
            tablename: args.table,
            version: args.version,
            suffix: args.suffix,
        };
        Ok(codec.recompose(&parts)?)
    });

    match result {
        Ok(key) if formatter.is_json() => {
            formatter.json(&serde_json::json!({ "key": key }));
            ExitCode::Success
        }
        Ok(key) => {
            formatter.println(&key);
            ExitCode::Success
        }
        Err(e) => super::fail(&formatter, e),
    }
}

fn load_codec(config: Option<&Path>) -> Result<KeyCodec> {
    Context::load(config)?.codec()
}

fn split_keys(codec: &KeyCodec, keys: &[String]) -> Vec<SplitOutput> {
    keys.iter()
        .map(|key| match codec.decompose(key) {
            Ok(parts) => SplitOutput {
                key: key.clone(),
                parts: Some(parts),
                error: None,
            },
            Err(e) => SplitOutput {
                key: key.clone(),
                parts: None,
                error: Some(e.to_string()),
            },
        })
        .collect()
}

fn render_parts(key: &str, parts: &KeyParts) -> String {
    let version = parts
        .version
        .map(|v| v.to_string())
        .unwrap_or_else(|| "-".to_string());
    format!(
        "{key}\n  prefix:    {}\n  timestamp: {} ({})\n  table:     {}\n  version:   {version}\n  suffix:    {}",
        parts.prefix,
        parts.msec,
        format_date(parts.timestamp()).trim(),
        parts.tablename,
        parts.suffix,
    )
}
