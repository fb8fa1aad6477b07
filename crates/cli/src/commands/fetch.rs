//! fetch command - Warm the cache for a range selection
//!
//! Every selected object whose key follows the naming convention is read
//! through the cache. Keys that don't are skipped with a warning.

use std::path::Path;

use anyhow::Result;
use clap::Args;
use futures::{future, StreamExt, TryStreamExt};
use sc_core::{KeyCodec, ObjectCache, Origin, RangeSelector};
use serde::Serialize;

use super::context::Context;
use super::selection::SelectionArgs;
use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig, ProgressBar};

/// Warm the cache for a range selection
#[derive(Args, Debug)]
pub struct FetchArgs {
    #[command(flatten)]
    pub selection: SelectionArgs,

    /// Only fetch files of this schema version
    #[arg(id = "table_version", long = "table-version", value_name = "N")]
    pub version: Option<u32>,

    /// Number of objects fetched concurrently
    #[arg(short, long, default_value = "4")]
    pub jobs: usize,
}

/// Output structure for fetch command (JSON format)
#[derive(Debug, Default, Serialize, PartialEq, Eq)]
struct FetchSummary {
    fetched: usize,
    from_cache: usize,
    from_remote: usize,
    skipped: usize,
    total_size_bytes: u64,
}

impl FetchSummary {
    fn record(&mut self, origin: Origin, bytes: usize) {
        self.fetched += 1;
        self.total_size_bytes += bytes as u64;
        match origin {
            Origin::Cache => self.from_cache += 1,
            Origin::Remote => self.from_remote += 1,
        }
    }
}

impl std::fmt::Display for FetchSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} objects ready ({} cached, {} downloaded, {}), {} skipped",
            self.fetched,
            self.from_cache,
            self.from_remote,
            humansize::format_size(self.total_size_bytes, humansize::BINARY),
            self.skipped
        )
    }
}

/// Whether a selected key takes part in the fetch
#[derive(Debug, PartialEq, Eq)]
enum Admission {
    Fetch,
    Malformed(String),
    OtherVersion,
}

fn admit(codec: &KeyCodec, version: Option<u32>, key: &str) -> Admission {
    match codec.decompose(key) {
        Err(e) => Admission::Malformed(e.to_string()),
        Ok(parts) if version.is_some() && parts.version != version => Admission::OtherVersion,
        Ok(_) => Admission::Fetch,
    }
}

/// Execute the fetch command
pub async fn execute(args: FetchArgs, output_config: OutputConfig, config: Option<&Path>) -> ExitCode {
    let formatter = Formatter::new(output_config.clone());
    let progress = ProgressBar::spinner(&output_config, "fetching");
    let result = run(&args, &formatter, &progress, config).await;
    progress.finish_and_clear();

    match result {
        Ok(summary) => {
            if formatter.is_json() {
                formatter.json(&summary);
            } else {
                formatter.success(&summary.to_string());
            }
            ExitCode::Success
        }
        Err(e) => super::fail(&formatter, e),
    }
}

async fn run(
    args: &FetchArgs,
    formatter: &Formatter,
    progress: &ProgressBar,
    config: Option<&Path>,
) -> Result<FetchSummary> {
    let ctx = Context::load(config)?;
    let codec = ctx.codec()?;
    let bucket = ctx.bucket(args.selection.bucket.as_deref())?;
    let store = ctx.store().await?;
    let cache = ctx.cache(store.clone())?;
    let selector = RangeSelector::new(store, bucket);

    let selection = args.selection.select(&ctx, &selector).await?;

    let mut summary = FetchSummary::default();
    let mut skipped = 0;
    {
        let admitted = selection.try_filter(|info| {
            let keep = match admit(&codec, args.version, &info.key) {
                Admission::Fetch => true,
                Admission::Malformed(reason) => {
                    progress.suspend(|| formatter.warning(&format!("ignored: {reason}")));
                    skipped += 1;
                    false
                }
                Admission::OtherVersion => {
                    tracing::debug!(key = %info.key, "other table version");
                    skipped += 1;
                    false
                }
            };
            future::ready(keep)
        });
        let mut fetches = admitted
            .map(|item| fetch_one(&cache, item))
            .buffer_unordered(args.jobs.max(1));

        while let Some((origin, bytes)) = fetches.try_next().await? {
            summary.record(origin, bytes);
            progress.inc(1);
        }
    }
    summary.skipped = skipped;

    Ok(summary)
}

async fn fetch_one(
    cache: &ObjectCache,
    item: sc_core::Result<sc_core::ObjectInfo>,
) -> sc_core::Result<(Origin, usize)> {
    let info = item?;
    let object = cache.get(&info.path()).await?;
    Ok((object.origin, object.data.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sc_core::KeyConvention;

    fn codec() -> KeyCodec {
        KeyCodec::new(KeyConvention::default()).unwrap()
    }

    #[test]
    fn test_admit_wellformed_key() {
        assert_eq!(
            admit(&codec(), None, "dar5/ApDetails/1617107308000_ApDetailsv2.csv"),
            Admission::Fetch
        );
    }

    #[test]
    fn test_admit_malformed_key() {
        let admission = admit(&codec(), None, "dar5/ApDetails/readme.txt");
        assert!(matches!(admission, Admission::Malformed(ref r) if r.contains("readme.txt")));
    }

    #[test]
    fn test_admit_version_filter() {
        let codec = codec();
        let key = "dar5/ApDetails/1617107308000_ApDetailsv2.csv";
        assert_eq!(admit(&codec, Some(2), key), Admission::Fetch);
        assert_eq!(admit(&codec, Some(3), key), Admission::OtherVersion);
        assert_eq!(
            admit(&codec, Some(2), "dar5/ApDetails/1617107308000_ApDetails.csv"),
            Admission::OtherVersion
        );
    }

    #[test]
    fn test_summary_counts() {
        let mut summary = FetchSummary::default();
        summary.record(Origin::Cache, 10);
        summary.record(Origin::Remote, 32);
        summary.skipped = 1;
        insta::assert_snapshot!(summary, @"2 objects ready (1 cached, 1 downloaded, 42 B), 1 skipped");
    }
}
