//! cat command - Display object contents
//!
//! Outputs the entire content of an object to stdout. The content comes
//! from the local cache when the remote object is unchanged.

use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context as _, Result};
use clap::Args;
use sc_core::{parse_path, RemotePath};

use super::context::Context;
use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};

/// Display object contents
#[derive(Args, Debug)]
pub struct CatArgs {
    /// Object path (bucket/key), or just the key together with --bucket
    pub path: String,

    /// Bucket holding the object
    #[arg(short, long)]
    pub bucket: Option<String>,

    /// Print the local cache file instead of the content
    #[arg(long)]
    pub print_path: bool,
}

/// Execute the cat command
pub async fn execute(args: CatArgs, output_config: OutputConfig, config: Option<&Path>) -> ExitCode {
    let formatter = Formatter::new(output_config);
    match run(&args, &formatter, config).await {
        Ok(code) => code,
        Err(e) => super::fail(&formatter, e),
    }
}

async fn run(args: &CatArgs, formatter: &Formatter, config: Option<&Path>) -> Result<ExitCode> {
    let path = object_path(&args.path, args.bucket.as_deref())?;
    let ctx = Context::load(config)?;
    let cache = ctx.cache(ctx.store().await?)?;

    let object = cache
        .get(&path)
        .await
        .with_context(|| format!("failed to read {path}"))?;
    tracing::debug!(%path, origin = ?object.origin, bytes = object.data.len(), "object ready");

    if args.print_path {
        formatter.println(&cache.local_path(&path).display().to_string());
        return Ok(ExitCode::Success);
    }

    // Written directly to stdout to preserve binary data
    let mut stdout = io::stdout().lock();
    stdout
        .write_all(&object.data)
        .and_then(|()| stdout.flush())
        .context("failed to write to stdout")?;
    Ok(ExitCode::Success)
}

/// Resolve the object path from the argument and an optional bucket
fn object_path(arg: &str, bucket: Option<&str>) -> Result<RemotePath> {
    let path = match bucket {
        Some(bucket) => RemotePath::new(bucket, arg.trim_start_matches('/')),
        None => parse_path(arg)?,
    };
    if path.is_dir() {
        return Err(sc_core::Error::InvalidPath(format!(
            "'{arg}' does not name an object; expected bucket/key"
        ))
        .into());
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_path_full() {
        let path = object_path("cwru-data/dar5/ApDetails/1617107308000_ApDetails.csv", None).unwrap();
        assert_eq!(path.bucket, "cwru-data");
        assert_eq!(path.key, "dar5/ApDetails/1617107308000_ApDetails.csv");
    }

    #[test]
    fn test_object_path_with_bucket_flag() {
        let path = object_path("dar5/1_T.csv", Some("b")).unwrap();
        assert_eq!(path, RemotePath::new("b", "dar5/1_T.csv"));
    }

    #[test]
    fn test_object_path_rejects_bucket_only() {
        let err = object_path("mybucket", None).unwrap_err();
        assert_eq!(ExitCode::from_anyhow(&err), ExitCode::UsageError);
    }

    #[test]
    fn test_object_path_rejects_prefix() {
        assert!(object_path("mybucket/dir/", None).is_err());
    }

    #[test]
    fn test_object_path_empty() {
        assert!(object_path("", None).is_err());
    }
}
