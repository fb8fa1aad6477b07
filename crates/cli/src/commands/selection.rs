//! Range selection arguments shared by `ls` and `fetch`

use std::io;

use anyhow::Result;
use clap::Args;
use sc_core::{KeyConvention, ObjectInfo, RangeQuery, RangeSelector, Selection, SelectionReporter};

use super::context::Context;
use crate::output::format_object;

/// Which objects to select
#[derive(Args, Debug, Clone)]
pub struct SelectionArgs {
    /// Prefix under the collection root, usually a table directory
    #[arg(default_value = "")]
    pub prefix: String,

    /// Bucket to list (defaults to store.bucket)
    #[arg(short, long)]
    pub bucket: Option<String>,

    /// Collection root (defaults to store.initial_prefix)
    #[arg(long)]
    pub initial_prefix: Option<String>,

    /// Lowest range segment to include, e.g. 2021/03/01
    #[arg(long, value_name = "SEGMENT", default_value = "")]
    pub from: String,

    /// Highest range segment to include, e.g. 2021/03/31
    #[arg(long, value_name = "SEGMENT", default_value = "")]
    pub to: String,

    /// Regular expression searched for in each file name
    #[arg(long, default_value = ".*", conflicts_with = "table")]
    pub pattern: String,

    /// Select only files of this table, with or without a version
    #[arg(long)]
    pub table: Option<String>,

    /// Print the first selected objects to stderr before processing
    #[arg(short, long)]
    pub verbose: bool,

    /// How many objects --verbose prints (defaults to report.limit)
    #[arg(long)]
    pub limit: Option<usize>,
}

impl SelectionArgs {
    /// Build the query these arguments describe
    pub fn query(&self, ctx: &Context) -> Result<RangeQuery> {
        let pattern = match &self.table {
            Some(table) => table_pattern(table, &ctx.config().keys),
            None => self.pattern.clone(),
        };
        let query = RangeQuery::new(
            ctx.initial_prefix(self.initial_prefix.as_deref()),
            self.prefix.as_str(),
            self.from.as_str(),
            self.to.as_str(),
            &pattern,
        )?;
        Ok(query)
    }

    /// Start the selection, printing its head to stderr when verbose
    pub async fn select(&self, ctx: &Context, selector: &RangeSelector) -> Result<Selection> {
        let query = self.query(ctx)?;
        tracing::debug!(
            bucket = selector.bucket(),
            prefix = %query.listing_prefix(),
            from = query.range_min(),
            to = query.range_max(),
            "starting selection"
        );

        let reporter = SelectionReporter::new(self.verbose)
            .with_limit(self.limit.unwrap_or(ctx.config().report.limit));
        Ok(reporter
            .report(selector.select(query), format_object, &mut io::stderr())
            .await)
    }
}

/// File-name pattern selecting one table, e.g. `1617107308000_ApDetailsv3.csv`
fn table_pattern(table: &str, keys: &KeyConvention) -> String {
    format!(
        r"^[0-9]+{}{}({}[0-9]+)?\.",
        regex::escape(&keys.separator.to_string()),
        regex::escape(table),
        regex::escape(&keys.version_marker),
    )
}

/// Total size of a set of listed objects
pub fn total_size(items: &[ObjectInfo]) -> i64 {
    items.iter().filter_map(|i| i.size_bytes).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;
    use sc_core::Config;

    fn args(prefix: &str) -> SelectionArgs {
        SelectionArgs {
            prefix: prefix.to_string(),
            bucket: None,
            initial_prefix: None,
            from: String::new(),
            to: String::new(),
            pattern: ".*".to_string(),
            table: None,
            verbose: false,
            limit: None,
        }
    }

    #[test]
    fn test_table_pattern_matches_versions() {
        let re = Regex::new(&table_pattern("ApDetails", &KeyConvention::default())).unwrap();
        assert!(re.is_match("1617107308000_ApDetails.csv"));
        assert!(re.is_match("1617107308000_ApDetailsv3.csv.gz"));
        assert!(!re.is_match("1617107308000_ApDetailsExtra.csv"));
        assert!(!re.is_match("1617107308000_Other.csv"));
    }

    #[test]
    fn test_table_pattern_escapes_table() {
        let re = Regex::new(&table_pattern("a.b", &KeyConvention::default())).unwrap();
        assert!(re.is_match("1_a.b.csv"));
        assert!(!re.is_match("1_aXb.csv"));
    }

    #[test]
    fn test_query_uses_configured_root() {
        let mut config = Config::default();
        config.store.initial_prefix = "network/wifi/ncsdata/dar5".into();
        let ctx = Context::from_config(config);

        let mut args = args("ApDetails");
        args.from = "2021/03/01".into();
        args.to = "2021/03/31".into();
        let query = args.query(&ctx).unwrap();
        assert_eq!(
            query.listing_prefix(),
            "network/wifi/ncsdata/dar5/ApDetails/2021/03/"
        );
    }

    #[test]
    fn test_bad_pattern_is_usage_error() {
        let ctx = Context::from_config(Config::default());
        let mut args = args("t");
        args.pattern = "(".into();
        let err = args.query(&ctx).unwrap_err();
        assert_eq!(
            crate::exit_code::ExitCode::from_anyhow(&err),
            crate::exit_code::ExitCode::UsageError
        );
    }

    #[test]
    fn test_total_size() {
        let items = vec![
            ObjectInfo::file("b", "a", 10),
            ObjectInfo::file("b", "c", 32),
            ObjectInfo::dir("b", "d/"),
        ];
        assert_eq!(total_size(&items), 42);
    }
}
