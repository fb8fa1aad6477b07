//! Range selection over a bucket listing
//!
//! Objects are laid out as `<initial prefix>/<prefix>/<range segment>/.../<file>`
//! where the range segment is usually a date path such as `2021/03/30`.
//! A [`RangeQuery`] selects the objects whose range segment lies in an
//! inclusive interval and whose file name matches a pattern.
//!
//! The listing comes back in lexicographic key order, so the scan stops once
//! a key sorts past every key the interval can hold instead of walking the
//! rest of the bucket. Whole keys and range segments order differently when
//! a component holds characters below `/` (`2021/03-x/f` lists before
//! `2021/03/f`), so a key above the interval alone does not end the scan.

use std::collections::VecDeque;
use std::sync::Arc;

use futures::stream::{self, BoxStream, StreamExt};
use regex::Regex;

use crate::error::Result;
use crate::path::{file_name, join_prefix, RemotePath, DELIMITER};
use crate::traits::{ListOptions, ObjectInfo, ObjectStore};

/// A lazy, single-pass sequence of selected objects
///
/// Items arrive in the store's key order. Iterating again means building a
/// new selection, which re-issues the listing.
pub type Selection = BoxStream<'static, Result<ObjectInfo>>;

/// Where a key's range segment falls relative to the interval
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    Below,
    Within,
    Above,
}

/// Prefix, interval and file pattern for one selection
#[derive(Debug, Clone)]
pub struct RangeQuery {
    initial_prefix: String,
    prefix: String,
    range_min: String,
    range_max: String,
    file_pattern: Regex,
}

impl RangeQuery {
    /// Build a query, compiling `file_pattern`
    ///
    /// An empty bound leaves that side of the interval open.
    pub fn new(
        initial_prefix: impl Into<String>,
        prefix: impl Into<String>,
        range_min: impl Into<String>,
        range_max: impl Into<String>,
        file_pattern: &str,
    ) -> Result<Self> {
        Ok(Self {
            initial_prefix: initial_prefix.into(),
            prefix: prefix.into(),
            range_min: range_min.into().trim_matches(DELIMITER).to_string(),
            range_max: range_max.into().trim_matches(DELIMITER).to_string(),
            file_pattern: Regex::new(file_pattern)?,
        })
    }

    /// Lower bound of the interval
    pub fn range_min(&self) -> &str {
        &self.range_min
    }

    /// Upper bound of the interval
    pub fn range_max(&self) -> &str {
        &self.range_max
    }

    /// The compiled file-name pattern
    pub fn file_pattern(&self) -> &Regex {
        &self.file_pattern
    }

    /// Prefix the range segment is measured from
    pub fn base_prefix(&self) -> String {
        join_prefix([self.initial_prefix.as_str(), self.prefix.as_str()])
    }

    /// Prefix sent to the store
    ///
    /// The base prefix extended with the leading path components both bounds
    /// share, e.g. `2021/03/` for `2021/03/01..2021/03/31`.
    pub fn listing_prefix(&self) -> String {
        let base = self.base_prefix();
        if self.range_min.is_empty() || self.range_max.is_empty() {
            return base;
        }

        let shared: Vec<&str> = self
            .range_min
            .split(DELIMITER)
            .zip(self.range_max.split(DELIMITER))
            .take_while(|(lo, hi)| lo == hi)
            .map(|(lo, _)| lo)
            .take(self.depth().saturating_sub(1))
            .collect();

        join_prefix(std::iter::once(base.as_str()).chain(shared))
    }

    /// Whether the interval is inverted and therefore selects nothing
    pub fn is_empty_range(&self) -> bool {
        !self.range_min.is_empty() && !self.range_max.is_empty() && self.range_min > self.range_max
    }

    /// Number of path components in the range segment
    fn depth(&self) -> usize {
        let bound = if self.range_max.is_empty() {
            &self.range_min
        } else {
            &self.range_max
        };
        if bound.is_empty() {
            1
        } else {
            bound.split(DELIMITER).count()
        }
    }

    /// Locate a key's range segment, or `None` when the key is too shallow
    pub fn position(&self, key: &str) -> Option<Position> {
        let rest = key.strip_prefix(self.base_prefix().as_str())?;
        let depth = self.depth();
        let components: Vec<&str> = rest.split(DELIMITER).collect();
        if components.len() < depth || components.iter().take(depth).any(|c| c.is_empty()) {
            return None;
        }
        let segment = components[..depth].join("/");

        if !self.range_min.is_empty() && segment.as_str() < self.range_min.as_str() {
            Some(Position::Below)
        } else if !self.range_max.is_empty() && segment.as_str() > self.range_max.as_str() {
            Some(Position::Above)
        } else {
            Some(Position::Within)
        }
    }

    /// Whether no key listed after `key` can be within the interval
    ///
    /// A key within the interval starts with the base prefix, then a prefix
    /// of `range_max` with the full component count, then `/`.
    pub fn is_past_range(&self, key: &str) -> bool {
        if self.range_max.is_empty() {
            return false;
        }
        let base = self.base_prefix();
        let last = self.range_max.rfind(DELIMITER).map_or(0, |i| i + 1);
        (last..=self.range_max.len())
            .filter(|&end| self.range_max.is_char_boundary(end))
            .all(|end| {
                let bound = format!("{base}{}{DELIMITER}", &self.range_max[..end]);
                key > bound.as_str() && !key.starts_with(&bound)
            })
    }

    /// Whether the key's final component matches the file pattern
    pub fn matches_file(&self, key: &str) -> bool {
        let name = file_name(key);
        !name.is_empty() && self.file_pattern.is_match(name)
    }
}

/// Lists range selections from one bucket
#[derive(Clone)]
pub struct RangeSelector {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    page_size: Option<i32>,
}

impl RangeSelector {
    /// Create a selector over `bucket`
    pub fn new(store: Arc<dyn ObjectStore>, bucket: impl Into<String>) -> Self {
        Self {
            store,
            bucket: bucket.into(),
            page_size: None,
        }
    }

    /// Request at most `page_size` keys per listing call
    pub fn with_page_size(mut self, page_size: i32) -> Self {
        self.page_size = Some(page_size);
        self
    }

    /// The bucket being listed
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Start a selection
    pub fn select(&self, query: RangeQuery) -> Selection {
        scan(self.store.clone(), &self.bucket, query, self.page_size)
    }
}

/// Select the objects of `bucket` that satisfy `query`
///
/// Listing errors end the selection with that error; nothing is retried here.
pub fn list_range_objects(
    store: Arc<dyn ObjectStore>,
    bucket: &str,
    query: RangeQuery,
) -> Selection {
    scan(store, bucket, query, None)
}

struct ScanState {
    store: Arc<dyn ObjectStore>,
    path: RemotePath,
    query: RangeQuery,
    page: VecDeque<ObjectInfo>,
    token: Option<String>,
    page_size: Option<i32>,
    exhausted: bool,
}

fn scan(
    store: Arc<dyn ObjectStore>,
    bucket: &str,
    query: RangeQuery,
    page_size: Option<i32>,
) -> Selection {
    if query.is_empty_range() {
        tracing::debug!(
            min = query.range_min(),
            max = query.range_max(),
            "inverted range selects nothing"
        );
        return stream::empty().boxed();
    }

    let path = RemotePath::new(bucket, query.listing_prefix());
    tracing::debug!(
        %path,
        min = query.range_min(),
        max = query.range_max(),
        pattern = query.file_pattern().as_str(),
        "listing range"
    );

    let state = ScanState {
        store,
        path,
        query,
        page: VecDeque::new(),
        token: None,
        page_size,
        exhausted: false,
    };

    stream::try_unfold(state, |mut state| async move {
        loop {
            while let Some(info) = state.page.pop_front() {
                if info.is_dir {
                    continue;
                }
                match state.query.position(&info.key) {
                    Some(Position::Below) => continue,
                    Some(Position::Above) => {
                        if state.query.is_past_range(&info.key) {
                            tracing::debug!(key = %info.key, "passed end of range");
                            return Ok(None);
                        }
                    }
                    Some(Position::Within) => {
                        if state.query.matches_file(&info.key) {
                            return Ok(Some((info, state)));
                        }
                    }
                    None => {
                        tracing::warn!(key = %info.key, "key doesn't match expected form, ignored");
                    }
                }
            }

            if state.exhausted {
                return Ok(None);
            }

            let options = ListOptions {
                max_keys: state.page_size,
                continuation_token: state.token.take(),
                recursive: true,
                ..Default::default()
            };
            let result = match state.store.list_objects(&state.path, options).await {
                Ok(result) => result,
                Err(e) => return Err(e),
            };
            state.exhausted = !result.truncated || result.continuation_token.is_none();
            state.token = result.continuation_token;
            state.page = result.items.into();
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::traits::{ListResult, MockObjectStore};
    use futures::TryStreamExt;

    fn page(keys: &[&str], token: Option<&str>) -> ListResult {
        ListResult {
            items: keys.iter().map(|k| ObjectInfo::file("b", *k, 1)).collect(),
            truncated: token.is_some(),
            continuation_token: token.map(str::to_string),
        }
    }

    fn single_page_store(keys: &'static [&'static str]) -> Arc<dyn ObjectStore> {
        let mut store = MockObjectStore::new();
        store
            .expect_list_objects()
            .times(1)
            .returning(move |_, _| Ok(page(keys, None)));
        Arc::new(store)
    }

    async fn keys(selection: Selection) -> Vec<String> {
        selection
            .map_ok(|info| info.key)
            .try_collect()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_inclusive_range() {
        let store = single_page_store(&["a/001", "a/050", "a/099", "a/150"]);
        let query = RangeQuery::new("a", "", "010", "100", ".*").unwrap();
        let selected = keys(list_range_objects(store, "b", query)).await;
        assert_eq!(selected, vec!["a/050", "a/099"]);
    }

    #[tokio::test]
    async fn test_boundary_keys_included() {
        let store = single_page_store(&["a/010", "a/050", "a/100", "a/101"]);
        let query = RangeQuery::new("a", "", "010", "100", ".*").unwrap();
        let selected = keys(list_range_objects(store, "b", query)).await;
        assert_eq!(selected, vec!["a/010", "a/050", "a/100"]);
    }

    #[tokio::test]
    async fn test_inverted_range_is_empty_without_listing() {
        // No expectations: any listing call would panic.
        let store: Arc<dyn ObjectStore> = Arc::new(MockObjectStore::new());
        let query = RangeQuery::new("a", "", "100", "010", ".*").unwrap();
        assert!(keys(list_range_objects(store, "b", query)).await.is_empty());
    }

    #[tokio::test]
    async fn test_stops_at_first_key_above_range() {
        let mut store = MockObjectStore::new();
        store
            .expect_list_objects()
            .times(1)
            .returning(|_, _| Ok(page(&["a/050", "a/150", "a/060"], Some("next"))));
        let query = RangeQuery::new("a", "", "010", "100", ".*").unwrap();
        let selected = keys(list_range_objects(Arc::new(store), "b", query)).await;
        assert_eq!(selected, vec!["a/050"]);
    }

    #[tokio::test]
    async fn test_segment_above_range_listed_before_in_range_key() {
        let mut store = MockObjectStore::new();
        store.expect_list_objects().times(1).returning(|_, _| {
            Ok(page(
                &["a/2021/03-x/f", "a/2021/03/f", "a/2021/04/f", "a/2021/05/f"],
                Some("next"),
            ))
        });
        let query = RangeQuery::new("a", "", "2021/03", "2021/03", ".*").unwrap();
        let selected = keys(list_range_objects(Arc::new(store), "b", query)).await;
        assert_eq!(selected, vec!["a/2021/03/f"]);
    }

    #[tokio::test]
    async fn test_follows_continuation_tokens() {
        let mut store = MockObjectStore::new();
        store
            .expect_list_objects()
            .withf(|_, opts| opts.continuation_token.is_none())
            .times(1)
            .returning(|_, _| Ok(page(&["a/001", "a/020"], Some("t1"))));
        store
            .expect_list_objects()
            .withf(|_, opts| opts.continuation_token.as_deref() == Some("t1"))
            .times(1)
            .returning(|_, _| Ok(page(&["a/030", "a/040"], None)));
        let query = RangeQuery::new("a", "", "010", "", ".*").unwrap();
        let selector = RangeSelector::new(Arc::new(store), "b").with_page_size(2);
        let selected = keys(selector.select(query)).await;
        assert_eq!(selected, vec!["a/020", "a/030", "a/040"]);
    }

    #[tokio::test]
    async fn test_file_pattern_and_date_segments() {
        let mut store = MockObjectStore::new();
        store
            .expect_list_objects()
            .withf(|path, opts| {
                path.bucket == "cwru-data" && path.key == "dar5/ApDetails/2021/03/" && opts.recursive
            })
            .times(1)
            .returning(|_, _| {
                Ok(page(
                    &[
                        "dar5/ApDetails/2021/03/29/1617000000000_ApDetailsv4.csv.gz",
                        "dar5/ApDetails/2021/03/30/1617107308322_ApDetailsv4.csv.gz",
                        "dar5/ApDetails/2021/03/30/1617107308999_Otherv1.csv.gz",
                        "dar5/ApDetails/2021/03/30/readme",
                        "dar5/ApDetails/2021/03/31/1617200000000_ApDetailsv4.csv.gz",
                    ],
                    None,
                ))
            });
        let query = RangeQuery::new(
            "dar5",
            "ApDetails",
            "2021/03/30",
            "2021/03/31",
            r"^[0-9]+_ApDetailsv",
        )
        .unwrap();
        let selected = keys(list_range_objects(Arc::new(store), "cwru-data", query)).await;
        assert_eq!(
            selected,
            vec![
                "dar5/ApDetails/2021/03/30/1617107308322_ApDetailsv4.csv.gz",
                "dar5/ApDetails/2021/03/31/1617200000000_ApDetailsv4.csv.gz",
            ]
        );
    }

    #[tokio::test]
    async fn test_listing_error_propagates() {
        let mut store = MockObjectStore::new();
        store
            .expect_list_objects()
            .returning(|_, _| Err(Error::Auth("AccessDenied".into())));
        let query = RangeQuery::new("a", "", "", "", ".*").unwrap();
        let result: Result<Vec<ObjectInfo>> =
            list_range_objects(Arc::new(store), "b", query).try_collect().await;
        assert!(matches!(result.unwrap_err(), Error::Auth(_)));
    }

    #[test]
    fn test_listing_prefix_uses_shared_components() {
        let query = RangeQuery::new("net/", "/T", "2021/03/01", "2021/04/02", ".").unwrap();
        assert_eq!(query.base_prefix(), "net/T/");
        assert_eq!(query.listing_prefix(), "net/T/2021/");

        // A bound that could itself be an object name is never folded in.
        let query = RangeQuery::new("a", "", "100", "100", ".").unwrap();
        assert_eq!(query.listing_prefix(), "a/");
    }

    #[test]
    fn test_position() {
        let query = RangeQuery::new("a", "", "2021/03", "2021/04", ".").unwrap();
        assert_eq!(query.position("a/2021/02/x"), Some(Position::Below));
        assert_eq!(query.position("a/2021/03/x"), Some(Position::Within));
        assert_eq!(query.position("a/2021/05/x"), Some(Position::Above));
        assert_eq!(query.position("a/2021"), None);
        assert_eq!(query.position("other/2021/03/x"), None);
    }

    #[test]
    fn test_is_past_range() {
        let query = RangeQuery::new("a", "", "2021/01", "2021/03", ".").unwrap();
        assert!(!query.is_past_range("a/2021/03-x/f"));
        assert!(!query.is_past_range("a/2021/03/f"));
        assert!(query.is_past_range("a/2021/04/f"));
        assert!(query.is_past_range("b/2021/01/f"));

        let open = RangeQuery::new("a", "", "2021/01", "", ".").unwrap();
        assert!(!open.is_past_range("a/2099/01/f"));
    }

    #[test]
    fn test_invalid_pattern() {
        assert!(matches!(
            RangeQuery::new("a", "", "", "", "(").unwrap_err(),
            Error::InvalidPattern(_)
        ));
    }
}
