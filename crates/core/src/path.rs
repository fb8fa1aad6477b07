//! Path parsing and resolution
//!
//! Remote locations are written as `bucket/key`. Listing prefixes are built
//! by joining path fragments with the `/` key delimiter.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Key delimiter used by the remote store
pub const DELIMITER: char = '/';

/// A bucket plus an object key (or key prefix)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RemotePath {
    /// Bucket name
    pub bucket: String,
    /// Object key (empty for bucket root)
    pub key: String,
}

impl RemotePath {
    /// Create a new RemotePath
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// Whether the key names a prefix rather than an object
    pub fn is_dir(&self) -> bool {
        self.key.is_empty() || self.key.ends_with(DELIMITER)
    }

    /// Final component of the key
    pub fn file_name(&self) -> &str {
        file_name(&self.key)
    }
}

impl std::fmt::Display for RemotePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.key.is_empty() {
            write!(f, "{}", self.bucket)
        } else {
            write!(f, "{}/{}", self.bucket, self.key)
        }
    }
}

/// Parse `bucket[/key]` into a RemotePath
pub fn parse_path(path: &str) -> Result<RemotePath> {
    if path.is_empty() {
        return Err(Error::InvalidPath("Path cannot be empty".into()));
    }

    let (bucket, key) = match path.split_once(DELIMITER) {
        Some((bucket, key)) => (bucket, key),
        None => (path, ""),
    };

    if bucket.is_empty() {
        return Err(Error::InvalidPath("Bucket name cannot be empty".into()));
    }

    Ok(RemotePath::new(bucket, key))
}

/// Join prefix fragments into a listing prefix
///
/// Empty fragments and stray delimiters are dropped. A non-empty result
/// always ends with the delimiter, so it names a "directory" in the store.
pub fn join_prefix<'a>(parts: impl IntoIterator<Item = &'a str>) -> String {
    let mut joined = String::new();
    for part in parts {
        let part = part.trim_matches(DELIMITER);
        if part.is_empty() {
            continue;
        }
        joined.push_str(part);
        joined.push(DELIMITER);
    }
    joined
}

/// Final `/`-separated component of a key
pub fn file_name(key: &str) -> &str {
    key.rsplit(DELIMITER).next().unwrap_or(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_path_with_key() {
        let path = parse_path("cwru-data/network/wifi/1_Tv1.csv").unwrap();
        assert_eq!(path.bucket, "cwru-data");
        assert_eq!(path.key, "network/wifi/1_Tv1.csv");
        assert!(!path.is_dir());
        assert_eq!(path.file_name(), "1_Tv1.csv");
    }

    #[test]
    fn test_parse_path_bucket_only() {
        let path = parse_path("bucket").unwrap();
        assert_eq!(path.bucket, "bucket");
        assert_eq!(path.key, "");
        assert!(path.is_dir());
    }

    #[test]
    fn test_parse_path_errors() {
        assert!(parse_path("").is_err());
        assert!(matches!(
            parse_path("/key").unwrap_err(),
            Error::InvalidPath(_)
        ));
    }

    #[test]
    fn test_display() {
        assert_eq!(RemotePath::new("b", "a/c").to_string(), "b/a/c");
        assert_eq!(RemotePath::new("b", "").to_string(), "b");
    }

    #[test]
    fn test_join_prefix() {
        assert_eq!(join_prefix(["a", ""]), "a/");
        assert_eq!(join_prefix(["net/wifi/", "/ApDetails"]), "net/wifi/ApDetails/");
        assert_eq!(join_prefix(["", ""]), "");
    }

    #[test]
    fn test_file_name() {
        assert_eq!(file_name("a/b/c.csv"), "c.csv");
        assert_eq!(file_name("c.csv"), "c.csv");
        assert_eq!(file_name("a/"), "");
    }
}
