//! On-disk layout of the object cache
//!
//! ```text
//! <root>/data/<name>   object content
//! <root>/meta/<name>   JSON snapshot of the remote metadata
//! <root>/tmp/          partially written files
//! ```
//!
//! `<name>` is `bucket/key` percent-encoded, with every byte outside
//! `[A-Za-z0-9._~-]` written as `%XX`, so the remote path can be read back
//! from the file name.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::path::RemotePath;

const DATA_DIR: &str = "data";
const META_DIR: &str = "meta";
const TMP_DIR: &str = "tmp";

static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Paths inside a cache root
#[derive(Debug, Clone)]
pub struct Layout {
    root: PathBuf,
}

impl Layout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn data_dir(&self) -> PathBuf {
        self.root.join(DATA_DIR)
    }

    pub fn meta_dir(&self) -> PathBuf {
        self.root.join(META_DIR)
    }

    pub fn tmp_dir(&self) -> PathBuf {
        self.root.join(TMP_DIR)
    }

    pub fn data_path(&self, path: &RemotePath) -> PathBuf {
        self.data_dir().join(encode(path))
    }

    pub fn meta_path(&self, path: &RemotePath) -> PathBuf {
        self.meta_dir().join(encode(path))
    }

    /// A fresh temp file name, unique within this host
    pub fn tmp_path(&self, path: &RemotePath) -> PathBuf {
        let seq = TMP_SEQ.fetch_add(1, Ordering::Relaxed);
        self.tmp_dir()
            .join(format!("{}.{}.{seq}", encode(path), std::process::id()))
    }
}

/// Encode a remote path as a single file name
pub fn encode(path: &RemotePath) -> String {
    urlencoding::encode(&format!("{}/{}", path.bucket, path.key)).into_owned()
}

/// Recover the remote path from a file name produced by [`encode`]
pub fn decode(name: &str) -> Option<RemotePath> {
    let raw = urlencoding::decode(name).ok()?;
    let (bucket, key) = raw.split_once('/')?;
    Some(RemotePath::new(bucket, key))
}
