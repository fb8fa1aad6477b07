//! Shared setup for commands: configuration, store, codec and cache

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use sc_core::{
    Config, ConfigManager, KeyCodec, ListOptions, ListResult, ObjectCache, ObjectInfo,
    ObjectStore, RemotePath,
};
use sc_s3::S3Client;

/// Loaded configuration plus the pieces commands build from it
#[derive(Debug)]
pub struct Context {
    config: Config,
}

impl Context {
    /// Load the configuration from `path`, or from the default location
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let manager = match path {
            Some(path) => ConfigManager::with_path(path.to_path_buf()),
            None => ConfigManager::new().context("failed to locate configuration")?,
        };
        let config = manager.load().with_context(|| {
            format!(
                "failed to load configuration from {}",
                manager.config_path().display()
            )
        })?;
        tracing::debug!(path = %manager.config_path().display(), "configuration loaded");
        Ok(Self { config })
    }

    /// Wrap an already built configuration
    pub fn from_config(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The bucket to use: the explicit one, else the configured default
    pub fn bucket(&self, explicit: Option<&str>) -> Result<String> {
        explicit
            .map(str::to_string)
            .or_else(|| self.config.store.bucket.clone())
            .filter(|bucket| !bucket.is_empty())
            .ok_or_else(|| {
                anyhow::Error::new(sc_core::Error::Config(
                    "no bucket given and store.bucket is not configured".into(),
                ))
            })
    }

    /// The collection root: the explicit one, else the configured one
    pub fn initial_prefix(&self, explicit: Option<&str>) -> String {
        explicit
            .map(str::to_string)
            .unwrap_or_else(|| self.config.store.initial_prefix.clone())
    }

    /// Key codec for the configured naming convention
    pub fn codec(&self) -> Result<KeyCodec> {
        KeyCodec::new(self.config.keys.clone()).context("invalid [keys] configuration")
    }

    /// Connect to the remote store
    pub async fn store(&self) -> Result<Arc<dyn ObjectStore>> {
        let client = S3Client::new(&self.config.store)
            .await
            .context("failed to create S3 client")?;
        Ok(Arc::new(client))
    }

    /// Open the disk cache in front of `store`
    pub fn cache(&self, store: Arc<dyn ObjectStore>) -> Result<ObjectCache> {
        let root = self
            .config
            .cache
            .resolve_root()
            .context("failed to resolve cache directory")?;
        tracing::debug!(root = %root.display(), "using cache");
        Ok(ObjectCache::new(root, store))
    }

    /// Open the disk cache for maintenance, without a remote store
    pub fn local_cache(&self) -> Result<ObjectCache> {
        self.cache(Arc::new(Detached))
    }
}

/// Store for cache maintenance commands, which never reach the remote side
struct Detached;

impl Detached {
    fn unavailable(path: &RemotePath) -> sc_core::Error {
        sc_core::Error::General(format!("{path}: no remote store in cache maintenance"))
    }
}

#[async_trait]
impl ObjectStore for Detached {
    async fn list_objects(&self, path: &RemotePath, _options: ListOptions) -> sc_core::Result<ListResult> {
        Err(Self::unavailable(path))
    }

    async fn head_object(&self, path: &RemotePath) -> sc_core::Result<ObjectInfo> {
        Err(Self::unavailable(path))
    }

    async fn get_object(&self, path: &RemotePath) -> sc_core::Result<Vec<u8>> {
        Err(Self::unavailable(path))
    }
}
