//! sc-core: Core library for statcache
//!
//! This crate provides the core functionality for statcache, including:
//! - Configuration management
//! - Object key decomposition under a configurable naming convention
//! - Range selection over bucket listings
//! - A disk cache in front of the remote store
//! - Bounded diagnostic printing of selections
//!
//! It is independent of any S3 SDK; the remote store is reached through the
//! [`ObjectStore`] trait.

pub mod cache;
pub mod config;
pub mod error;
pub mod key;
pub mod path;
pub mod report;
pub mod select;
pub mod traits;

pub use cache::{CacheEntry, CachedObject, ExpireReport, ObjectCache, Origin};
pub use config::{Config, ConfigManager};
pub use error::{Error, Result};
pub use key::{KeyCodec, KeyConvention, KeyParts};
pub use path::{parse_path, RemotePath};
pub use report::{print_selection, SelectionReporter};
pub use select::{list_range_objects, RangeQuery, RangeSelector, Selection};
pub use traits::{ListOptions, ListResult, ObjectInfo, ObjectStore};
