//! Error types for sc-core
//!
//! One error type for the whole workspace. Each variant names the stage that
//! failed (key parsing, listing, fetching, caching) and maps to an exit code.

use thiserror::Error;

/// Result type alias for sc-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for sc-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid bucket/key path format
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Object key does not follow the key convention
    #[error("Malformed key '{key}': {reason}")]
    MalformedKey { key: String, reason: String },

    /// File-name pattern failed to compile
    #[error("Invalid pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    /// Remote object or bucket does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Remote store refused the request
    #[error("Access denied: {0}")]
    Auth(String),

    /// Network or service failure talking to the remote store
    #[error("Network error: {0}")]
    Network(String),

    /// Local cache could not be written
    #[error("Cache write failed for {path}: {source}")]
    CacheWrite {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// TOML serialization error
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// General error
    #[error("{0}")]
    General(String),
}

impl Error {
    /// Build a `MalformedKey` error
    pub fn malformed(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::MalformedKey {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Whether the error came from talking to the remote store
    pub const fn is_remote(&self) -> bool {
        matches!(
            self,
            Error::NotFound(_) | Error::Auth(_) | Error::Network(_)
        )
    }

    /// Get the appropriate exit code for this error
    pub const fn exit_code(&self) -> i32 {
        match self {
            Error::InvalidPath(_) => 2,       // UsageError
            Error::Config(_) => 2,            // UsageError
            Error::MalformedKey { .. } => 2,  // UsageError
            Error::InvalidPattern(_) => 2,    // UsageError
            Error::Network(_) => 3,           // NetworkError
            Error::Auth(_) => 4,              // AuthError
            Error::NotFound(_) => 5,          // NotFound
            _ => 1,                           // GeneralError
        }
    }
}
