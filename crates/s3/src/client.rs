//! S3 client implementation
//!
//! Wraps aws-sdk-s3 and implements the read-only ObjectStore trait from
//! sc-core. Retries and timeouts are configured on the SDK client.

use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_smithy_types::retry::RetryConfig;
use aws_smithy_types::timeout::TimeoutConfig;

use sc_core::config::StoreConfig;
use sc_core::{Error, ListOptions, ListResult, ObjectInfo, ObjectStore, RemotePath, Result};

/// S3 client wrapper
pub struct S3Client {
    inner: aws_sdk_s3::Client,
}

impl S3Client {
    /// Create a new S3 client from the store configuration
    ///
    /// Credentials come from the default AWS provider chain.
    pub async fn new(config: &StoreConfig) -> Result<Self> {
        if config.max_attempts == 0 {
            return Err(Error::Config("store.max_attempts must be at least 1".into()));
        }

        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .retry_config(RetryConfig::standard().with_max_attempts(config.max_attempts))
            .timeout_config(
                TimeoutConfig::builder()
                    .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
                    .read_timeout(Duration::from_millis(config.read_timeout_ms))
                    .build(),
            );

        if let Some(region) = &config.region {
            loader = loader.region(aws_config::Region::new(region.clone()));
        }
        if let Some(endpoint) = &config.endpoint {
            loader = loader.endpoint_url(endpoint);
        }

        let sdk_config = loader.load().await;
        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(config.force_path_style)
            .build();

        tracing::debug!(
            endpoint = config.endpoint.as_deref().unwrap_or("aws"),
            max_attempts = config.max_attempts,
            "S3 client ready"
        );

        Ok(Self {
            inner: aws_sdk_s3::Client::from_conf(s3_config),
        })
    }

    /// Get the underlying aws-sdk-s3 client
    pub fn inner(&self) -> &aws_sdk_s3::Client {
        &self.inner
    }
}

#[async_trait]
impl ObjectStore for S3Client {
    async fn list_objects(&self, path: &RemotePath, options: ListOptions) -> Result<ListResult> {
        let mut request = self.inner.list_objects_v2().bucket(&path.bucket);

        if !path.key.is_empty() {
            request = request.prefix(&path.key);
        }

        // Set delimiter (for non-recursive listing)
        if !options.recursive {
            request = request.delimiter(options.delimiter.as_deref().unwrap_or("/"));
        }

        if let Some(max) = options.max_keys {
            request = request.max_keys(max);
        }

        if let Some(token) = &options.continuation_token {
            request = request.continuation_token(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| classify(e, &path.to_string()))?;

        let mut items = Vec::new();

        for prefix in response.common_prefixes() {
            if let Some(p) = prefix.prefix() {
                items.push(ObjectInfo::dir(&path.bucket, p));
            }
        }

        for object in response.contents() {
            let key = object.key().unwrap_or_default();
            let mut info = ObjectInfo::file(&path.bucket, key, object.size().unwrap_or(0));
            info.last_modified = object.last_modified().and_then(to_timestamp);
            info.etag = object.e_tag().map(|etag| etag.trim_matches('"').to_string());
            info.storage_class = object.storage_class().map(|sc| sc.as_str().to_string());
            items.push(info);
        }

        tracing::debug!(
            %path,
            count = items.len(),
            truncated = response.is_truncated().unwrap_or(false),
            "listed page"
        );

        Ok(ListResult {
            items,
            truncated: response.is_truncated().unwrap_or(false),
            continuation_token: response.next_continuation_token().map(|s| s.to_string()),
        })
    }

    async fn head_object(&self, path: &RemotePath) -> Result<ObjectInfo> {
        let response = self
            .inner
            .head_object()
            .bucket(&path.bucket)
            .key(&path.key)
            .send()
            .await
            .map_err(|e| classify(e, &path.to_string()))?;

        let mut info = ObjectInfo::file(&path.bucket, &path.key, response.content_length().unwrap_or(0));
        info.last_modified = response.last_modified().and_then(to_timestamp);
        info.etag = response.e_tag().map(|etag| etag.trim_matches('"').to_string());
        info.storage_class = response.storage_class().map(|sc| sc.as_str().to_string());

        Ok(info)
    }

    async fn get_object(&self, path: &RemotePath) -> Result<Vec<u8>> {
        let response = self
            .inner
            .get_object()
            .bucket(&path.bucket)
            .key(&path.key)
            .send()
            .await
            .map_err(|e| classify(e, &path.to_string()))?;

        let data = response
            .body
            .collect()
            .await
            .map_err(|e| Error::Network(format!("{path}: {e}")))?
            .into_bytes()
            .to_vec();

        tracing::debug!(%path, bytes = data.len(), "fetched object");
        Ok(data)
    }
}

/// Convert an SDK timestamp
fn to_timestamp(dt: &aws_smithy_types::DateTime) -> Option<jiff::Timestamp> {
    jiff::Timestamp::new(dt.secs(), dt.subsec_nanos() as i32).ok()
}

/// Map an SDK failure onto the sc-core error taxonomy
fn classify<E, R>(err: SdkError<E, R>, what: &str) -> Error
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    let code = err.code().map(str::to_string);
    let message = DisplayErrorContext(&err).to_string();
    classify_parts(code.as_deref(), &message, what)
}

fn classify_parts(code: Option<&str>, message: &str, what: &str) -> Error {
    match code {
        Some("NoSuchKey" | "NotFound" | "NoSuchBucket") => Error::NotFound(what.to_string()),
        Some(
            "AccessDenied" | "Forbidden" | "InvalidAccessKeyId" | "SignatureDoesNotMatch"
            | "ExpiredToken",
        ) => Error::Auth(format!("{what}: {message}")),
        _ if message.contains("NoSuchKey") || message.contains("NoSuchBucket") => {
            Error::NotFound(what.to_string())
        }
        _ if message.contains("AccessDenied") || message.contains("Forbidden") => {
            Error::Auth(format!("{what}: {message}"))
        }
        _ => Error::Network(format!("{what}: {message}")),
    }
}
