//! S3-compatible object storage backend.

use async_trait::async_trait;
use aws_sdk_s3::Client;
use bytes::Bytes;
use tracing::debug;

use super::decode::{decode_bytes, probe_bytes};
use super::{IdentifierResolver, SourceImage, SourceInfo, SourceLoader, SourceLocation};
use crate::error::SourceError;

/// Maps identifiers to object keys by prepending an optional prefix.
///
/// With prefix `images/`, identifier `cat-01.png` becomes key
/// `images/cat-01.png`. Existence is checked by the loader.
#[derive(Debug, Clone, Default)]
pub struct PrefixResolver {
    prefix: Option<String>,
}

impl PrefixResolver {
    pub fn new(prefix: Option<String>) -> Self {
        let prefix = prefix
            .map(|p| p.trim_matches('/').to_string())
            .filter(|p| !p.is_empty());
        Self { prefix }
    }

    pub fn key_for(&self, identifier: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}/{}", prefix, identifier),
            None => identifier.to_string(),
        }
    }
}

#[async_trait]
impl IdentifierResolver for PrefixResolver {
    async fn resolve(&self, identifier: &str) -> Result<SourceLocation, SourceError> {
        if identifier.is_empty() || identifier.split('/').any(|s| s == "..") {
            return Err(SourceError::NotFound(identifier.to_string()));
        }
        Ok(SourceLocation::new(self.key_for(identifier)))
    }
}

/// Fetches whole objects from a bucket and decodes them in memory.
#[derive(Clone)]
pub struct S3Loader {
    client: Client,
    bucket: String,
}

impl S3Loader {
    pub fn new(client: Client, bucket: String) -> Self {
        Self { client, bucket }
    }

    /// Get the bucket name.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn fetch(&self, key: &str) -> Result<Bytes, SourceError> {
        let uri = format!("s3://{}/{}", self.bucket, key);
        debug!(uri = %uri, "Fetching source object");

        let resp = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                let is_not_found = e
                    .as_service_error()
                    .map(|se| se.is_no_such_key())
                    .unwrap_or(false);

                // Some S3-compatible services answer with a bare 404
                let status_is_404 = e
                    .raw_response()
                    .map(|r| r.status().as_u16() == 404)
                    .unwrap_or(false);

                if is_not_found || status_is_404 {
                    return SourceError::NotFound(uri.clone());
                }

                SourceError::Storage(e.to_string())
            })?;

        let data = resp
            .body
            .collect()
            .await
            .map_err(|e| SourceError::Storage(e.to_string()))?
            .into_bytes();

        Ok(data)
    }
}

async fn decode_blocking<T, F>(data: Bytes, f: F) -> Result<T, SourceError>
where
    T: Send + 'static,
    F: FnOnce(&[u8]) -> Result<T, SourceError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || f(data.as_ref()))
        .await
        .map_err(|e| SourceError::Io(format!("blocking task failed: {}", e)))?
}

#[async_trait]
impl SourceLoader for S3Loader {
    async fn probe(&self, location: &SourceLocation) -> Result<SourceInfo, SourceError> {
        // Objects are not seekable in place; the header is read from a full fetch.
        let data = self.fetch(location.as_str()).await?;
        let (width, height, mode) = decode_blocking(data, probe_bytes).await?;
        Ok(SourceInfo {
            location: location.clone(),
            width,
            height,
            mode,
        })
    }

    async fn load(&self, location: &SourceLocation) -> Result<SourceImage, SourceError> {
        let data = self.fetch(location.as_str()).await?;
        decode_blocking(data, decode_bytes).await
    }
}

/// Create an S3 client with optional custom endpoint and region.
///
/// Use a custom endpoint for S3-compatible services like MinIO:
/// ```ignore
/// let client = create_s3_client(Some("http://localhost:9000"), "us-east-1").await;
/// ```
pub async fn create_s3_client(endpoint_url: Option<&str>, region: &str) -> Client {
    let region = aws_config::Region::new(region.to_string());
    let mut config_loader =
        aws_config::defaults(aws_config::BehaviorVersion::latest()).region(region);

    if let Some(endpoint) = endpoint_url {
        config_loader = config_loader.endpoint_url(endpoint);
    }

    let sdk_config = config_loader.load().await;

    // S3-compatible services generally need path-style addressing
    let s3_config = if endpoint_url.is_some() {
        aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(true)
            .build()
    } else {
        aws_sdk_s3::config::Builder::from(&sdk_config).build()
    };

    Client::from_conf(s3_config)
}
