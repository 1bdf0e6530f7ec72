//! Configuration management for the image server.
//!
//! This module provides a flexible configuration system that supports:
//! - Command-line arguments via clap
//! - Environment variables with `IIIF_` prefix
//! - Sensible defaults for all optional settings
//!
//! # Environment Variables
//!
//! - `IIIF_HOST` - Server bind address (default: 0.0.0.0)
//! - `IIIF_PORT` - Server port (default: 3000)
//! - `IIIF_SOURCE` - Source backend, `fs` or `s3` (default: fs)
//! - `IIIF_ROOT_DIR` - Image directory for the `fs` backend
//! - `IIIF_EXTENSIONS` - Extensions tried when resolving identifiers
//! - `IIIF_S3_BUCKET` - S3 bucket name for the `s3` backend
//! - `IIIF_S3_PREFIX` - Key prefix prepended to identifiers
//! - `IIIF_S3_ENDPOINT` - Custom S3 endpoint for S3-compatible services
//! - `IIIF_S3_REGION` - AWS region (default: us-east-1)
//! - `IIIF_CACHE_TTL` - Derivative lifetime in seconds (default: 172800)
//! - `IIIF_CACHE_SIZE` - Derivative cache capacity in bytes
//! - `IIIF_CACHE_ENTRIES` - Maximum cached derivatives
//! - `IIIF_CACHE_SOURCES` - Maximum cached source metadata records
//! - `IIIF_CACHE_SWEEP_INTERVAL` - Seconds between expired-entry sweeps
//! - `IIIF_JPEG_QUALITY` - JPEG quality (default: 80)
//! - `IIIF_MAX_DIMENSION` - Largest output width or height (default: 10000)
//! - `IIIF_REQUEST_TIMEOUT` - Per-request deadline in seconds (default: 30)
//! - `IIIF_CACHE_MAX_AGE` - HTTP cache max-age seconds (default: 3600)
//! - `IIIF_CORS_ORIGINS` - Allowed CORS origins (comma-separated)

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};

use crate::derivative::{
    ServiceOptions, DEFAULT_CACHE_CAPACITY, DEFAULT_CACHE_TTL, DEFAULT_JPEG_QUALITY,
    DEFAULT_MAX_DIMENSION, DEFAULT_MAX_ENTRIES, DEFAULT_REQUEST_TIMEOUT,
};
use crate::source::{DEFAULT_EXTENSIONS, DEFAULT_SOURCE_CACHE_CAPACITY};

// =============================================================================
// Default Values
// =============================================================================

/// Default server host.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default server port.
pub const DEFAULT_PORT: u16 = 3000;

/// Default AWS region.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Default HTTP cache max-age in seconds (1 hour).
pub const DEFAULT_CACHE_MAX_AGE: u32 = 3600;

/// Default interval between expired-derivative sweeps, in seconds.
pub const DEFAULT_SWEEP_INTERVAL: u64 = 300;

// =============================================================================
// CLI Arguments
// =============================================================================

/// Where source images are read from.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceKind {
    /// Local directory
    #[default]
    Fs,
    /// S3 or S3-compatible object storage
    S3,
}

// =============================================================================
// Serve Configuration
// =============================================================================

/// IIIF image server.
///
/// Serves cropped, scaled, rotated and recolored derivatives of stored images
/// following the IIIF Image API (versions 1 and 2).
#[derive(Parser, Debug, Clone)]
#[command(name = "iiif-image-server")]
#[command(author, version, about, long_about = None)]
pub struct ServeConfig {
    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Host address to bind the server to.
    #[arg(long, default_value = DEFAULT_HOST, env = "IIIF_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "IIIF_PORT")]
    pub port: u16,

    // =========================================================================
    // Source Configuration
    // =========================================================================
    /// Source backend.
    #[arg(long, value_enum, default_value_t = SourceKind::Fs, env = "IIIF_SOURCE")]
    pub source: SourceKind,

    /// Directory holding source images (fs backend).
    #[arg(long, env = "IIIF_ROOT_DIR")]
    pub root_dir: Option<PathBuf>,

    /// Extensions tried, in order, when an identifier has none (fs backend).
    #[arg(long, env = "IIIF_EXTENSIONS", value_delimiter = ',')]
    pub extensions: Option<Vec<String>>,

    /// S3 bucket name containing the source images.
    #[arg(long, env = "IIIF_S3_BUCKET")]
    pub s3_bucket: Option<String>,

    /// Key prefix prepended to every identifier.
    #[arg(long, env = "IIIF_S3_PREFIX")]
    pub s3_prefix: Option<String>,

    /// Custom S3 endpoint URL for S3-compatible services (MinIO, etc.).
    #[arg(long, env = "IIIF_S3_ENDPOINT")]
    pub s3_endpoint: Option<String>,

    /// AWS region for S3.
    #[arg(long, default_value = DEFAULT_REGION, env = "IIIF_S3_REGION")]
    pub s3_region: String,

    // =========================================================================
    // Cache Configuration
    // =========================================================================
    /// Derivative lifetime in seconds.
    #[arg(long, default_value_t = DEFAULT_CACHE_TTL.as_secs(), env = "IIIF_CACHE_TTL")]
    pub cache_ttl: u64,

    /// Derivative cache capacity in bytes.
    #[arg(long, default_value_t = DEFAULT_CACHE_CAPACITY, env = "IIIF_CACHE_SIZE")]
    pub cache_size: usize,

    /// Maximum number of cached derivatives.
    #[arg(long, default_value_t = DEFAULT_MAX_ENTRIES, env = "IIIF_CACHE_ENTRIES")]
    pub cache_entries: usize,

    /// Maximum number of cached source metadata records.
    #[arg(long, default_value_t = DEFAULT_SOURCE_CACHE_CAPACITY, env = "IIIF_CACHE_SOURCES")]
    pub cache_sources: usize,

    /// Seconds between sweeps of expired derivatives.
    #[arg(long, default_value_t = DEFAULT_SWEEP_INTERVAL, env = "IIIF_CACHE_SWEEP_INTERVAL")]
    pub cache_sweep_interval: u64,

    // =========================================================================
    // Pipeline Configuration
    // =========================================================================
    /// JPEG quality for jpg output (1-100).
    #[arg(long, default_value_t = DEFAULT_JPEG_QUALITY, env = "IIIF_JPEG_QUALITY")]
    pub jpeg_quality: u8,

    /// Largest output width or height in pixels.
    #[arg(long, default_value_t = DEFAULT_MAX_DIMENSION, env = "IIIF_MAX_DIMENSION")]
    pub max_dimension: u32,

    /// Per-request deadline in seconds.
    #[arg(long, default_value_t = DEFAULT_REQUEST_TIMEOUT.as_secs(), env = "IIIF_REQUEST_TIMEOUT")]
    pub request_timeout: u64,

    /// HTTP Cache-Control max-age in seconds.
    #[arg(long, default_value_t = DEFAULT_CACHE_MAX_AGE, env = "IIIF_CACHE_MAX_AGE")]
    pub cache_max_age: u32,

    // =========================================================================
    // CORS Configuration
    // =========================================================================
    /// Allowed CORS origins (comma-separated).
    ///
    /// If not specified, allows any origin.
    #[arg(long, env = "IIIF_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Option<Vec<String>>,

    // =========================================================================
    // Logging Configuration
    // =========================================================================
    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Disable request tracing.
    #[arg(long, default_value_t = false)]
    pub no_tracing: bool,
}

impl ServeConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        match self.source {
            SourceKind::Fs => {
                if self.root_dir.is_none() {
                    return Err(
                        "The fs source needs a directory. Set --root-dir or IIIF_ROOT_DIR"
                            .to_string(),
                    );
                }
                if let Some(extensions) = &self.extensions {
                    if extensions.iter().any(|e| e.trim().is_empty()) {
                        return Err("extensions must not contain empty entries".to_string());
                    }
                }
            }
            SourceKind::S3 => {
                if self.s3_bucket.as_deref().unwrap_or("").is_empty() {
                    return Err(
                        "The s3 source needs a bucket. Set --s3-bucket or IIIF_S3_BUCKET"
                            .to_string(),
                    );
                }
            }
        }

        if self.cache_ttl == 0 {
            return Err("cache_ttl must be greater than 0".to_string());
        }
        if self.cache_size == 0 {
            return Err("cache_size must be greater than 0".to_string());
        }
        if self.cache_entries == 0 {
            return Err("cache_entries must be greater than 0".to_string());
        }
        if self.cache_sources == 0 {
            return Err("cache_sources must be greater than 0".to_string());
        }
        if self.cache_sweep_interval == 0 {
            return Err("cache_sweep_interval must be greater than 0".to_string());
        }

        if self.jpeg_quality == 0 || self.jpeg_quality > 100 {
            return Err("jpeg_quality must be between 1 and 100".to_string());
        }
        if self.max_dimension == 0 {
            return Err("max_dimension must be greater than 0".to_string());
        }
        if self.request_timeout == 0 {
            return Err("request_timeout must be greater than 0".to_string());
        }

        Ok(())
    }

    /// Get the server bind address as "host:port".
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Extensions for the fs resolver, falling back to the built-in list.
    pub fn extensions(&self) -> Vec<String> {
        match &self.extensions {
            Some(extensions) => extensions
                .iter()
                .map(|e| e.trim().trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            None => DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
        }
    }

    /// Derivative lifetime.
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl)
    }

    /// Interval between expired-derivative sweeps.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.cache_sweep_interval)
    }

    /// Pipeline tunables.
    pub fn service_options(&self) -> ServiceOptions {
        ServiceOptions {
            jpeg_quality: self.jpeg_quality,
            max_dimension: self.max_dimension,
            timeout: Duration::from_secs(self.request_timeout),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
