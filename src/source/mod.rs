//! Source image access.
//!
//! Requests name images by an opaque identifier. Turning that identifier into
//! pixels happens in two pluggable steps:
//!
//! ```text
//! identifier ──► IdentifierResolver ──► SourceLocation
//!                                            │
//!                                            ▼
//!                                      SourceLoader
//!                                   probe │      │ load
//!                                         ▼      ▼
//!                                  SourceInfo  SourceImage
//! ```
//!
//! Probing reads only enough of the source to learn its dimensions and color
//! mode. The [`SourceRegistry`] caches probe results so that a request can be
//! resolved to a cache key without decoding the image.
//!
//! Two backends ship with the crate: local directories ([`DirectoryResolver`]
//! and [`FsLoader`]) and S3-compatible object storage ([`PrefixResolver`] and
//! [`S3Loader`]).

mod decode;
mod fs;
mod registry;
mod s3;

use std::fmt;

use async_trait::async_trait;
use image::DynamicImage;

use crate::error::SourceError;

pub use crate::iiif::ColorMode;
pub use decode::{color_mode_of, decode_bytes, probe_bytes};
pub use fs::{DirectoryResolver, FsLoader, DEFAULT_EXTENSIONS};
pub use registry::{SourceRegistry, DEFAULT_SOURCE_CACHE_CAPACITY};
pub use s3::{create_s3_client, PrefixResolver, S3Loader};

// =============================================================================
// Locations and Metadata
// =============================================================================

/// Where a source image lives, as understood by a [`SourceLoader`].
///
/// For the filesystem backend this is a path; for S3 it is an object key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceLocation(String);

impl SourceLocation {
    pub fn new(location: impl Into<String>) -> Self {
        Self(location.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Header-level metadata of a source image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceInfo {
    pub location: SourceLocation,
    pub width: u32,
    pub height: u32,
    pub mode: ColorMode,
}

/// Decoded pixels plus the native color mode they were stored in.
///
/// The mode is taken from the encoded file, not from the decoded buffer:
/// a 1-bit PNG decodes to an 8-bit luma buffer but is still bilevel.
#[derive(Debug, Clone)]
pub struct SourceImage {
    pub image: DynamicImage,
    pub mode: ColorMode,
}

impl SourceImage {
    pub fn new(image: DynamicImage, mode: ColorMode) -> Self {
        Self { image, mode }
    }

    /// Wrap a decoded image, deriving the mode from its pixel layout.
    pub fn from_image(image: DynamicImage) -> Self {
        let mode = color_mode_of(image.color().into());
        Self { image, mode }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

// =============================================================================
// Collaborator Traits
// =============================================================================

/// Maps an opaque identifier to a source location.
///
/// Implementations must not assume anything about the identifier's shape
/// beyond it being a string taken from the request path.
#[async_trait]
pub trait IdentifierResolver: Send + Sync {
    async fn resolve(&self, identifier: &str) -> Result<SourceLocation, SourceError>;
}

/// Reads source images from a storage backend.
#[async_trait]
pub trait SourceLoader: Send + Sync {
    /// Read dimensions and color mode without a full decode where possible.
    async fn probe(&self, location: &SourceLocation) -> Result<SourceInfo, SourceError>;

    /// Fully decode the image at `location`.
    async fn load(&self, location: &SourceLocation) -> Result<SourceImage, SourceError>;
}

/// Resolver backed by a plain function.
///
/// Returning `None` means the identifier is unknown.
///
/// ```
/// use iiif_image_server::source::{FnResolver, SourceLocation};
///
/// let resolver = FnResolver::new(|id: &str| {
///     id.strip_prefix("img-").map(|n| SourceLocation::new(format!("/data/{}.png", n)))
/// });
/// ```
pub struct FnResolver<F> {
    resolve: F,
}

impl<F> FnResolver<F>
where
    F: Fn(&str) -> Option<SourceLocation> + Send + Sync,
{
    pub fn new(resolve: F) -> Self {
        Self { resolve }
    }
}

#[async_trait]
impl<F> IdentifierResolver for FnResolver<F>
where
    F: Fn(&str) -> Option<SourceLocation> + Send + Sync,
{
    async fn resolve(&self, identifier: &str) -> Result<SourceLocation, SourceError> {
        (self.resolve)(identifier).ok_or_else(|| SourceError::NotFound(identifier.to_string()))
    }
}
