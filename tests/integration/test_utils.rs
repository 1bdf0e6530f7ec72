//! Test utilities for integration tests.
//!
//! Fixtures are real image files in a temporary directory, served through the
//! filesystem backend. A wrapping loader counts full decodes so tests can
//! tell cache hits from recomputation.

use std::io::Cursor;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use bytes::Bytes;
use http_body_util::BodyExt;
use image::{DynamicImage, GrayImage, ImageFormat, Luma, Rgb, RgbImage, Rgba, RgbaImage};
use tempfile::TempDir;
use tower::ServiceExt;

use iiif_image_server::derivative::{DerivativeCache, Hooks, ImageService};
use iiif_image_server::error::SourceError;
use iiif_image_server::server::{create_router, RouterConfig};
use iiif_image_server::source::{
    DirectoryResolver, FsLoader, SourceImage, SourceInfo, SourceLoader, SourceLocation,
    SourceRegistry,
};

/// Prefix of every image API route.
pub const API: &str = "/api/multimedia/image";

// =============================================================================
// Counting Loader
// =============================================================================

/// Filesystem loader that counts full decodes.
#[derive(Clone, Default)]
pub struct CountingLoader {
    inner: FsLoader,
    loads: Arc<AtomicUsize>,
    probes: Arc<AtomicUsize>,
}

impl CountingLoader {
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn probe_count(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceLoader for CountingLoader {
    async fn probe(&self, location: &SourceLocation) -> Result<SourceInfo, SourceError> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        self.inner.probe(location).await
    }

    async fn load(&self, location: &SourceLocation) -> Result<SourceImage, SourceError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.inner.load(location).await
    }
}

// =============================================================================
// Image Fixtures
// =============================================================================

/// RGB gradient.
pub fn gradient_rgb(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    }))
}

/// RGBA gradient with a varying alpha channel.
pub fn gradient_rgba(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgba8(RgbaImage::from_fn(width, height, |x, y| {
        Rgba([(x * 4 % 256) as u8, (y * 4 % 256) as u8, 64, ((x + y) % 256) as u8])
    }))
}

/// Grayscale gradient.
pub fn gradient_gray(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageLuma8(GrayImage::from_fn(width, height, |x, _| {
        Luma([(x * 5 % 256) as u8])
    }))
}

/// Write an image as PNG under `dir`.
pub fn write_png(dir: &Path, name: &str, image: &DynamicImage) {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    image.save_with_format(&path, ImageFormat::Png).unwrap();
}

/// Decode a response body.
pub fn decode(data: &[u8]) -> DynamicImage {
    image::ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .unwrap()
        .decode()
        .unwrap()
}

/// Check if data is a valid JPEG (starts with SOI, ends with EOI).
pub fn is_valid_jpeg(data: &[u8]) -> bool {
    data.len() >= 4
        && data[0] == 0xFF
        && data[1] == 0xD8
        && data[data.len() - 2] == 0xFF
        && data[data.len() - 1] == 0xD9
}

/// Check the PNG signature.
pub fn is_png(data: &[u8]) -> bool {
    data.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A])
}

/// Check the GIF signature.
pub fn is_gif(data: &[u8]) -> bool {
    data.starts_with(b"GIF8")
}

// =============================================================================
// Test Server
// =============================================================================

/// Router plus the handles tests inspect.
pub struct TestServer {
    pub router: Router,
    pub loader: CountingLoader,
    pub service: Arc<ImageService<CountingLoader>>,
    _dir: TempDir,
}

impl TestServer {
    /// Server over the standard fixtures.
    pub fn new() -> Self {
        Self::with(RouterConfig::new().with_tracing(false), Hooks::new())
    }

    /// Server with a custom router configuration.
    pub fn with_config(config: RouterConfig) -> Self {
        Self::with(config, Hooks::new())
    }

    /// Server with custom hooks.
    pub fn with_hooks(hooks: Hooks) -> Self {
        Self::with(RouterConfig::new().with_tracing(false), hooks)
    }

    fn with(config: RouterConfig, hooks: Hooks) -> Self {
        let dir = tempfile::tempdir().unwrap();
        write_png(dir.path(), "cat-01.png", &gradient_rgb(100, 200));
        write_png(dir.path(), "square.png", &gradient_rgb(200, 200));
        write_png(dir.path(), "small.png", &gradient_rgb(100, 100));
        write_png(dir.path(), "alpha.png", &gradient_rgba(64, 64));
        write_png(dir.path(), "gray.png", &gradient_gray(50, 50));
        write_png(dir.path(), "collection/dog-02.png", &gradient_rgb(40, 30));

        let loader = CountingLoader::default();
        let resolver = Arc::new(DirectoryResolver::new(dir.path()));
        let registry = SourceRegistry::new(resolver, loader.clone());
        let service = Arc::new(
            ImageService::new(registry, Arc::new(DerivativeCache::new())).with_hooks(hooks),
        );
        let router = create_router(Arc::clone(&service), config);

        Self {
            router,
            loader,
            service,
            _dir: dir,
        }
    }

    /// Issue a GET request.
    pub async fn get(&self, uri: &str) -> Response<Body> {
        self.send(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
    }

    /// Issue an arbitrary request.
    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }
}

/// Build an image URI under the API prefix.
pub fn image_uri(version: &str, id: &str, region: &str, size: &str, rotation: &str, file: &str) -> String {
    format!("{}/{}/{}/{}/{}/{}/{}", API, version, id, region, size, rotation, file)
}

/// Collect a response body.
pub async fn body_bytes(response: Response<Body>) -> Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

/// Collect a response body as JSON.
pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

/// Read a header as a string.
pub fn header<'a>(response: &'a Response<Body>, name: &str) -> Option<&'a str> {
    response.headers().get(name).and_then(|v| v.to_str().ok())
}
