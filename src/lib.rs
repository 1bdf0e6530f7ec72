//! # IIIF Image Server
//!
//! An HTTP service that answers IIIF Image API (v1 and v2) requests with
//! derived views of stored images.
//!
//! A request names an image and five positional parameters: region, size,
//! rotation, quality and format. Each is validated against the protocol
//! grammar for its version, resolved against the source dimensions and color
//! mode, and applied in a fixed order (crop, scale, rotate, recolor, encode).
//! Results are kept in a derivative cache keyed by the normalized request.
//!
//! ## Features
//!
//! - **Strict grammar**: per-version parameter tables, first failing field reported
//! - **Full geometry**: pixel and percent regions, every size form, arbitrary rotation with mirroring
//! - **Quality/mode matrix**: requests a source mode cannot satisfy fail instead of approximating
//! - **Derivative cache**: TTL, byte and entry bounds, per-key single-flight
//! - **Pluggable sources**: local directory or S3-compatible object storage
//! - **Hooks**: lifecycle observers and an access gate around the pipeline
//!
//! ## Architecture
//!
//! - [`iiif`] - Protocol grammar, request validation and parameter resolvers
//! - [`source`] - Identifier resolution, source loading and metadata registry
//! - [`derivative`] - Transform executor, derivative cache, hooks and the pipeline service
//! - [`server`] - Axum-based HTTP server and routes
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use iiif_image_server::{
//!     create_router, DerivativeCache, DirectoryResolver, FsLoader, ImageService, RouterConfig,
//!     SourceRegistry,
//! };
//!
//! #[tokio::main]
//! async fn main() {
//!     let resolver = Arc::new(DirectoryResolver::new("/srv/images"));
//!     let registry = SourceRegistry::new(resolver, FsLoader::new());
//!     let service = ImageService::new(registry, Arc::new(DerivativeCache::new()));
//!
//!     let router = create_router(Arc::new(service), RouterConfig::new());
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await.unwrap();
//!     axum::serve(listener, router).await.unwrap();
//! }
//! ```

pub mod config;
pub mod derivative;
pub mod error;
pub mod iiif;
pub mod server;
pub mod source;

// Re-export commonly used types
pub use config::{ServeConfig, SourceKind};
pub use derivative::{
    AccessDenied, AccessGate, CacheEntry, CacheKey, CacheStats, DerivativeCache, DerivativeStore,
    Derivative, Hooks, ImageService, LifecycleEvent, LifecycleObserver, ServiceOptions,
    TracingObserver, TransformExecutor, TransformPlan,
};
pub use error::{CacheError, IiifError, SourceError};
pub use iiif::{
    ApiVersion, ColorAction, ColorMode, CropRect, ImageRequest, NormalizedRequest, OutputFormat,
    Quality, RegionSpec, Rotation, SizeSpec,
};
pub use server::{create_router, AppState, ErrorResponse, HealthResponse, RouterConfig};
pub use source::{
    create_s3_client, DirectoryResolver, FnResolver, FsLoader, IdentifierResolver, PrefixResolver,
    S3Loader, SourceImage, SourceInfo, SourceLoader, SourceLocation, SourceRegistry,
};
