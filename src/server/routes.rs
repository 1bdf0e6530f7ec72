//! Router configuration for the image server.
//!
//! This module defines the HTTP routes and applies CORS and request tracing.
//! Access control is not an HTTP concern here; it runs as the pipeline's
//! access gate so it covers every entry point.
//!
//! # Route Structure
//!
//! ```text
//! /health                                                                  - Health check
//! /api/multimedia/image/{version}/{identifier}/info.json                   - Image information
//! /api/multimedia/image/{version}/{identifier}/{region}/{size}/{rotation}/{quality}.{format}
//!                                                                          - Derivative
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use iiif_image_server::derivative::{DerivativeCache, ImageService};
//! use iiif_image_server::server::routes::{create_router, RouterConfig};
//! use iiif_image_server::source::{DirectoryResolver, FsLoader, SourceRegistry};
//!
//! let registry = SourceRegistry::new(Arc::new(DirectoryResolver::new("/srv/images")), FsLoader);
//! let service = ImageService::new(registry, Arc::new(DerivativeCache::new()));
//!
//! let config = RouterConfig::new()
//!     .with_cors_origins(vec!["https://example.com".to_string()]);
//!
//! let router = create_router(Arc::new(service), config);
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//! axum::serve(listener, router).await?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use axum::{routing::get, Router};
use http::header::{CONTENT_TYPE, IF_NONE_MATCH};
use http::Method;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers::{
    health_handler, image_handler, info_handler, AppState, DEFAULT_CACHE_MAX_AGE,
};
use crate::derivative::ImageService;
use crate::source::SourceLoader;

/// Mount point of the image API.
pub const IMAGE_API_PREFIX: &str = "/api/multimedia/image";

// =============================================================================
// Router Configuration
// =============================================================================

/// Configuration for the HTTP router.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Allowed CORS origins (None = allow any origin)
    pub cors_origins: Option<Vec<String>>,

    /// Cache-Control max-age in seconds
    pub cache_max_age: u32,

    /// Whether to enable request tracing
    pub enable_tracing: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl RouterConfig {
    /// Create a router configuration.
    ///
    /// By default CORS allows any origin, the cache max-age is one hour and
    /// tracing is on.
    pub fn new() -> Self {
        Self {
            cors_origins: None,
            cache_max_age: DEFAULT_CACHE_MAX_AGE,
            enable_tracing: true,
        }
    }

    /// Set specific allowed CORS origins.
    ///
    /// Pass an empty vec to disallow all cross-origin requests.
    /// Pass None (or don't call this method) to allow any origin.
    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = Some(origins);
        self
    }

    /// Allow any CORS origin.
    pub fn with_cors_any_origin(mut self) -> Self {
        self.cors_origins = None;
        self
    }

    /// Set the Cache-Control max-age in seconds.
    pub fn with_cache_max_age(mut self, seconds: u32) -> Self {
        self.cache_max_age = seconds;
        self
    }

    /// Enable or disable request tracing.
    pub fn with_tracing(mut self, enabled: bool) -> Self {
        self.enable_tracing = enabled;
        self
    }
}

// =============================================================================
// Router Builder
// =============================================================================

/// Create the main application router.
///
/// Builds the health route and the image API under [`IMAGE_API_PREFIX`],
/// with CORS and optional request tracing.
pub fn create_router<L>(service: Arc<ImageService<L>>, config: RouterConfig) -> Router
where
    L: SourceLoader + 'static,
{
    let app_state = AppState::with_cache_max_age(service, config.cache_max_age);

    let router = Router::new()
        .route("/health", get(health_handler::<L>))
        .with_state(app_state.clone())
        .nest(IMAGE_API_PREFIX, image_routes(app_state))
        .layer(build_cors_layer(&config));

    if config.enable_tracing {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    }
}

/// Routes of the image API, relative to [`IMAGE_API_PREFIX`].
///
/// `info.json` has three segments and a derivative has six, so the two
/// patterns never compete.
fn image_routes<L>(app_state: AppState<L>) -> Router
where
    L: SourceLoader + 'static,
{
    Router::new()
        .route("/{version}/{identifier}/info.json", get(info_handler::<L>))
        .route(
            "/{version}/{identifier}/{region}/{size}/{rotation}/{filename}",
            get(image_handler::<L>),
        )
        .with_state(app_state)
}

/// Build the CORS layer based on configuration.
fn build_cors_layer(config: &RouterConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::HEAD, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, IF_NONE_MATCH])
        .max_age(Duration::from_secs(86400)); // 24 hours

    match &config.cors_origins {
        None => cors.allow_origin(Any),
        Some(origins) if origins.is_empty() => cors,
        Some(origins) => {
            let parsed_origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
            cors.allow_origin(parsed_origins)
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
