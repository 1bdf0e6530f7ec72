//! Image Service for orchestrating derivative generation.
//!
//! The ImageService is the single entry point for image requests. Each
//! request moves through these states:
//!
//! ```text
//! Received ─► Validating ─► CacheCheck ─┬─► Done (hit)
//!                 │              │      │
//!                 ▼              ▼      └─► Resolving ─► Transforming ─► Encoding ─► CacheStore ─► Done
//!               Failed         Failed                         │              │
//!                                                             ▼              ▼
//!                                                           Failed         Failed
//! ```
//!
//! Geometry and quality are resolved against probed source metadata before
//! the cache is consulted, so a cache hit never decodes the source.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          ImageService                            │
//! │  ┌────────────────────────────────────────────────────────────┐  │
//! │  │                       process()                            │  │
//! │  │  1. Access gate        4. Check cache                      │  │
//! │  │  2. Validate params    5. Load + transform (single-flight) │  │
//! │  │  3. Resolve geometry   6. Cache & return                   │  │
//! │  └────────────────────────────────────────────────────────────┘  │
//! │        │                 │                    │                  │
//! │        ▼                 ▼                    ▼                  │
//! │  ┌────────────┐  ┌─────────────────┐  ┌───────────────────┐      │
//! │  │ Validator  │  │ SourceRegistry  │  │ TransformExecutor │      │
//! │  └────────────┘  └─────────────────┘  └───────────────────┘      │
//! │                          │                                       │
//! │                          ▼                                       │
//! │                  ┌─────────────────┐                             │
//! │                  │ DerivativeStore │                             │
//! │                  └─────────────────┘                             │
//! └──────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::error::IiifError;
use crate::iiif::{quality, ApiVersion, ImageRequest, NormalizedRequest};
use crate::source::{SourceInfo, SourceLoader, SourceRegistry};

use super::cache::{CacheKey, CacheStats, DerivativeStore};
use super::hooks::{Hooks, LifecycleEvent};
use super::transform::{TransformExecutor, TransformPlan, DEFAULT_JPEG_QUALITY};

/// Default largest output width or height.
pub const DEFAULT_MAX_DIMENSION: u32 = 10_000;

/// Default deadline for one request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// =============================================================================
// Options and Response
// =============================================================================

/// Tunables for the image service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceOptions {
    /// JPEG quality for jpg output (1-100)
    pub jpeg_quality: u8,

    /// Largest output width or height
    pub max_dimension: u32,

    /// Deadline for probe, decode, transform and encode together
    pub timeout: Duration,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            max_dimension: DEFAULT_MAX_DIMENSION,
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// A produced derivative.
#[derive(Debug, Clone)]
pub struct Derivative {
    /// Encoded image bytes
    pub data: Bytes,

    /// MIME type of `data`
    pub mime: &'static str,

    /// Whether this derivative was served from cache
    pub cache_hit: bool,

    /// Entity tag derived from the cache key
    pub etag: String,
}

// =============================================================================
// Single-flight
// =============================================================================

/// State for an in-flight derivative computation.
struct InFlightState {
    /// Notification for waiters
    notify: Notify,
    /// Result of the computation (set when complete)
    result: Mutex<Option<Result<Derivative, IiifError>>>,
}

type InFlightMap = Mutex<HashMap<CacheKey, Arc<InFlightState>>>;

/// Removes the leader's entry and wakes waiters, even if the leader is
/// dropped mid-computation. Waiters that find no result retry.
struct FlightGuard<'a> {
    in_flight: &'a InFlightMap,
    key: &'a CacheKey,
    state: &'a InFlightState,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(self.key);
        self.state.notify.notify_waiters();
    }
}

// =============================================================================
// Image Service
// =============================================================================

/// Service for generating and caching derivatives.
///
/// # Type Parameters
///
/// * `L` - The source loader (e.g., filesystem or S3)
///
/// # Example
///
/// ```ignore
/// use std::sync::Arc;
/// use iiif_image_server::derivative::{DerivativeCache, ImageService};
/// use iiif_image_server::iiif::ImageRequest;
/// use iiif_image_server::source::{DirectoryResolver, FsLoader, SourceRegistry};
///
/// let registry = SourceRegistry::new(Arc::new(DirectoryResolver::new("/images")), FsLoader::new());
/// let service = ImageService::new(registry, Arc::new(DerivativeCache::new()));
///
/// let request = ImageRequest::from_segments("v2", "cat-01", "full", "pct:50", "0", "default.png")?;
/// let derivative = service.process(request).await?;
/// println!("{} bytes of {}", derivative.data.len(), derivative.mime);
/// ```
pub struct ImageService<L: SourceLoader> {
    /// Source resolution and metadata
    registry: Arc<SourceRegistry<L>>,

    /// Derivative storage
    cache: Arc<dyn DerivativeStore>,

    /// Pixel pipeline
    executor: TransformExecutor,

    /// Observers and access gate
    hooks: Hooks,

    options: ServiceOptions,

    /// In-flight computations for singleflight pattern
    in_flight: InFlightMap,
}

impl<L: SourceLoader> ImageService<L> {
    /// Create a new image service with default options and no hooks.
    pub fn new(registry: SourceRegistry<L>, cache: Arc<dyn DerivativeStore>) -> Self {
        Self::with_shared_registry(Arc::new(registry), cache)
    }

    /// Create a new image service with a shared registry.
    pub fn with_shared_registry(
        registry: Arc<SourceRegistry<L>>,
        cache: Arc<dyn DerivativeStore>,
    ) -> Self {
        let options = ServiceOptions::default();
        Self {
            registry,
            cache,
            executor: TransformExecutor::new(options.jpeg_quality),
            hooks: Hooks::new(),
            options,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Replace the service options.
    pub fn with_options(mut self, options: ServiceOptions) -> Self {
        self.executor = TransformExecutor::new(options.jpeg_quality);
        self.options = options;
        self
    }

    /// Replace the registered hooks.
    pub fn with_hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Get the service options.
    pub fn options(&self) -> &ServiceOptions {
        &self.options
    }

    /// Get a reference to the underlying registry.
    pub fn registry(&self) -> &Arc<SourceRegistry<L>> {
        &self.registry
    }

    /// Produce the derivative for a request.
    ///
    /// This is the main entry point. Validation, geometry and quality errors
    /// are raised before any pixel work starts. Cache failures are logged and
    /// treated as misses.
    pub async fn process(&self, request: ImageRequest) -> Result<Derivative, IiifError> {
        self.hooks.authorize(&request)?;
        self.hooks
            .emit(LifecycleEvent::BeforeProcess, &request.identifier);

        let normalized = request.validate()?;
        self.hooks
            .emit(LifecycleEvent::AfterValidation, &normalized.identifier);

        let seconds = self.options.timeout.as_secs();
        let derivative = tokio::time::timeout(self.options.timeout, self.run(&normalized))
            .await
            .map_err(|_| {
                warn!(identifier = %normalized.identifier, seconds, "Request timed out");
                IiifError::Timeout { seconds }
            })??;

        self.hooks
            .emit(LifecycleEvent::AfterProcess, &normalized.identifier);
        Ok(derivative)
    }

    async fn run(&self, request: &NormalizedRequest) -> Result<Derivative, IiifError> {
        let info = self
            .registry
            .info(&request.identifier)
            .await
            .map_err(|e| IiifError::source(&request.identifier, e))?;

        let (key, plan) = self.plan(request, &info)?;

        self.compute_once(&key, &info, plan).await
    }

    /// Look up a derivative. Store failures count as misses.
    async fn cached(&self, key: &CacheKey) -> Option<Derivative> {
        match self.cache.lookup(key).await {
            Ok(Some(entry)) => {
                debug!(key = %key.canonical(), "Derivative cache hit");
                Some(Derivative {
                    data: entry.payload,
                    mime: entry.mime,
                    cache_hit: true,
                    etag: key.digest(),
                })
            }
            Ok(None) => {
                debug!(key = %key.canonical(), "Derivative cache miss");
                None
            }
            Err(e) => {
                warn!(key = %key.canonical(), error = %e, "Cache lookup failed, computing directly");
                None
            }
        }
    }

    /// Resolve every parameter against the source metadata.
    fn plan(
        &self,
        request: &NormalizedRequest,
        info: &SourceInfo,
    ) -> Result<(CacheKey, TransformPlan), IiifError> {
        let crop = request.region.resolve(info.width, info.height)?;
        let size = request.size.resolve(crop.width, crop.height)?;

        let max = self.options.max_dimension;
        if size.0 > max || size.1 > max {
            return Err(IiifError::geometry(format!(
                "requested size {}x{} exceeds the {} pixel limit",
                size.0, size.1, max
            )));
        }

        let color = quality::resolve(request.quality, info.mode)?;

        if request.format.encoder().is_none() {
            return Err(IiifError::Encoding {
                message: format!("no encoder available for {}", request.format.mime()),
            });
        }

        let key = CacheKey::new(
            request.identifier.as_str(),
            request.version,
            crop,
            size,
            request.rotation,
            request.quality,
            request.format,
        );
        let plan = TransformPlan {
            crop,
            size,
            rotation: request.rotation,
            color,
            format: request.format,
        };
        Ok((key, plan))
    }

    /// Serve a derivative from cache or compute it, sharing the work among
    /// concurrent identical requests.
    ///
    /// Only the leader consults the cache. A previous leader stores its
    /// result before leaving the map, so a new leader always sees it.
    async fn compute_once(
        &self,
        key: &CacheKey,
        info: &SourceInfo,
        plan: TransformPlan,
    ) -> Result<Derivative, IiifError> {
        loop {
            let (state, leader) = {
                let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
                match in_flight.get(key) {
                    Some(state) => (state.clone(), false),
                    None => {
                        let state = Arc::new(InFlightState {
                            notify: Notify::new(),
                            result: Mutex::new(None),
                        });
                        in_flight.insert(key.clone(), state.clone());
                        (state, true)
                    }
                }
            };

            if leader {
                let _guard = FlightGuard {
                    in_flight: &self.in_flight,
                    key,
                    state: &state,
                };
                let result = match self.cached(key).await {
                    Some(hit) => Ok(hit),
                    None => self.compute(key, info, plan).await,
                };
                *state.result.lock().unwrap_or_else(PoisonError::into_inner) = Some(result.clone());
                return result;
            }

            // Register interest before checking, so a completion between the
            // check and the await is not missed
            let notified = state.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let done = state.result.lock().unwrap_or_else(PoisonError::into_inner).clone();
            if let Some(result) = done {
                return result;
            }
            notified.await;
            let done = state.result.lock().unwrap_or_else(PoisonError::into_inner).clone();
            if let Some(result) = done {
                return result;
            }

            // Leader was abandoned without a result; try again
        }
    }

    async fn compute(
        &self,
        key: &CacheKey,
        info: &SourceInfo,
        plan: TransformPlan,
    ) -> Result<Derivative, IiifError> {
        let identifier = &*key.identifier;
        let source = self
            .registry
            .load(info)
            .await
            .map_err(|e| IiifError::source(identifier, e))?;

        if (source.width(), source.height()) != (info.width, info.height) {
            // Probed metadata is stale; forget it so the next request re-probes
            warn!(
                identifier = %identifier,
                probed = ?(info.width, info.height),
                loaded = ?(source.width(), source.height()),
                "Source dimensions changed since probe"
            );
            self.registry.invalidate(identifier).await;
            return Err(IiifError::geometry("source dimensions changed during processing"));
        }

        let executor = self.executor;
        let data = tokio::task::spawn_blocking(move || executor.execute(source.image, &plan))
            .await
            .map_err(|e| IiifError::Encoding {
                message: format!("transform task failed: {}", e),
            })??;

        let mime = plan.format.mime();
        debug!(key = %key.canonical(), bytes = data.len(), "Derivative computed");

        if let Err(e) = self.cache.store(key.clone(), data.clone(), mime).await {
            warn!(key = %key.canonical(), error = %e, "Cache store failed");
        }

        Ok(Derivative {
            data,
            mime,
            cache_hit: false,
            etag: key.digest(),
        })
    }

    /// Get source metadata for an identifier, subject to the access gate.
    pub async fn info(&self, version: ApiVersion, identifier: &str) -> Result<SourceInfo, IiifError> {
        self.hooks
            .authorize(&ImageRequest::new(version, identifier))?;
        self.registry
            .info(identifier)
            .await
            .map_err(|e| IiifError::source(identifier, e))
    }

    /// Drop cached metadata and derivatives for a changed source.
    ///
    /// Returns the number of derivatives removed.
    pub async fn invalidate(&self, identifier: &str) -> Result<usize, IiifError> {
        self.registry.invalidate(identifier).await;
        let removed = self.cache.invalidate(identifier).await?;
        debug!(identifier = %identifier, removed, "Invalidated source");
        Ok(removed)
    }

    /// Remove expired derivatives. Returns the number removed.
    pub async fn purge_expired(&self) -> Result<usize, IiifError> {
        Ok(self.cache.purge_expired().await?)
    }

    /// Get derivative cache statistics, if the store tracks them.
    pub async fn cache_stats(&self) -> Option<CacheStats> {
        self.cache.stats().await
    }
}

// =============================================================================
// Tests
// =============================================================================
