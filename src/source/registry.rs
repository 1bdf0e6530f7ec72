//! Source Registry for probing and caching source metadata.
//!
//! The registry provides:
//! - Identifier resolution through a pluggable [`IdentifierResolver`]
//! - LRU caching of probed metadata (dimensions and color mode)
//! - Singleflight so concurrent first requests for one identifier probe once
//!
//! Decoded pixels are never cached here. Only the derivative cache holds
//! image bytes beyond a single request.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, PoisonError};

use lru::LruCache;
use tokio::sync::{Notify, RwLock};
use tracing::debug;

use super::{IdentifierResolver, SourceImage, SourceInfo, SourceLoader};
use crate::error::SourceError;

/// Default number of probed sources to remember.
pub const DEFAULT_SOURCE_CACHE_CAPACITY: usize = 1024;

// =============================================================================
// SourceRegistry
// =============================================================================

/// Resolves identifiers and caches what is known about each source.
pub struct SourceRegistry<L: SourceLoader> {
    /// Identifier to location mapping
    resolver: Arc<dyn IdentifierResolver>,

    /// Storage backend
    loader: L,

    /// Probed metadata indexed by identifier
    cache: RwLock<LruCache<String, SourceInfo>>,

    /// In-flight probes for singleflight pattern
    in_flight: InFlightMap,
}

/// State for an in-flight probe.
struct InFlightState {
    /// Notification for waiters
    notify: Notify,
    /// Result of the probe (set when complete)
    result: Mutex<Option<Result<SourceInfo, SourceError>>>,
}

type InFlightMap = Mutex<HashMap<String, Arc<InFlightState>>>;

/// Clears a probe leader's slot and wakes its waiters when the leader
/// finishes or is dropped. Waiters that find no result probe again.
struct ProbeGuard<'a> {
    in_flight: &'a InFlightMap,
    identifier: &'a str,
    state: &'a InFlightState,
}

impl Drop for ProbeGuard<'_> {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(self.identifier);
        self.state.notify.notify_waiters();
    }
}

impl<L: SourceLoader> SourceRegistry<L> {
    /// Create a registry with the default metadata cache capacity.
    pub fn new(resolver: Arc<dyn IdentifierResolver>, loader: L) -> Self {
        Self::with_capacity(resolver, loader, DEFAULT_SOURCE_CACHE_CAPACITY)
    }

    /// Create a registry remembering at most `capacity` sources.
    ///
    /// A capacity of zero is treated as one.
    pub fn with_capacity(resolver: Arc<dyn IdentifierResolver>, loader: L, capacity: usize) -> Self {
        Self {
            resolver,
            loader,
            cache: RwLock::new(LruCache::new(NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN))),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Get the storage backend.
    pub fn loader(&self) -> &L {
        &self.loader
    }

    /// Get metadata for an identifier, resolving and probing it on first use.
    ///
    /// Concurrent first requests share one probe. If the probing request is
    /// cancelled, the next waiter takes over.
    pub async fn info(&self, identifier: &str) -> Result<SourceInfo, SourceError> {
        loop {
            // Fast path: check cache
            {
                let mut cache = self.cache.write().await;
                if let Some(info) = cache.get(identifier) {
                    return Ok(info.clone());
                }
            }

            // Slow path: join an in-flight probe or become leader
            let (state, leader) = {
                let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
                match in_flight.get(identifier) {
                    Some(state) => (state.clone(), false),
                    None => {
                        let state = Arc::new(InFlightState {
                            notify: Notify::new(),
                            result: Mutex::new(None),
                        });
                        in_flight.insert(identifier.to_string(), state.clone());
                        (state, true)
                    }
                }
            };

            if leader {
                let _guard = ProbeGuard {
                    in_flight: &self.in_flight,
                    identifier,
                    state: &state,
                };
                let result = self.probe_internal(identifier).await;

                if let Ok(ref info) = result {
                    let mut cache = self.cache.write().await;
                    cache.put(identifier.to_string(), info.clone());
                }
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

            debug!(identifier = %identifier, "Probe abandoned, retrying");
        }
    }

    async fn probe_internal(&self, identifier: &str) -> Result<SourceInfo, SourceError> {
        let location = self.resolver.resolve(identifier).await?;
        let info = self.loader.probe(&location).await?;
        debug!(
            identifier = %identifier,
            location = %info.location,
            width = info.width,
            height = info.height,
            mode = %info.mode,
            "Probed source"
        );
        Ok(info)
    }

    /// Fully decode a source previously returned by [`info`](Self::info).
    pub async fn load(&self, info: &SourceInfo) -> Result<SourceImage, SourceError> {
        self.loader.load(&info.location).await
    }

    /// Forget an identifier so the next request resolves and probes again.
    pub async fn invalidate(&self, identifier: &str) -> bool {
        let mut cache = self.cache.write().await;
        cache.pop(identifier).is_some()
    }

    /// Clear all cached metadata.
    pub async fn clear(&self) {
        let mut cache = self.cache.write().await;
        cache.clear();
    }

    /// Get the number of cached sources.
    pub async fn cached_count(&self) -> usize {
        let cache = self.cache.read().await;
        cache.len()
    }
}

// =============================================================================
// Tests
// =============================================================================
