//! Derivative cache for encoded output images.
//!
//! # Cache Key
//!
//! Derivatives are cached by the fully resolved request:
//! - Identifier
//! - Protocol version
//! - Crop rectangle in source pixels
//! - Output dimensions
//! - Rotation angle and mirror flag
//! - Quality
//! - Output format
//!
//! Keys are built from resolved geometry rather than raw path strings, so
//! `full` and `0,0,W,H` on a W x H image share one entry.
//!
//! # Expiry and Eviction
//!
//! Entries older than the TTL are never returned. They are dropped lazily on
//! lookup and eagerly by [`DerivativeStore::purge_expired`]. Independently of
//! age, least-recently-used entries are evicted when the total payload size
//! or the entry count exceeds capacity.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use lru::LruCache;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;

use crate::error::CacheError;
use crate::iiif::{ApiVersion, CropRect, OutputFormat, Quality, Rotation};

/// Default entry lifetime: two days.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60 * 60 * 24 * 2);

/// Default cache capacity: 256MB
pub const DEFAULT_CACHE_CAPACITY: usize = 256 * 1024 * 1024;

/// Default maximum number of entries (to bound LRU overhead)
pub const DEFAULT_MAX_ENTRIES: usize = 10_000;

// =============================================================================
// Cache Key
// =============================================================================

/// Cache key for a derivative.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Source identifier
    pub identifier: Arc<str>,

    /// Protocol version
    pub version: ApiVersion,

    /// Crop rectangle in source pixels
    pub crop: CropRect,

    /// Output width and height before rotation
    pub size: (u32, u32),

    /// Bit pattern of the normalized rotation angle
    pub rotation_bits: u64,

    /// Horizontal mirror before rotation
    pub mirrored: bool,

    /// Requested quality
    pub quality: Quality,

    /// Output format
    pub format: OutputFormat,
}

impl CacheKey {
    /// Create a new cache key.
    pub fn new(
        identifier: impl Into<Arc<str>>,
        version: ApiVersion,
        crop: CropRect,
        size: (u32, u32),
        rotation: Rotation,
        quality: Quality,
        format: OutputFormat,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            version,
            crop,
            size,
            rotation_bits: rotation.angle_bits(),
            mirrored: rotation.mirrored,
            quality,
            format,
        }
    }

    /// Rotation this key was built from.
    pub fn rotation(&self) -> Rotation {
        Rotation::new(f64::from_bits(self.rotation_bits), self.mirrored)
    }

    /// Stable textual form of the key.
    pub fn canonical(&self) -> String {
        let rotation = self.rotation();
        format!(
            "{}/{}/{},{},{},{}/{},{}/{}{}/{}.{}",
            self.version,
            self.identifier,
            self.crop.x,
            self.crop.y,
            self.crop.width,
            self.crop.height,
            self.size.0,
            self.size.1,
            if self.mirrored { "!" } else { "" },
            rotation.angle,
            self.quality,
            self.format,
        )
    }

    /// Hex SHA-256 of the canonical form, used as the HTTP entity tag.
    pub fn digest(&self) -> String {
        hex::encode(Sha256::digest(self.canonical().as_bytes()))
    }
}

// =============================================================================
// Cache Entry
// =============================================================================

/// A stored derivative.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub payload: Bytes,
    pub mime: &'static str,
    pub created_at: Instant,
}

impl CacheEntry {
    /// Whether this entry has outlived `ttl` as of `now`.
    pub fn is_expired(&self, ttl: Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.created_at) >= ttl
    }
}

/// Snapshot of cache occupancy and effectiveness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub bytes: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
}

// =============================================================================
// Store Trait
// =============================================================================

/// Storage for derivatives.
///
/// Implementations must make each `store` atomic with respect to readers.
/// Errors are reported to the caller, which treats them as a cache miss.
#[async_trait]
pub trait DerivativeStore: Send + Sync {
    /// Get a live entry for `key`.
    async fn lookup(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError>;

    /// Store a payload, replacing any previous entry for the key.
    async fn store(&self, key: CacheKey, payload: Bytes, mime: &'static str)
        -> Result<(), CacheError>;

    /// Drop every entry derived from `identifier`. Returns how many were dropped.
    async fn invalidate(&self, identifier: &str) -> Result<usize, CacheError>;

    /// Drop expired entries. Returns how many were dropped.
    async fn purge_expired(&self) -> Result<usize, CacheError> {
        Ok(0)
    }

    /// Occupancy statistics, if the store tracks them.
    async fn stats(&self) -> Option<CacheStats> {
        None
    }
}

// =============================================================================
// In-Memory Cache
// =============================================================================

struct CacheState {
    entries: LruCache<CacheKey, CacheEntry>,
    size: usize,
}

impl CacheState {
    fn remove(&mut self, key: &CacheKey) -> bool {
        match self.entries.pop(key) {
            Some(entry) => {
                self.size = self.size.saturating_sub(entry.payload.len());
                true
            }
            None => false,
        }
    }

    fn remove_where(&mut self, predicate: impl Fn(&CacheEntry) -> bool) -> usize {
        let doomed: Vec<CacheKey> = self
            .entries
            .iter()
            .filter(|(_, entry)| predicate(entry))
            .map(|(key, _)| key.clone())
            .collect();

        doomed.iter().filter(|key| self.remove(key)).count()
    }
}

/// In-memory LRU derivative cache with TTL expiry and size-based capacity.
///
/// The cache is thread-safe and can be shared across async tasks via `Arc`.
///
/// # Example
///
/// ```
/// use iiif_image_server::derivative::{CacheKey, DerivativeCache, DerivativeStore};
/// use iiif_image_server::iiif::{ApiVersion, CropRect, OutputFormat, Quality, Rotation};
/// use bytes::Bytes;
///
/// #[tokio::main]
/// async fn main() {
///     let cache = DerivativeCache::new();
///
///     let key = CacheKey::new(
///         "cat-01",
///         ApiVersion::V2,
///         CropRect::full(100, 200),
///         (100, 200),
///         Rotation::NONE,
///         Quality::Default,
///         OutputFormat::Png,
///     );
///     let png = Bytes::from_static(b"\x89PNG");
///
///     cache.store(key.clone(), png.clone(), "image/png").await.unwrap();
///
///     let entry = cache.lookup(&key).await.unwrap().unwrap();
///     assert_eq!(entry.payload, png);
/// }
/// ```
pub struct DerivativeCache {
    state: RwLock<CacheState>,

    /// Entry lifetime
    ttl: Duration,

    /// Maximum total payload size in bytes
    max_size: usize,

    hits: AtomicU64,
    misses: AtomicU64,
}

impl DerivativeCache {
    /// Create a cache with default TTL and capacity.
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_CACHE_TTL, DEFAULT_CACHE_CAPACITY, DEFAULT_MAX_ENTRIES)
    }

    /// Create a cache with explicit limits.
    ///
    /// # Arguments
    ///
    /// * `ttl` - Entry lifetime
    /// * `max_size` - Maximum total payload size in bytes
    /// * `max_entries` - Maximum number of entries (zero is treated as one)
    pub fn with_limits(ttl: Duration, max_size: usize, max_entries: usize) -> Self {
        Self {
            state: RwLock::new(CacheState {
                entries: LruCache::new(NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN)),
                size: 0,
            }),
            ttl,
            max_size,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Entry lifetime.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Get the maximum capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.max_size
    }

    /// Get the current number of entries, expired ones included.
    pub async fn len(&self) -> usize {
        self.state.read().await.entries.len()
    }

    /// Check if the cache is empty.
    pub async fn is_empty(&self) -> bool {
        self.state.read().await.entries.is_empty()
    }

    /// Get the current total payload size in bytes.
    pub async fn size(&self) -> usize {
        self.state.read().await.size
    }

    /// Clear all entries from the cache.
    pub async fn clear(&self) {
        let mut state = self.state.write().await;
        state.entries.clear();
        state.size = 0;
    }

    fn record(&self, hit: bool) {
        let counter = if hit { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

impl Default for DerivativeCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DerivativeStore for DerivativeCache {
    async fn lookup(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError> {
        let now = Instant::now();
        let mut state = self.state.write().await;

        match state.entries.get(key) {
            None => {
                self.record(false);
                return Ok(None);
            }
            Some(entry) if !entry.is_expired(self.ttl, now) => {
                self.record(true);
                return Ok(Some(entry.clone()));
            }
            Some(_) => {}
        }

        state.remove(key);
        debug!(key = %key.canonical(), "Dropped expired derivative");
        self.record(false);
        Ok(None)
    }

    async fn store(
        &self,
        key: CacheKey,
        payload: Bytes,
        mime: &'static str,
    ) -> Result<(), CacheError> {
        let payload_size = payload.len();
        if payload_size > self.max_size {
            debug!(
                key = %key.canonical(),
                size = payload_size,
                capacity = self.max_size,
                "Derivative larger than cache capacity, not stored"
            );
            return Ok(());
        }

        let entry = CacheEntry {
            key: key.clone(),
            payload,
            mime,
            created_at: Instant::now(),
        };

        let mut state = self.state.write().await;

        // If key exists, subtract old size first
        state.remove(&key);

        // push() hands back whatever the entry-count bound displaced
        if let Some((_, displaced)) = state.entries.push(key, entry) {
            state.size = state.size.saturating_sub(displaced.payload.len());
        }
        state.size += payload_size;

        // Evict entries until we're under capacity
        while state.size > self.max_size {
            match state.entries.pop_lru() {
                Some((_, evicted)) => {
                    state.size = state.size.saturating_sub(evicted.payload.len());
                }
                None => break,
            }
        }

        Ok(())
    }

    async fn invalidate(&self, identifier: &str) -> Result<usize, CacheError> {
        let mut state = self.state.write().await;
        Ok(state.remove_where(|entry| &*entry.key.identifier == identifier))
    }

    async fn purge_expired(&self) -> Result<usize, CacheError> {
        let now = Instant::now();
        let ttl = self.ttl;
        let mut state = self.state.write().await;
        Ok(state.remove_where(|entry| entry.is_expired(ttl, now)))
    }

    async fn stats(&self) -> Option<CacheStats> {
        let state = self.state.read().await;
        Some(CacheStats {
            entries: state.entries.len(),
            bytes: state.size,
            capacity: self.max_size,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
