//! Derivative production: the transform pipeline, its cache, and the
//! orchestrating service.

pub mod cache;
pub mod hooks;
pub mod service;
pub mod transform;

pub use cache::{
    CacheEntry, CacheKey, CacheStats, DerivativeCache, DerivativeStore, DEFAULT_CACHE_CAPACITY,
    DEFAULT_CACHE_TTL, DEFAULT_MAX_ENTRIES,
};
pub use hooks::{
    AccessDenied, AccessGate, Hooks, LifecycleEvent, LifecycleObserver, TracingObserver,
};
pub use service::{
    Derivative, ImageService, ServiceOptions, DEFAULT_MAX_DIMENSION, DEFAULT_REQUEST_TIMEOUT,
};
pub use transform::{
    PipelineStage, TransformExecutor, TransformPlan, DEFAULT_JPEG_QUALITY, MAX_JPEG_QUALITY,
    MIN_JPEG_QUALITY,
};
