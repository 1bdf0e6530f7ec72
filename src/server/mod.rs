//! HTTP server layer for the image API.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         HTTP Layer                              │
//! │  GET /api/multimedia/image/{version}/{identifier}/{...params}   │
//! │                                                                 │
//! │  ┌──────────────────────────┐  ┌─────────────────────────────┐  │
//! │  │        handlers          │  │          routes             │  │
//! │  │ (requests, info.json)    │  │ (router config, CORS)       │  │
//! │  └──────────────────────────┘  └─────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//!                 derivative::ImageService (pipeline)
//! ```

pub mod handlers;
pub mod routes;

pub use handlers::{
    health_handler, image_handler, info_document, info_handler, AppState, ErrorResponse,
    HealthResponse, ImagePathParams, InfoPathParams, CACHE_HIT_HEADER, DEFAULT_CACHE_MAX_AGE,
};
pub use routes::{create_router, RouterConfig, IMAGE_API_PREFIX};
