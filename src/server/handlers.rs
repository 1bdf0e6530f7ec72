//! HTTP request handlers for the image API.
//!
//! # Endpoints
//!
//! - `GET /api/multimedia/image/{version}/{identifier}/{region}/{size}/{rotation}/{quality}.{format}`
//! - `GET /api/multimedia/image/{version}/{identifier}/info.json`
//! - `GET /health`

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{OriginalUri, Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, error, warn};

use crate::derivative::{CacheStats, ImageService};
use crate::error::IiifError;
use crate::iiif::{ApiVersion, ImageRequest, OutputFormat, Quality};
use crate::source::{SourceInfo, SourceLoader};

/// Header reporting whether the derivative came from cache.
pub const CACHE_HIT_HEADER: &str = "X-Derivative-Cache-Hit";

/// Default `Cache-Control` max-age in seconds.
pub const DEFAULT_CACHE_MAX_AGE: u32 = 3600;

// =============================================================================
// Application State
// =============================================================================

/// Shared application state containing the image service.
///
/// This is passed to all handlers via Axum's State extractor.
pub struct AppState<L: SourceLoader> {
    /// The pipeline that produces derivatives
    pub service: Arc<ImageService<L>>,

    /// Cache-Control max-age in seconds
    pub cache_max_age: u32,
}

impl<L: SourceLoader> AppState<L> {
    /// Create a new application state with the default max-age.
    pub fn new(service: Arc<ImageService<L>>) -> Self {
        Self::with_cache_max_age(service, DEFAULT_CACHE_MAX_AGE)
    }

    /// Create a new application state with custom cache max-age.
    pub fn with_cache_max_age(service: Arc<ImageService<L>>, cache_max_age: u32) -> Self {
        Self {
            service,
            cache_max_age,
        }
    }
}

impl<L: SourceLoader> Clone for AppState<L> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            cache_max_age: self.cache_max_age,
        }
    }
}

// =============================================================================
// Request Parameters
// =============================================================================

/// Path parameters for image requests.
///
/// The last segment carries both quality and format, e.g. `default.png`.
#[derive(Debug, Deserialize)]
pub struct ImagePathParams {
    pub version: String,
    pub identifier: String,
    pub region: String,
    pub size: String,
    pub rotation: String,
    pub filename: String,
}

impl ImagePathParams {
    /// Turn the path segments into a raw image request.
    pub fn into_request(self) -> Result<ImageRequest, IiifError> {
        ImageRequest::from_segments(
            &self.version,
            &self.identifier,
            &self.region,
            &self.size,
            &self.rotation,
            &self.filename,
        )
    }
}

/// Path parameters for `info.json` requests.
#[derive(Debug, Deserialize)]
pub struct InfoPathParams {
    pub version: String,
    pub identifier: String,
}

// =============================================================================
// Response Types
// =============================================================================

/// JSON error response returned for all error conditions.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error type identifier (e.g., "not_found", "malformed_parameter")
    pub error: String,

    /// Human-readable error message
    pub message: String,

    /// HTTP status code (included for convenience)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl ErrorResponse {
    /// Create a new error response.
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: None,
        }
    }

    /// Create a new error response with status code.
    pub fn with_status(
        error: impl Into<String>,
        message: impl Into<String>,
        status: StatusCode,
    ) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: Some(status.as_u16()),
        }
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,

    /// Service version
    pub version: String,

    /// Derivative cache statistics, when the store reports them
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache: Option<CacheStats>,
}

// =============================================================================
// Error Conversion
// =============================================================================

impl IiifError {
    /// HTTP status and error type identifier for this error.
    pub fn status(&self) -> (StatusCode, &'static str) {
        match self {
            IiifError::MalformedParameter { .. } => {
                (StatusCode::BAD_REQUEST, "malformed_parameter")
            }
            IiifError::UnsupportedQuality { .. } => {
                (StatusCode::BAD_REQUEST, "unsupported_quality")
            }
            IiifError::Geometry { .. } => (StatusCode::BAD_REQUEST, "invalid_geometry"),
            IiifError::SourceNotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),
            IiifError::Encoding { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "encoding_error"),
            IiifError::Cache(_) => (StatusCode::INTERNAL_SERVER_ERROR, "cache_error"),
            IiifError::Timeout { .. } => (StatusCode::GATEWAY_TIMEOUT, "timeout"),
            IiifError::AccessDenied { status, .. } => (
                StatusCode::from_u16(*status).unwrap_or(StatusCode::FORBIDDEN),
                "access_denied",
            ),
        }
    }
}

impl IntoResponse for IiifError {
    fn into_response(self) -> Response {
        let (status, error_type) = self.status();
        let message = self.to_string();

        if status.is_server_error() {
            error!(
                error_type = error_type,
                status = status.as_u16(),
                "Server error: {}",
                message
            );
        } else if status == StatusCode::NOT_FOUND {
            debug!(
                error_type = error_type,
                status = status.as_u16(),
                "Resource not found: {}",
                message
            );
        } else {
            warn!(
                error_type = error_type,
                status = status.as_u16(),
                "Client error: {}",
                message
            );
        }

        let error_response = ErrorResponse::with_status(error_type, message, status);
        (status, Json(error_response)).into_response()
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// Handle image derivative requests.
///
/// # Endpoint
///
/// `GET /api/multimedia/image/{version}/{identifier}/{region}/{size}/{rotation}/{quality}.{format}`
///
/// # Response
///
/// - `200 OK`: encoded derivative
/// - `304 Not Modified`: `If-None-Match` matched the entity tag
/// - `400 Bad Request`: malformed parameter, unsupported quality or bad geometry
/// - `404 Not Found`: identifier does not resolve to a readable source
/// - `500 Internal Server Error`: encoding failure
/// - `504 Gateway Timeout`: request deadline exceeded
///
/// # Headers
///
/// - `Content-Type`: MIME type of the target format
/// - `Cache-Control: public, max-age={cache_max_age}`
/// - `ETag`: digest of the derivative's cache key
/// - `X-Derivative-Cache-Hit: true|false`
pub async fn image_handler<L: SourceLoader>(
    State(state): State<AppState<L>>,
    Path(params): Path<ImagePathParams>,
    headers: HeaderMap,
) -> Result<Response, IiifError> {
    let request = params.into_request()?;
    let derivative = state.service.process(request).await?;

    let etag = format!("\"{}\"", derivative.etag);
    let cache_control = format!("public, max-age={}", state.cache_max_age);

    if if_none_match(&headers, &etag) {
        debug!(etag = %etag, "Entity tag matched, returning 304");
        return Ok((
            StatusCode::NOT_MODIFIED,
            [
                (header::ETAG, etag),
                (header::CACHE_CONTROL, cache_control),
            ],
        )
            .into_response());
    }

    let mut response = Response::new(Body::from(derivative.data));
    let out = response.headers_mut();
    out.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(derivative.mime),
    );
    if let Ok(value) = HeaderValue::from_str(&cache_control) {
        out.insert(header::CACHE_CONTROL, value);
    }
    if let Ok(value) = HeaderValue::from_str(&etag) {
        out.insert(header::ETAG, value);
    }
    out.insert(
        CACHE_HIT_HEADER,
        HeaderValue::from_static(if derivative.cache_hit { "true" } else { "false" }),
    );

    Ok(response)
}

/// Whether the `If-None-Match` header names the given entity tag.
fn if_none_match(headers: &HeaderMap, etag: &str) -> bool {
    headers
        .get_all(header::IF_NONE_MATCH)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(|tag| tag.trim().trim_start_matches("W/"))
        .any(|tag| tag == "*" || tag == etag)
}

/// Handle image information requests.
///
/// # Endpoint
///
/// `GET /api/multimedia/image/{version}/{identifier}/info.json`
///
/// The document shape follows the requested protocol version. Only the
/// formats and qualities this server can actually produce for the source
/// are advertised.
pub async fn info_handler<L: SourceLoader>(
    State(state): State<AppState<L>>,
    Path(params): Path<InfoPathParams>,
    OriginalUri(uri): OriginalUri,
) -> Result<Response, IiifError> {
    let version: ApiVersion = params.version.parse()?;
    let info = state.service.info(version, &params.identifier).await?;

    let id = uri
        .path()
        .strip_suffix("/info.json")
        .unwrap_or(uri.path())
        .to_string();
    let body = info_document(version, &id, &info);

    Ok((
        [(
            header::CACHE_CONTROL,
            format!("public, max-age={}", state.cache_max_age),
        )],
        Json(body),
    )
        .into_response())
}

/// Build the `info.json` document for a source.
pub fn info_document(version: ApiVersion, id: &str, info: &SourceInfo) -> Value {
    let qualities: Vec<&'static str> = [
        Quality::Default,
        Quality::Color,
        Quality::Gray,
        Quality::Bitonal,
    ]
    .into_iter()
    .filter(|q| info.mode.qualities().supports(*q))
    .map(|q| q.token(version))
    .collect();
    let formats = OutputFormat::supported_extensions();

    match version {
        ApiVersion::V1 => json!({
            "@context": "http://library.stanford.edu/iiif/image-api/1.1/context.json",
            "@id": id,
            "width": info.width,
            "height": info.height,
            "formats": formats,
            "qualities": qualities,
            "profile": "http://library.stanford.edu/iiif/image-api/1.1/compliance.html#level2",
        }),
        ApiVersion::V2 => json!({
            "@context": "http://iiif.io/api/image/2/context.json",
            "@id": id,
            "protocol": "http://iiif.io/api/image",
            "width": info.width,
            "height": info.height,
            "profile": [
                "http://iiif.io/api/image/2/level2.json",
                {
                    "formats": formats,
                    "qualities": qualities,
                    "supports": ["mirroring", "rotationArbitrary", "regionByPct", "sizeByForcedWh"],
                },
            ],
        }),
    }
}

/// Handle health check requests.
///
/// # Endpoint
///
/// `GET /health`
///
/// # Response
///
/// `200 OK` with JSON body:
/// ```json
/// {
///   "status": "healthy",
///   "version": "0.1.0",
///   "cache": { "entries": 12, "bytes": 40960, "capacity": 268435456, "hits": 30, "misses": 12 }
/// }
/// ```
pub async fn health_handler<L: SourceLoader>(
    State(state): State<AppState<L>>,
) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        cache: state.service.cache_stats().await,
    })
}
