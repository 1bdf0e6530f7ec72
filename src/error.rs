use thiserror::Error;

/// Errors raised while locating or reading a source image.
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    /// The resolved location holds no object
    #[error("Source not found: {0}")]
    NotFound(String),

    /// Error from S3 or S3-compatible storage
    #[error("Storage error: {0}")]
    Storage(String),

    /// Local I/O error
    #[error("I/O error: {0}")]
    Io(String),

    /// The bytes could not be decoded as an image
    #[error("Decode error: {0}")]
    Decode(String),
}

/// Errors from a derivative store.
///
/// These never fail a request: the pipeline logs them and computes the
/// derivative directly.
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    /// The backing storage cannot be reached
    #[error("Cache storage unavailable: {0}")]
    Unavailable(String),
}

/// Errors produced by the image request pipeline.
#[derive(Debug, Clone, Error)]
pub enum IiifError {
    /// One of the positional parameters failed grammar validation
    #[error("Malformed {field} parameter: {value:?}")]
    MalformedParameter { field: &'static str, value: String },

    /// The requested quality is not in the source mode's capability set
    #[error("Quality {quality} is not supported for {mode} sources")]
    UnsupportedQuality { quality: String, mode: String },

    /// Region or size degenerated after resolution
    #[error("Invalid geometry: {message}")]
    Geometry { message: String },

    /// The identifier resolved to nothing or the source could not be loaded
    #[error("Source not found for {identifier}: {reason}")]
    SourceNotFound { identifier: String, reason: String },

    /// The target format cannot represent the final image
    #[error("Encoding failed: {message}")]
    Encoding { message: String },

    /// The derivative store failed
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    /// A pipeline stage exceeded the request deadline
    #[error("Request timed out after {seconds}s")]
    Timeout { seconds: u64 },

    /// The access gate rejected the request
    #[error("Access denied: {message}")]
    AccessDenied { status: u16, message: String },
}

impl IiifError {
    /// Shorthand for a malformed parameter.
    pub fn malformed(field: &'static str, value: impl Into<String>) -> Self {
        IiifError::MalformedParameter {
            field,
            value: value.into(),
        }
    }

    /// Shorthand for a geometry failure.
    pub fn geometry(message: impl Into<String>) -> Self {
        IiifError::Geometry {
            message: message.into(),
        }
    }

    /// Wrap a source error for the given identifier.
    pub fn source(identifier: &str, err: SourceError) -> Self {
        IiifError::SourceNotFound {
            identifier: identifier.to_string(),
            reason: err.to_string(),
        }
    }
}
