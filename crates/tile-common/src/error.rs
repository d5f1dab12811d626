//! Error types for fractal tile services.

use thiserror::Error;

/// Result type alias using TileError.
pub type TileResult<T> = Result<T, TileError>;

/// Primary error type for tile operations.
#[derive(Debug, Error)]
pub enum TileError {
    // === Request Errors ===
    #[error("Invalid parameter value for '{param}': {message}")]
    InvalidParameter { param: String, message: String },

    #[error("Invalid tile size: {0} (must be a power of two within the configured maximum)")]
    InvalidTileSize(i64),

    // === Rendering Errors ===
    #[error("Rendering failed: {0}")]
    RenderError(String),

    #[error("Image encoding failed: {0}")]
    EncodeError(String),

    #[error("Image decoding failed: {0}")]
    DecodeError(String),

    // === Downstream Errors ===
    #[error("Sub-tile fetch failed: {0}")]
    FetchError(String),

    #[error("Request timeout")]
    Timeout,

    // === Infrastructure Errors ===
    #[error("Internal server error: {0}")]
    InternalError(String),
}

impl TileError {
    /// Convenience constructor for a rejected request parameter.
    pub fn invalid_parameter(param: impl Into<String>, message: impl Into<String>) -> Self {
        TileError::InvalidParameter {
            param: param.into(),
            message: message.into(),
        }
    }

    /// True for errors caused by the caller's request rather than the server.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            TileError::InvalidParameter { .. } | TileError::InvalidTileSize(_)
        )
    }

    /// Get the HTTP status code for this error.
    pub fn http_status_code(&self) -> u16 {
        match self {
            TileError::InvalidParameter { .. } | TileError::InvalidTileSize(_) => 400,
            TileError::Timeout => 504,
            _ => 500,
        }
    }
}
