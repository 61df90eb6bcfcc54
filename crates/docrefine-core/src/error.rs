//! Error types for document enhancement operations.

use thiserror::Error;

/// Errors that can occur while enhancing a converted document.
///
/// Most failures are handled locally by the enhancement workflow (a failed
/// page or region is logged and skipped); these variants surface at the
/// library boundary when a caller invokes an operation directly.
#[derive(Error, Debug)]
pub enum RefineError {
    /// A page image URI is not a decodable `data:` URI.
    #[error("invalid data URI: {0}")]
    DataUri(String),

    /// Embedded page image bytes could not be decoded.
    #[error("image decode failed: {0}")]
    ImageDecode(#[from] image::ImageError),

    /// A recognition model could not be loaded.
    #[error("failed to load model '{model}': {reason}")]
    ModelLoad {
        /// Name of the model that failed to load.
        model: String,
        /// Underlying loader error message.
        reason: String,
    },

    /// A recognition model failed during inference.
    #[error("inference failed: {0}")]
    Inference(String),

    /// Document JSON could not be parsed or serialized.
    #[error("document JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result alias for enhancement operations.
pub type Result<T> = std::result::Result<T, RefineError>;
