use thiserror::Error;

/// Errors raised by the stencil pipeline and the layer operations.
///
/// An image that yields no colors is not an error: the pipeline returns a
/// document with zero layers instead.
#[derive(Debug, Error)]
pub enum StencilError {
    /// Buffer dimensions are zero or the sample array has the wrong length.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A layer operation addressed an index outside `[0, len)`.
    #[error("layer index {index} out of range (document has {len} layers)")]
    IndexOutOfRange { index: usize, len: usize },

    /// The run was cancelled at a suspension point.
    #[error("processing cancelled")]
    Cancelled,

    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),

    #[error("unsupported image format (expected PNG or JPEG)")]
    UnsupportedFormat,

    #[error("image is {size} bytes, limit is {limit} bytes")]
    TooLarge { size: usize, limit: usize },

    #[error("invalid color: {0}")]
    InvalidColor(String),

    #[error("document serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to write export: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, StencilError>;
