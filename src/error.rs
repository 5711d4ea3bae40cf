use std::path::PathBuf;

use thiserror::Error;

/// Library error type for pixel pipeline operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The source could not be rasterized into a pixel buffer.
    #[error("failed to decode source: {0}")]
    Decode(String),

    /// Raw pixel data does not match the declared dimensions.
    #[error("pixel buffer holds {actual} bytes but {expected} were expected")]
    BufferSize { expected: usize, actual: usize },

    /// Processing options were rejected before touching any pixels.
    #[error("invalid processing options: {0}")]
    InvalidOptions(String),

    /// Two batch inputs map onto the same output file.
    #[error("output {} is already claimed by another input", .0.display())]
    OutputCollision(PathBuf),

    /// The background worker dropped a request without replying.
    #[error("background worker unavailable")]
    WorkerUnavailable,

    /// Underlying IO error.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// YAML/serde configuration error.
    #[error(transparent)]
    Config(#[from] serde_yaml::Error),

    /// Encoding error from the `image` crate when writing results.
    #[error(transparent)]
    Image(#[from] image::ImageError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
