//! Error types for COFDMTV Core

use thiserror::Error;

/// Core error types
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("transform size must be positive, got {size}")]
    InvalidFftSize { size: usize },

    #[error("buffer size mismatch: expected {expected}, got {actual}")]
    BufferSizeMismatch { expected: usize, actual: usize },

    #[error("analytic filter needs length % 4 == 1, got {taps}")]
    InvalidFilterLength { taps: usize },

    #[error("window length must be positive")]
    EmptyWindow,
}

/// Result type for COFDMTV Core operations
pub type Result<T> = std::result::Result<T, CoreError>;
