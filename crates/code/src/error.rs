//! Error types for COFDMTV Code

use thiserror::Error;

/// Channel coding error types
#[derive(Error, Debug)]
pub enum CodeError {
    #[error("generator polynomial degree {got}, expected {want}")]
    GeneratorDegree { got: usize, want: usize },

    #[error("no list candidate passed the checksum")]
    CrcMismatch,
}

/// Result type for COFDMTV Code operations
pub type Result<T> = std::result::Result<T, CodeError>;
