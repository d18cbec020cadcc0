//! Error types for COFDMTV Modem

use thiserror::Error;

/// Modem error types
#[derive(Error, Debug)]
pub enum ModemError {
    #[error("unsupported sample rate {rate}, supported: 8000/16000/32000/44100/48000")]
    UnsupportedRate { rate: u32 },

    #[error("unsupported symbol mapping with {points} constellation points")]
    UnsupportedModulation { points: u32 },

    #[error("unsupported channel index {index}")]
    UnsupportedChannel { index: u8 },

    #[error("no decodable frame is staged")]
    NoFrame,

    #[error("DSP error: {0}")]
    Core(#[from] cofdmtv_core::CoreError),

    #[error("channel code error: {0}")]
    Code(#[from] cofdmtv_code::CodeError),
}

/// Result type for COFDMTV Modem operations
pub type Result<T> = std::result::Result<T, ModemError>;
