//! COFDMTV Modem - acoustic OFDM transmitter and receiver
//!
//! The encoder turns a payload of up to 170 bytes plus a 9-character call
//! sign into a PCM waveform; the decoder recovers both from a PCM stream,
//! tolerating carrier frequency offset, timing offset and moderate noise.
//! Frame structure, synchronisation, channel compensation and the soft
//! demapping into the channel codes all live in this crate.

pub mod base37;
pub mod common;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod mapping;
pub mod papr;
pub mod sync;

pub use error::{ModemError, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::{
        common::{DecoderStatus, Modulation, OperationMode, RateParams, RxChannel, TxChannel},
        decoder::{Decoder, StagedInfo},
        encoder::Encoder,
        error::{ModemError, Result},
    };
}
