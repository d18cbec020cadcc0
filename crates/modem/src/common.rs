//! Shared modem parameters and channel conventions

use crate::{ModemError, Result};
use serde::{Deserialize, Serialize};

/// Sample rates the OFDM grid is defined for.
pub const SUPPORTED_RATES: [u32; 5] = [8000, 16000, 32000, 44100, 48000];

/// Largest payload a single frame can carry, in bytes.
pub const MAX_PAYLOAD_BYTES: usize = 170;

/// Call sign length on the air, base-37 characters.
pub const CALL_SIGN_LEN: usize = 9;

// Frame geometry shared by encoder and decoder.
pub(crate) const COR_SEQ_LEN: i32 = 127;
pub(crate) const COR_SEQ_OFF: i32 = 1 - COR_SEQ_LEN;
pub(crate) const COR_SEQ_POLY: u32 = 0b10001001;
pub(crate) const PRE_SEQ_LEN: i32 = 255;
pub(crate) const PRE_SEQ_OFF: i32 = -PRE_SEQ_LEN / 2;
pub(crate) const PRE_SEQ_POLY: u32 = 0b100101011;
pub(crate) const PAY_CAR_CNT: usize = 256;
pub(crate) const PAY_CAR_OFF: i32 = -(PAY_CAR_CNT as i32) / 2;
pub(crate) const FANCY_OFF: i32 = -(8 * 9 * 3) / 2;
pub(crate) const FANCY_LINES: usize = 11;
pub(crate) const NOISE_POLY: u32 = 0b100101010001;
pub(crate) const METADATA_CRC_POLY: u16 = 0xA8F4;
/// 37⁹, one past the largest encodable call sign.
pub(crate) const CALL_SIGN_LIMIT: u64 = 129_961_739_795_077;

/// Constellation used on the payload carriers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Modulation {
    Bpsk,
    Qpsk,
    Psk8,
    Qam16,
}

impl Modulation {
    /// Select by constellation size (2, 4, 8 or 16 points).
    pub fn from_points(points: u32) -> Result<Self> {
        match points {
            2 => Ok(Self::Bpsk),
            4 => Ok(Self::Qpsk),
            8 => Ok(Self::Psk8),
            16 => Ok(Self::Qam16),
            _ => Err(ModemError::UnsupportedModulation { points }),
        }
    }

    pub fn points(self) -> u32 {
        match self {
            Self::Bpsk => 2,
            Self::Qpsk => 4,
            Self::Psk8 => 8,
            Self::Qam16 => 16,
        }
    }

    /// Bits per constellation point.
    pub fn bits(self) -> usize {
        match self {
            Self::Bpsk => 1,
            Self::Qpsk => 2,
            Self::Psk8 => 3,
            Self::Qam16 => 4,
        }
    }

    /// Payload symbols per frame: BPSK halves the bits per symbol and
    /// doubles the symbol count.
    pub fn symbol_count(self) -> usize {
        if self == Self::Bpsk {
            8
        } else {
            4
        }
    }

    /// Size of the per-frame soft bit buffer. At least the polar code
    /// length; wider constellations leave the tail carriers unused.
    pub(crate) fn code_capacity(self) -> usize {
        self.symbol_count() * PAY_CAR_CNT * self.bits()
    }
}

/// Operation mode carried in the low metadata byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationMode {
    /// Metadata-only frame, no payload symbols.
    Ping,
    /// 1360 payload data bits.
    Long,
    /// 1024 payload data bits.
    Medium,
    /// 680 payload data bits.
    Short,
}

impl OperationMode {
    pub fn from_wire(mode: u8) -> Option<Self> {
        match mode {
            0 => Some(Self::Ping),
            14 => Some(Self::Long),
            15 => Some(Self::Medium),
            16 => Some(Self::Short),
            _ => None,
        }
    }

    pub fn wire(self) -> u8 {
        match self {
            Self::Ping => 0,
            Self::Long => 14,
            Self::Medium => 15,
            Self::Short => 16,
        }
    }

    /// Payload data bits before the 32 CRC bits; none for a ping.
    pub fn data_bits(self) -> Option<usize> {
        match self {
            Self::Ping => None,
            Self::Long => Some(1360),
            Self::Medium => Some(1024),
            Self::Short => Some(680),
        }
    }

    /// Smallest mode that fits `len` payload bytes.
    pub fn for_payload_len(len: usize) -> Self {
        if len == 0 {
            Self::Ping
        } else if len <= 85 {
            Self::Short
        } else if len <= 128 {
            Self::Medium
        } else {
            Self::Long
        }
    }
}

/// OFDM grid geometry derived from the sample rate.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RateParams {
    pub rate: u32,
    pub symbol_length: usize,
    pub guard_length: usize,
    pub extended_length: usize,
    pub filter_length: usize,
}

impl RateParams {
    pub fn new(rate: u32) -> Result<Self> {
        if !SUPPORTED_RATES.contains(&rate) {
            return Err(ModemError::UnsupportedRate { rate });
        }
        let symbol_length = 1280 * rate as usize / 8000;
        let guard_length = symbol_length / 8;
        Ok(Self {
            rate,
            symbol_length,
            guard_length,
            extended_length: symbol_length + guard_length,
            filter_length: ((21 * rate as usize / 8000) & !3) | 1,
        })
    }

    /// Carrier block shift in bins for a carrier frequency in Hz.
    pub fn carrier_offset(&self, carrier_frequency: i32) -> i32 {
        carrier_frequency * self.symbol_length as i32 / self.rate as i32
    }

    /// Receive window length.
    pub(crate) fn buffer_length(&self) -> usize {
        4 * self.extended_length
    }

    /// Where the correlator taps the receive window.
    pub(crate) fn search_position(&self) -> usize {
        self.extended_length
    }
}

/// Output channel arrangement of the encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxChannel {
    /// Single channel, real signal.
    Mono,
    /// Stereo, real signal left, right silent.
    Left,
    /// Stereo, real signal right, left silent.
    Right,
    /// Stereo complex baseband: left carries Re, right carries Im.
    Quadrature,
    /// Stereo, the real signal cloned to both channels.
    Both,
}

impl TxChannel {
    pub fn from_index(index: u8) -> Result<Self> {
        match index {
            0 => Ok(Self::Mono),
            1 => Ok(Self::Left),
            2 => Ok(Self::Right),
            3 => Ok(Self::Quadrature),
            4 => Ok(Self::Both),
            _ => Err(ModemError::UnsupportedChannel { index }),
        }
    }

    /// Interleaved output channels per frame.
    pub fn width(self) -> usize {
        if self == Self::Mono {
            1
        } else {
            2
        }
    }
}

/// Input channel selection of the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RxChannel {
    /// Single channel, real signal.
    Mono,
    /// Stereo, decode the left channel.
    Left,
    /// Stereo, decode the right channel.
    Right,
    /// Stereo, decode the mid mix (L+R)/2.
    Mid,
    /// Stereo complex baseband: left is Re, right is Im; bypasses the
    /// analytic conversion.
    Quadrature,
}

impl RxChannel {
    pub fn from_index(index: u8) -> Result<Self> {
        match index {
            0 => Ok(Self::Mono),
            1 => Ok(Self::Left),
            2 => Ok(Self::Right),
            3 => Ok(Self::Mid),
            4 => Ok(Self::Quadrature),
            _ => Err(ModemError::UnsupportedChannel { index }),
        }
    }

    /// Interleaved input channels per frame.
    pub fn width(self) -> usize {
        if self == Self::Mono {
            1
        } else {
            2
        }
    }
}

/// Receiver verdict after one `process` step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderStatus {
    /// Nothing of note; keep feeding.
    Okay,
    /// Preamble found but not decodable; the detector re-arms.
    Fail,
    /// Metadata decoded, payload symbols follow.
    Sync,
    /// All payload symbols collected, `fetch` may run.
    Done,
    /// Out of memory at instantiation (reserved for embeddings).
    Heap,
    /// Metadata valid but unusable (unknown mode or bad call sign).
    Nope,
    /// Metadata-only frame, nothing to fetch.
    Ping,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_params_match_grid() {
        let p = RateParams::new(8000).unwrap();
        assert_eq!(p.symbol_length, 1280);
        assert_eq!(p.guard_length, 160);
        assert_eq!(p.extended_length, 1440);
        assert_eq!(p.filter_length, 21);
        assert_eq!(p.carrier_offset(1500), 240);
        let p = RateParams::new(44100).unwrap();
        assert_eq!(p.symbol_length, 7056);
        assert_eq!(p.filter_length, 113);
        let p = RateParams::new(48000).unwrap();
        assert_eq!(p.symbol_length, 7680);
        assert_eq!(p.filter_length, 125);
        assert!(RateParams::new(22050).is_err());
    }

    #[test]
    fn mode_selection_by_length() {
        assert_eq!(OperationMode::for_payload_len(0), OperationMode::Ping);
        assert_eq!(OperationMode::for_payload_len(1), OperationMode::Short);
        assert_eq!(OperationMode::for_payload_len(85), OperationMode::Short);
        assert_eq!(OperationMode::for_payload_len(86), OperationMode::Medium);
        assert_eq!(OperationMode::for_payload_len(128), OperationMode::Medium);
        assert_eq!(OperationMode::for_payload_len(129), OperationMode::Long);
        assert_eq!(OperationMode::for_payload_len(170), OperationMode::Long);
    }

    #[test]
    fn code_capacity_covers_polar_length() {
        for m in [
            Modulation::Bpsk,
            Modulation::Qpsk,
            Modulation::Psk8,
            Modulation::Qam16,
        ] {
            assert!(m.code_capacity() >= cofdmtv_code::polar::CODE_LEN);
        }
        assert_eq!(Modulation::Bpsk.code_capacity(), 2048);
        assert_eq!(Modulation::Qpsk.code_capacity(), 2048);
    }
}
