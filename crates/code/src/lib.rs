//! COFDMTV Code - channel coding and sequences
//!
//! Everything bit-flavoured in the modem lives here: packed-bit helpers,
//! table-driven CRCs, maximum-length sequences, the xorshift payload
//! scrambler, the BCH(255,71) metadata code with its ordered-statistics
//! soft decoder, and the CRC-aided systematic polar payload code with a
//! 16-lane successive-cancellation list decoder.

pub mod bch;
pub mod bits;
pub mod crc;
pub mod error;
pub mod mls;
pub mod osd;
pub mod polar;
pub mod xorshift;

pub use error::{CodeError, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::{
        bch::BchEncoder,
        crc::{Crc16, Crc32},
        error::{CodeError, Result},
        mls::Mls,
        osd::OrderedStatisticsDecoder,
        polar::{PayloadDecoder, PayloadEncoder},
        xorshift::Xorshift32,
    };
}
