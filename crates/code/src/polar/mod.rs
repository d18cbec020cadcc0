//! CRC-aided systematic polar coding for the payload
//!
//! The payload is protected by a (2048, K) polar code, K = data bits + 32
//! CRC bits. Encoding is systematic: the Arıkan butterfly runs twice so the
//! non-frozen codeword coordinates carry the message unchanged. Decoding is
//! 16-path successive-cancellation list decoding; the surviving path is the
//! lowest-metric lane whose systematic re-encode has CRC zero.

pub mod list;

use crate::bits::{get_le_bit, set_le_bit};
use crate::crc::Crc32;
use crate::{CodeError, Result};
use list::{qmul, Lanes, PolarListDecoder, LANES};
use std::sync::OnceLock;
use tracing::debug;

/// log₂ of the payload code length.
pub const CODE_ORDER: usize = 11;
/// Payload code length.
pub const CODE_LEN: usize = 1 << CODE_ORDER;
/// CRC polynomial protecting the payload message.
pub const PAYLOAD_CRC_POLY: u32 = 0x8F6E37A0;
/// CRC length appended to the message.
pub const CRC_BITS: usize = 32;

fn nrz(bit: bool) -> i8 {
    1 - 2 * (bit as i8)
}

fn frozen_bit(frozen: &[u32], idx: usize) -> bool {
    (frozen[idx / 32] >> (idx % 32)) & 1 != 0
}

/// Construct the frozen mask of a length `1 << level` code with
/// `info_bits` unfrozen positions.
///
/// Bhattacharyya parameters over a BEC with erasure probability ½:
/// z(2i) = 2z − z², z(2i+1) = z²; the `n − info_bits` indices with the
/// largest parameter are frozen, ties broken towards lower indices. The
/// construction is deterministic, so both ends derive identical masks.
fn bhattacharyya_frozen(level: usize, info_bits: usize) -> Vec<u32> {
    let n = 1usize << level;
    let mut z = vec![0.5f64];
    for _ in 0..level {
        let mut next = vec![0.0f64; 2 * z.len()];
        for (i, &v) in z.iter().enumerate() {
            next[2 * i] = 2.0 * v - v * v;
            next[2 * i + 1] = v * v;
        }
        z = next;
    }
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| z[b].partial_cmp(&z[a]).expect("z is finite"));
    let mut mask = vec![0u32; n / 32];
    for &i in order.iter().take(n - info_bits) {
        mask[i / 32] |= 1 << (i % 32);
    }
    debug!(n, info_bits, "constructed frozen mask");
    mask
}

static FROZEN_2048_1392: OnceLock<Vec<u32>> = OnceLock::new();
static FROZEN_2048_1056: OnceLock<Vec<u32>> = OnceLock::new();
static FROZEN_2048_712: OnceLock<Vec<u32>> = OnceLock::new();

/// Frozen mask of the (2048, K) payload code for the given number of data
/// bits (K = data bits + 32 CRC bits).
pub fn frozen_2048(data_bits: usize) -> Option<&'static [u32]> {
    match data_bits {
        1360 => Some(FROZEN_2048_1392.get_or_init(|| bhattacharyya_frozen(CODE_ORDER, 1392))),
        1024 => Some(FROZEN_2048_1056.get_or_init(|| bhattacharyya_frozen(CODE_ORDER, 1056))),
        680 => Some(FROZEN_2048_712.get_or_init(|| bhattacharyya_frozen(CODE_ORDER, 712))),
        _ => None,
    }
}

fn butterfly(codeword: &mut [i8], length: usize) {
    let mut h = 2;
    while h < length {
        let mut i = 0;
        while i < length {
            for j in i..i + h {
                codeword[j] *= codeword[j + h];
            }
            i += 2 * h;
        }
        h *= 2;
    }
}

/// Systematic polar transform: after the double butterfly the non-frozen
/// codeword coordinates equal the message values.
pub fn systematic_encode(codeword: &mut [i8], message: &[i8], frozen: &[u32], level: usize) {
    let length = 1 << level;
    let mut msg = 0usize;
    for i in (0..length).step_by(2) {
        let msg0 = if frozen_bit(frozen, i) {
            1
        } else {
            let v = message[msg];
            msg += 1;
            v
        };
        let msg1 = if frozen_bit(frozen, i + 1) {
            1
        } else {
            let v = message[msg];
            msg += 1;
            v
        };
        codeword[i] = msg0 * msg1;
        codeword[i + 1] = msg1;
    }
    butterfly(codeword, length);
    for i in (0..length).step_by(2) {
        let msg0 = if frozen_bit(frozen, i) { 1 } else { codeword[i] };
        let msg1 = if frozen_bit(frozen, i + 1) { 1 } else { codeword[i + 1] };
        codeword[i] = msg0 * msg1;
        codeword[i + 1] = msg1;
    }
    butterfly(codeword, length);
}

/// Non-systematic lane encode used for the decoder's systematic re-encode.
fn encode_lanes(codeword: &mut [Lanes], message: &[Lanes], frozen: &[u32], level: usize) {
    let length = 1 << level;
    let mut msg = 0usize;
    for i in (0..length).step_by(2) {
        let msg0 = if frozen_bit(frozen, i) {
            Lanes::one()
        } else {
            let v = message[msg];
            msg += 1;
            v
        };
        let msg1 = if frozen_bit(frozen, i + 1) {
            Lanes::one()
        } else {
            let v = message[msg];
            msg += 1;
            v
        };
        codeword[i] = qmul(msg0, msg1);
        codeword[i + 1] = msg1;
    }
    let mut h = 2;
    while h < length {
        let mut i = 0;
        while i < length {
            for j in i..i + h {
                codeword[j] = qmul(codeword[j], codeword[j + h]);
            }
            i += 2 * h;
        }
        h *= 2;
    }
}

/// Payload encoder: scrambled message bytes in, ±1 codeword out.
pub struct PayloadEncoder {
    crc: Crc32,
    mesg: Vec<i8>,
}

impl Default for PayloadEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl PayloadEncoder {
    pub fn new() -> Self {
        Self {
            crc: Crc32::new(PAYLOAD_CRC_POLY),
            mesg: Vec::new(),
        }
    }

    /// Encode `data_bits` little-endian message bits plus their CRC into a
    /// `CODE_LEN` codeword of ±1 values.
    pub fn encode(&mut self, code: &mut [i8], message: &[u8], frozen: &[u32], data_bits: usize) {
        self.mesg.clear();
        self.mesg.resize(data_bits + CRC_BITS, 0);
        for i in 0..data_bits {
            self.mesg[i] = nrz(get_le_bit(message, i));
        }
        self.crc.reset();
        for i in 0..data_bits / 8 {
            self.crc.put_byte(message[i]);
        }
        let cs = self.crc.value();
        for i in 0..CRC_BITS {
            self.mesg[data_bits + i] = nrz((cs >> i) & 1 != 0);
        }
        systematic_encode(code, &self.mesg, frozen, CODE_ORDER);
    }
}

/// Payload decoder: soft codeword in, message bytes out.
pub struct PayloadDecoder {
    crc: Crc32,
    list: PolarListDecoder,
    mesg: Vec<Lanes>,
    mess: Vec<Lanes>,
}

impl Default for PayloadDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl PayloadDecoder {
    pub fn new() -> Self {
        Self {
            crc: Crc32::new(PAYLOAD_CRC_POLY),
            list: PolarListDecoder::new(CODE_ORDER),
            mesg: vec![Lanes::splat(0); 1392 + CRC_BITS],
            mess: vec![Lanes::splat(0); CODE_LEN],
        }
    }

    /// Decode `CODE_LEN` soft values; writes `data_bits` little-endian bits
    /// into `message`. On checksum failure the best-metric path is written
    /// anyway and an error is returned.
    pub fn decode(
        &mut self,
        message: &mut [u8],
        code: &[i8],
        frozen: &[u32],
        data_bits: usize,
    ) -> Result<()> {
        let crc_bits = data_bits + CRC_BITS;
        let mut metric = [0i32; LANES];
        self.list
            .decode(&mut metric, &mut self.mesg[..crc_bits], code, frozen, CODE_ORDER);
        // systematic re-encode recovers the message coordinates per lane
        encode_lanes(&mut self.mess, &self.mesg[..crc_bits], frozen, CODE_ORDER);
        let mut j = 0;
        for i in 0..CODE_LEN {
            if !frozen_bit(frozen, i) {
                self.mesg[j] = self.mess[i];
                j += 1;
                if j >= crc_bits {
                    break;
                }
            }
        }
        let mut order = [0usize; LANES];
        for (k, lane) in order.iter_mut().enumerate() {
            *lane = k;
        }
        order.sort_by(|&a, &b| metric[a].cmp(&metric[b]));
        let mut best = None;
        for &lane in &order {
            self.crc.reset();
            for i in 0..crc_bits {
                self.crc.put_bit(self.mesg[i].0[lane] < 0);
            }
            if self.crc.value() == 0 {
                best = Some(lane);
                break;
            }
        }
        let (lane, verdict) = match best {
            Some(lane) => (lane, Ok(())),
            None => {
                debug!("no checksum-clean path among {} lanes", LANES);
                (order[0], Err(CodeError::CrcMismatch))
            }
        };
        for i in 0..data_bits {
            set_le_bit(message, i, self.mesg[i].0[lane] < 0);
        }
        verdict
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xorshift::Xorshift32;

    #[test]
    fn frozen_masks_have_expected_weight() {
        for (data_bits, info) in [(1360usize, 1392usize), (1024, 1056), (680, 712)] {
            let mask = frozen_2048(data_bits).unwrap();
            let frozen: u32 = mask.iter().map(|w| w.count_ones()).sum();
            assert_eq!(frozen as usize, CODE_LEN - info);
        }
        assert!(frozen_2048(512).is_none());
    }

    #[test]
    fn encoder_is_systematic() {
        let data_bits = 680;
        let frozen = frozen_2048(data_bits).unwrap();
        let mut rng = Xorshift32::new();
        let message: Vec<u8> = (0..data_bits / 8).map(|_| rng.next() as u8).collect();
        let mut encoder = PayloadEncoder::new();
        let mut code = vec![0i8; CODE_LEN];
        encoder.encode(&mut code, &message, frozen, data_bits);
        let mut j = 0;
        for i in 0..CODE_LEN {
            if !frozen_bit(frozen, i) {
                if j < data_bits {
                    assert_eq!(code[i] < 0, get_le_bit(&message, j), "position {}", i);
                }
                j += 1;
            }
        }
    }

    #[test]
    fn clean_round_trip() {
        for data_bits in [680usize, 1024, 1360] {
            let frozen = frozen_2048(data_bits).unwrap();
            let mut rng = Xorshift32::new();
            let message: Vec<u8> = (0..data_bits / 8).map(|_| rng.next() as u8).collect();
            let mut encoder = PayloadEncoder::new();
            let mut code = vec![0i8; CODE_LEN];
            encoder.encode(&mut code, &message, frozen, data_bits);
            let soft: Vec<i8> = code.iter().map(|&v| 32 * v).collect();
            let mut decoder = PayloadDecoder::new();
            let mut decoded = vec![0u8; data_bits / 8];
            decoder
                .decode(&mut decoded, &soft, frozen, data_bits)
                .unwrap();
            assert_eq!(decoded, message, "data_bits {}", data_bits);
        }
    }

    #[test]
    fn recovers_from_bit_errors() {
        let data_bits = 1360;
        let frozen = frozen_2048(data_bits).unwrap();
        let mut rng = Xorshift32::new();
        let message: Vec<u8> = (0..data_bits / 8).map(|_| rng.next() as u8).collect();
        let mut encoder = PayloadEncoder::new();
        let mut code = vec![0i8; CODE_LEN];
        encoder.encode(&mut code, &message, frozen, data_bits);
        let mut soft: Vec<i8> = code.iter().map(|&v| 24 * v).collect();
        // flip a sprinkle of hard decisions and erase a few more
        for _ in 0..40 {
            let pos = (rng.next() % CODE_LEN as u32) as usize;
            soft[pos] = -soft[pos] / 4;
        }
        for _ in 0..40 {
            let pos = (rng.next() % CODE_LEN as u32) as usize;
            soft[pos] = 0;
        }
        let mut decoder = PayloadDecoder::new();
        let mut decoded = vec![0u8; data_bits / 8];
        decoder
            .decode(&mut decoded, &soft, frozen, data_bits)
            .unwrap();
        assert_eq!(decoded, message);
    }

    #[test]
    fn garbage_fails_the_checksum() {
        let data_bits = 680;
        let frozen = frozen_2048(data_bits).unwrap();
        let mut rng = Xorshift32::new();
        let soft: Vec<i8> = (0..CODE_LEN)
            .map(|_| (rng.next() as i8).clamp(-32, 32))
            .collect();
        let mut decoder = PayloadDecoder::new();
        let mut decoded = vec![0u8; data_bits / 8];
        assert!(decoder.decode(&mut decoded, &soft, frozen, data_bits).is_err());
    }
}
