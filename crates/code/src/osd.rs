//! Ordered statistics decoding
//!
//! Soft decoder for the BCH(255,71) preamble code. Reliabilities are sorted
//! descending, the generator matrix is column-permuted and reduced to
//! systematic form (the pivot search may swap columns, tracked in the
//! permutation), the hard decision of the K most reliable positions is
//! re-encoded and every error pattern of weight ≤ 2 over those positions is
//! scored against the soft values. The decode is accepted only when the
//! maximum-likelihood candidate is unique.

const N: usize = 255;
const K: usize = 71;
/// Rows padded to a word multiple so pattern flips run over whole rows.
const W: usize = 256;

/// Order-2 OSD for the (255,71) code.
#[derive(Clone)]
pub struct OrderedStatisticsDecoder {
    g: Vec<u8>,
    codeword: [u8; W],
    candidate: [u8; W],
    softperm: [i8; W],
    perm: [i16; W],
}

impl Default for OrderedStatisticsDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl OrderedStatisticsDecoder {
    pub fn new() -> Self {
        Self {
            g: vec![0u8; W * K],
            codeword: [0; W],
            candidate: [0; W],
            softperm: [0; W],
            perm: [0; W],
        }
    }

    fn row_echelon(&mut self) {
        let g = &mut self.g;
        for k in 0..K {
            // pivot search in this column
            for j in k..K {
                if g[W * j + k] != 0 {
                    if j != k {
                        for i in k..N {
                            g.swap(W * j + i, W * k + i);
                        }
                    }
                    break;
                }
            }
            // keep searching for a suitable pivot column; this may pull in
            // columns >= K, so account for the swap in the permutation
            let mut j = k + 1;
            while g[W * k + k] == 0 && j < N {
                for h in k..K {
                    if g[W * h + j] != 0 {
                        self.perm.swap(k, j);
                        for i in 0..K {
                            g.swap(W * i + k, W * i + j);
                        }
                        if h != k {
                            for i in k..N {
                                g.swap(W * h + i, W * k + i);
                            }
                        }
                        break;
                    }
                }
                j += 1;
            }
            debug_assert!(g[W * k + k] != 0, "no pivot for row {}", k);
            // clear below the pivot
            for j in k + 1..K {
                if g[W * j + k] != 0 {
                    for i in k..N {
                        g[W * j + i] ^= g[W * k + i];
                    }
                }
            }
        }
    }

    fn systematic(&mut self) {
        let g = &mut self.g;
        for k in (1..K).rev() {
            for j in 0..k {
                if g[W * j + k] != 0 {
                    for i in k..N {
                        g[W * j + i] ^= g[W * k + i];
                    }
                }
            }
        }
    }

    fn encode(&mut self) {
        for i in K..N {
            self.codeword[i] = self.codeword[0] & self.g[i];
        }
        for j in 1..K {
            for i in K..N {
                self.codeword[i] ^= self.codeword[j] & self.g[W * j + i];
            }
        }
    }

    fn flip(&mut self, j: usize) {
        for i in 0..W {
            self.codeword[i] ^= self.g[W * j + i];
        }
    }

    fn metric(&self) -> i32 {
        let mut sum = 0i32;
        for i in 0..W {
            sum += (1 - 2 * self.codeword[i] as i32) * self.softperm[i] as i32;
        }
        sum
    }

    /// Decode 255 soft values into a hard codeword (big-endian packed bits).
    /// Returns false when the metadata is ambiguous or hopeless.
    pub fn decode(&mut self, hard: &mut [u8], soft: &[i8], genmat: &[u8]) -> bool {
        for i in 0..N {
            self.perm[i] = i as i16;
        }
        for i in 0..N {
            self.softperm[i] = soft[i].max(-127).unsigned_abs() as i8;
        }
        let reliability = &self.softperm;
        self.perm[..N].sort_by(|&a, &b| reliability[b as usize].cmp(&reliability[a as usize]));
        for j in 0..K {
            for i in 0..N {
                self.g[W * j + i] = genmat[N * j + self.perm[i] as usize];
            }
        }
        self.row_echelon();
        self.systematic();
        for i in 0..N {
            self.softperm[i] = soft[self.perm[i] as usize].max(-127);
        }
        for i in N..W {
            self.softperm[i] = 0;
        }
        for i in 0..K {
            self.codeword[i] = (self.softperm[i] < 0) as u8;
        }
        for i in K..W {
            self.codeword[i] = 0;
        }
        self.encode();
        self.candidate = self.codeword;
        let mut best = self.metric();
        let mut next = -1;
        for a in 0..K {
            self.flip(a);
            self.update(&mut best, &mut next);
            for b in a + 1..K {
                self.flip(b);
                self.update(&mut best, &mut next);
                self.flip(b);
            }
            self.flip(a);
        }
        for i in 0..N {
            crate::bits::set_be_bit(hard, self.perm[i] as usize, self.candidate[i] != 0);
        }
        best != next
    }

    fn update(&mut self, best: &mut i32, next: &mut i32) {
        let met = self.metric();
        if met > *best {
            *next = *best;
            *best = met;
            self.candidate = self.codeword;
        } else if met > *next {
            *next = met;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bch::{generator_matrix, BchEncoder, BCH_255_71_POLYNOMIALS};
    use crate::bits::{get_be_bit, set_be_bit};
    use crate::xorshift::Xorshift32;

    fn encode_word(message: u64) -> [u8; 32] {
        let bch = BchEncoder::new(255, 71, &BCH_255_71_POLYNOMIALS).unwrap();
        let mut data = [0u8; 9];
        for i in 0..71 {
            set_be_bit(&mut data, i, (message >> (i % 64)) & 1 != 0);
        }
        let mut parity = [0u8; 23];
        bch.encode(&data, &mut parity, 71);
        let mut word = [0u8; 32];
        for i in 0..71 {
            set_be_bit(&mut word, i, get_be_bit(&data, i));
        }
        for i in 71..255 {
            set_be_bit(&mut word, i, get_be_bit(&parity, i - 71));
        }
        word
    }

    fn to_soft(word: &[u8; 32]) -> [i8; 255] {
        let mut soft = [0i8; 255];
        for (i, value) in soft.iter_mut().enumerate() {
            *value = if get_be_bit(word, i) { -64 } else { 64 };
        }
        soft
    }

    #[test]
    fn clean_word_decodes() {
        let word = encode_word(0x5A5A_1234_5678);
        let genmat = generator_matrix(255, 71, &BCH_255_71_POLYNOMIALS, true).unwrap();
        let soft = to_soft(&word);
        let mut osd = OrderedStatisticsDecoder::new();
        let mut hard = [0u8; 32];
        assert!(osd.decode(&mut hard, &soft, &genmat));
        assert_eq!(hard, word);
    }

    #[test]
    fn corrects_scattered_bit_flips() {
        let word = encode_word(0x0123_4567_89AB);
        let genmat = generator_matrix(255, 71, &BCH_255_71_POLYNOMIALS, true).unwrap();
        let mut rng = Xorshift32::new();
        let mut soft = to_soft(&word);
        // a handful of hard errors with low confidence
        for _ in 0..12 {
            let pos = (rng.next() % 255) as usize;
            soft[pos] = -(soft[pos] / 8);
        }
        let mut osd = OrderedStatisticsDecoder::new();
        let mut hard = [0u8; 32];
        assert!(osd.decode(&mut hard, &soft, &genmat));
        assert_eq!(hard, word);
    }
}
