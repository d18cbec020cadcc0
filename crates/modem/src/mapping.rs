//! Symbol mapping
//!
//! Gray-coded BPSK/QPSK/8-PSK and 16-QAM on the payload carriers. Soft
//! values are scaled by the constellation's minimum distance times the
//! per-symbol precision estimate, rounded to nearest and saturated to i8.

use crate::common::Modulation;
use cofdmtv_core::Complex32;

const RCP_SQRT_2: f32 = std::f32::consts::FRAC_1_SQRT_2;
const COS_PI_8: f32 = 0.923_879_5;
const SIN_PI_8: f32 = 0.382_683_43;
/// 16-QAM axis unit, 1/√10.
const LEVEL: f32 = 0.316_227_77;

fn quantize(dist: f32, precision: f32, value: f32) -> i8 {
    (value * dist * precision)
        .round_ties_even()
        .clamp(-128.0, 127.0) as i8
}

/// Map hard decisions (±1 per bit) onto a constellation point.
pub fn map(modulation: Modulation, b: &[i8]) -> Complex32 {
    match modulation {
        Modulation::Bpsk => Complex32::new(b[0] as f32, 0.0),
        Modulation::Qpsk => Complex32::new(b[0] as f32, b[1] as f32) * RCP_SQRT_2,
        Modulation::Psk8 => {
            let (x, y) = if b[2] > 0 {
                (COS_PI_8, SIN_PI_8)
            } else {
                (SIN_PI_8, COS_PI_8)
            };
            Complex32::new(b[0] as f32 * x, b[1] as f32 * y)
        }
        Modulation::Qam16 => {
            let re = b[0] as f32 * if b[1] > 0 { 1.0 } else { 3.0 };
            let im = b[2] as f32 * if b[3] > 0 { 1.0 } else { 3.0 };
            Complex32::new(re * LEVEL, im * LEVEL)
        }
    }
}

/// Hard decisions (±1 per bit) for a received point.
pub fn hard(modulation: Modulation, b: &mut [i8], c: Complex32) {
    match modulation {
        Modulation::Bpsk => {
            b[0] = if c.re < 0.0 { -1 } else { 1 };
        }
        Modulation::Qpsk => {
            b[0] = if c.re < 0.0 { -1 } else { 1 };
            b[1] = if c.im < 0.0 { -1 } else { 1 };
        }
        Modulation::Psk8 => {
            b[0] = if c.re < 0.0 { -1 } else { 1 };
            b[1] = if c.im < 0.0 { -1 } else { 1 };
            b[2] = if c.re.abs() < c.im.abs() { -1 } else { 1 };
        }
        Modulation::Qam16 => {
            b[0] = if c.re < 0.0 { -1 } else { 1 };
            b[1] = if c.re.abs() < 2.0 * LEVEL { 1 } else { -1 };
            b[2] = if c.im < 0.0 { -1 } else { 1 };
            b[3] = if c.im.abs() < 2.0 * LEVEL { 1 } else { -1 };
        }
    }
}

/// Soft bit metrics for a received point, scaled by `precision`.
pub fn soft(modulation: Modulation, b: &mut [i8], c: Complex32, precision: f32) {
    match modulation {
        Modulation::Bpsk => {
            b[0] = quantize(2.0, precision, c.re);
        }
        Modulation::Qpsk => {
            let dist = std::f32::consts::SQRT_2;
            b[0] = quantize(dist, precision, c.re);
            b[1] = quantize(dist, precision, c.im);
        }
        Modulation::Psk8 => {
            let dist = 2.0 * SIN_PI_8;
            b[0] = quantize(dist, precision, c.re);
            b[1] = quantize(dist, precision, c.im);
            b[2] = quantize(dist, precision, RCP_SQRT_2 * (c.re.abs() - c.im.abs()));
        }
        Modulation::Qam16 => {
            let dist = 2.0 * LEVEL;
            b[0] = quantize(dist, precision, c.re);
            b[1] = quantize(dist, precision, dist - c.re.abs());
            b[2] = quantize(dist, precision, c.im);
            b[3] = quantize(dist, precision, dist - c.im.abs());
        }
    }
}
