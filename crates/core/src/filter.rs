//! Analytic-signal front end filters
//!
//! The receiver turns the real microphone stream into a complex analytic
//! stream in two steps: a single-pole DC blocker followed by an odd-length
//! FIR Hilbert transformer built from a Kaiser-windowed ideal kernel.

use crate::kahan::Kahan;
use crate::{CoreError, Result};
use num_complex::Complex32;
use std::f32::consts::PI;

/// Single-pole DC blocker, `y = b(x - x₁) + a·y₁`.
#[derive(Debug, Clone)]
pub struct BlockDc {
    x1: f32,
    y1: f32,
    a: f32,
    b: f32,
}

impl Default for BlockDc {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockDc {
    pub fn new() -> Self {
        Self {
            x1: 0.0,
            y1: 0.0,
            a: 0.0,
            b: 0.5,
        }
    }

    /// Set the pole from a settle length in samples.
    pub fn samples(&mut self, s: usize) {
        self.a = (s as f32 - 1.0) / s as f32;
        self.b = (1.0 + self.a) / 2.0;
    }

    pub fn process(&mut self, x0: f32) -> f32 {
        let y0 = self.b * (x0 - self.x1) + self.a * self.y1;
        self.x1 = x0;
        self.y1 = y0;
        y0
    }
}

/// Kaiser window, evaluated through the I₀ series.
struct Kaiser {
    a: f32,
}

impl Kaiser {
    fn new(a: f32) -> Self {
        Self { a }
    }

    fn i0(x: f32) -> f32 {
        let mut sum = Kahan::new(1.0);
        let mut val = 1.0f32;
        // converges for -3π..3π in fewer than 35 iterations
        for n in 1..35 {
            val *= x / (2 * n) as f32;
            if sum.same(val * val) {
                return sum.value();
            }
        }
        sum.value()
    }

    fn window(&self, n: usize, len: usize) -> f32 {
        let x = (2 * n) as f32 / (len - 1) as f32 - 1.0;
        Self::i0(PI * self.a * (1.0 - x * x).sqrt()) / Self::i0(PI * self.a)
    }
}

/// FIR Hilbert transformer producing the analytic signal.
///
/// Only the odd taps of the ideal kernel are non-zero and the window is
/// symmetric, so the convolution folds into `(taps-1)/4` multiplies for the
/// imaginary part plus the centre tap for the real part. Group delay is
/// `(taps-1)/2` samples.
#[derive(Debug, Clone)]
pub struct Hilbert {
    taps: usize,
    reco: f32,
    imco: Vec<f32>,
    real: Vec<f32>,
}

impl Hilbert {
    /// Build the transformer with a Kaiser window, `a = 2`.
    pub fn new(taps: usize) -> Result<Self> {
        if taps < 5 || (taps - 1) % 4 != 0 {
            return Err(CoreError::InvalidFilterLength { taps });
        }
        let win = Kaiser::new(2.0);
        let reco = win.window((taps - 1) / 2, taps);
        let mut imco = Vec::with_capacity((taps - 1) / 4);
        for i in 0..(taps - 1) / 4 {
            let k = 2 * i + 1;
            imco.push(win.window(k + (taps - 1) / 2, taps) * 2.0 / (k as f32 * PI));
        }
        Ok(Self {
            taps,
            reco,
            imco,
            real: vec![0.0; taps],
        })
    }

    pub fn process(&mut self, input: f32) -> Complex32 {
        let mid = (self.taps - 1) / 2;
        let re = self.reco * self.real[mid];
        let mut im = self.imco[0] * (self.real[mid - 1] - self.real[mid + 1]);
        for i in 1..(self.taps - 1) / 4 {
            let k = 2 * i + 1;
            im += self.imco[i] * (self.real[mid - k] - self.real[mid + k]);
        }
        self.real.copy_within(1.., 0);
        self.real[self.taps - 1] = input;
        Complex32::new(re, im)
    }
}

/// Fixed-length digital delay line.
#[derive(Debug, Clone)]
pub struct Delay<T> {
    buf: Vec<T>,
    pos: usize,
}

impl<T: Copy + Default> Delay<T> {
    pub fn new(num: usize) -> Self {
        Self {
            buf: vec![T::default(); num.max(1)],
            pos: 0,
        }
    }

    pub fn process(&mut self, input: T) -> T {
        let tmp = self.buf[self.pos];
        self.buf[self.pos] = input;
        self.pos += 1;
        if self.pos >= self.buf.len() {
            self.pos = 0;
        }
        tmp
    }
}
