//! FFT processing wrapper
//!
//! Thin wrapper around rustfft's mixed-radix planner. The OFDM symbol
//! lengths used by the modem (1280, 2560, 5120, 7056, 7680) are composite,
//! so both directions go through the generic mixed-radix machinery.
//! Transforms are unnormalised in both directions; callers apply their own
//! scaling, which keeps the 1/√N bookkeeping explicit in the signal chain.

use crate::{CoreError, Result};
use num_complex::Complex32;
use rustfft::FftPlanner;
use std::sync::Arc;

/// Planned forward/inverse transform pair of a fixed size.
pub struct Fft {
    size: usize,
    fwd: Arc<dyn rustfft::Fft<f32>>,
    inv: Arc<dyn rustfft::Fft<f32>>,
    scratch: Vec<Complex32>,
}

impl Fft {
    /// Plan both directions for the given size.
    pub fn new(size: usize) -> Result<Self> {
        if size == 0 {
            return Err(CoreError::InvalidFftSize { size });
        }
        let mut planner = FftPlanner::new();
        let fwd = planner.plan_fft_forward(size);
        let inv = planner.plan_fft_inverse(size);
        let scratch_len = fwd
            .get_inplace_scratch_len()
            .max(inv.get_inplace_scratch_len());
        let scratch = vec![Complex32::new(0.0, 0.0); scratch_len];
        Ok(Self {
            size,
            fwd,
            inv,
            scratch,
        })
    }

    /// Transform size.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Forward transform (e^{-2πi/N}), unnormalised.
    ///
    /// Only the first `size` elements of `input` are read, so a caller may
    /// pass a longer scratch buffer (e.g. an extended symbol).
    pub fn forward(&mut self, output: &mut [Complex32], input: &[Complex32]) -> Result<()> {
        self.process(true, output, input)
    }

    /// Inverse transform (e^{+2πi/N}), unnormalised.
    pub fn inverse(&mut self, output: &mut [Complex32], input: &[Complex32]) -> Result<()> {
        self.process(false, output, input)
    }

    fn process(
        &mut self,
        forward: bool,
        output: &mut [Complex32],
        input: &[Complex32],
    ) -> Result<()> {
        if input.len() < self.size {
            return Err(CoreError::BufferSizeMismatch {
                expected: self.size,
                actual: input.len(),
            });
        }
        if output.len() < self.size {
            return Err(CoreError::BufferSizeMismatch {
                expected: self.size,
                actual: output.len(),
            });
        }
        // rustfft's out-of-place variant scribbles over its input, so stage
        // through the output buffer and run in place there.
        output[..self.size].copy_from_slice(&input[..self.size]);
        let plan = if forward { &self.fwd } else { &self.inv };
        plan.process_with_scratch(&mut output[..self.size], &mut self.scratch);
        Ok(())
    }
}
