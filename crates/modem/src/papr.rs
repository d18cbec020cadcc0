//! Peak-to-average power ratio reduction
//!
//! Clip-and-filter on the transmit grid: oversample by zero-padding the
//! middle of the spectrum, clip time samples above unit magnitude, return
//! to the frequency domain and keep only the originally active bins.

use crate::Result;
use cofdmtv_core::fft::Fft;
use cofdmtv_core::Complex32;

/// Transmit-side PAPR improvement stage.
pub struct PaprReduce {
    size: usize,
    factor: usize,
    fwd: Fft,
    bwd: Fft,
    temp: Vec<Complex32>,
    over: Vec<Complex32>,
    used: Vec<bool>,
}

impl PaprReduce {
    /// `factor` is the oversampling factor (at least 2; the modem uses 4).
    pub fn new(size: usize, factor: usize) -> Result<Self> {
        debug_assert!(factor >= 2);
        Ok(Self {
            size,
            factor,
            fwd: Fft::new(factor * size)?,
            bwd: Fft::new(factor * size)?,
            temp: vec![Complex32::new(0.0, 0.0); factor * size],
            over: vec![Complex32::new(0.0, 0.0); factor * size],
            used: vec![false; size],
        })
    }

    pub fn apply(&mut self, freq: &mut [Complex32]) -> Result<()> {
        let size = self.size;
        let factor = self.factor;
        for i in 0..size {
            self.used[i] = freq[i].re != 0.0 || freq[i].im != 0.0;
        }
        // zero-pad the middle of the spectrum to oversample
        self.over[..size / 2].copy_from_slice(&freq[..size / 2]);
        for bin in &mut self.over[size / 2..factor * size - size / 2] {
            *bin = Complex32::new(0.0, 0.0);
        }
        self.over[size * (factor - 1) + size / 2..].copy_from_slice(&freq[size / 2..size]);
        self.bwd.inverse(&mut self.temp, &self.over)?;
        let scale = 1.0 / ((factor * size) as f32).sqrt();
        Self::clip(&mut self.temp, scale);
        self.fwd.forward(&mut self.over, &self.temp)?;
        for i in 0..size / 2 {
            if self.used[i] {
                freq[i] = scale * self.over[i];
            }
        }
        for i in size / 2..size {
            if self.used[i] {
                freq[i] = scale * self.over[size * (factor - 1) + i];
            }
        }
        Ok(())
    }

    fn clip(temp: &mut [Complex32], scale: f32) {
        for sample in temp.iter_mut() {
            *sample *= scale;
            let pwr = sample.norm_sqr();
            if pwr > 1.0 {
                *sample /= pwr.sqrt();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peak_to_average(time: &[Complex32]) -> f32 {
        let peak = time.iter().map(|c| c.norm_sqr()).fold(0.0f32, f32::max);
        let avg = time.iter().map(|c| c.norm_sqr()).sum::<f32>() / time.len() as f32;
        peak / avg
    }

    #[test]
    fn reduces_peaks_and_respects_active_bins() {
        let size = 1280;
        let mut papr = PaprReduce::new(size, 4).unwrap();
        let mut freq = vec![Complex32::new(0.0, 0.0); size];
        // worst case: a block of aligned carriers, impulse-like in time
        for i in 0..256usize {
            let bin = (i as i32 - 128 + 240 + size as i32) as usize % size;
            freq[bin] = Complex32::new(1.0, 0.0);
        }
        let before = freq.clone();
        let mut fft = Fft::new(size).unwrap();
        let mut time = vec![Complex32::new(0.0, 0.0); size];
        fft.inverse(&mut time, &before).unwrap();
        let papr_before = peak_to_average(&time);
        papr.apply(&mut freq).unwrap();
        // inactive bins stay empty
        for (i, bin) in freq.iter().enumerate() {
            let was_active = before[i].re != 0.0 || before[i].im != 0.0;
            if !was_active {
                assert_eq!(bin.norm_sqr(), 0.0, "bin {} leaked", i);
            }
        }
        fft.inverse(&mut time, &freq).unwrap();
        let papr_after = peak_to_average(&time);
        assert!(
            papr_after < papr_before,
            "papr not reduced: {} -> {}",
            papr_before,
            papr_after
        );
        // the active carriers keep carrying their signs
        let mut kept = 0;
        for (i, bin) in freq.iter().enumerate() {
            let was_active = before[i].re != 0.0 || before[i].im != 0.0;
            if was_active && bin.re > 0.0 {
                kept += 1;
            }
        }
        assert!(kept >= 250, "clipping flipped {} carrier signs", 256 - kept);
    }
}
