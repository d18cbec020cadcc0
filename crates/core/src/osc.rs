//! Numerically controlled oscillator

use num_complex::Complex32;

/// Complex phasor advanced by a fixed rotation per step.
///
/// The phasor is renormalised every step so long runs stay on the unit
/// circle.
#[derive(Debug, Clone)]
pub struct Phasor {
    prev: Complex32,
    delta: Complex32,
}

impl Default for Phasor {
    fn default() -> Self {
        Self::new()
    }
}

impl Phasor {
    pub fn new() -> Self {
        Self {
            prev: Complex32::new(1.0, 0.0),
            delta: Complex32::new(1.0, 0.0),
        }
    }

    /// Set the rotation in radians per sample.
    pub fn omega(&mut self, v: f32) {
        self.delta = Complex32::new(v.cos(), v.sin());
    }

    /// Set the rotation from a frequency in cycles per sample.
    pub fn freq(&mut self, v: f32) {
        self.omega(2.0 * std::f32::consts::PI * v);
    }

    pub fn reset(&mut self) {
        self.prev = Complex32::new(1.0, 0.0);
    }

    /// Current phasor value; advances the state.
    pub fn step(&mut self) -> Complex32 {
        let tmp = self.prev;
        self.prev *= self.delta;
        self.prev /= self.prev.norm();
        tmp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_at_unity() {
        let mut osc = Phasor::new();
        osc.omega(0.1);
        let first = osc.step();
        assert!((first.re - 1.0).abs() < 1e-6 && first.im.abs() < 1e-6);
    }

    #[test]
    fn stays_on_unit_circle() {
        let mut osc = Phasor::new();
        osc.omega(1.234567);
        let mut last = Complex32::new(0.0, 0.0);
        for _ in 0..100_000 {
            last = osc.step();
        }
        assert!((last.norm() - 1.0).abs() < 1e-4);
    }

    #[test]
    fn rotates_at_programmed_rate() {
        let mut osc = Phasor::new();
        let w = 0.01f32;
        osc.omega(w);
        let mut phase = 0.0;
        for _ in 0..10 {
            phase = osc.step().arg();
        }
        assert!((phase - 9.0 * w).abs() < 1e-4);
    }
}
