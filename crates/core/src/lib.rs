//! COFDMTV Core - DSP primitives and signal processing
//!
//! This crate provides the fundamental DSP building blocks of the COFDMTV
//! acoustic modem: complex FFT wrappers, the analytic-signal front end
//! (DC blocker, Hilbert FIR), sliding-window accumulators, a numerically
//! controlled oscillator, trigger primitives and robust regression.

pub mod buffer;
pub mod error;
pub mod fft;
pub mod filter;
pub mod kahan;
pub mod osc;
pub mod regress;
pub mod sliding;
pub mod trigger;

pub use error::{CoreError, Result};

/// Complex sample type used throughout the signal chain.
pub use num_complex::Complex32;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::{
        buffer::BipBuffer,
        error::{CoreError, Result},
        fft::Fft,
        filter::{BlockDc, Delay, Hilbert},
        osc::Phasor,
        regress::TheilSenEstimator,
        sliding::SlidingSum,
        trigger::{FallingEdgeTrigger, SchmittTrigger},
        Complex32,
    };
}
