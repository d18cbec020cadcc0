//! Schmidl-Cox frame synchronisation
//!
//! The sync symbol consists of two identical halves, so the correlator
//! works on the half-symbol grid: a sliding auto-correlation between the
//! stream and its half-symbol-delayed copy peaks on the symbol, a Schmitt
//! trigger debounces the timing metric, and the falling edge commits.
//! The committed position is then refined by cross-correlating the
//! differential spectrum of the half symbol against the known MLS
//! signature, which also yields the integer carrier offset; the plateau
//! phase gives the fractional offset.

use crate::Result;
use cofdmtv_core::fft::Fft;
use cofdmtv_core::filter::Delay;
use cofdmtv_core::osc::Phasor;
use cofdmtv_core::sliding::SlidingSum;
use cofdmtv_core::trigger::{FallingEdgeTrigger, SchmittTrigger};
use cofdmtv_core::Complex32;
use std::f32::consts::PI;

pub struct SchmidlCox {
    search_pos: usize,
    symbol_len: usize,
    guard_len: usize,
    match_del: usize,
    fwd: Fft,
    bwd: Fft,
    cor: SlidingSum<Complex32>,
    pwr: SlidingSum<f32>,
    matcher: SlidingSum<f32>,
    align: Delay<f32>,
    threshold: SchmittTrigger,
    falling: FallingEdgeTrigger,
    kern: Vec<Complex32>,
    tmp0: Vec<Complex32>,
    tmp1: Vec<Complex32>,
    timing_max: f32,
    phase_max: f32,
    index_max: usize,
    /// Detected start of the sync symbol within the search window.
    pub symbol_pos: usize,
    /// Total carrier frequency offset in radians per sample.
    pub cfo_rad: f32,
    /// Fractional part of the offset, in radians per sample.
    pub frac_cfo: f32,
}

impl SchmidlCox {
    /// `sequence` is the MLS signature on the half-symbol grid
    /// (`symbol_len` bins); `symbol_len` is half the OFDM symbol length.
    pub fn new(
        sequence: &[Complex32],
        search_pos: usize,
        symbol_len: usize,
        guard_len: usize,
    ) -> Result<Self> {
        let match_len = guard_len | 1;
        let match_del = (match_len - 1) / 2;
        let mut fwd = Fft::new(symbol_len)?;
        let bwd = Fft::new(symbol_len)?;
        let mut kern = vec![Complex32::new(0.0, 0.0); symbol_len];
        fwd.forward(&mut kern, sequence)?;
        for bin in kern.iter_mut() {
            *bin = bin.conj() / symbol_len as f32;
        }
        Ok(Self {
            search_pos,
            symbol_len,
            guard_len,
            match_del,
            fwd,
            bwd,
            cor: SlidingSum::new(symbol_len),
            pwr: SlidingSum::new(2 * symbol_len),
            matcher: SlidingSum::new(match_len),
            align: Delay::new(match_del),
            threshold: SchmittTrigger::new(0.17 * match_len as f32, 0.19 * match_len as f32),
            falling: FallingEdgeTrigger::new(),
            kern,
            tmp0: vec![Complex32::new(0.0, 0.0); symbol_len],
            tmp1: vec![Complex32::new(0.0, 0.0); symbol_len],
            timing_max: 0.0,
            phase_max: 0.0,
            index_max: 0,
            symbol_pos: 0,
            cfo_rad: 0.0,
            frac_cfo: 0.0,
        })
    }

    fn bin(&self, carrier: i32) -> usize {
        (carrier + self.symbol_len as i32) as usize % self.symbol_len
    }

    fn demod_or_erase(curr: Complex32, prev: Complex32, pwr: f32) -> Complex32 {
        if curr.norm_sqr() > pwr && prev.norm_sqr() > pwr {
            let cons = curr / prev;
            if cons.norm_sqr() < 4.0 {
                return cons;
            }
        }
        Complex32::new(0.0, 0.0)
    }

    /// Advance by one sample over the receive window. True when a sync
    /// symbol has been detected and survived refinement; `symbol_pos`,
    /// `cfo_rad` and `frac_cfo` are then valid.
    pub fn push(&mut self, samples: &[Complex32]) -> Result<bool> {
        let l = self.symbol_len;
        let p = self
            .cor
            .push(samples[self.search_pos + l] * samples[self.search_pos + 2 * l].conj());
        let mut r = 0.5 * self.pwr.push(samples[self.search_pos + 2 * l].norm_sqr());
        let min_r = 0.00001 * l as f32;
        r = r.max(min_r);
        let timing = self.matcher.push(p.norm_sqr() / (r * r));
        let phase = self.align.process(p.arg());

        let collect = self.threshold.process(timing);
        let process = self.falling.process(collect);

        if !collect && !process {
            return Ok(false);
        }

        if self.timing_max < timing {
            self.timing_max = timing;
            self.phase_max = phase;
            self.index_max = self.match_del;
        } else if self.index_max < l + self.guard_len + self.match_del {
            self.index_max += 1;
        }

        if !process {
            return Ok(false);
        }

        self.frac_cfo = self.phase_max / l as f32;
        let mut osc = Phasor::new();
        osc.omega(self.frac_cfo);
        let symbol_pos = self.search_pos - self.index_max;
        self.index_max = 0;
        self.timing_max = 0.0;
        for i in 0..l {
            self.tmp1[i] = samples[i + symbol_pos + l] * osc.step();
        }
        self.fwd.forward(&mut self.tmp0, &self.tmp1)?;
        let mut min_pwr = 0.0;
        for bin in &self.tmp0 {
            min_pwr += bin.norm_sqr();
        }
        min_pwr /= l as f32;
        for i in 0..l {
            self.tmp1[i] = Self::demod_or_erase(self.tmp0[i], self.tmp0[self.bin(i as i32 - 1)], min_pwr);
        }
        self.fwd.forward(&mut self.tmp0, &self.tmp1)?;
        for i in 0..l {
            self.tmp0[i] *= self.kern[i];
        }
        self.bwd.inverse(&mut self.tmp1, &self.tmp0)?;

        let mut shift = 0;
        let mut peak = 0.0f32;
        let mut next = 0.0f32;
        for (i, value) in self.tmp1.iter().enumerate() {
            let power = value.norm_sqr();
            if power > peak {
                next = peak;
                peak = power;
                shift = i;
            } else if power > next {
                next = power;
            }
        }
        if peak <= next * 4.0 {
            return Ok(false);
        }

        let pos_err = (self.tmp1[shift].arg() * l as f32 / (2.0 * PI)).round_ties_even() as i32;
        if pos_err.unsigned_abs() as usize > self.guard_len / 2 {
            return Ok(false);
        }
        self.symbol_pos = (symbol_pos as i32 - pos_err) as usize;

        self.cfo_rad = shift as f32 * (2.0 * PI / l as f32) - self.frac_cfo;
        if self.cfo_rad >= PI {
            self.cfo_rad -= 2.0 * PI;
        }
        Ok(true)
    }
}
