//! Frame decoder
//!
//! `feed` pushes PCM through the analytic front end into the receive
//! window while the Schmidl-Cox correlator hunts for the sync symbol;
//! `process` consumes one OFDM symbol per call: first the preamble
//! (BCH+OSD metadata), then the payload symbols (differential demap,
//! Theil-Sen phase compensation, soft demap); `fetch` runs the polar list
//! decoder over the collected soft bits.

use crate::base37;
use crate::common::{
    DecoderStatus, Modulation, OperationMode, RateParams, RxChannel, CALL_SIGN_LIMIT, COR_SEQ_LEN,
    COR_SEQ_OFF, COR_SEQ_POLY, MAX_PAYLOAD_BYTES, METADATA_CRC_POLY, PAY_CAR_CNT, PAY_CAR_OFF,
    PRE_SEQ_LEN, PRE_SEQ_OFF, PRE_SEQ_POLY,
};
use crate::mapping;
use crate::sync::SchmidlCox;
use crate::{ModemError, Result};
use cofdmtv_code::bch::{generator_matrix, BCH_255_71_POLYNOMIALS};
use cofdmtv_code::bits::get_be_bit;
use cofdmtv_code::crc::Crc16;
use cofdmtv_code::mls::Mls;
use cofdmtv_code::osd::OrderedStatisticsDecoder;
use cofdmtv_code::polar::{frozen_2048, PayloadDecoder, CODE_LEN};
use cofdmtv_code::xorshift::Xorshift32;
use cofdmtv_core::buffer::BipBuffer;
use cofdmtv_core::fft::Fft;
use cofdmtv_core::filter::{BlockDc, Hilbert};
use cofdmtv_core::osc::Phasor;
use cofdmtv_core::regress::TheilSenEstimator;
use cofdmtv_core::Complex32;
use std::f32::consts::TAU;
use tracing::debug;

/// Preamble information latched at sync.
#[derive(Debug, Clone)]
pub struct StagedInfo {
    /// Estimated carrier frequency offset in Hz.
    pub cfo_hz: f32,
    /// Operation mode byte from the metadata.
    pub mode: u8,
    /// Call sign, nine right-aligned base-37 characters.
    pub call_sign: String,
}

/// COFDMTV receiver.
pub struct Decoder {
    params: RateParams,
    modulation: Modulation,
    mod_bits: usize,
    symbol_count: i64,
    fwd: Fft,
    correlator: SchmidlCox,
    block_dc: BlockDc,
    hilbert: Hilbert,
    buffer: BipBuffer<Complex32>,
    tse: TheilSenEstimator,
    osc: Phasor,
    crc: Crc16,
    osd: OrderedStatisticsDecoder,
    generator: Vec<u8>,
    polar: PayloadDecoder,
    window: Vec<Complex32>,
    temp: Vec<Complex32>,
    freq: Vec<Complex32>,
    prev: [Complex32; PAY_CAR_CNT],
    cons: [Complex32; PAY_CAR_CNT],
    index: [f32; PAY_CAR_CNT],
    phase: [f32; PAY_CAR_CNT],
    code: Vec<i8>,
    soft: [i8; PRE_SEQ_LEN as usize],
    data: [u8; 32],
    symbol_number: i64,
    symbol_position: usize,
    stored_position: usize,
    staged_position: usize,
    staged_mode: u8,
    operation_mode: Option<OperationMode>,
    accumulated: usize,
    stored_cfo_rad: f32,
    staged_cfo_rad: f32,
    stored_frac_cfo: f32,
    staged_frac_cfo: f32,
    staged_call: u64,
    stored_check: bool,
    staged_check: bool,
}

impl Decoder {
    pub fn new(rate: u32, modulation: Modulation) -> Result<Self> {
        let params = RateParams::new(rate)?;
        let half = params.symbol_length / 2;
        let mut cor_seq = vec![Complex32::new(0.0, 0.0); half];
        let mut seq = Mls::new(COR_SEQ_POLY);
        for i in 0..COR_SEQ_LEN {
            let idx = (i + COR_SEQ_OFF / 2 + half as i32) as usize % half;
            cor_seq[idx] = Complex32::new(1.0 - 2.0 * seq.next() as i32 as f32, 0.0);
        }
        let correlator = SchmidlCox::new(
            &cor_seq,
            params.search_position(),
            half,
            params.guard_length,
        )?;
        let mut block_dc = BlockDc::new();
        block_dc.samples(params.filter_length);
        let symbol_count = modulation.symbol_count() as i64;
        Ok(Self {
            params,
            modulation,
            mod_bits: modulation.bits(),
            symbol_count,
            fwd: Fft::new(params.symbol_length)?,
            correlator,
            block_dc,
            hilbert: Hilbert::new(params.filter_length)?,
            buffer: BipBuffer::new(params.buffer_length())?,
            tse: TheilSenEstimator::new(PAY_CAR_CNT),
            osc: Phasor::new(),
            crc: Crc16::new(METADATA_CRC_POLY),
            osd: OrderedStatisticsDecoder::new(),
            generator: generator_matrix(255, 71, &BCH_255_71_POLYNOMIALS, true)?,
            polar: PayloadDecoder::new(),
            window: vec![Complex32::new(0.0, 0.0); params.buffer_length()],
            temp: vec![Complex32::new(0.0, 0.0); params.extended_length],
            freq: vec![Complex32::new(0.0, 0.0); params.symbol_length],
            prev: [Complex32::new(0.0, 0.0); PAY_CAR_CNT],
            cons: [Complex32::new(0.0, 0.0); PAY_CAR_CNT],
            index: [0.0; PAY_CAR_CNT],
            phase: [0.0; PAY_CAR_CNT],
            code: vec![0; modulation.code_capacity()],
            soft: [0; PRE_SEQ_LEN as usize],
            data: [0; 32],
            symbol_number: symbol_count,
            symbol_position: params.search_position() + params.extended_length,
            stored_position: 0,
            staged_position: 0,
            staged_mode: 0,
            operation_mode: None,
            accumulated: 0,
            stored_cfo_rad: 0.0,
            staged_cfo_rad: 0.0,
            stored_frac_cfo: 0.0,
            staged_frac_cfo: 0.0,
            staged_call: 0,
            stored_check: false,
            staged_check: false,
        })
    }

    pub fn rate(&self) -> u32 {
        self.params.rate
    }

    fn bin(&self, carrier: i32) -> usize {
        carrier.rem_euclid(self.params.symbol_length as i32) as usize
    }

    fn analytic(&mut self, real: f32) -> Complex32 {
        let blocked = self.block_dc.process(real);
        self.hilbert.process(blocked)
    }

    fn convert(&mut self, samples: &[i16], channel: RxChannel, i: usize) -> Complex32 {
        match channel {
            RxChannel::Mono => self.analytic(samples[i] as f32 / 32768.0),
            RxChannel::Left => self.analytic(samples[2 * i] as f32 / 32768.0),
            RxChannel::Right => self.analytic(samples[2 * i + 1] as f32 / 32768.0),
            RxChannel::Mid => self.analytic(
                (samples[2 * i] as i32 + samples[2 * i + 1] as i32) as f32 / 65536.0,
            ),
            RxChannel::Quadrature => {
                Complex32::new(samples[2 * i] as f32, samples[2 * i + 1] as f32) / 32768.0
            }
        }
    }

    fn demod_or_erase(curr: Complex32, prev: Complex32) -> Complex32 {
        if prev.norm_sqr() <= 0.0 {
            return Complex32::new(0.0, 0.0);
        }
        let cons = curr / prev;
        if cons.norm_sqr() > 4.0 {
            return Complex32::new(0.0, 0.0);
        }
        cons
    }

    /// Ingest up to `extended_length` interleaved PCM frames. True when a
    /// full symbol window has accumulated and `process` should run.
    pub fn feed(&mut self, samples: &[i16], channel: RxChannel) -> Result<bool> {
        let frames = samples.len() / channel.width();
        debug_assert!(frames <= self.params.extended_length);
        let mut ready = false;
        for i in 0..frames {
            let sample = self.convert(samples, channel, i);
            self.buffer.push(sample);
            if self.correlator.push(self.buffer.window())? {
                self.stored_cfo_rad = self.correlator.cfo_rad;
                self.stored_frac_cfo = self.correlator.frac_cfo;
                self.stored_position = self.correlator.symbol_pos + self.accumulated;
                self.stored_check = true;
            }
            self.accumulated += 1;
            if self.accumulated == self.params.extended_length {
                self.accumulated = 0;
                self.window.copy_from_slice(self.buffer.window());
                if self.stored_check {
                    self.staged_cfo_rad = self.stored_cfo_rad;
                    self.staged_frac_cfo = self.stored_frac_cfo;
                    self.staged_position = self.stored_position;
                    self.staged_check = true;
                    self.stored_check = false;
                }
                ready = true;
            }
        }
        Ok(ready)
    }

    /// Read the preamble information latched at the last sync. The
    /// reported CFO is the deviation from the synchroniser's frequency
    /// grid; the integer grid part absorbs the nominal carrier.
    pub fn staged(&self) -> StagedInfo {
        StagedInfo {
            cfo_hz: -self.staged_frac_cfo * self.params.rate as f32 / TAU,
            mode: self.staged_mode,
            call_sign: String::from_utf8_lossy(&base37::decode(self.staged_call)).into_owned(),
        }
    }

    fn preamble(&mut self) -> Result<DecoderStatus> {
        let symbol_len = self.params.symbol_length;
        let mut nco = Phasor::new();
        nco.omega(-self.staged_cfo_rad);
        for i in 0..symbol_len {
            self.temp[i] = self.window[self.staged_position + i] * nco.step();
        }
        self.fwd.forward(&mut self.freq, &self.temp)?;
        let mut seq = Mls::new(PRE_SEQ_POLY);
        for i in 0..PRE_SEQ_LEN {
            let idx = self.bin(i + PRE_SEQ_OFF);
            self.freq[idx] *= 1.0 - 2.0 * seq.next() as i32 as f32;
        }
        for i in 0..PRE_SEQ_LEN {
            let curr = self.freq[self.bin(i + PRE_SEQ_OFF)];
            let prev = self.freq[self.bin(i - 1 + PRE_SEQ_OFF)];
            let cons = Self::demod_or_erase(curr, prev);
            let mut bit = [0i8; 1];
            mapping::soft(Modulation::Bpsk, &mut bit, cons, 32.0);
            self.soft[i as usize] = bit[0];
        }
        if !self.osd.decode(&mut self.data, &self.soft, &self.generator) {
            debug!("preamble not decodable or ambiguous");
            return Ok(DecoderStatus::Fail);
        }
        let mut md = 0u64;
        for i in 0..55 {
            md |= (get_be_bit(&self.data, i) as u64) << i;
        }
        let mut cs = 0u16;
        for i in 0..16 {
            cs |= (get_be_bit(&self.data, i + 55) as u16) << i;
        }
        self.crc.reset();
        self.crc.put_u64(md << 9);
        if self.crc.value() != cs {
            debug!("metadata checksum mismatch");
            return Ok(DecoderStatus::Fail);
        }
        self.staged_mode = (md & 255) as u8;
        self.staged_call = md >> 8;
        if self.staged_mode != 0 && !(14..=16).contains(&self.staged_mode) {
            debug!(mode = self.staged_mode, "unsupported operation mode");
            return Ok(DecoderStatus::Nope);
        }
        if self.staged_call == 0 || self.staged_call >= CALL_SIGN_LIMIT {
            self.staged_call = 0;
            debug!("call sign out of range");
            return Ok(DecoderStatus::Nope);
        }
        if self.staged_mode == 0 {
            return Ok(DecoderStatus::Ping);
        }
        Ok(DecoderStatus::Okay)
    }

    fn compensate(&mut self) {
        let mut count = 0;
        for i in 0..PAY_CAR_CNT {
            let con = self.cons[i];
            if con.re != 0.0 && con.im != 0.0 {
                let mut tmp = [0i8; 4];
                mapping::hard(self.modulation, &mut tmp, con);
                let ideal = mapping::map(self.modulation, &tmp);
                self.index[count] = (i as i32 + PAY_CAR_OFF) as f32;
                self.phase[count] = (con * ideal.conj()).arg();
                count += 1;
            }
        }
        self.tse.compute(&self.index[..count], &self.phase[..count]);
        for i in 0..PAY_CAR_CNT {
            let angle = -self.tse.eval((i as i32 + PAY_CAR_OFF) as f32);
            self.cons[i] *= Complex32::from_polar(1.0, angle);
        }
    }

    fn precision(&self) -> f32 {
        let mut signal_power = 0.0;
        let mut noise_power = 0.0;
        for i in 0..PAY_CAR_CNT {
            let mut tmp = [0i8; 4];
            mapping::hard(self.modulation, &mut tmp, self.cons[i]);
            let hard = mapping::map(self.modulation, &tmp);
            let error = self.cons[i] - hard;
            signal_power += hard.norm_sqr();
            noise_power += error.norm_sqr();
        }
        signal_power / noise_power
    }

    fn demap(&mut self) {
        let precision = self.precision();
        for i in 0..PAY_CAR_CNT {
            let off = self.mod_bits * (self.symbol_number as usize * PAY_CAR_CNT + i);
            mapping::soft(
                self.modulation,
                &mut self.code[off..off + self.mod_bits],
                self.cons[i],
                precision,
            );
        }
    }

    /// Advance by at most one OFDM symbol of work.
    pub fn process(&mut self) -> Result<DecoderStatus> {
        let mut status = DecoderStatus::Okay;
        if self.staged_check {
            self.staged_check = false;
            status = self.preamble()?;
            if status == DecoderStatus::Okay {
                self.operation_mode = OperationMode::from_wire(self.staged_mode);
                self.osc.omega(-self.staged_cfo_rad);
                self.symbol_position = self.staged_position;
                self.symbol_number = -1;
                status = DecoderStatus::Sync;
                debug!(
                    mode = self.staged_mode,
                    carrier_hz = self.staged_cfo_rad * self.params.rate as f32 / TAU,
                    "frame synchronised"
                );
            }
        }
        if self.symbol_number < self.symbol_count {
            for i in 0..self.params.extended_length {
                self.temp[i] = self.window[self.symbol_position + i] * self.osc.step();
            }
            self.fwd.forward(&mut self.freq, &self.temp)?;
            if self.symbol_number >= 0 {
                for i in 0..PAY_CAR_CNT {
                    let curr = self.freq[self.bin(i as i32 + PAY_CAR_OFF)];
                    self.cons[i] = Self::demod_or_erase(curr, self.prev[i]);
                }
                self.compensate();
                self.demap();
            }
            self.symbol_number += 1;
            if self.symbol_number == self.symbol_count {
                status = DecoderStatus::Done;
                debug!("payload symbols collected");
            }
            for i in 0..PAY_CAR_CNT {
                self.prev[i] = self.freq[self.bin(i as i32 + PAY_CAR_OFF)];
            }
        }
        Ok(status)
    }

    /// Run the payload decoder over the collected soft bits. `payload`
    /// must hold 170 bytes; it is zero-padded past the frame's data bytes.
    /// On checksum failure the de-scrambled best guess is left in place
    /// and an error returned.
    pub fn fetch(&mut self, payload: &mut [u8]) -> Result<usize> {
        debug_assert!(payload.len() >= MAX_PAYLOAD_BYTES);
        let data_bits = self
            .operation_mode
            .and_then(OperationMode::data_bits)
            .ok_or(ModemError::NoFrame)?;
        let frozen = frozen_2048(data_bits).ok_or(ModemError::NoFrame)?;
        let verdict = self
            .polar
            .decode(payload, &self.code[..CODE_LEN], frozen, data_bits);
        let mut scrambler = Xorshift32::new();
        for byte in payload.iter_mut().take(data_bits / 8) {
            *byte ^= scrambler.next() as u8;
        }
        for byte in payload.iter_mut().take(MAX_PAYLOAD_BYTES).skip(data_bits / 8) {
            *byte = 0;
        }
        match verdict {
            Ok(()) => Ok(data_bits / 8),
            Err(err) => {
                debug!("payload checksum failed");
                Err(err.into())
            }
        }
    }
}
