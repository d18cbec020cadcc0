//! Frame encoder
//!
//! Builds one OFDM symbol per `produce` call: optional noise padding, the
//! Schmidl-Cox sync symbol, the BCH-protected preamble, the payload
//! symbols (differentially modulated on 256 carriers) and the optional
//! fancy header. Guard intervals are cyclic prefixes cross-faded with the
//! previous symbol's cyclic continuation.

use crate::base37;
use crate::common::{
    Modulation, OperationMode, RateParams, TxChannel, CALL_SIGN_LEN, COR_SEQ_LEN, COR_SEQ_OFF,
    COR_SEQ_POLY, FANCY_LINES, FANCY_OFF, MAX_PAYLOAD_BYTES, METADATA_CRC_POLY, NOISE_POLY,
    PAY_CAR_CNT, PAY_CAR_OFF, PRE_SEQ_LEN, PRE_SEQ_OFF, PRE_SEQ_POLY,
};
use crate::mapping;
use crate::papr::PaprReduce;
use crate::{ModemError, Result};
use cofdmtv_code::bch::{BchEncoder, BCH_255_71_POLYNOMIALS};
use cofdmtv_code::bits::{get_be_bit, set_be_bit};
use cofdmtv_code::crc::Crc16;
use cofdmtv_code::mls::Mls;
use cofdmtv_code::polar::{frozen_2048, PayloadEncoder, CODE_LEN};
use cofdmtv_code::xorshift::Xorshift32;
use cofdmtv_core::fft::Fft;
use cofdmtv_core::Complex32;
use std::f32::consts::PI;
use tracing::debug;

fn nrz(bit: bool) -> f32 {
    1.0 - 2.0 * bit as i32 as f32
}

fn quantize_sample(v: f32) -> i16 {
    (32767.0 * v).round_ties_even().clamp(-32768.0, 32767.0) as i16
}

/// COFDMTV transmitter.
pub struct Encoder {
    params: RateParams,
    modulation: Modulation,
    mod_bits: usize,
    symbol_count: usize,
    bwd: Fft,
    papr: Option<PaprReduce>,
    crc: Crc16,
    bch: BchEncoder,
    noise_seq: Mls,
    polar: PayloadEncoder,
    temp: Vec<Complex32>,
    freq: Vec<Complex32>,
    prev: [Complex32; PAY_CAR_CNT],
    guard: Vec<Complex32>,
    mesg: [u8; MAX_PAYLOAD_BYTES],
    call: [u8; CALL_SIGN_LEN],
    code: Vec<i8>,
    meta_data: u64,
    operation_mode: OperationMode,
    carrier_offset: i32,
    symbol_number: usize,
    count_down: u8,
    fancy_line: usize,
    noise_count: usize,
}

impl Encoder {
    pub fn new(rate: u32, modulation: Modulation) -> Result<Self> {
        let params = RateParams::new(rate)?;
        let papr = if rate <= 16000 {
            Some(PaprReduce::new(params.symbol_length, 4)?)
        } else {
            None
        };
        Ok(Self {
            params,
            modulation,
            mod_bits: modulation.bits(),
            symbol_count: modulation.symbol_count(),
            bwd: Fft::new(params.symbol_length)?,
            papr,
            crc: Crc16::new(METADATA_CRC_POLY),
            bch: BchEncoder::new(255, 71, &BCH_255_71_POLYNOMIALS)?,
            noise_seq: Mls::new(NOISE_POLY),
            polar: PayloadEncoder::new(),
            temp: vec![Complex32::new(0.0, 0.0); params.extended_length],
            freq: vec![Complex32::new(0.0, 0.0); params.symbol_length],
            prev: [Complex32::new(0.0, 0.0); PAY_CAR_CNT],
            guard: vec![Complex32::new(0.0, 0.0); params.guard_length],
            mesg: [0; MAX_PAYLOAD_BYTES],
            call: [0; CALL_SIGN_LEN],
            code: vec![0; modulation.code_capacity()],
            meta_data: 0,
            operation_mode: OperationMode::Ping,
            carrier_offset: 0,
            symbol_number: 0,
            count_down: 0,
            fancy_line: 0,
            noise_count: 0,
        })
    }

    pub fn rate(&self) -> u32 {
        self.params.rate
    }

    /// Interleaved i16 frames per `produce` call for the given channel.
    pub fn produce_len(&self, channel: TxChannel) -> usize {
        channel.width() * self.params.extended_length
    }

    /// Arm the encoder for a new frame. The payload is scanned up to the
    /// first zero byte (at most 170); its length selects the operation
    /// mode. The call sign is folded to base-37.
    pub fn configure(
        &mut self,
        payload: &[u8],
        call_sign: &str,
        carrier_frequency: i32,
        noise_symbols: usize,
        fancy_header: bool,
    ) -> Result<()> {
        let mut len = 0;
        while len < payload.len().min(MAX_PAYLOAD_BYTES) && payload[len] != 0 {
            len += 1;
        }
        self.operation_mode = OperationMode::for_payload_len(len);
        self.carrier_offset = self.params.carrier_offset(carrier_frequency);
        self.meta_data = (base37::encode(call_sign) << 8) | self.operation_mode.wire() as u64;
        self.call = [0; CALL_SIGN_LEN];
        for (slot, &c) in self.call.iter_mut().zip(call_sign.as_bytes()) {
            *slot = base37::map_char(c);
        }
        self.symbol_number = 0;
        self.count_down = 5;
        self.fancy_line = if fancy_header { FANCY_LINES } else { 0 };
        self.noise_count = noise_symbols;
        self.guard.fill(Complex32::new(0.0, 0.0));
        debug!(
            mode = self.operation_mode.wire(),
            payload_len = len,
            carrier_offset = self.carrier_offset,
            "frame configured"
        );
        let Some(data_bits) = self.operation_mode.data_bits() else {
            return Ok(());
        };
        let frozen = frozen_2048(data_bits).ok_or(ModemError::NoFrame)?;
        let mut scrambler = Xorshift32::new();
        for i in 0..data_bits / 8 {
            self.mesg[i] = payload.get(i).copied().unwrap_or(0) ^ scrambler.next() as u8;
        }
        self.code.fill(0);
        self.polar
            .encode(&mut self.code[..CODE_LEN], &self.mesg[..data_bits / 8], frozen, data_bits);
        Ok(())
    }

    /// Emit one extended-length OFDM symbol into `audio_buffer`
    /// (`produce_len` interleaved samples). Returns false once the frame is
    /// complete; the buffer then holds silence.
    pub fn produce(&mut self, audio_buffer: &mut [i16], channel: TxChannel) -> Result<bool> {
        let extended = self.params.extended_length;
        debug_assert!(audio_buffer.len() >= self.produce_len(channel));
        let mut data_symbol = false;
        if self.count_down == 5 && self.noise_count == 0 {
            self.count_down = 4;
        }
        match self.count_down {
            5 => {
                self.noise_count -= 1;
                self.noise_symbol()?;
            }
            4 => {
                self.schmidl_cox_symbol()?;
                data_symbol = true;
                self.count_down = 3;
            }
            3 => {
                self.preamble_symbol()?;
                data_symbol = true;
                self.count_down = if self.operation_mode == OperationMode::Ping {
                    1
                } else {
                    2
                };
            }
            2 => {
                self.payload_symbol()?;
                data_symbol = true;
                self.symbol_number += 1;
                if self.symbol_number == self.symbol_count {
                    self.count_down = 1;
                }
            }
            1 => {
                if self.fancy_line > 0 {
                    self.fancy_line -= 1;
                    self.fancy_symbol()?;
                } else {
                    self.silence();
                    self.count_down = 0;
                }
            }
            _ => {
                for i in 0..extended {
                    Self::next_sample(audio_buffer, Complex32::new(0.0, 0.0), channel, i);
                }
                return Ok(false);
            }
        }
        let guard_len = self.params.guard_length;
        let symbol_len = self.params.symbol_length;
        for i in 0..guard_len {
            let mut x = i as f32 / (guard_len - 1) as f32;
            if data_symbol {
                x = x.min(0.5) / 0.5;
            }
            let y = 0.5 * (1.0 - (PI * x).cos());
            let sum = (1.0 - y) * self.guard[i] + y * self.temp[i + symbol_len - guard_len];
            Self::next_sample(audio_buffer, sum, channel, i);
        }
        self.guard.copy_from_slice(&self.temp[..guard_len]);
        for i in 0..symbol_len {
            Self::next_sample(audio_buffer, self.temp[i], channel, i + guard_len);
        }
        Ok(true)
    }

    fn next_sample(audio: &mut [i16], signal: Complex32, channel: TxChannel, i: usize) {
        let re = quantize_sample(signal.re);
        match channel {
            TxChannel::Mono => audio[i] = re,
            TxChannel::Left => {
                audio[2 * i] = re;
                audio[2 * i + 1] = 0;
            }
            TxChannel::Right => {
                audio[2 * i] = 0;
                audio[2 * i + 1] = re;
            }
            TxChannel::Quadrature => {
                audio[2 * i] = re;
                audio[2 * i + 1] = quantize_sample(signal.im);
            }
            TxChannel::Both => {
                audio[2 * i] = re;
                audio[2 * i + 1] = re;
            }
        }
    }

    fn bin(&self, carrier: i32) -> usize {
        (carrier + self.carrier_offset).rem_euclid(self.params.symbol_length as i32) as usize
    }

    fn schmidl_cox_symbol(&mut self) -> Result<()> {
        let mut seq = Mls::new(COR_SEQ_POLY);
        let factor = (2.0 * self.params.symbol_length as f32 / COR_SEQ_LEN as f32).sqrt();
        self.freq.fill(Complex32::new(0.0, 0.0));
        let pilot = self.bin(COR_SEQ_OFF - 2);
        self.freq[pilot] = Complex32::new(factor, 0.0);
        for i in 0..COR_SEQ_LEN {
            let idx = self.bin(2 * i + COR_SEQ_OFF);
            self.freq[idx] = Complex32::new(nrz(seq.next()), 0.0);
        }
        // differential chain picks up the pilot amplitude
        for i in 0..COR_SEQ_LEN {
            let prev = self.freq[self.bin(2 * (i - 1) + COR_SEQ_OFF)];
            let idx = self.bin(2 * i + COR_SEQ_OFF);
            self.freq[idx] *= prev;
        }
        self.transform(false)
    }

    fn preamble_symbol(&mut self) -> Result<()> {
        let mut data = [0u8; 9];
        let mut parity = [0u8; 23];
        for i in 0..55 {
            set_be_bit(&mut data, i, (self.meta_data >> i) & 1 != 0);
        }
        self.crc.reset();
        self.crc.put_u64(self.meta_data << 9);
        let cs = self.crc.value();
        for i in 0..16 {
            set_be_bit(&mut data, i + 55, (cs >> i) & 1 != 0);
        }
        self.bch.encode(&data, &mut parity, 71);
        let mut seq = Mls::new(PRE_SEQ_POLY);
        let factor = (self.params.symbol_length as f32 / PRE_SEQ_LEN as f32).sqrt();
        self.freq.fill(Complex32::new(0.0, 0.0));
        let pilot = self.bin(PRE_SEQ_OFF - 1);
        self.freq[pilot] = Complex32::new(factor, 0.0);
        for i in 0..71 {
            let idx = self.bin(i + PRE_SEQ_OFF);
            self.freq[idx] = Complex32::new(nrz(get_be_bit(&data, i as usize)), 0.0);
        }
        for i in 71..PRE_SEQ_LEN {
            let idx = self.bin(i + PRE_SEQ_OFF);
            self.freq[idx] = Complex32::new(nrz(get_be_bit(&parity, (i - 71) as usize)), 0.0);
        }
        for i in 0..PRE_SEQ_LEN {
            let prev = self.freq[self.bin(i - 1 + PRE_SEQ_OFF)];
            let idx = self.bin(i + PRE_SEQ_OFF);
            self.freq[idx] *= prev;
        }
        for i in 0..PRE_SEQ_LEN {
            let idx = self.bin(i + PRE_SEQ_OFF);
            self.freq[idx] *= nrz(seq.next());
        }
        // payload symbols modulate differentially against the preamble
        for i in 0..PAY_CAR_CNT {
            self.prev[i] = self.freq[self.bin(i as i32 + PAY_CAR_OFF)];
        }
        self.transform(true)
    }

    fn payload_symbol(&mut self) -> Result<()> {
        self.freq.fill(Complex32::new(0.0, 0.0));
        for i in 0..PAY_CAR_CNT {
            let off = self.mod_bits * (PAY_CAR_CNT * self.symbol_number + i);
            self.prev[i] *= mapping::map(self.modulation, &self.code[off..off + self.mod_bits]);
            let idx = self.bin(i as i32 + PAY_CAR_OFF);
            self.freq[idx] = self.prev[i];
        }
        self.transform(true)
    }

    fn noise_symbol(&mut self) -> Result<()> {
        let factor = (self.params.symbol_length as f32 / PAY_CAR_CNT as f32).sqrt();
        self.freq.fill(Complex32::new(0.0, 0.0));
        for i in 0..PAY_CAR_CNT {
            let idx = self.bin(i as i32 + PAY_CAR_OFF);
            let re = nrz(self.noise_seq.next());
            let im = nrz(self.noise_seq.next());
            self.freq[idx] = factor * Complex32::new(re, im);
        }
        self.transform(false)
    }

    fn fancy_symbol(&mut self) -> Result<()> {
        let mut active_carriers = 1usize;
        for j in 0..CALL_SIGN_LEN {
            let row = base37::GLYPHS[self.call[j] as usize][self.fancy_line];
            active_carriers += row.count_ones() as usize;
        }
        let factor = (self.params.symbol_length as f32 / active_carriers as f32).sqrt();
        self.freq.fill(Complex32::new(0.0, 0.0));
        for j in 0..CALL_SIGN_LEN {
            let row = base37::GLYPHS[self.call[j] as usize][self.fancy_line];
            for i in 0..8 {
                if row & (1 << (7 - i)) != 0 {
                    let idx = self.bin(((8 * j + i) * 3) as i32 + FANCY_OFF);
                    self.freq[idx] = Complex32::new(factor * nrz(self.noise_seq.next()), 0.0);
                }
            }
        }
        self.transform(false)
    }

    fn silence(&mut self) {
        for sample in &mut self.temp[..self.params.symbol_length] {
            *sample = Complex32::new(0.0, 0.0);
        }
    }

    fn transform(&mut self, papr_reduction: bool) -> Result<()> {
        if papr_reduction {
            if let Some(papr) = &mut self.papr {
                papr.apply(&mut self.freq)?;
            }
        }
        self.bwd.inverse(&mut self.temp, &self.freq)?;
        let scale = 1.0 / (8.0 * self.params.symbol_length as f32).sqrt();
        for sample in &mut self.temp[..self.params.symbol_length] {
            *sample *= scale;
        }
        Ok(())
    }
}
