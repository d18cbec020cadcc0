//! COFDMTV TX - render a frame into a WAV file

use anyhow::{Context, Result};
use clap::Parser;
use cofdmtv_modem::prelude::*;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Transmitter configuration
#[derive(Debug, Parser)]
#[command(name = "cofdmtv-tx")]
#[command(about = "COFDMTV transmitter tool")]
struct TxConfig {
    /// Output WAV file path
    #[arg(short, long)]
    output: PathBuf,

    /// Message to transmit (empty sends a ping)
    #[arg(short, long, default_value = "")]
    message: String,

    /// Station call sign (up to 9 base-37 characters)
    #[arg(short, long)]
    callsign: String,

    /// Sample rate in Hz
    #[arg(long, default_value_t = 8000)]
    rate: u32,

    /// Carrier frequency in Hz
    #[arg(long, default_value_t = 1500)]
    carrier: i32,

    /// Constellation points: 2, 4, 8 or 16
    #[arg(long, default_value_t = 4)]
    mapping: u32,

    /// Output channel: 0 mono, 1 left, 2 right, 3 I/Q, 4 both
    #[arg(long, default_value_t = 0)]
    channel: u8,

    /// Noise padding symbols before the frame
    #[arg(long, default_value_t = 1)]
    noise_symbols: usize,

    /// Paint the call sign into a fancy header
    #[arg(long)]
    fancy: bool,

    /// Seconds of trailing silence
    #[arg(long, default_value_t = 0.5)]
    tail: f32,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = TxConfig::parse();
    let modulation = Modulation::from_points(config.mapping)?;
    let channel = TxChannel::from_index(config.channel)?;
    let mut encoder = Encoder::new(config.rate, modulation)?;
    encoder.configure(
        config.message.as_bytes(),
        &config.callsign,
        config.carrier,
        config.noise_symbols,
        config.fancy,
    )?;

    let spec = hound::WavSpec {
        channels: channel.width() as u16,
        sample_rate: config.rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&config.output, spec)
        .with_context(|| format!("creating {}", config.output.display()))?;

    let mut buffer = vec![0i16; encoder.produce_len(channel)];
    let mut frames = 0usize;
    while encoder.produce(&mut buffer, channel)? {
        for &sample in &buffer {
            writer.write_sample(sample)?;
        }
        frames += 1;
    }
    // trailing silence lets the receiver flush its window
    let tail = (config.tail * config.rate as f32) as usize * channel.width();
    for _ in 0..tail {
        writer.write_sample(0i16)?;
    }
    writer.finalize()?;
    tracing::info!(symbols = frames, output = %config.output.display(), "frame written");
    Ok(())
}
