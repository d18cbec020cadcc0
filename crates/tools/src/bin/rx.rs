//! COFDMTV RX - decode frames from a WAV file

use anyhow::{bail, Context, Result};
use clap::Parser;
use cofdmtv_modem::prelude::*;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Receiver configuration
#[derive(Debug, Parser)]
#[command(name = "cofdmtv-rx")]
#[command(about = "COFDMTV receiver tool")]
struct RxConfig {
    /// Input WAV file path
    input: PathBuf,

    /// Constellation points: 2, 4, 8 or 16
    #[arg(long, default_value_t = 4)]
    mapping: u32,

    /// Input channel: 0 mono, 1 left, 2 right, 3 mid, 4 I/Q
    #[arg(long, default_value_t = 0)]
    channel: u8,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = RxConfig::parse();
    let mut reader = hound::WavReader::open(&config.input)
        .with_context(|| format!("opening {}", config.input.display()))?;
    let spec = reader.spec();
    if spec.bits_per_sample != 16 || spec.sample_format != hound::SampleFormat::Int {
        bail!("only 16-bit integer PCM is supported");
    }
    if spec.channels != 1 && spec.channels != 2 {
        bail!("only mono and stereo audio is supported");
    }
    let mut channel = RxChannel::from_index(config.channel)?;
    if spec.channels == 1 && channel != RxChannel::Mono {
        tracing::warn!("mono input, falling back to channel 0");
        channel = RxChannel::Mono;
    }
    if spec.channels == 2 && channel == RxChannel::Mono {
        bail!("stereo input needs a channel selection of 1 to 4");
    }

    let samples: Vec<i16> = reader
        .samples::<i16>()
        .collect::<std::result::Result<_, _>>()?;
    let modulation = Modulation::from_points(config.mapping)?;
    let mut decoder = Decoder::new(spec.sample_rate, modulation)?;

    let width = channel.width();
    let chunk = (spec.sample_rate as usize / 50) * width;
    let mut decoded_any = false;
    for block in samples.chunks(chunk) {
        let block = &block[..block.len() - block.len() % width];
        if !decoder.feed(block, channel)? {
            continue;
        }
        match decoder.process()? {
            DecoderStatus::Okay => {}
            DecoderStatus::Fail => println!("PREAMBLE FAIL"),
            DecoderStatus::Sync => {
                let staged = decoder.staged();
                println!(
                    "SYNC: cfo {:+.2} Hz, mode {}, call sign {}",
                    staged.cfo_hz,
                    staged.mode,
                    staged.call_sign.trim_start()
                );
            }
            DecoderStatus::Done => {
                let mut payload = [0u8; 170];
                match decoder.fetch(&mut payload) {
                    Ok(len) => {
                        decoded_any = true;
                        let text = String::from_utf8_lossy(&payload[..len]);
                        println!("DONE: {}", text.trim_end_matches('\0'));
                    }
                    Err(err) => println!("PAYLOAD FAIL: {}", err),
                }
            }
            DecoderStatus::Heap => bail!("decoder out of memory"),
            DecoderStatus::Nope => {
                let staged = decoder.staged();
                println!(
                    "NOPE: cfo {:+.2} Hz, mode {}, call sign {}",
                    staged.cfo_hz,
                    staged.mode,
                    staged.call_sign.trim_start()
                );
            }
            DecoderStatus::Ping => {
                let staged = decoder.staged();
                println!(
                    "PING: cfo {:+.2} Hz, call sign {}",
                    staged.cfo_hz,
                    staged.call_sign.trim_start()
                );
            }
        }
    }
    if !decoded_any {
        tracing::info!("no payload decoded");
    }
    Ok(())
}
