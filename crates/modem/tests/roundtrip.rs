//! End-to-end frame round trips through the PCM domain

use cofdmtv_code::xorshift::Xorshift32;
use cofdmtv_modem::prelude::*;
use std::f64::consts::TAU;

const PAYLOAD_BYTES: usize = 170;

fn render(
    rate: u32,
    modulation: Modulation,
    payload: &[u8],
    call: &str,
    carrier: i32,
    noise_symbols: usize,
    fancy: bool,
    channel: TxChannel,
) -> Vec<i16> {
    let mut encoder = Encoder::new(rate, modulation).unwrap();
    encoder
        .configure(payload, call, carrier, noise_symbols, fancy)
        .unwrap();
    let mut buffer = vec![0i16; encoder.produce_len(channel)];
    let mut out = Vec::new();
    while encoder.produce(&mut buffer, channel).unwrap() {
        out.extend_from_slice(&buffer);
    }
    // silence tail so the receiver can flush its pipeline
    out.extend(std::iter::repeat(0).take(4 * encoder.produce_len(channel)));
    out
}

#[derive(Default)]
struct Outcome {
    staged: Option<StagedInfo>,
    statuses: Vec<DecoderStatus>,
    payloads: Vec<std::result::Result<Vec<u8>, String>>,
}

fn receive(rate: u32, modulation: Modulation, samples: &[i16], channel: RxChannel) -> Outcome {
    let mut decoder = Decoder::new(rate, modulation).unwrap();
    receive_with(&mut decoder, samples, channel)
}

fn receive_with(decoder: &mut Decoder, samples: &[i16], channel: RxChannel) -> Outcome {
    let width = channel.width();
    let chunk = (decoder.rate() as usize / 50) * width;
    let mut outcome = Outcome::default();
    for block in samples.chunks(chunk) {
        let block = &block[..block.len() - block.len() % width];
        if !decoder.feed(block, channel).unwrap() {
            continue;
        }
        let status = decoder.process().unwrap();
        if status != DecoderStatus::Okay {
            outcome.statuses.push(status);
        }
        match status {
            DecoderStatus::Sync | DecoderStatus::Ping | DecoderStatus::Nope => {
                outcome.staged = Some(decoder.staged());
            }
            DecoderStatus::Done => {
                let mut payload = [0u8; PAYLOAD_BYTES];
                let verdict = match decoder.fetch(&mut payload) {
                    Ok(len) => Ok(payload[..len].to_vec()),
                    Err(err) => Err(err.to_string()),
                };
                outcome.payloads.push(verdict);
            }
            _ => {}
        }
    }
    outcome
}

fn expect_payload(outcome: &Outcome) -> &[u8] {
    assert!(
        outcome.statuses.contains(&DecoderStatus::Sync),
        "no sync, statuses {:?}",
        outcome.statuses
    );
    assert!(
        outcome.statuses.contains(&DecoderStatus::Done),
        "no frame completion, statuses {:?}",
        outcome.statuses
    );
    outcome
        .payloads
        .last()
        .expect("payload outcome")
        .as_ref()
        .expect("payload decodes")
}

#[test]
fn qpsk_8000_short_payload() {
    let samples = render(
        8000,
        Modulation::Qpsk,
        b"TEST",
        "OWO",
        1500,
        1,
        false,
        TxChannel::Mono,
    );
    let outcome = receive(8000, Modulation::Qpsk, &samples, RxChannel::Mono);
    let staged = outcome.staged.as_ref().expect("staged info");
    assert_eq!(staged.mode, 16);
    assert_eq!(staged.call_sign, "      OWO");
    assert!(staged.cfo_hz.abs() < 1.0, "cfo {}", staged.cfo_hz);
    let payload = expect_payload(&outcome);
    assert_eq!(&payload[..4], b"TEST");
    assert!(payload[4..].iter().all(|&b| b == 0));
}

#[test]
fn qpsk_16000_full_payload() {
    let message = [0x5Au8; PAYLOAD_BYTES];
    let samples = render(
        16000,
        Modulation::Qpsk,
        &message,
        "N0CALL",
        1500,
        2,
        false,
        TxChannel::Mono,
    );
    let outcome = receive(16000, Modulation::Qpsk, &samples, RxChannel::Mono);
    assert_eq!(outcome.staged.as_ref().unwrap().mode, 14);
    assert_eq!(expect_payload(&outcome), &message);
}

#[test]
fn ping_48000_reports_call_sign() {
    let samples = render(
        48000,
        Modulation::Qpsk,
        b"",
        "AICODIX",
        2000,
        0,
        false,
        TxChannel::Mono,
    );
    let outcome = receive(48000, Modulation::Qpsk, &samples, RxChannel::Mono);
    assert!(outcome.statuses.contains(&DecoderStatus::Ping));
    assert!(!outcome.statuses.contains(&DecoderStatus::Done));
    let staged = outcome.staged.as_ref().unwrap();
    assert_eq!(staged.mode, 0);
    assert_eq!(staged.call_sign, "  AICODIX");
    assert!(outcome.payloads.is_empty());
}

#[test]
fn bpsk_uses_eight_symbols_and_decodes() {
    let samples = render(
        8000,
        Modulation::Bpsk,
        b"BINARY PHASE",
        "OWO",
        1500,
        1,
        false,
        TxChannel::Mono,
    );
    let outcome = receive(8000, Modulation::Bpsk, &samples, RxChannel::Mono);
    assert_eq!(&expect_payload(&outcome)[..12], b"BINARY PHASE");
}

#[test]
fn psk8_and_qam16_round_trip() {
    for modulation in [Modulation::Psk8, Modulation::Qam16] {
        let samples = render(
            8000,
            modulation,
            b"DENSE MAPPING",
            "OWO",
            1500,
            1,
            false,
            TxChannel::Mono,
        );
        let outcome = receive(8000, modulation, &samples, RxChannel::Mono);
        assert_eq!(
            &expect_payload(&outcome)[..13],
            b"DENSE MAPPING",
            "{:?}",
            modulation
        );
    }
}

#[test]
fn leading_silence_does_not_matter() {
    let rendered = render(
        8000,
        Modulation::Qpsk,
        b"TIMING",
        "OWO",
        1500,
        1,
        false,
        TxChannel::Mono,
    );
    for prefix in [1usize, 409, 777, 1439] {
        let mut samples = vec![0i16; prefix];
        samples.extend_from_slice(&rendered);
        let outcome = receive(8000, Modulation::Qpsk, &samples, RxChannel::Mono);
        let payload = expect_payload(&outcome);
        assert_eq!(&payload[..6], b"TIMING", "prefix {}", prefix);
    }
}

#[test]
fn fancy_header_does_not_break_decoding() {
    let samples = render(
        8000,
        Modulation::Qpsk,
        b"FANCY",
        "OWO",
        1500,
        1,
        true,
        TxChannel::Mono,
    );
    let outcome = receive(8000, Modulation::Qpsk, &samples, RxChannel::Mono);
    assert_eq!(&expect_payload(&outcome)[..5], b"FANCY");
}

#[test]
fn quadrature_channel_survives_frequency_offset() {
    let mut samples = render(
        8000,
        Modulation::Qpsk,
        b"OFFSET",
        "OWO",
        1500,
        1,
        false,
        TxChannel::Quadrature,
    );
    // complex frequency shift of 3 Hz, just under half a bin spacing
    let offset_hz = 3.0f64;
    let w = TAU * offset_hz / 8000.0;
    for (n, pair) in samples.chunks_exact_mut(2).enumerate() {
        let (sin, cos) = (w * n as f64).sin_cos();
        let re = pair[0] as f64;
        let im = pair[1] as f64;
        pair[0] = (re * cos - im * sin).round().clamp(-32768.0, 32767.0) as i16;
        pair[1] = (re * sin + im * cos).round().clamp(-32768.0, 32767.0) as i16;
    }
    let outcome = receive(8000, Modulation::Qpsk, &samples, RxChannel::Quadrature);
    let staged = outcome.staged.as_ref().expect("staged info");
    assert!(
        (staged.cfo_hz - offset_hz as f32).abs() < 1.0,
        "cfo {} vs {}",
        staged.cfo_hz,
        offset_hz
    );
    assert_eq!(&expect_payload(&outcome)[..6], b"OFFSET");
}

#[test]
fn stereo_left_channel_round_trip() {
    let samples = render(
        8000,
        Modulation::Qpsk,
        b"LEFT",
        "OWO",
        1500,
        1,
        false,
        TxChannel::Left,
    );
    let outcome = receive(8000, Modulation::Qpsk, &samples, RxChannel::Left);
    assert_eq!(&expect_payload(&outcome)[..4], b"LEFT");
}

#[test]
fn additive_noise_within_margin() {
    let mut samples = render(
        8000,
        Modulation::Qpsk,
        b"NOISY CHANNEL",
        "OWO",
        1500,
        2,
        false,
        TxChannel::Mono,
    );
    let mut rng = Xorshift32::new();
    let sigma = 0.02 * 32767.0;
    for sample in &mut samples {
        let u1 = (rng.next() as f64 + 1.0) / 4294967296.0;
        let u2 = rng.next() as f64 / 4294967296.0;
        let gauss = (-2.0 * u1.ln()).sqrt() * (TAU * u2).cos();
        let noisy = *sample as f64 + gauss * sigma as f64;
        *sample = noisy.round().clamp(-32768.0, 32767.0) as i16;
    }
    let outcome = receive(8000, Modulation::Qpsk, &samples, RxChannel::Mono);
    assert_eq!(&expect_payload(&outcome)[..13], b"NOISY CHANNEL");
}

#[test]
fn destroyed_payload_fails_crc_and_decoder_rearms() {
    let rate = 8000;
    let extended = 1440;
    let mut first = render(
        rate,
        Modulation::Qpsk,
        b"DOOMED",
        "OWO",
        1500,
        0,
        false,
        TxChannel::Mono,
    );
    // frame symbols: sync, preamble, then four payload symbols; wipe the
    // last two payload symbols
    for sample in &mut first[4 * extended..6 * extended] {
        *sample = 0;
    }
    let second = render(
        rate,
        Modulation::Qpsk,
        b"SURVIVOR",
        "OWO",
        1500,
        0,
        false,
        TxChannel::Mono,
    );
    let mut samples = first;
    samples.extend_from_slice(&second);
    let outcome = receive(rate, Modulation::Qpsk, &samples, RxChannel::Mono);
    assert!(outcome.payloads.len() >= 2, "payloads {:?}", outcome.payloads);
    assert!(outcome.payloads[0].is_err(), "corrupt frame passed the CRC");
    let recovered = outcome.payloads[1].as_ref().expect("second frame decodes");
    assert_eq!(&recovered[..8], b"SURVIVOR");
}

#[test]
fn decoder_output_is_deterministic() {
    let samples = render(
        8000,
        Modulation::Qpsk,
        b"SAME IN SAME OUT",
        "OWO",
        1500,
        1,
        false,
        TxChannel::Mono,
    );
    let a = receive(8000, Modulation::Qpsk, &samples, RxChannel::Mono);
    let b = receive(8000, Modulation::Qpsk, &samples, RxChannel::Mono);
    assert_eq!(expect_payload(&a), expect_payload(&b));
    assert_eq!(a.statuses, b.statuses);
}

#[test]
fn long_lived_decoder_handles_consecutive_frames() {
    let mut decoder = Decoder::new(8000, Modulation::Qpsk).unwrap();
    for (message, expected) in [
        (&b"FIRST"[..], &b"FIRST"[..]),
        (b"SECOND", b"SECOND"),
        (b"THIRD", b"THIRD"),
    ] {
        let samples = render(
            8000,
            Modulation::Qpsk,
            message,
            "OWO",
            1500,
            1,
            false,
            TxChannel::Mono,
        );
        let outcome = receive_with(&mut decoder, &samples, RxChannel::Mono);
        let payload = expect_payload(&outcome);
        assert_eq!(&payload[..expected.len()], expected);
    }
}
