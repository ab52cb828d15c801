//! Audio Test Fixtures
//!
//! 16kHz mono 16-bit PCM, the only format the provider accepts.

use std::f32::consts::PI;
use std::io::Cursor;

/// Standard sample rate (16kHz)
pub const SAMPLE_RATE: u32 = 16000;

/// PCM bytes per second at 16kHz/16-bit mono
pub const BYTES_PER_SECOND: usize = 32000;

pub fn samples_to_bytes(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

/// Silence of the given duration as raw PCM bytes
pub fn silence_bytes(seconds: f64) -> Vec<u8> {
    vec![0u8; pcm_len(seconds)]
}

/// Sine tone as raw PCM bytes
pub fn sine_bytes(frequency: f32, seconds: f64, amplitude: f32) -> Vec<u8> {
    let samples = pcm_len(seconds) / 2;
    let peak = amplitude.clamp(0.0, 1.0) * i16::MAX as f32;
    let tone: Vec<i16> = (0..samples)
        .map(|i| {
            let t = i as f32 / SAMPLE_RATE as f32;
            ((2.0 * PI * frequency * t).sin() * peak) as i16
        })
        .collect();
    samples_to_bytes(&tone)
}

/// Byte length of `seconds` of PCM, always a whole number of samples
pub fn pcm_len(seconds: f64) -> usize {
    ((seconds * BYTES_PER_SECOND as f64) as usize) & !1
}

/// Wrap raw PCM in a canonical 44-byte WAV header
pub fn wav_bytes(pcm: &[u8]) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for sample in pcm.chunks_exact(2) {
            writer
                .write_sample(i16::from_le_bytes([sample[0], sample[1]]))
                .unwrap();
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}
