//! Audio buffer helpers.
//!
//! The provider takes raw PCM (16 kHz, mono, 16-bit little-endian). Clients
//! may upload either raw PCM or a canonical WAV file; the 44-byte RIFF header
//! is split off before streaming and re-attached to chunk buffers so every
//! sub-request sees the same kind of input as the original upload.

use std::io::Cursor;
use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, warn};

use super::config::{PCM_BYTES_PER_SECOND, SAMPLE_RATE};

/// Size of a canonical RIFF/WAVE header.
pub const WAV_HEADER_LEN: usize = 44;

/// An upload split into its optional header and PCM payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitAudio {
    pub header: Option<Bytes>,
    pub pcm: Bytes,
}

/// True when the buffer starts with a RIFF/WAVE signature.
pub fn is_wav(audio: &[u8]) -> bool {
    audio.len() >= 12 && &audio[0..4] == b"RIFF" && &audio[8..12] == b"WAVE"
}

/// Separate a WAV header from the PCM that follows it.
///
/// Non-WAV input is returned unchanged as PCM.
pub fn split_wav(audio: Bytes) -> SplitAudio {
    if !is_wav(&audio) {
        return SplitAudio {
            header: None,
            pcm: audio,
        };
    }

    let header_len = WAV_HEADER_LEN.min(audio.len());
    SplitAudio {
        header: Some(audio.slice(..header_len)),
        pcm: audio.slice(header_len..),
    }
}

/// PCM payload of an upload, warning when the header describes a format the
/// provider will not understand.
pub fn strip_wav_header(audio: Bytes) -> Bytes {
    let split = split_wav(audio);
    if let Some(header) = &split.header {
        check_wav_format(header);
    }
    split.pcm
}

/// Read the format block of a WAV header.
pub fn inspect_wav(header: &[u8]) -> Option<hound::WavSpec> {
    match hound::WavReader::new(Cursor::new(header)) {
        Ok(reader) => Some(reader.spec()),
        Err(e) => {
            debug!("Could not read WAV header: {}", e);
            None
        }
    }
}

/// Whether the spec matches what the provider expects.
pub fn is_supported_spec(spec: &hound::WavSpec) -> bool {
    spec.sample_rate == SAMPLE_RATE
        && spec.channels == 1
        && spec.bits_per_sample == 16
        && spec.sample_format == hound::SampleFormat::Int
}

fn check_wav_format(header: &[u8]) {
    if let Some(spec) = inspect_wav(header)
        && !is_supported_spec(&spec)
    {
        warn!(
            "WAV header describes {} Hz, {} channel(s), {}-bit audio; the provider expects 16000 Hz mono 16-bit PCM",
            spec.sample_rate, spec.channels, spec.bits_per_sample
        );
    }
}

/// Playback length of a PCM buffer.
pub fn pcm_duration(pcm_bytes: usize) -> Duration {
    Duration::from_secs_f64(pcm_bytes as f64 / PCM_BYTES_PER_SECOND as f64)
}

/// Prefix PCM with a header, if there is one.
pub fn with_header(header: Option<&Bytes>, pcm: &[u8]) -> Bytes {
    match header {
        Some(header) => {
            let mut buffer = Vec::with_capacity(header.len() + pcm.len());
            buffer.extend_from_slice(header);
            buffer.extend_from_slice(pcm);
            Bytes::from(buffer)
        }
        None => Bytes::copy_from_slice(pcm),
    }
}
