//! WAV framing for ASR handoff
//!
//! The turn-taking engine hands the orchestrator a raw 16-bit 16 kHz mono PCM
//! byte span on TURN_END. The ASR trait (`crate::engines::AsrEngine`) expects
//! a self-describing container, so every span is wrapped in a WAV header
//! before the call — grounded on the teacher's `voice/stt_local.rs::pcm_to_wav`.

use anyhow::{Context, Result};

use crate::voice::vad::SAMPLE_RATE;

/// Wrap a raw 16-bit mono PCM byte span (little-endian) as an in-memory WAV
/// file. `bytes.len()` need not be a multiple of the frame size; a trailing
/// odd byte is dropped (it cannot form a full sample).
pub fn pcm_bytes_to_wav(bytes: &[u8], sample_rate: u32) -> Result<Vec<u8>> {
    let mut cursor = std::io::Cursor::new(Vec::new());

    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer =
        hound::WavWriter::new(&mut cursor, spec).context("failed to create WAV writer")?;

    for chunk in bytes.chunks_exact(2) {
        let sample = i16::from_le_bytes([chunk[0], chunk[1]]);
        writer.write_sample(sample)?;
    }

    writer.finalize()?;
    Ok(cursor.into_inner())
}

/// Convenience wrapper at the turn engine's native sample rate (16 kHz).
pub fn turn_span_to_wav(pcm: &[u8]) -> Result<Vec<u8>> {
    pcm_bytes_to_wav(pcm, SAMPLE_RATE)
}

/// Minimum buffer size (bytes) the orchestrator accepts as a real turn
/// rather than noise: 100 ms at 16 kHz 16-bit mono = 3200 bytes (spec §4.E).
pub const MIN_TURN_BYTES: usize = 3_200;

/// Legacy container-encoded audio is detected by the EBML/Matroska magic
/// prefix (spec §8 boundary case, §9 "legacy container-audio batching
/// path"). Frames carrying this prefix bypass the turn engine entirely.
pub const LEGACY_CONTAINER_MAGIC: [u8; 4] = [0x1A, 0x45, 0xDF, 0xA3];

pub fn is_legacy_container(data: &[u8]) -> bool {
    data.len() >= 4 && data[..4] == LEGACY_CONTAINER_MAGIC
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_pcm_as_valid_wav() {
        let pcm = vec![0u8; 3200];
        let wav = turn_span_to_wav(&pcm).unwrap();
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(wav.len(), 44 + pcm.len());
    }

    #[test]
    fn odd_trailing_byte_is_dropped() {
        let mut pcm = vec![0u8; 3200];
        pcm.push(7);
        let wav = turn_span_to_wav(&pcm).unwrap();
        assert_eq!(wav.len(), 44 + 3200);
    }

    #[test]
    fn legacy_magic_detected() {
        let mut data = LEGACY_CONTAINER_MAGIC.to_vec();
        data.extend_from_slice(&[1, 2, 3]);
        assert!(is_legacy_container(&data));
        assert!(!is_legacy_container(&[0, 0, 0, 0]));
        assert!(!is_legacy_container(&[0x1A, 0x45]));
    }
}
