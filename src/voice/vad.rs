//! Frame VAD
//!
//! Given a 20 ms PCM frame, returns a speech probability in the coarse set
//! `{0.0, 0.3, 0.5, 1.0}`. The quantization is intentional: downstream logic
//! only cares about three bands (`>= 0.6` speech, `< 0.05` silence,
//! otherwise uncertain). Pure and thread-safe — no internal mutable state,
//! unlike the teacher's `Vad` (which owns an `Arc<Mutex<>>` adaptive noise
//! floor); this VAD has nothing to adapt, so a plain struct holding trait
//! objects is enough.

use tracing::trace;

/// 20 ms of 16-bit mono PCM at 16 kHz.
pub const FRAME_BYTES: usize = 640;
pub const SAMPLE_RATE: u32 = 16_000;

/// A pluggable speech-probability classifier over one frame.
///
/// `classify` returns `None` when the model cannot produce a usable
/// probability for this frame (e.g. a library VAD rejected every sub-frame);
/// `FrameVad` then falls back to the energy-based model, matching the
/// three-tier fallback chain described for the original turn-taking engine.
pub trait SpeechProbabilityModel: Send + Sync {
    fn classify(&self, frame: &[u8]) -> Option<f32>;
}

/// Library-VAD-style path: splits the frame into small sub-frames, classifies
/// each by amplitude, and maps the speech/total ratio to the coarse buckets
/// via thresholds `{0.5, 0.25, 0.0}`.
#[derive(Debug, Clone, Copy)]
pub struct SubframeRatioVad {
    /// Sub-frame size in samples (not bytes). 160 samples = 10 ms at 16 kHz.
    subframe_samples: usize,
    /// Per-sample amplitude (0..32768) above which a sub-frame counts as speech.
    subframe_threshold: i32,
}

impl Default for SubframeRatioVad {
    fn default() -> Self {
        Self {
            subframe_samples: 160,
            subframe_threshold: 500,
        }
    }
}

impl SpeechProbabilityModel for SubframeRatioVad {
    fn classify(&self, frame: &[u8]) -> Option<f32> {
        let samples = to_i16_samples(frame);
        if samples.is_empty() {
            return None;
        }

        let mut speech_subframes = 0u32;
        let mut total_subframes = 0u32;

        for chunk in samples.chunks(self.subframe_samples) {
            if chunk.is_empty() {
                continue;
            }
            let mean_abs: i64 =
                chunk.iter().map(|s| (*s as i64).abs()).sum::<i64>() / chunk.len() as i64;
            total_subframes += 1;
            if mean_abs > self.subframe_threshold as i64 {
                speech_subframes += 1;
            }
        }

        if total_subframes == 0 {
            return None;
        }

        let ratio = speech_subframes as f32 / total_subframes as f32;
        Some(bucket_from_ratio(ratio))
    }
}

fn bucket_from_ratio(ratio: f32) -> f32 {
    if ratio >= 0.5 {
        1.0
    } else if ratio >= 0.25 {
        0.5
    } else if ratio > 0.0 {
        0.3
    } else {
        0.0
    }
}

/// Energy-based fallback: mean-absolute-sample / 32768, mapped by
/// thresholds `{0.03, 0.015, 0.005}`.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnergyVad;

impl SpeechProbabilityModel for EnergyVad {
    fn classify(&self, frame: &[u8]) -> Option<f32> {
        Some(energy_probability(frame))
    }
}

fn energy_probability(frame: &[u8]) -> f32 {
    let samples = to_i16_samples(frame);
    if samples.is_empty() {
        return 0.0;
    }

    let mean_abs: f64 =
        samples.iter().map(|s| (*s as f64).abs()).sum::<f64>() / samples.len() as f64 / 32768.0;

    if mean_abs > 0.03 {
        1.0
    } else if mean_abs > 0.015 {
        0.5
    } else if mean_abs > 0.005 {
        0.3
    } else {
        0.0
    }
}

fn to_i16_samples(frame: &[u8]) -> Vec<i16> {
    frame
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]))
        .collect()
}

/// Bands the orchestrator and turn-taking engine key off of.
pub fn is_speech(probability: f32) -> bool {
    probability >= 0.6
}

pub fn is_silence(probability: f32) -> bool {
    probability < 0.05
}

/// `probability(frame) -> float in {0.0, 0.3, 0.5, 1.0}`.
pub struct FrameVad {
    primary: Box<dyn SpeechProbabilityModel>,
    fallback: EnergyVad,
}

impl FrameVad {
    pub fn new(primary: Box<dyn SpeechProbabilityModel>) -> Self {
        Self {
            primary,
            fallback: EnergyVad,
        }
    }

    pub fn probability(&self, frame: &[u8]) -> f32 {
        if frame.is_empty() {
            return 0.0;
        }

        // Malformed (odd byte count) or undersized frames always take the
        // energy-based fallback path.
        if frame.len() % 2 != 0 || frame.len() < FRAME_BYTES {
            let p = self.fallback.classify(frame).unwrap_or(0.0);
            trace!(bytes = frame.len(), probability = p, "vad: energy fallback (undersized/malformed)");
            return p;
        }

        match self.primary.classify(frame) {
            Some(p) => p,
            None => {
                trace!("vad: primary model produced no usable sub-frames, falling back to energy");
                self.fallback.classify(frame).unwrap_or(0.0)
            }
        }
    }
}

impl Default for FrameVad {
    fn default() -> Self {
        Self::new(Box::new(SubframeRatioVad::default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn silent_frame(len: usize) -> Vec<u8> {
        vec![0u8; len]
    }

    fn loud_frame(len_bytes: usize) -> Vec<u8> {
        let mut v = Vec::with_capacity(len_bytes);
        for _ in 0..(len_bytes / 2) {
            v.extend_from_slice(&20000i16.to_le_bytes());
        }
        v
    }

    #[test]
    fn empty_frame_is_zero() {
        let vad = FrameVad::default();
        assert_eq!(vad.probability(&[]), 0.0);
    }

    #[test]
    fn silence_is_zero() {
        let vad = FrameVad::default();
        assert_eq!(vad.probability(&silent_frame(FRAME_BYTES)), 0.0);
    }

    #[test]
    fn loud_full_frame_is_speech() {
        let vad = FrameVad::default();
        let p = vad.probability(&loud_frame(FRAME_BYTES));
        assert!(is_speech(p), "expected speech-band probability, got {}", p);
    }

    #[test]
    fn undersized_frame_uses_energy_fallback() {
        let vad = FrameVad::default();
        // 100 bytes < FRAME_BYTES, still must return a bucketed value.
        let p = vad.probability(&loud_frame(100));
        assert!(is_speech(p));
    }

    #[test]
    fn malformed_odd_length_frame_falls_back() {
        let vad = FrameVad::default();
        let mut frame = loud_frame(FRAME_BYTES);
        frame.push(1); // odd length now
        let p = vad.probability(&frame);
        assert!(is_speech(p));
    }

    #[test]
    fn probability_is_always_bucketed() {
        let vad = FrameVad::default();
        for len in [0, 2, 100, FRAME_BYTES, FRAME_BYTES * 3] {
            let p = vad.probability(&loud_frame(len));
            assert!([0.0, 0.3, 0.5, 1.0].contains(&p), "got {}", p);
        }
    }

    #[test]
    fn energy_vad_never_returns_none() {
        let e = EnergyVad;
        assert!(e.classify(&silent_frame(10)).is_some());
    }
}
