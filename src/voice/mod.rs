//! Voice pipeline
//!
//! Frame-level voice activity detection, turn-taking, and ASR confidence
//! routing (spec §4.A-C). The ASR/TTS engines themselves are external
//! collaborators (see `crate::engines`), not part of this module.

pub mod confidence;
pub mod turn_taking;
pub mod vad;
