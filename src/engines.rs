//! External collaborator interfaces
//!
//! ASR, LLM and TTS are explicitly out of scope (spec §1): the core only
//! needs `transcribe`, `reply` and `synthesize`/`duration` as async trait
//! objects, generalized from the teacher's concrete `LocalStt`
//! (`voice/stt_local.rs`) into interfaces the orchestrator depends on rather
//! than a specific engine (spec §9, "global singletons become explicit
//! dependencies passed to the orchestrator at construction").

use anyhow::Result;
use async_trait::async_trait;

use crate::types::AsrResult;

/// Speech-to-text. `audio` is a WAV-framed byte span (see `crate::audio`).
/// `use_vad_filter` is forwarded as `false` by the orchestrator once the
/// turn boundary is already known (spec §4.E step 5) and `true` for the
/// legacy batching path, matching `asr_service.py::transcribe_with_confidence`.
#[async_trait]
pub trait AsrEngine: Send + Sync {
    async fn transcribe(
        &self,
        audio: &[u8],
        language: Option<&str>,
        use_vad_filter: bool,
    ) -> Result<AsrResult>;
}

/// One LLM turn: system prompt + prior history + current user text -> reply.
#[async_trait]
pub trait LlmEngine: Send + Sync {
    async fn reply(
        &self,
        system_prompt: &str,
        history: &[crate::types::Message],
        user_text: &str,
    ) -> Result<String>;

    /// Single-word classification prompt used by the input-quality check
    /// (spec §4.D) and the linguistic-completeness LLM pass. Returns the
    /// model's raw (trimmed) reply; callers interpret it.
    async fn classify(&self, prompt: &str) -> Result<String>;
}

/// Text-to-speech. `synthesize` returns encoded audio bytes (MP3 per the
/// WS/REST wire contract, spec §6); `duration` reports playback length so
/// the orchestrator can set `bot_speaking_until`.
#[async_trait]
pub trait TtsEngine: Send + Sync {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>>;

    fn duration(&self, audio: &[u8]) -> f64;
}
