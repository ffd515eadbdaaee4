//! HTTP-backed ASR/LLM/TTS adapters
//!
//! ASR, LLM and TTS are external collaborators (spec §1), specified only by
//! interface. These adapters are the composition root's default choice of
//! concrete engine: plain `reqwest` calls, grounded on the teacher's
//! `agent/llm.rs::OpenRouterClient` (same base URL, same chat-completions
//! wire shape) generalized behind the `LlmEngine` trait, plus small
//! REST-shaped clients for ASR/TTS providers configured via
//! `crate::config::ProvidersConfig`.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::ProvidersConfig;
use crate::engines::{AsrEngine, LlmEngine, TtsEngine};
use crate::types::{AsrResult, Message};

/// Chat-completions LLM client (OpenRouter-compatible wire format), used for
/// both `reply` (spec §4.E "LLM prompt assembly") and `classify` (spec §4.D
/// input-quality / linguistic-completeness single-word prompts).
pub struct HttpLlmEngine {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl HttpLlmEngine {
    pub fn new(client: Client, config: &ProvidersConfig) -> Self {
        Self {
            client,
            base_url: config.llm_base_url.clone(),
            api_key: config.llm_api_key.clone(),
            model: config.llm_model.clone(),
        }
    }

    async fn complete(&self, messages: Vec<ChatMessage>, max_tokens: u32, temperature: f32) -> Result<String> {
        let mut request = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&ChatRequest {
                model: self.model.clone(),
                messages,
                max_tokens,
                temperature,
            });

        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .context("LLM request failed")?
            .error_for_status()
            .context("LLM returned an error status")?;

        let body: ChatResponse = response.json().await.context("failed to parse LLM response")?;
        let content = body
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default();
        Ok(content.trim().to_string())
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[async_trait]
impl LlmEngine for HttpLlmEngine {
    /// Spec §4.E: system prompt + up to `2*max_turns` history messages +
    /// current user text, temperature ~0.4, max tokens ~150.
    async fn reply(&self, system_prompt: &str, history: &[Message], user_text: &str) -> Result<String> {
        let mut messages = vec![ChatMessage {
            role: "system".to_string(),
            content: system_prompt.to_string(),
        }];
        messages.extend(history.iter().map(|m| ChatMessage {
            role: m.role.to_openai_string().to_string(),
            content: m.content.clone(),
        }));
        messages.push(ChatMessage {
            role: "user".to_string(),
            content: user_text.to_string(),
        });

        self.complete(messages, 150, 0.4).await
    }

    async fn classify(&self, prompt: &str) -> Result<String> {
        let messages = vec![ChatMessage {
            role: "user".to_string(),
            content: prompt.to_string(),
        }];
        self.complete(messages, 8, 0.0).await
    }
}

/// REST-shaped ASR client: POSTs a WAV span as multipart, reads back
/// `{text, confidence, language}`. The concrete vendor wire format is an
/// external detail (spec §1); this is the shape the orchestrator's
/// `audio::turn_span_to_wav` output and `AsrEngine::transcribe` signature
/// assume.
pub struct HttpAsrEngine {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpAsrEngine {
    pub fn new(client: Client, config: &ProvidersConfig) -> Option<Self> {
        config.asr_base_url.as_ref().map(|base_url| Self {
            client,
            base_url: base_url.clone(),
            api_key: config.asr_api_key.clone(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct AsrResponse {
    text: String,
    confidence: f32,
    #[serde(default)]
    language: String,
}

#[async_trait]
impl AsrEngine for HttpAsrEngine {
    async fn transcribe(&self, audio: &[u8], language: Option<&str>, use_vad_filter: bool) -> Result<AsrResult> {
        let part = reqwest::multipart::Part::bytes(audio.to_vec())
            .file_name("turn.wav")
            .mime_str("audio/wav")
            .context("failed to build ASR multipart body")?;
        let mut form = reqwest::multipart::Form::new().part("audio", part);
        if let Some(lang) = language {
            form = form.text("language", lang.to_string());
        }
        form = form.text("vad_filter", use_vad_filter.to_string());

        let mut request = self.client.post(format!("{}/transcribe", self.base_url)).multipart(form);
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .context("ASR request failed")?
            .error_for_status()
            .context("ASR returned an error status")?;

        let body: AsrResponse = response.json().await.context("failed to parse ASR response")?;
        Ok(AsrResult {
            text: body.text,
            confidence: body.confidence,
            language: body.language,
        })
    }
}

/// REST-shaped TTS client: POSTs text, gets back encoded audio bytes
/// (spec §6: MP3 over the wire). `duration` is estimated from a
/// configurable bitrate since the vendor response carries bytes, not
/// seconds — good enough for `bot_speaking_until` scheduling (spec §4.E).
pub struct HttpTtsEngine {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpTtsEngine {
    pub fn new(client: Client, config: &ProvidersConfig) -> Option<Self> {
        config.tts_base_url.as_ref().map(|base_url| Self {
            client,
            base_url: base_url.clone(),
            api_key: config.tts_api_key.clone(),
        })
    }
}

/// Assumed MP3 bitrate (bytes/sec) used to estimate playback duration from
/// the synthesized payload size.
const ASSUMED_MP3_BYTES_PER_SEC: f64 = 16_000.0;

#[async_trait]
impl TtsEngine for HttpTtsEngine {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        if text.is_empty() {
            return Ok(Vec::new());
        }

        let mut request = self
            .client
            .post(format!("{}/synthesize", self.base_url))
            .json(&json!({ "text": text }));
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .context("TTS request failed")?
            .error_for_status()
            .context("TTS returned an error status")?;

        let bytes = response.bytes().await.context("failed to read TTS audio body")?;
        Ok(bytes.to_vec())
    }

    fn duration(&self, audio: &[u8]) -> f64 {
        if audio.is_empty() {
            0.0
        } else {
            audio.len() as f64 / ASSUMED_MP3_BYTES_PER_SEC
        }
    }
}

/// Base64-encode synthesized audio for the WS/REST wire contract (spec §6:
/// `audio: base64 MP3`).
pub fn encode_audio_base64(audio: &[u8]) -> String {
    BASE64.encode(audio)
}

/// Decode a client-supplied base64 audio payload, used by the legacy
/// container-audio path and the `/voice` REST endpoint.
pub fn decode_audio_base64(encoded: &str) -> Result<Vec<u8>> {
    BASE64.decode(encoded).map_err(Into::into)
}

/// Fails fast with a clear error when neither an ASR provider nor a TTS
/// provider is configured — rather than silently degrading, since a voice
/// core with no ASR/TTS cannot hold a conversation at all.
pub fn require_configured<T>(engine: Option<T>, what: &str) -> Result<T> {
    match engine {
        Some(e) => Ok(e),
        None => bail!("{what} is not configured (missing base URL env var)"),
    }
}
