//! Configuration
//!
//! Everything is sourced from environment variables — there is no on-disk
//! config file, unlike the teacher's TOML-backed `Config`. The struct shape
//! (serde derive, `#[serde(default)]`, per-field `default_*()` functions)
//! still follows the teacher's `config.rs` layout so the HTTP status surface
//! can serialize pieces of it directly.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub turn_taking: TurnTakingConfig,
    #[serde(default)]
    pub confidence: ConfidenceConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
}

impl Config {
    /// Load from environment, matching the teacher's `WhisperConfig::from_env`
    /// pattern (start from defaults, override per variable present).
    pub fn from_env() -> Self {
        Self {
            store: StoreConfig::from_env(),
            session: SessionConfig::from_env(),
            turn_taking: TurnTakingConfig::default(),
            confidence: ConfidenceConfig::default(),
            providers: ProvidersConfig::from_env(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            session: SessionConfig::default(),
            turn_taking: TurnTakingConfig::default(),
            confidence: ConfidenceConfig::default(),
            providers: ProvidersConfig::default(),
        }
    }
}

/// Redis connection settings. Absence of `REDIS_HOST` degrades the server to
/// the stateless in-memory store (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub redis_host: Option<String>,
    #[serde(default = "default_redis_port")]
    pub redis_port: u16,
    #[serde(default)]
    pub redis_db: i64,
}

fn default_redis_port() -> u16 {
    6379
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            redis_host: None,
            redis_port: default_redis_port(),
            redis_db: 0,
        }
    }
}

impl StoreConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(host) = std::env::var("REDIS_HOST") {
            if !host.is_empty() {
                config.redis_host = Some(host);
            }
        }

        if let Ok(port) = std::env::var("REDIS_PORT") {
            if let Ok(p) = port.parse() {
                config.redis_port = p;
            }
        }

        if let Ok(db) = std::env::var("REDIS_DB") {
            if let Ok(d) = db.parse() {
                config.redis_db = d;
            }
        }

        config
    }

    pub fn redis_url(&self) -> Option<String> {
        self.redis_host.as_ref().map(|host| {
            format!("redis://{}:{}/{}", host, self.redis_port, self.redis_db)
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
    #[serde(default = "default_max_duration")]
    pub max_duration_secs: u64,
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,
    #[serde(default = "default_max_clarifications")]
    pub max_clarifications: u32,
    #[serde(default = "default_max_silence_prompts")]
    pub max_silence_prompts: u32,
    #[serde(default = "default_max_nudges")]
    pub max_nudges: u32,
    #[serde(default = "default_history_len")]
    pub history_len: usize,
}

fn default_idle_timeout() -> u64 {
    30
}
fn default_max_duration() -> u64 {
    600
}
fn default_max_turns() -> u32 {
    20
}
fn default_max_clarifications() -> u32 {
    2
}
fn default_max_silence_prompts() -> u32 {
    2
}
fn default_max_nudges() -> u32 {
    3
}
fn default_history_len() -> usize {
    50
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: default_idle_timeout(),
            max_duration_secs: default_max_duration(),
            max_turns: default_max_turns(),
            max_clarifications: default_max_clarifications(),
            max_silence_prompts: default_max_silence_prompts(),
            max_nudges: default_max_nudges(),
            history_len: default_history_len(),
        }
    }
}

impl SessionConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(v) = std::env::var("IDLE_TIMEOUT") {
            if let Ok(n) = v.parse() {
                config.idle_timeout_secs = n;
            }
        }

        if let Ok(v) = std::env::var("MAX_SESSION_DURATION") {
            if let Ok(n) = v.parse() {
                config.max_duration_secs = n;
            }
        }

        config
    }
}

/// Turn-taking engine thresholds (spec §4.B), per-session configurable.
/// All timings are expressed in 200 ms chunks unless noted.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TurnTakingConfig {
    #[serde(default = "default_chunk_ms")]
    pub chunk_ms: u64,
    #[serde(default = "default_silence_grace_ms")]
    pub silence_grace_ms: u64,
    #[serde(default = "default_confirmation_ms")]
    pub confirmation_ms: u64,
    #[serde(default = "default_min_speech_ms")]
    pub min_speech_ms: u64,
    #[serde(default = "default_nudge_ms")]
    pub nudge_ms: u64,
    #[serde(default = "default_incomplete_wait_ms")]
    pub incomplete_wait_ms: u64,
    #[serde(default = "default_comfort_wait_ms")]
    pub comfort_wait_ms: u64,
}

fn default_chunk_ms() -> u64 {
    200
}
fn default_silence_grace_ms() -> u64 {
    1000
}
fn default_confirmation_ms() -> u64 {
    400
}
fn default_min_speech_ms() -> u64 {
    300
}
fn default_nudge_ms() -> u64 {
    1500
}
fn default_incomplete_wait_ms() -> u64 {
    300
}
fn default_comfort_wait_ms() -> u64 {
    1500
}

impl Default for TurnTakingConfig {
    fn default() -> Self {
        Self {
            chunk_ms: default_chunk_ms(),
            silence_grace_ms: default_silence_grace_ms(),
            confirmation_ms: default_confirmation_ms(),
            min_speech_ms: default_min_speech_ms(),
            nudge_ms: default_nudge_ms(),
            incomplete_wait_ms: default_incomplete_wait_ms(),
            comfort_wait_ms: default_comfort_wait_ms(),
        }
    }
}

impl TurnTakingConfig {
    fn chunks(&self, ms: u64) -> u32 {
        let ratio = ms as f64 / self.chunk_ms as f64;
        (ratio.round() as u32).max(1)
    }

    pub fn silence_grace_chunks(&self) -> u32 {
        self.chunks(self.silence_grace_ms)
    }

    pub fn confirmation_chunks(&self) -> u32 {
        self.chunks(self.confirmation_ms)
    }

    pub fn min_speech_chunks(&self) -> u32 {
        self.chunks(self.min_speech_ms)
    }

    pub fn nudge_chunks(&self) -> u32 {
        self.chunks(self.nudge_ms)
    }

    pub fn incomplete_wait_chunks(&self) -> u32 {
        self.chunks(self.incomplete_wait_ms)
    }

    pub fn comfort_wait_chunks(&self) -> u32 {
        self.chunks(self.comfort_wait_ms)
    }
}

/// Confidence router thresholds (spec §4.C). Defaults must be preserved.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ConfidenceConfig {
    #[serde(default = "default_high")]
    pub high: f32,
    #[serde(default = "default_low")]
    pub low: f32,
    #[serde(default = "default_repair")]
    pub repair: f32,
}

fn default_high() -> f32 {
    0.8
}
fn default_low() -> f32 {
    0.2
}
fn default_repair() -> f32 {
    0.3
}

impl Default for ConfidenceConfig {
    fn default() -> Self {
        Self {
            high: default_high(),
            low: default_low(),
            repair: default_repair(),
        }
    }
}

/// Credentials and endpoints for the ASR/LLM/TTS collaborators (spec §6:
/// "credentials for ASR/LLM/TTS providers"). The core treats these engines
/// as external (spec §1); this struct only carries enough to construct the
/// HTTP-backed adapters in `crate::providers`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default = "default_llm_base_url")]
    pub llm_base_url: String,
    pub llm_api_key: Option<String>,
    #[serde(default = "default_llm_model")]
    pub llm_model: String,

    pub asr_base_url: Option<String>,
    pub asr_api_key: Option<String>,

    pub tts_base_url: Option<String>,
    pub tts_api_key: Option<String>,
}

fn default_llm_base_url() -> String {
    "https://openrouter.ai/api/v1".to_string()
}

fn default_llm_model() -> String {
    "anthropic/claude-3.5-sonnet".to_string()
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            llm_base_url: default_llm_base_url(),
            llm_api_key: None,
            llm_model: default_llm_model(),
            asr_base_url: None,
            asr_api_key: None,
            tts_base_url: None,
            tts_api_key: None,
        }
    }
}

impl ProvidersConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(v) = std::env::var("LLM_BASE_URL") {
            if !v.is_empty() {
                config.llm_base_url = v;
            }
        }
        if let Ok(v) = std::env::var("LLM_API_KEY") {
            if !v.is_empty() {
                config.llm_api_key = Some(v);
            }
        }
        if let Ok(v) = std::env::var("LLM_MODEL") {
            if !v.is_empty() {
                config.llm_model = v;
            }
        }
        if let Ok(v) = std::env::var("ASR_BASE_URL") {
            if !v.is_empty() {
                config.asr_base_url = Some(v);
            }
        }
        if let Ok(v) = std::env::var("ASR_API_KEY") {
            if !v.is_empty() {
                config.asr_api_key = Some(v);
            }
        }
        if let Ok(v) = std::env::var("TTS_BASE_URL") {
            if !v.is_empty() {
                config.tts_base_url = Some(v);
            }
        }
        if let Ok(v) = std::env::var("TTS_API_KEY") {
            if !v.is_empty() {
                config.tts_api_key = Some(v);
            }
        }

        config
    }
}
