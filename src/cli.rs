//! CLI entrypoint
//!
//! Spec.md names exactly one external interface besides the ASR/LLM/TTS
//! collaborators and the HTTP/WS surface itself: the process that serves it.
//! Kept in the teacher's `clap::Parser` derive idiom, trimmed from the
//! teacher's many subcommands (chat history, memory, skills, soul, gateway...)
//! down to the one this crate actually implements.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use reqwest::Client;
use tracing::{info, warn};

use crate::config::Config;
use crate::engines::{AsrEngine, LlmEngine, TtsEngine};
use crate::providers::{require_configured, HttpAsrEngine, HttpLlmEngine, HttpTtsEngine};
use crate::store::{InMemoryStore, RedisStore, Store};

/// The clinic persona used when no `--system-prompt-file` is given (spec §6
/// "the static clinic-domain prompt content" is external; this is the
/// built-in default matching the scripted greeting's persona).
const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a friendly receptionist for SmileCare Dental Clinic. Keep replies short, \
     warm, and focused on scheduling, rescheduling, or answering basic questions about \
     appointments. If you don't know something, offer to connect the caller to staff.";

#[derive(Parser)]
#[command(name = "voicedialog-server")]
#[command(about = "Real-time voice-dialog IVR core", long_about = None)]
#[command(version)]
struct Cli {
    /// Host to bind the HTTP/WebSocket server to.
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    host: String,

    /// Port to bind the HTTP/WebSocket server to.
    #[arg(long, env = "PORT", default_value_t = 8080)]
    port: u16,

    /// Path to a file containing the system prompt (clinic persona text).
    /// Falls back to a built-in default when omitted.
    #[arg(long, env = "SYSTEM_PROMPT_FILE")]
    system_prompt_file: Option<PathBuf>,
}

/// Parses arguments, builds the collaborators from `Config::from_env()`, and
/// serves until the process is killed.
pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env();

    let system_prompt = load_system_prompt(cli.system_prompt_file.as_deref())?;

    let store = build_store(&config)?;
    let http_client = Client::new();

    let llm: Arc<dyn LlmEngine> = Arc::new(HttpLlmEngine::new(http_client.clone(), &config.providers));
    let asr: Arc<dyn AsrEngine> = Arc::new(require_configured(
        HttpAsrEngine::new(http_client.clone(), &config.providers),
        "ASR provider (ASR_BASE_URL)",
    )?);
    let tts: Arc<dyn TtsEngine> = Arc::new(require_configured(
        HttpTtsEngine::new(http_client, &config.providers),
        "TTS provider (TTS_BASE_URL)",
    )?);

    info!(host = %cli.host, port = cli.port, "starting voice dialog server");
    crate::server::start(&cli.host, cli.port, config, store, asr, llm, tts, system_prompt).await
}

/// Redis-backed store when `REDIS_HOST` is set, in-memory fallback otherwise
/// (spec §6: "Absence of the store degrades the server to a stateless mode").
fn build_store(config: &Config) -> Result<Arc<dyn Store>> {
    match config.store.redis_url() {
        Some(url) => {
            let store = RedisStore::connect(&url).context("failed to connect to Redis")?;
            Ok(Arc::new(store))
        }
        None => {
            warn!("REDIS_HOST not set, falling back to the in-memory session store");
            Ok(Arc::new(InMemoryStore::new()))
        }
    }
}

/// Reads the clinic persona from `path`, or falls back to the built-in
/// default when no override file was given.
fn load_system_prompt(path: Option<&std::path::Path>) -> Result<String> {
    match path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read system prompt file {}", path.display())),
        None => Ok(DEFAULT_SYSTEM_PROMPT.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_override_file_falls_back_to_default_persona() {
        let prompt = load_system_prompt(None).unwrap();
        assert_eq!(prompt, DEFAULT_SYSTEM_PROMPT);
    }

    #[test]
    fn override_file_contents_win_over_default() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        use std::io::Write;
        write!(file, "You are a terse scheduling bot. No small talk.").unwrap();

        let prompt = load_system_prompt(Some(file.path())).unwrap();
        assert_eq!(prompt, "You are a terse scheduling bot. No small talk.");
    }

    #[test]
    fn missing_override_file_is_an_error() {
        let err = load_system_prompt(Some(std::path::Path::new("/no/such/system-prompt.txt"))).unwrap_err();
        assert!(err.to_string().contains("failed to read system prompt file"));
    }
}
