//! Voice dialog core — real-time IVR turn-taking and conversation
//! orchestration.
//!
//! Wires together a frame-level voice-activity detector, a turn-taking state
//! machine, a confidence router, and a conversation state machine behind a
//! session orchestrator that drives one connection end to end. ASR, LLM, and
//! TTS are external collaborators, reached through the trait interfaces in
//! `engines` and the default HTTP-backed adapters in `providers`.
//!
//! # Example
//!
//! ```ignore
//! use voicedialog_core::config::Config;
//! use voicedialog_core::store::InMemoryStore;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env();
//!     let store = Arc::new(InMemoryStore::new());
//!     // ASR/LLM/TTS engines constructed from config.providers, see cli::run.
//!     Ok(())
//! }
//! ```

pub mod audio;
pub mod cli;
pub mod config;
pub mod conversation;
pub mod engines;
pub mod error;
pub mod orchestrator;
pub mod providers;
pub mod server;
pub mod store;
pub mod types;
pub mod voice;

pub use config::Config;
pub use error::SessionError;
pub use orchestrator::Orchestrator;
pub use server::{start as start_server, ServerState};
pub use store::Store;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
