//! Session/conversation key-value store
//!
//! Two implementations behind one trait: a Redis-backed store whose key
//! layout matches `original_source/session_manager.py` and
//! `conversation_engine.py` byte-for-byte (spec §6, §11), and an in-memory
//! fallback used when `REDIS_HOST` is unset — mirroring the teacher's
//! graceful degradation pattern (`VoiceMode::TextOnly` when Ollama is
//! unreachable in `server/mod.rs::check_ollama`).

mod memory;
mod redis_store;

pub use memory::InMemoryStore;
pub use redis_store::RedisStore;

use anyhow::Result;
use async_trait::async_trait;

use crate::types::{Conversation, Message, Session};

/// Session and conversation persistence, keyed by session id (spec §6).
/// Writes are disjoint across sessions (§5); no cross-session locking here.
#[async_trait]
pub trait Store: Send + Sync {
    /// Whether the backing service answered a liveness probe. `/voice` and
    /// `/session/*` return 503 and streaming refuses new connections when
    /// this is false (spec §7d) — only meaningful for `RedisStore`;
    /// `InMemoryStore` is always available.
    async fn is_available(&self) -> bool;

    async fn create_session(
        &self,
        idle_timeout_secs: u64,
        max_duration_secs: u64,
        user_id: Option<String>,
    ) -> Result<Session>;

    async fn get_session(&self, session_id: &str) -> Result<Option<Session>>;

    async fn save_session(&self, session: &Session) -> Result<()>;

    /// Transitions to CLOSED and retains the row for the 24h observation
    /// window (spec §3, §6).
    async fn close_session(&self, session_id: &str) -> Result<()>;

    /// `sessions:active` — ids eligible for background housekeeping (§4.E
    /// step "Background housekeeping").
    async fn active_session_ids(&self) -> Result<Vec<String>>;

    async fn get_conversation(&self, session_id: &str) -> Result<Option<Conversation>>;

    async fn save_conversation(&self, session_id: &str, conversation: &Conversation) -> Result<()>;

    /// Newest-prepended, trimmed to 50 entries (spec §3, §6).
    async fn append_history(&self, session_id: &str, message: Message) -> Result<()>;

    /// Oldest-first, most recent `limit` entries.
    async fn get_history(&self, session_id: &str, limit: usize) -> Result<Vec<Message>>;
}

/// Max history entries retained per session (spec §3).
pub const MAX_HISTORY: usize = 50;
