//! Redis-backed store
//!
//! Key layout matches `original_source/session_manager.py` and
//! `conversation_engine.py` byte-for-byte (spec §6, §11): `session:{id}` and
//! `conversation:{id}` hashes, `sessions:active` set, `session:{id}:history`
//! list (`lpush` + `ltrim`, newest first). Enriched from
//! `examples/other_examples/manifests/lightseekorg-smg/Cargo.toml` — no
//! teacher-candidate repo depends on Redis, so the crate choice
//! (`redis` + `deadpool-redis`) comes from the wider pack per the
//! enrichment rule in DESIGN.md.

use std::collections::HashMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_redis::{Config, Pool, Runtime};
use redis::AsyncCommands;
use tracing::warn;
use uuid::Uuid;

use super::Store;
use crate::types::{Conversation, ConversationState, Message, Session, SessionState};

pub struct RedisStore {
    pool: Pool,
}

impl RedisStore {
    pub fn connect(redis_url: &str) -> Result<Self> {
        let cfg = Config::from_url(redis_url);
        let pool = cfg
            .create_pool(Some(Runtime::Tokio1))
            .context("failed to build redis connection pool")?;
        Ok(Self { pool })
    }

    fn session_key(id: &str) -> String {
        format!("session:{}", id)
    }

    fn history_key(id: &str) -> String {
        format!("session:{}:history", id)
    }

    fn conversation_key(id: &str) -> String {
        format!("conversation:{}", id)
    }

    async fn write_session(&self, session: &Session, ttl_secs: u64) -> Result<()> {
        let mut conn = self.pool.get().await.context("redis pool exhausted")?;
        let key = Self::session_key(&session.session_id);
        let metadata = serde_json::to_string(&session.metadata)?;
        let fields: Vec<(&str, String)> = vec![
            ("session_id", session.session_id.clone()),
            ("state", session.state.as_str().to_string()),
            ("created_at", session.created_at.to_rfc3339()),
            ("last_activity", session.last_activity.to_rfc3339()),
            ("idle_timeout", session.idle_timeout_secs.to_string()),
            ("max_duration", session.max_duration_secs.to_string()),
            ("user_id", session.user_id.clone().unwrap_or_default()),
            ("metadata", metadata),
        ];
        let _: () = conn.hset_multiple(&key, &fields).await?;
        let _: () = conn.expire(&key, ttl_secs as i64).await?;
        Ok(())
    }
}

#[async_trait]
impl Store for RedisStore {
    async fn is_available(&self) -> bool {
        match self.pool.get().await {
            Ok(mut conn) => redis::cmd("PING")
                .query_async::<_, String>(&mut conn)
                .await
                .is_ok(),
            Err(_) => false,
        }
    }

    async fn create_session(
        &self,
        idle_timeout_secs: u64,
        max_duration_secs: u64,
        user_id: Option<String>,
    ) -> Result<Session> {
        let mut session = Session::new(Uuid::new_v4().to_string(), idle_timeout_secs, max_duration_secs);
        session.user_id = user_id;

        self.write_session(&session, max_duration_secs + 60).await?;

        let mut conn = self.pool.get().await.context("redis pool exhausted")?;
        let _: () = conn.sadd("sessions:active", &session.session_id).await?;

        Ok(session)
    }

    async fn get_session(&self, session_id: &str) -> Result<Option<Session>> {
        let mut conn = self.pool.get().await.context("redis pool exhausted")?;
        let data: HashMap<String, String> = conn.hgetall(Self::session_key(session_id)).await?;
        if data.is_empty() {
            return Ok(None);
        }

        let state = data
            .get("state")
            .and_then(|s| SessionState::parse(s))
            .unwrap_or(SessionState::New);
        let created_at = parse_timestamp(data.get("created_at"));
        let last_activity = parse_timestamp(data.get("last_activity"));
        let metadata = data
            .get("metadata")
            .and_then(|m| serde_json::from_str(m).ok())
            .unwrap_or_default();

        Ok(Some(Session {
            session_id: data.get("session_id").cloned().unwrap_or_else(|| session_id.to_string()),
            state,
            created_at,
            last_activity,
            idle_timeout_secs: data
                .get("idle_timeout")
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
            max_duration_secs: data
                .get("max_duration")
                .and_then(|v| v.parse().ok())
                .unwrap_or(600),
            user_id: data.get("user_id").filter(|v| !v.is_empty()).cloned(),
            metadata,
        }))
    }

    async fn save_session(&self, session: &Session) -> Result<()> {
        self.write_session(session, session.max_duration_secs + 60).await
    }

    async fn close_session(&self, session_id: &str) -> Result<()> {
        let mut conn = self.pool.get().await.context("redis pool exhausted")?;
        let key = Self::session_key(session_id);
        let _: () = conn
            .hset(&key, "state", SessionState::Closed.as_str())
            .await?;
        let _: () = conn.srem("sessions:active", session_id).await?;
        let _: () = conn.expire(&key, 86_400).await?;
        let _: () = conn.expire(Self::history_key(session_id), 86_400).await?;
        Ok(())
    }

    async fn active_session_ids(&self) -> Result<Vec<String>> {
        let mut conn = self.pool.get().await.context("redis pool exhausted")?;
        let ids: Vec<String> = conn.smembers("sessions:active").await?;
        Ok(ids)
    }

    async fn get_conversation(&self, session_id: &str) -> Result<Option<Conversation>> {
        let mut conn = self.pool.get().await.context("redis pool exhausted")?;
        let data: HashMap<String, String> =
            conn.hgetall(Self::conversation_key(session_id)).await?;
        if data.is_empty() {
            return Ok(None);
        }

        Ok(Some(Conversation {
            state: data
                .get("state")
                .and_then(|s| ConversationState::parse(s))
                .unwrap_or(ConversationState::Init),
            turn_count: data.get("turn_count").and_then(|v| v.parse().ok()).unwrap_or(0),
            clarification_count: data
                .get("clarification_count")
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
            silence_prompts: data
                .get("silence_prompts")
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
            last_user_input: data.get("last_user_input").cloned().unwrap_or_default(),
            last_intent: data.get("last_intent").cloned().unwrap_or_default(),
            created_at: parse_timestamp(data.get("created_at")),
            updated_at: parse_timestamp(data.get("updated_at")),
        }))
    }

    async fn save_conversation(&self, session_id: &str, conversation: &Conversation) -> Result<()> {
        let mut conn = self.pool.get().await.context("redis pool exhausted")?;
        let key = Self::conversation_key(session_id);
        let fields: Vec<(&str, String)> = vec![
            ("state", conversation.state.as_str().to_string()),
            ("turn_count", conversation.turn_count.to_string()),
            ("clarification_count", conversation.clarification_count.to_string()),
            ("silence_prompts", conversation.silence_prompts.to_string()),
            ("last_user_input", conversation.last_user_input.clone()),
            ("last_intent", conversation.last_intent.clone()),
            ("created_at", conversation.created_at.to_rfc3339()),
            ("updated_at", conversation.updated_at.to_rfc3339()),
        ];
        let _: () = conn.hset_multiple(&key, &fields).await?;
        Ok(())
    }

    async fn append_history(&self, session_id: &str, message: Message) -> Result<()> {
        let mut conn = self.pool.get().await.context("redis pool exhausted")?;
        let key = Self::history_key(session_id);
        let payload = serde_json::to_string(&message)?;
        let _: () = conn.lpush(&key, payload).await?;
        let _: () = conn.ltrim(&key, 0, (super::MAX_HISTORY as isize) - 1).await?;
        Ok(())
    }

    async fn get_history(&self, session_id: &str, limit: usize) -> Result<Vec<Message>> {
        let mut conn = self.pool.get().await.context("redis pool exhausted")?;
        let raw: Vec<String> = conn
            .lrange(Self::history_key(session_id), 0, (limit as isize) - 1)
            .await?;
        // Stored newest-first (lpush); callers want oldest-first.
        let mut messages: Vec<Message> = raw
            .into_iter()
            .filter_map(|s| match serde_json::from_str(&s) {
                Ok(m) => Some(m),
                Err(e) => {
                    warn!("dropping malformed history entry: {}", e);
                    None
                }
            })
            .collect();
        messages.reverse();
        Ok(messages)
    }
}

fn parse_timestamp(raw: Option<&String>) -> DateTime<Utc> {
    raw.and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now)
}
