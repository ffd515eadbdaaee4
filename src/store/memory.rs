//! Stateless-mode fallback store
//!
//! Used when `REDIS_HOST` is absent (spec §6: "Absence of the store
//! degrades the server to a stateless mode with no sessions" — relaxed here
//! to "sessions live only as long as the process", which is the useful
//! degraded behavior for a single-instance deployment and for tests).

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use super::{Store, MAX_HISTORY};
use crate::types::{Conversation, Message, Session, SessionState};

#[derive(Default)]
pub struct InMemoryStore {
    sessions: Mutex<HashMap<String, Session>>,
    conversations: Mutex<HashMap<String, Conversation>>,
    history: Mutex<HashMap<String, Vec<Message>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn is_available(&self) -> bool {
        true
    }

    async fn create_session(
        &self,
        idle_timeout_secs: u64,
        max_duration_secs: u64,
        user_id: Option<String>,
    ) -> Result<Session> {
        let mut session = Session::new(Uuid::new_v4().to_string(), idle_timeout_secs, max_duration_secs);
        session.user_id = user_id;
        self.sessions
            .lock()
            .unwrap()
            .insert(session.session_id.clone(), session.clone());
        Ok(session)
    }

    async fn get_session(&self, session_id: &str) -> Result<Option<Session>> {
        Ok(self.sessions.lock().unwrap().get(session_id).cloned())
    }

    async fn save_session(&self, session: &Session) -> Result<()> {
        self.sessions
            .lock()
            .unwrap()
            .insert(session.session_id.clone(), session.clone());
        Ok(())
    }

    async fn close_session(&self, session_id: &str) -> Result<()> {
        let mut sessions = self.sessions.lock().unwrap();
        if let Some(session) = sessions.get_mut(session_id) {
            session.state = SessionState::Closed;
        }
        Ok(())
    }

    async fn active_session_ids(&self) -> Result<Vec<String>> {
        Ok(self
            .sessions
            .lock()
            .unwrap()
            .values()
            .filter(|s| s.state != SessionState::Closed)
            .map(|s| s.session_id.clone())
            .collect())
    }

    async fn get_conversation(&self, session_id: &str) -> Result<Option<Conversation>> {
        Ok(self.conversations.lock().unwrap().get(session_id).cloned())
    }

    async fn save_conversation(&self, session_id: &str, conversation: &Conversation) -> Result<()> {
        self.conversations
            .lock()
            .unwrap()
            .insert(session_id.to_string(), conversation.clone());
        Ok(())
    }

    async fn append_history(&self, session_id: &str, message: Message) -> Result<()> {
        let mut history = self.history.lock().unwrap();
        let entries = history.entry(session_id.to_string()).or_default();
        entries.push(message);
        if entries.len() > MAX_HISTORY {
            let excess = entries.len() - MAX_HISTORY;
            entries.drain(0..excess);
        }
        Ok(())
    }

    async fn get_history(&self, session_id: &str, limit: usize) -> Result<Vec<Message>> {
        let history = self.history.lock().unwrap();
        Ok(match history.get(session_id) {
            Some(entries) => {
                let start = entries.len().saturating_sub(limit);
                entries[start..].to_vec()
            }
            None => Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_and_fetch_round_trips() {
        let store = InMemoryStore::new();
        let session = store.create_session(30, 600, None).await.unwrap();
        let fetched = store.get_session(&session.session_id).await.unwrap();
        assert_eq!(fetched.unwrap().session_id, session.session_id);
    }

    #[tokio::test]
    async fn history_trims_to_max() {
        let store = InMemoryStore::new();
        for i in 0..60 {
            store
                .append_history(
                    "s1",
                    Message {
                        role: crate::types::Role::User,
                        content: format!("msg {}", i),
                        timestamp: chrono::Utc::now(),
                    },
                )
                .await
                .unwrap();
        }
        let history = store.get_history("s1", 100).await.unwrap();
        assert_eq!(history.len(), MAX_HISTORY);
        assert_eq!(history.last().unwrap().content, "msg 59");
    }

    #[tokio::test]
    async fn close_session_transitions_state() {
        let store = InMemoryStore::new();
        let session = store.create_session(30, 600, None).await.unwrap();
        store.close_session(&session.session_id).await.unwrap();
        let fetched = store.get_session(&session.session_id).await.unwrap().unwrap();
        assert_eq!(fetched.state, SessionState::Closed);
        assert!(!store
            .active_session_ids()
            .await
            .unwrap()
            .contains(&session.session_id));
    }
}
