//! Shared data model
//!
//! Types used across the voice pipeline, conversation engine, store, and
//! orchestrator, kept in one module to avoid circular dependencies (mirrors
//! the teacher's rationale for `types.rs`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single turn in a session's conversation history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// Role of a message sender.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn to_openai_string(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    pub fn from_openai_string(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_openai_string())
    }
}

/// Session lifecycle state (spec §3). Closed sum type — unknown strings must
/// be refused, never silently defaulted.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum SessionState {
    New,
    Active,
    Idle,
    Closed,
}

impl SessionState {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "NEW" => Some(SessionState::New),
            "ACTIVE" => Some(SessionState::Active),
            "IDLE" => Some(SessionState::Idle),
            "CLOSED" => Some(SessionState::Closed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::New => "NEW",
            SessionState::Active => "ACTIVE",
            SessionState::Idle => "IDLE",
            SessionState::Closed => "CLOSED",
        }
    }
}

/// Session row (spec §3). Persists in the store; may outlive one connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub state: SessionState,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub idle_timeout_secs: u64,
    pub max_duration_secs: u64,
    pub user_id: Option<String>,
    pub metadata: std::collections::HashMap<String, String>,
}

impl Session {
    pub fn new(session_id: String, idle_timeout_secs: u64, max_duration_secs: u64) -> Self {
        let now = Utc::now();
        Self {
            session_id,
            state: SessionState::New,
            created_at: now,
            last_activity: now,
            idle_timeout_secs,
            max_duration_secs,
            user_id: None,
            metadata: std::collections::HashMap::new(),
        }
    }

    /// Invariant: created_at <= last_activity <= now.
    pub fn touch(&mut self) {
        let now = Utc::now();
        if self.state == SessionState::New {
            self.state = SessionState::Active;
        } else if self.state == SessionState::Idle {
            self.state = SessionState::Active;
        }
        self.last_activity = now;
    }

    pub fn is_idle(&self, now: DateTime<Utc>) -> bool {
        self.state == SessionState::Active
            && (now - self.last_activity).num_seconds() >= self.idle_timeout_secs as i64
    }

    pub fn is_past_max_duration(&self, now: DateTime<Utc>) -> bool {
        (now - self.created_at).num_seconds() >= self.max_duration_secs as i64
    }
}

/// Conversation dialog state (spec §4.D). Closed sum type.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConversationState {
    Init,
    Greeting,
    Listening,
    Processing,
    Responding,
    Clarifying,
    Error,
    End,
}

impl ConversationState {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "INIT" => Some(ConversationState::Init),
            "GREETING" => Some(ConversationState::Greeting),
            "LISTENING" => Some(ConversationState::Listening),
            "PROCESSING" => Some(ConversationState::Processing),
            "RESPONDING" => Some(ConversationState::Responding),
            "CLARIFYING" => Some(ConversationState::Clarifying),
            "ERROR" => Some(ConversationState::Error),
            "END" => Some(ConversationState::End),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationState::Init => "INIT",
            ConversationState::Greeting => "GREETING",
            ConversationState::Listening => "LISTENING",
            ConversationState::Processing => "PROCESSING",
            ConversationState::Responding => "RESPONDING",
            ConversationState::Clarifying => "CLARIFYING",
            ConversationState::Error => "ERROR",
            ConversationState::End => "END",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ConversationState::End)
    }
}

/// Per-session conversation row (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub state: ConversationState,
    pub turn_count: u32,
    pub clarification_count: u32,
    pub silence_prompts: u32,
    pub last_user_input: String,
    pub last_intent: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            state: ConversationState::Init,
            turn_count: 0,
            clarification_count: 0,
            silence_prompts: 0,
            last_user_input: String::new(),
            last_intent: String::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

/// ASR result (spec §3). Confidence 0 denotes silence or engine failure;
/// the two are distinguished only by presence of `text`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AsrResult {
    pub text: String,
    pub confidence: f32,
    pub language: String,
}

impl AsrResult {
    pub fn silence() -> Self {
        Self {
            text: String::new(),
            confidence: 0.0,
            language: String::new(),
        }
    }
}

/// Confidence router verdict (spec §4.C).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ConfidenceAction {
    Accept,
    Clarify,
    Reject,
}

impl ConfidenceAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceAction::Accept => "ACCEPT",
            ConfidenceAction::Clarify => "CLARIFY",
            ConfidenceAction::Reject => "REJECT",
        }
    }
}

/// Input-quality classification (spec §4.D).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputQuality {
    Empty,
    Unclear,
    Clear,
}
