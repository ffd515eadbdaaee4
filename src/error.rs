//! Session-invariant error kinds
//!
//! Hand-rolled `Display` impl, matching the teacher's `FailoverError` —
//! no `thiserror` derive. These are the only errors that need to be matched
//! on by the HTTP/WS layer to choose a status code or close frame; everything
//! else flows as `anyhow::Result` with `.context(...)`.

use std::fmt;

#[derive(Debug, Clone)]
pub enum SessionError {
    /// Session id not present in the store (or never created).
    NotFound(String),
    /// Session exists but its lifecycle state forbids the requested action.
    Expired(String),
    /// Key/value store is unreachable; streaming and `/voice` must refuse.
    StoreUnavailable,
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::NotFound(id) => write!(f, "session not found: {}", id),
            SessionError::Expired(id) => write!(f, "session expired: {}", id),
            SessionError::StoreUnavailable => write!(f, "session store unavailable"),
        }
    }
}

impl std::error::Error for SessionError {}
