//! Chat Sessions
//!
//! Session payloads returned by the backend, the session list ordering,
//! and how a new session gets its name.
//!
//! # Design Philosophy
//!
//! The backend persists sessions; the client only names a session once,
//! after its first exchange completes, from the first user message.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::history::BackendMessage;
use crate::messages::{PersonaId, SessionId};

/// A stored session with its messages
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BackendChatSession {
    /// Session id
    pub chat_session_id: SessionId,
    /// Session name
    #[serde(default)]
    pub description: String,
    /// Persona the session was started with
    #[serde(default)]
    pub persona_id: PersonaId,
    /// Messages in conversation order
    #[serde(default)]
    pub messages: Vec<BackendMessage>,
}

/// A session entry in the session list
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatSessionSummary {
    /// Session id
    pub id: SessionId,
    /// Session name
    pub name: String,
    /// Persona the session was started with
    pub persona_id: PersonaId,
    /// Creation time
    pub time_created: DateTime<Utc>,
}

/// Sort sessions newest first, most recent id first on ties
pub fn sort_sessions(sessions: &mut [ChatSessionSummary]) {
    sessions.sort_by(|a, b| {
        b.time_created
            .cmp(&a.time_created)
            .then_with(|| b.id.cmp(&a.id))
    });
}

/// Derive a session name from the first user message
///
/// Uses the first non-empty line with whitespace collapsed, cut at
/// `max_chars` characters (an ellipsis marks the cut).
#[must_use]
pub fn derive_session_name(message: &str, max_chars: usize) -> String {
    let line = message
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or_default();
    let collapsed = line.split_whitespace().collect::<Vec<_>>().join(" ");

    if collapsed.chars().count() <= max_chars {
        return collapsed;
    }

    let mut name: String = collapsed.chars().take(max_chars.saturating_sub(1)).collect();
    name.truncate(name.trim_end().len());
    name.push('…');
    name
}
