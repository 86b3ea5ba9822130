//! Chat Client Messages
//!
//! Identifiers, enums shared across the crate, and the updates the chat
//! client core publishes to whatever renders the conversation.
//!
//! # Design Philosophy
//!
//! The core owns conversation logic; a rendering surface (terminal, web view,
//! test harness) only consumes [`ChatUpdate`]s and draws what it is told.

use serde::{Deserialize, Serialize};

use crate::history::Message;

/// Backend-assigned message identifier
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub i64);

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Backend-assigned chat session identifier
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub i64);

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Persona identifier
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PersonaId(pub i64);

/// Prompt identifier (each persona carries one or more prompts)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PromptId(pub i64);

/// Who produced a turn in the conversation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// User input
    User,
    /// Assistant answer
    Assistant,
    /// Error shown in place of an answer
    Error,
}

/// How the documents attached to an assistant turn were obtained
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalType {
    /// No documents involved
    #[default]
    None,
    /// Answered from documents the user selected explicitly
    SelectedDocs,
    /// The backend searched for supporting documents
    Search,
}

/// User feedback on an assistant answer
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackType {
    /// Thumbs up
    Like,
    /// Thumbs down
    Dislike,
}

impl FeedbackType {
    /// Whether this feedback counts as positive
    #[must_use]
    pub fn is_positive(self) -> bool {
        matches!(self, Self::Like)
    }
}

/// Notification levels
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotifyLevel {
    /// Informational
    Info,
    /// Warning
    Warning,
    /// Error
    Error,
    /// Success
    Success,
}

/// Which assistant turn has its retrieved-documents panel open
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocumentDisplay {
    /// No panel shown
    #[default]
    Hidden,
    /// The latest turn, whose id is not known yet while streaming
    Latest,
    /// A persisted assistant turn
    Message(MessageId),
}

/// Updates published by the chat client core
///
/// A surface renders these; it never mutates the conversation itself.
#[derive(Clone, Debug, PartialEq)]
pub enum ChatUpdate {
    /// A complete new history snapshot
    HistoryUpdated {
        /// The full ordered transcript
        history: Vec<Message>,
    },

    /// An exchange started or ended
    StreamingChanged {
        /// Whether an answer is currently streaming
        streaming: bool,
    },

    /// The retrieved-documents panel should point somewhere else
    DocumentDisplayChanged {
        /// New panel target
        display: DocumentDisplay,
    },

    /// Navigate to a session page
    Navigate {
        /// Session to show
        session_id: SessionId,
        /// Client-side route for that session
        path: String,
    },

    /// Dismissable notification
    Notify {
        /// Notification level
        level: NotifyLevel,
        /// Message content
        message: String,
    },
}

impl ChatUpdate {
    /// Build a notification update
    pub fn notify(level: NotifyLevel, message: impl Into<String>) -> Self {
        Self::Notify {
            level,
            message: message.into(),
        }
    }

    /// Build a navigation update for a session page
    #[must_use]
    pub fn navigate(session_id: SessionId) -> Self {
        Self::Navigate {
            session_id,
            path: format!("/dashboard/chat?chatId={session_id}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_navigate_path() {
        match ChatUpdate::navigate(SessionId(42)) {
            ChatUpdate::Navigate { session_id, path } => {
                assert_eq!(session_id, SessionId(42));
                assert_eq!(path, "/dashboard/chat?chatId=42");
            }
            other => panic!("Expected Navigate, got {other:?}"),
        }
    }

    #[test]
    fn test_retrieval_type_wire_names() {
        let json = serde_json::to_string(&RetrievalType::SelectedDocs).unwrap();
        assert_eq!(json, "\"selected_docs\"");
        let role: MessageRole = serde_json::from_str("\"assistant\"").unwrap();
        assert_eq!(role, MessageRole::Assistant);
    }

    #[test]
    fn test_feedback_polarity() {
        assert!(FeedbackType::Like.is_positive());
        assert!(!FeedbackType::Dislike.is_positive());
    }
}
