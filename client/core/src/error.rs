//! Error Types
//!
//! Errors surfaced by the chat client core. Transport failures that happen
//! while an exchange is streaming never reach the caller as errors: the
//! reconciler turns them into an error turn in the history instead.

use thiserror::Error;

use crate::messages::MessageId;

/// Errors produced by the chat client core
#[derive(Debug, Error)]
pub enum ChatError {
    /// A resend or edit referenced a message that is no longer in history
    #[error("message {message_id} is no longer part of the chat history")]
    StaleHistory {
        /// The message id that could not be found
        message_id: MessageId,
    },

    /// An exchange was started while another one is still in flight
    #[error("an exchange is already in progress for this conversation")]
    ExchangeInProgress,

    /// The query of the latest answer cannot be edited
    #[error("cannot edit query: {0}")]
    QueryEditUnavailable(&'static str),

    /// Force search needs a persisted human message before the latest answer
    #[error("no persisted message is available to force a search on")]
    ForceSearchUnavailable,

    /// HTTP transport failure
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend answered with a non-success status
    #[error("backend returned {status}: {detail}")]
    Backend {
        /// HTTP status code
        status: u16,
        /// Detail message extracted from the response body
        detail: String,
    },

    /// A response or packet could not be decoded
    #[error("failed to decode backend payload: {0}")]
    Decode(#[from] serde_json::Error),

    /// The packet stream ended abnormally
    #[error("packet stream closed: {0}")]
    StreamClosed(String),
}

impl ChatError {
    /// Message suitable for displaying to a user
    ///
    /// Backend errors show only the detail the backend sent.
    #[must_use]
    pub fn display_message(&self) -> String {
        match self {
            Self::Backend { detail, .. } => detail.clone(),
            other => other.to_string(),
        }
    }
}
