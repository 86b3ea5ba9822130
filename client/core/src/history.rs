//! Message History
//!
//! The transcript model and the lookups the chat flow runs against it.
//!
//! A history is an ordered `Vec<Message>` for one linear conversation.
//! Resending or editing truncates the tail and appends new turns; past
//! entries are never mutated in place.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::documents::{cited_documents, Document};
use crate::error::ChatError;
use crate::messages::{MessageId, MessageRole, RetrievalType};

/// One turn in a conversation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Backend id, `None` while the turn is pending
    pub message_id: Option<MessageId>,
    /// Display text
    pub message: String,
    /// Who produced the turn
    pub role: MessageRole,
    /// How documents were obtained (assistant turns only)
    #[serde(default)]
    pub retrieval_type: RetrievalType,
    /// Search query that produced this turn, if retrieval happened
    #[serde(default)]
    pub query: Option<String>,
    /// Documents associated with this turn
    #[serde(default)]
    pub documents: Vec<Document>,
    /// Citation key to document database id
    #[serde(default)]
    pub citations: BTreeMap<String, i64>,
}

impl Message {
    fn bare(message_id: Option<MessageId>, message: String, role: MessageRole) -> Self {
        Self {
            message_id,
            message,
            role,
            retrieval_type: RetrievalType::None,
            query: None,
            documents: Vec::new(),
            citations: BTreeMap::new(),
        }
    }

    /// A user turn with an optional backend id
    pub fn user(message_id: Option<MessageId>, message: impl Into<String>) -> Self {
        Self::bare(message_id, message.into(), MessageRole::User)
    }

    /// A user turn that has not been persisted yet
    pub fn pending_user(message: impl Into<String>) -> Self {
        Self::user(None, message)
    }

    /// An assistant turn with no documents
    pub fn assistant(message_id: Option<MessageId>, message: impl Into<String>) -> Self {
        Self::bare(message_id, message.into(), MessageRole::Assistant)
    }

    /// An error turn
    pub fn error(message: impl Into<String>) -> Self {
        Self::bare(None, message.into(), MessageRole::Error)
    }

    /// Documents this turn cites
    #[must_use]
    pub fn cited_documents(&self) -> Vec<Document> {
        cited_documents(&self.documents, &self.citations)
    }
}

/// Documents the backend used as context for a message
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextDocs {
    /// Documents in rank order
    #[serde(default)]
    pub top_documents: Vec<Document>,
}

/// Message type as stored by the backend
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendMessageType {
    /// Prompt material, never displayed
    System,
    /// User turn
    User,
    /// Assistant turn
    #[default]
    Assistant,
    /// Error turn
    Error,
}

/// A message as the backend stores it
///
/// Also the payload of the final packet of a streamed answer, where only
/// the ids, query, documents and citations are guaranteed to be set.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BackendMessage {
    /// Backend id of this message
    pub message_id: MessageId,
    /// Parent in the conversation tree
    #[serde(default)]
    pub parent_message: Option<MessageId>,
    /// Message text
    #[serde(default)]
    pub message: String,
    /// Message type
    #[serde(default)]
    pub message_type: BackendMessageType,
    /// Rephrased search query, if a search ran
    #[serde(default)]
    pub rephrased_query: Option<String>,
    /// Context documents
    #[serde(default)]
    pub context_docs: Option<ContextDocs>,
    /// Citation key to document database id
    #[serde(default)]
    pub citations: BTreeMap<String, i64>,
}

impl BackendMessage {
    /// Context documents, empty when none were attached
    #[must_use]
    pub fn top_documents(&self) -> &[Document] {
        match &self.context_docs {
            Some(docs) => &docs.top_documents,
            None => &[],
        }
    }
}

/// Convert a stored session's messages into a displayable history
///
/// System messages are dropped. An assistant turn with context documents
/// counts as a search if it carries a rephrased query, otherwise it was
/// answered from selected documents.
#[must_use]
pub fn process_raw_chat_history(raw: &[BackendMessage]) -> Vec<Message> {
    raw.iter()
        .filter_map(|info| {
            let role = match info.message_type {
                BackendMessageType::System => return None,
                BackendMessageType::User => MessageRole::User,
                BackendMessageType::Assistant => MessageRole::Assistant,
                BackendMessageType::Error => MessageRole::Error,
            };
            let retrieval_type = if info.top_documents().is_empty() {
                RetrievalType::None
            } else if info.rephrased_query.is_some() {
                RetrievalType::Search
            } else {
                RetrievalType::SelectedDocs
            };
            Some(Message {
                message_id: Some(info.message_id),
                message: info.message.clone(),
                role,
                retrieval_type,
                query: info.rephrased_query.clone(),
                documents: info.top_documents().to_vec(),
                citations: info.citations.clone(),
            })
        })
        .collect()
}

/// Id of the most recent persisted turn, `None` for a fresh conversation
#[must_use]
pub fn last_successful_message_id(history: &[Message]) -> Option<MessageId> {
    history.iter().rev().find_map(|m| m.message_id)
}

/// Which turn a lookup is aimed at
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageTarget {
    /// The last turn in history, whatever its id (ids are unknown mid-stream)
    Latest,
    /// A turn with a known backend id
    Id(MessageId),
}

/// A human turn and the assistant turn paired with it
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MessagePair<'a> {
    /// The human side
    pub human: Option<&'a Message>,
    /// The assistant side
    pub ai: Option<&'a Message>,
}

/// Locate a human/assistant pair around a target turn
///
/// If the target is a user turn the pair is that turn and the one after
/// it; otherwise the target is the assistant side and the human turn is
/// the one before it. An unknown id yields an empty pair.
#[must_use]
pub fn human_and_ai_from_message_number(history: &[Message], target: MessageTarget) -> MessagePair<'_> {
    let index = match target {
        MessageTarget::Latest => history.len().checked_sub(1),
        MessageTarget::Id(id) => history.iter().position(|m| m.message_id == Some(id)),
    };
    let Some(index) = index else {
        return MessagePair::default();
    };

    let matching = &history[index];
    if matching.role == MessageRole::User {
        MessagePair {
            human: Some(matching),
            ai: history.get(index + 1),
        }
    } else {
        MessagePair {
            human: index.checked_sub(1).and_then(|i| history.get(i)),
            ai: Some(matching),
        }
    }
}

/// Split history for a resend of `message_id`
///
/// Returns everything strictly before the resent turn, and the turn itself.
///
/// # Errors
///
/// [`ChatError::StaleHistory`] when the id is not in history.
pub fn truncate_for_resend(
    history: &[Message],
    message_id: MessageId,
) -> Result<(&[Message], &Message), ChatError> {
    let index = history
        .iter()
        .position(|m| m.message_id == Some(message_id))
        .ok_or(ChatError::StaleHistory { message_id })?;
    Ok((&history[..index], &history[index]))
}
