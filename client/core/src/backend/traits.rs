//! Chat Backend Traits
//!
//! Trait definitions for the services the chat flow depends on. The
//! reconciler only sees these seams, so tests drive it with scripted
//! backends and the terminal client drives it with [`super::HttpBackend`].
//!
//! # Services
//!
//! - [`SessionService`]: create, list, fetch, rename and delete sessions;
//!   document token budget
//! - [`PersonaService`]: personas available for chat
//! - [`StreamSource`]: open the packet stream for one exchange
//! - [`FeedbackService`]: like/dislike an answer

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::ChatError;
use crate::filters::Filters;
use crate::messages::{FeedbackType, MessageId, PersonaId, PromptId, SessionId};
use crate::packets::PacketBatch;
use crate::personas::Persona;
use crate::session::{BackendChatSession, ChatSessionSummary};

/// Receiving end of an opened packet stream
///
/// Finite and non-restartable. A transport failure arrives as an `Err`
/// item; the channel closes when the answer is complete.
pub type PacketStream = mpsc::Receiver<Result<PacketBatch, ChatError>>;

/// When the backend should run a document search
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunSearch {
    /// Always search
    Always,
    /// Let the backend decide
    Auto,
    /// Never search
    Never,
}

/// Parameters for opening a packet stream
#[derive(Clone, Debug, PartialEq)]
pub struct StreamRequest {
    /// Question text
    pub message: String,
    /// Last persisted message, the new turn's parent
    pub parent_message_id: Option<MessageId>,
    /// Session the exchange belongs to
    pub session_id: SessionId,
    /// Prompt of the active persona
    pub prompt_id: Option<PromptId>,
    /// Retrieval filters, passed through unmodified
    pub filters: Filters,
    /// Explicitly selected documents (database ids)
    pub selected_document_ids: Vec<i64>,
    /// Search query to use instead of the rephrased question
    pub query_override: Option<String>,
    /// Search even if the backend would not
    pub force_search: bool,
}

impl StreamRequest {
    /// Create a request with no filters, selection or overrides
    pub fn new(message: impl Into<String>, session_id: SessionId) -> Self {
        Self {
            message: message.into(),
            parent_message_id: None,
            session_id,
            prompt_id: None,
            filters: Filters::default(),
            selected_document_ids: Vec::new(),
            query_override: None,
            force_search: false,
        }
    }

    /// Search policy implied by the request
    ///
    /// No prompt or an explicit document selection means no search.
    #[must_use]
    pub fn run_search(&self) -> RunSearch {
        if self.prompt_id.is_none() || !self.selected_document_ids.is_empty() {
            RunSearch::Never
        } else if self.force_search {
            RunSearch::Always
        } else {
            RunSearch::Auto
        }
    }
}

/// Session management
#[async_trait]
pub trait SessionService: Send + Sync {
    /// Create a session for a persona
    async fn create_session(&self, persona_id: PersonaId) -> Result<SessionId, ChatError>;

    /// Sessions of the current user, in backend order
    async fn list_sessions(&self) -> Result<Vec<ChatSessionSummary>, ChatError>;

    /// Fetch a session with its stored messages
    async fn get_session(&self, session_id: SessionId) -> Result<BackendChatSession, ChatError>;

    /// Persist a session name
    async fn rename_session(&self, session_id: SessionId, name: &str) -> Result<(), ChatError>;

    /// Delete a session and its messages
    async fn delete_session(&self, session_id: SessionId) -> Result<(), ChatError>;

    /// Token budget for explicitly selected documents
    async fn max_selected_document_tokens(&self, persona_id: PersonaId) -> Result<u32, ChatError>;
}

/// Persona catalogue
#[async_trait]
pub trait PersonaService: Send + Sync {
    /// All personas, including the default one
    async fn list_personas(&self) -> Result<Vec<Persona>, ChatError>;
}

/// Source of packet streams
#[async_trait]
pub trait StreamSource: Send + Sync {
    /// Open the packet stream for one exchange
    ///
    /// Implementations should stop producing once `cancel` fires.
    async fn open(
        &self,
        request: &StreamRequest,
        cancel: CancellationToken,
    ) -> Result<PacketStream, ChatError>;
}

/// Answer feedback
#[async_trait]
pub trait FeedbackService: Send + Sync {
    /// Submit feedback on a persisted assistant message
    async fn submit_feedback(
        &self,
        message_id: MessageId,
        feedback: FeedbackType,
        details: &str,
    ) -> Result<(), ChatError>;
}

/// Everything the chat flow needs from a backend
pub trait ChatBackend: SessionService + PersonaService + StreamSource + FeedbackService {}

impl<T> ChatBackend for T where T: SessionService + PersonaService + StreamSource + FeedbackService {}
