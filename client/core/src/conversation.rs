//! Conversation State
//!
//! The single owned state object for one chat view: session, persona,
//! history, input, filters, document selection, and the exchange state
//! machine that keeps at most one answer streaming at a time.
//!
//! # Exchange State Machine
//!
//! ```text
//!            begin_exchange()              cancel observed
//!   Idle ──────────────────────▶ Streaming ─────────────────▶ Cancelling
//!    ▲                               │                            │
//!    └────────── finish_exchange() ──┴────────────────────────────┘
//! ```
//!
//! The reconciler borrows this state mutably for the duration of an
//! exchange and writes complete history snapshots into it.
//!
//! # Current Location
//!
//! Which session the user is looking at is owned by the routing layer and
//! observed here through a `watch` channel, so a completed exchange can
//! tell whether the user navigated away while it was streaming.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::documents::DocumentSelection;
use crate::error::ChatError;
use crate::filters::Filters;
use crate::history::{human_and_ai_from_message_number, Message, MessagePair, MessageTarget};
use crate::messages::{DocumentDisplay, PersonaId, PromptId, SessionId};
use crate::personas::Persona;

/// Exchange lifecycle for one conversation
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExchangeState {
    /// Ready for a new exchange
    #[default]
    Idle,
    /// An answer is streaming
    Streaming,
    /// Cancellation requested, waiting for the batch boundary
    Cancelling,
}

/// Owned state of one chat view
#[derive(Debug)]
pub struct ConversationState {
    session_id: Option<SessionId>,
    persona: Option<Persona>,
    history: Vec<Message>,
    input: String,
    filters: Filters,
    selected_documents: DocumentSelection,
    max_document_tokens: u32,
    document_display: DocumentDisplay,
    exchange: ExchangeState,
    cancel: Option<CancellationToken>,
    location: watch::Receiver<Option<SessionId>>,
}

impl ConversationState {
    /// Create state observing the routing layer's current session
    #[must_use]
    pub fn new(location: watch::Receiver<Option<SessionId>>, max_document_tokens: u32) -> Self {
        let session_id = *location.borrow();
        Self {
            session_id,
            persona: None,
            history: Vec::new(),
            input: String::new(),
            filters: Filters::default(),
            selected_documents: DocumentSelection::new(),
            max_document_tokens,
            document_display: DocumentDisplay::Hidden,
            exchange: ExchangeState::Idle,
            cancel: None,
            location,
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// Session this conversation belongs to, `None` before the first exchange
    #[must_use]
    pub fn session_id(&self) -> Option<SessionId> {
        self.session_id
    }

    /// Active persona
    #[must_use]
    pub fn persona(&self) -> Option<&Persona> {
        self.persona.as_ref()
    }

    /// Persona id used for new sessions (0 when none is selected)
    #[must_use]
    pub fn persona_id(&self) -> PersonaId {
        self.persona.as_ref().map(|p| p.id).unwrap_or_default()
    }

    /// Prompt sent with questions
    #[must_use]
    pub fn prompt_id(&self) -> Option<PromptId> {
        self.persona.as_ref().and_then(Persona::prompt_id)
    }

    /// Current transcript
    #[must_use]
    pub fn history(&self) -> &[Message] {
        &self.history
    }

    /// Text in the input field
    #[must_use]
    pub fn input(&self) -> &str {
        &self.input
    }

    /// Retrieval filters
    #[must_use]
    pub fn filters(&self) -> &Filters {
        &self.filters
    }

    /// Explicitly selected documents
    #[must_use]
    pub fn selected_documents(&self) -> &DocumentSelection {
        &self.selected_documents
    }

    /// Document token budget for the active persona
    #[must_use]
    pub fn max_document_tokens(&self) -> u32 {
        self.max_document_tokens
    }

    /// Which turn has its documents panel open
    #[must_use]
    pub fn document_display(&self) -> DocumentDisplay {
        self.document_display
    }

    /// The human/assistant pair behind the documents panel
    #[must_use]
    pub fn displayed_pair(&self) -> MessagePair<'_> {
        let target = match self.document_display {
            DocumentDisplay::Hidden => return MessagePair::default(),
            DocumentDisplay::Latest => MessageTarget::Latest,
            DocumentDisplay::Message(id) => MessageTarget::Id(id),
        };
        human_and_ai_from_message_number(&self.history, target)
    }

    /// Exchange lifecycle state
    #[must_use]
    pub fn exchange_state(&self) -> ExchangeState {
        self.exchange
    }

    /// Whether an answer is streaming (or being cancelled)
    #[must_use]
    pub fn is_streaming(&self) -> bool {
        self.exchange != ExchangeState::Idle
    }

    /// Session the user is currently looking at
    #[must_use]
    pub fn current_location(&self) -> Option<SessionId> {
        *self.location.borrow()
    }

    // ------------------------------------------------------------------
    // Mutators
    // ------------------------------------------------------------------

    /// Replace the input text
    pub fn set_input(&mut self, input: impl Into<String>) {
        self.input = input.into();
    }

    /// Select a persona
    pub fn set_persona(&mut self, persona: Option<Persona>) {
        self.persona = persona;
    }

    /// Mutable access to the retrieval filters
    pub fn filters_mut(&mut self) -> &mut Filters {
        &mut self.filters
    }

    /// Mutable access to the document selection
    pub fn selected_documents_mut(&mut self) -> &mut DocumentSelection {
        &mut self.selected_documents
    }

    /// Update the document token budget
    pub fn set_max_document_tokens(&mut self, max_tokens: u32) {
        self.max_document_tokens = max_tokens;
    }

    /// Point the documents panel somewhere else
    pub fn set_document_display(&mut self, display: DocumentDisplay) {
        self.document_display = display;
    }

    /// Move to another session (or to a fresh conversation with `None`)
    ///
    /// Clears selection and filters when leaving a session and cancels an
    /// in-flight exchange. History is left for the caller to reload.
    pub fn switch_session(&mut self, session_id: Option<SessionId>) {
        if self.session_id.is_some() && self.session_id != session_id {
            self.selected_documents.clear();
            self.filters = Filters::default();
            self.request_cancel();
        }
        self.session_id = session_id;
        if session_id.is_none() {
            self.history.clear();
            self.document_display = DocumentDisplay::Hidden;
        }
    }

    /// Request cancellation of the in-flight exchange
    ///
    /// Returns `false` when nothing is streaming.
    pub fn request_cancel(&mut self) -> bool {
        if self.exchange != ExchangeState::Streaming {
            return false;
        }
        if let Some(ref token) = self.cancel {
            token.cancel();
        }
        self.exchange = ExchangeState::Cancelling;
        true
    }

    pub(crate) fn set_session_id(&mut self, session_id: SessionId) {
        self.session_id = Some(session_id);
    }

    pub(crate) fn clear_input(&mut self) {
        self.input.clear();
    }

    pub(crate) fn replace_history(&mut self, history: Vec<Message>) {
        self.history = history;
    }

    /// Idle -> Streaming, handing out the exchange's cancellation token
    pub(crate) fn begin_exchange(&mut self) -> Result<CancellationToken, ChatError> {
        if self.exchange != ExchangeState::Idle {
            return Err(ChatError::ExchangeInProgress);
        }
        let token = CancellationToken::new();
        self.cancel = Some(token.clone());
        self.exchange = ExchangeState::Streaming;
        Ok(token)
    }

    /// Streaming -> Cancelling once the reconciler observes cancellation
    pub(crate) fn mark_cancelling(&mut self) {
        if self.exchange == ExchangeState::Streaming {
            self.exchange = ExchangeState::Cancelling;
        }
    }

    /// Any state -> Idle
    pub(crate) fn finish_exchange(&mut self) {
        self.cancel = None;
        self.exchange = ExchangeState::Idle;
    }
}
