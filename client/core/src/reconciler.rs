//! Chat Stream Reconciler
//!
//! Runs one question/answer exchange against the backend and keeps the
//! visible history consistent at every step.
//!
//! # Exchange Flow
//!
//! ```text
//! begin():  stale check ─▶ create session? ─▶ Idle→Streaming ─▶ publish [working, user…]
//! run():    open stream ─▶ per batch: fold all packets ─▶ publish one snapshot ─▶ cancelled?
//!           completed   ─▶ name + navigate (new session) ─▶ auto-display documents
//!           failed      ─▶ publish [working, user…, error]
//! ```
//!
//! `begin` and `run` are split so a caller can grab the exchange's
//! cancellation token before handing the state to `run`. [`ChatReconciler::submit`]
//! does both in one call.
//!
//! The history is never edited in place: each publish writes a complete
//! snapshot into [`ConversationState`] and mirrors it as a
//! [`ChatUpdate::HistoryUpdated`].

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::backend::{ChatBackend, StreamRequest};
use crate::conversation::ConversationState;
use crate::documents::Document;
use crate::error::ChatError;
use crate::history::{last_successful_message_id, truncate_for_resend, BackendMessage, Message};
use crate::messages::{
    ChatUpdate, DocumentDisplay, FeedbackType, MessageId, MessageRole, NotifyLevel,
    RetrievalType, SessionId,
};
use crate::packets::StreamPacket;
use crate::personas::{chat_personas, Persona};
use crate::session::{derive_session_name, sort_sessions, ChatSessionSummary};

const STALE_RESEND_MESSAGE: &str =
    "Failed to re-send message - please refresh the page and try again.";
const EDIT_FIRST_MESSAGE: &str =
    "Cannot edit query of first message - please refresh the page and try again.";
const EDIT_PENDING_MESSAGE: &str =
    "Cannot edit query of a pending message - please wait a few seconds and try again.";
const FORCE_SEARCH_MESSAGE: &str =
    "Failed to force search - please refresh the page and try again.";
const RENAME_FAILED_MESSAGE: &str = "Failed to rename chat session";
const DELETE_FAILED_MESSAGE: &str = "Failed to delete chat session";

/// Default cut-off for derived session names
pub const DEFAULT_SESSION_NAME_MAX_CHARS: usize = 50;

/// What to send in an exchange
///
/// With no explicit message and no resend, the input field is sent.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SubmitRequest {
    /// Text to send instead of the input field
    pub message: Option<String>,
    /// Resend an earlier user turn, dropping everything from it onwards
    pub message_id_to_resend: Option<MessageId>,
    /// Search query to use instead of the rephrased question
    pub query_override: Option<String>,
    /// Search even if the backend would not
    pub force_search: bool,
}

impl SubmitRequest {
    /// Send the input field
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Send explicit text
    pub fn message(text: impl Into<String>) -> Self {
        Self {
            message: Some(text.into()),
            ..Self::default()
        }
    }

    /// Resend an earlier user turn
    #[must_use]
    pub fn resend(message_id: MessageId) -> Self {
        Self {
            message_id_to_resend: Some(message_id),
            ..Self::default()
        }
    }

    /// Override the search query
    #[must_use]
    pub fn with_query_override(mut self, query: impl Into<String>) -> Self {
        self.query_override = Some(query.into());
        self
    }

    /// Force a search
    #[must_use]
    pub fn with_force_search(mut self) -> Self {
        self.force_search = true;
        self
    }
}

/// An exchange that has started but not yet streamed
#[derive(Debug)]
pub struct Exchange {
    session_id: SessionId,
    is_new_session: bool,
    message: String,
    working_history: Vec<Message>,
    request: StreamRequest,
    cancel: CancellationToken,
    location_at_start: Option<SessionId>,
    selected_documents: Vec<Document>,
}

impl Exchange {
    /// Session the exchange runs in
    #[must_use]
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Whether the session was created for this exchange
    #[must_use]
    pub fn is_new_session(&self) -> bool {
        self.is_new_session
    }

    /// Question text
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Parameters the stream will be opened with
    #[must_use]
    pub fn request(&self) -> &StreamRequest {
        &self.request
    }

    /// Token that stops the exchange at the next batch boundary
    #[must_use]
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

/// How an exchange ended
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExchangeOutcome {
    /// The stream ran to completion
    Completed,
    /// Stopped at a batch boundary, partial answer kept
    Cancelled,
    /// Transport failure, an error turn was published
    Failed,
}

/// Running state folded from the packets of one exchange
#[derive(Debug)]
struct Accumulator {
    answer: String,
    query: Option<String>,
    retrieval_type: RetrievalType,
    documents: Vec<Document>,
    error: Option<String>,
    final_message: Option<BackendMessage>,
}

impl Accumulator {
    fn new(selected_documents: &[Document]) -> Self {
        let retrieval_type = if selected_documents.is_empty() {
            RetrievalType::None
        } else {
            RetrievalType::SelectedDocs
        };
        Self {
            answer: String::new(),
            query: None,
            retrieval_type,
            documents: selected_documents.to_vec(),
            error: None,
            final_message: None,
        }
    }

    /// Fold one packet, returning true when it retrieved documents
    fn fold(&mut self, packet: StreamPacket) -> bool {
        match packet {
            StreamPacket::AnswerPiece(piece) => {
                self.answer.push_str(&piece);
                false
            }
            StreamPacket::RetrievedDocuments {
                top_documents,
                rephrased_query,
            } => {
                let retrieved = !top_documents.is_empty();
                self.documents = top_documents;
                self.query = rephrased_query;
                self.retrieval_type = RetrievalType::Search;
                retrieved
            }
            StreamPacket::Error(error) => {
                self.error = Some(error);
                false
            }
            StreamPacket::FinalMessage(message) => {
                if let Some(ref existing) = self.final_message {
                    tracing::warn!(
                        accepted = %existing.message_id,
                        ignored = %message.message_id,
                        "Ignoring second final message"
                    );
                } else {
                    self.final_message = Some(message);
                }
                false
            }
        }
    }

    fn final_message_id(&self) -> Option<MessageId> {
        self.final_message.as_ref().map(|m| m.message_id)
    }

    /// Working history plus the reconstructed user and assistant turns
    fn snapshot(&self, working_history: &[Message], message: &str) -> Vec<Message> {
        let final_message = self.final_message.as_ref();

        let user = Message::user(final_message.and_then(|m| m.parent_message), message);

        let (text, role) = match self.error {
            Some(ref error) => (error.clone(), MessageRole::Error),
            None => (self.answer.clone(), MessageRole::Assistant),
        };
        let documents = match final_message.and_then(|m| m.context_docs.as_ref()) {
            Some(context) => context.top_documents.clone(),
            None => self.documents.clone(),
        };
        let assistant = Message {
            message_id: final_message.map(|m| m.message_id),
            message: text,
            role,
            retrieval_type: self.retrieval_type,
            query: final_message
                .and_then(|m| m.rephrased_query.clone())
                .or_else(|| self.query.clone()),
            documents,
            citations: final_message
                .map(|m| m.citations.clone())
                .unwrap_or_default(),
        };

        let mut history = Vec::with_capacity(working_history.len() + 2);
        history.extend_from_slice(working_history);
        history.push(user);
        history.push(assistant);
        history
    }

    /// Whether the finished answer should open its documents panel
    fn should_display_documents(&self) -> bool {
        self.retrieval_type == RetrievalType::Search
            && self
                .final_message
                .as_ref()
                .is_some_and(|m| !m.top_documents().is_empty())
    }
}

enum StreamEnd {
    Completed,
    Cancelled,
}

/// Drives exchanges for one conversation
pub struct ChatReconciler<B: ChatBackend> {
    backend: Arc<B>,
    session_name_max_chars: usize,
    updates: mpsc::Sender<ChatUpdate>,
}

impl<B: ChatBackend> ChatReconciler<B> {
    /// Create a reconciler publishing updates on `updates`
    pub fn new(backend: Arc<B>, updates: mpsc::Sender<ChatUpdate>) -> Self {
        Self {
            backend,
            session_name_max_chars: DEFAULT_SESSION_NAME_MAX_CHARS,
            updates,
        }
    }

    /// Set the cut-off for derived session names
    #[must_use]
    pub fn with_session_name_max_chars(mut self, max_chars: usize) -> Self {
        self.session_name_max_chars = max_chars;
        self
    }

    /// Backend handle
    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    async fn send(&self, update: ChatUpdate) {
        if self.updates.send(update).await.is_err() {
            tracing::debug!("Update receiver dropped");
        }
    }

    async fn notify(&self, level: NotifyLevel, message: impl Into<String>) {
        self.send(ChatUpdate::notify(level, message)).await;
    }

    async fn publish(&self, state: &mut ConversationState, history: Vec<Message>) {
        state.replace_history(history.clone());
        self.send(ChatUpdate::HistoryUpdated { history }).await;
    }

    async fn display_documents(&self, state: &mut ConversationState, display: DocumentDisplay) {
        state.set_document_display(display);
        self.send(ChatUpdate::DocumentDisplayChanged { display }).await;
    }

    // ------------------------------------------------------------------
    // Exchanges
    // ------------------------------------------------------------------

    /// Start an exchange
    ///
    /// Creates the session if needed, moves the state to Streaming and
    /// publishes the optimistic user turn.
    ///
    /// # Errors
    ///
    /// - [`ChatError::ExchangeInProgress`] if the state is not Idle
    /// - [`ChatError::StaleHistory`] if the resend id is not in history
    /// - any backend error from session creation
    ///
    /// None of these change the history.
    pub async fn begin(
        &self,
        state: &mut ConversationState,
        request: SubmitRequest,
    ) -> Result<Exchange, ChatError> {
        if state.is_streaming() {
            return Err(ChatError::ExchangeInProgress);
        }

        let (working_history, message) = match request.message_id_to_resend {
            Some(message_id) => match truncate_for_resend(state.history(), message_id) {
                Ok((prefix, resent)) => (prefix.to_vec(), resent.message.clone()),
                Err(e) => {
                    tracing::warn!(%message_id, "Resend target missing from history");
                    self.notify(NotifyLevel::Error, STALE_RESEND_MESSAGE).await;
                    return Err(e);
                }
            },
            None => (
                state.history().to_vec(),
                request
                    .message
                    .unwrap_or_else(|| state.input().to_string()),
            ),
        };

        let (session_id, is_new_session) = match state.session_id() {
            Some(id) => (id, false),
            None => {
                let id = self.backend.create_session(state.persona_id()).await?;
                (id, true)
            }
        };
        let location_at_start = state.current_location();
        state.set_session_id(session_id);

        let cancel = state.begin_exchange()?;
        let selected_documents = state.selected_documents().documents().to_vec();

        let stream_request = StreamRequest {
            message: message.clone(),
            parent_message_id: last_successful_message_id(&working_history),
            session_id,
            prompt_id: state.prompt_id(),
            filters: state.filters().clone(),
            selected_document_ids: state.selected_documents().db_doc_ids(),
            query_override: request.query_override,
            force_search: request.force_search,
        };

        tracing::info!(
            session_id = %session_id,
            is_new_session,
            resend = request.message_id_to_resend.is_some(),
            force_search = stream_request.force_search,
            "Starting exchange"
        );

        let mut optimistic = working_history.clone();
        optimistic.push(Message::pending_user(message.clone()));
        self.publish(state, optimistic).await;
        state.clear_input();
        self.send(ChatUpdate::StreamingChanged { streaming: true })
            .await;

        Ok(Exchange {
            session_id,
            is_new_session,
            message,
            working_history,
            request: stream_request,
            cancel,
            location_at_start,
            selected_documents,
        })
    }

    /// Stream an exchange to its end
    ///
    /// Transport errors never escape: they become an error turn and the
    /// outcome is [`ExchangeOutcome::Failed`].
    pub async fn run(&self, state: &mut ConversationState, exchange: Exchange) -> ExchangeOutcome {
        let mut acc = Accumulator::new(&exchange.selected_documents);

        let outcome = match self.stream(state, &exchange, &mut acc).await {
            Ok(StreamEnd::Completed) => {
                self.complete(state, &exchange, &acc).await;
                ExchangeOutcome::Completed
            }
            Ok(StreamEnd::Cancelled) => ExchangeOutcome::Cancelled,
            Err(e) => {
                tracing::warn!(session_id = %exchange.session_id, error = %e, "Exchange failed");
                let mut history = exchange.working_history.clone();
                history.push(Message::pending_user(exchange.message.clone()));
                history.push(Message::error(e.display_message()));
                self.publish(state, history).await;
                ExchangeOutcome::Failed
            }
        };

        state.finish_exchange();
        self.send(ChatUpdate::StreamingChanged { streaming: false })
            .await;

        tracing::info!(
            session_id = %exchange.session_id,
            outcome = ?outcome,
            message_id = ?acc.final_message_id(),
            "Exchange finished"
        );
        outcome
    }

    /// Start and run an exchange
    ///
    /// # Errors
    ///
    /// Only the errors of [`Self::begin`].
    pub async fn submit(
        &self,
        state: &mut ConversationState,
        request: SubmitRequest,
    ) -> Result<ExchangeOutcome, ChatError> {
        let exchange = self.begin(state, request).await?;
        Ok(self.run(state, exchange).await)
    }

    async fn stream(
        &self,
        state: &mut ConversationState,
        exchange: &Exchange,
        acc: &mut Accumulator,
    ) -> Result<StreamEnd, ChatError> {
        let mut packets = self
            .backend
            .open(&exchange.request, exchange.cancel.clone())
            .await?;

        while let Some(batch) = packets.recv().await {
            let batch = batch?;

            tracing::debug!(packets = batch.len(), "Folding packet batch");
            let mut retrieved = false;
            for packet in batch {
                retrieved |= acc.fold(packet);
            }
            if retrieved {
                self.display_documents(state, DocumentDisplay::Latest).await;
            }

            let snapshot = acc.snapshot(&exchange.working_history, &exchange.message);
            self.publish(state, snapshot).await;

            if exchange.cancel.is_cancelled() {
                tracing::info!(session_id = %exchange.session_id, "Exchange cancelled");
                state.mark_cancelling();
                return Ok(StreamEnd::Cancelled);
            }
        }

        if exchange.cancel.is_cancelled() {
            state.mark_cancelling();
            return Ok(StreamEnd::Cancelled);
        }
        Ok(StreamEnd::Completed)
    }

    async fn complete(&self, state: &mut ConversationState, exchange: &Exchange, acc: &Accumulator) {
        if exchange.is_new_session {
            if let Some(message_id) = acc.final_message_id() {
                self.display_documents(state, DocumentDisplay::Message(message_id))
                    .await;
            }

            let name = derive_session_name(&exchange.message, self.session_name_max_chars);
            if let Err(e) = self.backend.rename_session(exchange.session_id, &name).await {
                tracing::warn!(session_id = %exchange.session_id, error = %e, "Failed to name session");
                self.notify(
                    NotifyLevel::Warning,
                    format!("Failed to name chat session - {}", e.display_message()),
                )
                .await;
            }

            let location = state.current_location();
            if location == exchange.location_at_start || location == Some(exchange.session_id) {
                self.send(ChatUpdate::navigate(exchange.session_id)).await;
            } else {
                tracing::debug!(
                    session_id = %exchange.session_id,
                    location = ?location,
                    "User navigated away, not switching pages"
                );
            }
        }

        if acc.should_display_documents() {
            if let Some(message_id) = acc.final_message_id() {
                self.display_documents(state, DocumentDisplay::Message(message_id))
                    .await;
            }
        }
    }

    /// The user turn before the latest answer, if there is one
    fn previous_message(state: &ConversationState) -> Option<&Message> {
        let history = state.history();
        history.len().checked_sub(2).and_then(|i| history.get(i))
    }

    /// Build the resend that edits the latest answer's search query
    ///
    /// # Errors
    ///
    /// [`ChatError::QueryEditUnavailable`] when the question behind the
    /// latest answer is missing or still pending, after a notification.
    pub async fn prepare_edit_query(
        &self,
        state: &ConversationState,
        new_query: impl Into<String>,
    ) -> Result<SubmitRequest, ChatError> {
        match Self::previous_message(state) {
            None => {
                self.notify(NotifyLevel::Error, EDIT_FIRST_MESSAGE).await;
                Err(ChatError::QueryEditUnavailable("first message"))
            }
            Some(Message {
                message_id: None, ..
            }) => {
                self.notify(NotifyLevel::Error, EDIT_PENDING_MESSAGE).await;
                Err(ChatError::QueryEditUnavailable("pending message"))
            }
            Some(Message {
                message_id: Some(id),
                ..
            }) => Ok(SubmitRequest::resend(*id).with_query_override(new_query)),
        }
    }

    /// Resend the question behind the latest answer with a new search query
    ///
    /// # Errors
    ///
    /// The errors of [`Self::prepare_edit_query`] and [`Self::begin`].
    pub async fn edit_query(
        &self,
        state: &mut ConversationState,
        new_query: impl Into<String>,
    ) -> Result<ExchangeOutcome, ChatError> {
        if state.is_streaming() {
            return Err(ChatError::ExchangeInProgress);
        }
        let request = self.prepare_edit_query(state, new_query).await?;
        self.submit(state, request).await
    }

    /// Build the resend that forces a search for the latest answer
    ///
    /// # Errors
    ///
    /// [`ChatError::ForceSearchUnavailable`] when there is no persisted
    /// question to resend, after a notification.
    pub async fn prepare_force_search(
        &self,
        state: &ConversationState,
    ) -> Result<SubmitRequest, ChatError> {
        match Self::previous_message(state).and_then(|m| m.message_id) {
            Some(message_id) => Ok(SubmitRequest::resend(message_id).with_force_search()),
            None => {
                self.notify(NotifyLevel::Error, FORCE_SEARCH_MESSAGE).await;
                Err(ChatError::ForceSearchUnavailable)
            }
        }
    }

    /// Resend the question behind the latest answer, forcing a search
    ///
    /// # Errors
    ///
    /// The errors of [`Self::prepare_force_search`] and [`Self::begin`].
    pub async fn force_search(
        &self,
        state: &mut ConversationState,
    ) -> Result<ExchangeOutcome, ChatError> {
        if state.is_streaming() {
            return Err(ChatError::ExchangeInProgress);
        }
        let request = self.prepare_force_search(state).await?;
        self.submit(state, request).await
    }

    // ------------------------------------------------------------------
    // Sessions, feedback, budgets
    // ------------------------------------------------------------------

    /// Show a stored session, or a fresh conversation with `None`
    ///
    /// Selects the session's persona from `personas` and points the
    /// documents panel at the latest message.
    ///
    /// # Errors
    ///
    /// Backend errors from fetching the session. The state is left on the
    /// previous session when this fails.
    pub async fn load_session(
        &self,
        state: &mut ConversationState,
        session_id: Option<SessionId>,
        personas: &[Persona],
    ) -> Result<(), ChatError> {
        let Some(session_id) = session_id else {
            state.switch_session(None);
            self.publish(state, Vec::new()).await;
            self.display_documents(state, DocumentDisplay::Hidden).await;
            return Ok(());
        };

        let session = match self.backend.get_session(session_id).await {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!(%session_id, error = %e, "Could not load chat session");
                return Err(e);
            }
        };
        state.switch_session(Some(session_id));

        let persona = personas
            .iter()
            .find(|p| p.id == session.persona_id)
            .cloned();
        if persona.is_none() {
            tracing::debug!(persona_id = session.persona_id.0, "Session persona not available");
        }
        state.set_persona(persona);

        let history = crate::history::process_raw_chat_history(&session.messages);
        let display = match history.last().and_then(|m| m.message_id) {
            Some(id) => DocumentDisplay::Message(id),
            None => DocumentDisplay::Hidden,
        };
        tracing::info!(%session_id, messages = history.len(), "Loaded chat session");

        self.publish(state, history).await;
        self.display_documents(state, display).await;
        self.refresh_max_tokens(state).await;
        Ok(())
    }

    /// The user's sessions, newest first
    ///
    /// # Errors
    ///
    /// Backend errors from the listing.
    pub async fn list_sessions(&self) -> Result<Vec<ChatSessionSummary>, ChatError> {
        let mut sessions = self.backend.list_sessions().await?;
        sort_sessions(&mut sessions);
        Ok(sessions)
    }

    /// Rename a session on the user's request
    ///
    /// # Errors
    ///
    /// The backend error, after an error notification.
    pub async fn rename_session(&self, session_id: SessionId, name: &str) -> Result<(), ChatError> {
        match self.backend.rename_session(session_id, name).await {
            Ok(()) => {
                tracing::info!(%session_id, name, "Renamed chat session");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(%session_id, error = %e, "Session rename failed");
                self.notify(NotifyLevel::Error, RENAME_FAILED_MESSAGE).await;
                Err(e)
            }
        }
    }

    /// Delete a session
    ///
    /// Deleting the session on screen moves to a fresh conversation.
    ///
    /// # Errors
    ///
    /// The backend error, after an error notification. The state is
    /// untouched in that case.
    pub async fn delete_session(
        &self,
        state: &mut ConversationState,
        session_id: SessionId,
    ) -> Result<(), ChatError> {
        if let Err(e) = self.backend.delete_session(session_id).await {
            tracing::warn!(%session_id, error = %e, "Session delete failed");
            self.notify(NotifyLevel::Error, DELETE_FAILED_MESSAGE).await;
            return Err(e);
        }

        if state.session_id() == Some(session_id) {
            self.load_session(state, None, &[]).await?;
        }
        Ok(())
    }

    /// Personas offered for chat, visible ones in display order
    ///
    /// # Errors
    ///
    /// Backend errors from the persona listing.
    pub async fn load_personas(&self) -> Result<Vec<Persona>, ChatError> {
        let personas = chat_personas(self.backend.list_personas().await?);
        tracing::debug!(count = personas.len(), "Loaded personas");
        Ok(personas)
    }

    /// Submit like/dislike feedback on an answer
    ///
    /// Does nothing before the conversation has a session.
    ///
    /// # Errors
    ///
    /// The backend error, after a notification carrying its detail.
    pub async fn submit_feedback(
        &self,
        state: &ConversationState,
        message_id: MessageId,
        feedback: FeedbackType,
        details: &str,
    ) -> Result<(), ChatError> {
        if state.session_id().is_none() {
            return Ok(());
        }

        match self
            .backend
            .submit_feedback(message_id, feedback, details)
            .await
        {
            Ok(()) => {
                self.notify(NotifyLevel::Success, "Thanks for your feedback!")
                    .await;
                Ok(())
            }
            Err(e) => {
                tracing::warn!(%message_id, error = %e, "Feedback submission failed");
                self.notify(
                    NotifyLevel::Error,
                    format!("Failed to submit feedback - {}", e.display_message()),
                )
                .await;
                Err(e)
            }
        }
    }

    /// Fetch the active persona's document token budget
    ///
    /// Keeps the current budget if the lookup fails. Returns the budget in
    /// effect afterwards.
    pub async fn refresh_max_tokens(&self, state: &mut ConversationState) -> u32 {
        match self
            .backend
            .max_selected_document_tokens(state.persona_id())
            .await
        {
            Ok(max_tokens) => state.set_max_document_tokens(max_tokens),
            Err(e) => {
                tracing::warn!(error = %e, "Could not fetch document token budget");
            }
        }
        state.max_document_tokens()
    }
}
