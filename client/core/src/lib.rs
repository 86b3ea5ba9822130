//! Pridox Client Core - Chat Stream Reconciliation for Pridox
//!
//! This crate holds the conversation logic of the Pridox chat client,
//! independent of how the conversation is rendered. A terminal client, a
//! web view or a test harness drives it the same way.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     Rendering Surface                         │
//! │        (terminal client, web view, headless test)            │
//! └──────────────┬───────────────────────────────▲───────────────┘
//!                │ SubmitRequest / cancel          │ ChatUpdate
//! ┌──────────────▼───────────────────────────────┴───────────────┐
//! │                      CLIENT CORE                              │
//! │  ┌───────────────────┐      ┌──────────────────────────────┐ │
//! │  │ ConversationState │◀────▶│        ChatReconciler        │ │
//! │  │ history, filters, │      │ fold batches, publish        │ │
//! │  │ selection, state  │      │ snapshots, name + navigate   │ │
//! │  └───────────────────┘      └──────────────┬───────────────┘ │
//! └────────────────────────────────────────────┼─────────────────┘
//!                                              │ ChatBackend
//!                       ┌──────────────────────▼─────────────────┐
//!                       │ HttpBackend (NDJSON packet stream)     │
//!                       └────────────────────────────────────────┘
//! ```
//!
//! # Key Types
//!
//! - [`ChatReconciler`]: runs one exchange at a time and publishes history snapshots
//! - [`ConversationState`]: the owned state of one chat view
//! - [`StreamPacket`]: one packet of a streamed answer
//! - [`ChatUpdate`]: what a rendering surface receives
//! - [`HttpBackend`]: the production [`ChatBackend`]
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use pridox_client_core::{
//!     load_config, ChatReconciler, ConversationState, HttpBackend, SubmitRequest,
//! };
//! use tokio::sync::{mpsc, watch};
//!
//! let config = load_config()?;
//! let backend = Arc::new(HttpBackend::from_config(&config)?);
//! let (tx, mut rx) = mpsc::channel(100);
//! let (_location_tx, location_rx) = watch::channel(None);
//!
//! let reconciler = ChatReconciler::new(backend, tx);
//! let mut state = ConversationState::new(location_rx, config.default_max_document_tokens);
//!
//! reconciler
//!     .submit(&mut state, SubmitRequest::message("What is our PTO policy?"))
//!     .await?;
//! ```
//!
//! # Module Overview
//!
//! - [`backend`]: service traits and the HTTP implementation
//! - [`config`]: client configuration loading
//! - [`conversation`]: conversation state and the exchange state machine
//! - [`documents`]: documents, deduplication, selection budget
//! - [`error`]: error types
//! - [`filters`]: retrieval filters
//! - [`history`]: transcript model and lookups
//! - [`messages`]: ids, shared enums, surface updates
//! - [`packets`]: stream packets and NDJSON decoding
//! - [`personas`]: personas and their ordering
//! - [`reconciler`]: the chat stream reconciler
//! - [`session`]: session payloads, ordering and naming

#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod backend;
pub mod config;
pub mod conversation;
pub mod documents;
pub mod error;
pub mod filters;
pub mod history;
pub mod messages;
pub mod packets;
pub mod personas;
pub mod reconciler;
pub mod session;

// Re-exports for convenience
pub use backend::{
    ChatBackend, FeedbackService, HttpBackend, PacketStream, PersonaService, RunSearch,
    SessionService, StreamRequest, StreamSource,
};
pub use conversation::{ConversationState, ExchangeState};
pub use documents::{cited_documents, remove_duplicate_docs, Document, DocumentSelection};
pub use error::ChatError;
pub use filters::{build_filters, Filters, Tag, TimeRange};
pub use history::{
    human_and_ai_from_message_number, last_successful_message_id, BackendMessage, Message,
    MessagePair, MessageTarget,
};
pub use messages::{
    ChatUpdate, DocumentDisplay, FeedbackType, MessageId, MessageRole, NotifyLevel, PersonaId,
    PromptId, RetrievalType, SessionId,
};
pub use packets::{PacketBatch, PacketDecoder, StreamPacket};
pub use personas::{chat_personas, sort_personas, Persona, Prompt};
pub use reconciler::{ChatReconciler, Exchange, ExchangeOutcome, SubmitRequest};
pub use session::{derive_session_name, sort_sessions, BackendChatSession, ChatSessionSummary};

// Config exports
pub use config::{
    default_config_path, load_config, load_config_from_path, ClientConfig, ConfigError,
    ConfigOverrides, ConfigSource,
};
