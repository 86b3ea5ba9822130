//! Chat Backend Integration
//!
//! Abstracted access to the chat backend through the service traits the
//! reconciler depends on.
//!
//! # Usage
//!
//! ```ignore
//! use pridox_client_core::backend::{HttpBackend, StreamRequest, StreamSource};
//! use tokio_util::sync::CancellationToken;
//!
//! let backend = HttpBackend::from_config(&config)?;
//! let request = StreamRequest::new("What changed in the Q3 roadmap?", session_id);
//! let mut packets = backend.open(&request, CancellationToken::new()).await?;
//! ```

mod http;
mod traits;

pub use http::HttpBackend;
pub use traits::{
    ChatBackend, FeedbackService, PacketStream, PersonaService, RunSearch, SessionService,
    StreamRequest, StreamSource,
};
