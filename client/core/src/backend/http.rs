//! HTTP Backend Implementation
//!
//! Chat backend over the product's JSON API.
//!
//! # Endpoints
//!
//! - `POST /api/chat/create-chat-session` - start a session for a persona
//! - `GET  /api/chat/get-user-chat-sessions` - the user's sessions
//! - `GET  /api/chat/get-chat-session/{id}` - session with stored messages
//! - `PUT  /api/chat/rename-chat-session` - persist a session name
//! - `DELETE /api/chat/delete-chat-session/{id}` - drop a session
//! - `POST /api/chat/send-message` - newline-delimited JSON packet stream
//! - `POST /api/chat/create-chat-message-feedback` - answer feedback
//! - `GET  /api/chat/max-selected-document-tokens` - selection token budget
//! - `GET  /api/persona?include_default=true` - personas
//!
//! The answer stream is read on a spawned task that decodes each transport
//! chunk into a packet batch and forwards it over a channel.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::traits::{
    FeedbackService, PacketStream, PersonaService, SessionService, StreamRequest, StreamSource,
};
use crate::config::ClientConfig;
use crate::error::ChatError;
use crate::messages::{FeedbackType, MessageId, PersonaId, SessionId};
use crate::packets::PacketDecoder;
use crate::personas::Persona;
use crate::session::{BackendChatSession, ChatSessionSummary};

/// HTTP chat backend client
#[derive(Clone)]
pub struct HttpBackend {
    /// Base URL without trailing slash
    base_url: String,
    /// Timeout for request/response calls (not the answer stream)
    request_timeout: Duration,
    /// Batches buffered between the reader task and the consumer
    channel_capacity: usize,
    /// HTTP client
    http_client: reqwest::Client,
}

#[derive(Deserialize)]
struct CreateSessionResponse {
    chat_session_id: SessionId,
}

#[derive(Deserialize)]
struct SessionListResponse {
    sessions: Vec<ChatSessionSummary>,
}

#[derive(Deserialize)]
struct MaxTokensResponse {
    max_tokens: u32,
}

impl HttpBackend {
    /// Create a new backend client
    ///
    /// # Errors
    ///
    /// [`ChatError::Http`] if the HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        request_timeout: Duration,
        channel_capacity: usize,
    ) -> Result<Self, ChatError> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            request_timeout,
            channel_capacity: channel_capacity.max(1),
            http_client,
        })
    }

    /// Create from a loaded [`ClientConfig`]
    ///
    /// # Errors
    ///
    /// [`ChatError::Http`] if the HTTP client cannot be built.
    pub fn from_config(config: &ClientConfig) -> Result<Self, ChatError> {
        Self::new(
            config.api_url.clone(),
            config.request_timeout,
            config.stream_channel_capacity,
        )
    }

    /// Build a chat endpoint URL
    fn url(&self, path: &str) -> String {
        self.api_url(&format!("chat/{path}"))
    }

    /// Build a URL anywhere under `/api`
    fn api_url(&self, path: &str) -> String {
        format!("{}/api/{path}", self.base_url)
    }

    /// Turn a non-success response into [`ChatError::Backend`]
    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ChatError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(ChatError::Backend {
            status: status.as_u16(),
            detail: error_detail(&body),
        })
    }
}

/// Extract a readable message from an error body
///
/// Prefers the JSON `detail` field, then `message`, then the raw body.
fn error_detail(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.get("detail")
                .or_else(|| v.get("message"))
                .and_then(Value::as_str)
                .map(String::from)
        })
        .unwrap_or_else(|| body.trim().to_string())
}

/// JSON body for the send-message endpoint
fn send_message_body(request: &StreamRequest) -> Value {
    let search_doc_ids = if request.selected_document_ids.is_empty() {
        Value::Null
    } else {
        json!(request.selected_document_ids)
    };

    json!({
        "chat_session_id": request.session_id,
        "parent_message_id": request.parent_message_id,
        "message": request.message,
        "prompt_id": request.prompt_id,
        "search_doc_ids": search_doc_ids,
        "retrieval_options": {
            "run_search": request.run_search(),
            "real_time": true,
            "filters": request.filters,
        },
        "query_override": request.query_override,
    })
}

#[async_trait]
impl SessionService for HttpBackend {
    async fn create_session(&self, persona_id: PersonaId) -> Result<SessionId, ChatError> {
        let response = self
            .http_client
            .post(self.url("create-chat-session"))
            .timeout(self.request_timeout)
            .json(&json!({ "persona_id": persona_id }))
            .send()
            .await?;

        let created: CreateSessionResponse = Self::check_status(response).await?.json().await?;
        tracing::info!(session_id = %created.chat_session_id, "Created chat session");
        Ok(created.chat_session_id)
    }

    async fn list_sessions(&self) -> Result<Vec<ChatSessionSummary>, ChatError> {
        let response = self
            .http_client
            .get(self.url("get-user-chat-sessions"))
            .timeout(self.request_timeout)
            .send()
            .await?;

        let body: SessionListResponse = Self::check_status(response).await?.json().await?;
        Ok(body.sessions)
    }

    async fn get_session(&self, session_id: SessionId) -> Result<BackendChatSession, ChatError> {
        let response = self
            .http_client
            .get(self.url(&format!("get-chat-session/{session_id}")))
            .timeout(self.request_timeout)
            .send()
            .await?;

        Ok(Self::check_status(response).await?.json().await?)
    }

    async fn rename_session(&self, session_id: SessionId, name: &str) -> Result<(), ChatError> {
        let response = self
            .http_client
            .put(self.url("rename-chat-session"))
            .timeout(self.request_timeout)
            .json(&json!({ "chat_session_id": session_id, "name": name }))
            .send()
            .await?;

        Self::check_status(response).await?;
        Ok(())
    }

    async fn delete_session(&self, session_id: SessionId) -> Result<(), ChatError> {
        let response = self
            .http_client
            .delete(self.url(&format!("delete-chat-session/{session_id}")))
            .timeout(self.request_timeout)
            .send()
            .await?;

        Self::check_status(response).await?;
        tracing::info!(%session_id, "Deleted chat session");
        Ok(())
    }

    async fn max_selected_document_tokens(&self, persona_id: PersonaId) -> Result<u32, ChatError> {
        let response = self
            .http_client
            .get(self.url("max-selected-document-tokens"))
            .timeout(self.request_timeout)
            .query(&[("persona_id", persona_id.0)])
            .send()
            .await?;

        let body: MaxTokensResponse = Self::check_status(response).await?.json().await?;
        Ok(body.max_tokens)
    }
}

#[async_trait]
impl PersonaService for HttpBackend {
    async fn list_personas(&self) -> Result<Vec<Persona>, ChatError> {
        let response = self
            .http_client
            .get(self.api_url("persona"))
            .timeout(self.request_timeout)
            .query(&[("include_default", true)])
            .send()
            .await?;

        Ok(Self::check_status(response).await?.json().await?)
    }
}

#[async_trait]
impl StreamSource for HttpBackend {
    async fn open(
        &self,
        request: &StreamRequest,
        cancel: CancellationToken,
    ) -> Result<PacketStream, ChatError> {
        let (tx, rx) = mpsc::channel(self.channel_capacity);

        let response = self
            .http_client
            .post(self.url("send-message"))
            .json(&send_message_body(request))
            .send()
            .await?;
        let mut stream = Self::check_status(response).await?.bytes_stream();

        tokio::spawn(async move {
            let mut decoder = PacketDecoder::new();

            loop {
                let chunk = tokio::select! {
                    biased;
                    () = cancel.cancelled() => {
                        tracing::debug!("Packet stream cancelled, dropping transport");
                        return;
                    }
                    chunk = stream.next() => chunk,
                };

                match chunk {
                    Some(Ok(bytes)) => match decoder.push(&bytes) {
                        Ok(batch) if batch.is_empty() => {}
                        Ok(batch) => {
                            if tx.send(Ok(batch)).await.is_err() {
                                // Receiver dropped, stop streaming
                                return;
                            }
                        }
                        Err(e) => {
                            let _ = tx.send(Err(e)).await;
                            return;
                        }
                    },
                    Some(Err(e)) => {
                        let _ = tx.send(Err(ChatError::Http(e))).await;
                        return;
                    }
                    None => break,
                }
            }

            match decoder.finish() {
                Ok(batch) if batch.is_empty() => {}
                Ok(batch) => {
                    let _ = tx.send(Ok(batch)).await;
                }
                Err(e) => {
                    let _ = tx.send(Err(e)).await;
                }
            }
        });

        Ok(rx)
    }
}

#[async_trait]
impl FeedbackService for HttpBackend {
    async fn submit_feedback(
        &self,
        message_id: MessageId,
        feedback: FeedbackType,
        details: &str,
    ) -> Result<(), ChatError> {
        let feedback_text = (!details.is_empty()).then_some(details);
        let response = self
            .http_client
            .post(self.url("create-chat-message-feedback"))
            .timeout(self.request_timeout)
            .json(&json!({
                "chat_message_id": message_id,
                "is_positive": feedback.is_positive(),
                "feedback_text": feedback_text,
            }))
            .send()
            .await?;

        Self::check_status(response).await?;
        Ok(())
    }
}
