//! Stream Packets
//!
//! The backend streams an answer as newline-delimited JSON objects. Each
//! object is one of four shapes, told apart by which field it carries.
//! [`StreamPacket`] makes the shapes an explicit tagged union so the fold
//! step can match exhaustively.
//!
//! # Classification precedence
//!
//! A raw object that carries fields of several shapes is classified by the
//! most authoritative one:
//!
//! ```text
//! message_id  >  top_documents  >  error  >  answer_piece
//! ```
//!
//! # Batches
//!
//! Whatever arrives in one transport chunk forms a [`PacketBatch`]. The
//! reconciler folds a whole batch before publishing a new snapshot.

use serde::Deserialize;
use serde_json::Value;

use crate::documents::Document;
use crate::error::ChatError;
use crate::history::BackendMessage;

/// Packets delivered together by the stream source
pub type PacketBatch = Vec<StreamPacket>;

/// One packet of a streamed answer
#[derive(Clone, Debug, PartialEq)]
pub enum StreamPacket {
    /// Text to append to the running answer
    AnswerPiece(String),
    /// Final retrieval result for this exchange
    RetrievedDocuments {
        /// Documents in rank order
        top_documents: Vec<Document>,
        /// Query the backend actually searched with
        rephrased_query: Option<String>,
    },
    /// Backend-reported terminal error
    Error(String),
    /// Persisted message with authoritative ids, query and documents
    FinalMessage(BackendMessage),
}

#[derive(Deserialize)]
struct DocumentsPayload {
    #[serde(default)]
    top_documents: Option<Vec<Document>>,
    #[serde(default)]
    rephrased_query: Option<String>,
}

impl StreamPacket {
    /// Classify a raw JSON packet
    ///
    /// Returns `Ok(None)` for objects matching no known shape.
    ///
    /// # Errors
    ///
    /// [`ChatError::Decode`] when the object has a known discriminating
    /// field but its payload does not deserialize.
    pub fn classify(value: Value) -> Result<Option<Self>, ChatError> {
        let Some(object) = value.as_object() else {
            return Ok(None);
        };

        if object.contains_key("message_id") {
            let message: BackendMessage = serde_json::from_value(value)?;
            return Ok(Some(Self::FinalMessage(message)));
        }

        if object.contains_key("top_documents") {
            let payload: DocumentsPayload = serde_json::from_value(value)?;
            return Ok(Some(Self::RetrievedDocuments {
                top_documents: payload.top_documents.unwrap_or_default(),
                rephrased_query: payload.rephrased_query,
            }));
        }

        // Only a non-empty error string counts; null means no error
        if let Some(text) = object
            .get("error")
            .and_then(Value::as_str)
            .filter(|text| !text.is_empty())
        {
            return Ok(Some(Self::Error(text.to_string())));
        }

        if let Some(piece) = object.get("answer_piece") {
            // A null piece marks the end of the answer text
            let text = piece.as_str().unwrap_or_default().to_string();
            return Ok(Some(Self::AnswerPiece(text)));
        }

        Ok(None)
    }
}

/// Incremental decoder for the newline-delimited packet stream
///
/// Lines may be split across transport chunks; incomplete tails are kept
/// until the rest arrives.
#[derive(Debug, Default)]
pub struct PacketDecoder {
    buffer: Vec<u8>,
}

impl PacketDecoder {
    /// Create an empty decoder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one transport chunk, returning the packets it completed
    ///
    /// # Errors
    ///
    /// [`ChatError::Decode`] when a complete line is not valid JSON.
    pub fn push(&mut self, chunk: &[u8]) -> Result<PacketBatch, ChatError> {
        self.buffer.extend_from_slice(chunk);

        let mut batch = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(packet) = Self::decode_line(&line[..pos])? {
                batch.push(packet);
            }
        }
        Ok(batch)
    }

    /// Flush whatever is left once the transport ends
    ///
    /// # Errors
    ///
    /// [`ChatError::Decode`] when the trailing data is not valid JSON.
    pub fn finish(mut self) -> Result<PacketBatch, ChatError> {
        let rest = std::mem::take(&mut self.buffer);
        Ok(Self::decode_line(&rest)?.into_iter().collect())
    }

    fn decode_line(line: &[u8]) -> Result<Option<StreamPacket>, ChatError> {
        let text = String::from_utf8_lossy(line);
        let text = text.trim();
        if text.is_empty() {
            return Ok(None);
        }

        let value: Value = serde_json::from_str(text)?;
        let packet = StreamPacket::classify(value)?;
        if packet.is_none() {
            tracing::debug!(line = %text, "Ignoring unrecognized stream packet");
        }
        Ok(packet)
    }
}
