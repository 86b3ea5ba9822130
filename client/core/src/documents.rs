//! Retrieved Documents
//!
//! Document references attached to assistant turns, plus the small list
//! transformations the chat views need: deduplication, citation lookup,
//! and the token budget for explicitly selected documents.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

/// Tokens kept free when selecting documents, so the question still fits
pub const DEFAULT_TOKEN_RESERVE: u32 = 75;

/// A reference to a retrieved document
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Connector-level document identifier (used for deduplication)
    pub document_id: String,
    /// Database id, used for citations and explicit selection
    #[serde(default)]
    pub db_doc_id: Option<i64>,
    /// Human-readable title
    #[serde(default)]
    pub semantic_identifier: Option<String>,
    /// Link to the source
    #[serde(default)]
    pub link: Option<String>,
    /// Matching excerpt
    #[serde(default)]
    pub blurb: String,
    /// Connector the document came from
    #[serde(default)]
    pub source_type: Option<String>,
    /// Retrieval score
    #[serde(default)]
    pub score: Option<f64>,
    /// Token count of the document when used as context
    #[serde(default)]
    pub token_count: Option<u32>,
}

impl Document {
    /// Create a document reference with only an id
    pub fn new(document_id: impl Into<String>) -> Self {
        Self {
            document_id: document_id.into(),
            db_doc_id: None,
            semantic_identifier: None,
            link: None,
            blurb: String::new(),
            source_type: None,
            score: None,
            token_count: None,
        }
    }

    /// Set the database id
    #[must_use]
    pub fn with_db_id(mut self, db_doc_id: i64) -> Self {
        self.db_doc_id = Some(db_doc_id);
        self
    }

    /// Set the token count
    #[must_use]
    pub fn with_tokens(mut self, token_count: u32) -> Self {
        self.token_count = Some(token_count);
        self
    }
}

/// Keep only the first occurrence of each document id, preserving order
///
/// Documents with an empty id are dropped.
#[must_use]
pub fn remove_duplicate_docs(documents: &[Document]) -> Vec<Document> {
    let mut seen = HashSet::new();
    documents
        .iter()
        .filter(|&doc| !doc.document_id.is_empty() && seen.insert(doc.document_id.as_str()))
        .cloned()
        .collect()
}

/// Documents referenced by a citation map, deduplicated
///
/// Citation values are database ids; citations pointing at documents that
/// are not attached to the turn are skipped.
#[must_use]
pub fn cited_documents(documents: &[Document], citations: &BTreeMap<String, i64>) -> Vec<Document> {
    let cited: HashSet<i64> = citations.values().copied().collect();
    let matching: Vec<Document> = documents
        .iter()
        .filter(|doc| doc.db_doc_id.is_some_and(|id| cited.contains(&id)))
        .cloned()
        .collect();
    remove_duplicate_docs(&matching)
}

/// Documents the user picked to answer from, with their token cost
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DocumentSelection {
    selected: Vec<Document>,
}

impl DocumentSelection {
    /// Create an empty selection
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Select a document, or deselect it if it is already selected
    ///
    /// Returns whether the document is selected afterwards.
    pub fn toggle(&mut self, document: Document) -> bool {
        if let Some(pos) = self
            .selected
            .iter()
            .position(|d| d.document_id == document.document_id)
        {
            self.selected.remove(pos);
            false
        } else {
            self.selected.push(document);
            true
        }
    }

    /// Clear the selection
    pub fn clear(&mut self) {
        self.selected.clear();
    }

    /// Currently selected documents
    #[must_use]
    pub fn documents(&self) -> &[Document] {
        &self.selected
    }

    /// Whether nothing is selected
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    /// Database ids of the selection, skipping documents without one
    #[must_use]
    pub fn db_doc_ids(&self) -> Vec<i64> {
        self.selected.iter().filter_map(|d| d.db_doc_id).collect()
    }

    /// Total tokens of the selection
    #[must_use]
    pub fn total_tokens(&self) -> u32 {
        self.selected
            .iter()
            .map(|d| d.token_count.unwrap_or(0))
            .sum()
    }

    /// Whether the selection leaves less than `reserve` tokens of `max_tokens`
    #[must_use]
    pub fn token_limit_reached(&self, max_tokens: u32, reserve: u32) -> bool {
        self.total_tokens() > max_tokens.saturating_sub(reserve)
    }

    /// Tokens over the budget (0 when within it)
    #[must_use]
    pub fn tokens_over(&self, max_tokens: u32) -> u32 {
        self.total_tokens().saturating_sub(max_tokens)
    }
}
