//! Terminal rendering of chat updates
//!
//! Turns the snapshot stream into incremental terminal output: only the
//! newly streamed part of the answer is written for each snapshot. The
//! answer's sources follow once streaming stops.

use pridox_client_core::{
    remove_duplicate_docs, ChatUpdate, Document, Message, MessageRole, NotifyLevel,
};

/// Sources of the latest answer: its citations, or every retrieved document
pub fn answer_sources(history: &[Message]) -> Vec<Document> {
    let Some(answer) = history
        .last()
        .filter(|m| m.role == MessageRole::Assistant)
    else {
        return Vec::new();
    };

    let cited = answer.cited_documents();
    if cited.is_empty() {
        remove_duplicate_docs(&answer.documents)
    } else {
        cited
    }
}

/// Numbered source list, empty when there are no sources
pub fn format_sources(sources: &[Document]) -> String {
    if sources.is_empty() {
        return String::new();
    }

    let mut out = String::from("Sources:\n");
    for (i, doc) in sources.iter().enumerate() {
        let title = doc
            .semantic_identifier
            .as_deref()
            .unwrap_or(doc.document_id.as_str());
        match doc.link {
            Some(ref link) => out.push_str(&format!("  [{}] {title} <{link}>\n", i + 1)),
            None => out.push_str(&format!("  [{}] {title}\n", i + 1)),
        }
    }
    out
}

/// Tracks what has already been written for the current exchange
#[derive(Debug, Default)]
pub struct Renderer {
    /// Bytes of the current answer already written
    printed: usize,
    /// Whether the current exchange's error turn was written
    error_shown: bool,
    /// Sources of the answer streamed so far
    sources: Vec<Document>,
}

impl Renderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Text to write for an update, if any
    pub fn render(&mut self, update: &ChatUpdate) -> Option<String> {
        match update {
            ChatUpdate::HistoryUpdated { history } => self.render_history(history),
            ChatUpdate::StreamingChanged { streaming: true } => {
                self.reset();
                None
            }
            ChatUpdate::StreamingChanged { streaming: false } => {
                let mut out = String::new();
                if self.printed > 0 {
                    out.push('\n');
                }
                out.push_str(&format_sources(&self.sources));
                self.reset();
                (!out.is_empty()).then_some(out)
            }
            ChatUpdate::Notify { level, message } => {
                Some(format!("[{}] {message}\n", level_label(*level)))
            }
            ChatUpdate::Navigate { .. } | ChatUpdate::DocumentDisplayChanged { .. } => None,
        }
    }

    fn reset(&mut self) {
        self.printed = 0;
        self.error_shown = false;
        self.sources.clear();
    }

    fn render_history(&mut self, history: &[Message]) -> Option<String> {
        let Some(last) = history.last() else {
            self.reset();
            return None;
        };

        match last.role {
            MessageRole::User => {
                self.reset();
                None
            }
            MessageRole::Assistant => {
                // Answers only grow within an exchange; anything else is a new answer
                let delta = last
                    .message
                    .get(self.printed..)
                    .unwrap_or(last.message.as_str());
                self.printed = last.message.len();
                self.sources = answer_sources(history);
                (!delta.is_empty()).then(|| delta.to_string())
            }
            MessageRole::Error => {
                if self.error_shown {
                    return None;
                }
                self.error_shown = true;
                self.sources.clear();
                let separator = if self.printed > 0 { "\n" } else { "" };
                Some(format!("{separator}[error] {}\n", last.message))
            }
        }
    }
}

fn level_label(level: NotifyLevel) -> &'static str {
    match level {
        NotifyLevel::Info => "info",
        NotifyLevel::Warning => "warning",
        NotifyLevel::Error => "error",
        NotifyLevel::Success => "ok",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pridox_client_core::MessageId;
    use std::collections::BTreeMap;

    fn snapshot(answer: &str) -> ChatUpdate {
        ChatUpdate::HistoryUpdated {
            history: vec![
                Message::pending_user("question"),
                Message::assistant(None, answer),
            ],
        }
    }

    #[test]
    fn test_writes_only_new_text() {
        let mut renderer = Renderer::new();
        assert_eq!(
            renderer.render(&ChatUpdate::StreamingChanged { streaming: true }),
            None
        );
        assert_eq!(renderer.render(&snapshot("Hel")).as_deref(), Some("Hel"));
        assert_eq!(renderer.render(&snapshot("Hello")).as_deref(), Some("lo"));
        assert_eq!(renderer.render(&snapshot("Hello")), None);
        assert_eq!(
            renderer
                .render(&ChatUpdate::StreamingChanged { streaming: false })
                .as_deref(),
            Some("\n")
        );
    }

    #[test]
    fn test_sources_follow_the_answer() {
        let mut answer = Message::assistant(None, "See the handbook [1]");
        answer.documents = vec![
            Document {
                semantic_identifier: Some("IT Handbook".to_string()),
                link: Some("https://wiki/it".to_string()),
                ..Document::new("it-handbook").with_db_id(40)
            },
            Document::new("faq").with_db_id(41),
        ];
        answer.citations = BTreeMap::from([("[1]".to_string(), 40)]);
        let update = ChatUpdate::HistoryUpdated {
            history: vec![Message::pending_user("question"), answer],
        };

        let mut renderer = Renderer::new();
        renderer.render(&ChatUpdate::StreamingChanged { streaming: true });
        assert_eq!(
            renderer.render(&update).as_deref(),
            Some("See the handbook [1]")
        );
        assert_eq!(
            renderer
                .render(&ChatUpdate::StreamingChanged { streaming: false })
                .as_deref(),
            Some("\nSources:\n  [1] IT Handbook <https://wiki/it>\n")
        );
    }

    #[test]
    fn test_answer_sources_without_citations_lists_retrieved_documents() {
        let mut answer = Message::assistant(None, "answer");
        answer.documents = vec![
            Document::new("a"),
            Document::new("b"),
            Document::new("a"),
        ];
        let sources = answer_sources(&[Message::pending_user("q"), answer]);
        assert_eq!(format_sources(&sources), "Sources:\n  [1] a\n  [2] b\n");
        assert!(answer_sources(&[Message::pending_user("q")]).is_empty());
    }

    #[test]
    fn test_multibyte_answer() {
        let mut renderer = Renderer::new();
        assert_eq!(renderer.render(&snapshot("Grüß")).as_deref(), Some("Grüß"));
        assert_eq!(renderer.render(&snapshot("Grüße")).as_deref(), Some("e"));
    }

    #[test]
    fn test_error_turn_written_once() {
        let mut renderer = Renderer::new();
        let update = ChatUpdate::HistoryUpdated {
            history: vec![
                Message::pending_user("question"),
                Message::error("connection refused"),
            ],
        };
        assert_eq!(
            renderer.render(&update).as_deref(),
            Some("[error] connection refused\n")
        );
        assert_eq!(renderer.render(&update), None);
    }

    #[test]
    fn test_loaded_session_prints_latest_answer() {
        let mut renderer = Renderer::new();
        let update = ChatUpdate::HistoryUpdated {
            history: vec![
                Message::user(Some(MessageId(1)), "q"),
                Message::assistant(Some(MessageId(2)), "stored answer"),
            ],
        };
        assert_eq!(renderer.render(&update).as_deref(), Some("stored answer"));
    }

    #[test]
    fn test_notification() {
        let mut renderer = Renderer::new();
        let update = ChatUpdate::notify(NotifyLevel::Success, "Thanks for your feedback!");
        assert_eq!(
            renderer.render(&update).as_deref(),
            Some("[ok] Thanks for your feedback!\n")
        );
    }
}
