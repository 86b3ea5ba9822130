//! Pridox Chat - Terminal Client
//!
//! Asks questions against a Pridox backend and streams the answers into
//! the terminal.
//!
//! # Usage
//!
//! ```bash
//! # One question, then exit
//! pridox-chat --persona 1 "How do I request a new laptop?"
//!
//! # Only search Slack and Confluence from the last 30 days
//! pridox-chat --source slack --source confluence --since-days 30
//!
//! # Interactive conversation
//! pridox-chat --api-url https://pridox.internal
//!
//! # Continue a stored session
//! pridox-chat --session 42
//!
//! # Verbose logging
//! RUST_LOG=debug pridox-chat
//! ```
//!
//! # Interactive commands
//!
//! - `/edit <query>`: rerun the last question with a different search query
//! - `/force`: rerun the last question with a forced search
//! - `/select <n>`: toggle source `n` of the last answer into the selection
//! - `/clear`: clear the selection
//! - `/like [details]`, `/dislike [details]`: feedback on the last answer
//! - `/sessions`: list stored sessions
//! - `/session <id>`: open a stored session
//! - `/rename <name>`: rename the current session
//! - `/delete [id]`: delete a session (the current one by default)
//! - `/personas`: list personas
//! - `/new`: start a fresh conversation
//! - `/quit`: exit
//!
//! Ctrl-C stops the answer that is currently streaming.

mod render;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use pridox_client_core::{
    build_filters, default_config_path, load_config_from_path, ChatReconciler, ChatUpdate,
    ConfigOverrides, ConversationState, DocumentSelection, ExchangeOutcome, FeedbackType,
    Filters, HttpBackend, MessageRole, Persona, PersonaId, SessionId, SubmitRequest, Tag,
    TimeRange,
};

use render::{answer_sources, Renderer};

/// Pridox Chat - terminal client for the Pridox assistant
#[derive(Parser, Debug)]
#[command(name = "pridox-chat")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Base URL of the Pridox backend
    #[arg(short = 'u', long, env = "PRIDOX_API_URL", value_name = "URL")]
    api_url: Option<String>,

    /// Configuration file path
    #[arg(short = 'c', long, env = "PRIDOX_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Request timeout in seconds
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Persona to chat with (defaults to the first listed persona)
    #[arg(short = 'p', long, value_name = "ID")]
    persona: Option<i64>,

    /// Continue a stored session
    #[arg(short = 's', long, value_name = "ID")]
    session: Option<i64>,

    /// Force a document search for the question
    #[arg(short = 'f', long)]
    force_search: bool,

    /// Only search this connector source (repeatable)
    #[arg(long = "source", value_name = "SOURCE")]
    sources: Vec<String>,

    /// Only search this document set (repeatable)
    #[arg(long = "document-set", value_name = "NAME")]
    document_sets: Vec<String>,

    /// Only search documents with this tag (repeatable)
    #[arg(long = "tag", value_name = "KEY=VALUE", value_parser = parse_tag)]
    tags: Vec<Tag>,

    /// Only search documents updated in the last N days
    #[arg(long, value_name = "DAYS")]
    since_days: Option<u32>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, env = "PRIDOX_LOG_LEVEL", default_value = "warn")]
    log_level: String,

    /// Question to ask; starts an interactive session when omitted
    message: Vec<String>,
}

impl Args {
    fn filters(&self) -> Filters {
        let time_range = self.since_days.map(TimeRange::last_days);
        build_filters(
            &self.sources,
            &self.document_sets,
            time_range.as_ref(),
            &self.tags,
        )
    }
}

fn parse_tag(raw: &str) -> Result<Tag, String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() && !value.is_empty() => Ok(Tag {
            tag_key: key.to_string(),
            tag_value: value.to_string(),
        }),
        _ => Err(format!("expected KEY=VALUE, got {raw:?}")),
    }
}

/// Initialize logging with the specified level
///
/// Logs go to stderr so answers on stdout stay clean.
fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!(
            "pridox_client={level},pridox_client_core={level}"
        ))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

/// Spawn the task that owns stdout
///
/// Chat updates and command output share one writer. Updates win when both
/// are queued, so text printed after an exchange lands after its answer.
fn spawn_renderer(
    mut updates: mpsc::Receiver<ChatUpdate>,
    mut text: mpsc::Receiver<String>,
    location: watch::Sender<Option<SessionId>>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut renderer = Renderer::new();
        let mut stdout = tokio::io::stdout();

        loop {
            let out = tokio::select! {
                biased;
                Some(update) = updates.recv() => {
                    if let ChatUpdate::Navigate { session_id, ref path } = update {
                        debug!(%session_id, path = %path, "Navigating");
                        let _ = location.send(Some(session_id));
                    }
                    renderer.render(&update)
                }
                Some(line) = text.recv() => Some(line),
                else => break,
            };

            if let Some(out) = out {
                if stdout.write_all(out.as_bytes()).await.is_err() {
                    break;
                }
                let _ = stdout.flush().await;
            }
        }
    })
}

/// Everything one terminal session needs besides the conversation state
struct Client {
    reconciler: ChatReconciler<HttpBackend>,
    personas: Vec<Persona>,
    filters: Filters,
    token_reserve: u32,
    console: mpsc::Sender<String>,
}

impl Client {
    /// Queue text behind any pending chat output
    async fn print(&self, text: String) {
        if self.console.send(text).await.is_err() {
            debug!("Renderer stopped");
        }
    }

    /// Run one exchange, stopping it on Ctrl-C
    async fn run_exchange(
        &self,
        state: &mut ConversationState,
        request: SubmitRequest,
    ) -> Result<ExchangeOutcome> {
        let exchange = self.reconciler.begin(state, request).await?;
        let cancel = exchange.cancel_token();

        let run = self.reconciler.run(state, exchange);
        tokio::pin!(run);

        tokio::select! {
            outcome = &mut run => return Ok(outcome),
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupt received, stopping answer");
            }
        }
        cancel.cancel();
        Ok(run.await)
    }

    /// Open a stored session, or a fresh conversation with `None`
    ///
    /// Leaving a session clears filters, so the command-line filters are
    /// applied again.
    async fn open_session(
        &self,
        state: &mut ConversationState,
        session_id: Option<SessionId>,
    ) -> Result<()> {
        self.reconciler
            .load_session(state, session_id, &self.personas)
            .await
            .context("Failed to load chat session")?;
        *state.filters_mut() = self.filters.clone();
        Ok(())
    }

    async fn list_sessions(&self, state: &ConversationState) -> Result<()> {
        let sessions = self
            .reconciler
            .list_sessions()
            .await
            .context("Failed to fetch chat sessions")?;

        let mut out = String::new();
        for session in &sessions {
            let marker = if state.session_id() == Some(session.id) { '*' } else { ' ' };
            let name = if session.name.is_empty() {
                format!("Chat {}", session.id)
            } else {
                session.name.clone()
            };
            out.push_str(&format!(
                "{marker} {:>6}  {}  {name}\n",
                session.id,
                session.time_created.format("%Y-%m-%d")
            ));
        }
        if out.is_empty() {
            out.push_str("No chat sessions\n");
        }
        self.print(out).await;
        Ok(())
    }

    async fn list_personas(&self, state: &ConversationState) {
        let mut out = String::new();
        for persona in &self.personas {
            let marker = if state.persona_id() == persona.id { '*' } else { ' ' };
            out.push_str(&format!("{marker} {:>4}  {}\n", persona.id.0, persona.name));
        }
        if out.is_empty() {
            out.push_str("No personas available\n");
        }
        self.print(out).await;
    }

    async fn rename_session(&self, state: &ConversationState, name: &str) -> Result<()> {
        let Some(session_id) = state.session_id() else {
            bail!("No chat session to rename yet");
        };
        if name.is_empty() {
            bail!("Usage: /rename <name>");
        }
        // Failures are already reported as a notification
        if self.reconciler.rename_session(session_id, name).await.is_ok() {
            self.print(format!("Renamed session {session_id} to {name:?}\n"))
                .await;
        }
        Ok(())
    }

    async fn delete_session(&self, state: &mut ConversationState, arg: &str) -> Result<()> {
        let session_id = if arg.is_empty() {
            state.session_id().context("No chat session to delete")?
        } else {
            SessionId(
                arg.parse()
                    .with_context(|| format!("Invalid session id: {arg:?}"))?,
            )
        };

        let was_current = state.session_id() == Some(session_id);
        if self
            .reconciler
            .delete_session(state, session_id)
            .await
            .is_ok()
        {
            if was_current {
                *state.filters_mut() = self.filters.clone();
            }
            self.print(format!("Deleted session {session_id}\n")).await;
        }
        Ok(())
    }

    /// Toggle the n-th source of the latest answer into the selection
    ///
    /// Selected documents are sent instead of running a search.
    async fn toggle_source(&self, state: &mut ConversationState, arg: &str) -> Result<()> {
        let n: usize = arg
            .parse()
            .with_context(|| format!("Invalid source number: {arg:?}"))?;
        let doc = answer_sources(state.history())
            .into_iter()
            .nth(n.saturating_sub(1))
            .with_context(|| format!("No source [{n}] on the latest answer"))?;

        let added = state.selected_documents_mut().toggle(doc);
        let summary = selection_summary(
            state.selected_documents(),
            n,
            added,
            state.max_document_tokens(),
            self.token_reserve,
        );
        self.print(summary).await;
        Ok(())
    }

    /// Feedback on the latest persisted answer
    async fn send_feedback(&self, state: &ConversationState, feedback: FeedbackType, details: &str) {
        let Some(message_id) = state
            .history()
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::Assistant)
            .and_then(|m| m.message_id)
        else {
            debug!("No persisted answer to give feedback on");
            return;
        };

        // Failures are already reported as a notification
        let _ = self
            .reconciler
            .submit_feedback(state, message_id, feedback, details)
            .await;
    }

    /// Handle one line of interactive input
    ///
    /// Returns `false` when the user asked to quit.
    async fn handle_line(&self, state: &mut ConversationState, line: &str) -> Result<bool> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(true);
        }

        let (command, rest) = match line.strip_prefix('/') {
            Some(cmd) => cmd.split_once(' ').unwrap_or((cmd, "")),
            None => {
                state.set_input(line);
                self.run_exchange(state, SubmitRequest::new()).await?;
                return Ok(true);
            }
        };
        let rest = rest.trim();

        match command {
            "quit" | "exit" => return Ok(false),
            "new" => self.open_session(state, None).await?,
            "session" => {
                let id: i64 = rest
                    .parse()
                    .with_context(|| format!("Invalid session id: {rest:?}"))?;
                self.open_session(state, Some(SessionId(id))).await?;
            }
            "sessions" => self.list_sessions(state).await?,
            "rename" => self.rename_session(state, rest).await?,
            "delete" => self.delete_session(state, rest).await?,
            "personas" => self.list_personas(state).await,
            "edit" => {
                if let Ok(request) = self.reconciler.prepare_edit_query(state, rest).await {
                    self.run_exchange(state, request).await?;
                }
            }
            "force" => {
                if let Ok(request) = self.reconciler.prepare_force_search(state).await {
                    self.run_exchange(state, request).await?;
                }
            }
            "select" => self.toggle_source(state, rest).await?,
            "clear" => state.selected_documents_mut().clear(),
            "like" => self.send_feedback(state, FeedbackType::Like, rest).await,
            "dislike" => self.send_feedback(state, FeedbackType::Dislike, rest).await,
            other => bail!("Unknown command: /{other}"),
        }

        Ok(true)
    }
}

/// Report of a selection change, warning once the reserve is eaten into
fn selection_summary(
    selection: &DocumentSelection,
    n: usize,
    added: bool,
    max_tokens: u32,
    token_reserve: u32,
) -> String {
    let mut out = format!(
        "{} source [{n}]: {} selected, {} tokens\n",
        if added { "Selected" } else { "Unselected" },
        selection.documents().len(),
        selection.total_tokens()
    );
    if selection.token_limit_reached(max_tokens, token_reserve) {
        out.push_str(&format!(
            "[warning] Over LLM context length by {} tokens\n",
            selection.tokens_over(max_tokens)
        ));
    }
    out
}

/// Pick the persona to chat with from the fetched list
fn choose_persona(personas: &[Persona], requested: Option<i64>) -> Result<Option<Persona>> {
    match requested {
        Some(id) => personas
            .iter()
            .find(|p| p.id == PersonaId(id))
            .cloned()
            .map(Some)
            .with_context(|| format!("Unknown persona: {id}")),
        None => Ok(personas.first().cloned()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level);

    // Load configuration: CLI > env > file > defaults
    let config_path = args.config.clone().or_else(default_config_path);
    let mut config = load_config_from_path(config_path).context("Failed to load configuration")?;

    let mut overrides = ConfigOverrides::new();
    if let Some(url) = args.api_url.clone() {
        overrides = overrides.with_api_url(url);
    }
    if let Some(secs) = args.timeout {
        overrides = overrides.with_request_timeout_secs(secs);
    }
    overrides.apply(&mut config);
    config.validate().context("Invalid configuration")?;

    info!(
        api_url = %config.api_url,
        source = %config.source(),
        "Pridox chat starting"
    );

    let backend = Arc::new(HttpBackend::from_config(&config)?);

    // Location marker: which session the user is looking at
    let initial_session = args.session.map(SessionId);
    let (location_tx, location_rx) = watch::channel(initial_session);

    let (updates_tx, updates_rx) = mpsc::channel::<ChatUpdate>(256);
    let (console_tx, console_rx) = mpsc::channel::<String>(16);
    let renderer = spawn_renderer(updates_rx, console_rx, location_tx);

    let reconciler = ChatReconciler::new(Arc::clone(&backend), updates_tx)
        .with_session_name_max_chars(config.session_name_max_chars);

    let personas = match reconciler.load_personas().await {
        Ok(personas) => personas,
        Err(e) => {
            warn!(error = %e, "Could not fetch personas, using the backend default");
            Vec::new()
        }
    };

    let mut state = ConversationState::new(location_rx, config.default_max_document_tokens);
    state.set_persona(choose_persona(&personas, args.persona)?);

    let client = Client {
        reconciler,
        personas,
        filters: args.filters(),
        token_reserve: config.document_token_reserve,
        console: console_tx,
    };

    if initial_session.is_some() {
        client.open_session(&mut state, initial_session).await?;
    } else {
        *state.filters_mut() = client.filters.clone();
        client.reconciler.refresh_max_tokens(&mut state).await;
    }

    if !args.message.is_empty() {
        let mut request = SubmitRequest::message(args.message.join(" "));
        request.force_search = args.force_search;
        client.run_exchange(&mut state, request).await?;
    } else {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Some(line) = lines.next_line().await? {
            match client.handle_line(&mut state, &line).await {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => {
                    let mut stderr = tokio::io::stderr();
                    stderr.write_all(format!("{e:#}\n").as_bytes()).await?;
                }
            }
        }
    }

    // Close both channels so the renderer drains and exits
    drop(client);
    let _ = renderer.await;

    info!("Pridox chat stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pridox_client_core::Document;

    #[test]
    fn test_parse_tag() {
        assert_eq!(
            parse_tag("team=search"),
            Ok(Tag {
                tag_key: "team".to_string(),
                tag_value: "search".to_string(),
            })
        );
        assert!(parse_tag("team").is_err());
        assert!(parse_tag("=search").is_err());
    }

    #[test]
    fn test_filters_from_args() {
        let args = Args::parse_from([
            "pridox-chat",
            "--source",
            "slack",
            "--tag",
            "team=search",
            "--since-days",
            "30",
        ]);
        let filters = args.filters();
        assert_eq!(filters.source_type, Some(vec!["slack".to_string()]));
        assert_eq!(filters.document_set, None);
        assert_eq!(filters.tags.map(|t| t.len()), Some(1));
        assert!(filters.time_cutoff.is_some());
    }

    #[test]
    fn test_selection_summary_reports_overage_against_max_tokens() {
        let mut selection = DocumentSelection::new();
        selection.toggle(Document::new("a").with_tokens(600));
        selection.toggle(Document::new("b").with_tokens(500));

        // Within the budget but inside the reserve: warned, nothing over yet
        assert_eq!(
            selection_summary(&selection, 2, true, 1150, 75),
            "Selected source [2]: 2 selected, 1100 tokens\n\
             [warning] Over LLM context length by 0 tokens\n"
        );
        assert_eq!(
            selection_summary(&selection, 2, true, 1000, 75),
            "Selected source [2]: 2 selected, 1100 tokens\n\
             [warning] Over LLM context length by 100 tokens\n"
        );
        assert_eq!(
            selection_summary(&selection, 1, false, 4096, 75),
            "Unselected source [1]: 2 selected, 1100 tokens\n"
        );
    }

    #[test]
    fn test_choose_persona() {
        let personas = vec![
            Persona::new(PersonaId(2), "IT Helper"),
            Persona::new(PersonaId(0), "Default"),
        ];
        assert_eq!(
            choose_persona(&personas, None).unwrap().map(|p| p.id),
            Some(PersonaId(2))
        );
        assert_eq!(
            choose_persona(&personas, Some(0)).unwrap().map(|p| p.id),
            Some(PersonaId(0))
        );
        assert!(choose_persona(&personas, Some(9)).is_err());
        assert_eq!(choose_persona(&[], None).unwrap(), None);
    }
}
