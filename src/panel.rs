//! Client-side summary panel
//!
//! [`PanelController`] is a pure state machine: user and selection events go
//! in, [`PanelCommand`]s come out, and backend completions are fed back
//! tagged with the [`Ticket`] they were issued under. A completion whose
//! ticket no longer matches the selected message is dropped, so a slow reply
//! for an old message can never overwrite the current panel.
//!
//! [`PanelRuntime`] executes those commands against a [`SummaryBackend`] on a
//! single task, applying per-call client timeouts, and [`LocalBackend`]
//! serves them in-process from a [`SummaryService`].
//!
//! | From | Event | To | Effect |
//! |---|---|---|---|
//! | any | select message | `Collapsed` | cache lookup |
//! | `Collapsed` | cache hit | `Expanded` | |
//! | `Collapsed`, `Error` | toggle | `Loading` | summarize |
//! | `Loading` | toggle | `Loading` | none |
//! | `Loading` | summary ok / failed | `Expanded` / `Error` | |
//! | `Expanded` | toggle | `Collapsed` | clear cache |

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::config::Account;
use crate::errors::{RequestError, ServiceError, ServiceResult};
use crate::mime::MessageView;
use crate::models::SummaryResult;
use crate::service::SummaryService;

/// Client timeout for cache lookups and invalidation
pub const LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);
/// Client timeout for summary generation
pub const SUMMARIZE_TIMEOUT: Duration = Duration::from_secs(60);

/// Visible panel state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelState {
    /// Header only
    Collapsed,
    /// Summary request in flight
    Loading,
    /// Summary shown
    Expanded,
    /// Last request failed; toggling retries
    Error,
}

/// Identity of the selection a command was issued for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    generation: u64,
    message_id: String,
}

impl Ticket {
    /// Message the command targets
    pub fn message_id(&self) -> &str {
        &self.message_id
    }
}

/// Summary request as sent to the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryRequest {
    /// Assembled message text
    pub message_data: String,
    /// Stable message identifier, may be empty
    pub message_id: String,
    /// Best-effort conversation size
    pub thread_count: u32,
}

/// Side effect requested by the controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PanelCommand {
    /// Look up a cached summary without generating one
    LookupCached(Ticket),
    /// Generate (or fetch) a summary
    Summarize(Ticket, SummaryRequest),
    /// Invalidate the server-side cache entry; result is not awaited by state
    ClearCache(String),
}

/// Panel state machine for the currently displayed message
#[derive(Debug)]
pub struct PanelController {
    state: PanelState,
    generation: u64,
    message: Option<MessageView>,
    message_id: String,
    summary: Option<String>,
    message_count: u32,
    error: Option<String>,
}

impl Default for PanelController {
    fn default() -> Self {
        Self::new()
    }
}

impl PanelController {
    /// Create a hidden, collapsed panel
    pub fn new() -> Self {
        Self {
            state: PanelState::Collapsed,
            generation: 0,
            message: None,
            message_id: String::new(),
            summary: None,
            message_count: 0,
            error: None,
        }
    }

    /// Current state
    pub fn state(&self) -> PanelState {
        self.state
    }

    /// Whether a message is selected and the panel is shown
    pub fn is_visible(&self) -> bool {
        self.message.is_some()
    }

    /// Identifier of the selected message
    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    /// Summary held for the current message in this session
    pub fn summary(&self) -> Option<&str> {
        self.summary.as_deref()
    }

    /// Messages covered by the shown summary
    pub fn message_count(&self) -> u32 {
        self.message_count
    }

    /// User-facing error text while in [`PanelState::Error`]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Summary lines to render, empty unless expanded
    pub fn rendered_items(&self) -> Vec<String> {
        match (self.state, self.summary.as_deref()) {
            (PanelState::Expanded, Some(summary)) => summary_items(summary),
            _ => Vec::new(),
        }
    }

    /// A different message was selected (or the selection was cleared)
    ///
    /// Drops all transient state, collapses, and starts a background cache
    /// lookup for the new message.
    pub fn select_message(&mut self, message: Option<MessageView>) -> Vec<PanelCommand> {
        self.generation += 1;
        self.state = PanelState::Collapsed;
        self.summary = None;
        self.message_count = 0;
        self.error = None;
        self.message_id = message.as_ref().map(MessageView::message_id).unwrap_or_default();
        self.message = message;

        debug!(message_id = %self.message_id, generation = self.generation, "panel reset");
        if self.message.is_some() && !self.message_id.is_empty() {
            vec![PanelCommand::LookupCached(self.ticket())]
        } else {
            Vec::new()
        }
    }

    /// The user clicked the panel header
    pub fn toggle(&mut self) -> Vec<PanelCommand> {
        let Some(message) = &self.message else {
            return Vec::new();
        };

        match self.state {
            PanelState::Loading => {
                debug!(message_id = %self.message_id, "toggle ignored while loading");
                Vec::new()
            }
            PanelState::Expanded => {
                self.state = PanelState::Collapsed;
                self.summary = None;
                self.message_count = 0;
                if self.message_id.is_empty() {
                    Vec::new()
                } else {
                    vec![PanelCommand::ClearCache(self.message_id.clone())]
                }
            }
            PanelState::Collapsed | PanelState::Error => {
                if self.summary.is_some() {
                    self.state = PanelState::Expanded;
                    self.error = None;
                    return Vec::new();
                }
                match message.assemble_checked() {
                    Ok(message_data) => {
                        let request = SummaryRequest {
                            message_data,
                            message_id: self.message_id.clone(),
                            thread_count: message.thread_count(),
                        };
                        self.state = PanelState::Loading;
                        self.error = None;
                        vec![PanelCommand::Summarize(self.ticket(), request)]
                    }
                    Err(e) => {
                        self.fail(&e);
                        Vec::new()
                    }
                }
            }
        }
    }

    /// Apply a cache lookup result
    ///
    /// Returns `false` when the result was discarded.
    pub fn on_cached(&mut self, ticket: &Ticket, summary: Option<String>) -> bool {
        if !self.is_current(ticket) {
            debug!(message_id = %ticket.message_id, "discarding stale cache lookup");
            return false;
        }
        let Some(summary) = summary.filter(|s| !s.trim().is_empty()) else {
            return false;
        };
        if self.state != PanelState::Collapsed {
            return false;
        }
        self.summary = Some(summary);
        self.message_count = 1;
        self.state = PanelState::Expanded;
        true
    }

    /// Apply a summary result
    ///
    /// Returns `false` when the result was discarded.
    pub fn on_summarized(&mut self, ticket: &Ticket, result: ServiceResult<SummaryResult>) -> bool {
        if !self.is_current(ticket) || self.state != PanelState::Loading {
            debug!(message_id = %ticket.message_id, "discarding stale summary");
            return false;
        }
        match result {
            Ok(result) if !result.summary_text.trim().is_empty() => {
                self.message_count = result.message_count.max(1);
                self.summary = Some(result.summary_text);
                self.state = PanelState::Expanded;
            }
            Ok(_) => self.fail(&ServiceError::SummarizationFailed(RequestError::EmptySummary)),
            Err(e) => self.fail(&e),
        }
        true
    }

    fn fail(&mut self, err: &ServiceError) {
        warn!(message_id = %self.message_id, error = %err, "summary panel error");
        self.state = PanelState::Error;
        self.summary = None;
        self.error = Some(err.user_message());
    }

    fn ticket(&self) -> Ticket {
        Ticket {
            generation: self.generation,
            message_id: self.message_id.clone(),
        }
    }

    fn is_current(&self, ticket: &Ticket) -> bool {
        ticket.generation == self.generation && ticket.message_id == self.message_id
    }
}

/// Split a summary into display items
///
/// Blank lines are dropped; each line is trimmed and loses one leading
/// bullet marker (`•`, `-`, `*`).
pub fn summary_items(summary: &str) -> Vec<String> {
    summary
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            line.strip_prefix(|c| matches!(c, '•' | '-' | '*'))
                .map_or(line, str::trim_start)
                .to_owned()
        })
        .collect()
}

/// Client/server boundary for the panel
#[async_trait]
pub trait SummaryBackend: Send + Sync + 'static {
    /// Cached summary for a message, never generating one
    async fn get_cached(&self, message_id: &str) -> ServiceResult<Option<String>>;
    /// Generate or fetch a summary
    async fn summarize(&self, request: &SummaryRequest) -> ServiceResult<SummaryResult>;
    /// Invalidate a cached summary; returns whether an entry was removed
    async fn clear_cache(&self, message_id: &str) -> bool;
}

/// Backend serving one account from an in-process [`SummaryService`]
#[derive(Clone)]
pub struct LocalBackend {
    service: Arc<SummaryService>,
    account: Account,
    caching_enabled: bool,
}

impl LocalBackend {
    /// Bind a service to the signed-in account
    pub fn new(service: Arc<SummaryService>, account: Account, caching_enabled: bool) -> Self {
        Self {
            service,
            account,
            caching_enabled,
        }
    }
}

#[async_trait]
impl SummaryBackend for LocalBackend {
    async fn get_cached(&self, message_id: &str) -> ServiceResult<Option<String>> {
        self.service
            .get_cached(&self.account, message_id, self.caching_enabled)
    }

    async fn summarize(&self, request: &SummaryRequest) -> ServiceResult<SummaryResult> {
        self.service
            .summarize(
                &self.account,
                &request.message_data,
                &request.message_id,
                request.thread_count,
                self.caching_enabled,
            )
            .await
    }

    async fn clear_cache(&self, message_id: &str) -> bool {
        self.service.clear_cache(&self.account, message_id)
    }
}

/// Finished backend call, fed back into the controller
enum Completion {
    Cached(Ticket, Option<String>),
    Summarized(Ticket, ServiceResult<SummaryResult>),
    Cleared(String, u64, bool),
}

/// Single-task driver for a [`PanelController`]
///
/// UI events are applied immediately; backend calls run as tasks and their
/// results are applied by [`PanelRuntime::next_completion`]. No request is
/// cancelled; stale results are simply discarded by the controller.
///
/// Lookups and summaries for a message wait until any earlier cache clear
/// for that message has finished, so a dismiss followed by a quick reopen
/// never reads the entry the dismiss invalidated.
pub struct PanelRuntime<B: SummaryBackend> {
    controller: PanelController,
    backend: Arc<B>,
    in_flight: JoinSet<Completion>,
    /// Unfinished clears by message id, tagged with their sequence number
    pending_clears: HashMap<String, (u64, watch::Receiver<bool>)>,
    clear_seq: u64,
}

impl<B: SummaryBackend> PanelRuntime<B> {
    /// Create a runtime with a hidden panel
    pub fn new(backend: Arc<B>) -> Self {
        Self {
            controller: PanelController::new(),
            backend,
            in_flight: JoinSet::new(),
            pending_clears: HashMap::new(),
            clear_seq: 0,
        }
    }

    /// Read-only view of the panel
    pub fn controller(&self) -> &PanelController {
        &self.controller
    }

    /// Number of backend calls not yet applied
    pub fn pending(&self) -> usize {
        self.in_flight.len()
    }

    /// Select a message (or none)
    pub fn select_message(&mut self, message: Option<MessageView>) {
        let commands = self.controller.select_message(message);
        self.dispatch(commands);
    }

    /// Select a message given as RFC822 source
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if the source cannot be parsed; the panel is
    /// left unchanged.
    pub fn select_raw_message(
        &mut self,
        raw: &[u8],
        folder: Option<&str>,
        uid: Option<u32>,
    ) -> ServiceResult<()> {
        let message = MessageView::from_rfc822(raw, folder, uid)?;
        self.select_message(Some(message));
        Ok(())
    }

    /// Toggle the panel
    pub fn toggle(&mut self) {
        let commands = self.controller.toggle();
        self.dispatch(commands);
    }

    /// Wait for one backend call and apply it
    ///
    /// Returns `false` when nothing is in flight.
    pub async fn next_completion(&mut self) -> bool {
        let Some(joined) = self.in_flight.join_next().await else {
            return false;
        };
        match joined {
            Ok(Completion::Cached(ticket, summary)) => {
                self.controller.on_cached(&ticket, summary);
            }
            Ok(Completion::Summarized(ticket, result)) => {
                self.controller.on_summarized(&ticket, result);
            }
            Ok(Completion::Cleared(message_id, seq, cleared)) => {
                if self
                    .pending_clears
                    .get(&message_id)
                    .is_some_and(|(pending, _)| *pending == seq)
                {
                    self.pending_clears.remove(&message_id);
                }
                debug!(message_id = %message_id, cleared, "cache clear acknowledged");
            }
            Err(e) => warn!(error = %e, "panel backend task failed"),
        }
        true
    }

    /// Apply every outstanding backend call
    pub async fn settle(&mut self) {
        while self.next_completion().await {}
    }

    fn dispatch(&mut self, commands: Vec<PanelCommand>) {
        for command in commands {
            let backend = Arc::clone(&self.backend);
            match command {
                PanelCommand::LookupCached(ticket) => {
                    let barrier = self.clear_barrier(ticket.message_id());
                    self.in_flight.spawn(async move {
                        wait_for_clear(barrier).await;
                        let lookup = backend.get_cached(ticket.message_id());
                        let summary = match timeout(LOOKUP_TIMEOUT, lookup).await {
                            Ok(Ok(summary)) => summary,
                            Ok(Err(e)) => {
                                debug!(error = %e, "cache lookup failed");
                                None
                            }
                            Err(_) => {
                                debug!("cache lookup timed out");
                                None
                            }
                        };
                        Completion::Cached(ticket, summary)
                    });
                }
                PanelCommand::Summarize(ticket, request) => {
                    let barrier = self.clear_barrier(&request.message_id);
                    self.in_flight.spawn(async move {
                        wait_for_clear(barrier).await;
                        let result = timeout(SUMMARIZE_TIMEOUT, backend.summarize(&request))
                            .await
                            .unwrap_or_else(|_| {
                                Err(ServiceError::SummarizationFailed(RequestError::Transport(
                                    "client timeout".to_owned(),
                                )))
                            });
                        Completion::Summarized(ticket, result)
                    });
                }
                PanelCommand::ClearCache(message_id) => {
                    self.clear_seq += 1;
                    let seq = self.clear_seq;
                    let (done_tx, done_rx) = watch::channel(false);
                    self.pending_clears.insert(message_id.clone(), (seq, done_rx));
                    self.in_flight.spawn(async move {
                        let cleared = timeout(LOOKUP_TIMEOUT, backend.clear_cache(&message_id))
                            .await
                            .unwrap_or(false);
                        let _ = done_tx.send(true);
                        Completion::Cleared(message_id, seq, cleared)
                    });
                }
            }
        }
    }

    fn clear_barrier(&self, message_id: &str) -> Option<watch::Receiver<bool>> {
        self.pending_clears.get(message_id).map(|(_, done)| done.clone())
    }
}

/// Wait until a pending cache clear has finished (or its task is gone)
async fn wait_for_clear(barrier: Option<watch::Receiver<bool>>) {
    if let Some(mut done) = barrier
        && done.wait_for(|finished| *finished).await.is_err()
    {
        debug!("cache clear task ended without finishing");
    }
}
