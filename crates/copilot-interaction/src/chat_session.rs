//! Chat session state machine.
//!
//! `ChatSession` owns the [`SessionState`] and sequences calls to a
//! [`ChatBackend`]. It is either idle or sending; at most one send is in
//! flight. Mount-time probes (health, suggestions) run as independent tasks
//! whose results are folded into state whenever they arrive.

use copilot_core::error::ApiError;
use copilot_core::session::{ChatBackend, ChatRequest, Message, SessionState};
use std::mem;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;
use tokio::task::JoinSet;

/// Assistant message appended when a send fails.
pub const UNAVAILABLE_NOTICE: &str =
    "The service is unavailable or /api/chat is not implemented yet.";

const DEFAULT_SEND_ERROR: &str = "Failed to send message.";

/// Why a send intent was dropped without contacting the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// The text was empty or whitespace.
    Blank,
    /// Another send is already in flight.
    Busy,
    /// No suggestion at the requested index.
    UnknownSuggestion,
}

/// Result of a send intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// The backend replied; the reply was appended.
    Replied(Message),
    /// The backend failed; the error banner and a notice were set.
    Failed(ApiError),
    /// Nothing happened.
    Ignored(IgnoreReason),
}

/// Manages one chat session.
pub struct ChatSession {
    backend: Arc<dyn ChatBackend>,
    /// Single owner of the state; receivers get read-only snapshots.
    state: Arc<watch::Sender<SessionState>>,
    /// Mount-time probe tasks. Only `teardown` drains the set; dropping it
    /// aborts them.
    probes: Mutex<JoinSet<()>>,
    /// Count of probes that have neither folded nor been cancelled.
    pending: Arc<watch::Sender<usize>>,
}

impl ChatSession {
    /// Creates an idle session with empty state. No request is issued.
    pub fn new(backend: Arc<dyn ChatBackend>) -> Self {
        let (state, _) = watch::channel(SessionState::default());
        let (pending, _) = watch::channel(0);
        Self {
            backend,
            state: Arc::new(state),
            probes: Mutex::new(JoinSet::new()),
            pending: Arc::new(pending),
        }
    }

    /// Issues one health probe and one suggestions fetch concurrently.
    ///
    /// Must be called from within a Tokio runtime. Neither probe blocks sending.
    pub fn mount(&self) {
        tracing::info!("[session] Mounting; probing health and suggestions");
        let mut probes = self.probes.lock().unwrap_or_else(PoisonError::into_inner);

        let backend = Arc::clone(&self.backend);
        let state = Arc::clone(&self.state);
        let pending = PendingProbe::register(&self.pending);
        probes.spawn(async move {
            let _pending = pending;
            let health = backend.get_health().await;
            state.send_if_modified(|s| s.record_health(health));
        });

        let backend = Arc::clone(&self.backend);
        let state = Arc::clone(&self.state);
        let pending = PendingProbe::register(&self.pending);
        probes.spawn(async move {
            let _pending = pending;
            let suggestions = backend.get_suggestions().await;
            state.send_modify(|s| s.record_suggestions(suggestions));
        });
    }

    /// Waits until every mount-time probe has been folded in or cancelled.
    ///
    /// Does not take ownership of the probes; a concurrent `teardown` still
    /// cancels them and wakes this waiter.
    pub async fn wait_for_probes(&self) {
        let mut pending = self.pending.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = pending.wait_for(|outstanding| *outstanding == 0).await;
    }

    /// Cancels outstanding mount-time probes.
    ///
    /// Once this returns, no probe result will reach the state. An
    /// in-flight send is not affected.
    pub async fn teardown(&self) {
        let mut probes = self.take_probes();
        if !probes.is_empty() {
            tracing::info!(outstanding = probes.len(), "[session] Cancelling probes");
        }
        probes.shutdown().await;
    }

    fn take_probes(&self) -> JoinSet<()> {
        let mut probes = self.probes.lock().unwrap_or_else(PoisonError::into_inner);
        mem::take(&mut *probes)
    }

    /// Sends `text` as a user turn.
    ///
    /// Blank text or a send already in flight is ignored. Otherwise the
    /// trimmed text is appended immediately, the error banner is cleared,
    /// and the reply (or a failure notice) is appended when the backend
    /// answers. The user turn is never rolled back.
    pub async fn send_message(&self, text: &str) -> SendOutcome {
        let text = text.trim();
        if text.is_empty() {
            return SendOutcome::Ignored(IgnoreReason::Blank);
        }

        let mut request = None;
        self.state.send_if_modified(|s| {
            if s.loading {
                return false;
            }
            s.loading = true;
            s.error.clear();
            s.messages.push(Message::user(text));
            request = Some(ChatRequest {
                messages: s.messages.clone(),
                prompt: String::new(),
            });
            true
        });
        let Some(request) = request else {
            tracing::debug!("[session] Send ignored; another send is in flight");
            return SendOutcome::Ignored(IgnoreReason::Busy);
        };

        let _in_flight = InFlight(self.state.as_ref());
        tracing::debug!(turns = request.messages.len(), "[session] Sending message");

        match self.backend.post_chat(&request).await {
            Ok(reply) => {
                self.state.send_modify(|s| {
                    s.messages.push(reply.clone());
                    s.loading = false;
                });
                SendOutcome::Replied(reply)
            }
            Err(err) => {
                tracing::warn!("[session] Send failed: {err}");
                let banner = match err.user_message() {
                    "" => DEFAULT_SEND_ERROR.to_string(),
                    message => message.to_string(),
                };
                self.state.send_modify(|s| {
                    s.error = banner;
                    s.messages.push(Message::assistant(UNAVAILABLE_NOTICE));
                    s.loading = false;
                });
                SendOutcome::Failed(err)
            }
        }
    }

    /// Sends the suggestion at `index` as a user turn.
    pub async fn send_suggestion(&self, index: usize) -> SendOutcome {
        let suggestion = self.state.borrow().suggestions.get(index).cloned();
        match suggestion {
            Some(text) => self.send_message(&text).await,
            None => SendOutcome::Ignored(IgnoreReason::UnknownSuggestion),
        }
    }

    /// Empties the transcript and the error banner.
    ///
    /// Has no effect while a send is in flight; returns whether it applied.
    pub fn clear(&self) -> bool {
        let mut applied = false;
        self.state.send_if_modified(|s| {
            if s.loading {
                return false;
            }
            applied = true;
            let changed = !s.messages.is_empty() || !s.error.is_empty();
            s.clear();
            changed
        });
        applied
    }

    /// Returns a copy of the current state.
    pub fn snapshot(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// Subscribes to state changes.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn is_loading(&self) -> bool {
        self.state.borrow().loading
    }
}

/// Counts one probe as pending until its task finishes or is aborted.
struct PendingProbe(Arc<watch::Sender<usize>>);

impl PendingProbe {
    fn register(pending: &Arc<watch::Sender<usize>>) -> Self {
        pending.send_modify(|outstanding| *outstanding += 1);
        Self(Arc::clone(pending))
    }
}

impl Drop for PendingProbe {
    fn drop(&mut self) {
        self.0
            .send_modify(|outstanding| *outstanding = outstanding.saturating_sub(1));
    }
}

/// Resets `loading` if a send future is dropped before it completes.
struct InFlight<'a>(&'a watch::Sender<SessionState>);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.send_if_modified(|s| mem::replace(&mut s.loading, false));
    }
}
