//! Chat session state.

use super::message::Message;
use serde::{Deserialize, Serialize};

/// Maximum number of suggestions kept in session state.
pub const MAX_SUGGESTIONS: usize = 6;

/// Last-known backend health.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// No probe has completed yet.
    #[default]
    Unknown,
    Ok,
    Unavailable,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Ok => "ok",
            Self::Unavailable => "unavailable",
        }
    }
}

/// Snapshot of everything the presentation layer renders.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    /// Append-only transcript; emptied only by an explicit clear.
    pub messages: Vec<Message>,
    /// True while exactly one send is outstanding.
    pub loading: bool,
    pub health: HealthStatus,
    /// Banner text of the last failed send, empty if none.
    pub error: String,
    /// At most [`MAX_SUGGESTIONS`] non-blank prompts.
    pub suggestions: Vec<String>,
}

impl SessionState {
    /// Records a probe result. `Unknown` never overwrites a known value.
    ///
    /// Returns whether the state changed.
    pub fn record_health(&mut self, health: HealthStatus) -> bool {
        if health == HealthStatus::Unknown || self.health == health {
            return false;
        }
        self.health = health;
        true
    }

    /// Replaces suggestions, dropping blanks and keeping the first six.
    pub fn record_suggestions(&mut self, suggestions: Vec<String>) {
        self.suggestions = suggestions
            .into_iter()
            .filter(|s| !s.trim().is_empty())
            .take(MAX_SUGGESTIONS)
            .collect();
    }

    /// Empties the transcript and the error banner.
    pub fn clear(&mut self) {
        self.messages.clear();
        self.error.clear();
    }
}
