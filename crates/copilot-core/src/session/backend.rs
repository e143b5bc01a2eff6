//! Trait for the chat backend.
//!
//! Implemented by the HTTP client in `copilot-interaction`; the session
//! depends only on this trait so tests can substitute an in-memory backend.

use super::message::Message;
use super::state::HealthStatus;
use crate::error::ApiError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Body of `POST /api/chat`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Full transcript, ending with the new user turn.
    pub messages: Vec<Message>,
    pub prompt: String,
}

#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Best-effort probe. Never fails; returns `Ok` or `Unavailable`.
    async fn get_health(&self) -> HealthStatus;

    /// Best-effort fetch. Never fails; returns an empty list on any problem.
    async fn get_suggestions(&self) -> Vec<String>;

    /// Sends the transcript and returns the normalized assistant reply.
    async fn post_chat(&self, request: &ChatRequest) -> Result<Message, ApiError>;
}
