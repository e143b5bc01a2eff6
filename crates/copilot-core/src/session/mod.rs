//! Session domain module.
//!
//! # Module Structure
//!
//! - `message`: Conversation message types (`MessageRole`, `Message`)
//! - `state`: Renderable session state (`SessionState`, `HealthStatus`)
//! - `backend`: The backend seam (`ChatBackend`, `ChatRequest`)

mod backend;
mod message;
mod state;

// Re-export public API
pub use backend::{ChatBackend, ChatRequest};
pub use message::{Message, MessageRole};
pub use state::{HealthStatus, MAX_SUGGESTIONS, SessionState};
