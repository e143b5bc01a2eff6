//! Backend interaction for the Copilot chat client.
//!
//! - [`ApiClient`]: resilient HTTP client and the `/api/*` endpoints
//! - [`normalize`]: reply normalization rule chain
//! - [`ChatSession`]: the chat session state machine

pub mod api_client;
pub mod chat_session;
pub mod normalize;

pub use api_client::{ApiClient, RequestOptions, ResponseBody};
pub use chat_session::{ChatSession, IgnoreReason, SendOutcome, UNAVAILABLE_NOTICE};
