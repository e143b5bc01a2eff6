//! Domain types, configuration and errors for the Copilot chat client.

pub mod config;
pub mod error;
pub mod session;

// Re-export common types
pub use config::{ApiBase, AppConfig, RetryPolicy};
pub use error::{ApiError, CopilotError};
