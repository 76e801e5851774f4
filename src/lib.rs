//! Translation core that lets Anthropic Messages clients talk to an
//! OpenAI-shaped chat-completions upstream.
//!
//! - [`providers::transform`] holds the pure translators (model names,
//!   content, requests, responses) and the per-stream event state machine.
//! - [`gateway`] wires them to the collaborator traits in [`providers`].
//! - [`messages`] and [`providers::types`] are the two wire vocabularies.

pub mod config;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod messages;
pub mod providers;

pub use crate::config::Config;
pub use crate::error::AppError;
pub use crate::gateway::MessagesGateway;
pub use crate::providers::ProviderError;
