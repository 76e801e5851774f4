//! Upstream provider boundary.
//!
//! Defines the error type shared by every translation step and the traits the
//! gateway consumes: the upstream chat-completions client, the model catalog
//! and the image resolver. Concrete implementations live outside this crate.

pub mod transform;
pub mod types;

use std::future::Future;
use std::pin::Pin;

use futures::Stream;

use crate::providers::types::{ChatRequest, ChatResponse};

pub use self::transform::sse::UpstreamRecord;

// ---------------------------------------------------------------------------
// ProviderError
// ---------------------------------------------------------------------------

/// Errors raised while talking to, or translating for, the upstream.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// Non-2xx upstream answer. `body` is the raw response body.
    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Malformed upstream fragment: {0}")]
    MalformedFragment(String),

    #[error("Malformed upstream response: {0}")]
    MalformedResponse(String),

    #[error("Invalid arguments for tool call {id}: {source}")]
    InvalidToolArguments {
        id: String,
        source: serde_json::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// Collaborator traits
// ---------------------------------------------------------------------------

/// Raw records of one upstream stream, in arrival order.
pub type RecordStream = Pin<Box<dyn Stream<Item = Result<UpstreamRecord, ProviderError>> + Send>>;

/// The upstream chat-completions client.
///
/// Async methods return boxed futures so the trait is dyn-compatible (can be
/// used as `Arc<dyn UpstreamClient>`).
pub trait UpstreamClient: Send + Sync {
    /// Non-streaming chat completion.
    fn chat(
        &self,
        request: &ChatRequest,
    ) -> Pin<Box<dyn Future<Output = Result<ChatResponse, ProviderError>> + Send + '_>>;

    /// Streaming chat completion. Resolves once the upstream has accepted the
    /// request; records then arrive through the returned stream.
    fn stream_chat(
        &self,
        request: &ChatRequest,
    ) -> Pin<Box<dyn Future<Output = Result<RecordStream, ProviderError>> + Send + '_>>;
}

/// Per-model limits lookup.
pub trait ModelCatalog: Send + Sync {
    /// Output-token ceiling for a (normalized) model id.
    fn max_output_tokens(&self, model: &str) -> Option<u32>;
}

/// Fetches an externally hosted image and returns it as a `data:` URI.
pub trait ImageResolver: Send + Sync {
    fn resolve<'a>(
        &'a self,
        url: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String, ProviderError>> + Send + 'a>>;
}
