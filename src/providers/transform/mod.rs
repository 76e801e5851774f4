//! Translation between the Messages API and the chat-completions API.
//!
//! Request, response and stream translators are pure over their inputs; the
//! stream translator keeps per-stream state and must not be shared.

pub mod content;
pub mod model;
pub mod request;
pub mod response;
pub mod sse;
pub mod stream;
pub mod util;

pub use model::{normalize_model_name, resolve_model};
pub use request::translate_request;
pub use response::translate_response;
pub use sse::{SseParser, UpstreamRecord};
pub use stream::StreamTranslator;
pub use util::*;
