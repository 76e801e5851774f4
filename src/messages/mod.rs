//! Anthropic Messages API wire types: requests, responses and stream events.

pub mod request;
pub mod response;
pub mod stream;

pub use request::*;
pub use response::*;
pub use stream::*;
