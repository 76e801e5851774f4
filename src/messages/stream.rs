//! Streaming event types for the Messages API.

use axum::response::sse::Event;
use serde::{Deserialize, Serialize};

use super::response::{ResponseContentBlock, StopReason, Usage};

/// One event of a Messages API stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    MessageStart {
        message: PartialMessage,
    },
    ContentBlockStart {
        index: usize,
        content_block: ResponseContentBlock,
    },
    ContentBlockDelta {
        index: usize,
        delta: ContentDelta,
    },
    ContentBlockStop {
        index: usize,
    },
    /// Stop reason and final usage.
    MessageDelta {
        delta: MessageDelta,
        usage: Usage,
    },
    MessageStop,
    Ping,
    Error {
        error: StreamError,
    },
}

impl StreamEvent {
    /// The SSE `event:` name for this event.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::MessageStart { .. } => "message_start",
            Self::ContentBlockStart { .. } => "content_block_start",
            Self::ContentBlockDelta { .. } => "content_block_delta",
            Self::ContentBlockStop { .. } => "content_block_stop",
            Self::MessageDelta { .. } => "message_delta",
            Self::MessageStop => "message_stop",
            Self::Ping => "ping",
            Self::Error { .. } => "error",
        }
    }

    /// Block index this event belongs to, if any.
    pub fn block_index(&self) -> Option<usize> {
        match self {
            Self::ContentBlockStart { index, .. }
            | Self::ContentBlockDelta { index, .. }
            | Self::ContentBlockStop { index } => Some(*index),
            _ => None,
        }
    }

    /// Whether no further events may follow this one.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::MessageStop | Self::Error { .. })
    }

    /// Frame as `event: <type>\ndata: <json>\n\n`.
    pub fn to_sse_frame(&self) -> Result<String, serde_json::Error> {
        let data = serde_json::to_string(self)?;
        Ok(format!("event: {}\ndata: {data}\n\n", self.event_type()))
    }

    /// Convert to an axum SSE event for handlers that stream responses.
    pub fn to_axum_event(&self) -> Result<Event, axum::Error> {
        Event::default().event(self.event_type()).json_data(self)
    }
}

/// Message skeleton carried by `message_start`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartialMessage {
    pub id: String,
    #[serde(rename = "type")]
    pub message_type: String,
    pub role: String,
    pub content: Vec<ResponseContentBlock>,
    pub model: String,
    pub stop_reason: Option<StopReason>,
    pub stop_sequence: Option<String>,
    pub usage: Usage,
}

impl PartialMessage {
    pub fn new(id: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            message_type: "message".to_string(),
            role: "assistant".to_string(),
            content: Vec::new(),
            model: model.into(),
            stop_reason: None,
            stop_sequence: None,
            usage: Usage::default(),
        }
    }
}

/// Incremental content within a block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentDelta {
    TextDelta { text: String },
    /// Partial JSON of a tool call's input.
    InputJsonDelta { partial_json: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageDelta {
    pub stop_reason: Option<StopReason>,
    pub stop_sequence: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamError {
    #[serde(rename = "type")]
    pub error_type: String,
    pub message: String,
}
