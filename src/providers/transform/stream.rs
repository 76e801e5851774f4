//! Chat-completions stream -> Messages stream.
//!
//! [`StreamTranslator`] owns the accumulator for exactly one stream. It is fed
//! decoded fragments in arrival order and returns the Messages events each
//! fragment produces. Invariants it maintains:
//!
//! - `message_start` is emitted once, before any block event.
//! - Block indices are dense from 0 and at most one block is open; opening a
//!   block always closes the previous one first.
//! - Within a fragment, text is handled before tool calls.
//! - After the terminal `message_stop` (or `error`) nothing else is emitted.

use std::collections::BTreeMap;

use serde_json::json;
use tracing::{debug, trace, warn};

use crate::error::AppError;
use crate::messages::{
    ContentDelta, MessageDelta, PartialMessage, ResponseContentBlock, StopReason, StreamEvent,
    Usage,
};
use crate::providers::ProviderError;
use crate::providers::transform::response::convert_usage;
use crate::providers::transform::util::{map_finish_reason, new_message_id};
use crate::providers::types::{ChatChunk, ToolCallDelta};

// MARK: - Constants

/// Distinct upstream tool calls accepted in one stream.
pub const MAX_TOOL_CALLS: usize = 128;

// MARK: - Accumulator State

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    Text,
    ToolUse,
}

#[derive(Debug, Clone, Copy)]
struct OpenBlock {
    index: usize,
    kind: BlockKind,
}

/// A tool call seen on the stream, keyed by its upstream index.
#[derive(Debug)]
struct ToolCallState {
    block_index: usize,
    id: String,
    name: String,
    arguments: String,
}

// MARK: - Stream Translator

/// Per-stream translation state machine.
#[derive(Debug)]
pub struct StreamTranslator {
    model: String,
    message_start_emitted: bool,
    next_block_index: usize,
    open_block: Option<OpenBlock>,
    tool_calls: BTreeMap<u32, ToolCallState>,
    usage: Usage,
    finished: bool,
}

impl StreamTranslator {
    /// `model` is reported in `message_start` when fragments carry none.
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            message_start_emitted: false,
            next_block_index: 0,
            open_block: None,
            tool_calls: BTreeMap::new(),
            usage: Usage::default(),
            finished: false,
        }
    }

    /// The event sent when the stream opens, before any fragment.
    pub fn start(&self) -> StreamEvent {
        StreamEvent::Ping
    }

    /// Whether a terminal event has been produced.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Arguments accumulated so far for an upstream tool-call index.
    pub fn tool_arguments(&self, upstream_index: u32) -> Option<&str> {
        self.tool_calls
            .get(&upstream_index)
            .map(|call| call.arguments.as_str())
    }

    /// Apply one fragment.
    ///
    /// Fails on a malformed fragment (a tool call opened without id or name,
    /// or too many tool calls); the caller should then emit [`Self::fail`].
    pub fn process_fragment(
        &mut self,
        chunk: &ChatChunk,
    ) -> Result<Vec<StreamEvent>, ProviderError> {
        if self.finished {
            trace!("Ignoring fragment after the stream finished");
            return Ok(Vec::new());
        }

        let mut events = Vec::new();
        self.ensure_message_start(Some(chunk), &mut events);

        if let Some(usage) = &chunk.usage {
            self.usage = convert_usage(usage);
        }

        for choice in &chunk.choices {
            if let Some(text) = choice.delta.content.as_deref().filter(|t| !t.is_empty()) {
                self.push_text(text, &mut events);
            }

            for call in choice.delta.tool_calls.iter().flatten() {
                self.push_tool_call(call, &mut events)?;
            }

            if let Some(reason) = choice.finish_reason.as_deref() {
                let stop_reason = map_finish_reason(reason);
                if stop_reason.is_none() {
                    debug!(finish_reason = reason, "Unknown finish reason, leaving stop_reason unset");
                }
                self.finalize(stop_reason, &mut events);
                break;
            }
        }

        Ok(events)
    }

    /// Handle the terminator sentinel. Finalizes with `end_turn` unless a
    /// finish reason was already seen.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        if self.finished {
            return Vec::new();
        }
        let mut events = Vec::new();
        self.ensure_message_start(None, &mut events);
        self.finalize(Some(StopReason::EndTurn), &mut events);
        events
    }

    /// Produce the single terminal error event. Any open block is abandoned.
    pub fn fail(&mut self, err: ProviderError) -> StreamEvent {
        warn!(
            error = %err,
            open_block = ?self.open_block.map(|b| b.index),
            "Terminating stream with an error event"
        );
        self.finished = true;
        self.open_block = None;
        AppError::from(err).to_stream_event()
    }

    // MARK: - Internals

    fn ensure_message_start(&mut self, chunk: Option<&ChatChunk>, events: &mut Vec<StreamEvent>) {
        if self.message_start_emitted {
            return;
        }
        self.message_start_emitted = true;

        let id = chunk
            .map(|c| c.id.as_str())
            .filter(|id| !id.is_empty())
            .map_or_else(new_message_id, String::from);
        let model = chunk
            .map(|c| c.model.as_str())
            .filter(|m| !m.is_empty())
            .unwrap_or(&self.model)
            .to_string();

        events.push(StreamEvent::MessageStart {
            message: PartialMessage::new(id, model),
        });
    }

    fn allocate_block(&mut self, kind: BlockKind) -> usize {
        let index = self.next_block_index;
        self.next_block_index += 1;
        self.open_block = Some(OpenBlock { index, kind });
        index
    }

    fn close_open_block(&mut self, events: &mut Vec<StreamEvent>) {
        if let Some(block) = self.open_block.take() {
            events.push(StreamEvent::ContentBlockStop { index: block.index });
        }
    }

    fn push_text(&mut self, text: &str, events: &mut Vec<StreamEvent>) {
        let index = match self.open_block {
            Some(OpenBlock {
                index,
                kind: BlockKind::Text,
            }) => index,
            _ => {
                self.close_open_block(events);
                let index = self.allocate_block(BlockKind::Text);
                events.push(StreamEvent::ContentBlockStart {
                    index,
                    content_block: ResponseContentBlock::Text {
                        text: String::new(),
                    },
                });
                index
            }
        };

        events.push(StreamEvent::ContentBlockDelta {
            index,
            delta: ContentDelta::TextDelta {
                text: text.to_string(),
            },
        });
    }

    fn push_tool_call(
        &mut self,
        call: &ToolCallDelta,
        events: &mut Vec<StreamEvent>,
    ) -> Result<(), ProviderError> {
        let function = call.function.as_ref();

        if !self.tool_calls.contains_key(&call.index) {
            if self.tool_calls.len() >= MAX_TOOL_CALLS {
                return Err(ProviderError::MalformedFragment(format!(
                    "more than {MAX_TOOL_CALLS} tool calls in one stream"
                )));
            }
            let id = call
                .id
                .as_deref()
                .filter(|id| !id.is_empty())
                .ok_or_else(|| {
                    ProviderError::MalformedFragment(format!(
                        "tool call {} started without an id",
                        call.index
                    ))
                })?;
            let name = function
                .and_then(|f| f.name.as_deref())
                .filter(|name| !name.is_empty())
                .ok_or_else(|| {
                    ProviderError::MalformedFragment(format!(
                        "tool call {} started without a name",
                        call.index
                    ))
                })?;

            self.close_open_block(events);
            let block_index = self.allocate_block(BlockKind::ToolUse);
            events.push(StreamEvent::ContentBlockStart {
                index: block_index,
                content_block: ResponseContentBlock::ToolUse {
                    id: id.to_string(),
                    name: name.to_string(),
                    input: json!({}),
                },
            });
            self.tool_calls.insert(
                call.index,
                ToolCallState {
                    block_index,
                    id: id.to_string(),
                    name: name.to_string(),
                    arguments: String::new(),
                },
            );
        }

        let Some(arguments) = function
            .and_then(|f| f.arguments.as_deref())
            .filter(|a| !a.is_empty())
        else {
            return Ok(());
        };

        let open_index = self.open_block.map(|b| b.index);
        if let Some(state) = self.tool_calls.get_mut(&call.index) {
            state.arguments.push_str(arguments);
            if open_index == Some(state.block_index) {
                events.push(StreamEvent::ContentBlockDelta {
                    index: state.block_index,
                    delta: ContentDelta::InputJsonDelta {
                        partial_json: arguments.to_string(),
                    },
                });
            } else {
                warn!(
                    tool_call_id = %state.id,
                    tool_name = %state.name,
                    "Arguments arrived for a closed tool block, accumulating without emitting"
                );
            }
        }
        Ok(())
    }

    fn finalize(&mut self, stop_reason: Option<StopReason>, events: &mut Vec<StreamEvent>) {
        self.close_open_block(events);
        events.push(StreamEvent::MessageDelta {
            delta: MessageDelta {
                stop_reason,
                stop_sequence: None,
            },
            usage: self.usage,
        });
        events.push(StreamEvent::MessageStop);
        self.finished = true;
    }
}

// MARK: - Tests
