//! Content mapping between Messages content blocks and chat-completions
//! message content.
//!
//! To-upstream, blocks collapse into a single string unless an image is
//! present, in which case they become an ordered part list. Tool use and tool
//! results move to the message level (`tool_calls`, `tool` role messages).
//! From-upstream, text and tool calls become content blocks again.

use tracing::{debug, warn};

use crate::messages::{
    ContentBlock, ImageSource, Message, MessageContent as SourceContent, ResponseContentBlock,
    Role, ToolResultContent,
};
use crate::providers::ProviderError;
use crate::providers::types::{
    ChatMessage, ContentPart, FunctionCall, ImageUrl, MessageContent, MessageRole, ToolCall,
};

/// Separator placed between collapsed text blocks.
pub const BLOCK_SEPARATOR: &str = "\n\n";

// MARK: - To Upstream

/// Borrowed view of the blocks that contribute to message content.
enum Segment<'a> {
    Text(&'a str),
    Image(&'a ImageSource),
}

fn segments(blocks: &[ContentBlock]) -> Vec<Segment<'_>> {
    blocks
        .iter()
        .filter_map(|block| match block {
            ContentBlock::Text { text } => Some(Segment::Text(text)),
            // Thinking has no upstream equivalent and is downgraded to text.
            ContentBlock::Thinking { thinking, .. } => Some(Segment::Text(thinking)),
            ContentBlock::Image { source } => Some(Segment::Image(source)),
            ContentBlock::ToolUse { .. } | ContentBlock::ToolResult { .. } => None,
        })
        .collect()
}

/// Wrap a string, mapping the empty string to `None`.
pub fn text_to_content(text: impl Into<String>) -> Option<MessageContent> {
    let text = text.into();
    if text.is_empty() {
        None
    } else {
        Some(MessageContent::Text(text))
    }
}

/// Map content blocks to upstream message content.
///
/// Without images: text and thinking joined by a blank line. With images: an
/// ordered part list. Tool blocks are skipped; they are handled at the message
/// level.
pub fn blocks_to_content(
    blocks: &[ContentBlock],
    image_detail: Option<&str>,
) -> Option<MessageContent> {
    let segments = segments(blocks);

    if !segments.iter().any(|s| matches!(s, Segment::Image(_))) {
        let text = segments
            .iter()
            .filter_map(|s| match s {
                Segment::Text(text) => Some(*text),
                Segment::Image(_) => None,
            })
            .collect::<Vec<_>>()
            .join(BLOCK_SEPARATOR);
        return text_to_content(text);
    }

    let parts = segments
        .into_iter()
        .map(|segment| match segment {
            Segment::Text(text) => ContentPart::Text {
                text: text.to_string(),
            },
            Segment::Image(source) => {
                if let ImageSource::Url { url } = source {
                    warn!(url = %url, "Image was not inlined, passing the reference through");
                }
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: source.to_url(),
                        detail: image_detail.map(String::from),
                    },
                }
            }
        })
        .collect();

    Some(MessageContent::Parts(parts))
}

/// Map a source message's content (string or blocks) to upstream content.
pub fn source_to_content(
    content: &SourceContent,
    image_detail: Option<&str>,
) -> Option<MessageContent> {
    match content {
        SourceContent::Text(text) => text_to_content(text.as_str()),
        SourceContent::Blocks(blocks) => blocks_to_content(blocks, image_detail),
    }
}

/// Map a tool result's content, applying the same collapse rule.
pub fn tool_result_to_content(
    content: &ToolResultContent,
    is_error: bool,
    image_detail: Option<&str>,
) -> Option<MessageContent> {
    let mapped = match content {
        ToolResultContent::Text(text) => text_to_content(text.as_str()),
        ToolResultContent::Blocks(blocks) => blocks_to_content(blocks, image_detail),
    };
    match mapped {
        Some(MessageContent::Text(text)) if is_error => {
            Some(MessageContent::Text(format!("Error: {text}")))
        }
        other => other,
    }
}

/// Collect `tool_use` blocks as upstream tool calls, JSON-encoding each input.
pub fn tool_calls_from_blocks(blocks: &[ContentBlock]) -> Result<Vec<ToolCall>, ProviderError> {
    blocks
        .iter()
        .filter_map(|block| match block {
            ContentBlock::ToolUse { id, name, input } => Some((id, name, input)),
            _ => None,
        })
        .map(|(id, name, input)| {
            Ok(ToolCall {
                id: id.clone(),
                r#type: "function".to_string(),
                function: FunctionCall {
                    name: name.clone(),
                    arguments: serde_json::to_string(input)?,
                },
            })
        })
        .collect()
}

/// Translate one source message into one or more upstream messages.
///
/// A user turn carrying tool results yields one `tool` message per result,
/// in order, followed by a `user` message for the remaining content (omitted
/// when that remainder is empty).
pub fn message_to_upstream(
    message: &Message,
    image_detail: Option<&str>,
) -> Result<Vec<ChatMessage>, ProviderError> {
    let blocks = match &message.content {
        SourceContent::Text(_) => {
            let role = match message.role {
                Role::User => MessageRole::User,
                Role::Assistant => MessageRole::Assistant,
                Role::System => MessageRole::System,
            };
            let content = source_to_content(&message.content, image_detail);
            return Ok(vec![ChatMessage::new(role, content)]);
        }
        SourceContent::Blocks(blocks) => blocks,
    };

    match message.role {
        Role::User | Role::System => {
            let role = if message.role == Role::User {
                MessageRole::User
            } else {
                MessageRole::System
            };
            let mut out = Vec::new();

            for block in blocks {
                match block {
                    ContentBlock::ToolResult {
                        tool_use_id,
                        content,
                        is_error,
                    } => out.push(ChatMessage {
                        role: MessageRole::Tool,
                        content: tool_result_to_content(
                            content,
                            is_error.unwrap_or(false),
                            image_detail,
                        ),
                        tool_calls: None,
                        tool_call_id: Some(tool_use_id.clone()),
                    }),
                    ContentBlock::ToolUse { id, .. } => {
                        debug!(id = %id, "Dropping tool_use block outside an assistant turn");
                    }
                    _ => {}
                }
            }

            let had_tool_results = !out.is_empty();
            let remainder = blocks_to_content(blocks, image_detail);
            if remainder.is_some() || !had_tool_results {
                out.push(ChatMessage::new(role, remainder));
            }
            Ok(out)
        }
        Role::Assistant => {
            if blocks
                .iter()
                .any(|b| matches!(b, ContentBlock::ToolResult { .. }))
            {
                debug!("Dropping tool_result blocks from an assistant turn");
            }
            let tool_calls = tool_calls_from_blocks(blocks)?;
            Ok(vec![ChatMessage {
                role: MessageRole::Assistant,
                content: blocks_to_content(blocks, image_detail),
                tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
                tool_call_id: None,
            }])
        }
    }
}

// MARK: - From Upstream

/// Parse a tool call's JSON-encoded arguments. An empty string means no
/// arguments.
pub fn parse_tool_arguments(id: &str, arguments: &str) -> Result<serde_json::Value, ProviderError> {
    if arguments.trim().is_empty() {
        return Ok(serde_json::Value::Object(serde_json::Map::new()));
    }
    serde_json::from_str(arguments).map_err(|source| ProviderError::InvalidToolArguments {
        id: id.to_string(),
        source,
    })
}

/// Map upstream message content and tool calls to response blocks: text
/// first, then one `tool_use` per call.
pub fn content_from_upstream(
    content: Option<&MessageContent>,
    tool_calls: Option<&[ToolCall]>,
) -> Result<Vec<ResponseContentBlock>, ProviderError> {
    let mut blocks = Vec::new();

    match content {
        Some(MessageContent::Text(text)) if !text.is_empty() => {
            blocks.push(ResponseContentBlock::Text { text: text.clone() });
        }
        Some(MessageContent::Parts(parts)) => {
            for part in parts {
                if let ContentPart::Text { text } = part {
                    if !text.is_empty() {
                        blocks.push(ResponseContentBlock::Text { text: text.clone() });
                    }
                }
            }
        }
        _ => {}
    }

    for call in tool_calls.unwrap_or_default() {
        blocks.push(ResponseContentBlock::ToolUse {
            id: call.id.clone(),
            name: call.function.name.clone(),
            input: parse_tool_arguments(&call.id, &call.function.arguments)?,
        });
    }

    Ok(blocks)
}

// MARK: - Tests

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn png() -> ContentBlock {
        ContentBlock::Image {
            source: ImageSource::Base64 {
                media_type: "image/png".to_string(),
                data: "iVBOR".to_string(),
            },
        }
    }

    fn thinking(text: &str) -> ContentBlock {
        ContentBlock::Thinking {
            thinking: text.to_string(),
            signature: None,
        }
    }

    #[test]
    fn test_text_and_thinking_collapse() {
        let blocks = vec![ContentBlock::text("a"), thinking("b"), ContentBlock::text("c")];
        assert_eq!(
            blocks_to_content(&blocks, None),
            Some(MessageContent::Text("a\n\nb\n\nc".to_string()))
        );
    }

    #[test]
    fn test_empty_collapses_to_null() {
        assert_eq!(blocks_to_content(&[], None), None);
        assert_eq!(blocks_to_content(&[ContentBlock::text("")], None), None);
        assert_eq!(text_to_content(""), None);
    }

    #[test]
    fn test_image_produces_parts() {
        let blocks = vec![ContentBlock::text("what is this"), png(), thinking("hmm")];
        let content = blocks_to_content(&blocks, Some("auto")).unwrap();
        assert_eq!(
            serde_json::to_value(&content).unwrap(),
            json!([
                {"type": "text", "text": "what is this"},
                {"type": "image_url", "image_url": {"url": "data:image/png;base64,iVBOR", "detail": "auto"}},
                {"type": "text", "text": "hmm"}
            ])
        );
    }

    #[test]
    fn test_url_image_passed_through() {
        let blocks = vec![ContentBlock::Image {
            source: ImageSource::Url {
                url: "https://example.com/cat.png".to_string(),
            },
        }];
        let content = blocks_to_content(&blocks, None).unwrap();
        assert_eq!(
            serde_json::to_value(&content).unwrap(),
            json!([{"type": "image_url", "image_url": {"url": "https://example.com/cat.png"}}])
        );
    }

    #[test]
    fn test_tool_result_split_before_user_text() {
        let message = Message::user(vec![
            ContentBlock::ToolResult {
                tool_use_id: "t1".to_string(),
                content: ToolResultContent::Text("42".to_string()),
                is_error: None,
            },
            ContentBlock::text("thanks"),
        ]);
        let out = message_to_upstream(&message, None).unwrap();
        assert_eq!(
            serde_json::to_value(&out).unwrap(),
            json!([
                {"role": "tool", "tool_call_id": "t1", "content": "42"},
                {"role": "user", "content": "thanks"}
            ])
        );
    }

    #[test]
    fn test_tool_results_only_omits_user_message() {
        let message = Message::user(vec![
            ContentBlock::ToolResult {
                tool_use_id: "a".to_string(),
                content: ToolResultContent::Text("1".to_string()),
                is_error: None,
            },
            ContentBlock::ToolResult {
                tool_use_id: "b".to_string(),
                content: ToolResultContent::Blocks(vec![ContentBlock::text("2")]),
                is_error: None,
            },
        ]);
        let out = message_to_upstream(&message, None).unwrap();
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|m| m.role == MessageRole::Tool));
        assert_eq!(out[0].tool_call_id.as_deref(), Some("a"));
        assert_eq!(out[1].content, Some(MessageContent::Text("2".to_string())));
    }

    #[test]
    fn test_tool_result_with_image_uses_parts() {
        let content = ToolResultContent::Blocks(vec![ContentBlock::text("chart:"), png()]);
        let mapped = tool_result_to_content(&content, false, None).unwrap();
        assert!(matches!(mapped, MessageContent::Parts(ref parts) if parts.len() == 2));
    }

    #[test]
    fn test_error_tool_result_prefixed() {
        let content = ToolResultContent::Text("file not found".to_string());
        assert_eq!(
            tool_result_to_content(&content, true, None),
            Some(MessageContent::Text("Error: file not found".to_string()))
        );
    }

    #[test]
    fn test_assistant_turn_with_tool_use() {
        let message = Message::assistant(vec![
            thinking("plan"),
            ContentBlock::text("Let me check."),
            ContentBlock::ToolUse {
                id: "toolu_1".to_string(),
                name: "weather".to_string(),
                input: json!({"city": "Oslo"}),
            },
        ]);
        let out = message_to_upstream(&message, None).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(
            serde_json::to_value(&out[0]).unwrap(),
            json!({
                "role": "assistant",
                "content": "plan\n\nLet me check.",
                "tool_calls": [{
                    "id": "toolu_1",
                    "type": "function",
                    "function": {"name": "weather", "arguments": "{\"city\":\"Oslo\"}"}
                }]
            })
        );
    }

    #[test]
    fn test_assistant_tool_use_only_has_null_content() {
        let message = Message::assistant(vec![ContentBlock::ToolUse {
            id: "t".to_string(),
            name: "noop".to_string(),
            input: json!({}),
        }]);
        let out = message_to_upstream(&message, None).unwrap();
        assert!(out[0].content.is_none());
        assert_eq!(out[0].tool_calls.as_ref().map(Vec::len), Some(1));
    }

    #[test]
    fn test_plain_string_message() {
        let out = message_to_upstream(&Message::user("hi"), None).unwrap();
        assert_eq!(
            serde_json::to_value(&out).unwrap(),
            json!([{"role": "user", "content": "hi"}])
        );
    }

    #[test]
    fn test_from_upstream_text_and_tools() {
        let content = MessageContent::Text("Sure.".to_string());
        let calls = vec![ToolCall {
            id: "call_1".to_string(),
            r#type: "function".to_string(),
            function: FunctionCall {
                name: "sum".to_string(),
                arguments: "{\"a\":1,\"b\":2}".to_string(),
            },
        }];
        let blocks = content_from_upstream(Some(&content), Some(&calls)).unwrap();
        assert_eq!(
            blocks,
            vec![
                ResponseContentBlock::Text {
                    text: "Sure.".to_string()
                },
                ResponseContentBlock::ToolUse {
                    id: "call_1".to_string(),
                    name: "sum".to_string(),
                    input: json!({"a": 1, "b": 2}),
                },
            ]
        );
    }

    #[test]
    fn test_from_upstream_bad_arguments_propagate() {
        let calls = vec![ToolCall {
            id: "call_bad".to_string(),
            r#type: "function".to_string(),
            function: FunctionCall {
                name: "sum".to_string(),
                arguments: "{\"a\":".to_string(),
            },
        }];
        let err = content_from_upstream(None, Some(&calls)).unwrap_err();
        assert!(matches!(err, ProviderError::InvalidToolArguments { ref id, .. } if id == "call_bad"));
    }

    #[test]
    fn test_empty_arguments_are_empty_object() {
        assert_eq!(parse_tool_arguments("c", "").unwrap(), json!({}));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_image_free_blocks_join_with_blank_lines(
            items in proptest::collection::vec((any::<bool>(), "[a-zA-Z0-9 .,!?]{0,20}"), 0..8)
        ) {
            let blocks: Vec<ContentBlock> = items
                .iter()
                .map(|(is_thinking, text)| if *is_thinking { thinking(text) } else { ContentBlock::text(text.as_str()) })
                .collect();
            let expected = items.iter().map(|(_, t)| t.as_str()).collect::<Vec<_>>().join("\n\n");

            match blocks_to_content(&blocks, None) {
                Some(MessageContent::Text(text)) => prop_assert_eq!(text, expected),
                None => prop_assert!(expected.is_empty()),
                Some(other) => prop_assert!(false, "unexpected parts: {:?}", other),
            }
        }
    }
}
