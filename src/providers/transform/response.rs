//! Complete chat-completions response -> Messages response.

use crate::messages::{MessagesResponse, StopReason, Usage};
use crate::providers::ProviderError;
use crate::providers::transform::content::content_from_upstream;
use crate::providers::transform::util::{map_finish_reason, new_message_id};
use crate::providers::types::{ChatResponse, Choice, Usage as UpstreamUsage};

use tracing::warn;

/// Pick the stop reason across choices: `tool_calls` anywhere wins, otherwise
/// the first choice's reason.
pub fn select_stop_reason(choices: &[Choice]) -> Option<StopReason> {
    let reason = choices
        .iter()
        .filter_map(|c| c.finish_reason.as_deref())
        .find(|r| *r == "tool_calls")
        .or_else(|| choices.first().and_then(|c| c.finish_reason.as_deref()))?;
    map_finish_reason(reason)
}

/// Convert upstream usage, splitting cached prompt tokens out of the input
/// count.
pub fn convert_usage(usage: &UpstreamUsage) -> Usage {
    let cached = usage.cached_tokens();
    Usage {
        input_tokens: usage.prompt_tokens.saturating_sub(cached.unwrap_or(0)),
        output_tokens: usage.completion_tokens,
        cache_read_input_tokens: cached,
    }
}

/// Translate a complete upstream response. Blocks of every choice are merged
/// in choice order.
pub fn translate_response(
    response: ChatResponse,
    requested_model: &str,
) -> Result<MessagesResponse, ProviderError> {
    if response.choices.is_empty() {
        return Err(ProviderError::MalformedResponse(
            "response has no choices".to_string(),
        ));
    }
    if response.choices.len() > 1 {
        warn!(
            choices = response.choices.len(),
            "Upstream returned several choices, merging them"
        );
    }

    let mut content = Vec::new();
    for choice in &response.choices {
        content.extend(content_from_upstream(
            choice.message.content.as_ref(),
            choice.message.tool_calls.as_deref(),
        )?);
    }

    let model = if response.model.is_empty() {
        requested_model.to_string()
    } else {
        response.model.clone()
    };
    let id = if response.id.is_empty() {
        new_message_id()
    } else {
        response.id.clone()
    };

    Ok(MessagesResponse {
        id,
        response_type: "message".to_string(),
        role: "assistant".to_string(),
        content,
        model,
        stop_reason: select_stop_reason(&response.choices),
        stop_sequence: None,
        usage: response.usage.as_ref().map(convert_usage).unwrap_or_default(),
    })
}
