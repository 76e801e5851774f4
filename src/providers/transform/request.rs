//! Messages request -> chat-completions request.

use serde_json::{Value, json};
use tracing::debug;

use crate::config::TranslatorConfig;
use crate::messages::{MessagesRequest, SystemPrompt, Tool as SourceTool};
use crate::providers::ProviderError;
use crate::providers::transform::content::{message_to_upstream, text_to_content};
use crate::providers::transform::model::resolve_model;
use crate::providers::types::{ChatMessage, ChatRequest, FunctionDef, MessageRole, Tool};

// MARK: - System Prompt

/// Flatten a system prompt and drop every line containing one of `markers`
/// (case-insensitive). Returns `None` when nothing is left.
pub fn sanitize_system_prompt(system: &SystemPrompt, markers: &[String]) -> Option<String> {
    let markers: Vec<String> = markers
        .iter()
        .filter(|m| !m.is_empty())
        .map(|m| m.to_lowercase())
        .collect();

    let text = system.text();
    let kept: Vec<&str> = text
        .lines()
        .filter(|line| {
            let lower = line.to_lowercase();
            !markers.iter().any(|m| lower.contains(m.as_str()))
        })
        .collect();

    let sanitized = kept.join("\n");
    let sanitized = sanitized.trim_matches('\n');
    if sanitized.trim().is_empty() {
        None
    } else {
        Some(sanitized.to_string())
    }
}

// MARK: - Tools

/// Map a Messages `tool_choice` onto the chat-completions directive.
///
/// `auto` -> `"auto"`, `any` -> `"required"`, `tool{name}` -> function choice,
/// `none` -> `"none"`. Anything else, including a named choice without a
/// name, maps to `None`.
pub fn convert_tool_choice(choice: &Value) -> Option<Value> {
    let kind = choice.get("type").and_then(Value::as_str)?;
    match kind {
        "auto" => Some(json!("auto")),
        "any" => Some(json!("required")),
        "none" => Some(json!("none")),
        "tool" => {
            let name = choice.get("name").and_then(Value::as_str)?;
            Some(json!({"type": "function", "function": {"name": name}}))
        }
        other => {
            debug!(tool_choice = other, "Unrecognized tool_choice, leaving unset");
            None
        }
    }
}

/// Map tool declarations 1:1, `input_schema` becoming `parameters`.
pub fn convert_tools(tools: &[SourceTool]) -> Vec<Tool> {
    tools
        .iter()
        .map(|tool| Tool {
            r#type: "function".to_string(),
            function: FunctionDef {
                name: tool.name.clone(),
                description: tool.description.clone(),
                parameters: Some(tool.input_schema.clone()),
            },
        })
        .collect()
}

// MARK: - Request

/// Build the upstream request. `max_tokens` is copied as-is; the caller fills
/// it from the model catalog beforehand when the client left it out.
pub fn translate_request(
    request: &MessagesRequest,
    config: &TranslatorConfig,
) -> Result<ChatRequest, ProviderError> {
    let image_detail = config.image_detail.as_deref();
    let mut messages = Vec::with_capacity(request.messages.len() + 1);

    if let Some(system) = request
        .system
        .as_ref()
        .and_then(|s| sanitize_system_prompt(s, &config.reserved_markers))
    {
        messages.push(ChatMessage::new(MessageRole::System, text_to_content(system)));
    }

    for message in &request.messages {
        messages.extend(message_to_upstream(message, image_detail)?);
    }

    if request.top_k.is_some() {
        debug!("Dropping top_k, no upstream equivalent");
    }
    if request.thinking.is_some() {
        debug!("Dropping thinking configuration, no upstream equivalent");
    }

    Ok(ChatRequest {
        model: resolve_model(&request.model, &config.model_aliases),
        messages,
        max_tokens: request.max_tokens,
        temperature: request.temperature,
        top_p: request.top_p,
        stop: request.stop_sequences.clone(),
        stream: request.stream,
        tools: request
            .tools
            .as_deref()
            .filter(|tools| !tools.is_empty())
            .map(convert_tools),
        tool_choice: request.tool_choice.as_ref().and_then(convert_tool_choice),
        user: request.metadata.as_ref().and_then(|m| m.user_id.clone()),
    })
}

// MARK: - Tests
