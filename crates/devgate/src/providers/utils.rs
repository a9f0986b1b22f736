use anyhow::{anyhow, Result};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::models::message::Message;
use crate::models::role::Role;
use crate::models::tool::{Tool, ToolCall};

/// Convert internal Message format to OpenAI's API message specification
///
/// Only the first tool call of an assistant message is sent, since that is the only one the
/// agent ever answers; the API rejects calls without a matching tool message.
pub fn messages_to_openai_spec(messages: &[Message]) -> Vec<Value> {
    let mut messages_spec = Vec::new();

    for message in messages {
        if message.role == Role::Tool {
            let call_id = message
                .tool_response
                .as_ref()
                .map(|response| response.call_id.as_str())
                .unwrap_or_default();
            messages_spec.push(json!({
                "role": "tool",
                "content": message.content.clone().unwrap_or_default(),
                "tool_call_id": call_id,
            }));
            continue;
        }

        let mut converted = json!({
            "role": message.role
        });
        if let Some(text) = message.text() {
            converted["content"] = json!(text);
        }
        if let Some(tool_call) = message.first_tool_call() {
            converted["tool_calls"] = json!([{
                "id": tool_call.id,
                "type": "function",
                "function": {
                    "name": sanitize_function_name(&tool_call.name),
                    "arguments": tool_call.arguments.to_string(),
                }
            }]);
        }

        if converted.get("content").is_some() || converted.get("tool_calls").is_some() {
            messages_spec.push(converted);
        }
    }

    messages_spec
}

/// Convert internal Tool format to OpenAI's API tool specification
pub fn tools_to_openai_spec(tools: &[Tool]) -> Result<Vec<Value>> {
    let mut tool_names = std::collections::HashSet::new();
    let mut result = Vec::new();

    for tool in tools {
        if !tool_names.insert(&tool.name) {
            return Err(anyhow!("Duplicate tool name: {}", tool.name));
        }

        result.push(json!({
            "type": "function",
            "function": {
                "name": tool.name,
                "description": tool.description,
                "parameters": tool.input_schema,
            }
        }));
    }

    Ok(result)
}

/// Convert OpenAI's API response to internal Message format
///
/// Missing call ids are generated. Arguments that are not valid JSON are kept as a raw string
/// so that validation rejects the call with a readable error instead of it disappearing.
pub fn openai_response_to_message(response: Value) -> Result<Message> {
    let original = response
        .get("choices")
        .and_then(|choices| choices.get(0))
        .and_then(|choice| choice.get("message"))
        .ok_or_else(|| anyhow!("Response contained no message: {}", response))?;

    let mut message = Message::assistant();

    if let Some(text) = original.get("content").and_then(|t| t.as_str()) {
        message = message.with_text(text);
    }

    if let Some(tool_calls) = original.get("tool_calls").and_then(|t| t.as_array()) {
        for tool_call in tool_calls {
            let id = tool_call["id"]
                .as_str()
                .filter(|id| !id.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| format!("call_{}", Uuid::new_v4()));
            let function_name = tool_call["function"]["name"]
                .as_str()
                .unwrap_or_default()
                .to_string();
            let arguments = parse_arguments(&tool_call["function"]["arguments"]);

            message = message.with_tool_call(ToolCall::new(id, function_name, arguments));
        }
    }

    Ok(message)
}

fn parse_arguments(raw: &Value) -> Value {
    match raw {
        Value::String(text) if text.trim().is_empty() => Value::Null,
        Value::String(text) => {
            serde_json::from_str::<Value>(text).unwrap_or_else(|_| Value::String(text.clone()))
        }
        // Some compatible servers send the arguments already decoded
        other => other.clone(),
    }
}

fn sanitize_function_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[derive(Debug, thiserror::Error)]
#[error("Context length exceeded. Message: {0}")]
pub struct ContextLengthExceededError(String);

pub fn check_openai_context_length_error(error: &Value) -> Option<ContextLengthExceededError> {
    let code = error.get("code")?.as_str()?;
    if code == "context_length_exceeded" || code == "string_above_max_length" {
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("Unknown error")
            .to_string();
        Some(ContextLengthExceededError(message))
    } else {
        None
    }
}
