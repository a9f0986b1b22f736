use super::role::Role;
use super::tool::ToolCall;
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// How a tool-role message came to exist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolOutcome {
    /// The call was approved and executed; the content is its result
    Completed,
    /// The call was denied at the approval gate and never executed
    Denied,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResponse {
    pub call_id: String,
    pub outcome: ToolOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// A message to or from an LLM
pub struct Message {
    pub role: Role,
    pub created: i64,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_response: Option<ToolResponse>,
}

impl Message {
    fn new(role: Role) -> Self {
        Message {
            role,
            created: Utc::now().timestamp(),
            content: None,
            tool_calls: Vec::new(),
            tool_response: None,
        }
    }

    /// Create a new user message with the current timestamp
    pub fn user() -> Self {
        Self::new(Role::User)
    }

    /// Create a new assistant message with the current timestamp
    pub fn assistant() -> Self {
        Self::new(Role::Assistant)
    }

    /// The result of an executed tool call
    pub fn tool_result<I: Into<String>, S: Into<String>>(call_id: I, text: S) -> Self {
        Self::new(Role::Tool)
            .with_text(text)
            .with_tool_response(call_id, ToolOutcome::Completed)
    }

    /// The note recorded when a tool call is denied
    pub fn tool_denied<I: Into<String>, S: Into<String>>(call_id: I, text: S) -> Self {
        Self::new(Role::Tool)
            .with_text(text)
            .with_tool_response(call_id, ToolOutcome::Denied)
    }

    /// Set the text content of the message
    pub fn with_text<S: Into<String>>(mut self, text: S) -> Self {
        self.content = Some(text.into());
        self
    }

    /// Add a tool call to the message
    pub fn with_tool_call(mut self, tool_call: ToolCall) -> Self {
        self.tool_calls.push(tool_call);
        self
    }

    fn with_tool_response<I: Into<String>>(mut self, call_id: I, outcome: ToolOutcome) -> Self {
        self.tool_response = Some(ToolResponse {
            call_id: call_id.into(),
            outcome,
        });
        self
    }

    /// The text content, if any non-empty text is present
    pub fn text(&self) -> Option<&str> {
        self.content.as_deref().filter(|text| !text.is_empty())
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    /// The tool call the agent acts upon: only the first call of a message is ever executed
    pub fn first_tool_call(&self) -> Option<&ToolCall> {
        self.tool_calls.first()
    }

    /// True for a tool message carrying the result of an executed call
    pub fn is_tool_result(&self) -> bool {
        matches!(
            &self.tool_response,
            Some(response) if response.outcome == ToolOutcome::Completed
        )
    }

    /// True if this tool message answers the call with the given id
    pub fn responds_to(&self, call_id: &str) -> bool {
        self.tool_response
            .as_ref()
            .is_some_and(|response| response.call_id == call_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tool_messages_carry_outcome() {
        let result = Message::tool_result("call_1", "done");
        assert_eq!(result.role, Role::Tool);
        assert!(result.is_tool_result());
        assert!(result.responds_to("call_1"));

        let denied = Message::tool_denied("call_1", "no");
        assert!(!denied.is_tool_result());
        assert!(denied.responds_to("call_1"));
        assert!(!denied.responds_to("call_2"));
    }

    #[test]
    fn test_first_tool_call_ignores_the_rest() {
        let message = Message::assistant()
            .with_tool_call(ToolCall::new("a", "read_file", json!({"filePath": "x"})))
            .with_tool_call(ToolCall::new("b", "terminal", json!({"command": "ls"})));
        assert_eq!(message.first_tool_call().map(|c| c.id.as_str()), Some("a"));
    }

    #[test]
    fn test_empty_text_is_treated_as_absent() {
        assert_eq!(Message::assistant().with_text("").text(), None);
        assert_eq!(Message::user().with_text("hi").text(), Some("hi"));
    }

    #[test]
    fn test_serialization_omits_empty_tool_fields() -> anyhow::Result<()> {
        let value = serde_json::to_value(Message::user().with_text("hello"))?;
        assert_eq!(value["role"], json!("user"));
        assert!(value.get("tool_calls").is_none());
        assert!(value.get("tool_response").is_none());
        Ok(())
    }
}
