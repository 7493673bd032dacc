//! LLM types for OpenAI-compatible chat completions
//!
//! This module defines the conversation messages, tool definitions and the
//! request body sent to the model.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Role in a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// Function name and raw JSON argument text of one tool invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: String,
}

fn function_kind() -> String {
    "function".to_string()
}

/// A finalized tool invocation requested by the model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub id: String,
    #[serde(rename = "type", default = "function_kind")]
    pub kind: String,
    pub function: FunctionCall,
}

impl ToolInvocation {
    /// Create a new tool invocation
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            kind: function_kind(),
            function: FunctionCall {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.function.name
    }

    pub fn arguments(&self) -> &str {
        &self.function.arguments
    }
}

/// A message in the conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolInvocation>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Message {
    fn with_role(role: Role, content: Option<String>) -> Self {
        Self {
            role,
            content,
            tool_calls: None,
            tool_call_id: None,
            name: None,
        }
    }

    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(Role::System, Some(content.into()))
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(Role::User, Some(content.into()))
    }

    /// Create an assistant message carrying prose, tool calls, or both
    pub fn assistant(content: Option<String>, tool_calls: Vec<ToolInvocation>) -> Self {
        let mut message = Self::with_role(Role::Assistant, content);
        if !tool_calls.is_empty() {
            message.tool_calls = Some(tool_calls);
        }
        message
    }

    /// Create a tool result message answering `tool_call_id`
    pub fn tool(
        tool_call_id: impl Into<String>,
        name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        let mut message = Self::with_role(Role::Tool, Some(content.into()));
        message.tool_call_id = Some(tool_call_id.into());
        message.name = Some(name.into());
        message
    }
}

/// Tool definition for the LLM
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl ToolDefinition {
    /// Create a new tool definition
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }

    /// Convert to OpenAI function-tool schema format
    pub fn to_openai_schema(&self) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters
            }
        })
    }
}

/// Streamed chat completion request
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolDefinition>,
}

impl ChatRequest {
    pub fn new(
        model: impl Into<String>,
        messages: Vec<Message>,
        tools: Vec<ToolDefinition>,
    ) -> Self {
        Self {
            model: model.into(),
            messages,
            tools,
        }
    }

    /// Build the JSON body: `{model, messages, tools, tool_choice: "auto", stream: true}`
    pub fn to_body(&self) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": self.messages,
            "stream": true
        });

        if !self.tools.is_empty() {
            let tools: Vec<Value> = self.tools.iter().map(|t| t.to_openai_schema()).collect();
            body["tools"] = json!(tools);
            body["tool_choice"] = json!("auto");
        }

        body
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_serialization() {
        assert_eq!(serde_json::to_string(&Role::Tool).unwrap(), "\"tool\"");
        assert_eq!(serde_json::to_string(&Role::System).unwrap(), "\"system\"");
    }

    #[test]
    fn test_user_message_skips_empty_fields() {
        let value = serde_json::to_value(Message::user("hi")).unwrap();
        assert_eq!(value, json!({"role": "user", "content": "hi"}));
    }

    #[test]
    fn test_assistant_message_with_tool_calls() {
        let call = ToolInvocation::new("call_1", "run_code_capture", r#"{"code":"print(1)"}"#);
        let message = Message::assistant(Some("Let me check.".to_string()), vec![call]);
        let value = serde_json::to_value(&message).unwrap();

        assert_eq!(value["role"], "assistant");
        assert_eq!(value["content"], "Let me check.");
        assert_eq!(value["tool_calls"][0]["id"], "call_1");
        assert_eq!(value["tool_calls"][0]["type"], "function");
        assert_eq!(value["tool_calls"][0]["function"]["name"], "run_code_capture");
        assert_eq!(value["tool_calls"][0]["function"]["arguments"], r#"{"code":"print(1)"}"#);
    }

    #[test]
    fn test_assistant_message_without_calls_has_no_tool_calls_key() {
        let message = Message::assistant(Some("done".to_string()), Vec::new());
        assert!(message.tool_calls.is_none());
    }

    #[test]
    fn test_tool_message() {
        let message = Message::tool("call_9", "run_code_capture", "{}");
        assert_eq!(message.role, Role::Tool);
        assert_eq!(message.tool_call_id.as_deref(), Some("call_9"));
        assert_eq!(message.name.as_deref(), Some("run_code_capture"));
    }

    #[test]
    fn test_request_body() {
        let tool = ToolDefinition::new("t", "desc", json!({"type": "object"}));
        let request = ChatRequest::new("m", vec![Message::user("q")], vec![tool]);
        let body = request.to_body();

        assert_eq!(body["model"], "m");
        assert_eq!(body["stream"], true);
        assert_eq!(body["tool_choice"], "auto");
        assert_eq!(body["tools"][0]["type"], "function");
        assert_eq!(body["tools"][0]["function"]["name"], "t");
        assert_eq!(body["messages"][0]["content"], "q");
    }

    #[test]
    fn test_invocation_deserializes_without_type() {
        let call: ToolInvocation =
            serde_json::from_str(r#"{"id":"a","function":{"name":"n","arguments":"{}"}}"#).unwrap();
        assert_eq!(call.kind, "function");
        assert_eq!(call.name(), "n");
    }
}
