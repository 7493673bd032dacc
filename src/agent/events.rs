//! Events an agent run emits to its caller.

use serde::{Deserialize, Serialize};

/// One typed event. Serializes as `{"type": "...", "content": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "content", rename_all = "snake_case")]
pub enum StreamEvent {
    /// A piece of the model's prose
    Delta(String),
    /// Designed termination or progress note
    Status(String),
    /// Control-plane failure that ended the run
    Error(String),
    /// Code about to be executed
    ToolCode(String),
    /// Result text of one tool invocation
    ToolOutput(String),
    /// Renderable reference to a stored artifact
    Artifact(String),
}

impl StreamEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Delta(_) => "delta",
            Self::Status(_) => "status",
            Self::Error(_) => "error",
            Self::ToolCode(_) => "tool_code",
            Self::ToolOutput(_) => "tool_output",
            Self::Artifact(_) => "artifact",
        }
    }

    pub fn content(&self) -> &str {
        match self {
            Self::Delta(s)
            | Self::Status(s)
            | Self::Error(s)
            | Self::ToolCode(s)
            | Self::ToolOutput(s)
            | Self::Artifact(s) => s,
        }
    }

    /// One line of newline-delimited JSON.
    pub fn to_json_line(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(r#"{{"type":"{}","content":""}}"#, self.kind())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_shape() {
        let event = StreamEvent::ToolCode("print(1)".to_string());
        assert_eq!(event.to_json_line(), r#"{"type":"tool_code","content":"print(1)"}"#);
    }

    #[test]
    fn test_round_trip_from_wire() {
        let event: StreamEvent =
            serde_json::from_str(r#"{"type":"tool_output","content":"2\n"}"#).unwrap();
        assert_eq!(event, StreamEvent::ToolOutput("2\n".to_string()));
        assert_eq!(event.kind(), "tool_output");
        assert_eq!(event.content(), "2\n");
    }
}
