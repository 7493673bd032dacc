//! Streaming support for chat completion responses.
//!
//! The model API delivers Server-Sent Events whose `data:` payloads carry a
//! `choices[0].delta` object. Each payload becomes one [`ModelChunk`]: an
//! optional piece of prose plus zero or more indexed tool-call fragments.

use std::pin::Pin;

use futures::Stream;
use serde::Deserialize;

use super::client::LlmError;

/// A partial piece of one tool invocation, tagged with its stream-local index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolCallFragment {
    pub index: u32,
    pub id: Option<String>,
    pub name: Option<String>,
    pub arguments: Option<String>,
}

impl ToolCallFragment {
    /// Fragment carrying only an arguments piece
    pub fn piece(index: u32, piece: impl Into<String>) -> Self {
        Self {
            index,
            arguments: Some(piece.into()),
            ..Default::default()
        }
    }

    /// Fragment opening an invocation with its id and function name
    pub fn start(index: u32, id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            index,
            id: Some(id.into()),
            name: Some(name.into()),
            arguments: None,
        }
    }
}

/// One decoded chunk of the model's streamed response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelChunk {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCallFragment>,
    pub finish_reason: Option<String>,
}

impl ModelChunk {
    /// Chunk carrying only prose
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Default::default()
        }
    }

    /// Chunk carrying only tool-call fragments
    pub fn fragments(fragments: Vec<ToolCallFragment>) -> Self {
        Self {
            tool_calls: fragments,
            ..Default::default()
        }
    }
}

/// Pull-based sequence of decoded chunks.
pub type ModelStream = Pin<Box<dyn Stream<Item = Result<ModelChunk, LlmError>> + Send>>;

#[derive(Debug, Deserialize)]
struct WireChunk {
    #[serde(default)]
    choices: Vec<WireChoice>,
    #[serde(default)]
    error: Option<WireError>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    #[serde(default)]
    delta: Option<WireDelta>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Debug, Deserialize)]
struct WireToolCall {
    #[serde(default)]
    index: u32,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<WireFunction>,
}

#[derive(Debug, Deserialize)]
struct WireFunction {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireError {
    #[serde(default)]
    code: Option<serde_json::Value>,
    message: String,
}

/// Decode one SSE `data:` payload.
///
/// Returns `Ok(None)` for keep-alives, empty payloads and the `[DONE]`
/// terminator. An in-band `{"error": ...}` payload becomes an API error.
pub fn parse_chunk(data: &str) -> Result<Option<ModelChunk>, LlmError> {
    let data = data.trim();
    if data.is_empty() || data == "[DONE]" {
        return Ok(None);
    }

    let wire: WireChunk = serde_json::from_str(data)?;

    if let Some(error) = wire.error {
        let status = error
            .code
            .as_ref()
            .and_then(|c| c.as_u64())
            .map(|c| c as u16)
            .unwrap_or(500);
        return Err(LlmError::ApiError {
            status,
            message: error.message,
        });
    }

    let Some(choice) = wire.choices.into_iter().next() else {
        return Ok(None);
    };

    let mut chunk = ModelChunk {
        finish_reason: choice.finish_reason,
        ..Default::default()
    };

    if let Some(delta) = choice.delta {
        chunk.content = delta.content.filter(|c| !c.is_empty());
        chunk.tool_calls = delta
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|call| {
                let (name, arguments) = match call.function {
                    Some(f) => (f.name, f.arguments),
                    None => (None, None),
                };
                ToolCallFragment {
                    index: call.index,
                    id: call.id,
                    name,
                    arguments,
                }
            })
            .collect();
    }

    Ok(Some(chunk))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_done_and_empty() {
        assert_eq!(parse_chunk("[DONE]").unwrap(), None);
        assert_eq!(parse_chunk("  ").unwrap(), None);
    }

    #[test]
    fn test_parse_content_delta() {
        let data = r#"{"choices":[{"delta":{"content":"Hello"},"finish_reason":null}]}"#;
        let chunk = parse_chunk(data).unwrap().unwrap();
        assert_eq!(chunk.content.as_deref(), Some("Hello"));
        assert!(chunk.tool_calls.is_empty());
    }

    #[test]
    fn test_parse_empty_content_is_none() {
        let chunk = parse_chunk(r#"{"choices":[{"delta":{"role":"assistant","content":""}}]}"#)
            .unwrap()
            .unwrap();
        assert_eq!(chunk.content, None);
    }

    #[test]
    fn test_parse_tool_call_fragment() {
        let data = concat!(
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_1","type":"function","#,
            r#""function":{"name":"run_code_capture","arguments":"{\"co"}}]}}]}"#
        );
        let chunk = parse_chunk(data).unwrap().unwrap();
        assert_eq!(chunk.tool_calls.len(), 1);
        let fragment = &chunk.tool_calls[0];
        assert_eq!(fragment.index, 0);
        assert_eq!(fragment.id.as_deref(), Some("call_1"));
        assert_eq!(fragment.name.as_deref(), Some("run_code_capture"));
        assert_eq!(fragment.arguments.as_deref(), Some("{\"co"));
    }

    #[test]
    fn test_parse_finish_reason_without_delta() {
        let chunk = parse_chunk(r#"{"choices":[{"finish_reason":"tool_calls"}]}"#)
            .unwrap()
            .unwrap();
        assert_eq!(chunk.finish_reason.as_deref(), Some("tool_calls"));
    }

    #[test]
    fn test_parse_in_band_error() {
        let err = parse_chunk(r#"{"error":{"code":429,"message":"slow down"}}"#).unwrap_err();
        assert!(matches!(err, LlmError::ApiError { status: 429, .. }));
    }

    #[test]
    fn test_parse_malformed_payload() {
        assert!(matches!(parse_chunk("{nope"), Err(LlmError::JsonError(_))));
    }
}
