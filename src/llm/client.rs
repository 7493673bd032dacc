//! Core LLM client types and trait definitions

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::streaming::{ModelChunk, ModelStream};
use super::types::ChatRequest;

/// Streaming chat client. Each call sends the full history it is given.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Open a streamed completion; the returned stream yields decoded chunks
    async fn stream_chat(&self, request: ChatRequest) -> Result<ModelStream, LlmError>;

    /// Model identifier used when a request does not name one
    fn model(&self) -> &str;
}

/// Errors that can occur during LLM operations
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("API error {status}: {message}")]
    ApiError { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Missing API key: environment variable {env_var} not set")]
    MissingApiKey { env_var: String },

    #[error("Event source error: {0}")]
    EventSource(String),
}

impl LlmError {
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, LlmError::RateLimited { .. })
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::RateLimited { .. } => true,
            LlmError::ApiError { status, .. } => *status >= 500,
            LlmError::Network(_) => true,
            LlmError::InvalidResponse(_) => false,
            LlmError::JsonError(_) => false,
            LlmError::MissingApiKey { .. } => false,
            LlmError::EventSource(_) => true,
        }
    }
}

/// One scripted model turn for [`MockLlmClient`].
#[derive(Debug, Clone)]
pub enum ScriptedTurn {
    /// Stream these chunks, then end normally
    Chunks(Vec<ModelChunk>),
    /// Stream these chunks, then fail mid-stream
    BrokenStream(Vec<ModelChunk>, String),
    /// Fail before any chunk is produced
    Fail(String),
}

/// Replays scripted turns in order; records every request it receives.
///
/// Once the script runs out each further call fails, so a loop that asks for
/// more turns than expected surfaces as an error instead of hanging.
#[derive(Debug, Default)]
pub struct MockLlmClient {
    turns: Mutex<VecDeque<ScriptedTurn>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl MockLlmClient {
    pub fn new(turns: Vec<ScriptedTurn>) -> Self {
        Self {
            turns: Mutex::new(turns.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Same script played back every time a turn is requested
    pub fn repeating(turn: ScriptedTurn, times: usize) -> Self {
        Self::new(vec![turn; times])
    }

    /// Requests received so far
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn stream_chat(&self, request: ChatRequest) -> Result<ModelStream, LlmError> {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).push(request);

        let turn = self.turns.lock().unwrap_or_else(|e| e.into_inner()).pop_front();
        let items: Vec<Result<ModelChunk, LlmError>> = match turn {
            Some(ScriptedTurn::Chunks(chunks)) => chunks.into_iter().map(Ok).collect(),
            Some(ScriptedTurn::BrokenStream(chunks, message)) => chunks
                .into_iter()
                .map(Ok)
                .chain(std::iter::once(Err(LlmError::EventSource(message))))
                .collect(),
            Some(ScriptedTurn::Fail(message)) => {
                return Err(LlmError::ApiError { status: 503, message });
            }
            None => {
                return Err(LlmError::InvalidResponse("mock script exhausted".to_string()));
            }
        };

        Ok(Box::pin(futures::stream::iter(items)))
    }

    fn model(&self) -> &str {
        "mock-model"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::types::Message;
    use futures::StreamExt;

    #[test]
    fn test_llm_error_is_retryable() {
        assert!(
            LlmError::RateLimited {
                retry_after: Duration::from_secs(60)
            }
            .is_retryable()
        );
        assert!(
            LlmError::ApiError {
                status: 500,
                message: "Internal error".to_string()
            }
            .is_retryable()
        );
        assert!(
            !LlmError::ApiError {
                status: 400,
                message: "Bad request".to_string()
            }
            .is_retryable()
        );
        assert!(!LlmError::InvalidResponse("bad".to_string()).is_retryable());
        assert!(
            !LlmError::MissingApiKey {
                env_var: "X".to_string()
            }
            .is_retryable()
        );
    }

    #[tokio::test]
    async fn test_mock_replays_turns_in_order() {
        let client = MockLlmClient::new(vec![
            ScriptedTurn::Chunks(vec![ModelChunk::text("one")]),
            ScriptedTurn::Chunks(vec![ModelChunk::text("two")]),
        ]);
        let request = ChatRequest::new("m", vec![Message::user("q")], Vec::new());

        let mut first = client.stream_chat(request.clone()).await.unwrap();
        assert_eq!(first.next().await.unwrap().unwrap().content.as_deref(), Some("one"));
        assert!(first.next().await.is_none());

        let mut second = client.stream_chat(request.clone()).await.unwrap();
        assert_eq!(second.next().await.unwrap().unwrap().content.as_deref(), Some("two"));

        assert!(client.stream_chat(request).await.is_err());
        assert_eq!(client.request_count(), 3);
    }

    #[tokio::test]
    async fn test_mock_broken_stream_yields_error_last() {
        let client = MockLlmClient::new(vec![ScriptedTurn::BrokenStream(
            vec![ModelChunk::text("partial")],
            "connection reset".to_string(),
        )]);
        let mut stream = client
            .stream_chat(ChatRequest::new("m", Vec::new(), Vec::new()))
            .await
            .unwrap();

        assert!(stream.next().await.unwrap().is_ok());
        assert!(matches!(stream.next().await, Some(Err(LlmError::EventSource(_)))));
    }
}
