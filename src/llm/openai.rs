//! OpenAI-compatible chat completions client
//!
//! Speaks the `/chat/completions` streaming protocol used by OpenRouter and
//! friends. Responses arrive as Server-Sent Events and are decoded into
//! [`ModelChunk`]s by [`parse_chunk`].

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use reqwest_eventsource::{Event, EventSource};

use crate::config::LlmConfig;
use crate::llm::client::{LlmClient, LlmError};
use crate::llm::streaming::{ModelStream, parse_chunk};
use crate::llm::types::ChatRequest;

/// Configuration for the OpenAI-compatible client
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub model: String,
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self::from(&LlmConfig::default())
    }
}

impl From<&LlmConfig> for OpenAiConfig {
    fn from(config: &LlmConfig) -> Self {
        Self {
            model: config.model.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout: Duration::from_millis(config.timeout_ms),
        }
    }
}

/// Streaming chat completions client
pub struct OpenAiClient {
    client: Client,
    api_key: String,
    config: OpenAiConfig,
}

impl OpenAiClient {
    /// Create a client reading its key from the environment variable `api_key_env`
    pub fn new(config: OpenAiConfig, api_key_env: &str) -> Result<Self, LlmError> {
        let api_key = std::env::var(api_key_env).map_err(|_| LlmError::MissingApiKey {
            env_var: api_key_env.to_string(),
        })?;

        Self::with_api_key(api_key, config)
    }

    /// Create a client with an explicit API key
    pub fn with_api_key(api_key: String, config: OpenAiConfig) -> Result<Self, LlmError> {
        let client = Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            client,
            api_key,
            config,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url)
    }
}

/// Map an event-source failure onto the client's error vocabulary.
async fn map_event_error(error: reqwest_eventsource::Error) -> LlmError {
    match error {
        reqwest_eventsource::Error::InvalidStatusCode(status, response) => {
            if status.as_u16() == 429 {
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|h| h.to_str().ok())
                    .and_then(|s| s.parse::<u64>().ok())
                    .unwrap_or(60);
                return LlmError::RateLimited {
                    retry_after: Duration::from_secs(retry_after),
                };
            }
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            LlmError::ApiError {
                status: status.as_u16(),
                message,
            }
        }
        reqwest_eventsource::Error::Transport(e) => LlmError::Network(e),
        other => LlmError::EventSource(other.to_string()),
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn stream_chat(&self, request: ChatRequest) -> Result<ModelStream, LlmError> {
        let mut request = request;
        if request.model.is_empty() {
            request.model = self.config.model.clone();
        }
        let body = request.to_body();

        log::debug!(
            "Opening chat stream: model={} messages={}",
            request.model,
            request.messages.len()
        );

        let builder = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body);

        let mut source =
            EventSource::new(builder).map_err(|e| LlmError::EventSource(e.to_string()))?;
        source.set_retry_policy(Box::new(reqwest_eventsource::retry::Never));

        // Surface request-level failures before handing out the stream.
        match source.next().await {
            Some(Ok(Event::Open)) => {}
            Some(Ok(Event::Message(_))) => {
                return Err(LlmError::InvalidResponse("message before stream open".to_string()));
            }
            Some(Err(e)) => {
                source.close();
                return Err(map_event_error(e).await);
            }
            None => return Err(LlmError::InvalidResponse("stream closed before open".to_string())),
        }

        let stream = async_stream::try_stream! {
            while let Some(event) = source.next().await {
                match event {
                    Ok(Event::Open) => continue,
                    Ok(Event::Message(message)) => {
                        if message.data.trim() == "[DONE]" {
                            break;
                        }
                        if let Some(chunk) = parse_chunk(&message.data)? {
                            yield chunk;
                        }
                    }
                    Err(reqwest_eventsource::Error::StreamEnded) => break,
                    Err(e) => {
                        let failure = map_event_error(e).await;
                        Err::<(), LlmError>(failure)?;
                    }
                }
            }
            source.close();
        };

        Ok(Box::pin(stream))
    }

    fn model(&self) -> &str {
        &self.config.model
    }
}

impl std::fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiClient")
            .field("model", &self.config.model)
            .field("base_url", &self.config.base_url)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_llm_config() {
        let config = OpenAiConfig::from(&LlmConfig {
            model: "m".to_string(),
            base_url: "https://example.test/v1/".to_string(),
            api_key_env: "UNUSED".to_string(),
            timeout_ms: 1500,
        });
        assert_eq!(config.model, "m");
        assert_eq!(config.base_url, "https://example.test/v1");
        assert_eq!(config.timeout, Duration::from_millis(1500));
    }

    #[test]
    fn test_missing_api_key() {
        let result =
            OpenAiClient::new(OpenAiConfig::default(), "DATACHAT_TEST_KEY_THAT_IS_NOT_SET");
        assert!(matches!(result, Err(LlmError::MissingApiKey { .. })));
    }

    #[test]
    fn test_with_api_key() {
        let client = OpenAiClient::with_api_key("k".to_string(), OpenAiConfig::default()).unwrap();
        assert_eq!(client.model(), "mistralai/devstral-2512:free");
        assert_eq!(client.endpoint(), "https://openrouter.ai/api/v1/chat/completions");
    }
}
