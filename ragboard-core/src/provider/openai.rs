//! OpenAI-compatible chat-completions provider.
//!
//! Speaks the `/chat/completions` wire format used by DashScope compatible
//! mode, OpenAI and most hosted gateways.

use super::types::*;
use crate::config::LlmConfig;
use async_trait::async_trait;
use futures::StreamExt;
use tracing::{debug, error};

/// Upper bound on how much of an error body is kept.
const ERROR_BODY_LIMIT: usize = 4 << 20;

/// HTTP provider for any OpenAI-compatible endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiCompatProvider {
    config: LlmConfig,
    /// Injected credential; when `None` the environment is read per request
    api_key: Option<String>,
    http_client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// Creates a provider that reads its credential from the environment on each request.
    pub fn new(config: &LlmConfig) -> Self {
        Self {
            config: config.clone(),
            api_key: None,
            http_client: reqwest::Client::new(),
        }
    }

    /// Overrides the credential, bypassing the environment.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    fn credential(&self) -> Result<String> {
        self.api_key.clone().or_else(|| self.config.api_key()).ok_or_else(|| {
            error!(env = %self.config.api_key_env, "LLM credential is not set");
            ProviderError::MissingCredential(self.config.api_key_env.clone())
        })
    }

    async fn send(&self, request: &CompletionRequest, bounded: bool) -> Result<reqwest::Response> {
        let api_key = self.credential()?;

        let mut builder = self
            .http_client
            .post(&self.config.base_url)
            .bearer_auth(&api_key)
            .json(request);
        if bounded {
            builder = builder.timeout(self.config.timeout());
        }

        let response = builder.send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = read_body_limited(response, ERROR_BODY_LIMIT).await;
            error!(status, body = %body, "LLM API returned error");
            return Err(ProviderError::Api { status, body });
        }

        Ok(response)
    }
}

#[async_trait]
impl Provider for OpenAiCompatProvider {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let request = CompletionRequest::new(self.config.resolved_model(), vec![Message::user(prompt)])
            .with_sampling(self.config.temperature, self.config.max_tokens);

        let response = self.send(&request, true).await?;
        let parsed: CompletionResponse = response.json().await?;

        let content = parsed
            .choices
            .first()
            .ok_or(ProviderError::EmptyChoice)?
            .message_text()
            .unwrap_or_default()
            .to_string();
        debug!(model = %parsed.model, len = content.len(), "Completion received");
        Ok(content)
    }

    async fn stream_chat(&self, messages: Vec<Message>, settings: StreamSettings) -> Result<ByteStream> {
        let model = settings.model.unwrap_or_else(|| self.config.model.clone());
        let request = CompletionRequest::new(model, messages)
            .with_sampling(settings.temperature, settings.max_tokens)
            .streaming();

        let response = self.send(&request, false).await?;
        debug!(model = %request.model, "Streaming completion started");

        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(ProviderError::from));
        Ok(stream.boxed())
    }
}

/// Reads at most `limit` bytes of a response body, lossily decoded.
async fn read_body_limited(response: reqwest::Response, limit: usize) -> String {
    let mut stream = response.bytes_stream();
    let mut body = Vec::new();

    while let Some(Ok(chunk)) = stream.next().await {
        let remaining = limit.saturating_sub(body.len());
        body.extend_from_slice(&chunk[..chunk.len().min(remaining)]);
        if body.len() >= limit {
            break;
        }
    }

    String::from_utf8_lossy(&body).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keyless_config() -> LlmConfig {
        LlmConfig {
            base_url: "http://127.0.0.1:9/v1/chat/completions".to_string(),
            api_key_env: "RAGBOARD_TEST_KEY_THAT_IS_NEVER_SET".to_string(),
            ..LlmConfig::default()
        }
    }

    #[tokio::test]
    async fn test_missing_credential_fails_before_network() {
        let provider = OpenAiCompatProvider::new(&keyless_config());
        let err = provider.complete("hello").await.unwrap_err();
        assert!(matches!(err, ProviderError::MissingCredential(ref var) if var == "RAGBOARD_TEST_KEY_THAT_IS_NEVER_SET"));

        let err = provider
            .stream_chat(
                vec![Message::user("hello")],
                StreamSettings { model: None, temperature: 0.7, max_tokens: 10 },
            )
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ProviderError::MissingCredential(_)));
    }

    #[test]
    fn test_injected_key_is_used() {
        let provider = OpenAiCompatProvider::new(&keyless_config()).with_api_key("sk-test");
        assert_eq!(provider.credential().unwrap(), "sk-test");
    }

    #[test]
    fn test_credential_exported_after_construction_is_picked_up() {
        let provider = OpenAiCompatProvider::new(&LlmConfig {
            api_key_env: "RAGBOARD_TEST_LATE_KEY".to_string(),
            ..keyless_config()
        });
        assert!(matches!(provider.credential(), Err(ProviderError::MissingCredential(_))));

        std::env::set_var("RAGBOARD_TEST_LATE_KEY", "sk-late");
        assert_eq!(provider.credential().unwrap(), "sk-late");
        std::env::remove_var("RAGBOARD_TEST_LATE_KEY");
    }
}
