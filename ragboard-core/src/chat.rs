//! Streams an answer for one chat turn, with or without retrieved data.

use crate::config::{AnswerConfig, Config};
use crate::pipeline::RagPipeline;
use crate::provider::{Message, Provider, ProviderError, StreamSettings};
use crate::relay::{relay, ChunkSender, RelaySummary, StreamChunk};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Messages for a turn answered without board data.
///
/// The client-supplied history already ends with the current message, so it
/// is used as-is; without history the message is sent alone.
pub fn plain_messages(message: &str, history: Vec<Message>) -> Vec<Message> {
    if history.is_empty() {
        vec![Message::user(message)]
    } else {
        history
    }
}

/// Per-turn choices a client may send with its message.
///
/// Unset, blank or zero values fall back to the configured answer settings.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AnswerOverrides {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

impl AnswerOverrides {
    pub fn resolve(&self, defaults: &AnswerConfig) -> StreamSettings {
        StreamSettings {
            model: self
                .model
                .as_deref()
                .map(str::trim)
                .filter(|model| !model.is_empty())
                .map(str::to_string),
            temperature: self
                .temperature
                .filter(|t| *t > 0.0)
                .unwrap_or(defaults.temperature),
            max_tokens: self
                .max_tokens
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_tokens),
        }
    }
}

/// Answers chat turns, augmenting them with board data when the question asks for it.
pub struct ChatService {
    pipeline: RagPipeline,
    provider: Arc<dyn Provider>,
}

impl ChatService {
    pub fn new(config: Config, provider: Arc<dyn Provider>) -> Self {
        Self {
            pipeline: RagPipeline::new(config, Arc::clone(&provider)),
            provider,
        }
    }

    pub fn pipeline(&self) -> &RagPipeline {
        &self.pipeline
    }

    /// Builds the message list for a turn.
    ///
    /// A pipeline failure of any kind degrades to plain chat.
    pub async fn messages_for(&self, user_id: &str, message: &str, history: Vec<Message>) -> Vec<Message> {
        match self.pipeline.prepare(user_id, message).await {
            Ok(prompt) => {
                info!(user_id, "Answering with retrieved board data");
                vec![Message::user(prompt)]
            }
            Err(e) if e.is_chat_signal() => {
                debug!("Answering as plain chat");
                plain_messages(message, history)
            }
            Err(e) => {
                warn!(error = %e, "RAG pipeline failed, answering as plain chat");
                plain_messages(message, history)
            }
        }
    }

    /// Streams the answer for one turn into `sender`.
    ///
    /// Exactly one terminal chunk is sent, including when the upstream
    /// request itself fails.
    pub async fn stream_answer(
        &self,
        user_id: &str,
        message: &str,
        history: Vec<Message>,
        overrides: &AnswerOverrides,
        sender: &ChunkSender,
    ) -> Result<RelaySummary, ProviderError> {
        let messages = self.messages_for(user_id, message, history).await;
        let settings = overrides.resolve(&self.pipeline.config().answer);
        debug!(model = ?settings.model, temperature = settings.temperature, max_tokens = settings.max_tokens, "Streaming answer");

        let upstream = match self.provider.stream_chat(messages, settings).await {
            Ok(upstream) => upstream,
            Err(e) => {
                error!(error = %e, "Failed to start answer stream");
                let _ = sender.send(StreamChunk::done());
                return Err(e);
            }
        };

        Ok(relay(upstream, sender).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageConfig;
    use crate::provider::ByteStream;
    use crate::relay::Termination;
    use async_trait::async_trait;
    use futures::stream::{self, StreamExt};
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    /// Classifies everything as chat and streams a fixed reply.
    struct CannedProvider {
        stream_fails: bool,
        sent: Mutex<Vec<(Vec<Message>, StreamSettings)>>,
    }

    impl CannedProvider {
        fn new(stream_fails: bool) -> Arc<Self> {
            Arc::new(Self { stream_fails, sent: Mutex::new(Vec::new()) })
        }
    }

    #[async_trait]
    impl Provider for CannedProvider {
        async fn complete(&self, _prompt: &str) -> crate::provider::Result<String> {
            Ok("chat".to_string())
        }

        async fn stream_chat(
            &self,
            messages: Vec<Message>,
            settings: StreamSettings,
        ) -> crate::provider::Result<ByteStream> {
            self.sent.lock().unwrap().push((messages, settings));
            if self.stream_fails {
                return Err(ProviderError::Api { status: 503, body: "overloaded".to_string() });
            }
            let events = vec![
                Ok(b"data: {\"choices\":[{\"delta\":{\"content\":\"Hello\"}}]}\n\n".to_vec()),
                Ok(b"data: [DONE]\n\n".to_vec()),
            ];
            Ok(stream::iter(events).boxed())
        }
    }

    fn unreachable_db() -> Config {
        Config {
            storage: StorageConfig {
                db_path: "/nonexistent/ragboard/focalboard.db".to_string(),
                ..StorageConfig::default()
            },
            ..Config::default()
        }
    }

    fn drain(mut receiver: mpsc::UnboundedReceiver<StreamChunk>) -> Vec<StreamChunk> {
        let mut out = Vec::new();
        while let Ok(chunk) = receiver.try_recv() {
            out.push(chunk);
        }
        out
    }

    #[test]
    fn test_plain_messages_prefers_history() {
        assert_eq!(plain_messages("hi", Vec::new()), vec![Message::user("hi")]);

        let history = vec![Message::user("hi"), Message::assistant("hello"), Message::user("again")];
        assert_eq!(plain_messages("again", history.clone()), history);
    }

    #[test]
    fn test_overrides_fall_back_to_answer_config() {
        let defaults = AnswerConfig::default();
        let zeroed = AnswerOverrides {
            model: Some("  ".to_string()),
            temperature: Some(0.0),
            max_tokens: Some(0),
        };
        assert_eq!(zeroed.resolve(&defaults), StreamSettings { model: None, temperature: 0.7, max_tokens: 2000 });

        let chosen: AnswerOverrides =
            serde_json::from_str(r#"{"model":"qwen-max","temperature":0.3,"max_tokens":512}"#).unwrap();
        assert_eq!(
            chosen.resolve(&defaults),
            StreamSettings { model: Some("qwen-max".to_string()), temperature: 0.3, max_tokens: 512 }
        );
    }

    #[tokio::test]
    async fn test_overrides_reach_the_provider() {
        let provider = CannedProvider::new(false);
        let service = ChatService::new(unreachable_db(), provider.clone());
        let (sender, _receiver) = mpsc::unbounded_channel();
        let overrides = AnswerOverrides { model: Some("qwen-turbo".to_string()), max_tokens: Some(64), ..AnswerOverrides::default() };

        service.stream_answer("u1", "hello", Vec::new(), &overrides, &sender).await.unwrap();

        let sent = provider.sent.lock().unwrap();
        assert_eq!(sent[0].1, StreamSettings { model: Some("qwen-turbo".to_string()), temperature: 0.7, max_tokens: 64 });
    }

    #[tokio::test]
    async fn test_chat_turn_streams_plain_answer() {
        let provider = CannedProvider::new(false);
        let service = ChatService::new(unreachable_db(), provider.clone());
        let (sender, receiver) = mpsc::unbounded_channel();

        let summary = service
            .stream_answer("u1", "hello there", Vec::new(), &AnswerOverrides::default(), &sender)
            .await
            .unwrap();
        drop(sender);

        assert_eq!(summary.termination, Termination::DoneMarker);
        assert_eq!(drain(receiver), vec![StreamChunk::chunk("Hello"), StreamChunk::done()]);
        let sent = provider.sent.lock().unwrap();
        assert_eq!(sent[0].0, vec![Message::user("hello there")]);
        assert_eq!(sent[0].1, StreamSettings { model: None, temperature: 0.7, max_tokens: 2000 });
    }

    #[tokio::test]
    async fn test_pipeline_failure_degrades_to_chat() {
        let provider = CannedProvider::new(false);
        let service = ChatService::new(unreachable_db(), provider.clone());

        let messages = service.messages_for("u1", "我的任务", Vec::new()).await;
        assert_eq!(messages, vec![Message::user("我的任务")]);
    }

    #[tokio::test]
    async fn test_upstream_failure_still_sends_done() {
        let service = ChatService::new(unreachable_db(), CannedProvider::new(true));
        let (sender, receiver) = mpsc::unbounded_channel();

        let err = service
            .stream_answer("u1", "hello", Vec::new(), &AnswerOverrides::default(), &sender)
            .await
            .unwrap_err();
        drop(sender);

        assert!(matches!(err, ProviderError::Api { status: 503, .. }));
        assert_eq!(drain(receiver), vec![StreamChunk::done()]);
    }
}
