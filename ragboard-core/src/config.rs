use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Configuration for the whole retrieval pipeline.
///
/// Every endpoint, model name and limit the pipeline uses lives here, so tests
/// can point the pipeline at alternate endpoints, credentials or databases.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub answer: AnswerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub rag: RagConfig,
}

/// The chat-completion endpoint used for intent classification and SQL synthesis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Full URL of the OpenAI-compatible chat completions endpoint
    pub base_url: String,
    pub model: String,
    /// Environment variable that, when set, replaces `model` for classification and synthesis
    #[serde(default = "default_model_env")]
    pub model_env: Option<String>,
    /// Name of the environment variable holding the bearer credential
    pub api_key_env: String,
    pub temperature: f64,
    pub max_tokens: u32,
    /// Bound on a single classification/synthesis call
    pub timeout_secs: u64,
}

fn default_model_env() -> Option<String> {
    Some("DASHSCOPE_MODEL".to_string())
}

/// Trimmed value of an environment variable; blank values count as absent.
fn env_value(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

impl LlmConfig {
    /// Model for classification and synthesis calls, honouring `model_env`.
    pub fn resolved_model(&self) -> String {
        self.model_env
            .as_deref()
            .and_then(env_value)
            .unwrap_or_else(|| self.model.clone())
    }

    /// Reads the credential from the configured environment variable.
    ///
    /// Blank values count as absent.
    pub fn api_key(&self) -> Option<String> {
        env_value(&self.api_key_env)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://dashscope.aliyuncs.com/compatible-mode/v1/chat/completions"
                .to_string(),
            model: "qwen-plus".to_string(),
            model_env: default_model_env(),
            api_key_env: "DASHSCOPE_API_KEY".to_string(),
            temperature: 0.2,
            max_tokens: 800,
            timeout_secs: 30,
        }
    }
}

/// Sampling settings for the streamed, user-facing answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerConfig {
    pub temperature: f64,
    pub max_tokens: u32,
}

impl Default for AnswerConfig {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 2000,
        }
    }
}

/// Where the board data lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Storage engine name; only `sqlite3` is supported
    pub db_type: String,
    pub db_path: String,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_type: "sqlite3".to_string(),
            db_path: "./focalboard.db".to_string(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

/// Row caps for generated and fallback queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagConfig {
    pub row_limit: u32,
    pub fallback_limit: u32,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            row_limit: 50,
            fallback_limit: 50,
        }
    }
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from `config.yaml` if it exists, otherwise use defaults.
    pub fn load_or_default() -> Self {
        Self::load("config.yaml").unwrap_or_default()
    }
}
