use crate::error::Error;
use crate::pipeline::DEFAULT_CONCURRENCY;
use crate::provider::{self, AuthConfig, LlmApi, OpenAICompatClient};
use crate::render::Format;
use crate::summarize::{
    BpeTokenCounter, DEFAULT_CONTEXT_CARRY, DEFAULT_RESERVED_OUTPUT, DEFAULT_RESERVED_OVERHEAD,
    DEFAULT_SYSTEM_PROMPT, Encoding, EstimateTokenCounter, ModelProfile, RetryPolicy, Summarizer,
    SummarizerSettings, TokenCounter, known_context_window,
};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Tokenizer override for models whose encoding can't be inferred from the id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenizerKind {
    Cl100kBase,
    O200kBase,
    /// ~4 characters per token; approximate, keep generous reservations.
    Estimate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub model: String,
    /// Overrides the built-in window for `model`. Required for unknown models.
    pub context_window: Option<usize>,
    pub reserved_output: usize,
    pub reserved_overhead: usize,
    /// Running-context carry-over budget in tokens.
    pub context_carry_tokens: usize,
    pub tokenizer: Option<TokenizerKind>,

    /// Falls back to `TLDR_API_KEY`, then `OPENAI_API_KEY`.
    pub api_key: Option<String>,
    /// Send the key in this header instead of `Authorization: Bearer`.
    pub api_key_header: Option<String>,
    pub base_url: String,

    pub system_prompt: String,
    /// Extra instruction added to every chunk prompt.
    pub prompt_focus: Option<String>,
    pub temperature: Option<f32>,

    pub request_timeout_secs: u64,
    /// Total attempts per completion call, including the first.
    pub max_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,

    /// Documents summarized at once.
    pub concurrency: usize,
    pub max_keywords: Option<usize>,
    pub format: Format,
}

impl Default for Config {
    fn default() -> Self {
        let retry = RetryPolicy::default();
        Self {
            model: "gpt-4o".to_string(),
            context_window: None,
            reserved_output: DEFAULT_RESERVED_OUTPUT,
            reserved_overhead: DEFAULT_RESERVED_OVERHEAD,
            context_carry_tokens: DEFAULT_CONTEXT_CARRY,
            tokenizer: None,
            api_key: None,
            api_key_header: None,
            base_url: provider::DEFAULT_BASE_URL.to_string(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            prompt_focus: None,
            temperature: Some(0.7),
            request_timeout_secs: retry.timeout.as_secs(),
            max_attempts: retry.max_attempts,
            retry_base_delay_ms: u64::try_from(retry.base_delay.as_millis()).unwrap_or(u64::MAX),
            retry_max_delay_ms: u64::try_from(retry.max_delay.as_millis()).unwrap_or(u64::MAX),
            concurrency: DEFAULT_CONCURRENCY,
            max_keywords: None,
            format: Format::default(),
        }
    }
}

impl Config {
    /// `<config dir>/tldr/config.toml`.
    #[must_use]
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .map(|d| d.join("tldr").join("config.toml"))
            .unwrap_or_else(|| PathBuf::from(".tldr/config.toml"))
    }

    /// Load from `path`, or from the default path if it exists.
    ///
    /// An explicit path must exist; a missing default file yields defaults.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let (config_path, required) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => (Self::default_path(), false),
        };

        if !required && !config_path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config {}", config_path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Invalid config {}", config_path.display()))?;
        Ok(config)
    }

    /// Window and reservations for the configured model.
    pub fn profile(&self) -> crate::Result<ModelProfile> {
        let context_window = self
            .context_window
            .or_else(|| known_context_window(&self.model))
            .ok_or_else(|| {
                Error::Configuration(format!(
                    "unknown context window for model '{}'; set `context_window`",
                    self.model
                ))
            })?;
        Ok(ModelProfile::new(
            self.model.clone(),
            context_window,
            self.reserved_output,
            self.reserved_overhead,
        ))
    }

    pub fn token_counter(&self) -> crate::Result<Arc<dyn TokenCounter>> {
        Ok(match self.tokenizer {
            Some(TokenizerKind::Cl100kBase) => Arc::new(BpeTokenCounter::with_encoding(
                &self.model,
                Encoding::Cl100kBase,
            )),
            Some(TokenizerKind::O200kBase) => Arc::new(BpeTokenCounter::with_encoding(
                &self.model,
                Encoding::O200kBase,
            )),
            Some(TokenizerKind::Estimate) => Arc::new(EstimateTokenCounter),
            None => Arc::new(BpeTokenCounter::for_model(&self.model)?),
        })
    }

    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            max_delay: Duration::from_millis(self.retry_max_delay_ms),
            timeout: Duration::from_secs(self.request_timeout_secs.max(1)),
        }
    }

    #[must_use]
    pub fn summarizer_settings(&self) -> SummarizerSettings {
        SummarizerSettings {
            system_prompt: self.system_prompt.clone(),
            prompt_focus: self.prompt_focus.clone(),
            temperature: self.temperature,
            context_carry_tokens: self.context_carry_tokens,
            max_keywords: self.max_keywords,
            retry: self.retry_policy(),
        }
    }

    pub fn provider(&self) -> anyhow::Result<Arc<dyn LlmApi>> {
        // Local servers usually run without a key
        let key = match provider::resolve_api_key(self.api_key.as_deref()) {
            Ok(key) => key,
            Err(_) if self.base_url != provider::DEFAULT_BASE_URL => String::new(),
            Err(e) => return Err(e.into()),
        };
        let auth = match &self.api_key_header {
            Some(header) => AuthConfig::ApiKey {
                header: header.clone(),
                key,
            },
            None => AuthConfig::Bearer(key),
        };
        Ok(Arc::new(OpenAICompatClient::new(
            self.base_url.clone(),
            auth,
            Duration::from_secs(self.request_timeout_secs.max(1)),
        )))
    }

    /// Summarizer wired to the configured provider and tokenizer.
    pub fn summarizer(&self) -> anyhow::Result<Summarizer> {
        let profile = self.profile()?;
        let counter = self.token_counter()?;
        let provider = self.provider()?;
        Summarizer::new(provider, counter, profile, self.summarizer_settings())
            .with_context(|| format!("Invalid budget for model '{}'", self.model))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.model, "gpt-4o");
        assert_eq!(config.temperature, Some(0.7));
        assert_eq!(config.concurrency, 2);
        assert_eq!(config.profile().unwrap().context_window, 128_000);
        assert_eq!(config.retry_policy(), RetryPolicy::default());
    }

    #[test]
    fn test_load_partial_file_keeps_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
model = "gpt-4"
context_carry_tokens = 256
prompt_focus = "Focus on product strategy."
tokenizer = "cl100k_base"
format = "markdown"
"#,
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.model, "gpt-4");
        assert_eq!(config.context_carry_tokens, 256);
        assert_eq!(config.prompt_focus.as_deref(), Some("Focus on product strategy."));
        assert_eq!(config.tokenizer, Some(TokenizerKind::Cl100kBase));
        assert_eq!(config.format, Format::Markdown);
        assert_eq!(config.reserved_output, DEFAULT_RESERVED_OUTPUT);
        assert_eq!(config.base_url, provider::DEFAULT_BASE_URL);
    }

    #[test]
    fn test_load_missing_explicit_path_fails() {
        let dir = TempDir::new().unwrap();
        let err = Config::load(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(err.to_string().contains("nope.toml"));
    }

    #[test]
    fn test_load_invalid_toml_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "concurrency = \"many\"").unwrap();
        assert!(Config::load(Some(&path)).is_err());
    }

    #[test]
    fn test_unknown_model_needs_window_and_tokenizer() {
        let mut config = Config {
            model: "local-llama".into(),
            ..Config::default()
        };
        assert!(matches!(config.profile(), Err(Error::Configuration(_))));
        assert!(config.token_counter().is_err());

        config.context_window = Some(32_768);
        config.tokenizer = Some(TokenizerKind::Estimate);
        assert_eq!(config.profile().unwrap().context_window, 32_768);
        assert_eq!(config.token_counter().unwrap().name(), "estimate");
    }

    #[test]
    fn test_summarizer_budget_from_config() {
        let config = Config {
            model: "gpt-4".into(),
            api_key: Some("sk-test".into()),
            context_carry_tokens: 1_000,
            ..Config::default()
        };
        let summarizer = config.summarizer().unwrap();
        let budget = summarizer.budget();
        assert_eq!(
            budget.max_input_tokens,
            8_192 - DEFAULT_RESERVED_OUTPUT - DEFAULT_RESERVED_OVERHEAD
        );
        assert_eq!(budget.chunk_tokens, budget.max_input_tokens - 1_000);
    }

    #[test]
    fn test_local_endpoint_without_key() {
        let config = Config {
            base_url: "http://localhost:11434/v1".into(),
            model: "llama3".into(),
            ..Config::default()
        };
        let provider = config.provider().unwrap();
        assert_eq!(provider.id(), "openai-compat");
    }

    #[test]
    fn test_config_round_trips_through_toml() {
        let config = Config {
            api_key_header: Some("api-key".into()),
            max_keywords: Some(10),
            ..Config::default()
        };
        let text = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.api_key_header.as_deref(), Some("api-key"));
        assert_eq!(parsed.max_keywords, Some(10));
    }
}
