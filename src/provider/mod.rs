//! Completion service abstraction.
//!
//! The summarizer talks to the model only through [`LlmApi`]. The shipped
//! implementation is [`OpenAICompatClient`], which speaks the
//! `/chat/completions` protocol.
//!
//! # Example
//!
//! ```ignore
//! use tldr::provider::{AuthConfig, OpenAICompatClient, DEFAULT_BASE_URL};
//!
//! let client = OpenAICompatClient::new(DEFAULT_BASE_URL, AuthConfig::Bearer(key), timeout);
//! let completion = client.complete(request).await?;
//! ```

mod client;
mod error;
mod http;
mod openai_compat;
mod types;

pub use client::LlmApi;
pub use error::{Error, format_api_error};
pub use http::AuthConfig;
pub use openai_compat::OpenAICompatClient;
pub use types::*;

/// Default endpoint for the `OpenAI` API.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Environment variables checked for an API key when the config has none.
pub const API_KEY_ENV_VARS: &[&str] = &["TLDR_API_KEY", "OPENAI_API_KEY"];

/// Resolve the API key from an explicit value or the environment.
pub fn resolve_api_key(explicit: Option<&str>) -> Result<String, Error> {
    if let Some(key) = explicit.filter(|k| !k.is_empty()) {
        return Ok(key.to_string());
    }
    API_KEY_ENV_VARS
        .iter()
        .find_map(|var| std::env::var(var).ok().filter(|v| !v.is_empty()))
        .ok_or_else(|| Error::MissingApiKey {
            env_vars: API_KEY_ENV_VARS.iter().map(|s| (*s).to_string()).collect(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_api_key_wins() {
        assert_eq!(resolve_api_key(Some("sk-test")).unwrap(), "sk-test");
    }

    #[test]
    fn test_missing_api_key_lists_env_vars() {
        let err = Error::MissingApiKey {
            env_vars: API_KEY_ENV_VARS.iter().map(|s| (*s).to_string()).collect(),
        };
        assert!(err.to_string().contains("OPENAI_API_KEY"));
    }
}
