//! HTTP client wrapper for completion API requests.

use crate::provider::error::Error;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue, RETRY_AFTER};
use serde::{Serialize, de::DeserializeOwned};
use std::time::Duration;

/// Connection timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Authentication configuration.
#[derive(Clone)]
pub enum AuthConfig {
    /// Bearer token authentication (Authorization: Bearer {token}).
    Bearer(String),
    /// Custom header authentication (e.g., api-key: {key} on Azure deployments).
    ApiKey { header: String, key: String },
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bearer(_) => f.debug_tuple("Bearer").field(&"[REDACTED]").finish(),
            Self::ApiKey { header, .. } => f
                .debug_struct("ApiKey")
                .field("header", header)
                .field("key", &"[REDACTED]")
                .finish(),
        }
    }
}

/// HTTP client for completion API requests.
#[derive(Debug)]
pub struct HttpClient {
    client: reqwest::Client,
    base_url: String,
    auth: AuthConfig,
}

impl HttpClient {
    /// Create a new HTTP client with the given whole-request timeout.
    pub fn new(base_url: impl Into<String>, auth: AuthConfig, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(CONNECT_TIMEOUT.min(timeout))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth,
        }
    }

    /// Build headers including authentication.
    fn build_headers(&self) -> Result<HeaderMap, Error> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        match &self.auth {
            AuthConfig::Bearer(token) if token.is_empty() => {}
            AuthConfig::Bearer(token) => {
                let value = HeaderValue::from_str(&format!("Bearer {token}")).map_err(|_| {
                    Error::Api("Bearer token contains invalid header characters".into())
                })?;
                headers.insert(AUTHORIZATION, value);
            }
            AuthConfig::ApiKey { header, key } => {
                let name = reqwest::header::HeaderName::try_from(header)
                    .map_err(|_| Error::Api("API key header name is invalid".into()))?;
                let value = HeaderValue::from_str(key)
                    .map_err(|_| Error::Api("API key contains invalid header characters".into()))?;
                headers.insert(name, value);
            }
        }

        Ok(headers)
    }

    /// Make a POST request with JSON body and deserialize the response.
    pub async fn post_json<T: Serialize, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<R, Error> {
        let url = format!("{}{path}", self.base_url);
        let headers = self.build_headers()?;

        let response = self
            .client
            .post(&url)
            .headers(headers)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = parse_retry_after(&response);
            return Err(Error::RateLimited { retry_after });
        }
        let text = response.text().await?;

        if !status.is_success() {
            return Err(Error::Api(format!("HTTP {status}: {text}")));
        }

        serde_json::from_str(&text)
            .map_err(|e| Error::Api(format!("Failed to parse response: {e}\nBody: {text}")))
    }
}

/// Extract and parse `Retry-After` header from a response.
fn parse_retry_after(response: &reqwest::Response) -> Option<u64> {
    let value = response.headers().get(RETRY_AFTER)?;
    let s = value.to_str().ok()?;
    parse_retry_after_value(s)
}

/// Parse a `Retry-After` header value as seconds.
///
/// Handles integer and fractional seconds (rounds up). HTTP-date values and
/// non-finite numbers yield None.
fn parse_retry_after_value(s: &str) -> Option<u64> {
    let s = s.trim();
    if let Ok(secs) = s.parse::<u64>() {
        Some(secs.max(1))
    } else if let Ok(f) = s.parse::<f64>() {
        if f.is_finite() && f > 0.0 {
            Some((f.ceil() as u64).max(1))
        } else {
            None
        }
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(base_url: &str) -> HttpClient {
        HttpClient::new(
            base_url,
            AuthConfig::Bearer("test-token".into()),
            Duration::from_secs(5),
        )
    }

    #[test]
    fn test_bearer_auth() {
        let client = client("https://api.example.com");
        let headers = client.build_headers().unwrap();
        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Bearer test-token");
    }

    #[test]
    fn test_empty_bearer_sends_no_auth() {
        let client = HttpClient::new(
            "http://localhost:11434/v1",
            AuthConfig::Bearer(String::new()),
            Duration::from_secs(5),
        );
        let headers = client.build_headers().unwrap();
        assert!(headers.get(AUTHORIZATION).is_none());
    }

    #[test]
    fn test_api_key_auth() {
        let client = HttpClient::new(
            "https://example.openai.azure.com",
            AuthConfig::ApiKey {
                header: "api-key".into(),
                key: "secret".into(),
            },
            Duration::from_secs(5),
        );
        let headers = client.build_headers().unwrap();
        assert_eq!(headers.get("api-key").unwrap(), "secret");
    }

    #[test]
    fn test_trailing_slash_trimmed() {
        let client = client("https://api.example.com/v1/");
        assert_eq!(client.base_url, "https://api.example.com/v1");
    }

    #[test]
    fn test_parse_retry_after_integer() {
        assert_eq!(parse_retry_after_value("30"), Some(30));
        assert_eq!(parse_retry_after_value("0"), Some(1));
    }

    #[test]
    fn test_parse_retry_after_fractional() {
        assert_eq!(parse_retry_after_value("2.5"), Some(3));
        assert_eq!(parse_retry_after_value("0.1"), Some(1));
    }

    #[test]
    fn test_parse_retry_after_invalid() {
        assert_eq!(parse_retry_after_value(""), None);
        assert_eq!(
            parse_retry_after_value("Thu, 01 Jan 2026 00:00:00 GMT"),
            None
        );
        assert_eq!(parse_retry_after_value("-1.5"), None);
        assert_eq!(parse_retry_after_value("NaN"), None);
    }

    #[tokio::test]
    async fn test_post_json_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "7"))
            .mount(&server)
            .await;

        let result: Result<serde_json::Value, Error> = client(&server.uri())
            .post_json("/chat/completions", &serde_json::json!({}))
            .await;

        assert!(matches!(
            result,
            Err(Error::RateLimited {
                retry_after: Some(7)
            })
        ));
    }

    #[tokio::test]
    async fn test_post_json_error_status_keeps_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("authorization", "Bearer test-token"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .mount(&server)
            .await;

        let result: Result<serde_json::Value, Error> = client(&server.uri())
            .post_json("/chat/completions", &serde_json::json!({}))
            .await;

        match result {
            Err(Error::Api(msg)) => {
                assert!(msg.starts_with("HTTP 401"));
                assert!(msg.contains("bad key"));
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }
}
