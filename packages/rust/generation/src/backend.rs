//! The text-generation service seam.
//!
//! [`TextBackend`] is the only thing the client knows about the service;
//! [`AnthropicBackend`] talks to a Messages-style HTTP API with `reqwest`.

use std::time::Duration;

use async_trait::async_trait;
use lectio_shared::{GenerationConfig, LectioError, validate_api_key};
use serde::{Deserialize, Serialize};
use tracing::debug;

const API_VERSION: &str = "2023-06-01";

/// One prompt sent to the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
    pub max_tokens: u32,
}

impl CompletionRequest {
    pub fn new(system: impl Into<String>, user: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            max_tokens,
        }
    }

    /// Append a note (e.g. a correction) to the user prompt.
    pub fn amend(&mut self, note: &str) {
        self.user.push_str("\n\n");
        self.user.push_str(note);
    }
}

/// Raw service output with the usage it was billed for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub text: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Failure talking to the service.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BackendError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("rate limited (HTTP {status})")]
    RateLimited { status: u16 },

    #[error("service error (HTTP {status}): {body}")]
    Service { status: u16, body: String },

    #[error("request rejected (HTTP {status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("unreadable response: {0}")]
    Envelope(String),
}

impl BackendError {
    /// Whether a retry with backoff may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::RateLimited { .. } | Self::Service { .. }
        )
    }

    fn from_status(status: u16, body: String) -> Self {
        match status {
            429 => Self::RateLimited { status },
            408 | 500..=599 => Self::Service { status, body },
            _ => Self::Rejected { status, body },
        }
    }
}

/// A text-generation service.
#[async_trait]
pub trait TextBackend: Send + Sync {
    /// Check credentials and settings before any call is made.
    fn ensure_configured(&self) -> lectio_shared::Result<()> {
        Ok(())
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, BackendError>;
}

// ---------------------------------------------------------------------------
// AnthropicBackend
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: [Message<'a>; 1],
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    usage: Usage,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    input_tokens: u64,
    output_tokens: u64,
}

/// Backend for a Messages-style HTTP API.
#[derive(Debug, Clone)]
pub struct AnthropicBackend {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    api_key_env: String,
}

impl AnthropicBackend {
    /// Build from config, reading the API key from the configured
    /// environment variable. A missing key is reported by
    /// [`TextBackend::ensure_configured`], not here.
    pub fn from_config(config: &GenerationConfig) -> lectio_shared::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| LectioError::config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!("{}/v1/messages", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            api_key: validate_api_key(&config.api_key_env).ok(),
            api_key_env: config.api_key_env.clone(),
        })
    }

    /// Override the API key (tests and programmatic use).
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl TextBackend for AnthropicBackend {
    fn ensure_configured(&self) -> lectio_shared::Result<()> {
        match &self.api_key {
            Some(_) => Ok(()),
            None => validate_api_key(&self.api_key_env).map(|_| ()),
        }
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, BackendError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| BackendError::Rejected {
                status: 401,
                body: format!("no API key in ${}", self.api_key_env),
            })?;

        let body = MessagesRequest {
            model: &self.model,
            max_tokens: request.max_tokens,
            system: &request.system,
            messages: [Message {
                role: "user",
                content: &request.user,
            }],
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::from_status(status.as_u16(), body));
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|e| BackendError::Envelope(e.to_string()))?;

        let text: String = parsed
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text)
            .collect();

        debug!(
            input_tokens = parsed.usage.input_tokens,
            output_tokens = parsed.usage.output_tokens,
            "completion received"
        );

        Ok(Completion {
            text,
            input_tokens: parsed.usage.input_tokens,
            output_tokens: parsed.usage.output_tokens,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn backend_for(server: &MockServer) -> AnthropicBackend {
        let config = GenerationConfig {
            base_url: server.uri(),
            api_key_env: "LECTIO_TEST_UNSET_KEY_VAR".into(),
            ..GenerationConfig::default()
        };
        AnthropicBackend::from_config(&config)
            .unwrap()
            .with_api_key("test-key")
    }

    #[tokio::test]
    async fn completes_and_reports_usage() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "test-key"))
            .and(header("anthropic-version", API_VERSION))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "content": [{"type": "text", "text": "{\"synopsis\": \"A call to watch.\"}"}],
                "usage": {"input_tokens": 120, "output_tokens": 18}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let completion = backend_for(&server)
            .complete(&CompletionRequest::new("system", "user", 100))
            .await
            .unwrap();
        assert_eq!(completion.text, "{\"synopsis\": \"A call to watch.\"}");
        assert_eq!(completion.input_tokens, 120);
        assert_eq!(completion.output_tokens, 18);
    }

    #[tokio::test]
    async fn classifies_http_failures() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad request"))
            .mount(&server)
            .await;

        let backend = backend_for(&server);
        let request = CompletionRequest::new("system", "user", 100);

        let first = backend.complete(&request).await.unwrap_err();
        assert!(matches!(first, BackendError::RateLimited { status: 429 }));
        assert!(first.is_transient());

        let second = backend.complete(&request).await.unwrap_err();
        assert!(matches!(second, BackendError::Rejected { status: 400, .. }));
        assert!(!second.is_transient());
    }

    #[tokio::test]
    async fn malformed_envelope_is_not_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let err = backend_for(&server)
            .complete(&CompletionRequest::new("system", "user", 100))
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Envelope(_)));
        assert!(!err.is_transient());
    }

    #[test]
    fn missing_key_fails_configuration_check() {
        let config = GenerationConfig {
            api_key_env: "LECTIO_TEST_UNSET_KEY_VAR".into(),
            ..GenerationConfig::default()
        };
        let backend = AnthropicBackend::from_config(&config).unwrap();
        let err = backend.ensure_configured().unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("LECTIO_TEST_UNSET_KEY_VAR"));
    }

    #[test]
    fn amend_appends_to_user_prompt() {
        let mut request = CompletionRequest::new("system", "Summarize.", 100);
        request.amend("Previous attempt had error: empty.");
        assert_eq!(request.user, "Summarize.\n\nPrevious attempt had error: empty.");
    }
}
