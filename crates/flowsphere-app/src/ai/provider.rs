//! Large-language-model providers behind a common completion call.

use crate::config::AiConfig;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::debug;

const OPENAI_URL: &str = "https://api.openai.com";
const ANTHROPIC_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Failure of a single provider call.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Transport failure.
    #[error("{provider} request failed: {source}")]
    Http {
        /// Provider name.
        provider: &'static str,
        /// Underlying client error.
        #[source]
        source: reqwest::Error,
    },

    /// The provider answered with a non-success status.
    #[error("{provider} API error ({status}): {message}")]
    Api {
        /// Provider name.
        provider: &'static str,
        /// HTTP status code.
        status: u16,
        /// Message from the error body, or the status reason.
        message: String,
    },

    /// The provider answered without any text.
    #[error("{provider} returned an empty completion")]
    Empty {
        /// Provider name.
        provider: &'static str,
    },
}

/// Something that turns a system and user prompt into text.
#[allow(async_fn_in_trait)]
pub trait TextProvider: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Complete `prompt` under `system` instructions.
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, ProviderError>;
}

/// Which HTTP API a [`LlmProvider`] speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    /// Chat completions API.
    OpenAi,
    /// Messages API.
    Anthropic,
}

impl ProviderKind {
    const fn name(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
        }
    }
}

/// HTTP-backed provider.
pub struct LlmProvider {
    kind: ProviderKind,
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl std::fmt::Debug for LlmProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmProvider")
            .field("kind", &self.kind)
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: Option<String>,
}

impl LlmProvider {
    /// Provider of `kind` using `model` and the limits from `config`.
    ///
    /// # Errors
    /// Returns an error when the HTTP client cannot be built.
    pub fn new(
        kind: ProviderKind,
        api_key: impl Into<String>,
        model: impl Into<String>,
        config: &AiConfig,
    ) -> Result<Self, ProviderError> {
        let http = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|source| ProviderError::Http {
                provider: kind.name(),
                source,
            })?;
        let base_url = match kind {
            ProviderKind::OpenAi => OPENAI_URL,
            ProviderKind::Anthropic => ANTHROPIC_URL,
        };
        Ok(Self {
            kind,
            http,
            base_url: base_url.to_owned(),
            api_key: api_key.into(),
            model: model.into(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }

    /// Point the provider at another host, e.g. a proxy.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_owned();
        self
    }

    /// Providers for every configured key, `OpenAI` first.
    ///
    /// # Errors
    /// Returns an error when an HTTP client cannot be built.
    pub fn from_config(config: &AiConfig) -> Result<Vec<Self>, ProviderError> {
        let mut providers = Vec::new();
        if let Some(key) = config.openai_key() {
            providers.push(Self::new(
                ProviderKind::OpenAi,
                key,
                config.openai_model.clone(),
                config,
            )?);
        }
        if let Some(key) = config.anthropic_key() {
            providers.push(Self::new(
                ProviderKind::Anthropic,
                key,
                config.anthropic_model.clone(),
                config,
            )?);
        }
        Ok(providers)
    }

    /// The API this provider speaks.
    #[must_use]
    pub const fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn http_error(&self, source: reqwest::Error) -> ProviderError {
        ProviderError::Http {
            provider: self.name(),
            source,
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<String, ProviderError> {
        let response = request.send().await.map_err(|err| self.http_error(err))?;
        let status = response.status();
        let body = response.text().await.map_err(|err| self.http_error(err))?;
        if status.is_success() {
            return Ok(body);
        }
        let message = serde_json::from_str::<ErrorEnvelope>(&body).map_or_else(
            |_| status.canonical_reason().unwrap_or("Unexpected response").to_owned(),
            |envelope| envelope.error.message,
        );
        Err(ProviderError::Api {
            provider: self.name(),
            status: status.as_u16(),
            message,
        })
    }

    fn empty(&self) -> ProviderError {
        ProviderError::Empty {
            provider: self.name(),
        }
    }

    async fn complete_openai(&self, system: &str, prompt: &str) -> Result<String, ProviderError> {
        let request = self
            .http
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&json!({
                "model": self.model,
                "messages": [
                    { "role": "system", "content": system },
                    { "role": "user", "content": prompt },
                ],
                "max_tokens": self.max_tokens,
                "temperature": self.temperature,
            }));
        let body = self.send(request).await?;
        let parsed: ChatResponse = serde_json::from_str(&body).map_err(|_| self.empty())?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| self.empty())
    }

    async fn complete_anthropic(
        &self,
        system: &str,
        prompt: &str,
    ) -> Result<String, ProviderError> {
        let request = self
            .http
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&json!({
                "model": self.model,
                "system": system,
                "max_tokens": self.max_tokens,
                "temperature": self.temperature,
                "messages": [{ "role": "user", "content": prompt }],
            }));
        let body = self.send(request).await?;
        let parsed: MessagesResponse = serde_json::from_str(&body).map_err(|_| self.empty())?;
        parsed
            .content
            .into_iter()
            .find_map(|block| block.text)
            .ok_or_else(|| self.empty())
    }
}

impl TextProvider for LlmProvider {
    fn name(&self) -> &'static str {
        self.kind.name()
    }

    async fn complete(&self, system: &str, prompt: &str) -> Result<String, ProviderError> {
        debug!(provider = self.name(), model = %self.model, "Requesting completion");
        match self.kind {
            ProviderKind::OpenAi => self.complete_openai(system, prompt).await,
            ProviderKind::Anthropic => self.complete_anthropic(system, prompt).await,
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, clippy::unwrap_used)]

    use super::*;
    use crate::config::Secret;

    #[test]
    fn providers_follow_configured_keys() {
        let mut config = AiConfig::default();
        assert!(LlmProvider::from_config(&config).unwrap().is_empty());

        config.anthropic_api_key = Some(Secret::new("sk-ant"));
        let providers = LlmProvider::from_config(&config).unwrap();
        assert_eq!(providers.len(), 1);
        assert_eq!(providers[0].kind(), ProviderKind::Anthropic);

        config.openai_api_key = Some(Secret::new("sk-oai"));
        let names: Vec<&str> = LlmProvider::from_config(&config)
            .unwrap()
            .iter()
            .map(TextProvider::name)
            .collect();
        assert_eq!(names, vec!["openai", "anthropic"]);
    }

    #[test]
    fn debug_output_hides_the_key() {
        let config = AiConfig::default();
        let provider = LlmProvider::new(ProviderKind::OpenAi, "sk-secret", "gpt", &config)
            .unwrap()
            .with_base_url("http://localhost:9/");
        let rendered = format!("{provider:?}");
        assert!(!rendered.contains("sk-secret"));
        assert!(rendered.contains("http://localhost:9"));
    }

    #[test]
    fn error_bodies_are_parsed() {
        let envelope: ErrorEnvelope =
            serde_json::from_str(r#"{"error":{"message":"Invalid API key","type":"auth"}}"#)
                .unwrap();
        assert_eq!(envelope.error.message, "Invalid API key");
    }
}
