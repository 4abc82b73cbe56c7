//! Productivity assistant over interchangeable text providers.
//!
//! Requests are rate limited locally before any network call. Providers are
//! tried in order; when all of them fail, or none is configured, callers get
//! a canned apology instead of an error.

mod parse;
mod provider;
mod rate_limit;

pub use parse::{AiAction, AiResponse, TimeBlock, bullets, parse_response, parse_time_blocks};
pub use provider::{LlmProvider, ProviderError, ProviderKind, TextProvider};
pub use rate_limit::RateLimiter;

use crate::config::AppConfig;
use crate::error::AppError;
use tracing::{debug, error, warn};

/// Instructions sent with every prompt.
pub const SYSTEM_PROMPT: &str = "You are FlowSphere, an AI productivity assistant. Help users with task management, scheduling, and productivity insights.";

const FALLBACK_CONTENT: &str = "I'm having trouble connecting to my AI services right now. Please try again later, or check your internet connection.";
const FALLBACK_SUGGESTIONS: [&str; 3] = [
    "Try again in a few minutes",
    "Check your internet connection",
    "Contact support if the problem persists",
];

impl AiResponse {
    /// The canned answer used when no provider can help.
    #[must_use]
    pub fn fallback() -> Self {
        Self {
            content: FALLBACK_CONTENT.to_owned(),
            suggestions: FALLBACK_SUGGESTIONS.iter().map(|s| (*s).to_owned()).collect(),
            actions: Vec::new(),
            fallback: true,
        }
    }
}

/// Assistant façade used by the rest of the application.
#[derive(Debug)]
pub struct AiService<P> {
    providers: Vec<P>,
    limiter: RateLimiter,
    enabled: bool,
}

impl AiService<LlmProvider> {
    /// Service built from `[ai]` settings; disabled when no key is usable.
    ///
    /// # Errors
    /// Returns an error when an HTTP client cannot be built.
    pub fn from_config(config: &AppConfig) -> Result<Self, ProviderError> {
        let providers = if config.ai_enabled() {
            LlmProvider::from_config(&config.ai)?
        } else {
            Vec::new()
        };
        Ok(Self::new(
            providers,
            RateLimiter::per_minute(config.ai.rate_limit_per_minute),
        ))
    }
}

impl<P: TextProvider> AiService<P> {
    /// Service over `providers`, tried in order.
    #[must_use]
    pub fn new(providers: Vec<P>, limiter: RateLimiter) -> Self {
        let enabled = !providers.is_empty();
        Self {
            providers,
            limiter,
            enabled,
        }
    }

    /// Whether requests reach a provider.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Answer `prompt`.
    ///
    /// When AI is disabled the canned answer is returned without touching
    /// the rate limit.
    ///
    /// # Errors
    /// [`AppError::RateLimited`] when the local quota is exhausted; nothing
    /// is sent in that case.
    pub async fn generate_response(&self, prompt: &str) -> Result<AiResponse, AppError> {
        if !self.enabled {
            debug!("AI disabled; using fallback response");
            return Ok(AiResponse::fallback());
        }
        self.limiter.try_acquire().map_err(|retry_after| {
            warn!(?retry_after, "AI rate limit exceeded");
            AppError::RateLimited { retry_after }
        })?;
        for provider in &self.providers {
            match provider.complete(SYSTEM_PROMPT, prompt).await {
                Ok(content) => {
                    debug!(provider = provider.name(), "Completion received");
                    return Ok(parse_response(&content));
                }
                Err(err) => warn!(provider = provider.name(), error = %err, "Provider failed; trying next"),
            }
        }
        error!("All AI providers failed");
        Ok(AiResponse::fallback())
    }

    /// Actionable tasks mentioned in `text`.
    ///
    /// # Errors
    /// [`AppError::RateLimited`].
    pub async fn extract_tasks_from_text(&self, text: &str) -> Result<Vec<String>, AppError> {
        let prompt = format!(
            "Extract actionable tasks from the following text. Return only the tasks, one per line, starting with \"-\":\n\nText: {text}\n\nTasks:"
        );
        let response = self.generate_response(&prompt).await?;
        if response.fallback {
            return Ok(Vec::new());
        }
        Ok(bullets(&response.content))
    }

    /// Summary and action items of `meeting_notes`.
    ///
    /// # Errors
    /// [`AppError::RateLimited`].
    pub async fn generate_meeting_summary(&self, meeting_notes: &str) -> Result<String, AppError> {
        let prompt = format!(
            "Summarize the following meeting notes and extract key action items:\n\n{meeting_notes}\n\nSummary:"
        );
        Ok(self.generate_response(&prompt).await?.content)
    }

    /// Focus sessions for `tasks`.
    ///
    /// # Errors
    /// [`AppError::RateLimited`].
    pub async fn suggest_time_blocks(&self, tasks: &[&str]) -> Result<Vec<TimeBlock>, AppError> {
        let prompt = format!(
            "Suggest time blocks for the following tasks. For each task, suggest:\n1. A focused title\n2. Duration in minutes (15, 30, 45, 60, 90, 120)\n3. Priority (high, medium, low)\n\nTasks: {}\n\nFormat each suggestion as: \"Title | Duration | Priority\"",
            tasks.join(", ")
        );
        let response = self.generate_response(&prompt).await?;
        if response.fallback {
            return Ok(Vec::new());
        }
        Ok(parse_time_blocks(&response.content))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, clippy::unwrap_used)]

    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Scripted {
        name: &'static str,
        replies: Mutex<Vec<Result<String, u16>>>,
        calls: AtomicUsize,
        prompts: Mutex<Vec<String>>,
    }

    impl Scripted {
        fn new(name: &'static str, replies: Vec<Result<&str, u16>>) -> Self {
            Self {
                name,
                replies: Mutex::new(
                    replies
                        .into_iter()
                        .rev()
                        .map(|r| r.map(str::to_owned))
                        .collect(),
                ),
                calls: AtomicUsize::new(0),
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn always(name: &'static str, reply: &str) -> Self {
            Self::new(name, vec![Ok(reply); 128])
        }
    }

    impl TextProvider for &Scripted {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn complete(&self, system: &str, prompt: &str) -> Result<String, ProviderError> {
            assert_eq!(system, SYSTEM_PROMPT);
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().unwrap().push(prompt.to_owned());
            match self.replies.lock().unwrap().pop() {
                Some(Ok(text)) => Ok(text),
                Some(Err(status)) => Err(ProviderError::Api {
                    provider: self.name,
                    status,
                    message: "scripted failure".to_owned(),
                }),
                None => Err(ProviderError::Empty {
                    provider: self.name,
                }),
            }
        }
    }

    #[tokio::test]
    async fn second_provider_answers_when_the_first_fails() {
        let primary = Scripted::new("primary", vec![Err(500)]);
        let backup = Scripted::always("backup", "- Take a break\nACTION: Start timer");
        let service = AiService::new(vec![&primary, &backup], RateLimiter::per_minute(60));
        let response = service.generate_response("help").await.unwrap();
        assert!(!response.fallback);
        assert_eq!(response.suggestions, vec!["Take a break"]);
        assert_eq!(response.actions[0].title, "Start timer");
        assert_eq!(primary.calls.load(Ordering::SeqCst), 1);
        assert_eq!(backup.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn all_providers_failing_yields_the_canned_answer() {
        let primary = Scripted::new("primary", vec![Err(500)]);
        let backup = Scripted::new("backup", vec![Err(401)]);
        let service = AiService::new(vec![&primary, &backup], RateLimiter::per_minute(60));
        let response = service.generate_response("help").await.unwrap();
        assert!(response.fallback);
        assert_eq!(response.content, FALLBACK_CONTENT);
        assert_eq!(response.suggestions.len(), 3);
    }

    #[tokio::test]
    async fn sixty_first_request_is_rate_limited_without_a_call() {
        let provider = Scripted::always("primary", "ok");
        let service = AiService::new(vec![&provider], RateLimiter::per_minute(60));
        for _ in 0..60 {
            service.generate_response("ping").await.unwrap();
        }
        let err = service.generate_response("ping").await.unwrap_err();
        assert!(matches!(err, AppError::RateLimited { .. }));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 60);
    }

    #[tokio::test]
    async fn disabled_service_skips_the_limiter() {
        let service: AiService<&Scripted> = AiService::new(Vec::new(), RateLimiter::per_minute(1));
        assert!(!service.is_enabled());
        for _ in 0..3 {
            assert!(service.generate_response("x").await.unwrap().fallback);
        }
        assert!(service.extract_tasks_from_text("x").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn helpers_shape_prompts_and_parse_replies() {
        let provider = Scripted::new(
            "primary",
            vec![
                Ok("- Send invoice\n- Book venue\nThanks"),
                Ok("Quarterly planning recap"),
                Ok("Write draft | 60 | High\nInbox zero | 15 | low"),
            ],
        );
        let service = AiService::new(vec![&provider], RateLimiter::per_minute(60));

        let tasks = service
            .extract_tasks_from_text("we need to send the invoice and book a venue")
            .await
            .unwrap();
        assert_eq!(tasks, vec!["Send invoice", "Book venue"]);

        let summary = service.generate_meeting_summary("notes").await.unwrap();
        assert_eq!(summary, "Quarterly planning recap");

        let blocks = service
            .suggest_time_blocks(&["draft", "inbox"])
            .await
            .unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[1].duration_minutes, 15);

        let prompts = provider.prompts.lock().unwrap();
        assert!(prompts[0].ends_with("Text: we need to send the invoice and book a venue\n\nTasks:"));
        assert!(prompts[1].starts_with("Summarize the following meeting notes"));
        assert!(prompts[2].contains("Tasks: draft, inbox"));
    }
}
