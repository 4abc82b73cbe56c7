//! Application configuration: TOML file, then `FLOWSPHERE_*` environment overrides.

use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use flowsphere_notify::NotifyConfig;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::retry::RetryPolicy;

/// Default configuration file looked up in the working directory.
pub const CONFIG_FILE: &str = "flowsphere.toml";

/// Supabase project URL.
pub const ENV_SUPABASE_URL: &str = "FLOWSPHERE_SUPABASE_URL";
/// Supabase anonymous API key.
pub const ENV_SUPABASE_ANON_KEY: &str = "FLOWSPHERE_SUPABASE_ANON_KEY";
/// `OpenAI` API key.
pub const ENV_OPENAI_API_KEY: &str = "FLOWSPHERE_OPENAI_API_KEY";
/// Anthropic API key.
pub const ENV_ANTHROPIC_API_KEY: &str = "FLOWSPHERE_ANTHROPIC_API_KEY";
/// Master switch for AI features.
pub const ENV_ENABLE_AI_FEATURES: &str = "FLOWSPHERE_ENABLE_AI_FEATURES";
/// Use the local offline store instead of the remote database.
pub const ENV_ENABLE_OFFLINE_MODE: &str = "FLOWSPHERE_ENABLE_OFFLINE_MODE";
/// Application display name.
pub const ENV_APP_NAME: &str = "FLOWSPHERE_APP_NAME";
/// Deployment environment (`development`, `production`, ...).
pub const ENV_APP_ENV: &str = "FLOWSPHERE_APP_ENV";

const PLACEHOLDERS: [&str; 4] = [
    "your_supabase_project_url",
    "your_supabase_anon_key",
    "your_openai_api_key",
    "your_anthropic_api_key",
];

/// A credential whose value never shows up in logs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    /// Wrap a credential.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The raw credential.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<redacted>")
    }
}

/// Blank values and template placeholders count as missing.
fn configured(value: Option<&str>) -> Option<&str> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty() && !PLACEHOLDERS.contains(v))
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Remote database connection.
    pub database: DatabaseConfig,
    /// AI providers and limits.
    pub ai: AiConfig,
    /// Application identity.
    pub app: AppInfo,
    /// Feature switches.
    pub features: FeatureFlags,
    /// Retry and cache behaviour of the sync layer.
    pub sync: SyncConfig,
    /// Toast queue settings.
    pub notifications: NotifyConfig,
}

/// `[database]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Supabase project URL.
    pub url: Option<String>,
    /// Supabase anonymous key.
    pub anon_key: Option<Secret>,
}

impl DatabaseConfig {
    /// Usable project URL.
    #[must_use]
    pub fn url(&self) -> Option<&str> {
        configured(self.url.as_deref())
    }

    /// Usable anonymous key.
    #[must_use]
    pub fn anon_key(&self) -> Option<&str> {
        configured(self.anon_key.as_ref().map(Secret::expose))
    }
}

/// `[ai]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    /// Master switch; AI also needs at least one provider key.
    pub enabled: bool,
    /// Tried first.
    pub openai_api_key: Option<Secret>,
    /// Used when OpenAI fails or has no key.
    pub anthropic_api_key: Option<Secret>,
    /// OpenAI chat model.
    pub openai_model: String,
    /// Anthropic messages model.
    pub anthropic_model: String,
    /// Completion budget per request.
    pub max_tokens: u32,
    /// Sampling temperature, 0 to 2.
    pub temperature: f32,
    /// Requests allowed per rolling minute.
    pub rate_limit_per_minute: u32,
    /// Per-request timeout of provider calls.
    pub request_timeout_ms: u64,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            openai_api_key: None,
            anthropic_api_key: None,
            openai_model: "gpt-3.5-turbo".to_owned(),
            anthropic_model: "claude-3-sonnet-20240229".to_owned(),
            max_tokens: 500,
            temperature: 0.7,
            rate_limit_per_minute: 60,
            request_timeout_ms: 30_000,
        }
    }
}

impl AiConfig {
    /// Usable `OpenAI` key.
    #[must_use]
    pub fn openai_key(&self) -> Option<&str> {
        configured(self.openai_api_key.as_ref().map(Secret::expose))
    }

    /// Usable Anthropic key.
    #[must_use]
    pub fn anthropic_key(&self) -> Option<&str> {
        configured(self.anthropic_api_key.as_ref().map(Secret::expose))
    }

    /// Per-request timeout.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// `[app]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppInfo {
    /// Display name.
    pub name: String,
    /// Reported version.
    pub version: String,
    /// `development`, `staging` or `production`.
    pub environment: String,
}

impl Default for AppInfo {
    fn default() -> Self {
        Self {
            name: "FlowSphere".to_owned(),
            version: "1.0.0".to_owned(),
            environment: "development".to_owned(),
        }
    }
}

impl AppInfo {
    /// Whether this is a production deployment.
    #[must_use]
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }
}

/// `[features]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureFlags {
    /// Serve data from a local store instead of the remote database.
    pub offline_mode: bool,
    /// Snapshot file of the offline store; in-memory only when unset.
    pub offline_store: Option<PathBuf>,
}

/// `[sync]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Extra attempts for failed reads.
    pub retry_attempts: u32,
    /// Fixed delay between read attempts.
    pub retry_backoff_ms: u64,
    /// Timeout of database and auth requests.
    pub request_timeout_ms: u64,
    /// Refetch cached collections older than this.
    pub cache_max_age_ms: Option<u64>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            retry_attempts: 2,
            retry_backoff_ms: 1000,
            request_timeout_ms: 30_000,
            cache_max_age_ms: None,
        }
    }
}

impl SyncConfig {
    /// Read retry policy.
    #[must_use]
    pub const fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::none()
            .with_extra_attempts(self.retry_attempts)
            .with_backoff(Duration::from_millis(self.retry_backoff_ms))
    }

    /// Timeout of a single remote request.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Maximum age of cached collections.
    #[must_use]
    pub fn cache_max_age(&self) -> Option<Duration> {
        self.cache_max_age_ms.map(Duration::from_millis)
    }
}

/// Outcome of [`AppConfig::validate`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigReport {
    /// Problems that make the configuration unusable.
    pub errors: Vec<String>,
    /// Missing pieces that disable features.
    pub warnings: Vec<String>,
}

impl ConfigReport {
    /// True when there are no errors.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Log every warning.
    pub fn log_warnings(&self) {
        for warning in &self.warnings {
            warn!("{warning}");
        }
    }

    /// Turn errors into a single failure.
    ///
    /// # Errors
    /// Returns every error joined when the report is not valid.
    pub fn ensure_valid(&self) -> Result<()> {
        if self.is_valid() {
            return Ok(());
        }
        bail!("invalid configuration: {}", self.errors.join("; "));
    }
}

impl AppConfig {
    /// Load `path`, or defaults when it does not exist.
    ///
    /// # Errors
    /// Returns an error when the file exists but cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        toml::from_str(&contents).with_context(|| format!("failed to parse {}", path.display()))
    }

    /// [`Self::load`] followed by the process environment.
    ///
    /// # Errors
    /// Same as [`Self::load`].
    pub fn load_with_env(path: impl AsRef<Path>) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env();
        Ok(config)
    }

    /// Overlay `FLOWSPHERE_*` variables from the process environment.
    pub fn apply_env(&mut self) {
        let mut fetch = |key: &'static str| env::var(key).ok();
        self.apply_env_with(&mut fetch);
    }

    /// Overlay variables supplied by `fetch`.
    pub fn apply_env_with(&mut self, fetch: &mut impl FnMut(&'static str) -> Option<String>) {
        if let Some(url) = fetch(ENV_SUPABASE_URL) {
            self.database.url = Some(url);
        }
        if let Some(key) = fetch(ENV_SUPABASE_ANON_KEY) {
            self.database.anon_key = Some(Secret::new(key));
        }
        if let Some(key) = fetch(ENV_OPENAI_API_KEY) {
            self.ai.openai_api_key = Some(Secret::new(key));
        }
        if let Some(key) = fetch(ENV_ANTHROPIC_API_KEY) {
            self.ai.anthropic_api_key = Some(Secret::new(key));
        }
        if let Some(flag) = fetch_flag(fetch, ENV_ENABLE_AI_FEATURES) {
            self.ai.enabled = flag;
        }
        if let Some(flag) = fetch_flag(fetch, ENV_ENABLE_OFFLINE_MODE) {
            self.features.offline_mode = flag;
        }
        if let Some(name) = fetch(ENV_APP_NAME) {
            self.app.name = name;
        }
        if let Some(environment) = fetch(ENV_APP_ENV) {
            self.app.environment = environment;
        }
    }

    /// Whether the remote database can be used.
    #[must_use]
    pub fn database_enabled(&self) -> bool {
        self.database.url().is_some() && self.database.anon_key().is_some()
    }

    /// Whether AI requests go to a provider rather than the canned fallback.
    #[must_use]
    pub fn ai_enabled(&self) -> bool {
        self.ai.enabled && (self.ai.openai_key().is_some() || self.ai.anthropic_key().is_some())
    }

    /// Check the configuration without failing on missing credentials.
    #[must_use]
    pub fn validate(&self) -> ConfigReport {
        let mut report = ConfigReport::default();

        if self.database.url().is_none() {
            report
                .warnings
                .push("Supabase URL not configured - Database features will be disabled".to_owned());
        }
        if self.database.anon_key().is_none() {
            report.warnings.push(
                "Supabase API key not configured - Database features will be disabled".to_owned(),
            );
        }
        if self.ai.enabled && self.ai.openai_key().is_none() {
            report
                .warnings
                .push("OpenAI API key not configured - AI features will use fallbacks".to_owned());
        }

        if let Some(url) = self.database.url()
            && !(url.starts_with("https://") || url.starts_with("http://"))
        {
            report
                .errors
                .push(format!("database.url must be an http(s) URL, got '{url}'"));
        }
        if !(0.0..=2.0).contains(&self.ai.temperature) {
            report.errors.push(format!(
                "ai.temperature must be between 0 and 2, got {}",
                self.ai.temperature
            ));
        }
        if self.ai.max_tokens == 0 {
            report.errors.push("ai.max_tokens must be positive".to_owned());
        }
        if self.ai.rate_limit_per_minute == 0 {
            report
                .errors
                .push("ai.rate_limit_per_minute must be positive".to_owned());
        }
        if self.ai.request_timeout_ms == 0 || self.sync.request_timeout_ms == 0 {
            report.errors.push("request timeouts must be positive".to_owned());
        }
        if self.notifications.limit == 0 {
            report
                .errors
                .push("notifications.limit must be positive".to_owned());
        }
        report
    }
}

fn fetch_flag(
    fetch: &mut impl FnMut(&'static str) -> Option<String>,
    key: &'static str,
) -> Option<bool> {
    let raw = fetch(key)?;
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => {
            warn!(key, value = %raw, "Ignoring unrecognised boolean");
            None
        }
    }
}
