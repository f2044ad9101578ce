use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::review::FailurePolicy;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Extensions reviewed when `[review] extensions` is not set.
pub const DEFAULT_EXTENSIONS: &[&str] = &[
    "ts", "js", "tsx", "jsx", "py", "java", "go", "rs", "rb", "php", "cs", "cpp", "c", "h",
    "swift", "kt", "scala", "vue", "svelte", "html", "css", "scss", "sql",
];

/// Top-level configuration loaded from .sentinel-reviewer.toml.
///
/// All fields are optional. Secrets are normally supplied through the
/// environment and overlaid by [`Config::load`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub github: GitHubConfig,

    #[serde(default)]
    pub openai: OpenAiConfig,

    #[serde(default)]
    pub review: ReviewConfig,

    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GitHubConfig {
    /// Personal access token. Used when no App credentials are set, and for
    /// runs without an installation id. Falls back to GITHUB_TOKEN.
    pub token: Option<String>,
    /// GitHub App id (GITHUB_APP_ID)
    pub app_id: Option<u64>,
    /// App private key as PEM or base64-encoded PEM (GITHUB_PRIVATE_KEY)
    pub private_key: Option<String>,
    pub api_base: String,
    /// Shared secret for X-Hub-Signature-256 verification
    pub webhook_secret: Option<String>,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            token: None,
            app_id: None,
            private_key: None,
            api_base: "https://api.github.com".to_string(),
            webhook_secret: None,
        }
    }
}

impl GitHubConfig {
    /// App id and private key, when both are configured.
    pub fn app_credentials(&self) -> Option<(u64, &str)> {
        Some((self.app_id?, self.private_key.as_deref()?))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OpenAiConfig {
    pub api_key: Option<String>,
    pub endpoint: String,
    pub model: String,
    pub temperature: f32,
    pub review_max_tokens: u32,
    pub summary_max_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: "https://api.openai.com".to_string(),
            model: "gpt-4o-mini".to_string(),
            temperature: 0.3,
            review_max_tokens: 1000,
            summary_max_tokens: 500,
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReviewConfig {
    /// File extensions (without the dot) eligible for review
    pub extensions: Vec<String>,
    /// Files with at least this many changed lines are reviewed from the diff alone
    pub content_fetch_threshold: usize,
    pub failure_policy: FailurePolicy,
    /// Upper bound for every single GitHub or OpenAI call made by a run.
    /// Must be at least 1; zero is rejected at load time.
    pub call_timeout_secs: u64,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            content_fetch_threshold: 500,
            failure_policy: FailurePolicy::default(),
            call_timeout_secs: 120,
        }
    }
}

impl ReviewConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: "0.0.0.0:3000".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from .sentinel-reviewer.toml in the current directory,
    /// falling back to defaults, then overlay environment variables.
    pub fn load() -> Result<Config, ConfigError> {
        let path = Path::new(".sentinel-reviewer.toml");
        let mut config = if path.exists() {
            Self::read(path)?
        } else {
            Config::default()
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a specific path (useful for testing).
    pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
        let config = Self::read(path)?;
        config.validate()?;
        Ok(config)
    }

    fn read(path: &Path) -> Result<Config, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Reject settings that would make every run fail in a confusing way.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.review.call_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "review.call_timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.github.app_id.is_some() != self.github.private_key.is_some() {
            return Err(ConfigError::Invalid(
                "github.app_id and github.private_key must be set together".to_string(),
            ));
        }
        Ok(())
    }

    /// Values from the file win over the environment, except PORT which
    /// always rebinds the listener.
    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if self.github.token.is_none() {
            self.github.token = var("GITHUB_TOKEN");
        }
        if self.github.app_id.is_none() {
            if let Some(raw) = var("GITHUB_APP_ID") {
                let id = raw.trim().parse().map_err(|_| {
                    ConfigError::Invalid(format!("GITHUB_APP_ID is not a number: {}", raw))
                })?;
                self.github.app_id = Some(id);
            }
        }
        if self.github.private_key.is_none() {
            self.github.private_key = var("GITHUB_PRIVATE_KEY");
        }
        if self.github.webhook_secret.is_none() {
            self.github.webhook_secret = var("GITHUB_WEBHOOK_SECRET");
        }
        if self.openai.api_key.is_none() {
            self.openai.api_key = var("OPENAI_API_KEY");
        }
        if let Some(port) = var("PORT") {
            self.server.address = format!("0.0.0.0:{}", port);
        }
        Ok(())
    }
}
