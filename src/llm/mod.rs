pub mod openai;
pub mod prompt;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{info, instrument};

use crate::config::OpenAiConfig;
use crate::review::{CollaboratorError, ReviewGenerator};
use openai::OpenAiClient;

const REVIEW_FALLBACK: &str = "Unable to generate review.";
const SUMMARY_FALLBACK: &str = "Unable to generate summary.";

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("OpenAI request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("OpenAI returned HTTP {status}: {snippet}")]
    HttpStatus { status: u16, snippet: String },

    #[error("OpenAI API key not found (set OPENAI_API_KEY or [openai] api_key)")]
    MissingApiKey,

    #[error("Invalid OpenAI endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Invalid OpenAI API key: {0}")]
    InvalidApiKey(String),
}

/// Review generator backed by OpenAI chat completions.
///
/// Holds no per-installation state, so one instance is shared by every run.
#[derive(Debug, Clone)]
pub struct OpenAiReviewer {
    client: OpenAiClient,
    review_max_tokens: u32,
    summary_max_tokens: u32,
}

impl OpenAiReviewer {
    pub fn new(config: &OpenAiConfig) -> Result<Self, LlmError> {
        let client = OpenAiClient::new(config)?;
        info!(model = %client.model(), endpoint = %config.endpoint, "OpenAI reviewer initialized");
        Ok(Self {
            client,
            review_max_tokens: config.review_max_tokens,
            summary_max_tokens: config.summary_max_tokens,
        })
    }
}

#[async_trait]
impl ReviewGenerator for OpenAiReviewer {
    #[instrument(
        skip(self, diff, content),
        fields(diff_len = diff.len(), has_content = content.is_some())
    )]
    async fn generate_file_review(
        &self,
        path: &str,
        diff: &str,
        content: Option<&str>,
    ) -> Result<String, CollaboratorError> {
        info!("reviewing file");
        let user = prompt::file_review(path, diff, content);
        let text = self
            .client
            .chat(prompt::REVIEW_SYSTEM_PROMPT, &user, self.review_max_tokens)
            .await?;
        Ok(text.unwrap_or_else(|| REVIEW_FALLBACK.to_string()))
    }

    #[instrument(skip(self, description, paths), fields(files = paths.len()))]
    async fn generate_summary(
        &self,
        title: &str,
        description: &str,
        paths: &[String],
    ) -> Result<String, CollaboratorError> {
        let user = prompt::summary(title, description, paths);
        let text = self
            .client
            .chat(prompt::SUMMARY_SYSTEM_PROMPT, &user, self.summary_max_tokens)
            .await?;
        Ok(text.unwrap_or_else(|| SUMMARY_FALLBACK.to_string()))
    }
}
