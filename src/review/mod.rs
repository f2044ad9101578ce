pub mod compose;
pub mod filter;
pub mod runner;
pub mod types;

pub use types::{EligibleFile, FailurePolicy, FileReviewResult, PrSummary, RunOutcome};
pub use runner::{GitHubReviewRunner, ReviewRunner, ReviewTaskError};

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::config::ReviewConfig;
use crate::github::GitHubError;
use crate::llm::LlmError;
use crate::pr::{ChangedFile, FileStatus, PullRequestRef};

/// Failure reported by one of the run's external collaborators.
#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error(transparent)]
    GitHub(#[from] GitHubError),

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error("call timed out after {0:?}")]
    Timeout(Duration),
}

/// The step a run was in when it failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStep {
    ListFiles,
    Summary,
    FileReview { path: String },
    Publish,
}

impl std::fmt::Display for RunStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStep::ListFiles => write!(f, "listing changed files"),
            RunStep::Summary => write!(f, "generating summary"),
            RunStep::FileReview { path } => write!(f, "reviewing {}", path),
            RunStep::Publish => write!(f, "publishing comment"),
        }
    }
}

/// A fatal run failure. Nothing has been published when this is returned.
#[derive(Debug, Error)]
#[error("review of {pr} failed while {step}: {source}")]
pub struct RunError {
    /// owner/repo#number
    pub pr: String,
    pub step: RunStep,
    #[source]
    pub source: CollaboratorError,
}

impl RunError {
    fn new(pr: &PullRequestRef, step: RunStep, source: CollaboratorError) -> Self {
        Self {
            pr: pr.to_string(),
            step,
            source,
        }
    }
}

/// Lists the files a PR touches and serves their content.
#[async_trait]
pub trait ChangedFileSource: Send + Sync {
    async fn list_changed_files(
        &self,
        pr: &PullRequestRef,
    ) -> Result<Vec<ChangedFile>, CollaboratorError>;

    /// `Ok(None)` when the file does not exist at `revision`.
    async fn fetch_file_content(
        &self,
        pr: &PullRequestRef,
        path: &str,
        revision: &str,
    ) -> Result<Option<String>, CollaboratorError>;
}

/// Produces natural-language review text.
#[async_trait]
pub trait ReviewGenerator: Send + Sync {
    async fn generate_file_review(
        &self,
        path: &str,
        diff: &str,
        content: Option<&str>,
    ) -> Result<String, CollaboratorError>;

    async fn generate_summary(
        &self,
        title: &str,
        description: &str,
        paths: &[String],
    ) -> Result<String, CollaboratorError>;
}

/// Attaches a review comment to the pull request.
#[async_trait]
pub trait CommentPublisher: Send + Sync {
    async fn publish_comment(
        &self,
        pr: &PullRequestRef,
        body: &str,
    ) -> Result<(), CollaboratorError>;
}

/// Drives one review run: list, filter, summarize, review each file,
/// compose, publish.
///
/// Collaborators are injected so a run is scoped to a single installation's
/// credentials. All calls are issued one at a time.
pub struct Orchestrator {
    source: Arc<dyn ChangedFileSource>,
    generator: Arc<dyn ReviewGenerator>,
    publisher: Arc<dyn CommentPublisher>,
    config: ReviewConfig,
}

impl Orchestrator {
    pub fn new(
        source: Arc<dyn ChangedFileSource>,
        generator: Arc<dyn ReviewGenerator>,
        publisher: Arc<dyn CommentPublisher>,
        config: ReviewConfig,
    ) -> Self {
        Self {
            source,
            generator,
            publisher,
            config,
        }
    }

    /// Run the full pipeline for `pr`.
    ///
    /// Returns [`RunOutcome::NoEligibleFiles`] without touching the
    /// generator or publisher when nothing qualifies for review.
    #[instrument(
        skip(self, pr),
        fields(owner = %pr.owner, repo = %pr.repo, pr = pr.number, head = %pr.head_sha)
    )]
    pub async fn run(&self, pr: &PullRequestRef) -> Result<RunOutcome, RunError> {
        info!("starting review");

        let files = self
            .call(self.source.list_changed_files(pr))
            .await
            .map_err(|e| RunError::new(pr, RunStep::ListFiles, e))?;

        let eligible = filter::select_eligible(&files, &self.config.extensions);
        if eligible.is_empty() {
            info!(listed = files.len(), "no reviewable files found");
            return Ok(RunOutcome::NoEligibleFiles);
        }
        info!(listed = files.len(), eligible = eligible.len(), "found reviewable files");

        let paths: Vec<String> = eligible.iter().map(|f| f.path().to_string()).collect();
        let summary = self
            .call(self.generator.generate_summary(&pr.title, &pr.description, &paths))
            .await
            .map(PrSummary)
            .map_err(|e| RunError::new(pr, RunStep::Summary, e))?;
        debug!(summary_len = summary.0.len(), "summary ready");

        let mut results = Vec::with_capacity(eligible.len());
        for file in &eligible {
            results.push(self.review_file(pr, file).await?);
        }

        let comment = compose::compose(&summary, &results);
        let reviewed = results.iter().filter(|r| r.is_reviewed()).count();
        let unavailable = results.len() - reviewed;

        self.call(self.publisher.publish_comment(pr, comment.body()))
            .await
            .map_err(|e| RunError::new(pr, RunStep::Publish, e))?;

        info!(reviewed, unavailable, "review posted");
        Ok(RunOutcome::Published {
            reviewed,
            unavailable,
        })
    }

    #[instrument(
        skip(self, pr, file),
        fields(path = %file.path(), status = %file.file.status, changes = file.file.changes)
    )]
    async fn review_file(
        &self,
        pr: &PullRequestRef,
        file: &EligibleFile<'_>,
    ) -> Result<FileReviewResult, RunError> {
        let content = if self.wants_content(file.file) {
            self.fetch_content(pr, file.path()).await
        } else {
            debug!("skipping content fetch");
            None
        };

        let review = self
            .call(
                self.generator
                    .generate_file_review(file.path(), file.patch, content.as_deref()),
            )
            .await;

        match review {
            Ok(text) => Ok(FileReviewResult::reviewed(file.path(), text)),
            Err(e) => match self.config.failure_policy {
                FailurePolicy::Abort => Err(RunError::new(
                    pr,
                    RunStep::FileReview {
                        path: file.path().to_string(),
                    },
                    e,
                )),
                FailurePolicy::MarkUnavailable => {
                    warn!(error = %e, "file review failed, marking unavailable");
                    Ok(FileReviewResult::unavailable(file.path(), e.to_string()))
                }
            },
        }
    }

    fn wants_content(&self, file: &ChangedFile) -> bool {
        file.status != FileStatus::Removed && file.changes < self.config.content_fetch_threshold
    }

    /// Full-file context is optional; any failure degrades to diff-only review.
    async fn fetch_content(&self, pr: &PullRequestRef, path: &str) -> Option<String> {
        match self
            .call(self.source.fetch_file_content(pr, path, &pr.head_sha))
            .await
        {
            Ok(content) => content,
            Err(e) => {
                warn!(error = %e, "could not fetch file content, reviewing diff only");
                None
            }
        }
    }

    async fn call<T>(
        &self,
        fut: impl Future<Output = Result<T, CollaboratorError>>,
    ) -> Result<T, CollaboratorError> {
        let limit = self.config.call_timeout();
        tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| CollaboratorError::Timeout(limit))?
    }
}
