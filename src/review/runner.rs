use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use super::compose::PreviewPublisher;
use super::{CommentPublisher, Orchestrator, ReviewGenerator, RunError, RunOutcome};
use crate::config::{GitHubConfig, ReviewConfig};
use crate::github::{GitHubClient, GitHubError};
use crate::pr::PullRequestRef;

#[derive(Debug, Error)]
pub enum ReviewTaskError {
    #[error("could not build GitHub client for installation {installation_id}: {source}")]
    Client {
        installation_id: u64,
        #[source]
        source: GitHubError,
    },

    #[error(transparent)]
    Run(#[from] RunError),
}

/// Starts one complete review run for a pull request.
#[async_trait]
pub trait ReviewRunner: Send + Sync {
    async fn review(&self, pr: PullRequestRef) -> Result<RunOutcome, ReviewTaskError>;
}

/// Runs reviews against GitHub with a client scoped to the event's
/// installation. The review generator is shared across runs.
pub struct GitHubReviewRunner {
    github: GitHubConfig,
    review: ReviewConfig,
    generator: Arc<dyn ReviewGenerator>,
    dry_run: bool,
}

impl GitHubReviewRunner {
    pub fn new(
        github: GitHubConfig,
        review: ReviewConfig,
        generator: Arc<dyn ReviewGenerator>,
        dry_run: bool,
    ) -> Self {
        Self {
            github,
            review,
            generator,
            dry_run,
        }
    }

    async fn orchestrator(&self, installation_id: u64) -> Result<Orchestrator, ReviewTaskError> {
        let client = GitHubClient::for_installation(&self.github, installation_id)
            .await
            .map(Arc::new)
            .map_err(|source| ReviewTaskError::Client {
                installation_id,
                source,
            })?;
        let publisher: Arc<dyn CommentPublisher> = if self.dry_run {
            Arc::new(PreviewPublisher)
        } else {
            client.clone()
        };
        Ok(Orchestrator::new(
            client,
            self.generator.clone(),
            publisher,
            self.review.clone(),
        ))
    }
}

#[async_trait]
impl ReviewRunner for GitHubReviewRunner {
    async fn review(&self, pr: PullRequestRef) -> Result<RunOutcome, ReviewTaskError> {
        let orchestrator = self.orchestrator(pr.installation_id).await?;
        Ok(orchestrator.run(&pr).await?)
    }
}
