use serde::Deserialize;

use crate::pr::ChangedFile;

/// What to do when generating the review for a single file fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Fail the whole run; nothing is published.
    #[default]
    Abort,
    /// Keep going and render a "review unavailable" section for the file.
    MarkUnavailable,
}

/// A changed file that passed the eligibility filter, borrowed from the
/// listing together with its (guaranteed present) patch.
#[derive(Debug, Clone, Copy)]
pub struct EligibleFile<'a> {
    pub file: &'a ChangedFile,
    pub patch: &'a str,
}

impl EligibleFile<'_> {
    pub fn path(&self) -> &str {
        &self.file.path
    }
}

/// Outcome of reviewing one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileReviewOutcome {
    Reviewed(String),
    /// Generation failed and the run is configured to continue
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileReviewResult {
    pub path: String,
    pub outcome: FileReviewOutcome,
}

impl FileReviewResult {
    pub fn reviewed(path: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            outcome: FileReviewOutcome::Reviewed(text.into()),
        }
    }

    pub fn unavailable(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            outcome: FileReviewOutcome::Unavailable(reason.into()),
        }
    }

    pub fn is_reviewed(&self) -> bool {
        matches!(self.outcome, FileReviewOutcome::Reviewed(_))
    }
}

/// One-paragraph description of what the PR does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrSummary(pub String);

/// The body posted back to the pull request. Built once per run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedComment {
    body: String,
}

impl ComposedComment {
    pub(crate) fn new(body: String) -> Self {
        Self { body }
    }

    pub fn body(&self) -> &str {
        &self.body
    }
}

/// How a successful run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Nothing worth reviewing; no comment was posted.
    NoEligibleFiles,
    Published { reviewed: usize, unavailable: usize },
}

impl std::fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunOutcome::NoEligibleFiles => write!(f, "no eligible files"),
            RunOutcome::Published {
                reviewed,
                unavailable,
            } => write!(
                f,
                "published ({} reviewed, {} unavailable)",
                reviewed, unavailable
            ),
        }
    }
}
