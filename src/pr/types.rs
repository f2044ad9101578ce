use serde::Deserialize;

/// Identity of the pull request a review run targets.
///
/// Built once from the triggering event and never mutated afterwards;
/// every step of the run borrows it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestRef {
    /// GitHub App installation the event was delivered for
    pub installation_id: u64,
    pub owner: String,
    pub repo: String,
    /// PR number (e.g., 42)
    pub number: u64,
    /// Head commit the review is anchored to
    pub head_sha: String,
    /// PR title, used for the summary
    pub title: String,
    /// PR body; empty when the author left none
    pub description: String,
}

impl std::fmt::Display for PullRequestRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}#{}", self.owner, self.repo, self.number)
    }
}

/// Change status as reported by the GitHub "list pull request files" API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Added,
    Modified,
    Removed,
    Renamed,
    Copied,
    Changed,
    Unchanged,
}

impl std::fmt::Display for FileStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FileStatus::Added => "added",
            FileStatus::Modified => "modified",
            FileStatus::Removed => "removed",
            FileStatus::Renamed => "renamed",
            FileStatus::Copied => "copied",
            FileStatus::Changed => "changed",
            FileStatus::Unchanged => "unchanged",
        };
        f.write_str(s)
    }
}

/// A single file touched by the PR.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChangedFile {
    /// File path (e.g., "src/auth/config.rs")
    #[serde(rename = "filename")]
    pub path: String,
    pub status: FileStatus,
    /// Lines added plus lines deleted
    pub changes: usize,
    /// Unified diff for this file. GitHub omits it for binaries, pure
    /// renames and very large diffs.
    #[serde(default)]
    pub patch: Option<String>,
}

/// Represents the parsed components of a GitHub PR URL.
#[derive(Debug, Clone)]
pub struct PrUrl {
    pub owner: String,
    pub repo: String,
    pub pr_number: u64,
}
