use serde::Deserialize;

use crate::pr::PullRequestRef;

/// The parts of a `pull_request` webhook delivery a review run needs.
#[derive(Debug, Deserialize)]
pub struct PullRequestEvent {
    pub action: String,
    /// Absent for plain repository webhooks that are not delivered to an App
    #[serde(default)]
    pub installation: Option<Installation>,
    pub repository: Repository,
    pub pull_request: PullRequest,
}

#[derive(Debug, Deserialize)]
pub struct Installation {
    pub id: u64,
}

#[derive(Debug, Deserialize)]
pub struct Repository {
    pub name: String,
    pub owner: Owner,
}

#[derive(Debug, Deserialize)]
pub struct Owner {
    pub login: String,
}

#[derive(Debug, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    pub head: Head,
}

#[derive(Debug, Deserialize)]
pub struct Head {
    pub sha: String,
}

impl PullRequestEvent {
    /// New PRs and pushes to an open PR trigger a review.
    pub fn triggers_review(&self) -> bool {
        matches!(self.action.as_str(), "opened" | "synchronize")
    }

    pub fn to_pull_request_ref(&self) -> PullRequestRef {
        PullRequestRef {
            installation_id: self.installation.as_ref().map_or(0, |i| i.id),
            owner: self.repository.owner.login.clone(),
            repo: self.repository.name.clone(),
            number: self.pull_request.number,
            head_sha: self.pull_request.head.sha.clone(),
            title: self.pull_request.title.clone(),
            description: self.pull_request.body.clone().unwrap_or_default(),
        }
    }
}

#[cfg(test)]
pub(crate) fn sample_event(action: &str) -> serde_json::Value {
    serde_json::json!({
        "action": action,
        "number": 42,
        "installation": { "id": 9001 },
        "repository": {
            "name": "repo",
            "full_name": "org/repo",
            "owner": { "login": "org" }
        },
        "pull_request": {
            "number": 42,
            "title": "Add OAuth2 login flow",
            "body": null,
            "head": { "sha": "abc123", "ref": "feature/login" }
        }
    })
}
