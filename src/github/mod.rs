mod app;

use async_trait::async_trait;
use base64::Engine;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::config::GitHubConfig;
use crate::pr::{ChangedFile, PrUrl, PullRequestRef};
use crate::review::{ChangedFileSource, CollaboratorError, CommentPublisher};

const USER_AGENT: &str = "sentinel-reviewer";
const FILES_PER_PAGE: usize = 100;
// GitHub stops listing PR files after 3000 entries.
const MAX_FILE_PAGES: usize = 30;

#[derive(Debug, Error)]
pub enum GitHubError {
    #[error("GitHub API request failed: {0}")]
    ApiRequest(#[from] reqwest::Error),

    #[error("GitHub returned HTTP {status}: {message}")]
    HttpStatus { status: u16, message: String },

    #[error("Invalid GitHub API base URL: {0}")]
    InvalidBaseUrl(String),

    #[error("GitHub token not found (set GITHUB_TOKEN or [github] token)")]
    MissingToken,

    #[error("Invalid GitHub token: {0}")]
    InvalidToken(String),

    #[error("GitHub App private key is neither PEM nor base64-encoded PEM")]
    InvalidPrivateKey,

    #[error("Failed to sign GitHub App JWT: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error("No installation id to authenticate as and no GITHUB_TOKEN fallback")]
    MissingInstallation,
}

/// GitHub REST client authenticated for one App installation.
///
/// Build one per run with [`GitHubClient::for_installation`]; it serves as
/// both the changed-file source and the comment publisher of that run.
#[derive(Debug, Clone)]
pub struct GitHubClient {
    client: reqwest::Client,
    api_base: Url,
    installation_id: u64,
}

impl GitHubClient {
    /// With App credentials configured, mint an installation access token
    /// for `installation_id`. Otherwise, or for installation 0, use the
    /// configured personal access token.
    pub async fn for_installation(
        config: &GitHubConfig,
        installation_id: u64,
    ) -> Result<Self, GitHubError> {
        let api_base = parse_api_base(&config.api_base)?;

        let token = match config.app_credentials() {
            Some((app_id, private_key)) if installation_id != 0 => {
                let jwt = app::app_jwt(app_id, private_key, app::now())?;
                let app_client = http_client(&jwt)?;
                app::installation_token(&app_client, &api_base, installation_id).await?
            }
            Some(_) => config
                .token
                .clone()
                .ok_or(GitHubError::MissingInstallation)?,
            None => config.token.clone().ok_or(GitHubError::MissingToken)?,
        };

        let client = http_client(&token)?;
        debug!(installation_id, api_base = %api_base, "built GitHub client");
        Ok(Self {
            client,
            api_base,
            installation_id,
        })
    }

    /// Validate credentials without touching the network, so the server
    /// can refuse to start instead of failing every delivery.
    pub fn check_credentials(config: &GitHubConfig) -> Result<(), GitHubError> {
        parse_api_base(&config.api_base)?;
        match config.app_credentials() {
            Some((app_id, private_key)) => {
                app::app_jwt(app_id, private_key, app::now())?;
            }
            None => {
                config.token.as_deref().ok_or(GitHubError::MissingToken)?;
            }
        }
        Ok(())
    }

    /// Fetch title, body and head sha for the CLI's one-shot review.
    #[instrument(
        skip(self),
        fields(owner = %pr_url.owner, repo = %pr_url.repo, pr = pr_url.pr_number)
    )]
    pub async fn fetch_pull_request(
        &self,
        pr_url: &PrUrl,
    ) -> Result<PullRequestRef, GitHubError> {
        #[derive(Deserialize)]
        struct Head {
            sha: String,
        }

        #[derive(Deserialize)]
        struct PullResponse {
            number: u64,
            title: String,
            body: Option<String>,
            head: Head,
        }

        let number = pr_url.pr_number.to_string();
        let url = endpoint(
            &self.api_base,
            &["repos", &pr_url.owner, &pr_url.repo, "pulls", &number],
        );

        debug!("fetching PR metadata from GitHub API");
        let response = self.client.get(url).send().await?;
        let metadata = check_status(response)
            .await?
            .json::<PullResponse>()
            .await?;
        debug!(title = %metadata.title, head = %metadata.head.sha, "received PR metadata");

        Ok(PullRequestRef {
            installation_id: self.installation_id,
            owner: pr_url.owner.clone(),
            repo: pr_url.repo.clone(),
            number: metadata.number,
            head_sha: metadata.head.sha,
            title: metadata.title,
            description: metadata.body.unwrap_or_default(),
        })
    }

    async fn list_files(&self, pr: &PullRequestRef) -> Result<Vec<ChangedFile>, GitHubError> {
        let number = pr.number.to_string();
        let url = endpoint(
            &self.api_base,
            &["repos", &pr.owner, &pr.repo, "pulls", &number, "files"],
        );

        let mut files = Vec::new();
        for page in 1..=MAX_FILE_PAGES {
            let response = self
                .client
                .get(url.clone())
                .query(&[("per_page", FILES_PER_PAGE), ("page", page)])
                .send()
                .await?;
            let batch = check_status(response)
                .await?
                .json::<Vec<ChangedFile>>()
                .await?;
            let done = batch.len() < FILES_PER_PAGE;
            files.extend(batch);
            if done {
                break;
            }
        }
        Ok(files)
    }

    async fn file_content(
        &self,
        pr: &PullRequestRef,
        path: &str,
        revision: &str,
    ) -> Result<Option<String>, GitHubError> {
        let mut segments = vec!["repos", pr.owner.as_str(), pr.repo.as_str(), "contents"];
        segments.extend(path.split('/').filter(|s| !s.is_empty()));
        let url = endpoint(&self.api_base, &segments);

        let response = self
            .client
            .get(url)
            .query(&[("ref", revision)])
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!("file not present at revision");
            return Ok(None);
        }
        let payload = check_status(response)
            .await?
            .json::<serde_json::Value>()
            .await?;
        Ok(decode_content(&payload))
    }

    async fn create_review(&self, pr: &PullRequestRef, body: &str) -> Result<(), GitHubError> {
        let number = pr.number.to_string();
        let url = endpoint(
            &self.api_base,
            &["repos", &pr.owner, &pr.repo, "pulls", &number, "reviews"],
        );

        let response = self
            .client
            .post(url)
            .json(&serde_json::json!({
                "body": body,
                "commit_id": pr.head_sha,
                "event": "COMMENT",
            }))
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }
}

fn parse_api_base(raw: &str) -> Result<Url, GitHubError> {
    let api_base = Url::parse(raw).map_err(|_| GitHubError::InvalidBaseUrl(raw.to_string()))?;
    if api_base.cannot_be_a_base() {
        return Err(GitHubError::InvalidBaseUrl(raw.to_string()));
    }
    Ok(api_base)
}

/// reqwest client sending `bearer` on every request, plus GitHub's
/// versioned media type.
fn http_client(bearer: &str) -> Result<reqwest::Client, GitHubError> {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", bearer))
            .map_err(|e| GitHubError::InvalidToken(e.to_string()))?,
    );
    headers.insert(
        header::ACCEPT,
        HeaderValue::from_static("application/vnd.github+json"),
    );
    headers.insert("X-GitHub-Api-Version", HeaderValue::from_static("2022-11-28"));

    Ok(reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .default_headers(headers)
        .build()?)
}

/// Append path segments to the API base, percent-encoding each one.
fn endpoint(api_base: &Url, segments: &[&str]) -> Url {
    let mut url = api_base.clone();
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty().extend(segments);
    }
    url
}

/// Pass 2xx responses through; turn anything else into
/// [`GitHubError::HttpStatus`] carrying GitHub's `message` when present.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, GitHubError> {
    #[derive(Deserialize)]
    struct ErrorBody {
        message: String,
    }

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response
        .json::<ErrorBody>()
        .await
        .map(|b| b.message)
        .unwrap_or_default();
    Err(GitHubError::HttpStatus {
        status: status.as_u16(),
        message,
    })
}

/// Decode a "get repository content" payload. Directories, symlinks and
/// submodules have no inline base64 content and yield `None`.
fn decode_content(payload: &serde_json::Value) -> Option<String> {
    let encoding = payload.get("encoding")?.as_str()?;
    if encoding != "base64" {
        return None;
    }
    let raw = payload.get("content")?.as_str()?;
    // GitHub wraps the base64 body at 60 columns.
    let compact: String = raw.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(compact)
        .ok()?;
    Some(String::from_utf8_lossy(&bytes).into_owned())
}

#[async_trait]
impl ChangedFileSource for GitHubClient {
    #[instrument(skip(self, pr), fields(pr = %pr))]
    async fn list_changed_files(
        &self,
        pr: &PullRequestRef,
    ) -> Result<Vec<ChangedFile>, CollaboratorError> {
        let files = self.list_files(pr).await?;
        debug!(files = files.len(), "listed changed files");
        Ok(files)
    }

    #[instrument(skip(self, pr), fields(pr = %pr))]
    async fn fetch_file_content(
        &self,
        pr: &PullRequestRef,
        path: &str,
        revision: &str,
    ) -> Result<Option<String>, CollaboratorError> {
        let content = self.file_content(pr, path, revision).await?;
        debug!(bytes = content.as_ref().map(|c| c.len()), "fetched file content");
        Ok(content)
    }
}

#[async_trait]
impl CommentPublisher for GitHubClient {
    #[instrument(skip(self, pr, body), fields(pr = %pr, body_len = body.len()))]
    async fn publish_comment(
        &self,
        pr: &PullRequestRef,
        body: &str,
    ) -> Result<(), CollaboratorError> {
        self.create_review(pr, body).await?;
        info!("created PR review");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use axum::extract::{Path, Query, State};
    use axum::http::HeaderMap as AxumHeaders;
    use axum::response::{IntoResponse, Response};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::{json, Value};

    const TEST_PRIVATE_KEY: &str = include_str!("../../tests/fixtures/github_app_key.pem");

    fn config(token: Option<&str>, api_base: &str) -> GitHubConfig {
        GitHubConfig {
            token: token.map(str::to_string),
            api_base: api_base.to_string(),
            ..GitHubConfig::default()
        }
    }

    fn app_config(token: Option<&str>, api_base: &str) -> GitHubConfig {
        GitHubConfig {
            app_id: Some(4242),
            private_key: Some(TEST_PRIVATE_KEY.to_string()),
            ..config(token, api_base)
        }
    }

    fn pr_ref(repo: &str) -> PullRequestRef {
        PullRequestRef {
            installation_id: 77,
            owner: "org".to_string(),
            repo: repo.to_string(),
            number: 5,
            head_sha: "abc123".to_string(),
            title: "t".to_string(),
            description: String::new(),
        }
    }

    /// What the fake GitHub API saw.
    #[derive(Default)]
    struct Recorded {
        pages: Mutex<Vec<usize>>,
        auth: Mutex<Vec<String>>,
        review: Mutex<Option<Value>>,
    }

    impl Recorded {
        fn note_auth(&self, headers: &AxumHeaders) {
            let value = headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default();
            self.auth.lock().unwrap().push(value.to_string());
        }
    }

    #[derive(Deserialize)]
    struct Paging {
        page: usize,
        per_page: usize,
    }

    async fn files(
        State(rec): State<Arc<Recorded>>,
        Path((_owner, repo, _number)): Path<(String, String, u64)>,
        Query(paging): Query<Paging>,
        headers: AxumHeaders,
    ) -> Json<Value> {
        rec.note_auth(&headers);
        rec.pages.lock().unwrap().push(paging.page);
        // "huge" never runs out of files; anything else has 103.
        let count = match (repo.as_str(), paging.page) {
            ("huge", _) => paging.per_page,
            (_, 1) => 100,
            (_, 2) => 3,
            _ => 0,
        };
        let batch = (0..count)
            .map(|i| {
                json!({
                    "filename": format!("src/p{}_{}.rs", paging.page, i),
                    "status": "modified",
                    "changes": 2,
                    "patch": "@@ -1 +1 @@\n-a\n+b",
                })
            })
            .collect();
        Json(Value::Array(batch))
    }

    async fn contents(Path((_owner, _repo, path)): Path<(String, String, String)>) -> Response {
        if path == "missing.rs" {
            return (
                StatusCode::NOT_FOUND,
                Json(json!({ "message": "Not Found" })),
            )
                .into_response();
        }
        Json(json!({
            "type": "file",
            "encoding": "base64",
            "content": "Zm4gbWFpbigpIHt9\nCg==\n",
        }))
        .into_response()
    }

    async fn reviews(State(rec): State<Arc<Recorded>>, Json(body): Json<Value>) -> Json<Value> {
        *rec.review.lock().unwrap() = Some(body);
        Json(json!({ "id": 1 }))
    }

    async fn access_tokens(
        State(rec): State<Arc<Recorded>>,
        Path(installation_id): Path<u64>,
        headers: AxumHeaders,
    ) -> Response {
        rec.note_auth(&headers);
        (
            StatusCode::CREATED,
            Json(json!({ "token": format!("ghs_{}", installation_id) })),
        )
            .into_response()
    }

    /// Serve a fake GitHub API on an ephemeral port and return its base URL.
    async fn fake_github() -> (String, Arc<Recorded>) {
        let rec = Arc::new(Recorded::default());
        let router = Router::new()
            .route("/repos/{owner}/{repo}/pulls/{number}/files", get(files))
            .route("/repos/{owner}/{repo}/contents/{*path}", get(contents))
            .route("/repos/{owner}/{repo}/pulls/{number}/reviews", post(reviews))
            .route("/app/installations/{id}/access_tokens", post(access_tokens))
            .with_state(rec.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        (format!("http://{}", addr), rec)
    }

    #[tokio::test]
    async fn test_missing_token() {
        let err = GitHubClient::for_installation(&config(None, "https://api.github.com"), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, GitHubError::MissingToken));
    }

    #[tokio::test]
    async fn test_invalid_base_url() {
        let err = GitHubClient::for_installation(&config(Some("t"), "not a url"), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, GitHubError::InvalidBaseUrl(_)));
    }

    #[test]
    fn test_endpoint_encodes_segments() {
        let base = Url::parse("https://api.github.com").unwrap();
        let url = endpoint(&base, &["repos", "org", "repo", "contents", "src", "my file.rs"]);
        assert_eq!(
            url.as_str(),
            "https://api.github.com/repos/org/repo/contents/src/my%20file.rs"
        );
    }

    #[test]
    fn test_endpoint_keeps_enterprise_prefix() {
        let base = Url::parse("https://ghe.example.com/api/v3/").unwrap();
        let url = endpoint(&base, &["repos", "org", "repo", "pulls", "5", "files"]);
        assert_eq!(
            url.as_str(),
            "https://ghe.example.com/api/v3/repos/org/repo/pulls/5/files"
        );
    }

    #[test]
    fn test_check_credentials() {
        let base = "https://api.github.com";
        assert!(GitHubClient::check_credentials(&config(Some("t"), base)).is_ok());
        assert!(matches!(
            GitHubClient::check_credentials(&config(None, base)),
            Err(GitHubError::MissingToken)
        ));
        assert!(GitHubClient::check_credentials(&app_config(None, base)).is_ok());

        let mut broken = app_config(None, base);
        broken.private_key = Some("not a key".to_string());
        assert!(matches!(
            GitHubClient::check_credentials(&broken),
            Err(GitHubError::InvalidPrivateKey)
        ));
    }

    #[test]
    fn test_decode_wrapped_base64_content() {
        let payload = json!({
            "type": "file",
            "encoding": "base64",
            "content": "Zm4gbWFpbigpIHt9\nCg==\n",
        });
        assert_eq!(decode_content(&payload).as_deref(), Some("fn main() {}\n"));
    }

    #[test]
    fn test_decode_directory_listing_is_none() {
        let payload = json!([{ "type": "file", "name": "a.rs" }]);
        assert!(decode_content(&payload).is_none());
    }

    #[test]
    fn test_decode_large_file_without_content_is_none() {
        let payload = json!({ "encoding": "none", "content": "" });
        assert!(decode_content(&payload).is_none());
    }

    #[tokio::test]
    async fn test_listing_stops_on_short_page() {
        let (base, rec) = fake_github().await;
        let client = GitHubClient::for_installation(&config(Some("pat"), &base), 0)
            .await
            .unwrap();

        let files = client.list_changed_files(&pr_ref("repo")).await.unwrap();
        assert_eq!(files.len(), 103);
        assert_eq!(files[0].path, "src/p1_0.rs");
        assert_eq!(files[102].path, "src/p2_2.rs");
        assert_eq!(*rec.pages.lock().unwrap(), vec![1, 2]);
        assert!(rec.auth.lock().unwrap().iter().all(|a| a == "Bearer pat"));
    }

    #[tokio::test]
    async fn test_listing_stops_at_page_cap() {
        let (base, rec) = fake_github().await;
        let client = GitHubClient::for_installation(&config(Some("pat"), &base), 0)
            .await
            .unwrap();

        let files = client.list_changed_files(&pr_ref("huge")).await.unwrap();
        assert_eq!(files.len(), MAX_FILE_PAGES * FILES_PER_PAGE);
        let pages = rec.pages.lock().unwrap();
        assert_eq!(pages.len(), MAX_FILE_PAGES);
        assert_eq!(pages.last(), Some(&MAX_FILE_PAGES));
    }

    #[tokio::test]
    async fn test_content_not_found_is_none() {
        let (base, _rec) = fake_github().await;
        let client = GitHubClient::for_installation(&config(Some("pat"), &base), 0)
            .await
            .unwrap();
        let pr = pr_ref("repo");

        let missing = client.fetch_file_content(&pr, "missing.rs", "abc123").await.unwrap();
        assert!(missing.is_none());

        let present = client.fetch_file_content(&pr, "src/main.rs", "abc123").await.unwrap();
        assert_eq!(present.as_deref(), Some("fn main() {}\n"));
    }

    #[tokio::test]
    async fn test_review_is_posted_as_comment_on_head() {
        let (base, rec) = fake_github().await;
        let client = GitHubClient::for_installation(&config(Some("pat"), &base), 0)
            .await
            .unwrap();

        client
            .publish_comment(&pr_ref("repo"), "## Review")
            .await
            .unwrap();

        let body = rec.review.lock().unwrap().clone().unwrap();
        assert_eq!(body["event"], "COMMENT");
        assert_eq!(body["commit_id"], "abc123");
        assert_eq!(body["body"], "## Review");
    }

    #[tokio::test]
    async fn test_error_status_carries_github_message() {
        let (base, _rec) = fake_github().await;
        let client = GitHubClient::for_installation(&config(Some("pat"), &base), 0)
            .await
            .unwrap();
        let url = PrUrl {
            owner: "org".to_string(),
            repo: "repo".to_string(),
            pr_number: 5,
        };

        // The fake serves no PR metadata route.
        let err = client.fetch_pull_request(&url).await.unwrap_err();
        assert!(matches!(err, GitHubError::HttpStatus { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_app_credentials_mint_installation_token() {
        let (base, rec) = fake_github().await;
        let client = GitHubClient::for_installation(&app_config(None, &base), 77)
            .await
            .unwrap();
        client.list_changed_files(&pr_ref("repo")).await.unwrap();

        let auth = rec.auth.lock().unwrap();
        // App JWT first, then the installation token on every API call.
        assert!(auth[0].starts_with("Bearer ey"));
        assert_eq!(auth[0].matches('.').count(), 2);
        assert_eq!(&auth[1..], &["Bearer ghs_77", "Bearer ghs_77"]);
    }

    #[tokio::test]
    async fn test_app_without_installation_falls_back_to_token() {
        let (base, rec) = fake_github().await;
        let client = GitHubClient::for_installation(&app_config(Some("pat"), &base), 0)
            .await
            .unwrap();
        client.list_changed_files(&pr_ref("repo")).await.unwrap();
        assert!(rec.auth.lock().unwrap().iter().all(|a| a == "Bearer pat"));

        let err = GitHubClient::for_installation(&app_config(None, &base), 0)
            .await
            .unwrap_err();
        assert!(matches!(err, GitHubError::MissingInstallation));
    }
}
