pub mod payload;
pub mod signature;

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use thiserror::Error;
use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{error, info, info_span, warn, Instrument};

use crate::config::Config;
use crate::github::{GitHubClient, GitHubError};
use crate::llm::{LlmError, OpenAiReviewer};
use crate::pr::PullRequestRef;
use crate::review::{GitHubReviewRunner, ReviewRunner};
use payload::PullRequestEvent;
use signature::SignatureError;

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("Empty payload")]
    EmptyPayload,

    #[error("Invalid signature: {0}")]
    InvalidSignature(#[from] SignatureError),

    #[error("Invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("GitHub setup failed: {0}")]
    GitHub(#[from] GitHubError),

    #[error("OpenAI setup failed: {0}")]
    Llm(#[from] LlmError),

    #[error("Server error: {0}")]
    Io(#[from] std::io::Error),
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let status = match &self {
            WebhookError::EmptyPayload | WebhookError::InvalidJson(_) => StatusCode::BAD_REQUEST,
            WebhookError::InvalidSignature(_) => StatusCode::UNAUTHORIZED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}

/// Response body acknowledging a delivery.
#[derive(Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Ack {
    /// A review run was started in the background.
    Processing { pr: u64 },
    /// Delivery accepted, nothing to do.
    Ok { event: String },
}

pub struct AppState {
    pub webhook_secret: Option<String>,
    pub runner: Arc<dyn ReviewRunner>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/webhook/github", post(github_webhook))
        .route("/health", get(|| async { "ok" }))
        .with_state(state)
}

/// Start the webhook server and block until Ctrl+C.
pub async fn serve(config: &Config) -> Result<(), WebhookError> {
    // Fail at startup rather than on every delivery.
    GitHubClient::check_credentials(&config.github)?;
    let generator = Arc::new(OpenAiReviewer::new(&config.openai)?);

    if config.github.webhook_secret.is_none() {
        warn!("no webhook secret configured, deliveries will not be authenticated");
    }

    let runner = Arc::new(GitHubReviewRunner::new(
        config.github.clone(),
        config.review.clone(),
        generator,
        false,
    ));
    let state = Arc::new(AppState {
        webhook_secret: config.github.webhook_secret.clone(),
        runner,
    });

    let listener = tokio::net::TcpListener::bind(&config.server.address).await?;
    info!(address = %config.server.address, "listening for webhooks on POST /webhook/github");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
    }
}

async fn github_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Ack>, WebhookError> {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
    let delivery = header("x-github-delivery").unwrap_or("-");
    let event = header("x-github-event").unwrap_or("unknown");

    info_span!("delivery", delivery = %delivery, event = %event).in_scope(|| {
        let result = handle_delivery(&state, event, header("x-hub-signature-256"), &body);
        if let Err(e) = &result {
            warn!(error = %e, "rejected webhook delivery");
        }
        result.map(Json)
    })
}

/// Authenticate and parse one delivery, starting a review when it asks
/// for one. Returns as soon as the run is dispatched.
pub fn handle_delivery(
    state: &AppState,
    event: &str,
    signature: Option<&str>,
    body: &[u8],
) -> Result<Ack, WebhookError> {
    if body.iter().all(u8::is_ascii_whitespace) || body == b"{}" {
        return Err(WebhookError::EmptyPayload);
    }

    if let Some(secret) = state.webhook_secret.as_deref() {
        signature::verify(secret, body, signature)?;
    }

    let value: serde_json::Value = serde_json::from_slice(body)?;

    if event == "pull_request" {
        let pr_event: PullRequestEvent = serde_json::from_value(value)?;
        info!(action = %pr_event.action, pr = pr_event.pull_request.number, "pull request event");

        if pr_event.triggers_review() {
            let pr = pr_event.to_pull_request_ref();
            let number = pr.number;
            dispatch(state.runner.clone(), pr);
            return Ok(Ack::Processing { pr: number });
        }
    }

    Ok(Ack::Ok {
        event: event.to_string(),
    })
}

/// Run a review on a detached task. The outcome is logged exactly once
/// from inside the task.
pub fn dispatch(runner: Arc<dyn ReviewRunner>, pr: PullRequestRef) -> JoinHandle<()> {
    let span = info_span!("review_task", pr = %pr, head = %pr.head_sha);
    tokio::spawn(
        async move {
            match runner.review(pr).await {
                Ok(outcome) => info!(%outcome, "review run finished"),
                Err(e) => error!(error = %e, "review run failed"),
            }
        }
        .instrument(span),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::review::{RunOutcome, ReviewTaskError};
    use async_trait::async_trait;
    use tokio::sync::mpsc;

    struct ChannelRunner(mpsc::UnboundedSender<PullRequestRef>);

    #[async_trait]
    impl ReviewRunner for ChannelRunner {
        async fn review(&self, pr: PullRequestRef) -> Result<RunOutcome, ReviewTaskError> {
            self.0.send(pr).ok();
            Ok(RunOutcome::NoEligibleFiles)
        }
    }

    fn state(secret: Option<&str>) -> (AppState, mpsc::UnboundedReceiver<PullRequestRef>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let state = AppState {
            webhook_secret: secret.map(str::to_string),
            runner: Arc::new(ChannelRunner(tx)),
        };
        (state, rx)
    }

    fn body(action: &str) -> Vec<u8> {
        serde_json::to_vec(&payload::sample_event(action)).unwrap()
    }

    #[tokio::test]
    async fn test_opened_pull_request_dispatches_review() {
        let (state, mut rx) = state(None);
        let ack = handle_delivery(&state, "pull_request", None, &body("opened")).unwrap();
        assert_eq!(ack, Ack::Processing { pr: 42 });

        let pr = rx.recv().await.unwrap();
        assert_eq!(pr.installation_id, 9001);
        assert_eq!(pr.to_string(), "org/repo#42");
        assert_eq!(pr.head_sha, "abc123");
    }

    #[tokio::test]
    async fn test_closed_pull_request_is_acknowledged_only() {
        let (state, mut rx) = state(None);
        let ack = handle_delivery(&state, "pull_request", None, &body("closed")).unwrap();
        assert_eq!(
            ack,
            Ack::Ok {
                event: "pull_request".to_string()
            }
        );
        drop(state);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_other_events_are_acknowledged() {
        let (state, _rx) = state(None);
        let ack = handle_delivery(&state, "ping", None, br#"{"zen":"Keep it simple."}"#).unwrap();
        assert_eq!(
            ack,
            Ack::Ok {
                event: "ping".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_signed_delivery_is_accepted() {
        let (state, mut rx) = state(Some("s3cret"));
        let payload = body("synchronize");
        let header = signature::sign("s3cret", &payload);
        let ack = handle_delivery(&state, "pull_request", Some(&header), &payload).unwrap();
        assert_eq!(ack, Ack::Processing { pr: 42 });
        assert!(rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_bad_signature_is_rejected_before_dispatch() {
        let (state, mut rx) = state(Some("s3cret"));
        let payload = body("opened");
        let header = signature::sign("wrong", &payload);
        let err = handle_delivery(&state, "pull_request", Some(&header), &payload).unwrap_err();
        assert!(matches!(err, WebhookError::InvalidSignature(SignatureError::Mismatch)));
        assert_eq!(err.into_response().status(), StatusCode::UNAUTHORIZED);

        let err = handle_delivery(&state, "pull_request", None, &payload).unwrap_err();
        assert!(matches!(err, WebhookError::InvalidSignature(SignatureError::Missing)));

        drop(state);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_empty_and_invalid_payloads() {
        let (state, _rx) = state(None);
        let err = handle_delivery(&state, "pull_request", None, b"").unwrap_err();
        assert!(matches!(err, WebhookError::EmptyPayload));
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);

        let err = handle_delivery(&state, "pull_request", None, b"{}").unwrap_err();
        assert!(matches!(err, WebhookError::EmptyPayload));

        let err = handle_delivery(&state, "pull_request", None, b"{not json").unwrap_err();
        assert!(matches!(err, WebhookError::InvalidJson(_)));

        let err =
            handle_delivery(&state, "pull_request", None, br#"{"action":"opened"}"#).unwrap_err();
        assert!(matches!(err, WebhookError::InvalidJson(_)));
    }

    #[test]
    fn test_ack_serialization() {
        let json = serde_json::to_value(Ack::Processing { pr: 42 }).unwrap();
        assert_eq!(json, serde_json::json!({ "status": "processing", "pr": 42 }));
        let json = serde_json::to_value(Ack::Ok {
            event: "ping".to_string(),
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({ "status": "ok", "event": "ping" }));
    }

    #[tokio::test]
    async fn test_dispatch_logs_failures_without_panicking() {
        struct FailingRunner;

        #[async_trait]
        impl ReviewRunner for FailingRunner {
            async fn review(&self, _pr: PullRequestRef) -> Result<RunOutcome, ReviewTaskError> {
                Err(ReviewTaskError::Client {
                    installation_id: 1,
                    source: GitHubError::MissingToken,
                })
            }
        }

        let event: PullRequestEvent =
            serde_json::from_value(payload::sample_event("opened")).unwrap();
        let handle = dispatch(Arc::new(FailingRunner), event.to_pull_request_ref());
        handle.await.unwrap();
    }
}
