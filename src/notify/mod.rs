//! Delivery of deployment outcomes to the caller's evaluation URL.

use std::time::Duration;

use reqwest::{header, Client, StatusCode};
use serde::Serialize;
use tracing::{info, warn};

use crate::auth::{sign_payload, SIGNATURE_HEADER};
use crate::models::CallbackPayload;
use crate::retry::RetryPolicy;

/// What happened to the callback for one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationOutcome {
    pub delivered: bool,
    /// No evaluation URL was supplied
    pub skipped: bool,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl NotificationOutcome {
    pub fn skipped() -> Self {
        Self {
            delivered: false,
            skipped: true,
            attempts: 0,
            last_status: None,
            error: None,
        }
    }

    /// Delivery was never attempted because the request could not be built.
    fn not_sent(error: String) -> Self {
        Self {
            delivered: false,
            skipped: false,
            attempts: 0,
            last_status: None,
            error: Some(error),
        }
    }
}

#[derive(Debug)]
enum DeliveryError {
    Transport(reqwest::Error),
    Rejected(StatusCode),
}

impl DeliveryError {
    fn status(&self) -> Option<u16> {
        match self {
            DeliveryError::Transport(e) => e.status().map(|s| s.as_u16()),
            DeliveryError::Rejected(status) => Some(status.as_u16()),
        }
    }
}

impl std::fmt::Display for DeliveryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeliveryError::Transport(e) => write!(f, "request failed: {}", e),
            DeliveryError::Rejected(status) => write!(f, "callback returned {}", status),
        }
    }
}

/// Posts signed callback payloads with bounded retries.
pub struct CallbackNotifier {
    http: Client,
    signing_key: String,
    retry: RetryPolicy,
}

impl CallbackNotifier {
    pub fn new(signing_key: &str, retry: RetryPolicy) -> Result<Self, reqwest::Error> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            signing_key: signing_key.to_string(),
            retry,
        })
    }

    /// Deliver `payload` to `url`. Network errors and 5xx responses are
    /// retried; any other non-2xx response ends delivery immediately.
    pub async fn notify(&self, url: Option<&str>, payload: &CallbackPayload) -> NotificationOutcome {
        let Some(url) = url else {
            info!(task = %payload.task, round = payload.round, stage = "notify", "No evaluation URL; callback skipped");
            return NotificationOutcome::skipped();
        };

        let body = match serde_json::to_vec(payload) {
            Ok(body) => body,
            Err(e) => {
                return NotificationOutcome::not_sent(format!("payload could not be encoded: {}", e))
            }
        };
        let signature = match sign_payload(&self.signing_key, &body) {
            Ok(signature) => signature,
            Err(e) => {
                warn!(
                    task = %payload.task,
                    round = payload.round,
                    stage = "notify",
                    "Callback not signed: {}",
                    e
                );
                return NotificationOutcome::not_sent(format!("payload could not be signed: {}", e));
            }
        };

        let body = &body;
        let signature = &signature;
        let outcome = self
            .retry
            .run(
                "callback",
                move || async move {
                    let response = self
                        .http
                        .post(url)
                        .header(header::CONTENT_TYPE, "application/json")
                        .header(SIGNATURE_HEADER, signature.as_str())
                        .body(body.clone())
                        .send()
                        .await
                        .map_err(DeliveryError::Transport)?;
                    let status = response.status();
                    if status.is_success() {
                        Ok(status)
                    } else {
                        Err(DeliveryError::Rejected(status))
                    }
                },
                |err| match err {
                    DeliveryError::Transport(_) => true,
                    DeliveryError::Rejected(status) => status.is_server_error(),
                },
            )
            .await;

        match outcome.result {
            Ok(status) => {
                info!(
                    task = %payload.task,
                    round = payload.round,
                    stage = "notify",
                    attempts = outcome.attempts,
                    "Callback delivered"
                );
                NotificationOutcome {
                    delivered: true,
                    skipped: false,
                    attempts: outcome.attempts,
                    last_status: Some(status.as_u16()),
                    error: None,
                }
            }
            Err(err) => {
                warn!(
                    task = %payload.task,
                    round = payload.round,
                    stage = "notify",
                    attempts = outcome.attempts,
                    "Callback delivery failed: {}",
                    err
                );
                NotificationOutcome {
                    delivered: false,
                    skipped: false,
                    attempts: outcome.attempts,
                    last_status: err.status(),
                    error: Some(err.to_string()),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};

    use axum::{
        body::Bytes,
        extract::State,
        http::{HeaderMap, StatusCode as AxumStatus},
        routing::post,
        Router,
    };

    use crate::auth::verify_signature;
    use crate::models::DeployStatus;

    #[derive(Default)]
    struct Receiver {
        calls: AtomicU32,
        /// Statuses returned in order; 200 once exhausted
        script: Mutex<Vec<u16>>,
        last_body: Mutex<Option<(Bytes, String)>>,
    }

    async fn receive(State(rx): State<Arc<Receiver>>, headers: HeaderMap, body: Bytes) -> AxumStatus {
        rx.calls.fetch_add(1, Ordering::SeqCst);
        let signature = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        *rx.last_body.lock().unwrap() = Some((body, signature));

        let mut script = rx.script.lock().unwrap();
        let code = if script.is_empty() { 200 } else { script.remove(0) };
        AxumStatus::from_u16(code).unwrap()
    }

    async fn spawn_receiver(script: Vec<u16>) -> (String, Arc<Receiver>) {
        let rx = Arc::new(Receiver {
            script: Mutex::new(script),
            ..Default::default()
        });
        let router = Router::new()
            .route("/callback", post(receive))
            .with_state(rx.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        (format!("http://{}/callback", addr), rx)
    }

    fn payload() -> CallbackPayload {
        CallbackPayload {
            email: Some("student@example.com".into()),
            task: "hello-world".into(),
            round: 1,
            nonce: "n-1".into(),
            status: DeployStatus::Success,
            message: "Deployed".into(),
            repo_name: Some("hello-world-1".into()),
            repo_url: Some("https://github.com/o/hello-world-1".into()),
            commit_sha: Some("abc".into()),
            pages_url: Some("https://o.github.io/hello-world-1/".into()),
            updated: false,
            processing_time: 1.5,
        }
    }

    fn notifier(attempts: u32) -> CallbackNotifier {
        CallbackNotifier::new("process-key", RetryPolicy::immediate(attempts)).unwrap()
    }

    #[tokio::test]
    async fn test_server_errors_are_retried_until_delivered() {
        let (url, rx) = spawn_receiver(vec![500, 500]).await;

        let outcome = notifier(3).notify(Some(&url), &payload()).await;

        assert!(outcome.delivered);
        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.last_status, Some(200));
        assert_eq!(rx.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let (url, rx) = spawn_receiver(vec![404]).await;

        let outcome = notifier(3).notify(Some(&url), &payload()).await;

        assert!(!outcome.delivered);
        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.last_status, Some(404));
        assert!(outcome.error.is_some());
        assert_eq!(rx.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_persistent_server_error_exhausts_attempts() {
        let (url, rx) = spawn_receiver(vec![503, 503, 503, 503]).await;

        let outcome = notifier(3).notify(Some(&url), &payload()).await;

        assert!(!outcome.delivered);
        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.last_status, Some(503));
        assert_eq!(rx.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_payload_is_signed() {
        let (url, rx) = spawn_receiver(vec![]).await;

        notifier(1).notify(Some(&url), &payload()).await;

        let (body, signature) = rx.last_body.lock().unwrap().clone().unwrap();
        assert!(verify_signature("process-key", &body, &signature));
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "success");
        assert_eq!(json["task"], "hello-world");
    }

    #[tokio::test]
    async fn test_missing_url_is_skipped() {
        let outcome = notifier(3).notify(None, &payload()).await;
        assert!(outcome.skipped);
        assert_eq!(outcome.attempts, 0);
    }
}
