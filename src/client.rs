//! Caller-side helper for the extraction endpoints.
//!
//! Polls status at a fixed interval until a terminal state and retries failed
//! extractions on a fixed backoff schedule. Every retry starts a new job.

use std::future::Future;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::sync::watch;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::{ExtractResponse, ExtractionStatus};

/// Errors seen by API callers.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("{code} (HTTP {status}): {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },
}

impl ClientError {
    /// Only transient failures are retried. Quality gate and schema failures
    /// are final for the document as uploaded.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Transport(_) => true,
            ClientError::Api { code, .. } => {
                matches!(code.as_str(), "EXTERNAL_SERVICE_FAILED" | "DOWNLOAD_FAILED")
            }
        }
    }
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: String,
    message: String,
}

/// Backoff schedule for explicit extraction retries.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub delays: Vec<Duration>,
    /// Upper bound for any single delay
    pub max_delay: Duration,
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            delays: vec![
                Duration::from_secs(5),
                Duration::from_secs(15),
                Duration::from_secs(45),
            ],
            max_delay: Duration::from_secs(60),
            max_retries: 3,
        }
    }
}

impl RetryPolicy {
    /// Delay before the 1-based `retry`, or `None` once retries are exhausted.
    pub fn delay_for(&self, retry: u32) -> Option<Duration> {
        if retry == 0 || retry > self.max_retries {
            return None;
        }
        let index = (retry as usize - 1).min(self.delays.len().saturating_sub(1));
        let delay = self.delays.get(index).copied().unwrap_or(self.max_delay);
        Some(delay.min(self.max_delay))
    }
}

/// How a polling loop ended.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Finished(ExtractionStatus),
    Cancelled,
    /// Poll budget spent; carries the last status seen
    GaveUp(Option<ExtractionStatus>),
}

/// Poll `fetch` until it reports a terminal status.
///
/// Holds no state between polls besides the last status. A `true` on the
/// cancel channel stops the loop before the next poll.
pub async fn poll_until_terminal<F, Fut>(
    mut fetch: F,
    interval: Duration,
    max_polls: u32,
    mut cancel: watch::Receiver<bool>,
) -> Result<PollOutcome, ClientError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<ExtractionStatus, ClientError>>,
{
    let mut last = None;

    for poll in 1..=max_polls {
        if *cancel.borrow() {
            return Ok(PollOutcome::Cancelled);
        }

        let status = fetch().await?;
        debug!(poll, ?status, "Polled extraction status");
        if status.is_terminal() {
            return Ok(PollOutcome::Finished(status));
        }
        last = Some(status);

        if poll == max_polls {
            break;
        }
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            changed = cancel.changed() => {
                if changed.is_err() || *cancel.borrow() {
                    return Ok(PollOutcome::Cancelled);
                }
            }
        }
    }

    Ok(PollOutcome::GaveUp(last))
}

/// Run `attempt` and retry retryable failures on the policy's schedule.
pub async fn with_retries<F, Fut, T>(policy: &RetryPolicy, mut attempt: F) -> Result<T, ClientError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ClientError>>,
{
    let mut retry = 0;
    loop {
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() => {
                retry += 1;
                let Some(delay) = policy.delay_for(retry) else {
                    return Err(e);
                };
                warn!(retry, delay_secs = delay.as_secs(), "Extraction failed, retrying: {}", e);
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// HTTP client for the `/api/v1/extractions` endpoints.
pub struct ExtractionClient {
    http: reqwest::Client,
    base_url: String,
    token: SecretString,
    pub poll_interval: Duration,
    pub max_polls: u32,
    pub retry: RetryPolicy,
}

impl ExtractionClient {
    pub fn new(base_url: impl Into<String>, token: SecretString) -> Result<Self, ClientError> {
        Ok(Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(300))
                .build()?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
            poll_interval: Duration::from_secs(2),
            max_polls: 300,
            retry: RetryPolicy::default(),
        })
    }

    async fn read<T: for<'de> Deserialize<'de>>(
        response: reqwest::Response,
    ) -> Result<T, ClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json::<T>().await?);
        }

        let code = status.as_u16();
        match response.json::<ApiErrorBody>().await {
            Ok(body) => Err(ClientError::Api {
                status: code,
                code: body.error,
                message: body.message,
            }),
            Err(_) => Err(ClientError::Api {
                status: code,
                code: "UNKNOWN".to_string(),
                message: format!("HTTP {}", status),
            }),
        }
    }

    /// Start one extraction attempt and wait for its result.
    pub async fn extract(&self, file_id: Uuid) -> Result<ExtractResponse, ClientError> {
        let response = self
            .http
            .post(format!("{}/api/v1/extractions", self.base_url))
            .bearer_auth(self.token.expose_secret())
            .json(&serde_json::json!({ "file_id": file_id }))
            .send()
            .await?;
        Self::read(response).await
    }

    /// Extract, retrying transient failures with a new job each time.
    pub async fn extract_with_retries(&self, file_id: Uuid) -> Result<ExtractResponse, ClientError> {
        with_retries(&self.retry, || self.extract(file_id)).await
    }

    pub async fn status(
        &self,
        file_id: Uuid,
        job_id: Option<Uuid>,
    ) -> Result<ExtractionStatus, ClientError> {
        let mut url = format!("{}/api/v1/extractions/{}/status", self.base_url, file_id);
        if let Some(job_id) = job_id {
            url.push_str(&format!("?job_id={}", job_id));
        }

        let response = self
            .http
            .get(url)
            .bearer_auth(self.token.expose_secret())
            .send()
            .await?;
        Self::read(response).await
    }

    pub async fn wait_for(
        &self,
        file_id: Uuid,
        job_id: Option<Uuid>,
        cancel: watch::Receiver<bool>,
    ) -> Result<PollOutcome, ClientError> {
        poll_until_terminal(
            || self.status(file_id, job_id),
            self.poll_interval,
            self.max_polls,
            cancel,
        )
        .await
    }
}
