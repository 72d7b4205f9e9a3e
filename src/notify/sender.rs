//! Webhook delivery with bounded retries
//!
//! [`Sender::send`] suspends between attempts and [`Sender::send_blocking`]
//! sleeps the calling thread. Both run the same attempt classification and
//! retry bookkeeping, so for the same sink behavior they report the same
//! result.

use std::fmt;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::NotifyError;
use crate::config::duration_serde;

/// Delivery settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SenderConfig {
    pub webhook_url: String,
    /// Per-attempt timeout
    #[serde(with = "duration_serde")]
    pub timeout: Duration,
    /// Additional attempts after the first
    pub max_retries: u32,
    /// Fixed pause between attempts
    #[serde(with = "duration_serde")]
    pub retry_delay: Duration,
}

impl SenderConfig {
    pub fn new(webhook_url: impl Into<String>) -> Self {
        Self {
            webhook_url: webhook_url.into(),
            ..Self::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            webhook_url: String::new(),
            timeout: Duration::from_secs(10),
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
        }
    }
}

/// Result of one delivery, successful or not
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SendResult {
    pub success: bool,
    pub message: String,
    pub status_code: Option<u16>,
    /// Parsed sink response of the last attempt
    pub response: Option<JsonValue>,
    /// Retries used, not counting the first attempt
    pub retries: u32,
    pub elapsed_ms: f64,
}

impl SendResult {
    /// A delivery that never reached the sink
    pub fn skipped(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            status_code: None,
            response: None,
            retries: 0,
            elapsed_ms: 0.0,
        }
    }
}

/// Why a single attempt failed. Every variant is retried.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptError {
    Timeout(String),
    Transport(String),
    Http(u16),
    InvalidBody(String),
    Sink { code: i64, message: String },
}

impl fmt::Display for AttemptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptError::Timeout(e) => write!(f, "request timed out: {}", e),
            AttemptError::Transport(e) => write!(f, "transport error: {}", e),
            AttemptError::Http(status) => write!(f, "HTTP {}", status),
            AttemptError::InvalidBody(e) => write!(f, "unreadable response body: {}", e),
            AttemptError::Sink { code, message } => write!(f, "sink error {}: {}", code, message),
        }
    }
}

impl From<&reqwest::Error> for AttemptError {
    fn from(e: &reqwest::Error) -> Self {
        if e.is_timeout() {
            AttemptError::Timeout(e.to_string())
        } else {
            AttemptError::Transport(e.to_string())
        }
    }
}

/// What one attempt observed
#[derive(Debug, Clone)]
struct Attempt {
    status_code: Option<u16>,
    response: Option<JsonValue>,
    outcome: Result<(), AttemptError>,
}

impl Attempt {
    fn failed(status_code: Option<u16>, error: AttemptError) -> Self {
        Self {
            status_code,
            response: None,
            outcome: Err(error),
        }
    }
}

/// Classify a sink reply. Success needs HTTP 200 and `code` or
/// `StatusCode` equal to 0 in the JSON body.
fn evaluate_response(status: u16, body: &str) -> Attempt {
    if status != 200 {
        return Attempt {
            status_code: Some(status),
            response: serde_json::from_str(body).ok(),
            outcome: Err(AttemptError::Http(status)),
        };
    }

    let json: JsonValue = match serde_json::from_str(body) {
        Ok(json) => json,
        Err(e) => return Attempt::failed(Some(status), AttemptError::InvalidBody(e.to_string())),
    };

    let code = json.get("code").and_then(JsonValue::as_i64);
    let status_code = json.get("StatusCode").and_then(JsonValue::as_i64);

    let outcome = if code == Some(0) || status_code == Some(0) {
        Ok(())
    } else {
        let message = json
            .get("msg")
            .or_else(|| json.get("StatusMessage"))
            .and_then(JsonValue::as_str)
            .unwrap_or("unknown error")
            .to_string();
        Err(AttemptError::Sink {
            code: code.or(status_code).unwrap_or(-1),
            message,
        })
    };

    Attempt {
        status_code: Some(status),
        response: Some(json),
        outcome,
    }
}

/// Retry bookkeeping shared by both delivery variants
struct RetryState {
    max_retries: u32,
    retries: u32,
    started: Instant,
    last: Option<Attempt>,
}

impl RetryState {
    fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            retries: 0,
            started: Instant::now(),
            last: None,
        }
    }

    fn elapsed_ms(&self) -> f64 {
        self.started.elapsed().as_secs_f64() * 1000.0
    }

    /// Returns the final result when the attempt succeeded
    fn observe(&mut self, attempt: Attempt) -> Option<SendResult> {
        if attempt.outcome.is_ok() {
            return Some(SendResult {
                success: true,
                message: "delivered".to_string(),
                status_code: attempt.status_code,
                response: attempt.response,
                retries: self.retries,
                elapsed_ms: self.elapsed_ms(),
            });
        }
        self.last = Some(attempt);
        None
    }

    /// Consume one retry if any are left
    fn next_retry(&mut self, delay: Duration) -> bool {
        if self.retries >= self.max_retries {
            return false;
        }
        self.retries += 1;
        if let Some(Err(e)) = self.last.as_ref().map(|a| &a.outcome) {
            tracing::warn!(
                retry = self.retries,
                max_retries = self.max_retries,
                delay_ms = delay.as_millis() as u64,
                error = %e,
                "delivery attempt failed, retrying"
            );
        }
        true
    }

    fn exhausted(self) -> SendResult {
        let elapsed_ms = self.elapsed_ms();
        let (status_code, response, error) = match self.last {
            Some(Attempt {
                status_code,
                response,
                outcome: Err(e),
            }) => (status_code, response, e.to_string()),
            _ => (None, None, "no attempt made".to_string()),
        };
        tracing::error!(retries = self.retries, error = %error, "delivery failed");

        SendResult {
            success: false,
            message: format!(
                "delivery failed after {} retries: {}",
                self.max_retries, error
            ),
            status_code,
            response,
            retries: self.retries,
            elapsed_ms,
        }
    }
}

/// Posts JSON payloads to one webhook endpoint
pub struct Sender {
    config: SenderConfig,
    client: reqwest::Client,
    /// Built on first blocking use; it owns a runtime thread that must not
    /// be created from async code.
    blocking_client: Mutex<Option<reqwest::blocking::Client>>,
}

impl Sender {
    pub fn new(config: SenderConfig) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            config,
            client,
            blocking_client: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &SenderConfig {
        &self.config
    }

    /// Deliver a payload, awaiting between attempts
    pub async fn send(&self, payload: &JsonValue) -> SendResult {
        let mut state = RetryState::new(self.config.max_retries);

        loop {
            let attempt = match self
                .client
                .post(&self.config.webhook_url)
                .json(payload)
                .send()
                .await
            {
                Ok(response) => {
                    let status = response.status().as_u16();
                    match response.text().await {
                        Ok(body) => evaluate_response(status, &body),
                        Err(e) => Attempt::failed(Some(status), AttemptError::from(&e)),
                    }
                }
                Err(e) => Attempt::failed(None, AttemptError::from(&e)),
            };

            if let Some(result) = state.observe(attempt) {
                return result;
            }
            if !state.next_retry(self.config.retry_delay) {
                return state.exhausted();
            }
            tokio::time::sleep(self.config.retry_delay).await;
        }
    }

    fn blocking_client(&self) -> Result<reqwest::blocking::Client, reqwest::Error> {
        let mut slot = self.blocking_client.lock();
        if let Some(client) = slot.as_ref() {
            return Ok(client.clone());
        }
        let client = reqwest::blocking::Client::builder()
            .timeout(self.config.timeout)
            .build()?;
        *slot = Some(client.clone());
        Ok(client)
    }

    /// Deliver a payload, sleeping the calling thread between attempts.
    ///
    /// Must not be called from an async runtime thread.
    pub fn send_blocking(&self, payload: &JsonValue) -> SendResult {
        let client = match self.blocking_client() {
            Ok(client) => client,
            Err(e) => {
                tracing::error!(error = %e, "failed to build blocking client");
                return SendResult::skipped(format!("client error: {}", e));
            }
        };
        let mut state = RetryState::new(self.config.max_retries);

        loop {
            let attempt = match client.post(&self.config.webhook_url).json(payload).send() {
                Ok(response) => {
                    let status = response.status().as_u16();
                    match response.text() {
                        Ok(body) => evaluate_response(status, &body),
                        Err(e) => Attempt::failed(Some(status), AttemptError::from(&e)),
                    }
                }
                Err(e) => Attempt::failed(None, AttemptError::from(&e)),
            };

            if let Some(result) = state.observe(attempt) {
                return result;
            }
            if !state.next_retry(self.config.retry_delay) {
                return state.exhausted();
            }
            std::thread::sleep(self.config.retry_delay);
        }
    }
}
