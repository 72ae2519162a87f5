//! Rate-limit-aware HTTP transport
//!
//! Every outbound API call goes through `RateLimitedTransport::send`, which:
//! - attaches credentials
//! - sleeps and retries on throttling responses, indefinitely
//! - retries transport failures with bounded exponential backoff
//! - classifies authentication and API errors
//!
//! # Retry Logic
//!
//! | Condition | Action |
//! |-----------|--------|
//! | HTTP 429 | Sleep for `Retry-After` (or the configured default), retry, never fatal |
//! | HTTP 5xx | Retry with exponential backoff, then `Exhausted` |
//! | Timeout / connection error | Retry with exponential backoff, then `Exhausted` |
//! | HTTP 401 / 403 | Immediate `Auth` |
//! | Other HTTP 4xx | Immediate `Status` |
//! | `ok: false` auth error | Immediate `Auth` |
//! | `ok: false` other error | Immediate `Api` |

use crate::config::{HarvestConfig, SlackConfig};
use reqwest::header::{HeaderMap, COOKIE, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// API error codes that mean the credentials were rejected
const AUTH_ERROR_CODES: &[&str] = &[
    "invalid_auth",
    "not_authed",
    "account_inactive",
    "token_revoked",
    "token_expired",
];

/// Errors surfaced by the transport after its own retries
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Authentication rejected by {method}: {reason}")]
    Auth { method: String, reason: String },

    #[error("{method} failed after {attempts} attempts: {message}")]
    Exhausted {
        method: String,
        attempts: u32,
        message: String,
    },

    #[error("{method} returned HTTP {status}")]
    Status { method: String, status: u16 },

    #[error("{method} returned API error '{code}'")]
    Api { method: String, code: String },

    #[error("Invalid response body from {method}: {message}")]
    Body { method: String, message: String },

    #[error("Invalid request URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Request to {method} abandoned: run stopped")]
    Stopped { method: String },
}

impl TransportError {
    /// Auth failures and stop requests end the run; everything else is
    /// scoped to the request that produced it
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Auth { .. } | Self::Stopped { .. } | Self::Url(_))
    }
}

/// Run-level stop signal shared by the coordinator and the transport
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Retry timing for one transport
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt for transient failures
    pub max_transient_retries: u32,

    /// Delay before the first transient retry; doubles each time
    pub initial_backoff: Duration,

    /// Wait used when a throttling response has no usable Retry-After
    pub default_retry_after: Duration,
}

impl From<&HarvestConfig> for RetryPolicy {
    fn from(config: &HarvestConfig) -> Self {
        Self {
            max_transient_retries: config.max_transient_retries,
            initial_backoff: config.initial_backoff(),
            default_retry_after: config.default_retry_after(),
        }
    }
}

/// Throttling counters for operator diagnostics
#[derive(Debug, Default)]
pub struct ThrottleStats {
    waits: AtomicU64,
    unmanaged: AtomicU64,
}

impl ThrottleStats {
    /// Number of throttling responses waited out
    pub fn waits(&self) -> u64 {
        self.waits.load(Ordering::Relaxed)
    }

    /// Throttling responses that carried no Retry-After header
    pub fn unmanaged(&self) -> u64 {
        self.unmanaged.load(Ordering::Relaxed)
    }
}

/// A single logical API call
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: String,
    pub params: Vec<(String, String)>,
}

impl ApiRequest {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            params: Vec::new(),
        }
    }

    pub fn param(mut self, key: &str, value: impl ToString) -> Self {
        self.params.push((key.to_string(), value.to_string()));
        self
    }
}

/// Outcome of one HTTP attempt, before retry policy is applied
enum Attempt {
    Done(Map<String, Value>),
    Throttled(Option<Duration>),
    Transient(String),
}

/// Single choke point for outbound API calls
///
/// Safe to share between workers: the only cross-call state is the
/// diagnostic counters in `ThrottleStats`.
pub struct RateLimitedTransport {
    client: Client,
    base_url: String,
    token: String,
    cookie: Option<String>,
    policy: RetryPolicy,
    stop: StopFlag,
    stats: ThrottleStats,
}

/// Builds the HTTP client shared by every request
///
/// `timeout` bounds each request end to end, so a request that never
/// completes surfaces as a transient failure.
pub fn build_http_client(timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(concat!("thread-harvest/", env!("CARGO_PKG_VERSION")))
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .gzip(true)
        .brotli(true)
        .build()
}

impl RateLimitedTransport {
    pub fn new(
        client: Client,
        slack: &SlackConfig,
        token: String,
        policy: RetryPolicy,
        stop: StopFlag,
    ) -> Self {
        Self {
            client,
            base_url: slack.api_base_url.trim_end_matches('/').to_string(),
            token,
            cookie: slack.cookie.clone().filter(|c| !c.is_empty()),
            policy,
            stop,
            stats: ThrottleStats::default(),
        }
    }

    pub fn stats(&self) -> &ThrottleStats {
        &self.stats
    }

    /// Sends a request, retrying until it succeeds or fails permanently
    pub async fn send(&self, request: &ApiRequest) -> Result<Map<String, Value>, TransportError> {
        let method = request.method.as_str();
        let url = Url::parse(&format!("{}/{}", self.base_url, method))?;
        let mut failures = 0u32;
        let mut backoff = self.policy.initial_backoff;

        loop {
            if self.stop.is_stopped() {
                return Err(TransportError::Stopped {
                    method: method.to_string(),
                });
            }

            match self.attempt(&url, request).await? {
                Attempt::Done(body) => {
                    if failures > 0 {
                        tracing::debug!(method, attempts = failures + 1, "Request succeeded after retry");
                    }
                    return Ok(body);
                }
                Attempt::Throttled(retry_after) => {
                    self.stats.waits.fetch_add(1, Ordering::Relaxed);
                    let wait = match retry_after {
                        Some(wait) => {
                            tracing::warn!(
                                method,
                                retry_after_secs = wait.as_secs_f64(),
                                "Rate limit reached, waiting before retry"
                            );
                            wait
                        }
                        None => {
                            self.stats.unmanaged.fetch_add(1, Ordering::Relaxed);
                            let wait = self.policy.default_retry_after;
                            tracing::warn!(
                                method,
                                retry_after_secs = wait.as_secs_f64(),
                                "Rate limit reached without Retry-After header, using default wait"
                            );
                            wait
                        }
                    };
                    tokio::time::sleep(wait).await;
                }
                Attempt::Transient(message) => {
                    failures += 1;
                    if failures > self.policy.max_transient_retries {
                        tracing::error!(method, attempts = failures, error = %message, "Request failed after all retries");
                        return Err(TransportError::Exhausted {
                            method: method.to_string(),
                            attempts: failures,
                            message,
                        });
                    }

                    tracing::warn!(
                        method,
                        attempt = failures,
                        max_retries = self.policy.max_transient_retries,
                        delay_ms = backoff.as_millis() as u64,
                        error = %message,
                        "Request failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = backoff.saturating_mul(2);
                }
            }
        }
    }

    /// Performs one HTTP exchange and classifies the result
    async fn attempt(&self, url: &Url, request: &ApiRequest) -> Result<Attempt, TransportError> {
        let method = request.method.as_str();
        let mut builder = self
            .client
            .get(url.clone())
            .query(&request.params)
            .bearer_auth(&self.token);
        if let Some(cookie) = &self.cookie {
            builder = builder.header(COOKIE, cookie);
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => return Ok(Attempt::Transient(describe_request_error(&e))),
        };

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Ok(Attempt::Throttled(parse_retry_after(response.headers())));
        }
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(TransportError::Auth {
                method: method.to_string(),
                reason: format!("HTTP {}", status.as_u16()),
            });
        }
        if status.is_server_error() {
            return Ok(Attempt::Transient(format!("HTTP {}", status.as_u16())));
        }
        if !status.is_success() {
            return Err(TransportError::Status {
                method: method.to_string(),
                status: status.as_u16(),
            });
        }

        let text = match response.text().await {
            Ok(text) => text,
            Err(e) => return Ok(Attempt::Transient(describe_request_error(&e))),
        };
        let body: Map<String, Value> =
            serde_json::from_str(&text).map_err(|e| TransportError::Body {
                method: method.to_string(),
                message: e.to_string(),
            })?;

        if body.get("ok").and_then(Value::as_bool) == Some(true) {
            return Ok(Attempt::Done(body));
        }

        let code = body
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("unknown_error")
            .to_string();
        if code == "ratelimited" {
            return Ok(Attempt::Throttled(None));
        }
        if AUTH_ERROR_CODES.contains(&code.as_str()) {
            return Err(TransportError::Auth {
                method: method.to_string(),
                reason: code,
            });
        }
        Err(TransportError::Api {
            method: method.to_string(),
            code,
        })
    }
}

/// Reads the server's suggested wait from a throttling response
///
/// Accepts whole or fractional seconds. Anything else, including values too
/// large for a `Duration`, counts as absent.
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let raw = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
    if let Ok(secs) = raw.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let secs = raw.parse::<f64>().ok()?;
    Duration::try_from_secs_f64(secs).ok()
}

fn describe_request_error(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        "request timeout".to_string()
    } else if e.is_connect() {
        format!("connection failed: {}", e)
    } else {
        e.to_string()
    }
}
