use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use http::{Method, StatusCode};
use rand::Rng;
use tracing::{Instrument, debug, info_span, warn};

use super::{PolicyFactory, RequestPolicy};
use crate::Result;
use crate::error::{Error, ErrorCode};
use crate::options::PipelineOptions;
use crate::request::Request;
use crate::response::Response;
use crate::util::{bounded_retry_delay, parse_retry_after};

const RETRY_AFTER_MS_HEADERS: &[&str] = &["retry-after-ms", "x-ms-retry-after-ms"];

/// Outcome of one attempt, as seen by a [`RetryClassifier`].
#[derive(Clone, Debug)]
pub struct RetryDecision {
    /// Retries already performed for this call.
    pub retry_count: usize,
    pub max_retries: usize,
    pub method: Method,
    pub url: String,
    pub status: Option<StatusCode>,
    pub error_code: Option<ErrorCode>,
    pub error_retryable: bool,
}

pub trait RetryClassifier: Send + Sync {
    fn should_retry(&self, decision: &RetryDecision) -> bool;
}

/// Retry configuration, and the factory of the retry policy.
///
/// A status is retried when it is `408` or a `5xx` other than `501` and
/// `505`; an error is retried when [`Error::is_retryable`] says so. A
/// classifier replaces both rules but never lifts `max_retries`.
#[derive(Clone)]
pub struct RetryConfig {
    max_retries: usize,
    base_delay: Duration,
    max_delay: Duration,
    jitter_ratio: f64,
    honor_retry_after: bool,
    classifier: Option<Arc<dyn RetryClassifier>>,
}

impl std::fmt::Debug for RetryConfig {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("RetryConfig")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .field("jitter_ratio", &self.jitter_ratio)
            .field("honor_retry_after", &self.honor_retry_after)
            .field("classifier", &self.classifier.is_some())
            .finish()
    }
}

impl RetryConfig {
    pub fn new(max_retries: usize) -> Self {
        Self {
            max_retries,
            ..Self::standard()
        }
    }

    pub fn standard() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(2),
            jitter_ratio: 0.2,
            honor_retry_after: true,
            classifier: None,
        }
    }

    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            jitter_ratio: 0.0,
            ..Self::standard()
        }
    }

    pub fn max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// A zero base delay retries immediately.
    pub fn base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        if self.max_delay < self.base_delay {
            self.max_delay = self.base_delay;
        }
        self
    }

    pub fn max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay.max(self.base_delay);
        self
    }

    pub fn jitter_ratio(mut self, jitter_ratio: f64) -> Self {
        self.jitter_ratio = if jitter_ratio.is_finite() {
            jitter_ratio.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self
    }

    pub fn honor_retry_after(mut self, honor_retry_after: bool) -> Self {
        self.honor_retry_after = honor_retry_after;
        self
    }

    pub fn classifier(mut self, classifier: Arc<dyn RetryClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn is_retryable_status(status: StatusCode) -> bool {
        status == StatusCode::REQUEST_TIMEOUT
            || (status.is_server_error()
                && status != StatusCode::NOT_IMPLEMENTED
                && status != StatusCode::HTTP_VERSION_NOT_SUPPORTED)
    }

    pub fn should_retry(&self, decision: &RetryDecision) -> bool {
        if decision.retry_count >= decision.max_retries {
            return false;
        }
        if let Some(classifier) = &self.classifier {
            return classifier.should_retry(decision);
        }
        match decision.status {
            Some(status) => Self::is_retryable_status(status),
            None => decision.error_retryable,
        }
    }

    /// Delay before retry number `retry_index` (1-based).
    pub(crate) fn backoff_for_retry(&self, retry_index: usize) -> Duration {
        if self.base_delay.is_zero() {
            return Duration::ZERO;
        }
        let capped_exponent = retry_index.saturating_sub(1).min(31) as u32;
        let multiplier = 1_u128 << capped_exponent;
        let base_ms = self.base_delay.as_millis().max(1);
        let max_ms = self.max_delay.as_millis().max(base_ms);
        let delay_ms = base_ms
            .saturating_mul(multiplier)
            .min(max_ms)
            .min(u64::MAX as u128) as u64;
        self.apply_jitter(Duration::from_millis(delay_ms))
    }

    fn apply_jitter(&self, backoff: Duration) -> Duration {
        if self.jitter_ratio <= f64::EPSILON {
            return backoff;
        }

        let backoff_ms = backoff.as_millis().min(u64::MAX as u128) as u64;
        if backoff_ms <= 1 {
            return backoff;
        }
        let max_delay_ms = self.max_delay.as_millis().min(u64::MAX as u128) as u64;

        let jitter_span = ((backoff_ms as f64) * self.jitter_ratio).round().max(1.0) as u64;
        let low = backoff_ms.saturating_sub(jitter_span);
        let high = backoff_ms.saturating_add(jitter_span).max(low);
        let sampled_ms = rand::rng()
            .random_range(low..=high)
            .min(max_delay_ms.max(1));
        Duration::from_millis(sampled_ms)
    }

    /// Server-requested delay, capped at `max_delay`.
    fn retry_after(&self, response: &Response) -> Option<Duration> {
        if !self.honor_retry_after {
            return None;
        }
        let headers = response.headers();
        let requested = RETRY_AFTER_MS_HEADERS
            .iter()
            .find_map(|name| headers.value(name))
            .and_then(|value| value.trim().parse::<u64>().ok())
            .map(Duration::from_millis)
            .or_else(|| {
                headers
                    .value("retry-after")
                    .and_then(|value| parse_retry_after(value, SystemTime::now()))
            })?;
        Some(requested.min(self.max_delay))
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::standard()
    }
}

impl PolicyFactory for RetryConfig {
    fn create(
        &self,
        next: Arc<dyn RequestPolicy>,
        _options: &PipelineOptions,
    ) -> Arc<dyn RequestPolicy> {
        Arc::new(RetryPolicy {
            config: self.clone(),
            next,
        })
    }
}

struct RetryPolicy {
    config: RetryConfig,
    next: Arc<dyn RequestPolicy>,
}

impl RetryPolicy {
    fn decision(
        &self,
        request: &Request,
        retry_count: usize,
        max_retries: usize,
        outcome: &Result<Response>,
    ) -> RetryDecision {
        let (status, error_code, error_retryable) = match outcome {
            Ok(response) => (Some(response.status()), None, false),
            Err(error) => (None, Some(error.code()), error.is_retryable()),
        };
        RetryDecision {
            retry_count,
            max_retries,
            method: request.method().clone(),
            url: request.redacted_url(),
            status,
            error_code,
            error_retryable,
        }
    }
}

#[async_trait]
impl RequestPolicy for RetryPolicy {
    async fn send(&self, request: &mut Request) -> Result<Response> {
        let max_retries = if request.is_body_replayable() {
            self.config.max_retries
        } else {
            if self.config.max_retries > 0 {
                debug!(
                    method = %request.method(),
                    url = %request.redacted_url(),
                    "request body is not replayable; retries disabled for this call"
                );
            }
            0
        };

        let mut retry_count = 0;
        loop {
            let span = info_span!(
                "azpipe.attempt",
                method = %request.method(),
                url = %request.redacted_url(),
                attempt = retry_count + 1,
                max_attempts = max_retries + 1
            );
            let outcome = self.next.send(request).instrument(span).await;
            let decision = self.decision(request, retry_count, max_retries, &outcome);
            if !self.config.should_retry(&decision) {
                return outcome;
            }

            retry_count += 1;
            let backoff = self.config.backoff_for_retry(retry_count);
            let delay = match &outcome {
                Ok(response) => self.config.retry_after(response).unwrap_or(backoff),
                Err(_) => backoff,
            };
            let deadline = request.deadline();
            let Some(delay) = bounded_retry_delay(delay, deadline.map(|deadline| deadline.at))
            else {
                let timeout = deadline.map(|deadline| deadline.timeout).unwrap_or(delay);
                warn!(
                    method = %request.method(),
                    url = %decision.url,
                    retry = retry_count,
                    "retry backoff would exceed the call deadline"
                );
                return Err(Error::Timeout {
                    timeout_ms: timeout.as_millis(),
                    method: request.method().clone(),
                    url: decision.url,
                    last_status: decision.status.map(|status| status.as_u16()),
                });
            };

            match &decision.status {
                Some(status) => debug!(
                    method = %request.method(),
                    url = %decision.url,
                    status = status.as_u16(),
                    retry = retry_count,
                    max_retries,
                    delay_ms = delay.as_millis() as u64,
                    "retrying after retryable status"
                ),
                None => debug!(
                    method = %request.method(),
                    url = %decision.url,
                    error_code = decision.error_code.map(ErrorCode::as_str).unwrap_or("unknown"),
                    retry = retry_count,
                    max_retries,
                    delay_ms = delay.as_millis() as u64,
                    "retrying after retryable error"
                ),
            }
            drop(outcome);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
    }
}
