use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use super::{PolicyFactory, RequestPolicy};
use crate::Result;
use crate::error::Error;
use crate::options::PipelineOptions;
use crate::request::{Deadline, Request};
use crate::response::Response;

/// Bounds everything downstream by one deadline.
///
/// The deadline covers all retries below this policy and is published on
/// the request, so a retry policy refuses to back off past it. On expiry
/// the in-flight attempt is dropped and the call fails with
/// [`Error::Timeout`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimeoutConfig {
    timeout: Duration,
}

impl TimeoutConfig {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout: timeout.max(Duration::from_millis(1)),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl PolicyFactory for TimeoutConfig {
    fn create(
        &self,
        next: Arc<dyn RequestPolicy>,
        _options: &PipelineOptions,
    ) -> Arc<dyn RequestPolicy> {
        Arc::new(TimeoutPolicy {
            timeout: self.timeout,
            next,
        })
    }
}

struct TimeoutPolicy {
    timeout: Duration,
    next: Arc<dyn RequestPolicy>,
}

#[async_trait]
impl RequestPolicy for TimeoutPolicy {
    async fn send(&self, request: &mut Request) -> Result<Response> {
        let outer = request.deadline();
        let deadline = Deadline::after(self.timeout);
        request.tighten_deadline(deadline);
        let effective = request.deadline().unwrap_or(deadline);

        let outcome = tokio::time::timeout(effective.remaining(), self.next.send(request)).await;
        request.set_deadline(outer);

        match outcome {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    method = %request.method(),
                    url = %request.redacted_url(),
                    timeout_ms = effective.timeout.as_millis() as u64,
                    "request deadline elapsed"
                );
                Err(Error::Timeout {
                    timeout_ms: effective.timeout.as_millis(),
                    method: request.method().clone(),
                    url: request.redacted_url(),
                    last_status: None,
                })
            }
        }
    }
}
