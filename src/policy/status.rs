use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use http::StatusCode;

use super::{PolicyFactory, RequestPolicy};
use crate::Result;
use crate::error::Error;
use crate::options::PipelineOptions;
use crate::request::Request;
use crate::response::Response;
use crate::util::truncate_body;

const MAX_ERROR_BODY_BYTES: usize = 64 * 1024;

/// Turns unwanted statuses into [`Error::HttpStatus`].
///
/// The pipeline forwards every status unchanged by default; put this
/// policy in front when a caller prefers errors. Without an explicit list
/// every status outside `2xx` is rejected.
#[derive(Clone, Debug, Default)]
pub struct StatusConfig {
    accepted: BTreeSet<u16>,
}

impl StatusConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also lets `status` through, e.g. `404` for existence checks.
    pub fn accept(mut self, status: u16) -> Self {
        self.accepted.insert(status);
        self
    }

    pub fn is_accepted(&self, status: StatusCode) -> bool {
        status.is_success() || self.accepted.contains(&status.as_u16())
    }
}

impl PolicyFactory for StatusConfig {
    fn create(
        &self,
        next: Arc<dyn RequestPolicy>,
        _options: &PipelineOptions,
    ) -> Arc<dyn RequestPolicy> {
        Arc::new(StatusPolicy {
            config: self.clone(),
            next,
        })
    }
}

struct StatusPolicy {
    config: StatusConfig,
    next: Arc<dyn RequestPolicy>,
}

#[async_trait]
impl RequestPolicy for StatusPolicy {
    async fn send(&self, request: &mut Request) -> Result<Response> {
        let mut response = self.next.send(request).await?;
        let status = response.status();
        if self.config.is_accepted(status) {
            return Ok(response);
        }

        let body = match response.buffer_limited(MAX_ERROR_BODY_BYTES).await {
            Ok(bytes) => truncate_body(bytes),
            Err(_) => String::new(),
        };
        Err(Error::HttpStatus {
            status: status.as_u16(),
            method: request.method().clone(),
            url: request.redacted_url(),
            body,
        })
    }
}
