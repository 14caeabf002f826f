use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::Result;
use crate::policy::RequestPolicy;
use crate::request::Request;
use crate::response::Response;

/// The network boundary at the end of every pipeline.
///
/// A transport performs one round trip per call. It reads the request body
/// through [`Request::take_body_for_attempt`], never interprets the status
/// code, and reports connection, DNS and TLS failures as
/// [`Error::Transport`](crate::Error::Transport).
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &mut Request) -> Result<Response>;
}

/// Terminal node adapting a [`Transport`] to the chain.
pub(crate) struct TransportPolicy {
    transport: Arc<dyn Transport>,
}

impl TransportPolicy {
    pub(crate) fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl RequestPolicy for TransportPolicy {
    async fn send(&self, request: &mut Request) -> Result<Response> {
        debug!(
            method = %request.method(),
            url = %request.redacted_url(),
            "dispatching request to transport"
        );
        self.transport.send(request).await
    }
}
