//! The policy chain and its built-in policies.
//!
//! A policy receives the request together with its own handle on the rest
//! of the chain (`next`). Work done before calling `next.send` runs in
//! chain order; work done on the returned result runs in reverse chain
//! order. A policy with nothing to do still forwards and hands back what
//! `next` produced.

use std::sync::Arc;

use async_trait::async_trait;

use crate::options::PipelineOptions;
use crate::request::Request;
use crate::response::Response;

mod bearer;
mod cookie;
mod logging;
mod request_id;
mod retry;
mod status;
mod timeout;
mod url_override;
mod user_agent;

pub use bearer::BearerConfig;
pub use cookie::CookieConfig;
pub use logging::{DEFAULT_MAX_LOGGED_BODY_BYTES, LogDetailLevel, LoggingConfig};
pub use request_id::{DEFAULT_REQUEST_ID_HEADER, RequestIdConfig};
pub use retry::{RetryClassifier, RetryConfig, RetryDecision};
pub use status::StatusConfig;
pub use timeout::TimeoutConfig;
pub use url_override::{HostConfig, PortConfig, ProtocolConfig};
pub use user_agent::{DEFAULT_USER_AGENT, UserAgentConfig};

/// One node of the chain.
///
/// Nodes are built fresh for every call, so a node only ever serves one
/// call. State shared between calls (a cookie store, a token cache) is
/// owned by the factory and handed to each node behind an `Arc`.
#[async_trait]
pub trait RequestPolicy: Send + Sync {
    async fn send(&self, request: &mut Request) -> crate::Result<Response>;
}

/// Builds one chain node around `next`.
///
/// Factories are long-lived and shared by concurrent calls; they carry
/// configuration only. For every call [`Pipeline`](crate::Pipeline) calls
/// them from the wire end of the configured list towards the caller end,
/// so the first factory in the list becomes the outermost node.
pub trait PolicyFactory: Send + Sync {
    fn create(
        &self,
        next: Arc<dyn RequestPolicy>,
        options: &PipelineOptions,
    ) -> Arc<dyn RequestPolicy>;
}

impl<F> PolicyFactory for F
where
    F: Fn(Arc<dyn RequestPolicy>, &PipelineOptions) -> Arc<dyn RequestPolicy> + Send + Sync,
{
    fn create(
        &self,
        next: Arc<dyn RequestPolicy>,
        options: &PipelineOptions,
    ) -> Arc<dyn RequestPolicy> {
        self(next, options)
    }
}
