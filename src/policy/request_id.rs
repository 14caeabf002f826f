use std::sync::Arc;

use async_trait::async_trait;
use http::header::{HeaderName, HeaderValue};

use super::{PolicyFactory, RequestPolicy};
use crate::Result;
use crate::options::PipelineOptions;
use crate::request::Request;
use crate::response::Response;
use crate::util::{parse_header_name, parse_header_value};

pub const DEFAULT_REQUEST_ID_HEADER: &str = "x-ms-client-request-id";

/// Stamps a UUIDv4 request id unless the request already carries one.
///
/// Placed above a retry policy, every attempt of a call shares one id.
#[derive(Clone, Debug)]
pub struct RequestIdConfig {
    header: HeaderName,
}

impl RequestIdConfig {
    pub fn new() -> Self {
        Self {
            header: HeaderName::from_static(DEFAULT_REQUEST_ID_HEADER),
        }
    }

    pub fn header_name(name: &str) -> Result<Self> {
        Ok(Self {
            header: parse_header_name(name)?,
        })
    }
}

impl Default for RequestIdConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl PolicyFactory for RequestIdConfig {
    fn create(
        &self,
        next: Arc<dyn RequestPolicy>,
        _options: &PipelineOptions,
    ) -> Arc<dyn RequestPolicy> {
        Arc::new(RequestIdPolicy {
            header: self.header.clone(),
            next,
        })
    }
}

struct RequestIdPolicy {
    header: HeaderName,
    next: Arc<dyn RequestPolicy>,
}

#[async_trait]
impl RequestPolicy for RequestIdPolicy {
    async fn send(&self, request: &mut Request) -> Result<Response> {
        if !request.headers().contains(self.header.as_str()) {
            let id = uuid::Uuid::new_v4().to_string();
            let value: HeaderValue = parse_header_value(self.header.as_str(), &id)?;
            request.headers_mut().insert(self.header.clone(), value);
        }
        self.next.send(request).await
    }
}
