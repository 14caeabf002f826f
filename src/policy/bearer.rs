use std::sync::Arc;

use async_trait::async_trait;
use http::header::AUTHORIZATION;
use tracing::warn;

use super::{PolicyFactory, RequestPolicy};
use crate::Result;
use crate::credential::Credential;
use crate::options::PipelineOptions;
use crate::request::Request;
use crate::response::Response;
use crate::util::parse_header_value;

/// Sets `Authorization` from a [`Credential`] before forwarding.
///
/// A prior value is overwritten. When the credential fails the request is
/// not forwarded and the call fails with that error.
#[derive(Clone)]
pub struct BearerConfig {
    credential: Arc<dyn Credential>,
}

impl BearerConfig {
    pub fn new(credential: Arc<dyn Credential>) -> Self {
        Self { credential }
    }
}

impl std::fmt::Debug for BearerConfig {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.debug_struct("BearerConfig").finish_non_exhaustive()
    }
}

impl PolicyFactory for BearerConfig {
    fn create(
        &self,
        next: Arc<dyn RequestPolicy>,
        _options: &PipelineOptions,
    ) -> Arc<dyn RequestPolicy> {
        Arc::new(BearerPolicy {
            credential: Arc::clone(&self.credential),
            next,
        })
    }
}

struct BearerPolicy {
    credential: Arc<dyn Credential>,
    next: Arc<dyn RequestPolicy>,
}

#[async_trait]
impl RequestPolicy for BearerPolicy {
    async fn send(&self, request: &mut Request) -> Result<Response> {
        let header_value = match self.credential.auth_header_value(request.url()).await {
            Ok(header_value) => header_value,
            Err(error) => {
                warn!(
                    method = %request.method(),
                    url = %request.redacted_url(),
                    error = %error,
                    "credential failed; request not sent"
                );
                return Err(error);
            }
        };
        let mut value = parse_header_value(AUTHORIZATION.as_str(), &header_value)?;
        value.set_sensitive(true);
        request.headers_mut().insert(AUTHORIZATION, value);
        self.next.send(request).await
    }
}
