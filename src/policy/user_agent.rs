use std::sync::Arc;

use async_trait::async_trait;
use http::header::{HeaderValue, USER_AGENT};

use super::{PolicyFactory, RequestPolicy};
use crate::Result;
use crate::options::PipelineOptions;
use crate::request::Request;
use crate::response::Response;
use crate::util::parse_header_value;

/// User agent the crate sends when nothing else is configured.
pub const DEFAULT_USER_AGENT: &str = concat!("azpipe/", env!("CARGO_PKG_VERSION"));

/// Prefixes the `User-Agent` header with a product identifier.
///
/// An absent header, or one holding [`DEFAULT_USER_AGENT`], is replaced
/// outright. A header that already starts with the product identifier is
/// left alone, so nested pipelines do not prefix twice.
#[derive(Clone, Debug)]
pub struct UserAgentConfig {
    product_id: String,
    value: String,
}

impl UserAgentConfig {
    pub fn new(product_id: impl Into<String>) -> Self {
        let product_id = product_id.into().trim().to_owned();
        let value = product_id.clone();
        Self { product_id, value }
    }

    /// Appends `(os; arch)` of the running host after the product id.
    pub fn with_platform_info(mut self) -> Self {
        self.value = format!(
            "{} ({}; {})",
            self.product_id,
            std::env::consts::OS,
            std::env::consts::ARCH
        );
        self
    }

    pub fn product_id(&self) -> &str {
        &self.product_id
    }

    /// Header value this policy produces for `existing`.
    pub fn compose(&self, existing: Option<&str>) -> String {
        match existing.map(str::trim) {
            None | Some("") => self.value.clone(),
            Some(existing) if existing == DEFAULT_USER_AGENT => self.value.clone(),
            Some(existing) if existing.starts_with(&self.product_id) => existing.to_owned(),
            Some(existing) => format!("{} {existing}", self.value),
        }
    }
}

impl Default for UserAgentConfig {
    fn default() -> Self {
        Self::new(DEFAULT_USER_AGENT)
    }
}

impl PolicyFactory for UserAgentConfig {
    fn create(
        &self,
        next: Arc<dyn RequestPolicy>,
        _options: &PipelineOptions,
    ) -> Arc<dyn RequestPolicy> {
        Arc::new(UserAgentPolicy {
            config: self.clone(),
            next,
        })
    }
}

struct UserAgentPolicy {
    config: UserAgentConfig,
    next: Arc<dyn RequestPolicy>,
}

#[async_trait]
impl RequestPolicy for UserAgentPolicy {
    async fn send(&self, request: &mut Request) -> Result<Response> {
        let composed = self
            .config
            .compose(request.headers().value(USER_AGENT.as_str()));
        let value: HeaderValue = parse_header_value(USER_AGENT.as_str(), &composed)?;
        request.headers_mut().insert(USER_AGENT, value);
        self.next.send(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::{DEFAULT_USER_AGENT, UserAgentConfig};

    #[test]
    fn absent_or_default_value_is_replaced() {
        let config = UserAgentConfig::new("MyLib/1.0");

        assert_eq!(config.compose(None), "MyLib/1.0");
        assert_eq!(config.compose(Some(DEFAULT_USER_AGENT)), "MyLib/1.0");
    }

    #[test]
    fn existing_value_is_prefixed_once() {
        let config = UserAgentConfig::new("MyLib/1.0");

        let once = config.compose(Some("curl/8.0"));
        assert_eq!(once, "MyLib/1.0 curl/8.0");
        assert_eq!(config.compose(Some(&once)), once);
    }

    #[test]
    fn platform_info_follows_the_product_id() {
        let config = UserAgentConfig::new("MyLib/1.0").with_platform_info();

        let value = config.compose(None);
        assert!(value.starts_with("MyLib/1.0 ("), "{value}");
        assert!(value.contains(std::env::consts::OS), "{value}");
    }
}
