//! Host, port and scheme overrides.
//!
//! Each override parses the request URL, replaces one component when
//! configured to overwrite or when the component is absent, and writes the
//! URL back. They commute with each other, but must sit before any policy
//! that signs the final URL.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::{PolicyFactory, RequestPolicy};
use crate::Result;
use crate::error::Error;
use crate::options::PipelineOptions;
use crate::request::Request;
use crate::response::Response;
use crate::url_parts::UrlParts;

trait UrlRewrite: Clone + Send + Sync + 'static {
    /// Returns whether `parts` changed.
    fn rewrite(&self, parts: &mut UrlParts) -> Result<bool>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HostConfig {
    host: String,
    overwrite: bool,
}

impl HostConfig {
    /// Fills in `host` only where the URL has none.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            overwrite: false,
        }
    }

    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }
}

impl UrlRewrite for HostConfig {
    fn rewrite(&self, parts: &mut UrlParts) -> Result<bool> {
        if !self.overwrite && parts.host().is_some() {
            return Ok(false);
        }
        parts.set_host(&self.host)?;
        Ok(true)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PortConfig {
    port: u16,
    overwrite: bool,
}

impl PortConfig {
    pub fn new(port: u16) -> Self {
        Self {
            port,
            overwrite: false,
        }
    }

    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }
}

impl UrlRewrite for PortConfig {
    fn rewrite(&self, parts: &mut UrlParts) -> Result<bool> {
        if !self.overwrite && parts.port().is_some() {
            return Ok(false);
        }
        if self.port == 0 {
            return Err(Error::malformed_url(&parts.to_string(), "port 0 is not dialable"));
        }
        parts.set_port(self.port);
        Ok(true)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProtocolConfig {
    scheme: String,
    overwrite: bool,
}

impl ProtocolConfig {
    pub fn new(scheme: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
            overwrite: false,
        }
    }

    pub fn https() -> Self {
        Self::new("https")
    }

    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }
}

impl UrlRewrite for ProtocolConfig {
    fn rewrite(&self, parts: &mut UrlParts) -> Result<bool> {
        if !self.overwrite && parts.scheme().is_some() {
            return Ok(false);
        }
        parts.set_scheme(&self.scheme)?;
        Ok(true)
    }
}

macro_rules! url_rewrite_factory {
    ($config:ty) => {
        impl PolicyFactory for $config {
            fn create(
                &self,
                next: Arc<dyn RequestPolicy>,
                _options: &PipelineOptions,
            ) -> Arc<dyn RequestPolicy> {
                Arc::new(UrlRewritePolicy {
                    rewrite: self.clone(),
                    next,
                })
            }
        }
    };
}

url_rewrite_factory!(HostConfig);
url_rewrite_factory!(PortConfig);
url_rewrite_factory!(ProtocolConfig);

struct UrlRewritePolicy<R> {
    rewrite: R,
    next: Arc<dyn RequestPolicy>,
}

#[async_trait]
impl<R> RequestPolicy for UrlRewritePolicy<R>
where
    R: UrlRewrite,
{
    async fn send(&self, request: &mut Request) -> Result<Response> {
        let mut parts = UrlParts::parse(request.url())?;
        if self.rewrite.rewrite(&mut parts)? {
            let rewritten = parts.to_url_string()?;
            debug!(
                from = %request.redacted_url(),
                to = %crate::util::redact_url_for_logs(&rewritten),
                "rewrote request url"
            );
            request.set_url(rewritten);
        }
        self.next.send(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::{HostConfig, PortConfig, ProtocolConfig, UrlRewrite};
    use crate::error::ErrorCode;
    use crate::url_parts::UrlParts;

    fn apply(rewrite: &impl UrlRewrite, url: &str) -> String {
        let mut parts = UrlParts::parse(url).expect("url should parse");
        rewrite.rewrite(&mut parts).expect("rewrite should succeed");
        parts.to_url_string().expect("url should serialize")
    }

    #[test]
    fn host_is_kept_unless_overwrite_is_set() {
        let config = HostConfig::new("override.example.com");

        assert_eq!(
            apply(&config, "https://vault.example.com/x"),
            "https://vault.example.com/x"
        );
        assert_eq!(
            apply(&config.clone().overwrite(true), "https://vault.example.com/x"),
            "https://override.example.com/x"
        );
    }

    #[test]
    fn missing_host_is_filled_in() {
        let config = HostConfig::new("vault.example.com");

        assert_eq!(
            apply(&config, "/secrets/a?api-version=7.4"),
            "//vault.example.com/secrets/a?api-version=7.4"
        );
    }

    #[test]
    fn overrides_commute() {
        let host = HostConfig::new("vault.example.com");
        let port = PortConfig::new(8443);
        let scheme = ProtocolConfig::https();

        let host_first = apply(&scheme, &apply(&port, &apply(&host, "/x")));
        let scheme_first = apply(&host, &apply(&port, &apply(&scheme, "/x")));
        assert_eq!(host_first, "https://vault.example.com:8443/x");
        assert_eq!(host_first, scheme_first);
    }

    #[test]
    fn port_and_scheme_respect_existing_components() {
        assert_eq!(
            apply(&PortConfig::new(9000), "http://localhost:8080/x"),
            "http://localhost:8080/x"
        );
        assert_eq!(
            apply(&PortConfig::new(9000).overwrite(true), "http://localhost:8080/x"),
            "http://localhost:9000/x"
        );
        assert_eq!(
            apply(&ProtocolConfig::https().overwrite(true), "http://localhost/x"),
            "https://localhost/x"
        );
    }

    #[test]
    fn invalid_host_is_a_malformed_url() {
        let mut parts = UrlParts::parse("https://vault.example.com/x").expect("url should parse");
        let error = HostConfig::new("bad host")
            .overwrite(true)
            .rewrite(&mut parts)
            .expect_err("host with a space is invalid");

        assert_eq!(error.code(), ErrorCode::MalformedUrl);
    }
}
