use std::sync::Arc;
use std::time::Duration;

use http::Method;
use tracing::Level;

use crate::Result;
use crate::blocking::BlockingPipeline;
use crate::credential::{Credential, StaticCredential};
use crate::options::{LogSink, PipelineOptions};
use crate::pipeline::Pipeline;
use crate::policy::{
    BearerConfig, CookieConfig, HostConfig, LoggingConfig, PolicyFactory, PortConfig,
    ProtocolConfig, RequestIdConfig, RetryConfig, StatusConfig, TimeoutConfig, UserAgentConfig,
};
use crate::request::Request;
use crate::response::Response;
use crate::transport::Transport;
use crate::util::{resolve_url, validate_endpoint};

/// Wires the standard policies of a service client into a [`Pipeline`].
///
/// The chain is, outermost first:
/// `[Status?, Timeout?, UserAgent, RequestId?, Retry, url and extra
/// policies..., Cookie?, Bearer?, Logging]`. Everything below `Retry` runs
/// again on every attempt, so each attempt is re-authorized and logged.
/// Cookies are matched against the URL after it is rewritten.
pub struct ClientBuilder {
    endpoint: String,
    credential: Option<Arc<dyn Credential>>,
    user_agent: UserAgentConfig,
    request_id: Option<RequestIdConfig>,
    retry: RetryConfig,
    timeout: Option<Duration>,
    status: Option<StatusConfig>,
    cookies: Option<CookieConfig>,
    per_retry_policies: Vec<Arc<dyn PolicyFactory>>,
    logging: LoggingConfig,
    options: PipelineOptions,
    transport: Option<Arc<dyn Transport>>,
}

impl ClientBuilder {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            credential: None,
            user_agent: UserAgentConfig::default(),
            request_id: Some(RequestIdConfig::new()),
            retry: RetryConfig::standard(),
            timeout: None,
            status: None,
            cookies: None,
            per_retry_policies: Vec::new(),
            logging: LoggingConfig::default(),
            options: PipelineOptions::default(),
            transport: None,
        }
    }

    pub fn credential(mut self, credential: Arc<dyn Credential>) -> Self {
        self.credential = Some(credential);
        self
    }

    pub fn bearer_token(self, token: impl AsRef<str>) -> Self {
        self.credential(Arc::new(StaticCredential::bearer(token)))
    }

    pub fn user_agent(mut self, user_agent: UserAgentConfig) -> Self {
        self.user_agent = user_agent;
        self
    }

    pub fn request_id(mut self, request_id: RequestIdConfig) -> Self {
        self.request_id = Some(request_id);
        self
    }

    pub fn without_request_id(mut self) -> Self {
        self.request_id = None;
        self
    }

    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Deadline for a whole call, retries included.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout.max(Duration::from_millis(1)));
        self
    }

    /// Fails calls whose final status `status` does not accept.
    pub fn status_policy(mut self, status: StatusConfig) -> Self {
        self.status = Some(status);
        self
    }

    pub fn cookies(mut self, cookies: CookieConfig) -> Self {
        self.cookies = Some(cookies);
        self
    }

    pub fn host(self, host: HostConfig) -> Self {
        self.per_retry_policy(host)
    }

    pub fn port(self, port: PortConfig) -> Self {
        self.per_retry_policy(port)
    }

    pub fn protocol(self, protocol: ProtocolConfig) -> Self {
        self.per_retry_policy(protocol)
    }

    /// Adds a policy that runs on every attempt, before cookies and
    /// authorization.
    pub fn per_retry_policy<P>(self, factory: P) -> Self
    where
        P: PolicyFactory + 'static,
    {
        self.per_retry_policy_arc(Arc::new(factory))
    }

    pub fn per_retry_policy_arc(mut self, factory: Arc<dyn PolicyFactory>) -> Self {
        self.per_retry_policies.push(factory);
        self
    }

    pub fn logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = logging;
        self
    }

    pub fn log_sink(mut self, log_sink: Arc<dyn LogSink>) -> Self {
        self.options = self.options.log_sink(log_sink);
        self
    }

    pub fn min_log_level(mut self, level: Level) -> Self {
        self.options = self.options.min_log_level(level);
        self
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    fn factories(&self) -> Vec<Arc<dyn PolicyFactory>> {
        let mut factories: Vec<Arc<dyn PolicyFactory>> = Vec::new();
        if let Some(status) = &self.status {
            factories.push(Arc::new(status.clone()));
        }
        if let Some(timeout) = self.timeout {
            factories.push(Arc::new(TimeoutConfig::new(timeout)));
        }
        factories.push(Arc::new(self.user_agent.clone()));
        if let Some(request_id) = &self.request_id {
            factories.push(Arc::new(request_id.clone()));
        }
        factories.push(Arc::new(self.retry.clone()));
        factories.extend(self.per_retry_policies.iter().cloned());
        if let Some(cookies) = &self.cookies {
            factories.push(Arc::new(cookies.clone()));
        }
        if let Some(credential) = &self.credential {
            factories.push(Arc::new(BearerConfig::new(Arc::clone(credential))));
        }
        factories.push(Arc::new(self.logging.clone()));
        factories
    }

    #[cfg(feature = "hyper-transport")]
    fn default_transport() -> Result<Arc<dyn Transport>> {
        Ok(Arc::new(crate::hyper_transport::HyperTransport::new()?))
    }

    #[cfg(not(feature = "hyper-transport"))]
    fn default_transport() -> Result<Arc<dyn Transport>> {
        Err(crate::error::Error::MissingTransport)
    }

    pub fn try_build(self) -> Result<ServiceClient> {
        validate_endpoint(&self.endpoint)?;
        let transport = match &self.transport {
            Some(transport) => Arc::clone(transport),
            None => Self::default_transport()?,
        };
        let pipeline = Pipeline::new(self.factories(), self.options.clone(), transport);
        Ok(ServiceClient {
            endpoint: self.endpoint,
            pipeline,
        })
    }

    #[track_caller]
    pub fn build(self) -> ServiceClient {
        self.try_build().unwrap_or_else(|error| {
            panic!("failed to build azpipe service client: {error}; use try_build() to handle configuration errors")
        })
    }
}

/// A pipeline bound to a service endpoint.
#[derive(Clone, Debug)]
pub struct ServiceClient {
    endpoint: String,
    pipeline: Pipeline,
}

impl ServiceClient {
    pub fn builder(endpoint: impl Into<String>) -> ClientBuilder {
        ClientBuilder::new(endpoint)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Starts a request for `path`, relative to the endpoint unless it is
    /// an absolute `http(s)` URL.
    pub fn request(&self, method: Method, path: &str) -> Request {
        Request::new(method, resolve_url(&self.endpoint, path))
    }

    pub fn get(&self, path: &str) -> Request {
        self.request(Method::GET, path)
    }

    pub fn put(&self, path: &str) -> Request {
        self.request(Method::PUT, path)
    }

    pub fn post(&self, path: &str) -> Request {
        self.request(Method::POST, path)
    }

    pub fn patch(&self, path: &str) -> Request {
        self.request(Method::PATCH, path)
    }

    pub fn delete(&self, path: &str) -> Request {
        self.request(Method::DELETE, path)
    }

    pub fn head(&self, path: &str) -> Request {
        self.request(Method::HEAD, path)
    }

    pub async fn send(&self, request: Request) -> Result<Response> {
        self.pipeline.send(request).await
    }

    /// A synchronous handle over the same pipeline.
    pub fn blocking(&self) -> Result<BlockingPipeline> {
        BlockingPipeline::new(self.pipeline.clone())
    }
}
