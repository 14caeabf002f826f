use std::sync::Arc;

use async_trait::async_trait;
use tracing::Level;

use crate::Result;
use crate::options::{LogSink, PipelineOptions};
use crate::policy::{PolicyFactory, RequestPolicy};
use crate::request::Request;
use crate::response::Response;
use crate::transport::{Transport, TransportPolicy};

/// An ordered list of policy factories ending in a transport.
///
/// Cheap to clone and safe to share. Every call gets a chain of its own,
/// built fresh from the factories, so policy instances never see two calls.
#[derive(Clone)]
pub struct Pipeline {
    factories: Arc<[Arc<dyn PolicyFactory>]>,
    terminal: Arc<dyn RequestPolicy>,
    options: PipelineOptions,
}

impl Pipeline {
    /// Places `factories` in front of `transport`.
    ///
    /// The first factory builds the outermost node: it sees the request
    /// first and the response last.
    pub fn new<I>(factories: I, options: PipelineOptions, transport: Arc<dyn Transport>) -> Self
    where
        I: IntoIterator<Item = Arc<dyn PolicyFactory>>,
    {
        Self {
            factories: factories.into_iter().collect(),
            terminal: Arc::new(TransportPolicy::new(transport)),
            options,
        }
    }

    /// Builds the chain for one call, from the wire end outwards.
    fn chain(&self) -> Arc<dyn RequestPolicy> {
        self.factories
            .iter()
            .rev()
            .fold(Arc::clone(&self.terminal), |next, factory| {
                factory.create(next, &self.options)
            })
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    pub fn builder(transport: Arc<dyn Transport>) -> PipelineBuilder {
        PipelineBuilder::new(transport)
    }

    pub async fn send(&self, mut request: Request) -> Result<Response> {
        self.send_request(&mut request).await
    }

    /// Sends a request the caller keeps, to inspect what the policies
    /// did to it.
    pub async fn send_request(&self, request: &mut Request) -> Result<Response> {
        self.chain().send(request).await
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Wraps this pipeline as the transport of another pipeline.
    pub fn into_transport(self) -> Arc<dyn Transport> {
        Arc::new(PipelineTransport { pipeline: self })
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Pipeline")
            .field("policies", &self.factories.len())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

struct PipelineTransport {
    pipeline: Pipeline,
}

#[async_trait]
impl Transport for PipelineTransport {
    async fn send(&self, request: &mut Request) -> Result<Response> {
        self.pipeline.send_request(request).await
    }
}

pub struct PipelineBuilder {
    factories: Vec<Arc<dyn PolicyFactory>>,
    options: PipelineOptions,
    transport: Arc<dyn Transport>,
}

impl PipelineBuilder {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            factories: Vec::new(),
            options: PipelineOptions::default(),
            transport,
        }
    }

    /// Appends a policy nearer the wire than every policy added so far.
    pub fn policy<P>(self, factory: P) -> Self
    where
        P: PolicyFactory + 'static,
    {
        self.policy_arc(Arc::new(factory))
    }

    pub fn policy_arc(mut self, factory: Arc<dyn PolicyFactory>) -> Self {
        self.factories.push(factory);
        self
    }

    pub fn options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
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

    pub fn build(self) -> Pipeline {
        Pipeline::new(self.factories, self.options, self.transport)
    }
}
