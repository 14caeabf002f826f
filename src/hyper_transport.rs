//! [`Transport`] over hyper's pooled client with rustls and webpki roots.

use std::convert::Infallible;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use http::header::USER_AGENT;
use http::{HeaderValue, Uri};
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, Full, StreamBody};
use hyper::body::Frame;
use hyper_rustls::HttpsConnectorBuilder;
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use tokio::time::timeout;
use tracing::debug;

use crate::Result;
use crate::body::{BodyContent, ResponseBody};
use crate::error::{BoxError, Error, TransportErrorKind};
use crate::headers::HttpHeaders;
use crate::policy::DEFAULT_USER_AGENT;
use crate::request::Request;
use crate::response::Response;
use crate::transport::Transport;

type WireBody = UnsyncBoxBody<Bytes, BoxError>;
type HttpsClient = Client<hyper_rustls::HttpsConnector<HttpConnector>, WireBody>;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);
const DEFAULT_POOL_MAX_IDLE_PER_HOST: usize = 8;

pub(crate) fn classify_transport_error(
    error: &hyper_util::client::legacy::Error,
) -> TransportErrorKind {
    let text = error_chain_text(error);
    if error.is_connect() {
        if text.contains("dns")
            || text.contains("name or service not known")
            || text.contains("failed to lookup address")
        {
            return TransportErrorKind::Dns;
        }
        if text.contains("tls") || text.contains("certificate") || text.contains("handshake") {
            return TransportErrorKind::Tls;
        }
        return TransportErrorKind::Connect;
    }

    if text.contains("read")
        || text.contains("connection reset")
        || text.contains("broken pipe")
        || text.contains("unexpected eof")
        || text.contains("connection closed")
    {
        return TransportErrorKind::Read;
    }

    TransportErrorKind::Other
}

fn error_chain_text(error: &(dyn std::error::Error + 'static)) -> String {
    let mut text = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        text.push_str(": ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    text.to_ascii_lowercase()
}

fn build_tls_config() -> Result<rustls::ClientConfig> {
    let root_store =
        rustls::RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let config = rustls::ClientConfig::builder_with_provider(
        rustls::crypto::ring::default_provider().into(),
    )
    .with_safe_default_protocol_versions()
    .map_err(|source| Error::TlsInit {
        message: source.to_string(),
    })?
    .with_root_certificates(root_store)
    .with_no_client_auth();
    Ok(config)
}

fn map_infallible_to_box_error(never: Infallible) -> BoxError {
    match never {}
}

fn wire_body(content: BodyContent) -> WireBody {
    match content {
        BodyContent::Empty => Empty::<Bytes>::new()
            .map_err(map_infallible_to_box_error)
            .boxed_unsync(),
        BodyContent::Bytes(bytes) => Full::new(bytes)
            .map_err(map_infallible_to_box_error)
            .boxed_unsync(),
        BodyContent::Stream(stream) => {
            StreamBody::new(stream.map(|item| item.map(Frame::data))).boxed_unsync()
        }
    }
}

/// HTTP/1.1 and HTTP/2 over TLS (rustls, ring provider, webpki roots) or
/// plain TCP.
///
/// Connections are pooled and shared by clones. The request timeout bounds
/// the wait for response headers of one attempt; the body then streams.
#[derive(Clone)]
pub struct HyperTransport {
    client: HttpsClient,
    request_timeout: Duration,
}

impl std::fmt::Debug for HyperTransport {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("HyperTransport")
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}

impl HyperTransport {
    pub fn builder() -> HyperTransportBuilder {
        HyperTransportBuilder::new()
    }

    pub fn new() -> Result<Self> {
        Self::builder().try_build()
    }

    fn parse_uri(request: &Request) -> Result<Uri> {
        let uri = request
            .url()
            .parse::<Uri>()
            .map_err(|source| Error::malformed_url(request.url(), source.to_string()))?;
        if uri.scheme().is_none() || uri.authority().is_none() {
            return Err(Error::malformed_url(
                request.url(),
                "transport needs an absolute url",
            ));
        }
        Ok(uri)
    }
}

#[async_trait]
impl Transport for HyperTransport {
    async fn send(&self, request: &mut Request) -> Result<Response> {
        let uri = Self::parse_uri(request)?;
        let content = request.take_body_for_attempt()?;

        let mut builder = http::Request::builder()
            .method(request.method().clone())
            .uri(uri);
        if let Some(headers) = builder.headers_mut() {
            headers.extend(
                request
                    .headers()
                    .header_map()
                    .iter()
                    .map(|(name, value)| (name.clone(), value.clone())),
            );
            headers
                .entry(USER_AGENT)
                .or_insert(HeaderValue::from_static(DEFAULT_USER_AGENT));
        }
        let wire_request = builder.body(wire_body(content)).map_err(|source| {
            Error::transport(
                TransportErrorKind::Other,
                request.method(),
                request.url(),
                source,
            )
        })?;

        let response = match timeout(self.request_timeout, self.client.request(wire_request)).await
        {
            Ok(Ok(response)) => response,
            Ok(Err(source)) => {
                let kind = classify_transport_error(&source);
                debug!(
                    method = %request.method(),
                    url = %request.redacted_url(),
                    kind = kind.as_str(),
                    "transport request failed"
                );
                return Err(Error::transport(
                    kind,
                    request.method(),
                    request.url(),
                    source,
                ));
            }
            Err(_) => {
                return Err(Error::Timeout {
                    timeout_ms: self.request_timeout.as_millis(),
                    method: request.method().clone(),
                    url: request.redacted_url(),
                    last_status: None,
                });
            }
        };

        let (parts, body) = response.into_parts();
        Ok(Response::new(
            parts.status,
            HttpHeaders::from(parts.headers),
            ResponseBody::from_stream(body.into_data_stream()),
        ))
    }
}

#[derive(Clone, Debug)]
pub struct HyperTransportBuilder {
    connect_timeout: Duration,
    request_timeout: Duration,
    pool_idle_timeout: Duration,
    pool_max_idle_per_host: usize,
    http2_only: bool,
}

impl HyperTransportBuilder {
    pub fn new() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            pool_idle_timeout: DEFAULT_POOL_IDLE_TIMEOUT,
            pool_max_idle_per_host: DEFAULT_POOL_MAX_IDLE_PER_HOST,
            http2_only: false,
        }
    }

    pub fn connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout.max(Duration::from_millis(1));
        self
    }

    pub fn request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout.max(Duration::from_millis(1));
        self
    }

    pub fn pool_idle_timeout(mut self, pool_idle_timeout: Duration) -> Self {
        self.pool_idle_timeout = pool_idle_timeout.max(Duration::from_millis(1));
        self
    }

    pub fn pool_max_idle_per_host(mut self, pool_max_idle_per_host: usize) -> Self {
        self.pool_max_idle_per_host = pool_max_idle_per_host;
        self
    }

    pub fn http2_only(mut self, http2_only: bool) -> Self {
        self.http2_only = http2_only;
        self
    }

    pub fn try_build(self) -> Result<HyperTransport> {
        let mut connector = HttpConnector::new();
        connector.enforce_http(false);
        connector.set_connect_timeout(Some(self.connect_timeout));
        connector.set_nodelay(true);

        let https = HttpsConnectorBuilder::new()
            .with_tls_config(build_tls_config()?)
            .https_or_http()
            .enable_http1()
            .enable_http2()
            .wrap_connector(connector);
        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(self.pool_idle_timeout)
            .pool_max_idle_per_host(self.pool_max_idle_per_host)
            .http2_only(self.http2_only)
            .build(https);
        Ok(HyperTransport {
            client,
            request_timeout: self.request_timeout,
        })
    }

    /// # Panics
    ///
    /// Panics when TLS cannot be initialized; use
    /// [`try_build`](Self::try_build) to handle that.
    #[track_caller]
    pub fn build(self) -> HyperTransport {
        self.try_build().unwrap_or_else(|error| {
            panic!("failed to build hyper transport: {error}; use try_build() to handle configuration errors")
        })
    }
}

impl Default for HyperTransportBuilder {
    fn default() -> Self {
        Self::new()
    }
}
