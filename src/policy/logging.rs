use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use bytes::Bytes;
use http::header::CONTENT_TYPE;
use tracing::Level;

use super::{PolicyFactory, RequestPolicy};
use crate::Result;
use crate::body::{CollectError, RequestBody, StreamFactory, collect_stream};
use crate::error::ErrorCode;
use crate::headers::HttpHeaders;
use crate::options::PipelineOptions;
use crate::request::Request;
use crate::response::Response;
use crate::util::{REDACTED, is_sensitive_header};

/// Bodies above this size are summarized instead of logged.
pub const DEFAULT_MAX_LOGGED_BODY_BYTES: usize = 16 * 1024;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogDetailLevel {
    None,
    /// Method, URL, status and elapsed time.
    #[default]
    Basic,
    Headers,
    BodyAndHeaders,
}

impl LogDetailLevel {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Basic => "basic",
            Self::Headers => "headers",
            Self::BodyAndHeaders => "body_and_headers",
        }
    }
}

/// Writes request, response and failure lines to the pipeline's
/// [`LogSink`](crate::LogSink).
///
/// URLs lose their userinfo and `sig` values and credential headers are
/// printed as `REDACTED`. Bodies are read for logging up to
/// `max_body_bytes`, and a response whose declared length is larger is not
/// read at all. The body stays readable for the caller either way.
#[derive(Clone, Debug)]
pub struct LoggingConfig {
    detail: LogDetailLevel,
    max_body_bytes: usize,
    level: Level,
    failure_level: Level,
}

impl LoggingConfig {
    pub fn new(detail: LogDetailLevel) -> Self {
        Self {
            detail,
            max_body_bytes: DEFAULT_MAX_LOGGED_BODY_BYTES,
            level: Level::INFO,
            failure_level: Level::WARN,
        }
    }

    pub fn max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    /// Level of request and response lines.
    pub fn level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn failure_level(mut self, level: Level) -> Self {
        self.failure_level = level;
        self
    }

    pub fn detail(&self) -> LogDetailLevel {
        self.detail
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self::new(LogDetailLevel::default())
    }
}

impl PolicyFactory for LoggingConfig {
    fn create(
        &self,
        next: Arc<dyn RequestPolicy>,
        options: &PipelineOptions,
    ) -> Arc<dyn RequestPolicy> {
        Arc::new(LoggingPolicy {
            config: self.clone(),
            options: options.clone(),
            next,
        })
    }
}

struct LoggingPolicy {
    config: LoggingConfig,
    options: PipelineOptions,
    next: Arc<dyn RequestPolicy>,
}

fn is_textual_content_type(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    essence.starts_with("text/")
        || essence.ends_with("+json")
        || essence.ends_with("+xml")
        || matches!(
            essence.as_str(),
            "application/json"
                | "application/xml"
                | "application/javascript"
                | "application/x-www-form-urlencoded"
        )
}

fn body_is_loggable(content_type: Option<&str>, bytes: &[u8]) -> bool {
    match content_type {
        Some(content_type) => is_textual_content_type(content_type),
        None => std::str::from_utf8(bytes).is_ok(),
    }
}

fn write_headers(message: &mut String, headers: &HttpHeaders) {
    for (name, value) in headers.iter() {
        let value = if is_sensitive_header(name) {
            REDACTED
        } else {
            value.as_str()
        };
        let _ = write!(message, "\n{name}: {value}");
    }
}

fn write_body(
    message: &mut String,
    content_type: Option<&str>,
    bytes: &Bytes,
    max_body_bytes: usize,
) {
    if bytes.is_empty() {
        return;
    }
    if bytes.len() > max_body_bytes || !body_is_loggable(content_type, bytes) {
        let _ = write!(message, "\n{}-byte body, not logged", bytes.len());
        return;
    }
    let _ = write!(message, "\n{}", String::from_utf8_lossy(bytes));
}

fn write_unread_body(message: &mut String, length: Option<usize>, max_body_bytes: usize) {
    match length {
        Some(0) => {}
        Some(length) => {
            let _ = write!(message, "\n{length}-byte body, not logged");
        }
        None => {
            let _ = write!(message, "\nbody over {max_body_bytes} bytes, not logged");
        }
    }
}

/// Opens a replayable request body once more and logs it if it fits.
async fn write_factory_body(
    message: &mut String,
    content_type: Option<&str>,
    factory: StreamFactory,
    max_body_bytes: usize,
) {
    match collect_stream(factory(), max_body_bytes).await {
        Ok(bytes) => write_body(message, content_type, &bytes, max_body_bytes),
        Err(CollectError::TooLarge { .. }) => write_unread_body(message, None, max_body_bytes),
        Err(CollectError::Read(_)) => message.push_str("\nunreadable body, not logged"),
    }
}

impl LoggingPolicy {
    fn request_message(&self, request: &Request) -> String {
        let mut message = format!("--> {} {}", request.method(), request.redacted_url());
        if self.config.detail >= LogDetailLevel::Headers {
            write_headers(&mut message, request.headers());
        }
        if self.config.detail >= LogDetailLevel::BodyAndHeaders {
            let content_type = request.headers().value(CONTENT_TYPE.as_str());
            match request.request_body() {
                None | Some(RequestBody::Factory(_)) => {}
                Some(RequestBody::Bytes(bytes)) => {
                    write_body(&mut message, content_type, bytes, self.config.max_body_bytes);
                }
                Some(RequestBody::Once(Some(_))) => {
                    message.push_str("\nstreamed body, not logged");
                }
                Some(RequestBody::Once(None)) => {}
            }
        }
        message
    }

    /// The body factory and content type of a request whose body is read
    /// again for logging.
    fn replayable_body(&self, request: &Request) -> Option<(StreamFactory, Option<String>)> {
        if self.config.detail < LogDetailLevel::BodyAndHeaders {
            return None;
        }
        match request.request_body() {
            Some(RequestBody::Factory(factory)) => Some((
                Arc::clone(factory),
                request
                    .headers()
                    .value(CONTENT_TYPE.as_str())
                    .map(str::to_owned),
            )),
            _ => None,
        }
    }

    async fn response_message(
        &self,
        target: &str,
        response: &mut Response,
        started: Instant,
    ) -> String {
        let mut message = format!(
            "<-- {} {target} ({} ms)",
            response.status().as_u16(),
            started.elapsed().as_millis()
        );
        if self.config.detail >= LogDetailLevel::Headers {
            write_headers(&mut message, response.headers());
        }
        if self.config.detail >= LogDetailLevel::BodyAndHeaders {
            let max_body_bytes = self.config.max_body_bytes;
            let declared = response.content_length();
            let within_limit = declared.is_none_or(|length| length <= max_body_bytes);
            let mut unreadable = false;
            if !response.is_buffered() && within_limit {
                // Oversized bodies are stitched back and keep streaming.
                if let Err(error) = response.buffer_limited(max_body_bytes).await {
                    unreadable = error.code() != ErrorCode::ResponseBodyTooLarge;
                }
            }
            match response.body() {
                Some(bytes) => write_body(
                    &mut message,
                    response.headers().value(CONTENT_TYPE.as_str()),
                    bytes,
                    max_body_bytes,
                ),
                None if unreadable => message.push_str("\nunreadable body, not logged"),
                None => write_unread_body(&mut message, declared, max_body_bytes),
            }
        }
        message
    }
}

#[async_trait]
impl RequestPolicy for LoggingPolicy {
    async fn send(&self, request: &mut Request) -> Result<Response> {
        let enabled = self.config.detail != LogDetailLevel::None;
        if enabled && self.options.is_enabled(self.config.level) {
            let mut message = self.request_message(request);
            let replayable = self.replayable_body(request);
            if let Some((factory, content_type)) = replayable {
                write_factory_body(
                    &mut message,
                    content_type.as_deref(),
                    factory,
                    self.config.max_body_bytes,
                )
                .await;
            }
            self.options.log(self.config.level, &message);
        }

        let started = Instant::now();
        match self.next.send(request).await {
            Ok(mut response) => {
                if enabled && self.options.is_enabled(self.config.level) {
                    let target = format!("{} {}", request.method(), request.redacted_url());
                    let message = self.response_message(&target, &mut response, started).await;
                    self.options.log(self.config.level, &message);
                }
                Ok(response)
            }
            Err(error) => {
                if enabled {
                    let message = format!(
                        "<-- {} {} failed after {} ms: {error}",
                        request.method(),
                        request.redacted_url(),
                        started.elapsed().as_millis()
                    );
                    self.options.log(self.config.failure_level, &message);
                }
                Err(error)
            }
        }
    }
}
