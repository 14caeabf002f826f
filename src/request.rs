use std::time::{Duration, Instant};

use bytes::Bytes;
use http::Method;
use http::header::{CONTENT_TYPE, HeaderName, HeaderValue};
use serde::Serialize;

use crate::Result;
use crate::body::{BodyContent, RequestBody};
use crate::error::Error;
use crate::headers::HttpHeaders;
use crate::util::{parse_header_name, parse_header_value, redact_url_for_logs};

/// An outgoing HTTP request.
///
/// Created once per logical call and mutated in place by every policy it
/// passes through. Transports read the body once per attempt through
/// [`take_body_for_attempt`](Self::take_body_for_attempt).
#[derive(Debug)]
pub struct Request {
    method: Method,
    url: String,
    headers: HttpHeaders,
    body: Option<RequestBody>,
    deadline: Option<Deadline>,
}

impl Request {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HttpHeaders::new(),
            body: None,
            deadline: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn put(url: impl Into<String>) -> Self {
        Self::new(Method::PUT, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    pub fn patch(url: impl Into<String>) -> Self {
        Self::new(Method::PATCH, url)
    }

    pub fn delete(url: impl Into<String>) -> Self {
        Self::new(Method::DELETE, url)
    }

    pub fn head(url: impl Into<String>) -> Self {
        Self::new(Method::HEAD, url)
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn try_header(self, name: &str, value: &str) -> Result<Self> {
        let name = parse_header_name(name)?;
        let value = parse_header_value(name.as_str(), value)?;
        Ok(self.header(name, value))
    }

    pub fn query_pair(mut self, name: &str, value: &str) -> Self {
        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        serializer.append_pair(name, value);
        let pair = serializer.finish();

        let (without_fragment, fragment) = match self.url.split_once('#') {
            Some((left, right)) => (left.to_owned(), Some(right.to_owned())),
            None => (self.url.clone(), None),
        };
        let mut merged = match without_fragment.split_once('?') {
            Some((_, "")) => format!("{without_fragment}{pair}"),
            Some(_) => format!("{without_fragment}&{pair}"),
            None => format!("{without_fragment}?{pair}"),
        };
        if let Some(fragment) = fragment {
            merged.push('#');
            merged.push_str(&fragment);
        }
        self.url = merged;
        self
    }

    pub fn body(mut self, body: impl Into<RequestBody>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn json<T>(self, payload: &T) -> Result<Self>
    where
        T: Serialize + ?Sized,
    {
        let body = serde_json::to_vec(payload).map_err(|source| Error::SerializeJson { source })?;
        Ok(self
            .body(Bytes::from(body))
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json")))
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Credential-free form of the URL, for logs and errors.
    pub fn redacted_url(&self) -> String {
        redact_url_for_logs(&self.url)
    }

    pub fn set_url(&mut self, url: impl Into<String>) {
        self.url = url.into();
    }

    pub fn headers(&self) -> &HttpHeaders {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HttpHeaders {
        &mut self.headers
    }

    pub fn request_body(&self) -> Option<&RequestBody> {
        self.body.as_ref()
    }

    pub fn set_body(&mut self, body: Option<RequestBody>) {
        self.body = body;
    }

    /// A request without a body is trivially replayable.
    pub fn is_body_replayable(&self) -> bool {
        self.body.as_ref().is_none_or(RequestBody::is_replayable)
    }

    /// Opens the body for one attempt, starting from its first byte.
    ///
    /// Fails with [`Error::BodyAlreadyConsumed`] when a one-shot body has
    /// already been sent.
    pub fn take_body_for_attempt(&mut self) -> Result<BodyContent> {
        let Some(body) = self.body.as_mut() else {
            return Ok(BodyContent::Empty);
        };
        body.open().ok_or_else(|| Error::BodyAlreadyConsumed {
            method: self.method.clone(),
            url: redact_url_for_logs(&self.url),
        })
    }

    /// Deadline published by an enclosing timeout policy.
    pub fn deadline(&self) -> Option<Deadline> {
        self.deadline
    }

    /// Keeps the earlier of the current and the given deadline.
    pub fn tighten_deadline(&mut self, deadline: Deadline) {
        self.deadline = Some(match self.deadline {
            Some(current) if current.at <= deadline.at => current,
            _ => deadline,
        });
    }

    pub(crate) fn set_deadline(&mut self, deadline: Option<Deadline>) {
        self.deadline = deadline;
    }
}

/// Point in time by which a call must complete, with the timeout it was
/// derived from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Deadline {
    pub at: Instant,
    pub timeout: Duration,
}

impl Deadline {
    pub fn after(timeout: Duration) -> Self {
        Self {
            at: Instant::now() + timeout,
            timeout,
        }
    }

    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use futures_util::stream;

    use super::Request;
    use crate::body::{BodyContent, RequestBody};
    use crate::error::ErrorCode;

    #[test]
    fn query_pair_respects_existing_query_and_fragment() {
        let request = Request::get("https://example.com/x?a=1#frag").query_pair("b", "2 3");
        assert_eq!(request.url(), "https://example.com/x?a=1&b=2+3#frag");

        let request = Request::get("https://example.com/x").query_pair("api-version", "7.4");
        assert_eq!(request.url(), "https://example.com/x?api-version=7.4");
    }

    #[test]
    fn json_sets_body_and_content_type() {
        let request = Request::put("https://example.com/secrets/a")
            .json(&serde_json::json!({ "value": "s3cr3t" }))
            .expect("json should serialize");

        assert_eq!(
            request.headers().value("Content-Type"),
            Some("application/json")
        );
        assert_eq!(
            request.request_body().and_then(RequestBody::as_bytes),
            Some(&Bytes::from_static(br#"{"value":"s3cr3t"}"#))
        );
    }

    #[tokio::test]
    async fn buffered_body_is_reopened_from_the_start_for_every_attempt() {
        let mut request = Request::post("https://example.com/x").body("payload");

        for _ in 0..3 {
            let body = request
                .take_body_for_attempt()
                .expect("buffered body is replayable")
                .collect()
                .await
                .expect("body should collect");
            assert_eq!(body, Bytes::from_static(b"payload"));
        }
    }

    #[tokio::test]
    async fn factory_body_opens_a_fresh_stream_per_attempt() {
        let body = RequestBody::from_factory(|| {
            stream::iter(vec![
                Ok::<_, std::io::Error>(Bytes::from_static(b"ab")),
                Ok(Bytes::from_static(b"cd")),
            ])
        });
        let mut request = Request::post("https://example.com/x").body(body);
        assert!(request.is_body_replayable());

        for _ in 0..2 {
            let body = request
                .take_body_for_attempt()
                .expect("factory body is replayable")
                .collect()
                .await
                .expect("body should collect");
            assert_eq!(body, Bytes::from_static(b"abcd"));
        }
    }

    #[test]
    fn one_shot_body_cannot_be_opened_twice() {
        let mut request = Request::post("https://example.com/x").body(RequestBody::once(
            stream::iter(vec![Ok::<_, std::io::Error>(Bytes::from_static(b"once"))]),
        ));
        assert!(!request.is_body_replayable());

        assert!(matches!(
            request.take_body_for_attempt(),
            Ok(BodyContent::Stream(_))
        ));
        let error = request
            .take_body_for_attempt()
            .expect_err("second open must fail");
        assert_eq!(error.code(), ErrorCode::BodyAlreadyConsumed);
    }

    #[test]
    fn request_without_body_opens_empty() {
        let mut request = Request::get("https://example.com/x");

        assert!(request.is_body_replayable());
        assert!(matches!(
            request.take_body_for_attempt(),
            Ok(BodyContent::Empty)
        ));
    }
}
