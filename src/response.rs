use bytes::Bytes;
use http::StatusCode;
use serde::de::DeserializeOwned;

use crate::Result;
use crate::body::{ByteStream, CollectError, ResponseBody, collect_stream, restitch};
use crate::error::{BoxError, Error};
use crate::headers::HttpHeaders;
use crate::util::truncate_body;

#[derive(Debug)]
pub struct Response {
    status: StatusCode,
    headers: HttpHeaders,
    body: ResponseBody,
}

fn consumed_error() -> Error {
    Error::ReadBody {
        source: "response body was already consumed".into(),
    }
}

impl Response {
    pub fn new(status: StatusCode, headers: HttpHeaders, body: ResponseBody) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// Empty-bodied response, handy for transports and tests.
    pub fn from_status(status: StatusCode) -> Self {
        Self::new(status, HttpHeaders::new(), ResponseBody::empty())
    }

    pub fn with_body(mut self, body: impl Into<ResponseBody>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Result<Self> {
        self.headers.add(name, value)?;
        Ok(self)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HttpHeaders {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HttpHeaders {
        &mut self.headers
    }

    /// Body bytes, once the body is buffered.
    pub fn body(&self) -> Option<&Bytes> {
        match &self.body {
            ResponseBody::Buffered(bytes) => Some(bytes),
            ResponseBody::Streaming(_) | ResponseBody::Consumed => None,
        }
    }

    pub fn is_buffered(&self) -> bool {
        matches!(self.body, ResponseBody::Buffered(_))
    }

    /// Declared `content-length`, if any.
    pub fn content_length(&self) -> Option<usize> {
        self.headers
            .value("content-length")
            .and_then(|value| value.trim().parse().ok())
    }

    /// Reads a streaming body into memory so it can be read again.
    pub async fn buffer(&mut self) -> Result<&Bytes> {
        self.buffer_limited(usize::MAX).await
    }

    /// Like [`buffer`](Self::buffer), but refuses bodies over `max_bytes`.
    ///
    /// On refusal the body is left intact, still streaming from its first
    /// byte.
    pub async fn buffer_limited(&mut self, max_bytes: usize) -> Result<&Bytes> {
        match std::mem::replace(&mut self.body, ResponseBody::Consumed) {
            ResponseBody::Buffered(bytes) => {
                if bytes.len() > max_bytes {
                    let actual_bytes = bytes.len();
                    self.body = ResponseBody::Buffered(bytes);
                    return Err(Error::ResponseBodyTooLarge {
                        limit_bytes: max_bytes,
                        actual_bytes,
                    });
                }
                self.body = ResponseBody::Buffered(bytes);
            }
            ResponseBody::Streaming(stream) => match collect_stream(stream, max_bytes).await {
                Ok(bytes) => self.body = ResponseBody::Buffered(bytes),
                Err(CollectError::Read(source)) => return Err(Error::ReadBody { source }),
                Err(CollectError::TooLarge {
                    read,
                    actual_bytes,
                    rest,
                }) => {
                    self.body = ResponseBody::Streaming(restitch(read, rest));
                    return Err(Error::ResponseBodyTooLarge {
                        limit_bytes: max_bytes,
                        actual_bytes,
                    });
                }
            },
            ResponseBody::Consumed => return Err(consumed_error()),
        }

        match &self.body {
            ResponseBody::Buffered(bytes) => Ok(bytes),
            ResponseBody::Streaming(_) | ResponseBody::Consumed => Err(consumed_error()),
        }
    }

    pub async fn into_bytes(mut self) -> Result<Bytes> {
        self.buffer().await?;
        match self.body {
            ResponseBody::Buffered(bytes) => Ok(bytes),
            ResponseBody::Streaming(_) | ResponseBody::Consumed => Err(consumed_error()),
        }
    }

    /// Hands the body out as a stream; a buffered body yields one chunk.
    pub fn into_stream(self) -> Result<ByteStream> {
        match self.body {
            ResponseBody::Buffered(bytes) => Ok(Box::pin(futures_util::stream::once(
                async move { Ok::<_, BoxError>(bytes) },
            ))),
            ResponseBody::Streaming(stream) => Ok(stream),
            ResponseBody::Consumed => Err(consumed_error()),
        }
    }

    pub async fn text_lossy(self) -> Result<String> {
        let bytes = self.into_bytes().await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    pub async fn json<T>(self) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let bytes = self.into_bytes().await?;
        serde_json::from_slice(&bytes).map_err(|source| Error::Deserialize {
            source,
            body: truncate_body(&bytes),
        })
    }
}
