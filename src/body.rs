use std::pin::Pin;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use futures_core::Stream;
use futures_util::{StreamExt, stream};

use crate::error::{BoxError, Error};

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, BoxError>> + Send + 'static>>;

pub(crate) type StreamFactory = Arc<dyn Fn() -> ByteStream + Send + Sync>;

pub(crate) fn box_stream<S, E>(stream: S) -> ByteStream
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Into<BoxError>,
{
    Box::pin(stream.map(|item| -> Result<Bytes, BoxError> { item.map_err(Into::into) }))
}

/// Body of an outgoing request.
///
/// Buffered bytes and stream factories are replayable: each attempt
/// starts again from the first byte. A one-shot stream can be sent once.
pub enum RequestBody {
    Bytes(Bytes),
    Factory(StreamFactory),
    Once(Option<ByteStream>),
}

impl RequestBody {
    pub fn from_factory<F, S, E>(factory: F) -> Self
    where
        F: Fn() -> S + Send + Sync + 'static,
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: Into<BoxError>,
    {
        Self::Factory(Arc::new(move || box_stream(factory())))
    }

    pub fn once<S, E>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: Into<BoxError>,
    {
        Self::Once(Some(box_stream(stream)))
    }

    pub fn is_replayable(&self) -> bool {
        !matches!(self, Self::Once(_))
    }

    /// Length when known up front.
    pub fn len_hint(&self) -> Option<usize> {
        match self {
            Self::Bytes(bytes) => Some(bytes.len()),
            Self::Factory(_) | Self::Once(_) => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Self::Bytes(bytes) => Some(bytes),
            Self::Factory(_) | Self::Once(_) => None,
        }
    }

    /// Opens the body for a single send, rewound to its first byte.
    ///
    /// Returns `None` once a one-shot stream has been handed out.
    pub(crate) fn open(&mut self) -> Option<BodyContent> {
        match self {
            Self::Bytes(bytes) => Some(BodyContent::Bytes(bytes.clone())),
            Self::Factory(factory) => Some(BodyContent::Stream(factory())),
            Self::Once(stream) => stream.take().map(BodyContent::Stream),
        }
    }
}

impl std::fmt::Debug for RequestBody {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bytes(bytes) => formatter
                .debug_tuple("Bytes")
                .field(&bytes.len())
                .finish(),
            Self::Factory(_) => formatter.write_str("Factory"),
            Self::Once(stream) => formatter
                .debug_tuple("Once")
                .field(&if stream.is_some() { "pending" } else { "consumed" })
                .finish(),
        }
    }
}

impl From<Bytes> for RequestBody {
    fn from(bytes: Bytes) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<Vec<u8>> for RequestBody {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(Bytes::from(bytes))
    }
}

impl From<String> for RequestBody {
    fn from(text: String) -> Self {
        Self::Bytes(Bytes::from(text))
    }
}

impl From<&'static str> for RequestBody {
    fn from(text: &'static str) -> Self {
        Self::Bytes(Bytes::from_static(text.as_bytes()))
    }
}

/// What a transport writes for one attempt.
pub enum BodyContent {
    Empty,
    Bytes(Bytes),
    Stream(ByteStream),
}

impl BodyContent {
    pub async fn collect(self) -> Result<Bytes, Error> {
        match self {
            Self::Empty => Ok(Bytes::new()),
            Self::Bytes(bytes) => Ok(bytes),
            Self::Stream(mut stream) => {
                let mut collected = BytesMut::new();
                while let Some(chunk) = stream.next().await {
                    let chunk = chunk.map_err(|source| Error::ReadBody { source })?;
                    collected.extend_from_slice(&chunk);
                }
                Ok(collected.freeze())
            }
        }
    }
}

impl std::fmt::Debug for BodyContent {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => formatter.write_str("Empty"),
            Self::Bytes(bytes) => formatter
                .debug_tuple("Bytes")
                .field(&bytes.len())
                .finish(),
            Self::Stream(_) => formatter.write_str("Stream"),
        }
    }
}

/// Body of an incoming response.
///
/// A streaming body is read at most once. After [`Response::buffer`]
/// it is held in memory and can be read any number of times.
///
/// [`Response::buffer`]: crate::Response::buffer
pub enum ResponseBody {
    Buffered(Bytes),
    Streaming(ByteStream),
    Consumed,
}

impl ResponseBody {
    pub fn empty() -> Self {
        Self::Buffered(Bytes::new())
    }

    pub fn from_stream<S, E>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: Into<BoxError>,
    {
        Self::Streaming(box_stream(stream))
    }
}

impl std::fmt::Debug for ResponseBody {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buffered(bytes) => formatter
                .debug_tuple("Buffered")
                .field(&bytes.len())
                .finish(),
            Self::Streaming(_) => formatter.write_str("Streaming"),
            Self::Consumed => formatter.write_str("Consumed"),
        }
    }
}

impl From<Bytes> for ResponseBody {
    fn from(bytes: Bytes) -> Self {
        Self::Buffered(bytes)
    }
}

impl From<&'static str> for ResponseBody {
    fn from(text: &'static str) -> Self {
        Self::Buffered(Bytes::from_static(text.as_bytes()))
    }
}

impl From<String> for ResponseBody {
    fn from(text: String) -> Self {
        Self::Buffered(Bytes::from(text))
    }
}

pub(crate) enum CollectError {
    Read(BoxError),
    /// The limit was crossed; the chunks read so far are handed back so
    /// the caller can stitch the stream together again.
    TooLarge {
        read: Vec<Bytes>,
        actual_bytes: usize,
        rest: ByteStream,
    },
}

pub(crate) async fn collect_stream(
    mut stream: ByteStream,
    max_bytes: usize,
) -> Result<Bytes, CollectError> {
    let mut chunks = Vec::new();
    let mut total_len = 0_usize;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(CollectError::Read)?;
        total_len = total_len.saturating_add(chunk.len());
        chunks.push(chunk);
        if total_len > max_bytes {
            return Err(CollectError::TooLarge {
                read: chunks,
                actual_bytes: total_len,
                rest: stream,
            });
        }
    }

    if chunks.len() == 1 {
        return Ok(chunks.pop().unwrap_or_default());
    }
    let mut collected = BytesMut::with_capacity(total_len);
    for chunk in chunks {
        collected.extend_from_slice(&chunk);
    }
    Ok(collected.freeze())
}

pub(crate) fn restitch(read: Vec<Bytes>, rest: ByteStream) -> ByteStream {
    Box::pin(stream::iter(read.into_iter().map(Ok)).chain(rest))
}
