use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// An error surfaced while reading a streaming body.
///
/// Kept as a cloneable, string-backed error (rather than the crate's usual
/// boxed error) because [`Body::tee`] must hand the same failure to two
/// independent consumers.
#[derive(Debug, Clone)]
pub struct StreamError(Arc<str>);

impl StreamError {
    /// Wrap any error as a `StreamError`, capturing its `Display` output.
    pub fn new(err: impl std::fmt::Display) -> Self {
        Self(err.to_string().into())
    }
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for StreamError {}

/// A single chunk of a streamed body.
pub type Chunk = Result<Bytes, StreamError>;

/// A boxed, `Send`, finite sequence of body chunks. At most one consumer may
/// drive this stream to completion unless it has been [`Body::tee`]'d.
pub type BodyStream = BoxStream<'static, Chunk>;

/// The body of a request or response.
///
/// `Full` covers the common case of a finite, already-buffered body (and is
/// cheap to tee via `Bytes::clone`); `Streaming` covers bodies whose bytes
/// arrive incrementally and must be tee'd with backpressure to stay memory
/// bounded.
pub enum Body {
    /// A body whose bytes are already fully in memory.
    Full(Bytes),
    /// A body delivered as a stream of chunks, consumable at most once.
    Streaming(BodyStream),
}

impl Body {
    /// An empty body.
    pub fn empty() -> Self {
        Body::Full(Bytes::new())
    }

    /// Wrap a stream of chunks as a streaming body.
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: futures::Stream<Item = Chunk> + Send + 'static,
    {
        Body::Streaming(Box::pin(stream))
    }

    /// Whether the body has no content (only knowable for `Full` bodies
    /// without driving the stream).
    pub fn is_empty_full(&self) -> bool {
        matches!(self, Body::Full(b) if b.is_empty())
    }

    /// Collect the body into a single contiguous buffer, driving any
    /// underlying stream to completion.
    pub async fn into_bytes(self) -> Result<Bytes, StreamError> {
        match self {
            Body::Full(bytes) => Ok(bytes),
            Body::Streaming(mut stream) => {
                let mut buf = Vec::new();
                while let Some(chunk) = stream.next().await {
                    buf.extend_from_slice(&chunk?);
                }
                Ok(Bytes::from(buf))
            }
        }
    }

    /// Turn this body into a boxed stream of chunks, regardless of which
    /// variant it started as.
    pub fn into_stream(self) -> BodyStream {
        match self {
            Body::Full(bytes) => {
                let chunk: Chunk = Ok(bytes);
                stream::once(async move { chunk }).boxed()
            }
            Body::Streaming(stream) => stream,
        }
    }

    /// Split this body into two independent, finite sequences of the same
    /// chunks.
    ///
    /// For a `Full` body this is a cheap `Bytes::clone`. For a `Streaming`
    /// body, a background task drains the original stream once and forwards
    /// each chunk to two bounded channels; a slow consumer applies
    /// backpressure to the producer (via the channel filling up) rather than
    /// letting the fast consumer force unbounded buffering.
    pub fn tee(self) -> (Body, Body) {
        match self {
            Body::Full(bytes) => (Body::Full(bytes.clone()), Body::Full(bytes)),
            Body::Streaming(stream) => {
                const CHANNEL_CAPACITY: usize = 16;
                let (tx_a, rx_a) = mpsc::channel::<Chunk>(CHANNEL_CAPACITY);
                let (tx_b, rx_b) = mpsc::channel::<Chunk>(CHANNEL_CAPACITY);
                tokio::spawn(forward_tee(stream, tx_a, tx_b));
                (
                    Body::Streaming(Box::pin(ReceiverStream::new(rx_a))),
                    Body::Streaming(Box::pin(ReceiverStream::new(rx_b))),
                )
            }
        }
    }
}

async fn forward_tee(
    mut stream: BodyStream,
    tx_a: mpsc::Sender<Chunk>,
    tx_b: mpsc::Sender<Chunk>,
) {
    while let Some(chunk) = stream.next().await {
        match chunk {
            Ok(bytes) => {
                // Either receiver dropping just means that consumer stopped
                // listening; the other branch must still see every chunk.
                let _ = tx_a.send(Ok(bytes.clone())).await;
                let _ = tx_b.send(Ok(bytes)).await;
            }
            Err(e) => {
                let _ = tx_a.send(Err(e.clone())).await;
                let _ = tx_b.send(Err(e)).await;
                return;
            }
        }
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::Full(bytes) => f.debug_tuple("Full").field(&bytes.len()).finish(),
            Body::Streaming(_) => f.debug_tuple("Streaming").finish(),
        }
    }
}

impl From<Bytes> for Body {
    fn from(value: Bytes) -> Self {
        Body::Full(value)
    }
}

impl From<Vec<u8>> for Body {
    fn from(value: Vec<u8>) -> Self {
        Body::Full(value.into())
    }
}

impl From<&'static str> for Body {
    fn from(value: &'static str) -> Self {
        Body::Full(Bytes::from_static(value.as_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn full_body_tee_preserves_bytes() {
        let body = Body::from(Bytes::from_static(b"hello"));
        let (a, b) = body.tee();
        assert_eq!(a.into_bytes().await.unwrap(), Bytes::from_static(b"hello"));
        assert_eq!(b.into_bytes().await.unwrap(), Bytes::from_static(b"hello"));
    }

    #[tokio::test]
    async fn streaming_body_tee_preserves_chunk_boundaries() {
        let chunks: Vec<Chunk> =
            vec![Ok(Bytes::from_static(b"ab")), Ok(Bytes::from_static(b"cd"))];
        let body = Body::from_stream(stream::iter(chunks));
        let (a, b) = body.tee();

        let mut a_stream = a.into_stream();
        let mut b_stream = b.into_stream();
        assert_eq!(a_stream.next().await.unwrap().unwrap(), Bytes::from_static(b"ab"));
        assert_eq!(a_stream.next().await.unwrap().unwrap(), Bytes::from_static(b"cd"));
        assert!(a_stream.next().await.is_none());

        assert_eq!(b_stream.next().await.unwrap().unwrap(), Bytes::from_static(b"ab"));
        assert_eq!(b_stream.next().await.unwrap().unwrap(), Bytes::from_static(b"cd"));
        assert!(b_stream.next().await.is_none());
    }

    #[tokio::test]
    async fn one_slow_consumer_does_not_starve_the_other() {
        let chunks: Vec<Chunk> = (0..100)
            .map(|i| Ok(Bytes::from(vec![i as u8])))
            .collect();
        let body = Body::from_stream(stream::iter(chunks));
        let (fast, slow) = body.tee();

        let fast_bytes = fast.into_bytes().await.unwrap();
        assert_eq!(fast_bytes.len(), 100);

        // Draining the slow side after the fast side has fully completed
        // proves the tee buffered for it rather than dropping chunks.
        let slow_bytes = slow.into_bytes().await.unwrap();
        assert_eq!(slow_bytes.len(), 100);
    }
}
