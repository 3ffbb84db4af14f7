//! Non-consuming body inspection.
//!
//! Request bodies are inspected through a clone, so the body sent on the wire is never
//! touched. Response bodies are drained into memory once and replaced by an
//! [`InspectedBody`] that replays exactly what the live stream produced.

use bytes::{Bytes, BytesMut};
use http::HeaderMap;
use http_body::{Body, Frame, SizeHint};
use http_body_util::BodyExt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tracing::debug;

/// Reads a clone of `body` to completion into a scratch buffer.
///
/// The original body is left as it was; only the clone is consumed. The returned
/// future owns the clone and does not borrow `body`.
///
/// # Examples
///
/// ```rust
/// use bytes::Bytes;
/// use http_body_util::Full;
/// use traffic_tap::body_wrapper::copy_body;
///
/// # async fn example() {
/// let body = Full::new(Bytes::from("hello"));
/// let copy = copy_body(&body).await.unwrap();
/// assert_eq!(copy, "hello");
/// # }
/// ```
pub fn copy_body<B>(body: &B) -> impl Future<Output = Result<Bytes, B::Error>>
where
    B: Body<Data = Bytes> + Clone,
{
    let scratch = body.clone();
    async move {
        let collected = scratch.collect().await?;
        Ok(collected.to_bytes())
    }
}

/// Drains `body` into memory and returns a body backed by the buffered bytes.
///
/// If the stream fails partway, the bytes received before the failure are kept and
/// the error is replayed after them, so the consumer sees the same sequence it would
/// have seen from the live stream.
pub async fn buffer_body<B>(body: B) -> InspectedBody<B>
where
    B: Body<Data = Bytes>,
{
    let mut body = Box::pin(body);
    let mut data = BytesMut::new();
    let mut trailers = None;
    let mut error = None;

    while let Some(frame) = body.frame().await {
        match frame {
            Ok(frame) => match frame.into_data() {
                Ok(chunk) => data.extend_from_slice(&chunk),
                Err(frame) => {
                    if let Ok(map) = frame.into_trailers() {
                        trailers = Some(map);
                    }
                }
            },
            Err(e) => {
                debug!(buffered = data.len(), "body stream failed while buffering");
                error = Some(Box::new(e));
                break;
            }
        }
    }

    InspectedBody {
        kind: Kind::Buffered {
            data: data.freeze(),
            data_sent: false,
            trailers,
            error,
        },
    }
}

/// A body that is either the live stream or an in-memory replay of it.
///
/// Consumers cannot tell the two apart: both yield the same data frames, trailers and
/// terminal error.
pub struct InspectedBody<B: Body> {
    kind: Kind<B>,
}

enum Kind<B: Body> {
    Live(Pin<Box<B>>),
    Buffered {
        data: Bytes,
        data_sent: bool,
        trailers: Option<HeaderMap>,
        error: Option<Box<B::Error>>,
    },
}

impl<B: Body> InspectedBody<B> {
    /// Wraps a body that was not inspected.
    pub fn passthrough(body: B) -> Self {
        Self {
            kind: Kind::Live(Box::pin(body)),
        }
    }

    /// Returns the buffered bytes, if this body was buffered.
    ///
    /// Calling this any number of times, before or after the body is read, returns the
    /// same bytes.
    pub fn peek(&self) -> Option<Bytes> {
        match &self.kind {
            Kind::Live(_) => None,
            Kind::Buffered { data, .. } => Some(data.clone()),
        }
    }

    /// Returns true if the live stream failed while it was being buffered.
    pub fn is_truncated(&self) -> bool {
        matches!(&self.kind, Kind::Buffered { error: Some(_), .. })
    }
}

impl<B> Body for InspectedBody<B>
where
    B: Body<Data = Bytes>,
{
    type Data = Bytes;
    type Error = B::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        match &mut self.get_mut().kind {
            Kind::Live(inner) => inner.as_mut().poll_frame(cx),
            Kind::Buffered {
                data,
                data_sent,
                trailers,
                error,
            } => {
                if !*data_sent {
                    *data_sent = true;
                    if !data.is_empty() {
                        return Poll::Ready(Some(Ok(Frame::data(data.clone()))));
                    }
                }
                if let Some(e) = error.take() {
                    return Poll::Ready(Some(Err(*e)));
                }
                Poll::Ready(trailers.take().map(|t| Ok(Frame::trailers(t))))
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        match &self.kind {
            Kind::Live(inner) => inner.is_end_stream(),
            Kind::Buffered {
                data,
                data_sent,
                trailers,
                error,
            } => (*data_sent || data.is_empty()) && trailers.is_none() && error.is_none(),
        }
    }

    fn size_hint(&self) -> SizeHint {
        match &self.kind {
            Kind::Live(inner) => inner.size_hint(),
            Kind::Buffered {
                data, data_sent, ..
            } => {
                let remaining = if *data_sent { 0 } else { data.len() as u64 };
                SizeHint::with_exact(remaining)
            }
        }
    }
}

impl<B: Body> std::fmt::Debug for InspectedBody<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            Kind::Live(_) => f.debug_struct("InspectedBody").field("live", &true).finish(),
            Kind::Buffered { data, .. } => f
                .debug_struct("InspectedBody")
                .field("buffered_len", &data.len())
                .finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use http_body_util::{Full, StreamBody};
    use std::io;

    type ChunkResult = Result<Frame<Bytes>, io::Error>;

    fn chunked(chunks: Vec<ChunkResult>) -> StreamBody<stream::Iter<std::vec::IntoIter<ChunkResult>>> {
        StreamBody::new(stream::iter(chunks))
    }

    #[tokio::test]
    async fn test_copy_leaves_original_readable() {
        let body = Full::new(Bytes::from("Hello, World!"));

        let copy = copy_body(&body).await.unwrap();
        let original = body.collect().await.unwrap().to_bytes();

        assert_eq!(copy, "Hello, World!");
        assert_eq!(original, "Hello, World!");
    }

    #[tokio::test]
    async fn test_buffered_body_replays_all_chunks() {
        let body = chunked(vec![
            Ok(Frame::data(Bytes::from("chunk1"))),
            Ok(Frame::data(Bytes::from("chunk2"))),
            Ok(Frame::data(Bytes::from("chunk3"))),
        ]);

        let inspected = buffer_body(body).await;
        assert_eq!(inspected.peek().unwrap(), "chunk1chunk2chunk3");

        let consumed = inspected.collect().await.unwrap().to_bytes();
        assert_eq!(consumed, "chunk1chunk2chunk3");
    }

    #[tokio::test]
    async fn test_peek_is_idempotent() {
        let mut inspected = buffer_body(Full::new(Bytes::from("x".repeat(100)))).await;

        let first = inspected.peek().unwrap();
        let second = inspected.peek().unwrap();
        assert_eq!(first, second);

        // Still the same after the consumer has read the body
        let frame = inspected.frame().await.unwrap().unwrap();
        assert_eq!(frame.into_data().unwrap(), first);
        assert_eq!(inspected.peek().unwrap(), first);
        assert!(inspected.frame().await.is_none());
    }

    #[tokio::test]
    async fn test_trailers_are_replayed() {
        let mut trailers = HeaderMap::new();
        trailers.insert("x-checksum", "abc".parse().unwrap());

        let body = chunked(vec![
            Ok(Frame::data(Bytes::from("data"))),
            Ok(Frame::trailers(trailers.clone())),
        ]);

        let collected = buffer_body(body).await.collect().await.unwrap();
        assert_eq!(collected.trailers(), Some(&trailers));
        assert_eq!(collected.to_bytes(), "data");
    }

    #[tokio::test]
    async fn test_stream_error_is_replayed_after_data() {
        let body = chunked(vec![
            Ok(Frame::data(Bytes::from("partial"))),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset by peer")),
        ]);

        let mut inspected = buffer_body(body).await;
        assert!(inspected.is_truncated());
        assert_eq!(inspected.peek().unwrap(), "partial");

        let first = inspected.frame().await.unwrap().unwrap();
        assert_eq!(first.into_data().unwrap(), "partial");

        let err = inspected.frame().await.unwrap().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);
        assert!(inspected.frame().await.is_none());
    }

    #[tokio::test]
    async fn test_empty_body_ends_immediately() {
        let inspected = buffer_body(Full::new(Bytes::new())).await;
        assert!(inspected.is_end_stream());
        assert_eq!(inspected.size_hint().exact(), Some(0));
    }

    #[tokio::test]
    async fn test_passthrough_is_not_buffered() {
        let inspected = InspectedBody::passthrough(Full::new(Bytes::from("live")));
        assert!(inspected.peek().is_none());
        assert_eq!(inspected.collect().await.unwrap().to_bytes(), "live");
    }
}
