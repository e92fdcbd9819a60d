//! Bounded body cloning for the request/response observation layer.
//!
//! Both the synchronous [`CloneReader`] and the streaming [`ObservedBody`]
//! mirror the first `limit` bytes into a pooled buffer while passing every
//! byte through untouched. The pooled buffer goes back to the pool exactly
//! once, when the wrapper is dropped.

use std::io::{self, Read};
use std::pin::Pin;
use std::task::{Context as TaskContext, Poll};

use bytes::Bytes;
use http_body::{Body, Frame, SizeHint};
use pin_project::{pin_project, pinned_drop};

use vigil_utils::{buffer_pool, BufferPool, PoolGuard};

/// How much of a body to mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyLimit {
    /// Do not clone at all.
    Skip,
    /// Mirror at most this many bytes.
    Max(usize),
    /// Mirror the whole body.
    Unlimited,
}

impl BodyLimit {
    /// Room left given `mirrored` bytes already captured.
    fn room(&self, mirrored: usize) -> usize {
        match self {
            BodyLimit::Skip => 0,
            BodyLimit::Max(max) => max.saturating_sub(mirrored),
            BodyLimit::Unlimited => usize::MAX,
        }
    }

    pub fn is_skip(&self) -> bool {
        matches!(self, BodyLimit::Skip)
    }
}

/// Snapshot of a mirrored body handed to observers.
#[derive(Debug, Clone, Default)]
pub struct BodyRecord {
    /// The mirrored prefix.
    pub bytes: Bytes,
    /// Whether the body had more bytes than the limit allowed.
    pub truncated: bool,
    /// Total bytes that passed through, mirrored or not.
    pub size: u64,
}

impl BodyRecord {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

struct Mirror {
    buffer: PoolGuard<Vec<u8>>,
    limit: BodyLimit,
    truncated: bool,
    size: u64,
}

impl Mirror {
    fn new(limit: BodyLimit) -> Self {
        Self::with_pool(buffer_pool(), limit)
    }

    fn with_pool(pool: &BufferPool, limit: BodyLimit) -> Self {
        Self {
            buffer: pool.acquire(),
            limit,
            truncated: false,
            size: 0,
        }
    }

    fn observe(&mut self, chunk: &[u8]) {
        self.size += chunk.len() as u64;
        let room = self.limit.room(self.buffer.len());
        if chunk.len() <= room {
            self.buffer.extend_from_slice(chunk);
        } else {
            self.buffer.extend_from_slice(&chunk[..room]);
            self.truncated = true;
        }
    }

    /// Snapshot the captured prefix; the pooled buffer stays owned by the
    /// mirror and is recycled on drop.
    fn record(&self) -> BodyRecord {
        BodyRecord {
            bytes: Bytes::copy_from_slice(&self.buffer),
            truncated: self.truncated,
            size: self.size,
        }
    }
}

/// `Read` adapter that mirrors the first `limit` bytes of what it reads.
pub struct CloneReader<R> {
    inner: R,
    mirror: Mirror,
}

impl<R: Read> CloneReader<R> {
    pub fn new(inner: R, limit: BodyLimit) -> Self {
        Self {
            inner,
            mirror: Mirror::new(limit),
        }
    }

    /// Draw the mirror buffer from `pool` instead of the process pool.
    pub fn with_pool(inner: R, limit: BodyLimit, pool: &BufferPool) -> Self {
        Self {
            inner,
            mirror: Mirror::with_pool(pool, limit),
        }
    }

    /// The mirrored prefix, valid while the reader is alive.
    ///
    /// Named to stay clear of `Read::bytes`, which shadows inherent
    /// methods on any `Read` receiver.
    pub fn mirrored(&self) -> &[u8] {
        &self.mirror.buffer
    }

    /// Owned snapshot of the mirrored prefix.
    pub fn clone_bytes(&self) -> Vec<u8> {
        self.mirror.buffer.clone()
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.mirror.buffer).into_owned()
    }

    /// Mirrored length, not total body length.
    pub fn len(&self) -> usize {
        self.mirror.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mirror.buffer.is_empty()
    }

    pub fn truncated(&self) -> bool {
        self.mirror.truncated
    }

    pub fn record(&self) -> BodyRecord {
        self.mirror.record()
    }
}

impl<R: Read> Read for CloneReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n > 0 {
            self.mirror.observe(&buf[..n]);
        }
        Ok(n)
    }
}

type OnComplete = Box<dyn FnOnce(BodyRecord) + Send>;

struct Capture {
    mirror: Mirror,
    on_complete: OnComplete,
}

impl Capture {
    fn finish(self) {
        let record = self.mirror.record();
        (self.on_complete)(record);
    }
}

/// Streaming body wrapper: tees data frames into a [`BodyRecord`] and
/// fires `on_complete` exactly once, at end of stream or on drop.
#[pin_project(PinnedDrop)]
pub struct ObservedBody<B> {
    #[pin]
    inner: B,
    capture: Option<Capture>,
}

impl<B> ObservedBody<B> {
    pub fn new(
        inner: B,
        limit: BodyLimit,
        on_complete: impl FnOnce(BodyRecord) + Send + 'static,
    ) -> Self {
        Self {
            inner,
            capture: Some(Capture {
                mirror: Mirror::new(limit),
                on_complete: Box::new(on_complete),
            }),
        }
    }
}

impl<B> Body for ObservedBody<B>
where
    B: Body<Data = Bytes>,
{
    type Data = Bytes;
    type Error = B::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut TaskContext<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.project();
        match this.inner.poll_frame(cx) {
            Poll::Ready(Some(Ok(frame))) => {
                if let (Some(capture), Some(data)) = (this.capture.as_mut(), frame.data_ref()) {
                    capture.mirror.observe(data);
                }
                Poll::Ready(Some(Ok(frame)))
            }
            Poll::Ready(Some(Err(err))) => {
                if let Some(capture) = this.capture.take() {
                    capture.finish();
                }
                Poll::Ready(Some(Err(err)))
            }
            Poll::Ready(None) => {
                if let Some(capture) = this.capture.take() {
                    capture.finish();
                }
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

#[pinned_drop]
impl<B> PinnedDrop for ObservedBody<B> {
    fn drop(self: Pin<&mut Self>) {
        let this = self.project();
        if let Some(capture) = this.capture.take() {
            capture.finish();
        }
    }
}

/// Captured view of a server response.
#[derive(Debug, Clone)]
pub struct ResponseRecord {
    pub status: http::StatusCode,
    pub size: u64,
    pub body: Option<BodyRecord>,
}

impl Default for ResponseRecord {
    fn default() -> Self {
        Self {
            status: http::StatusCode::OK,
            size: 0,
            body: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::{BodyExt, Full};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_clone_reader_mirrors_within_limit() {
        let source: &[u8] = b"hello world";
        let mut reader = CloneReader::new(source, BodyLimit::Max(5));
        let mut sink = Vec::new();
        reader.read_to_end(&mut sink).unwrap();

        // Everything passes through; only the prefix is mirrored.
        assert_eq!(sink, b"hello world");
        assert_eq!(reader.mirrored(), b"hello");
        assert!(reader.truncated());
        assert_eq!(reader.record().size, 11);
    }

    #[test]
    fn test_clone_reader_unlimited() {
        let source: &[u8] = b"all of it";
        let mut reader = CloneReader::new(source, BodyLimit::Unlimited);
        let mut sink = Vec::new();
        reader.read_to_end(&mut sink).unwrap();
        assert_eq!(reader.text(), "all of it");
        assert!(!reader.truncated());
    }

    #[test]
    fn test_clone_reader_skip_mirrors_nothing() {
        let source: &[u8] = b"ignored";
        let mut reader = CloneReader::new(source, BodyLimit::Skip);
        let mut sink = Vec::new();
        reader.read_to_end(&mut sink).unwrap();
        assert_eq!(sink, b"ignored");
        assert!(reader.is_empty());
        assert_eq!(reader.record().size, 7);
    }

    #[test]
    fn test_clone_reader_returns_buffer_to_pool() {
        // A private pool keeps the count immune to concurrent tests that
        // borrow from the process pool.
        let pool: BufferPool = vigil_utils::ObjectPool::new(4, Vec::new);
        {
            let source: &[u8] = b"pooled";
            let mut reader = CloneReader::with_pool(source, BodyLimit::Unlimited, &pool);
            let mut sink = Vec::new();
            reader.read_to_end(&mut sink).unwrap();
            assert_eq!(reader.mirrored(), b"pooled");
            assert_eq!(pool.idle(), 0);
        }
        assert_eq!(pool.idle(), 1);
    }

    #[tokio::test]
    async fn test_observed_body_fires_once_at_end_of_stream() {
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_in = Arc::clone(&fired);

        let body = Full::new(Bytes::from_static(b"streamed payload"));
        let observed = ObservedBody::new(body, BodyLimit::Max(8), move |record| {
            assert_eq!(&record.bytes[..], b"streamed");
            assert!(record.truncated);
            assert_eq!(record.size, 16);
            fired_in.fetch_add(1, Ordering::SeqCst);
        });

        let collected = observed.collect().await.unwrap().to_bytes();
        assert_eq!(&collected[..], b"streamed payload");
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_observed_body_fires_on_drop() {
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_in = Arc::clone(&fired);

        let body = Full::new(Bytes::from_static(b"unread"));
        let observed = ObservedBody::new(body, BodyLimit::Unlimited, move |record| {
            // Never polled, so nothing was mirrored.
            assert!(record.is_empty());
            fired_in.fetch_add(1, Ordering::SeqCst);
        });
        drop(observed);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
