//! Streaming response body.
//!
//! A [`ResponseBody`] is what a successful load hands to its caller. It wraps
//! the transport's byte stream and, when the server declared a trustworthy
//! `Content-Length`, tracks how much of it is still outstanding.
//!
//! ## Notes
//! - A body with a declared length fails with [`io::ErrorKind::UnexpectedEof`]
//!   if the stream ends early. Surplus bytes are passed through unchecked.
//! - Dropping or [`close`](ResponseBody::close)-ing the body releases the
//!   underlying connection.
//! - Decrypted payloads are delivered through the same type via
//!   [`ResponseBody::from_bytes`].
use std::fmt;
use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};

/// A boxed, sendable stream.
pub type BoxStream<'a, T> = Pin<Box<dyn Stream<Item = T> + Send + 'a>>;

/// Raw body stream as produced by a transport.
pub type BodyStream = BoxStream<'static, io::Result<Bytes>>;

// Upper bound for the initial buffer allocation when draining a body.
const MAX_PREALLOCATE: u64 = 1024 * 1024;

pub struct ResponseBody {
    stream: Option<BodyStream>,
    content_length: Option<u64>,
    read: u64,
}

impl ResponseBody {
    /// Body of unknown length.
    pub fn new(stream: BodyStream) -> Self {
        Self { stream: Some(stream), content_length: None, read: 0 }
    }

    /// Body whose length is known up front and enforced while reading.
    pub fn with_content_length(stream: BodyStream, content_length: u64) -> Self {
        Self { stream: Some(stream), content_length: Some(content_length), read: 0 }
    }

    /// In-memory body, e.g. a decrypted payload.
    pub fn from_bytes(data: impl Into<Bytes>) -> Self {
        let data = data.into();
        let len = data.len() as u64;
        let stream = futures::stream::once(async move { Ok::<_, io::Error>(data) });
        Self::with_content_length(Box::pin(stream), len)
    }

    /// Declared length of the body, if any.
    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    /// Bytes still expected from the stream when the length is known.
    pub fn remaining(&self) -> Option<u64> {
        self.content_length.map(|len| len.saturating_sub(self.read))
    }

    /// Bytes handed out so far.
    pub fn bytes_read(&self) -> u64 {
        self.read
    }

    pub fn is_closed(&self) -> bool {
        self.stream.is_none()
    }

    /// Next chunk of the body, `None` once it is exhausted or closed.
    pub async fn chunk(&mut self) -> io::Result<Option<Bytes>> {
        self.next().await.transpose()
    }

    /// Drains the rest of the body into a single buffer.
    pub async fn bytes(mut self) -> io::Result<Bytes> {
        let capacity = self.remaining().unwrap_or(0).min(MAX_PREALLOCATE) as usize;
        let mut buf = BytesMut::with_capacity(capacity);
        while let Some(chunk) = self.next().await {
            buf.extend_from_slice(&chunk?);
        }
        Ok(buf.freeze())
    }

    /// Closes the stream and releases the connection behind it. Safe to call
    /// more than once.
    pub fn close(&mut self) {
        self.stream = None;
    }
}

impl Stream for ResponseBody {
    type Item = io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        let Some(stream) = this.stream.as_mut() else {
            return Poll::Ready(None);
        };

        match ready!(stream.as_mut().poll_next(cx)) {
            Some(Ok(chunk)) => {
                this.read += chunk.len() as u64;
                Poll::Ready(Some(Ok(chunk)))
            }
            Some(Err(e)) => {
                this.stream = None;
                Poll::Ready(Some(Err(e)))
            }
            None => {
                this.stream = None;
                match this.content_length {
                    Some(expected) if this.read < expected => {
                        let msg = format!(
                            "Failed to read all expected data, expected: {expected}, but read: {}",
                            this.read
                        );
                        Poll::Ready(Some(Err(io::Error::new(io::ErrorKind::UnexpectedEof, msg))))
                    }
                    _ => Poll::Ready(None),
                }
            }
        }
    }
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseBody")
            .field("content_length", &self.content_length)
            .field("read", &self.read)
            .field("closed", &self.is_closed())
            .finish()
    }
}
