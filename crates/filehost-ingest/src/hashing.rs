//! Streaming SHA-256 over an upload body.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use sha2::{Digest, Sha256};
use tokio::io::{AsyncRead, ReadBuf};

/// Wraps the client's byte stream, hashing and counting bytes as the storage
/// backend pulls them.
///
/// Errors from the client stream and the size cap both surface to the writer as
/// I/O errors; [`source_error`](Self::source_error) and
/// [`limit_exceeded`](Self::limit_exceeded) tell them apart afterwards.
pub struct HashingReader<R> {
    inner: R,
    hasher: Sha256,
    bytes_read: u64,
    limit: Option<u64>,
    limit_exceeded: bool,
    source_error: Option<io::Error>,
}

impl<R> HashingReader<R> {
    pub fn new(inner: R, limit: Option<u64>) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
            bytes_read: 0,
            limit,
            limit_exceeded: false,
            source_error: None,
        }
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    pub fn limit_exceeded(&self) -> bool {
        self.limit_exceeded
    }

    /// The client stream's own error, if reading from it failed.
    pub fn take_source_error(&mut self) -> Option<io::Error> {
        self.source_error.take()
    }

    pub fn source_error(&self) -> Option<&io::Error> {
        self.source_error.as_ref()
    }

    /// Lower-case hex digest of everything read so far.
    pub fn finalize_hex(self) -> String {
        hex::encode(self.hasher.finalize())
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for HashingReader<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();

        match Pin::new(&mut this.inner).poll_read(cx, buf) {
            Poll::Ready(Ok(())) => {
                let read = (buf.filled().len() - before) as u64;
                this.bytes_read += read;

                if let Some(limit) = this.limit {
                    if this.bytes_read > limit {
                        // A failed read must leave no new bytes in `buf`.
                        buf.set_filled(before);
                        this.limit_exceeded = true;
                        return Poll::Ready(Err(io::Error::new(
                            io::ErrorKind::InvalidData,
                            format!("upload exceeds {} bytes", limit),
                        )));
                    }
                }

                this.hasher.update(&buf.filled()[before..]);
                Poll::Ready(Ok(()))
            }
            Poll::Ready(Err(e)) => {
                let copy = io::Error::new(e.kind(), e.to_string());
                this.source_error = Some(e);
                Poll::Ready(Err(copy))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}
