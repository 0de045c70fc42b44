//! In-process byte pipe between the archive writer and the daemon request.
//!
//! A bounded channel of `io::Result<Bytes>` chunks. The write end is an
//! `AsyncWrite` that waits for a free slot before accepting bytes; the read
//! end is a `Stream` suitable for a streaming request body. Closing the
//! write end with an error delivers that error to the reader as the final
//! item, so a failed writer is never mistaken for a complete stream.

use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use bytes::Bytes;
use futures::Stream;
use tokio::io::AsyncWrite;
use tokio::sync::mpsc;
use tokio_util::sync::PollSender;

type Chunk = io::Result<Bytes>;

/// Create a pipe holding at most `capacity` unread chunks.
pub fn pipe(capacity: usize) -> (PipeWriter, PipeReader) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        PipeWriter {
            sender: PollSender::new(tx),
        },
        PipeReader { receiver: rx },
    )
}

/// Write end of a [`pipe`].
///
/// Dropping it ends the stream cleanly; use [`PipeWriter::close_with_error`]
/// to end it with the writer's result.
pub struct PipeWriter {
    sender: PollSender<Chunk>,
}

impl PipeWriter {
    /// Close the write end. An `Err` becomes the reader's terminal error.
    pub async fn close_with_error<E: std::fmt::Display>(self, result: Result<(), E>) {
        if let Err(e) = result {
            if let Some(tx) = self.sender.get_ref() {
                // Reader already gone: nobody left to tell.
                let _ = tx.send(Err(io::Error::other(e.to_string()))).await;
            }
        }
    }
}

impl AsyncWrite for PipeWriter {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        if buf.is_empty() {
            return Poll::Ready(Ok(0));
        }
        ready!(self.sender.poll_reserve(cx)).map_err(|_| broken_pipe())?;
        self.sender
            .send_item(Ok(Bytes::copy_from_slice(buf)))
            .map_err(|_| broken_pipe())?;
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

fn broken_pipe() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "pipe reader closed")
}

/// Read end of a [`pipe`].
pub struct PipeReader {
    receiver: mpsc::Receiver<Chunk>,
}

impl Stream for PipeReader {
    type Item = Chunk;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}
