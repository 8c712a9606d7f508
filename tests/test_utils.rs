//! An in-memory duplex socket for driving a connection from the peer side.

use std::io;
use std::pin::Pin;
use std::sync::{Arc, RwLock};
use std::task::{Context, Poll, Waker};

use async_std::io::{Read, Write};
use async_std::prelude::*;

/// One end of an in-memory duplex stream.
///
/// Reads come from one shared cursor and writes go to another; the matching
/// end returned by [`TestIO::new`] holds the same cursors swapped. Cloning
/// hands out another handle to the same end, which is how the two tasks of a
/// connection share their socket.
#[derive(Clone, Debug)]
pub struct TestIO {
    read: Arc<CloseableCursor>,
    write: Arc<CloseableCursor>,
}

impl TestIO {
    /// Creates a connected `(client, server)` pair.
    pub fn new() -> (TestIO, TestIO) {
        let client_to_server = Arc::new(CloseableCursor::default());
        let server_to_client = Arc::new(CloseableCursor::default());

        (
            TestIO {
                read: server_to_client.clone(),
                write: client_to_server.clone(),
            },
            TestIO {
                read: client_to_server,
                write: server_to_client,
            },
        )
    }

    /// Shuts down this end's sending half, like a peer calling `shutdown`.
    ///
    /// The other end drains what was already written and then observes a
    /// zero-length read.
    pub fn close(&self) {
        self.write.close();
    }
}

#[derive(Debug, Default)]
struct Inner {
    data: Vec<u8>,
    cursor: usize,
    closed: bool,
    waker: Option<Waker>,
}

#[derive(Debug, Default)]
struct CloseableCursor(RwLock<Inner>);

impl CloseableCursor {
    fn close(&self) {
        let mut inner = self.0.write().unwrap();
        inner.closed = true;
        if let Some(waker) = inner.waker.take() {
            waker.wake();
        }
    }

    fn read_some(&self, cx: &mut Context<'_>, buf: &mut [u8]) -> Poll<io::Result<usize>> {
        let mut inner = self.0.write().unwrap();
        if inner.cursor < inner.data.len() {
            let amount = buf.len().min(inner.data.len() - inner.cursor);
            buf[..amount].copy_from_slice(&inner.data[inner.cursor..inner.cursor + amount]);
            inner.cursor += amount;
            Poll::Ready(Ok(amount))
        } else if inner.closed {
            Poll::Ready(Ok(0))
        } else {
            inner.waker = Some(cx.waker().clone());
            Poll::Pending
        }
    }

    fn write_some(&self, buf: &[u8]) -> Poll<io::Result<usize>> {
        let mut inner = self.0.write().unwrap();
        if inner.closed {
            return Poll::Ready(Ok(0));
        }
        inner.data.extend_from_slice(buf);
        if let Some(waker) = inner.waker.take() {
            waker.wake();
        }
        Poll::Ready(Ok(buf.len()))
    }
}

impl Read for TestIO {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut [u8],
    ) -> Poll<io::Result<usize>> {
        self.read.read_some(cx, buf)
    }
}

impl Write for TestIO {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.write.write_some(buf)
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.write.close();
        Poll::Ready(Ok(()))
    }
}

/// Reads one complete response off `io`, head and body.
///
/// Returns an empty string when the stream ends before a response starts.
pub async fn read_response(io: &mut TestIO) -> String {
    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        let read = io.read(&mut byte).await.unwrap();
        if read == 0 {
            return String::new();
        }
        head.push(byte[0]);
        if head.ends_with(b"\r\n\r\n") {
            break;
        }
    }

    let text = String::from_utf8(head).unwrap();
    let content_length = text
        .lines()
        .find_map(|line| line.strip_prefix("content-length: "))
        .map(|value| value.trim().parse::<usize>().unwrap())
        .unwrap_or(0);

    let mut body = vec![0u8; content_length];
    io.read_exact(&mut body).await.unwrap();
    text + std::str::from_utf8(&body).unwrap()
}
