//! # Data Stream
//!
//! This module exposes the data stream where bytes of a transfer must be written to/read from.
//! The stream fails with [`std::io::ErrorKind::TimedOut`] once it has been idle for longer than
//! the configured timeout.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use pin_project::pin_project;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf, Result};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::time::{sleep, Instant, Sleep};

/// Data Stream used for transfers: a passive connection with an idle timer
#[pin_project]
#[derive(Debug)]
pub struct DataStream {
    #[pin]
    stream: TcpStream,
    idle: Pin<Box<Sleep>>,
    timeout: Duration,
    timed_out: watch::Sender<bool>,
}

impl DataStream {
    /// Wrap `stream`; the returned receiver turns `true` when the stream times out
    pub(crate) fn new(stream: TcpStream, timeout: Duration) -> (Self, watch::Receiver<bool>) {
        let (timed_out, rx) = watch::channel(false);
        let stream = Self {
            stream,
            idle: Box::pin(sleep(timeout)),
            timeout,
            timed_out,
        };
        (stream, rx)
    }

    /// Returns a reference to the underlying TcpStream.
    pub fn get_ref(&self) -> &TcpStream {
        &self.stream
    }

    /// Whether the stream has been idle for too long
    pub fn is_timed_out(&self) -> bool {
        *self.timed_out.borrow()
    }
}

/// Reset the idle timer after some progress, or fail if the timer expired while waiting
fn watch_idle<T>(
    poll: Poll<Result<T>>,
    idle: &mut Pin<Box<Sleep>>,
    timeout: Duration,
    timed_out: &watch::Sender<bool>,
    cx: &mut Context<'_>,
) -> Poll<Result<T>> {
    if *timed_out.borrow() {
        return Poll::Ready(Err(std::io::ErrorKind::TimedOut.into()));
    }
    match poll {
        Poll::Ready(result) => {
            idle.as_mut().reset(Instant::now() + timeout);
            Poll::Ready(result)
        }
        Poll::Pending => match idle.as_mut().poll(cx) {
            Poll::Ready(()) => {
                error!("data connection idle for more than {timeout:?}");
                timed_out.send_replace(true);
                Poll::Ready(Err(std::io::ErrorKind::TimedOut.into()))
            }
            Poll::Pending => Poll::Pending,
        },
    }
}

// -- async

impl AsyncRead for DataStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<Result<()>> {
        let this = self.project();
        let poll = this.stream.poll_read(cx, buf);
        watch_idle(poll, this.idle, *this.timeout, this.timed_out, cx)
    }
}

impl AsyncWrite for DataStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<Result<usize>> {
        let this = self.project();
        let poll = this.stream.poll_write(cx, buf);
        watch_idle(poll, this.idle, *this.timeout, this.timed_out, cx)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<()>> {
        let this = self.project();
        let poll = this.stream.poll_flush(cx);
        watch_idle(poll, this.idle, *this.timeout, this.timed_out, cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<()>> {
        self.project().stream.poll_shutdown(cx)
    }
}
