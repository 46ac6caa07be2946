//! # Transfer
//!
//! The handle of a transfer in progress: the data connection, bound to the command which
//! triggered it on the control connection.

use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::sync::{oneshot, watch};

use crate::passive::{DataChannel, DataChannelGuard};
use crate::{DataStream, FtpError, FtpResult, Response};

#[derive(Debug)]
enum Completion {
    /// waiting for the final reply to the transfer command
    Pending(oneshot::Receiver<FtpResult<Response>>),
    /// the command was completed before the transfer started
    Completed(Response),
}

/// A transfer in progress.
///
/// Bytes are read from (`RETR`, `LIST`, ...) or written to (`STOR`, `APPE`) the transfer, which
/// must then be closed with [`Transfer::finish`] to get the outcome of the command.
#[derive(Debug)]
pub struct Transfer {
    stream: DataStream,
    timed_out: watch::Receiver<bool>,
    completion: Completion,
    guard: DataChannelGuard,
}

impl Transfer {
    pub(crate) fn started(channel: DataChannel, done: oneshot::Receiver<FtpResult<Response>>) -> Self {
        Self {
            stream: channel.stream,
            timed_out: channel.timed_out,
            completion: Completion::Pending(done),
            guard: channel.guard,
        }
    }

    pub(crate) fn completed(channel: DataChannel, response: Response) -> Self {
        Self {
            stream: channel.stream,
            timed_out: channel.timed_out,
            completion: Completion::Completed(response),
            guard: channel.guard,
        }
    }

    /// The data connection
    pub fn get_ref(&self) -> &DataStream {
        &self.stream
    }

    /// Close the data connection and wait for the outcome of the transfer command.
    ///
    /// Returns [`FtpError::Timeout`] if the data connection has been idle for too long,
    /// otherwise the result of the transfer command.
    pub async fn finish(self) -> FtpResult<Response> {
        let Self {
            mut stream,
            timed_out,
            completion,
            guard,
        } = self;
        debug!("Finalizing transfer");
        if let Err(err) = stream.shutdown().await {
            debug!("failed to shutdown data connection: {err}");
        }
        // the server sends the final reply only once the data connection is closed
        drop(stream);
        trace!("dropped data connection");
        let timed_out = *timed_out.borrow();
        let result = match (timed_out, completion) {
            (true, _) => Err(FtpError::Timeout),
            (false, Completion::Completed(response)) => Ok(response),
            (false, Completion::Pending(done)) => {
                done.await.unwrap_or(Err(FtpError::SessionClosed))
            }
        };
        drop(guard);
        result
    }
}

impl AsyncRead for Transfer {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.get_mut().stream).poll_read(cx, buf)
    }
}

impl AsyncWrite for Transfer {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        Pin::new(&mut self.get_mut().stream).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.get_mut().stream).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.get_mut().stream).poll_shutdown(cx)
    }
}
