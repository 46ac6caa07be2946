//! # Transport
//!
//! How the sockets of a session are opened: the control connection through a [`ControlConnector`],
//! the passive data connections through a [`PassiveStreamBuilder`].

use std::fmt::Debug;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

use crate::{FtpError, FtpResult};

/// Opens the data connection to the endpoint advertised by `PASV`
pub type PassiveStreamBuilder = dyn Fn(SocketAddr) -> Pin<Box<dyn Future<Output = FtpResult<TcpStream>> + Send + Sync>>
    + Send
    + Sync;

/// The byte stream of a control connection
pub trait ControlStream: AsyncRead + AsyncWrite + Unpin + Send {
    /// Address of the server, if the stream has one.
    /// Used to replace the address advertised by `PASV` when the NAT workaround is on.
    fn peer_addr(&self) -> Option<SocketAddr>;
}

impl ControlStream for TcpStream {
    fn peer_addr(&self) -> Option<SocketAddr> {
        TcpStream::peer_addr(self).ok()
    }
}

/// Opens the control connection of a session.
///
/// The connector is called once when the session is created, then each time the session has to
/// reconnect after losing the connection.
#[async_trait]
pub trait ControlConnector: Debug + Send + Sync {
    async fn connect(&self) -> FtpResult<Box<dyn ControlStream>>;
}

/// Plain TCP connector
#[derive(Debug, Clone)]
pub struct TcpConnector {
    host: String,
    port: u16,
}

impl TcpConnector {
    pub fn new(host: impl ToString, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
        }
    }
}

#[async_trait]
impl ControlConnector for TcpConnector {
    async fn connect(&self) -> FtpResult<Box<dyn ControlStream>> {
        debug!("connecting to {}:{}", self.host, self.port);
        let stream = TcpStream::connect((self.host.as_str(), self.port))
            .await
            .map_err(FtpError::ConnectionError)?;
        debug!("connected to {}:{}", self.host, self.port);
        Ok(Box::new(stream))
    }
}

/// Builds the data streams with [`TcpStream::connect`]
pub(crate) fn default_passive_stream_builder() -> Box<PassiveStreamBuilder> {
    Box::new(|address| {
        Box::pin(async move {
            TcpStream::connect(address)
                .await
                .map_err(FtpError::ConnectionError)
        })
    })
}
