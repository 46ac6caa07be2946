//! # Test server
//!
//! A scripted FTP server, driven line by line by the tests

use std::collections::VecDeque;
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::Mutex;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, DuplexStream, ReadHalf,
    WriteHalf,
};
use tokio::net::{TcpListener, TcpStream};

use crate::transport::{ControlConnector, ControlStream};
use crate::{FtpConfig, FtpError, FtpResult};

/// The server side of a control connection
pub struct ScriptedPeer<S> {
    reader: BufReader<ReadHalf<S>>,
    writer: WriteHalf<S>,
}

impl<S> ScriptedPeer<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            reader: BufReader::new(reader),
            writer,
        }
    }

    /// Read the next command line, `None` once the client has closed the connection
    pub async fn recv(&mut self) -> Option<String> {
        let mut line = String::new();
        match self.reader.read_line(&mut line).await {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(line.trim_end_matches("\r\n").to_string()),
        }
    }

    /// Read the next command line, which must be `expected`
    pub async fn expect(&mut self, expected: &str) {
        assert_eq!(self.recv().await.as_deref(), Some(expected));
    }

    /// Write a reply; `text` may contain several lines separated by `\r\n`
    pub async fn reply(&mut self, text: &str) {
        self.writer
            .write_all(format!("{text}\r\n").as_bytes())
            .await
            .unwrap();
        self.writer.flush().await.unwrap();
    }

    /// Play the login sequence spliced by the session with the default credentials
    pub async fn login(&mut self) {
        self.expect("FEAT").await;
        self.reply("211 No features").await;
        self.expect("USER anonymous").await;
        self.reply("331 Password required").await;
        self.expect("PASS @anonymous").await;
        self.reply("230 Logged in").await;
    }
}

/// A TCP server bound on a random local port
pub struct TestServer {
    listener: TcpListener,
}

impl TestServer {
    pub async fn bind() -> Self {
        Self {
            listener: TcpListener::bind("127.0.0.1:0").await.unwrap(),
        }
    }

    /// A session configuration pointing to this server
    pub fn config(&self) -> FtpConfig {
        let port = self.listener.local_addr().unwrap().port();
        FtpConfig::new("127.0.0.1").port(port)
    }

    /// Accept the next control connection
    pub async fn accept(&self) -> ScriptedPeer<TcpStream> {
        let (stream, _) = self.listener.accept().await.unwrap();
        ScriptedPeer::new(stream)
    }

    /// Bind a data listener; returns it with the `227` reply advertising it
    pub async fn passive() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let reply = format!(
            "227 Entering Passive Mode (127,0,0,1,{},{})",
            port >> 8,
            port & 255
        );
        (listener, reply)
    }
}

impl ControlStream for DuplexStream {
    fn peer_addr(&self) -> Option<SocketAddr> {
        None
    }
}

/// A connector handing out prepared streams, then refusing connections
#[derive(Default)]
pub struct ScriptedConnector {
    streams: Mutex<VecDeque<Box<dyn ControlStream>>>,
}

impl ScriptedConnector {
    /// A connector for `n` connections, with the server side of each of them
    pub fn duplex(n: usize) -> (Self, Vec<ScriptedPeer<DuplexStream>>) {
        let connector = Self::default();
        let mut peers = Vec::with_capacity(n);
        for _ in 0..n {
            let (client, server) = tokio::io::duplex(64 * 1024);
            connector.push_back(Box::new(client));
            peers.push(ScriptedPeer::new(server));
        }
        (connector, peers)
    }

    pub fn push_front(&self, stream: Box<dyn ControlStream>) {
        self.streams.lock().unwrap().push_front(stream);
    }

    pub fn push_back(&self, stream: Box<dyn ControlStream>) {
        self.streams.lock().unwrap().push_back(stream);
    }
}

impl fmt::Debug for ScriptedConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptedConnector")
            .field("streams", &self.streams.lock().unwrap().len())
            .finish()
    }
}

#[async_trait]
impl ControlConnector for ScriptedConnector {
    async fn connect(&self) -> FtpResult<Box<dyn ControlStream>> {
        let stream = self.streams.lock().unwrap().pop_front();
        stream.ok_or_else(|| {
            FtpError::ConnectionError(io::Error::from(io::ErrorKind::ConnectionRefused))
        })
    }
}
