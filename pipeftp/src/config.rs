//! # Config
//!
//! Parameters of an [`crate::FtpSession`]

use std::fmt;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;

use crate::transport::{
    default_passive_stream_builder, ControlConnector, PassiveStreamBuilder, TcpConnector,
};
use crate::FtpResult;

/// Default port of the control connection
pub const DEFAULT_PORT: u16 = 21;
/// Default idle timeout of the data connections
pub const DEFAULT_DATA_TIMEOUT: Duration = Duration::from_secs(600);

/// Session configuration, built with chained setters:
///
/// ```rust
/// use std::time::Duration;
/// use pipeftp::FtpConfig;
///
/// let config = FtpConfig::new("ftp.example.com")
///     .credentials("deploy", "s3cr3t")
///     .data_timeout(Duration::from_secs(30))
///     .passive_nat_workaround(true);
/// ```
#[derive(Clone)]
pub struct FtpConfig {
    pub(crate) host: String,
    pub(crate) port: u16,
    pub(crate) user: String,
    pub(crate) password: String,
    pub(crate) data_timeout: Duration,
    pub(crate) use_list: bool,
    pub(crate) nat_workaround: bool,
    pub(crate) passive_stream_builder: Arc<PassiveStreamBuilder>,
    pub(crate) connector: Option<Arc<dyn ControlConnector>>,
}

impl FtpConfig {
    /// Configuration for `host`, with anonymous login on the default port
    pub fn new(host: impl ToString) -> Self {
        Self {
            host: host.to_string(),
            port: DEFAULT_PORT,
            user: String::from("anonymous"),
            password: String::from("@anonymous"),
            data_timeout: DEFAULT_DATA_TIMEOUT,
            use_list: false,
            nat_workaround: false,
            passive_stream_builder: Arc::from(default_passive_stream_builder()),
            connector: None,
        }
    }

    /// Set the port of the control connection
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the credentials sent when the session logs in
    pub fn credentials(mut self, user: impl ToString, password: impl ToString) -> Self {
        self.user = user.to_string();
        self.password = password.to_string();
        self
    }

    /// Set how long a data connection may stay idle before the transfer fails
    pub fn data_timeout(mut self, timeout: Duration) -> Self {
        self.data_timeout = timeout;
        self
    }

    /// List directories with `LIST` over a data connection instead of trying `STAT` first
    pub fn use_list(mut self, use_list: bool) -> Self {
        self.use_list = use_list;
        self
    }

    /// Connect the data connections to the address of the control connection,
    /// keeping only the port advertised by `PASV`
    pub fn passive_nat_workaround(mut self, nat_workaround: bool) -> Self {
        self.nat_workaround = nat_workaround;
        self
    }

    /// Open the data connections with `stream_builder` instead of a plain [`TcpStream::connect`],
    /// e.g. to bind a local address or set socket options
    pub fn passive_stream_builder<F>(mut self, stream_builder: F) -> Self
    where
        F: Fn(SocketAddr) -> Pin<Box<dyn Future<Output = FtpResult<TcpStream>> + Send + Sync>>
            + Send
            + Sync
            + 'static,
    {
        self.passive_stream_builder = Arc::new(stream_builder);
        self
    }

    /// Set a custom [`ControlConnector`]; host and port are then ignored
    pub fn connector(mut self, connector: impl ControlConnector + 'static) -> Self {
        self.connector = Some(Arc::new(connector));
        self
    }

    pub(crate) fn control_connector(&self) -> Arc<dyn ControlConnector> {
        if let Some(connector) = &self.connector {
            return connector.clone();
        }
        Arc::new(TcpConnector::new(&self.host, self.port))
    }
}

impl fmt::Debug for FtpConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FtpConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"******")
            .field("data_timeout", &self.data_timeout)
            .field("use_list", &self.use_list)
            .field("nat_workaround", &self.nat_workaround)
            .field("connector", &self.connector)
            .finish_non_exhaustive()
    }
}
