#![crate_name = "pipeftp"]
#![crate_type = "lib"]

//! # pipeftp
//!
//! pipeftp is an async FTP client engine built on tokio.
//! It speaks the control-channel grammar of RFC 959, correlates the server replies with the
//! commands which have been issued, opens passive data connections for transfers and parses
//! the output of `LIST` into structured entries.
//!
//! - Commands are **pipelined**: every session handle can issue commands at any time, they are
//!   written one at a time and complete in the order they have been issued
//! - The session logs in by itself before the first command which needs it, and reconnects
//!   once if the control connection has been lost
//! - Transfers are streams: read from or write to the [`Transfer`], then `finish()` it
//! - Idle data connections time out
//! - Parsers for the **LIST** output, both POSIX and DOS flavoured
//!
//! ## Get started
//!
//! To get started, first add **pipeftp** to your dependencies:
//!
//! ```toml
//! pipeftp = "^0.1"
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use pipeftp::{FtpConfig, FtpSession};
//! use tokio::io::AsyncReadExt;
//!
//! # async fn run() -> pipeftp::FtpResult<()> {
//! let config = FtpConfig::new("ftp.example.com").credentials("deploy", "s3cr3t");
//! let session = FtpSession::connect(config).await?;
//! // login happens on demand
//! println!("working directory: {}", session.pwd().await?);
//! for file in session.ls(None).await? {
//!     println!("{} ({} bytes)", file.name(), file.size());
//! }
//! // download a file
//! let mut transfer = session.retr_as_stream("readme.txt").await?;
//! let mut readme = String::new();
//! transfer.read_to_string(&mut readme).await.ok();
//! transfer.finish().await?;
//! // disconnect from server
//! session.quit().await?;
//! # Ok(())
//! # }
//! ```
//!

#![doc(html_playground_url = "https://play.rust-lang.org")]

// -- common deps
#[macro_use]
extern crate lazy_regex;
#[macro_use]
extern crate log;

// -- private
pub(crate) mod command;
mod config;
mod data_stream;
mod framer;
mod pipeline;
mod regex;
mod session;
mod status;
#[cfg(test)]
mod test_server;
mod transfer;
mod transport;

// -- public
pub mod list;
pub mod passive;
pub mod types;

// -- export
pub use command::feat::parse_features;
pub use config::{FtpConfig, DEFAULT_DATA_TIMEOUT, DEFAULT_PORT};
pub use data_stream::DataStream;
pub use framer::ResponseFramer;
pub use pipeline::ExpectedMarks;
pub use session::FtpSession;
pub use status::Status;
pub use transfer::Transfer;
pub use transport::{ControlConnector, ControlStream, PassiveStreamBuilder, TcpConnector};
pub use types::{Features, FileType, FormatControl, FtpError, FtpResult, Response};

// -- test logging
#[cfg(test)]
pub fn log_init() {
    let _ = env_logger::builder().is_test(true).try_init();
}
