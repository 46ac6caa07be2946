//! # Passive
//!
//! Passive data channels: the `PASV` exchange, the endpoint the server advertises and the data
//! socket opened towards it.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::watch;

use crate::command::Command;
use crate::regex::PASV_PORT_RE;
use crate::{DataStream, FtpError, FtpResult, FtpSession, Response, Status};

/// Get the address of the data connection from the reply to `PASV`.
///
/// The reply text must contain `h1,h2,h3,h4,p1,p2`; the port is `p1 * 256 + p2`.
pub fn parse_passive_address(response: &Response) -> FtpResult<SocketAddr> {
    let caps = PASV_PORT_RE
        .captures(&response.text)
        .ok_or(FtpError::BadResponse)?;
    let mut octets = [0u8; 4];
    for (i, octet) in octets.iter_mut().enumerate() {
        *octet = caps[i + 1].parse().map_err(|_| FtpError::BadResponse)?;
    }
    let (msb, lsb) = (
        caps[5].parse::<u16>().map_err(|_| FtpError::BadResponse)?,
        caps[6].parse::<u16>().map_err(|_| FtpError::BadResponse)?,
    );
    let port = ((msb & 255) << 8) | (lsb & 255);
    let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::from(octets)), port);
    trace!("Passive address: {addr}");
    Ok(addr)
}

/// Keep the advertised port, but connect to the address of the control connection
fn replace_host(addr: SocketAddr, peer: Option<SocketAddr>) -> SocketAddr {
    match peer {
        Some(peer) => {
            let remote = SocketAddr::new(peer.ip(), addr.port());
            trace!("Replacing passive address {addr} with {remote}");
            remote
        }
        None => {
            warn!("no peer address to replace passive address {addr} with");
            addr
        }
    }
}

/// Marks the data channel of a session as open until dropped
#[derive(Debug)]
pub(crate) struct DataChannelGuard {
    open: Arc<AtomicBool>,
}

impl DataChannelGuard {
    pub fn acquire(open: &Arc<AtomicBool>) -> FtpResult<Self> {
        open.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| FtpError::DataConnectionAlreadyOpen)?;
        Ok(Self { open: open.clone() })
    }
}

impl Drop for DataChannelGuard {
    fn drop(&mut self) {
        self.open.store(false, Ordering::Release);
    }
}

/// An open data connection, not yet bound to a transfer command
#[derive(Debug)]
pub(crate) struct DataChannel {
    pub stream: DataStream,
    pub timed_out: watch::Receiver<bool>,
    pub guard: DataChannelGuard,
}

/// Enter passive mode and connect to the endpoint advertised by the server
pub(crate) async fn open_data_channel(session: &FtpSession) -> FtpResult<DataChannel> {
    let guard = DataChannelGuard::acquire(&session.data_channel_open)?;
    debug!("PASV command");
    let response = session.execute(Command::Pasv).await?;
    if response.status() != Status::PassiveMode {
        error!("unexpected reply to PASV: {response}");
        return Err(FtpError::ProtocolError(response));
    }
    let mut addr = parse_passive_address(&response)?;
    if session.config.nat_workaround {
        addr = replace_host(addr, session.peer_addr());
    }
    debug!("Opening data connection to {addr}");
    let stream = (session.config.passive_stream_builder)(addr).await?;
    let (stream, timed_out) = DataStream::new(stream, session.config.data_timeout);
    Ok(DataChannel {
        stream,
        timed_out,
        guard,
    })
}
