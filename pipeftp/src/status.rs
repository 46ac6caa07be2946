//! # Status
//!
//! Reply codes the engine knows by name. Any other code is [`Status::Unknown`], which doesn't
//! prevent it from being correlated like any other reply.

use thiserror::Error;

/// Reply codes which announce that a data transfer is starting.
///
/// These are "marks": intermediate replies which precede the final status of a transfer command.
pub const TRANSFER_MARKS: [u32; 2] = [125, 150];

/// Ftp reply status
#[derive(Debug, Copy, Clone, Error, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u32)]
pub enum Status {
    // marks
    #[error("data connection already open; transfer starting")]
    AlreadyOpen = 125,
    #[error("about to open data connection")]
    AboutToSend = 150,
    // completion
    #[error("command okay")]
    CommandOk = 200,
    #[error("command superfluous at this site")]
    CommandNotImplemented = 202,
    #[error("system status")]
    System = 211,
    #[error("file status")]
    File = 213,
    #[error("system type")]
    Name = 215,
    #[error("service ready")]
    Ready = 220,
    #[error("closing control connection")]
    Closing = 221,
    #[error("transfer complete, closing data connection")]
    ClosingDataConnection = 226,
    #[error("entering passive mode")]
    PassiveMode = 227,
    #[error("logged in")]
    LoggedIn = 230,
    #[error("file action okay")]
    RequestedFileActionOk = 250,
    #[error("pathname created")]
    PathCreated = 257,
    // intermediate
    #[error("password required")]
    NeedPassword = 331,
    #[error("file action pending")]
    RequestFilePending = 350,
    // negative
    #[error("transfer aborted")]
    TransferAborted = 426,
    #[error("command unrecognized")]
    BadCommand = 500,
    #[error("command not implemented")]
    NotImplemented = 502,
    #[error("not logged in")]
    NotLoggedIn = 530,
    #[error("file unavailable")]
    FileUnavailable = 550,
    #[error("unknown reply code")]
    Unknown = 0,
}

impl Status {
    /// Numeric reply code; 0 for [`Status::Unknown`]
    pub fn code(&self) -> u32 {
        *self as u32
    }

    /// Returns whether this status announces the start of a data transfer
    pub fn is_mark(&self) -> bool {
        TRANSFER_MARKS.contains(&self.code())
    }

    /// Returns whether the server completed the login with this status
    pub fn is_logged_in(&self) -> bool {
        matches!(self, Self::LoggedIn | Self::CommandNotImplemented)
    }
}

impl From<u32> for Status {
    fn from(value: u32) -> Self {
        match value {
            125 => Self::AlreadyOpen,
            150 => Self::AboutToSend,
            200 => Self::CommandOk,
            202 => Self::CommandNotImplemented,
            211 => Self::System,
            213 => Self::File,
            215 => Self::Name,
            220 => Self::Ready,
            221 => Self::Closing,
            226 => Self::ClosingDataConnection,
            227 => Self::PassiveMode,
            230 => Self::LoggedIn,
            250 => Self::RequestedFileActionOk,
            257 => Self::PathCreated,
            331 => Self::NeedPassword,
            350 => Self::RequestFilePending,
            426 => Self::TransferAborted,
            500 => Self::BadCommand,
            502 => Self::NotImplemented,
            530 => Self::NotLoggedIn,
            550 => Self::FileUnavailable,
            _ => Self::Unknown,
        }
    }
}
