//! # Types
//!
//! Errors, responses and the set of valid values for FTP commands

use std::collections::HashMap;
use std::fmt;

use thiserror::Error;

use super::Status;

/// Result of every fallible operation of the engine
pub type FtpResult<T> = std::result::Result<T, FtpError>;

/// Failure of a command, a transfer or the session itself.
///
/// Errors never escape the engine in any other way: every failure is delivered as the
/// error value of the command (or transfer) which triggered it.
#[derive(Debug, Error)]
pub enum FtpError {
    /// Transport level failure (refused, reset, broken pipe, ...)
    #[error("connection error: {0}")]
    ConnectionError(std::io::Error),
    /// The server answered with a negative reply (code >= 400).
    /// Contains the response data, whose text is the server text unmodified.
    #[error("server refused the command: {0}")]
    ProtocolError(Response),
    /// The data connection has been idle longer than the configured timeout
    #[error("data connection idle timeout expired")]
    Timeout,
    /// The response syntax is invalid (e.g. a malformed PASV reply)
    #[error("malformed server response")]
    BadResponse,
    /// Only one data connection at a time is supported by a session
    #[error("another data connection is open on this session")]
    DataConnectionAlreadyOpen,
    /// The session has been destroyed before the command could complete
    #[error("session closed")]
    SessionClosed,
}

/// A framed response from the ftp server
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Response {
    /// Numeric reply code (100-599)
    pub code: u32,
    /// Reply text. For multiline replies this contains every line of the reply, joined by `\n`
    pub text: String,
    /// Whether the reply spanned several lines on the wire
    pub multiline: bool,
}

/// Second parameter of `TYPE A` (RFC 959, 3.1.1.5)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FormatControl {
    /// No parameter sent; servers assume `N`
    Default,
    /// `N`
    NonPrint,
    /// `T`: telnet vertical format controls
    Telnet,
    /// `C`: carriage control in the first character of each line
    Asa,
}

/// Representation type selected with `TYPE`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FileType {
    /// `A`, with an optional format control
    Ascii(FormatControl),
    /// `I`
    Image,
    /// Same wire form as [`FileType::Image`]
    Binary,
}

/// Feature labels advertised by FEAT, upper-cased, with their optional parameters
pub type Features = HashMap<String, Option<String>>;

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.text)
    }
}

impl Response {
    /// Instantiates a new single line `Response`
    pub fn new(code: u32, text: impl ToString) -> Self {
        Self {
            code,
            text: text.to_string(),
            multiline: false,
        }
    }

    /// Instantiates a new `Response` which was framed from several lines
    pub fn multiline(code: u32, lines: &[String]) -> Self {
        Self {
            code,
            text: lines.join("\n"),
            multiline: true,
        }
    }

    /// Get the typed status for this response code
    pub fn status(&self) -> Status {
        Status::from(self.code)
    }

    /// Whether the response is an intermediate transfer-start mark (125, 150)
    pub fn is_mark(&self) -> bool {
        self.status().is_mark()
    }

    /// Whether the response is a negative reply
    pub fn is_error(&self) -> bool {
        self.code >= 400
    }

    /// Iterate over the lines of the response text
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.text.lines()
    }
}

impl fmt::Display for FormatControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = match self {
            Self::Default | Self::NonPrint => 'N',
            Self::Telnet => 'T',
            Self::Asa => 'C',
        };
        write!(f, "{code}")
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ascii(FormatControl::Default) => f.write_str("A"),
            Self::Ascii(control) => write!(f, "A {control}"),
            Self::Image | Self::Binary => f.write_str("I"),
        }
    }
}
