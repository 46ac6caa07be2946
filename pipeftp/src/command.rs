//! # Command
//!
//! The set of FTP commands the engine issues on the control channel

pub mod feat;

use std::fmt;

use crate::types::FileType;

/// A command line for the control channel, argument included
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Appe(String),
    Cdup,
    Cwd(String),
    /// Sent as-is, e.g. `SITE CHMOD 644 a.txt`
    Custom(String),
    Dele(String),
    Feat,
    /// `None` lists the working directory
    List(Option<String>),
    Mkd(String),
    /// `None` lists the working directory
    Nlst(Option<String>),
    Noop,
    Pass(String),
    Pasv,
    Pwd,
    Quit,
    /// `RNFR`
    RenameFrom(String),
    /// `RNTO`
    RenameTo(String),
    Retr(String),
    Rmd(String),
    Size(String),
    /// Server status, or a listing sent over the control channel when a path is given
    Stat(Option<String>),
    /// `STOR`
    Store(String),
    Syst,
    Type(FileType),
    User(String),
}

impl Command {
    /// Returns whether the command belongs to the login / feature negotiation sequence.
    ///
    /// Such commands can be sent on a session which is not authenticated yet.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Feat | Self::Syst | Self::User(_) | Self::Pass(_))
            || self.verb().map(is_auth_verb).unwrap_or(false)
    }

    /// Returns the text to print in logs, with secrets masked
    pub fn redacted(&self) -> String {
        match self {
            Self::Pass(_) => "PASS ******".to_string(),
            Self::Custom(_)
                if self
                    .verb()
                    .is_some_and(|verb| verb.eq_ignore_ascii_case("PASS")) =>
            {
                "PASS ******".to_string()
            }
            cmd => cmd.to_string(),
        }
    }

    fn verb(&self) -> Option<&str> {
        match self {
            Self::Custom(c) => c.split_whitespace().next(),
            _ => None,
        }
    }
}

/// Returns whether `verb` is one of the login / feature negotiation verbs
pub(crate) fn is_auth_verb(verb: &str) -> bool {
    ["FEAT", "SYST", "USER", "PASS"]
        .iter()
        .any(|x| x.eq_ignore_ascii_case(verb))
}

// -- stringify

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Appe(p) => write!(f, "APPE {p}"),
            Self::Cdup => write!(f, "CDUP"),
            Self::Cwd(d) => write!(f, "CWD {d}"),
            Self::Custom(c) => write!(f, "{c}"),
            Self::Dele(p) => write!(f, "DELE {p}"),
            Self::Feat => write!(f, "FEAT"),
            Self::List(None) => write!(f, "LIST"),
            Self::List(Some(p)) => write!(f, "LIST {p}"),
            Self::Mkd(p) => write!(f, "MKD {p}"),
            Self::Nlst(None) => write!(f, "NLST"),
            Self::Nlst(Some(p)) => write!(f, "NLST {p}"),
            Self::Noop => write!(f, "NOOP"),
            Self::Pass(p) => write!(f, "PASS {p}"),
            Self::Pasv => write!(f, "PASV"),
            Self::Pwd => write!(f, "PWD"),
            Self::Quit => write!(f, "QUIT"),
            Self::RenameFrom(p) => write!(f, "RNFR {p}"),
            Self::RenameTo(p) => write!(f, "RNTO {p}"),
            Self::Retr(p) => write!(f, "RETR {p}"),
            Self::Rmd(p) => write!(f, "RMD {p}"),
            Self::Size(p) => write!(f, "SIZE {p}"),
            Self::Stat(None) => write!(f, "STAT"),
            Self::Stat(Some(p)) => write!(f, "STAT {p}"),
            Self::Store(p) => write!(f, "STOR {p}"),
            Self::Syst => write!(f, "SYST"),
            Self::Type(t) => write!(f, "TYPE {t}"),
            Self::User(u) => write!(f, "USER {u}"),
        }
    }
}
