//! # List
//!
//! Directory listings, as sent by `LIST` over a data connection or by `STAT <path>` over the
//! control channel. RFC 959 leaves the listing format to the server; two grammars are recognized:
//!
//! - the POSIX `ls -l` format, used by almost any unix server
//! - the DOS format, used by IIS and other Windows servers
//!
//! Every other line (headers such as `total 24`, footers, blank lines) is silently rejected.
//!
//! ## Get started
//!
//! ```rust
//! use pipeftp::list::{self, FileType};
//!
//! let file = list::parse_line("lrwxrwxrwx   1 root     other          7 Jan 25 00:17 bin -> usr/bin")
//!     .expect("failed to parse LIST line");
//!
//! assert_eq!(file.name(), "bin");
//! assert_eq!(file.file_type(), FileType::Symlink);
//! ```
//!
//! When a whole listing is available, use [`parse_listing`], which also recovers entries whose
//! name has been broken across several lines by a newline mismatch between server and client.

mod file;
mod file_type;
mod pex;

use std::path::PathBuf;
use std::time::SystemTime;

use chrono::prelude::Utc;
use chrono::{Datelike, NaiveDate, NaiveDateTime};
use lazy_regex::{Lazy, Regex};
use thiserror::Error;

pub use self::file::File;
pub use self::file_type::FileType;
pub use self::pex::{PosixPex, PosixPexQuery};

/// POSIX system regex to parse list output.
///
/// Groups: type, user/group/others triplets, link count, owner, group (optional),
/// size (a `major, ` prefix is skipped for devices), date, name
static POSIX_LS_RE: Lazy<Regex> = lazy_regex!(
    r#"^([bcdlps\-])([r\-][w\-][xsStTL\-])([r\-][w\-][xsStTL\-])([r\-][w\-][xsStTL\-])[+@.]?\s+(\d+)\s+(\S+)\s+(?:(\S+)\s+)?(?:\d+,\s*)?(\d+)\s+([A-Za-z]{3}\s+\d{1,2}\s+(?:\d{1,2}:\d{2}|\d{4}))\s+(.+)$"#
);
/// DOS system regex to parse list output.
///
/// Groups: date, time, meridiem (optional), `<DIR>` marker (optional), size (optional), name
static DOS_LS_RE: Lazy<Regex> = lazy_regex!(
    r#"^(\d{2}-\d{2}-(?:\d{4}|\d{2}))\s+(\d{1,2}:\d{2})\s*([AaPp][Mm])?\s+(?:(<DIR>)\s+|([\d,]+)\s+)?(.+)$"#
);
/// Leading shape of a POSIX line: type and permissions
static POSIX_SHAPE_RE: Lazy<Regex> =
    lazy_regex!(r#"^[bcdlps\-](?:[r\-][w\-][xsStTL\-]){3}"#);
/// Leading shape of a DOS line: the date
static DOS_SHAPE_RE: Lazy<Regex> = lazy_regex!(r#"^\d{2}-\d{2}-\d{2,4}\s"#);

/// Outcome of parsing one listing line
pub type ParseResult<T> = Result<T, ParseError>;

/// Why a listing line has been rejected
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ParseError {
    #[error("line matches no listing grammar")]
    SyntaxError,
    #[error("unparsable modification time")]
    InvalidDate,
    #[error("unparsable size")]
    BadSize,
}

/// The closed set of listing grammars
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ListingFormat {
    /// `ls -l` like output
    Unix,
    /// MS-DOS / IIS output
    Dos,
    /// Anything else: headers, footers, garbage
    Unrecognized,
}

impl ListingFormat {
    /// Choose the grammar for a line by looking at its first character
    pub fn detect(line: &str) -> Self {
        match line.chars().next() {
            Some('b' | 'c' | 'd' | 'l' | 'p' | 's' | '-') => Self::Unix,
            Some(c) if c.is_ascii_digit() => Self::Dos,
            _ => Self::Unrecognized,
        }
    }
}

/// Parse a single listing line.
///
/// Returns `None` for any line which is not a file entry, including the `.` and `..`
/// entries of DOS listings. Rejecting a line is never an error.
pub fn parse_line(line: &str) -> Option<File> {
    let line = line.trim_end_matches(['\r', '\n']);
    let result = match ListingFormat::detect(line) {
        ListingFormat::Unix => ListParser::parse_posix(line),
        ListingFormat::Dos => ListParser::parse_dos(line).and_then(|file| {
            if matches!(file.name(), "." | "..") {
                Err(ParseError::SyntaxError)
            } else {
                Ok(file)
            }
        }),
        ListingFormat::Unrecognized => return None,
    };
    match result {
        Ok(file) => Some(file),
        Err(err) => {
            debug!("rejected listing line {line:?}: {err}");
            None
        }
    }
}

/// Parse a whole listing, one entry per line.
///
/// Lines which don't have the leading shape of any grammar are considered the continuation of
/// the name of the previous entry, which was broken by a stray newline; they're appended to it.
/// Lines which have the shape of an entry but fail to parse are omitted, as are blank lines.
pub fn parse_listing(text: &str) -> Vec<File> {
    let mut files: Vec<File> = Vec::new();
    // whether the last entry line has been accepted and may receive continuations
    let mut can_glue = false;
    for line in text.split('\n') {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }
        if has_entry_shape(line) {
            match parse_line(line) {
                Some(file) => {
                    files.push(file);
                    can_glue = true;
                }
                None => can_glue = false,
            }
        } else if let Some(last) = files.last_mut().filter(|_| can_glue) {
            trace!("gluing {line:?} to the name of {}", last.name);
            last.name.push_str(line);
        } else {
            trace!("dropping listing line {line:?}");
        }
    }
    debug!("parsed {} entries from listing", files.len());
    files
}

fn has_entry_shape(line: &str) -> bool {
    POSIX_SHAPE_RE.is_match(line) || DOS_SHAPE_RE.is_match(line)
}

/// Strict per-grammar line parsers
///
/// Unlike [`parse_line`], the methods of this parser report why a line has been rejected.
pub struct ListParser;

impl ListParser {
    /// Parse an `ls -l` line:
    ///
    /// ```text
    /// {TYPE}{PERMISSIONS} {LINKS} {OWNER} [{GROUP}] {SIZE} {MTIME} {NAME}[ -> {TARGET}]
    /// -rw-r--r-- 1 ftp ftp 4096 Mar 3 09:12 notes.txt
    /// ```
    pub fn parse_posix(line: &str) -> ParseResult<File> {
        let metadata = POSIX_LS_RE
            .captures(line)
            .ok_or(ParseError::SyntaxError)?;
        trace!("Parsed POSIX line {line}");
        let file_type = metadata[1]
            .chars()
            .next()
            .map(FileType::from_type_char)
            .ok_or(ParseError::SyntaxError)?;
        let triplet = |i: usize| PosixPex::from_triplet(&metadata[i]).ok_or(ParseError::SyntaxError);
        let modes = [triplet(2)?, triplet(3)?, triplet(4)?];
        let owner = metadata[6].to_string();
        let group = metadata.get(7).map(|g| g.as_str().to_string());
        let size = metadata[8]
            .parse::<u64>()
            .map_err(|_| ParseError::BadSize)?;
        let modified = Self::parse_lstime(&metadata[9], "%b %d %Y", "%b %d %H:%M")?;
        let (name, symlink) = match file_type.is_symlink() {
            true => Self::get_name_and_link(&metadata[10]),
            false => (metadata[10].to_string(), None),
        };
        trace!(
            "Found file with name {name}, type: {file_type:?}, size: {size}, owner: {owner}, group: {group:?}, modes: {modes:?}"
        );
        Ok(File {
            name,
            file_type,
            size,
            modified,
            owner: Some(owner),
            group,
            modes,
            symlink,
        })
    }

    /// Parse an IIS style line:
    ///
    /// ```text
    /// {DATE} {TIME} [{<DIR> | SIZE}] {NAME}
    /// 03-03-21  09:12AM  <DIR>  public
    /// 03-03-21  09:12AM  4,096  notes.txt
    /// ```
    pub fn parse_dos(line: &str) -> ParseResult<File> {
        let metadata = DOS_LS_RE.captures(line).ok_or(ParseError::SyntaxError)?;
        trace!("Parsed DOS line {line}");
        let modified = Self::parse_dostime(
            &metadata[1],
            &metadata[2],
            metadata.get(3).map(|m| m.as_str()),
        )?;
        let (file_type, size) = match (metadata.get(4), metadata.get(5)) {
            (Some(_), _) => (FileType::Directory, 0),
            (None, Some(size)) => (
                FileType::File,
                size.as_str()
                    .replace(',', "")
                    .parse::<u64>()
                    .map_err(|_| ParseError::BadSize)?,
            ),
            (None, None) => (FileType::File, 0),
        };
        let name = metadata[6].trim_end().to_string();
        trace!("Found file with name {name}, type: {file_type:?}, size: {size}");
        Ok(File {
            name,
            file_type,
            size,
            modified,
            owner: None,
            group: None,
            modes: [PosixPex::default(); 3],
            symlink: None,
        })
    }

    /// Split `name -> target`
    fn get_name_and_link(token: &str) -> (String, Option<PathBuf>) {
        match token.split_once(" -> ") {
            Some((name, target)) => (name.to_string(), Some(PathBuf::from(target))),
            None => (token.to_string(), None),
        }
    }

    /// `ls` prints `Mar 3 2019` for old files and `Mar 3 09:12` for recent ones, whose year
    /// has to be guessed
    fn parse_lstime(tm: &str, fmt_year: &str, fmt_hours: &str) -> ParseResult<SystemTime> {
        // servers pad the day with a variable number of spaces
        let tm = tm.split_whitespace().collect::<Vec<&str>>().join(" ");
        if let Ok(date) = NaiveDate::parse_from_str(&tm, fmt_year) {
            let datetime = date.and_hms_opt(0, 0, 0).ok_or(ParseError::InvalidDate)?;
            return Ok(SystemTime::from(datetime.and_utc()));
        }
        // Case 1: the year is the current one, unless that puts the date more than 6 months ahead
        let now = Utc::now();
        let with_year = |year: i32| {
            NaiveDateTime::parse_from_str(&format!("{tm} {year}"), &format!("{fmt_hours} %Y"))
                .map_err(|_| ParseError::InvalidDate)
        };
        let datetime = match with_year(now.year()) {
            Ok(dt) if dt.and_utc().timestamp() - now.timestamp() > 180 * 24 * 3600 => {
                with_year(now.year() - 1)?
            }
            Ok(dt) => dt,
            // Feb 29 doesn't exist in the current year
            Err(_) => with_year(now.year() - 1)?,
        };
        Ok(SystemTime::from(datetime.and_utc()))
    }

    /// Parse date time tokens in DOS representation.
    ///
    /// The year may have 2 or 4 digits; without the meridiem the time is read as 24-hour.
    fn parse_dostime(date: &str, time: &str, meridiem: Option<&str>) -> ParseResult<SystemTime> {
        let fmt_date = match date.len() {
            8 => "%m-%d-%y",
            _ => "%m-%d-%Y",
        };
        let datetime = match meridiem {
            Some(meridiem) => NaiveDateTime::parse_from_str(
                &format!("{date} {time}{}", meridiem.to_uppercase()),
                &format!("{fmt_date} %I:%M%p"),
            ),
            None => NaiveDateTime::parse_from_str(
                &format!("{date} {time}"),
                &format!("{fmt_date} %H:%M"),
            ),
        }
        .map_err(|_| ParseError::InvalidDate)?;
        Ok(SystemTime::from(datetime.and_utc()))
    }
}
