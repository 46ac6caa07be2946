use std::convert::TryFrom;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::SystemTime;

use super::{FileType, ListParser, ListingFormat, ParseError, ParseResult, PosixPex, PosixPexQuery};

/// One entry of a directory listing, as parsed from a `LIST` or `STAT` line.
///
/// An entry has no identity beyond the listing it was parsed from.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct File {
    pub(crate) name: String,
    pub(crate) file_type: FileType,
    /// bytes; zero for DOS directories
    pub(crate) size: u64,
    pub(crate) modified: SystemTime,
    /// POSIX listings only
    pub(crate) owner: Option<String>,
    /// POSIX listings only, when the group column is present
    pub(crate) group: Option<String>,
    /// owner, group, others
    pub(crate) modes: [PosixPex; 3],
    pub(crate) symlink: Option<PathBuf>,
}

impl File {
    /// Entry name, without the link target
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    pub fn file_type(&self) -> FileType {
        self.file_type
    }

    pub fn is_directory(&self) -> bool {
        self.file_type.is_directory()
    }

    pub fn is_file(&self) -> bool {
        self.file_type.is_file()
    }

    pub fn is_symlink(&self) -> bool {
        self.file_type.is_symlink()
    }

    /// Target of a symlink, when the listing reported one (`name -> target`)
    pub fn symlink(&self) -> Option<&Path> {
        self.symlink.as_deref()
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Modification time. Listings carry no timezone, the time is read as UTC
    pub fn modified(&self) -> SystemTime {
        self.modified
    }

    /// Owning user; `None` for DOS listings
    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    /// Owning group; `None` for DOS listings and POSIX lines without a group column
    pub fn group(&self) -> Option<&str> {
        self.group.as_deref()
    }

    /// Permissions granted to a class. DOS entries grant everything
    pub fn permissions(&self, who: PosixPexQuery) -> PosixPex {
        let index = match who {
            PosixPexQuery::Owner => 0,
            PosixPexQuery::Group => 1,
            PosixPexQuery::Others => 2,
        };
        self.modes[index]
    }

    pub fn can_read(&self, who: PosixPexQuery) -> bool {
        self.permissions(who).can_read()
    }

    pub fn can_write(&self, who: PosixPexQuery) -> bool {
        self.permissions(who).can_write()
    }

    pub fn can_execute(&self, who: PosixPexQuery) -> bool {
        self.permissions(who).can_execute()
    }
}

impl FromStr for File {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_from(s)
    }
}

impl TryFrom<&str> for File {
    type Error = ParseError;

    /// Strict parsing: unlike [`super::parse_line`] the reason of the failure is reported
    fn try_from(line: &str) -> ParseResult<Self> {
        match ListingFormat::detect(line) {
            ListingFormat::Unix => ListParser::parse_posix(line),
            ListingFormat::Dos => ListParser::parse_dos(line),
            ListingFormat::Unrecognized => Err(ParseError::SyntaxError),
        }
    }
}

impl TryFrom<String> for File {
    type Error = ParseError;

    fn try_from(line: String) -> ParseResult<Self> {
        File::try_from(line.as_str())
    }
}
