/// Permission class of a listing entry
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum PosixPexQuery {
    Owner,
    Group,
    Others,
}

/// Read, write and execute flags granted to one permission class
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct PosixPex {
    read: bool,
    write: bool,
    execute: bool,
}

impl PosixPex {
    pub fn can_read(&self) -> bool {
        self.read
    }

    pub fn can_write(&self) -> bool {
        self.write
    }

    pub fn can_execute(&self) -> bool {
        self.execute
    }

    /// Parse a `ls -l` permission triplet, such as `rwx`, `r-s` or `rwT`.
    ///
    /// The third character may also carry a special bit (setuid, setgid, sticky, mandatory locking):
    /// lowercase letters mean the execute bit is set as well, uppercase letters mean it is not.
    pub(crate) fn from_triplet(triplet: &str) -> Option<Self> {
        let mut chars = triplet.chars();
        let (r, w, x) = (chars.next()?, chars.next()?, chars.next()?);
        if chars.next().is_some() {
            return None;
        }
        Some(Self {
            read: r != '-',
            write: w != '-',
            execute: x != '-' && !x.is_ascii_uppercase(),
        })
    }
}

impl Default for PosixPex {
    /// Everything granted, used when the listing carries no permissions (DOS)
    fn default() -> Self {
        Self::from(0o7)
    }
}

impl From<u8> for PosixPex {
    /// Build from an octal digit, as in `chmod 640`
    fn from(digit: u8) -> Self {
        Self {
            read: digit & 0o4 == 0o4,
            write: digit & 0o2 == 0o2,
            execute: digit & 0o1 == 0o1,
        }
    }
}
