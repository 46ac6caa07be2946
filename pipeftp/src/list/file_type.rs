/// Describes the kind of a listing entry.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum FileType {
    Directory,
    /// Regular file; block and character devices are reported as files too
    File,
    /// The target, when the listing shows it, is available on the entry
    Symlink,
    /// Any other kind (pipes, sockets, ...)
    Unknown,
}

impl FileType {
    /// Map the first character of a `ls -l` line to a file type
    pub(crate) fn from_type_char(c: char) -> Self {
        match c {
            'd' => Self::Directory,
            'l' => Self::Symlink,
            'b' | 'c' | 'f' | '-' => Self::File,
            _ => Self::Unknown,
        }
    }

    pub fn is_directory(&self) -> bool {
        *self == Self::Directory
    }

    /// Regular files and devices
    pub fn is_file(&self) -> bool {
        *self == Self::File
    }

    pub fn is_symlink(&self) -> bool {
        *self == Self::Symlink
    }
}
