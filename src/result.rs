//! Error types and the related `Result<T>`

use camino::Utf8PathBuf;
use thiserror::Error;

pub type PackResult<T> = Result<T, PackError>;

#[derive(Debug, Error)]
pub enum PackError {
    /// An error from an underlying stream that isn't tied to a named file
    #[error("I/O Error")]
    Io(#[from] std::io::Error),

    /// Opening, reading, writing, or stat-ing the given file failed.
    #[error("I/O error on {path}")]
    FileIo {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The package is malformed: bad magic numbers, a truncated header,
    /// or a table of contents that doesn't fit in the package.
    #[error("Invalid package: {0}")]
    InvalidPackage(String),

    /// The package was written in a format we don't understand.
    #[error("Unsupported package: {0}")]
    UnsupportedPackage(String),

    /// An offset or size stored in the package points outside of it.
    #[error("Out of bounds: {0}")]
    OutOfBounds(String),

    /// The caller asked for an entry past the end of the table of contents
    /// (or the configured file list).
    #[error("Entry {index} out of range: there are only {count} entries")]
    IndexOutOfRange { index: usize, count: usize },

    /// An entry name can't be stored in the name table,
    /// which terminates each name with a NUL.
    #[error("Entry name {0:?} contains a NUL byte")]
    InvalidName(String),

    /// No entry in the package has the given name
    #[error("No entry in the package with the name {0}")]
    NoSuchEntry(String),

    /// A lazily-added file changed size between being added and being written.
    #[error("{path} was {expected} bytes when added but {actual} bytes when written")]
    SizeMismatch {
        path: Utf8PathBuf,
        expected: u64,
        actual: u64,
    },

    /// Decoding a UTF-8 entry name failed
    #[error("Invalid UTF-8")]
    Encoding(#[from] std::str::Utf8Error),

    /// A cast from a 64-bit int to a usize failed,
    /// probably on a 32-bit system.
    #[error("Package too large for address space")]
    InsufficientAddressSpace,
}

impl PackError {
    /// Wraps an I/O error with the path of the file it happened on.
    pub(crate) fn file<P: Into<Utf8PathBuf>>(path: P) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| PackError::FileIo { path, source }
    }
}
