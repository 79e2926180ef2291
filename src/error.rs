//! Error types shared by every filesystem layer.

use std::io;

use thiserror::Error;

use crate::zip::ZipError;

pub type Result<T> = std::result::Result<T, Error>;

/// Failure of a filesystem operation.
///
/// The variants are deliberately coarse: callers (the HTTP layer in
/// particular) only need to tell "the path does not resolve" apart from
/// "something broke while resolving it".
#[derive(Error, Debug)]
pub enum Error {
    /// A path segment is absent at the current level.
    #[error("no such file or directory: {0}")]
    NotFound(String),

    /// A path continues past something that is neither a directory nor an archive.
    #[error("not a directory: {0}")]
    NotADirectory(String),

    /// A directory was opened as if it were a file.
    #[error("is a directory: {0}")]
    IsADirectory(String),

    /// A file that had to act as an archive failed to decode.
    #[error("invalid archive: {0}")]
    InvalidArchive(String),

    /// Underlying read, open or seek failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The resource was already released.
    #[error("resource already closed")]
    Closed,
}

impl Error {
    /// Classifies an I/O error raised while touching `path`.
    pub fn from_io(err: io::Error, path: &str) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Error::NotFound(path.to_string()),
            io::ErrorKind::NotADirectory => Error::NotADirectory(path.to_string()),
            io::ErrorKind::IsADirectory => Error::IsADirectory(path.to_string()),
            _ => Error::Io(err),
        }
    }

    /// True for the errors that mean "this path does not resolve".
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::NotFound(_) | Error::NotADirectory(_) | Error::InvalidArchive(_)
        )
    }
}

impl From<ZipError> for Error {
    fn from(err: ZipError) -> Self {
        match err {
            ZipError::Io(e) => Error::Io(e),
            ZipError::NoSuchFile(path) => Error::NotFound(path),
            other => Error::InvalidArchive(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_are_classified_by_kind() {
        let err = Error::from_io(io::Error::from(io::ErrorKind::NotFound), "/a");
        assert!(matches!(err, Error::NotFound(p) if p == "/a"));

        let err = Error::from_io(io::Error::from(io::ErrorKind::NotADirectory), "/a/b");
        assert!(matches!(err, Error::NotADirectory(_)));

        let err = Error::from_io(io::Error::from(io::ErrorKind::PermissionDenied), "/a");
        assert!(matches!(err, Error::Io(_)));
        assert!(!err.is_not_found());
    }

    #[test]
    fn zip_errors_become_invalid_archive() {
        let err: Error = ZipError::InvalidArchive("Not a valid ZIP file").into();
        assert!(matches!(err, Error::InvalidArchive(ref m) if m.contains("Not a valid ZIP file")));
        assert!(err.is_not_found());

        let err: Error = ZipError::UnsupportedCompressionMethod(12).into();
        assert!(matches!(err, Error::InvalidArchive(_)));
    }
}
