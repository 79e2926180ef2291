//! Error types and the related `ZipResult<T>`

use std::io;

use thiserror::Error;

pub type ZipResult<T> = Result<T, ZipError>;

#[derive(Error, Debug)]
pub enum ZipError {
    /// An error from underlying I/O
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The archive contained invalid data per the format.
    #[error("Invalid ZIP archive: {0}")]
    InvalidArchive(&'static str),

    /// The archive uses a feature we don't read (multi-disk, encryption, ...)
    #[error("Unsupported ZIP archive: {0}")]
    UnsupportedArchive(String),

    #[error("Unsupported compression method: {0}")]
    UnsupportedCompressionMethod(u16),

    /// No entry at the given path
    #[error("No file in the archive with the path {0}")]
    NoSuchFile(String),
}
