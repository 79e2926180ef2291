//! The filesystem contract and its implementations.
//!
//! [`FileSystem`] is the four-operation, read-only contract every layer
//! speaks: the physical [`OsFs`], the archive views produced by decoding a
//! zip ([`ArchiveFs`](crate::zip::ArchiveFs)), and [`ZipOpenFs`], which
//! stitches the two together so archives look like folders.

mod os;
pub mod path;
mod zipopen;

pub use os::OsFs;
pub use zipopen::{ZipOpenFs, masquerade};

use std::time::SystemTime;

use crate::error::Result;
use crate::io::{Close, FileHandle};

/// File-type mask of a unix `st_mode`.
pub const S_IFMT: u32 = 0o170_000;
pub const S_IFDIR: u32 = 0o040_000;
pub const S_IFREG: u32 = 0o100_000;
pub const S_IFLNK: u32 = 0o120_000;

/// What a stat or a directory listing reports about one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    /// Base name of the node (the archive's own name for an archive root).
    pub name: String,
    pub size: u64,
    /// `None` when the layer does not track it.
    pub modified: Option<SystemTime>,
    /// May be a synthetic marker standing in for an archive, see [`masquerade`].
    pub is_dir: bool,
    /// Unix-style mode: file-type bits plus permission bits.
    pub mode: u32,
}

impl Metadata {
    /// The record reported in place of an archive's real metadata: only the
    /// name survives.
    pub fn synthetic_dir(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size: 0,
            modified: None,
            is_dir: true,
            mode: S_IFDIR | 0o555,
        }
    }

    pub fn is_file(&self) -> bool {
        !self.is_dir && self.mode & S_IFMT == S_IFREG
    }

    pub fn is_symlink(&self) -> bool {
        self.mode & S_IFMT == S_IFLNK
    }

    /// Permission bits only.
    pub fn permissions(&self) -> u32 {
        self.mode & 0o7777
    }
}

/// Read-only filesystem capability.
///
/// Paths are slash-delimited; `""` and `"/"` both name the root.
/// Implementations are shared across request threads, so every method takes
/// `&self`. [`close`](Close::close) releases whatever the filesystem itself
/// owns and is a no-op where there is nothing to release.
pub trait FileSystem: Close + Send + Sync {
    fn open(&self, path: &str) -> Result<Box<dyn FileHandle>>;

    fn stat(&self, path: &str) -> Result<Metadata>;

    /// Like [`stat`](FileSystem::stat) but does not follow a terminal
    /// symbolic link, where the layer has such a thing.
    fn lstat(&self, path: &str) -> Result<Metadata>;

    fn list(&self, path: &str) -> Result<Vec<Metadata>>;

    /// Short human-readable description for logs.
    fn describe(&self) -> String;
}

impl<F: FileSystem + ?Sized> FileSystem for Box<F> {
    fn open(&self, path: &str) -> Result<Box<dyn FileHandle>> {
        (**self).open(path)
    }

    fn stat(&self, path: &str) -> Result<Metadata> {
        (**self).stat(path)
    }

    fn lstat(&self, path: &str) -> Result<Metadata> {
        (**self).lstat(path)
    }

    fn list(&self, path: &str) -> Result<Vec<Metadata>> {
        (**self).list(path)
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}
