use tracing::trace;

use super::archive::{Node, ZipArchive};
use super::structures::ZipFileEntry;
use crate::error::{Error, Result};
use crate::io::{Close, FileHandle};
use crate::vfs::{FileSystem, Metadata, S_IFDIR, S_IFREG, path};

/// A decoded archive seen as a read-only directory tree rooted at `/`.
///
/// The root reports the archive's own base name. ZIP has no notion of
/// symbolic links, so `lstat` and `stat` are the same thing here.
pub struct ArchiveFs {
    archive: ZipArchive,
    name: String,
    closed: bool,
}

impl ArchiveFs {
    pub fn new(archive: ZipArchive, name: impl Into<String>) -> Self {
        Self {
            archive,
            name: name.into(),
            closed: false,
        }
    }

    fn check_open(&self) -> Result<()> {
        if self.closed {
            Err(Error::Closed)
        } else {
            Ok(())
        }
    }

    fn node(&self, path: &str) -> Result<&Node> {
        self.check_open()?;
        self.archive
            .lookup(path)
            .ok_or_else(|| Error::NotFound(path.to_string()))
    }

    fn name_of(&self, path: &str) -> String {
        match path::split(path).pop() {
            Some(name) => name,
            None => self.name.clone(),
        }
    }
}

/// Permission bits recorded for `entry`, or `default` when it has none.
fn permissions(entry: Option<&ZipFileEntry>, default: u32) -> u32 {
    entry
        .and_then(ZipFileEntry::unix_mode)
        .map_or(default, |mode| mode & 0o7777)
}

fn metadata(name: String, node: &Node) -> Metadata {
    match node {
        Node::File(entry) => Metadata {
            name,
            size: entry.uncompressed_size,
            modified: entry.modified(),
            is_dir: false,
            mode: S_IFREG | permissions(Some(entry), 0o444),
        },
        Node::Directory { entry, .. } => Metadata {
            name,
            size: 0,
            modified: entry.as_ref().and_then(ZipFileEntry::modified),
            is_dir: true,
            mode: S_IFDIR | permissions(entry.as_ref(), 0o555),
        },
    }
}

impl FileSystem for ArchiveFs {
    fn open(&self, path: &str) -> Result<Box<dyn FileHandle>> {
        match self.node(path)? {
            Node::File(entry) => {
                trace!(archive = %self.name, entry = %entry.file_name, "open entry");
                Ok(Box::new(self.archive.open(entry)?))
            }
            Node::Directory { .. } => Err(Error::IsADirectory(path.to_string())),
        }
    }

    fn stat(&self, path: &str) -> Result<Metadata> {
        let node = self.node(path)?;
        Ok(metadata(self.name_of(path), node))
    }

    fn lstat(&self, path: &str) -> Result<Metadata> {
        self.stat(path)
    }

    fn list(&self, path: &str) -> Result<Vec<Metadata>> {
        match self.node(path)? {
            Node::Directory { .. } => Ok(self
                .archive
                .children(path)?
                .into_iter()
                .map(|(name, node)| metadata(name.to_string(), node))
                .collect()),
            Node::File(_) => Err(Error::NotADirectory(path.to_string())),
        }
    }

    fn describe(&self) -> String {
        format!("zip({})", self.name)
    }
}

impl Close for ArchiveFs {
    fn close(&mut self) -> Result<()> {
        self.check_open()?;
        self.closed = true;
        Ok(())
    }
}
