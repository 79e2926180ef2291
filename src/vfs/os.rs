use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::PathBuf;

use tracing::trace;

use super::{FileSystem, Metadata, path};
use crate::error::{Error, Result};
use crate::io::{Close, FileHandle};

/// The physical filesystem under a root directory.
///
/// Virtual paths are cleaned before being joined onto the root, so `..`
/// cannot reach outside it. Symbolic links inside the tree are followed.
pub struct OsFs {
    root: PathBuf,
}

impl OsFs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let cleaned = path::clean(path);
        self.root.join(cleaned.trim_start_matches('/'))
    }
}

/// An open physical file. Closing drops the descriptor.
pub struct OsFile {
    file: Option<File>,
}

impl OsFile {
    fn file(&mut self) -> io::Result<&mut File> {
        self.file
            .as_mut()
            .ok_or_else(|| io::Error::other("file already closed"))
    }
}

impl Read for OsFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file()?.read(buf)
    }
}

impl Seek for OsFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.file()?.seek(pos)
    }
}

impl Close for OsFile {
    fn close(&mut self) -> Result<()> {
        self.file.take().map(drop).ok_or(Error::Closed)
    }
}

fn convert(name: String, meta: &fs::Metadata) -> Metadata {
    Metadata {
        name,
        size: meta.len(),
        modified: meta.modified().ok(),
        is_dir: meta.is_dir(),
        mode: mode_of(meta),
    }
}

#[cfg(unix)]
fn mode_of(meta: &fs::Metadata) -> u32 {
    use std::os::unix::fs::MetadataExt;
    meta.mode()
}

#[cfg(not(unix))]
fn mode_of(meta: &fs::Metadata) -> u32 {
    use super::{S_IFDIR, S_IFLNK, S_IFREG};

    let kind = if meta.is_dir() {
        S_IFDIR
    } else if meta.file_type().is_symlink() {
        S_IFLNK
    } else if meta.is_file() {
        S_IFREG
    } else {
        0
    };
    let perm = match (meta.is_dir(), meta.permissions().readonly()) {
        (true, true) => 0o555,
        (true, false) => 0o755,
        (false, true) => 0o444,
        (false, false) => 0o644,
    };
    kind | perm
}

impl FileSystem for OsFs {
    fn open(&self, path: &str) -> Result<Box<dyn FileHandle>> {
        let resolved = self.resolve(path);
        trace!(path, resolved = %resolved.display(), "os open");
        let file = File::open(&resolved).map_err(|e| Error::from_io(e, path))?;
        // Opening a directory succeeds on some platforms; reading it never does.
        if file.metadata().map_err(|e| Error::from_io(e, path))?.is_dir() {
            return Err(Error::IsADirectory(path.to_string()));
        }
        Ok(Box::new(OsFile { file: Some(file) }))
    }

    fn stat(&self, path: &str) -> Result<Metadata> {
        let meta = fs::metadata(self.resolve(path)).map_err(|e| Error::from_io(e, path))?;
        Ok(convert(path::base_name(path), &meta))
    }

    fn lstat(&self, path: &str) -> Result<Metadata> {
        let meta =
            fs::symlink_metadata(self.resolve(path)).map_err(|e| Error::from_io(e, path))?;
        Ok(convert(path::base_name(path), &meta))
    }

    fn list(&self, path: &str) -> Result<Vec<Metadata>> {
        let dir = fs::read_dir(self.resolve(path)).map_err(|e| Error::from_io(e, path))?;
        let mut entries = Vec::new();
        for entry in dir {
            let entry = entry?;
            let meta = entry.metadata()?;
            entries.push(convert(entry.file_name().to_string_lossy().into_owned(), &meta));
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn describe(&self) -> String {
        format!("os({})", self.root.display())
    }
}

impl Close for OsFs {
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}
