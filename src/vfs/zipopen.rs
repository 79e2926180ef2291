//! Zip archives as directories.
//!
//! [`ZipOpenFs`] wraps any [`FileSystem`] and resolves paths one segment at a
//! time. Whenever a segment lands on a regular file while more segments
//! remain, the file is decoded as a zip and the rest of the path is resolved
//! inside the resulting archive view, with the very same walk. Because the
//! walk only ever talks to `&dyn FileSystem`, archives nested in archives
//! need nothing special.
//!
//! Ownership of everything opened along the way follows the result:
//!
//! - `open` hands back a stream chained to every archive view (and through
//!   them every backing stream) it had to open, so one close releases all.
//! - `stat` and `list` close whatever they opened before returning, on the
//!   error paths as well.

use std::sync::Arc;

use tracing::{debug, trace, warn};

use super::{FileSystem, Metadata, path};
use crate::error::{Error, Result};
use crate::io::chain::Dependent;
use crate::io::{self, Chained, Close, FileHandle, ReadSeekerAt};
use crate::zip::{ArchiveFs, ZipArchive, ZipError};

/// An archive view bound to the stream its bytes come from.
type ArchiveView = Chained<ArchiveFs>;

/// A filesystem on which every zip archive looks like a read-only folder.
///
/// Stateless apart from the wrapped filesystem: each call builds and
/// releases its own chain of archive views, so calls from different threads
/// never contend with each other.
pub struct ZipOpenFs {
    inner: Box<dyn FileSystem>,
}

impl ZipOpenFs {
    pub fn new(inner: impl FileSystem + 'static) -> Self {
        Self {
            inner: Box::new(inner),
        }
    }
}

/// Reports an archive as a directory: when `is_archive` holds, everything
/// but the name is replaced by a synthetic directory record.
pub fn masquerade(meta: Metadata, is_archive: bool) -> Metadata {
    if is_archive {
        Metadata::synthetic_dir(meta.name)
    } else {
        meta
    }
}

/// One of the filesystem operations, as seen by the path walk.
trait Operation {
    type Output;

    /// Applies the operation where the path ends.
    fn at(&self, fs: &dyn FileSystem, path: &str) -> Result<Self::Output>;

    /// Disposes of `view` once `output` has been produced inside it.
    ///
    /// By default the view is simply closed; operations returning a live
    /// handle take ownership of it instead.
    fn adopt(&self, output: Self::Output, mut view: ArchiveView) -> Result<Self::Output> {
        view.close()?;
        Ok(output)
    }
}

struct Open;

struct Stat {
    link: bool,
}

struct List;

impl Operation for Open {
    type Output = Box<dyn FileHandle>;

    /// Never masqueraded: opening an archive itself yields its raw bytes.
    fn at(&self, fs: &dyn FileSystem, path: &str) -> Result<Self::Output> {
        fs.open(path)
    }

    fn adopt(&self, output: Self::Output, view: ArchiveView) -> Result<Self::Output> {
        let view: Dependent = Box::new(view);
        Ok(Box::new(io::wrap(output, vec![view])))
    }
}

impl Operation for Stat {
    type Output = Metadata;

    fn at(&self, fs: &dyn FileSystem, path: &str) -> Result<Metadata> {
        let meta = if self.link {
            fs.lstat(path)?
        } else {
            fs.stat(path)?
        };
        let is_archive = !meta.is_dir && is_archive(fs, path);
        Ok(masquerade(meta, is_archive))
    }
}

impl Operation for List {
    type Output = Vec<Metadata>;

    fn at(&self, fs: &dyn FileSystem, path: &str) -> Result<Vec<Metadata>> {
        let meta = fs.stat(path)?;
        if !meta.is_dir {
            // Listing an archive lists its root.
            let view = open_archive(fs, path, &meta)
                .map_err(|_| Error::NotADirectory(path.to_string()))?;
            return finish(self, view, |view| self.at(view, "/"));
        }

        let mut entries = fs.list(path)?;
        for entry in &mut entries {
            if entry.is_dir {
                continue;
            }
            if is_archive(fs, &path::join(path, &entry.name)) {
                *entry = masquerade(entry.clone(), true);
            }
        }
        Ok(entries)
    }
}

/// Resolves `rest` below `prefix` on `fs`, descending into directories and,
/// where a regular file is in the way, into the archive it contains.
fn walk<O: Operation>(
    fs: &dyn FileSystem,
    prefix: &str,
    rest: &[String],
    op: &O,
) -> Result<O::Output> {
    let Some((head, tail)) = rest.split_first() else {
        return op.at(fs, prefix);
    };

    // Not wrapped: the caller sees exactly what the layer below reported.
    let meta = fs.stat(prefix)?;

    if meta.is_dir {
        return walk(fs, &path::join(prefix, head), tail, op);
    }
    if !meta.is_file() {
        return Err(Error::NotADirectory(prefix.to_string()));
    }

    trace!(archive = prefix, remaining = rest.len(), "descending into archive");
    let view = open_archive(fs, prefix, &meta)?;
    finish(op, view, |view| walk(view, "/", rest, op))
}

/// Runs `f` against `view`, then hands the view to the operation to keep or
/// close. On failure the view is closed before the error is returned.
fn finish<O: Operation>(
    op: &O,
    mut view: ArchiveView,
    f: impl FnOnce(&dyn FileSystem) -> Result<O::Output>,
) -> Result<O::Output> {
    let fs: &dyn FileSystem = &view;
    match f(fs) {
        Ok(output) => op.adopt(output, view),
        Err(err) => {
            if let Err(close_err) = view.close() {
                warn!(archive = %view.describe(), error = %close_err, "failed to close archive");
            }
            Err(err)
        }
    }
}

/// Decodes the file at `path` as a zip and returns its view, bound to the
/// backing stream. Nothing stays open on failure.
fn open_archive(fs: &dyn FileSystem, path: &str, meta: &Metadata) -> Result<ArchiveView> {
    let backing = fs.open(path)?;
    let reader = Arc::new(ReadSeekerAt::new(backing));

    match ZipArchive::new(reader.clone(), meta.size) {
        Ok(archive) => {
            let view = ArchiveFs::new(archive, path::base_name(path));
            let backing: Dependent = Box::new(reader);
            Ok(io::wrap(view, vec![backing]))
        }
        Err(err) => {
            if let Err(close_err) = ReadSeekerAt::close(&reader) {
                warn!(path, error = %close_err, "failed to close rejected archive");
            }
            Err(decode_error(path, err))
        }
    }
}

/// A truncated or garbled archive surfaces from the decoder as a short read;
/// only genuine I/O failures stay I/O errors.
fn decode_error(path: &str, err: ZipError) -> Error {
    match err {
        ZipError::Io(e)
            if !matches!(
                e.kind(),
                std::io::ErrorKind::UnexpectedEof | std::io::ErrorKind::InvalidData
            ) =>
        {
            Error::Io(e)
        }
        other => Error::InvalidArchive(format!("{path}: {other}")),
    }
}

/// Whether `path` can be opened as an archive. Every failure, whether in
/// stat, open or decode, just means "no".
fn is_archive(fs: &dyn FileSystem, path: &str) -> bool {
    let probe = fs.stat(path).and_then(|meta| {
        if !meta.is_file() {
            return Err(Error::NotADirectory(path.to_string()));
        }
        open_archive(fs, path, &meta)
    });

    match probe {
        Ok(mut view) => {
            if let Err(err) = view.close() {
                warn!(path, error = %err, "failed to close probed archive");
            }
            true
        }
        Err(err) => {
            trace!(path, error = %err, "not an archive");
            false
        }
    }
}

impl ZipOpenFs {
    fn stat_impl(&self, path: &str, link: bool) -> Result<Metadata> {
        let result = walk(&*self.inner, "/", &path::split(path), &Stat { link });
        match &result {
            Ok(meta) => debug!(
                path,
                link,
                name = %meta.name,
                size = meta.size,
                is_dir = meta.is_dir,
                "stat"
            ),
            Err(err) => debug!(path, link, error = %err, "stat failed"),
        }
        result
    }
}

impl FileSystem for ZipOpenFs {
    fn open(&self, path: &str) -> Result<Box<dyn FileHandle>> {
        let result = walk(&*self.inner, "/", &path::split(path), &Open);
        if let Err(err) = &result {
            debug!(path, error = %err, "open failed");
        } else {
            debug!(path, "open");
        }
        result
    }

    fn stat(&self, path: &str) -> Result<Metadata> {
        self.stat_impl(path, false)
    }

    fn lstat(&self, path: &str) -> Result<Metadata> {
        self.stat_impl(path, true)
    }

    fn list(&self, path: &str) -> Result<Vec<Metadata>> {
        let result = walk(&*self.inner, "/", &path::split(path), &List);
        match &result {
            Ok(entries) => debug!(path, entries = entries.len(), "list"),
            Err(err) => debug!(path, error = %err, "list failed"),
        }
        result
    }

    fn describe(&self) -> String {
        format!("zip opening fs on ({})", self.inner.describe())
    }
}

impl Close for ZipOpenFs {
    fn close(&mut self) -> Result<()> {
        self.inner.close()
    }
}
