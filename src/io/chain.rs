//! Resource chains: one close call that releases a whole stack of handles.
//!
//! Opening `outer.zip/inner.zip/leaf.txt` leaves a trail of live resources:
//! the backing file of `outer.zip`, its archive view, the entry stream for
//! `inner.zip`, the view over that, and finally the `leaf.txt` stream. Each
//! step wraps the handle it returns together with the handles it depends on,
//! so the caller's single close unwinds everything, innermost handle first.

use std::io::{self, Read, Seek, SeekFrom};

use tracing::trace;

use super::Close;
use crate::error::Result;
use crate::vfs::{FileSystem, Metadata};

/// Something that can sit at the tail of a chain.
pub type Dependent = Box<dyn Close + Send + Sync>;

/// `primary` plus resources that must die with it.
///
/// All operations other than [`close`](Close::close) go to `primary`.
pub struct Chained<T> {
    primary: T,
    dependents: Vec<Dependent>,
}

/// Binds `dependents` to `primary`: closing the result closes `primary`
/// first, then each dependent in order.
pub fn wrap<T>(primary: T, dependents: Vec<Dependent>) -> Chained<T> {
    Chained {
        primary,
        dependents,
    }
}

impl<T: Close> Close for Chained<T> {
    /// Every member is closed even if an earlier one fails; the first error
    /// is the one reported.
    fn close(&mut self) -> Result<()> {
        let mut result = self.primary.close();
        for (i, dependent) in self.dependents.iter_mut().enumerate() {
            let closed = dependent.close();
            trace!(dependent = i, ok = closed.is_ok(), "closed chained resource");
            if result.is_ok() {
                result = closed;
            }
        }
        result
    }
}

impl<T: Read> Read for Chained<T> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.primary.read(buf)
    }
}

impl<T: Seek> Seek for Chained<T> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.primary.seek(pos)
    }
}

impl<T: FileSystem> FileSystem for Chained<T> {
    fn open(&self, path: &str) -> Result<Box<dyn crate::FileHandle>> {
        self.primary.open(path)
    }

    fn stat(&self, path: &str) -> Result<Metadata> {
        self.primary.stat(path)
    }

    fn lstat(&self, path: &str) -> Result<Metadata> {
        self.primary.lstat(path)
    }

    fn list(&self, path: &str) -> Result<Vec<Metadata>> {
        self.primary.list(path)
    }

    fn describe(&self) -> String {
        self.primary.describe()
    }
}
