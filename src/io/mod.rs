//! Byte-source plumbing shared by the filesystem layers.
//!
//! - [`ReadAt`]: random access by offset, what the zip decoder reads through.
//! - [`ReadSeekerAt`]: turns a seek-then-read stream into a [`ReadAt`].
//! - [`Close`] / [`FileHandle`]: explicitly released resources.
//! - [`chain`]: binds dependent resources to the one that keeps them alive.

pub mod chain;
mod seek;

pub use chain::{Chained, wrap};
pub use seek::ReadSeekerAt;

use std::io::{self, Read, Seek};

use crate::error::Result;

/// A resource that must be released explicitly.
///
/// Closing twice is not a bug the implementor has to guard against with a
/// panic; it simply reports whatever the second release reports (usually
/// [`Error::Closed`](crate::Error::Closed)).
pub trait Close {
    fn close(&mut self) -> Result<()>;
}

impl<T: Close + ?Sized> Close for Box<T> {
    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

/// A seekable, closeable byte stream handed out by [`FileSystem::open`](crate::FileSystem::open).
pub trait FileHandle: Read + Seek + Close + Send {}

impl<T: Read + Seek + Close + Send + ?Sized> FileHandle for T {}

/// Trait for random access reading from a data source
pub trait ReadAt: Send + Sync {
    /// Read data at the specified offset into the buffer.
    ///
    /// Like [`Read::read`], this may return fewer bytes than requested.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize>;

    /// Fill the whole buffer from `offset`, failing with `UnexpectedEof`
    /// if the source ends first.
    fn read_exact_at(&self, mut offset: u64, mut buf: &mut [u8]) -> io::Result<()> {
        while !buf.is_empty() {
            match self.read_at(offset, buf) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "failed to fill whole buffer",
                    ));
                }
                Ok(n) => {
                    offset += n as u64;
                    buf = &mut buf[n..];
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Hands out at most two bytes per call.
    struct Trickle(Vec<u8>);

    impl ReadAt for Trickle {
        fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
            let start = (offset as usize).min(self.0.len());
            let n = buf.len().min(2).min(self.0.len() - start);
            buf[..n].copy_from_slice(&self.0[start..start + n]);
            Ok(n)
        }
    }

    #[test]
    fn read_exact_at_loops_over_short_reads() {
        let source = Trickle(b"hello world".to_vec());
        let mut buf = [0u8; 5];
        source.read_exact_at(6, &mut buf).unwrap();
        assert_eq!(&buf, b"world");
    }

    #[test]
    fn read_exact_at_reports_eof() {
        let source = Trickle(b"abc".to_vec());
        let mut buf = [0u8; 4];
        let err = source.read_exact_at(0, &mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }
}
