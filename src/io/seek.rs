use std::io::{self, Read, Seek, SeekFrom};
use std::sync::Arc;

use parking_lot::Mutex;

use super::{Close, ReadAt};
use crate::error::{Error, Result};

/// Random access over a stream that only knows how to seek and read.
///
/// Every [`read_at`](ReadAt::read_at) takes a lock, seeks, then reads, so two
/// callers never race on the shared cursor. The price is that reads are
/// serialized: callers expecting parallel random access get one read at a
/// time. Real parallelism needs a handle per reader or a positional read
/// primitive instead.
///
/// The adapter owns the stream. Once wrapped, the stream's cursor belongs to
/// the adapter and nothing else may seek or read it.
pub struct ReadSeekerAt<S> {
    inner: Mutex<Option<S>>,
}

impl<S: Read + Seek + Close + Send> ReadSeekerAt<S> {
    pub fn new(stream: S) -> Self {
        Self {
            inner: Mutex::new(Some(stream)),
        }
    }

    /// Releases the wrapped stream. Later reads fail, a second close
    /// returns [`Error::Closed`].
    pub fn close(&self) -> Result<()> {
        match self.inner.lock().take() {
            Some(mut stream) => stream.close(),
            None => Err(Error::Closed),
        }
    }
}

impl<S: Read + Seek + Close + Send> ReadAt for ReadSeekerAt<S> {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        let mut guard = self.inner.lock();
        let stream = guard
            .as_mut()
            .ok_or_else(|| io::Error::other("read from a closed stream"))?;
        stream.seek(SeekFrom::Start(offset))?;
        stream.read(buf)
    }
}

impl<S: Read + Seek + Close + Send> Close for Arc<ReadSeekerAt<S>> {
    fn close(&mut self) -> Result<()> {
        ReadSeekerAt::close(self)
    }
}
