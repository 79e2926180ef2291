use std::io::{self, Read, Seek, SeekFrom};
use std::sync::Arc;

use crc32fast::Hasher;
use flate2::read::DeflateDecoder;

use super::result::{ZipError, ZipResult};
use super::structures::{CompressionMethod, ZipFileEntry};
use crate::error::{Error, Result};
use crate::io::{Close, ReadAt};

/// A window of a [`ReadAt`] source, read sequentially.
struct Section {
    reader: Arc<dyn ReadAt>,
    start: u64,
    len: u64,
    position: u64,
}

impl Read for Section {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.position >= self.len {
            return Ok(0);
        }
        let limit = ((self.len - self.position) as usize).min(buf.len());
        let n = self
            .reader
            .read_at(self.start + self.position, &mut buf[..limit])?;
        self.position += n as u64;
        Ok(n)
    }
}

enum Decoder {
    Stored(Section),
    Deflate(DeflateDecoder<Section>),
}

/// Seekable reader over one entry's decompressed bytes.
///
/// Stored entries seek for free. Deflate entries can only be decoded front
/// to back, so seeking forward decompresses and discards, and seeking
/// backward starts over from the beginning of the entry.
///
/// A read that reaches the end after consuming the whole entry in order
/// checks the CRC-32 from the central directory; a mismatch is reported as
/// `InvalidData`.
pub struct EntryReader {
    reader: Arc<dyn ReadAt>,
    method: CompressionMethod,
    data_start: u64,
    compressed_size: u64,
    size: u64,
    crc32: u32,
    decoder: Decoder,
    position: u64,
    /// Present while everything up to `position` has been read in order.
    hasher: Option<Hasher>,
    closed: bool,
}

impl EntryReader {
    pub(crate) fn new(
        reader: Arc<dyn ReadAt>,
        entry: &ZipFileEntry,
        data_start: u64,
    ) -> ZipResult<Self> {
        match entry.compression_method {
            CompressionMethod::Stored | CompressionMethod::Deflate => {}
            CompressionMethod::Unknown(method) => {
                return Err(ZipError::UnsupportedCompressionMethod(method));
            }
        }
        let mut reader = Self {
            decoder: Decoder::Stored(Section {
                reader: reader.clone(),
                start: data_start,
                len: 0,
                position: 0,
            }),
            reader,
            method: entry.compression_method,
            data_start,
            compressed_size: entry.compressed_size,
            size: entry.uncompressed_size,
            crc32: entry.crc32,
            position: 0,
            hasher: None,
            closed: false,
        };
        reader.restart();
        Ok(reader)
    }

    fn restart(&mut self) {
        let section = Section {
            reader: self.reader.clone(),
            start: self.data_start,
            len: self.compressed_size,
            position: 0,
        };
        self.decoder = match self.method {
            CompressionMethod::Deflate => Decoder::Deflate(DeflateDecoder::new(section)),
            _ => Decoder::Stored(section),
        };
        self.position = 0;
        self.hasher = Some(Hasher::new());
    }

    fn check_open(&self) -> io::Result<()> {
        if self.closed {
            Err(io::Error::other("read from a closed archive entry"))
        } else {
            Ok(())
        }
    }
}

impl Read for EntryReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.check_open()?;
        if buf.is_empty() {
            return Ok(0);
        }

        let n = match &mut self.decoder {
            Decoder::Stored(section) => section.read(buf)?,
            Decoder::Deflate(decoder) => decoder.read(buf)?,
        };

        if n == 0 {
            if self.position < self.size {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "archive entry is truncated",
                ));
            }
            if let Some(hasher) = &self.hasher
                && self.position == self.size
                && hasher.clone().finalize() != self.crc32
            {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "archive entry checksum mismatch",
                ));
            }
            return Ok(0);
        }

        self.position += n as u64;
        if let Some(hasher) = &mut self.hasher {
            hasher.update(&buf[..n]);
        }
        Ok(n)
    }
}

impl Seek for EntryReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.check_open()?;
        let target = match pos {
            SeekFrom::Start(n) => Some(n),
            SeekFrom::End(d) => self.size.checked_add_signed(d),
            SeekFrom::Current(d) => self.position.checked_add_signed(d),
        }
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                "invalid seek to a negative or overflowing position",
            )
        })?;

        if target == self.position {
            return Ok(target);
        }

        if let Decoder::Stored(section) = &mut self.decoder {
            section.position = target;
            self.position = target;
            self.hasher = (target == 0).then(Hasher::new);
            return Ok(target);
        }

        if target < self.position {
            self.restart();
        }
        let skip = target.min(self.size).saturating_sub(self.position);
        io::copy(&mut Read::by_ref(self).take(skip), &mut io::sink())?;
        if target > self.size {
            self.position = target;
            self.hasher = None;
        }
        Ok(target)
    }
}

impl Close for EntryReader {
    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Err(Error::Closed);
        }
        self.closed = true;
        Ok(())
    }
}
