//! Fixtures shared by the integration tests: an in-memory zip writer and a
//! filesystem wrapper that counts handles left open.
//!
//! Every archive view, entry stream and shared reader opened by a walk sits
//! on top of one physical handle from the wrapped filesystem. A handle that
//! has been closed but not yet dropped is therefore still owned by some
//! layer in between, which is what [`Counters::resident`] reports.

#![allow(dead_code)]

use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicIsize, AtomicUsize, Ordering};

use flate2::Compression;
use flate2::write::DeflateEncoder;

use zipserve::{Close, Error, FileHandle, FileSystem, Metadata, Result};

/// 2024-05-17 12:30:30 in MS-DOS format.
pub const DOS_DATE: u16 = ((2024 - 1980) << 9) | (5 << 5) | 17;
pub const DOS_TIME: u16 = (12 << 11) | (30 << 5) | (30 / 2);

/// Builds a zip archive in memory.
#[derive(Default)]
pub struct ZipBuilder {
    data: Vec<u8>,
    central: Vec<u8>,
    count: u16,
}

impl ZipBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stored(self, name: &str, content: &[u8]) -> Self {
        self.entry(name, content, false, None)
    }

    pub fn deflated(self, name: &str, content: &[u8]) -> Self {
        self.entry(name, content, true, None)
    }

    /// A stored entry carrying unix permission bits.
    pub fn with_mode(self, name: &str, content: &[u8], mode: u32) -> Self {
        self.entry(name, content, false, Some(mode))
    }

    /// An explicit directory entry; `name` must end with `/`.
    pub fn dir(self, name: &str) -> Self {
        self.entry(name, b"", false, None)
    }

    fn entry(mut self, name: &str, content: &[u8], deflate: bool, mode: Option<u32>) -> Self {
        let compressed = if deflate {
            let mut enc = DeflateEncoder::new(Vec::new(), Compression::default());
            enc.write_all(content).unwrap();
            enc.finish().unwrap()
        } else {
            content.to_vec()
        };
        let method: u16 = if deflate { 8 } else { 0 };
        let crc = crc32fast::hash(content);
        let offset = self.data.len() as u32;
        let (made_by, external) = match mode {
            Some(mode) => ((3u16 << 8) | 20, mode << 16),
            None if name.ends_with('/') => (20, 0x10),
            None => (20, 0),
        };

        let d = &mut self.data;
        d.extend_from_slice(b"PK\x03\x04");
        d.extend_from_slice(&20u16.to_le_bytes());
        d.extend_from_slice(&0u16.to_le_bytes());
        d.extend_from_slice(&method.to_le_bytes());
        d.extend_from_slice(&DOS_TIME.to_le_bytes());
        d.extend_from_slice(&DOS_DATE.to_le_bytes());
        d.extend_from_slice(&crc.to_le_bytes());
        d.extend_from_slice(&(compressed.len() as u32).to_le_bytes());
        d.extend_from_slice(&(content.len() as u32).to_le_bytes());
        d.extend_from_slice(&(name.len() as u16).to_le_bytes());
        d.extend_from_slice(&0u16.to_le_bytes());
        d.extend_from_slice(name.as_bytes());
        d.extend_from_slice(&compressed);

        let c = &mut self.central;
        c.extend_from_slice(b"PK\x01\x02");
        c.extend_from_slice(&made_by.to_le_bytes());
        c.extend_from_slice(&20u16.to_le_bytes());
        c.extend_from_slice(&0u16.to_le_bytes());
        c.extend_from_slice(&method.to_le_bytes());
        c.extend_from_slice(&DOS_TIME.to_le_bytes());
        c.extend_from_slice(&DOS_DATE.to_le_bytes());
        c.extend_from_slice(&crc.to_le_bytes());
        c.extend_from_slice(&(compressed.len() as u32).to_le_bytes());
        c.extend_from_slice(&(content.len() as u32).to_le_bytes());
        c.extend_from_slice(&(name.len() as u16).to_le_bytes());
        c.extend_from_slice(&0u16.to_le_bytes()); // extra
        c.extend_from_slice(&0u16.to_le_bytes()); // comment
        c.extend_from_slice(&0u16.to_le_bytes()); // disk
        c.extend_from_slice(&0u16.to_le_bytes()); // internal attrs
        c.extend_from_slice(&external.to_le_bytes());
        c.extend_from_slice(&offset.to_le_bytes());
        c.extend_from_slice(name.as_bytes());

        self.count += 1;
        self
    }

    pub fn finish(self) -> Vec<u8> {
        let mut out = self.data;
        let cd_offset = out.len() as u32;
        out.extend_from_slice(&self.central);
        out.extend_from_slice(b"PK\x05\x06");
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&self.count.to_le_bytes());
        out.extend_from_slice(&self.count.to_le_bytes());
        out.extend_from_slice(&(self.central.len() as u32).to_le_bytes());
        out.extend_from_slice(&cd_offset.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out
    }
}

/// Handle counters shared between a [`CountingFs`] and the test.
#[derive(Clone, Default)]
pub struct Counters {
    opened: Arc<AtomicUsize>,
    live: Arc<AtomicIsize>,
    resident: Arc<AtomicIsize>,
}

impl Counters {
    /// Handles opened so far.
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Handles opened and not yet closed.
    pub fn live(&self) -> isize {
        self.live.load(Ordering::SeqCst)
    }

    /// Handles not yet dropped, closed or not.
    pub fn resident(&self) -> isize {
        self.resident.load(Ordering::SeqCst)
    }
}

/// Wraps a filesystem and counts the handles it hands out.
pub struct CountingFs<F> {
    inner: F,
    counters: Counters,
}

impl<F: FileSystem> CountingFs<F> {
    pub fn new(inner: F) -> Self {
        Self {
            inner,
            counters: Counters::default(),
        }
    }

    pub fn counters(&self) -> Counters {
        self.counters.clone()
    }
}

struct Counted {
    inner: Box<dyn FileHandle>,
    live: Arc<AtomicIsize>,
    resident: Arc<AtomicIsize>,
    closed: bool,
}

impl Drop for Counted {
    fn drop(&mut self) {
        self.resident.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Read for Counted {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Seek for Counted {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.inner.seek(pos)
    }
}

impl Close for Counted {
    fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
        self.inner.close()
    }
}

impl<F: FileSystem> FileSystem for CountingFs<F> {
    fn open(&self, path: &str) -> Result<Box<dyn FileHandle>> {
        let inner = self.inner.open(path)?;
        self.counters.opened.fetch_add(1, Ordering::SeqCst);
        self.counters.live.fetch_add(1, Ordering::SeqCst);
        self.counters.resident.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(Counted {
            inner,
            live: self.counters.live.clone(),
            resident: self.counters.resident.clone(),
            closed: false,
        }))
    }

    fn stat(&self, path: &str) -> Result<Metadata> {
        self.inner.stat(path)
    }

    fn lstat(&self, path: &str) -> Result<Metadata> {
        self.inner.lstat(path)
    }

    fn list(&self, path: &str) -> Result<Vec<Metadata>> {
        self.inner.list(path)
    }

    fn describe(&self) -> String {
        format!("counting({})", self.inner.describe())
    }
}

impl<F: FileSystem> Close for CountingFs<F> {
    fn close(&mut self) -> Result<()> {
        self.inner.close()
    }
}

pub fn write(root: &Path, name: &str, content: &[u8]) {
    let path = root.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, content).unwrap();
}

/// The zip containing `x.txt`.
pub fn simple_zip() -> Vec<u8> {
    ZipBuilder::new().stored("x.txt", b"hello from x").finish()
}

/// `inner.zip` (holding `leaf.txt` and `deep/note.md`) stored inside `outer.zip`.
pub fn nested_zip() -> Vec<u8> {
    let inner = ZipBuilder::new()
        .deflated("leaf.txt", &leaf_content())
        .stored("deep/note.md", b"# note\n")
        .finish();
    ZipBuilder::new()
        .stored("inner.zip", &inner)
        .stored("readme.txt", b"outer readme")
        .finish()
}

/// Three archives deep, every level deflated:
/// `middle.zip/core.zip/core.bin` plus `middle.zip/core.zip/more/tail.txt`.
pub fn deflated_nest_zip() -> Vec<u8> {
    let core = ZipBuilder::new()
        .deflated("core.bin", &core_content())
        .deflated("more/tail.txt", b"tail")
        .finish();
    let middle = ZipBuilder::new()
        .deflated("notes.txt", b"middle notes")
        .deflated("core.zip", &core)
        .finish();
    ZipBuilder::new().deflated("middle.zip", &middle).finish()
}

/// Compresses well, but not to nothing.
pub fn core_content() -> Vec<u8> {
    (0..20_000u32)
        .flat_map(|i| (i.wrapping_mul(2_654_435_761) >> 24).to_le_bytes())
        .collect()
}

pub fn leaf_content() -> Vec<u8> {
    (0..5_000u32)
        .flat_map(|i| format!("line {i}\n").into_bytes())
        .collect()
}

pub fn read_all(fs: &dyn FileSystem, path: &str) -> Vec<u8> {
    let mut file = fs.open(path).unwrap();
    let mut out = Vec::new();
    file.read_to_end(&mut out).unwrap();
    file.close().unwrap();
    out
}

/// The error from opening `path`, which is expected to fail.
pub fn open_err(fs: &dyn FileSystem, path: &str) -> Error {
    match fs.open(path) {
        Ok(_) => panic!("{path} unexpectedly opened"),
        Err(err) => err,
    }
}

pub fn assert_not_found(err: &Error) {
    assert!(err.is_not_found(), "expected a not-found error, got {err:?}");
}
