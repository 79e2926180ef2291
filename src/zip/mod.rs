//! ZIP archive decoding.
//!
//! This module reads ZIP archives through any [`ReadAt`](crate::io::ReadAt)
//! source and presents them as a read-only filesystem.
//!
//! ## Architecture
//!
//! - [`structures`]: Data structures representing ZIP format elements (EOCD, file headers, etc.)
//! - [`parser`]: Low-level parsing of ZIP structures from raw bytes
//! - [`archive`]: The central directory organized as a directory tree
//! - [`entry`]: Seekable readers over individual entries
//! - [`fs`]: The archive as a [`FileSystem`](crate::FileSystem)
//!
//! ## ZIP Format Overview
//!
//! A ZIP file consists of:
//! 1. Local file headers and compressed data for each file
//! 2. Central Directory with metadata for all files
//! 3. End of Central Directory (EOCD) record at the end
//!
//! This implementation reads the EOCD first (from the end of the file),
//! then the Central Directory, which allows listing files without reading
//! the entire archive.
//!
//! ## Supported Features
//!
//! - Standard ZIP format (PKZIP APPNOTE 6.3.x compatible)
//! - ZIP64 extensions for files > 4GB
//! - STORED (no compression) method
//! - DEFLATE compression method
//!
//! ## Limitations
//!
//! - No encryption support
//! - No multi-disk archive support
//! - No BZIP2, LZMA, or other compression methods
//! - No archives prefixed with foreign data (self-extractors)

pub mod archive;
pub mod entry;
pub mod fs;
pub mod parser;
mod result;
pub mod structures;

pub use archive::{Node, ZipArchive};
pub use entry::EntryReader;
pub use fs::ArchiveFs;
pub use parser::ZipParser;
pub use result::{ZipError, ZipResult};
pub use structures::*;
