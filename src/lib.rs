//! # zipserve
//!
//! A read-only virtual filesystem on which zip archives look like folders,
//! and an HTTP server on top of it.
//!
//! Any path may cross archive boundaries: `/data/outer.zip/inner.zip/leaf.txt`
//! is resolved by decoding `outer.zip`, then decoding `inner.zip` from inside
//! it, then opening `leaf.txt`. Nothing is extracted to disk, and every
//! stream and archive view opened along the way is released by closing the
//! one handle the caller gets back.
//!
//! ## Layers
//!
//! - [`io`]: random access over seekable streams, and resource chains
//! - [`vfs`]: the [`FileSystem`] contract, the physical [`OsFs`] and the
//!   archive-transparent [`ZipOpenFs`]
//! - [`zip`]: the ZIP decoder and its archive view
//! - [`server`]: the HTTP front end
//!
//! ## Example
//!
//! ```no_run
//! use std::io::Read;
//! use zipserve::{Close, FileSystem, OsFs, ZipOpenFs};
//!
//! fn main() -> zipserve::Result<()> {
//!     let fs = ZipOpenFs::new(OsFs::new("/srv/data"));
//!
//!     for entry in fs.list("/bundle.zip")? {
//!         println!("{}{}", entry.name, if entry.is_dir { "/" } else { "" });
//!     }
//!
//!     let mut file = fs.open("/bundle.zip/docs/readme.txt")?;
//!     let mut text = String::new();
//!     file.read_to_string(&mut text)?;
//!     file.close()?;
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod error;
pub mod io;
pub mod server;
pub mod vfs;
pub mod zip;

pub use cli::Cli;
pub use error::{Error, Result};
pub use io::{Close, FileHandle, ReadAt, ReadSeekerAt};
pub use vfs::{FileSystem, Metadata, OsFs, ZipOpenFs, masquerade};
