use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::{debug, warn};

use super::entry::EntryReader;
use super::parser::ZipParser;
use super::result::{ZipError, ZipResult};
use super::structures::ZipFileEntry;
use crate::io::ReadAt;

/// A node of the archive's directory tree.
#[derive(Debug)]
pub enum Node {
    File(ZipFileEntry),
    Directory {
        /// The explicit `dir/` entry, if the archive has one.
        entry: Option<ZipFileEntry>,
        /// Base names of the direct children.
        children: BTreeSet<String>,
    },
}

/// A decoded ZIP archive: its central directory organized as a tree.
///
/// ZIP doesn't promise that parent directories have entries of their own,
/// so every ancestor of an entry gets an implicit directory node.
pub struct ZipArchive {
    parser: ZipParser,
    /// Keyed by path relative to the archive root; `""` is the root.
    nodes: BTreeMap<String, Node>,
}

impl ZipArchive {
    /// Decodes the central directory of the `size`-byte archive in `reader`.
    pub fn new(reader: Arc<dyn ReadAt>, size: u64) -> ZipResult<Self> {
        let parser = ZipParser::new(reader, size);
        let entries = parser.list_files()?;
        debug!(entries = entries.len(), size, "decoded zip central directory");

        let mut nodes = BTreeMap::new();
        nodes.insert(String::new(), Node::Directory {
            entry: None,
            children: BTreeSet::new(),
        });
        for entry in entries {
            insert(&mut nodes, entry);
        }

        Ok(Self { parser, nodes })
    }

    /// Looks up a slash-delimited path, leading slash optional.
    pub fn lookup(&self, path: &str) -> Option<&Node> {
        self.nodes.get(&key(path))
    }

    /// Base names and nodes of the direct children of the directory at `path`.
    pub fn children(&self, path: &str) -> ZipResult<Vec<(&str, &Node)>> {
        let dir = key(path);
        match self.nodes.get(&dir) {
            Some(Node::Directory { children, .. }) => Ok(children
                .iter()
                .filter_map(|name| {
                    let node = self.nodes.get(&child_key(&dir, name))?;
                    Some((name.as_str(), node))
                })
                .collect()),
            Some(Node::File(_)) => Err(ZipError::InvalidArchive("not a directory")),
            None => Err(ZipError::NoSuchFile(path.to_string())),
        }
    }

    /// Opens a seekable reader over the decompressed contents of `entry`.
    pub fn open(&self, entry: &ZipFileEntry) -> ZipResult<EntryReader> {
        if entry.is_encrypted() {
            return Err(ZipError::UnsupportedArchive(format!(
                "Can't read encrypted file {}",
                entry.file_name
            )));
        }
        let data_offset = self.parser.get_data_offset(entry)?;
        EntryReader::new(self.parser.reader().clone(), entry, data_offset)
    }

    /// Number of nodes, implicit directories and the root included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }
}

fn key(path: &str) -> String {
    path.split('/')
        .filter(|s| !s.is_empty() && *s != ".")
        .collect::<Vec<_>>()
        .join("/")
}

fn child_key(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{dir}/{name}")
    }
}

/// Places `entry` in the tree, creating implicit parents as needed.
fn insert(nodes: &mut BTreeMap<String, Node>, entry: ZipFileEntry) {
    let segments: Vec<&str> = entry
        .file_name
        .split('/')
        .filter(|s| !s.is_empty() && *s != ".")
        .collect();

    if segments.contains(&"..") {
        warn!(name = %entry.file_name, "skipping entry that escapes the archive root");
        return;
    }
    let Some((base, parents)) = segments.split_last() else {
        return;
    };

    let mut dir = String::new();
    for parent in parents {
        let child = child_key(&dir, parent);
        if !link_child(nodes, &dir, parent) {
            warn!(name = %entry.file_name, "skipping entry below a file");
            return;
        }
        nodes.entry(child.clone()).or_insert_with(|| Node::Directory {
            entry: None,
            children: BTreeSet::new(),
        });
        dir = child;
    }

    let path = child_key(&dir, base);
    if !link_child(nodes, &dir, base) {
        warn!(name = %entry.file_name, "skipping entry below a file");
        return;
    }

    match (nodes.get_mut(&path), entry.is_directory) {
        (Some(Node::Directory { entry: slot, .. }), true) => *slot = Some(entry),
        (Some(Node::Directory { .. }), false) => {
            warn!(name = %entry.file_name, "skipping file that shadows a directory");
        }
        (Some(Node::File(_)), true) => {
            warn!(name = %entry.file_name, "skipping directory that shadows a file");
        }
        (_, true) => {
            nodes.insert(path, Node::Directory {
                entry: Some(entry),
                children: BTreeSet::new(),
            });
        }
        (_, false) => {
            // Duplicates: the later entry wins.
            nodes.insert(path, Node::File(entry));
        }
    }
}

/// Records `name` as a child of `dir`. False if `dir` is a file.
fn link_child(nodes: &mut BTreeMap<String, Node>, dir: &str, name: &str) -> bool {
    match nodes.get_mut(dir) {
        Some(Node::Directory { children, .. }) => {
            children.insert(name.to_string());
            true
        }
        _ => false,
    }
}
