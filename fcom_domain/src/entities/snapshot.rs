// /////////////////////////////////////////////////////////////////////////////
// Fcom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Sync Tree Model
//!
//! In-memory representation of a scanned (or loaded) file tree used by the
//! `sync` operation. A tree is a list of directory blocks in depth-first
//! order; each block carries the entries of one directory. Block paths are
//! relative to the tree root so that two trees rooted at different
//! directories can be compared pairwise.
//!
//! Modification times are kept as Unix milliseconds: the scanner truncates
//! nanoseconds to milliseconds, matching the precision of the snapshot
//! file format.

/// Metadata of one file or directory inside a [`DirBlock`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncEntry {
    /// Entry name, no path components.
    pub name: String,
    pub is_dir: bool,
    pub size: u64,
    /// Modification time, Unix epoch milliseconds.
    pub mtime_ms: i64,
    pub unix_attr: u32,
    pub win_attr: u32,
    pub uid: u32,
    pub gid: u32,
    pub crc32: u32,
}

impl SyncEntry {
    /// True when the permission/attribute/ownership side differs, size and
    /// time aside.
    pub fn attrs_differ(&self, other: &SyncEntry) -> bool {
        self.unix_attr != other.unix_attr
            || self.win_attr != other.win_attr
            || self.uid != other.uid
            || self.gid != other.gid
    }

    /// Modification time truncated to whole seconds.
    pub fn mtime_sec(&self) -> i64 {
        self.mtime_ms.div_euclid(1000)
    }
}

/// The entries of one directory. `path` is relative to the tree root; the
/// root block uses the empty string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirBlock {
    pub path: String,
    pub entries: Vec<SyncEntry>,
}

/// A recorded tree of file metadata: the root path as given by the user
/// plus directory blocks in depth-first order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotTree {
    pub root: String,
    pub blocks: Vec<DirBlock>,
}

impl SnapshotTree {
    pub fn new(root: impl Into<String>) -> Self {
        SnapshotTree {
            root: root.into(),
            blocks: Vec::new(),
        }
    }

    pub fn total_entries(&self) -> usize {
        self.blocks.iter().map(|b| b.entries.len()).sum()
    }

    /// Flattens the tree into `(relative-path, entry)` pairs sorted by
    /// path, the shape the diff engine walks.
    pub fn flatten(&self) -> Vec<(String, SyncEntry)> {
        let mut out = Vec::with_capacity(self.total_entries());
        for block in &self.blocks {
            for e in &block.entries {
                let path = if block.path.is_empty() {
                    e.name.clone()
                } else {
                    format!("{}/{}", block.path, e.name)
                };
                out.push((path, e.clone()));
            }
        }
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, size: u64) -> SyncEntry {
        SyncEntry {
            name: name.into(),
            is_dir: false,
            size,
            mtime_ms: 1_700_000_000_123,
            unix_attr: 0o644,
            win_attr: 0,
            uid: 1000,
            gid: 1000,
            crc32: 0,
        }
    }

    #[test]
    fn test_flatten_joins_block_paths() {
        let tree = SnapshotTree {
            root: "dirA".into(),
            blocks: vec![
                DirBlock {
                    path: String::new(),
                    entries: vec![entry("a.txt", 1)],
                },
                DirBlock {
                    path: "sub".into(),
                    entries: vec![entry("b.txt", 2)],
                },
            ],
        };
        let flat = tree.flatten();
        assert_eq!(flat.len(), 2);
        assert_eq!(flat[0].0, "a.txt");
        assert_eq!(flat[1].0, "sub/b.txt");
    }

    #[test]
    fn test_mtime_second_truncation() {
        let e = entry("x", 0);
        assert_eq!(e.mtime_sec(), 1_700_000_000);
    }

    #[test]
    fn test_attrs_differ_checks_ownership() {
        let a = entry("x", 1);
        let mut b = a.clone();
        assert!(!a.attrs_differ(&b));
        b.uid = 0;
        assert!(a.attrs_differ(&b));
    }
}
