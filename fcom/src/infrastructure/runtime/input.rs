// /////////////////////////////////////////////////////////////////////////////
// Fcom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Input Argument Iterator
//!
//! Expands user-supplied path arguments into a lazy sequence of concrete
//! paths, applying include/exclude wildcards and descending into
//! directories on demand. Finite and not restartable.
//!
//! ## Traversal
//!
//! Arguments form the root of a directory-node stack. A yielded directory
//! is returned *first*; its contents follow depth-first on the next call
//! when recursion is on (or when the operation forces a descend with
//! [`ArgIterator::enter_dir`], the way `list` always shows the contents of
//! its directory arguments). Entries inside a directory are yielded in
//! name order.
//!
//! An argument containing wildcards in its final segment is split: the
//! literal parent becomes the argument and the pattern joins the include
//! set, so `src/*.rs` walks `src` and yields the matching files.
//!
//! A directory that cannot be opened is reported as a warning and
//! skipped; iteration continues with its siblings.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::time::SystemTime;

use fcom_domain::value_objects::input_filter::InputFilter;
use fcom_domain::FcomError;

/// One yielded path with the metadata the stat already produced.
#[derive(Debug, Clone)]
pub struct ArgEntry {
    /// Display path, `/`-joined exactly as built from the argument.
    pub name: String,
    pub is_dir: bool,
    pub size: u64,
    pub mtime: Option<SystemTime>,
    /// Yielded directly from the argument list rather than found inside a
    /// directory.
    pub is_root: bool,
    pub metadata: std::fs::Metadata,
}

impl ArgEntry {
    pub fn path(&self) -> PathBuf {
        PathBuf::from(&self.name)
    }
}

/// Per-call flags for [`ArgIterator::next_with`].
#[derive(Debug, Clone, Copy, Default)]
pub struct NextFlags {
    /// Skip directories even when they match (they are still descended).
    pub files_only: bool,
    /// Look at the next entry without consuming it.
    pub peek: bool,
}

struct DirNode {
    /// Display-path prefix; empty for the argument list itself.
    path: String,
    names: VecDeque<String>,
}

/// Lazy expansion of path arguments. Pipeline-local, never shared across
/// workers.
pub struct ArgIterator {
    stack: Vec<DirNode>,
    filter: InputFilter,
    recurse: bool,
    peeked: Option<ArgEntry>,
    /// Directory to descend into at the start of the next call.
    pending_dir: Option<String>,
    /// Parent directories of wildcard arguments, walked without `-r`.
    forced_parents: Vec<String>,
}

fn has_wildcards(s: &str) -> bool {
    s.contains('*') || s.contains('?')
}

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else if prefix.ends_with('/') {
        format!("{}{}", prefix, name)
    } else {
        format!("{}/{}", prefix, name)
    }
}

impl ArgIterator {
    /// Builds the iterator from raw arguments plus already-compiled
    /// wildcard sets. Arguments whose final segment carries wildcards are
    /// converted into an include pattern over their literal parent.
    pub fn new(
        args: &[PathBuf],
        include: &[String],
        exclude: &[String],
        recurse: bool,
    ) -> Result<Self, FcomError> {
        let mut include: Vec<String> = include.to_vec();
        let mut names = VecDeque::new();
        let mut forced: Vec<String> = Vec::new();

        for arg in args {
            let s = arg.to_string_lossy().into_owned();
            if has_wildcards(&s) {
                let parent = match s.rsplit_once('/') {
                    Some((p, _)) if !has_wildcards(p) => p.to_string(),
                    _ => ".".to_string(),
                };
                include.push(s.clone());
                if !names.contains(&parent) {
                    names.push_back(parent.clone());
                    forced.push(parent);
                }
            } else {
                names.push_back(s);
            }
        }

        let filter = InputFilter::new(&include, exclude)?;
        Ok(ArgIterator {
            stack: vec![DirNode {
                path: String::new(),
                names,
            }],
            filter,
            recurse,
            peeked: None,
            pending_dir: None,
            forced_parents: forced,
        })
    }

    /// Descends into `dir` before the next entry is produced. Operations
    /// use this to show the contents of their directory arguments even
    /// without `-r`.
    pub fn enter_dir(&mut self, dir: &str) {
        self.pending_dir = Some(dir.to_string());
    }

    /// Shared include/exclude filter, for member-level checks.
    pub fn filter(&self) -> &InputFilter {
        &self.filter
    }

    /// Yields the next matching entry, or `None` when every argument is
    /// exhausted.
    pub fn next_with(&mut self, flags: NextFlags) -> Option<ArgEntry> {
        loop {
            let entry = match self.peeked.take() {
                Some(e) => e,
                None => self.advance()?,
            };
            if flags.files_only && entry.is_dir {
                continue;
            }
            if flags.peek {
                self.peeked = Some(entry.clone());
            }
            return Some(entry);
        }
    }

    /// Convenience: next entry of any kind.
    pub fn next_entry(&mut self) -> Option<ArgEntry> {
        self.next_with(NextFlags::default())
    }

    /// Convenience: next regular file.
    pub fn next_file(&mut self) -> Option<ArgEntry> {
        self.next_with(NextFlags {
            files_only: true,
            ..Default::default()
        })
    }

    fn advance(&mut self) -> Option<ArgEntry> {
        loop {
            if let Some(dir) = self.pending_dir.take() {
                self.enter(&dir);
            }

            let node = self.stack.last_mut()?;
            let Some(name) = node.names.pop_front() else {
                self.stack.pop();
                if self.stack.is_empty() {
                    return None;
                }
                continue;
            };

            let is_root = node.path.is_empty();
            let full = join(&node.path, &name);

            let metadata = match std::fs::symlink_metadata(&full) {
                Ok(m) => m,
                Err(e) => {
                    tracing::warn!("stat: {}: {}", full, e);
                    continue;
                }
            };
            let is_dir = metadata.is_dir();

            if !self.filter.allows(&full, is_dir) {
                continue;
            }

            if is_dir && (self.recurse || (is_root && self.forced_parents.contains(&full))) {
                self.pending_dir = Some(full.clone());
            }

            return Some(ArgEntry {
                name: full,
                is_dir,
                size: metadata.len(),
                mtime: metadata.modified().ok(),
                is_root,
                metadata,
            });
        }
    }

    fn enter(&mut self, dir: &str) {
        let rd = match std::fs::read_dir(dir) {
            Ok(rd) => rd,
            Err(e) => {
                tracing::warn!("open directory: {}: {}", dir, e);
                return;
            }
        };
        let mut names: Vec<String> = rd
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        tracing::debug!(dir, entries = names.len(), "opened directory");
        self.stack.push(DirNode {
            path: dir.trim_end_matches('/').to_string(),
            names: names.into(),
        });
    }
}
