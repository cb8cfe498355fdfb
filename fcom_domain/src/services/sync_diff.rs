// /////////////////////////////////////////////////////////////////////////////
// Fcom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Tree Diff Engine
//!
//! Walks two [`SnapshotTree`]s with parallel cursors over their sorted
//! flattened entries and emits one pair state per path. States compose:
//! two files with equal content metadata but different permission bits
//! report `equal+attr-diff`.
//!
//! ## Rename Detection
//!
//! After the pairwise walk, unmatched entries on both sides are indexed by
//! a properties key (size plus modification time, optionally truncated to
//! seconds) and by plain file name. A left/right candidate pair with equal
//! properties is reported as `moved`; a candidate whose name also matches
//! is preferred over one that merely shares properties. Each entry pairs at
//! most once.

use std::collections::HashMap;

use crate::entities::snapshot::{SnapshotTree, SyncEntry};

/// Combinable pair states reported by the diff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PairState(u32);

impl PairState {
    pub const EQUAL: PairState = PairState(1 << 0);
    pub const ONLY_LEFT: PairState = PairState(1 << 1);
    pub const ONLY_RIGHT: PairState = PairState(1 << 2);
    pub const NEWER: PairState = PairState(1 << 3);
    pub const OLDER: PairState = PairState(1 << 4);
    pub const SMALLER: PairState = PairState(1 << 5);
    pub const LARGER: PairState = PairState(1 << 6);
    pub const ATTR_DIFF: PairState = PairState(1 << 7);
    pub const MOVED: PairState = PairState(1 << 8);

    pub fn with(self, other: PairState) -> PairState {
        PairState(self.0 | other.0)
    }

    pub fn contains(self, other: PairState) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Display for PairState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        const NAMES: &[(PairState, &str)] = &[
            (PairState::EQUAL, "equal"),
            (PairState::ONLY_LEFT, "only-left"),
            (PairState::ONLY_RIGHT, "only-right"),
            (PairState::NEWER, "newer"),
            (PairState::OLDER, "older"),
            (PairState::SMALLER, "smaller"),
            (PairState::LARGER, "larger"),
            (PairState::ATTR_DIFF, "attr-diff"),
            (PairState::MOVED, "moved"),
        ];
        let mut first = true;
        for (bit, name) in NAMES {
            if self.contains(*bit) {
                if !first {
                    write!(f, "+")?;
                }
                write!(f, "{}", name)?;
                first = false;
            }
        }
        if first {
            write!(f, "none")?;
        }
        Ok(())
    }
}

/// One side of a reported pair.
#[derive(Debug, Clone)]
pub struct FlatEntry {
    pub path: String,
    pub entry: SyncEntry,
}

/// One diff result: at least one side is present.
#[derive(Debug, Clone)]
pub struct SyncPair {
    pub left: Option<FlatEntry>,
    pub right: Option<FlatEntry>,
    pub state: PairState,
}

/// Knobs for the comparison.
#[derive(Debug, Clone, Copy)]
pub struct DiffOptions {
    /// Compare modification times at second precision only.
    pub mtime_sec: bool,
    /// Run the rename-detection pass over unmatched entries.
    pub detect_renames: bool,
}

impl Default for DiffOptions {
    fn default() -> Self {
        DiffOptions {
            mtime_sec: false,
            detect_renames: true,
        }
    }
}

fn mtime_of(e: &SyncEntry, opts: &DiffOptions) -> i64 {
    if opts.mtime_sec {
        e.mtime_sec()
    } else {
        e.mtime_ms
    }
}

/// Properties key for rename candidates: CRC32 over size and the bucketed
/// modification time.
fn props_key(e: &SyncEntry, opts: &DiffOptions) -> u32 {
    let mut h = crc32fast::Hasher::new();
    h.update(&e.size.to_le_bytes());
    h.update(&mtime_of(e, opts).to_le_bytes());
    h.finalize()
}

fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn compare_pair(l: &SyncEntry, r: &SyncEntry, opts: &DiffOptions) -> PairState {
    let mut st = PairState::default();

    if l.is_dir && r.is_dir {
        st = st.with(PairState::EQUAL);
    } else {
        let lt = mtime_of(l, opts);
        let rt = mtime_of(r, opts);
        if l.size == r.size && lt == rt {
            st = st.with(PairState::EQUAL);
        } else {
            if l.size < r.size {
                st = st.with(PairState::SMALLER);
            } else if l.size > r.size {
                st = st.with(PairState::LARGER);
            }
            if lt > rt {
                st = st.with(PairState::NEWER);
            } else if lt < rt {
                st = st.with(PairState::OLDER);
            }
        }
    }

    if l.attrs_differ(r) {
        st = st.with(PairState::ATTR_DIFF);
    }
    st
}

/// Compares two trees and returns one [`SyncPair`] per distinct path, plus
/// `moved` pairs discovered by rename detection.
pub fn diff(left: &SnapshotTree, right: &SnapshotTree, opts: &DiffOptions) -> Vec<SyncPair> {
    let lflat = left.flatten();
    let rflat = right.flatten();

    let mut pairs = Vec::new();
    let mut lonely_l: Vec<FlatEntry> = Vec::new();
    let mut lonely_r: Vec<FlatEntry> = Vec::new();

    let (mut i, mut j) = (0usize, 0usize);
    while i < lflat.len() || j < rflat.len() {
        let take_left = match (lflat.get(i), rflat.get(j)) {
            (Some(l), Some(r)) => match l.0.cmp(&r.0) {
                std::cmp::Ordering::Less => Some(true),
                std::cmp::Ordering::Greater => Some(false),
                std::cmp::Ordering::Equal => None,
            },
            (Some(_), None) => Some(true),
            (None, Some(_)) => Some(false),
            (None, None) => break,
        };

        match take_left {
            None => {
                let (lp, le) = &lflat[i];
                let (_, re) = &rflat[j];
                pairs.push(SyncPair {
                    left: Some(FlatEntry {
                        path: lp.clone(),
                        entry: le.clone(),
                    }),
                    right: Some(FlatEntry {
                        path: lp.clone(),
                        entry: re.clone(),
                    }),
                    state: compare_pair(le, re, opts),
                });
                i += 1;
                j += 1;
            }
            Some(true) => {
                let (p, e) = &lflat[i];
                lonely_l.push(FlatEntry {
                    path: p.clone(),
                    entry: e.clone(),
                });
                i += 1;
            }
            Some(false) => {
                let (p, e) = &rflat[j];
                lonely_r.push(FlatEntry {
                    path: p.clone(),
                    entry: e.clone(),
                });
                j += 1;
            }
        }
    }

    if opts.detect_renames {
        detect_moves(&mut lonely_l, &mut lonely_r, opts, &mut pairs);
    }

    for e in lonely_l {
        pairs.push(SyncPair {
            left: Some(e),
            right: None,
            state: PairState::ONLY_LEFT,
        });
    }
    for e in lonely_r {
        pairs.push(SyncPair {
            left: None,
            right: Some(e),
            state: PairState::ONLY_RIGHT,
        });
    }

    pairs
}

/// Pairs unmatched entries with identical properties across the two sides,
/// preferring candidates whose file names also match. Paired entries are
/// removed from the lonely lists.
fn detect_moves(
    lonely_l: &mut Vec<FlatEntry>,
    lonely_r: &mut Vec<FlatEntry>,
    opts: &DiffOptions,
    pairs: &mut Vec<SyncPair>,
) {
    // Index the right side by properties; remember names for preference.
    let mut by_props: HashMap<u32, Vec<usize>> = HashMap::new();
    for (idx, e) in lonely_r.iter().enumerate() {
        if e.entry.is_dir {
            continue;
        }
        by_props.entry(props_key(&e.entry, opts)).or_default().push(idx);
    }

    let mut taken_r: Vec<bool> = vec![false; lonely_r.len()];
    let mut taken_l: Vec<bool> = vec![false; lonely_l.len()];

    for (lidx, le) in lonely_l.iter().enumerate() {
        if le.entry.is_dir {
            continue;
        }
        let Some(candidates) = by_props.get(&props_key(&le.entry, opts)) else {
            continue;
        };

        // Exact property match required; hash collisions are re-checked.
        let mut chosen: Option<usize> = None;
        for &ridx in candidates {
            if taken_r[ridx] {
                continue;
            }
            let re = &lonely_r[ridx];
            if re.entry.size != le.entry.size
                || mtime_of(&re.entry, opts) != mtime_of(&le.entry, opts)
            {
                continue;
            }
            let name_match = file_name(&re.path) == file_name(&le.path);
            if name_match {
                chosen = Some(ridx);
                break;
            }
            if chosen.is_none() {
                chosen = Some(ridx);
            }
        }

        if let Some(ridx) = chosen {
            taken_r[ridx] = true;
            taken_l[lidx] = true;
            pairs.push(SyncPair {
                left: Some(le.clone()),
                right: Some(lonely_r[ridx].clone()),
                state: PairState::MOVED,
            });
        }
    }

    let mut li = 0;
    lonely_l.retain(|_| {
        let keep = !taken_l[li];
        li += 1;
        keep
    });
    let mut ri = 0;
    lonely_r.retain(|_| {
        let keep = !taken_r[ri];
        ri += 1;
        keep
    });
}
