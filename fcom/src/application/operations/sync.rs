// /////////////////////////////////////////////////////////////////////////////
// Fcom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # `sync` - tree snapshots and comparison
//!
//! Two modes:
//!
//! - `fcom sync DIR --snapshot -o FILE` scans `DIR` and writes its
//!   snapshot.
//! - `fcom sync LEFT RIGHT` compares two trees and prints one state line
//!   per differing pair. Either side may be a directory or a snapshot
//!   file (recognized by its header line).
//!
//! Comparison states compose (`equal+attr-diff`); rename detection pairs
//! unmatched entries by size and modification time, preferring same-name
//! candidates.

use std::io::Read;
use std::path::Path;

use clap::Parser;

use fcom_domain::entities::snapshot::SnapshotTree;
use fcom_domain::services::filter::{Filter, FilterStatus};
use fcom_domain::services::sync_diff::{diff, DiffOptions, PairState, SyncPair};
use fcom_domain::{Command, FcomError};

use crate::infrastructure::codecs::snapshot_file::{
    parse_snapshot, scan_tree, write_snapshot, SNAPSHOT_HEADER,
};
use crate::infrastructure::filters::FileWriter;
use crate::infrastructure::runtime::registry::OperationTemplate;
use crate::infrastructure::runtime::RuntimeHandle;

use super::{parse_op_args, BuiltinModule, CommonOpts};

const HELP: &str = "\
Synchronize file trees: record snapshots, compare directories.
Usage:
  `fcom sync` DIR --snapshot -o FILE
  `fcom sync` LEFT RIGHT [OPTIONS]

OPTIONS:
    `--snapshot`           Write a snapshot of the tree
    `--crc`                Include file CRC32 in the snapshot
    `--mtime-sec`          Compare times at second precision
    `--no-renames`         Disable rename detection
    `--all`                Also print equal pairs
";

#[derive(Debug, Parser)]
#[command(name = "sync", disable_help_flag = true)]
struct SyncArgs {
    #[command(flatten)]
    common: CommonOpts,

    /// Write a snapshot instead of comparing.
    #[arg(long = "snapshot")]
    snapshot: bool,

    /// Record CRC32 of file contents while scanning.
    #[arg(long = "crc")]
    crc: bool,

    /// Compare modification times at second precision.
    #[arg(long = "mtime-sec")]
    mtime_sec: bool,

    /// Disable rename detection.
    #[arg(long = "no-renames")]
    no_renames: bool,

    /// Print equal pairs too.
    #[arg(long = "all")]
    all: bool,
}

/// Loads one side: a snapshot file (sniffed by header) or a directory.
fn load_side(path: &Path, with_crc: bool) -> Result<SnapshotTree, FcomError> {
    let md = std::fs::metadata(path)
        .map_err(|e| FcomError::sys_path("stat", path.display(), &e))?;
    if md.is_dir() {
        return scan_tree(path, with_crc);
    }

    let mut head = [0u8; 32];
    let mut file = std::fs::File::open(path)
        .map_err(|e| FcomError::sys_path("open", path.display(), &e))?;
    let n = file
        .read(&mut head)
        .map_err(|e| FcomError::Sys(format!("read: {}", e)))?;
    if !String::from_utf8_lossy(&head[..n]).starts_with(SNAPSHOT_HEADER) {
        return Err(FcomError::Format(format!(
            "{}: neither a directory nor a snapshot file",
            path.display()
        )));
    }
    let text = std::fs::read_to_string(path)
        .map_err(|e| FcomError::sys_path("read", path.display(), &e))?;
    parse_snapshot(&text)
}

fn pair_line(pair: &SyncPair) -> String {
    let left = pair.left.as_ref().map(|e| e.path.as_str()).unwrap_or("-");
    let right = pair.right.as_ref().map(|e| e.path.as_str()).unwrap_or("-");
    format!("{:<24} {}  <>  {}", pair.state.to_string(), left, right)
}

enum Mode {
    Snapshot { with_crc: bool },
    Diff { opts: DiffOptions, show_all: bool },
}

struct SyncDriver {
    mode: Mode,
    done: bool,
}

impl Filter for SyncDriver {
    fn name(&self) -> &str {
        "sync"
    }

    fn process(&mut self, cmd: &mut Command) -> Result<FilterStatus, FcomError> {
        if self.done {
            return Ok(FilterStatus::Fin);
        }
        self.done = true;

        match &self.mode {
            Mode::Snapshot { with_crc } => {
                let root = cmd.paths[0].clone();
                let tree = scan_tree(&root, *with_crc)?;
                tracing::info!(
                    entries = tree.total_entries(),
                    "scanned {}",
                    root.display()
                );
                let mut out = Vec::new();
                write_snapshot(&tree, &mut out)?;
                cmd.data_out = out;
                Ok(FilterStatus::OutputDone)
            }

            Mode::Diff { opts, show_all } => {
                let left = load_side(&cmd.paths[0], false)?;
                let right = load_side(&cmd.paths[1], false)?;
                let pairs = diff(&left, &right, opts);

                let mut differing = 0usize;
                for pair in &pairs {
                    let equal_only = pair.state == PairState::EQUAL;
                    if equal_only && !show_all {
                        continue;
                    }
                    if !equal_only {
                        differing += 1;
                    }
                    println!("{}", pair_line(pair));
                }
                tracing::info!(
                    total = pairs.len(),
                    differing,
                    "compared {} and {}",
                    cmd.paths[0].display(),
                    cmd.paths[1].display()
                );
                Ok(FilterStatus::Fin)
            }
        }
    }
}

fn build(
    _rt: &RuntimeHandle,
    cmd: &mut Command,
    args: &[String],
) -> Result<Vec<Box<dyn Filter>>, FcomError> {
    let parsed: SyncArgs = parse_op_args("sync", args)?;
    parsed.common.apply(cmd)?;

    if parsed.snapshot {
        if parsed.common.inputs.len() != 1 {
            return Err(FcomError::Usage("sync --snapshot expects one directory".into()));
        }
        if parsed.common.output.is_none() {
            cmd.output.stdout = true;
        }
        return Ok(vec![
            Box::new(SyncDriver {
                mode: Mode::Snapshot {
                    with_crc: parsed.crc,
                },
                done: false,
            }),
            Box::new(FileWriter::new()),
        ]);
    }

    if parsed.common.inputs.len() != 2 {
        return Err(FcomError::Usage("sync expects LEFT and RIGHT".into()));
    }
    Ok(vec![Box::new(SyncDriver {
        mode: Mode::Diff {
            opts: DiffOptions {
                mtime_sec: parsed.mtime_sec,
                detect_renames: !parsed.no_renames,
            },
            show_all: parsed.all,
        },
        done: false,
    })])
}

static SYNC_OP: OperationTemplate = OperationTemplate {
    name: "sync",
    help: HELP,
    build,
};

pub static MODULE: BuiltinModule = BuiltinModule {
    name: "sync",
    ops: &[&SYNC_OP],
    filters: &[],
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_side_rejects_plain_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let f = tmp.path().join("not-a-snapshot.txt");
        std::fs::write(&f, "hello").unwrap();
        assert!(load_side(&f, false).is_err());
    }

    #[test]
    fn test_load_side_reads_snapshot_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        std::fs::write(tmp.path().join("x.bin"), b"x").unwrap();
        let tree = scan_tree(tmp.path(), false).unwrap();
        let mut buf = Vec::new();
        write_snapshot(&tree, &mut buf).unwrap();
        let snap_path = tmp.path().join("snap.txt");
        std::fs::write(&snap_path, &buf).unwrap();

        let loaded = load_side(&snap_path, false).unwrap();
        // The snapshot now contains x.bin and snap.txt was written after
        // the scan, so only compare the recorded entries.
        assert_eq!(loaded.blocks.len(), tree.blocks.len());
        assert!(loaded.blocks[0].entries.iter().any(|e| e.name == "x.bin"));
    }
}
