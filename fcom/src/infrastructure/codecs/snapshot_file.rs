// /////////////////////////////////////////////////////////////////////////////
// Fcom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Snapshot File Format and Tree Scanner
//!
//! Text format of recorded file trees: one block per directory,
//!
//! ```text
//! # fcom file tree snapshot
//! b "dirA" {
//! f "file.txt" 1024 100644/20 1000:1000 2024-01-02+03:04:05.678 0
//! d "sub" 0 40755/10 1000:1000 2024-01-02+03:04:05.000 0
//! }
//! b "dirA/sub" {
//! }
//! ```
//!
//! Lines end with CRLF, the encoding is UTF-8, attributes are written as
//! `<unix octal>/<win hex>`, and `"` / `\` inside names are escaped with
//! a backslash. Times are local, millisecond precision.
//!
//! The scanner builds the in-memory tree the same way the sync engine
//! consumes it: directory blocks in depth-first order, entries sorted by
//! name, mtimes truncated to milliseconds.

use std::io::Write;
use std::path::Path;
use std::time::SystemTime;

use chrono::TimeZone;

use fcom_domain::entities::snapshot::{DirBlock, SnapshotTree, SyncEntry};
use fcom_domain::FcomError;

pub const SNAPSHOT_HEADER: &str = "# fcom file tree snapshot";
const CRLF: &str = "\r\n";

fn escape_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            c => out.push(c),
        }
    }
    out
}

fn unescape_name(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some(e) => out.push(e),
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}

fn mtime_string(ms: i64) -> String {
    chrono::Local
        .timestamp_millis_opt(ms)
        .single()
        .map(|dt| dt.format("%Y-%m-%d+%H:%M:%S%.3f").to_string())
        .unwrap_or_else(|| "1970-01-01+00:00:00.000".to_string())
}

fn parse_mtime(s: &str) -> Result<i64, FcomError> {
    let naive = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d+%H:%M:%S%.3f")
        .map_err(|e| FcomError::Format(format!("snapshot: bad time '{}': {}", s, e)))?;
    chrono::Local
        .from_local_datetime(&naive)
        .single()
        .or_else(|| chrono::Local.from_local_datetime(&naive).earliest())
        .map(|dt| dt.timestamp_millis())
        .ok_or_else(|| FcomError::Format(format!("snapshot: ambiguous time '{}'", s)))
}

/// Serializes a tree in the snapshot text format.
pub fn write_snapshot(tree: &SnapshotTree, out: &mut impl Write) -> Result<(), FcomError> {
    let w = |e: std::io::Error| FcomError::Sys(format!("snapshot write: {}", e));
    write!(out, "{}{}", SNAPSHOT_HEADER, CRLF).map_err(w)?;
    for block in &tree.blocks {
        let full = if block.path.is_empty() {
            tree.root.clone()
        } else {
            format!("{}/{}", tree.root, block.path)
        };
        write!(out, "b \"{}\" {{{}", escape_name(&full), CRLF).map_err(w)?;
        for e in &block.entries {
            write!(
                out,
                "{} \"{}\" {} {:o}/{:x} {}:{} {} {}{}",
                if e.is_dir { 'd' } else { 'f' },
                escape_name(&e.name),
                e.size,
                e.unix_attr,
                e.win_attr,
                e.uid,
                e.gid,
                mtime_string(e.mtime_ms),
                e.crc32,
                CRLF
            )
            .map_err(w)?;
        }
        write!(out, "}}{}", CRLF).map_err(w)?;
    }
    Ok(())
}

/// Splits one entry line into the quoted name and the remaining fields.
fn split_name(line: &str) -> Result<(String, &str), FcomError> {
    let rest = line
        .strip_prefix('"')
        .ok_or_else(|| FcomError::Format(format!("snapshot: expected quoted name: {}", line)))?;
    let mut end = None;
    let bytes = rest.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'"' => {
                end = Some(i);
                break;
            }
            _ => i += 1,
        }
    }
    let end = end.ok_or_else(|| FcomError::Format("snapshot: unterminated name".into()))?;
    Ok((unescape_name(&rest[..end]), rest[end + 1..].trim_start()))
}

/// Parses the snapshot text format back into a tree.
pub fn parse_snapshot(text: &str) -> Result<SnapshotTree, FcomError> {
    let mut lines = text.lines().map(str::trim_end);
    match lines.next() {
        Some(first) if first.trim() == SNAPSHOT_HEADER => {}
        _ => {
            return Err(FcomError::Format(
                "snapshot: missing header line".into(),
            ));
        }
    }

    let mut tree = SnapshotTree::default();
    let mut current: Option<DirBlock> = None;

    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(rest) = line.strip_prefix("b ") {
            if let Some(block) = current.take() {
                tree.blocks.push(block);
            }
            let (full, tail) = split_name(rest)?;
            if tail != "{" {
                return Err(FcomError::Format(format!(
                    "snapshot: malformed block header: {}",
                    line
                )));
            }
            let rel = if tree.blocks.is_empty() && tree.root.is_empty() {
                tree.root = full.clone();
                String::new()
            } else {
                full.strip_prefix(&format!("{}/", tree.root))
                    .map(str::to_string)
                    .unwrap_or(full)
            };
            current = Some(DirBlock {
                path: rel,
                entries: Vec::new(),
            });
            continue;
        }
        if line == "}" {
            if let Some(block) = current.take() {
                tree.blocks.push(block);
            }
            continue;
        }

        let (kind, rest) = line
            .split_once(' ')
            .ok_or_else(|| FcomError::Format(format!("snapshot: bad entry: {}", line)))?;
        let is_dir = match kind {
            "f" => false,
            "d" => true,
            other => {
                return Err(FcomError::Format(format!(
                    "snapshot: unknown entry type '{}'",
                    other
                )));
            }
        };
        let (name, fields) = split_name(rest)?;
        let parts: Vec<&str> = fields.split_whitespace().collect();
        if parts.len() != 5 {
            return Err(FcomError::Format(format!(
                "snapshot: expected 5 fields after name: {}",
                line
            )));
        }
        let bad = |what: &str| FcomError::Format(format!("snapshot: bad {}: {}", what, line));
        let size: u64 = parts[0].parse().map_err(|_| bad("size"))?;
        let (unix_s, win_s) = parts[1].split_once('/').ok_or_else(|| bad("attrs"))?;
        let unix_attr = u32::from_str_radix(unix_s, 8).map_err(|_| bad("attrs"))?;
        let win_attr = u32::from_str_radix(win_s, 16).map_err(|_| bad("attrs"))?;
        let (uid_s, gid_s) = parts[2].split_once(':').ok_or_else(|| bad("owner"))?;
        let uid: u32 = uid_s.parse().map_err(|_| bad("owner"))?;
        let gid: u32 = gid_s.parse().map_err(|_| bad("owner"))?;
        let mtime_ms = parse_mtime(parts[3])?;
        let crc32: u32 = parts[4].parse().map_err(|_| bad("crc"))?;

        let block = current
            .as_mut()
            .ok_or_else(|| FcomError::Format("snapshot: entry outside a block".into()))?;
        block.entries.push(SyncEntry {
            name,
            is_dir,
            size,
            mtime_ms,
            unix_attr,
            win_attr,
            uid,
            gid,
            crc32,
        });
    }
    if let Some(block) = current.take() {
        tree.blocks.push(block);
    }
    Ok(tree)
}

fn mtime_ms_of(md: &std::fs::Metadata) -> i64 {
    md.modified()
        .ok()
        .and_then(|t| t.duration_since(SystemTime::UNIX_EPOCH).ok())
        .map(|d| (d.as_millis() as i64))
        .unwrap_or(0)
}

fn entry_from_metadata(name: String, md: &std::fs::Metadata, crc32: u32) -> SyncEntry {
    #[cfg(unix)]
    let (unix_attr, uid, gid) = {
        use std::os::unix::fs::MetadataExt;
        (md.mode(), md.uid(), md.gid())
    };
    #[cfg(not(unix))]
    let (unix_attr, uid, gid) = (if md.is_dir() { 0o40755 } else { 0o644 }, 0u32, 0u32);

    let win_attr = if md.is_dir() { 0x10 } else { 0x20 };

    SyncEntry {
        name,
        is_dir: md.is_dir(),
        size: if md.is_dir() { 0 } else { md.len() },
        mtime_ms: mtime_ms_of(md),
        unix_attr,
        win_attr,
        uid,
        gid,
        crc32,
    }
}

/// Scans a directory tree into snapshot form. With `with_crc`, file
/// contents are read and their CRC32 recorded.
pub fn scan_tree(root: &Path, with_crc: bool) -> Result<SnapshotTree, FcomError> {
    let root_str = root.to_string_lossy().into_owned();
    let mut tree = SnapshotTree::new(root_str);

    // Depth-first over relative directory paths.
    let mut pending: Vec<String> = vec![String::new()];
    while let Some(rel) = pending.pop() {
        let abs = if rel.is_empty() {
            root.to_path_buf()
        } else {
            root.join(&rel)
        };
        let rd = match std::fs::read_dir(&abs) {
            Ok(rd) => rd,
            Err(e) => {
                tracing::warn!("open directory: {}: {}", abs.display(), e);
                continue;
            }
        };

        let mut names: Vec<String> = rd
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();

        let mut block = DirBlock {
            path: rel.clone(),
            entries: Vec::new(),
        };
        let mut subdirs = Vec::new();
        for name in names {
            let path = abs.join(&name);
            let md = match std::fs::symlink_metadata(&path) {
                Ok(md) => md,
                Err(e) => {
                    tracing::warn!("stat: {}: {}", path.display(), e);
                    continue;
                }
            };
            let crc = if with_crc && md.is_file() {
                let data = std::fs::read(&path)
                    .map_err(|e| FcomError::sys_path("read", path.display(), &e))?;
                let mut h = crc32fast::Hasher::new();
                h.update(&data);
                h.finalize()
            } else {
                0
            };
            if md.is_dir() {
                let sub_rel = if rel.is_empty() {
                    name.clone()
                } else {
                    format!("{}/{}", rel, name)
                };
                subdirs.push(sub_rel);
            }
            block.entries.push(entry_from_metadata(name, &md, crc));
        }
        tree.blocks.push(block);
        // Reverse so the stack pops them in name order.
        for sub in subdirs.into_iter().rev() {
            pending.push(sub);
        }
    }
    Ok(tree)
}
