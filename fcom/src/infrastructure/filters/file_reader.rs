// /////////////////////////////////////////////////////////////////////////////
// Fcom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # File Reader Filter
//!
//! Head filter of most pipelines. On `open` it opens the file named by the
//! command's input descriptor (or a path fixed at construction, the form
//! archive drivers insert per member source) and fills in size, mtime and
//! attributes. Each `process` call produces up to one buffer of data.
//!
//! Honors the downstream seek request: when `input.seek` is set, the
//! reader re-positions and continues from there. Recently read chunks sit
//! in a small cached buffer set, so the short backward hops of archive
//! parsers (volume descriptor, then directory records, then data) are
//! served without re-reading. At end of file it emits `OutputDone`, which
//! for a zero-length file happens on the very first call.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::PathBuf;

use fcom_domain::services::filter::{Filter, FilterStatus, OpenResult};
use fcom_domain::{Command, FcomError};

use super::attr_from_metadata;
use super::fbuf::BufSet;

/// Cached read buffers per reader.
const NBUFS: usize = 2;

pub struct FileReader {
    /// Explicit source; falls back to `cmd.input.path`.
    path: Option<PathBuf>,
    file: Option<File>,
    cache: Option<BufSet>,
    /// The OS file cursor must move here before the next physical read.
    resync: Option<u64>,
}

impl FileReader {
    pub fn new() -> Self {
        FileReader {
            path: None,
            file: None,
            cache: None,
            resync: None,
        }
    }

    /// Reader over a fixed path, independent of the command descriptor.
    pub fn for_path(path: impl Into<PathBuf>) -> Self {
        FileReader {
            path: Some(path.into()),
            file: None,
            cache: None,
            resync: None,
        }
    }
}

impl Default for FileReader {
    fn default() -> Self {
        Self::new()
    }
}

impl Filter for FileReader {
    fn name(&self) -> &str {
        "core.file-in"
    }

    fn open(&mut self, cmd: &mut Command) -> Result<OpenResult, FcomError> {
        let path = match self.path.clone().or_else(|| cmd.input.path.clone()) {
            Some(p) => p,
            None => return Err(FcomError::Usage("no input file".into())),
        };

        let file =
            File::open(&path).map_err(|e| FcomError::sys_path("open", path.display(), &e))?;
        let md = file
            .metadata()
            .map_err(|e| FcomError::sys_path("stat", path.display(), &e))?;

        cmd.input.size = md.len();
        cmd.input.mtime = md.modified().ok();
        cmd.input.attr = attr_from_metadata(&md);
        cmd.input.offset = 0;
        cmd.input.eof = false;
        cmd.input.path = Some(path);

        self.file = Some(file);
        self.cache = Some(BufSet::new(NBUFS, cmd.buffer_size));
        Ok(OpenResult::Open)
    }

    fn process(&mut self, cmd: &mut Command) -> Result<FilterStatus, FcomError> {
        if let Some(target) = cmd.input.seek.take() {
            cmd.input.eof = false;
            tracing::trace!(offset = target, "reader re-seek");

            // Backward hops often land in a chunk we just produced.
            if let Some(cache) = self.cache.as_mut() {
                if let Some(b) = cache.find(target) {
                    let rel = (target - b.off) as usize;
                    let data = b.data[rel..].to_vec();
                    cmd.input.offset = target + data.len() as u64;
                    self.resync = Some(cmd.input.offset);
                    cmd.data_out = data;
                    return Ok(FilterStatus::Data);
                }
            }
            self.resync = Some(target);
            cmd.input.offset = target;
        }

        let file = self
            .file
            .as_mut()
            .ok_or_else(|| FcomError::Internal("file reader not open".into()))?;

        if let Some(pos) = self.resync.take() {
            file.seek(SeekFrom::Start(pos))
                .map_err(|e| FcomError::Sys(format!("seek to {}: {}", pos, e)))?;
            cmd.input.offset = pos;
        }

        let mut buf = vec![0u8; cmd.buffer_size];
        let n = file
            .read(&mut buf)
            .map_err(|e| FcomError::Sys(format!("read: {}", e)))?;
        if n == 0 {
            cmd.input.eof = true;
            return Ok(FilterStatus::OutputDone);
        }
        buf.truncate(n);
        if let Some(cache) = self.cache.as_mut() {
            cache.store(cmd.input.offset, &buf);
        }
        cmd.input.offset += n as u64;
        cmd.data_out = buf;
        Ok(FilterStatus::Data)
    }

    fn close(&mut self, _cmd: &mut Command) {
        if let Some(cache) = &self.cache {
            if cache.hits + cache.misses > 0 {
                tracing::debug!(hits = cache.hits, misses = cache.misses, "read cache stats");
            }
        }
        self.file = None;
        self.cache = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_reader(path: &std::path::Path, buffer_size: usize) -> Vec<u8> {
        let mut cmd = Command::new("test");
        cmd.buffer_size = buffer_size;
        let mut r = FileReader::for_path(path);
        assert_eq!(r.open(&mut cmd).unwrap(), OpenResult::Open);
        let mut out = Vec::new();
        loop {
            match r.process(&mut cmd).unwrap() {
                FilterStatus::Data => out.append(&mut cmd.data_out),
                FilterStatus::OutputDone => break,
                s => panic!("unexpected status {:?}", s),
            }
        }
        r.close(&mut cmd);
        out
    }

    #[test]
    fn test_reads_whole_file_in_chunks() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("data.bin");
        std::fs::write(&path, b"0123456789").unwrap();
        assert_eq!(run_reader(&path, 4), b"0123456789");
    }

    #[test]
    fn test_zero_length_file_is_output_done_first() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("empty");
        std::fs::write(&path, b"").unwrap();
        let mut cmd = Command::new("test");
        let mut r = FileReader::for_path(&path);
        r.open(&mut cmd).unwrap();
        assert_eq!(r.process(&mut cmd).unwrap(), FilterStatus::OutputDone);
        assert!(cmd.input.eof);
    }

    #[test]
    fn test_seek_request_repositions() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("data.bin");
        std::fs::write(&path, b"abcdefgh").unwrap();
        let mut cmd = Command::new("test");
        cmd.buffer_size = 4;
        let mut r = FileReader::for_path(&path);
        r.open(&mut cmd).unwrap();
        assert_eq!(r.process(&mut cmd).unwrap(), FilterStatus::Data);
        assert_eq!(cmd.take_out(), b"abcd");
        // Outside the cached chunk: physical re-read.
        cmd.input.seek = Some(6);
        assert_eq!(r.process(&mut cmd).unwrap(), FilterStatus::Data);
        assert_eq!(cmd.take_out(), b"gh");
        assert_eq!(cmd.input.offset, 8);
    }

    #[test]
    fn test_backward_seek_served_from_cache() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("data.bin");
        std::fs::write(&path, b"abcdefgh").unwrap();
        let mut cmd = Command::new("test");
        cmd.buffer_size = 4;
        let mut r = FileReader::for_path(&path);
        r.open(&mut cmd).unwrap();
        assert_eq!(r.process(&mut cmd).unwrap(), FilterStatus::Data);
        assert_eq!(cmd.take_out(), b"abcd");

        // Hop back into the chunk just produced: a cache hit.
        cmd.input.seek = Some(2);
        assert_eq!(r.process(&mut cmd).unwrap(), FilterStatus::Data);
        assert_eq!(cmd.take_out(), b"cd");
        assert_eq!(r.cache.as_ref().unwrap().hits, 1);

        // The stream continues seamlessly after the cached tail.
        assert_eq!(r.process(&mut cmd).unwrap(), FilterStatus::Data);
        assert_eq!(cmd.take_out(), b"efgh");
        assert_eq!(r.process(&mut cmd).unwrap(), FilterStatus::OutputDone);
    }

    #[test]
    fn test_missing_file_is_system_error() {
        let mut cmd = Command::new("test");
        let mut r = FileReader::for_path("/no/such/file");
        assert!(r.open(&mut cmd).unwrap_err().is_system());
    }

    #[test]
    fn test_open_fills_input_descriptor() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("x");
        std::fs::write(&path, b"abc").unwrap();
        let mut cmd = Command::new("test");
        let mut r = FileReader::for_path(&path);
        r.open(&mut cmd).unwrap();
        assert_eq!(cmd.input.size, 3);
        assert!(cmd.input.mtime.is_some());
        assert!(!cmd.input.attr.is_dir());
    }
}
