// /////////////////////////////////////////////////////////////////////////////
// Fcom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # File Writer Filter
//!
//! Tail filter of most pipelines. Writes the buffered stream to the path
//! named by the output descriptor, or to stdout when the command says so.
//!
//! The writer opens lazily: archive readers set the output path per member
//! after the chain already exists. A change of `output.path` finalizes the
//! current file (flush, mtime, permissions) and starts the next one, which
//! is how one writer instance handles a whole archive's worth of members.
//! Member names containing `/` become nested directories.
//!
//! Out-of-order chunks arrive with `output.seek` set; a cached buffer set
//! absorbs them and whole runs are written back with explicit positioning
//! (archive writers backfilling central directories, bottom-up BMP rows).

use std::fs::File;
use std::io::{Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::time::SystemTime;

use fcom_domain::entities::command::FileAttr;
use fcom_domain::services::filter::{Filter, FilterStatus, OpenResult};
use fcom_domain::{Command, FcomError};

use super::fbuf::BufSet;

/// Buffers per writer; enough for a header backfill plus a data run.
const NBUFS: usize = 4;

pub struct FileWriter {
    stdout: bool,
    file: Option<File>,
    cur_path: Option<PathBuf>,
    cur_mtime: Option<SystemTime>,
    cur_attr: FileAttr,
    cur_attr_win: bool,
    /// Next sequential output offset.
    off: u64,
    bufs: Option<BufSet>,
}

impl FileWriter {
    pub fn new() -> Self {
        FileWriter {
            stdout: false,
            file: None,
            cur_path: None,
            cur_mtime: None,
            cur_attr: FileAttr::default(),
            cur_attr_win: false,
            off: 0,
            bufs: None,
        }
    }

    fn bufs(&mut self, buffer_size: usize) -> &mut BufSet {
        self.bufs
            .get_or_insert_with(|| BufSet::new(NBUFS, buffer_size))
    }

    fn write_at(&mut self, off: u64, data: &[u8]) -> Result<(), FcomError> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| FcomError::Internal("file writer not open".into()))?;
        file.seek(SeekFrom::Start(off))
            .map_err(|e| FcomError::Sys(format!("seek to {}: {}", off, e)))?;
        file.write_all(data)
            .map_err(|e| FcomError::Sys(format!("write: {}", e)))?;
        Ok(())
    }

    fn open_target(&mut self, cmd: &mut Command) -> Result<(), FcomError> {
        let Some(path) = cmd.output.path.clone() else {
            return Err(FcomError::Usage("no output file".into()));
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| FcomError::sys_path("mkdir", parent.display(), &e))?;
            }
        }

        self.cur_mtime = cmd.output.mtime;
        self.cur_attr = cmd.output.attr;
        self.cur_attr_win = cmd.output.attr_win;
        self.off = 0;

        if cmd.output.attr.is_dir() {
            // Directory member: create it, no byte stream follows.
            std::fs::create_dir_all(&path)
                .map_err(|e| FcomError::sys_path("mkdir", path.display(), &e))?;
            self.cur_path = Some(path);
            self.file = None;
            return Ok(());
        }

        tracing::debug!(path = %path.display(), "creating output file");
        let file =
            File::create(&path).map_err(|e| FcomError::sys_path("create", path.display(), &e))?;
        self.file = Some(file);
        self.cur_path = Some(path);
        Ok(())
    }

    fn finalize(&mut self) -> Result<(), FcomError> {
        let Some(path) = self.cur_path.take() else {
            return Ok(());
        };

        if self.file.is_some() {
            let flushes = self.bufs.as_mut().map(|b| b.drain()).unwrap_or_default();
            for fl in flushes {
                self.write_at(fl.off, &fl.data)?;
            }
            if let Some(file) = self.file.take() {
                file.sync_data().ok();
            }
        }

        if let Some(bufs) = &self.bufs {
            if bufs.hits + bufs.misses > 0 {
                tracing::debug!(hits = bufs.hits, misses = bufs.misses, "write buffer stats");
            }
        }

        #[cfg(unix)]
        if !self.cur_attr_win && self.cur_attr.unix_mode != 0 && !self.cur_attr.is_dir() {
            use std::os::unix::fs::PermissionsExt;
            let perm = std::fs::Permissions::from_mode(self.cur_attr.unix_mode & 0o7777);
            std::fs::set_permissions(&path, perm)
                .map_err(|e| FcomError::sys_path("chmod", path.display(), &e))?;
        }

        if let Some(mtime) = self.cur_mtime.take() {
            let ft = filetime::FileTime::from_system_time(mtime);
            filetime::set_file_mtime(&path, ft)
                .map_err(|e| FcomError::sys_path("set mtime", path.display(), &e))?;
        }

        Ok(())
    }
}

impl Default for FileWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl Filter for FileWriter {
    fn name(&self) -> &str {
        "core.file-out"
    }

    fn open(&mut self, cmd: &mut Command) -> Result<OpenResult, FcomError> {
        self.stdout = cmd.output.stdout;
        Ok(OpenResult::Open)
    }

    fn process(&mut self, cmd: &mut Command) -> Result<FilterStatus, FcomError> {
        let data = std::mem::take(&mut cmd.data_in);

        if self.stdout {
            let out = std::io::stdout();
            let mut lock = out.lock();
            lock.write_all(&data)
                .map_err(|e| FcomError::Sys(format!("stdout: {}", e)))?;
            if cmd.in_last {
                lock.flush().ok();
                return Ok(FilterStatus::Done);
            }
            return Ok(FilterStatus::More);
        }

        // A new output path finalizes the previous member.
        if cmd.output.path.is_some() && cmd.output.path != self.cur_path {
            self.finalize()?;
            self.open_target(cmd)?;
        } else if self.cur_path.is_none() {
            if cmd.output.path.is_none() && data.is_empty() && !cmd.in_last {
                return Ok(FilterStatus::More);
            }
            self.open_target(cmd)?;
        }

        if self.file.is_some() && (!data.is_empty() || cmd.output.seek.is_some()) {
            let target = cmd.output.seek.take().unwrap_or(self.off);
            let buffer_size = cmd.buffer_size;
            let mut rest: &[u8] = &data;
            let mut off = target;
            while !rest.is_empty() {
                let before = rest.len();
                let flush = self.bufs(buffer_size).write(&mut rest, off);
                off += (before - rest.len()) as u64;
                if let Some(fl) = flush {
                    self.write_at(fl.off, &fl.data)?;
                }
            }
            self.off = target + data.len() as u64;
        }

        if cmd.output.flush {
            cmd.output.flush = false;
            self.finalize()?;
        }

        if cmd.in_last {
            self.finalize()?;
            return Ok(FilterStatus::Done);
        }
        Ok(FilterStatus::More)
    }

    fn close(&mut self, _cmd: &mut Command) {
        if let Err(e) = self.finalize() {
            tracing::warn!("finalize output: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmd_for(path: &std::path::Path) -> Command {
        let mut cmd = Command::new("test");
        cmd.output.path = Some(path.to_path_buf());
        cmd
    }

    #[test]
    fn test_sequential_write() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("out.bin");
        let mut cmd = cmd_for(&path);
        let mut w = FileWriter::new();
        w.open(&mut cmd).unwrap();

        cmd.data_in = b"hello ".to_vec();
        assert_eq!(w.process(&mut cmd).unwrap(), FilterStatus::More);
        cmd.data_in = b"world".to_vec();
        cmd.in_last = true;
        assert_eq!(w.process(&mut cmd).unwrap(), FilterStatus::Done);
        w.close(&mut cmd);

        assert_eq!(std::fs::read(&path).unwrap(), b"hello world");
    }

    #[test]
    fn test_backfill_seek() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("out.bin");
        let mut cmd = cmd_for(&path);
        cmd.buffer_size = 8;
        let mut w = FileWriter::new();
        w.open(&mut cmd).unwrap();

        // Placeholder header, then data, then backfilled header.
        cmd.data_in = vec![0u8; 4];
        w.process(&mut cmd).unwrap();
        cmd.data_in = b"data".to_vec();
        w.process(&mut cmd).unwrap();
        cmd.data_in = b"HDR!".to_vec();
        cmd.output.seek = Some(0);
        w.process(&mut cmd).unwrap();
        cmd.data_in = Vec::new();
        cmd.in_last = true;
        assert_eq!(w.process(&mut cmd).unwrap(), FilterStatus::Done);

        assert_eq!(std::fs::read(&path).unwrap(), b"HDR!data");
    }

    #[test]
    fn test_member_switch_on_path_change() {
        let tmp = tempfile::TempDir::new().unwrap();
        let a = tmp.path().join("a.txt");
        let b = tmp.path().join("sub/dir/b.txt");
        let mut cmd = cmd_for(&a);
        let mut w = FileWriter::new();
        w.open(&mut cmd).unwrap();

        cmd.data_in = b"first".to_vec();
        w.process(&mut cmd).unwrap();

        // Next member: nested path, created on demand.
        cmd.output.path = Some(b.clone());
        cmd.data_in = b"second".to_vec();
        w.process(&mut cmd).unwrap();
        cmd.data_in = Vec::new();
        cmd.in_last = true;
        w.process(&mut cmd).unwrap();
        w.close(&mut cmd);

        assert_eq!(std::fs::read(&a).unwrap(), b"first");
        assert_eq!(std::fs::read(&b).unwrap(), b"second");
    }

    #[test]
    fn test_mtime_applied_on_finalize() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("dated.bin");
        let mut cmd = cmd_for(&path);
        let stamp = SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(1_000_000_000);
        cmd.output.mtime = Some(stamp);
        let mut w = FileWriter::new();
        w.open(&mut cmd).unwrap();
        cmd.data_in = b"x".to_vec();
        cmd.in_last = true;
        w.process(&mut cmd).unwrap();
        w.close(&mut cmd);

        let md = std::fs::metadata(&path).unwrap();
        let got = md.modified().unwrap();
        assert_eq!(
            got.duration_since(SystemTime::UNIX_EPOCH).unwrap().as_secs(),
            1_000_000_000
        );
    }

    #[test]
    fn test_empty_stream_creates_empty_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("empty");
        let mut cmd = cmd_for(&path);
        let mut w = FileWriter::new();
        w.open(&mut cmd).unwrap();
        cmd.in_last = true;
        assert_eq!(w.process(&mut cmd).unwrap(), FilterStatus::Done);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);
    }

    #[test]
    fn test_directory_member() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("a/dir");
        let mut cmd = cmd_for(&path);
        cmd.output.attr = FileAttr::directory();
        let mut w = FileWriter::new();
        w.open(&mut cmd).unwrap();
        cmd.in_last = true;
        w.process(&mut cmd).unwrap();
        assert!(path.is_dir());
    }
}
