// /////////////////////////////////////////////////////////////////////////////
// Fcom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # ZIP Container Filters
//!
//! The packer is the two-phase archive writer: phase one enumerates the
//! argument paths and records them as members with metadata, phase two
//! streams each member's content through the zip encoder. The encoder
//! wants a `Write + Seek` sink (local headers and the central directory
//! are backfilled), so it writes into a shared segment sink that turns
//! positioned writes into `(offset, bytes)` runs; the filter drains those
//! runs down the pipeline as data chunks with an output seek request,
//! which the file writer's cached buffers absorb.
//!
//! The unpacker owns its descriptor: the central directory lives at the
//! end of the file, so the reader acquires the file and performs its own
//! reads and seeks instead of bouncing an upstream reader around.
//!
//! Members smaller than [`STORE_THRESHOLD`] bytes are stored uncompressed
//! regardless of the requested method; below that size every method's
//! container overhead exceeds any possible gain.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

use chrono::{Datelike, Local, TimeZone, Timelike};
use parking_lot::Mutex;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use fcom_domain::entities::command::FileAttr;
use fcom_domain::services::filter::{Filter, FilterSpec, FilterStatus, OpenResult};
use fcom_domain::value_objects::input_filter::InputFilter;
use fcom_domain::{Command, FcomError};

use crate::infrastructure::filters::FileReader;
use crate::infrastructure::runtime::input::ArgIterator;

/// Below this member size compression is never worth the container
/// overhead; such members are always stored.
pub const STORE_THRESHOLD: u64 = 32;

/// Requested member compression method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ZipMethod {
    Store,
    #[default]
    Deflate,
    Zstd,
}

impl std::str::FromStr for ZipMethod {
    type Err = FcomError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "store" => Ok(ZipMethod::Store),
            "deflate" => Ok(ZipMethod::Deflate),
            "zstd" => Ok(ZipMethod::Zstd),
            _ => Err(FcomError::Usage(format!("unknown zip method: {}", s))),
        }
    }
}

impl ZipMethod {
    fn to_zip(self) -> CompressionMethod {
        match self {
            ZipMethod::Store => CompressionMethod::Stored,
            ZipMethod::Deflate => CompressionMethod::Deflated,
            ZipMethod::Zstd => CompressionMethod::Zstd,
        }
    }
}

#[derive(Default)]
struct SinkInner {
    pos: u64,
    end: u64,
    segments: VecDeque<(u64, Vec<u8>)>,
}

/// `Write + Seek` sink shared between the zip encoder and the filter, so
/// segments can be drained while members are still being written.
#[derive(Clone, Default)]
struct SegmentSink {
    inner: Arc<Mutex<SinkInner>>,
}

impl SegmentSink {
    fn pop(&self) -> Option<(u64, Vec<u8>)> {
        self.inner.lock().segments.pop_front()
    }
}

impl Write for SegmentSink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut inner = self.inner.lock();
        let pos = inner.pos;
        match inner.segments.back_mut() {
            Some((off, data)) if *off + data.len() as u64 == pos => {
                data.extend_from_slice(buf);
            }
            _ => {
                inner.segments.push_back((pos, buf.to_vec()));
            }
        }
        inner.pos += buf.len() as u64;
        inner.end = inner.end.max(inner.pos);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Seek for SegmentSink {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        let mut inner = self.inner.lock();
        let target = match pos {
            SeekFrom::Start(o) => o as i64,
            SeekFrom::End(d) => inner.end as i64 + d,
            SeekFrom::Current(d) => inner.pos as i64 + d,
        };
        if target < 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "seek before start",
            ));
        }
        inner.pos = target as u64;
        Ok(inner.pos)
    }
}

fn zip_datetime(t: SystemTime) -> Option<zip::DateTime> {
    let local = chrono::DateTime::<Local>::from(t);
    zip::DateTime::from_date_and_time(
        local.year() as u16,
        local.month() as u8,
        local.day() as u8,
        local.hour() as u8,
        local.minute() as u8,
        local.second() as u8,
    )
    .ok()
}

fn member_name(raw: &str) -> String {
    raw.trim_start_matches("./").trim_start_matches('/').to_string()
}

struct Member {
    path: PathBuf,
    name: String,
    is_dir: bool,
    size: u64,
    mtime: Option<SystemTime>,
    unix_mode: u32,
}

enum PackState {
    Collect,
    NewMember,
    MemberData,
    Finish,
    Done,
}

/// Two-phase zip packer.
pub struct ZipPack {
    method: ZipMethod,
    members: Vec<Member>,
    at: usize,
    state: PackState,
    writer: Option<ZipWriter<SegmentSink>>,
    sink: SegmentSink,
    args: Option<ArgIterator>,
}

impl ZipPack {
    pub fn new(args: ArgIterator, method: ZipMethod) -> Self {
        ZipPack {
            method,
            members: Vec::new(),
            at: 0,
            state: PackState::Collect,
            writer: None,
            sink: SegmentSink::default(),
            args: Some(args),
        }
    }

    fn options(&self, m: &Member) -> FileOptions {
        let method = if !m.is_dir && m.size < STORE_THRESHOLD {
            CompressionMethod::Stored
        } else {
            self.method.to_zip()
        };
        let mut opts = FileOptions::default().compression_method(method);
        if let Some(dt) = m.mtime.and_then(zip_datetime) {
            opts = opts.last_modified_time(dt);
        }
        if m.unix_mode != 0 {
            opts = opts.unix_permissions(m.unix_mode & 0o7777);
        }
        opts
    }

    /// Emits one recorded run as a positioned data chunk.
    fn emit_segment(&mut self, cmd: &mut Command) -> Option<FilterStatus> {
        let (off, data) = self.sink.pop()?;
        cmd.output.seek = Some(off);
        cmd.data_out = data;
        Some(FilterStatus::Data)
    }
}

impl Filter for ZipPack {
    fn name(&self) -> &str {
        "arc.zip"
    }

    fn open(&mut self, cmd: &mut Command) -> Result<OpenResult, FcomError> {
        if cmd.output.path.is_none() && !cmd.output.stdout {
            return Err(FcomError::Usage("zip: output file required (-o)".into()));
        }
        Ok(OpenResult::Open)
    }

    fn process(&mut self, cmd: &mut Command) -> Result<FilterStatus, FcomError> {
        loop {
            if let Some(status) = self.emit_segment(cmd) {
                return Ok(status);
            }

            match self.state {
                PackState::Collect => {
                    let Some(args) = self.args.as_mut() else {
                        return Err(FcomError::Internal("zip pack args".into()));
                    };
                    while let Some(entry) = args.next_entry() {
                        let unix_mode = {
                            #[cfg(unix)]
                            {
                                use std::os::unix::fs::MetadataExt;
                                entry.metadata.mode()
                            }
                            #[cfg(not(unix))]
                            {
                                0
                            }
                        };
                        self.members.push(Member {
                            path: entry.path(),
                            name: member_name(&entry.name),
                            is_dir: entry.is_dir,
                            size: entry.size,
                            mtime: entry.mtime,
                            unix_mode,
                        });
                    }
                    if self.members.is_empty() {
                        return Err(FcomError::Usage("zip: no input files".into()));
                    }
                    self.writer = Some(ZipWriter::new(self.sink.clone()));
                    self.state = PackState::NewMember;
                }

                PackState::NewMember => {
                    if self.at == self.members.len() {
                        self.state = PackState::Finish;
                        continue;
                    }
                    let opts = self.options(&self.members[self.at]);
                    let m = &self.members[self.at];
                    let w = self
                        .writer
                        .as_mut()
                        .ok_or_else(|| FcomError::Internal("zip writer state".into()))?;
                    tracing::info!("adding {}", m.name);
                    if m.is_dir {
                        w.add_directory(m.name.clone(), opts)
                            .map_err(|e| FcomError::Format(format!("zip: {}", e)))?;
                        self.at += 1;
                        continue;
                    }
                    w.start_file(m.name.clone(), opts)
                        .map_err(|e| FcomError::Format(format!("zip: {}", e)))?;
                    let path = m.path.clone();
                    cmd.input.path = Some(path.clone());
                    cmd.insert_before(FilterSpec::Instance(Box::new(FileReader::for_path(path))));
                    self.state = PackState::MemberData;
                    return Ok(FilterStatus::More);
                }

                PackState::MemberData => {
                    let data = std::mem::take(&mut cmd.data_in);
                    let w = self
                        .writer
                        .as_mut()
                        .ok_or_else(|| FcomError::Internal("zip writer state".into()))?;
                    if !data.is_empty() {
                        w.write_all(&data)
                            .map_err(|e| FcomError::Format(format!("zip write: {}", e)))?;
                    }
                    if cmd.in_last {
                        self.at += 1;
                        self.state = PackState::NewMember;
                        continue;
                    }
                    // Drain whatever the encoder produced for this chunk.
                    if self.sink.inner.lock().segments.is_empty() {
                        return Ok(FilterStatus::More);
                    }
                }

                PackState::Finish => {
                    let mut w = self
                        .writer
                        .take()
                        .ok_or_else(|| FcomError::Internal("zip writer state".into()))?;
                    w.finish()
                        .map_err(|e| FcomError::Format(format!("zip finish: {}", e)))?;
                    self.state = PackState::Done;
                }

                PackState::Done => {
                    return Ok(FilterStatus::OutputDone);
                }
            }
        }
    }
}

/// Converts a zip DOS datetime into a local `SystemTime`.
fn member_mtime(dt: zip::DateTime) -> Option<SystemTime> {
    Local
        .with_ymd_and_hms(
            dt.year() as i32,
            dt.month() as u32,
            dt.day() as u32,
            dt.hour() as u32,
            dt.minute() as u32,
            dt.second() as u32,
        )
        .single()
        .map(SystemTime::from)
}

enum UnpackState {
    NextArchive,
    Members,
    Emit,
}

/// Zip unpacker: lists or extracts members of each archive argument.
pub struct ZipUnpack {
    args: Option<ArgIterator>,
    outdir: PathBuf,
    member_filter: InputFilter,
    show_only: bool,
    archive: Option<ZipArchive<File>>,
    index: usize,
    queue: VecDeque<Vec<u8>>,
    state: UnpackState,
}

impl ZipUnpack {
    pub fn new(args: ArgIterator, outdir: PathBuf, member_filter: InputFilter) -> Self {
        ZipUnpack {
            args: Some(args),
            outdir,
            member_filter,
            show_only: false,
            archive: None,
            index: 0,
            queue: VecDeque::new(),
            state: UnpackState::NextArchive,
        }
    }

    fn show_member(name: &str, size: u64, mtime: Option<SystemTime>, is_dir: bool) {
        let size_col = if is_dir {
            "       <DIR>".to_string()
        } else {
            format!("{:>12}", size)
        };
        let date = mtime
            .map(|t| {
                chrono::DateTime::<Local>::from(t)
                    .format("%Y-%m-%d %H:%M:%S")
                    .to_string()
            })
            .unwrap_or_else(|| "-".into());
        println!("{} {} {}", size_col, date, name);
    }
}

impl Filter for ZipUnpack {
    fn name(&self) -> &str {
        "arc.unzip"
    }

    fn open(&mut self, cmd: &mut Command) -> Result<OpenResult, FcomError> {
        self.show_only = cmd.show_only;
        Ok(OpenResult::Open)
    }

    fn process(&mut self, cmd: &mut Command) -> Result<FilterStatus, FcomError> {
        loop {
            if cmd.is_stopped() {
                return Err(FcomError::Cancelled);
            }
            match self.state {
                UnpackState::NextArchive => {
                    let Some(entry) = self.args.as_mut().and_then(|a| a.next_file()) else {
                        return Ok(if self.show_only {
                            FilterStatus::Fin
                        } else {
                            FilterStatus::Done
                        });
                    };
                    tracing::info!("{}", entry.name);
                    let file = File::open(entry.path())
                        .map_err(|e| FcomError::sys_path("open", &entry.name, &e))?;
                    let archive = ZipArchive::new(file)
                        .map_err(|e| FcomError::Format(format!("{}: {}", entry.name, e)))?;
                    self.archive = Some(archive);
                    self.index = 0;
                    self.state = UnpackState::Members;
                }

                UnpackState::Members => {
                    let archive = self
                        .archive
                        .as_mut()
                        .ok_or_else(|| FcomError::Internal("unzip archive state".into()))?;
                    if self.index >= archive.len() {
                        self.archive = None;
                        self.state = UnpackState::NextArchive;
                        continue;
                    }
                    let idx = self.index;
                    self.index += 1;

                    let mut member = archive
                        .by_index(idx)
                        .map_err(|e| FcomError::Format(format!("zip member {}: {}", idx, e)))?;
                    let raw_name = member.name().to_string();
                    let is_dir = member.is_dir();
                    let size = member.size();
                    let mtime = member_mtime(member.last_modified());

                    if !self.member_filter.allows(raw_name.trim_end_matches('/'), is_dir) {
                        tracing::debug!("skipping {}", raw_name);
                        continue;
                    }
                    if self.show_only {
                        Self::show_member(&raw_name, size, mtime, is_dir);
                        continue;
                    }

                    let Some(safe) = member.enclosed_name().map(|p| p.to_path_buf()) else {
                        tracing::warn!("unsafe member name skipped: {}", raw_name);
                        continue;
                    };
                    let target = self.outdir.join(safe);

                    if is_dir {
                        if size != 0 {
                            tracing::warn!("directory {} has non-zero size", raw_name);
                        }
                        cmd.reset_output_item();
                        cmd.output.path = Some(target);
                        cmd.output.attr = FileAttr::directory();
                        cmd.output.attr_win = true;
                        cmd.output.mtime = mtime;
                        return Ok(FilterStatus::NextDone);
                    }

                    // Slurp the member; the borrow cannot outlive this call.
                    let mut data = Vec::with_capacity(size as usize);
                    member
                        .read_to_end(&mut data)
                        .map_err(|e| FcomError::Format(format!("{}: {}", raw_name, e)))?;

                    cmd.reset_output_item();
                    cmd.output.path = Some(target);
                    cmd.output.size = Some(size);
                    cmd.output.mtime = mtime;
                    if let Some(mode) = member.unix_mode() {
                        cmd.output.attr = FileAttr::regular(mode);
                    }

                    let chunk = cmd.buffer_size.max(1);
                    for piece in data.chunks(chunk) {
                        self.queue.push_back(piece.to_vec());
                    }
                    if self.queue.is_empty() {
                        // Zero-length member: flush straight through.
                        return Ok(FilterStatus::NextDone);
                    }
                    self.state = UnpackState::Emit;
                }

                UnpackState::Emit => {
                    match self.queue.pop_front() {
                        Some(chunk) => {
                            cmd.data_out = chunk;
                            return Ok(FilterStatus::Data);
                        }
                        None => {
                            self.state = UnpackState::Members;
                            return Ok(FilterStatus::NextDone);
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_sink_coalesces_sequential_writes() {
        let mut sink = SegmentSink::default();
        sink.write_all(b"abc").unwrap();
        sink.write_all(b"def").unwrap();
        let seg = sink.pop().unwrap();
        assert_eq!(seg, (0, b"abcdef".to_vec()));
        assert!(sink.pop().is_none());
    }

    #[test]
    fn test_segment_sink_splits_on_seek() {
        let mut sink = SegmentSink::default();
        sink.write_all(b"datadata").unwrap();
        sink.seek(SeekFrom::Start(0)).unwrap();
        sink.write_all(b"HD").unwrap();
        let first = sink.pop().unwrap();
        let second = sink.pop().unwrap();
        assert_eq!(first, (0, b"datadata".to_vec()));
        assert_eq!(second, (0, b"HD".to_vec()));
    }

    #[test]
    fn test_segment_sink_seek_end() {
        let mut sink = SegmentSink::default();
        sink.write_all(b"0123").unwrap();
        let end = sink.seek(SeekFrom::End(0)).unwrap();
        assert_eq!(end, 4);
        let cur = sink.seek(SeekFrom::Current(-2)).unwrap();
        assert_eq!(cur, 2);
    }

    #[test]
    fn test_member_name_normalization() {
        assert_eq!(member_name("./a/b.txt"), "a/b.txt");
        assert_eq!(member_name("/abs/path"), "abs/path");
        assert_eq!(member_name("plain.txt"), "plain.txt");
    }

    #[test]
    fn test_zip_method_parse() {
        assert_eq!("store".parse::<ZipMethod>().unwrap(), ZipMethod::Store);
        assert_eq!("Deflate".parse::<ZipMethod>().unwrap(), ZipMethod::Deflate);
        assert_eq!("ZSTD".parse::<ZipMethod>().unwrap(), ZipMethod::Zstd);
        assert!("lzma".parse::<ZipMethod>().is_err());
    }
}
