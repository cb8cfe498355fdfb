// /////////////////////////////////////////////////////////////////////////////
// Fcom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # ISO-9660 Reader
//!
//! Incremental parser for the base ISO-9660 directory structure, written
//! as the canonical seek-requesting archive filter: the upstream file
//! reader stays in charge of all I/O while this filter asks it to
//! re-position via the input seek request - first to the primary volume
//! descriptor at sector 16, then to each directory extent, then to each
//! extracted file's extent.
//!
//! Base names only (`NAME.EXT;1` version suffixes are stripped); Joliet
//! and Rock Ridge extensions are not interpreted. Reading is the whole
//! story here: authoring ISO images is out of scope for this build.

use std::path::PathBuf;
use std::time::SystemTime;

use chrono::TimeZone;

use fcom_domain::entities::command::FileAttr;
use fcom_domain::services::filter::{Filter, FilterSpec, FilterStatus, OpenResult};
use fcom_domain::value_objects::input_filter::InputFilter;
use fcom_domain::{Command, FcomError};

use crate::infrastructure::filters::FileReader;
use crate::infrastructure::runtime::input::ArgIterator;

const SECTOR: u64 = 2048;
const PVD_OFFSET: u64 = 16 * SECTOR;
const FLAG_DIR: u8 = 0x02;

#[derive(Debug, Clone)]
struct IsoFile {
    path: String,
    lba: u32,
    size: u32,
    mtime: Option<SystemTime>,
}

#[derive(Debug, Clone)]
struct IsoDir {
    path: String,
    lba: u32,
    size: u32,
}

/// 7-byte directory-record timestamp: offset-from-1900 year, month, day,
/// hour, minute, second, GMT offset in quarter hours (ignored; rendered
/// as local time like the rest of the tool).
fn parse_rec_time(b: &[u8]) -> Option<SystemTime> {
    let year = 1900 + b[0] as i32;
    chrono::Local
        .with_ymd_and_hms(
            year,
            b[1] as u32,
            b[2] as u32,
            b[3] as u32,
            b[4] as u32,
            b[5] as u32,
        )
        .single()
        .map(SystemTime::from)
}

fn le32(b: &[u8]) -> u32 {
    u32::from_le_bytes([b[0], b[1], b[2], b[3]])
}

struct DirRecord {
    name: String,
    lba: u32,
    size: u32,
    is_dir: bool,
    mtime: Option<SystemTime>,
}

/// Parses every record of one directory extent.
fn parse_dir_extent(data: &[u8]) -> Result<Vec<DirRecord>, FcomError> {
    let mut out = Vec::new();
    let mut pos = 0usize;
    while pos < data.len() {
        let len = data[pos] as usize;
        if len == 0 {
            // Records never span sector boundaries; skip the padding.
            let next = (pos / SECTOR as usize + 1) * SECTOR as usize;
            if next <= pos {
                break;
            }
            pos = next;
            continue;
        }
        if pos + len > data.len() || len < 34 {
            return Err(FcomError::Format(format!(
                "bad directory record at offset {}",
                pos
            )));
        }
        let rec = &data[pos..pos + len];
        pos += len;

        let name_len = rec[32] as usize;
        if 33 + name_len > rec.len() {
            return Err(FcomError::Format("directory record name overflow".into()));
        }
        let raw_name = &rec[33..33 + name_len];
        // 0x00 = self, 0x01 = parent.
        if raw_name == [0u8] || raw_name == [1u8] {
            continue;
        }
        let mut name = String::from_utf8_lossy(raw_name).into_owned();
        if let Some(i) = name.find(';') {
            name.truncate(i);
        }
        if name.ends_with('.') {
            name.pop();
        }

        out.push(DirRecord {
            name,
            lba: le32(&rec[2..6]),
            size: le32(&rec[10..14]),
            is_dir: rec[25] & FLAG_DIR != 0,
            mtime: parse_rec_time(&rec[18..25]),
        });
    }
    Ok(out)
}

enum State {
    NextArg,
    /// Waiting for `want_len` bytes starting at the requested offset.
    Pvd,
    DirExtent,
    NextMember,
    MemberData,
}

/// ISO-9660 unpack/list driver.
pub struct IsoReader {
    args: Option<ArgIterator>,
    outdir: PathBuf,
    member_filter: InputFilter,
    show_only: bool,
    state: State,

    buf: Vec<u8>,
    want_len: usize,

    dirs: Vec<IsoDir>,
    files: Vec<IsoFile>,
    file_at: usize,
    remaining: u64,
}

impl IsoReader {
    pub fn new(args: ArgIterator, outdir: PathBuf, member_filter: InputFilter) -> Self {
        IsoReader {
            args: Some(args),
            outdir,
            member_filter,
            show_only: false,
            state: State::NextArg,
            buf: Vec::new(),
            want_len: 0,
            dirs: Vec::new(),
            files: Vec::new(),
            file_at: 0,
            remaining: 0,
        }
    }

    fn request(&mut self, cmd: &mut Command, offset: u64, len: usize) {
        self.buf.clear();
        self.want_len = len;
        cmd.input.seek = Some(offset);
    }

    fn show_member(f: &IsoFile) {
        let date = f
            .mtime
            .map(|t| {
                chrono::DateTime::<chrono::Local>::from(t)
                    .format("%Y-%m-%d %H:%M:%S")
                    .to_string()
            })
            .unwrap_or_else(|| "-".into());
        println!("{:>12} {} {}", f.size, date, f.path);
    }
}

impl Filter for IsoReader {
    fn name(&self) -> &str {
        "arc.uniso"
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
                State::NextArg => {
                    let Some(entry) = self.args.as_mut().and_then(|a| a.next_file()) else {
                        return Ok(if self.show_only {
                            FilterStatus::Fin
                        } else {
                            FilterStatus::Done
                        });
                    };
                    tracing::info!("{}", entry.name);
                    cmd.input.path = Some(entry.path());
                    cmd.insert_before(FilterSpec::Instance(Box::new(FileReader::for_path(
                        entry.path(),
                    ))));
                    self.dirs.clear();
                    self.files.clear();
                    self.file_at = 0;
                    self.state = State::Pvd;
                    self.request(cmd, PVD_OFFSET, SECTOR as usize);
                    return Ok(FilterStatus::More);
                }

                State::Pvd => {
                    self.buf.extend_from_slice(&std::mem::take(&mut cmd.data_in));
                    if self.buf.len() < self.want_len {
                        if cmd.in_last {
                            return Err(FcomError::Format("truncated ISO image".into()));
                        }
                        return Ok(FilterStatus::More);
                    }
                    let pvd = &self.buf[..SECTOR as usize];
                    if pvd[0] != 1 || &pvd[1..6] != b"CD001" {
                        return Err(FcomError::Format(
                            "not an ISO-9660 image (bad volume descriptor)".into(),
                        ));
                    }
                    // Root directory record sits at offset 156.
                    let root = &pvd[156..190];
                    let dir = IsoDir {
                        path: String::new(),
                        lba: le32(&root[2..6]),
                        size: le32(&root[10..14]),
                    };
                    let offset = dir.lba as u64 * SECTOR;
                    let len = dir.size as usize;
                    self.dirs.push(dir);
                    self.state = State::DirExtent;
                    self.request(cmd, offset, len);
                    return Ok(FilterStatus::More);
                }

                State::DirExtent => {
                    self.buf.extend_from_slice(&std::mem::take(&mut cmd.data_in));
                    if self.buf.len() < self.want_len {
                        if cmd.in_last {
                            return Err(FcomError::Format("truncated ISO directory".into()));
                        }
                        return Ok(FilterStatus::More);
                    }
                    let dir = self.dirs.remove(0);
                    let data: Vec<u8> = self.buf.drain(..self.want_len).collect();
                    for rec in parse_dir_extent(&data)? {
                        let path = if dir.path.is_empty() {
                            rec.name.clone()
                        } else {
                            format!("{}/{}", dir.path, rec.name)
                        };
                        if rec.is_dir {
                            if !self.member_filter.allows(&path, true) {
                                continue;
                            }
                            self.dirs.push(IsoDir {
                                path,
                                lba: rec.lba,
                                size: rec.size,
                            });
                        } else {
                            self.files.push(IsoFile {
                                path,
                                lba: rec.lba,
                                size: rec.size,
                                mtime: rec.mtime,
                            });
                        }
                    }
                    if let Some(next) = self.dirs.first() {
                        let offset = next.lba as u64 * SECTOR;
                        let len = next.size as usize;
                        self.state = State::DirExtent;
                        self.request(cmd, offset, len);
                        return Ok(FilterStatus::More);
                    }
                    self.state = State::NextMember;
                }

                State::NextMember => {
                    let Some(file) = self.files.get(self.file_at) else {
                        self.state = State::NextArg;
                        continue;
                    };
                    let file = file.clone();
                    self.file_at += 1;

                    if !self.member_filter.allows(&file.path, false) {
                        tracing::debug!("skipping {}", file.path);
                        continue;
                    }
                    if self.show_only {
                        Self::show_member(&file);
                        continue;
                    }

                    cmd.reset_output_item();
                    cmd.output.path = Some(self.outdir.join(&file.path));
                    cmd.output.size = Some(file.size as u64);
                    cmd.output.mtime = file.mtime;
                    cmd.output.attr = FileAttr::regular(0o644);

                    self.remaining = file.size as u64;
                    if self.remaining == 0 {
                        return Ok(FilterStatus::NextDone);
                    }
                    self.state = State::MemberData;
                    self.request(cmd, file.lba as u64 * SECTOR, file.size as usize);
                    return Ok(FilterStatus::More);
                }

                State::MemberData => {
                    let mut data = std::mem::take(&mut cmd.data_in);
                    if data.is_empty() {
                        if cmd.in_last && self.remaining > 0 {
                            return Err(FcomError::Format("truncated ISO file data".into()));
                        }
                        return Ok(FilterStatus::More);
                    }
                    if (data.len() as u64) > self.remaining {
                        data.truncate(self.remaining as usize);
                    }
                    self.remaining -= data.len() as u64;
                    cmd.data_out = data;
                    if self.remaining == 0 {
                        self.state = State::NextMember;
                        return Ok(FilterStatus::NextDone);
                    }
                    return Ok(FilterStatus::Data);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Builds one 34+n byte directory record.
    fn record(name: &[u8], lba: u32, size: u32, is_dir: bool) -> Vec<u8> {
        let name_len = name.len();
        let mut len = 33 + name_len;
        if len % 2 == 1 {
            len += 1; // records are padded to even length
        }
        let mut rec = vec![0u8; len.max(34)];
        rec[0] = rec.len() as u8;
        rec[2..6].copy_from_slice(&lba.to_le_bytes());
        rec[10..14].copy_from_slice(&size.to_le_bytes());
        rec[18] = 124; // 2024
        rec[19] = 1;
        rec[20] = 2;
        rec[25] = if is_dir { FLAG_DIR } else { 0 };
        rec[32] = name_len as u8;
        rec[33..33 + name_len].copy_from_slice(name);
        rec
    }

    #[test]
    fn test_parse_dir_extent_skips_self_and_parent() {
        let mut data = Vec::new();
        data.extend(record(&[0u8], 20, 2048, true)); // self
        data.extend(record(&[1u8], 20, 2048, true)); // parent
        data.extend(record(b"README.TXT;1", 30, 123, false));
        data.extend(record(b"SUB", 40, 2048, true));
        let recs = parse_dir_extent(&data).unwrap();
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[0].name, "README.TXT");
        assert_eq!(recs[0].size, 123);
        assert!(!recs[0].is_dir);
        assert_eq!(recs[1].name, "SUB");
        assert!(recs[1].is_dir);
    }

    #[test]
    fn test_parse_dir_extent_sector_padding() {
        let mut data = vec![0u8; 2048];
        let rec = record(b"LATE.BIN;1", 50, 7, false);
        data.extend(&rec);
        data.resize(4096, 0);
        let recs = parse_dir_extent(&data).unwrap();
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].name, "LATE.BIN");
    }

    #[test]
    fn test_version_and_dot_stripping() {
        let data = record(b"NODOT.;1", 60, 1, false);
        let recs = parse_dir_extent(&data).unwrap();
        assert_eq!(recs[0].name, "NODOT");
    }

    #[test]
    fn test_bad_record_is_format_error() {
        let mut data = record(b"X", 60, 1, false);
        data[0] = 200; // longer than the buffer
        assert!(parse_dir_extent(&data).is_err());
    }

    #[test]
    fn test_rec_time_parses() {
        let t = parse_rec_time(&[124, 6, 15, 12, 30, 45, 0]).unwrap();
        let dt = chrono::DateTime::<chrono::Local>::from(t);
        use chrono::Datelike;
        assert_eq!(dt.year(), 2024);
        assert_eq!(dt.month(), 6);
    }
}
