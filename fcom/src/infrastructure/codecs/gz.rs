// /////////////////////////////////////////////////////////////////////////////
// Fcom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # gzip Member Codec
//!
//! Filters around flate2's incremental deflate state machines. The member
//! framing (header with optional embedded file name and mtime, CRC32 +
//! size trailer) is thin enough to live here; the bit-format of the
//! compressed stream itself is flate2's business.
//!
//! `GzWriter` packs one input stream into one `.gz` member. `GzReader` is
//! the archive-reader driver of the unpack pipeline: for each argument it
//! inserts a file reader upstream, parses the member header, restores the
//! embedded name and mtime onto the output descriptor, and streams the
//! inflated data to the writer downstream.

use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress, Status};

use fcom_domain::services::filter::{Filter, FilterSpec, FilterStatus, OpenResult};
use fcom_domain::{Command, FcomError};

use crate::infrastructure::filters::FileReader;
use crate::infrastructure::runtime::input::ArgIterator;

const GZ_MAGIC: [u8; 2] = [0x1f, 0x8b];
const METHOD_DEFLATE: u8 = 8;
const FLAG_FHCRC: u8 = 0x02;
const FLAG_FEXTRA: u8 = 0x04;
const FLAG_FNAME: u8 = 0x08;
const FLAG_FCOMMENT: u8 = 0x10;

const OUT_STEP: usize = 32 * 1024;

fn unix_secs(t: SystemTime) -> u32 {
    t.duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0)
}

/// Appends deflate output for `input`, consuming it fully. With
/// `FlushCompress::Finish`, loops until the stream end marker is out.
fn pump_compress(
    comp: &mut Compress,
    mut input: &[u8],
    out: &mut Vec<u8>,
    finish: bool,
) -> Result<(), FcomError> {
    loop {
        let before_in = comp.total_in();
        out.reserve(OUT_STEP);
        let flush = if finish {
            FlushCompress::Finish
        } else {
            FlushCompress::None
        };
        let status = comp
            .compress_vec(input, out, flush)
            .map_err(|e| FcomError::Format(format!("deflate: {}", e)))?;
        let consumed = (comp.total_in() - before_in) as usize;
        input = &input[consumed..];
        match status {
            Status::StreamEnd => return Ok(()),
            _ => {
                if input.is_empty() && !finish {
                    return Ok(());
                }
            }
        }
    }
}

/// Packs one stream into a `.gz` member with embedded name and mtime.
pub struct GzWriter {
    level: u32,
    comp: Option<Compress>,
    crc: crc32fast::Hasher,
    isize: u32,
    header_sent: bool,
}

impl GzWriter {
    pub fn new(level: u32) -> Self {
        GzWriter {
            level: level.min(9),
            comp: None,
            crc: crc32fast::Hasher::new(),
            isize: 0,
            header_sent: false,
        }
    }

    fn header(&self, cmd: &Command) -> Vec<u8> {
        let name: Option<Vec<u8>> = cmd.input.path.as_ref().and_then(|p| {
            p.file_name().map(|n| n.to_string_lossy().into_owned().into_bytes())
        });
        let mtime = cmd.input.mtime.map(unix_secs).unwrap_or(0);

        let mut hdr = Vec::with_capacity(16);
        hdr.extend_from_slice(&GZ_MAGIC);
        hdr.push(METHOD_DEFLATE);
        hdr.push(if name.is_some() { FLAG_FNAME } else { 0 });
        hdr.extend_from_slice(&mtime.to_le_bytes());
        hdr.push(0); // XFL
        hdr.push(255); // OS: unknown
        if let Some(name) = name {
            hdr.extend_from_slice(&name);
            hdr.push(0);
        }
        hdr
    }
}

impl Filter for GzWriter {
    fn name(&self) -> &str {
        "arc.gz1"
    }

    fn process(&mut self, cmd: &mut Command) -> Result<FilterStatus, FcomError> {
        let mut out = Vec::new();
        if !self.header_sent {
            self.header_sent = true;
            out = self.header(cmd);
            self.comp = Some(Compress::new(Compression::new(self.level), false));
        }
        let comp = self
            .comp
            .as_mut()
            .ok_or_else(|| FcomError::Internal("gz writer state".into()))?;

        let input = std::mem::take(&mut cmd.data_in);
        self.crc.update(&input);
        self.isize = self.isize.wrapping_add(input.len() as u32);

        pump_compress(comp, &input, &mut out, cmd.in_last)?;

        if cmd.in_last {
            let crc = std::mem::take(&mut self.crc).finalize();
            out.extend_from_slice(&crc.to_le_bytes());
            out.extend_from_slice(&self.isize.to_le_bytes());
            cmd.data_out = out;
            return Ok(FilterStatus::OutputDone);
        }

        if out.is_empty() {
            return Ok(FilterStatus::More);
        }
        cmd.data_out = out;
        Ok(FilterStatus::Data)
    }
}

/// Parsed member header.
#[derive(Debug)]
struct GzHeader {
    mtime: u32,
    name: Option<String>,
}

/// Incremental header parse; `None` means more bytes are needed.
fn parse_header(buf: &[u8]) -> Result<Option<(GzHeader, usize)>, FcomError> {
    if buf.len() < 10 {
        return Ok(None);
    }
    if buf[0..2] != GZ_MAGIC {
        return Err(FcomError::Format("not a gzip stream (bad magic)".into()));
    }
    if buf[2] != METHOD_DEFLATE {
        return Err(FcomError::Format(format!(
            "unsupported gzip method {}",
            buf[2]
        )));
    }
    let flags = buf[3];
    let mtime = u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);
    let mut pos = 10usize;

    if flags & FLAG_FEXTRA != 0 {
        if buf.len() < pos + 2 {
            return Ok(None);
        }
        let xlen = u16::from_le_bytes([buf[pos], buf[pos + 1]]) as usize;
        pos += 2 + xlen;
        if buf.len() < pos {
            return Ok(None);
        }
    }

    let mut name = None;
    if flags & FLAG_FNAME != 0 {
        match buf[pos..].iter().position(|&b| b == 0) {
            Some(end) => {
                name = Some(String::from_utf8_lossy(&buf[pos..pos + end]).into_owned());
                pos += end + 1;
            }
            None => return Ok(None),
        }
    }
    if flags & FLAG_FCOMMENT != 0 {
        match buf[pos..].iter().position(|&b| b == 0) {
            Some(end) => pos += end + 1,
            None => return Ok(None),
        }
    }
    if flags & FLAG_FHCRC != 0 {
        if buf.len() < pos + 2 {
            return Ok(None);
        }
        pos += 2;
    }

    Ok(Some((GzHeader { mtime, name }, pos)))
}

enum UnpackState {
    NextArg,
    Header,
    Data,
    Trailer,
    ItemDone,
}

/// Unpack driver: one `.gz` member per input argument.
pub struct GzReader {
    args: Option<ArgIterator>,
    outdir: Option<PathBuf>,
    explicit_output: bool,
    state: UnpackState,
    buf: Vec<u8>,
    dec: Decompress,
    crc: crc32fast::Hasher,
    isize: u32,
    src_last: bool,
}

impl GzReader {
    pub fn new(args: ArgIterator, outdir: Option<PathBuf>) -> Self {
        GzReader {
            args: Some(args),
            outdir,
            explicit_output: false,
            state: UnpackState::NextArg,
            buf: Vec::new(),
            dec: Decompress::new(false),
            crc: crc32fast::Hasher::new(),
            isize: 0,
            src_last: false,
        }
    }

    /// Default output name: embedded name if present, else the input name
    /// without its `.gz` suffix, placed in the output directory.
    fn member_output(&self, cmd: &Command, embedded: Option<&str>) -> PathBuf {
        let base: String = match embedded {
            Some(n) if !n.is_empty() => n.to_string(),
            _ => {
                let input = cmd
                    .input
                    .path
                    .as_deref()
                    .and_then(|p| p.file_name())
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "out".to_string());
                input
                    .strip_suffix(".gz")
                    .map(str::to_string)
                    .unwrap_or(input)
            }
        };
        match &self.outdir {
            Some(d) => d.join(base),
            None => PathBuf::from(base),
        }
    }

    fn pump_inflate(&mut self, out: &mut Vec<u8>) -> Result<bool, FcomError> {
        loop {
            if self.buf.is_empty() {
                return Ok(false);
            }
            let before_in = self.dec.total_in();
            out.reserve(OUT_STEP);
            let status = self
                .dec
                .decompress_vec(&self.buf, out, FlushDecompress::None)
                .map_err(|e| FcomError::Format(format!("inflate: {}", e)))?;
            let consumed = (self.dec.total_in() - before_in) as usize;
            self.buf.drain(..consumed);
            match status {
                Status::StreamEnd => return Ok(true),
                Status::BufError if consumed == 0 => return Ok(false),
                _ => {
                    if self.buf.is_empty() {
                        return Ok(false);
                    }
                }
            }
        }
    }
}

impl Filter for GzReader {
    fn name(&self) -> &str {
        "arc.ungz"
    }

    fn open(&mut self, cmd: &mut Command) -> Result<OpenResult, FcomError> {
        self.explicit_output = cmd.output.path.is_some();
        Ok(OpenResult::Open)
    }

    fn process(&mut self, cmd: &mut Command) -> Result<FilterStatus, FcomError> {
        loop {
            match self.state {
                UnpackState::NextArg => {
                    let Some(args) = self.args.as_mut() else {
                        return Err(FcomError::Internal("gz reader args".into()));
                    };
                    let Some(entry) = args.next_file() else {
                        return Ok(FilterStatus::Fin);
                    };
                    tracing::info!("{}", entry.name);
                    cmd.input.path = Some(entry.path());
                    cmd.insert_before(FilterSpec::Instance(Box::new(FileReader::for_path(
                        entry.path(),
                    ))));
                    self.buf.clear();
                    self.dec = Decompress::new(false);
                    self.crc = crc32fast::Hasher::new();
                    self.isize = 0;
                    self.src_last = false;
                    self.state = UnpackState::Header;
                    return Ok(FilterStatus::More);
                }

                UnpackState::Header => {
                    self.buf.extend_from_slice(&std::mem::take(&mut cmd.data_in));
                    if cmd.in_last {
                        self.src_last = true;
                    }
                    match parse_header(&self.buf)? {
                        None => {
                            if self.src_last {
                                return Err(FcomError::Format(
                                    "truncated gzip header".into(),
                                ));
                            }
                            return Ok(FilterStatus::More);
                        }
                        Some((hdr, used)) => {
                            self.buf.drain(..used);
                            if !self.explicit_output {
                                let out = self.member_output(cmd, hdr.name.as_deref());
                                cmd.output.path = Some(out);
                            }
                            if hdr.mtime != 0 {
                                cmd.output.mtime = Some(
                                    SystemTime::UNIX_EPOCH
                                        + Duration::from_secs(hdr.mtime as u64),
                                );
                            } else {
                                cmd.output.mtime = cmd.input.mtime;
                            }
                            self.state = UnpackState::Data;
                        }
                    }
                }

                UnpackState::Data => {
                    self.buf.extend_from_slice(&std::mem::take(&mut cmd.data_in));
                    if cmd.in_last {
                        self.src_last = true;
                    }
                    let mut out = Vec::new();
                    let ended = self.pump_inflate(&mut out)?;
                    if ended {
                        self.state = UnpackState::Trailer;
                    }
                    if !out.is_empty() {
                        self.crc.update(&out);
                        self.isize = self.isize.wrapping_add(out.len() as u32);
                        cmd.data_out = out;
                        return Ok(FilterStatus::Data);
                    }
                    if matches!(self.state, UnpackState::Data) {
                        if self.src_last {
                            return Err(FcomError::Format(
                                "truncated gzip stream".into(),
                            ));
                        }
                        return Ok(FilterStatus::More);
                    }
                }

                UnpackState::Trailer => {
                    self.buf.extend_from_slice(&std::mem::take(&mut cmd.data_in));
                    if cmd.in_last {
                        self.src_last = true;
                    }
                    if self.buf.len() < 8 {
                        if self.src_last {
                            return Err(FcomError::Format("truncated gzip trailer".into()));
                        }
                        return Ok(FilterStatus::More);
                    }
                    let crc_stored =
                        u32::from_le_bytes([self.buf[0], self.buf[1], self.buf[2], self.buf[3]]);
                    let isize_stored =
                        u32::from_le_bytes([self.buf[4], self.buf[5], self.buf[6], self.buf[7]]);
                    let crc_actual = std::mem::take(&mut self.crc).finalize();
                    if crc_stored != crc_actual {
                        return Err(FcomError::Format(format!(
                            "gzip CRC mismatch: stored {:08x}, actual {:08x}",
                            crc_stored, crc_actual
                        )));
                    }
                    if isize_stored != self.isize {
                        return Err(FcomError::Format("gzip size mismatch".into()));
                    }
                    self.state = UnpackState::ItemDone;
                    return Ok(FilterStatus::NextDone);
                }

                UnpackState::ItemDone => {
                    cmd.reset_output_item();
                    self.state = UnpackState::NextArg;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_round_trip() {
        let mut cmd = Command::new("test");
        cmd.input.path = Some(PathBuf::from("dir/file.txt"));
        cmd.input.mtime =
            Some(SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000));
        let w = GzWriter::new(6);
        let hdr = w.header(&cmd);
        let (parsed, used) = parse_header(&hdr).unwrap().unwrap();
        assert_eq!(used, hdr.len());
        assert_eq!(parsed.name.as_deref(), Some("file.txt"));
        assert_eq!(parsed.mtime, 1_700_000_000);
    }

    #[test]
    fn test_header_needs_more_bytes() {
        let mut cmd = Command::new("test");
        cmd.input.path = Some(PathBuf::from("file.txt"));
        let w = GzWriter::new(6);
        let hdr = w.header(&cmd);
        // Cut inside the embedded name: parse must ask for more.
        assert!(parse_header(&hdr[..hdr.len() - 2]).unwrap().is_none());
    }

    #[test]
    fn test_bad_magic_is_format_error() {
        let err = parse_header(&[0u8; 10]).unwrap_err();
        assert!(err.is_format());
    }

    #[test]
    fn test_pack_produces_valid_gzip() {
        // Compress through the filter, decode with flate2's own reader.
        let mut cmd = Command::new("test");
        cmd.input.path = Some(PathBuf::from("hello.txt"));
        let mut w = GzWriter::new(6);
        let mut packed = Vec::new();

        cmd.data_in = b"hello gzip world".to_vec();
        cmd.in_last = true;
        match w.process(&mut cmd).unwrap() {
            FilterStatus::OutputDone => packed.extend_from_slice(&cmd.take_out()),
            s => panic!("unexpected {:?}", s),
        }

        use std::io::Read;
        let mut dec = flate2::read::GzDecoder::new(&packed[..]);
        let mut out = Vec::new();
        dec.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"hello gzip world");
        assert_eq!(
            dec.header().unwrap().filename().map(|f| f.to_vec()),
            Some(b"hello.txt".to_vec())
        );
    }
}
