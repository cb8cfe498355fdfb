// /////////////////////////////////////////////////////////////////////////////
// Fcom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # ICO Container Filters
//!
//! An `.ico` file is a tiny archive: a directory of images, each entry
//! pointing at an embedded blob that is either a PNG stream or a BMP
//! without its file header (and with the height field doubled to cover
//! the AND mask). The unpacker extracts members as standalone `.png` /
//! `.bmp` files, reconstructing the BMP file header; the packer embeds
//! PNG and BMP inputs, deriving entry dimensions from the image headers.
//!
//! Icons are small by construction (dimensions fit in a byte), so both
//! directions work on whole buffers.

use std::path::PathBuf;

use fcom_domain::services::filter::{Filter, FilterSpec, FilterStatus, OpenResult};
use fcom_domain::value_objects::input_filter::InputFilter;
use fcom_domain::{Command, FcomError};

use crate::infrastructure::filters::FileReader;
use crate::infrastructure::runtime::input::ArgIterator;

const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];
const ICONDIR_SIZE: usize = 6;
const ENTRY_SIZE: usize = 16;

fn le16(b: &[u8]) -> u16 {
    u16::from_le_bytes([b[0], b[1]])
}

fn le32(b: &[u8]) -> u32 {
    u32::from_le_bytes([b[0], b[1], b[2], b[3]])
}

struct IcoEntry {
    width: u32,
    height: u32,
    bitcount: u16,
    offset: usize,
    size: usize,
}

fn parse_directory(data: &[u8]) -> Result<Vec<IcoEntry>, FcomError> {
    if data.len() < ICONDIR_SIZE {
        return Err(FcomError::Format("ico: file too short".into()));
    }
    if le16(&data[0..2]) != 0 || le16(&data[2..4]) != 1 {
        return Err(FcomError::Format("ico: bad header".into()));
    }
    let count = le16(&data[4..6]) as usize;
    let mut entries = Vec::with_capacity(count);
    for i in 0..count {
        let base = ICONDIR_SIZE + i * ENTRY_SIZE;
        if data.len() < base + ENTRY_SIZE {
            return Err(FcomError::Format("ico: truncated directory".into()));
        }
        let e = &data[base..base + ENTRY_SIZE];
        let width = if e[0] == 0 { 256 } else { e[0] as u32 };
        let height = if e[1] == 0 { 256 } else { e[1] as u32 };
        let bitcount = le16(&e[6..8]);
        let size = le32(&e[8..12]) as usize;
        let offset = le32(&e[12..16]) as usize;
        if offset + size > data.len() {
            return Err(FcomError::Format(format!(
                "ico: member {} outside the file",
                i
            )));
        }
        entries.push(IcoEntry {
            width,
            height,
            bitcount,
            offset,
            size,
        });
    }
    Ok(entries)
}

/// Turns a header-less ICO bitmap blob into a standalone `.bmp` file:
/// halves the doubled height and prepends the file header.
fn bmp_from_blob(blob: &[u8]) -> Result<Vec<u8>, FcomError> {
    if blob.len() < 40 {
        return Err(FcomError::Format("ico: bitmap blob too short".into()));
    }
    let header_size = le32(&blob[0..4]) as usize;
    let bitcount = le16(&blob[14..16]);
    let colors_used = le32(&blob[32..36]);
    let palette = if bitcount <= 8 {
        if colors_used != 0 {
            colors_used as usize
        } else {
            1usize << bitcount
        }
    } else {
        0
    };
    let data_offset = 14 + header_size + palette * 4;

    let mut out = Vec::with_capacity(14 + blob.len());
    out.extend_from_slice(b"BM");
    out.extend_from_slice(&((14 + blob.len()) as u32).to_le_bytes());
    out.extend_from_slice(&[0u8; 4]);
    out.extend_from_slice(&(data_offset as u32).to_le_bytes());
    out.extend_from_slice(blob);

    // Un-double the height (the blob covers XOR + AND masks).
    let doubled = i32::from_le_bytes([out[14 + 8], out[14 + 9], out[14 + 10], out[14 + 11]]);
    let halved = doubled / 2;
    out[14 + 8..14 + 12].copy_from_slice(&halved.to_le_bytes());
    Ok(out)
}

enum State {
    NextArg,
    Collect,
    NextMember,
}

/// Lists or extracts the images of `.ico` arguments.
pub struct IcoUnpack {
    args: Option<ArgIterator>,
    outdir: PathBuf,
    member_filter: InputFilter,
    show_only: bool,
    state: State,
    buf: Vec<u8>,
    stem: String,
    entries: Vec<IcoEntry>,
    at: usize,
}

impl IcoUnpack {
    pub fn new(args: ArgIterator, outdir: PathBuf, member_filter: InputFilter) -> Self {
        IcoUnpack {
            args: Some(args),
            outdir,
            member_filter,
            show_only: false,
            state: State::NextArg,
            buf: Vec::new(),
            stem: String::new(),
            entries: Vec::new(),
            at: 0,
        }
    }
}

impl Filter for IcoUnpack {
    fn name(&self) -> &str {
        "arc.unico"
    }

    fn open(&mut self, cmd: &mut Command) -> Result<OpenResult, FcomError> {
        self.show_only = cmd.show_only;
        Ok(OpenResult::Open)
    }

    fn process(&mut self, cmd: &mut Command) -> Result<FilterStatus, FcomError> {
        loop {
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
                    self.stem = entry
                        .path()
                        .file_stem()
                        .map(|s| s.to_string_lossy().into_owned())
                        .unwrap_or_else(|| "icon".into());
                    cmd.input.path = Some(entry.path());
                    cmd.insert_before(FilterSpec::Instance(Box::new(FileReader::for_path(
                        entry.path(),
                    ))));
                    self.buf.clear();
                    self.state = State::Collect;
                    return Ok(FilterStatus::More);
                }

                State::Collect => {
                    self.buf.extend_from_slice(&std::mem::take(&mut cmd.data_in));
                    if !cmd.in_last {
                        return Ok(FilterStatus::More);
                    }
                    self.entries = parse_directory(&self.buf)?;
                    self.at = 0;
                    self.state = State::NextMember;
                }

                State::NextMember => {
                    if self.at >= self.entries.len() {
                        self.state = State::NextArg;
                        continue;
                    }
                    let e = &self.entries[self.at];
                    self.at += 1;

                    let blob = &self.buf[e.offset..e.offset + e.size];
                    let is_png = blob.starts_with(PNG_MAGIC);
                    let member = format!(
                        "{}-{}x{}.{}",
                        self.stem,
                        e.width,
                        e.height,
                        if is_png { "png" } else { "bmp" }
                    );

                    if !self.member_filter.allows(&member, false) {
                        continue;
                    }
                    if self.show_only {
                        println!(
                            "{:>12} {}x{}x{} {}",
                            e.size, e.width, e.height, e.bitcount, member
                        );
                        continue;
                    }

                    let data = if is_png {
                        blob.to_vec()
                    } else {
                        bmp_from_blob(blob)?
                    };
                    cmd.reset_output_item();
                    cmd.output.path = Some(self.outdir.join(member));
                    cmd.output.size = Some(data.len() as u64);
                    cmd.data_out = data;
                    return Ok(FilterStatus::NextDone);
                }
            }
        }
    }
}

/// Builds an `.ico` from PNG and BMP inputs.
pub struct IcoPack {
    args: Option<ArgIterator>,
    done: bool,
}

impl IcoPack {
    pub fn new(args: ArgIterator) -> Self {
        IcoPack {
            args: Some(args),
            done: false,
        }
    }
}

struct PackEntry {
    width: u32,
    height: u32,
    bitcount: u16,
    blob: Vec<u8>,
}

fn pack_entry_from_file(path: &std::path::Path) -> Result<PackEntry, FcomError> {
    let data = std::fs::read(path).map_err(|e| FcomError::sys_path("read", path.display(), &e))?;

    if data.starts_with(PNG_MAGIC) {
        if data.len() < 24 {
            return Err(FcomError::Format("png: too short".into()));
        }
        let width = u32::from_be_bytes([data[16], data[17], data[18], data[19]]);
        let height = u32::from_be_bytes([data[20], data[21], data[22], data[23]]);
        return Ok(PackEntry {
            width,
            height,
            bitcount: 32,
            blob: data,
        });
    }

    if data.starts_with(b"BM") {
        if data.len() < 54 {
            return Err(FcomError::Format("bmp: too short".into()));
        }
        let width = i32::from_le_bytes([data[18], data[19], data[20], data[21]]).unsigned_abs();
        let height = i32::from_le_bytes([data[22], data[23], data[24], data[25]]).unsigned_abs();
        let bitcount = le16(&data[28..30]);

        // Strip the file header, double the height, append an empty AND
        // mask (rows padded to 32 bits).
        let mut blob = data[14..].to_vec();
        let doubled = (height as i32) * 2;
        blob[8..12].copy_from_slice(&doubled.to_le_bytes());
        let mask_stride = ((width as usize + 31) / 32) * 4;
        blob.extend(std::iter::repeat(0u8).take(mask_stride * height as usize));

        return Ok(PackEntry {
            width,
            height,
            bitcount,
            blob,
        });
    }

    Err(FcomError::Format(format!(
        "{}: neither PNG nor BMP",
        path.display()
    )))
}

impl Filter for IcoPack {
    fn name(&self) -> &str {
        "arc.ico"
    }

    fn open(&mut self, cmd: &mut Command) -> Result<OpenResult, FcomError> {
        if cmd.output.path.is_none() && !cmd.output.stdout {
            return Err(FcomError::Usage("ico: output file required (-o)".into()));
        }
        Ok(OpenResult::Open)
    }

    fn process(&mut self, cmd: &mut Command) -> Result<FilterStatus, FcomError> {
        if self.done {
            return Ok(FilterStatus::Fin);
        }
        self.done = true;

        let mut entries = Vec::new();
        while let Some(entry) = self.args.as_mut().and_then(|a| a.next_file()) {
            tracing::info!("adding {}", entry.name);
            entries.push(pack_entry_from_file(&entry.path())?);
        }
        if entries.is_empty() {
            return Err(FcomError::Usage("ico: no input images".into()));
        }
        for e in &entries {
            if e.width > 256 || e.height > 256 {
                return Err(FcomError::Usage(format!(
                    "ico: image {}x{} exceeds the 256 pixel limit",
                    e.width, e.height
                )));
            }
        }

        let mut out = Vec::new();
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&(entries.len() as u16).to_le_bytes());

        let mut offset = ICONDIR_SIZE + entries.len() * ENTRY_SIZE;
        for e in &entries {
            out.push(if e.width == 256 { 0 } else { e.width as u8 });
            out.push(if e.height == 256 { 0 } else { e.height as u8 });
            out.push(0); // palette colors
            out.push(0);
            out.extend_from_slice(&1u16.to_le_bytes()); // planes
            out.extend_from_slice(&e.bitcount.to_le_bytes());
            out.extend_from_slice(&(e.blob.len() as u32).to_le_bytes());
            out.extend_from_slice(&(offset as u32).to_le_bytes());
            offset += e.blob.len();
        }
        for e in &entries {
            out.extend_from_slice(&e.blob);
        }

        cmd.data_out = out;
        Ok(FilterStatus::OutputDone)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_bmp() -> Vec<u8> {
        // 1x1, 24-bit, bottom-up BMP.
        let mut bmp = Vec::new();
        bmp.extend_from_slice(b"BM");
        bmp.extend_from_slice(&(54u32 + 4).to_le_bytes());
        bmp.extend_from_slice(&[0u8; 4]);
        bmp.extend_from_slice(&54u32.to_le_bytes());
        bmp.extend_from_slice(&40u32.to_le_bytes());
        bmp.extend_from_slice(&1i32.to_le_bytes());
        bmp.extend_from_slice(&1i32.to_le_bytes());
        bmp.extend_from_slice(&1u16.to_le_bytes());
        bmp.extend_from_slice(&24u16.to_le_bytes());
        bmp.extend_from_slice(&[0u8; 24]); // rest of the info header
        bmp.extend_from_slice(&[10, 20, 30, 0]); // one padded pixel row
        bmp
    }

    #[test]
    fn test_pack_then_parse_directory() {
        let tmp = tempfile::TempDir::new().unwrap();
        let bmp_path = tmp.path().join("dot.bmp");
        std::fs::write(&bmp_path, tiny_bmp()).unwrap();

        let entry = pack_entry_from_file(&bmp_path).unwrap();
        assert_eq!(entry.width, 1);
        assert_eq!(entry.height, 1);
        assert_eq!(entry.bitcount, 24);
        // Height field doubled inside the blob.
        let doubled = i32::from_le_bytes([
            entry.blob[8],
            entry.blob[9],
            entry.blob[10],
            entry.blob[11],
        ]);
        assert_eq!(doubled, 2);

        // Assemble a directory by hand and parse it back.
        let mut ico = Vec::new();
        ico.extend_from_slice(&0u16.to_le_bytes());
        ico.extend_from_slice(&1u16.to_le_bytes());
        ico.extend_from_slice(&1u16.to_le_bytes());
        ico.push(1);
        ico.push(1);
        ico.extend_from_slice(&[0, 0]);
        ico.extend_from_slice(&1u16.to_le_bytes());
        ico.extend_from_slice(&24u16.to_le_bytes());
        ico.extend_from_slice(&(entry.blob.len() as u32).to_le_bytes());
        ico.extend_from_slice(&(22u32).to_le_bytes());
        ico.extend_from_slice(&entry.blob);

        let parsed = parse_directory(&ico).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].width, 1);
        assert_eq!(parsed[0].size, entry.blob.len());
    }

    #[test]
    fn test_bmp_blob_round_trip() {
        let bmp = tiny_bmp();
        // Strip the file header and double the height, as stored in ICO.
        let mut blob = bmp[14..].to_vec();
        blob[8..12].copy_from_slice(&2i32.to_le_bytes());

        let rebuilt = bmp_from_blob(&blob).unwrap();
        assert_eq!(&rebuilt[..2], b"BM");
        let height = i32::from_le_bytes([rebuilt[22], rebuilt[23], rebuilt[24], rebuilt[25]]);
        assert_eq!(height, 1);
    }

    #[test]
    fn test_bad_directory_rejected() {
        assert!(parse_directory(&[0u8; 3]).is_err());
        let mut bad = vec![0, 0, 2, 0, 1, 0]; // type 2 is a cursor
        bad.extend_from_slice(&[0u8; 16]);
        assert!(parse_directory(&bad).is_err());
    }
}
