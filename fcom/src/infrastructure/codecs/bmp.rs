// /////////////////////////////////////////////////////////////////////////////
// Fcom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # BMP Reader and Writer Filters
//!
//! Uncompressed BMP v3, 24-bit (BGR) and 32-bit (BGRA). The reader parses
//! the headers, declares the picture descriptor and emits one scan line
//! per chunk - in storage order, which for a positive-height bitmap is
//! bottom-up; the `input_reverse` flag tells downstream consumers so.
//!
//! The writer demands BGR/BGRA input; anything else makes it request the
//! pixel converter upstream and replay. Rows are stored bottom-up, so a
//! top-down incoming stream is written with one positioned chunk per line
//! and the file writer's cached buffers turn that into sane I/O.

use std::collections::VecDeque;

use fcom_domain::services::filter::{Filter, FilterSpec, FilterStatus};
use fcom_domain::value_objects::pixel_format::PixelFormat;
use fcom_domain::{Command, FcomError};

const FILE_HEADER: usize = 14;
const INFO_HEADER: usize = 40;
const HEADERS: usize = FILE_HEADER + INFO_HEADER;

fn stride_for(width: u32, bpp: usize) -> usize {
    ((width as usize * bpp) + 3) & !3
}

enum ReadState {
    Header,
    Lines,
}

/// Emits one scan line per chunk from a BMP stream.
pub struct BmpReader {
    state: ReadState,
    buf: Vec<u8>,
    data_off: usize,
    skipped: usize,
    stride: usize,
    line_bytes: usize,
    lines_left: u32,
}

impl BmpReader {
    pub fn new() -> Self {
        BmpReader {
            state: ReadState::Header,
            buf: Vec::new(),
            data_off: 0,
            skipped: 0,
            stride: 0,
            line_bytes: 0,
            lines_left: 0,
        }
    }
}

impl Default for BmpReader {
    fn default() -> Self {
        Self::new()
    }
}

impl Filter for BmpReader {
    fn name(&self) -> &str {
        "pic.bmp-in"
    }

    fn process(&mut self, cmd: &mut Command) -> Result<FilterStatus, FcomError> {
        self.buf.extend_from_slice(&std::mem::take(&mut cmd.data_in));
        loop {
            match self.state {
                ReadState::Header => {
                    if self.buf.len() < HEADERS {
                        if cmd.in_last {
                            return Err(FcomError::Format("bmp: truncated header".into()));
                        }
                        return Ok(FilterStatus::More);
                    }
                    let b = &self.buf;
                    if &b[0..2] != b"BM" {
                        return Err(FcomError::Format("bmp: bad magic".into()));
                    }
                    let data_off = u32::from_le_bytes([b[10], b[11], b[12], b[13]]) as usize;
                    let width = i32::from_le_bytes([b[18], b[19], b[20], b[21]]);
                    let height = i32::from_le_bytes([b[22], b[23], b[24], b[25]]);
                    let bitcount = u16::from_le_bytes([b[28], b[29]]);
                    let compression = u32::from_le_bytes([b[30], b[31], b[32], b[33]]);

                    if compression != 0 {
                        return Err(FcomError::Unsupported(format!(
                            "bmp: compression {}",
                            compression
                        )));
                    }
                    if width <= 0 || height == 0 {
                        return Err(FcomError::Format("bmp: bad dimensions".into()));
                    }
                    let format = match bitcount {
                        24 => PixelFormat::Bgr,
                        32 => PixelFormat::Bgra,
                        other => {
                            return Err(FcomError::Unsupported(format!(
                                "bmp: {} bits per pixel",
                                other
                            )));
                        }
                    };

                    cmd.pic.width = width as u32;
                    cmd.pic.height = height.unsigned_abs();
                    cmd.pic.in_format = Some(format);
                    // Positive height means rows are stored bottom-up.
                    cmd.pic.input_reverse = height > 0;

                    self.data_off = data_off.max(HEADERS);
                    self.stride = stride_for(width as u32, format.bytes_per_pixel());
                    self.line_bytes = width as usize * format.bytes_per_pixel();
                    self.lines_left = height.unsigned_abs();
                    self.skipped = 0;
                    self.state = ReadState::Lines;
                    tracing::debug!(
                        width,
                        height,
                        bitcount,
                        "bmp: {}x{} {}bpp",
                        width,
                        height,
                        bitcount
                    );
                }

                ReadState::Lines => {
                    // Drop bytes between the headers and the pixel array.
                    if self.skipped < self.data_off {
                        let gap = self.data_off - self.skipped;
                        let n = gap.min(self.buf.len());
                        self.buf.drain(..n);
                        self.skipped += n;
                        if self.skipped < self.data_off {
                            if cmd.in_last {
                                return Err(FcomError::Format("bmp: truncated pixel data".into()));
                            }
                            return Ok(FilterStatus::More);
                        }
                    }

                    if self.lines_left == 0 {
                        return Ok(FilterStatus::OutputDone);
                    }
                    if self.buf.len() < self.stride {
                        if cmd.in_last {
                            return Err(FcomError::Format("bmp: truncated pixel data".into()));
                        }
                        return Ok(FilterStatus::More);
                    }
                    let line: Vec<u8> = self.buf.drain(..self.stride).take(self.line_bytes).collect();
                    self.lines_left -= 1;
                    cmd.data_out = line;
                    if self.lines_left == 0 {
                        return Ok(FilterStatus::OutputDone);
                    }
                    return Ok(FilterStatus::Data);
                }
            }
        }
    }
}

enum WriteState {
    First,
    Lines,
    Tail,
}

/// Collects scan lines into a BMP v3 stream.
pub struct BmpWriter {
    state: WriteState,
    queue: VecDeque<(Option<u64>, Vec<u8>)>,
    format: PixelFormat,
    stride: usize,
    height: u32,
    line_at: u32,
    src_done: bool,
}

impl BmpWriter {
    pub fn new() -> Self {
        BmpWriter {
            state: WriteState::First,
            queue: VecDeque::new(),
            format: PixelFormat::Bgr,
            stride: 0,
            height: 0,
            line_at: 0,
            src_done: false,
        }
    }

    fn header(&self, cmd: &Command) -> Vec<u8> {
        let image_size = self.stride as u32 * self.height;
        let file_size = HEADERS as u32 + image_size;
        let mut h = Vec::with_capacity(HEADERS);
        h.extend_from_slice(b"BM");
        h.extend_from_slice(&file_size.to_le_bytes());
        h.extend_from_slice(&[0u8; 4]);
        h.extend_from_slice(&(HEADERS as u32).to_le_bytes());
        h.extend_from_slice(&(INFO_HEADER as u32).to_le_bytes());
        h.extend_from_slice(&(cmd.pic.width as i32).to_le_bytes());
        // Positive height: stored bottom-up.
        h.extend_from_slice(&(self.height as i32).to_le_bytes());
        h.extend_from_slice(&1u16.to_le_bytes());
        h.extend_from_slice(&(self.format.bits() as u16).to_le_bytes());
        h.extend_from_slice(&0u32.to_le_bytes()); // BI_RGB
        h.extend_from_slice(&image_size.to_le_bytes());
        h.extend_from_slice(&2835u32.to_le_bytes()); // 72 DPI
        h.extend_from_slice(&2835u32.to_le_bytes());
        h.extend_from_slice(&0u32.to_le_bytes());
        h.extend_from_slice(&0u32.to_le_bytes());
        h
    }
}

impl Default for BmpWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl Filter for BmpWriter {
    fn name(&self) -> &str {
        "pic.bmp-out"
    }

    fn process(&mut self, cmd: &mut Command) -> Result<FilterStatus, FcomError> {
        if let WriteState::First = self.state {
            let Some(incoming) = cmd.pic.in_format else {
                return Err(FcomError::Internal("bmp writer: no picture format".into()));
            };
            let desired = if incoming.has_alpha() {
                PixelFormat::Bgra
            } else {
                PixelFormat::Bgr
            };
            if incoming != desired {
                cmd.pic.out_format = Some(desired);
                cmd.insert_before(FilterSpec::Name("pic.convert".into()));
                return Ok(FilterStatus::Back);
            }
            self.format = desired;
            self.height = cmd.pic.height;
            self.stride = stride_for(cmd.pic.width, desired.bytes_per_pixel());
            self.queue.push_back((Some(0), self.header(cmd)));
            self.state = WriteState::Lines;
        }

        if cmd.in_last {
            self.src_done = true;
        }

        let data = std::mem::take(&mut cmd.data_in);
        if !data.is_empty() {
            if matches!(self.state, WriteState::Tail) {
                return Err(FcomError::Format("bmp: extra scan lines".into()));
            }
            if self.line_at >= self.height {
                return Err(FcomError::Format("bmp: extra scan lines".into()));
            }
            // Storage is bottom-up; a top-down stream lands back to front.
            let row = if cmd.pic.input_reverse {
                self.line_at
            } else {
                self.height - 1 - self.line_at
            };
            let off = HEADERS as u64 + row as u64 * self.stride as u64;
            let mut line = data;
            line.resize(self.stride, 0);
            self.queue.push_back((Some(off), line));
            self.line_at += 1;
            if self.line_at == self.height {
                self.state = WriteState::Tail;
            }
        }

        if let Some((seek, chunk)) = self.queue.pop_front() {
            cmd.output.seek = seek;
            cmd.data_out = chunk;
            if self.queue.is_empty() && matches!(self.state, WriteState::Tail) {
                return Ok(FilterStatus::OutputDone);
            }
            return Ok(FilterStatus::Data);
        }

        if matches!(self.state, WriteState::Tail) || self.src_done {
            return Ok(FilterStatus::OutputDone);
        }
        Ok(FilterStatus::More)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_pipeline(bmp_bytes: &[u8]) -> (Vec<Vec<u8>>, Command) {
        let mut cmd = Command::new("test");
        let mut r = BmpReader::new();
        let mut lines = Vec::new();
        cmd.data_in = bmp_bytes.to_vec();
        cmd.in_last = true;
        loop {
            match r.process(&mut cmd).unwrap() {
                FilterStatus::Data => lines.push(cmd.take_out()),
                FilterStatus::OutputDone => {
                    let last = cmd.take_out();
                    if !last.is_empty() {
                        lines.push(last);
                    }
                    break;
                }
                s => panic!("unexpected {:?}", s),
            }
            cmd.data_in = Vec::new();
        }
        (lines, cmd)
    }

    fn bmp_2x2_bgr() -> Vec<u8> {
        // 2x2, 24-bit. Rows padded to 8 bytes. Bottom-up storage:
        // stored first row = image bottom row.
        let mut b = Vec::new();
        b.extend_from_slice(b"BM");
        b.extend_from_slice(&(54u32 + 16).to_le_bytes());
        b.extend_from_slice(&[0u8; 4]);
        b.extend_from_slice(&54u32.to_le_bytes());
        b.extend_from_slice(&40u32.to_le_bytes());
        b.extend_from_slice(&2i32.to_le_bytes());
        b.extend_from_slice(&2i32.to_le_bytes());
        b.extend_from_slice(&1u16.to_le_bytes());
        b.extend_from_slice(&24u16.to_le_bytes());
        b.extend_from_slice(&0u32.to_le_bytes());
        b.extend_from_slice(&16u32.to_le_bytes());
        b.extend_from_slice(&2835u32.to_le_bytes());
        b.extend_from_slice(&2835u32.to_le_bytes());
        b.extend_from_slice(&0u32.to_le_bytes());
        b.extend_from_slice(&0u32.to_le_bytes());
        // bottom row: blue-ish pixels, then padding
        b.extend_from_slice(&[1, 2, 3, 4, 5, 6, 0, 0]);
        // top row
        b.extend_from_slice(&[7, 8, 9, 10, 11, 12, 0, 0]);
        b
    }

    #[test]
    fn test_reader_declares_picture_and_emits_lines() {
        let (lines, cmd) = run_pipeline(&bmp_2x2_bgr());
        assert_eq!(cmd.pic.width, 2);
        assert_eq!(cmd.pic.height, 2);
        assert_eq!(cmd.pic.in_format, Some(PixelFormat::Bgr));
        assert!(cmd.pic.input_reverse);
        assert_eq!(lines.len(), 2);
        // Padding stripped, storage order preserved.
        assert_eq!(lines[0], vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(lines[1], vec![7, 8, 9, 10, 11, 12]);
    }

    #[test]
    fn test_reader_rejects_non_bmp() {
        let mut cmd = Command::new("test");
        let mut r = BmpReader::new();
        cmd.data_in = vec![0u8; 64];
        cmd.in_last = true;
        assert!(r.process(&mut cmd).unwrap_err().is_format());
    }

    #[test]
    fn test_writer_back_requests_converter_for_rgb() {
        let mut cmd = Command::new("test");
        cmd.pic.width = 2;
        cmd.pic.height = 2;
        cmd.pic.in_format = Some(PixelFormat::Rgb);
        let mut w = BmpWriter::new();
        cmd.data_in = vec![0u8; 6];
        assert_eq!(w.process(&mut cmd).unwrap(), FilterStatus::Back);
        assert_eq!(cmd.pic.out_format, Some(PixelFormat::Bgr));
        let ops = cmd.take_chain_ops();
        assert_eq!(ops.len(), 1);
    }

    #[test]
    fn test_writer_round_trip_via_reader() {
        // Feed BGR lines top-down; writer stores them bottom-up.
        let mut cmd = Command::new("test");
        cmd.pic.width = 2;
        cmd.pic.height = 2;
        cmd.pic.in_format = Some(PixelFormat::Bgr);
        cmd.pic.input_reverse = false;
        let mut w = BmpWriter::new();

        let top = vec![7u8, 8, 9, 10, 11, 12];
        let bottom = vec![1u8, 2, 3, 4, 5, 6];

        // Reassemble the file from the emitted positioned chunks.
        let mut file = vec![0u8; 54 + 16];
        let mut push = |cmd: &mut Command| {
            let off = cmd.output.seek.take().unwrap_or(0) as usize;
            let data = cmd.take_out();
            file[off..off + data.len()].copy_from_slice(&data);
        };

        cmd.data_in = top;
        assert_eq!(w.process(&mut cmd).unwrap(), FilterStatus::Data);
        push(&mut cmd); // header
        cmd.data_in = Vec::new();
        assert_eq!(w.process(&mut cmd).unwrap(), FilterStatus::Data);
        push(&mut cmd); // first line
        cmd.data_in = bottom;
        cmd.in_last = true;
        assert_eq!(w.process(&mut cmd).unwrap(), FilterStatus::OutputDone);
        push(&mut cmd); // last line

        assert_eq!(file, bmp_2x2_bgr());
    }
}
