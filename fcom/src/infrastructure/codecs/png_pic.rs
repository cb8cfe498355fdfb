// /////////////////////////////////////////////////////////////////////////////
// Fcom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # PNG Reader and Writer Filters
//!
//! Thin wrappers over the `png` codec crate. The reader collects the
//! whole stream (PNG is not line-incremental without restart markers),
//! decodes it with palette/bit-depth expansion, declares the picture and
//! replays it one scan line per chunk. The writer buffers lines and
//! encodes on the final one; the user-facing compression level 0-9 maps
//! onto the codec's fast/default/best presets.

use std::collections::VecDeque;

use fcom_domain::services::filter::{Filter, FilterSpec, FilterStatus};
use fcom_domain::value_objects::pixel_format::PixelFormat;
use fcom_domain::{Command, FcomError};

/// Maps the 0-9 user level onto the codec's presets.
fn compression_for(level: u32) -> png::Compression {
    match level {
        0..=3 => png::Compression::Fast,
        4..=6 => png::Compression::Default,
        _ => png::Compression::Best,
    }
}

/// Collects a PNG stream, then emits one scan line per chunk.
pub struct PngReader {
    buf: Vec<u8>,
    lines: VecDeque<Vec<u8>>,
    decoded: bool,
}

impl PngReader {
    pub fn new() -> Self {
        PngReader {
            buf: Vec::new(),
            lines: VecDeque::new(),
            decoded: false,
        }
    }

    fn decode(&mut self, cmd: &mut Command) -> Result<(), FcomError> {
        let mut decoder = png::Decoder::new(std::io::Cursor::new(self.buf.as_slice()));
        decoder.set_transformations(png::Transformations::EXPAND);
        let mut reader = decoder
            .read_info()
            .map_err(|e| FcomError::Format(format!("png: {}", e)))?;
        let mut img = vec![0u8; reader.output_buffer_size()];
        let info = reader
            .next_frame(&mut img)
            .map_err(|e| FcomError::Format(format!("png: {}", e)))?;
        drop(reader);

        let format = match info.color_type {
            png::ColorType::Rgb => PixelFormat::Rgb,
            png::ColorType::Rgba => PixelFormat::Rgba,
            other => {
                return Err(FcomError::Unsupported(format!(
                    "png color type {:?}",
                    other
                )));
            }
        };
        if info.bit_depth != png::BitDepth::Eight {
            return Err(FcomError::Unsupported(format!(
                "png bit depth {:?}",
                info.bit_depth
            )));
        }

        cmd.pic.width = info.width;
        cmd.pic.height = info.height;
        cmd.pic.in_format = Some(format);
        cmd.pic.input_reverse = false;

        let line = info.line_size;
        for row in 0..info.height as usize {
            self.lines
                .push_back(img[row * line..(row + 1) * line].to_vec());
        }
        self.buf.clear();
        Ok(())
    }
}

impl Default for PngReader {
    fn default() -> Self {
        Self::new()
    }
}

impl Filter for PngReader {
    fn name(&self) -> &str {
        "pic.png-in"
    }

    fn process(&mut self, cmd: &mut Command) -> Result<FilterStatus, FcomError> {
        if !self.decoded {
            self.buf.extend_from_slice(&std::mem::take(&mut cmd.data_in));
            if !cmd.in_last {
                return Ok(FilterStatus::More);
            }
            self.decode(cmd)?;
            self.decoded = true;
        }

        match self.lines.pop_front() {
            Some(line) => {
                cmd.data_out = line;
                if self.lines.is_empty() {
                    Ok(FilterStatus::OutputDone)
                } else {
                    Ok(FilterStatus::Data)
                }
            }
            None => Ok(FilterStatus::OutputDone),
        }
    }
}

/// Buffers scan lines and encodes a PNG on the final one.
pub struct PngWriter {
    level: u32,
    started: bool,
    lines: Vec<Vec<u8>>,
    out_queue: VecDeque<Vec<u8>>,
    encoded: bool,
}

impl PngWriter {
    pub fn new(level: u32) -> Self {
        PngWriter {
            level: level.min(9),
            started: false,
            lines: Vec::new(),
            out_queue: VecDeque::new(),
            encoded: false,
        }
    }

    fn encode(&mut self, cmd: &mut Command) -> Result<(), FcomError> {
        let format = cmd
            .pic
            .in_format
            .ok_or_else(|| FcomError::Internal("png writer: no picture format".into()))?;
        let color = match format {
            PixelFormat::Rgb => png::ColorType::Rgb,
            PixelFormat::Rgba => png::ColorType::Rgba,
            other => {
                return Err(FcomError::Internal(format!(
                    "png writer: unconverted format {}",
                    other
                )));
            }
        };

        // Bottom-up sources (BMP) buffered in storage order: flip.
        if cmd.pic.input_reverse {
            self.lines.reverse();
        }

        let mut data = Vec::with_capacity(self.lines.iter().map(Vec::len).sum());
        for l in &self.lines {
            data.extend_from_slice(l);
        }
        self.lines.clear();

        let mut out = Vec::new();
        {
            let mut enc = png::Encoder::new(&mut out, cmd.pic.width, cmd.pic.height);
            enc.set_color(color);
            enc.set_depth(png::BitDepth::Eight);
            enc.set_compression(compression_for(self.level));
            let mut writer = enc
                .write_header()
                .map_err(|e| FcomError::Format(format!("png: {}", e)))?;
            writer
                .write_image_data(&data)
                .map_err(|e| FcomError::Format(format!("png: {}", e)))?;
        }

        for chunk in out.chunks(cmd.buffer_size.max(1)) {
            self.out_queue.push_back(chunk.to_vec());
        }
        Ok(())
    }
}

impl Filter for PngWriter {
    fn name(&self) -> &str {
        "pic.png-out"
    }

    fn process(&mut self, cmd: &mut Command) -> Result<FilterStatus, FcomError> {
        if !self.started {
            let Some(incoming) = cmd.pic.in_format else {
                return Err(FcomError::Internal("png writer: no picture format".into()));
            };
            let desired = if incoming.has_alpha() {
                PixelFormat::Rgba
            } else {
                PixelFormat::Rgb
            };
            if incoming != desired {
                cmd.pic.out_format = Some(desired);
                cmd.insert_before(FilterSpec::Name("pic.convert".into()));
                return Ok(FilterStatus::Back);
            }
            self.started = true;
        }

        if !self.encoded {
            let data = std::mem::take(&mut cmd.data_in);
            if !data.is_empty() {
                self.lines.push(data);
            }
            if cmd.in_last {
                self.encode(cmd)?;
                self.encoded = true;
            } else {
                return Ok(FilterStatus::More);
            }
        }

        match self.out_queue.pop_front() {
            Some(chunk) => {
                cmd.data_out = chunk;
                if self.out_queue.is_empty() {
                    Ok(FilterStatus::OutputDone)
                } else {
                    Ok(FilterStatus::Data)
                }
            }
            None => Ok(FilterStatus::OutputDone),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_rgb_2x2() -> Vec<u8> {
        let mut out = Vec::new();
        {
            let mut enc = png::Encoder::new(&mut out, 2, 2);
            enc.set_color(png::ColorType::Rgb);
            enc.set_depth(png::BitDepth::Eight);
            let mut w = enc.write_header().unwrap();
            w.write_image_data(&[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12])
                .unwrap();
        }
        out
    }

    #[test]
    fn test_reader_emits_lines_top_down() {
        let mut cmd = Command::new("test");
        let mut r = PngReader::new();
        cmd.data_in = encode_rgb_2x2();
        cmd.in_last = true;

        assert_eq!(r.process(&mut cmd).unwrap(), FilterStatus::Data);
        assert_eq!(cmd.take_out(), vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(cmd.pic.width, 2);
        assert_eq!(cmd.pic.in_format, Some(PixelFormat::Rgb));
        assert!(!cmd.pic.input_reverse);

        cmd.data_in = Vec::new();
        assert_eq!(r.process(&mut cmd).unwrap(), FilterStatus::OutputDone);
        assert_eq!(cmd.take_out(), vec![7, 8, 9, 10, 11, 12]);
    }

    #[test]
    fn test_writer_round_trip() {
        let mut cmd = Command::new("test");
        cmd.pic.width = 2;
        cmd.pic.height = 2;
        cmd.pic.in_format = Some(PixelFormat::Rgb);
        let mut w = PngWriter::new(6);

        cmd.data_in = vec![1, 2, 3, 4, 5, 6];
        assert_eq!(w.process(&mut cmd).unwrap(), FilterStatus::More);
        cmd.data_in = vec![7, 8, 9, 10, 11, 12];
        cmd.in_last = true;
        let mut png_bytes = Vec::new();
        loop {
            match w.process(&mut cmd).unwrap() {
                FilterStatus::Data => png_bytes.extend(cmd.take_out()),
                FilterStatus::OutputDone => {
                    png_bytes.extend(cmd.take_out());
                    break;
                }
                s => panic!("unexpected {:?}", s),
            }
            cmd.data_in = Vec::new();
        }

        // Decode back and compare pixels.
        let decoder = png::Decoder::new(std::io::Cursor::new(&png_bytes));
        let mut reader = decoder.read_info().unwrap();
        let mut img = vec![0u8; reader.output_buffer_size()];
        let info = reader.next_frame(&mut img).unwrap();
        assert_eq!(info.width, 2);
        assert_eq!(&img[..12], &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12]);
    }

    #[test]
    fn test_writer_requests_conversion_for_bgr() {
        let mut cmd = Command::new("test");
        cmd.pic.width = 1;
        cmd.pic.height = 1;
        cmd.pic.in_format = Some(PixelFormat::Bgr);
        let mut w = PngWriter::new(6);
        cmd.data_in = vec![3, 2, 1];
        assert_eq!(w.process(&mut cmd).unwrap(), FilterStatus::Back);
        assert_eq!(cmd.pic.out_format, Some(PixelFormat::Rgb));
    }

    #[test]
    fn test_reader_rejects_garbage() {
        let mut cmd = Command::new("test");
        let mut r = PngReader::new();
        cmd.data_in = vec![0u8; 32];
        cmd.in_last = true;
        assert!(r.process(&mut cmd).is_err());
    }
}
