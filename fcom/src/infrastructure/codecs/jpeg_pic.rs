// /////////////////////////////////////////////////////////////////////////////
// Fcom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # JPEG Reader and Writer Filters
//!
//! Wrappers over `jpeg-decoder` / `jpeg-encoder`. Same shape as the PNG
//! pair: collect, decode, emit per scan line; buffer, encode with the
//! requested quality (0-100), emit the stream.

use std::collections::VecDeque;

use fcom_domain::services::filter::{Filter, FilterSpec, FilterStatus};
use fcom_domain::value_objects::pixel_format::PixelFormat;
use fcom_domain::{Command, FcomError};

/// Collects a JPEG stream, then emits one scan line per chunk.
pub struct JpegReader {
    buf: Vec<u8>,
    lines: VecDeque<Vec<u8>>,
    decoded: bool,
}

impl JpegReader {
    pub fn new() -> Self {
        JpegReader {
            buf: Vec::new(),
            lines: VecDeque::new(),
            decoded: false,
        }
    }

    fn decode(&mut self, cmd: &mut Command) -> Result<(), FcomError> {
        let mut decoder = jpeg_decoder::Decoder::new(std::io::Cursor::new(self.buf.as_slice()));
        let pixels = decoder
            .decode()
            .map_err(|e| FcomError::Format(format!("jpeg: {}", e)))?;
        let info = decoder
            .info()
            .ok_or_else(|| FcomError::Format("jpeg: no image info".into()))?;

        if info.pixel_format != jpeg_decoder::PixelFormat::RGB24 {
            return Err(FcomError::Unsupported(format!(
                "jpeg pixel format {:?}",
                info.pixel_format
            )));
        }

        cmd.pic.width = info.width as u32;
        cmd.pic.height = info.height as u32;
        cmd.pic.in_format = Some(PixelFormat::Rgb);
        cmd.pic.input_reverse = false;

        let line = info.width as usize * 3;
        for row in 0..info.height as usize {
            self.lines
                .push_back(pixels[row * line..(row + 1) * line].to_vec());
        }
        self.buf.clear();
        Ok(())
    }
}

impl Default for JpegReader {
    fn default() -> Self {
        Self::new()
    }
}

impl Filter for JpegReader {
    fn name(&self) -> &str {
        "pic.jpg-in"
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

/// Buffers scan lines and encodes a JPEG on the final one.
pub struct JpegWriter {
    quality: u8,
    started: bool,
    lines: Vec<Vec<u8>>,
    out_queue: VecDeque<Vec<u8>>,
    encoded: bool,
}

impl JpegWriter {
    pub fn new(quality: u8) -> Self {
        JpegWriter {
            quality: quality.min(100),
            started: false,
            lines: Vec::new(),
            out_queue: VecDeque::new(),
            encoded: false,
        }
    }

    fn encode(&mut self, cmd: &mut Command) -> Result<(), FcomError> {
        if cmd.pic.width > u16::MAX as u32 || cmd.pic.height > u16::MAX as u32 {
            return Err(FcomError::Unsupported(format!(
                "jpeg: image {}x{} too large",
                cmd.pic.width, cmd.pic.height
            )));
        }

        if cmd.pic.input_reverse {
            self.lines.reverse();
        }
        let mut data = Vec::with_capacity(self.lines.iter().map(Vec::len).sum());
        for l in &self.lines {
            data.extend_from_slice(l);
        }
        self.lines.clear();

        let mut out = Vec::new();
        let encoder = jpeg_encoder::Encoder::new(&mut out, self.quality);
        encoder
            .encode(
                &data,
                cmd.pic.width as u16,
                cmd.pic.height as u16,
                jpeg_encoder::ColorType::Rgb,
            )
            .map_err(|e| FcomError::Format(format!("jpeg: {}", e)))?;

        for chunk in out.chunks(cmd.buffer_size.max(1)) {
            self.out_queue.push_back(chunk.to_vec());
        }
        Ok(())
    }
}

impl Filter for JpegWriter {
    fn name(&self) -> &str {
        "pic.jpg-out"
    }

    fn process(&mut self, cmd: &mut Command) -> Result<FilterStatus, FcomError> {
        if !self.started {
            let Some(incoming) = cmd.pic.in_format else {
                return Err(FcomError::Internal("jpeg writer: no picture format".into()));
            };
            // JPEG has no alpha channel; everything converges on RGB.
            if incoming != PixelFormat::Rgb {
                cmd.pic.out_format = Some(PixelFormat::Rgb);
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
