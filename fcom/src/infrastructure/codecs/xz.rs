// /////////////////////////////////////////////////////////////////////////////
// Fcom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! xz stream coding over liblzma's push interface.

use xz2::stream::{Action, Check, Status, Stream};

use fcom_domain::FcomError;

use super::stream::{StreamDecoder, StreamEncoder};

const OUT_STEP: usize = 32 * 1024;

pub struct XzEncoder {
    preset: u32,
    stream: Option<Stream>,
}

impl XzEncoder {
    pub fn new(preset: u32) -> Self {
        XzEncoder {
            preset: preset.min(9),
            stream: None,
        }
    }
}

fn pump(
    stream: &mut Stream,
    mut input: &[u8],
    out: &mut Vec<u8>,
    finish: bool,
) -> Result<bool, FcomError> {
    loop {
        let before_in = stream.total_in();
        out.reserve(OUT_STEP);
        let action = if finish { Action::Finish } else { Action::Run };
        let status = stream
            .process_vec(input, out, action)
            .map_err(|e| FcomError::Format(format!("lzma: {}", e)))?;
        let consumed = (stream.total_in() - before_in) as usize;
        input = &input[consumed..];
        match status {
            Status::StreamEnd => return Ok(true),
            _ => {
                if input.is_empty() && !finish {
                    return Ok(false);
                }
            }
        }
    }
}

impl StreamEncoder for XzEncoder {
    fn reset(&mut self) -> Result<(), FcomError> {
        self.stream = Some(
            Stream::new_easy_encoder(self.preset, Check::Crc64)
                .map_err(|e| FcomError::Format(format!("lzma encoder: {}", e)))?,
        );
        Ok(())
    }

    fn encode(&mut self, input: &[u8], out: &mut Vec<u8>, finish: bool) -> Result<(), FcomError> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| FcomError::Internal("xz encoder not reset".into()))?;
        pump(stream, input, out, finish)?;
        Ok(())
    }

    fn suffix(&self) -> &'static str {
        ".xz"
    }
}

pub struct XzDecoder {
    stream: Option<Stream>,
}

impl XzDecoder {
    pub fn new() -> Self {
        XzDecoder { stream: None }
    }
}

impl Default for XzDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamDecoder for XzDecoder {
    fn reset(&mut self) -> Result<(), FcomError> {
        self.stream = Some(
            Stream::new_stream_decoder(u64::MAX, 0)
                .map_err(|e| FcomError::Format(format!("lzma decoder: {}", e)))?,
        );
        Ok(())
    }

    fn decode(&mut self, input: &mut Vec<u8>, out: &mut Vec<u8>) -> Result<bool, FcomError> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| FcomError::Internal("xz decoder not reset".into()))?;
        loop {
            if input.is_empty() {
                return Ok(false);
            }
            let before_in = stream.total_in();
            let before_out = stream.total_out();
            out.reserve(OUT_STEP);
            let status = stream
                .process_vec(input, out, Action::Run)
                .map_err(|e| FcomError::Format(format!("lzma: {}", e)))?;
            let consumed = (stream.total_in() - before_in) as usize;
            input.drain(..consumed);
            match status {
                Status::StreamEnd => return Ok(true),
                _ => {
                    if consumed == 0 && stream.total_out() == before_out {
                        // No progress without more input.
                        return Ok(false);
                    }
                }
            }
        }
    }

    fn suffix(&self) -> &'static str {
        ".xz"
    }
}
