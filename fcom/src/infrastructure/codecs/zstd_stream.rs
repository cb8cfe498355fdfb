// /////////////////////////////////////////////////////////////////////////////
// Fcom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! zstd stream coding over the raw in/out-buffer operations.

use zstd::stream::raw::{Decoder as RawDecoder, Encoder as RawEncoder, InBuffer, Operation, OutBuffer};

use fcom_domain::FcomError;

use super::stream::{StreamDecoder, StreamEncoder};

const OUT_STEP: usize = 32 * 1024;

pub struct ZstdEncoder {
    level: i32,
    enc: Option<RawEncoder<'static>>,
}

impl ZstdEncoder {
    pub fn new(level: i32) -> Self {
        ZstdEncoder { level, enc: None }
    }
}

impl StreamEncoder for ZstdEncoder {
    fn reset(&mut self) -> Result<(), FcomError> {
        self.enc = Some(
            RawEncoder::new(self.level)
                .map_err(|e| FcomError::Format(format!("zstd encoder: {}", e)))?,
        );
        Ok(())
    }

    fn encode(&mut self, input: &[u8], out: &mut Vec<u8>, finish: bool) -> Result<(), FcomError> {
        let enc = self
            .enc
            .as_mut()
            .ok_or_else(|| FcomError::Internal("zstd encoder not reset".into()))?;

        let mut inb = InBuffer::around(input);
        let mut scratch = vec![0u8; OUT_STEP];
        while inb.pos() < input.len() {
            let mut outb = OutBuffer::around(&mut scratch[..]);
            enc.run(&mut inb, &mut outb)
                .map_err(|e| FcomError::Format(format!("zstd: {}", e)))?;
            out.extend_from_slice(outb.as_slice());
        }
        if finish {
            loop {
                let mut outb = OutBuffer::around(&mut scratch[..]);
                let remaining = enc
                    .finish(&mut outb, true)
                    .map_err(|e| FcomError::Format(format!("zstd finish: {}", e)))?;
                out.extend_from_slice(outb.as_slice());
                if remaining == 0 {
                    break;
                }
            }
        }
        Ok(())
    }

    fn suffix(&self) -> &'static str {
        ".zst"
    }
}

pub struct ZstdStreamDecoder {
    dec: Option<RawDecoder<'static>>,
}

impl ZstdStreamDecoder {
    pub fn new() -> Self {
        ZstdStreamDecoder { dec: None }
    }
}

impl Default for ZstdStreamDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamDecoder for ZstdStreamDecoder {
    fn reset(&mut self) -> Result<(), FcomError> {
        self.dec = Some(
            RawDecoder::new().map_err(|e| FcomError::Format(format!("zstd decoder: {}", e)))?,
        );
        Ok(())
    }

    fn decode(&mut self, input: &mut Vec<u8>, out: &mut Vec<u8>) -> Result<bool, FcomError> {
        let dec = self
            .dec
            .as_mut()
            .ok_or_else(|| FcomError::Internal("zstd decoder not reset".into()))?;

        let mut scratch = vec![0u8; OUT_STEP];
        let mut ended = false;
        let consumed_total;
        {
            let mut inb = InBuffer::around(input.as_slice());
            while inb.pos() < input.len() {
                let before = inb.pos();
                let mut outb = OutBuffer::around(&mut scratch[..]);
                let hint = dec
                    .run(&mut inb, &mut outb)
                    .map_err(|e| FcomError::Format(format!("zstd: {}", e)))?;
                out.extend_from_slice(outb.as_slice());
                if hint == 0 {
                    ended = true;
                    break;
                }
                if inb.pos() == before && outb.as_slice().is_empty() {
                    break;
                }
            }
            consumed_total = inb.pos();
        }
        input.drain(..consumed_total);
        Ok(ended)
    }

    fn suffix(&self) -> &'static str {
        ".zst"
    }
}
