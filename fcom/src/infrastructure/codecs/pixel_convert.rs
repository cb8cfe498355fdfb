// /////////////////////////////////////////////////////////////////////////////
// Fcom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Pixel Converter and Crop Filters
//!
//! The converter is the filter an image writer requests with `Back` when
//! the incoming scan-line format does not match what it can store. It is
//! stateless per line: on open it captures `pic.in_format -> out_format`,
//! re-declares `pic.in_format` as the target (downstream now sees
//! converted lines), and translates each chunk through the domain
//! conversion matrix.
//!
//! The crop filter narrows the picture to a rectangle before conversion
//! or encoding: it slices each kept line and drops the rest, adjusting
//! the declared picture dimensions at open.

use fcom_domain::services::filter::{Filter, FilterStatus, OpenResult};
use fcom_domain::value_objects::pixel_format::{convert_line, PixelFormat};
use fcom_domain::{Command, FcomError};

/// Per-line pixel format converter, inserted via `Back`.
pub struct PixelConvert {
    from: PixelFormat,
    to: PixelFormat,
}

impl PixelConvert {
    pub fn new() -> Self {
        // Real formats arrive at open; identity placeholders until then.
        PixelConvert {
            from: PixelFormat::Rgb,
            to: PixelFormat::Rgb,
        }
    }
}

impl Default for PixelConvert {
    fn default() -> Self {
        Self::new()
    }
}

impl Filter for PixelConvert {
    fn name(&self) -> &str {
        "pic.convert"
    }

    fn open(&mut self, cmd: &mut Command) -> Result<OpenResult, FcomError> {
        let from = cmd
            .pic
            .in_format
            .ok_or_else(|| FcomError::Internal("pixel convert: no input format".into()))?;
        let to = cmd
            .pic
            .out_format
            .ok_or_else(|| FcomError::Internal("pixel convert: no output format".into()))?;
        if from == to {
            return Ok(OpenResult::Skip);
        }
        self.from = from;
        self.to = to;
        // Downstream filters now see converted lines.
        cmd.pic.in_format = Some(to);
        tracing::debug!("pixel convert {} -> {}", from, to);
        Ok(OpenResult::Open)
    }

    fn process(&mut self, cmd: &mut Command) -> Result<FilterStatus, FcomError> {
        let data = std::mem::take(&mut cmd.data_in);
        if data.is_empty() {
            return Ok(if cmd.in_last {
                FilterStatus::OutputDone
            } else {
                FilterStatus::More
            });
        }

        let in_bpp = self.from.bytes_per_pixel();
        if data.len() % in_bpp != 0 {
            return Err(FcomError::Format(format!(
                "scan line of {} bytes is not a whole number of {} pixels",
                data.len(),
                self.from
            )));
        }
        let pixels = data.len() / in_bpp;
        let mut out = vec![0u8; pixels * self.to.bytes_per_pixel()];
        convert_line(self.from, &data, self.to, &mut out, pixels)?;
        cmd.data_out = out;
        Ok(if cmd.in_last {
            FilterStatus::OutputDone
        } else {
            FilterStatus::Data
        })
    }
}

/// Crop rectangle in image coordinates (top-left origin).
#[derive(Debug, Clone, Copy)]
pub struct CropRect {
    pub width: u32,
    pub height: u32,
    pub x: u32,
    pub y: u32,
}

impl std::str::FromStr for CropRect {
    type Err = FcomError;

    /// `WxH` or `WxH+X+Y`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || FcomError::Usage(format!("bad crop spec '{}', expected WxH[+X+Y]", s));
        let (size, rest) = match s.split_once('+') {
            Some((size, rest)) => (size, Some(rest)),
            None => (s, None),
        };
        let (w, h) = size.split_once('x').ok_or_else(err)?;
        let (x, y) = match rest {
            Some(rest) => {
                let (x, y) = rest.split_once('+').ok_or_else(err)?;
                (x.parse().map_err(|_| err())?, y.parse().map_err(|_| err())?)
            }
            None => (0, 0),
        };
        Ok(CropRect {
            width: w.parse().map_err(|_| err())?,
            height: h.parse().map_err(|_| err())?,
            x,
            y,
        })
    }
}

/// Drops lines and columns outside the crop rectangle.
pub struct Crop {
    rect: CropRect,
    orig_height: u32,
    bpp: usize,
    reverse: bool,
    seen: u32,
    emitted: u32,
}

impl Crop {
    pub fn new(rect: CropRect) -> Self {
        Crop {
            rect,
            orig_height: 0,
            bpp: 0,
            reverse: false,
            seen: 0,
            emitted: 0,
        }
    }
}

impl Filter for Crop {
    fn name(&self) -> &str {
        "pic.crop"
    }

    fn open(&mut self, cmd: &mut Command) -> Result<OpenResult, FcomError> {
        let format = cmd
            .pic
            .in_format
            .ok_or_else(|| FcomError::Internal("crop: no input format".into()))?;
        if self.rect.x >= cmd.pic.width || self.rect.y >= cmd.pic.height {
            return Err(FcomError::Usage(format!(
                "crop origin {}+{} outside the {}x{} image",
                self.rect.x, self.rect.y, cmd.pic.width, cmd.pic.height
            )));
        }
        self.rect.width = self.rect.width.min(cmd.pic.width - self.rect.x);
        self.rect.height = self.rect.height.min(cmd.pic.height - self.rect.y);
        self.orig_height = cmd.pic.height;
        self.bpp = format.bytes_per_pixel();
        self.reverse = cmd.pic.input_reverse;

        cmd.pic.width = self.rect.width;
        cmd.pic.height = self.rect.height;
        Ok(OpenResult::Open)
    }

    fn process(&mut self, cmd: &mut Command) -> Result<FilterStatus, FcomError> {
        let data = std::mem::take(&mut cmd.data_in);
        if data.is_empty() {
            if cmd.in_last || self.emitted == self.rect.height {
                return Ok(FilterStatus::OutputDone);
            }
            return Ok(FilterStatus::More);
        }

        // Delivery order may be bottom-up; map to image coordinates.
        let image_row = if self.reverse {
            self.orig_height - 1 - self.seen
        } else {
            self.seen
        };
        self.seen += 1;

        let keep = image_row >= self.rect.y && image_row < self.rect.y + self.rect.height;
        if !keep {
            if cmd.in_last || self.seen == self.orig_height {
                return Ok(if self.emitted == self.rect.height {
                    FilterStatus::OutputDone
                } else {
                    FilterStatus::More
                });
            }
            return Ok(FilterStatus::More);
        }

        let start = self.rect.x as usize * self.bpp;
        let end = start + self.rect.width as usize * self.bpp;
        if end > data.len() {
            return Err(FcomError::Format("crop: short scan line".into()));
        }
        cmd.data_out = data[start..end].to_vec();
        self.emitted += 1;
        if self.emitted == self.rect.height {
            return Ok(FilterStatus::OutputDone);
        }
        Ok(FilterStatus::Data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_filter_translates_lines() {
        let mut cmd = Command::new("test");
        cmd.pic.in_format = Some(PixelFormat::Rgb);
        cmd.pic.out_format = Some(PixelFormat::Bgr);
        let mut f = PixelConvert::new();
        assert_eq!(f.open(&mut cmd).unwrap(), OpenResult::Open);
        // Downstream sees the converted declaration.
        assert_eq!(cmd.pic.in_format, Some(PixelFormat::Bgr));

        cmd.data_in = vec![1, 2, 3, 4, 5, 6];
        assert_eq!(f.process(&mut cmd).unwrap(), FilterStatus::Data);
        assert_eq!(cmd.take_out(), vec![3, 2, 1, 6, 5, 4]);
    }

    #[test]
    fn test_convert_identity_skips() {
        let mut cmd = Command::new("test");
        cmd.pic.in_format = Some(PixelFormat::Rgb);
        cmd.pic.out_format = Some(PixelFormat::Rgb);
        let mut f = PixelConvert::new();
        assert_eq!(f.open(&mut cmd).unwrap(), OpenResult::Skip);
    }

    #[test]
    fn test_crop_spec_parse() {
        let r: CropRect = "100x50".parse().unwrap();
        assert_eq!((r.width, r.height, r.x, r.y), (100, 50, 0, 0));
        let r: CropRect = "16x16+4+8".parse().unwrap();
        assert_eq!((r.width, r.height, r.x, r.y), (16, 16, 4, 8));
        assert!("16by16".parse::<CropRect>().is_err());
    }

    #[test]
    fn test_crop_slices_rows_and_columns() {
        // 3x3 RGB image, crop the center pixel.
        let mut cmd = Command::new("test");
        cmd.pic.width = 3;
        cmd.pic.height = 3;
        cmd.pic.in_format = Some(PixelFormat::Rgb);
        let mut f = Crop::new("1x1+1+1".parse().unwrap());
        f.open(&mut cmd).unwrap();
        assert_eq!(cmd.pic.width, 1);
        assert_eq!(cmd.pic.height, 1);

        // Row 0: dropped.
        cmd.data_in = vec![0u8; 9];
        assert_eq!(f.process(&mut cmd).unwrap(), FilterStatus::More);
        // Row 1: center pixel kept.
        cmd.data_in = vec![0, 0, 0, 7, 8, 9, 0, 0, 0];
        assert_eq!(f.process(&mut cmd).unwrap(), FilterStatus::OutputDone);
        assert_eq!(cmd.take_out(), vec![7, 8, 9]);
    }

    #[test]
    fn test_crop_clamps_to_image() {
        let mut cmd = Command::new("test");
        cmd.pic.width = 4;
        cmd.pic.height = 4;
        cmd.pic.in_format = Some(PixelFormat::Rgb);
        let mut f = Crop::new("100x100+2+2".parse().unwrap());
        f.open(&mut cmd).unwrap();
        assert_eq!(cmd.pic.width, 2);
        assert_eq!(cmd.pic.height, 2);
    }

    #[test]
    fn test_crop_origin_outside_rejected() {
        let mut cmd = Command::new("test");
        cmd.pic.width = 4;
        cmd.pic.height = 4;
        cmd.pic.in_format = Some(PixelFormat::Rgb);
        let mut f = Crop::new("1x1+9+0".parse().unwrap());
        assert!(f.open(&mut cmd).is_err());
    }
}
