// /////////////////////////////////////////////////////////////////////////////
// Fcom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # `pic` - image transcoding
//!
//! Reader and writer are chosen by file extension (bmp/png/jpg). The
//! reader emits one scan line per chunk; the writer demands the pixel
//! layout it can store and requests the converter via `Back` when the
//! incoming layout differs. Optional crop and forced output format slot
//! in between.

use std::path::Path;

use clap::Parser;

use fcom_domain::services::filter::Filter;
use fcom_domain::value_objects::pixel_format::PixelFormat;
use fcom_domain::{Command, FcomError};

use crate::infrastructure::codecs::bmp::{BmpReader, BmpWriter};
use crate::infrastructure::codecs::jpeg_pic::{JpegReader, JpegWriter};
use crate::infrastructure::codecs::pixel_convert::{Crop, CropRect, PixelConvert};
use crate::infrastructure::codecs::png_pic::{PngReader, PngWriter};
use crate::infrastructure::filters::{FileReader, FileWriter};
use crate::infrastructure::runtime::registry::OperationTemplate;
use crate::infrastructure::runtime::RuntimeHandle;

use super::{parse_op_args, BuiltinModule, CommonOpts};

const HELP: &str = "\
Convert images between BMP, PNG and JPEG.
Usage:
  `fcom pic` INPUT -o OUTPUT [OPTIONS]

OPTIONS:
    `--crop` WxH[+X+Y]       Crop to the rectangle
    `--out-format` FMT       Force pixel format (rgb|bgr|rgba|bgra|abgr)
    `--png-level` N          PNG compression level 0..9 (default 6)
    `--jpeg-quality` N       JPEG quality 0..100 (default 85)
";

#[derive(Debug, Parser)]
#[command(name = "pic", disable_help_flag = true)]
struct PicArgs {
    #[command(flatten)]
    common: CommonOpts,

    /// Crop rectangle.
    #[arg(long = "crop", value_name = "WxH[+X+Y]")]
    crop: Option<String>,

    /// Convert scan lines to this pixel format before encoding.
    #[arg(long = "out-format", value_name = "FMT")]
    out_format: Option<String>,

    /// PNG compression level.
    #[arg(long = "png-level", default_value_t = 6)]
    png_level: u32,

    /// JPEG quality.
    #[arg(long = "jpeg-quality", default_value_t = 85)]
    jpeg_quality: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PicFormat {
    Bmp,
    Png,
    Jpeg,
}

fn format_of(path: &Path) -> Result<PicFormat, FcomError> {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "bmp" => Ok(PicFormat::Bmp),
        "png" => Ok(PicFormat::Png),
        "jpg" | "jpeg" => Ok(PicFormat::Jpeg),
        other => Err(FcomError::Usage(format!(
            "{}: unknown image extension '{}'",
            path.display(),
            other
        ))),
    }
}

fn build(
    _rt: &RuntimeHandle,
    cmd: &mut Command,
    args: &[String],
) -> Result<Vec<Box<dyn Filter>>, FcomError> {
    let parsed: PicArgs = parse_op_args("pic", args)?;
    if parsed.common.inputs.len() != 1 {
        return Err(FcomError::Usage("pic expects exactly one input image".into()));
    }
    let Some(output) = parsed.common.output.clone() else {
        return Err(FcomError::Usage("pic: output file required (-o)".into()));
    };
    parsed.common.apply(cmd)?;

    let input = parsed.common.inputs[0].clone();
    cmd.input.path = Some(input.clone());

    let reader: Box<dyn Filter> = match format_of(&input)? {
        PicFormat::Bmp => Box::new(BmpReader::new()),
        PicFormat::Png => Box::new(PngReader::new()),
        PicFormat::Jpeg => Box::new(JpegReader::new()),
    };
    let writer: Box<dyn Filter> = match format_of(&output)? {
        PicFormat::Bmp => Box::new(BmpWriter::new()),
        PicFormat::Png => Box::new(PngWriter::new(parsed.png_level)),
        PicFormat::Jpeg => Box::new(JpegWriter::new(parsed.jpeg_quality)),
    };

    let mut chain: Vec<Box<dyn Filter>> = Vec::new();
    chain.push(Box::new(FileReader::for_path(input)));
    chain.push(reader);
    if let Some(crop) = &parsed.crop {
        let rect: CropRect = crop.parse()?;
        chain.push(Box::new(Crop::new(rect)));
    }
    if let Some(fmt) = &parsed.out_format {
        let fmt: PixelFormat = fmt.parse()?;
        cmd.pic.out_format = Some(fmt);
        chain.push(Box::new(PixelConvert::new()));
    }
    chain.push(writer);
    chain.push(Box::new(FileWriter::new()));
    Ok(chain)
}

static CONVERT_OP: OperationTemplate = OperationTemplate {
    name: "convert",
    help: HELP,
    build,
};

pub static MODULE: BuiltinModule = BuiltinModule {
    name: "pic",
    ops: &[&CONVERT_OP],
    filters: &[("pic.convert", || Box::new(PixelConvert::new()))],
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_by_extension() {
        assert_eq!(format_of(Path::new("a.BMP")).unwrap(), PicFormat::Bmp);
        assert_eq!(format_of(Path::new("a.png")).unwrap(), PicFormat::Png);
        assert_eq!(format_of(Path::new("a.jpeg")).unwrap(), PicFormat::Jpeg);
        assert!(format_of(Path::new("a.gif")).is_err());
    }
}
