// /////////////////////////////////////////////////////////////////////////////
// Fcom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # `arc` - archive pack/unpack operations
//!
//! gz, xz, zstd, zip, 7z (unpack), ISO (unpack) and ICO. The bare names
//! (`gz`, `unzip`, ...) are registry aliases onto this module.
//!
//! `arc.gz` is the multi-file packer: one subtask pipeline per input file
//! submitted to the worker pool, with the parent parked (`Async`) while
//! subtasks run and resumed by the last completion monitor.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use fcom_domain::services::filter::{Filter, FilterStatus};
use fcom_domain::value_objects::input_filter::InputFilter;
use fcom_domain::{Command, FcomError};

use crate::infrastructure::codecs::gz::{GzReader, GzWriter};
use crate::infrastructure::codecs::ico::{IcoPack, IcoUnpack};
use crate::infrastructure::codecs::iso::IsoReader;
use crate::infrastructure::codecs::sevenz::SevenZUnpack;
use crate::infrastructure::codecs::stream::{StreamPack, StreamUnpack};
use crate::infrastructure::codecs::xz::{XzDecoder, XzEncoder};
use crate::infrastructure::codecs::zip_arc::{ZipMethod, ZipPack, ZipUnpack};
use crate::infrastructure::codecs::zstd_stream::{ZstdEncoder, ZstdStreamDecoder};
use crate::infrastructure::filters::{FileReader, FileWriter};
use crate::infrastructure::runtime::input::ArgIterator;
use crate::infrastructure::runtime::pipeline::{FilterResolver, Pipeline};
use crate::infrastructure::runtime::registry::OperationTemplate;
use crate::infrastructure::runtime::worker_pool::SubtaskTracker;
use crate::infrastructure::runtime::RuntimeHandle;

use super::{parse_op_args, BuiltinModule, CommonOpts};

const GZ_HELP: &str = "\
Pack each input file into `.gz` (one subtask per file).
Usage:
  `fcom gz` INPUT... [-C OUTDIR] [OPTIONS]
OPTIONS:
    `-l`, `--level` N     Compression level 0..9 (default 6)
";

const UNGZ_HELP: &str = "\
Unpack `.gz` files, restoring the embedded name and mtime.
Usage:
  `fcom ungz` INPUT... [-C OUTDIR] [-o OUTPUT]
";

const XZ_HELP: &str = "\
Pack each input file into `.xz`.
Usage:
  `fcom xz` INPUT... [-C OUTDIR] [-l LEVEL]
";

const UNXZ_HELP: &str = "\
Unpack `.xz` files.
Usage:
  `fcom unxz` INPUT... [-C OUTDIR]
";

const ZST_HELP: &str = "\
Pack each input file into `.zst`.
Usage:
  `fcom zst` INPUT... [-C OUTDIR] [-l LEVEL]
";

const UNZST_HELP: &str = "\
Unpack `.zst` files.
Usage:
  `fcom unzst` INPUT... [-C OUTDIR]
";

const ZIP_HELP: &str = "\
Pack files and directories into a `.zip` archive.
Usage:
  `fcom zip` INPUT... -o ARCHIVE [OPTIONS]
OPTIONS:
    `--method` M          store | deflate | zstd (default deflate)
";

const UNZIP_HELP: &str = "\
List or extract `.zip` archives.
Usage:
  `fcom unzip` ARCHIVE... [-C OUTDIR] [--members WILDCARD] [--show]
";

const UN7Z_HELP: &str = "\
Extract `.7z` archives.
Usage:
  `fcom un7z` ARCHIVE... [-C OUTDIR] [--members WILDCARD] [--show]
";

const UNISO_HELP: &str = "\
List or extract ISO-9660 images.
Usage:
  `fcom uniso` IMAGE... [-C OUTDIR] [--members WILDCARD] [--show]
";

const ICO_HELP: &str = "\
Pack PNG/BMP images into an `.ico` icon.
Usage:
  `fcom ico` IMAGE... -o ICON
";

const UNICO_HELP: &str = "\
List or extract the images inside `.ico` files.
Usage:
  `fcom unico` ICON... [-C OUTDIR] [--show]
";

#[derive(Debug, Parser)]
#[command(disable_help_flag = true)]
struct PackArgs {
    #[command(flatten)]
    common: CommonOpts,

    /// Compression level.
    #[arg(short = 'l', long = "level", default_value_t = 6)]
    level: u32,
}

#[derive(Debug, Parser)]
#[command(disable_help_flag = true)]
struct PlainArcArgs {
    #[command(flatten)]
    common: CommonOpts,
}

#[derive(Debug, Parser)]
#[command(disable_help_flag = true)]
struct ZipPackArgs {
    #[command(flatten)]
    common: CommonOpts,

    /// Member compression method.
    #[arg(long = "method", default_value = "deflate")]
    method: String,
}

#[derive(Debug, Parser)]
#[command(disable_help_flag = true)]
struct UnpackArgs {
    #[command(flatten)]
    common: CommonOpts,

    /// Extract only members matching the wildcard (repeatable).
    #[arg(long = "members", value_name = "WILDCARD")]
    members: Vec<String>,
}

impl UnpackArgs {
    fn member_filter(&self) -> Result<InputFilter, FcomError> {
        InputFilter::new(&self.members, &[])
    }
}

// === Multi-file gz packer ===

struct GzPackDriver {
    rt: RuntimeHandle,
    args: Option<ArgIterator>,
    level: u32,
    outdir: Option<PathBuf>,
    explicit_output: Option<PathBuf>,
    output_used: bool,
    spawned_all: bool,
    tracker: Option<Arc<SubtaskTracker>>,
}

impl GzPackDriver {
    fn spawn_one(
        &mut self,
        cmd: &Command,
        input: PathBuf,
        name: &str,
    ) -> Result<(), FcomError> {
        let output = match &self.explicit_output {
            Some(out) => {
                if self.output_used {
                    return Err(FcomError::Usage(
                        "a single output file cannot hold multiple inputs".into(),
                    ));
                }
                self.output_used = true;
                out.clone()
            }
            None => {
                let base = PathBuf::from(name)
                    .file_name()
                    .map(|n| format!("{}.gz", n.to_string_lossy()))
                    .unwrap_or_else(|| "out.gz".into());
                self.outdir
                    .clone()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join(base)
            }
        };

        let mut sub = Command::new("arc.gz1");
        sub.buffer_size = cmd.buffer_size;
        sub.codepage = cmd.codepage;
        sub.share_stop(cmd.stop_flag());
        sub.input.path = Some(input.clone());
        sub.output.path = Some(output);

        let mut pipeline = Box::new(Pipeline::new(
            sub,
            Arc::clone(&self.rt.registry) as Arc<dyn FilterResolver>,
        ));
        pipeline.push(Box::new(FileReader::for_path(input)));
        pipeline.push(Box::new(GzWriter::new(self.level)));
        pipeline.push(Box::new(FileWriter::new()));

        let tracker = self.tracker.get_or_insert_with(|| {
            SubtaskTracker::new(Arc::clone(&self.rt.pool), cmd.pipeline_id)
        });
        let monitor = tracker.monitor();
        self.rt.pool.submit(pipeline, Some(monitor));
        Ok(())
    }
}

impl Filter for GzPackDriver {
    fn name(&self) -> &str {
        "arc.gz"
    }

    fn process(&mut self, cmd: &mut Command) -> Result<FilterStatus, FcomError> {
        loop {
            if cmd.is_stopped() {
                return Err(FcomError::Cancelled);
            }
            if self.spawned_all {
                if let Some(tracker) = &self.tracker {
                    if !tracker.idle() {
                        return Ok(FilterStatus::Async);
                    }
                    if tracker.any_failed() {
                        return Err(FcomError::Sys(
                            "one or more files failed to pack".into(),
                        ));
                    }
                }
                return Ok(FilterStatus::Done);
            }

            let Some(entry) = self.args.as_mut().and_then(|a| a.next_file()) else {
                self.spawned_all = true;
                continue;
            };
            tracing::info!("{}", entry.name);
            self.spawn_one(cmd, entry.path(), &entry.name)?;

            if !self.rt.pool.available() {
                // Park until a subtask frees a worker.
                return Ok(FilterStatus::Async);
            }
        }
    }
}

// === builders ===

fn build_gz(
    rt: &RuntimeHandle,
    cmd: &mut Command,
    args: &[String],
) -> Result<Vec<Box<dyn Filter>>, FcomError> {
    let parsed: PackArgs = parse_op_args("gz", args)?;
    parsed.common.apply(cmd)?;
    let iter = parsed.common.arg_iterator()?;
    Ok(vec![Box::new(GzPackDriver {
        rt: rt.clone(),
        args: Some(iter),
        level: parsed.level.min(9),
        outdir: parsed.common.outdir.clone(),
        explicit_output: parsed.common.output.clone(),
        output_used: false,
        spawned_all: false,
        tracker: None,
    })])
}

fn build_ungz(
    _rt: &RuntimeHandle,
    cmd: &mut Command,
    args: &[String],
) -> Result<Vec<Box<dyn Filter>>, FcomError> {
    let parsed: PlainArcArgs = parse_op_args("ungz", args)?;
    parsed.common.apply(cmd)?;
    let iter = parsed.common.arg_iterator()?;
    Ok(vec![
        Box::new(GzReader::new(iter, parsed.common.outdir.clone())),
        Box::new(FileWriter::new()),
    ])
}

fn build_xz(
    _rt: &RuntimeHandle,
    cmd: &mut Command,
    args: &[String],
) -> Result<Vec<Box<dyn Filter>>, FcomError> {
    let parsed: PackArgs = parse_op_args("xz", args)?;
    parsed.common.apply(cmd)?;
    let iter = parsed.common.arg_iterator()?;
    Ok(vec![
        Box::new(StreamPack::new(
            "arc.xz",
            XzEncoder::new(parsed.level),
            iter,
            parsed.common.outdir.clone(),
        )),
        Box::new(FileWriter::new()),
    ])
}

fn build_unxz(
    _rt: &RuntimeHandle,
    cmd: &mut Command,
    args: &[String],
) -> Result<Vec<Box<dyn Filter>>, FcomError> {
    let parsed: PlainArcArgs = parse_op_args("unxz", args)?;
    parsed.common.apply(cmd)?;
    let iter = parsed.common.arg_iterator()?;
    Ok(vec![
        Box::new(StreamUnpack::new(
            "arc.unxz",
            XzDecoder::new(),
            iter,
            parsed.common.outdir.clone(),
        )),
        Box::new(FileWriter::new()),
    ])
}

fn build_zst(
    _rt: &RuntimeHandle,
    cmd: &mut Command,
    args: &[String],
) -> Result<Vec<Box<dyn Filter>>, FcomError> {
    let parsed: PackArgs = parse_op_args("zst", args)?;
    parsed.common.apply(cmd)?;
    let iter = parsed.common.arg_iterator()?;
    Ok(vec![
        Box::new(StreamPack::new(
            "arc.zst",
            ZstdEncoder::new(parsed.level as i32),
            iter,
            parsed.common.outdir.clone(),
        )),
        Box::new(FileWriter::new()),
    ])
}

fn build_unzst(
    _rt: &RuntimeHandle,
    cmd: &mut Command,
    args: &[String],
) -> Result<Vec<Box<dyn Filter>>, FcomError> {
    let parsed: PlainArcArgs = parse_op_args("unzst", args)?;
    parsed.common.apply(cmd)?;
    let iter = parsed.common.arg_iterator()?;
    Ok(vec![
        Box::new(StreamUnpack::new(
            "arc.unzst",
            ZstdStreamDecoder::new(),
            iter,
            parsed.common.outdir.clone(),
        )),
        Box::new(FileWriter::new()),
    ])
}

fn build_zip(
    _rt: &RuntimeHandle,
    cmd: &mut Command,
    args: &[String],
) -> Result<Vec<Box<dyn Filter>>, FcomError> {
    let parsed: ZipPackArgs = parse_op_args("zip", args)?;
    let method: ZipMethod = parsed.method.parse()?;
    parsed.common.apply(cmd)?;
    let iter = parsed.common.arg_iterator()?;
    Ok(vec![
        Box::new(ZipPack::new(iter, method)),
        Box::new(FileWriter::new()),
    ])
}

fn build_unzip(
    _rt: &RuntimeHandle,
    cmd: &mut Command,
    args: &[String],
) -> Result<Vec<Box<dyn Filter>>, FcomError> {
    let parsed: UnpackArgs = parse_op_args("unzip", args)?;
    parsed.common.apply(cmd)?;
    let members = parsed.member_filter()?;
    let iter = parsed.common.arg_iterator()?;
    Ok(vec![
        Box::new(ZipUnpack::new(iter, parsed.common.outdir_or_cwd(), members)),
        Box::new(FileWriter::new()),
    ])
}

fn build_un7z(
    _rt: &RuntimeHandle,
    cmd: &mut Command,
    args: &[String],
) -> Result<Vec<Box<dyn Filter>>, FcomError> {
    let parsed: UnpackArgs = parse_op_args("un7z", args)?;
    parsed.common.apply(cmd)?;
    let members = parsed.member_filter()?;
    let iter = parsed.common.arg_iterator()?;
    Ok(vec![Box::new(SevenZUnpack::new(
        iter,
        parsed.common.outdir_or_cwd(),
        members,
    ))])
}

fn build_uniso(
    _rt: &RuntimeHandle,
    cmd: &mut Command,
    args: &[String],
) -> Result<Vec<Box<dyn Filter>>, FcomError> {
    let parsed: UnpackArgs = parse_op_args("uniso", args)?;
    parsed.common.apply(cmd)?;
    let members = parsed.member_filter()?;
    let iter = parsed.common.arg_iterator()?;
    Ok(vec![
        Box::new(IsoReader::new(iter, parsed.common.outdir_or_cwd(), members)),
        Box::new(FileWriter::new()),
    ])
}

fn build_ico(
    _rt: &RuntimeHandle,
    cmd: &mut Command,
    args: &[String],
) -> Result<Vec<Box<dyn Filter>>, FcomError> {
    let parsed: PlainArcArgs = parse_op_args("ico", args)?;
    parsed.common.apply(cmd)?;
    let iter = parsed.common.arg_iterator()?;
    Ok(vec![
        Box::new(IcoPack::new(iter)),
        Box::new(FileWriter::new()),
    ])
}

fn build_unico(
    _rt: &RuntimeHandle,
    cmd: &mut Command,
    args: &[String],
) -> Result<Vec<Box<dyn Filter>>, FcomError> {
    let parsed: UnpackArgs = parse_op_args("unico", args)?;
    parsed.common.apply(cmd)?;
    let members = parsed.member_filter()?;
    let iter = parsed.common.arg_iterator()?;
    Ok(vec![
        Box::new(IcoUnpack::new(iter, parsed.common.outdir_or_cwd(), members)),
        Box::new(FileWriter::new()),
    ])
}

static GZ_OP: OperationTemplate = OperationTemplate {
    name: "gz",
    help: GZ_HELP,
    build: build_gz,
};
static UNGZ_OP: OperationTemplate = OperationTemplate {
    name: "ungz",
    help: UNGZ_HELP,
    build: build_ungz,
};
static XZ_OP: OperationTemplate = OperationTemplate {
    name: "xz",
    help: XZ_HELP,
    build: build_xz,
};
static UNXZ_OP: OperationTemplate = OperationTemplate {
    name: "unxz",
    help: UNXZ_HELP,
    build: build_unxz,
};
static ZST_OP: OperationTemplate = OperationTemplate {
    name: "zst",
    help: ZST_HELP,
    build: build_zst,
};
static UNZST_OP: OperationTemplate = OperationTemplate {
    name: "unzst",
    help: UNZST_HELP,
    build: build_unzst,
};
static ZIP_OP: OperationTemplate = OperationTemplate {
    name: "zip",
    help: ZIP_HELP,
    build: build_zip,
};
static UNZIP_OP: OperationTemplate = OperationTemplate {
    name: "unzip",
    help: UNZIP_HELP,
    build: build_unzip,
};
static UN7Z_OP: OperationTemplate = OperationTemplate {
    name: "un7z",
    help: UN7Z_HELP,
    build: build_un7z,
};
static UNISO_OP: OperationTemplate = OperationTemplate {
    name: "uniso",
    help: UNISO_HELP,
    build: build_uniso,
};
static ICO_OP: OperationTemplate = OperationTemplate {
    name: "ico",
    help: ICO_HELP,
    build: build_ico,
};
static UNICO_OP: OperationTemplate = OperationTemplate {
    name: "unico",
    help: UNICO_HELP,
    build: build_unico,
};

pub static MODULE: BuiltinModule = BuiltinModule {
    name: "arc",
    ops: &[
        &GZ_OP, &UNGZ_OP, &XZ_OP, &UNXZ_OP, &ZST_OP, &UNZST_OP, &ZIP_OP, &UNZIP_OP, &UN7Z_OP,
        &UNISO_OP, &ICO_OP, &UNICO_OP,
    ],
    filters: &[],
};
