// /////////////////////////////////////////////////////////////////////////////
// Fcom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Text operations: `hex`, `utf8`, `html`, `textcount`
//!
//! All four share the driver shape: per input file, insert a reader
//! upstream, fold or transform the stream, hand results downstream
//! (stdout unless `-o`).

use clap::Parser;

use fcom_domain::services::filter::{Filter, FilterSpec, FilterStatus};
use fcom_domain::{Command, FcomError};

use crate::infrastructure::codecs::text::{
    decode_codepage, extract_tag_attr, hex_dump, sniff_bom, to_utf8, FileStats, TotalStats,
};
use crate::infrastructure::filters::{FileReader, FileWriter};
use crate::infrastructure::runtime::input::ArgIterator;
use crate::infrastructure::runtime::registry::OperationTemplate;
use crate::infrastructure::runtime::RuntimeHandle;

use super::{parse_op_args, BuiltinModule, CommonOpts};

const HEX_HELP: &str = "\
Print file contents in hexadecimal format.
Usage:
  `fcom hex` INPUT... [OPTIONS]
";

const UTF8_HELP: &str = "\
Convert UTF-8/16 (with BOM) files to UTF-8 (without BOM).
Usage:
  `fcom utf8` INPUT... -o OUTPUT
";

const HTML_HELP: &str = "\
Parse HTML data.
Usage:
  `fcom html` INPUT... --filter TAG.ATTR [-o OUTPUT]
OPTIONS:
  `--filter` TAG.ATTR    Print all values of an HTML tag's attribute
";

const TEXTCOUNT_HELP: &str = "\
Count lines and bytes of text files.
Usage:
  `fcom textcount` INPUT... [OPTIONS]
";

#[derive(Debug, Parser)]
#[command(disable_help_flag = true)]
struct PlainArgs {
    #[command(flatten)]
    common: CommonOpts,
}

#[derive(Debug, Parser)]
#[command(disable_help_flag = true)]
struct HtmlArgs {
    #[command(flatten)]
    common: CommonOpts,

    /// `TAG.ATTR` selector, e.g. `a.href`.
    #[arg(long = "filter", value_name = "TAG.ATTR")]
    filter: String,
}

enum State {
    NextArg,
    Data,
}

/// Opens the next file through the iterator, honoring skip-errors.
fn next_source(
    args: &mut Option<ArgIterator>,
    cmd: &mut Command,
) -> Result<Option<String>, FcomError> {
    loop {
        let Some(entry) = args.as_mut().and_then(|a| a.next_file()) else {
            return Ok(None);
        };
        if let Err(e) = std::fs::File::open(entry.path()) {
            let err = FcomError::sys_path("open", &entry.name, &e);
            if cmd.skip_errors {
                tracing::warn!("{}", err);
                continue;
            }
            return Err(err);
        }
        cmd.input.path = Some(entry.path());
        cmd.insert_before(FilterSpec::Instance(Box::new(FileReader::for_path(
            entry.path(),
        ))));
        return Ok(Some(entry.name));
    }
}

// === hex ===

struct HexDriver {
    args: Option<ArgIterator>,
    state: State,
    current: String,
    offset: u64,
    heading_sent: bool,
}

impl Filter for HexDriver {
    fn name(&self) -> &str {
        "hex"
    }

    fn process(&mut self, cmd: &mut Command) -> Result<FilterStatus, FcomError> {
        loop {
            if cmd.is_stopped() {
                return Err(FcomError::Cancelled);
            }
            match self.state {
                State::NextArg => match next_source(&mut self.args, cmd)? {
                    None => return Ok(FilterStatus::Done),
                    Some(name) => {
                        self.current = name;
                        self.offset = 0;
                        self.heading_sent = false;
                        self.state = State::Data;
                        return Ok(FilterStatus::More);
                    }
                },
                State::Data => {
                    let data = std::mem::take(&mut cmd.data_in);
                    let mut out = String::new();
                    if !self.heading_sent {
                        self.heading_sent = true;
                        out.push_str(&format!("{}:\n", self.current));
                    }
                    hex_dump(&mut out, &data, self.offset);
                    self.offset += data.len() as u64;
                    if cmd.in_last {
                        out.push('\n');
                        cmd.data_out = out.into_bytes();
                        self.state = State::NextArg;
                        return Ok(FilterStatus::NextDone);
                    }
                    cmd.data_out = out.into_bytes();
                    return Ok(FilterStatus::Data);
                }
            }
        }
    }
}

// === utf8 ===

struct Utf8Driver {
    args: Option<ArgIterator>,
    state: State,
    current: String,
    buf: Vec<u8>,
}

impl Filter for Utf8Driver {
    fn name(&self) -> &str {
        "utf8"
    }

    fn process(&mut self, cmd: &mut Command) -> Result<FilterStatus, FcomError> {
        loop {
            if cmd.is_stopped() {
                return Err(FcomError::Cancelled);
            }
            match self.state {
                State::NextArg => match next_source(&mut self.args, cmd)? {
                    None => return Ok(FilterStatus::Done),
                    Some(name) => {
                        self.current = name;
                        self.buf.clear();
                        self.state = State::Data;
                        return Ok(FilterStatus::More);
                    }
                },
                State::Data => {
                    self.buf.extend_from_slice(&std::mem::take(&mut cmd.data_in));
                    if !cmd.in_last {
                        return Ok(FilterStatus::More);
                    }

                    let out = match sniff_bom(&self.buf) {
                        Some((enc, bom_len)) => to_utf8(&self.buf[bom_len..], enc),
                        None => {
                            if std::str::from_utf8(&self.buf).is_ok() {
                                // Already UTF-8 without BOM: not rewritten.
                                tracing::info!("{}: no BOM, skipping file", self.current);
                                self.state = State::NextArg;
                                continue;
                            }
                            // Not UTF-8 either: fall back to the code page.
                            decode_codepage(&self.buf, cmd.codepage)
                        }
                    };
                    self.buf.clear();
                    cmd.data_out = out;
                    self.state = State::NextArg;
                    return Ok(FilterStatus::NextDone);
                }
            }
        }
    }
}

// === html ===

struct HtmlDriver {
    args: Option<ArgIterator>,
    state: State,
    tag: String,
    attr: String,
    buf: Vec<u8>,
}

impl Filter for HtmlDriver {
    fn name(&self) -> &str {
        "html"
    }

    fn process(&mut self, cmd: &mut Command) -> Result<FilterStatus, FcomError> {
        loop {
            if cmd.is_stopped() {
                return Err(FcomError::Cancelled);
            }
            match self.state {
                State::NextArg => match next_source(&mut self.args, cmd)? {
                    None => return Ok(FilterStatus::Done),
                    Some(_) => {
                        self.buf.clear();
                        self.state = State::Data;
                        return Ok(FilterStatus::More);
                    }
                },
                State::Data => {
                    self.buf.extend_from_slice(&std::mem::take(&mut cmd.data_in));
                    if !cmd.in_last {
                        return Ok(FilterStatus::More);
                    }
                    let mut out = String::new();
                    for value in extract_tag_attr(&self.buf, &self.tag, &self.attr) {
                        out.push_str(&value);
                        out.push('\n');
                    }
                    self.buf.clear();
                    cmd.data_out = out.into_bytes();
                    self.state = State::NextArg;
                    return Ok(FilterStatus::NextDone);
                }
            }
        }
    }
}

// === textcount ===

struct TextCountDriver {
    args: Option<ArgIterator>,
    state: State,
    current: String,
    stats: FileStats,
    totals: TotalStats,
}

impl Filter for TextCountDriver {
    fn name(&self) -> &str {
        "textcount"
    }

    fn process(&mut self, cmd: &mut Command) -> Result<FilterStatus, FcomError> {
        loop {
            if cmd.is_stopped() {
                return Err(FcomError::Cancelled);
            }
            match self.state {
                State::NextArg => match next_source(&mut self.args, cmd)? {
                    None => {
                        println!("{}", self.totals.summary());
                        return Ok(FilterStatus::Fin);
                    }
                    Some(name) => {
                        self.current = name;
                        self.stats = FileStats::default();
                        self.state = State::Data;
                        return Ok(FilterStatus::More);
                    }
                },
                State::Data => {
                    let data = std::mem::take(&mut cmd.data_in);
                    self.stats.analyze(&data);
                    if cmd.in_last {
                        self.stats.finish();
                        tracing::info!("{}", self.stats.summary(&self.current));
                        self.totals.add(&self.stats);
                        self.state = State::NextArg;
                        continue;
                    }
                    return Ok(FilterStatus::More);
                }
            }
        }
    }
}

// === builders ===

fn stdout_default(cmd: &mut Command, common: &CommonOpts) {
    cmd.output.stdout = common.output.is_none();
}

fn build_hex(
    _rt: &RuntimeHandle,
    cmd: &mut Command,
    args: &[String],
) -> Result<Vec<Box<dyn Filter>>, FcomError> {
    let parsed: PlainArgs = parse_op_args("hex", args)?;
    parsed.common.apply(cmd)?;
    stdout_default(cmd, &parsed.common);
    let iter = parsed.common.arg_iterator()?;
    Ok(vec![
        Box::new(HexDriver {
            args: Some(iter),
            state: State::NextArg,
            current: String::new(),
            offset: 0,
            heading_sent: false,
        }),
        Box::new(FileWriter::new()),
    ])
}

fn build_utf8(
    _rt: &RuntimeHandle,
    cmd: &mut Command,
    args: &[String],
) -> Result<Vec<Box<dyn Filter>>, FcomError> {
    let parsed: PlainArgs = parse_op_args("utf8", args)?;
    parsed.common.apply(cmd)?;
    stdout_default(cmd, &parsed.common);
    let iter = parsed.common.arg_iterator()?;
    Ok(vec![
        Box::new(Utf8Driver {
            args: Some(iter),
            state: State::NextArg,
            current: String::new(),
            buf: Vec::new(),
        }),
        Box::new(FileWriter::new()),
    ])
}

fn build_html(
    _rt: &RuntimeHandle,
    cmd: &mut Command,
    args: &[String],
) -> Result<Vec<Box<dyn Filter>>, FcomError> {
    let parsed: HtmlArgs = parse_op_args("html", args)?;
    let (tag, attr) = parsed
        .filter
        .split_once('.')
        .ok_or_else(|| FcomError::Usage("--filter expects TAG.ATTR".into()))?;
    if tag.is_empty() || attr.is_empty() {
        return Err(FcomError::Usage("--filter expects TAG.ATTR".into()));
    }
    parsed.common.apply(cmd)?;
    stdout_default(cmd, &parsed.common);
    let iter = parsed.common.arg_iterator()?;
    Ok(vec![
        Box::new(HtmlDriver {
            args: Some(iter),
            state: State::NextArg,
            tag: tag.to_string(),
            attr: attr.to_string(),
            buf: Vec::new(),
        }),
        Box::new(FileWriter::new()),
    ])
}

fn build_textcount(
    _rt: &RuntimeHandle,
    cmd: &mut Command,
    args: &[String],
) -> Result<Vec<Box<dyn Filter>>, FcomError> {
    let parsed: PlainArgs = parse_op_args("textcount", args)?;
    parsed.common.apply(cmd)?;
    let iter = parsed.common.arg_iterator()?;
    Ok(vec![Box::new(TextCountDriver {
        args: Some(iter),
        state: State::NextArg,
        current: String::new(),
        stats: FileStats::default(),
        totals: TotalStats::default(),
    })])
}

static HEX_OP: OperationTemplate = OperationTemplate {
    name: "hex",
    help: HEX_HELP,
    build: build_hex,
};
static UTF8_OP: OperationTemplate = OperationTemplate {
    name: "utf8",
    help: UTF8_HELP,
    build: build_utf8,
};
static HTML_OP: OperationTemplate = OperationTemplate {
    name: "html",
    help: HTML_HELP,
    build: build_html,
};
static TEXTCOUNT_OP: OperationTemplate = OperationTemplate {
    name: "textcount",
    help: TEXTCOUNT_HELP,
    build: build_textcount,
};

pub static HEX_MODULE: BuiltinModule = BuiltinModule {
    name: "hex",
    ops: &[&HEX_OP],
    filters: &[],
};
pub static UTF8_MODULE: BuiltinModule = BuiltinModule {
    name: "utf8",
    ops: &[&UTF8_OP],
    filters: &[],
};
pub static HTML_MODULE: BuiltinModule = BuiltinModule {
    name: "html",
    ops: &[&HTML_OP],
    filters: &[],
};
pub static TEXTCOUNT_MODULE: BuiltinModule = BuiltinModule {
    name: "textcount",
    ops: &[&TEXTCOUNT_OP],
    filters: &[],
};
