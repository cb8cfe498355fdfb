// /////////////////////////////////////////////////////////////////////////////
// Fcom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # `list` - directory contents
//!
//! Directory arguments are entered and their contents shown (the
//! directory entry itself is not printed); child directories are entered
//! only with `-r`. With no arguments `.` is implied and the `./` prefix
//! is stripped from the output.

use std::io::Write;

use chrono::{DateTime, Local};
use clap::Parser;

use fcom_domain::services::filter::{Filter, FilterStatus};
use fcom_domain::{Command, FcomError};

use crate::infrastructure::runtime::input::{ArgIterator, NextFlags};
use crate::infrastructure::runtime::registry::OperationTemplate;
use crate::infrastructure::runtime::RuntimeHandle;

use super::{parse_op_args, BuiltinModule, CommonOpts};

const HELP: &str = "\
List directory contents.
Usage:
  `fcom list` INPUT... [OPTIONS]

OPTIONS:
    `-l`, `--long`          Use long format
          `--oneline`       Display all file names in a single line
";

#[derive(Debug, Parser)]
#[command(name = "list", disable_help_flag = true)]
struct ListArgs {
    #[command(flatten)]
    common: CommonOpts,

    /// Long format: size, mtime, name.
    #[arg(short = 'l', long = "long")]
    long: bool,

    /// All names on one line, double-quoted.
    #[arg(long = "oneline")]
    oneline: bool,
}

struct ListFilter {
    args: Option<ArgIterator>,
    long: bool,
    oneline: bool,
    strip_prefix: bool,
    buf: String,
}

impl ListFilter {
    fn display_name<'a>(&self, name: &'a str) -> &'a str {
        if self.strip_prefix {
            name.strip_prefix("./").unwrap_or(name)
        } else {
            name
        }
    }

    fn flush(&mut self, force: bool) -> Result<(), FcomError> {
        if force || self.buf.len() >= 4096 {
            let out = std::io::stdout();
            let mut lock = out.lock();
            lock.write_all(self.buf.as_bytes())
                .map_err(|e| FcomError::Sys(format!("stdout: {}", e)))?;
            lock.flush().ok();
            self.buf.clear();
        }
        Ok(())
    }
}

impl Filter for ListFilter {
    fn name(&self) -> &str {
        "list"
    }

    fn process(&mut self, cmd: &mut Command) -> Result<FilterStatus, FcomError> {
        loop {
            if cmd.is_stopped() {
                return Err(FcomError::Cancelled);
            }
            let Some(entry) = self
                .args
                .as_mut()
                .and_then(|a| a.next_with(NextFlags::default()))
            else {
                if self.oneline && !self.buf.is_empty() {
                    self.buf.push('\n');
                }
                self.flush(true)?;
                return Ok(FilterStatus::Done);
            };

            if entry.is_dir && entry.is_root {
                // Directory arguments are listed, not printed.
                if let Some(args) = self.args.as_mut() {
                    args.enter_dir(&entry.name);
                }
                continue;
            }

            let name = self.display_name(&entry.name).to_string();
            if self.oneline {
                if name.contains('"') {
                    tracing::warn!("file name '{}' contains double-quote character", name);
                }
                self.buf.push_str(&format!("\"{}\" ", name));
            } else if self.long {
                let date = entry
                    .mtime
                    .map(|t| {
                        DateTime::<Local>::from(t)
                            .format("%Y-%m-%d %H:%M:%S%.6f")
                            .to_string()
                    })
                    .unwrap_or_else(|| "-".into());
                self.buf
                    .push_str(&format!("{:>12} {} {}\n", entry.size, date, name));
            } else {
                self.buf.push_str(&name);
                self.buf.push('\n');
            }
            self.flush(false)?;
        }
    }
}

fn build(
    _rt: &RuntimeHandle,
    cmd: &mut Command,
    args: &[String],
) -> Result<Vec<Box<dyn fcom_domain::Filter>>, FcomError> {
    let mut parsed: ListArgs = parse_op_args("list", args)?;

    let strip_prefix = parsed.common.inputs.is_empty();
    if strip_prefix {
        parsed.common.inputs.push(".".into());
    }
    parsed.common.apply(cmd)?;

    let iter = parsed.common.arg_iterator()?;
    Ok(vec![Box::new(ListFilter {
        args: Some(iter),
        long: parsed.long,
        oneline: parsed.oneline,
        strip_prefix,
        buf: String::new(),
    })])
}

static LIST_OP: OperationTemplate = OperationTemplate {
    name: "list",
    help: HELP,
    build,
};

pub static MODULE: BuiltinModule = BuiltinModule {
    name: "list",
    ops: &[&LIST_OP],
    filters: &[],
};
