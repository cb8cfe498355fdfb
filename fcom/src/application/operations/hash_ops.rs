// /////////////////////////////////////////////////////////////////////////////
// Fcom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # `md5`, `sha256`, `crc32` - file digests
//!
//! One driver for the three digest operations: per input file, a reader
//! is inserted upstream, the running digest folds every chunk, and the
//! `HEX *name` line goes downstream (stdout unless `-o`).

use clap::Parser;

use fcom_domain::services::filter::{Filter, FilterSpec, FilterStatus};
use fcom_domain::{Command, FcomError};

use crate::infrastructure::codecs::hash::{digest_line, DigestKind, Digester};
use crate::infrastructure::filters::{FileReader, FileWriter};
use crate::infrastructure::runtime::input::ArgIterator;
use crate::infrastructure::runtime::registry::OperationTemplate;
use crate::infrastructure::runtime::RuntimeHandle;

use super::{parse_op_args, BuiltinModule, CommonOpts};

const MD5_HELP: &str = "\
Compute MD5 hash.
Usage:
  `fcom md5` INPUT... [OPTIONS] [-o OUTPUT]
";

const SHA256_HELP: &str = "\
Compute SHA-256 hash.
Usage:
  `fcom sha256` INPUT... [OPTIONS] [-o OUTPUT]
";

const CRC32_HELP: &str = "\
Compute CRC32 checksum.
Usage:
  `fcom crc32` INPUT... [OPTIONS] [-o OUTPUT]
";

#[derive(Debug, Parser)]
#[command(disable_help_flag = true)]
struct HashArgs {
    #[command(flatten)]
    common: CommonOpts,
}

enum State {
    NextArg,
    Data,
}

struct HashDriver {
    kind: DigestKind,
    args: Option<ArgIterator>,
    digest: Option<Digester>,
    current: String,
    state: State,
}

impl Filter for HashDriver {
    fn name(&self) -> &str {
        match self.kind {
            DigestKind::Md5 => "md5",
            DigestKind::Sha256 => "sha256",
            DigestKind::Crc32 => "crc32",
        }
    }

    fn process(&mut self, cmd: &mut Command) -> Result<FilterStatus, FcomError> {
        loop {
            if cmd.is_stopped() {
                return Err(FcomError::Cancelled);
            }
            match self.state {
                State::NextArg => {
                    let Some(entry) = self.args.as_mut().and_then(|a| a.next_file()) else {
                        return Ok(FilterStatus::Done);
                    };

                    // Probe now so skip-errors can act per file.
                    if let Err(e) = std::fs::File::open(entry.path()) {
                        let err = FcomError::sys_path("open", &entry.name, &e);
                        if cmd.skip_errors {
                            tracing::warn!("{}", err);
                            continue;
                        }
                        return Err(err);
                    }

                    self.current = entry.name.clone();
                    cmd.input.path = Some(entry.path());
                    cmd.insert_before(FilterSpec::Instance(Box::new(FileReader::for_path(
                        entry.path(),
                    ))));
                    self.digest = Some(Digester::new(self.kind));
                    self.state = State::Data;
                    return Ok(FilterStatus::More);
                }

                State::Data => {
                    let data = std::mem::take(&mut cmd.data_in);
                    if let Some(d) = self.digest.as_mut() {
                        d.update(&data);
                    }
                    if cmd.in_last {
                        let digest = self
                            .digest
                            .take()
                            .ok_or_else(|| FcomError::Internal("digest state".into()))?;
                        let line = digest_line(&digest.finalize_hex(), &self.current);
                        cmd.data_out = line.into_bytes();
                        self.state = State::NextArg;
                        return Ok(FilterStatus::NextDone);
                    }
                    return Ok(FilterStatus::More);
                }
            }
        }
    }
}

fn build_for(
    kind: DigestKind,
    cmd: &mut Command,
    args: &[String],
) -> Result<Vec<Box<dyn Filter>>, FcomError> {
    let parsed: HashArgs = parse_op_args("hash", args)?;
    parsed.common.apply(cmd)?;
    cmd.output.stdout = parsed.common.output.is_none();

    let iter = parsed.common.arg_iterator()?;
    Ok(vec![
        Box::new(HashDriver {
            kind,
            args: Some(iter),
            digest: None,
            current: String::new(),
            state: State::NextArg,
        }),
        Box::new(FileWriter::new()),
    ])
}

fn build_md5(
    _rt: &RuntimeHandle,
    cmd: &mut Command,
    args: &[String],
) -> Result<Vec<Box<dyn Filter>>, FcomError> {
    build_for(DigestKind::Md5, cmd, args)
}

fn build_sha256(
    _rt: &RuntimeHandle,
    cmd: &mut Command,
    args: &[String],
) -> Result<Vec<Box<dyn Filter>>, FcomError> {
    build_for(DigestKind::Sha256, cmd, args)
}

fn build_crc32(
    _rt: &RuntimeHandle,
    cmd: &mut Command,
    args: &[String],
) -> Result<Vec<Box<dyn Filter>>, FcomError> {
    build_for(DigestKind::Crc32, cmd, args)
}

static MD5_OP: OperationTemplate = OperationTemplate {
    name: "md5",
    help: MD5_HELP,
    build: build_md5,
};

static SHA256_OP: OperationTemplate = OperationTemplate {
    name: "sha256",
    help: SHA256_HELP,
    build: build_sha256,
};

static CRC32_OP: OperationTemplate = OperationTemplate {
    name: "crc32",
    help: CRC32_HELP,
    build: build_crc32,
};

pub static MD5_MODULE: BuiltinModule = BuiltinModule {
    name: "md5",
    ops: &[&MD5_OP],
    filters: &[],
};

pub static SHA256_MODULE: BuiltinModule = BuiltinModule {
    name: "sha256",
    ops: &[&SHA256_OP],
    filters: &[],
};

pub static CRC32_MODULE: BuiltinModule = BuiltinModule {
    name: "crc32",
    ops: &[&CRC32_OP],
    filters: &[],
};
