// /////////////////////////////////////////////////////////////////////////////
// Fcom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # `copy` - copy files, optionally encrypting and verifying
//!
//! Plain streaming copy with three add-ons:
//!
//! - `--encrypt PW` / `--decrypt PW`: AES-256-CFB with the key derived
//!   from the password; the IV travels at the head of the stream.
//! - `--md5`: print the MD5 of the written stream per file.
//! - `--verify`: after each file is written and flushed, re-read the
//!   destination, recompute the digest and fail on any difference.
//!
//! The digest always covers the bytes as written (after any cipher), so
//! verification compares like with like.

use std::io::Read;
use std::path::PathBuf;

use clap::Parser;
use zeroize::Zeroizing;

use fcom_domain::services::filter::{Filter, FilterSpec, FilterStatus, OpenResult};
use fcom_domain::{Command, FcomError};

use crate::infrastructure::codecs::crypto::{AesCfbStream, Direction};
use crate::infrastructure::codecs::hash::{digest_line, DigestKind, Digester};
use crate::infrastructure::filters::{FileReader, FileWriter};
use crate::infrastructure::runtime::input::ArgIterator;
use crate::infrastructure::runtime::registry::OperationTemplate;
use crate::infrastructure::runtime::RuntimeHandle;

use super::{parse_op_args, BuiltinModule, CommonOpts};

const HELP: &str = "\
Copy files.
Usage:
  `fcom copy` INPUT... (-o OUTPUT | -C OUTDIR) [OPTIONS]

OPTIONS:
    `--encrypt` PASSWORD   Encrypt data (AES-256-CFB)
    `--decrypt` PASSWORD   Decrypt data
    `--verify`             Re-read the destination and verify its MD5
    `--md5`                Print MD5 of the written data
";

#[derive(Debug, Parser)]
#[command(name = "copy", disable_help_flag = true)]
struct CopyArgs {
    #[command(flatten)]
    common: CommonOpts,

    #[arg(long = "encrypt", value_name = "PASSWORD")]
    encrypt: Option<String>,

    #[arg(long = "decrypt", value_name = "PASSWORD")]
    decrypt: Option<String>,

    #[arg(long = "verify")]
    verify: bool,

    #[arg(long = "md5")]
    print_md5: bool,
}

enum State {
    NextArg,
    Data,
    Verify,
}

struct CopyDriver {
    args: Option<ArgIterator>,
    outdir: Option<PathBuf>,
    explicit_output: Option<PathBuf>,
    output_used: bool,
    crypt_dir: Option<Direction>,
    password: Zeroizing<String>,
    verify: bool,
    print_md5: bool,

    state: State,
    crypt: Option<AesCfbStream>,
    digest: Option<Digester>,
    written_digest: String,
    dest: PathBuf,
}

impl CopyDriver {
    fn dest_for(&mut self, entry_name: &str) -> Result<PathBuf, FcomError> {
        if let Some(out) = &self.explicit_output {
            if self.output_used {
                return Err(FcomError::Usage(
                    "a single output file cannot hold multiple inputs".into(),
                ));
            }
            self.output_used = true;
            return Ok(out.clone());
        }
        let base = PathBuf::from(entry_name)
            .file_name()
            .map(PathBuf::from)
            .ok_or_else(|| FcomError::Usage(format!("bad input name: {}", entry_name)))?;
        Ok(self.outdir.clone().unwrap_or_else(|| PathBuf::from(".")).join(base))
    }

    fn verify_dest(&mut self) -> Result<(), FcomError> {
        let mut file = std::fs::File::open(&self.dest)
            .map_err(|e| FcomError::sys_path("open", self.dest.display(), &e))?;
        let mut digest = Digester::new(DigestKind::Md5);
        let mut buf = vec![0u8; 64 * 1024];
        loop {
            let n = file
                .read(&mut buf)
                .map_err(|e| FcomError::Sys(format!("read: {}", e)))?;
            if n == 0 {
                break;
            }
            digest.update(&buf[..n]);
        }
        let reread = digest.finalize_hex();
        if reread != self.written_digest {
            return Err(FcomError::Format(format!(
                "MD5 verification failed: '{}': {} != {}",
                self.dest.display(),
                self.written_digest,
                reread
            )));
        }
        print!("{}", digest_line(&reread, &self.dest.display().to_string()));
        Ok(())
    }
}

impl Filter for CopyDriver {
    fn name(&self) -> &str {
        "copy"
    }

    fn open(&mut self, cmd: &mut Command) -> Result<OpenResult, FcomError> {
        if self.verify && cmd.output.stdout {
            return Err(FcomError::Usage(
                "STDOUT output can't be used with --verify".into(),
            ));
        }
        Ok(OpenResult::Open)
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
                    tracing::info!("{}", entry.name);

                    if let Err(e) = std::fs::File::open(entry.path()) {
                        let err = FcomError::sys_path("open", &entry.name, &e);
                        if cmd.skip_errors {
                            tracing::warn!("{}", err);
                            continue;
                        }
                        return Err(err);
                    }

                    self.dest = self.dest_for(&entry.name)?;
                    cmd.reset_output_item();
                    cmd.output.path = Some(self.dest.clone());
                    cmd.output.mtime = entry.mtime;

                    self.crypt = self
                        .crypt_dir
                        .map(|dir| AesCfbStream::new(dir, &self.password));
                    self.digest = Some(Digester::new(DigestKind::Md5));

                    cmd.input.path = Some(entry.path());
                    cmd.insert_before(FilterSpec::Instance(Box::new(FileReader::for_path(
                        entry.path(),
                    ))));
                    self.state = State::Data;
                    return Ok(FilterStatus::More);
                }

                State::Data => {
                    let data = std::mem::take(&mut cmd.data_in);
                    let out = match self.crypt.as_mut() {
                        Some(crypt) => {
                            let mut buf = Vec::with_capacity(data.len() + 16);
                            crypt.process(&data, &mut buf)?;
                            buf
                        }
                        None => data,
                    };
                    if let Some(d) = self.digest.as_mut() {
                        d.update(&out);
                    }

                    if cmd.in_last {
                        if let Some(crypt) = self.crypt.take() {
                            crypt.finish()?;
                        }
                        let digest = self
                            .digest
                            .take()
                            .ok_or_else(|| FcomError::Internal("copy digest state".into()))?;
                        self.written_digest = digest.finalize_hex();
                        // Finalize the destination before any verify pass.
                        cmd.output.flush = true;
                        cmd.data_out = out;
                        self.state = State::Verify;
                        return Ok(FilterStatus::NextDone);
                    }
                    if out.is_empty() {
                        return Ok(FilterStatus::More);
                    }
                    cmd.data_out = out;
                    return Ok(FilterStatus::Data);
                }

                State::Verify => {
                    if self.verify {
                        self.verify_dest()?;
                    } else if self.print_md5 {
                        print!(
                            "{}",
                            digest_line(&self.written_digest, &self.dest.display().to_string())
                        );
                    }
                    self.state = State::NextArg;
                }
            }
        }
    }
}

fn build(
    _rt: &RuntimeHandle,
    cmd: &mut Command,
    args: &[String],
) -> Result<Vec<Box<dyn Filter>>, FcomError> {
    let parsed: CopyArgs = parse_op_args("copy", args)?;
    if parsed.encrypt.is_some() && parsed.decrypt.is_some() {
        return Err(FcomError::Usage(
            "both --encrypt and --decrypt can't be together".into(),
        ));
    }
    parsed.common.apply(cmd)?;

    let crypt_dir = if parsed.encrypt.is_some() {
        Some(Direction::Encrypt)
    } else if parsed.decrypt.is_some() {
        Some(Direction::Decrypt)
    } else {
        None
    };
    let password = Zeroizing::new(
        parsed
            .encrypt
            .clone()
            .or_else(|| parsed.decrypt.clone())
            .unwrap_or_default(),
    );

    let iter = parsed.common.arg_iterator()?;
    Ok(vec![
        Box::new(CopyDriver {
            args: Some(iter),
            outdir: parsed.common.outdir.clone(),
            explicit_output: parsed.common.output.clone(),
            output_used: false,
            crypt_dir,
            password,
            verify: parsed.verify,
            print_md5: parsed.print_md5,
            state: State::NextArg,
            crypt: None,
            digest: None,
            written_digest: String::new(),
            dest: PathBuf::new(),
        }),
        Box::new(FileWriter::new()),
    ])
}

static COPY_OP: OperationTemplate = OperationTemplate {
    name: "copy",
    help: HELP,
    build,
};

pub static MODULE: BuiltinModule = BuiltinModule {
    name: "copy",
    ops: &[&COPY_OP],
    filters: &[],
};
