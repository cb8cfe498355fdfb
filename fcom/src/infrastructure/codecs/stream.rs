// /////////////////////////////////////////////////////////////////////////////
// Fcom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Generic Stream Pack/Unpack Drivers
//!
//! xz and zstd share the same shape: a single compressed stream per file,
//! no member table, the file name derived from the input. These drivers
//! implement the archive-filter state machine once - next argument, insert
//! a file reader upstream, transcode, `NextDone` between members - and
//! delegate the actual coding to a [`StreamEncoder`]/[`StreamDecoder`]
//! implementation.

use std::path::PathBuf;

use fcom_domain::services::filter::{Filter, FilterSpec, FilterStatus, OpenResult};
use fcom_domain::{Command, FcomError};

use crate::infrastructure::filters::FileReader;
use crate::infrastructure::runtime::input::ArgIterator;

/// Push-style encoder for one single-stream container.
pub trait StreamEncoder: Send {
    /// Prepares for a new stream.
    fn reset(&mut self) -> Result<(), FcomError>;

    /// Consumes all of `input`, appending encoded bytes to `out`. With
    /// `finish`, drives the stream to its end and returns only when the
    /// container is complete.
    fn encode(&mut self, input: &[u8], out: &mut Vec<u8>, finish: bool) -> Result<(), FcomError>;

    /// File-name suffix of the container (e.g. `.xz`).
    fn suffix(&self) -> &'static str;
}

/// Push-style decoder for one single-stream container.
pub trait StreamDecoder: Send {
    fn reset(&mut self) -> Result<(), FcomError>;

    /// Consumes from `input`, appending decoded bytes to `out`. Returns
    /// `true` once the stream ended; trailing input bytes are left in
    /// place.
    fn decode(&mut self, input: &mut Vec<u8>, out: &mut Vec<u8>) -> Result<bool, FcomError>;

    fn suffix(&self) -> &'static str;
}

enum State {
    NextArg,
    Data,
    ItemDone,
}

fn output_for(
    outdir: &Option<PathBuf>,
    base: String,
) -> PathBuf {
    match outdir {
        Some(d) => d.join(base),
        None => PathBuf::from(base),
    }
}

/// Packs each input argument into `<name><suffix>`.
pub struct StreamPack<E: StreamEncoder> {
    filter_name: &'static str,
    enc: E,
    args: Option<ArgIterator>,
    outdir: Option<PathBuf>,
    explicit_output: bool,
    output_used: bool,
    state: State,
}

impl<E: StreamEncoder> StreamPack<E> {
    pub fn new(filter_name: &'static str, enc: E, args: ArgIterator, outdir: Option<PathBuf>) -> Self {
        StreamPack {
            filter_name,
            enc,
            args: Some(args),
            outdir,
            explicit_output: false,
            output_used: false,
            state: State::NextArg,
        }
    }
}

impl<E: StreamEncoder> Filter for StreamPack<E> {
    fn name(&self) -> &str {
        self.filter_name
    }

    fn open(&mut self, cmd: &mut Command) -> Result<OpenResult, FcomError> {
        self.explicit_output = cmd.output.path.is_some();
        Ok(OpenResult::Open)
    }

    fn process(&mut self, cmd: &mut Command) -> Result<FilterStatus, FcomError> {
        loop {
            match self.state {
                State::NextArg => {
                    let Some(entry) = self.args.as_mut().and_then(|a| a.next_file()) else {
                        return Ok(FilterStatus::Fin);
                    };
                    tracing::info!("{}", entry.name);

                    if self.explicit_output {
                        if self.output_used {
                            return Err(FcomError::Usage(
                                "a single output file cannot hold multiple inputs".into(),
                            ));
                        }
                        self.output_used = true;
                    } else {
                        let base = format!(
                            "{}{}",
                            PathBuf::from(&entry.name)
                                .file_name()
                                .map(|n| n.to_string_lossy().into_owned())
                                .unwrap_or_else(|| "out".into()),
                            self.enc.suffix()
                        );
                        cmd.output.path = Some(output_for(&self.outdir, base));
                    }

                    cmd.input.path = Some(entry.path());
                    cmd.insert_before(FilterSpec::Instance(Box::new(FileReader::for_path(
                        entry.path(),
                    ))));
                    self.enc.reset()?;
                    self.state = State::Data;
                    return Ok(FilterStatus::More);
                }

                State::Data => {
                    let input = std::mem::take(&mut cmd.data_in);
                    let mut out = Vec::new();
                    self.enc.encode(&input, &mut out, cmd.in_last)?;
                    if cmd.in_last {
                        self.state = State::ItemDone;
                        cmd.data_out = out;
                        return Ok(FilterStatus::NextDone);
                    }
                    if out.is_empty() {
                        return Ok(FilterStatus::More);
                    }
                    cmd.data_out = out;
                    return Ok(FilterStatus::Data);
                }

                State::ItemDone => {
                    cmd.reset_output_item();
                    self.state = State::NextArg;
                }
            }
        }
    }
}

/// Unpacks each input argument into `<name without suffix>`.
pub struct StreamUnpack<D: StreamDecoder> {
    filter_name: &'static str,
    dec: D,
    args: Option<ArgIterator>,
    outdir: Option<PathBuf>,
    explicit_output: bool,
    output_used: bool,
    buf: Vec<u8>,
    ended: bool,
    state: State,
}

impl<D: StreamDecoder> StreamUnpack<D> {
    pub fn new(filter_name: &'static str, dec: D, args: ArgIterator, outdir: Option<PathBuf>) -> Self {
        StreamUnpack {
            filter_name,
            dec,
            args: Some(args),
            outdir,
            explicit_output: false,
            output_used: false,
            buf: Vec::new(),
            ended: false,
            state: State::NextArg,
        }
    }
}

impl<D: StreamDecoder> Filter for StreamUnpack<D> {
    fn name(&self) -> &str {
        self.filter_name
    }

    fn open(&mut self, cmd: &mut Command) -> Result<OpenResult, FcomError> {
        self.explicit_output = cmd.output.path.is_some();
        Ok(OpenResult::Open)
    }

    fn process(&mut self, cmd: &mut Command) -> Result<FilterStatus, FcomError> {
        loop {
            match self.state {
                State::NextArg => {
                    let Some(entry) = self.args.as_mut().and_then(|a| a.next_file()) else {
                        return Ok(FilterStatus::Fin);
                    };
                    tracing::info!("{}", entry.name);

                    if self.explicit_output {
                        if self.output_used {
                            return Err(FcomError::Usage(
                                "a single output file cannot hold multiple inputs".into(),
                            ));
                        }
                        self.output_used = true;
                    } else {
                        let name = PathBuf::from(&entry.name)
                            .file_name()
                            .map(|n| n.to_string_lossy().into_owned())
                            .unwrap_or_else(|| "out".into());
                        let base = name
                            .strip_suffix(self.dec.suffix())
                            .map(str::to_string)
                            .unwrap_or_else(|| format!("{}.out", name));
                        cmd.output.path = Some(output_for(&self.outdir, base));
                    }
                    cmd.output.mtime = entry.mtime;

                    cmd.input.path = Some(entry.path());
                    cmd.insert_before(FilterSpec::Instance(Box::new(FileReader::for_path(
                        entry.path(),
                    ))));
                    self.dec.reset()?;
                    self.buf.clear();
                    self.ended = false;
                    self.state = State::Data;
                    return Ok(FilterStatus::More);
                }

                State::Data => {
                    self.buf.extend_from_slice(&std::mem::take(&mut cmd.data_in));
                    let src_last = cmd.in_last;
                    let mut out = Vec::new();
                    if !self.ended {
                        self.ended = self.dec.decode(&mut self.buf, &mut out)?;
                    }
                    if self.ended {
                        self.state = State::ItemDone;
                        cmd.data_out = out;
                        return Ok(FilterStatus::NextDone);
                    }
                    if !out.is_empty() {
                        cmd.data_out = out;
                        return Ok(FilterStatus::Data);
                    }
                    if src_last {
                        return Err(FcomError::Format(format!(
                            "{}: truncated stream",
                            self.filter_name
                        )));
                    }
                    return Ok(FilterStatus::More);
                }

                State::ItemDone => {
                    cmd.reset_output_item();
                    self.state = State::NextArg;
                }
            }
        }
    }
}
