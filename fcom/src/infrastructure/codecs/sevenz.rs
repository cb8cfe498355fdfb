// /////////////////////////////////////////////////////////////////////////////
// Fcom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # 7z Unpack
//!
//! Coarse-grained wrapper over the `sevenz-rust` reader. 7z interleaves
//! its members inside solid blocks, so member extraction is driven by the
//! library's own visitor; the filter applies the member wildcard, handles
//! show-only mode, and writes files below the output directory itself.
//! The fine-grained incremental reader contract is exemplified by the gz,
//! zip and iso filters.

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Component, Path, PathBuf};

use fcom_domain::services::filter::{Filter, FilterStatus, OpenResult};
use fcom_domain::value_objects::input_filter::InputFilter;
use fcom_domain::{Command, FcomError};

use crate::infrastructure::runtime::input::ArgIterator;

pub struct SevenZUnpack {
    args: Option<ArgIterator>,
    outdir: PathBuf,
    member_filter: InputFilter,
    show_only: bool,
    extracted: u64,
}

impl SevenZUnpack {
    pub fn new(args: ArgIterator, outdir: PathBuf, member_filter: InputFilter) -> Self {
        SevenZUnpack {
            args: Some(args),
            outdir,
            member_filter,
            show_only: false,
            extracted: 0,
        }
    }
}

/// Rejects names escaping the output directory.
fn safe_member_path(name: &str) -> Option<PathBuf> {
    let path = Path::new(name);
    let mut out = PathBuf::new();
    for c in path.components() {
        match c {
            Component::Normal(p) => out.push(p),
            Component::CurDir => {}
            _ => return None,
        }
    }
    if out.as_os_str().is_empty() {
        None
    } else {
        Some(out)
    }
}

impl Filter for SevenZUnpack {
    fn name(&self) -> &str {
        "arc.un7z"
    }

    fn open(&mut self, cmd: &mut Command) -> Result<OpenResult, FcomError> {
        self.show_only = cmd.show_only;
        Ok(OpenResult::Open)
    }

    fn process(&mut self, cmd: &mut Command) -> Result<FilterStatus, FcomError> {
        loop {
            if cmd.is_stopped() {
                return Err(FcomError::Cancelled);
            }
            let Some(entry) = self.args.as_mut().and_then(|a| a.next_file()) else {
                tracing::debug!(files = self.extracted, "7z: done");
                return Ok(FilterStatus::Fin);
            };
            tracing::info!("{}", entry.name);

            let archive_path = entry.path();
            let mut reader =
                sevenz_rust::SevenZReader::open(&archive_path, sevenz_rust::Password::empty())
                    .map_err(|e| FcomError::Format(format!("{}: {}", entry.name, e)))?;

            let outdir = self.outdir.clone();
            let member_filter = self.member_filter.clone();
            let show_only = self.show_only;
            let stop = cmd.stop_flag();
            let mut extracted = 0u64;

            reader
                .for_each_entries(|member, member_reader| {
                    if stop.load(std::sync::atomic::Ordering::Relaxed) {
                        return Ok(false);
                    }
                    let name = member.name().to_string();
                    let is_dir = member.is_directory();

                    if !member_filter.allows(&name, is_dir) {
                        tracing::debug!("skipping {}", name);
                        return Ok(true);
                    }
                    if show_only {
                        if is_dir {
                            println!("       <DIR> {}", name);
                        } else {
                            println!("{:>12} {}", member.size(), name);
                        }
                        return Ok(true);
                    }

                    let Some(safe) = safe_member_path(&name) else {
                        tracing::warn!("unsafe member name skipped: {}", name);
                        return Ok(true);
                    };
                    let target = outdir.join(safe);

                    if is_dir {
                        if member.size() != 0 {
                            tracing::warn!("directory {} has non-zero size", name);
                        }
                        std::fs::create_dir_all(&target)?;
                        return Ok(true);
                    }
                    if let Some(parent) = target.parent() {
                        std::fs::create_dir_all(parent)?;
                    }
                    let mut file = File::create(&target)?;
                    let mut buf = vec![0u8; 64 * 1024];
                    loop {
                        let n = member_reader.read(&mut buf)?;
                        if n == 0 {
                            break;
                        }
                        file.write_all(&buf[..n])?;
                    }
                    extracted += 1;
                    Ok(true)
                })
                .map_err(|e| FcomError::Format(format!("{}: {}", entry.name, e)))?;

            if cmd.is_stopped() {
                return Err(FcomError::Cancelled);
            }
            self.extracted += extracted;
        }
    }
}
