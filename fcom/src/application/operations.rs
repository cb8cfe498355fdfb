// /////////////////////////////////////////////////////////////////////////////
// Fcom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Built-in Operations
//!
//! One module per operation family, each exposing static
//! [`OperationTemplate`]s grouped into [`BuiltinModule`]s. The static
//! provider resolves module names to these for the monolithic build; a
//! plugin build goes through the same registry interface.
//!
//! Every operation parses its own trailing arguments; the options shared
//! by most of them (inputs, output, wildcards, recursion, dry-run) live
//! in [`CommonOpts`].

pub mod arc_ops;
pub mod copy;
pub mod hash_ops;
pub mod list;
pub mod pic_ops;
pub mod sync;
pub mod text_ops;
pub mod touch;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use fcom_domain::value_objects::input_filter::InputFilter;
use fcom_domain::{Command, FcomError};

use crate::infrastructure::filters::{FileReader, FileWriter};
use crate::infrastructure::runtime::input::ArgIterator;
use crate::infrastructure::runtime::registry::{
    FcomModule, FilterFactory, ModuleProvider, OperationTemplate, ABI_VERSION,
};

/// Options shared by most operations.
#[derive(Debug, Clone, clap::Args)]
pub struct CommonOpts {
    /// Input files or directories.
    #[arg(value_name = "INPUT")]
    pub inputs: Vec<PathBuf>,

    /// Output file (`-` or absent usually means stdout).
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output directory for multi-file results.
    #[arg(short = 'C', long = "outdir", value_name = "DIR")]
    pub outdir: Option<PathBuf>,

    /// Process only files matching the wildcard (repeatable).
    #[arg(long = "include", value_name = "WILDCARD")]
    pub include: Vec<String>,

    /// Skip files and directories matching the wildcard (repeatable).
    #[arg(long = "exclude", value_name = "WILDCARD")]
    pub exclude: Vec<String>,

    /// Descend into directories.
    #[arg(short = 'r', long = "recursive")]
    pub recursive: bool,

    /// Report what would be done without producing output.
    #[arg(long = "show")]
    pub show: bool,

    /// Convert per-file system errors into warnings and continue.
    #[arg(long = "skip-errors")]
    pub skip_errors: bool,
}

impl CommonOpts {
    /// Copies the shared knobs onto the command context.
    pub fn apply(&self, cmd: &mut Command) -> Result<(), FcomError> {
        cmd.paths = self.inputs.clone();
        cmd.filter = InputFilter::new(&self.include, &self.exclude)?;
        cmd.recurse = self.recursive;
        cmd.show_only = self.show;
        cmd.skip_errors = self.skip_errors;
        cmd.output.path = self.output.clone();
        Ok(())
    }

    /// Builds the path iterator over the parsed inputs.
    pub fn arg_iterator(&self) -> Result<ArgIterator, FcomError> {
        if self.inputs.is_empty() {
            return Err(FcomError::Usage("no input files".into()));
        }
        ArgIterator::new(&self.inputs, &self.include, &self.exclude, self.recursive)
    }

    pub fn outdir_or_cwd(&self) -> PathBuf {
        self.outdir.clone().unwrap_or_else(|| PathBuf::from("."))
    }
}

/// Parses an operation's trailing arguments with its derive struct.
pub fn parse_op_args<T: Parser>(op: &str, args: &[String]) -> Result<T, FcomError> {
    T::try_parse_from(std::iter::once(op.to_string()).chain(args.iter().cloned()))
        .map_err(|e| FcomError::Usage(e.to_string()))
}

/// A statically linked module: a name plus its operations and published
/// filter factories.
pub struct BuiltinModule {
    pub name: &'static str,
    pub ops: &'static [&'static OperationTemplate],
    pub filters: &'static [(&'static str, FilterFactory)],
}

impl FcomModule for BuiltinModule {
    fn name(&self) -> &'static str {
        self.name
    }

    fn abi_version(&self) -> u32 {
        ABI_VERSION
    }

    fn provide(&self, op: &str) -> Option<&'static OperationTemplate> {
        self.ops.iter().find(|t| t.name == op).copied()
    }

    fn filters(&self) -> Vec<(&'static str, FilterFactory)> {
        self.filters.to_vec()
    }
}

/// The `core` module: the file I/O filters every operation leans on.
static CORE_MODULE: BuiltinModule = BuiltinModule {
    name: "core",
    ops: &[],
    filters: &[
        ("core.file-in", || Box::new(FileReader::new())),
        ("core.file-out", || Box::new(FileWriter::new())),
    ],
};

/// Static provider over the built-in module set.
pub struct StaticProvider;

impl StaticProvider {
    fn module(name: &str) -> Option<&'static BuiltinModule> {
        match name {
            "core" => Some(&CORE_MODULE),
            "list" => Some(&list::MODULE),
            "touch" => Some(&touch::MODULE),
            "md5" => Some(&hash_ops::MD5_MODULE),
            "sha256" => Some(&hash_ops::SHA256_MODULE),
            "crc32" => Some(&hash_ops::CRC32_MODULE),
            "hex" => Some(&text_ops::HEX_MODULE),
            "utf8" => Some(&text_ops::UTF8_MODULE),
            "html" => Some(&text_ops::HTML_MODULE),
            "textcount" => Some(&text_ops::TEXTCOUNT_MODULE),
            "copy" => Some(&copy::MODULE),
            "sync" => Some(&sync::MODULE),
            "arc" => Some(&arc_ops::MODULE),
            "pic" => Some(&pic_ops::MODULE),
            _ => None,
        }
    }
}

impl ModuleProvider for StaticProvider {
    fn load(&self, name: &str) -> Result<Arc<dyn FcomModule>, FcomError> {
        match Self::module(name) {
            Some(module) => Ok(Arc::new(StaticModuleRef(module))),
            None => Err(FcomError::NotFound(format!("no module '{}'", name))),
        }
    }

    fn known_modules(&self) -> Vec<&'static str> {
        vec![
            "list",
            "touch",
            "md5",
            "sha256",
            "crc32",
            "hex",
            "utf8",
            "html",
            "textcount",
            "copy",
            "sync",
            "arc",
            "pic",
        ]
    }
}

/// Adapter giving `Arc<dyn FcomModule>` over a `&'static BuiltinModule`.
struct StaticModuleRef(&'static BuiltinModule);

impl FcomModule for StaticModuleRef {
    fn name(&self) -> &'static str {
        self.0.name
    }
    fn abi_version(&self) -> u32 {
        self.0.abi_version()
    }
    fn provide(&self, op: &str) -> Option<&'static OperationTemplate> {
        self.0.provide(op)
    }
    fn filters(&self) -> Vec<(&'static str, FilterFactory)> {
        self.0.filters()
    }
}
