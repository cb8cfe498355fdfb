// /////////////////////////////////////////////////////////////////////////////
// Fcom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Command Context
//!
//! The [`Command`] is the per-operation context shared by every filter of
//! one pipeline. It deliberately consists of three disjoint regions:
//!
//! - the **input descriptor**, read mostly by head filters (current path,
//!   size, attributes, read offset, seek request, end-of-input flag);
//! - the **output descriptor**, written by tail filters (target path, size
//!   hint, mtime/attributes to apply, backfill seek request);
//! - the **data views** (`data_in`/`data_out`), each borrowed by exactly one
//!   filter at a time - the scheduler moves `data_out` of one filter into
//!   `data_in` of the next, so both are invalid the moment control returns.
//!
//! Operation-specific knobs (compression level, member filters, dates, ...)
//! live in operation-private structs, not here. The only cross-filter
//! extras the command carries are the wildcard input filter, the picture
//! descriptor (set by image readers, consumed by converters and writers),
//! and the cooperative stop flag polled between records.
//!
//! Lifetime: created when the runner dispatches an operation; destroyed
//! after the pipeline drains or errors.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use crate::services::filter::{ChainOp, ChainPos, FilterSpec};
use crate::value_objects::codepage::Codepage;
use crate::value_objects::input_filter::InputFilter;
use crate::value_objects::pixel_format::PixelFormat;

/// Default size of the traveling data buffers (64 KiB, the original tool's
/// read granularity).
pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

/// Platform-agnostic file attributes carried alongside descriptors.
///
/// Archive containers store either Unix modes or DOS attribute bits; both
/// are kept so the writer can apply whichever the platform understands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileAttr {
    pub dir: bool,
    pub unix_mode: u32,
    pub win_attr: u32,
}

impl FileAttr {
    pub fn regular(unix_mode: u32) -> Self {
        FileAttr {
            dir: false,
            unix_mode,
            win_attr: 0,
        }
    }

    pub fn directory() -> Self {
        FileAttr {
            dir: true,
            unix_mode: 0o755,
            win_attr: 0x10, // FILE_ATTRIBUTE_DIRECTORY
        }
    }

    pub fn is_dir(&self) -> bool {
        self.dir
    }
}

/// Input side of the command: what the head filters are reading.
#[derive(Debug, Clone, Default)]
pub struct InputDesc {
    /// Path of the file currently being read, if any.
    pub path: Option<PathBuf>,
    /// Size as reported by `stat`, or the container's member size.
    pub size: u64,
    pub mtime: Option<SystemTime>,
    pub attr: FileAttr,
    /// Absolute offset of the next byte the reader will produce.
    pub offset: u64,
    /// Seek request set by a downstream filter: the reader must re-position
    /// to this offset and reset its buffering before producing more data.
    pub seek: Option<u64>,
    /// End of input reached.
    pub eof: bool,
}

/// Output side of the command: what the tail filters are writing.
#[derive(Debug, Clone, Default)]
pub struct OutputDesc {
    pub path: Option<PathBuf>,
    /// Expected size, when the producing filter knows it up front.
    pub size: Option<u64>,
    /// Modification time to apply after the stream completes.
    pub mtime: Option<SystemTime>,
    pub attr: FileAttr,
    /// Interpret `attr.win_attr` rather than `attr.unix_mode` (set by
    /// containers that store DOS attributes).
    pub attr_win: bool,
    /// Backfill seek request: the writer must place the next chunk at this
    /// absolute offset (archive and image encoders re-writing headers).
    pub seek: Option<u64>,
    /// Write to standard output instead of a file.
    pub stdout: bool,
    /// Finalize the current output file now (flush buffers, apply mtime
    /// and attributes) instead of waiting for the next member or
    /// teardown. Consumed by the writer.
    pub flush: bool,
}

/// Picture descriptor filled in by image readers and consumed by the pixel
/// converter and image writers.
#[derive(Debug, Clone, Copy, Default)]
pub struct PicDesc {
    pub width: u32,
    pub height: u32,
    pub in_format: Option<PixelFormat>,
    pub out_format: Option<PixelFormat>,
    /// Rows are delivered bottom-up (BMP storage order).
    pub input_reverse: bool,
}

/// The mutable context shared between the filters of one pipeline.
pub struct Command {
    /// Operation name this pipeline was built for (e.g. `arc.gz`).
    pub operation: String,
    /// Raw path arguments before expansion.
    pub paths: Vec<PathBuf>,

    pub input: InputDesc,
    pub output: OutputDesc,

    /// View of the upstream filter's output. Valid only inside `process`.
    pub data_in: Vec<u8>,
    /// Set together with the final data chunk: downstream should treat the
    /// current `data_in` as the last one.
    pub in_last: bool,
    /// Output produced by the running filter, handed downstream on `Data`.
    pub data_out: Vec<u8>,

    /// Include/exclude wildcard sets applied by the path iterator.
    pub filter: InputFilter,
    /// Descend into directories.
    pub recurse: bool,
    /// Dry-run: report what would be done, produce no output.
    pub show_only: bool,
    /// Convert per-item system errors into warnings and continue.
    pub skip_errors: bool,
    /// Size of the traveling buffers.
    pub buffer_size: usize,
    /// Code page for decoding non-UTF-8 member names and text.
    pub codepage: Codepage,

    pub pic: PicDesc,

    /// Pool-assigned identity of the pipeline running this command; subtask
    /// monitors use it to resume a parked parent.
    pub pipeline_id: u64,

    chain_ops: Vec<ChainOp>,
    stop: Arc<AtomicBool>,
}

impl Command {
    pub fn new(operation: impl Into<String>) -> Self {
        Command {
            operation: operation.into(),
            paths: Vec::new(),
            input: InputDesc::default(),
            output: OutputDesc::default(),
            data_in: Vec::new(),
            in_last: false,
            data_out: Vec::new(),
            filter: InputFilter::empty(),
            recurse: false,
            show_only: false,
            skip_errors: false,
            buffer_size: DEFAULT_BUFFER_SIZE,
            codepage: Codepage::default(),
            pic: PicDesc::default(),
            pipeline_id: 0,
            chain_ops: Vec::new(),
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// The cooperative stop flag shared with the signal hub.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Shares another command's stop flag, so an interrupt reaches a
    /// whole family of subtask pipelines through one flag.
    pub fn share_stop(&mut self, flag: Arc<AtomicBool>) {
        self.stop = flag;
    }

    /// Polled by filters at natural yield points (between records).
    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    // === Chain mutation effects (drained by the scheduler) ===

    /// Queues a filter insertion immediately upstream of the caller.
    pub fn insert_before(&mut self, spec: FilterSpec) {
        self.chain_ops.push(ChainOp {
            pos: ChainPos::Before,
            spec,
        });
    }

    /// Queues a filter insertion immediately downstream of the caller.
    pub fn insert_after(&mut self, spec: FilterSpec) {
        self.chain_ops.push(ChainOp {
            pos: ChainPos::After,
            spec,
        });
    }

    /// Queues a filter insertion at the tail of the chain.
    pub fn append(&mut self, spec: FilterSpec) {
        self.chain_ops.push(ChainOp {
            pos: ChainPos::Tail,
            spec,
        });
    }

    /// Queues a filter insertion at the head of the chain.
    pub fn prepend(&mut self, spec: FilterSpec) {
        self.chain_ops.push(ChainOp {
            pos: ChainPos::Head,
            spec,
        });
    }

    /// Hands the queued chain mutations to the scheduler.
    pub fn take_chain_ops(&mut self) -> Vec<ChainOp> {
        std::mem::take(&mut self.chain_ops)
    }

    /// Moves the produced output out, leaving an empty buffer behind.
    pub fn take_out(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.data_out)
    }

    /// Resets the per-item output descriptor between archive members.
    pub fn reset_output_item(&mut self) {
        self.output.path = None;
        self.output.size = None;
        self.output.mtime = None;
        self.output.attr = FileAttr::default();
        self.output.attr_win = false;
        self.output.seek = None;
        self.output.flush = false;
    }
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Command")
            .field("operation", &self.operation)
            .field("paths", &self.paths)
            .field("input", &self.input)
            .field("output", &self.output)
            .field("in_last", &self.in_last)
            .field("recurse", &self.recurse)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_flag_is_shared() {
        let cmd = Command::new("list");
        let flag = cmd.stop_flag();
        assert!(!cmd.is_stopped());
        flag.store(true, Ordering::Relaxed);
        assert!(cmd.is_stopped());
    }

    #[test]
    fn test_chain_ops_drain() {
        let mut cmd = Command::new("test");
        cmd.append(FilterSpec::Name("core.file-out".into()));
        cmd.insert_before(FilterSpec::Name("core.file-in".into()));
        let ops = cmd.take_chain_ops();
        assert_eq!(ops.len(), 2);
        assert!(cmd.take_chain_ops().is_empty());
    }

    #[test]
    fn test_reset_output_item_clears_descriptor() {
        let mut cmd = Command::new("test");
        cmd.output.path = Some(PathBuf::from("member.txt"));
        cmd.output.size = Some(42);
        cmd.output.attr_win = true;
        cmd.reset_output_item();
        assert!(cmd.output.path.is_none());
        assert!(cmd.output.size.is_none());
        assert!(!cmd.output.attr_win);
    }
}
