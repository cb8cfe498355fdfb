// /////////////////////////////////////////////////////////////////////////////
// Fcom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Filter Contract
//!
//! This module defines the unified trait that every pipeline stage must
//! implement, whether built-in (file I/O, archive codecs, hashing) or
//! registered by a module at run time.
//!
//! ## Overview
//!
//! A filter is one node of an ordered chain driven by the scheduler. Its
//! life cycle is exactly three entry points:
//!
//! - `open` - allocate private state; may inspect and mutate the command
//!   descriptors (e.g. derive a default output name). Returning
//!   [`OpenResult::Skip`] removes the filter from the chain without it ever
//!   processing data; `close` is still called for symmetry.
//! - `process` - consume `cmd.data_in`, produce `cmd.data_out`, and return a
//!   [`FilterStatus`] telling the scheduler where control goes next.
//! - `close` - release private state. Must tolerate partial initialization:
//!   it runs on every exit path, including teardown after an error.
//!
//! ## Status Set
//!
//! The status values mirror the cooperative tape model of the scheduler:
//! data flows downstream (`Data`, `OutputDone`), demand flows upstream
//! (`More`), and structural changes are requested as *effects* - a filter
//! never mutates the chain directly. `Back` pairs with a queued
//! `insert_before`: the scheduler materializes the requested converter and
//! replays the input through it.
//!
//! ## Why Effects Instead of Direct Mutation
//!
//! The scheduler holds a mutable borrow of the running filter for the whole
//! `process` call. Queueing [`ChainOp`]s on the command and draining them
//! when control returns keeps "what the filter wants" separate from "what
//! the scheduler does", and makes mid-traversal insertion safe by
//! construction.

use crate::entities::command::Command;
use crate::error::FcomError;

/// Result of a successful `open`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenResult {
    /// The filter allocated its state and takes part in the chain.
    Open,
    /// The filter declines this command; the scheduler unlinks it.
    Skip,
}

/// What a filter's `process` call tells the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterStatus {
    /// More input is needed from upstream before output can be produced.
    More,
    /// Output was produced in `cmd.data_out`; deliver it downstream.
    Data,
    /// The current logical item (e.g. one archive member) finished. The
    /// downstream filter gets one flush call, then control returns here.
    NextDone,
    /// The last output chunk was produced; downstream sees `in_last`.
    OutputDone,
    /// The whole pipeline should tear down successfully.
    Done,
    /// The input cannot be handled as-is; a converter was queued with
    /// `insert_before` and the scheduler must replay through it.
    Back,
    /// The filter suspended itself; the pipeline parks until an external
    /// resume signal re-queues it.
    Async,
    /// Finished without producing anything useful (e.g. show-only mode).
    Fin,
}

/// Where a queued chain mutation lands relative to the requesting filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainPos {
    /// Immediately upstream of the caller.
    Before,
    /// Immediately downstream of the caller.
    After,
    /// At the head of the chain.
    Head,
    /// At the tail of the chain.
    Tail,
}

/// A filter to insert: either a registered name resolved through the
/// runtime's filter registry, or an instance the requester built itself.
pub enum FilterSpec {
    Name(String),
    Instance(Box<dyn Filter>),
}

impl std::fmt::Debug for FilterSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FilterSpec::Name(n) => write!(f, "FilterSpec::Name({})", n),
            FilterSpec::Instance(i) => write!(f, "FilterSpec::Instance({})", i.name()),
        }
    }
}

/// One queued chain mutation, drained by the scheduler after `process`
/// returns.
#[derive(Debug)]
pub struct ChainOp {
    pub pos: ChainPos,
    pub spec: FilterSpec,
}

/// Unified trait for all pipeline stages.
///
/// Implementations own their private state directly in the struct; `open`
/// initializes it, `close` releases it. All implementations must be `Send`
/// so a parked pipeline can resume on any worker.
pub trait Filter: Send {
    /// Short name used in logs and chain diagnostics (e.g. `"arc.ungz"`).
    fn name(&self) -> &str;

    /// Allocates private state. The default accepts the command unchanged.
    fn open(&mut self, _cmd: &mut Command) -> Result<OpenResult, FcomError> {
        Ok(OpenResult::Open)
    }

    /// Performs one unit of work. See [`FilterStatus`] for the contract.
    fn process(&mut self, cmd: &mut Command) -> Result<FilterStatus, FcomError>;

    /// Releases private state. Called exactly once on every exit path after
    /// a successful `open`; never called when `open` itself failed.
    fn close(&mut self, _cmd: &mut Command) {}
}
