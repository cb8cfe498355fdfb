// /////////////////////////////////////////////////////////////////////////////
// Fcom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Domain entities: the shared command context and the sync tree model.

pub mod command;
pub mod snapshot;

pub use command::{Command, FileAttr, InputDesc, OutputDesc, PicDesc, DEFAULT_BUFFER_SIZE};
pub use snapshot::{DirBlock, SnapshotTree, SyncEntry};
