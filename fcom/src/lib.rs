// /////////////////////////////////////////////////////////////////////////////
// Fcom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # fcom
//!
//! Bulk file-operations toolkit driven by a streaming filter pipeline:
//! archive pack/unpack (gz, xz, zstd, zip, 7z, ISO, ICO), image
//! transcoding (BMP/PNG/JPEG with pixel conversion and cropping), text
//! tools (digests, hex dump, UTF-8 transcoding, HTML attribute
//! extraction, line statistics), encrypted copies, and file-tree
//! synchronization with snapshots.
//!
//! Every invocation is one *operation*; an operation is a template that
//! builds a chain of *filters* over a shared command context, and the
//! scheduler drives that chain cooperatively while the worker pool runs
//! independent pipelines in parallel. See `fcom-domain` for the filter
//! contract and `DESIGN.md` at the workspace root for the architecture
//! notes.

pub mod application;
pub mod infrastructure;

pub use application::CommandRunner;
pub use infrastructure::config::AppConfig;
pub use infrastructure::runtime::RuntimeHandle;
