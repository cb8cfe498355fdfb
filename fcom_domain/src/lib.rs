// /////////////////////////////////////////////////////////////////////////////
// Fcom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # fcom Domain Layer
//!
//! Pure business logic of the fcom file-operations toolkit: the command
//! context shared by a pipeline's filters, the filter contract itself, the
//! wildcard input filters, pixel formats with their conversion matrix, and
//! the sync tree model with its diff engine.
//!
//! This crate performs no I/O and knows nothing about threads, codecs, or
//! the CLI. The `fcom` crate supplies the scheduler, the worker pool and
//! all concrete filters; `fcom-bootstrap` owns the process entry concerns.
//!
//! ## Layering
//!
//! ```text
//! fcom_bootstrap ──▶ fcom ──▶ fcom_domain
//! ```
//!
//! Dependencies point inward only: the domain defines the interfaces
//! (notably [`services::filter::Filter`]) that the infrastructure
//! implements.

pub mod entities;
pub mod error;
pub mod services;
pub mod value_objects;

pub use entities::command::{Command, FileAttr, InputDesc, OutputDesc, PicDesc};
pub use error::FcomError;
pub use services::filter::{ChainOp, ChainPos, Filter, FilterSpec, FilterStatus, OpenResult};
pub use value_objects::codepage::Codepage;
pub use value_objects::input_filter::InputFilter;
pub use value_objects::pixel_format::PixelFormat;
pub use value_objects::worker_count::WorkerCount;
