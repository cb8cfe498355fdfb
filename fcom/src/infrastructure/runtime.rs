// /////////////////////////////////////////////////////////////////////////////
// Fcom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Pipeline Runtime
//!
//! The engine driving every operation: the scheduler over a filter chain,
//! the bounded worker pool, the module/operation registry, and the path
//! argument iterator. The [`RuntimeHandle`] bundles the process-wide
//! pieces and is threaded explicitly through operations and filters - no
//! ambient globals.

pub mod input;
pub mod pipeline;
pub mod registry;
pub mod worker_pool;

use std::sync::Arc;

use crate::infrastructure::config::AppConfig;

/// Explicit handle to the process-wide runtime services.
#[derive(Clone)]
pub struct RuntimeHandle {
    pub config: Arc<AppConfig>,
    pub registry: Arc<registry::Registry>,
    pub pool: Arc<worker_pool::WorkerPool>,
}
