// /////////////////////////////////////////////////////////////////////////////
// Fcom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Worker Count Value Object
//!
//! Validated number of pool workers. The pool executes independent
//! pipelines concurrently; within a pipeline execution stays cooperative
//! and single-threaded, so the only parallelism knob the user ever touches
//! is this one.
//!
//! The default is the number of logical CPUs, clamped into the accepted
//! range. A `workers` key in the configuration file or a `-w` option
//! overrides it.

use serde::{Deserialize, Serialize};

use crate::error::FcomError;

/// Validated worker count for the pipeline pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkerCount(usize);

impl WorkerCount {
    /// Minimum accepted value.
    pub const MIN: usize = 1;
    /// Maximum accepted value. More workers than this only adds contention
    /// for a disk-bound tool.
    pub const MAX: usize = 256;

    /// Creates a validated worker count.
    ///
    /// # Errors
    ///
    /// Returns `FcomError::Config` when outside `[MIN, MAX]`.
    pub fn new(count: usize) -> Result<Self, FcomError> {
        if !(Self::MIN..=Self::MAX).contains(&count) {
            return Err(FcomError::Config(format!(
                "worker count {} outside [{}, {}]",
                count,
                Self::MIN,
                Self::MAX
            )));
        }
        Ok(WorkerCount(count))
    }

    /// One worker per logical CPU, the default for interactive use.
    pub fn default_for_system() -> Self {
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        WorkerCount(cpus.clamp(Self::MIN, Self::MAX))
    }

    pub fn get(&self) -> usize {
        self.0
    }
}

impl Default for WorkerCount {
    fn default() -> Self {
        Self::default_for_system()
    }
}

impl std::fmt::Display for WorkerCount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_range() {
        assert!(WorkerCount::new(1).is_ok());
        assert!(WorkerCount::new(256).is_ok());
        assert!(WorkerCount::new(0).is_err());
        assert!(WorkerCount::new(257).is_err());
    }

    #[test]
    fn test_system_default_in_range() {
        let wc = WorkerCount::default_for_system();
        assert!(wc.get() >= WorkerCount::MIN);
        assert!(wc.get() <= WorkerCount::MAX);
    }
}
