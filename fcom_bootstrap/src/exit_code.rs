// /////////////////////////////////////////////////////////////////////////////
// Fcom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Process Exit Codes
//!
//! Conventional Unix exit codes for scripting integration. The command
//! runner maps pipeline results onto these; any filter error exits
//! non-zero per the external contract.

/// Exit codes produced by the fcom binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Every pipeline completed.
    Success = 0,
    /// A filter reported an error.
    Error = 1,
    /// The request itself was invalid (unknown operation, bad arguments).
    Usage = 2,
    /// Interrupted by signal (128 + SIGINT).
    Interrupted = 130,
}

impl ExitCode {
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Terminates the process with this code.
    pub fn exit(self) -> ! {
        std::process::exit(self.code())
    }
}

impl From<ExitCode> for i32 {
    fn from(c: ExitCode) -> i32 {
        c.code()
    }
}
