// /////////////////////////////////////////////////////////////////////////////
// Fcom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Domain Error System
//!
//! This module provides the error type shared by every layer of fcom. It
//! follows a small, fixed taxonomy so that the scheduler and the command
//! runner can decide *mechanically* what a failure means for the pipeline:
//!
//! - **Usage** - bad argument, missing input, ambiguous request. One-line
//!   message, non-zero exit.
//! - **Sys** - an `open`/`read`/`write`/`stat` class failure. Carries the OS
//!   message; non-zero exit unless the operation runs with `skip-errors`.
//! - **Format** - an incremental codec reported malformed input. Carries the
//!   offset where known.
//! - **Cancelled** - an external signal was observed at a yield point.
//!   Terminal, but reported distinctly from errors.
//! - Everything else (**Config**, **Unsupported**, **NotFound**,
//!   **Internal**) is a specific flavor of usage or environment failure that
//!   benefits from its own message prefix.
//!
//! Errors never cross pipeline boundaries: a failed subtask surfaces to its
//! parent only through the completion monitor.

use thiserror::Error;

/// Domain-specific errors for the fcom pipeline system.
///
/// Each variant carries a human-readable message; category helpers
/// (`is_system`, `is_cancelled`, ...) support the `skip-errors` policy and
/// exit-code mapping without matching on variants at every call site.
#[derive(Error, Debug, Clone)]
pub enum FcomError {
    #[error("usage: {0}")]
    Usage(String),

    #[error("system: {0}")]
    Sys(String),

    #[error("format: {0}")]
    Format(String),

    #[error("configuration: {0}")]
    Config(String),

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("unknown operation: {0}")]
    NotFound(String),

    #[error("cancelled")]
    Cancelled,

    #[error("internal: {0}")]
    Internal(String),
}

impl FcomError {
    /// Builds a `Sys` error with the conventional `context: path: message`
    /// shape used throughout the file filters.
    pub fn sys_path(context: &str, path: impl std::fmt::Display, err: &std::io::Error) -> Self {
        FcomError::Sys(format!("{}: {}: {}", context, path, err))
    }

    /// True for failures of the OS-interaction kind. Operations running with
    /// `skip-errors` convert these into warnings and continue.
    pub fn is_system(&self) -> bool {
        matches!(self, FcomError::Sys(_))
    }

    /// True when the failure was an observed interrupt rather than an error.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, FcomError::Cancelled)
    }

    /// True for malformed-input failures reported by a codec.
    pub fn is_format(&self) -> bool {
        matches!(self, FcomError::Format(_))
    }
}

impl From<std::io::Error> for FcomError {
    fn from(err: std::io::Error) -> Self {
        FcomError::Sys(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_prefixes() {
        assert_eq!(
            FcomError::Usage("missing input".into()).to_string(),
            "usage: missing input"
        );
        assert_eq!(FcomError::Cancelled.to_string(), "cancelled");
        assert!(FcomError::Format("bad header".into())
            .to_string()
            .starts_with("format:"));
    }

    #[test]
    fn test_category_helpers() {
        let sys = FcomError::sys_path(
            "open",
            "/no/such",
            &std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
        );
        assert!(sys.is_system());
        assert!(!sys.is_cancelled());
        assert!(FcomError::Cancelled.is_cancelled());
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: FcomError = io.into();
        assert!(err.is_system());
    }
}
