// /////////////////////////////////////////////////////////////////////////////
// Fcom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Logging Initialization
//!
//! Wires `tracing` to stderr. Log data never mixes with operation output:
//! stdout carries data for operations that stream to it, stderr carries
//! error and warning lines, so the subscriber always writes to stderr.
//!
//! Levels map onto the two global flags: the default shows warnings and
//! errors, `-V/--Verbose` adds per-file progress (`info`), `-D/--Debug`
//! adds everything (`debug`). `RUST_LOG` overrides the mapping when set.
//! ANSI color is enabled only when stderr is attached to a terminal.

use std::io::IsTerminal;

use tracing_subscriber::EnvFilter;

/// Initializes the global tracing subscriber.
///
/// Safe to call once per process; later calls are ignored (useful in
/// tests, where several cases may try to initialize).
pub fn init_logging(debug: bool, verbose: bool) {
    let default_directive = if debug {
        "debug"
    } else if verbose {
        "info"
    } else {
        "warn"
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .with_target(debug)
        .without_time()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        init_logging(false, false);
        init_logging(true, true);
        tracing::debug!("still alive");
    }
}
