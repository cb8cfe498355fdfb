// /////////////////////////////////////////////////////////////////////////////
// Fcom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Common Test Helpers
//!
//! Shared utilities for the integration suites: a runner over the default
//! config and a helper to run one operation with string arguments.

use std::sync::Arc;

use fcom::{AppConfig, CommandRunner};
use fcom_bootstrap::SignalHub;
use fcom_domain::FcomError;

/// Builds a runner over the default configuration.
pub fn runner() -> CommandRunner {
    CommandRunner::new(Arc::new(AppConfig::default()), SignalHub::new())
        .expect("runner construction")
}

/// Runs one operation with the given arguments and shuts the pool down.
pub fn run_op(op: &str, args: &[&str]) -> Result<(), FcomError> {
    let r = runner();
    let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
    let result = r.run(op, &args);
    r.shutdown();
    result
}

/// Calculates the MD5 hex digest of a byte slice.
pub fn md5_hex(data: &[u8]) -> String {
    use md5::{Digest, Md5};
    let mut h = Md5::new();
    h.update(data);
    hex::encode(h.finalize())
}
