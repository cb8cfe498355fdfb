// /////////////////////////////////////////////////////////////////////////////
// Fcom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # fcom CLI entry point
//!
//! `fcom OPERATION [ARGS…] [OPTIONS…]`. Global options are parsed here;
//! everything after the operation name goes to the operation's own
//! parser. Exit code 0 on success, non-zero on any filter error.

use std::sync::Arc;

use fcom::{AppConfig, CommandRunner};
use fcom_bootstrap::{install_interrupt_handler, parse_cli, ExitCode, SignalHub};
use fcom_domain::FcomError;

fn main() {
    let cli = parse_cli();
    fcom_bootstrap::init_logging(cli.debug, cli.verbose);
    run(cli).exit()
}

fn run(cli: fcom_bootstrap::Cli) -> ExitCode {
    let config = match AppConfig::load_default() {
        Ok(c) => Arc::new(c),
        Err(e) => {
            eprintln!("fcom: {}", e);
            return ExitCode::Usage;
        }
    };

    let hub = SignalHub::new();
    if let Err(e) = install_interrupt_handler(Arc::clone(&hub)) {
        tracing::warn!("interrupt handler: {}", e);
    }

    let runner = match CommandRunner::new(config, Arc::clone(&hub)) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("fcom: {}", e);
            return ExitCode::Error;
        }
    };

    let Some(operation) = cli.operation.as_deref() else {
        eprintln!("fcom: no operation given");
        eprintln!("modules: {}", runner.known_modules().join(", "));
        eprintln!("try `fcom OPERATION --help`");
        runner.shutdown();
        return ExitCode::Usage;
    };

    let result = runner.run(operation, &cli.args);
    runner.shutdown();

    match result {
        Ok(()) => {
            if hub.interrupted() {
                ExitCode::Interrupted
            } else {
                ExitCode::Success
            }
        }
        Err(e) if e.is_cancelled() => {
            eprintln!("fcom: cancelled");
            ExitCode::Interrupted
        }
        Err(e @ (FcomError::Usage(_) | FcomError::NotFound(_))) => {
            eprintln!("fcom: {}", e);
            ExitCode::Usage
        }
        Err(e) => {
            eprintln!("fcom: {}", e);
            ExitCode::Error
        }
    }
}
