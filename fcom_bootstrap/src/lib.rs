// /////////////////////////////////////////////////////////////////////////////
// Fcom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

// Production code safety enforced via CI
// (lib/bins checked separately from tests - tests may use unwrap/expect)

//! # Bootstrap Module
//!
//! The bootstrap crate sits **outside** the application layers and owns the
//! process-entry concerns:
//!
//! - **Argument surface** - the global CLI options; per-operation options
//!   are parsed by the operations themselves
//! - **Logging** - tracing initialization, stderr, terminal color detection
//! - **Signal handling** - interrupt broadcast to live operations' stop
//!   flags, hard abort on the second interrupt
//! - **Exit codes** - conventional Unix codes for scripting
//! - **Help rendering** - backtick-highlighted operation help
//!
//! Layering: bootstrap may be used by the `fcom` binary crate, never the
//! other way around, and it knows nothing about pipelines or codecs.

pub mod cli;
pub mod exit_code;
pub mod help;
pub mod logger;
pub mod signals;

pub use cli::{parse_cli, Cli};
pub use exit_code::ExitCode;
pub use help::render_help;
pub use logger::init_logging;
pub use signals::{install_interrupt_handler, SignalHub};
