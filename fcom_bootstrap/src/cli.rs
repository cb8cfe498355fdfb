// /////////////////////////////////////////////////////////////////////////////
// Fcom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Global CLI Surface
//!
//! fcom's command line is `fcom OPERATION [ARGS…] [OPTIONS…]`. Only the
//! global options are known here; everything after the operation name is
//! collected verbatim and handed to the operation's own parser, because
//! operations are registered by modules and their option sets are not
//! known to the binary up front.

use clap::Parser;

/// Bulk file operations: archives, images, text, checksums, sync.
#[derive(Debug, Parser)]
#[command(
    name = "fcom",
    about = "fcom - bulk file operations toolkit",
    disable_help_subcommand = true,
    arg_required_else_help = false
)]
pub struct Cli {
    /// Print debug log messages.
    #[arg(short = 'D', long = "Debug")]
    pub debug: bool,

    /// Print verbose log messages.
    #[arg(short = 'V', long = "Verbose")]
    pub verbose: bool,

    /// Operation to perform (e.g. `list`, `md5`, `arc.gz`, `unzip`).
    pub operation: Option<String>,

    /// Operation arguments and options, parsed by the operation itself.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,
}

/// Parses the process arguments. Exits with clap's usage output on
/// malformed global options.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_and_trailing_args() {
        let cli = Cli::parse_from(["fcom", "md5", "a.txt", "b.txt", "-o", "out"]);
        assert_eq!(cli.operation.as_deref(), Some("md5"));
        assert_eq!(cli.args, vec!["a.txt", "b.txt", "-o", "out"]);
        assert!(!cli.debug);
    }

    #[test]
    fn test_global_flags_before_operation() {
        let cli = Cli::parse_from(["fcom", "-D", "list", "."]);
        assert!(cli.debug);
        assert_eq!(cli.operation.as_deref(), Some("list"));
        assert_eq!(cli.args, vec!["."]);
    }

    #[test]
    fn test_hyphen_values_pass_through() {
        let cli = Cli::parse_from(["fcom", "list", "-r", "--include", "*.txt"]);
        assert_eq!(cli.args, vec!["-r", "--include", "*.txt"]);
    }

    #[test]
    fn test_no_operation() {
        let cli = Cli::parse_from(["fcom"]);
        assert!(cli.operation.is_none());
    }
}
