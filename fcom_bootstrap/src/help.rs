// /////////////////////////////////////////////////////////////////////////////
// Fcom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Help Text Rendering
//!
//! Operation help strings mark emphasized segments with backticks:
//! `` "Usage:\n  `fcom md5` INPUT...\n" ``. On a terminal the segments are
//! rendered in color; otherwise the backticks are simply stripped so piped
//! output stays plain.

use std::io::IsTerminal;

use nu_ansi_term::Color;

/// Renders a help string, colorizing backtick-delimited segments when
/// stdout is a terminal.
pub fn render_help(text: &str) -> String {
    render_help_for(text, std::io::stdout().is_terminal())
}

fn render_help_for(text: &str, color: bool) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    loop {
        let Some(start) = rest.find('`') else {
            out.push_str(rest);
            return out;
        };
        let Some(len) = rest[start + 1..].find('`') else {
            // Unbalanced backtick: emit as-is.
            out.push_str(rest);
            return out;
        };
        out.push_str(&rest[..start]);
        let segment = &rest[start + 1..start + 1 + len];
        if color {
            out.push_str(&Color::Green.bold().paint(segment).to_string());
        } else {
            out.push_str(segment);
        }
        rest = &rest[start + len + 2..];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_strips_backticks() {
        let s = render_help_for("Usage:\n  `fcom md5` INPUT...\n", false);
        assert_eq!(s, "Usage:\n  fcom md5 INPUT...\n");
    }

    #[test]
    fn test_color_wraps_segments() {
        let s = render_help_for("run `x` now", true);
        assert!(s.contains("\u{1b}["));
        assert!(s.contains('x'));
        assert!(!s.contains('`'));
    }

    #[test]
    fn test_unbalanced_backtick_untouched() {
        let s = render_help_for("odd ` tick", false);
        assert_eq!(s, "odd ` tick");
    }
}
