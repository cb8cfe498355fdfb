// /////////////////////////////////////////////////////////////////////////////
// Fcom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Include/Exclude Wildcard Sets
//!
//! User-supplied wildcards applied by the path iterator and by archive
//! member filters. The matching rules:
//!
//! 1. A *file* is included if the include set is empty, or any include
//!    wildcard matches. Includes never apply to directories - a directory
//!    must still be entered so that matching files inside it can be found.
//! 2. A path (file or directory) is excluded if any exclude wildcard
//!    matches. An excluded directory is not entered.
//!
//! Wildcards use `*` and `?`, match case-insensitively, and a `*` spans
//! path separators, so `*.txt` matches `dir/sub/a.txt`.

use globset::{Glob, GlobBuilder, GlobSet, GlobSetBuilder};

use crate::error::FcomError;

/// Compiled include/exclude wildcard sets.
#[derive(Debug, Clone)]
pub struct InputFilter {
    include: Option<GlobSet>,
    exclude: Option<GlobSet>,
}

fn build_glob(pattern: &str) -> Result<Glob, FcomError> {
    GlobBuilder::new(pattern)
        .case_insensitive(true)
        .literal_separator(false)
        .build()
        .map_err(|e| FcomError::Usage(format!("bad wildcard '{}': {}", pattern, e)))
}

fn build_set(patterns: &[String]) -> Result<Option<GlobSet>, FcomError> {
    if patterns.is_empty() {
        return Ok(None);
    }
    let mut b = GlobSetBuilder::new();
    for p in patterns {
        b.add(build_glob(p)?);
    }
    let set = b
        .build()
        .map_err(|e| FcomError::Usage(format!("wildcard set: {}", e)))?;
    Ok(Some(set))
}

impl InputFilter {
    /// A filter that admits everything.
    pub fn empty() -> Self {
        InputFilter {
            include: None,
            exclude: None,
        }
    }

    /// Compiles include and exclude pattern lists.
    pub fn new(include: &[String], exclude: &[String]) -> Result<Self, FcomError> {
        Ok(InputFilter {
            include: build_set(include)?,
            exclude: build_set(exclude)?,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.include.is_none() && self.exclude.is_none()
    }

    /// Applies the matching rules to `path`.
    ///
    /// `is_dir` selects the directory rules: includes are skipped, excludes
    /// still apply.
    pub fn allows(&self, path: &str, is_dir: bool) -> bool {
        if !is_dir {
            if let Some(inc) = &self.include {
                if !inc.is_match(path) {
                    return false;
                }
            }
        }
        if let Some(exc) = &self.exclude {
            if exc.is_match(path) {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter(inc: &[&str], exc: &[&str]) -> InputFilter {
        let inc: Vec<String> = inc.iter().map(|s| s.to_string()).collect();
        let exc: Vec<String> = exc.iter().map(|s| s.to_string()).collect();
        InputFilter::new(&inc, &exc).unwrap()
    }

    #[test]
    fn test_empty_filter_admits_all() {
        let f = InputFilter::empty();
        assert!(f.allows("any/thing.bin", false));
        assert!(f.allows("dir", true));
    }

    #[test]
    fn test_include_applies_to_files_only() {
        let f = filter(&["*.txt"], &[]);
        assert!(f.allows("notes.txt", false));
        assert!(f.allows("sub/dir/notes.txt", false));
        assert!(!f.allows("image.png", false));
        // A directory passes even though it does not match the include.
        assert!(f.allows("src", true));
    }

    #[test]
    fn test_exclude_applies_to_both() {
        let f = filter(&[], &["*.git*"]);
        assert!(!f.allows(".git", true));
        assert!(!f.allows("proj/.gitignore", false));
        assert!(f.allows("proj/main.rs", false));
    }

    #[test]
    fn test_case_insensitive_and_question_mark() {
        let f = filter(&["IMG_????.JPG"], &[]);
        assert!(f.allows("img_0042.jpg", false));
        assert!(!f.allows("img_42.jpg", false));
    }

    #[test]
    fn test_exclude_wins_over_include() {
        let f = filter(&["*.log"], &["debug*"]);
        assert!(f.allows("run.log", false));
        assert!(!f.allows("debug-run.log", false));
    }
}
