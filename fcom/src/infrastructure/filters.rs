// /////////////////////////////////////////////////////////////////////////////
// Fcom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! File I/O filters and their buffering support.

pub mod fbuf;
pub mod file_reader;
pub mod file_writer;

pub use file_reader::FileReader;
pub use file_writer::FileWriter;

use fcom_domain::entities::command::FileAttr;

/// Maps `std::fs` metadata onto the platform-agnostic attribute record.
pub fn attr_from_metadata(md: &std::fs::Metadata) -> FileAttr {
    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        FileAttr {
            dir: md.is_dir(),
            unix_mode: md.mode(),
            win_attr: if md.is_dir() { 0x10 } else { 0 },
        }
    }
    #[cfg(windows)]
    {
        use std::os::windows::fs::MetadataExt;
        FileAttr {
            dir: md.is_dir(),
            unix_mode: if md.is_dir() { 0o755 } else { 0o644 },
            win_attr: md.file_attributes(),
        }
    }
    #[cfg(not(any(unix, windows)))]
    {
        FileAttr {
            dir: md.is_dir(),
            unix_mode: if md.is_dir() { 0o755 } else { 0o644 },
            win_attr: 0,
        }
    }
}
