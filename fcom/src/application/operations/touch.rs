// /////////////////////////////////////////////////////////////////////////////
// Fcom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # `touch` - create files and set modification times
//!
//! Operates on the raw argument paths (they may not exist yet): sets the
//! modification time, creating missing files - and their parent
//! directories - on the way.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{Local, NaiveDate, NaiveDateTime, TimeZone};
use clap::Parser;

use fcom_domain::services::filter::{Filter, FilterStatus};
use fcom_domain::{Command, FcomError};

use crate::infrastructure::runtime::registry::OperationTemplate;
use crate::infrastructure::runtime::RuntimeHandle;

use super::{parse_op_args, BuiltinModule, CommonOpts};

const HELP: &str = "\
Create files or update their modification time.
Usage:
  `fcom touch` FILE... [OPTIONS]

OPTIONS:
    `-d`, `--date` DATE     Use DATE (`YYYY-MM-DD` or `YYYY-MM-DD HH:MM:SS`)
          `--date-from` FILE  Take the time from FILE
";

#[derive(Debug, Parser)]
#[command(name = "touch", disable_help_flag = true)]
struct TouchArgs {
    #[command(flatten)]
    common: CommonOpts,

    /// Explicit timestamp.
    #[arg(short = 'd', long = "date", value_name = "DATE")]
    date: Option<String>,

    /// Copy the modification time of another file.
    #[arg(long = "date-from", value_name = "FILE")]
    date_from: Option<PathBuf>,
}

fn parse_date(s: &str) -> Result<SystemTime, FcomError> {
    let naive: NaiveDateTime = if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        d.and_hms_opt(0, 0, 0)
            .ok_or_else(|| FcomError::Usage(format!("bad date: {}", s)))?
    } else {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
            .map_err(|_| FcomError::Usage(format!("bad date: {} (expected YYYY-MM-DD)", s)))?
    };
    Local
        .from_local_datetime(&naive)
        .single()
        .map(SystemTime::from)
        .ok_or_else(|| FcomError::Usage(format!("ambiguous local time: {}", s)))
}

struct TouchFilter {
    mtime: SystemTime,
}

impl TouchFilter {
    fn touch_one(&self, path: &Path) -> Result<(), FcomError> {
        let ft = filetime::FileTime::from_system_time(self.mtime);
        if filetime::set_file_mtime(path, ft).is_ok() {
            tracing::info!("{}", path.display());
            return Ok(());
        }

        // Create the file (and missing parents), then set the time.
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| FcomError::sys_path("mkdir", parent.display(), &e))?;
            }
        }
        std::fs::File::create(path)
            .map_err(|e| FcomError::sys_path("create", path.display(), &e))?;
        filetime::set_file_mtime(path, ft)
            .map_err(|e| FcomError::sys_path("set mtime", path.display(), &e))?;
        tracing::info!("{}", path.display());
        Ok(())
    }
}

impl Filter for TouchFilter {
    fn name(&self) -> &str {
        "touch"
    }

    fn process(&mut self, cmd: &mut Command) -> Result<FilterStatus, FcomError> {
        for path in cmd.paths.clone() {
            if cmd.is_stopped() {
                return Err(FcomError::Cancelled);
            }
            match self.touch_one(&path) {
                Ok(()) => {}
                Err(e) if cmd.skip_errors && e.is_system() => {
                    tracing::warn!("{}", e);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(FilterStatus::Done)
    }
}

fn build(
    _rt: &RuntimeHandle,
    cmd: &mut Command,
    args: &[String],
) -> Result<Vec<Box<dyn Filter>>, FcomError> {
    let parsed: TouchArgs = parse_op_args("touch", args)?;
    if parsed.common.inputs.is_empty() {
        return Err(FcomError::Usage("touch: no files given".into()));
    }
    if parsed.date.is_some() && parsed.date_from.is_some() {
        return Err(FcomError::Usage(
            "touch: --date and --date-from cannot be used together".into(),
        ));
    }
    parsed.common.apply(cmd)?;

    let mtime = if let Some(from) = &parsed.date_from {
        std::fs::metadata(from)
            .and_then(|m| m.modified())
            .map_err(|e| FcomError::sys_path("stat", from.display(), &e))?
    } else if let Some(date) = &parsed.date {
        parse_date(date)?
    } else {
        SystemTime::now()
    };

    Ok(vec![Box::new(TouchFilter { mtime })])
}

static TOUCH_OP: OperationTemplate = OperationTemplate {
    name: "touch",
    help: HELP,
    build,
};

pub static MODULE: BuiltinModule = BuiltinModule {
    name: "touch",
    ops: &[&TOUCH_OP],
    filters: &[],
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_date_day_only() {
        let t = parse_date("2024-01-02").unwrap();
        let dt = chrono::DateTime::<Local>::from(t);
        use chrono::{Datelike, Timelike};
        assert_eq!((dt.year(), dt.month(), dt.day()), (2024, 1, 2));
        assert_eq!((dt.hour(), dt.minute(), dt.second()), (0, 0, 0));
    }

    #[test]
    fn test_parse_date_with_time() {
        let t = parse_date("2024-01-02 10:20:30").unwrap();
        let dt = chrono::DateTime::<Local>::from(t);
        use chrono::Timelike;
        assert_eq!((dt.hour(), dt.minute(), dt.second()), (10, 20, 30));
    }

    #[test]
    fn test_bad_date_rejected() {
        assert!(parse_date("01/02/2024").is_err());
    }

    #[test]
    fn test_touch_creates_missing_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let target = tmp.path().join("deep/dir/new.txt");
        let f = TouchFilter {
            mtime: parse_date("2024-01-02").unwrap(),
        };
        f.touch_one(&target).unwrap();
        let md = std::fs::metadata(&target).unwrap();
        assert_eq!(md.len(), 0);
        let dt = chrono::DateTime::<Local>::from(md.modified().unwrap());
        use chrono::Datelike;
        assert_eq!((dt.year(), dt.month(), dt.day()), (2024, 1, 2));
    }
}
