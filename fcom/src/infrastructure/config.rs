// /////////////////////////////////////////////////////////////////////////////
// Fcom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Application Configuration
//!
//! Optional TOML configuration loaded from the platform config directory
//! (`<config-dir>/fcom/fcom.conf`). Recognized keys:
//!
//! ```toml
//! workers = 4
//! codepage = "win1251"
//! mod = ["extra"]
//!
//! [mod_conf.extra]
//! # opaque per-module settings, handed to the module at load
//! ```
//!
//! Unknown keys fail the load - a typo in a config file must not be
//! silently ignored.

use std::collections::HashMap;
use std::path::PathBuf;

use etcetera::BaseStrategy;
use serde::Deserialize;

use fcom_domain::value_objects::codepage::Codepage;
use fcom_domain::value_objects::worker_count::WorkerCount;
use fcom_domain::FcomError;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Worker pool size; defaults to the CPU count.
    pub workers: Option<usize>,

    /// Code page for non-UTF-8 text and member names.
    pub codepage: Option<Codepage>,

    /// Modules to load eagerly at startup.
    #[serde(default, rename = "mod")]
    pub modules: Vec<String>,

    /// Opaque per-module configuration blocks.
    #[serde(default)]
    pub mod_conf: HashMap<String, toml::Table>,
}

impl AppConfig {
    /// Platform-specific path of the configuration file.
    pub fn default_path() -> Option<PathBuf> {
        let strategy = etcetera::choose_base_strategy().ok()?;
        Some(strategy.config_dir().join("fcom").join("fcom.conf"))
    }

    /// Loads the default config file; a missing file yields the defaults.
    pub fn load_default() -> Result<Self, FcomError> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(AppConfig::default()),
        }
    }

    /// Loads and parses one config file.
    pub fn load(path: &std::path::Path) -> Result<Self, FcomError> {
        tracing::debug!(path = %path.display(), "reading config file");
        let text = std::fs::read_to_string(path)
            .map_err(|e| FcomError::sys_path("read config", path.display(), &e))?;
        Self::parse(&text).map_err(|e| match e {
            FcomError::Config(msg) => {
                FcomError::Config(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })
    }

    pub fn parse(text: &str) -> Result<Self, FcomError> {
        toml::from_str(text).map_err(|e| FcomError::Config(e.to_string()))
    }

    /// Effective worker count: explicit setting or the system default.
    pub fn worker_count(&self) -> Result<WorkerCount, FcomError> {
        match self.workers {
            Some(n) => WorkerCount::new(n),
            None => Ok(WorkerCount::default_for_system()),
        }
    }

    pub fn codepage(&self) -> Codepage {
        self.codepage.unwrap_or_default()
    }
}
