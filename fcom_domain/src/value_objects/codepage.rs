// /////////////////////////////////////////////////////////////////////////////
// Fcom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Legacy code pages recognized by the `codepage` configuration key and
//! used when decoding non-UTF-8 text or archive member names.

use serde::{Deserialize, Serialize};

use crate::error::FcomError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Codepage {
    #[default]
    Win1252,
    Win1251,
    Win866,
}

impl std::fmt::Display for Codepage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Codepage::Win1251 => write!(f, "win1251"),
            Codepage::Win1252 => write!(f, "win1252"),
            Codepage::Win866 => write!(f, "win866"),
        }
    }
}

impl std::str::FromStr for Codepage {
    type Err = FcomError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "win1251" => Ok(Codepage::Win1251),
            "win1252" => Ok(Codepage::Win1252),
            "win866" => Ok(Codepage::Win866),
            _ => Err(FcomError::Config(format!("unknown codepage: {}", s))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codepage_round_trip() {
        for cp in [Codepage::Win1251, Codepage::Win1252, Codepage::Win866] {
            assert_eq!(cp.to_string().parse::<Codepage>().unwrap(), cp);
        }
    }

    #[test]
    fn test_unknown_codepage_rejected() {
        assert!("koi8-r".parse::<Codepage>().is_err());
    }
}
