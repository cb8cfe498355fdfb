// /////////////////////////////////////////////////////////////////////////////
// Fcom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Incremental digests behind the `md5`, `sha256` and `crc32`
//! operations. One enum instead of three near-identical operations; the
//! printed line is `HEX *name`, the conventional checksum-file shape.

use md5::Md5;
use sha2::{Digest, Sha256};

use fcom_domain::FcomError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestKind {
    Md5,
    Sha256,
    Crc32,
}

impl std::str::FromStr for DigestKind {
    type Err = FcomError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "md5" => Ok(DigestKind::Md5),
            "sha256" => Ok(DigestKind::Sha256),
            "crc32" => Ok(DigestKind::Crc32),
            _ => Err(FcomError::Usage(format!("unknown digest: {}", s))),
        }
    }
}

enum DigestState {
    Md5(Md5),
    Sha256(Sha256),
    Crc32(crc32fast::Hasher),
}

/// One running digest.
pub struct Digester {
    state: DigestState,
}

impl Digester {
    pub fn new(kind: DigestKind) -> Self {
        let state = match kind {
            DigestKind::Md5 => DigestState::Md5(Md5::new()),
            DigestKind::Sha256 => DigestState::Sha256(Sha256::new()),
            DigestKind::Crc32 => DigestState::Crc32(crc32fast::Hasher::new()),
        };
        Digester { state }
    }

    pub fn update(&mut self, data: &[u8]) {
        match &mut self.state {
            DigestState::Md5(h) => h.update(data),
            DigestState::Sha256(h) => h.update(data),
            DigestState::Crc32(h) => h.update(data),
        }
    }

    /// Lowercase hex digest, consuming the state.
    pub fn finalize_hex(self) -> String {
        match self.state {
            DigestState::Md5(h) => hex::encode(h.finalize()),
            DigestState::Sha256(h) => hex::encode(h.finalize()),
            DigestState::Crc32(h) => format!("{:08x}", h.finalize()),
        }
    }
}

/// The `HEX *name` output line.
pub fn digest_line(hex: &str, name: &str) -> String {
    format!("{} *{}\n", hex, name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_md5_known_vector() {
        let mut d = Digester::new(DigestKind::Md5);
        d.update(b"hello\n");
        assert_eq!(d.finalize_hex(), "b1946ac92492d2347c6235b4d2611184");
    }

    #[test]
    fn test_sha256_known_vector() {
        let mut d = Digester::new(DigestKind::Sha256);
        d.update(b"abc");
        assert_eq!(
            d.finalize_hex(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_crc32_known_vector() {
        let mut d = Digester::new(DigestKind::Crc32);
        d.update(b"123456789");
        assert_eq!(d.finalize_hex(), "cbf43926");
    }

    #[test]
    fn test_incremental_equals_whole() {
        let mut a = Digester::new(DigestKind::Sha256);
        a.update(b"split ");
        a.update(b"input");
        let mut b = Digester::new(DigestKind::Sha256);
        b.update(b"split input");
        assert_eq!(a.finalize_hex(), b.finalize_hex());
    }

    #[test]
    fn test_digest_line_shape() {
        assert_eq!(
            digest_line("b1946ac92492d2347c6235b4d2611184", "hello.txt"),
            "b1946ac92492d2347c6235b4d2611184 *hello.txt\n"
        );
    }
}
