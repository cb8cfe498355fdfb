// /////////////////////////////////////////////////////////////////////////////
// Fcom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # AES-CFB Stream Cipher
//!
//! The encryption unit behind `copy --encrypt/--decrypt`. The key is
//! SHA-256 of the password (wiped after derivation); encryption emits a
//! random 16-byte IV ahead of the ciphertext, decryption consumes the IV
//! from the head of the stream. CFB keeps ciphertext exactly as long as
//! the plaintext, so file sizes stay readable.

use aes::cipher::KeyIvInit;
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

use fcom_domain::FcomError;

type Enc = cfb_mode::BufEncryptor<aes::Aes256>;
type Dec = cfb_mode::BufDecryptor<aes::Aes256>;

pub const IV_LEN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Encrypt,
    Decrypt,
}

enum CipherState {
    /// Waiting for the first chunk (encrypt) or the IV bytes (decrypt).
    Pending,
    Encrypting(Enc),
    Decrypting(Dec),
}

/// Incremental AES-256-CFB transform over a byte stream.
pub struct AesCfbStream {
    dir: Direction,
    key: [u8; 32],
    state: CipherState,
    iv_buf: Vec<u8>,
}

impl AesCfbStream {
    pub fn new(dir: Direction, password: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(password.as_bytes());
        let key: [u8; 32] = hasher.finalize().into();
        AesCfbStream {
            dir,
            key,
            state: CipherState::Pending,
            iv_buf: Vec::with_capacity(IV_LEN),
        }
    }

    /// Transforms `input`, appending the result to `out`. The first
    /// encrypted chunk is preceded by the IV; the first decrypted output
    /// appears once the IV has been consumed from the stream head.
    pub fn process(&mut self, input: &[u8], out: &mut Vec<u8>) -> Result<(), FcomError> {
        match &mut self.state {
            CipherState::Pending => match self.dir {
                Direction::Encrypt => {
                    let iv: [u8; IV_LEN] = rand::random();
                    out.extend_from_slice(&iv);
                    let mut enc = Enc::new(&self.key.into(), &iv.into());
                    let mut data = input.to_vec();
                    enc.encrypt(&mut data);
                    out.extend_from_slice(&data);
                    self.state = CipherState::Encrypting(enc);
                    Ok(())
                }
                Direction::Decrypt => {
                    let need = IV_LEN - self.iv_buf.len();
                    let take = need.min(input.len());
                    self.iv_buf.extend_from_slice(&input[..take]);
                    if self.iv_buf.len() < IV_LEN {
                        return Ok(());
                    }
                    let iv: [u8; IV_LEN] = self.iv_buf[..]
                        .try_into()
                        .map_err(|_| FcomError::Internal("iv size".into()))?;
                    let mut dec = Dec::new(&self.key.into(), &iv.into());
                    let mut data = input[take..].to_vec();
                    dec.decrypt(&mut data);
                    out.extend_from_slice(&data);
                    self.state = CipherState::Decrypting(dec);
                    Ok(())
                }
            },
            CipherState::Encrypting(enc) => {
                let mut data = input.to_vec();
                enc.encrypt(&mut data);
                out.extend_from_slice(&data);
                Ok(())
            }
            CipherState::Decrypting(dec) => {
                let mut data = input.to_vec();
                dec.decrypt(&mut data);
                out.extend_from_slice(&data);
                Ok(())
            }
        }
    }

    /// Validates the stream shape at end of input.
    pub fn finish(&self) -> Result<(), FcomError> {
        if self.dir == Direction::Decrypt && matches!(self.state, CipherState::Pending) {
            return Err(FcomError::Format("input file is not encrypted".into()));
        }
        Ok(())
    }
}

impl Drop for AesCfbStream {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(stream: &mut AesCfbStream, chunks: &[&[u8]]) -> Vec<u8> {
        let mut out = Vec::new();
        for c in chunks {
            stream.process(c, &mut out).unwrap();
        }
        stream.finish().unwrap();
        out
    }

    #[test]
    fn test_encrypt_emits_iv_head() {
        let mut enc = AesCfbStream::new(Direction::Encrypt, "secret");
        let out = run(&mut enc, &[b"hello"]);
        assert_eq!(out.len(), IV_LEN + 5);
    }

    #[test]
    fn test_round_trip_chunked() {
        let mut enc = AesCfbStream::new(Direction::Encrypt, "pass phrase");
        let payload = b"the quick brown fox jumps over the lazy dog";
        let packed = run(&mut enc, &[&payload[..10], &payload[10..]]);

        let mut dec = AesCfbStream::new(Direction::Decrypt, "pass phrase");
        // Deliver in awkward chunk sizes to cross the IV boundary.
        let plain = run(&mut dec, &[&packed[..7], &packed[7..20], &packed[20..]]);
        assert_eq!(plain, payload);
    }

    #[test]
    fn test_wrong_password_garbles() {
        let mut enc = AesCfbStream::new(Direction::Encrypt, "right");
        let packed = run(&mut enc, &[b"plaintext bytes"]);
        let mut dec = AesCfbStream::new(Direction::Decrypt, "wrong");
        let plain = run(&mut dec, &[&packed]);
        assert_ne!(plain, b"plaintext bytes");
    }

    #[test]
    fn test_truncated_stream_not_encrypted() {
        let mut dec = AesCfbStream::new(Direction::Decrypt, "pw");
        let mut out = Vec::new();
        dec.process(b"short", &mut out).unwrap();
        assert!(dec.finish().is_err());
        assert!(out.is_empty());
    }
}
