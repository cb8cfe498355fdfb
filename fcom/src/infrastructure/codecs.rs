// /////////////////////////////////////////////////////////////////////////////
// Fcom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Codec filters and their supporting primitives: archive containers,
//! image formats, text tools, digests and the stream cipher.

pub mod bmp;
pub mod crypto;
pub mod gz;
pub mod hash;
pub mod ico;
pub mod iso;
pub mod jpeg_pic;
pub mod pixel_convert;
pub mod png_pic;
pub mod sevenz;
pub mod snapshot_file;
pub mod stream;
pub mod text;
pub mod xz;
pub mod zip_arc;
pub mod zstd_stream;
