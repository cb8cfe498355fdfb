// /////////////////////////////////////////////////////////////////////////////
// Fcom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Value objects: validated, immutable domain values.

pub mod codepage;
pub mod input_filter;
pub mod pixel_format;
pub mod worker_count;

pub use codepage::Codepage;
pub use input_filter::InputFilter;
pub use pixel_format::{convert_line, PixelFormat};
pub use worker_count::WorkerCount;
