// /////////////////////////////////////////////////////////////////////////////
// Fcom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Text Processing Primitives
//!
//! The building blocks behind the text operations: BOM sniffing and
//! transcoding to UTF-8, the HTML tag/attribute tokenizer, the hex dump
//! formatter, and line/byte statistics.

use fcom_domain::value_objects::codepage::Codepage;
use fcom_domain::FcomError;

// === UTF-8 transcoding ===

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    Utf8,
    Utf16Le,
    Utf16Be,
}

/// Recognizes a byte-order mark; returns the encoding and BOM length.
pub fn sniff_bom(data: &[u8]) -> Option<(TextEncoding, usize)> {
    if data.starts_with(&[0xEF, 0xBB, 0xBF]) {
        Some((TextEncoding::Utf8, 3))
    } else if data.starts_with(&[0xFF, 0xFE]) {
        Some((TextEncoding::Utf16Le, 2))
    } else if data.starts_with(&[0xFE, 0xFF]) {
        Some((TextEncoding::Utf16Be, 2))
    } else {
        None
    }
}

/// Decodes `data` (BOM already stripped) into UTF-8 bytes. Invalid units
/// become replacement characters, matching the tolerant behavior of the
/// other text tools here.
pub fn to_utf8(data: &[u8], enc: TextEncoding) -> Vec<u8> {
    match enc {
        TextEncoding::Utf8 => String::from_utf8_lossy(data).into_owned().into_bytes(),
        TextEncoding::Utf16Le | TextEncoding::Utf16Be => {
            let units = data.chunks_exact(2).map(|p| match enc {
                TextEncoding::Utf16Le => u16::from_le_bytes([p[0], p[1]]),
                _ => u16::from_be_bytes([p[0], p[1]]),
            });
            char::decode_utf16(units)
                .map(|r| r.unwrap_or(char::REPLACEMENT_CHARACTER))
                .collect::<String>()
                .into_bytes()
        }
    }
}

/// Decodes legacy code-page text into UTF-8.
pub fn decode_codepage(data: &[u8], cp: Codepage) -> Vec<u8> {
    let encoding = match cp {
        Codepage::Win1251 => encoding_rs::WINDOWS_1251,
        Codepage::Win1252 => encoding_rs::WINDOWS_1252,
        Codepage::Win866 => encoding_rs::IBM866,
    };
    let (text, _, _) = encoding.decode(data);
    text.into_owned().into_bytes()
}

// === HTML attribute extraction ===

/// Extracts every value of `<tag attr="...">` occurrences. Tag and
/// attribute names match case-insensitively; values may be double-quoted,
/// single-quoted, or unquoted (up to the next whitespace or `>`).
pub fn extract_tag_attr(html: &[u8], tag: &str, attr: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut pos = 0usize;

    while let Some(lt) = memchr::memchr(b'<', &html[pos..]) {
        pos += lt + 1;
        if pos >= html.len() {
            break;
        }
        match html[pos] {
            b'/' | b'!' | b'?' => {
                // Closing tag, comment or declaration: skip to '>'.
                match memchr::memchr(b'>', &html[pos..]) {
                    Some(gt) => pos += gt + 1,
                    None => break,
                }
                continue;
            }
            _ => {}
        }

        let name_end = html[pos..]
            .iter()
            .position(|&b| b.is_ascii_whitespace() || b == b'>' || b == b'/')
            .map(|i| pos + i)
            .unwrap_or(html.len());
        let tag_name = &html[pos..name_end];
        let tag_matches = tag_name.eq_ignore_ascii_case(tag.as_bytes());
        pos = name_end;

        // Walk the attributes of this tag.
        loop {
            while pos < html.len() && html[pos].is_ascii_whitespace() {
                pos += 1;
            }
            if pos >= html.len() {
                return out;
            }
            if html[pos] == b'>' {
                pos += 1;
                break;
            }
            if html[pos] == b'/' {
                pos += 1;
                continue;
            }

            let attr_end = html[pos..]
                .iter()
                .position(|&b| b == b'=' || b.is_ascii_whitespace() || b == b'>' || b == b'/')
                .map(|i| pos + i)
                .unwrap_or(html.len());
            let attr_name = &html[pos..attr_end];
            pos = attr_end;

            while pos < html.len() && html[pos].is_ascii_whitespace() {
                pos += 1;
            }
            if pos >= html.len() || html[pos] != b'=' {
                // Attribute without value.
                continue;
            }
            pos += 1;
            while pos < html.len() && html[pos].is_ascii_whitespace() {
                pos += 1;
            }
            if pos >= html.len() {
                return out;
            }

            let value: &[u8] = match html[pos] {
                q @ (b'"' | b'\'') => {
                    pos += 1;
                    let end = memchr::memchr(q, &html[pos..])
                        .map(|i| pos + i)
                        .unwrap_or(html.len());
                    let v = &html[pos..end];
                    pos = (end + 1).min(html.len());
                    v
                }
                _ => {
                    let end = html[pos..]
                        .iter()
                        .position(|&b| b.is_ascii_whitespace() || b == b'>')
                        .map(|i| pos + i)
                        .unwrap_or(html.len());
                    let v = &html[pos..end];
                    pos = end;
                    v
                }
            };

            if tag_matches && attr_name.eq_ignore_ascii_case(attr.as_bytes()) {
                out.push(String::from_utf8_lossy(value).into_owned());
            }
        }
    }
    out
}

// === Hex dump ===

const HEX_PER_LINE: usize = 16;

/// Appends a classic hex dump of `data` starting at absolute offset
/// `offset`: 8-digit offset, 16 hex bytes with a mid-row gap, printable
/// gutter.
pub fn hex_dump(out: &mut String, data: &[u8], offset: u64) {
    for (i, row) in data.chunks(HEX_PER_LINE).enumerate() {
        let row_off = offset + (i * HEX_PER_LINE) as u64;
        out.push_str(&format!("{:08x}  ", row_off));
        for col in 0..HEX_PER_LINE {
            match row.get(col) {
                Some(b) => out.push_str(&format!("{:02x} ", b)),
                None => out.push_str("   "),
            }
            if col == 7 {
                out.push(' ');
            }
        }
        out.push(' ');
        for b in row {
            out.push(if b.is_ascii_graphic() || *b == b' ' {
                *b as char
            } else {
                '.'
            });
        }
        out.push('\n');
    }
}

// === Line/byte statistics ===

/// Statistics of one file.
#[derive(Debug, Default, Clone)]
pub struct FileStats {
    pub bytes: u64,
    pub lines: u64,
    pub empty_lines: u64,
    pub line_min: Option<u64>,
    pub line_max: u64,
    cur_line: u64,
}

impl FileStats {
    /// Folds one chunk into the statistics.
    pub fn analyze(&mut self, chunk: &[u8]) {
        self.bytes += chunk.len() as u64;
        let mut rest = chunk;
        loop {
            match memchr::memchr(b'\n', rest) {
                Some(i) => {
                    self.cur_line += i as u64;
                    self.lines += 1;
                    if self.cur_line == 0 {
                        self.empty_lines += 1;
                    }
                    self.line_min = Some(self.line_min.map_or(self.cur_line, |m| m.min(self.cur_line)));
                    self.line_max = self.line_max.max(self.cur_line);
                    self.cur_line = 0;
                    rest = &rest[i + 1..];
                }
                None => {
                    self.cur_line += rest.len() as u64;
                    break;
                }
            }
        }
    }

    /// Accounts a final line without a terminator.
    pub fn finish(&mut self) {
        if self.cur_line != 0 {
            self.lines += 1;
            self.line_min = Some(self.line_min.map_or(self.cur_line, |m| m.min(self.cur_line)));
            self.line_max = self.line_max.max(self.cur_line);
            self.cur_line = 0;
        }
    }

    pub fn summary(&self, name: &str) -> String {
        format!(
            "{}: {} bytes, {} lines ({}..{}), empty: {}",
            name,
            self.bytes,
            self.lines,
            self.line_min.unwrap_or(0),
            self.line_max,
            self.empty_lines
        )
    }
}

/// Aggregate statistics over every processed file.
#[derive(Debug, Default)]
pub struct TotalStats {
    pub files: u64,
    pub bytes: u64,
    pub file_min: Option<u64>,
    pub file_max: u64,
    pub lines: u64,
    pub lines_file_min: Option<u64>,
    pub lines_file_max: u64,
    pub empty_lines: u64,
}

impl TotalStats {
    pub fn add(&mut self, f: &FileStats) {
        self.files += 1;
        self.bytes += f.bytes;
        self.file_min = Some(self.file_min.map_or(f.bytes, |m| m.min(f.bytes)));
        self.file_max = self.file_max.max(f.bytes);
        self.lines += f.lines;
        self.lines_file_min = Some(self.lines_file_min.map_or(f.lines, |m| m.min(f.lines)));
        self.lines_file_max = self.lines_file_max.max(f.lines);
        self.empty_lines += f.empty_lines;
    }

    pub fn summary(&self) -> String {
        let div = |a: u64, b: u64| if b == 0 { 0 } else { a / b };
        let non_empty = self.lines - self.empty_lines;
        let non_empty_pct = div(non_empty * 100, self.lines);
        format!(
            "Files: {}, {} bytes ({}..{}), size/file: {}\n\
             Lines: {} ({}..{}), non-empty: {} ({}%), lines/file: {}",
            self.files,
            self.bytes,
            self.file_min.unwrap_or(0),
            self.file_max,
            div(self.bytes, self.files),
            self.lines,
            self.lines_file_min.unwrap_or(0),
            self.lines_file_max,
            non_empty,
            non_empty_pct,
            div(self.lines, self.files),
        )
    }
}
