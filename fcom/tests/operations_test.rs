// /////////////////////////////////////////////////////////////////////////////
// Fcom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Operation Scenarios
//!
//! End-to-end runs of the text, hash, touch and sync operations through
//! the real runner and worker pool.

mod common;

use common::run_op;

#[test]
fn test_md5_digest_line() {
    let tmp = tempfile::TempDir::new().unwrap();
    let input = tmp.path().join("hello.txt");
    std::fs::write(&input, b"hello\n").unwrap();
    let out = tmp.path().join("sums.txt");

    run_op(
        "md5",
        &[
            input.to_str().unwrap(),
            "-o",
            out.to_str().unwrap(),
        ],
    )
    .unwrap();

    let text = std::fs::read_to_string(&out).unwrap();
    assert_eq!(&text[..32], "b1946ac92492d2347c6235b4d2611184");
    assert!(text[32..].starts_with(" *"));
    assert!(text.ends_with("hello.txt\n"));
}

#[test]
fn test_sha256_and_crc32() {
    let tmp = tempfile::TempDir::new().unwrap();
    let input = tmp.path().join("abc.txt");
    std::fs::write(&input, b"abc").unwrap();

    let out = tmp.path().join("sha.txt");
    run_op("sha256", &[input.to_str().unwrap(), "-o", out.to_str().unwrap()]).unwrap();
    assert!(std::fs::read_to_string(&out)
        .unwrap()
        .starts_with("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad *"));

    let out = tmp.path().join("crc.txt");
    run_op("crc32", &[input.to_str().unwrap(), "-o", out.to_str().unwrap()]).unwrap();
    assert!(std::fs::read_to_string(&out).unwrap().starts_with("352441c2 *"));
}

#[test]
fn test_utf8_utf16le_bom() {
    let tmp = tempfile::TempDir::new().unwrap();
    let input = tmp.path().join("bom16.txt");
    // FF FE 48 00 69 00 = BOM + "Hi" in UTF-16LE.
    std::fs::write(&input, [0xFF, 0xFE, 0x48, 0x00, 0x69, 0x00]).unwrap();
    let out = tmp.path().join("out.txt");

    run_op(
        "utf8",
        &[input.to_str().unwrap(), "-o", out.to_str().unwrap()],
    )
    .unwrap();

    assert_eq!(std::fs::read(&out).unwrap(), b"Hi");
}

#[test]
fn test_utf8_plain_file_not_rewritten() {
    let tmp = tempfile::TempDir::new().unwrap();
    let input = tmp.path().join("plain.txt");
    std::fs::write(&input, b"already utf-8").unwrap();
    let out = tmp.path().join("out.txt");

    run_op(
        "utf8",
        &[input.to_str().unwrap(), "-o", out.to_str().unwrap()],
    )
    .unwrap();

    // Skipped entirely: no output file is produced for it.
    assert!(!out.exists());
}

#[test]
fn test_touch_creates_with_date() {
    let tmp = tempfile::TempDir::new().unwrap();
    let target = tmp.path().join("new.txt");

    run_op("touch", &["-d", "2024-01-02", target.to_str().unwrap()]).unwrap();

    let md = std::fs::metadata(&target).unwrap();
    assert_eq!(md.len(), 0);
    let dt = chrono::DateTime::<chrono::Local>::from(md.modified().unwrap());
    use chrono::{Datelike, Timelike};
    assert_eq!((dt.year(), dt.month(), dt.day()), (2024, 1, 2));
    assert_eq!((dt.hour(), dt.minute(), dt.second()), (0, 0, 0));
}

#[test]
fn test_html_attribute_extraction() {
    let tmp = tempfile::TempDir::new().unwrap();
    let input = tmp.path().join("page.html");
    std::fs::write(&input, br#"<a href="u1">x</a><A HREF='u2'/>"#).unwrap();
    let out = tmp.path().join("urls.txt");

    run_op(
        "html",
        &[
            input.to_str().unwrap(),
            "--filter",
            "a.href",
            "-o",
            out.to_str().unwrap(),
        ],
    )
    .unwrap();

    assert_eq!(std::fs::read_to_string(&out).unwrap(), "u1\nu2\n");
}

#[test]
fn test_hex_dump_output() {
    let tmp = tempfile::TempDir::new().unwrap();
    let input = tmp.path().join("data.bin");
    std::fs::write(&input, b"ABC").unwrap();
    let out = tmp.path().join("dump.txt");

    run_op(
        "hex",
        &[input.to_str().unwrap(), "-o", out.to_str().unwrap()],
    )
    .unwrap();

    let text = std::fs::read_to_string(&out).unwrap();
    assert!(text.contains("00000000  41 42 43"));
    assert!(text.contains("ABC"));
}

#[test]
fn test_textcount_runs() {
    let tmp = tempfile::TempDir::new().unwrap();
    let input = tmp.path().join("lines.txt");
    std::fs::write(&input, b"one\ntwo\nthree").unwrap();
    run_op("textcount", &[input.to_str().unwrap()]).unwrap();
}

#[test]
fn test_copy_plain_preserves_bytes_and_mtime() {
    let tmp = tempfile::TempDir::new().unwrap();
    let input = tmp.path().join("src.bin");
    std::fs::write(&input, b"copy me").unwrap();
    filetime::set_file_mtime(&input, filetime::FileTime::from_unix_time(1_600_000_000, 0))
        .unwrap();
    let out = tmp.path().join("dst.bin");

    run_op(
        "copy",
        &[input.to_str().unwrap(), "-o", out.to_str().unwrap()],
    )
    .unwrap();

    assert_eq!(std::fs::read(&out).unwrap(), b"copy me");
    let md = std::fs::metadata(&out).unwrap();
    let mt = filetime::FileTime::from_last_modification_time(&md);
    assert_eq!(mt.unix_seconds(), 1_600_000_000);
}

#[test]
fn test_copy_encrypt_decrypt_round_trip_with_verify() {
    let tmp = tempfile::TempDir::new().unwrap();
    let input = tmp.path().join("secret.txt");
    std::fs::write(&input, b"attack at dawn").unwrap();
    let packed = tmp.path().join("secret.enc");
    let restored = tmp.path().join("restored.txt");

    run_op(
        "copy",
        &[
            input.to_str().unwrap(),
            "-o",
            packed.to_str().unwrap(),
            "--encrypt",
            "hunter2",
            "--verify",
        ],
    )
    .unwrap();

    // IV + ciphertext; same length as plaintext plus 16.
    let enc = std::fs::read(&packed).unwrap();
    assert_eq!(enc.len(), 14 + 16);
    assert_ne!(&enc[16..], b"attack at dawn");

    run_op(
        "copy",
        &[
            packed.to_str().unwrap(),
            "-o",
            restored.to_str().unwrap(),
            "--decrypt",
            "hunter2",
            "--verify",
        ],
    )
    .unwrap();

    assert_eq!(std::fs::read(&restored).unwrap(), b"attack at dawn");
}

#[test]
fn test_copy_decrypt_wrong_password_differs() {
    let tmp = tempfile::TempDir::new().unwrap();
    let input = tmp.path().join("secret.txt");
    std::fs::write(&input, b"payload").unwrap();
    let packed = tmp.path().join("enc");
    let out = tmp.path().join("dec");

    run_op(
        "copy",
        &[
            input.to_str().unwrap(),
            "-o",
            packed.to_str().unwrap(),
            "--encrypt",
            "right",
        ],
    )
    .unwrap();
    run_op(
        "copy",
        &[
            packed.to_str().unwrap(),
            "-o",
            out.to_str().unwrap(),
            "--decrypt",
            "wrong",
        ],
    )
    .unwrap();
    assert_ne!(std::fs::read(&out).unwrap(), b"payload");
}

#[test]
fn test_sync_snapshot_file_round_trip() {
    let tmp = tempfile::TempDir::new().unwrap();
    let tree = tmp.path().join("tree");
    std::fs::create_dir_all(tree.join("sub")).unwrap();
    std::fs::write(tree.join("a.txt"), b"aa").unwrap();
    std::fs::write(tree.join("sub/b.txt"), b"bb").unwrap();
    let snap = tmp.path().join("snap.txt");

    run_op(
        "sync",
        &[
            tree.to_str().unwrap(),
            "--snapshot",
            "-o",
            snap.to_str().unwrap(),
        ],
    )
    .unwrap();

    let text = std::fs::read_to_string(&snap).unwrap();
    assert!(text.starts_with("# fcom file tree snapshot"));
    assert!(text.contains("\"a.txt\""));
    assert!(text.contains("\r\n"));

    // A snapshot diffed against its own directory is all-equal; the
    // runner exit is success.
    run_op("sync", &[snap.to_str().unwrap(), tree.to_str().unwrap()]).unwrap();
}

#[test]
fn test_include_exclude_filtering() {
    let tmp = tempfile::TempDir::new().unwrap();
    std::fs::write(tmp.path().join("keep.txt"), b"k").unwrap();
    std::fs::write(tmp.path().join("skip.bin"), b"s").unwrap();
    let out = tmp.path().join("sums.txt");

    run_op(
        "md5",
        &[
            tmp.path().to_str().unwrap(),
            "-r",
            "--include",
            "*.txt",
            "--exclude",
            "*sums*",
            "-o",
            out.to_str().unwrap(),
        ],
    )
    .unwrap();

    let text = std::fs::read_to_string(&out).unwrap();
    assert!(text.contains("keep.txt"));
    assert!(!text.contains("skip.bin"));
}
