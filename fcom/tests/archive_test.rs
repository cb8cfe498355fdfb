// /////////////////////////////////////////////////////////////////////////////
// Fcom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Archive Round Trips
//!
//! Pack-then-unpack through the real pipelines must restore byte-identical
//! files, and where the container records them, names and mtimes.

mod common;

use common::{md5_hex, run_op};

#[test]
fn test_gz_round_trip_restores_name_and_mtime() {
    let tmp = tempfile::TempDir::new().unwrap();
    let src_dir = tmp.path().join("src");
    std::fs::create_dir(&src_dir).unwrap();
    let input = src_dir.join("payload.txt");
    std::fs::write(&input, b"gzip round trip payload").unwrap();
    filetime::set_file_mtime(&input, filetime::FileTime::from_unix_time(1_650_000_000, 0))
        .unwrap();

    let packed_dir = tmp.path().join("packed");
    std::fs::create_dir(&packed_dir).unwrap();
    run_op(
        "gz",
        &[
            input.to_str().unwrap(),
            "-C",
            packed_dir.to_str().unwrap(),
        ],
    )
    .unwrap();
    let gz = packed_dir.join("payload.txt.gz");
    assert!(gz.exists());

    let out_dir = tmp.path().join("out");
    std::fs::create_dir(&out_dir).unwrap();
    run_op(
        "ungz",
        &[gz.to_str().unwrap(), "-C", out_dir.to_str().unwrap()],
    )
    .unwrap();

    let restored = out_dir.join("payload.txt");
    assert_eq!(std::fs::read(&restored).unwrap(), b"gzip round trip payload");
    let md = std::fs::metadata(&restored).unwrap();
    let mt = filetime::FileTime::from_last_modification_time(&md);
    assert_eq!(mt.unix_seconds(), 1_650_000_000);
}

#[test]
fn test_gz_multiple_inputs_spawn_subtasks() {
    let tmp = tempfile::TempDir::new().unwrap();
    let mut inputs = Vec::new();
    for i in 0..5 {
        let p = tmp.path().join(format!("file{}.dat", i));
        std::fs::write(&p, format!("content number {}", i)).unwrap();
        inputs.push(p);
    }
    let packed = tmp.path().join("packed");
    std::fs::create_dir(&packed).unwrap();

    let mut args: Vec<&str> = inputs.iter().map(|p| p.to_str().unwrap()).collect();
    let packed_s = packed.to_str().unwrap().to_string();
    args.push("-C");
    args.push(&packed_s);
    run_op("gz", &args).unwrap();

    for i in 0..5 {
        assert!(packed.join(format!("file{}.dat.gz", i)).exists());
    }
}

#[test]
fn test_xz_round_trip() {
    let tmp = tempfile::TempDir::new().unwrap();
    let input = tmp.path().join("data.bin");
    let payload: Vec<u8> = (0..100_000u32).map(|i| (i % 253) as u8).collect();
    std::fs::write(&input, &payload).unwrap();

    let packed = tmp.path().join("packed");
    let out = tmp.path().join("out");
    std::fs::create_dir(&packed).unwrap();
    std::fs::create_dir(&out).unwrap();

    run_op("xz", &[input.to_str().unwrap(), "-C", packed.to_str().unwrap()]).unwrap();
    let xz = packed.join("data.bin.xz");
    assert!(xz.exists());
    run_op("unxz", &[xz.to_str().unwrap(), "-C", out.to_str().unwrap()]).unwrap();

    assert_eq!(
        md5_hex(&std::fs::read(out.join("data.bin")).unwrap()),
        md5_hex(&payload)
    );
}

#[test]
fn test_zst_round_trip() {
    let tmp = tempfile::TempDir::new().unwrap();
    let input = tmp.path().join("data.bin");
    let payload: Vec<u8> = (0..80_000u32).map(|i| (i % 101) as u8).collect();
    std::fs::write(&input, &payload).unwrap();

    let packed = tmp.path().join("packed");
    let out = tmp.path().join("out");
    std::fs::create_dir(&packed).unwrap();
    std::fs::create_dir(&out).unwrap();

    run_op("zst", &[input.to_str().unwrap(), "-C", packed.to_str().unwrap()]).unwrap();
    run_op(
        "unzst",
        &[
            packed.join("data.bin.zst").to_str().unwrap(),
            "-C",
            out.to_str().unwrap(),
        ],
    )
    .unwrap();

    assert_eq!(std::fs::read(out.join("data.bin")).unwrap(), payload);
}

#[test]
fn test_zip_round_trip_with_nested_dirs() {
    let tmp = tempfile::TempDir::new().unwrap();
    let tree = tmp.path().join("tree");
    std::fs::create_dir_all(tree.join("sub/deep")).unwrap();
    std::fs::write(tree.join("top.txt"), b"top-level file contents, long enough to deflate").unwrap();
    std::fs::write(tree.join("sub/deep/leaf.bin"), vec![7u8; 4096]).unwrap();
    // Below the store threshold: archived uncompressed.
    std::fs::write(tree.join("tiny"), b"abc").unwrap();

    let archive = tmp.path().join("tree.zip");
    run_op(
        "zip",
        &[
            tree.to_str().unwrap(),
            "-r",
            "-o",
            archive.to_str().unwrap(),
        ],
    )
    .unwrap();
    assert!(archive.exists());

    // Verify the store decision with the zip crate directly.
    let file = std::fs::File::open(&archive).unwrap();
    let mut za = zip::ZipArchive::new(file).unwrap();
    let mut stored_tiny = false;
    for i in 0..za.len() {
        let m = za.by_index(i).unwrap();
        if m.name().ends_with("tiny") {
            stored_tiny = m.compression() == zip::CompressionMethod::Stored;
        }
    }
    assert!(stored_tiny, "tiny member must be stored uncompressed");

    let out = tmp.path().join("out");
    std::fs::create_dir(&out).unwrap();
    run_op(
        "unzip",
        &[archive.to_str().unwrap(), "-C", out.to_str().unwrap()],
    )
    .unwrap();

    // Member names carry the path below the scan root.
    let base = out.join(tree.strip_prefix("/").unwrap_or(&tree));
    assert_eq!(
        std::fs::read(base.join("top.txt")).unwrap(),
        b"top-level file contents, long enough to deflate"
    );
    assert_eq!(std::fs::read(base.join("sub/deep/leaf.bin")).unwrap(), vec![7u8; 4096]);
    assert_eq!(std::fs::read(base.join("tiny")).unwrap(), b"abc");
}

#[test]
fn test_unzip_member_filter() {
    let tmp = tempfile::TempDir::new().unwrap();
    let tree = tmp.path().join("tree");
    std::fs::create_dir(&tree).unwrap();
    std::fs::write(tree.join("wanted.txt"), b"wanted-file-data-here").unwrap();
    std::fs::write(tree.join("other.bin"), b"other-file-data-here!").unwrap();

    let archive = tmp.path().join("a.zip");
    run_op(
        "zip",
        &[tree.to_str().unwrap(), "-r", "-o", archive.to_str().unwrap()],
    )
    .unwrap();

    let out = tmp.path().join("out");
    std::fs::create_dir(&out).unwrap();
    run_op(
        "unzip",
        &[
            archive.to_str().unwrap(),
            "-C",
            out.to_str().unwrap(),
            "--members",
            "*wanted*",
        ],
    )
    .unwrap();

    let mut found_wanted = false;
    let mut found_other = false;
    for entry in walk(&out) {
        if entry.ends_with("wanted.txt") {
            found_wanted = true;
        }
        if entry.ends_with("other.bin") {
            found_other = true;
        }
    }
    assert!(found_wanted);
    assert!(!found_other);
}

#[test]
fn test_ico_pack_and_unpack() {
    let tmp = tempfile::TempDir::new().unwrap();

    // A 4x4 PNG source image.
    let png_path = tmp.path().join("dot.png");
    {
        let mut out = Vec::new();
        {
            let mut enc = png::Encoder::new(&mut out, 4, 4);
            enc.set_color(png::ColorType::Rgba);
            enc.set_depth(png::BitDepth::Eight);
            let mut w = enc.write_header().unwrap();
            w.write_image_data(&[128u8; 64]).unwrap();
        }
        std::fs::write(&png_path, &out).unwrap();
    }

    let icon = tmp.path().join("app.ico");
    run_op(
        "ico",
        &[png_path.to_str().unwrap(), "-o", icon.to_str().unwrap()],
    )
    .unwrap();
    let ico_bytes = std::fs::read(&icon).unwrap();
    assert_eq!(&ico_bytes[..4], &[0, 0, 1, 0]);

    let out = tmp.path().join("out");
    std::fs::create_dir(&out).unwrap();
    run_op(
        "unico",
        &[icon.to_str().unwrap(), "-C", out.to_str().unwrap()],
    )
    .unwrap();

    let member = out.join("app-4x4.png");
    assert!(member.exists());
    // PNG members are embedded verbatim.
    assert_eq!(
        std::fs::read(&member).unwrap(),
        std::fs::read(&png_path).unwrap()
    );
}

/// Flat recursive listing of file paths below `dir`.
fn walk(dir: &std::path::Path) -> Vec<String> {
    let mut out = Vec::new();
    let mut stack = vec![dir.to_path_buf()];
    while let Some(d) = stack.pop() {
        if let Ok(rd) = std::fs::read_dir(&d) {
            for e in rd.flatten() {
                let p = e.path();
                if p.is_dir() {
                    stack.push(p);
                } else {
                    out.push(p.to_string_lossy().into_owned());
                }
            }
        }
    }
    out
}
