use std::fs::{self, File};
use std::path::Path;

use anyhow::{Context, Result};
use log::*;
use memmap2::Mmap;

use rayon::prelude::*;

use aaf::read::*;
use aaf::result::AafError;
use aaf::write::ArchiveWriter;

/// Some made-up assets: a few tiny "images", something compressible,
/// and an empty file.
fn inputs() -> Vec<(&'static str, Vec<u8>)> {
    vec![
        ("hero.png", b"\x89PNG\r\n\x1a\n not really a png".to_vec()),
        ("tiles.png", (0..=255u8).cycle().take(50_000).collect()),
        ("empty.bin", Vec::new()),
        ("notes.txt", b"The quick brown fox ".repeat(200)),
        ("a.bin", vec![0x01, 0x02, 0x03]),
    ]
}

fn pack(dir: &Path, compress: bool) -> Result<std::path::PathBuf> {
    let mut writer = ArchiveWriter::new(compress);
    for (name, contents) in inputs() {
        let path = dir.join(name);
        fs::write(&path, &contents)?;
        writer.add_file(&path)?;
    }
    let archive_path = dir.join(if compress { "packed-z.aaf" } else { "packed.aaf" });
    writer.write_to_path(&archive_path)?;
    Ok(archive_path)
}

#[test]
fn smoke() -> Result<()> {
    let _ = env_logger::builder().is_test(true).try_init();

    let tempdir = tempfile::tempdir()?;
    for compress in [false, true] {
        let archive_path = pack(tempdir.path(), compress)?;
        read_archive(&archive_path, compress)?;
    }
    tempdir.close()?;
    Ok(())
}

fn read_archive(archive_path: &Path, compressed: bool) -> Result<()> {
    info!("Memory mapping {:#?}", archive_path);
    let archive_file = File::open(archive_path).context("Couldn't open archive")?;
    let mapping = unsafe { Mmap::map(&archive_file).context("Couldn't mmap archive")? };

    let archive = AssetArchive::new(&mapping).context("Couldn't load archive")?;
    assert_eq!(archive.is_compressed(), compressed);

    let expected = inputs();
    let names: Vec<&str> = expected.iter().map(|(n, _)| *n).collect();
    assert_eq!(archive.list(), names);

    // Chunks are back to back, right after the header.
    let entries = archive.entries();
    assert_eq!(entries[0].offset, 14);
    for pair in entries.windows(2) {
        assert_eq!(pair[1].offset, pair[0].offset + pair[0].size);
    }
    assert_eq!(entries.last().unwrap().end(), archive.toc_offset());

    // Pull every entry out at once.
    expected
        .par_iter()
        .try_for_each::<_, Result<()>>(|(name, contents)| {
            let extracted = archive.extract(name)?;
            assert_eq!(&extracted, contents, "{} didn't round trip", name);
            Ok(())
        })?;

    match archive.extract("does-not-exist") {
        Err(AafError::NoSuchEntry(n)) => assert_eq!(n, "does-not-exist"),
        Err(other) => panic!("Got incorrect error for a missing entry: {:?}", other),
        Ok(_) => panic!("Got contents back for a missing entry"),
    };
    Ok(())
}

#[test]
fn extract_to_disk() -> Result<()> {
    let _ = env_logger::builder().is_test(true).try_init();

    let tempdir = tempfile::tempdir()?;
    let archive_path = pack(tempdir.path(), true)?;
    let bytes = fs::read(&archive_path)?;
    let archive = AssetArchive::new(&bytes)?;

    let out_dir = tempdir.path().join("out");
    let out_dir = camino::Utf8Path::from_path(&out_dir).context("Temp dir isn't UTF-8")?;
    for name in archive.list() {
        let dest = extraction_path(out_dir, name)?;
        archive.extract_to(name, &dest)?;
    }
    for (name, contents) in inputs() {
        assert_eq!(fs::read(out_dir.join(name))?, contents);
    }
    Ok(())
}

#[test]
fn single_file_layout() -> Result<()> {
    let mut writer = ArchiveWriter::new(false);
    writer.add_bytes("a.bin", &[0x01, 0x02, 0x03])?;
    let bytes = writer.write(Vec::new())?;

    let mut expected = Vec::new();
    expected.extend_from_slice(b"AAF\0");
    expected.push(1); // version
    expected.push(0); // flags
    expected.extend_from_slice(&17u64.to_le_bytes());
    expected.extend_from_slice(&[0x01, 0x02, 0x03]);
    expected.extend_from_slice(&1u32.to_le_bytes());
    expected.extend_from_slice(&crc32fast::hash(b"a.bin").to_le_bytes());
    expected.extend_from_slice(&14u64.to_le_bytes());
    expected.extend_from_slice(&3u64.to_le_bytes());
    expected.extend_from_slice(&5u32.to_le_bytes());
    expected.extend_from_slice(b"a.bin");
    assert_eq!(bytes, expected);

    let archive = AssetArchive::new(&bytes)?;
    assert_eq!(archive.extract("a.bin")?, [0x01, 0x02, 0x03]);
    assert!(matches!(
        archive.extract("b.bin"),
        Err(AafError::NoSuchEntry(_))
    ));
    Ok(())
}

#[test]
fn garbage_is_rejected() {
    // A well-formed empty archive, apart from the magic
    let mut bytes = Vec::new();
    bytes.extend_from_slice(b"ZIP\0");
    bytes.extend_from_slice(&[1, 0]);
    bytes.extend_from_slice(&14u64.to_le_bytes());
    bytes.extend_from_slice(&0u32.to_le_bytes());

    match AssetArchive::new(&bytes) {
        Err(e) => assert!(e.is_format_error(), "{:?}", e),
        Ok(_) => panic!("Loaded an archive with the wrong magic"),
    }
}
