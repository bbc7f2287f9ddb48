//! Tools for building an asset archive.
//!
//! An [`ArchiveWriter`] collects chunks in memory, one per added file,
//! and works out where each will land as it goes.
//! Calling [`ArchiveWriter::write()`] then streams the header, the chunks,
//! and the table of contents out in one pass.
//!
//! [`ArchiveWriter`]: struct.ArchiveWriter.html
//! [`ArchiveWriter::write()`]: struct.ArchiveWriter.html#method.write

use std::borrow::Cow;
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;

use flate2::write::ZlibEncoder;
use flate2::Compression;
use log::*;

use crate::format::{self, Header};
use crate::read::Entry;
use crate::result::*;

/// Builds an archive in memory, then writes it out once.
#[derive(Debug)]
pub struct ArchiveWriter {
    /// `None` if chunks are stored as-is
    compression: Option<Compression>,
    entries: Vec<Entry<'static>>,
    /// Names in `entries`, for turning away duplicates
    names: HashSet<String>,
    /// Stored bytes for each entry, in the same order
    chunks: Vec<Vec<u8>>,
    /// Total length of `chunks`
    chunk_bytes: u64,
}

impl ArchiveWriter {
    /// Starts an empty archive.
    ///
    /// Compressed archives use zlib's best (and slowest) level;
    /// see [`with_compression()`](#method.with_compression) to pick another.
    pub fn new(compress: bool) -> Self {
        if compress {
            Self::with_compression(Compression::best())
        } else {
            Self::empty(None)
        }
    }

    /// Starts an empty archive where every chunk is compressed at the given level.
    pub fn with_compression(level: Compression) -> Self {
        Self::empty(Some(level))
    }

    fn empty(compression: Option<Compression>) -> Self {
        Self {
            compression,
            entries: Vec::new(),
            names: HashSet::new(),
            chunks: Vec::new(),
            chunk_bytes: 0,
        }
    }

    pub fn is_compressed(&self) -> bool {
        self.compression.is_some()
    }

    /// Returns the entries added so far, in the order they were added.
    pub fn entries(&self) -> &[Entry<'static>] {
        &self.entries
    }

    /// Where the table of contents will start if the archive is written now
    pub fn toc_offset(&self) -> u64 {
        format::HEADER_SIZE + self.chunk_bytes
    }

    /// Adds the file at `path`, named after its last path component.
    pub fn add_file<P: AsRef<Path>>(&mut self, path: P) -> AafResult<&Entry<'static>> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                AafError::InvalidName(format!("{} has no UTF-8 file name", path.display()))
            })?;
        self.add_file_as(name, path)
    }

    /// Adds the file at `path` under the given name.
    pub fn add_file_as<P: AsRef<Path>>(
        &mut self,
        name: &str,
        path: P,
    ) -> AafResult<&Entry<'static>> {
        // Fail on the name before bothering to read anything.
        self.check_name(name)?;
        let raw = fs::read(path)?;
        self.add_checked(name, &raw)
    }

    /// Adds `data` under the given name.
    ///
    /// If this fails, the archive is left as it was.
    pub fn add_bytes(&mut self, name: &str, data: &[u8]) -> AafResult<&Entry<'static>> {
        self.check_name(name)?;
        self.add_checked(name, data)
    }

    /// Compresses and appends a chunk whose name already passed `check_name()`.
    fn add_checked(&mut self, name: &str, data: &[u8]) -> AafResult<&Entry<'static>> {
        let stored = match self.compression {
            Some(level) => compress(data, level).map_err(AafError::Compression)?,
            None => data.to_vec(),
        };

        let size = stored.len() as u64;
        let offset = self.toc_offset();
        let chunk_bytes = self
            .chunk_bytes
            .checked_add(size)
            .filter(|total| total.checked_add(format::HEADER_SIZE).is_some())
            .ok_or_else(|| AafError::UnsupportedArchive(String::from("Archive too large")))?;

        let entry = Entry {
            name: Cow::Owned(name.to_owned()),
            name_hash: format::name_hash(name),
            offset,
            size,
        };
        debug!("Added {} ({} bytes, {} stored) at {}", name, data.len(), size, offset);

        let index = self.entries.len();
        self.chunks.push(stored);
        self.chunk_bytes = chunk_bytes;
        self.names.insert(name.to_owned());
        self.entries.push(entry);
        Ok(&self.entries[index])
    }

    fn check_name(&self, name: &str) -> AafResult<()> {
        if name.is_empty() {
            return Err(AafError::InvalidName(String::from("Empty name")));
        }
        if u32::try_from(name.len()).is_err() {
            return Err(AafError::InvalidName(format!(
                "{} bytes is too long",
                name.len()
            )));
        }
        if self.names.contains(name) {
            return Err(AafError::DuplicateEntry(name.to_owned()));
        }
        Ok(())
    }

    /// Writes the header, every chunk, then the table of contents to `out`,
    /// and hands `out` back.
    ///
    /// This consumes the writer; an archive is committed exactly once.
    pub fn write<W: Write>(self, mut out: W) -> AafResult<W> {
        let header = Header::new(self.is_compressed(), self.toc_offset());
        trace!("{:?}", header);
        header.write(&mut out)?;

        for chunk in &self.chunks {
            out.write_all(chunk)?;
        }

        format::write_toc(&mut out, self.entries.iter().map(Entry::to_record))?;
        out.flush()?;

        info!(
            "Wrote {} entries, table of contents at {}",
            self.entries.len(),
            header.toc_offset
        );
        Ok(out)
    }

    /// Writes the archive to a new file at `path`.
    pub fn write_to_path<P: AsRef<Path>>(self, path: P) -> AafResult<()> {
        let out = io::BufWriter::new(File::create(path)?);
        self.write(out)?;
        Ok(())
    }
}

fn compress(data: &[u8], level: Compression) -> io::Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), level);
    encoder.write_all(data)?;
    encoder.finish()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn single_stored_file() {
        let mut writer = ArchiveWriter::new(false);
        let entry = writer.add_bytes("a.bin", &[1, 2, 3]).unwrap().clone();
        assert_eq!(entry.offset, 14);
        assert_eq!(entry.size, 3);
        assert_eq!(entry.name_hash, format::name_hash("a.bin"));
        assert_eq!(writer.toc_offset(), 17);

        let bytes = writer.write(Vec::new()).unwrap();
        assert_eq!(&bytes[..4], b"AAF\0");
        assert_eq!(bytes[4], 1, "version");
        assert_eq!(bytes[5], 0, "flags");
        assert_eq!(bytes[6..14], 17u64.to_le_bytes());
        assert_eq!(bytes[14..17], [1, 2, 3]);
        assert_eq!(bytes[17..21], 1u32.to_le_bytes());
        assert_eq!(bytes.len(), 17 + 4 + 24 + 5);
    }

    #[test]
    fn offsets_are_contiguous() {
        let mut writer = ArchiveWriter::new(true);
        writer.add_bytes("one", b"first file").unwrap();
        writer.add_bytes("two", &[0; 1000]).unwrap();
        writer.add_bytes("three", b"").unwrap();

        let entries = writer.entries();
        assert_eq!(entries[0].offset, format::HEADER_SIZE);
        for pair in entries.windows(2) {
            assert_eq!(pair[1].offset, pair[0].offset + pair[0].size);
        }
        let last = entries.last().unwrap();
        assert_eq!(writer.toc_offset(), last.offset + last.size);
    }

    #[test]
    fn empty_archive() {
        let bytes = ArchiveWriter::new(true).write(Vec::new()).unwrap();
        let mut expected = Vec::new();
        expected.extend_from_slice(b"AAF\0\x01\x01");
        expected.extend_from_slice(&14u64.to_le_bytes());
        expected.extend_from_slice(&0u32.to_le_bytes());
        assert_eq!(bytes, expected);
    }

    #[test]
    fn failed_adds_change_nothing() {
        let mut writer = ArchiveWriter::new(false);
        writer.add_bytes("a.bin", &[1, 2, 3]).unwrap();

        assert!(matches!(
            writer.add_bytes("a.bin", &[4, 5, 6]),
            Err(AafError::DuplicateEntry(_))
        ));
        assert!(matches!(
            writer.add_bytes("", &[4, 5, 6]),
            Err(AafError::InvalidName(_))
        ));
        assert!(matches!(
            writer.add_file("/definitely/not/a/real/file.png"),
            Err(AafError::Io(_))
        ));

        assert_eq!(writer.entries().len(), 1);
        assert_eq!(writer.toc_offset(), 17);
    }

    #[test]
    fn duplicate_names_are_refused_before_reading() {
        let mut writer = ArchiveWriter::new(false);
        writer.add_bytes("hero.png", b"not really a png").unwrap();

        // The path doesn't exist, so reaching the read would be an Io error.
        assert!(matches!(
            writer.add_file_as("hero.png", "/definitely/not/a/real/hero.png"),
            Err(AafError::DuplicateEntry(name)) if name == "hero.png"
        ));
        assert!(matches!(
            writer.add_file("/definitely/not/a/real/hero.png"),
            Err(AafError::DuplicateEntry(_))
        ));

        // Names are compared exactly.
        writer.add_bytes("Hero.png", b"also not a png").unwrap();
        writer.add_bytes("sprites/hero.png", b"still not a png").unwrap();
        assert_eq!(writer.entries().len(), 3);
    }

    #[test]
    fn many_entries() {
        let mut writer = ArchiveWriter::new(false);
        for i in 0..5000u32 {
            writer.add_bytes(&format!("tiles/{i}.bin"), &i.to_le_bytes()).unwrap();
        }
        assert!(matches!(
            writer.add_bytes("tiles/4999.bin", &[]),
            Err(AafError::DuplicateEntry(_))
        ));
        assert_eq!(writer.entries().len(), 5000);
        assert_eq!(writer.toc_offset(), 14 + 5000 * 4);
    }

    #[test]
    fn compression_shrinks_repetitive_data() {
        let mut writer = ArchiveWriter::with_compression(Compression::fast());
        let entry = writer.add_bytes("flat.png", &[0xAB; 10_000]).unwrap();
        assert!(entry.size < 10_000);
    }
}
