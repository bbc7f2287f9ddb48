//! Tools for reading an asset archive.
//!
//! To start reading an archive, first create an [`AssetArchive`] from its bytes.
//! Only the header and table of contents are parsed up front;
//! chunks are sliced out of the backing bytes when an entry is read.
//!
//! [`AssetArchive`]: struct.AssetArchive.html

use std::borrow::Cow;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::Path;

use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use flate2::read::ZlibDecoder;
use log::*;

use crate::arch::usize;
use crate::format::{self, Header, TocRecord};
use crate::result::*;

/// Metadata for one packed file, from the table of contents
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry<'a> {
    /// The entry's name, unique within the archive
    pub name: Cow<'a, str>,

    /// CRC-32 of the name
    pub name_hash: u32,

    /// Where the entry's chunk starts, from the front of the archive
    pub offset: u64,

    /// Length of the stored (possibly compressed) chunk in bytes
    pub size: u64,
}

impl<'a> Entry<'a> {
    pub(crate) fn from_record(record: &TocRecord<'a>) -> AafResult<Self> {
        let name = std::str::from_utf8(record.name)?;
        Ok(Self {
            name: Cow::Borrowed(name),
            name_hash: record.name_hash,
            offset: record.offset,
            size: record.size,
        })
    }

    pub(crate) fn to_record(&self) -> TocRecord<'_> {
        TocRecord {
            name_hash: self.name_hash,
            offset: self.offset,
            size: self.size,
            name: self.name.as_bytes(),
        }
    }

    /// The offset one past this entry's last byte
    pub fn end(&self) -> u64 {
        self.offset.saturating_add(self.size)
    }

    pub fn into_owned(self) -> Entry<'static> {
        Entry {
            name: Cow::Owned(self.name.into_owned()),
            ..self
        }
    }
}

/// An asset archive to be read
#[derive(Debug)]
pub struct AssetArchive<'a> {
    /// The contents of the archive, as a byte slice.
    mapping: &'a [u8],
    header: Header,
    /// Entries in the order they were written
    entries: Vec<Entry<'a>>,
    /// Maps a name hash to indexes into `entries`
    by_hash: HashMap<u32, Vec<usize>>,
}

impl<'a> AssetArchive<'a> {
    /// Reads an asset archive from a byte slice.
    /// Smaller files can be read into a buffer.
    ///
    /// ```no_run
    /// # use std::fs;
    /// # use aaf::*;
    /// let bytes = fs::read("sprites.aaf")?;
    /// let archive = AssetArchive::new(&bytes)?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    ///
    /// Larger ones can be memory mapped,
    /// so chunks are only paged in when they're extracted.
    pub fn new(mapping: &'a [u8]) -> AafResult<Self> {
        let header = Header::parse(mapping)?;
        trace!("{:?}", header);

        if header.toc_offset < format::HEADER_SIZE || header.toc_offset > mapping.len() as u64 {
            return Err(AafError::InvalidArchive(
                "Table of contents offset is outside the archive",
            ));
        }
        let toc_start = usize(header.toc_offset)?;

        let records = format::parse_toc(&mapping[toc_start..])?;
        let mut entries = Vec::with_capacity(records.len());
        for record in &records {
            let entry = Entry::from_record(record)?;
            check_entry(&entry, &header)?;
            debug!("{:?}", entry);
            entries.push(entry);
        }

        if cfg!(feature = "check-toc") {
            check_contiguous(&entries, &header)?;
        }

        let mut by_hash: HashMap<u32, Vec<usize>> = HashMap::with_capacity(entries.len());
        for (i, entry) in entries.iter().enumerate() {
            let same_hash = by_hash.entry(entry.name_hash).or_default();
            if same_hash.iter().any(|&j| entries[j].name == entry.name) {
                warn!("Duplicate entry {}; lookups will find the first", entry.name);
            }
            same_hash.push(i);
        }

        info!(
            "Read {} entries ({})",
            entries.len(),
            if header.all_compressed() {
                "compressed"
            } else {
                "stored"
            }
        );
        Ok(Self {
            mapping,
            header,
            entries,
            by_hash,
        })
    }

    /// Returns the entries found in the archive's table of contents,
    /// in the order they were written.
    pub fn entries(&self) -> &[Entry<'a>] {
        &self.entries
    }

    /// Returns the name of every entry, in the order they were written.
    pub fn list(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_ref()).collect()
    }

    pub fn version(&self) -> u8 {
        self.header.version
    }

    /// True if every chunk in the archive is zlib-compressed
    pub fn is_compressed(&self) -> bool {
        self.header.all_compressed()
    }

    pub fn toc_offset(&self) -> u64 {
        self.header.toc_offset
    }

    /// Finds the entry with the given name.
    ///
    /// The name hash narrows the search,
    /// but names are always compared in full since CRC-32 can collide.
    pub fn lookup(&self, name: &str) -> AafResult<&Entry<'a>> {
        self.by_hash
            .get(&format::name_hash(name))
            .into_iter()
            .flatten()
            .map(|&i| &self.entries[i])
            .find(|e| e.name == name)
            .ok_or_else(|| AafError::NoSuchEntry(name.to_owned()))
    }

    /// Reads the given entry from the archive,
    /// decompressing it on the fly if the archive is compressed.
    ///
    /// Each reader borrows its own slice of the archive,
    /// so several entries can be read in parallel.
    pub fn read(&self, entry: &Entry) -> AafResult<Box<dyn io::Read + Send + 'a>> {
        let start = usize(entry.offset)?;
        let end = usize(entry.end())?;
        let mapping: &'a [u8] = self.mapping;
        let chunk = mapping
            .get(start..end)
            .ok_or(AafError::InvalidArchive("Chunk is outside the archive"))?;
        debug!("Reading {} ({} stored bytes)", entry.name, chunk.len());
        Ok(make_reader(self.is_compressed(), chunk))
    }

    /// Looks up an entry by name and returns its (decompressed) contents.
    pub fn extract(&self, name: &str) -> AafResult<Vec<u8>> {
        let entry = self.lookup(name)?;
        let mut reader = self.read(entry)?;
        let mut contents = Vec::new();
        reader.read_to_end(&mut contents).map_err(|e| {
            if self.is_compressed() {
                AafError::Compression(e)
            } else {
                AafError::Io(e)
            }
        })?;
        Ok(contents)
    }

    /// Looks up an entry by name and writes its contents to `dest`,
    /// creating parent directories as needed.
    pub fn extract_to<P: AsRef<Path>>(&self, name: &str, dest: P) -> AafResult<()> {
        let dest = dest.as_ref();
        let contents = self.extract(name)?;
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut sink = File::create(dest)?;
        sink.write_all(&contents)?;
        Ok(())
    }
}

/// Returns a boxed read trait for a chunk,
/// given whether the archive compresses its chunks.
fn make_reader(compressed: bool, chunk: &[u8]) -> Box<dyn io::Read + Send + '_> {
    if compressed {
        Box::new(ZlibDecoder::new(chunk))
    } else {
        Box::new(chunk)
    }
}

/// Makes sure an entry's chunk sits between the header and the table of contents,
/// and that its stored hash matches its name.
fn check_entry(entry: &Entry, header: &Header) -> AafResult<()> {
    if entry.offset < format::HEADER_SIZE || entry.end() > header.toc_offset {
        return Err(AafError::InvalidArchive("Entry chunk is outside the chunk region"));
    }
    if cfg!(feature = "check-toc") && entry.name_hash != format::name_hash(&entry.name) {
        return Err(AafError::InvalidArchive(
            "Stored name hash doesn't match entry name",
        ));
    }
    Ok(())
}

/// Chunks should be packed back to back, from the end of the header
/// to the start of the table of contents.
fn check_contiguous(entries: &[Entry], header: &Header) -> AafResult<()> {
    let mut expected = format::HEADER_SIZE;
    for entry in entries {
        if entry.offset != expected {
            return Err(AafError::InvalidArchive("Chunks aren't contiguous"));
        }
        expected = entry.end();
    }
    if expected != header.toc_offset {
        return Err(AafError::InvalidArchive(
            "Chunks don't end at the table of contents",
        ));
    }
    Ok(())
}

/// Joins an entry name onto `dir`, for extracting to disk.
///
/// The name comes from the archive, not the user,
/// so reject anything that would land outside of `dir`.
pub fn extraction_path<P: AsRef<Utf8Path>>(dir: P, name: &str) -> AafResult<Utf8PathBuf> {
    let path = Utf8Path::new(name);
    if name.is_empty() {
        return Err(AafError::InvalidName(String::from("Empty name")));
    }

    for component in path.components() {
        match component {
            Utf8Component::Prefix(prefix) => {
                return Err(AafError::InvalidName(format!(
                    "Prefix {prefix} found in {path}",
                )));
            }
            Utf8Component::RootDir => {
                return Err(AafError::InvalidName(format!(
                    "Root directory found in {path}",
                )));
            }
            Utf8Component::ParentDir => {
                return Err(AafError::InvalidName(format!(
                    "Parent dir (..) found in {path}",
                )));
            }
            Utf8Component::CurDir => {
                warn!("Current dir (.) found in {path}");
                // Huh. Keep going.
            }
            Utf8Component::Normal(_) => {}
        }
    }
    Ok(dir.as_ref().join(path))
}
