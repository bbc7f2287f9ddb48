//! Code specific to the AAF byte layout.
//!
//! We try to keep the nitty gritty here,
//! and higher-level stuff in the [`read`] and [`write`] modules.
//!
//! An archive looks like this, with every integer little-endian:
//!
//! ```text
//! header          14 bytes
//!   magic           4 bytes  "AAF\0"
//!   version         1 byte   (1)
//!   flags           1 byte   (bit 0: every chunk is zlib-compressed)
//!   toc offset      8 bytes
//! chunks          one per entry, back to back, no per-chunk header
//! table of contents (at toc offset)
//!   entry count     4 bytes
//!   entries:
//!     name hash     4 bytes  (CRC-32 of the UTF-8 name)
//!     offset        8 bytes
//!     size          8 bytes  (stored, possibly compressed, length)
//!     name length   4 bytes
//!     name          (variable size, UTF-8, no terminator)
//! ```
//!
//! [`read`]: ../read/index.html
//! [`write`]: ../write/index.html

use std::io::{self, Write};

use crate::arch::usize;
use crate::result::*;

/// Archive magic number
pub const MAGIC: [u8; 4] = *b"AAF\0";

/// The only layout we know how to read or write.
pub const VERSION: u8 = 1;

/// Header flag: every chunk in the archive is compressed.
pub const FLAG_ALL_COMPRESSED: u8 = 0x01;

const KNOWN_FLAGS: u8 = FLAG_ALL_COMPRESSED;

/// Size of the fixed header, which is also where the first chunk starts.
pub const HEADER_SIZE: u64 = 14;

/// Derives the 32-bit fingerprint stored next to each entry's name.
pub fn name_hash(name: &str) -> u32 {
    crc32fast::hash(name.as_bytes())
}

/// Splits `n` bytes off the front of the provided slice, shrinking it.
fn take<'a>(input: &mut &'a [u8], n: usize, what: &'static str) -> AafResult<&'a [u8]> {
    if input.len() < n {
        return Err(AafError::InvalidArchive(what));
    }
    let (taken, rest) = input.split_at(n);
    *input = rest;
    Ok(taken)
}

fn take_array<const N: usize>(input: &mut &[u8], what: &'static str) -> AafResult<[u8; N]> {
    let mut array = [0u8; N];
    array.copy_from_slice(take(input, N, what)?);
    Ok(array)
}

/// Reads a little-endian u64 from the front of the provided slice, shrinking it.
fn read_u64(input: &mut &[u8], what: &'static str) -> AafResult<u64> {
    take_array(input, what).map(u64::from_le_bytes)
}

/// Reads a little-endian u32 from the front of the provided slice, shrinking it.
fn read_u32(input: &mut &[u8], what: &'static str) -> AafResult<u32> {
    take_array(input, what).map(u32::from_le_bytes)
}

fn read_u8(input: &mut &[u8], what: &'static str) -> AafResult<u8> {
    take_array::<1>(input, what).map(|[b]| b)
}

/// The fixed-size record at the front of every archive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub version: u8,
    pub flags: u8,
    pub toc_offset: u64,
}

impl Header {
    pub fn new(compressed: bool, toc_offset: u64) -> Self {
        Self {
            version: VERSION,
            flags: if compressed { FLAG_ALL_COMPRESSED } else { 0 },
            toc_offset,
        }
    }

    pub fn parse(mut header: &[u8]) -> AafResult<Self> {
        let magic: [u8; 4] = take_array(&mut header, "Too small for a header")?;
        if magic != MAGIC {
            return Err(AafError::InvalidArchive("Bad magic number"));
        }
        let version = read_u8(&mut header, "Too small for a header")?;
        let flags = read_u8(&mut header, "Too small for a header")?;
        let toc_offset = read_u64(&mut header, "Too small for a header")?;

        // Version 1 is the only layout there is; anything else could put
        // the fields we just read somewhere else entirely.
        if version != VERSION {
            return Err(AafError::UnsupportedArchive(format!(
                "Format version {version} (only {VERSION} is supported)"
            )));
        }
        if flags & !KNOWN_FLAGS != 0 {
            return Err(AafError::UnsupportedArchive(format!(
                "Unknown header flags {flags:#04x}"
            )));
        }

        Ok(Self {
            version,
            flags,
            toc_offset,
        })
    }

    pub fn write<W: Write>(&self, out: &mut W) -> io::Result<()> {
        out.write_all(&MAGIC)?;
        out.write_all(&[self.version, self.flags])?;
        out.write_all(&self.toc_offset.to_le_bytes())
    }

    pub fn all_compressed(&self) -> bool {
        self.flags & FLAG_ALL_COMPRESSED != 0
    }
}

/// One record from the table of contents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TocRecord<'a> {
    pub name_hash: u32,
    pub offset: u64,
    pub size: u64,
    pub name: &'a [u8],
}

impl<'a> TocRecord<'a> {
    /// Bytes of a record that come before the name
    pub const fn fixed_size_in_file() -> usize {
        4 + 8 + 8 + 4
    }

    pub fn parse_and_consume(record: &mut &'a [u8]) -> AafResult<Self> {
        const TRUNCATED: &str = "Truncated table of contents entry";
        let name_hash = read_u32(record, TRUNCATED)?;
        let offset = read_u64(record, TRUNCATED)?;
        let size = read_u64(record, TRUNCATED)?;
        let name_length = usize(read_u32(record, TRUNCATED)?)?;
        let name = take(record, name_length, "Entry name runs past the end of the archive")?;

        Ok(Self {
            name_hash,
            offset,
            size,
            name,
        })
    }

    pub fn write<W: Write>(&self, out: &mut W) -> AafResult<()> {
        let name_length = u32::try_from(self.name.len()).map_err(|_| {
            AafError::InvalidName(format!("{} bytes is too long", self.name.len()))
        })?;
        out.write_all(&self.name_hash.to_le_bytes())?;
        out.write_all(&self.offset.to_le_bytes())?;
        out.write_all(&self.size.to_le_bytes())?;
        out.write_all(&name_length.to_le_bytes())?;
        out.write_all(self.name)?;
        Ok(())
    }

    /// How many bytes this record takes up on disk
    pub fn size_in_file(&self) -> usize {
        Self::fixed_size_in_file() + self.name.len()
    }
}

/// Parses the whole table of contents, which should run to the end of the archive.
pub fn parse_toc(mut toc: &[u8]) -> AafResult<Vec<TocRecord<'_>>> {
    let entry_count = read_u32(&mut toc, "Table of contents is missing its entry count")?;

    // Don't trust the count for an allocation size;
    // every record takes at least its fixed fields.
    let plausible = toc.len() / TocRecord::fixed_size_in_file();
    let mut records = Vec::with_capacity(usize(entry_count)?.min(plausible));

    for _ in 0..entry_count {
        let record = TocRecord::parse_and_consume(&mut toc)?;
        log::trace!("{:?}", record);
        records.push(record);
    }

    if !toc.is_empty() {
        log::warn!("Ignoring {} trailing bytes after the table of contents", toc.len());
    }
    Ok(records)
}

/// Writes the entry count followed by every record.
pub fn write_toc<'a, W, I>(out: &mut W, records: I) -> AafResult<()>
where
    W: Write,
    I: ExactSizeIterator<Item = TocRecord<'a>>,
{
    let entry_count = u32::try_from(records.len())
        .map_err(|_| AafError::UnsupportedArchive(String::from("Too many entries")))?;
    out.write_all(&entry_count.to_le_bytes())?;
    for record in records {
        record.write(out)?;
    }
    Ok(())
}
