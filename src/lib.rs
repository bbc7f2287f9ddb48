//! aaf packs many asset files into a single archive
//! with a table of contents for finding them by name:
//!
//! ```no_run
//! # use aaf::*;
//! let mut writer = ArchiveWriter::new(true);
//! writer.add_file("sprites/hero.png")?;
//! writer.add_bytes("levels/one.txt", b"####\n#..#\n####\n")?;
//! writer.write_to_path("assets.aaf")?;
//!
//! let bytes = std::fs::read("assets.aaf")?;
//! let archive = AssetArchive::new(&bytes)?;
//! for name in archive.list() {
//!     println!("{name}");
//! }
//! let hero = archive.extract("hero.png")?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! An archive is a fixed 14-byte header, the stored bytes of each file
//! back to back (optionally zlib-compressed, all or nothing),
//! then a table of contents listing each entry's name, name hash,
//! offset, and size. See the [`format`] module for the exact layout.
//!
//! Reading only parses the header and the table of contents.
//! Entries are sliced out of the backing bytes when they're extracted,
//! so memory-mapping a large archive works well,
//! and since [`AssetArchive`] is `Sync`, several entries can be
//! extracted at once from different threads.
//!
//! [`format`]: format/index.html
//! [`AssetArchive`]: read/struct.AssetArchive.html

pub mod format;
pub mod read;
pub mod result;
pub mod write;

pub use read::{AssetArchive, Entry};
pub use result::{AafError, AafResult};
pub use write::ArchiveWriter;

/// zlib compression levels, for [`ArchiveWriter::with_compression()`]
///
/// [`ArchiveWriter::with_compression()`]: write/struct.ArchiveWriter.html#method.with_compression
pub use flate2::Compression;

mod arch;
