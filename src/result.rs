//! Error types and the related `Result<T>`

use thiserror::Error;

pub type AafResult<T> = Result<T, AafError>;

#[derive(Debug, Error)]
pub enum AafError {
    /// An error from underlying I/O
    #[error("I/O Error")]
    Io(#[from] std::io::Error),

    /// The archive's header or table of contents is malformed.
    #[error("Invalid asset archive: {0}")]
    InvalidArchive(&'static str),

    /// Decoding a UTF-8 entry name failed
    #[error("Invalid UTF-8")]
    Encoding(#[from] std::str::Utf8Error),

    /// The archive uses a version or flag this library doesn't understand.
    #[error("Unsupported asset archive: {0}")]
    UnsupportedArchive(String),

    /// zlib failed to compress or decompress a chunk.
    #[error("Compression error")]
    Compression(#[source] std::io::Error),

    /// No entry in the archive has the requested name
    #[error("No entry in the archive named {0}")]
    NoSuchEntry(String),

    /// An entry with this name was already added to the archive being built.
    #[error("Duplicate entry {0}")]
    DuplicateEntry(String),

    /// An entry name can't be stored, or can't safely become a file path.
    #[error("Invalid entry name: {0}")]
    InvalidName(String),

    /// A cast from a 64-bit int to a usize failed,
    /// probably on a 32-bit system.
    #[error("Asset archive too large for address space")]
    InsufficientAddressSpace,
}

impl AafError {
    /// Returns true if the error comes from a structurally bad archive
    /// (as opposed to I/O, compression, or a missing entry).
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            AafError::InvalidArchive(_) | AafError::UnsupportedArchive(_) | AafError::Encoding(_)
        )
    }
}
