//! Error types for DBPF parsing, payload access, and serialisation.

use crate::key::ResourceKey;
use thiserror::Error;

/// Result type for DBPF operations
pub type Result<T> = std::result::Result<T, DbpfError>;

/// DBPF error taxonomy.
///
/// Parse-class errors (`NotDbpf`, `UnsupportedVersion`, `TruncatedHeader`,
/// `TruncatedIndex`) are fatal to the package being read. Payload-class
/// errors (`EntryOutOfRange`, `CorruptCompression`, `MissingEntry`) are
/// per-call; the package stays usable.
#[derive(Error, Debug)]
pub enum DbpfError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// First four bytes were not `DBPF`
    #[error("not a DBPF archive: bad magic {0:?}")]
    NotDbpf([u8; 4]),

    /// Version pair outside {1.0, 1.1, 1.2, 2.0}
    #[error("unsupported DBPF version {major}.{minor}")]
    UnsupportedVersion { major: u32, minor: u32 },

    /// Header ended before all version-mandated fields were read
    #[error("truncated DBPF header")]
    TruncatedHeader,

    /// Index table ended early
    #[error("truncated index: expected {expected} entries, read {read}")]
    TruncatedIndex { expected: u32, read: u32 },

    /// Entry points past the end of the archive
    #[error("entry {key} out of range: offset {offset} + size {size} exceeds archive length {len}")]
    EntryOutOfRange {
        key: ResourceKey,
        offset: u32,
        size: u32,
        len: u64,
    },

    /// Refpack blob failed to decode, or the compression directory is unreadable
    #[error("corrupt compressed data: {0}")]
    CorruptCompression(String),

    /// Operation required an entry that is not in the package
    #[error("no entry for {0}")]
    MissingEntry(ResourceKey),
}
