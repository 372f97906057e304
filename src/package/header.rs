//! DBPF header parsing and emission.
//!
//! Reading dispatches on the `(major, minor)` pair with explicit arms for
//! the versions the games shipped: 1.0, 1.1, 1.2 and 2.0. Anything else is
//! rejected up front. Writing always emits the 1.2 layout with index minor
//! version 2 and zeroed date, unknown and trash fields.

use crate::error::{DbpfError, Result};
use crate::iobuffer::IoBuffer;
use std::io::{self, Read, Seek, Write};

#[derive(Clone, Copy, Debug)]
pub(crate) struct Header {
    pub major: u32,
    pub minor: u32,
    pub index_minor: u32,
    pub num_entries: u32,
    pub index_offset: u32,
    pub index_size: u32,
    pub date_created: i32,
    pub date_modified: i32,
}

/// Positions of the fields the serialiser back-patches once the index and
/// payloads have been laid down.
pub(crate) struct HeaderSlots {
    pub index_offset_at: u64,
    pub index_size_at: u64,
}

fn truncated(e: io::Error) -> DbpfError {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        DbpfError::TruncatedHeader
    } else {
        DbpfError::Io(e)
    }
}

impl Header {
    pub(crate) fn read<S: Read + Seek>(buf: &mut IoBuffer<S>) -> Result<Self> {
        let magic = buf.read_bytes(4).map_err(truncated)?;
        if magic.as_slice() != b"DBPF" {
            return Err(DbpfError::NotDbpf([magic[0], magic[1], magic[2], magic[3]]));
        }
        let major = buf.read_u32().map_err(truncated)?;
        let minor = buf.read_u32().map_err(truncated)?;
        buf.skip(12).map_err(truncated)?;
        match (major, minor) {
            (1, 0) | (1, 1) | (1, 2) => Self::read_v1(buf, major, minor).map_err(truncated),
            (2, 0) => Self::read_v2(buf, major, minor).map_err(truncated),
            _ => Err(DbpfError::UnsupportedVersion { major, minor }),
        }
    }

    fn read_v1<S: Read + Seek>(buf: &mut IoBuffer<S>, major: u32, minor: u32) -> io::Result<Self> {
        let date_created = buf.read_i32()?;
        let date_modified = buf.read_i32()?;
        let _index_major = buf.read_u32()?;
        let num_entries = buf.read_u32()?;
        let index_offset = buf.read_u32()?;
        let index_size = buf.read_u32()?;
        buf.skip(12)?; // trash entry count / offset / size
        let index_minor = buf.read_u32()?;
        buf.skip(32)?;
        Ok(Self {
            major,
            minor,
            index_minor,
            num_entries,
            index_offset,
            index_size,
            date_created,
            date_modified,
        })
    }

    fn read_v2<S: Read + Seek>(buf: &mut IoBuffer<S>, major: u32, minor: u32) -> io::Result<Self> {
        let num_entries = buf.read_u32()?;
        let index_size = buf.read_u32()?;
        let index_minor = buf.read_u32()?;
        let index_offset = buf.read_u32()?;
        buf.skip(4)?;
        buf.skip(32)?;
        Ok(Self {
            major,
            minor,
            index_minor,
            num_entries,
            index_offset,
            index_size,
            date_created: 0,
            date_modified: 0,
        })
    }

    /// Writes the fixed 96-byte v1.2 header with placeholder index fields.
    pub(crate) fn write_v12<S: Write + Seek>(
        buf: &mut IoBuffer<S>,
        num_entries: u32,
    ) -> io::Result<HeaderSlots> {
        buf.write_bytes(b"DBPF")?;
        buf.write_u32(1)?;
        buf.write_u32(2)?;
        buf.write_bytes(&[0u8; 12])?;
        buf.write_i32(0)?; // date created
        buf.write_i32(0)?; // date modified
        buf.write_u32(7)?; // index major
        buf.write_u32(num_entries)?;
        let index_offset_at = buf.position()?;
        buf.write_u32(0)?;
        let index_size_at = buf.position()?;
        buf.write_u32(0)?;
        buf.write_u32(0)?; // trash entry count
        buf.write_u32(0)?; // trash index offset
        buf.write_u32(0)?; // trash index size
        buf.write_u32(2)?; // index minor
        buf.write_bytes(&[0u8; 32])?;
        Ok(HeaderSlots {
            index_offset_at,
            index_size_at,
        })
    }
}
