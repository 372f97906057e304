//! Little-endian binary cursor over a byte source.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Seek, SeekFrom, Write};

/// Endian-aware cursor wrapping any `Read`/`Write` + `Seek` source.
///
/// Readers get primitive and bulk reads; writers additionally get
/// [`IoBuffer::patch_u32`] for back-filling offsets recorded earlier with
/// [`IoBuffer::position`].
pub struct IoBuffer<S> {
    inner: S,
}

impl<S> IoBuffer<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    pub fn get_mut(&mut self) -> &mut S {
        &mut self.inner
    }
}

impl<S: Seek> IoBuffer<S> {
    pub fn position(&mut self) -> io::Result<u64> {
        self.inner.stream_position()
    }

    pub fn seek_to(&mut self, pos: u64) -> io::Result<u64> {
        self.inner.seek(SeekFrom::Start(pos))
    }

    pub fn seek_by(&mut self, delta: i64) -> io::Result<u64> {
        self.inner.seek(SeekFrom::Current(delta))
    }

    pub fn skip(&mut self, count: u64) -> io::Result<u64> {
        self.seek_by(count as i64)
    }

    /// Total length of the underlying source. Restores the current position.
    pub fn len(&mut self) -> io::Result<u64> {
        let pos = self.inner.stream_position()?;
        let end = self.inner.seek(SeekFrom::End(0))?;
        self.inner.seek(SeekFrom::Start(pos))?;
        Ok(end)
    }
}

impl<S: Read> IoBuffer<S> {
    pub fn read_u8(&mut self) -> io::Result<u8> {
        self.inner.read_u8()
    }

    pub fn read_u16(&mut self) -> io::Result<u16> {
        self.inner.read_u16::<LittleEndian>()
    }

    pub fn read_u32(&mut self) -> io::Result<u32> {
        self.inner.read_u32::<LittleEndian>()
    }

    pub fn read_i32(&mut self) -> io::Result<i32> {
        self.inner.read_i32::<LittleEndian>()
    }

    pub fn read_f32(&mut self) -> io::Result<f32> {
        self.inner.read_f32::<LittleEndian>()
    }

    pub fn read_bytes(&mut self, count: usize) -> io::Result<Vec<u8>> {
        let mut buf = vec![0u8; count];
        self.inner.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Reads exactly `count` bytes and returns the contents up to the first
    /// NUL, lossily decoded. No NUL scanning happens beyond the given length.
    pub fn read_c_string(&mut self, count: usize) -> io::Result<String> {
        let raw = self.read_bytes(count)?;
        let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
        Ok(String::from_utf8_lossy(&raw[..end]).into_owned())
    }
}

impl<S: Write> IoBuffer<S> {
    pub fn write_u8(&mut self, value: u8) -> io::Result<()> {
        self.inner.write_u8(value)
    }

    pub fn write_u16(&mut self, value: u16) -> io::Result<()> {
        self.inner.write_u16::<LittleEndian>(value)
    }

    pub fn write_u32(&mut self, value: u32) -> io::Result<()> {
        self.inner.write_u32::<LittleEndian>(value)
    }

    pub fn write_i32(&mut self, value: i32) -> io::Result<()> {
        self.inner.write_i32::<LittleEndian>(value)
    }

    pub fn write_f32(&mut self, value: f32) -> io::Result<()> {
        self.inner.write_f32::<LittleEndian>(value)
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.inner.write_all(bytes)
    }
}

impl<S: Write + Seek> IoBuffer<S> {
    /// Overwrites the u32 at `at`, then restores the current position.
    pub fn patch_u32(&mut self, at: u64, value: u32) -> io::Result<()> {
        let pos = self.inner.stream_position()?;
        self.inner.seek(SeekFrom::Start(at))?;
        self.inner.write_u32::<LittleEndian>(value)?;
        self.inner.seek(SeekFrom::Start(pos))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn primitive_round_trip() {
        let mut buf = IoBuffer::new(Cursor::new(Vec::new()));
        buf.write_u8(0xAB).unwrap();
        buf.write_u16(0xBEEF).unwrap();
        buf.write_u32(0xDEAD_BEEF).unwrap();
        buf.write_i32(-42).unwrap();
        buf.write_f32(1.5).unwrap();

        buf.seek_to(0).unwrap();
        assert_eq!(buf.read_u8().unwrap(), 0xAB);
        assert_eq!(buf.read_u16().unwrap(), 0xBEEF);
        assert_eq!(buf.read_u32().unwrap(), 0xDEAD_BEEF);
        assert_eq!(buf.read_i32().unwrap(), -42);
        assert_eq!(buf.read_f32().unwrap(), 1.5);
    }

    #[test]
    fn c_string_stops_at_nul() {
        let mut buf = IoBuffer::new(Cursor::new(b"abc\0def".to_vec()));
        assert_eq!(buf.read_c_string(7).unwrap(), "abc");
        assert_eq!(buf.position().unwrap(), 7);
    }

    #[test]
    fn patch_restores_position() {
        let mut buf = IoBuffer::new(Cursor::new(Vec::new()));
        buf.write_u32(0).unwrap();
        buf.write_u32(7).unwrap();
        buf.patch_u32(0, 99).unwrap();
        assert_eq!(buf.position().unwrap(), 8);
        buf.seek_to(0).unwrap();
        assert_eq!(buf.read_u32().unwrap(), 99);
    }
}
