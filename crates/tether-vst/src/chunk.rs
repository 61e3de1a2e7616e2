//! Big-endian chunk reader and writer.
//!
//! The writer supports reserving a `u32` length slot and patching it once the
//! data that follows is known. The reader never panics: every read returns
//! `None` once the input is exhausted.

use std::fmt::Write as _;

use byteorder::{BigEndian, ByteOrder, WriteBytesExt};

/// Growable big-endian output buffer.
#[derive(Debug, Default)]
pub struct ChunkWriter {
    data: Vec<u8>,
}

/// Position of a reserved `u32` slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot(usize);

impl ChunkWriter {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn write_u8(&mut self, value: u8) {
        self.data.push(value);
    }

    // Writing into a Vec cannot fail.
    pub fn write_u32(&mut self, value: u32) {
        let _ = self.data.write_u32::<BigEndian>(value);
    }

    pub fn write_i32(&mut self, value: i32) {
        let _ = self.data.write_i32::<BigEndian>(value);
    }

    pub fn write_u64(&mut self, value: u64) {
        let _ = self.data.write_u64::<BigEndian>(value);
    }

    pub fn write_i64(&mut self, value: i64) {
        let _ = self.data.write_i64::<BigEndian>(value);
    }

    pub fn write_f32(&mut self, value: f32) {
        let _ = self.data.write_f32::<BigEndian>(value);
    }

    pub fn write_f64(&mut self, value: f64) {
        let _ = self.data.write_f64::<BigEndian>(value);
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Write `s` followed by a NUL terminator.
    pub fn write_cstr(&mut self, s: &str) {
        self.data.extend_from_slice(s.as_bytes());
        self.data.push(0);
    }

    /// Reserve a `u32` to be patched later.
    pub fn reserve_u32(&mut self) -> Slot {
        let slot = Slot(self.data.len());
        self.write_u32(0);
        slot
    }

    /// Fill `slot` with the number of bytes written after it.
    pub fn patch_len(&mut self, slot: Slot) {
        let len = self.data.len() - slot.0 - 4;
        self.patch_u32(slot, len as u32);
    }

    pub fn patch_u32(&mut self, slot: Slot, value: u32) {
        BigEndian::write_u32(&mut self.data[slot.0..slot.0 + 4], value);
    }

    /// Drop everything written from `slot` on.
    pub fn rewind(&mut self, slot: Slot) {
        self.data.truncate(slot.0);
    }

    /// Raw buffer for payload encoders.
    pub fn buffer(&mut self) -> &mut Vec<u8> {
        &mut self.data
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }
}

/// Cursor over a big-endian input buffer.
#[derive(Debug, Clone)]
pub struct ChunkReader<'a> {
    data: &'a [u8],
    offset: usize,
}

/// A length-prefixed record: `[len:u32][name NUL][payload]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Record<'a> {
    pub name: &'a [u8],
    pub payload: &'a [u8],
}

impl<'a> ChunkReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.offset
    }

    /// Unread bytes.
    pub fn rest(&self) -> &'a [u8] {
        &self.data[self.offset..]
    }

    pub fn skip(&mut self, count: usize) -> Option<()> {
        self.read_bytes(count).map(|_| ())
    }

    pub fn read_u8(&mut self) -> Option<u8> {
        self.read_bytes(1).map(|b| b[0])
    }

    pub fn read_u32(&mut self) -> Option<u32> {
        self.read_bytes(4).map(BigEndian::read_u32)
    }

    pub fn read_bytes(&mut self, count: usize) -> Option<&'a [u8]> {
        let end = self.offset.checked_add(count)?;
        let bytes = self.data.get(self.offset..end)?;
        self.offset = end;
        Some(bytes)
    }

    /// Read a `u8`-length-prefixed string.
    pub fn read_pascal(&mut self) -> Option<&'a [u8]> {
        let len = usize::from(self.read_u8()?);
        self.read_bytes(len)
    }

    /// Read the next length-prefixed record.
    ///
    /// Returns `None` if the length runs past the end of the buffer or the
    /// name has no terminator. The cursor only moves on success.
    pub fn read_record(&mut self) -> Option<Record<'a>> {
        let mut cursor = self.clone();
        let len = cursor.read_u32()? as usize;
        let body = cursor.read_bytes(len)?;
        let nul = body.iter().position(|&b| b == 0)?;
        *self = cursor;
        Some(Record {
            name: &body[..nul],
            payload: &body[nul + 1..],
        })
    }
}

/// Split `data` at the first NUL. Without a terminator the whole slice is the
/// string and nothing remains.
pub fn split_cstr(data: &[u8]) -> (&[u8], &[u8]) {
    match data.iter().position(|&b| b == 0) {
        Some(nul) => (&data[..nul], &data[nul + 1..]),
        None => (data, &[]),
    }
}

/// Hex dump in 16-byte rows for trace logging.
pub fn hex_dump(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 4);
    for (row, bytes) in data.chunks(16).enumerate() {
        let _ = write!(out, "{:08x}: ", row * 16);
        for i in 0..16 {
            match bytes.get(i) {
                Some(b) => {
                    let _ = write!(out, "{b:02x} ");
                }
                None => out.push_str("   "),
            }
        }
        for &b in bytes {
            out.push(if b.is_ascii_graphic() || b == b' ' { b as char } else { '.' });
        }
        out.push('\n');
    }
    out
}
