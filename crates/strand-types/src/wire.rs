//! Little-endian wire codec for the hand-specified binary formats.
//!
//! Every persisted layout in strand (canonical object payloads, refcount
//! records, snapshot and remote-branch state files) is built from the same
//! few primitives: fixed-width little-endian integers, fixed-size byte
//! arrays, and `u32`-length-prefixed byte strings. [`WireWriter`] and
//! [`WireReader`] implement exactly those and nothing more.

use crate::error::TypeError;

/// Appends wire primitives to an owned byte buffer.
#[derive(Debug, Default)]
pub struct WireWriter {
    buf: Vec<u8>,
}

impl WireWriter {
    /// Create an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume the writer and return the encoded bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    /// Number of bytes written so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Returns `true` if nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn put_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn put_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    /// Write raw bytes with no length prefix (fixed-size fields).
    pub fn put_raw(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Write a `u32` length prefix followed by the bytes.
    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.put_u32(bytes.len() as u32);
        self.put_raw(bytes);
    }
}

/// Reads wire primitives from a byte slice, tracking its offset.
#[derive(Debug)]
pub struct WireReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    /// Start reading at the beginning of `buf`.
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Number of bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Fails with [`TypeError::TrailingBytes`] unless the input was fully
    /// consumed. Call after decoding a complete value.
    pub fn finish(self) -> Result<(), TypeError> {
        if self.remaining() == 0 {
            Ok(())
        } else {
            Err(TypeError::TrailingBytes(self.remaining()))
        }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], TypeError> {
        if self.remaining() < n {
            return Err(TypeError::Truncated {
                offset: self.pos,
                needed: n - self.remaining(),
            });
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    pub fn get_u8(&mut self) -> Result<u8, TypeError> {
        Ok(self.take(1)?[0])
    }

    pub fn get_u32(&mut self) -> Result<u32, TypeError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes(b.try_into().expect("4-byte slice")))
    }

    pub fn get_u64(&mut self) -> Result<u64, TypeError> {
        let b = self.take(8)?;
        Ok(u64::from_le_bytes(b.try_into().expect("8-byte slice")))
    }

    /// Read exactly `N` bytes into an array (fixed-size fields).
    pub fn get_array<const N: usize>(&mut self) -> Result<[u8; N], TypeError> {
        let b = self.take(N)?;
        Ok(b.try_into().expect("sized slice"))
    }

    /// Read a `u32` length prefix followed by that many bytes.
    pub fn get_bytes(&mut self) -> Result<&'a [u8], TypeError> {
        let len = self.get_u32()? as usize;
        self.take(len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_primitives() {
        let mut w = WireWriter::new();
        w.put_u8(7);
        w.put_u32(0xdead_beef);
        w.put_u64(u64::MAX - 1);
        w.put_bytes(b"hello");
        w.put_raw(&[1, 2, 3]);

        let bytes = w.into_bytes();
        let mut r = WireReader::new(&bytes);
        assert_eq!(r.get_u8().unwrap(), 7);
        assert_eq!(r.get_u32().unwrap(), 0xdead_beef);
        assert_eq!(r.get_u64().unwrap(), u64::MAX - 1);
        assert_eq!(r.get_bytes().unwrap(), b"hello");
        assert_eq!(r.get_array::<3>().unwrap(), [1, 2, 3]);
        r.finish().unwrap();
    }

    #[test]
    fn integers_are_little_endian() {
        let mut w = WireWriter::new();
        w.put_u32(1);
        assert_eq!(w.into_bytes(), vec![1, 0, 0, 0]);
    }

    #[test]
    fn truncated_input_is_an_error() {
        let mut r = WireReader::new(&[1, 2]);
        let err = r.get_u32().unwrap_err();
        assert_eq!(err, TypeError::Truncated { offset: 0, needed: 2 });
    }

    #[test]
    fn length_prefix_overrun_is_truncated() {
        let mut w = WireWriter::new();
        w.put_u32(10); // claims 10 bytes follow
        w.put_raw(b"abc");
        let bytes = w.into_bytes();
        let mut r = WireReader::new(&bytes);
        assert!(matches!(r.get_bytes(), Err(TypeError::Truncated { .. })));
    }

    #[test]
    fn finish_rejects_leftovers() {
        let r = WireReader::new(&[0]);
        assert_eq!(r.finish().unwrap_err(), TypeError::TrailingBytes(1));
    }
}
