//! Typed, bounds-checked byte buffer I/O.
//!
//! Grounded on `original_source/src/network/util/writer.hpp`: a scratch buffer with
//! forward-referenced slots for header fields whose value isn't known until the body
//! has been written, plus finalizers that hand the caller an owned, possibly
//! LZ4-compressed buffer. Unlike the C++ original this never hands out raw pointers;
//! `finalize`/`lz4` always return an owned `Vec<u8>`.

use std::cell::Cell;

/// Growable little-endian byte writer with forward-reference slots.
#[derive(Default)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    pub fn with_capacity(cap: usize) -> Self {
        Self {
            buf: Vec::with_capacity(cap),
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn write_i8(&mut self, v: i8) {
        self.buf.push(v as u8);
    }

    pub fn write_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_i16(&mut self, v: i16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_i64(&mut self, v: i64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_f32(&mut self, v: f32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn fill(&mut self, value: u8, count: usize) {
        self.buf.resize(self.buf.len() + count, value);
    }

    /// Reserve `N` bytes, writing `init` now, and return the offset to patch later.
    pub fn reserve_u8(&mut self, init: u8) -> usize {
        let offset = self.buf.len();
        self.write_u8(init);
        offset
    }

    pub fn reserve_u32(&mut self, init: u32) -> usize {
        let offset = self.buf.len();
        self.write_u32(init);
        offset
    }

    pub fn reserve_u64(&mut self, init: u64) -> usize {
        let offset = self.buf.len();
        self.write_u64(init);
        offset
    }

    pub fn patch_u8(&mut self, offset: usize, value: u8) {
        self.buf[offset] = value;
    }

    pub fn patch_u32(&mut self, offset: usize, value: u32) {
        self.buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    pub fn patch_u64(&mut self, offset: usize, value: u64) {
        self.buf[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
    }

    /// Peek the buffer contents without consuming the writer.
    pub fn buffer(&self) -> &[u8] {
        &self.buf
    }

    /// Consume the writer, returning the raw (uncompressed) payload.
    pub fn finalize(self) -> Vec<u8> {
        self.buf
    }

    /// Consume the writer, returning an LZ4-compressed copy of the payload.
    pub fn lz4(self) -> Vec<u8> {
        lz4_flex::compress_prepend_size(&self.buf)
    }
}

/// Sequential little-endian byte reader over a borrowed slice.
///
/// Reads past the end never panic: they set an internal error flag and return a
/// zero value, a tolerant-parse style suited to untrusted wire input.
/// The error flag is checked once after a full record has been parsed.
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: Cell<usize>,
    error: Cell<bool>,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            pos: Cell::new(0),
            error: Cell::new(false),
        }
    }

    pub fn has_error(&self) -> bool {
        self.error.get()
    }

    pub fn eof(&self) -> bool {
        self.pos.get() >= self.buf.len()
    }

    pub fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos.get())
    }

    pub fn position(&self) -> usize {
        self.pos.get()
    }

    fn take(&self, n: usize) -> Option<&'a [u8]> {
        let start = self.pos.get();
        let end = start.checked_add(n)?;
        if end > self.buf.len() {
            self.error.set(true);
            return None;
        }
        self.pos.set(end);
        Some(&self.buf[start..end])
    }

    pub fn read_u8(&self) -> u8 {
        self.take(1).map(|b| b[0]).unwrap_or(0)
    }

    pub fn read_i8(&self) -> i8 {
        self.read_u8() as i8
    }

    pub fn read_u16(&self) -> u16 {
        self.take(2)
            .map(|b| u16::from_le_bytes([b[0], b[1]]))
            .unwrap_or(0)
    }

    pub fn read_i16(&self) -> i16 {
        self.read_u16() as i16
    }

    pub fn read_u32(&self) -> u32 {
        self.take(4)
            .map(|b| u32::from_le_bytes(b.try_into().unwrap()))
            .unwrap_or(0)
    }

    pub fn read_i32(&self) -> i32 {
        self.read_u32() as i32
    }

    pub fn read_u64(&self) -> u64 {
        self.take(8)
            .map(|b| u64::from_le_bytes(b.try_into().unwrap()))
            .unwrap_or(0)
    }

    pub fn read_i64(&self) -> i64 {
        self.read_u64() as i64
    }

    pub fn read_f32(&self) -> f32 {
        self.take(4)
            .map(|b| f32::from_le_bytes(b.try_into().unwrap()))
            .unwrap_or(0.0)
    }

    pub fn read_bytes(&self, n: usize) -> &'a [u8] {
        self.take(n).unwrap_or(&[])
    }

    pub fn skip(&self, n: usize) {
        let _ = self.take(n);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_scalars() {
        let mut w = Writer::new();
        w.write_u8(7);
        w.write_u16(1234);
        w.write_i64(-9001);
        w.write_f32(3.5);
        let buf = w.finalize();

        let r = Reader::new(&buf);
        assert_eq!(r.read_u8(), 7);
        assert_eq!(r.read_u16(), 1234);
        assert_eq!(r.read_i64(), -9001);
        assert_eq!(r.read_f32(), 3.5);
        assert!(!r.has_error());
        assert!(r.eof());
    }

    #[test]
    fn reserve_and_patch() {
        let mut w = Writer::new();
        let slot = w.reserve_u32(0);
        w.write_u8(1);
        w.write_u8(2);
        w.patch_u32(slot, 42);
        let buf = w.finalize();

        let r = Reader::new(&buf);
        assert_eq!(r.read_u32(), 42);
        assert_eq!(r.read_u8(), 1);
        assert_eq!(r.read_u8(), 2);
    }

    #[test]
    fn read_past_end_sets_error_without_panic() {
        let buf = [1u8, 2];
        let r = Reader::new(&buf);
        assert_eq!(r.read_u32(), 0);
        assert!(r.has_error());
    }

    #[test]
    fn lz4_round_trip() {
        let mut w = Writer::new();
        for i in 0..256u32 {
            w.write_u32(i);
        }
        let compressed = w.lz4();
        let decompressed = lz4_flex::decompress_size_prepended(&compressed).unwrap();
        let r = Reader::new(&decompressed);
        for i in 0..256u32 {
            assert_eq!(r.read_u32(), i);
        }
    }
}
