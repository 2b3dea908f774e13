//! Little-endian byte stream primitives shared by the header and field codecs.

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};

use crate::error::FieldError;

/// A cursor over an in-memory byte buffer that fails loudly instead of panicking
/// when asked to read past the end.
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    /// Start reading from the beginning of `data`.
    pub fn new(data: &'a [u8]) -> Self {
        ByteReader { data, pos: 0 }
    }

    /// Number of bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn take(&mut self, n: usize, context: &'static str) -> Result<&'a [u8], FieldError> {
        if self.remaining() < n {
            return Err(FieldError::PrematureEnd { context });
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    /// Read a single byte.
    pub fn read_u8(&mut self) -> Result<u8, FieldError> {
        Ok(self.take(1, "u8")?[0])
    }

    /// Read a little-endian u16.
    pub fn read_u16(&mut self) -> Result<u16, FieldError> {
        Ok(LittleEndian::read_u16(self.take(2, "u16")?))
    }

    /// Read a little-endian u32.
    pub fn read_u32(&mut self) -> Result<u32, FieldError> {
        Ok(LittleEndian::read_u32(self.take(4, "u32")?))
    }

    /// Read a little-endian u64.
    pub fn read_u64(&mut self) -> Result<u64, FieldError> {
        Ok(LittleEndian::read_u64(self.take(8, "u64")?))
    }

    /// Read a little-endian i32.
    pub fn read_i32(&mut self) -> Result<i32, FieldError> {
        Ok(LittleEndian::read_i32(self.take(4, "i32")?))
    }

    /// Read exactly `n` raw bytes.
    pub fn read_blob(&mut self, n: usize) -> Result<&'a [u8], FieldError> {
        self.take(n, "blob")
    }

    /// Read `n` bytes, strip one trailing NUL if present, and decode as UTF-8.
    pub fn read_cstring(&mut self, n: usize, field_name: &'static str) -> Result<String, FieldError> {
        let raw = self.take(n, field_name)?;
        let trimmed = match raw.split_last() {
            Some((0, rest)) => rest,
            _ => raw,
        };
        std::str::from_utf8(trimmed)
            .map(|s| s.to_owned())
            .map_err(|_| FieldError::BadUtf8 { field_name })
    }

    /// Read the 5-byte packed KDB timestamp format.
    pub fn read_timestamp(&mut self, field_name: &'static str) -> Result<NaiveDateTime, FieldError> {
        let raw = self.take(5, field_name)?;
        Ok(unpack_timestamp(raw))
    }
}

/// A growable little-endian byte buffer writer.
#[derive(Default)]
pub struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    /// Start with an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume the writer, returning the accumulated bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    /// Number of bytes written so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// True if nothing has been written yet.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Write a single byte.
    pub fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    /// Write a little-endian u16. Infallible: writing to a `Vec` cannot fail.
    pub fn write_u16(&mut self, v: u16) {
        #[allow(clippy::unwrap_used)]
        self.buf.write_u16::<LittleEndian>(v).unwrap();
    }

    /// Write a little-endian u32.
    pub fn write_u32(&mut self, v: u32) {
        #[allow(clippy::unwrap_used)]
        self.buf.write_u32::<LittleEndian>(v).unwrap();
    }

    /// Write a little-endian i32.
    pub fn write_i32(&mut self, v: i32) {
        #[allow(clippy::unwrap_used)]
        self.buf.write_i32::<LittleEndian>(v).unwrap();
    }

    /// Write raw bytes verbatim.
    pub fn write_blob(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Write a UTF-8 string followed by a single trailing NUL.
    pub fn write_cstring(&mut self, s: &str) {
        self.buf.extend_from_slice(s.as_bytes());
        self.buf.push(0);
    }

    /// Write the 5-byte packed KDB timestamp format.
    pub fn write_timestamp(&mut self, ts: &NaiveDateTime) {
        self.buf.extend_from_slice(&pack_timestamp(ts));
    }
}

/// The sentinel value KeePass 1 uses to mean "never expires".
pub fn never_expires() -> NaiveDateTime {
    #[allow(clippy::unwrap_used)]
    NaiveDate::from_ymd_opt(2999, 12, 28)
        .unwrap()
        .and_hms_opt(23, 59, 59)
        .unwrap()
}

/// Pack a timestamp into the 5-byte year:14 month:4 day:5 hour:5 minute:6 second:6 layout.
pub fn pack_timestamp(ts: &NaiveDateTime) -> [u8; 5] {
    let year = ts.year() as u32;
    let month = ts.month();
    let day = ts.day();
    let hour = ts.hour();
    let minute = ts.minute();
    let second = ts.second();

    let packed: u64 = ((year as u64) << 26)
        | ((month as u64) << 22)
        | ((day as u64) << 17)
        | ((hour as u64) << 12)
        | ((minute as u64) << 6)
        | (second as u64);

    // the format is big-endian-ish within its 40 bits; lay out byte by byte
    // to avoid depending on platform endianness of the shifted u64.
    let b = packed.to_be_bytes();
    [b[3], b[4], b[5], b[6], b[7]]
}

/// Unpack the 5-byte packed timestamp format back into a `NaiveDateTime`.
///
/// Falls back to [`never_expires`] if the packed fields do not form a valid
/// calendar date (the reference writer only ever emits the documented
/// sentinel for "never", but tolerate any clearly-invalid value the same way).
pub fn unpack_timestamp(raw: &[u8]) -> NaiveDateTime {
    let mut buf = [0u8; 8];
    buf[3] = raw[0];
    buf[4] = raw[1];
    buf[5] = raw[2];
    buf[6] = raw[3];
    buf[7] = raw[4];
    let packed = u64::from_be_bytes(buf);

    let second = (packed & 0x3f) as u32;
    let minute = ((packed >> 6) & 0x3f) as u32;
    let hour = ((packed >> 12) & 0x1f) as u32;
    let day = ((packed >> 17) & 0x1f) as u32;
    let month = ((packed >> 22) & 0x0f) as u32;
    let year = ((packed >> 26) & 0x3fff) as i32;

    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|d| d.and_hms_opt(hour, minute, second))
        .unwrap_or_else(never_expires)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn read_primitives_round_trip() {
        let mut w = ByteWriter::new();
        w.write_u16(0x1234);
        w.write_u32(0xdead_beef);
        w.write_i32(-5);
        w.write_blob(b"hi");
        let bytes = w.into_bytes();

        let mut r = ByteReader::new(&bytes);
        assert_eq!(r.read_u16().unwrap(), 0x1234);
        assert_eq!(r.read_u32().unwrap(), 0xdead_beef);
        assert_eq!(r.read_i32().unwrap(), -5);
        assert_eq!(r.read_blob(2).unwrap(), b"hi");
    }

    #[test]
    fn premature_end_is_reported() {
        let mut r = ByteReader::new(&[0x01]);
        assert!(matches!(r.read_u32(), Err(FieldError::PrematureEnd { .. })));
    }

    #[test]
    fn cstring_strips_single_trailing_nul() {
        let mut w = ByteWriter::new();
        w.write_cstring("hello");
        let bytes = w.into_bytes();
        assert_eq!(bytes, b"hello\0");

        let mut r = ByteReader::new(&bytes);
        assert_eq!(r.read_cstring(bytes.len(), "test").unwrap(), "hello");
    }

    #[test]
    fn invalid_utf8_is_corrupted_field() {
        let mut r = ByteReader::new(&[0xff, 0xfe, 0]);
        assert!(matches!(
            r.read_cstring(3, "test"),
            Err(FieldError::BadUtf8 { field_name: "test" })
        ));
    }

    #[test]
    fn timestamp_round_trips() {
        let ts = NaiveDate::from_ymd_opt(2023, 6, 15).unwrap().and_hms_opt(13, 45, 9).unwrap();
        let packed = pack_timestamp(&ts);
        assert_eq!(unpack_timestamp(&packed), ts);
    }

    #[test]
    fn never_expires_round_trips() {
        let ts = never_expires();
        let packed = pack_timestamp(&ts);
        assert_eq!(unpack_timestamp(&packed), ts);
    }
}
