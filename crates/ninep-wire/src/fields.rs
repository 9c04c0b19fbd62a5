// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Typed little-endian field primitives for 9P frames.
// Author: Lukas Bower

//! Field-level encode/decode helpers. Each method corresponds to one of the
//! protocol letter codes: `b`, `h`, `w`, `d`, `s`, `Q` and `B`.

use std::str;

use crate::types::{CodecError, Qid, QidType};

/// Append-only encoder for 9P fields.
#[derive(Debug, Default, Clone)]
pub struct WireWriter {
    buf: Vec<u8>,
}

impl WireWriter {
    /// Create an empty writer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty writer with room for `capacity` bytes.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    /// `b`: one byte.
    pub fn put_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    /// `h`: little-endian u16.
    pub fn put_u16(&mut self, value: u16) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// `w`: little-endian u32.
    pub fn put_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// `d`: little-endian u64.
    pub fn put_u64(&mut self, value: u64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// `s`: u16 length followed by UTF-8 bytes.
    pub fn put_str(&mut self, value: &str) -> Result<(), CodecError> {
        let len: u16 = value
            .len()
            .try_into()
            .map_err(|_| CodecError::TooLong(value.len()))?;
        self.put_u16(len);
        self.buf.extend_from_slice(value.as_bytes());
        Ok(())
    }

    /// `Q`: qid type, version and path.
    pub fn put_qid(&mut self, qid: &Qid) {
        self.put_u8(qid.ty().into());
        self.put_u32(qid.version());
        self.put_u64(qid.path());
    }

    /// `B`: u32 length followed by raw bytes.
    pub fn put_blob(&mut self, data: &[u8]) -> Result<(), CodecError> {
        let len: u32 = data
            .len()
            .try_into()
            .map_err(|_| CodecError::TooLong(data.len()))?;
        self.put_u32(len);
        self.buf.extend_from_slice(data);
        Ok(())
    }

    /// Raw bytes without a length prefix.
    pub fn put_bytes(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Overwrite a u32 previously written at `offset`.
    pub(crate) fn patch_u32(&mut self, offset: usize, value: u32) {
        self.buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    /// Number of bytes written so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether nothing has been written yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Consume the writer and return the encoded bytes.
    #[must_use]
    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

/// Cursor-style decoder for 9P fields.
#[derive(Debug, Clone)]
pub struct WireReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    /// Start reading at the beginning of `buf`.
    #[must_use]
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], CodecError> {
        let end = self.pos.checked_add(len).ok_or(CodecError::Truncated)?;
        if end > self.buf.len() {
            return Err(CodecError::Truncated);
        }
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    /// `b`.
    pub fn read_u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.take_array::<1>()?[0])
    }

    /// `h`.
    pub fn read_u16(&mut self) -> Result<u16, CodecError> {
        Ok(u16::from_le_bytes(self.take_array()?))
    }

    /// `w`.
    pub fn read_u32(&mut self) -> Result<u32, CodecError> {
        Ok(u32::from_le_bytes(self.take_array()?))
    }

    /// `d`.
    pub fn read_u64(&mut self) -> Result<u64, CodecError> {
        Ok(u64::from_le_bytes(self.take_array()?))
    }

    /// `s`.
    pub fn read_str(&mut self) -> Result<String, CodecError> {
        let len = self.read_u16()? as usize;
        let bytes = self.take(len)?;
        let text = str::from_utf8(bytes).map_err(|_| CodecError::InvalidUtf8)?;
        Ok(text.to_owned())
    }

    /// `Q`.
    pub fn read_qid(&mut self) -> Result<Qid, CodecError> {
        let ty = QidType::from_raw(self.read_u8()?);
        let version = self.read_u32()?;
        let path = self.read_u64()?;
        Ok(Qid::new(ty, version, path))
    }

    /// `B`.
    pub fn read_blob(&mut self) -> Result<Vec<u8>, CodecError> {
        let len = self.read_u32()? as usize;
        Ok(self.take(len)?.to_vec())
    }

    /// Raw bytes without a length prefix.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], CodecError> {
        self.take(len)
    }

    /// Bytes left after the cursor.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fields_are_little_endian() {
        let mut writer = WireWriter::new();
        writer.put_u16(0x0102);
        writer.put_u32(0x0304_0506);
        assert_eq!(writer.into_inner(), vec![0x02, 0x01, 0x06, 0x05, 0x04, 0x03]);
    }

    #[test]
    fn short_buffer_reports_truncation() {
        let mut reader = WireReader::new(&[0x05, 0x00, b'a']);
        assert_eq!(reader.read_str(), Err(CodecError::Truncated));
    }

    #[test]
    fn invalid_utf8_is_rejected() {
        let mut reader = WireReader::new(&[0x02, 0x00, 0xfe, 0xff]);
        assert_eq!(reader.read_str(), Err(CodecError::InvalidUtf8));
    }

    #[test]
    fn oversized_string_is_rejected() {
        let mut writer = WireWriter::new();
        let long = "x".repeat(usize::from(u16::MAX) + 1);
        assert_eq!(writer.put_str(&long), Err(CodecError::TooLong(long.len())));
        assert!(writer.is_empty());
    }

    #[test]
    fn qid_occupies_thirteen_bytes() {
        let mut writer = WireWriter::new();
        writer.put_qid(&Qid::new(QidType::DIRECTORY, 7, 42));
        let bytes = writer.into_inner();
        assert_eq!(bytes.len(), crate::QID_LEN);
        let qid = WireReader::new(&bytes).read_qid().expect("qid");
        assert!(qid.ty().is_directory());
        assert_eq!(qid.path(), 42);
    }
}
