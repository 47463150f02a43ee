use bytes::{Buf, BufMut};

use crate::error::CodecError;

/// Width of the big-endian length prefix in front of every string.
pub const STRING_LEN_PREFIX: usize = 4;
/// Width of an encoded `u32` scalar.
pub const U32_LEN: usize = 4;
/// Width of an encoded IEEE-754 double.
pub const F64_LEN: usize = 8;

fn ensure(field: &'static str, needed: usize, buf: &[u8]) -> Result<(), CodecError> {
    if buf.len() < needed {
        return Err(CodecError::Truncated {
            field,
            needed,
            remaining: buf.len(),
        });
    }
    Ok(())
}

/// Appends a 4-byte big-endian length followed by the raw UTF-8 bytes.
pub fn encode_string(buf: &mut impl BufMut, s: &str) {
    buf.put_u32(s.len() as u32);
    buf.put_slice(s.as_bytes());
}

/// Decodes one length-prefixed string, returning it with the bytes consumed.
pub fn decode_string(buf: &[u8]) -> Result<(String, usize), CodecError> {
    ensure("string length", STRING_LEN_PREFIX, buf)?;
    let mut cursor = buf;
    let len = cursor.get_u32() as usize;
    ensure("string data", len, cursor)?;
    let text = std::str::from_utf8(&cursor[..len]).map_err(|_| CodecError::InvalidUtf8)?;
    Ok((text.to_owned(), STRING_LEN_PREFIX + len))
}

pub fn encode_u32(buf: &mut impl BufMut, value: u32) {
    buf.put_u32(value);
}

pub fn decode_u32(buf: &[u8]) -> Result<(u32, usize), CodecError> {
    ensure("uint32", U32_LEN, buf)?;
    let mut cursor = buf;
    Ok((cursor.get_u32(), U32_LEN))
}

pub fn encode_f64(buf: &mut impl BufMut, value: f64) {
    buf.put_f64(value);
}

pub fn decode_f64(buf: &[u8]) -> Result<(f64, usize), CodecError> {
    ensure("float64", F64_LEN, buf)?;
    let mut cursor = buf;
    Ok((cursor.get_f64(), F64_LEN))
}

pub fn encode_u8(buf: &mut impl BufMut, value: u8) {
    buf.put_u8(value);
}

pub fn decode_u8(buf: &[u8]) -> Result<(u8, usize), CodecError> {
    ensure("byte", 1, buf)?;
    Ok((buf[0], 1))
}

/// Sequential reader over a positional field stream.
///
/// Each read advances past the decoded field; a failed read leaves the
/// position unchanged.
#[derive(Debug, Clone)]
pub struct FieldReader<'a> {
    buf: &'a [u8],
    offset: usize,
}

impl<'a> FieldReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, offset: 0 }
    }

    fn rest(&self) -> &'a [u8] {
        &self.buf[self.offset..]
    }

    fn advance<T>(&mut self, decoded: (T, usize)) -> T {
        self.offset += decoded.1;
        decoded.0
    }

    pub fn read_string(&mut self) -> Result<String, CodecError> {
        let decoded = decode_string(self.rest())?;
        Ok(self.advance(decoded))
    }

    pub fn read_u32(&mut self) -> Result<u32, CodecError> {
        let decoded = decode_u32(self.rest())?;
        Ok(self.advance(decoded))
    }

    pub fn read_f64(&mut self) -> Result<f64, CodecError> {
        let decoded = decode_f64(self.rest())?;
        Ok(self.advance(decoded))
    }

    pub fn read_u8(&mut self) -> Result<u8, CodecError> {
        let decoded = decode_u8(self.rest())?;
        Ok(self.advance(decoded))
    }

    /// Bytes consumed so far.
    pub fn consumed(&self) -> usize {
        self.offset
    }

    /// Bytes left after the last successful read.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.offset
    }
}
