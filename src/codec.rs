//! Minimal deterministic wire codec for checkpoint records (component B).
//!
//! Not a general-purpose serialization format: just enough to encode fixed-layout fields with
//! stable byte layouts, plus explicit tolerance for unknown trailing bytes so a record written by
//! a newer `format_version` still decodes under an older build.

use crate::error::RecordError;

/// Append-only output buffer.
pub trait Encoder {
    fn write_buf(&mut self, bytes: &[u8]);
}

impl Encoder for Vec<u8> {
    fn write_buf(&mut self, bytes: &[u8]) {
        self.extend_from_slice(bytes);
    }
}

/// Cursor-based input buffer. `remaining` reports bytes not yet consumed, used by callers that
/// want to tolerate (and ignore) unknown trailing fields.
pub struct BufDecoder<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> BufDecoder<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn read_buf(&mut self, field: &'static str, len: usize) -> Result<&'a [u8], RecordError> {
        let end = self
            .pos
            .checked_add(len)
            .ok_or(RecordError::InvalidLength(field))?;
        let slice = self
            .buf
            .get(self.pos..end)
            .ok_or(RecordError::Truncated(field))?;
        self.pos = end;
        Ok(slice)
    }

    /// True once every declared field has been consumed; trailing bytes are fine and are simply
    /// not read by a decoder that doesn't know about them.
    pub fn has_remaining(&self) -> bool {
        self.pos < self.buf.len()
    }
}

/// A type that can be written to and read back from the wire format.
pub trait Codec: Sized {
    fn encode(&self, enc: &mut impl Encoder);
    fn decode(dec: &mut BufDecoder<'_>) -> Result<Self, RecordError>;
}

impl Codec for u8 {
    fn encode(&self, enc: &mut impl Encoder) {
        enc.write_buf(&[*self]);
    }

    fn decode(dec: &mut BufDecoder<'_>) -> Result<Self, RecordError> {
        Ok(dec.read_buf("u8", 1)?[0])
    }
}

impl Codec for u32 {
    fn encode(&self, enc: &mut impl Encoder) {
        enc.write_buf(&self.to_le_bytes());
    }

    fn decode(dec: &mut BufDecoder<'_>) -> Result<Self, RecordError> {
        let bytes = dec.read_buf("u32", 4)?;
        Ok(u32::from_le_bytes(bytes.try_into().unwrap()))
    }
}

impl Codec for u64 {
    fn encode(&self, enc: &mut impl Encoder) {
        enc.write_buf(&self.to_le_bytes());
    }

    fn decode(dec: &mut BufDecoder<'_>) -> Result<Self, RecordError> {
        let bytes = dec.read_buf("u64", 8)?;
        Ok(u64::from_le_bytes(bytes.try_into().unwrap()))
    }
}

impl Codec for [u8; 32] {
    fn encode(&self, enc: &mut impl Encoder) {
        enc.write_buf(self);
    }

    fn decode(dec: &mut BufDecoder<'_>) -> Result<Self, RecordError> {
        let bytes = dec.read_buf("[u8; 32]", 32)?;
        bytes
            .try_into()
            .map_err(|_| RecordError::InvalidFixedSize("[u8; 32]"))
    }
}

/// Length-prefixed repeated field of fixed-size codec elements.
pub fn encode_vec<T: Codec>(enc: &mut impl Encoder, items: &[T]) {
    (items.len() as u32).encode(enc);
    for item in items {
        item.encode(enc);
    }
}

pub fn decode_vec<T: Codec>(dec: &mut BufDecoder<'_>) -> Result<Vec<T>, RecordError> {
    let len = u32::decode(dec)? as usize;
    let mut out = Vec::with_capacity(len.min(1 << 20));
    for _ in 0..len {
        out.push(T::decode(dec)?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    proptest! {
        #[test]
        fn test_u64_roundtrip(v in any::<u64>()) {
            let mut buf = Vec::new();
            v.encode(&mut buf);
            let mut dec = BufDecoder::new(&buf);
            assert_eq!(u64::decode(&mut dec).unwrap(), v);
        }
    }

    #[test]
    fn test_trailing_bytes_are_tolerated() {
        let mut buf = Vec::new();
        42u64.encode(&mut buf);
        buf.extend_from_slice(&[1, 2, 3, 4]); // unknown field from a newer format_version

        let mut dec = BufDecoder::new(&buf);
        assert_eq!(u64::decode(&mut dec).unwrap(), 42);
        assert!(dec.has_remaining());
    }

    #[test]
    fn test_truncated_input_is_corrupt() {
        let buf = [0u8, 1, 2];
        let mut dec = BufDecoder::new(&buf);
        assert_eq!(u64::decode(&mut dec), Err(RecordError::Truncated("u64")));
    }
}
