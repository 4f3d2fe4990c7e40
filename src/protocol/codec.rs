//! Field-level binary codec.
//!
//! Every payload on the wire is a concatenation of big-endian, two's-complement
//! integers of 8, 16 or 32 bits. Requests are built from an ordered list of
//! [`Field`]s; incoming payloads are read at fixed offsets through a
//! [`PayloadReader`], which turns any out-of-range read into
//! [`CodecError::DecodeTruncated`] instead of an out-of-bounds access.
use thiserror::Error;

use super::MessageKind;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("unknown message kind '{0}'")]
    UnknownMessageKind(String),

    #[error("truncated {kind} payload: need {needed} bytes at offset {offset}, have {len}")]
    DecodeTruncated {
        kind: MessageKind,
        offset: usize,
        needed: usize,
        len: usize,
    },

    #[error("value {value} does not fit in a {width}-bit {signedness} field")]
    ValueOutOfRange {
        value: i64,
        width: u8,
        signedness: &'static str,
    },

    #[error("{kind} cannot be built from a {found} request")]
    WrongRequest {
        kind: MessageKind,
        found: MessageKind,
    },
}

/// Width of an encoded integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Width {
    W8,
    W16,
    W32,
}

impl Width {
    pub fn bits(self) -> u8 {
        match self {
            Width::W8 => 8,
            Width::W16 => 16,
            Width::W32 => 32,
        }
    }

    pub fn bytes(self) -> usize {
        self.bits() as usize / 8
    }
}

/// A single `(value, width, signed)` triple of an outgoing payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub value: i64,
    pub width: Width,
    pub signed: bool,
}

impl Field {
    pub fn unsigned(value: impl Into<i64>, width: Width) -> Self {
        Self {
            value: value.into(),
            width,
            signed: false,
        }
    }

    pub fn signed(value: impl Into<i64>, width: Width) -> Self {
        Self {
            value: value.into(),
            width,
            signed: true,
        }
    }

    /// Zero filled reserved field.
    pub fn reserved(width: Width) -> Self {
        Self::unsigned(0, width)
    }

    fn range(&self) -> (i64, i64) {
        let bits = self.width.bits() as u32;
        if self.signed {
            (-(1_i64 << (bits - 1)), (1_i64 << (bits - 1)) - 1)
        } else {
            (0, (1_i64 << bits) - 1)
        }
    }

    fn write_into(&self, out: &mut Vec<u8>) -> Result<(), CodecError> {
        let (min, max) = self.range();
        if self.value < min || self.value > max {
            return Err(CodecError::ValueOutOfRange {
                value: self.value,
                width: self.width.bits(),
                signedness: if self.signed { "signed" } else { "unsigned" },
            });
        }

        // Two's complement of an in-range value is its low bytes.
        let bytes = self.value.to_be_bytes();
        out.extend_from_slice(&bytes[bytes.len() - self.width.bytes()..]);
        Ok(())
    }
}

/// Serializes fields in declaration order.
pub fn encode_fields(fields: &[Field]) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::with_capacity(fields.iter().map(|f| f.width.bytes()).sum());
    for field in fields {
        field.write_into(&mut out)?;
    }
    Ok(out)
}

/// Bounds-checked reader over a received payload.
#[derive(Debug, Clone, Copy)]
pub struct PayloadReader<'a> {
    kind: MessageKind,
    payload: &'a [u8],
}

impl<'a> PayloadReader<'a> {
    pub fn new(kind: MessageKind, payload: &'a [u8]) -> Self {
        Self { kind, payload }
    }

    fn slice<const N: usize>(&self, offset: usize) -> Result<[u8; N], CodecError> {
        self.payload
            .get(offset..offset + N)
            .and_then(|s| s.try_into().ok())
            .ok_or(CodecError::DecodeTruncated {
                kind: self.kind,
                offset,
                needed: N,
                len: self.payload.len(),
            })
    }

    pub fn u8(&self, offset: usize) -> Result<u8, CodecError> {
        Ok(u8::from_be_bytes(self.slice(offset)?))
    }

    pub fn u16(&self, offset: usize) -> Result<u16, CodecError> {
        Ok(u16::from_be_bytes(self.slice(offset)?))
    }

    pub fn i16(&self, offset: usize) -> Result<i16, CodecError> {
        Ok(i16::from_be_bytes(self.slice(offset)?))
    }

    pub fn u32(&self, offset: usize) -> Result<u32, CodecError> {
        Ok(u32::from_be_bytes(self.slice(offset)?))
    }

    pub fn i32(&self, offset: usize) -> Result<i32, CodecError> {
        Ok(i32::from_be_bytes(self.slice(offset)?))
    }

    /// Reads `len` raw bytes starting at `offset`.
    pub fn bytes(&self, offset: usize, len: usize) -> Result<&'a [u8], CodecError> {
        self.payload
            .get(offset..offset + len)
            .ok_or(CodecError::DecodeTruncated {
                kind: self.kind,
                offset,
                needed: len,
                len: self.payload.len(),
            })
    }

    /// Reads 4-byte signed samples from `offset` to the end of the payload.
    /// A trailing partial sample is a truncation.
    pub fn samples(&self, offset: usize) -> Result<Vec<i32>, CodecError> {
        let tail = self.bytes(offset, self.payload.len().saturating_sub(offset))?;
        if tail.len() % 4 != 0 {
            return Err(CodecError::DecodeTruncated {
                kind: self.kind,
                offset: offset + tail.len() / 4 * 4,
                needed: 4,
                len: self.payload.len(),
            });
        }

        Ok(tail
            .chunks_exact(4)
            .map(|c| i32::from_be_bytes([c[0], c[1], c[2], c[3]]))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_big_endian_twos_complement() {
        let bytes = encode_fields(&[
            Field::unsigned(6_u32, Width::W32),
            Field::signed(-2_i32, Width::W32),
            Field::unsigned(0x0102_u16, Width::W16),
            Field::signed(-1_i8, Width::W8),
        ])
        .unwrap();

        assert_eq!(
            bytes,
            vec![0, 0, 0, 6, 0xFF, 0xFF, 0xFF, 0xFE, 0x01, 0x02, 0xFF]
        );
    }

    #[test]
    #[should_panic(expected = "ValueOutOfRange")]
    fn rejects_values_wider_than_field() {
        encode_fields(&[Field::unsigned(256_u32, Width::W8)]).unwrap();
    }

    #[test]
    #[should_panic(expected = "ValueOutOfRange")]
    fn rejects_negative_unsigned() {
        encode_fields(&[Field::unsigned(-1_i32, Width::W16)]).unwrap();
    }

    #[test]
    fn reads_fixed_offsets() {
        let payload = [0x00, 0x2A, 0xFF, 0xFF, 0xFF, 0x9C, 0x80];
        let reader = PayloadReader::new(MessageKind::ScanInfo, &payload);

        assert_eq!(reader.u16(0).unwrap(), 42);
        assert_eq!(reader.i32(2).unwrap(), -100);
        assert_eq!(reader.u8(6).unwrap(), 0x80);
    }

    #[test]
    fn out_of_range_read_is_truncation() {
        let payload = [0x00, 0x01];
        let reader = PayloadReader::new(MessageKind::SetConfigConfirm, &payload);

        assert_eq!(
            reader.u32(0),
            Err(CodecError::DecodeTruncated {
                kind: MessageKind::SetConfigConfirm,
                offset: 0,
                needed: 4,
                len: 2
            })
        );
    }

    #[test]
    fn samples_run_to_payload_end() {
        let payload = [0, 0, 0, 1, 0xFF, 0xFF, 0xFF, 0xFF, 0, 0, 1, 0];
        let reader = PayloadReader::new(MessageKind::ScanInfo, &payload);

        assert_eq!(reader.samples(0).unwrap(), vec![1, -1, 256]);
        assert_eq!(reader.samples(12).unwrap(), Vec::<i32>::new());
        assert!(reader.samples(2).is_err());
    }
}
