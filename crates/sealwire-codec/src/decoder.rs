//! ASN.1 DER decoder over a byte slice.

use super::{Tag, Tlv};
use sealwire_types::CodecError;

/// A cursor-style ASN.1 DER decoder.
///
/// Definite lengths only; the streaming [`crate::ber`] module handles
/// indefinite-length BER.
pub struct Decoder<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    /// Create a new decoder over the given data.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Returns the remaining undecoded bytes.
    pub fn remaining(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    /// Returns true if all data has been consumed.
    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Parse the next TLV element.
    pub fn read_tlv(&mut self) -> Result<Tlv<'a>, CodecError> {
        let (tag, tag_len) = Tag::from_bytes(&self.data[self.pos..])?;
        self.pos += tag_len;

        let length = self.read_length()?;
        let end = self
            .pos
            .checked_add(length)
            .ok_or(CodecError::InvalidLength)?;
        if end > self.data.len() {
            return Err(CodecError::Truncated);
        }

        let value = &self.data[self.pos..end];
        self.pos = end;

        Ok(Tlv { tag, value })
    }

    /// Parse the next TLV element and return its complete encoding
    /// (identifier + length + contents) as a slice of the input.
    pub fn read_raw_tlv(&mut self) -> Result<(Tag, &'a [u8]), CodecError> {
        let start = self.pos;
        let tlv = self.read_tlv()?;
        Ok((tlv.tag, &self.data[start..self.pos]))
    }

    /// Parse a DER definite length.
    fn read_length(&mut self) -> Result<usize, CodecError> {
        if self.pos >= self.data.len() {
            return Err(CodecError::Truncated);
        }

        let first = self.data[self.pos];
        self.pos += 1;

        if first < 0x80 {
            Ok(first as usize)
        } else if first == 0x80 {
            // Indefinite length — not valid in DER
            Err(CodecError::IndefiniteLength)
        } else {
            let num_bytes = (first & 0x7F) as usize;
            if num_bytes > 4 || self.pos + num_bytes > self.data.len() {
                return Err(CodecError::InvalidLength);
            }
            let mut length: usize = 0;
            for i in 0..num_bytes {
                length = (length << 8) | self.data[self.pos + i] as usize;
            }
            self.pos += num_bytes;
            Ok(length)
        }
    }

    /// Read an INTEGER and return its bytes (big-endian, may include leading zero).
    pub fn read_integer(&mut self) -> Result<&'a [u8], CodecError> {
        let tlv = self.read_tlv()?;
        if !tlv.tag.is_universal(0x02) {
            return Err(CodecError::UnexpectedTag {
                expected: 0x02,
                got: tlv.tag.number as u8,
            });
        }
        Ok(tlv.value)
    }

    /// Read a small non-negative INTEGER as u32.
    pub fn read_integer_u32(&mut self) -> Result<u32, CodecError> {
        let bytes = self.read_integer()?;
        let mut value: u32 = 0;
        for &b in bytes {
            value = value.checked_shl(8).ok_or(CodecError::InvalidLength)? | b as u32;
        }
        Ok(value)
    }

    /// Read an OCTET STRING.
    pub fn read_octet_string(&mut self) -> Result<&'a [u8], CodecError> {
        let tlv = self.read_tlv()?;
        if !tlv.tag.is_universal(0x04) {
            return Err(CodecError::UnexpectedTag {
                expected: 0x04,
                got: tlv.tag.number as u8,
            });
        }
        Ok(tlv.value)
    }

    /// Read a BIT STRING and return (unused_bits, data).
    pub fn read_bit_string(&mut self) -> Result<(u8, &'a [u8]), CodecError> {
        let tlv = self.read_tlv()?;
        if !tlv.tag.is_universal(0x03) || tlv.value.is_empty() {
            return Err(CodecError::UnexpectedTag {
                expected: 0x03,
                got: tlv.tag.number as u8,
            });
        }
        Ok((tlv.value[0], &tlv.value[1..]))
    }

    /// Read an OID and return the raw value bytes.
    pub fn read_oid(&mut self) -> Result<&'a [u8], CodecError> {
        let tlv = self.read_tlv()?;
        if !tlv.tag.is_universal(0x06) {
            return Err(CodecError::UnexpectedTag {
                expected: 0x06,
                got: tlv.tag.number as u8,
            });
        }
        Ok(tlv.value)
    }

    /// Read a SEQUENCE, returning a sub-decoder over its contents.
    pub fn read_sequence(&mut self) -> Result<Decoder<'a>, CodecError> {
        let tlv = self.read_tlv()?;
        if !tlv.tag.is_universal(0x10) || !tlv.tag.constructed {
            return Err(CodecError::UnexpectedTag {
                expected: 0x30,
                got: tlv.tag.number as u8,
            });
        }
        Ok(Decoder::new(tlv.value))
    }

    /// Read a SET, returning a sub-decoder over its contents.
    pub fn read_set(&mut self) -> Result<Decoder<'a>, CodecError> {
        let tlv = self.read_tlv()?;
        if !tlv.tag.is_universal(0x11) || !tlv.tag.constructed {
            return Err(CodecError::UnexpectedTag {
                expected: 0x31,
                got: tlv.tag.number as u8,
            });
        }
        Ok(Decoder::new(tlv.value))
    }

    /// Peek at the next tag without consuming it.
    pub fn peek_tag(&self) -> Result<Tag, CodecError> {
        if self.pos >= self.data.len() {
            return Err(CodecError::Truncated);
        }
        let (tag, _) = Tag::from_bytes(&self.data[self.pos..])?;
        Ok(tag)
    }

    /// Read a context-specific tagged value with the expected tag number.
    pub fn read_context_specific(
        &mut self,
        tag_num: u32,
        constructed: bool,
    ) -> Result<Tlv<'a>, CodecError> {
        let tlv = self.read_tlv()?;
        if !tlv.tag.is_context(tag_num) || tlv.tag.constructed != constructed {
            return Err(CodecError::UnexpectedTag {
                expected: 0x80 | tag_num as u8,
                got: tlv.tag.number as u8,
            });
        }
        Ok(tlv)
    }

    /// Try to read a context-specific tagged value. Returns `None` if
    /// the next tag does not match, without consuming any bytes.
    pub fn try_read_context_specific(
        &mut self,
        tag_num: u32,
        constructed: bool,
    ) -> Result<Option<Tlv<'a>>, CodecError> {
        if self.is_empty() {
            return Ok(None);
        }
        let tag = self.peek_tag()?;
        if tag.is_context(tag_num) && tag.constructed == constructed {
            Ok(Some(self.read_tlv()?))
        } else {
            Ok(None)
        }
    }
}
