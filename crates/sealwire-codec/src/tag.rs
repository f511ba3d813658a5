//! ASN.1 tag parsing and encoding.

use super::{Tag, TagClass};
use sealwire_types::CodecError;

impl Tag {
    /// Parse a tag from the first bytes of `input`.
    /// Returns the tag and number of bytes consumed.
    pub fn from_bytes(input: &[u8]) -> Result<(Self, usize), CodecError> {
        if input.is_empty() {
            return Err(CodecError::NullInput);
        }

        let first = input[0];
        let (tag, more) = Tag::from_first_byte(first)?;
        if !more {
            return Ok((tag, 1));
        }

        // Long form tag number
        let mut number: u32 = 0;
        let mut i = 1;
        loop {
            if i >= input.len() {
                return Err(CodecError::Truncated);
            }
            let byte = input[i];
            number = number.checked_shl(7).ok_or(CodecError::InvalidTag)? | (byte & 0x7F) as u32;
            i += 1;
            if (byte & 0x80) == 0 {
                break;
            }
        }
        Ok((Tag { number, ..tag }, i))
    }

    /// Decode the leading identifier octet. Returns the tag (number filled
    /// in for short form) and whether long-form continuation octets follow.
    pub(crate) fn from_first_byte(first: u8) -> Result<(Self, bool), CodecError> {
        let class = match (first >> 6) & 0x03 {
            0 => TagClass::Universal,
            1 => TagClass::Application,
            2 => TagClass::ContextSpecific,
            _ => TagClass::Private,
        };
        let constructed = (first & 0x20) != 0;
        let low_bits = first & 0x1F;
        Ok((
            Tag {
                class,
                constructed,
                number: low_bits as u32,
            },
            low_bits == 0x1F,
        ))
    }

    /// Encode this tag to bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let class_bits = match self.class {
            TagClass::Universal => 0x00,
            TagClass::Application => 0x40,
            TagClass::ContextSpecific => 0x80,
            TagClass::Private => 0xC0,
        };
        let constructed_bit = if self.constructed { 0x20 } else { 0x00 };

        if self.number < 0x1F {
            vec![class_bits | constructed_bit | (self.number as u8)]
        } else {
            let mut result = vec![class_bits | constructed_bit | 0x1F];
            let mut num = self.number;
            let mut bytes = Vec::new();
            while num > 0 {
                bytes.push((num & 0x7F) as u8);
                num >>= 7;
            }
            bytes.reverse();
            for (i, b) in bytes.iter().enumerate() {
                if i < bytes.len() - 1 {
                    result.push(b | 0x80);
                } else {
                    result.push(*b);
                }
            }
            result
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_sequence_tag() {
        let (tag, len) = Tag::from_bytes(&[0x30]).unwrap();
        assert_eq!(tag.class, TagClass::Universal);
        assert!(tag.constructed);
        assert_eq!(tag.number, 0x10);
        assert_eq!(len, 1);
    }

    #[test]
    fn parse_context_tag() {
        let (tag, len) = Tag::from_bytes(&[0xA2]).unwrap();
        assert!(tag.is_context(2));
        assert!(tag.constructed);
        assert_eq!(len, 1);
    }

    #[test]
    fn roundtrip_long_form() {
        let tag = Tag {
            class: TagClass::ContextSpecific,
            constructed: true,
            number: 73,
        };
        let bytes = tag.to_bytes();
        let (parsed, consumed) = Tag::from_bytes(&bytes).unwrap();
        assert_eq!(tag, parsed);
        assert_eq!(consumed, bytes.len());
    }
}
