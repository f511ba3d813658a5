//! Streaming BER reading and writing.
//!
//! The slice-based [`Decoder`](crate::Decoder) handles definite-length DER.
//! CMS streaming needs more: indefinite lengths written before the content
//! size is known, end-of-contents octets, and chunked constructed OCTET
//! STRINGs pulled incrementally from a [`Read`] source. That lives here.

use std::io::{Read, Write};

use sealwire_types::CodecError;

use crate::{encoder::write_der_length, Tag};

/// Maximum nesting depth accepted when buffering an element.
const MAX_DEPTH: usize = 32;

/// A BER element length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Length {
    Definite(usize),
    Indefinite,
}

/// Encode a definite-length TLV with an arbitrary (possibly multi-byte) tag.
pub fn encode_tlv(tag: Tag, value: &[u8]) -> Vec<u8> {
    let mut out = tag.to_bytes();
    write_der_length(&mut out, value.len());
    out.extend_from_slice(value);
    out
}

// ── Reader ───────────────────────────────────────────────────────────

/// An incremental BER reader over any byte source.
///
/// Single-owner, single-pass: the underlying source is consumed as
/// structural elements are pulled.
pub struct BerReader<R: Read> {
    r: R,
    peeked: Option<u8>,
    pos: u64,
}

impl<R: Read> BerReader<R> {
    pub fn new(r: R) -> Self {
        Self {
            r,
            peeked: None,
            pos: 0,
        }
    }

    /// Number of source bytes consumed so far.
    pub fn position(&self) -> u64 {
        self.pos
    }

    fn next_byte(&mut self) -> Result<u8, CodecError> {
        if let Some(b) = self.peeked.take() {
            self.pos += 1;
            return Ok(b);
        }
        let mut buf = [0u8; 1];
        let mut n = self.r.read(&mut buf)?;
        while n == 0 {
            // Distinguish a zero-byte read from EOF by retrying once.
            n = self.r.read(&mut buf)?;
            if n == 0 {
                return Err(CodecError::Truncated);
            }
        }
        self.pos += 1;
        Ok(buf[0])
    }

    fn peek_byte(&mut self) -> Result<u8, CodecError> {
        if let Some(b) = self.peeked {
            return Ok(b);
        }
        let b = self.next_byte()?;
        // next_byte advanced pos; un-consume.
        self.pos -= 1;
        self.peeked = Some(b);
        Ok(b)
    }

    /// Read exactly `buf.len()` bytes.
    pub fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), CodecError> {
        let mut start = 0;
        if let Some(b) = self.peeked.take() {
            if buf.is_empty() {
                self.peeked = Some(b);
                return Ok(());
            }
            buf[0] = b;
            start = 1;
            self.pos += 1;
        }
        self.r
            .read_exact(&mut buf[start..])
            .map_err(|_| CodecError::Truncated)?;
        self.pos += (buf.len() - start) as u64;
        Ok(())
    }

    /// Read up to `buf.len()` bytes, returning the count (0 only for an
    /// empty buffer).
    pub fn read_some(&mut self, buf: &mut [u8]) -> Result<usize, CodecError> {
        if buf.is_empty() {
            return Ok(0);
        }
        if let Some(b) = self.peeked.take() {
            buf[0] = b;
            self.pos += 1;
            return Ok(1);
        }
        let mut n = self.r.read(buf)?;
        if n == 0 {
            n = self.r.read(buf)?;
            if n == 0 {
                return Err(CodecError::Truncated);
            }
        }
        self.pos += n as u64;
        Ok(n)
    }

    /// Read a tag + length header.
    pub fn read_header(&mut self) -> Result<(Tag, Length), CodecError> {
        let first = self.next_byte()?;
        let (mut tag, long_form) = Tag::from_first_byte(first)?;
        if long_form {
            let mut number: u32 = 0;
            loop {
                let byte = self.next_byte()?;
                number =
                    number.checked_shl(7).ok_or(CodecError::InvalidTag)? | (byte & 0x7F) as u32;
                if (byte & 0x80) == 0 {
                    break;
                }
            }
            tag.number = number;
        }
        let length = self.read_length()?;
        Ok((tag, length))
    }

    fn read_length(&mut self) -> Result<Length, CodecError> {
        let first = self.next_byte()?;
        if first < 0x80 {
            Ok(Length::Definite(first as usize))
        } else if first == 0x80 {
            Ok(Length::Indefinite)
        } else {
            let num_bytes = (first & 0x7F) as usize;
            if num_bytes > 4 {
                return Err(CodecError::InvalidLength);
            }
            let mut length: usize = 0;
            for _ in 0..num_bytes {
                length = (length << 8) | self.next_byte()? as usize;
            }
            Ok(Length::Definite(length))
        }
    }

    /// True when the next two octets are end-of-contents (peeks one byte;
    /// a leading 0x00 can only be EOC in BER element position).
    pub fn at_eoc(&mut self) -> Result<bool, CodecError> {
        Ok(self.peek_byte()? == 0x00)
    }

    /// Consume the 0x00 0x00 end-of-contents octets.
    pub fn read_eoc(&mut self) -> Result<(), CodecError> {
        if self.next_byte()? != 0x00 || self.next_byte()? != 0x00 {
            return Err(CodecError::MissingEoc);
        }
        Ok(())
    }

    /// Buffer the next complete element, converting any indefinite-length
    /// framing to definite DER. Returns the tag and the contents octets.
    pub fn read_tlv(&mut self) -> Result<(Tag, Vec<u8>), CodecError> {
        self.read_tlv_depth(0)
    }

    fn read_tlv_depth(&mut self, depth: usize) -> Result<(Tag, Vec<u8>), CodecError> {
        if depth > MAX_DEPTH {
            return Err(CodecError::NestingTooDeep);
        }
        let (tag, length) = self.read_header()?;
        match length {
            Length::Definite(n) => {
                let mut value = vec![0u8; n];
                self.read_exact(&mut value)?;
                Ok((tag, value))
            }
            Length::Indefinite => {
                if !tag.constructed {
                    return Err(CodecError::InvalidLength);
                }
                let mut value = Vec::new();
                loop {
                    if self.at_eoc()? {
                        self.read_eoc()?;
                        break;
                    }
                    let (child_tag, child_value) = self.read_tlv_depth(depth + 1)?;
                    value.extend_from_slice(&encode_tlv(child_tag, &child_value));
                }
                Ok((tag, value))
            }
        }
    }

    /// Buffer the next complete element and return its full definite-length
    /// encoding (identifier + length + contents).
    pub fn read_raw_tlv(&mut self) -> Result<(Tag, Vec<u8>), CodecError> {
        let (tag, value) = self.read_tlv()?;
        Ok((tag, encode_tlv(tag, &value)))
    }
}

// ── Content reader ───────────────────────────────────────────────────

enum OcState {
    /// Primitive encoding: one run of content bytes.
    Primitive { remaining: usize },
    /// Constructed encoding: primitive OCTET STRING chunks until the outer
    /// extent (definite byte count or EOC) is exhausted.
    Constructed {
        outer: Length,
        outer_consumed: usize,
        start_pos: u64,
        chunk_remaining: usize,
    },
    Done,
}

/// The resumable position within a (possibly chunked) OCTET STRING node.
///
/// Holds only the traversal state, not the reader, so a parser that owns
/// its [`BerReader`] can interleave content pulls with other structural
/// reads. Accepts all three wire shapes: primitive definite, constructed
/// definite, and constructed indefinite (chunks terminated by
/// end-of-contents).
pub struct OctetCursor {
    state: OcState,
}

impl OctetCursor {
    /// Start at a node whose header (tag + length) has already been
    /// consumed; `start_pos` is the reader position just after that header.
    pub fn new(tag: Tag, length: Length, start_pos: u64) -> Result<Self, CodecError> {
        let state = if tag.constructed {
            OcState::Constructed {
                outer: length,
                outer_consumed: 0,
                start_pos,
                chunk_remaining: 0,
            }
        } else {
            match length {
                Length::Definite(n) => OcState::Primitive { remaining: n },
                // A primitive element cannot be indefinite-length.
                Length::Indefinite => return Err(CodecError::InvalidLength),
            }
        };
        Ok(Self { state })
    }

    /// True once every content byte has been consumed.
    pub fn exhausted(&self) -> bool {
        matches!(self.state, OcState::Done)
            || matches!(self.state, OcState::Primitive { remaining: 0 })
    }

    fn next_chunk<R: Read>(&mut self, rd: &mut BerReader<R>) -> Result<(), CodecError> {
        // Called with chunk_remaining == 0 in Constructed state.
        let OcState::Constructed {
            outer,
            outer_consumed,
            start_pos,
            ..
        } = self.state
        else {
            return Ok(());
        };

        match outer {
            Length::Indefinite => {
                if rd.at_eoc()? {
                    rd.read_eoc()?;
                    self.state = OcState::Done;
                    return Ok(());
                }
            }
            Length::Definite(total) => {
                if outer_consumed >= total {
                    self.state = OcState::Done;
                    return Ok(());
                }
            }
        }

        let (tag, length) = rd.read_header()?;
        if !tag.is_universal(0x04) || tag.constructed {
            return Err(CodecError::UnexpectedTag {
                expected: 0x04,
                got: tag.number as u8,
            });
        }
        let Length::Definite(n) = length else {
            return Err(CodecError::InvalidLength);
        };
        let consumed = (rd.position() - start_pos) as usize + n;
        if let Length::Definite(total) = outer {
            if consumed > total {
                return Err(CodecError::InvalidLength);
            }
        }
        self.state = OcState::Constructed {
            outer,
            outer_consumed: consumed,
            start_pos,
            chunk_remaining: n,
        };
        Ok(())
    }

    /// Pull up to `buf.len()` content bytes; 0 means end of content.
    pub fn read_content<R: Read>(
        &mut self,
        rd: &mut BerReader<R>,
        buf: &mut [u8],
    ) -> Result<usize, CodecError> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            match &mut self.state {
                OcState::Done => return Ok(0),
                OcState::Primitive { remaining } => {
                    if *remaining == 0 {
                        self.state = OcState::Done;
                        return Ok(0);
                    }
                    let want = buf.len().min(*remaining);
                    let n = rd.read_some(&mut buf[..want])?;
                    *remaining -= n;
                    return Ok(n);
                }
                OcState::Constructed { chunk_remaining, .. } => {
                    if *chunk_remaining == 0 {
                        self.next_chunk(rd)?;
                        continue;
                    }
                    let want = buf.len().min(*chunk_remaining);
                    let n = rd.read_some(&mut buf[..want])?;
                    if let OcState::Constructed { chunk_remaining, .. } = &mut self.state {
                        *chunk_remaining -= n;
                    }
                    return Ok(n);
                }
            }
        }
    }
}

/// A borrowed view pairing an [`OctetCursor`] with its reader.
pub struct OctetContentReader<'a, R: Read> {
    rd: &'a mut BerReader<R>,
    cursor: OctetCursor,
}

impl<'a, R: Read> OctetContentReader<'a, R> {
    /// Start reading at a node whose header (tag + length) has already been
    /// consumed from `rd`.
    pub fn new(rd: &'a mut BerReader<R>, tag: Tag, length: Length) -> Result<Self, CodecError> {
        let cursor = OctetCursor::new(tag, length, rd.position())?;
        Ok(Self { rd, cursor })
    }

    /// True once every content byte has been consumed.
    pub fn exhausted(&self) -> bool {
        self.cursor.exhausted()
    }

    /// Pull up to `buf.len()` content bytes; 0 means end of content.
    pub fn read_content(&mut self, buf: &mut [u8]) -> Result<usize, CodecError> {
        self.cursor.read_content(self.rd, buf)
    }
}

// ── Writer ───────────────────────────────────────────────────────────

/// An incremental BER writer.
///
/// Constructed elements whose length is unknown up front are opened with an
/// indefinite length and closed with end-of-contents octets, innermost
/// first, so the framing is valid at every nesting level.
pub struct BerWriter<W: Write> {
    w: W,
    depth: usize,
}

impl<W: Write> BerWriter<W> {
    pub fn new(w: W) -> Self {
        Self { w, depth: 0 }
    }

    /// Open an indefinite-length constructed element.
    pub fn begin(&mut self, tag_byte: u8) -> Result<(), CodecError> {
        self.w.write_all(&[tag_byte, 0x80])?;
        self.depth += 1;
        Ok(())
    }

    /// Close the innermost open element with end-of-contents octets.
    pub fn end(&mut self) -> Result<(), CodecError> {
        debug_assert!(self.depth > 0, "unbalanced BerWriter::end");
        self.w.write_all(&[0x00, 0x00])?;
        self.depth -= 1;
        Ok(())
    }

    /// Write a complete definite-length TLV.
    pub fn write_tlv(&mut self, tag_byte: u8, value: &[u8]) -> Result<(), CodecError> {
        let mut header = vec![tag_byte];
        write_der_length(&mut header, value.len());
        self.w.write_all(&header)?;
        self.w.write_all(value)?;
        Ok(())
    }

    /// Write pre-encoded bytes verbatim.
    pub fn write_der(&mut self, der: &[u8]) -> Result<(), CodecError> {
        self.w.write_all(der)?;
        Ok(())
    }

    /// Number of currently open indefinite-length elements.
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn flush(&mut self) -> Result<(), CodecError> {
        self.w.flush()?;
        Ok(())
    }

    /// Finish writing; fails if any element is still open.
    pub fn into_inner(self) -> Result<W, CodecError> {
        if self.depth != 0 {
            return Err(CodecError::MissingEoc);
        }
        Ok(self.w)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{tags, TagClass};

    #[test]
    fn writer_nests_and_closes() {
        let mut w = BerWriter::new(Vec::new());
        w.begin(0x30).unwrap();
        w.write_tlv(tags::INTEGER, &[0x05]).unwrap();
        w.begin(0xA0).unwrap();
        w.write_tlv(tags::OCTET_STRING, b"ab").unwrap();
        w.end().unwrap();
        w.end().unwrap();
        let out = w.into_inner().unwrap();
        assert_eq!(
            out,
            [
                0x30, 0x80, 0x02, 0x01, 0x05, 0xA0, 0x80, 0x04, 0x02, b'a', b'b', 0x00, 0x00,
                0x00, 0x00
            ]
        );
    }

    #[test]
    fn writer_rejects_unbalanced_finish() {
        let mut w = BerWriter::new(Vec::new());
        w.begin(0x30).unwrap();
        assert!(matches!(w.into_inner(), Err(CodecError::MissingEoc)));
    }

    #[test]
    fn reader_buffers_indefinite_to_definite() {
        // SEQUENCE (indef) { OCTET STRING "hi", SEQUENCE (indef) { INTEGER 1 } }
        let data: &[u8] = &[
            0x30, 0x80, 0x04, 0x02, b'h', b'i', 0x30, 0x80, 0x02, 0x01, 0x01, 0x00, 0x00, 0x00,
            0x00,
        ];
        let mut rd = BerReader::new(data);
        let (tag, value) = rd.read_tlv().unwrap();
        assert!(tag.is_universal(0x10));
        assert_eq!(
            value,
            [0x04, 0x02, b'h', b'i', 0x30, 0x03, 0x02, 0x01, 0x01]
        );
    }

    #[test]
    fn reader_header_long_length() {
        let mut payload = vec![0x04, 0x82, 0x01, 0x00];
        payload.extend_from_slice(&[0xEE; 256]);
        let mut rd = BerReader::new(payload.as_slice());
        let (tag, len) = rd.read_header().unwrap();
        assert!(tag.is_universal(0x04));
        assert_eq!(len, Length::Definite(256));
    }

    #[test]
    fn content_reader_primitive() {
        let data: &[u8] = &[b'x', b'y', b'z'];
        let mut rd = BerReader::new(data);
        let tag = Tag {
            class: TagClass::ContextSpecific,
            constructed: false,
            number: 0,
        };
        let mut cr = OctetContentReader::new(&mut rd, tag, Length::Definite(3)).unwrap();
        let mut buf = [0u8; 8];
        let n = cr.read_content(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"xyz");
        assert_eq!(cr.read_content(&mut buf).unwrap(), 0);
        assert!(cr.exhausted());
    }

    #[test]
    fn content_reader_chunked_indefinite() {
        // chunks "he", "llo", then EOC
        let data: &[u8] = &[
            0x04, 0x02, b'h', b'e', 0x04, 0x03, b'l', b'l', b'o', 0x00, 0x00,
        ];
        let mut rd = BerReader::new(data);
        let tag = Tag::context(0, true);
        let mut cr = OctetContentReader::new(&mut rd, tag, Length::Indefinite).unwrap();
        let mut out = Vec::new();
        let mut buf = [0u8; 2];
        loop {
            let n = cr.read_content(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        assert_eq!(out, b"hello");
    }

    #[test]
    fn content_reader_chunked_definite() {
        // [0] constructed, definite length 9, containing two chunks
        let data: &[u8] = &[0x04, 0x02, b'h', b'e', 0x04, 0x03, b'l', b'l', b'o'];
        let mut rd = BerReader::new(data);
        let tag = Tag::context(0, true);
        let mut cr = OctetContentReader::new(&mut rd, tag, Length::Definite(9)).unwrap();
        let mut out = Vec::new();
        let mut buf = [0u8; 64];
        loop {
            let n = cr.read_content(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        assert_eq!(out, b"hello");
    }

    #[test]
    fn content_reader_rejects_nested_constructed_chunk() {
        let data: &[u8] = &[0x24, 0x80, 0x04, 0x01, b'a', 0x00, 0x00, 0x00, 0x00];
        let mut rd = BerReader::new(data);
        let tag = Tag::context(0, true);
        let mut cr = OctetContentReader::new(&mut rd, tag, Length::Indefinite).unwrap();
        let mut buf = [0u8; 4];
        assert!(cr.read_content(&mut buf).is_err());
    }
}
