//! Streaming and buffered CMS message parsers.
//!
//! The streaming parsers pull structure from any [`std::io::Read`] source
//! and expose the content octets through a reader, so a message never has
//! to fit in memory. The buffered `Cms*Data` types re-frame a complete
//! message (BER or DER) to definite-length form first and then decode it
//! in place; they are the convenient path for small messages and tests.

mod authenticated;
mod encrypted;
mod enveloped;

pub use authenticated::{AuthContentReader, AuthenticatedDataParser, CmsAuthenticatedData};
pub use encrypted::CmsEncryptedData;
pub use enveloped::{CmsEnvelopedData, ContentReader, EnvelopedDataParser};

use std::io::Read;

use sealwire_codec::ber::{BerReader, Length};
use sealwire_types::CmsError;

/// The outer boundary of an open constructed element: a byte position for
/// definite lengths, end-of-contents octets for indefinite ones.
pub(crate) struct Extent {
    end: Option<u64>,
}

/// Consume a constructed SEQUENCE header and record its extent.
pub(crate) fn open_sequence<R: Read>(
    rd: &mut BerReader<R>,
    what: &'static str,
) -> Result<Extent, CmsError> {
    let (tag, length) = rd.read_header()?;
    if !tag.is_universal(0x10) || !tag.constructed {
        return Err(CmsError::Malformed(what));
    }
    Ok(extent_of(rd, length))
}

/// Consume a constructed context-specific header and record its extent.
pub(crate) fn open_context<R: Read>(
    rd: &mut BerReader<R>,
    tag_num: u32,
    what: &'static str,
) -> Result<Extent, CmsError> {
    let (tag, length) = rd.read_header()?;
    if !tag.is_context(tag_num) || !tag.constructed {
        return Err(CmsError::Malformed(what));
    }
    Ok(extent_of(rd, length))
}

pub(crate) fn extent_of<R: Read>(rd: &BerReader<R>, length: Length) -> Extent {
    Extent {
        end: match length {
            Length::Definite(n) => Some(rd.position() + n as u64),
            Length::Indefinite => None,
        },
    }
}

/// True when the reader stands at the end of the extent (for indefinite
/// extents this peeks for end-of-contents).
pub(crate) fn at_extent_end<R: Read>(
    rd: &mut BerReader<R>,
    extent: &Extent,
) -> Result<bool, CmsError> {
    match extent.end {
        Some(end) => Ok(rd.position() >= end),
        None => Ok(rd.at_eoc()?),
    }
}

/// Leave the extent: consume end-of-contents, or check the definite
/// length was consumed exactly.
pub(crate) fn close_extent<R: Read>(
    rd: &mut BerReader<R>,
    extent: &Extent,
) -> Result<(), CmsError> {
    match extent.end {
        Some(end) => {
            if rd.position() != end {
                return Err(CmsError::Malformed("element length mismatch"));
            }
            Ok(())
        }
        None => {
            rd.read_eoc()?;
            Ok(())
        }
    }
}

/// Parse the contents octets of an INTEGER as a small non-negative value.
pub(crate) fn integer_from_bytes(bytes: &[u8]) -> Result<u32, CmsError> {
    let digits = match bytes.split_first() {
        Some((&0, rest)) => rest,
        _ => bytes,
    };
    if digits.len() > 4 || bytes.first().is_some_and(|b| b & 0x80 != 0) {
        return Err(CmsError::Malformed("INTEGER out of range"));
    }
    let mut value: u32 = 0;
    for &b in digits {
        value = (value << 8) | b as u32;
    }
    Ok(value)
}

/// Collect the content bytes of an OCTET STRING node that may have kept
/// its chunked framing through the definite re-encode: primitive nodes
/// yield their value, constructed nodes the concatenation of their
/// primitive OCTET STRING chunks.
pub(crate) fn collect_octets(
    tag: sealwire_codec::Tag,
    value: &[u8],
) -> Result<Vec<u8>, CmsError> {
    if !tag.constructed {
        return Ok(value.to_vec());
    }
    let mut chunks = sealwire_codec::Decoder::new(value);
    let mut out = Vec::with_capacity(value.len());
    while !chunks.is_empty() {
        out.extend_from_slice(chunks.read_octet_string()?);
    }
    Ok(out)
}

pub(crate) fn io_invalid(e: CmsError) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
}
