//! Streaming CMS message generators.
//!
//! Each generator is configured up front (recipients, attributes,
//! algorithms), opened over a sink, fed content through [`std::io::Write`],
//! and closed exactly once. Closing finalizes the cipher (padding or tag)
//! and emits end-of-contents octets for every open indefinite-length
//! level, innermost first.

mod authenticated;
mod encrypted;
mod enveloped;

pub use authenticated::{AuthenticatedDataGenerator, AuthenticatedDataWriter};
pub use encrypted::EncryptedDataGenerator;
pub use enveloped::{EnvelopedDataGenerator, EnvelopedDataWriter};

use std::io::Write;

use sealwire_codec::ber::BerWriter;
use sealwire_codec::tags;
use sealwire_types::CmsError;

/// Content is emitted as primitive OCTET STRING chunks of this size, so
/// the byte stream is identical no matter how callers slice their writes.
pub(crate) const CONTENT_CHUNK: usize = 4096;

/// Emit buffered content bytes as fixed-size OCTET STRING chunks. With
/// `force`, the final partial chunk is emitted too.
pub(crate) fn flush_chunks<W: Write>(
    w: &mut BerWriter<W>,
    pending: &mut Vec<u8>,
    force: bool,
) -> Result<(), CmsError> {
    let mut off = 0;
    while pending.len() - off >= CONTENT_CHUNK {
        w.write_tlv(tags::OCTET_STRING, &pending[off..off + CONTENT_CHUNK])?;
        off += CONTENT_CHUNK;
    }
    if force && pending.len() > off {
        w.write_tlv(tags::OCTET_STRING, &pending[off..])?;
        off = pending.len();
    }
    pending.drain(..off);
    Ok(())
}

pub(crate) fn io_error(e: CmsError) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::Other, e.to_string())
}
