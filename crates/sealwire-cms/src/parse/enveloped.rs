//! Streaming and buffered EnvelopedData parsers.

use std::io::{self, Read};

use sealwire_codec::ber::{BerReader, OctetCursor};
use sealwire_codec::oid::known;
use sealwire_codec::Decoder;
use sealwire_types::CmsError;

use crate::algid::AlgorithmIdentifier;
use crate::attr::AttributeSet;
use crate::content::{ContentDecryptor, StreamTransform};
use crate::info::{RecipientId, RecipientInfo};
use crate::recipient::Recipient;
use crate::store::RecipientInformationStore;

use super::{
    at_extent_end, close_extent, integer_from_bytes, io_invalid, open_context, open_sequence,
    Extent,
};

enum ParserState {
    /// Positioned at the encrypted content, ready to hand out a reader.
    Content,
    /// Content and trailer fully consumed.
    Done,
}

/// A single-pass EnvelopedData parser over any byte source.
///
/// Everything that precedes the encrypted content on the wire (version,
/// originator certificates, recipient records, content algorithm) is
/// available immediately after construction. The content itself is pulled
/// through [`content_reader`](Self::content_reader), and the fields that
/// follow it (unprotected attributes) only after that reader has been
/// read to end of stream.
pub struct EnvelopedDataParser<R: Read> {
    rd: BerReader<R>,
    ci_extent: Extent,
    explicit_extent: Extent,
    ed_extent: Extent,
    eci_extent: Extent,
    version: u32,
    originator_certs: Vec<Vec<u8>>,
    store: RecipientInformationStore,
    content_type: Vec<u8>,
    content_algorithm: AlgorithmIdentifier,
    cursor: Option<OctetCursor>,
    unprotected_attrs: AttributeSet,
    state: ParserState,
}

impl<R: Read> EnvelopedDataParser<R> {
    pub fn new(source: R) -> Result<Self, CmsError> {
        let mut rd = BerReader::new(source);
        let ci_extent = open_sequence(&mut rd, "expected ContentInfo")?;
        let (tag, oid) = rd.read_tlv()?;
        if !tag.is_universal(0x06) || oid != known::ENVELOPED_DATA {
            return Err(CmsError::Malformed("not an enveloped-data message"));
        }
        let explicit_extent = open_context(&mut rd, 0, "expected explicit content wrapper")?;
        let ed_extent = open_sequence(&mut rd, "expected EnvelopedData")?;

        let (tag, value) = rd.read_tlv()?;
        if !tag.is_universal(0x02) {
            return Err(CmsError::Malformed("expected version"));
        }
        let version = integer_from_bytes(&value)?;

        let (mut tag, mut value) = rd.read_tlv()?;
        let mut originator_certs = Vec::new();
        if tag.is_context(0) {
            originator_certs = parse_originator_certs(&value)?;
            (tag, value) = rd.read_tlv()?;
        }
        if !tag.is_universal(0x11) {
            return Err(CmsError::Malformed("expected recipientInfos"));
        }
        let store = RecipientInformationStore::new(parse_recipient_set(&value)?);

        let eci_extent = open_sequence(&mut rd, "expected EncryptedContentInfo")?;
        let (tag, content_type) = rd.read_tlv()?;
        if !tag.is_universal(0x06) {
            return Err(CmsError::Malformed("expected content type"));
        }
        let (tag, raw) = rd.read_raw_tlv()?;
        if !tag.is_universal(0x10) {
            return Err(CmsError::Malformed("expected content-encryption algorithm"));
        }
        let content_algorithm = AlgorithmIdentifier::from_der(&raw)?;

        let cursor = if at_extent_end(&mut rd, &eci_extent)? {
            None
        } else {
            let (tag, length) = rd.read_header()?;
            if !tag.is_context(0) {
                return Err(CmsError::Malformed("expected encryptedContent"));
            }
            Some(OctetCursor::new(tag, length, rd.position())?)
        };

        Ok(Self {
            rd,
            ci_extent,
            explicit_extent,
            ed_extent,
            eci_extent,
            version,
            originator_certs,
            store,
            content_type,
            content_algorithm,
            cursor,
            unprotected_attrs: AttributeSet::default(),
            state: ParserState::Content,
        })
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// Originator certificates, as raw DER.
    pub fn originator_certs(&self) -> &[Vec<u8>] {
        &self.originator_certs
    }

    pub fn recipients(&mut self) -> &mut RecipientInformationStore {
        &mut self.store
    }

    pub fn content_type(&self) -> &[u8] {
        &self.content_type
    }

    pub fn content_algorithm(&self) -> &AlgorithmIdentifier {
        &self.content_algorithm
    }

    /// Resolve the CEK with the given credential and return a reader over
    /// the decrypted content. Single use.
    pub fn content_reader(
        &mut self,
        id: &RecipientId,
        recipient: &dyn Recipient,
    ) -> Result<ContentReader<'_, R>, CmsError> {
        if !matches!(self.state, ParserState::Content) {
            return Err(CmsError::Sequencing("content already consumed"));
        }
        let cek = self.store.resolve(id, recipient)?;
        let decryptor = ContentDecryptor::for_algorithm(&self.content_algorithm, &cek)?;
        Ok(ContentReader {
            parser: self,
            decryptor,
            plain: Vec::new(),
            plain_off: 0,
            finished: false,
        })
    }

    /// Unprotected attributes; available once the content reader hit end
    /// of stream.
    pub fn unprotected_attrs(&self) -> Result<&AttributeSet, CmsError> {
        match self.state {
            ParserState::Done => Ok(&self.unprotected_attrs),
            _ => Err(CmsError::Sequencing("content not yet consumed")),
        }
    }

    /// After the content node: unprotectedAttrs, then every closing frame.
    fn finish_trailer(&mut self) -> Result<(), CmsError> {
        close_extent(&mut self.rd, &self.eci_extent)?;
        if !at_extent_end(&mut self.rd, &self.ed_extent)? {
            let (tag, value) = self.rd.read_tlv()?;
            if !tag.is_context(1) {
                return Err(CmsError::Malformed("unexpected element after content"));
            }
            self.unprotected_attrs = AttributeSet::from_set_contents(&value)?;
        }
        close_extent(&mut self.rd, &self.ed_extent)?;
        close_extent(&mut self.rd, &self.explicit_extent)?;
        close_extent(&mut self.rd, &self.ci_extent)?;
        self.state = ParserState::Done;
        Ok(())
    }
}

fn parse_originator_certs(contents: &[u8]) -> Result<Vec<Vec<u8>>, CmsError> {
    let mut dec = Decoder::new(contents);
    let mut certs = Vec::new();
    if let Some(set) = dec.try_read_context_specific(0, true)? {
        let mut inner = Decoder::new(set.value);
        while !inner.is_empty() {
            let (_, raw) = inner.read_raw_tlv()?;
            certs.push(raw.to_vec());
        }
    }
    // Any crls [1] are tolerated and skipped.
    Ok(certs)
}

fn parse_recipient_set(contents: &[u8]) -> Result<Vec<RecipientInfo>, CmsError> {
    let mut dec = Decoder::new(contents);
    let mut infos = Vec::new();
    while !dec.is_empty() {
        infos.push(RecipientInfo::read_from(&mut dec)?);
    }
    if infos.is_empty() {
        return Err(CmsError::Malformed("empty recipientInfos"));
    }
    Ok(infos)
}

/// Decrypted content as a [`Read`] stream.
///
/// Fail-closed: the final cipher step (padding check or AEAD tag
/// verification) runs before the last byte is surfaced, and any failure
/// turns into an error rather than short data.
pub struct ContentReader<'a, R: Read> {
    parser: &'a mut EnvelopedDataParser<R>,
    decryptor: ContentDecryptor,
    plain: Vec<u8>,
    plain_off: usize,
    finished: bool,
}

impl<'a, R: Read> ContentReader<'a, R> {
    /// Feed associated data to an AEAD content algorithm. Must precede
    /// all reads.
    pub fn aad_update(&mut self, aad: &[u8]) -> Result<(), CmsError> {
        self.decryptor.aad_update(aad)
    }

    fn fill(&mut self) -> Result<(), CmsError> {
        let parser = &mut *self.parser;
        match parser.cursor.as_mut() {
            None => {
                // Absent or exhausted content node: run the final cipher
                // step, then the message trailer.
                self.decryptor.finish(&mut self.plain)?;
                parser.finish_trailer()?;
                self.finished = true;
            }
            Some(cursor) => {
                let mut chunk = [0u8; 4096];
                let n = cursor.read_content(&mut parser.rd, &mut chunk)?;
                if n == 0 {
                    parser.cursor = None;
                    self.decryptor.finish(&mut self.plain)?;
                    parser.finish_trailer()?;
                    self.finished = true;
                } else {
                    self.decryptor.update(&chunk[..n], &mut self.plain)?;
                }
            }
        }
        Ok(())
    }
}

impl<'a, R: Read> Read for ContentReader<'a, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            if self.plain_off < self.plain.len() {
                let n = buf.len().min(self.plain.len() - self.plain_off);
                buf[..n].copy_from_slice(&self.plain[self.plain_off..self.plain_off + n]);
                self.plain_off += n;
                return Ok(n);
            }
            self.plain.clear();
            self.plain_off = 0;
            if self.finished {
                return Ok(0);
            }
            self.fill().map_err(io_invalid)?;
        }
    }
}

// ── Buffered form ────────────────────────────────────────────────────

/// A fully buffered EnvelopedData message.
pub struct CmsEnvelopedData {
    pub version: u32,
    pub originator_certs: Vec<Vec<u8>>,
    store: RecipientInformationStore,
    pub content_type: Vec<u8>,
    pub content_algorithm: AlgorithmIdentifier,
    pub encrypted_content: Option<Vec<u8>>,
    pub unprotected_attrs: AttributeSet,
}

impl CmsEnvelopedData {
    /// Parse a complete message, accepting both definite-length DER and
    /// indefinite-length BER framing.
    pub fn from_ber(data: &[u8]) -> Result<Self, CmsError> {
        let mut rd = BerReader::new(data);
        let (tag, contents) = rd.read_tlv()?;
        if !tag.is_universal(0x10) {
            return Err(CmsError::Malformed("expected ContentInfo"));
        }
        let mut dec = Decoder::new(&contents);
        if dec.read_oid()? != known::ENVELOPED_DATA {
            return Err(CmsError::Malformed("not an enveloped-data message"));
        }
        let outer = dec.read_context_specific(0, true)?;
        let mut dec = Decoder::new(outer.value);
        let mut ed = dec.read_sequence()?;
        let version = integer_from_bytes(ed.read_integer()?)?;

        let mut originator_certs = Vec::new();
        if let Some(orig) = ed.try_read_context_specific(0, true)? {
            originator_certs = parse_originator_certs(orig.value)?;
        }
        let set = ed.read_set()?;
        let store = RecipientInformationStore::new(parse_recipient_set(set.remaining())?);

        let mut eci = ed.read_sequence()?;
        let content_type = eci.read_oid()?.to_vec();
        let content_algorithm = AlgorithmIdentifier::read_from(&mut eci)?;
        let encrypted_content = read_optional_content(&mut eci)?;

        let mut unprotected_attrs = AttributeSet::default();
        if !ed.is_empty() {
            let tlv = ed.read_context_specific(1, true)?;
            unprotected_attrs = AttributeSet::from_set_contents(tlv.value)?;
        }

        Ok(Self {
            version,
            originator_certs,
            store,
            content_type,
            content_algorithm,
            encrypted_content,
            unprotected_attrs,
        })
    }

    pub fn recipients(&mut self) -> &mut RecipientInformationStore {
        &mut self.store
    }

    /// Resolve the CEK and decrypt the content in one step.
    pub fn decrypt(
        &mut self,
        id: &RecipientId,
        recipient: &dyn Recipient,
    ) -> Result<Vec<u8>, CmsError> {
        let ciphertext = self
            .encrypted_content
            .as_deref()
            .ok_or(CmsError::Malformed("no encrypted content"))?;
        let cek = self.store.resolve(id, recipient)?;
        let mut decryptor = ContentDecryptor::for_algorithm(&self.content_algorithm, &cek)?;
        let mut plain = Vec::with_capacity(ciphertext.len());
        decryptor.update(ciphertext, &mut plain)?;
        decryptor.finish(&mut plain)?;
        Ok(plain)
    }
}

/// Read an optional `[0] IMPLICIT` encryptedContent octet node.
fn read_optional_content(dec: &mut Decoder<'_>) -> Result<Option<Vec<u8>>, CmsError> {
    if dec.is_empty() || !dec.peek_tag()?.is_context(0) {
        return Ok(None);
    }
    let tlv = dec.read_tlv()?;
    Ok(Some(super::collect_octets(tlv.tag, tlv.value)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate::EnvelopedDataGenerator;
    use crate::recipient::{KekGenerator, KekRecipient, RecipientInfoGenerator};
    use sealwire_types::ContentAlgId;

    const KEK: [u8; 16] = [0x55; 16];

    fn message(content: &[u8]) -> Vec<u8> {
        let mut gen = EnvelopedDataGenerator::new();
        gen.add_recipient(RecipientInfoGenerator::Kek(
            KekGenerator::new(b"parse-kek", &KEK).unwrap(),
        ));
        gen.encrypt_to_vec(known::PKCS7_DATA, ContentAlgId::Aes128Gcm, content)
            .unwrap()
    }

    #[test]
    fn streaming_roundtrip() {
        let der = message(b"streamed plaintext");
        let mut parser = EnvelopedDataParser::new(der.as_slice()).unwrap();
        assert_eq!(parser.version(), 2);
        assert_eq!(parser.content_type(), known::PKCS7_DATA);
        assert_eq!(parser.recipients().len(), 1);

        let id = RecipientId::KekId(b"parse-kek".to_vec());
        let recipient = KekRecipient::new(&KEK);
        let mut reader = parser.content_reader(&id, &recipient).unwrap();
        let mut plain = Vec::new();
        reader.read_to_end(&mut plain).unwrap();
        assert_eq!(plain, b"streamed plaintext");
        assert!(parser.unprotected_attrs().unwrap().is_empty());
    }

    #[test]
    fn attrs_before_content_is_sequencing_error() {
        let der = message(b"x");
        let parser = EnvelopedDataParser::new(der.as_slice()).unwrap();
        assert!(matches!(
            parser.unprotected_attrs(),
            Err(CmsError::Sequencing(_))
        ));
    }

    #[test]
    fn tampered_ciphertext_fails_closed() {
        let mut der = message(&vec![0x42; 5000]);
        // Flip a bit somewhere inside the encrypted content.
        let idx = der.len() - 64;
        der[idx] ^= 0x01;
        let mut parser = EnvelopedDataParser::new(der.as_slice()).unwrap();
        let id = RecipientId::KekId(b"parse-kek".to_vec());
        let recipient = KekRecipient::new(&KEK);
        let mut reader = parser.content_reader(&id, &recipient).unwrap();
        let mut plain = Vec::new();
        assert!(reader.read_to_end(&mut plain).is_err());
    }

    #[test]
    fn buffered_roundtrip() {
        let der = message(b"buffered plaintext");
        let mut msg = CmsEnvelopedData::from_ber(&der).unwrap();
        assert_eq!(msg.version, 2);
        let plain = msg
            .decrypt(
                &RecipientId::KekId(b"parse-kek".to_vec()),
                &KekRecipient::new(&KEK),
            )
            .unwrap();
        assert_eq!(plain, b"buffered plaintext");
    }

    #[test]
    fn wrong_content_oid_rejected() {
        let mut gen = EnvelopedDataGenerator::new();
        gen.add_recipient(RecipientInfoGenerator::Kek(
            KekGenerator::new(b"k", &KEK).unwrap(),
        ));
        let der = gen
            .encrypt_to_vec(known::PKCS7_DATA, ContentAlgId::Aes128Cbc, b"x")
            .unwrap();
        // Rewriting the outer type OID must make the parser refuse it.
        let mut bad = der.clone();
        let pos = 4; // first OID content byte
        bad[pos] ^= 0x01;
        assert!(matches!(
            EnvelopedDataParser::new(bad.as_slice()),
            Err(CmsError::Malformed(_))
        ));
    }
}
