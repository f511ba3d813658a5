//! Streaming and buffered AuthenticatedData parsers.
//!
//! Content surfaced by the reader is unauthenticated until
//! [`verify`](AuthenticatedDataParser::verify) has succeeded; callers that
//! act on the bytes before that point own the consequences.

use std::io::{self, Read};

use sealwire_codec::ber::{BerReader, Length, OctetCursor};
use sealwire_codec::oid::known;
use sealwire_codec::{tags, Decoder, Encoder};
use sealwire_types::CmsError;
use subtle::ConstantTimeEq;

use crate::algid::AlgorithmIdentifier;
use crate::attr::AttributeSet;
use crate::content::{DigestCalculator, MacCalculator};
use crate::info::{RecipientId, RecipientInfo};
use crate::key::ContentEncryptionKey;
use crate::recipient::Recipient;
use crate::registry::registry;
use crate::store::RecipientInformationStore;

use super::{
    at_extent_end, close_extent, integer_from_bytes, io_invalid, open_context, open_sequence,
    Extent,
};

enum Tee {
    /// No digest algorithm: the MAC runs over the content octets.
    Direct(MacCalculator),
    /// Digest mode: the content is digested, the MAC covers the
    /// authenticated attributes.
    Digest(DigestCalculator),
}

enum Computed {
    Mac(Vec<u8>),
    Digest(Vec<u8>),
}

enum ParserState {
    Content,
    ContentDone,
    Verified,
}

/// A single-pass AuthenticatedData parser over any byte source.
pub struct AuthenticatedDataParser<R: Read> {
    rd: BerReader<R>,
    ci_extent: Extent,
    explicit_extent: Extent,
    ad_extent: Extent,
    encap_extent: Extent,
    econtent_extent: Option<Extent>,
    version: u32,
    store: RecipientInformationStore,
    mac_algorithm: AlgorithmIdentifier,
    digest_algorithm: Option<AlgorithmIdentifier>,
    content_type: Vec<u8>,
    cursor: Option<OctetCursor>,
    tee: Option<Tee>,
    mac_key: Option<ContentEncryptionKey>,
    computed: Option<Computed>,
    auth_attrs_contents: Option<Vec<u8>>,
    auth_attrs: AttributeSet,
    mac_value: Vec<u8>,
    unauth_attrs: AttributeSet,
    state: ParserState,
}

impl<R: Read> AuthenticatedDataParser<R> {
    pub fn new(source: R) -> Result<Self, CmsError> {
        let mut rd = BerReader::new(source);
        let ci_extent = open_sequence(&mut rd, "expected ContentInfo")?;
        let (tag, oid) = rd.read_tlv()?;
        if !tag.is_universal(0x06) || oid != known::CT_AUTH_DATA {
            return Err(CmsError::Malformed("not an authenticated-data message"));
        }
        let explicit_extent = open_context(&mut rd, 0, "expected explicit content wrapper")?;
        let ad_extent = open_sequence(&mut rd, "expected AuthenticatedData")?;

        let (tag, value) = rd.read_tlv()?;
        if !tag.is_universal(0x02) {
            return Err(CmsError::Malformed("expected version"));
        }
        let version = integer_from_bytes(&value)?;

        let (mut tag, mut value) = rd.read_tlv()?;
        if tag.is_context(0) {
            // OriginatorInfo carries nothing this parser needs.
            (tag, value) = rd.read_tlv()?;
        }
        if !tag.is_universal(0x11) {
            return Err(CmsError::Malformed("expected recipientInfos"));
        }
        let mut dec = Decoder::new(&value);
        let mut infos = Vec::new();
        while !dec.is_empty() {
            infos.push(RecipientInfo::read_from(&mut dec)?);
        }
        if infos.is_empty() {
            return Err(CmsError::Malformed("empty recipientInfos"));
        }
        let store = RecipientInformationStore::new(infos);

        let (tag, raw) = rd.read_raw_tlv()?;
        if !tag.is_universal(0x10) {
            return Err(CmsError::Malformed("expected MAC algorithm"));
        }
        let mac_algorithm = AlgorithmIdentifier::from_der(&raw)?;

        // digestAlgorithm [1] IMPLICIT, then encapContentInfo SEQUENCE.
        let (tag, length) = rd.read_header()?;
        let (digest_algorithm, encap_extent) = if tag.is_context(1) && tag.constructed {
            let Length::Definite(n) = length else {
                return Err(CmsError::Malformed("indefinite digest algorithm"));
            };
            let mut contents = vec![0u8; n];
            rd.read_exact(&mut contents)?;
            let alg = AlgorithmIdentifier::from_der_contents(&contents)?;
            (
                Some(alg),
                open_sequence(&mut rd, "expected EncapsulatedContentInfo")?,
            )
        } else if tag.is_universal(0x10) && tag.constructed {
            (None, super::extent_of(&rd, length))
        } else {
            return Err(CmsError::Malformed("expected EncapsulatedContentInfo"));
        };

        let (tag, content_type) = rd.read_tlv()?;
        if !tag.is_universal(0x06) {
            return Err(CmsError::Malformed("expected content type"));
        }

        let (econtent_extent, cursor) = if at_extent_end(&mut rd, &encap_extent)? {
            (None, None)
        } else {
            let econtent_extent = open_context(&mut rd, 0, "expected eContent")?;
            let (tag, length) = rd.read_header()?;
            if !tag.is_universal(0x04) {
                return Err(CmsError::Malformed("expected eContent octets"));
            }
            let cursor = OctetCursor::new(tag, length, rd.position())?;
            (Some(econtent_extent), Some(cursor))
        };

        Ok(Self {
            rd,
            ci_extent,
            explicit_extent,
            ad_extent,
            encap_extent,
            econtent_extent,
            version,
            store,
            mac_algorithm,
            digest_algorithm,
            content_type,
            cursor,
            tee: None,
            mac_key: None,
            computed: None,
            auth_attrs_contents: None,
            auth_attrs: AttributeSet::default(),
            mac_value: Vec::new(),
            unauth_attrs: AttributeSet::default(),
            state: ParserState::Content,
        })
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn recipients(&mut self) -> &mut RecipientInformationStore {
        &mut self.store
    }

    pub fn mac_algorithm(&self) -> &AlgorithmIdentifier {
        &self.mac_algorithm
    }

    pub fn digest_algorithm(&self) -> Option<&AlgorithmIdentifier> {
        self.digest_algorithm.as_ref()
    }

    pub fn content_type(&self) -> &[u8] {
        &self.content_type
    }

    /// Resolve the MAC key with the given credential and return a reader
    /// over the (not yet verified) content. Single use.
    pub fn content_reader(
        &mut self,
        id: &RecipientId,
        recipient: &dyn Recipient,
    ) -> Result<AuthContentReader<'_, R>, CmsError> {
        if !matches!(self.state, ParserState::Content) {
            return Err(CmsError::Sequencing("content already consumed"));
        }
        let key = self.store.resolve(id, recipient)?;
        let tee = match &self.digest_algorithm {
            Some(alg) => Tee::Digest(DigestCalculator::new(registry().digest_by_oid(&alg.oid)?)),
            None => {
                let mac_alg = registry().mac_by_oid(&self.mac_algorithm.oid)?;
                Tee::Direct(MacCalculator::new(mac_alg, key.as_bytes())?)
            }
        };
        self.tee = Some(tee);
        self.mac_key = Some(key);
        Ok(AuthContentReader {
            parser: self,
            finished: false,
        })
    }

    /// Verify the MAC (and, in digest mode, the attribute bindings).
    /// Requires the content reader to have been read to end of stream.
    pub fn verify(&mut self) -> Result<(), CmsError> {
        if !matches!(self.state, ParserState::ContentDone) {
            return Err(CmsError::Sequencing("content not yet consumed"));
        }
        let computed = self
            .computed
            .take()
            .ok_or(CmsError::Sequencing("nothing to verify"))?;
        match computed {
            Computed::Mac(mac) => {
                if self.auth_attrs_contents.is_some() {
                    return Err(CmsError::Malformed(
                        "authenticated attributes without digest algorithm",
                    ));
                }
                if self.content_type != known::PKCS7_DATA {
                    return Err(CmsError::MissingAuthAttrs);
                }
                if mac.ct_eq(&self.mac_value).into() {
                    self.state = ParserState::Verified;
                    Ok(())
                } else {
                    Err(CmsError::AuthenticationFailed)
                }
            }
            Computed::Digest(digest) => {
                let contents = self
                    .auth_attrs_contents
                    .as_deref()
                    .ok_or(CmsError::MissingAuthAttrs)?;
                let ct_attr = self
                    .auth_attrs
                    .find(known::ATTR_CONTENT_TYPE)
                    .ok_or(CmsError::MissingAuthAttrs)?;
                let mut enc = Encoder::new();
                enc.write_oid(&self.content_type);
                if ct_attr.values.first().map(Vec::as_slice) != Some(enc.finish().as_slice()) {
                    return Err(CmsError::AuthenticationFailed);
                }
                let md_attr = self
                    .auth_attrs
                    .find(known::ATTR_MESSAGE_DIGEST)
                    .and_then(|a| a.first_octet_string())
                    .ok_or(CmsError::MissingAuthAttrs)?;
                if !bool::from(digest.ct_eq(md_attr)) {
                    return Err(CmsError::AuthenticationFailed);
                }
                // MAC input is the received attribute set under a SET tag.
                let mut input = Encoder::new();
                input.write_tlv(tags::SET, contents);
                let mac_alg = registry().mac_by_oid(&self.mac_algorithm.oid)?;
                let key = self
                    .mac_key
                    .as_ref()
                    .ok_or(CmsError::Sequencing("MAC key not resolved"))?;
                let mut mac = MacCalculator::new(mac_alg, key.as_bytes())?;
                mac.update(&input.finish());
                if bool::from(mac.finish().ct_eq(&self.mac_value)) {
                    self.state = ParserState::Verified;
                    Ok(())
                } else {
                    Err(CmsError::AuthenticationFailed)
                }
            }
        }
    }

    /// Authenticated attributes; available once the content has been
    /// consumed. Only meaningful after [`verify`](Self::verify) succeeds.
    pub fn auth_attrs(&self) -> Result<&AttributeSet, CmsError> {
        match self.state {
            ParserState::Content => Err(CmsError::Sequencing("content not yet consumed")),
            _ => Ok(&self.auth_attrs),
        }
    }

    pub fn unauth_attrs(&self) -> Result<&AttributeSet, CmsError> {
        match self.state {
            ParserState::Content => Err(CmsError::Sequencing("content not yet consumed")),
            _ => Ok(&self.unauth_attrs),
        }
    }

    /// After the content node: authAttrs, mac, unauthAttrs and every
    /// closing frame.
    fn finish_trailer(&mut self) -> Result<(), CmsError> {
        if let Some(extent) = self.econtent_extent.take() {
            close_extent(&mut self.rd, &extent)?;
        }
        close_extent(&mut self.rd, &self.encap_extent)?;

        let (mut tag, mut value) = self.rd.read_tlv()?;
        if tag.is_context(2) {
            self.auth_attrs = AttributeSet::from_set_contents(&value)?;
            self.auth_attrs_contents = Some(value);
            (tag, value) = self.rd.read_tlv()?;
        }
        if !tag.is_universal(0x04) {
            return Err(CmsError::Malformed("expected mac"));
        }
        self.mac_value = value;

        if !at_extent_end(&mut self.rd, &self.ad_extent)? {
            let (tag, value) = self.rd.read_tlv()?;
            if !tag.is_context(3) {
                return Err(CmsError::Malformed("unexpected element after mac"));
            }
            self.unauth_attrs = AttributeSet::from_set_contents(&value)?;
        }
        close_extent(&mut self.rd, &self.ad_extent)?;
        close_extent(&mut self.rd, &self.explicit_extent)?;
        close_extent(&mut self.rd, &self.ci_extent)?;

        self.computed = Some(match self.tee.take() {
            Some(Tee::Direct(mac)) => Computed::Mac(mac.finish()),
            Some(Tee::Digest(digest)) => Computed::Digest(digest.finish()),
            None => return Err(CmsError::Sequencing("no calculator in flight")),
        });
        self.state = ParserState::ContentDone;
        Ok(())
    }
}

/// The plaintext content stream of an AuthenticatedData message.
///
/// Bytes are surfaced before the MAC has been checked; the caller must
/// treat them as untrusted until [`AuthenticatedDataParser::verify`]
/// succeeds.
pub struct AuthContentReader<'a, R: Read> {
    parser: &'a mut AuthenticatedDataParser<R>,
    finished: bool,
}

impl<'a, R: Read> Read for AuthContentReader<'a, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() || self.finished {
            return Ok(0);
        }
        let parser = &mut *self.parser;
        let n = match parser.cursor.as_mut() {
            Some(cursor) => cursor
                .read_content(&mut parser.rd, buf)
                .map_err(|e| io_invalid(CmsError::Codec(e)))?,
            None => 0,
        };
        if n == 0 {
            parser.cursor = None;
            parser.finish_trailer().map_err(io_invalid)?;
            self.finished = true;
            return Ok(0);
        }
        match parser.tee.as_mut() {
            Some(Tee::Direct(mac)) => mac.update(&buf[..n]),
            Some(Tee::Digest(digest)) => digest.update(&buf[..n]),
            None => return Err(io_invalid(CmsError::Sequencing("no calculator in flight"))),
        }
        Ok(n)
    }
}

// ── Buffered form ────────────────────────────────────────────────────

/// A fully buffered AuthenticatedData message.
pub struct CmsAuthenticatedData {
    pub version: u32,
    store: RecipientInformationStore,
    pub mac_algorithm: AlgorithmIdentifier,
    pub digest_algorithm: Option<AlgorithmIdentifier>,
    pub content_type: Vec<u8>,
    pub content: Vec<u8>,
    auth_attrs_contents: Option<Vec<u8>>,
    pub auth_attrs: AttributeSet,
    mac_value: Vec<u8>,
    pub unauth_attrs: AttributeSet,
}

impl CmsAuthenticatedData {
    /// Parse a complete message, accepting both definite-length DER and
    /// indefinite-length BER framing.
    pub fn from_ber(data: &[u8]) -> Result<Self, CmsError> {
        let mut rd = BerReader::new(data);
        let (tag, contents) = rd.read_tlv()?;
        if !tag.is_universal(0x10) {
            return Err(CmsError::Malformed("expected ContentInfo"));
        }
        let mut dec = Decoder::new(&contents);
        if dec.read_oid()? != known::CT_AUTH_DATA {
            return Err(CmsError::Malformed("not an authenticated-data message"));
        }
        let outer = dec.read_context_specific(0, true)?;
        let mut dec = Decoder::new(outer.value);
        let mut ad = dec.read_sequence()?;
        let version = integer_from_bytes(ad.read_integer()?)?;

        ad.try_read_context_specific(0, true)?; // originatorInfo, unused
        let set = ad.read_set()?;
        let mut rec = Decoder::new(set.remaining());
        let mut infos = Vec::new();
        while !rec.is_empty() {
            infos.push(RecipientInfo::read_from(&mut rec)?);
        }
        if infos.is_empty() {
            return Err(CmsError::Malformed("empty recipientInfos"));
        }
        let store = RecipientInformationStore::new(infos);

        let mac_algorithm = AlgorithmIdentifier::read_from(&mut ad)?;
        let digest_algorithm = match ad.try_read_context_specific(1, true)? {
            Some(tlv) => Some(AlgorithmIdentifier::from_der_contents(tlv.value)?),
            None => None,
        };

        let mut encap = ad.read_sequence()?;
        let content_type = encap.read_oid()?.to_vec();
        let content = match encap.try_read_context_specific(0, true)? {
            Some(tlv) => {
                let mut inner = Decoder::new(tlv.value);
                let node = inner.read_tlv()?;
                if !node.tag.is_universal(0x04) {
                    return Err(CmsError::Malformed("expected eContent octets"));
                }
                super::collect_octets(node.tag, node.value)?
            }
            None => Vec::new(),
        };

        let (auth_attrs, auth_attrs_contents) = match ad.try_read_context_specific(2, true)? {
            Some(tlv) => (
                AttributeSet::from_set_contents(tlv.value)?,
                Some(tlv.value.to_vec()),
            ),
            None => (AttributeSet::default(), None),
        };
        let mac_value = ad.read_octet_string()?.to_vec();
        let unauth_attrs = match ad.try_read_context_specific(3, true)? {
            Some(tlv) => AttributeSet::from_set_contents(tlv.value)?,
            None => AttributeSet::default(),
        };

        Ok(Self {
            version,
            store,
            mac_algorithm,
            digest_algorithm,
            content_type,
            content,
            auth_attrs_contents,
            auth_attrs,
            mac_value,
            unauth_attrs,
        })
    }

    pub fn recipients(&mut self) -> &mut RecipientInformationStore {
        &mut self.store
    }

    /// Resolve the MAC key, verify the message, and return the content.
    pub fn verify(
        &mut self,
        id: &RecipientId,
        recipient: &dyn Recipient,
    ) -> Result<Vec<u8>, CmsError> {
        let key = self.store.resolve(id, recipient)?;
        let mac_alg = registry().mac_by_oid(&self.mac_algorithm.oid)?;
        match (&self.digest_algorithm, &self.auth_attrs_contents) {
            (None, None) => {
                if self.content_type != known::PKCS7_DATA {
                    return Err(CmsError::MissingAuthAttrs);
                }
                let mut mac = MacCalculator::new(mac_alg, key.as_bytes())?;
                mac.update(&self.content);
                if !bool::from(mac.finish().ct_eq(&self.mac_value)) {
                    return Err(CmsError::AuthenticationFailed);
                }
            }
            (None, Some(_)) => {
                return Err(CmsError::Malformed(
                    "authenticated attributes without digest algorithm",
                ))
            }
            (Some(_), None) => return Err(CmsError::MissingAuthAttrs),
            (Some(digest_alg), Some(contents)) => {
                let mut digest =
                    DigestCalculator::new(registry().digest_by_oid(&digest_alg.oid)?);
                digest.update(&self.content);
                let digest = digest.finish();
                let md_attr = self
                    .auth_attrs
                    .find(known::ATTR_MESSAGE_DIGEST)
                    .and_then(|a| a.first_octet_string())
                    .ok_or(CmsError::MissingAuthAttrs)?;
                if !bool::from(digest.ct_eq(md_attr)) {
                    return Err(CmsError::AuthenticationFailed);
                }
                let ct_attr = self
                    .auth_attrs
                    .find(known::ATTR_CONTENT_TYPE)
                    .ok_or(CmsError::MissingAuthAttrs)?;
                let mut enc = Encoder::new();
                enc.write_oid(&self.content_type);
                if ct_attr.values.first().map(Vec::as_slice) != Some(enc.finish().as_slice()) {
                    return Err(CmsError::AuthenticationFailed);
                }
                let mut input = Encoder::new();
                input.write_tlv(tags::SET, contents);
                let mut mac = MacCalculator::new(mac_alg, key.as_bytes())?;
                mac.update(&input.finish());
                if !bool::from(mac.finish().ct_eq(&self.mac_value)) {
                    return Err(CmsError::AuthenticationFailed);
                }
            }
        }
        Ok(self.content.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attr::Attribute;
    use crate::generate::AuthenticatedDataGenerator;
    use crate::recipient::{KekGenerator, KekRecipient, RecipientInfoGenerator};
    use sealwire_types::{DigestAlgId, MacAlgId};

    const KEK: [u8; 16] = [0x61; 16];

    fn generator(digest: bool) -> AuthenticatedDataGenerator {
        let mut gen = AuthenticatedDataGenerator::new(MacAlgId::HmacSha256);
        gen.add_recipient(RecipientInfoGenerator::Kek(
            KekGenerator::new(b"auth-kek", &KEK).unwrap(),
        ));
        if digest {
            gen.set_digest_algorithm(DigestAlgId::Sha256);
        }
        gen
    }

    fn id() -> RecipientId {
        RecipientId::KekId(b"auth-kek".to_vec())
    }

    #[test]
    fn direct_mode_streaming_roundtrip() {
        let der = generator(false)
            .authenticate_to_vec(known::PKCS7_DATA, b"macced content")
            .unwrap();
        let mut parser = AuthenticatedDataParser::new(der.as_slice()).unwrap();
        assert_eq!(parser.version(), 0);
        assert!(parser.digest_algorithm().is_none());

        let recipient = KekRecipient::new(&KEK);
        let mut reader = parser.content_reader(&id(), &recipient).unwrap();
        let mut content = Vec::new();
        reader.read_to_end(&mut content).unwrap();
        assert_eq!(content, b"macced content");
        parser.verify().unwrap();
    }

    #[test]
    fn digest_mode_covers_attrs() {
        let der = generator(true)
            .authenticate_to_vec(known::PKCS7_DATA, b"attr content")
            .unwrap();
        let mut parser = AuthenticatedDataParser::new(der.as_slice()).unwrap();
        assert!(parser.digest_algorithm().is_some());

        let recipient = KekRecipient::new(&KEK);
        let mut reader = parser.content_reader(&id(), &recipient).unwrap();
        let mut content = Vec::new();
        reader.read_to_end(&mut content).unwrap();
        assert_eq!(content, b"attr content");
        parser.verify().unwrap();
        assert!(parser
            .auth_attrs()
            .unwrap()
            .find(known::ATTR_MESSAGE_DIGEST)
            .is_some());
    }

    #[test]
    fn extra_auth_attrs_roundtrip() {
        // 2.5.4.3 with a short UTF8String value.
        let extra_oid: &[u8] = &[0x55, 0x04, 0x03];
        let mut gen = generator(true);
        gen.add_auth_attr(Attribute::new(extra_oid, vec![0x0C, 0x02, b'h', b'i']));
        let der = gen
            .authenticate_to_vec(known::PKCS7_DATA, b"attr content")
            .unwrap();

        let mut parser = AuthenticatedDataParser::new(der.as_slice()).unwrap();
        let recipient = KekRecipient::new(&KEK);
        let mut reader = parser.content_reader(&id(), &recipient).unwrap();
        let mut content = Vec::new();
        reader.read_to_end(&mut content).unwrap();
        parser.verify().unwrap();
        assert!(parser.auth_attrs().unwrap().find(extra_oid).is_some());

        let mut msg = CmsAuthenticatedData::from_ber(&der).unwrap();
        let content = msg.verify(&id(), &KekRecipient::new(&KEK)).unwrap();
        assert_eq!(content, b"attr content");
        assert!(msg.auth_attrs.find(extra_oid).is_some());
    }

    #[test]
    fn verify_before_content_is_sequencing_error() {
        let der = generator(false)
            .authenticate_to_vec(known::PKCS7_DATA, b"x")
            .unwrap();
        let mut parser = AuthenticatedDataParser::new(der.as_slice()).unwrap();
        assert!(matches!(parser.verify(), Err(CmsError::Sequencing(_))));
    }

    #[test]
    fn tampered_content_fails_verification() {
        let mut der = generator(true)
            .authenticate_to_vec(known::PKCS7_DATA, b"some longer content here")
            .unwrap();
        // The content is in the clear; flip one byte of it.
        let needle = b"longer";
        let pos = der
            .windows(needle.len())
            .position(|w| w == needle)
            .unwrap();
        der[pos] ^= 0x01;

        let mut msg = CmsAuthenticatedData::from_ber(&der).unwrap();
        assert!(matches!(
            msg.verify(&id(), &KekRecipient::new(&KEK)),
            Err(CmsError::AuthenticationFailed)
        ));
    }

    #[test]
    fn buffered_roundtrip_both_modes() {
        for digest in [false, true] {
            let der = generator(digest)
                .authenticate_to_vec(known::PKCS7_DATA, b"buffered")
                .unwrap();
            let mut msg = CmsAuthenticatedData::from_ber(&der).unwrap();
            let content = msg.verify(&id(), &KekRecipient::new(&KEK)).unwrap();
            assert_eq!(content, b"buffered");
        }
    }
}
