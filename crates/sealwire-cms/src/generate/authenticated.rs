//! Streaming AuthenticatedData generator (RFC 5652 section 9).

use std::io::{self, Write};

use sealwire_codec::ber::BerWriter;
use sealwire_codec::oid::known;
use sealwire_codec::{tags, Encoder};
use sealwire_types::{CmsError, DigestAlgId, MacAlgId};

use crate::attr::{Attribute, AttributeSet};
use crate::content::{DigestCalculator, MacCalculator};
use crate::info::RecipientInfo;
use crate::key::ContentEncryptionKey;
use crate::recipient::RecipientInfoGenerator;
use crate::version::AUTHENTICATED_DATA_VERSION;

use super::{flush_chunks, io_error};

/// Builds AuthenticatedData messages.
///
/// Without a digest algorithm the MAC covers the content octets directly
/// and no authenticated attributes may be present. With one, the content
/// is digested, content-type and message-digest attributes are
/// synthesized, and the MAC covers the DER SET of attributes.
pub struct AuthenticatedDataGenerator {
    recipients: Vec<RecipientInfoGenerator>,
    mac_alg: MacAlgId,
    digest_alg: Option<DigestAlgId>,
    extra_auth_attrs: AttributeSet,
    unauth_attrs: AttributeSet,
}

impl AuthenticatedDataGenerator {
    pub fn new(mac_alg: MacAlgId) -> Self {
        Self {
            recipients: Vec::new(),
            mac_alg,
            digest_alg: None,
            extra_auth_attrs: AttributeSet::default(),
            unauth_attrs: AttributeSet::default(),
        }
    }

    pub fn add_recipient(&mut self, generator: RecipientInfoGenerator) -> &mut Self {
        self.recipients.push(generator);
        self
    }

    /// Switch to attribute mode: digest the content and MAC the
    /// authenticated attributes instead of the raw content.
    pub fn set_digest_algorithm(&mut self, alg: DigestAlgId) -> &mut Self {
        self.digest_alg = Some(alg);
        self
    }

    /// Additional authenticated attributes, emitted together with the two
    /// synthesized ones in canonical SET order. Requires a digest
    /// algorithm.
    pub fn add_auth_attr(&mut self, attr: Attribute) -> &mut Self {
        self.extra_auth_attrs.push(attr);
        self
    }

    pub fn set_unauth_attrs(&mut self, attrs: AttributeSet) -> &mut Self {
        self.unauth_attrs = attrs;
        self
    }

    /// Open a message with a freshly generated MAC key.
    pub fn open<W: Write>(
        &self,
        sink: W,
        content_type: &[u8],
    ) -> Result<AuthenticatedDataWriter<W>, CmsError> {
        let key = ContentEncryptionKey::generate(self.mac_alg.output_len())?;
        self.open_with_key(sink, content_type, &key)
    }

    /// Open a message with a caller-supplied MAC key.
    pub fn open_with_key<W: Write>(
        &self,
        sink: W,
        content_type: &[u8],
        key: &ContentEncryptionKey,
    ) -> Result<AuthenticatedDataWriter<W>, CmsError> {
        if self.recipients.is_empty() {
            return Err(CmsError::Sequencing("no recipients configured"));
        }
        if self.digest_alg.is_none() {
            if !self.extra_auth_attrs.is_empty() {
                return Err(CmsError::Sequencing(
                    "authenticated attributes require a digest algorithm",
                ));
            }
            if content_type != known::PKCS7_DATA {
                // Non-data content demands the content-type attribute,
                // which only exists in attribute mode.
                return Err(CmsError::MissingAuthAttrs);
            }
        }
        let infos = self
            .recipients
            .iter()
            .map(|g| g.generate(key))
            .collect::<Result<Vec<RecipientInfo>, CmsError>>()?;
        let mac = MacCalculator::new(self.mac_alg, key.as_bytes())?;

        let mut w = BerWriter::new(sink);
        w.begin(tags::SEQUENCE)?; // ContentInfo
        w.write_tlv(tags::OID, known::CT_AUTH_DATA)?;
        w.begin(0xA0)?; // content [0] EXPLICIT
        w.begin(tags::SEQUENCE)?; // AuthenticatedData

        let mut enc = Encoder::new();
        enc.write_integer_u32(AUTHENTICATED_DATA_VERSION);
        let mut ris = Vec::new();
        for info in &infos {
            ris.extend_from_slice(&info.to_der());
        }
        enc.write_tlv(tags::SET, &ris);
        enc.write_raw(&mac.algorithm_identifier().to_der());
        if let Some(alg) = self.digest_alg {
            let contents = DigestCalculator::new(alg)
                .algorithm_identifier()
                .to_der_contents();
            enc.write_context_specific(1, true, &contents);
        }
        w.write_der(&enc.finish())?;

        w.begin(tags::SEQUENCE)?; // EncapsulatedContentInfo
        w.write_tlv(tags::OID, content_type)?;
        w.begin(0xA0)?; // eContent [0] EXPLICIT
        w.begin(tags::OCTET_STRING | tags::CONSTRUCTED)?; // chunked OCTET STRING

        let tee = match self.digest_alg {
            Some(alg) => Tee::Digest(DigestCalculator::new(alg)),
            None => Tee::Direct(mac),
        };
        Ok(AuthenticatedDataWriter {
            w,
            tee,
            mac_alg: self.mac_alg,
            mac_key: key.clone(),
            content_type: content_type.to_vec(),
            extra_auth_attrs: self.extra_auth_attrs.clone(),
            unauth_attrs: self.unauth_attrs.clone(),
            pending: Vec::new(),
            closed: false,
        })
    }

    /// One-shot convenience over [`open`](Self::open).
    pub fn authenticate_to_vec(
        &self,
        content_type: &[u8],
        content: &[u8],
    ) -> Result<Vec<u8>, CmsError> {
        let mut writer = self.open(Vec::new(), content_type)?;
        writer.write_all(content).map_err(CmsError::Io)?;
        writer.close()
    }
}

enum Tee {
    /// MAC runs over the content octets.
    Direct(MacCalculator),
    /// Digest runs over the content; the MAC is computed over the
    /// authenticated attributes at close.
    Digest(DigestCalculator),
}

/// The content half of an open AuthenticatedData message.
///
/// Content passes through in the clear, framed as fixed-size OCTET STRING
/// chunks, while the MAC (or digest) absorbs the same bytes.
pub struct AuthenticatedDataWriter<W: Write> {
    w: BerWriter<W>,
    tee: Tee,
    mac_alg: MacAlgId,
    mac_key: ContentEncryptionKey,
    content_type: Vec<u8>,
    extra_auth_attrs: AttributeSet,
    unauth_attrs: AttributeSet,
    pending: Vec<u8>,
    closed: bool,
}

impl<W: Write> AuthenticatedDataWriter<W> {
    /// Emit the remaining chunks, the authenticated attributes (attribute
    /// mode), the MAC, and close every open level. Returns the sink.
    pub fn close(mut self) -> Result<W, CmsError> {
        self.closed = true;
        flush_chunks(&mut self.w, &mut self.pending, true)?;
        self.w.end()?; // OCTET STRING
        self.w.end()?; // eContent [0]
        self.w.end()?; // EncapsulatedContentInfo

        let mac_value = match self.tee {
            Tee::Direct(mac) => mac.finish(),
            Tee::Digest(digest) => {
                let mut attrs = AttributeSet::default();
                attrs.push(Attribute::content_type(&self.content_type));
                attrs.push(Attribute::message_digest(&digest.finish()));
                for a in self.extra_auth_attrs.iter() {
                    attrs.push(a.clone());
                }
                // Wire bytes and MAC input share the canonical SET order.
                self.w.write_der(&attrs.to_implicit_der_sorted(2))?;
                let mut mac = MacCalculator::new(self.mac_alg, self.mac_key.as_bytes())?;
                mac.update(&attrs.to_der_set());
                mac.finish()
            }
        };
        let mut enc = Encoder::new();
        enc.write_octet_string(&mac_value);
        self.w.write_der(&enc.finish())?;
        if !self.unauth_attrs.is_empty() {
            self.w.write_der(&self.unauth_attrs.to_implicit_der(3))?;
        }
        self.w.end()?; // AuthenticatedData
        self.w.end()?; // content [0]
        self.w.end()?; // ContentInfo
        self.w.flush()?;
        Ok(self.w.into_inner()?)
    }
}

impl<W: Write> Write for AuthenticatedDataWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.closed {
            return Err(io_error(CmsError::Sequencing("writer already closed")));
        }
        match &mut self.tee {
            Tee::Direct(mac) => mac.update(buf),
            Tee::Digest(digest) => digest.update(buf),
        }
        self.pending.extend_from_slice(buf);
        flush_chunks(&mut self.w, &mut self.pending, false).map_err(io_error)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.w.flush().map_err(|e| io_error(CmsError::Codec(e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipient::KekGenerator;

    fn kek_generator() -> RecipientInfoGenerator {
        RecipientInfoGenerator::Kek(KekGenerator::new(b"unit-kek", &[0x55; 16]).unwrap())
    }

    #[test]
    fn header_frames_auth_data() {
        let mut gen = AuthenticatedDataGenerator::new(MacAlgId::HmacSha256);
        gen.add_recipient(kek_generator());
        let der = gen
            .authenticate_to_vec(known::PKCS7_DATA, b"plain content")
            .unwrap();
        assert_eq!(&der[..2], &[0x30, 0x80]);
        assert_eq!(der[2], 0x06);
        assert_eq!(&der[4..4 + der[3] as usize], known::CT_AUTH_DATA);
    }

    #[test]
    fn non_data_content_requires_digest_mode() {
        let mut gen = AuthenticatedDataGenerator::new(MacAlgId::HmacSha256);
        gen.add_recipient(kek_generator());
        assert!(matches!(
            gen.open(Vec::new(), known::ENVELOPED_DATA),
            Err(CmsError::MissingAuthAttrs)
        ));
        gen.set_digest_algorithm(DigestAlgId::Sha256);
        assert!(gen.open(Vec::new(), known::ENVELOPED_DATA).is_ok());
    }

    #[test]
    fn extra_attrs_without_digest_are_rejected() {
        let mut gen = AuthenticatedDataGenerator::new(MacAlgId::HmacSha256);
        gen.add_recipient(kek_generator());
        gen.add_auth_attr(Attribute::new(known::ATTR_CONTENT_TYPE, vec![0x05, 0x00]));
        assert!(matches!(
            gen.open(Vec::new(), known::PKCS7_DATA),
            Err(CmsError::Sequencing(_))
        ));
    }

    #[test]
    fn deterministic_for_fixed_key() {
        let mut gen = AuthenticatedDataGenerator::new(MacAlgId::HmacSha256);
        gen.add_recipient(kek_generator());
        gen.set_digest_algorithm(DigestAlgId::Sha256);
        let key = ContentEncryptionKey::from_bytes(&[0x13; 32]);

        let run = |input: &[&[u8]]| {
            let mut w = gen
                .open_with_key(Vec::new(), known::PKCS7_DATA, &key)
                .unwrap();
            for part in input {
                w.write_all(part).unwrap();
            }
            w.close().unwrap()
        };
        let a = run(&[b"split ", b"content"]);
        let b = run(&[b"split content"]);
        assert_eq!(a, b);
    }
}
