//! Streaming EnvelopedData generator (RFC 5652 section 6).

use std::io::{self, Write};

use sealwire_codec::ber::BerWriter;
use sealwire_codec::oid::known;
use sealwire_codec::{tags, Encoder};
use sealwire_types::{CmsError, ContentAlgId};

use crate::attr::AttributeSet;
use crate::content::{ContentEncryptor, StreamTransform};
use crate::info::RecipientInfo;
use crate::key::ContentEncryptionKey;
use crate::recipient::RecipientInfoGenerator;
use crate::version::enveloped_data_version;

use super::{flush_chunks, io_error};

/// Builds EnvelopedData messages for a configured set of recipients.
///
/// The generator is reusable: each [`open`](Self::open) draws a fresh CEK,
/// protects it once per recipient in insertion order, and returns a
/// writer over the sink. The encrypted content is emitted as it is
/// written, so content never has to fit in memory.
pub struct EnvelopedDataGenerator {
    recipients: Vec<RecipientInfoGenerator>,
    originator_certs: Vec<Vec<u8>>,
    unprotected_attrs: AttributeSet,
}

impl Default for EnvelopedDataGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl EnvelopedDataGenerator {
    pub fn new() -> Self {
        Self {
            recipients: Vec::new(),
            originator_certs: Vec::new(),
            unprotected_attrs: AttributeSet::default(),
        }
    }

    pub fn add_recipient(&mut self, generator: RecipientInfoGenerator) -> &mut Self {
        self.recipients.push(generator);
        self
    }

    /// Attach an originator certificate (a complete DER Certificate).
    pub fn add_originator_cert(&mut self, cert_der: Vec<u8>) -> &mut Self {
        self.originator_certs.push(cert_der);
        self
    }

    pub fn set_unprotected_attrs(&mut self, attrs: AttributeSet) -> &mut Self {
        self.unprotected_attrs = attrs;
        self
    }

    /// Open a message with a freshly generated CEK.
    pub fn open<W: Write>(
        &self,
        sink: W,
        content_type: &[u8],
        alg: ContentAlgId,
    ) -> Result<EnvelopedDataWriter<W>, CmsError> {
        let cek = ContentEncryptionKey::generate(alg.key_bits() / 8)?;
        let encryptor = ContentEncryptor::new(alg, &cek)?;
        self.open_with(sink, content_type, encryptor, &cek)
    }

    /// Open a message with a caller-supplied encryptor and matching CEK.
    /// The deterministic path: fixing the CEK and IV fixes the output.
    pub fn open_with<W: Write>(
        &self,
        sink: W,
        content_type: &[u8],
        encryptor: ContentEncryptor,
        cek: &ContentEncryptionKey,
    ) -> Result<EnvelopedDataWriter<W>, CmsError> {
        if self.recipients.is_empty() {
            return Err(CmsError::Sequencing("no recipients configured"));
        }
        let infos = self
            .recipients
            .iter()
            .map(|g| g.generate(cek))
            .collect::<Result<Vec<RecipientInfo>, CmsError>>()?;
        let version = enveloped_data_version(
            !self.originator_certs.is_empty(),
            !self.unprotected_attrs.is_empty(),
            &infos,
        );

        let mut w = BerWriter::new(sink);
        w.begin(tags::SEQUENCE)?; // ContentInfo
        w.write_tlv(tags::OID, known::ENVELOPED_DATA)?;
        w.begin(0xA0)?; // content [0] EXPLICIT
        w.begin(tags::SEQUENCE)?; // EnvelopedData

        let mut enc = Encoder::new();
        enc.write_integer_u32(version);
        if !self.originator_certs.is_empty() {
            // OriginatorInfo, certs only: [0] IMPLICIT { certs [0] IMPLICIT SET }
            let mut certs = Vec::new();
            for c in &self.originator_certs {
                certs.extend_from_slice(c);
            }
            let mut inner = Encoder::new();
            inner.write_context_specific(0, true, &certs);
            enc.write_context_specific(0, true, &inner.finish());
        }
        let mut ris = Vec::new();
        for info in &infos {
            ris.extend_from_slice(&info.to_der());
        }
        enc.write_tlv(tags::SET, &ris);
        w.write_der(&enc.finish())?;

        w.begin(tags::SEQUENCE)?; // EncryptedContentInfo
        w.write_tlv(tags::OID, content_type)?;
        w.write_der(&encryptor.algorithm_identifier().to_der())?;
        w.begin(0xA0)?; // encryptedContent [0], chunked

        Ok(EnvelopedDataWriter {
            w,
            encryptor,
            pending: Vec::new(),
            unprotected_attrs: self.unprotected_attrs.clone(),
            closed: false,
        })
    }

    /// One-shot convenience over [`open`](Self::open).
    pub fn encrypt_to_vec(
        &self,
        content_type: &[u8],
        alg: ContentAlgId,
        content: &[u8],
    ) -> Result<Vec<u8>, CmsError> {
        let mut writer = self.open(Vec::new(), content_type, alg)?;
        writer.write_all(content).map_err(CmsError::Io)?;
        writer.close()
    }
}

/// The content half of an open EnvelopedData message.
///
/// Ciphertext is framed as fixed-size OCTET STRING chunks regardless of
/// how the caller slices writes, so the encoding depends only on the
/// content bytes. Dropping the writer without [`close`](Self::close)
/// leaves the message truncated.
pub struct EnvelopedDataWriter<W: Write> {
    w: BerWriter<W>,
    encryptor: ContentEncryptor,
    pending: Vec<u8>,
    unprotected_attrs: AttributeSet,
    closed: bool,
}

impl<W: Write> EnvelopedDataWriter<W> {
    /// Feed associated data to an AEAD content algorithm. Must precede
    /// all content writes.
    pub fn aad_update(&mut self, aad: &[u8]) -> Result<(), CmsError> {
        self.encryptor.aad_update(aad)
    }

    /// Finalize the cipher, emit the remaining chunks and close every
    /// open level. Returns the sink.
    pub fn close(mut self) -> Result<W, CmsError> {
        self.closed = true;
        self.encryptor.finish(&mut self.pending)?;
        flush_chunks(&mut self.w, &mut self.pending, true)?;
        self.w.end()?; // encryptedContent [0]
        self.w.end()?; // EncryptedContentInfo
        if !self.unprotected_attrs.is_empty() {
            self.w.write_der(&self.unprotected_attrs.to_implicit_der(1))?;
        }
        self.w.end()?; // EnvelopedData
        self.w.end()?; // content [0]
        self.w.end()?; // ContentInfo
        self.w.flush()?;
        Ok(self.w.into_inner()?)
    }
}

impl<W: Write> Write for EnvelopedDataWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.closed {
            return Err(io_error(CmsError::Sequencing("writer already closed")));
        }
        self.encryptor
            .update(buf, &mut self.pending)
            .map_err(io_error)?;
        flush_chunks(&mut self.w, &mut self.pending, false).map_err(io_error)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.w.flush().map_err(|e| io_error(CmsError::Codec(e)))
    }
}
