//! Buffered EncryptedData parser.

use sealwire_codec::ber::BerReader;
use sealwire_codec::oid::known;
use sealwire_codec::Decoder;
use sealwire_types::CmsError;

use crate::algid::AlgorithmIdentifier;
use crate::attr::AttributeSet;
use crate::content::{ContentDecryptor, StreamTransform};
use crate::key::ContentEncryptionKey;

use super::integer_from_bytes;

/// A fully buffered EncryptedData message. The key is managed out of
/// band, so decryption takes it directly.
pub struct CmsEncryptedData {
    pub version: u32,
    pub content_type: Vec<u8>,
    pub content_algorithm: AlgorithmIdentifier,
    pub encrypted_content: Option<Vec<u8>>,
    pub unprotected_attrs: AttributeSet,
}

impl CmsEncryptedData {
    /// Parse a complete message, accepting both definite-length DER and
    /// indefinite-length BER framing.
    pub fn from_ber(data: &[u8]) -> Result<Self, CmsError> {
        let mut rd = BerReader::new(data);
        let (tag, contents) = rd.read_tlv()?;
        if !tag.is_universal(0x10) {
            return Err(CmsError::Malformed("expected ContentInfo"));
        }
        let mut dec = Decoder::new(&contents);
        if dec.read_oid()? != known::ENCRYPTED_DATA {
            return Err(CmsError::Malformed("not an encrypted-data message"));
        }
        let outer = dec.read_context_specific(0, true)?;
        let mut dec = Decoder::new(outer.value);
        let mut ed = dec.read_sequence()?;
        let version = integer_from_bytes(ed.read_integer()?)?;

        let mut eci = ed.read_sequence()?;
        let content_type = eci.read_oid()?.to_vec();
        let content_algorithm = AlgorithmIdentifier::read_from(&mut eci)?;
        let encrypted_content = if eci.is_empty() {
            None
        } else {
            let tlv = eci.read_tlv()?;
            if !tlv.tag.is_context(0) {
                return Err(CmsError::Malformed("expected encryptedContent"));
            }
            Some(super::collect_octets(tlv.tag, tlv.value)?)
        };

        let unprotected_attrs = match ed.try_read_context_specific(1, true)? {
            Some(tlv) => AttributeSet::from_set_contents(tlv.value)?,
            None => AttributeSet::default(),
        };

        Ok(Self {
            version,
            content_type,
            content_algorithm,
            encrypted_content,
            unprotected_attrs,
        })
    }

    /// Decrypt the content with the out-of-band key.
    pub fn decrypt(&self, key: &ContentEncryptionKey) -> Result<Vec<u8>, CmsError> {
        let ciphertext = self
            .encrypted_content
            .as_deref()
            .ok_or(CmsError::Malformed("no encrypted content"))?;
        let mut decryptor = ContentDecryptor::for_algorithm(&self.content_algorithm, key)?;
        let mut plain = Vec::with_capacity(ciphertext.len());
        decryptor.update(ciphertext, &mut plain)?;
        decryptor.finish(&mut plain)?;
        Ok(plain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attr::Attribute;
    use crate::generate::EncryptedDataGenerator;
    use sealwire_types::ContentAlgId;

    #[test]
    fn roundtrip_with_attrs() {
        let key = ContentEncryptionKey::from_bytes(&[0x2F; 32]);
        let mut gen = EncryptedDataGenerator::new();
        let mut attrs = AttributeSet::default();
        attrs.push(Attribute::content_type(known::PKCS7_DATA));
        gen.set_unprotected_attrs(attrs);
        let der = gen
            .encrypt_to_vec(known::PKCS7_DATA, ContentAlgId::Aes256Gcm, &key, b"locked")
            .unwrap();

        let msg = CmsEncryptedData::from_ber(&der).unwrap();
        assert_eq!(msg.version, 2);
        assert_eq!(msg.content_type, known::PKCS7_DATA);
        assert!(!msg.unprotected_attrs.is_empty());
        assert_eq!(msg.decrypt(&key).unwrap(), b"locked");
    }

    #[test]
    fn wrong_key_fails_closed() {
        let key = ContentEncryptionKey::from_bytes(&[0x2F; 16]);
        let gen = EncryptedDataGenerator::new();
        let der = gen
            .encrypt_to_vec(known::PKCS7_DATA, ContentAlgId::Aes128Gcm, &key, b"locked")
            .unwrap();

        let msg = CmsEncryptedData::from_ber(&der).unwrap();
        let wrong = ContentEncryptionKey::from_bytes(&[0x30; 16]);
        assert!(matches!(
            msg.decrypt(&wrong),
            Err(CmsError::AuthenticationFailed)
        ));
    }
}
