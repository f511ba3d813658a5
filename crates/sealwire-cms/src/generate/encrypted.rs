//! EncryptedData generator (RFC 5652 section 8).
//!
//! No recipient records: the content-encryption key is managed out of
//! band. The message is small enough in practice that this generator
//! produces definite-length DER in one piece.

use sealwire_codec::oid::known;
use sealwire_codec::Encoder;
use sealwire_types::{CmsError, ContentAlgId};

use crate::attr::AttributeSet;
use crate::content::{ContentEncryptor, StreamTransform};
use crate::key::ContentEncryptionKey;
use crate::version::encrypted_data_version;

/// Builds EncryptedData messages under a caller-supplied key.
#[derive(Default)]
pub struct EncryptedDataGenerator {
    unprotected_attrs: AttributeSet,
}

impl EncryptedDataGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unprotected_attrs(&mut self, attrs: AttributeSet) -> &mut Self {
        self.unprotected_attrs = attrs;
        self
    }

    /// Encrypt `content` with a fresh random IV.
    pub fn encrypt_to_vec(
        &self,
        content_type: &[u8],
        alg: ContentAlgId,
        key: &ContentEncryptionKey,
        content: &[u8],
    ) -> Result<Vec<u8>, CmsError> {
        self.build(content_type, ContentEncryptor::new(alg, key)?, content)
    }

    /// Encrypt with a caller-supplied IV (deterministic path).
    pub fn encrypt_to_vec_with_iv(
        &self,
        content_type: &[u8],
        alg: ContentAlgId,
        key: &ContentEncryptionKey,
        iv: &[u8],
        content: &[u8],
    ) -> Result<Vec<u8>, CmsError> {
        self.build(content_type, ContentEncryptor::with_iv(alg, key, iv)?, content)
    }

    fn build(
        &self,
        content_type: &[u8],
        mut encryptor: ContentEncryptor,
        content: &[u8],
    ) -> Result<Vec<u8>, CmsError> {
        let mut ciphertext = Vec::with_capacity(content.len() + 32);
        encryptor.update(content, &mut ciphertext)?;
        encryptor.finish(&mut ciphertext)?;

        // EncryptedContentInfo with [0] IMPLICIT primitive encryptedContent.
        let mut eci = Encoder::new();
        eci.write_oid(content_type);
        eci.write_raw(&encryptor.algorithm_identifier().to_der());
        eci.write_context_specific(0, false, &ciphertext);

        let mut body = Encoder::new();
        body.write_integer_u32(encrypted_data_version(!self.unprotected_attrs.is_empty()));
        body.write_sequence(&eci.finish());
        if !self.unprotected_attrs.is_empty() {
            body.write_raw(&self.unprotected_attrs.to_implicit_der(1));
        }
        let mut ed = Encoder::new();
        ed.write_sequence(&body.finish());

        let mut ci = Encoder::new();
        ci.write_oid(known::ENCRYPTED_DATA);
        ci.write_context_specific(0, true, &ed.finish());
        let mut out = Encoder::new();
        out.write_sequence(&ci.finish());
        Ok(out.finish())
    }
}
