//! Key transport: the CEK encrypted directly under an RSA public key.

use rand_core::OsRng;
use rsa::{Oaep, Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};
use sealwire_codec::oid::known;
use sealwire_codec::Encoder;
use sealwire_types::CmsError;
use sha2::Sha256;

use crate::algid::AlgorithmIdentifier;
use crate::info::{KeyTransRecipientInfo, RecipientId, RecipientIdentifier, RecipientInfo};
use crate::key::ContentEncryptionKey;

use super::{Recipient, RecipientKind};

/// RSA padding scheme for the wrapped CEK.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportPadding {
    /// RSAES-OAEP with SHA-256 (default).
    Oaep,
    /// RSAES-PKCS1-v1_5, for interop with legacy peers.
    Pkcs1v15,
}

/// RSAES-OAEP-params for SHA-256 and MGF1-SHA-256.
fn oaep_sha256_params() -> Vec<u8> {
    let sha256 = AlgorithmIdentifier::with_null_params(known::SHA256).to_der();

    let mut mgf_inner = Encoder::new();
    mgf_inner.write_oid(known::MGF1);
    mgf_inner.write_raw(&sha256);
    let mut mgf = Encoder::new();
    mgf.write_sequence(&mgf_inner.finish());

    let mut params = Encoder::new();
    params.write_context_specific(0, true, &sha256);
    params.write_context_specific(1, true, &mgf.finish());

    let mut seq = Encoder::new();
    seq.write_sequence(&params.finish());
    seq.finish()
}

/// Produces a KeyTransRecipientInfo for one RSA recipient.
pub struct KeyTransGenerator {
    rid: RecipientIdentifier,
    public_key: RsaPublicKey,
    padding: TransportPadding,
}

impl KeyTransGenerator {
    pub fn new(rid: RecipientIdentifier, public_key: RsaPublicKey) -> Self {
        Self {
            rid,
            public_key,
            padding: TransportPadding::Oaep,
        }
    }

    pub fn with_padding(mut self, padding: TransportPadding) -> Self {
        self.padding = padding;
        self
    }

    pub(crate) fn generate(&self, cek: &ContentEncryptionKey) -> Result<RecipientInfo, CmsError> {
        let mut rng = OsRng;
        let (encrypted_key, key_encryption_algorithm) = match self.padding {
            TransportPadding::Oaep => (
                self.public_key
                    .encrypt(&mut rng, Oaep::new::<Sha256>(), cek.as_bytes())
                    .map_err(CmsError::op_failed)?,
                AlgorithmIdentifier::with_params(known::RSAES_OAEP, oaep_sha256_params()),
            ),
            TransportPadding::Pkcs1v15 => (
                self.public_key
                    .encrypt(&mut rng, Pkcs1v15Encrypt, cek.as_bytes())
                    .map_err(CmsError::op_failed)?,
                AlgorithmIdentifier::with_null_params(known::RSA_ENCRYPTION),
            ),
        };
        Ok(RecipientInfo::KeyTrans(KeyTransRecipientInfo {
            version: self.rid.ktri_version(),
            rid: self.rid.clone(),
            key_encryption_algorithm,
            encrypted_key,
        }))
    }
}

/// RSA private key credential for key-transport records.
pub struct TransportRecipient {
    private_key: RsaPrivateKey,
}

impl TransportRecipient {
    pub fn new(private_key: RsaPrivateKey) -> Self {
        Self { private_key }
    }
}

impl Recipient for TransportRecipient {
    fn kind(&self) -> RecipientKind {
        RecipientKind::Transport
    }

    fn unwrap_cek(
        &self,
        info: &RecipientInfo,
        _id: &RecipientId,
    ) -> Result<ContentEncryptionKey, CmsError> {
        let RecipientInfo::KeyTrans(ktri) = info else {
            return Err(CmsError::RecipientKindMismatch);
        };
        // Failure is deliberately opaque: padding errors and wrong-key
        // errors produce the same result.
        let cek = if ktri.key_encryption_algorithm.oid_is(known::RSAES_OAEP) {
            self.private_key
                .decrypt(Oaep::new::<Sha256>(), &ktri.encrypted_key)
        } else if ktri
            .key_encryption_algorithm
            .oid_is(known::RSA_ENCRYPTION)
        {
            self.private_key
                .decrypt(Pkcs1v15Encrypt, &ktri.encrypted_key)
        } else {
            let name = sealwire_codec::oid::Oid::from_der_value(&ktri.key_encryption_algorithm.oid)
                .map(|o| o.to_dot_string())
                .unwrap_or_else(|_| "<invalid oid>".to_string());
            return Err(CmsError::UnsupportedAlgorithm(name));
        };
        let cek = cek.map_err(|_| CmsError::op_failed_opaque())?;
        Ok(ContentEncryptionKey::from_bytes(&cek))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oaep_params_shape() {
        let params = oaep_sha256_params();
        // SEQUENCE { [0] { ... }, [1] { ... } }
        assert_eq!(params[0], 0x30);
        let mut dec = sealwire_codec::Decoder::new(&params);
        let mut seq = dec.read_sequence().unwrap();
        assert!(seq.read_context_specific(0, true).is_ok());
        assert!(seq.read_context_specific(1, true).is_ok());
        assert!(seq.is_empty());
    }
}
