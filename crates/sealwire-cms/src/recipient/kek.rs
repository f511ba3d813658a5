//! Pre-shared key-encryption key (KEK) recipients.

use sealwire_codec::unix_to_generalized_time;
use sealwire_types::CmsError;
use zeroize::Zeroizing;

use crate::info::{KekRecipientInfo, RecipientId, RecipientInfo};
use crate::key::ContentEncryptionKey;
use crate::registry::registry;

use super::{
    unwrap_key, wrap_algorithm_identifier, wrap_key, wrap_oid_for_kek, Recipient, RecipientKind,
};

/// Produces a KEKRecipientInfo from a pre-shared AES key and its
/// out-of-band agreed identifier.
pub struct KekGenerator {
    kek_id: Vec<u8>,
    date: Option<Vec<u8>>,
    kek: Zeroizing<Vec<u8>>,
}

impl KekGenerator {
    pub fn new(kek_id: &[u8], kek: &[u8]) -> Result<Self, CmsError> {
        // Validate the KEK length up front so generate cannot fail on it.
        wrap_oid_for_kek(kek.len())?;
        Ok(Self {
            kek_id: kek_id.to_vec(),
            date: None,
            kek: Zeroizing::new(kek.to_vec()),
        })
    }

    /// Attach the optional key date (UNIX timestamp, encoded as
    /// GeneralizedTime).
    pub fn set_date(&mut self, timestamp: i64) -> &mut Self {
        self.date = Some(unix_to_generalized_time(timestamp).into_bytes());
        self
    }

    pub(crate) fn generate(&self, cek: &ContentEncryptionKey) -> Result<RecipientInfo, CmsError> {
        let wrap_oid = wrap_oid_for_kek(self.kek.len())?;
        let encrypted_key = wrap_key(&self.kek, cek.as_bytes())?;
        Ok(RecipientInfo::Kek(KekRecipientInfo {
            version: 4,
            kek_id: self.kek_id.clone(),
            date: self.date.clone(),
            key_encryption_algorithm: wrap_algorithm_identifier(wrap_oid),
            encrypted_key,
        }))
    }
}

/// Pre-shared KEK credential.
pub struct KekRecipient {
    kek: Zeroizing<Vec<u8>>,
}

impl KekRecipient {
    pub fn new(kek: &[u8]) -> Self {
        Self {
            kek: Zeroizing::new(kek.to_vec()),
        }
    }
}

impl Recipient for KekRecipient {
    fn kind(&self) -> RecipientKind {
        RecipientKind::Kek
    }

    fn unwrap_cek(
        &self,
        info: &RecipientInfo,
        _id: &RecipientId,
    ) -> Result<ContentEncryptionKey, CmsError> {
        let RecipientInfo::Kek(kekri) = info else {
            return Err(CmsError::RecipientKindMismatch);
        };
        let wrap = registry().wrap_by_oid(&kekri.key_encryption_algorithm.oid)?;
        if wrap.key_bits() != self.kek.len() * 8 {
            return Err(CmsError::InvalidKeyLength {
                expected: wrap.key_bits(),
                got: self.kek.len() * 8,
            });
        }
        let cek = unwrap_key(&self.kek, &kekri.encrypted_key)?;
        Ok(ContentEncryptionKey::from_bytes(&cek))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_with_date() {
        let mut gen = KekGenerator::new(b"backup-key-7", &[0x0A; 24]).unwrap();
        gen.set_date(1_767_225_600); // 2026-01-01
        let cek = ContentEncryptionKey::from_bytes(&[0x5C; 32]);
        let info = gen.generate(&cek).unwrap();

        if let RecipientInfo::Kek(k) = &info {
            assert_eq!(k.version, 4);
            assert_eq!(k.date.as_deref(), Some(b"20260101000000Z".as_slice()));
        } else {
            panic!("wrong variant");
        }

        let recipient = KekRecipient::new(&[0x0A; 24]);
        let got = recipient
            .unwrap_cek(&info, &RecipientId::KekId(b"backup-key-7".to_vec()))
            .unwrap();
        assert_eq!(got.as_bytes(), cek.as_bytes());
    }

    #[test]
    fn bad_kek_length_rejected_at_construction() {
        assert!(KekGenerator::new(b"id", &[0; 17]).is_err());
    }

    #[test]
    fn mismatched_kek_size_for_record() {
        let gen = KekGenerator::new(b"id", &[0x0A; 32]).unwrap();
        let cek = ContentEncryptionKey::from_bytes(&[1; 16]);
        let info = gen.generate(&cek).unwrap();
        let short = KekRecipient::new(&[0x0A; 16]);
        assert!(matches!(
            short.unwrap_cek(&info, &RecipientId::KekId(b"id".to_vec())),
            Err(CmsError::InvalidKeyLength { .. })
        ));
    }
}
