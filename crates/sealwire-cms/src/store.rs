//! Recipient information store.

use sealwire_types::CmsError;

use crate::info::{RecipientId, RecipientInfo};
use crate::key::ContentEncryptionKey;
use crate::recipient::{Recipient, RecipientKind};

/// The ordered collection of recipient records parsed from (or destined
/// for) one message.
///
/// Lookup is a linear scan; the first structural match wins, matching the
/// wire order. In streaming mode the CEK can be resolved once: the second
/// attempt is a sequencing error, because the content behind it has a
/// single read position.
pub struct RecipientInformationStore {
    recipients: Vec<RecipientInfo>,
    resolved: bool,
}

impl RecipientInformationStore {
    pub fn new(recipients: Vec<RecipientInfo>) -> Self {
        Self {
            recipients,
            resolved: false,
        }
    }

    /// All records, in wire order.
    pub fn recipients(&self) -> &[RecipientInfo] {
        &self.recipients
    }

    pub fn len(&self) -> usize {
        self.recipients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recipients.is_empty()
    }

    /// First record structurally matching the identifier.
    pub fn get(&self, id: &RecipientId) -> Option<&RecipientInfo> {
        self.recipients.iter().find(|r| r.matches(id))
    }

    /// Match a record and recover the CEK with the supplied credential.
    ///
    /// Single-use: a successful resolve consumes the store's one resolve
    /// slot.
    pub fn resolve(
        &mut self,
        id: &RecipientId,
        recipient: &dyn Recipient,
    ) -> Result<ContentEncryptionKey, CmsError> {
        if self.resolved {
            return Err(CmsError::Sequencing("store already resolved"));
        }
        let info = self.get(id).ok_or(CmsError::RecipientNotFound)?;
        if RecipientKind::of(info) != recipient.kind() {
            return Err(CmsError::RecipientKindMismatch);
        }
        let cek = recipient.unwrap_cek(info, id)?;
        self.resolved = true;
        Ok(cek)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::info::{KekRecipientInfo, PasswordRecipientInfo};
    use crate::recipient::{KekGenerator, KekRecipient, PasswordRecipient};
    use crate::AlgorithmIdentifier;
    use sealwire_codec::oid::known;

    fn kek_info(id: &[u8], kek: &[u8], cek: &ContentEncryptionKey) -> RecipientInfo {
        KekGenerator::new(id, kek).unwrap().generate(cek).unwrap()
    }

    #[test]
    fn first_match_wins_in_order() {
        let cek = ContentEncryptionKey::from_bytes(&[9; 16]);
        let a = kek_info(b"same", &[0x01; 16], &cek);
        let b = kek_info(b"same", &[0x02; 16], &cek);
        let store = RecipientInformationStore::new(vec![a.clone(), b]);
        assert_eq!(store.get(&RecipientId::KekId(b"same".to_vec())), Some(&a));
    }

    #[test]
    fn resolve_is_single_use() {
        let cek = ContentEncryptionKey::from_bytes(&[9; 16]);
        let mut store =
            RecipientInformationStore::new(vec![kek_info(b"k1", &[0x01; 16], &cek)]);
        let id = RecipientId::KekId(b"k1".to_vec());
        let recipient = KekRecipient::new(&[0x01; 16]);
        assert!(store.resolve(&id, &recipient).is_ok());
        assert!(matches!(
            store.resolve(&id, &recipient),
            Err(CmsError::Sequencing(_))
        ));
    }

    #[test]
    fn failed_resolve_does_not_consume_slot() {
        let cek = ContentEncryptionKey::from_bytes(&[9; 16]);
        let mut store =
            RecipientInformationStore::new(vec![kek_info(b"k1", &[0x01; 16], &cek)]);
        let id = RecipientId::KekId(b"k1".to_vec());
        assert!(store
            .resolve(&RecipientId::KekId(b"nope".to_vec()), &KekRecipient::new(&[0x01; 16]))
            .is_err());
        assert!(store.resolve(&id, &KekRecipient::new(&[0x01; 16])).is_ok());
    }

    #[test]
    fn kind_mismatch_is_detected() {
        let cek = ContentEncryptionKey::from_bytes(&[9; 16]);
        let mut store = RecipientInformationStore::new(vec![
            kek_info(b"k1", &[0x01; 16], &cek),
            RecipientInfo::Password(PasswordRecipientInfo {
                version: 0,
                key_derivation_algorithm: None,
                key_encryption_algorithm: AlgorithmIdentifier::new(known::AES128_WRAP),
                encrypted_key: vec![],
            }),
        ]);
        // A password credential offered for a KEK record.
        assert!(matches!(
            store.resolve(
                &RecipientId::KekId(b"k1".to_vec()),
                &PasswordRecipient::new(b"pw")
            ),
            Err(CmsError::RecipientKindMismatch)
        ));
    }

    #[test]
    fn kek_records_carry_version_4() {
        let cek = ContentEncryptionKey::from_bytes(&[9; 16]);
        let info = kek_info(b"x", &[0; 16], &cek);
        if let RecipientInfo::Kek(KekRecipientInfo { version, .. }) = info {
            assert_eq!(version, 4);
        } else {
            panic!("wrong variant");
        }
    }
}
