//! CMSVersion computation (RFC 5652 sections 6.1, 8, 9.1).

use crate::info::RecipientInfo;

/// EnvelopedData version, computed from structure, never caller-set.
pub(crate) fn enveloped_data_version(
    has_originator_info: bool,
    has_unprotected_attrs: bool,
    recipients: &[RecipientInfo],
) -> u32 {
    if recipients.iter().any(RecipientInfo::forces_version_3) {
        3
    } else if !has_originator_info
        && !has_unprotected_attrs
        && recipients.iter().all(|r| r.version() == 0)
    {
        0
    } else {
        2
    }
}

/// AuthenticatedData version is the constant 0.
pub(crate) const AUTHENTICATED_DATA_VERSION: u32 = 0;

/// EncryptedData version: 2 with unprotectedAttrs, else 0.
pub(crate) fn encrypted_data_version(has_unprotected_attrs: bool) -> u32 {
    if has_unprotected_attrs {
        2
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algid::AlgorithmIdentifier;
    use crate::info::{
        KekRecipientInfo, KeyAgreeRecipientInfo, KeyTransRecipientInfo, OriginatorPublicKey,
        PasswordRecipientInfo, RecipientIdentifier,
    };
    use sealwire_codec::oid::known;

    fn ktri(version: u32) -> RecipientInfo {
        RecipientInfo::KeyTrans(KeyTransRecipientInfo {
            version,
            rid: RecipientIdentifier::SubjectKeyId(vec![1]),
            key_encryption_algorithm: AlgorithmIdentifier::new(known::RSAES_OAEP),
            encrypted_key: vec![],
        })
    }

    fn kari() -> RecipientInfo {
        RecipientInfo::KeyAgree(KeyAgreeRecipientInfo {
            version: 3,
            originator: OriginatorPublicKey {
                algorithm: AlgorithmIdentifier::new(known::X25519),
                public_key: vec![0; 32],
            },
            ukm: None,
            key_encryption_algorithm: AlgorithmIdentifier::new(
                known::DH_SINGLEPASS_STDDH_SHA256KDF,
            ),
            recipient_encrypted_keys: vec![],
        })
    }

    fn pwri() -> RecipientInfo {
        RecipientInfo::Password(PasswordRecipientInfo {
            version: 0,
            key_derivation_algorithm: None,
            key_encryption_algorithm: AlgorithmIdentifier::new(known::AES128_WRAP),
            encrypted_key: vec![],
        })
    }

    fn kekri() -> RecipientInfo {
        RecipientInfo::Kek(KekRecipientInfo {
            version: 4,
            kek_id: vec![1],
            date: None,
            key_encryption_algorithm: AlgorithmIdentifier::new(known::AES128_WRAP),
            encrypted_key: vec![],
        })
    }

    #[test]
    fn all_version_zero_recipients_give_zero() {
        assert_eq!(enveloped_data_version(false, false, &[ktri(0)]), 0);
    }

    #[test]
    fn password_recipient_forces_three() {
        assert_eq!(enveloped_data_version(false, false, &[ktri(0), pwri()]), 3);
    }

    #[test]
    fn agreement_or_kek_recipients_give_two() {
        assert_eq!(enveloped_data_version(false, false, &[kari()]), 2);
        assert_eq!(enveloped_data_version(false, false, &[kekri()]), 2);
        assert_eq!(enveloped_data_version(false, false, &[ktri(2)]), 2);
    }

    #[test]
    fn originator_or_attrs_give_two() {
        assert_eq!(enveloped_data_version(true, false, &[ktri(0)]), 2);
        assert_eq!(enveloped_data_version(false, true, &[ktri(0)]), 2);
    }

    #[test]
    fn encrypted_data_versions() {
        assert_eq!(encrypted_data_version(false), 0);
        assert_eq!(encrypted_data_version(true), 2);
    }
}
