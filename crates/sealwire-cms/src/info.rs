//! Wire-level RecipientInfo structures (RFC 5652 section 6.2, RFC 9629).

use sealwire_codec::oid::known;
use sealwire_codec::{tags, Decoder, Encoder};
use sealwire_types::{CmsError, CodecError};

use crate::algid::AlgorithmIdentifier;

// ── Identifiers ──────────────────────────────────────────────────────

/// How a recipient record names its key: certificate issuer + serial, or
/// the certificate's subject key identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecipientIdentifier {
    IssuerAndSerial {
        /// Raw DER Name of the issuer, kept opaque.
        issuer: Vec<u8>,
        /// Serial number magnitude bytes, big-endian.
        serial: Vec<u8>,
    },
    SubjectKeyId(Vec<u8>),
}

impl RecipientIdentifier {
    /// RFC 5652 section 6.2.1: SubjectKeyIdentifier forces version 2.
    pub fn ktri_version(&self) -> u32 {
        match self {
            RecipientIdentifier::IssuerAndSerial { .. } => 0,
            RecipientIdentifier::SubjectKeyId(_) => 2,
        }
    }

    fn encode_ias(issuer: &[u8], serial: &[u8], enc: &mut Encoder) {
        let mut inner = Encoder::new();
        inner.write_raw(issuer);
        inner.write_integer(serial);
        enc.write_sequence(&inner.finish());
    }

    /// Encoding used by KeyTransRecipientInfo and KEMRecipientInfo:
    /// subjectKeyIdentifier is `[0] IMPLICIT OCTET STRING`.
    fn encode_flat(&self, enc: &mut Encoder) {
        match self {
            RecipientIdentifier::IssuerAndSerial { issuer, serial } => {
                Self::encode_ias(issuer, serial, enc);
            }
            RecipientIdentifier::SubjectKeyId(ski) => {
                enc.write_context_specific(0, false, ski);
            }
        }
    }

    /// Encoding used inside KeyAgree RecipientEncryptedKey: rKeyId is
    /// `[0] IMPLICIT RecipientKeyIdentifier` (a SEQUENCE).
    fn encode_kari(&self, enc: &mut Encoder) {
        match self {
            RecipientIdentifier::IssuerAndSerial { issuer, serial } => {
                Self::encode_ias(issuer, serial, enc);
            }
            RecipientIdentifier::SubjectKeyId(ski) => {
                let mut inner = Encoder::new();
                inner.write_octet_string(ski);
                enc.write_context_specific(0, true, &inner.finish());
            }
        }
    }

    fn read_ias(value: &[u8]) -> Result<Self, CodecError> {
        let mut seq = Decoder::new(value);
        let (_, issuer) = seq.read_raw_tlv()?;
        let issuer = issuer.to_vec();
        let serial = seq.read_integer()?.to_vec();
        Ok(RecipientIdentifier::IssuerAndSerial { issuer, serial })
    }

    fn read_flat(dec: &mut Decoder<'_>) -> Result<Self, CodecError> {
        let tlv = dec.read_tlv()?;
        if tlv.tag.is_universal(0x10) {
            Self::read_ias(tlv.value)
        } else if tlv.tag.is_context(0) && !tlv.tag.constructed {
            Ok(RecipientIdentifier::SubjectKeyId(tlv.value.to_vec()))
        } else {
            Err(CodecError::UnexpectedTag {
                expected: 0x30,
                got: tlv.tag.number as u8,
            })
        }
    }

    fn read_kari(dec: &mut Decoder<'_>) -> Result<Self, CodecError> {
        let tlv = dec.read_tlv()?;
        if tlv.tag.is_universal(0x10) {
            Self::read_ias(tlv.value)
        } else if tlv.tag.is_context(0) && tlv.tag.constructed {
            let mut inner = Decoder::new(tlv.value);
            // Ignore the optional date / other fields of RecipientKeyIdentifier.
            Ok(RecipientIdentifier::SubjectKeyId(
                inner.read_octet_string()?.to_vec(),
            ))
        } else {
            Err(CodecError::UnexpectedTag {
                expected: 0x30,
                got: tlv.tag.number as u8,
            })
        }
    }
}

/// Caller-side lookup key for a recipient record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecipientId {
    IssuerAndSerial { issuer: Vec<u8>, serial: Vec<u8> },
    SubjectKeyId(Vec<u8>),
    KekId(Vec<u8>),
    Password,
}

impl RecipientId {
    fn matches_identifier(&self, rid: &RecipientIdentifier) -> bool {
        match (self, rid) {
            (
                RecipientId::IssuerAndSerial { issuer, serial },
                RecipientIdentifier::IssuerAndSerial {
                    issuer: i,
                    serial: s,
                },
            ) => issuer == i && serial == s,
            (RecipientId::SubjectKeyId(a), RecipientIdentifier::SubjectKeyId(b)) => a == b,
            _ => false,
        }
    }
}

// ── Per-kind records ─────────────────────────────────────────────────

/// KeyTransRecipientInfo (RFC 5652 section 6.2.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyTransRecipientInfo {
    pub version: u32,
    pub rid: RecipientIdentifier,
    pub key_encryption_algorithm: AlgorithmIdentifier,
    pub encrypted_key: Vec<u8>,
}

/// Ephemeral originator public key for key agreement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginatorPublicKey {
    pub algorithm: AlgorithmIdentifier,
    pub public_key: Vec<u8>,
}

/// One wrapped CEK within a KeyAgreeRecipientInfo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipientEncryptedKey {
    pub rid: RecipientIdentifier,
    pub encrypted_key: Vec<u8>,
}

/// KeyAgreeRecipientInfo (RFC 5652 section 6.2.2). One originator key,
/// one wrapped CEK per recipient in the agreement group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyAgreeRecipientInfo {
    pub version: u32,
    pub originator: OriginatorPublicKey,
    pub ukm: Option<Vec<u8>>,
    pub key_encryption_algorithm: AlgorithmIdentifier,
    pub recipient_encrypted_keys: Vec<RecipientEncryptedKey>,
}

/// KEKRecipientInfo (RFC 5652 section 6.2.3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KekRecipientInfo {
    pub version: u32,
    pub kek_id: Vec<u8>,
    /// Raw GeneralizedTime characters, if present.
    pub date: Option<Vec<u8>>,
    pub key_encryption_algorithm: AlgorithmIdentifier,
    pub encrypted_key: Vec<u8>,
}

/// PasswordRecipientInfo (RFC 5652 section 6.2.4).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordRecipientInfo {
    pub version: u32,
    pub key_derivation_algorithm: Option<AlgorithmIdentifier>,
    pub key_encryption_algorithm: AlgorithmIdentifier,
    pub encrypted_key: Vec<u8>,
}

/// KEMRecipientInfo (RFC 9629), carried as OtherRecipientInfo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KemRecipientInfo {
    pub version: u32,
    pub rid: RecipientIdentifier,
    pub kem: AlgorithmIdentifier,
    pub kem_ct: Vec<u8>,
    pub kdf: AlgorithmIdentifier,
    pub kek_length: u32,
    pub ukm: Option<Vec<u8>>,
    pub wrap: AlgorithmIdentifier,
    pub encrypted_key: Vec<u8>,
}

/// The RecipientInfo CHOICE.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecipientInfo {
    KeyTrans(KeyTransRecipientInfo),
    KeyAgree(KeyAgreeRecipientInfo),
    Kek(KekRecipientInfo),
    Password(PasswordRecipientInfo),
    Kem(KemRecipientInfo),
}

impl RecipientInfo {
    /// True when the RFC 5652 version computation counts this record as
    /// forcing EnvelopedData version 3 (pwri / ori).
    pub fn forces_version_3(&self) -> bool {
        matches!(self, RecipientInfo::Password(_) | RecipientInfo::Kem(_))
    }

    /// The record's own CMSVersion.
    pub fn version(&self) -> u32 {
        match self {
            RecipientInfo::KeyTrans(r) => r.version,
            RecipientInfo::KeyAgree(r) => r.version,
            RecipientInfo::Kek(r) => r.version,
            RecipientInfo::Password(r) => r.version,
            RecipientInfo::Kem(r) => r.version,
        }
    }

    /// Structural match against a caller-supplied identifier.
    pub fn matches(&self, id: &RecipientId) -> bool {
        match self {
            RecipientInfo::KeyTrans(r) => id.matches_identifier(&r.rid),
            RecipientInfo::KeyAgree(r) => r
                .recipient_encrypted_keys
                .iter()
                .any(|rek| id.matches_identifier(&rek.rid)),
            RecipientInfo::Kek(r) => matches!(id, RecipientId::KekId(k) if *k == r.kek_id),
            RecipientInfo::Password(_) => matches!(id, RecipientId::Password),
            RecipientInfo::Kem(r) => id.matches_identifier(&r.rid),
        }
    }

    // ── Encoding ─────────────────────────────────────────────────────

    pub fn to_der(&self) -> Vec<u8> {
        let mut enc = Encoder::new();
        match self {
            RecipientInfo::KeyTrans(r) => {
                let mut inner = Encoder::new();
                inner.write_integer_u32(r.version);
                r.rid.encode_flat(&mut inner);
                inner.write_raw(&r.key_encryption_algorithm.to_der());
                inner.write_octet_string(&r.encrypted_key);
                enc.write_sequence(&inner.finish());
            }
            RecipientInfo::KeyAgree(r) => {
                let mut inner = Encoder::new();
                inner.write_integer_u32(r.version);
                // originator [0] EXPLICIT, holding originatorKey [1] IMPLICIT
                let mut opk = Encoder::new();
                opk.write_raw(&r.originator.algorithm.to_der());
                opk.write_bit_string(0, &r.originator.public_key);
                let mut choice = Encoder::new();
                choice.write_context_specific(1, true, &opk.finish());
                inner.write_context_specific(0, true, &choice.finish());
                if let Some(ukm) = &r.ukm {
                    let mut u = Encoder::new();
                    u.write_octet_string(ukm);
                    inner.write_context_specific(1, true, &u.finish());
                }
                inner.write_raw(&r.key_encryption_algorithm.to_der());
                let mut reks = Encoder::new();
                for rek in &r.recipient_encrypted_keys {
                    let mut body = Encoder::new();
                    rek.rid.encode_kari(&mut body);
                    body.write_octet_string(&rek.encrypted_key);
                    reks.write_sequence(&body.finish());
                }
                inner.write_sequence(&reks.finish());
                enc.write_context_specific(1, true, &inner.finish());
            }
            RecipientInfo::Kek(r) => {
                let mut inner = Encoder::new();
                inner.write_integer_u32(r.version);
                let mut kekid = Encoder::new();
                kekid.write_octet_string(&r.kek_id);
                if let Some(date) = &r.date {
                    kekid.write_tlv(tags::GENERALIZED_TIME, date);
                }
                inner.write_sequence(&kekid.finish());
                inner.write_raw(&r.key_encryption_algorithm.to_der());
                inner.write_octet_string(&r.encrypted_key);
                enc.write_context_specific(2, true, &inner.finish());
            }
            RecipientInfo::Password(r) => {
                let mut inner = Encoder::new();
                inner.write_integer_u32(r.version);
                if let Some(kdf) = &r.key_derivation_algorithm {
                    // [0] IMPLICIT replaces the SEQUENCE tag.
                    inner.write_context_specific(0, true, &kdf.to_der_contents());
                }
                inner.write_raw(&r.key_encryption_algorithm.to_der());
                inner.write_octet_string(&r.encrypted_key);
                enc.write_context_specific(3, true, &inner.finish());
            }
            RecipientInfo::Kem(r) => {
                let mut kemri = Encoder::new();
                kemri.write_integer_u32(r.version);
                r.rid.encode_flat(&mut kemri);
                kemri.write_raw(&r.kem.to_der());
                kemri.write_octet_string(&r.kem_ct);
                kemri.write_raw(&r.kdf.to_der());
                kemri.write_integer_u32(r.kek_length);
                if let Some(ukm) = &r.ukm {
                    let mut u = Encoder::new();
                    u.write_octet_string(ukm);
                    kemri.write_context_specific(0, true, &u.finish());
                }
                kemri.write_raw(&r.wrap.to_der());
                kemri.write_octet_string(&r.encrypted_key);

                let mut ori = Encoder::new();
                ori.write_oid(known::ORI_KEM);
                ori.write_sequence(&kemri.finish());
                enc.write_context_specific(4, true, &ori.finish());
            }
        }
        enc.finish()
    }

    // ── Parsing ──────────────────────────────────────────────────────

    pub fn read_from(dec: &mut Decoder<'_>) -> Result<Self, CmsError> {
        let tlv = dec.read_tlv().map_err(CmsError::from)?;
        let mut body = Decoder::new(tlv.value);
        if tlv.tag.is_universal(0x10) {
            Self::read_ktri(&mut body)
        } else if tlv.tag.is_context(1) {
            Self::read_kari(&mut body)
        } else if tlv.tag.is_context(2) {
            Self::read_kekri(&mut body)
        } else if tlv.tag.is_context(3) {
            Self::read_pwri(&mut body)
        } else if tlv.tag.is_context(4) {
            Self::read_ori(&mut body)
        } else {
            Err(CmsError::Malformed("unrecognized RecipientInfo tag"))
        }
    }

    fn read_ktri(dec: &mut Decoder<'_>) -> Result<Self, CmsError> {
        let version = dec.read_integer_u32()?;
        let rid = RecipientIdentifier::read_flat(dec)?;
        let key_encryption_algorithm = AlgorithmIdentifier::read_from(dec)?;
        let encrypted_key = dec.read_octet_string()?.to_vec();
        Ok(RecipientInfo::KeyTrans(KeyTransRecipientInfo {
            version,
            rid,
            key_encryption_algorithm,
            encrypted_key,
        }))
    }

    fn read_kari(dec: &mut Decoder<'_>) -> Result<Self, CmsError> {
        let version = dec.read_integer_u32()?;
        let orig = dec.read_context_specific(0, true)?;
        let mut orig_dec = Decoder::new(orig.value);
        let choice = orig_dec.read_tlv().map_err(CmsError::from)?;
        if !choice.tag.is_context(1) {
            return Err(CmsError::Malformed(
                "only originatorKey agreement originators are supported",
            ));
        }
        let mut opk = Decoder::new(choice.value);
        let algorithm = AlgorithmIdentifier::read_from(&mut opk)?;
        let (_, public_key) = opk.read_bit_string()?;
        let originator = OriginatorPublicKey {
            algorithm,
            public_key: public_key.to_vec(),
        };
        let ukm = match dec.try_read_context_specific(1, true)? {
            Some(tlv) => {
                let mut u = Decoder::new(tlv.value);
                Some(u.read_octet_string()?.to_vec())
            }
            None => None,
        };
        let key_encryption_algorithm = AlgorithmIdentifier::read_from(dec)?;
        let mut reks_dec = dec.read_sequence()?;
        let mut recipient_encrypted_keys = Vec::new();
        while !reks_dec.is_empty() {
            let mut rek = reks_dec.read_sequence()?;
            let rid = RecipientIdentifier::read_kari(&mut rek)?;
            let encrypted_key = rek.read_octet_string()?.to_vec();
            recipient_encrypted_keys.push(RecipientEncryptedKey {
                rid,
                encrypted_key,
            });
        }
        Ok(RecipientInfo::KeyAgree(KeyAgreeRecipientInfo {
            version,
            originator,
            ukm,
            key_encryption_algorithm,
            recipient_encrypted_keys,
        }))
    }

    fn read_kekri(dec: &mut Decoder<'_>) -> Result<Self, CmsError> {
        let version = dec.read_integer_u32()?;
        let mut kekid = dec.read_sequence()?;
        let kek_id = kekid.read_octet_string()?.to_vec();
        let date = if kekid.is_empty() {
            None
        } else {
            let tlv = kekid.read_tlv().map_err(CmsError::from)?;
            Some(tlv.value.to_vec())
        };
        let key_encryption_algorithm = AlgorithmIdentifier::read_from(dec)?;
        let encrypted_key = dec.read_octet_string()?.to_vec();
        Ok(RecipientInfo::Kek(KekRecipientInfo {
            version,
            kek_id,
            date,
            key_encryption_algorithm,
            encrypted_key,
        }))
    }

    fn read_pwri(dec: &mut Decoder<'_>) -> Result<Self, CmsError> {
        let version = dec.read_integer_u32()?;
        let key_derivation_algorithm = match dec.try_read_context_specific(0, true)? {
            Some(tlv) => {
                let mut inner = Decoder::new(tlv.value);
                let oid = inner.read_oid()?.to_vec();
                let params = if inner.is_empty() {
                    None
                } else {
                    let (_, raw) = inner.read_raw_tlv()?;
                    Some(raw.to_vec())
                };
                Some(AlgorithmIdentifier { oid, params })
            }
            None => None,
        };
        let key_encryption_algorithm = AlgorithmIdentifier::read_from(dec)?;
        let encrypted_key = dec.read_octet_string()?.to_vec();
        Ok(RecipientInfo::Password(PasswordRecipientInfo {
            version,
            key_derivation_algorithm,
            key_encryption_algorithm,
            encrypted_key,
        }))
    }

    fn read_ori(dec: &mut Decoder<'_>) -> Result<Self, CmsError> {
        let ori_type = dec.read_oid()?.to_vec();
        if ori_type != known::ORI_KEM {
            let name = sealwire_codec::oid::Oid::from_der_value(&ori_type)
                .map(|o| o.to_dot_string())
                .unwrap_or_else(|_| "<invalid oid>".to_string());
            return Err(CmsError::UnsupportedAlgorithm(name));
        }
        let mut kemri = dec.read_sequence()?;
        let version = kemri.read_integer_u32()?;
        let rid = RecipientIdentifier::read_flat(&mut kemri)?;
        let kem = AlgorithmIdentifier::read_from(&mut kemri)?;
        let kem_ct = kemri.read_octet_string()?.to_vec();
        let kdf = AlgorithmIdentifier::read_from(&mut kemri)?;
        let kek_length = kemri.read_integer_u32()?;
        let ukm = match kemri.try_read_context_specific(0, true)? {
            Some(tlv) => {
                let mut u = Decoder::new(tlv.value);
                Some(u.read_octet_string()?.to_vec())
            }
            None => None,
        };
        let wrap = AlgorithmIdentifier::read_from(&mut kemri)?;
        let encrypted_key = kemri.read_octet_string()?.to_vec();
        Ok(RecipientInfo::Kem(KemRecipientInfo {
            version,
            rid,
            kem,
            kem_ct,
            kdf,
            kek_length,
            ukm,
            wrap,
            encrypted_key,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_rid() -> RecipientIdentifier {
        RecipientIdentifier::IssuerAndSerial {
            // A minimal (empty) RDNSequence.
            issuer: vec![0x30, 0x00],
            serial: vec![0x01, 0x02],
        }
    }

    fn roundtrip(ri: RecipientInfo) -> RecipientInfo {
        let der = ri.to_der();
        let mut dec = Decoder::new(&der);
        let back = RecipientInfo::read_from(&mut dec).unwrap();
        assert!(dec.is_empty());
        assert_eq!(back, ri);
        back
    }

    #[test]
    fn ktri_roundtrip_untagged() {
        let ri = RecipientInfo::KeyTrans(KeyTransRecipientInfo {
            version: 0,
            rid: sample_rid(),
            key_encryption_algorithm: AlgorithmIdentifier::new(known::RSAES_OAEP),
            encrypted_key: vec![0xAA; 256],
        });
        assert_eq!(ri.to_der()[0], 0x30);
        roundtrip(ri);
    }

    #[test]
    fn ktri_subject_key_id_version_2() {
        let rid = RecipientIdentifier::SubjectKeyId(vec![1, 2, 3, 4]);
        assert_eq!(rid.ktri_version(), 2);
        let ri = RecipientInfo::KeyTrans(KeyTransRecipientInfo {
            version: 2,
            rid,
            key_encryption_algorithm: AlgorithmIdentifier::with_null_params(
                known::RSA_ENCRYPTION,
            ),
            encrypted_key: vec![0xBB; 128],
        });
        roundtrip(ri);
    }

    #[test]
    fn kari_roundtrip_tag_a1() {
        let ri = RecipientInfo::KeyAgree(KeyAgreeRecipientInfo {
            version: 3,
            originator: OriginatorPublicKey {
                algorithm: AlgorithmIdentifier::new(known::X25519),
                public_key: vec![0x42; 32],
            },
            ukm: Some(vec![9, 9, 9]),
            key_encryption_algorithm: AlgorithmIdentifier::new(
                known::DH_SINGLEPASS_STDDH_SHA256KDF,
            ),
            recipient_encrypted_keys: vec![
                RecipientEncryptedKey {
                    rid: sample_rid(),
                    encrypted_key: vec![0xCC; 40],
                },
                RecipientEncryptedKey {
                    rid: RecipientIdentifier::SubjectKeyId(vec![7; 20]),
                    encrypted_key: vec![0xDD; 40],
                },
            ],
        });
        assert_eq!(ri.to_der()[0], 0xA1);
        roundtrip(ri);
    }

    #[test]
    fn kekri_roundtrip_tag_a2() {
        let ri = RecipientInfo::Kek(KekRecipientInfo {
            version: 4,
            kek_id: b"org-key-2026".to_vec(),
            date: Some(b"20260830120000Z".to_vec()),
            key_encryption_algorithm: AlgorithmIdentifier::new(known::AES256_WRAP),
            encrypted_key: vec![0xEE; 40],
        });
        assert_eq!(ri.to_der()[0], 0xA2);
        roundtrip(ri);
    }

    #[test]
    fn pwri_roundtrip_tag_a3() {
        let kdf = crate::recipient::pbkdf2_algorithm_identifier(&[1, 2, 3, 4], 2048, 32);
        let ri = RecipientInfo::Password(PasswordRecipientInfo {
            version: 0,
            key_derivation_algorithm: Some(kdf),
            key_encryption_algorithm: AlgorithmIdentifier::new(known::AES256_WRAP),
            encrypted_key: vec![0x11; 40],
        });
        assert_eq!(ri.to_der()[0], 0xA3);
        assert!(ri.forces_version_3());
        roundtrip(ri);
    }

    #[test]
    fn kemri_roundtrip_tag_a4() {
        let ri = RecipientInfo::Kem(KemRecipientInfo {
            version: 0,
            rid: RecipientIdentifier::SubjectKeyId(vec![5; 20]),
            kem: AlgorithmIdentifier::new(known::X25519),
            kem_ct: vec![0x77; 32],
            kdf: AlgorithmIdentifier::new(known::HKDF_SHA256),
            kek_length: 16,
            ukm: None,
            wrap: AlgorithmIdentifier::new(known::AES128_WRAP),
            encrypted_key: vec![0x88; 24],
        });
        assert_eq!(ri.to_der()[0], 0xA4);
        assert!(ri.forces_version_3());
        roundtrip(ri);
    }

    #[test]
    fn matching_rules() {
        let kek = RecipientInfo::Kek(KekRecipientInfo {
            version: 4,
            kek_id: b"abc".to_vec(),
            date: None,
            key_encryption_algorithm: AlgorithmIdentifier::new(known::AES128_WRAP),
            encrypted_key: vec![],
        });
        assert!(kek.matches(&RecipientId::KekId(b"abc".to_vec())));
        assert!(!kek.matches(&RecipientId::KekId(b"abd".to_vec())));
        assert!(!kek.matches(&RecipientId::Password));
    }
}
