//! KEM recipients (RFC 9629 KEMRecipientInfo).
//!
//! The mechanism is pluggable through the encapsulator/decapsulator
//! traits: encapsulate, derive the KEK from the shared secret with
//! HKDF-SHA256 over CMSORIforKEMOtherInfo, wrap the CEK. An X25519
//! Diffie-Hellman KEM is supplied as the concrete mechanism.

use hkdf::Hkdf;
use sealwire_codec::oid::known;
use sealwire_codec::Encoder;
use sealwire_types::{CmsError, WrapAlgId};
use sha2::Sha256;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroizing;

use crate::algid::AlgorithmIdentifier;
use crate::info::{KemRecipientInfo, RecipientId, RecipientIdentifier, RecipientInfo};
use crate::key::ContentEncryptionKey;
use crate::registry::registry;

use super::{unwrap_key, wrap_algorithm_identifier, wrap_key, Recipient, RecipientKind};

/// Producer half of a KEM mechanism.
pub trait KemEncapsulator {
    /// The KEM AlgorithmIdentifier recorded on the wire.
    fn algorithm_identifier(&self) -> AlgorithmIdentifier;
    /// Produce (ciphertext, shared secret).
    fn encapsulate(&self) -> Result<(Vec<u8>, Zeroizing<Vec<u8>>), CmsError>;
}

/// Consumer half of a KEM mechanism.
pub trait KemDecapsulator {
    /// Recover the shared secret from the ciphertext.
    fn decapsulate(&self, ciphertext: &[u8]) -> Result<Zeroizing<Vec<u8>>, CmsError>;
}

/// RFC 9629 CMSORIforKEMOtherInfo: the KDF info binding the wrap
/// algorithm, KEK length, and optional ukm.
fn kem_other_info(wrap_alg: &AlgorithmIdentifier, kek_len: usize, ukm: Option<&[u8]>) -> Vec<u8> {
    let mut inner = Encoder::new();
    inner.write_raw(&wrap_alg.to_der());
    inner.write_integer_u32(kek_len as u32);
    if let Some(ukm) = ukm {
        let mut u = Encoder::new();
        u.write_octet_string(ukm);
        inner.write_context_specific(0, true, &u.finish());
    }
    let mut enc = Encoder::new();
    enc.write_sequence(&inner.finish());
    enc.finish()
}

fn derive_kek(
    shared_secret: &[u8],
    wrap_alg: &AlgorithmIdentifier,
    kek_len: usize,
    ukm: Option<&[u8]>,
) -> Result<Zeroizing<Vec<u8>>, CmsError> {
    let info = kem_other_info(wrap_alg, kek_len, ukm);
    let hk = Hkdf::<Sha256>::new(None, shared_secret);
    let mut kek = Zeroizing::new(vec![0u8; kek_len]);
    hk.expand(&info, &mut kek)
        .map_err(|_| CmsError::op_failed_opaque())?;
    Ok(kek)
}

/// Produces a KEMRecipientInfo for one recipient.
pub struct KemGenerator {
    rid: RecipientIdentifier,
    encapsulator: Box<dyn KemEncapsulator>,
    wrap: WrapAlgId,
    ukm: Option<Vec<u8>>,
}

impl KemGenerator {
    pub fn new(
        rid: RecipientIdentifier,
        encapsulator: Box<dyn KemEncapsulator>,
        wrap: WrapAlgId,
    ) -> Self {
        Self {
            rid,
            encapsulator,
            wrap,
            ukm: None,
        }
    }

    pub fn set_ukm(&mut self, ukm: Vec<u8>) -> &mut Self {
        self.ukm = Some(ukm);
        self
    }

    pub(crate) fn generate(&self, cek: &ContentEncryptionKey) -> Result<RecipientInfo, CmsError> {
        let (kem_ct, shared_secret) = self.encapsulator.encapsulate()?;
        let wrap_alg = wrap_algorithm_identifier(registry().wrap_oid(self.wrap));
        let kek_len = self.wrap.key_bits() / 8;
        let kek = derive_kek(&shared_secret, &wrap_alg, kek_len, self.ukm.as_deref())?;
        let encrypted_key = wrap_key(&kek, cek.as_bytes())?;
        Ok(RecipientInfo::Kem(KemRecipientInfo {
            version: 0,
            rid: self.rid.clone(),
            kem: self.encapsulator.algorithm_identifier(),
            kem_ct,
            kdf: AlgorithmIdentifier::new(known::HKDF_SHA256),
            kek_length: kek_len as u32,
            ukm: self.ukm.clone(),
            wrap: wrap_alg,
            encrypted_key,
        }))
    }
}

/// KEM private-key credential.
pub struct KemRecipient {
    decapsulator: Box<dyn KemDecapsulator>,
}

impl KemRecipient {
    pub fn new(decapsulator: Box<dyn KemDecapsulator>) -> Self {
        Self { decapsulator }
    }
}

impl Recipient for KemRecipient {
    fn kind(&self) -> RecipientKind {
        RecipientKind::Kem
    }

    fn unwrap_cek(
        &self,
        info: &RecipientInfo,
        _id: &RecipientId,
    ) -> Result<ContentEncryptionKey, CmsError> {
        let RecipientInfo::Kem(kemri) = info else {
            return Err(CmsError::RecipientKindMismatch);
        };
        if !kemri.kdf.oid_is(known::HKDF_SHA256) {
            let name = sealwire_codec::oid::Oid::from_der_value(&kemri.kdf.oid)
                .map(|o| o.to_dot_string())
                .unwrap_or_else(|_| "<invalid oid>".to_string());
            return Err(CmsError::UnsupportedAlgorithm(name));
        }
        let wrap = registry().wrap_by_oid(&kemri.wrap.oid)?;
        let kek_len = kemri.kek_length as usize;
        if kek_len * 8 != wrap.key_bits() {
            return Err(CmsError::InvalidKeyLength {
                expected: wrap.key_bits(),
                got: kek_len * 8,
            });
        }
        let shared_secret = self.decapsulator.decapsulate(&kemri.kem_ct)?;
        let kek = derive_kek(&shared_secret, &kemri.wrap, kek_len, kemri.ukm.as_deref())?;
        let cek = unwrap_key(&kek, &kemri.encrypted_key)?;
        Ok(ContentEncryptionKey::from_bytes(&cek))
    }
}

// ── X25519 Diffie-Hellman KEM ────────────────────────────────────────

/// Encapsulator holding the recipient's static X25519 public key. The
/// ciphertext is the ephemeral public key.
pub struct X25519Encapsulator {
    recipient_public: PublicKey,
}

impl X25519Encapsulator {
    pub fn new(recipient_public: [u8; 32]) -> Self {
        Self {
            recipient_public: PublicKey::from(recipient_public),
        }
    }
}

impl KemEncapsulator for X25519Encapsulator {
    fn algorithm_identifier(&self) -> AlgorithmIdentifier {
        AlgorithmIdentifier::new(known::X25519)
    }

    fn encapsulate(&self) -> Result<(Vec<u8>, Zeroizing<Vec<u8>>), CmsError> {
        let ephemeral = StaticSecret::random_from_rng(rand_core::OsRng);
        let ct = PublicKey::from(&ephemeral).to_bytes().to_vec();
        let ss = ephemeral.diffie_hellman(&self.recipient_public);
        Ok((ct, Zeroizing::new(ss.as_bytes().to_vec())))
    }
}

/// Decapsulator holding the recipient's static X25519 private key.
pub struct X25519Decapsulator {
    secret: StaticSecret,
}

impl X25519Decapsulator {
    pub fn new(secret: [u8; 32]) -> Self {
        Self {
            secret: StaticSecret::from(secret),
        }
    }

    pub fn public_key(&self) -> [u8; 32] {
        PublicKey::from(&self.secret).to_bytes()
    }
}

impl KemDecapsulator for X25519Decapsulator {
    fn decapsulate(&self, ciphertext: &[u8]) -> Result<Zeroizing<Vec<u8>>, CmsError> {
        let peer: [u8; 32] = ciphertext
            .try_into()
            .map_err(|_| CmsError::Malformed("KEM ciphertext is not 32 bytes"))?;
        let ss = self.secret.diffie_hellman(&PublicKey::from(peer));
        Ok(Zeroizing::new(ss.as_bytes().to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn x25519_kem_roundtrip() {
        let dec = X25519Decapsulator::new([0x44; 32]);
        let rid = RecipientIdentifier::SubjectKeyId(vec![3; 20]);
        let mut gen = KemGenerator::new(
            rid,
            Box::new(X25519Encapsulator::new(dec.public_key())),
            WrapAlgId::Aes128Wrap,
        );
        gen.set_ukm(b"kem-ukm".to_vec());

        let cek = ContentEncryptionKey::from_bytes(&[0x66; 32]);
        let info = gen.generate(&cek).unwrap();
        if let RecipientInfo::Kem(k) = &info {
            assert_eq!(k.version, 0);
            assert_eq!(k.kek_length, 16);
            assert_eq!(k.kem_ct.len(), 32);
        } else {
            panic!("wrong variant");
        }

        let got = KemRecipient::new(Box::new(dec))
            .unwrap_cek(&info, &RecipientId::SubjectKeyId(vec![3; 20]))
            .unwrap();
        assert_eq!(got.as_bytes(), cek.as_bytes());
    }

    #[test]
    fn other_info_binds_ukm() {
        let wrap = wrap_algorithm_identifier(known::AES128_WRAP);
        let a = kem_other_info(&wrap, 16, None);
        let b = kem_other_info(&wrap, 16, Some(b"x"));
        assert_ne!(a, b);
    }

    #[test]
    fn tampered_kek_length_rejected() {
        let dec = X25519Decapsulator::new([0x45; 32]);
        let gen = KemGenerator::new(
            RecipientIdentifier::SubjectKeyId(vec![1]),
            Box::new(X25519Encapsulator::new(dec.public_key())),
            WrapAlgId::Aes256Wrap,
        );
        let cek = ContentEncryptionKey::from_bytes(&[1; 16]);
        let mut info = gen.generate(&cek).unwrap();
        if let RecipientInfo::Kem(k) = &mut info {
            k.kek_length = 16; // no longer matches aes256-wrap
        }
        assert!(matches!(
            KemRecipient::new(Box::new(dec))
                .unwrap_cek(&info, &RecipientId::SubjectKeyId(vec![1])),
            Err(CmsError::InvalidKeyLength { .. })
        ));
    }
}
