//! Key agreement: ephemeral-static X25519 with the X9.63 KDF.
//!
//! One ephemeral originator key serves every recipient added to the
//! generator; each recipient gets its own pairwise KEK (derived from the
//! shared secret plus ECC-CMS-SharedInfo) and its own wrapped CEK.

use sealwire_codec::oid::known;
use sealwire_codec::Encoder;
use sealwire_types::{CmsError, WrapAlgId};
use sha2::{Digest, Sha256};
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroizing;

use crate::algid::AlgorithmIdentifier;
use crate::info::{
    KeyAgreeRecipientInfo, OriginatorPublicKey, RecipientEncryptedKey, RecipientId,
    RecipientIdentifier, RecipientInfo,
};
use crate::key::ContentEncryptionKey;
use crate::registry::registry;

use super::{unwrap_key, wrap_algorithm_identifier, wrap_key, Recipient, RecipientKind};

/// ANSI X9.63 KDF over SHA-256: concatenated SHA256(Z || counter || info)
/// blocks, truncated to the requested length.
fn x963_kdf_sha256(z: &[u8], shared_info: &[u8], out_len: usize) -> Zeroizing<Vec<u8>> {
    let mut out = Zeroizing::new(Vec::with_capacity(out_len));
    let mut counter: u32 = 1;
    while out.len() < out_len {
        let mut h = Sha256::new();
        h.update(z);
        h.update(counter.to_be_bytes());
        h.update(shared_info);
        out.extend_from_slice(&h.finalize());
        counter += 1;
    }
    out.truncate(out_len);
    out
}

/// ECC-CMS-SharedInfo (RFC 5753 section 7.2): binds the KDF output to the
/// wrap algorithm, the optional ukm, and the KEK length in bits.
fn ecc_cms_shared_info(wrap_alg: &AlgorithmIdentifier, ukm: Option<&[u8]>, kek_bits: u32) -> Vec<u8> {
    let mut inner = Encoder::new();
    inner.write_raw(&wrap_alg.to_der());
    if let Some(ukm) = ukm {
        let mut u = Encoder::new();
        u.write_octet_string(ukm);
        inner.write_context_specific(0, true, &u.finish());
    }
    let mut supp = Encoder::new();
    supp.write_octet_string(&kek_bits.to_be_bytes());
    inner.write_context_specific(2, true, &supp.finish());
    let mut enc = Encoder::new();
    enc.write_sequence(&inner.finish());
    enc.finish()
}

fn derive_kek(
    z: &[u8],
    wrap_alg: &AlgorithmIdentifier,
    ukm: Option<&[u8]>,
    kek_len: usize,
) -> Zeroizing<Vec<u8>> {
    let info = ecc_cms_shared_info(wrap_alg, ukm, (kek_len * 8) as u32);
    x963_kdf_sha256(z, &info, kek_len)
}

/// Produces one KeyAgreeRecipientInfo covering a group of recipients.
pub struct KeyAgreeGenerator {
    secret: StaticSecret,
    public: PublicKey,
    ukm: Option<Vec<u8>>,
    wrap: WrapAlgId,
    recipients: Vec<(RecipientIdentifier, [u8; 32])>,
}

impl KeyAgreeGenerator {
    /// Generate a fresh ephemeral originator key for this group.
    pub fn new(wrap: WrapAlgId) -> Self {
        let secret = StaticSecret::random_from_rng(rand_core::OsRng);
        let public = PublicKey::from(&secret);
        Self {
            secret,
            public,
            ukm: None,
            wrap,
            recipients: Vec::new(),
        }
    }

    pub fn set_ukm(&mut self, ukm: Vec<u8>) -> &mut Self {
        self.ukm = Some(ukm);
        self
    }

    /// Add one recipient by identifier and X25519 public key.
    pub fn add_recipient(&mut self, rid: RecipientIdentifier, public_key: [u8; 32]) -> &mut Self {
        self.recipients.push((rid, public_key));
        self
    }

    pub(crate) fn generate(&self, cek: &ContentEncryptionKey) -> Result<RecipientInfo, CmsError> {
        if self.recipients.is_empty() {
            return Err(CmsError::Sequencing(
                "key agreement group has no recipients",
            ));
        }
        let wrap_oid = registry().wrap_oid(self.wrap);
        let wrap_alg = wrap_algorithm_identifier(wrap_oid);
        let kek_len = self.wrap.key_bits() / 8;

        let mut reks = Vec::with_capacity(self.recipients.len());
        for (rid, public_key) in &self.recipients {
            let z = self.secret.diffie_hellman(&PublicKey::from(*public_key));
            let kek = derive_kek(z.as_bytes(), &wrap_alg, self.ukm.as_deref(), kek_len);
            let encrypted_key = wrap_key(&kek, cek.as_bytes())?;
            reks.push(RecipientEncryptedKey {
                rid: rid.clone(),
                encrypted_key,
            });
        }

        Ok(RecipientInfo::KeyAgree(KeyAgreeRecipientInfo {
            version: 3,
            originator: OriginatorPublicKey {
                algorithm: AlgorithmIdentifier::new(known::X25519),
                public_key: self.public.as_bytes().to_vec(),
            },
            ukm: self.ukm.clone(),
            key_encryption_algorithm: AlgorithmIdentifier::with_params(
                known::DH_SINGLEPASS_STDDH_SHA256KDF,
                wrap_alg.to_der(),
            ),
            recipient_encrypted_keys: reks,
        }))
    }
}

/// X25519 private key credential for key-agreement records.
pub struct AgreementRecipient {
    secret: StaticSecret,
}

impl AgreementRecipient {
    pub fn new(secret: [u8; 32]) -> Self {
        Self {
            secret: StaticSecret::from(secret),
        }
    }

    pub fn public_key(&self) -> [u8; 32] {
        PublicKey::from(&self.secret).to_bytes()
    }
}

impl Recipient for AgreementRecipient {
    fn kind(&self) -> RecipientKind {
        RecipientKind::Agreement
    }

    fn unwrap_cek(
        &self,
        info: &RecipientInfo,
        id: &RecipientId,
    ) -> Result<ContentEncryptionKey, CmsError> {
        let RecipientInfo::KeyAgree(kari) = info else {
            return Err(CmsError::RecipientKindMismatch);
        };
        if !kari.originator.algorithm.oid_is(known::X25519) {
            let name = sealwire_codec::oid::Oid::from_der_value(&kari.originator.algorithm.oid)
                .map(|o| o.to_dot_string())
                .unwrap_or_else(|_| "<invalid oid>".to_string());
            return Err(CmsError::UnsupportedAlgorithm(name));
        }
        let rek = kari
            .recipient_encrypted_keys
            .iter()
            .find(|rek| matches_rek(id, &rek.rid))
            .ok_or(CmsError::RecipientNotFound)?;

        // The wrap algorithm rides in the key-encryption parameters.
        let wrap_der = kari
            .key_encryption_algorithm
            .params
            .as_deref()
            .ok_or(CmsError::Malformed("missing key-wrap parameter"))?;
        let wrap_alg = AlgorithmIdentifier::from_der(wrap_der)?;
        let wrap = registry().wrap_by_oid(&wrap_alg.oid)?;

        let peer: [u8; 32] = kari
            .originator
            .public_key
            .as_slice()
            .try_into()
            .map_err(|_| CmsError::Malformed("originator key is not 32 bytes"))?;
        let z = self.secret.diffie_hellman(&PublicKey::from(peer));
        let kek = derive_kek(
            z.as_bytes(),
            &wrap_alg,
            kari.ukm.as_deref(),
            wrap.key_bits() / 8,
        );
        let cek = unwrap_key(&kek, &rek.encrypted_key)?;
        Ok(ContentEncryptionKey::from_bytes(&cek))
    }
}

fn matches_rek(id: &RecipientId, rid: &RecipientIdentifier) -> bool {
    match (id, rid) {
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
