//! Recipient key-management strategies.
//!
//! One generator per intended recipient on the producer side; one
//! [`Recipient`] credential offered at parse time on the consumer side.
//! Generators only protect the already-generated content-encryption key —
//! they never see content — and the consumer side only recovers key
//! material; binding it to the content transform happens in the store and
//! parsers.

mod agreement;
mod kek;
mod kem;
mod password;
mod transport;

pub use agreement::{AgreementRecipient, KeyAgreeGenerator};
pub use kek::{KekGenerator, KekRecipient};
pub use kem::{
    KemEncapsulator, KemDecapsulator, KemGenerator, KemRecipient, X25519Decapsulator,
    X25519Encapsulator,
};
pub use password::{PasswordGenerator, PasswordRecipient};
pub use transport::{KeyTransGenerator, TransportPadding, TransportRecipient};

use aes::cipher::generic_array::GenericArray;
use aes_kw::Kek;
use sealwire_codec::oid::known;
use sealwire_codec::Encoder;
use sealwire_types::CmsError;
use zeroize::Zeroizing;

use crate::algid::AlgorithmIdentifier;
use crate::info::{RecipientId, RecipientInfo};
use crate::key::ContentEncryptionKey;

/// The five key-management kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecipientKind {
    Transport,
    Agreement,
    Kek,
    Password,
    Kem,
}

impl RecipientKind {
    pub fn of(info: &RecipientInfo) -> Self {
        match info {
            RecipientInfo::KeyTrans(_) => RecipientKind::Transport,
            RecipientInfo::KeyAgree(_) => RecipientKind::Agreement,
            RecipientInfo::Kek(_) => RecipientKind::Kek,
            RecipientInfo::Password(_) => RecipientKind::Password,
            RecipientInfo::Kem(_) => RecipientKind::Kem,
        }
    }
}

/// Producer-side strategy: turn a CEK into one RecipientInfo record.
pub enum RecipientInfoGenerator {
    Transport(KeyTransGenerator),
    Agreement(KeyAgreeGenerator),
    Kek(KekGenerator),
    Password(PasswordGenerator),
    Kem(KemGenerator),
}

impl RecipientInfoGenerator {
    /// Protect the CEK for this recipient. Pure given its inputs: no
    /// state changes, the same CEK may be offered to many generators.
    pub fn generate(&self, cek: &ContentEncryptionKey) -> Result<RecipientInfo, CmsError> {
        match self {
            RecipientInfoGenerator::Transport(g) => g.generate(cek),
            RecipientInfoGenerator::Agreement(g) => g.generate(cek),
            RecipientInfoGenerator::Kek(g) => g.generate(cek),
            RecipientInfoGenerator::Password(g) => g.generate(cek),
            RecipientInfoGenerator::Kem(g) => g.generate(cek),
        }
    }
}

/// Consumer-side credential: recovers the CEK from a matched record.
pub trait Recipient {
    fn kind(&self) -> RecipientKind;

    /// Recover the CEK. `id` selects the entry within multi-recipient
    /// records (key agreement).
    fn unwrap_cek(
        &self,
        info: &RecipientInfo,
        id: &RecipientId,
    ) -> Result<ContentEncryptionKey, CmsError>;
}

// ── Shared key-wrap plumbing ─────────────────────────────────────────

/// RFC 3394 AES key wrap, KEK length selecting the AES variant.
pub(crate) fn wrap_key(kek: &[u8], key: &[u8]) -> Result<Vec<u8>, CmsError> {
    match kek.len() {
        16 => Kek::<aes::Aes128>::new(GenericArray::from_slice(kek))
            .wrap_vec(key)
            .map_err(CmsError::op_failed),
        24 => Kek::<aes::Aes192>::new(GenericArray::from_slice(kek))
            .wrap_vec(key)
            .map_err(CmsError::op_failed),
        32 => Kek::<aes::Aes256>::new(GenericArray::from_slice(kek))
            .wrap_vec(key)
            .map_err(CmsError::op_failed),
        _ => Err(CmsError::InvalidKeyLength {
            expected: 256,
            got: kek.len() * 8,
        }),
    }
}

/// AES key unwrap. Failures are opaque: integrity-check mismatch and
/// wrong-KEK cases are indistinguishable to the caller.
pub(crate) fn unwrap_key(kek: &[u8], wrapped: &[u8]) -> Result<Zeroizing<Vec<u8>>, CmsError> {
    let out = match kek.len() {
        16 => Kek::<aes::Aes128>::new(GenericArray::from_slice(kek)).unwrap_vec(wrapped),
        24 => Kek::<aes::Aes192>::new(GenericArray::from_slice(kek)).unwrap_vec(wrapped),
        32 => Kek::<aes::Aes256>::new(GenericArray::from_slice(kek)).unwrap_vec(wrapped),
        _ => {
            return Err(CmsError::InvalidKeyLength {
                expected: 256,
                got: kek.len() * 8,
            })
        }
    };
    out.map(Zeroizing::new)
        .map_err(|_| CmsError::op_failed_opaque())
}

/// The AES key-wrap OID for a KEK of the given byte length.
pub(crate) fn wrap_oid_for_kek(len: usize) -> Result<&'static [u8], CmsError> {
    match len {
        16 => Ok(known::AES128_WRAP),
        24 => Ok(known::AES192_WRAP),
        32 => Ok(known::AES256_WRAP),
        _ => Err(CmsError::InvalidKeyLength {
            expected: 256,
            got: len * 8,
        }),
    }
}

/// Key-wrap OIDs whose AlgorithmIdentifier takes an explicit NULL
/// parameter rather than absent parameters.
const NULL_PARAM_WRAPS: &[&[u8]] = &[known::DES_EDE3_WRAP, known::GOST28147_WRAP];

/// Build a key-wrap AlgorithmIdentifier with the parameter style the wrap
/// algorithm's defining document requires.
pub fn wrap_algorithm_identifier(oid: &[u8]) -> AlgorithmIdentifier {
    if NULL_PARAM_WRAPS.iter().any(|o| *o == oid) {
        AlgorithmIdentifier::with_null_params(oid)
    } else {
        AlgorithmIdentifier::new(oid)
    }
}

// ── PBKDF2 parameters ────────────────────────────────────────────────

/// PBKDF2-HMAC-SHA256 AlgorithmIdentifier (RFC 8018 PBKDF2-params with
/// explicit keyLength and prf).
pub fn pbkdf2_algorithm_identifier(
    salt: &[u8],
    iterations: u32,
    key_len: usize,
) -> AlgorithmIdentifier {
    let mut prf = Encoder::new();
    let mut prf_inner = Encoder::new();
    prf_inner.write_oid(known::HMAC_SHA256);
    prf_inner.write_null();
    prf.write_sequence(&prf_inner.finish());

    let mut params = Encoder::new();
    params.write_octet_string(salt);
    params.write_integer_u32(iterations);
    params.write_integer_u32(key_len as u32);
    params.write_raw(&prf.finish());

    let mut seq = Encoder::new();
    seq.write_sequence(&params.finish());
    AlgorithmIdentifier::with_params(known::PBKDF2, seq.finish())
}

/// Parse PBKDF2-params: (salt, iterations, keyLength if present).
pub(crate) fn parse_pbkdf2_params(
    alg: &AlgorithmIdentifier,
) -> Result<(Vec<u8>, u32, Option<usize>), CmsError> {
    if !alg.oid_is(known::PBKDF2) {
        let name = sealwire_codec::oid::Oid::from_der_value(&alg.oid)
            .map(|o| o.to_dot_string())
            .unwrap_or_else(|_| "<invalid oid>".to_string());
        return Err(CmsError::UnsupportedAlgorithm(name));
    }
    let raw = alg
        .params
        .as_deref()
        .ok_or(CmsError::Malformed("missing PBKDF2 parameters"))?;
    let mut dec = sealwire_codec::Decoder::new(raw);
    let mut seq = dec.read_sequence()?;
    let salt = seq.read_octet_string()?.to_vec();
    let iterations = seq.read_integer_u32()?;
    let mut key_len = None;
    if !seq.is_empty() {
        if let Ok(tag) = seq.peek_tag() {
            if tag.is_universal(0x02) {
                key_len = Some(seq.read_integer_u32()? as usize);
            }
        }
    }
    // Any trailing prf AlgorithmIdentifier is accepted but only
    // HMAC-SHA256 derivations are produced or honored.
    if !seq.is_empty() {
        let prf = AlgorithmIdentifier::read_from(&mut seq)?;
        if !prf.oid_is(known::HMAC_SHA256) {
            let name = sealwire_codec::oid::Oid::from_der_value(&prf.oid)
                .map(|o| o.to_dot_string())
                .unwrap_or_else(|_| "<invalid oid>".to_string());
            return Err(CmsError::UnsupportedAlgorithm(name));
        }
    }
    Ok((salt, iterations, key_len))
}
