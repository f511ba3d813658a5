//! Content cipher/MAC engine.
//!
//! [`ContentEncryptor`] and [`ContentDecryptor`] are push transforms: feed
//! bytes with `update`, collect output, call `finish` exactly once for the
//! final block handling (padding, AEAD tag). The generators and parsers
//! drive them; they can also be used directly.

mod cbc;
mod gcm;
mod mac;

pub use mac::{DigestCalculator, MacCalculator, PasswordMacBuilder, MAX_PBKDF2_ITERATIONS};

use sealwire_codec::Encoder;
use sealwire_types::{CmsError, ContentAlgId};

use crate::algid::AlgorithmIdentifier;
use crate::key::ContentEncryptionKey;
use crate::registry::registry;

use cbc::{BlockCipher, CbcDecryptor, CbcEncryptor};
use gcm::{GcmDecryptor, GcmEncryptor, GCM_TAG_LEN};

/// A streaming byte transform: zero or more `update` calls, one `finish`.
pub trait StreamTransform {
    /// Feed associated data (AEAD only; must precede all content).
    fn aad_update(&mut self, aad: &[u8]) -> Result<(), CmsError>;
    /// Transform `input`, appending any produced bytes to `out`.
    fn update(&mut self, input: &[u8], out: &mut Vec<u8>) -> Result<(), CmsError>;
    /// Flush final blocks / verify or emit the tag.
    fn finish(&mut self, out: &mut Vec<u8>) -> Result<(), CmsError>;
}

/// Map a requested key size in bits to a byte length, accepting the
/// algorithm's legacy size labels (168-bit three-key triple DES is keyed
/// with 192 bits of material).
pub fn negotiated_key_len(alg: ContentAlgId, requested_bits: usize) -> Result<usize, CmsError> {
    if requested_bits == alg.key_bits() || alg.legacy_key_bits().contains(&requested_bits) {
        Ok(alg.key_bits() / 8)
    } else {
        Err(CmsError::InvalidKeyLength {
            expected: alg.key_bits(),
            got: requested_bits,
        })
    }
}

fn random_iv(alg: ContentAlgId) -> Result<Vec<u8>, CmsError> {
    let mut iv = vec![0u8; alg.iv_len()];
    getrandom::getrandom(&mut iv).map_err(|_| CmsError::Rng)?;
    Ok(iv)
}

/// RFC 5084 GCMParameters. ICVlen defaults to 12 on the wire; we always
/// produce 16 and therefore always encode it.
fn gcm_parameters(nonce: &[u8], tag_len: usize) -> Vec<u8> {
    let mut inner = Encoder::new();
    inner.write_octet_string(nonce);
    inner.write_integer_u32(tag_len as u32);
    let mut enc = Encoder::new();
    enc.write_sequence(&inner.finish());
    enc.finish()
}

fn parse_gcm_parameters(alg_id: &AlgorithmIdentifier) -> Result<(Vec<u8>, usize), CmsError> {
    let raw = alg_id
        .params
        .as_deref()
        .ok_or(CmsError::Malformed("missing GCM parameters"))?;
    let mut dec = sealwire_codec::Decoder::new(raw);
    let mut seq = dec.read_sequence()?;
    let nonce = seq.read_octet_string()?.to_vec();
    let tag_len = if seq.is_empty() {
        12
    } else {
        seq.read_integer_u32()? as usize
    };
    Ok((nonce, tag_len))
}

enum EncInner {
    Cbc(CbcEncryptor),
    Gcm(GcmEncryptor),
}

/// Streaming content encryptor.
pub struct ContentEncryptor {
    alg: ContentAlgId,
    iv: Vec<u8>,
    inner: EncInner,
}

impl ContentEncryptor {
    /// Construct with a fresh random IV/nonce.
    pub fn new(alg: ContentAlgId, key: &ContentEncryptionKey) -> Result<Self, CmsError> {
        let iv = random_iv(alg)?;
        Self::with_iv(alg, key, &iv)
    }

    /// Construct with a caller-supplied IV/nonce (deterministic paths and
    /// tests; reusing a GCM nonce under one key breaks the mode).
    pub fn with_iv(
        alg: ContentAlgId,
        key: &ContentEncryptionKey,
        iv: &[u8],
    ) -> Result<Self, CmsError> {
        let inner = if alg.is_aead() {
            EncInner::Gcm(GcmEncryptor::new(alg, key.as_bytes(), iv)?)
        } else {
            EncInner::Cbc(CbcEncryptor::new(BlockCipher::new(alg, key.as_bytes())?, iv)?)
        };
        Ok(Self {
            alg,
            iv: iv.to_vec(),
            inner,
        })
    }

    pub fn algorithm(&self) -> ContentAlgId {
        self.alg
    }

    /// The contentEncryptionAlgorithm identifier, parameters included.
    pub fn algorithm_identifier(&self) -> AlgorithmIdentifier {
        let oid = registry().content_oid(self.alg);
        let params = if self.alg.is_aead() {
            gcm_parameters(&self.iv, GCM_TAG_LEN)
        } else {
            let mut enc = Encoder::new();
            enc.write_octet_string(&self.iv);
            enc.finish()
        };
        AlgorithmIdentifier::with_params(oid, params)
    }
}

impl StreamTransform for ContentEncryptor {
    fn aad_update(&mut self, aad: &[u8]) -> Result<(), CmsError> {
        match &mut self.inner {
            EncInner::Gcm(g) => g.aad_update(aad),
            EncInner::Cbc(_) => Err(CmsError::Sequencing(
                "associated data requires an AEAD algorithm",
            )),
        }
    }

    fn update(&mut self, input: &[u8], out: &mut Vec<u8>) -> Result<(), CmsError> {
        match &mut self.inner {
            EncInner::Gcm(g) => g.update(input, out),
            EncInner::Cbc(c) => c.update(input, out),
        }
    }

    fn finish(&mut self, out: &mut Vec<u8>) -> Result<(), CmsError> {
        match &mut self.inner {
            EncInner::Gcm(g) => g.finish(out),
            EncInner::Cbc(c) => c.finish(out),
        }
    }
}

enum DecInner {
    Cbc(CbcDecryptor),
    Gcm(GcmDecryptor),
}

/// Streaming content decryptor, built from a parsed algorithm identifier.
pub struct ContentDecryptor {
    inner: DecInner,
}

impl ContentDecryptor {
    pub fn for_algorithm(
        alg_id: &AlgorithmIdentifier,
        key: &ContentEncryptionKey,
    ) -> Result<Self, CmsError> {
        let alg = registry().content_by_oid(&alg_id.oid)?;
        let inner = if alg.is_aead() {
            let (nonce, tag_len) = parse_gcm_parameters(alg_id)?;
            DecInner::Gcm(GcmDecryptor::new(alg, key.as_bytes(), &nonce, tag_len)?)
        } else {
            let iv = alg_id
                .params_as_octet_string()
                .map_err(|_| CmsError::Malformed("missing CBC IV parameter"))?
                .to_vec();
            DecInner::Cbc(CbcDecryptor::new(BlockCipher::new(alg, key.as_bytes())?, &iv)?)
        };
        Ok(Self { inner })
    }
}

impl StreamTransform for ContentDecryptor {
    fn aad_update(&mut self, aad: &[u8]) -> Result<(), CmsError> {
        match &mut self.inner {
            DecInner::Gcm(g) => g.aad_update(aad),
            DecInner::Cbc(_) => Err(CmsError::Sequencing(
                "associated data requires an AEAD algorithm",
            )),
        }
    }

    fn update(&mut self, input: &[u8], out: &mut Vec<u8>) -> Result<(), CmsError> {
        match &mut self.inner {
            DecInner::Gcm(g) => g.update(input, out),
            DecInner::Cbc(c) => c.update(input, out),
        }
    }

    fn finish(&mut self, out: &mut Vec<u8>) -> Result<(), CmsError> {
        match &mut self.inner {
            DecInner::Gcm(g) => g.finish(out),
            DecInner::Cbc(c) => c.finish(out),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip_via_algorithm_identifier(alg: ContentAlgId) {
        let key = ContentEncryptionKey::generate(alg.key_bits() / 8).unwrap();
        let mut enc = ContentEncryptor::new(alg, &key).unwrap();
        let alg_id = enc.algorithm_identifier();

        let msg = b"the parameters round-trip through the identifier";
        let mut ct = Vec::new();
        enc.update(msg, &mut ct).unwrap();
        enc.finish(&mut ct).unwrap();

        let mut dec = ContentDecryptor::for_algorithm(&alg_id, &key).unwrap();
        let mut pt = Vec::new();
        dec.update(&ct, &mut pt).unwrap();
        dec.finish(&mut pt).unwrap();
        assert_eq!(pt, msg);
    }

    #[test]
    fn cbc_roundtrip_through_identifier() {
        roundtrip_via_algorithm_identifier(ContentAlgId::Aes256Cbc);
    }

    #[test]
    fn gcm_roundtrip_through_identifier() {
        roundtrip_via_algorithm_identifier(ContentAlgId::Aes128Gcm);
    }

    #[test]
    fn gcm_identifier_encodes_icv_len() {
        let key = ContentEncryptionKey::generate(16).unwrap();
        let enc = ContentEncryptor::new(ContentAlgId::Aes128Gcm, &key).unwrap();
        let alg_id = enc.algorithm_identifier();
        let (nonce, tag_len) = parse_gcm_parameters(&alg_id).unwrap();
        assert_eq!(nonce.len(), 12);
        assert_eq!(tag_len, 16);
    }

    #[test]
    fn aad_on_cbc_is_sequencing_error() {
        let key = ContentEncryptionKey::generate(16).unwrap();
        let mut enc = ContentEncryptor::new(ContentAlgId::Aes128Cbc, &key).unwrap();
        assert!(matches!(
            enc.aad_update(b"x"),
            Err(CmsError::Sequencing(_))
        ));
    }

    #[test]
    fn tdea_legacy_negotiation() {
        assert_eq!(negotiated_key_len(ContentAlgId::TdeaCbc, 168).unwrap(), 24);
        assert_eq!(negotiated_key_len(ContentAlgId::TdeaCbc, 192).unwrap(), 24);
        assert!(negotiated_key_len(ContentAlgId::TdeaCbc, 128).is_err());
        assert!(negotiated_key_len(ContentAlgId::Aes128Cbc, 168).is_err());
    }
}
