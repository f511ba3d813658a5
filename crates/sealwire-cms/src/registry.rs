//! Read-only algorithm identifier registry.
//!
//! Built once on first use, immutable afterwards; concurrent lookups need
//! no further synchronization. Every OID-to-algorithm mapping the engine
//! understands lives here, so "do we support this message" is answered in
//! one place.

use std::sync::OnceLock;

use sealwire_codec::oid::{known, Oid};
use sealwire_types::{
    CmsError, ContentAlgId, DigestAlgId, KdfAlgId, MacAlgId, WrapAlgId,
};

/// Bidirectional OID mapping tables for the supported algorithm families.
pub struct AlgorithmRegistry {
    content: Vec<(&'static [u8], ContentAlgId)>,
    wrap: Vec<(&'static [u8], WrapAlgId)>,
    mac: Vec<(&'static [u8], MacAlgId)>,
    digest: Vec<(&'static [u8], DigestAlgId)>,
    kdf: Vec<(&'static [u8], KdfAlgId)>,
}

/// The process-wide registry.
pub fn registry() -> &'static AlgorithmRegistry {
    static REGISTRY: OnceLock<AlgorithmRegistry> = OnceLock::new();
    REGISTRY.get_or_init(AlgorithmRegistry::build)
}

impl AlgorithmRegistry {
    fn build() -> Self {
        Self {
            content: vec![
                (known::AES128_CBC, ContentAlgId::Aes128Cbc),
                (known::AES192_CBC, ContentAlgId::Aes192Cbc),
                (known::AES256_CBC, ContentAlgId::Aes256Cbc),
                (known::AES128_GCM, ContentAlgId::Aes128Gcm),
                (known::AES256_GCM, ContentAlgId::Aes256Gcm),
                (known::DES_EDE3_CBC, ContentAlgId::TdeaCbc),
            ],
            wrap: vec![
                (known::AES128_WRAP, WrapAlgId::Aes128Wrap),
                (known::AES192_WRAP, WrapAlgId::Aes192Wrap),
                (known::AES256_WRAP, WrapAlgId::Aes256Wrap),
            ],
            mac: vec![
                (known::HMAC_SHA256, MacAlgId::HmacSha256),
                (known::HMAC_SHA384, MacAlgId::HmacSha384),
                (known::HMAC_SHA512, MacAlgId::HmacSha512),
            ],
            digest: vec![
                (known::SHA256, DigestAlgId::Sha256),
                (known::SHA384, DigestAlgId::Sha384),
                (known::SHA512, DigestAlgId::Sha512),
            ],
            kdf: vec![
                (known::PBKDF2, KdfAlgId::Pbkdf2HmacSha256),
                (known::HKDF_SHA256, KdfAlgId::HkdfSha256),
                (known::DH_SINGLEPASS_STDDH_SHA256KDF, KdfAlgId::X963Sha256),
            ],
        }
    }

    pub fn content_by_oid(&self, oid: &[u8]) -> Result<ContentAlgId, CmsError> {
        lookup(&self.content, oid)
    }

    pub fn wrap_by_oid(&self, oid: &[u8]) -> Result<WrapAlgId, CmsError> {
        lookup(&self.wrap, oid)
    }

    pub fn mac_by_oid(&self, oid: &[u8]) -> Result<MacAlgId, CmsError> {
        lookup(&self.mac, oid)
    }

    pub fn digest_by_oid(&self, oid: &[u8]) -> Result<DigestAlgId, CmsError> {
        lookup(&self.digest, oid)
    }

    pub fn kdf_by_oid(&self, oid: &[u8]) -> Result<KdfAlgId, CmsError> {
        lookup(&self.kdf, oid)
    }

    pub fn content_oid(&self, alg: ContentAlgId) -> &'static [u8] {
        reverse(&self.content, alg)
    }

    pub fn wrap_oid(&self, alg: WrapAlgId) -> &'static [u8] {
        reverse(&self.wrap, alg)
    }

    pub fn mac_oid(&self, alg: MacAlgId) -> &'static [u8] {
        reverse(&self.mac, alg)
    }

    pub fn digest_oid(&self, alg: DigestAlgId) -> &'static [u8] {
        reverse(&self.digest, alg)
    }
}

fn lookup<T: Copy>(table: &[(&'static [u8], T)], oid: &[u8]) -> Result<T, CmsError> {
    table
        .iter()
        .find(|(o, _)| *o == oid)
        .map(|(_, alg)| *alg)
        .ok_or_else(|| unsupported(oid))
}

fn reverse<T: Copy + PartialEq>(table: &[(&'static [u8], T)], alg: T) -> &'static [u8] {
    // Every enum variant is registered in build(); the table is total.
    table
        .iter()
        .find(|(_, a)| *a == alg)
        .map(|(o, _)| *o)
        .unwrap_or(&[])
}

fn unsupported(oid: &[u8]) -> CmsError {
    let name = Oid::from_der_value(oid)
        .map(|o| o.to_dot_string())
        .unwrap_or_else(|_| "<invalid oid>".to_string());
    CmsError::UnsupportedAlgorithm(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_content_oid_resolves() {
        let reg = registry();
        assert_eq!(
            reg.content_by_oid(known::AES256_GCM).unwrap(),
            ContentAlgId::Aes256Gcm
        );
        assert_eq!(reg.content_oid(ContentAlgId::Aes256Gcm), known::AES256_GCM);
    }

    #[test]
    fn unknown_oid_names_itself() {
        let err = registry().content_by_oid(known::SHA256).unwrap_err();
        match err {
            CmsError::UnsupportedAlgorithm(name) => {
                assert_eq!(name, "2.16.840.1.101.3.4.2.1");
            }
            other => panic!("wrong error: {other:?}"),
        }
    }

    #[test]
    fn every_family_registered() {
        let reg = registry();
        assert!(reg.wrap_by_oid(known::AES192_WRAP).is_ok());
        assert!(reg.mac_by_oid(known::HMAC_SHA512).is_ok());
        assert!(reg.digest_by_oid(known::SHA384).is_ok());
        assert!(reg.kdf_by_oid(known::PBKDF2).is_ok());
    }
}
