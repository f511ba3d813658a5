//! MAC and digest calculators.

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256, Sha384, Sha512};
use sealwire_types::{CmsError, DigestAlgId, MacAlgId};
use zeroize::Zeroizing;

use crate::algid::AlgorithmIdentifier;
use crate::registry::registry;

enum MacState {
    Sha256(Hmac<Sha256>),
    Sha384(Hmac<Sha384>),
    Sha512(Hmac<Sha512>),
}

/// A streaming HMAC calculator.
pub struct MacCalculator {
    alg: MacAlgId,
    state: MacState,
}

impl MacCalculator {
    pub fn new(alg: MacAlgId, key: &[u8]) -> Result<Self, CmsError> {
        let state = match alg {
            MacAlgId::HmacSha256 => MacState::Sha256(
                Hmac::new_from_slice(key).map_err(CmsError::op_failed)?,
            ),
            MacAlgId::HmacSha384 => MacState::Sha384(
                Hmac::new_from_slice(key).map_err(CmsError::op_failed)?,
            ),
            MacAlgId::HmacSha512 => MacState::Sha512(
                Hmac::new_from_slice(key).map_err(CmsError::op_failed)?,
            ),
        };
        Ok(Self { alg, state })
    }

    pub fn algorithm(&self) -> MacAlgId {
        self.alg
    }

    pub fn algorithm_identifier(&self) -> AlgorithmIdentifier {
        AlgorithmIdentifier::new(registry().mac_oid(self.alg))
    }

    pub fn update(&mut self, data: &[u8]) {
        match &mut self.state {
            MacState::Sha256(m) => m.update(data),
            MacState::Sha384(m) => m.update(data),
            MacState::Sha512(m) => m.update(data),
        }
    }

    pub fn finish(self) -> Vec<u8> {
        match self.state {
            MacState::Sha256(m) => m.finalize().into_bytes().to_vec(),
            MacState::Sha384(m) => m.finalize().into_bytes().to_vec(),
            MacState::Sha512(m) => m.finalize().into_bytes().to_vec(),
        }
    }
}

enum DigestState {
    Sha256(Sha256),
    Sha384(Sha384),
    Sha512(Sha512),
}

/// A streaming digest calculator.
pub struct DigestCalculator {
    alg: DigestAlgId,
    state: DigestState,
}

impl DigestCalculator {
    pub fn new(alg: DigestAlgId) -> Self {
        let state = match alg {
            DigestAlgId::Sha256 => DigestState::Sha256(Sha256::new()),
            DigestAlgId::Sha384 => DigestState::Sha384(Sha384::new()),
            DigestAlgId::Sha512 => DigestState::Sha512(Sha512::new()),
        };
        Self { alg, state }
    }

    pub fn algorithm(&self) -> DigestAlgId {
        self.alg
    }

    pub fn algorithm_identifier(&self) -> AlgorithmIdentifier {
        AlgorithmIdentifier::new(registry().digest_oid(self.alg))
    }

    pub fn update(&mut self, data: &[u8]) {
        match &mut self.state {
            DigestState::Sha256(d) => d.update(data),
            DigestState::Sha384(d) => d.update(data),
            DigestState::Sha512(d) => d.update(data),
        }
    }

    pub fn finish(self) -> Vec<u8> {
        match self.state {
            DigestState::Sha256(d) => d.finalize().to_vec(),
            DigestState::Sha384(d) => d.finalize().to_vec(),
            DigestState::Sha512(d) => d.finalize().to_vec(),
        }
    }
}

/// Iteration-count ceiling for password-derived MAC keys. Counts above
/// this are rejected at set time rather than burning CPU at build time.
pub const MAX_PBKDF2_ITERATIONS: u32 = 10_000_000;

/// Builds PBKDF2-keyed MAC calculators from a password.
///
/// Parameters are validated by the setters, so a builder that has been
/// configured successfully always builds.
pub struct PasswordMacBuilder {
    mac_alg: MacAlgId,
    salt: Vec<u8>,
    iterations: u32,
}

impl PasswordMacBuilder {
    pub fn new(mac_alg: MacAlgId) -> Result<Self, CmsError> {
        let mut salt = vec![0u8; 16];
        getrandom::getrandom(&mut salt).map_err(|_| CmsError::Rng)?;
        Ok(Self {
            mac_alg,
            salt,
            iterations: 100_000,
        })
    }

    pub fn set_salt(&mut self, salt: &[u8]) -> Result<&mut Self, CmsError> {
        if salt.is_empty() {
            return Err(CmsError::Malformed("empty PBKDF2 salt"));
        }
        self.salt = salt.to_vec();
        Ok(self)
    }

    pub fn set_iterations(&mut self, iterations: u32) -> Result<&mut Self, CmsError> {
        if iterations == 0 || iterations > MAX_PBKDF2_ITERATIONS {
            return Err(CmsError::Malformed("PBKDF2 iteration count out of range"));
        }
        self.iterations = iterations;
        Ok(self)
    }

    pub fn salt(&self) -> &[u8] {
        &self.salt
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    /// Derive the MAC key and return a ready calculator.
    pub fn build(&self, password: &[u8]) -> Result<MacCalculator, CmsError> {
        let mut key = Zeroizing::new(vec![0u8; self.mac_alg.output_len()]);
        pbkdf2::pbkdf2_hmac::<Sha256>(password, &self.salt, self.iterations, &mut key);
        MacCalculator::new(self.mac_alg, &key)
    }

    /// The PBKDF2 AlgorithmIdentifier describing this derivation.
    pub fn kdf_algorithm_identifier(&self) -> AlgorithmIdentifier {
        crate::recipient::pbkdf2_algorithm_identifier(
            &self.salt,
            self.iterations,
            self.mac_alg.output_len(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;
    use sealwire_codec::oid::known;

    #[test]
    fn hmac_sha256_rfc4231_case_2() {
        let mut mac = MacCalculator::new(MacAlgId::HmacSha256, b"Jefe").unwrap();
        mac.update(b"what do ya want ");
        mac.update(b"for nothing?");
        assert_eq!(
            mac.finish(),
            hex!("5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843")
        );
    }

    #[test]
    fn digest_matches_one_shot() {
        let mut d = DigestCalculator::new(DigestAlgId::Sha384);
        d.update(b"abc");
        assert_eq!(d.finish(), Sha384::digest(b"abc").to_vec());
    }

    #[test]
    fn mac_algorithm_identifier_has_no_params() {
        let mac = MacCalculator::new(MacAlgId::HmacSha512, &[0; 64]).unwrap();
        let alg = mac.algorithm_identifier();
        assert_eq!(alg.oid, known::HMAC_SHA512);
        assert!(alg.params.is_none());
    }

    #[test]
    fn builder_rejects_bad_iterations() {
        let mut b = PasswordMacBuilder::new(MacAlgId::HmacSha256).unwrap();
        assert!(b.set_iterations(0).is_err());
        assert!(b.set_iterations(MAX_PBKDF2_ITERATIONS + 1).is_err());
        assert!(b.set_iterations(2048).is_ok());
        assert_eq!(b.iterations(), 2048);
    }

    #[test]
    fn builder_is_deterministic_per_salt() {
        let mut b = PasswordMacBuilder::new(MacAlgId::HmacSha256).unwrap();
        b.set_salt(&[1, 2, 3, 4]).unwrap().set_iterations(1000).unwrap();
        let mut m1 = b.build(b"hunter2").unwrap();
        let mut m2 = b.build(b"hunter2").unwrap();
        m1.update(b"payload");
        m2.update(b"payload");
        assert_eq!(m1.finish(), m2.finish());
    }
}
