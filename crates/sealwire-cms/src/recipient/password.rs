//! Password recipients: PBKDF2-derived KEK, then AES key wrap.

use sealwire_types::{CmsError, WrapAlgId};
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::content::MAX_PBKDF2_ITERATIONS;
use crate::info::{PasswordRecipientInfo, RecipientId, RecipientInfo};
use crate::key::ContentEncryptionKey;
use crate::registry::registry;

use super::{
    parse_pbkdf2_params, pbkdf2_algorithm_identifier, unwrap_key, wrap_algorithm_identifier,
    wrap_key, Recipient, RecipientKind,
};

const DEFAULT_ITERATIONS: u32 = 100_000;

/// Produces a PasswordRecipientInfo.
pub struct PasswordGenerator {
    password: Zeroizing<Vec<u8>>,
    salt: Vec<u8>,
    iterations: u32,
    wrap: WrapAlgId,
}

impl PasswordGenerator {
    pub fn new(password: &[u8], wrap: WrapAlgId) -> Result<Self, CmsError> {
        let mut salt = vec![0u8; 16];
        getrandom::getrandom(&mut salt).map_err(|_| CmsError::Rng)?;
        Ok(Self {
            password: Zeroizing::new(password.to_vec()),
            salt,
            iterations: DEFAULT_ITERATIONS,
            wrap,
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

    pub(crate) fn generate(&self, cek: &ContentEncryptionKey) -> Result<RecipientInfo, CmsError> {
        let kek_len = self.wrap.key_bits() / 8;
        let mut kek = Zeroizing::new(vec![0u8; kek_len]);
        pbkdf2::pbkdf2_hmac::<Sha256>(&self.password, &self.salt, self.iterations, &mut kek);
        let encrypted_key = wrap_key(&kek, cek.as_bytes())?;
        Ok(RecipientInfo::Password(PasswordRecipientInfo {
            version: 0,
            key_derivation_algorithm: Some(pbkdf2_algorithm_identifier(
                &self.salt,
                self.iterations,
                kek_len,
            )),
            key_encryption_algorithm: wrap_algorithm_identifier(registry().wrap_oid(self.wrap)),
            encrypted_key,
        }))
    }
}

/// Password credential.
pub struct PasswordRecipient {
    password: Zeroizing<Vec<u8>>,
}

impl PasswordRecipient {
    pub fn new(password: &[u8]) -> Self {
        Self {
            password: Zeroizing::new(password.to_vec()),
        }
    }
}

impl Recipient for PasswordRecipient {
    fn kind(&self) -> RecipientKind {
        RecipientKind::Password
    }

    fn unwrap_cek(
        &self,
        info: &RecipientInfo,
        _id: &RecipientId,
    ) -> Result<ContentEncryptionKey, CmsError> {
        let RecipientInfo::Password(pwri) = info else {
            return Err(CmsError::RecipientKindMismatch);
        };
        let kdf = pwri
            .key_derivation_algorithm
            .as_ref()
            .ok_or(CmsError::Malformed("missing key-derivation algorithm"))?;
        let (salt, iterations, key_len) = parse_pbkdf2_params(kdf)?;
        if iterations == 0 || iterations > MAX_PBKDF2_ITERATIONS {
            return Err(CmsError::Malformed("PBKDF2 iteration count out of range"));
        }
        let wrap = registry().wrap_by_oid(&pwri.key_encryption_algorithm.oid)?;
        let kek_len = key_len.unwrap_or(wrap.key_bits() / 8);
        if kek_len * 8 != wrap.key_bits() {
            return Err(CmsError::InvalidKeyLength {
                expected: wrap.key_bits(),
                got: kek_len * 8,
            });
        }
        let mut kek = Zeroizing::new(vec![0u8; kek_len]);
        pbkdf2::pbkdf2_hmac::<Sha256>(&self.password, &salt, iterations, &mut kek);
        let cek = unwrap_key(&kek, &pwri.encrypted_key)?;
        Ok(ContentEncryptionKey::from_bytes(&cek))
    }
}
