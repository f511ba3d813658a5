//! Content-encryption key material.

use sealwire_types::CmsError;
use zeroize::Zeroizing;

/// A content-encryption key (or MAC key for authenticated data).
///
/// The bytes are zeroed when the value is dropped. There is deliberately no
/// `Debug` passthrough of the key material.
#[derive(Clone)]
pub struct ContentEncryptionKey(Zeroizing<Vec<u8>>);

impl ContentEncryptionKey {
    /// Generate a fresh random key of `len` bytes.
    pub fn generate(len: usize) -> Result<Self, CmsError> {
        let mut bytes = Zeroizing::new(vec![0u8; len]);
        getrandom::getrandom(&mut bytes).map_err(|_| CmsError::Rng)?;
        Ok(Self(bytes))
    }

    /// Wrap existing key bytes (copied, source should be zeroed by caller).
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(Zeroizing::new(bytes.to_vec()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for ContentEncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ContentEncryptionKey({} bytes)", self.0.len())
    }
}
