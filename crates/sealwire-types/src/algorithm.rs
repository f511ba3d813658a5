/// Content-encryption algorithm identifiers (cipher + mode).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentAlgId {
    Aes128Cbc,
    Aes192Cbc,
    Aes256Cbc,
    Aes128Gcm,
    Aes256Gcm,
    TdeaCbc,
}

impl ContentAlgId {
    /// Canonical key size in bits.
    pub fn key_bits(self) -> usize {
        match self {
            ContentAlgId::Aes128Cbc | ContentAlgId::Aes128Gcm => 128,
            ContentAlgId::Aes192Cbc | ContentAlgId::TdeaCbc => 192,
            ContentAlgId::Aes256Cbc | ContentAlgId::Aes256Gcm => 256,
        }
    }

    /// Legacy key size labels accepted in place of the canonical size.
    ///
    /// Three-key triple DES is conventionally labelled 168-bit even though
    /// the key material is 192 bits including parity.
    pub fn legacy_key_bits(self) -> &'static [usize] {
        match self {
            ContentAlgId::TdeaCbc => &[168],
            _ => &[],
        }
    }

    /// Cipher block size in bytes (GCM reported as its AES block).
    pub fn block_size(self) -> usize {
        match self {
            ContentAlgId::TdeaCbc => 8,
            _ => 16,
        }
    }

    /// IV / nonce length in bytes.
    pub fn iv_len(self) -> usize {
        match self {
            ContentAlgId::Aes128Gcm | ContentAlgId::Aes256Gcm => 12,
            ContentAlgId::TdeaCbc => 8,
            _ => 16,
        }
    }

    /// True for AEAD modes.
    pub fn is_aead(self) -> bool {
        matches!(self, ContentAlgId::Aes128Gcm | ContentAlgId::Aes256Gcm)
    }
}

/// Key-wrap algorithm identifiers (RFC 3394 AES key wrap).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WrapAlgId {
    Aes128Wrap,
    Aes192Wrap,
    Aes256Wrap,
}

impl WrapAlgId {
    pub fn key_bits(self) -> usize {
        match self {
            WrapAlgId::Aes128Wrap => 128,
            WrapAlgId::Aes192Wrap => 192,
            WrapAlgId::Aes256Wrap => 256,
        }
    }

    /// Pick the wrap algorithm whose KEK is `bits` long.
    pub fn for_key_bits(bits: usize) -> Option<Self> {
        match bits {
            128 => Some(WrapAlgId::Aes128Wrap),
            192 => Some(WrapAlgId::Aes192Wrap),
            256 => Some(WrapAlgId::Aes256Wrap),
            _ => None,
        }
    }
}

/// MAC algorithm identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MacAlgId {
    HmacSha256,
    HmacSha384,
    HmacSha512,
}

impl MacAlgId {
    /// MAC output length in bytes.
    pub fn output_len(self) -> usize {
        match self {
            MacAlgId::HmacSha256 => 32,
            MacAlgId::HmacSha384 => 48,
            MacAlgId::HmacSha512 => 64,
        }
    }
}

/// Digest algorithm identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DigestAlgId {
    Sha256,
    Sha384,
    Sha512,
}

impl DigestAlgId {
    pub fn output_len(self) -> usize {
        match self {
            DigestAlgId::Sha256 => 32,
            DigestAlgId::Sha384 => 48,
            DigestAlgId::Sha512 => 64,
        }
    }
}

/// Key-derivation function identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KdfAlgId {
    Pbkdf2HmacSha256,
    HkdfSha256,
    X963Sha256,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tdea_legacy_label() {
        assert_eq!(ContentAlgId::TdeaCbc.key_bits(), 192);
        assert_eq!(ContentAlgId::TdeaCbc.legacy_key_bits(), &[168]);
    }

    #[test]
    fn wrap_for_key_bits() {
        assert_eq!(WrapAlgId::for_key_bits(128), Some(WrapAlgId::Aes128Wrap));
        assert_eq!(WrapAlgId::for_key_bits(200), None);
    }
}
