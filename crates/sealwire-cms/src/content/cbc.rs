//! CBC mode with PKCS#7 padding, composed over block cipher primitives.

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use sealwire_types::{CmsError, ContentAlgId};
use zeroize::Zeroizing;

/// Largest block size across supported ciphers.
pub(crate) const MAX_BLOCK: usize = 16;

pub(crate) enum BlockCipher {
    Aes128(aes::Aes128),
    Aes192(aes::Aes192),
    Aes256(aes::Aes256),
    Tdes(des::TdesEde3),
}

impl BlockCipher {
    pub(crate) fn new(alg: ContentAlgId, key: &[u8]) -> Result<Self, CmsError> {
        let expected = alg.key_bits() / 8;
        if key.len() != expected {
            return Err(CmsError::InvalidKeyLength {
                expected: alg.key_bits(),
                got: key.len() * 8,
            });
        }
        Ok(match alg {
            ContentAlgId::Aes128Cbc | ContentAlgId::Aes128Gcm => {
                BlockCipher::Aes128(aes::Aes128::new(GenericArray::from_slice(key)))
            }
            ContentAlgId::Aes192Cbc => {
                BlockCipher::Aes192(aes::Aes192::new(GenericArray::from_slice(key)))
            }
            ContentAlgId::Aes256Cbc | ContentAlgId::Aes256Gcm => {
                BlockCipher::Aes256(aes::Aes256::new(GenericArray::from_slice(key)))
            }
            ContentAlgId::TdeaCbc => {
                BlockCipher::Tdes(des::TdesEde3::new(GenericArray::from_slice(key)))
            }
        })
    }

    pub(crate) fn block_size(&self) -> usize {
        match self {
            BlockCipher::Tdes(_) => 8,
            _ => 16,
        }
    }

    pub(crate) fn encrypt_block(&self, block: &mut [u8]) {
        match self {
            BlockCipher::Aes128(c) => c.encrypt_block(GenericArray::from_mut_slice(block)),
            BlockCipher::Aes192(c) => c.encrypt_block(GenericArray::from_mut_slice(block)),
            BlockCipher::Aes256(c) => c.encrypt_block(GenericArray::from_mut_slice(block)),
            BlockCipher::Tdes(c) => c.encrypt_block(GenericArray::from_mut_slice(block)),
        }
    }

    fn decrypt_block(&self, block: &mut [u8]) {
        match self {
            BlockCipher::Aes128(c) => c.decrypt_block(GenericArray::from_mut_slice(block)),
            BlockCipher::Aes192(c) => c.decrypt_block(GenericArray::from_mut_slice(block)),
            BlockCipher::Aes256(c) => c.decrypt_block(GenericArray::from_mut_slice(block)),
            BlockCipher::Tdes(c) => c.decrypt_block(GenericArray::from_mut_slice(block)),
        }
    }
}

pub(crate) struct CbcEncryptor {
    cipher: BlockCipher,
    prev: [u8; MAX_BLOCK],
    pending: Zeroizing<Vec<u8>>,
    finished: bool,
}

impl CbcEncryptor {
    pub(crate) fn new(cipher: BlockCipher, iv: &[u8]) -> Result<Self, CmsError> {
        let bs = cipher.block_size();
        if iv.len() != bs {
            return Err(CmsError::Malformed("IV length does not match block size"));
        }
        let mut prev = [0u8; MAX_BLOCK];
        prev[..bs].copy_from_slice(iv);
        Ok(Self {
            cipher,
            prev,
            pending: Zeroizing::new(Vec::new()),
            finished: false,
        })
    }

    fn drain_full_blocks(&mut self, out: &mut Vec<u8>) {
        let bs = self.cipher.block_size();
        let full = (self.pending.len() / bs) * bs;
        for chunk in self.pending[..full].chunks_exact(bs) {
            let mut block = [0u8; MAX_BLOCK];
            for i in 0..bs {
                block[i] = chunk[i] ^ self.prev[i];
            }
            self.cipher.encrypt_block(&mut block[..bs]);
            self.prev[..bs].copy_from_slice(&block[..bs]);
            out.extend_from_slice(&block[..bs]);
        }
        self.pending.drain(..full);
    }

    pub(crate) fn update(&mut self, input: &[u8], out: &mut Vec<u8>) -> Result<(), CmsError> {
        if self.finished {
            return Err(CmsError::Sequencing("update after finish"));
        }
        self.pending.extend_from_slice(input);
        self.drain_full_blocks(out);
        Ok(())
    }

    pub(crate) fn finish(&mut self, out: &mut Vec<u8>) -> Result<(), CmsError> {
        if self.finished {
            return Err(CmsError::Sequencing("finish called twice"));
        }
        self.finished = true;
        let bs = self.cipher.block_size();
        let pad = bs - self.pending.len() % bs;
        self.pending.extend(std::iter::repeat(pad as u8).take(pad));
        self.drain_full_blocks(out);
        debug_assert!(self.pending.is_empty());
        Ok(())
    }
}

pub(crate) struct CbcDecryptor {
    cipher: BlockCipher,
    prev: [u8; MAX_BLOCK],
    pending: Zeroizing<Vec<u8>>,
    finished: bool,
}

impl CbcDecryptor {
    pub(crate) fn new(cipher: BlockCipher, iv: &[u8]) -> Result<Self, CmsError> {
        let bs = cipher.block_size();
        if iv.len() != bs {
            return Err(CmsError::Malformed("IV length does not match block size"));
        }
        let mut prev = [0u8; MAX_BLOCK];
        prev[..bs].copy_from_slice(iv);
        Ok(Self {
            cipher,
            prev,
            pending: Zeroizing::new(Vec::new()),
            finished: false,
        })
    }

    fn decrypt_blocks(&mut self, count: usize, out: &mut Vec<u8>) {
        let bs = self.cipher.block_size();
        for chunk in self.pending[..count * bs].chunks_exact(bs) {
            let mut block = [0u8; MAX_BLOCK];
            block[..bs].copy_from_slice(chunk);
            self.cipher.decrypt_block(&mut block[..bs]);
            for i in 0..bs {
                block[i] ^= self.prev[i];
            }
            self.prev[..bs].copy_from_slice(chunk);
            out.extend_from_slice(&block[..bs]);
        }
        self.pending.drain(..count * bs);
    }

    pub(crate) fn update(&mut self, input: &[u8], out: &mut Vec<u8>) -> Result<(), CmsError> {
        if self.finished {
            return Err(CmsError::Sequencing("update after finish"));
        }
        self.pending.extend_from_slice(input);
        let bs = self.cipher.block_size();
        // Hold back one full block: the padding block must be stripped at
        // finish, and we cannot know it is last until then.
        if self.pending.len() > bs {
            let mut full = self.pending.len() / bs;
            if self.pending.len() % bs == 0 {
                full -= 1;
            }
            self.decrypt_blocks(full, out);
        }
        Ok(())
    }

    pub(crate) fn finish(&mut self, out: &mut Vec<u8>) -> Result<(), CmsError> {
        if self.finished {
            return Err(CmsError::Sequencing("finish called twice"));
        }
        self.finished = true;
        let bs = self.cipher.block_size();
        if self.pending.len() != bs {
            // Ciphertext not a whole number of blocks (or empty).
            return Err(CmsError::op_failed_opaque());
        }
        let mut last = Zeroizing::new(Vec::new());
        self.decrypt_blocks(1, &mut last);
        let pad = *last.last().unwrap_or(&0) as usize;
        if pad == 0 || pad > bs || last[bs - pad..].iter().any(|&b| b as usize != pad) {
            return Err(CmsError::op_failed_opaque());
        }
        out.extend_from_slice(&last[..bs - pad]);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(alg: ContentAlgId, key: &[u8], iv: &[u8], msg: &[u8]) -> Vec<u8> {
        let mut enc = CbcEncryptor::new(BlockCipher::new(alg, key).unwrap(), iv).unwrap();
        let mut ct = Vec::new();
        // Feed in awkward pieces to exercise buffering.
        for chunk in msg.chunks(5) {
            enc.update(chunk, &mut ct).unwrap();
        }
        enc.finish(&mut ct).unwrap();
        assert_eq!(ct.len() % alg.block_size(), 0);
        assert!(ct.len() > msg.len());

        let mut dec = CbcDecryptor::new(BlockCipher::new(alg, key).unwrap(), iv).unwrap();
        let mut pt = Vec::new();
        for chunk in ct.chunks(7) {
            dec.update(chunk, &mut pt).unwrap();
        }
        dec.finish(&mut pt).unwrap();
        pt
    }

    #[test]
    fn aes128_roundtrip_partial_block() {
        let msg = b"cbc streaming with a non-aligned tail";
        assert_eq!(
            roundtrip(ContentAlgId::Aes128Cbc, &[0x11; 16], &[0x22; 16], msg),
            msg
        );
    }

    #[test]
    fn aes256_roundtrip_exact_block() {
        let msg = [0xABu8; 64];
        assert_eq!(
            roundtrip(ContentAlgId::Aes256Cbc, &[0x33; 32], &[0x44; 16], &msg),
            msg
        );
    }

    #[test]
    fn tdes_roundtrip_small_block() {
        let msg = b"legacy three-key triple des";
        assert_eq!(
            roundtrip(ContentAlgId::TdeaCbc, &[0x55; 24], &[0x66; 8], msg),
            msg
        );
    }

    #[test]
    fn empty_message_is_one_pad_block() {
        let mut enc = CbcEncryptor::new(
            BlockCipher::new(ContentAlgId::Aes128Cbc, &[0; 16]).unwrap(),
            &[0; 16],
        )
        .unwrap();
        let mut ct = Vec::new();
        enc.finish(&mut ct).unwrap();
        assert_eq!(ct.len(), 16);
    }

    #[test]
    fn corrupt_padding_is_opaque() {
        let key = [0x11; 16];
        let iv = [0x22; 16];
        let mut enc =
            CbcEncryptor::new(BlockCipher::new(ContentAlgId::Aes128Cbc, &key).unwrap(), &iv)
                .unwrap();
        let mut ct = Vec::new();
        enc.update(b"sixteen byte msg", &mut ct).unwrap();
        enc.finish(&mut ct).unwrap();
        let last = ct.len() - 1;
        ct[last] ^= 0xFF;

        let mut dec =
            CbcDecryptor::new(BlockCipher::new(ContentAlgId::Aes128Cbc, &key).unwrap(), &iv)
                .unwrap();
        let mut pt = Vec::new();
        dec.update(&ct, &mut pt).unwrap();
        let err = dec.finish(&mut pt).unwrap_err();
        assert_eq!(err.to_string(), "cryptographic operation failed");
    }

    #[test]
    fn wrong_key_length_rejected() {
        assert!(matches!(
            BlockCipher::new(ContentAlgId::Aes192Cbc, &[0; 16]),
            Err(CmsError::InvalidKeyLength {
                expected: 192,
                got: 128
            })
        ));
    }
}
