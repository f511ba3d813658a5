//! Galois/Counter Mode composed incrementally for streaming.
//!
//! CTR keystream with a 32-bit big-endian block counter over the 12-byte
//! nonce, GHASH absorbed as ciphertext is produced. Decryption withholds
//! the trailing tag bytes and verifies at finish; any plaintext surfaced
//! before that point is provisional until finish succeeds.

use ghash::universal_hash::{KeyInit, UniversalHash};
use ghash::GHash;
use sealwire_types::{CmsError, ContentAlgId};
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use super::cbc::BlockCipher;

pub(crate) const GCM_NONCE_LEN: usize = 12;
pub(crate) const GCM_TAG_LEN: usize = 16;

struct GcmCore {
    cipher: BlockCipher,
    ghash: GHash,
    nonce: [u8; GCM_NONCE_LEN],
    counter: u32,
    keystream: Zeroizing<[u8; 16]>,
    keystream_used: usize,
    residue: [u8; 16],
    residue_len: usize,
    aad_len: u64,
    data_len: u64,
    aad_open: bool,
}

impl GcmCore {
    fn new(alg: ContentAlgId, key: &[u8], nonce: &[u8]) -> Result<Self, CmsError> {
        if !alg.is_aead() {
            return Err(CmsError::Malformed("not an AEAD algorithm"));
        }
        if nonce.len() != GCM_NONCE_LEN {
            return Err(CmsError::Malformed("GCM nonce must be 12 bytes"));
        }
        let cipher = BlockCipher::new(alg, key)?;
        let mut h = [0u8; 16];
        cipher.encrypt_block(&mut h);
        let ghash = GHash::new(ghash::Key::from_slice(&h));
        let mut n = [0u8; GCM_NONCE_LEN];
        n.copy_from_slice(nonce);
        Ok(Self {
            cipher,
            ghash,
            nonce: n,
            // Block 1 is reserved for the tag mask; data starts at 2.
            counter: 2,
            keystream: Zeroizing::new([0u8; 16]),
            keystream_used: 16,
            residue: [0u8; 16],
            residue_len: 0,
            aad_len: 0,
            data_len: 0,
            aad_open: true,
        })
    }

    fn counter_block(&self, counter: u32) -> [u8; 16] {
        let mut block = [0u8; 16];
        block[..GCM_NONCE_LEN].copy_from_slice(&self.nonce);
        block[GCM_NONCE_LEN..].copy_from_slice(&counter.to_be_bytes());
        block
    }

    fn xor_keystream(&mut self, data: &mut [u8]) {
        for byte in data {
            if self.keystream_used == 16 {
                let mut block = self.counter_block(self.counter);
                self.counter = self.counter.wrapping_add(1);
                self.cipher.encrypt_block(&mut block);
                self.keystream.copy_from_slice(&block);
                self.keystream_used = 0;
            }
            *byte ^= self.keystream[self.keystream_used];
            self.keystream_used += 1;
        }
    }

    fn absorb(&mut self, mut data: &[u8]) {
        if self.residue_len > 0 {
            let take = data.len().min(16 - self.residue_len);
            self.residue[self.residue_len..self.residue_len + take]
                .copy_from_slice(&data[..take]);
            self.residue_len += take;
            data = &data[take..];
            if self.residue_len == 16 {
                let block = ghash::Block::clone_from_slice(&self.residue);
                self.ghash.update(&[block]);
                self.residue_len = 0;
            }
            // A still-partial residue must survive a fully consumed call.
            if data.is_empty() {
                return;
            }
        }
        let full = (data.len() / 16) * 16;
        for chunk in data[..full].chunks_exact(16) {
            let block = ghash::Block::clone_from_slice(chunk);
            self.ghash.update(&[block]);
        }
        let rest = &data[full..];
        self.residue[..rest.len()].copy_from_slice(rest);
        self.residue_len = rest.len();
    }

    fn flush_residue(&mut self) {
        if self.residue_len > 0 {
            self.residue[self.residue_len..].fill(0);
            let block = ghash::Block::clone_from_slice(&self.residue);
            self.ghash.update(&[block]);
            self.residue_len = 0;
        }
    }

    fn aad_update(&mut self, aad: &[u8]) -> Result<(), CmsError> {
        if !self.aad_open {
            return Err(CmsError::Sequencing(
                "associated data must precede content",
            ));
        }
        self.aad_len += aad.len() as u64;
        self.absorb(aad);
        Ok(())
    }

    fn seal_aad(&mut self) {
        if self.aad_open {
            self.flush_residue();
            self.aad_open = false;
        }
    }

    fn tag(&mut self) -> [u8; 16] {
        self.flush_residue();
        let mut lengths = [0u8; 16];
        lengths[..8].copy_from_slice(&(self.aad_len * 8).to_be_bytes());
        lengths[8..].copy_from_slice(&(self.data_len * 8).to_be_bytes());
        self.ghash.update(&[ghash::Block::clone_from_slice(&lengths)]);
        let s = self.ghash.clone().finalize();
        let mut mask = self.counter_block(1);
        self.cipher.encrypt_block(&mut mask);
        let mut tag = [0u8; 16];
        for i in 0..16 {
            tag[i] = s[i] ^ mask[i];
        }
        tag
    }
}

pub(crate) struct GcmEncryptor {
    core: GcmCore,
    finished: bool,
}

impl GcmEncryptor {
    pub(crate) fn new(alg: ContentAlgId, key: &[u8], nonce: &[u8]) -> Result<Self, CmsError> {
        Ok(Self {
            core: GcmCore::new(alg, key, nonce)?,
            finished: false,
        })
    }

    pub(crate) fn aad_update(&mut self, aad: &[u8]) -> Result<(), CmsError> {
        self.core.aad_update(aad)
    }

    pub(crate) fn update(&mut self, input: &[u8], out: &mut Vec<u8>) -> Result<(), CmsError> {
        if self.finished {
            return Err(CmsError::Sequencing("update after finish"));
        }
        self.core.seal_aad();
        let start = out.len();
        out.extend_from_slice(input);
        self.core.xor_keystream(&mut out[start..]);
        self.core.absorb(&out[start..]);
        self.core.data_len += input.len() as u64;
        Ok(())
    }

    /// Append the 16-byte authentication tag.
    pub(crate) fn finish(&mut self, out: &mut Vec<u8>) -> Result<(), CmsError> {
        if self.finished {
            return Err(CmsError::Sequencing("finish called twice"));
        }
        self.finished = true;
        self.core.seal_aad();
        out.extend_from_slice(&self.core.tag());
        Ok(())
    }
}

pub(crate) struct GcmDecryptor {
    core: GcmCore,
    lag: Zeroizing<Vec<u8>>,
    tag_len: usize,
    finished: bool,
}

impl GcmDecryptor {
    pub(crate) fn new(
        alg: ContentAlgId,
        key: &[u8],
        nonce: &[u8],
        tag_len: usize,
    ) -> Result<Self, CmsError> {
        if !(12..=16).contains(&tag_len) {
            return Err(CmsError::Malformed("unsupported GCM tag length"));
        }
        Ok(Self {
            core: GcmCore::new(alg, key, nonce)?,
            lag: Zeroizing::new(Vec::new()),
            tag_len,
            finished: false,
        })
    }

    pub(crate) fn aad_update(&mut self, aad: &[u8]) -> Result<(), CmsError> {
        self.core.aad_update(aad)
    }

    pub(crate) fn update(&mut self, input: &[u8], out: &mut Vec<u8>) -> Result<(), CmsError> {
        if self.finished {
            return Err(CmsError::Sequencing("update after finish"));
        }
        self.core.seal_aad();
        self.lag.extend_from_slice(input);
        // Everything beyond a candidate trailing tag is ciphertext.
        if self.lag.len() > self.tag_len {
            let n = self.lag.len() - self.tag_len;
            let start = out.len();
            out.extend_from_slice(&self.lag[..n]);
            self.core.absorb(&out[start..]);
            self.core.xor_keystream(&mut out[start..]);
            self.core.data_len += n as u64;
            self.lag.drain(..n);
        }
        Ok(())
    }

    /// Verify the withheld tag; fail-closed.
    pub(crate) fn finish(&mut self, _out: &mut Vec<u8>) -> Result<(), CmsError> {
        if self.finished {
            return Err(CmsError::Sequencing("finish called twice"));
        }
        self.finished = true;
        self.core.seal_aad();
        if self.lag.len() != self.tag_len {
            return Err(CmsError::AuthenticationFailed);
        }
        let expected = self.core.tag();
        if expected[..self.tag_len].ct_eq(&self.lag).into() {
            Ok(())
        } else {
            Err(CmsError::AuthenticationFailed)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    fn seal(key: &[u8], nonce: &[u8], aad: &[u8], msg: &[u8], chunk: usize) -> Vec<u8> {
        let alg = if key.len() == 16 {
            ContentAlgId::Aes128Gcm
        } else {
            ContentAlgId::Aes256Gcm
        };
        let mut enc = GcmEncryptor::new(alg, key, nonce).unwrap();
        if !aad.is_empty() {
            enc.aad_update(aad).unwrap();
        }
        let mut ct = Vec::new();
        for piece in msg.chunks(chunk.max(1)) {
            enc.update(piece, &mut ct).unwrap();
        }
        enc.finish(&mut ct).unwrap();
        ct
    }

    fn open(key: &[u8], nonce: &[u8], aad: &[u8], ct: &[u8], chunk: usize) -> Result<Vec<u8>, CmsError> {
        let alg = if key.len() == 16 {
            ContentAlgId::Aes128Gcm
        } else {
            ContentAlgId::Aes256Gcm
        };
        let mut dec = GcmDecryptor::new(alg, key, nonce, GCM_TAG_LEN)?;
        if !aad.is_empty() {
            dec.aad_update(aad)?;
        }
        let mut pt = Vec::new();
        for piece in ct.chunks(chunk.max(1)) {
            dec.update(piece, &mut pt)?;
        }
        dec.finish(&mut pt)?;
        Ok(pt)
    }

    // NIST GCM test vector: AES-128, 96-bit IV, no AAD, empty plaintext.
    #[test]
    fn nist_empty_plaintext_tag() {
        let key = hex!("00000000000000000000000000000000");
        let nonce = hex!("000000000000000000000000");
        let ct = seal(&key, &nonce, &[], &[], 1);
        assert_eq!(ct, hex!("58e2fccefa7e3061367f1d57a4e7455a"));
    }

    // NIST GCM test vector: single zero block.
    #[test]
    fn nist_single_block() {
        let key = hex!("00000000000000000000000000000000");
        let nonce = hex!("000000000000000000000000");
        let msg = hex!("00000000000000000000000000000000");
        let ct = seal(&key, &nonce, &[], &msg, 16);
        assert_eq!(
            ct,
            hex!("0388dace60b6a392f328c2b971b2fe78 ab6e47d42cec13bdf53a67b21257bddf")
        );
    }

    // NIST GCM test case 4: four blocks minus 4 bytes, with AAD.
    #[test]
    fn nist_with_aad() {
        let key = hex!("feffe9928665731c6d6a8f9467308308");
        let nonce = hex!("cafebabefacedbaddecaf888");
        let msg = hex!(
            "d9313225f88406e5a55909c5aff5269a"
            "86a7a9531534f7da2e4c303d8a318a72"
            "1c3c0c95956809532fcf0e2449a6b525"
            "b16aedf5aa0de657ba637b39"
        );
        let aad = hex!("feedfacedeadbeeffeedfacedeadbeef abaddad2");
        let ct = seal(&key, &nonce, &aad, &msg, 3);
        assert_eq!(
            ct[..msg.len()],
            hex!(
                "42831ec2217774244b7221b784d0d49c"
                "e3aa212f2c02a4e035c17e2329aca12e"
                "21d514b25466931c7d8f6a5aac84aa05"
                "1ba30b396a0aac973d58e091"
            )
        );
        assert_eq!(ct[msg.len()..], hex!("5bc94fbc3221a5db94fae95ae7121a47"));
        assert_eq!(open(&key, &nonce, &aad, &ct, 7).unwrap(), msg);
    }

    #[test]
    fn tag_is_update_chunk_size_independent() {
        let key = [0x21; 16];
        let nonce = [0x09; 12];
        let msg = [0x5Au8; 60];
        let aad = b"twenty bytes of aad.";
        let whole = seal(&key, &nonce, aad, &msg, msg.len());
        for chunk in [1usize, 3, 7, 16, 33] {
            assert_eq!(seal(&key, &nonce, aad, &msg, chunk), whole, "chunk {chunk}");
        }
        assert_eq!(open(&key, &nonce, aad, &whole, 5).unwrap(), msg);
    }

    #[test]
    fn tampered_tag_fails_closed() {
        let key = [0x0F; 32];
        let nonce = [0x01; 12];
        let mut ct = seal(&key, &nonce, &[], b"some content to protect", 4);
        let last = ct.len() - 1;
        ct[last] ^= 1;
        assert!(matches!(
            open(&key, &nonce, &[], &ct, 4),
            Err(CmsError::AuthenticationFailed)
        ));
    }

    #[test]
    fn tampered_ciphertext_fails_closed() {
        let key = [0x0F; 16];
        let nonce = [0x01; 12];
        let mut ct = seal(&key, &nonce, b"aad", b"some content to protect", 9);
        ct[0] ^= 1;
        assert!(open(&key, &nonce, b"aad", &ct, 9).is_err());
    }

    #[test]
    fn aad_after_data_is_sequencing_error() {
        let mut enc = GcmEncryptor::new(ContentAlgId::Aes128Gcm, &[0; 16], &[0; 12]).unwrap();
        let mut ct = Vec::new();
        enc.update(b"x", &mut ct).unwrap();
        assert!(matches!(
            enc.aad_update(b"late"),
            Err(CmsError::Sequencing(_))
        ));
    }

    #[test]
    fn truncated_stream_fails() {
        let key = [0x0F; 16];
        let nonce = [0x02; 12];
        let ct = seal(&key, &nonce, &[], b"hello", 5);
        // Drop the final byte of the tag.
        assert!(open(&key, &nonce, &[], &ct[..ct.len() - 1], 3).is_err());
    }
}
