//! Object identifiers.

use std::fmt;

use sealwire_types::CodecError;

/// An ASN.1 OBJECT IDENTIFIER.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Oid {
    arcs: Vec<u32>,
}

impl Oid {
    /// Build from component arcs. Needs at least two arcs with a valid
    /// leading pair.
    pub fn new(arcs: &[u32]) -> Result<Self, CodecError> {
        if arcs.len() < 2 || arcs[0] > 2 || (arcs[0] < 2 && arcs[1] > 39) {
            return Err(CodecError::InvalidOid);
        }
        Ok(Self {
            arcs: arcs.to_vec(),
        })
    }

    pub fn arcs(&self) -> &[u32] {
        &self.arcs
    }

    /// Encode to the DER contents octets (without tag and length).
    pub fn to_der_value(&self) -> Vec<u8> {
        let mut out = Vec::new();
        let first = self.arcs[0] * 40 + self.arcs[1];
        encode_base128(&mut out, first);
        for &arc in &self.arcs[2..] {
            encode_base128(&mut out, arc);
        }
        out
    }

    /// Decode from the DER contents octets.
    pub fn from_der_value(bytes: &[u8]) -> Result<Self, CodecError> {
        if bytes.is_empty() {
            return Err(CodecError::InvalidOid);
        }
        let mut arcs = Vec::new();
        let mut value: u32 = 0;
        let mut in_arc = false;
        for (i, &b) in bytes.iter().enumerate() {
            if !in_arc && b == 0x80 {
                // Leading padding octet is not minimal encoding.
                return Err(CodecError::InvalidOid);
            }
            in_arc = true;
            value = value.checked_shl(7).ok_or(CodecError::InvalidOid)? | (b & 0x7F) as u32;
            if (b & 0x80) == 0 {
                if arcs.is_empty() {
                    if value < 40 {
                        arcs.push(0);
                        arcs.push(value);
                    } else if value < 80 {
                        arcs.push(1);
                        arcs.push(value - 40);
                    } else {
                        arcs.push(2);
                        arcs.push(value - 80);
                    }
                } else {
                    arcs.push(value);
                }
                value = 0;
                in_arc = false;
            } else if i == bytes.len() - 1 {
                return Err(CodecError::Truncated);
            }
        }
        Ok(Self { arcs })
    }

    /// Dotted decimal form, e.g. "1.2.840.113549.1.7.3".
    pub fn to_dot_string(&self) -> String {
        self.arcs
            .iter()
            .map(|a| a.to_string())
            .collect::<Vec<_>>()
            .join(".")
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_dot_string())
    }
}

fn encode_base128(out: &mut Vec<u8>, mut value: u32) {
    let mut bytes = [0u8; 5];
    let mut n = 0;
    loop {
        bytes[n] = (value & 0x7F) as u8;
        value >>= 7;
        n += 1;
        if value == 0 {
            break;
        }
    }
    for i in (0..n).rev() {
        if i > 0 {
            out.push(bytes[i] | 0x80);
        } else {
            out.push(bytes[i]);
        }
    }
}

/// Well-known object identifiers, as DER contents octets.
pub mod known {
    // ── Content types (PKCS#7 / SMIME) ───────────────────────────────

    /// 1.2.840.113549.1.7.1 — id-data
    pub const PKCS7_DATA: &[u8] = &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x07, 0x01];
    /// 1.2.840.113549.1.7.3 — id-envelopedData
    pub const ENVELOPED_DATA: &[u8] = &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x07, 0x03];
    /// 1.2.840.113549.1.7.6 — id-encryptedData
    pub const ENCRYPTED_DATA: &[u8] = &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x07, 0x06];
    /// 1.2.840.113549.1.9.16.1.2 — id-ct-authData
    pub const CT_AUTH_DATA: &[u8] = &[
        0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x09, 0x10, 0x01, 0x02,
    ];

    // ── Content encryption ───────────────────────────────────────────

    /// 2.16.840.1.101.3.4.1.2 — aes128-CBC
    pub const AES128_CBC: &[u8] = &[0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x01, 0x02];
    /// 2.16.840.1.101.3.4.1.22 — aes192-CBC
    pub const AES192_CBC: &[u8] = &[0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x01, 0x16];
    /// 2.16.840.1.101.3.4.1.42 — aes256-CBC
    pub const AES256_CBC: &[u8] = &[0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x01, 0x2A];
    /// 2.16.840.1.101.3.4.1.6 — aes128-GCM
    pub const AES128_GCM: &[u8] = &[0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x01, 0x06];
    /// 2.16.840.1.101.3.4.1.46 — aes256-GCM
    pub const AES256_GCM: &[u8] = &[0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x01, 0x2E];
    /// 1.2.840.113549.3.7 — des-EDE3-CBC
    pub const DES_EDE3_CBC: &[u8] = &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x03, 0x07];

    // ── Key wrap ─────────────────────────────────────────────────────

    /// 2.16.840.1.101.3.4.1.5 — id-aes128-wrap
    pub const AES128_WRAP: &[u8] = &[0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x01, 0x05];
    /// 2.16.840.1.101.3.4.1.25 — id-aes192-wrap
    pub const AES192_WRAP: &[u8] = &[0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x01, 0x19];
    /// 2.16.840.1.101.3.4.1.45 — id-aes256-wrap
    pub const AES256_WRAP: &[u8] = &[0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x01, 0x2D];
    /// 1.2.840.113549.1.9.16.3.6 — id-alg-CMS3DESwrap
    pub const DES_EDE3_WRAP: &[u8] = &[
        0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x09, 0x10, 0x03, 0x06,
    ];
    /// 1.2.643.2.2.13.1 — gostWrap (CryptoPro)
    pub const GOST28147_WRAP: &[u8] = &[0x2A, 0x85, 0x03, 0x02, 0x02, 0x0D, 0x01];

    // ── Key transport / agreement ────────────────────────────────────

    /// 1.2.840.113549.1.1.1 — rsaEncryption
    pub const RSA_ENCRYPTION: &[u8] = &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x01, 0x01];
    /// 1.2.840.113549.1.1.7 — id-RSAES-OAEP
    pub const RSAES_OAEP: &[u8] = &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x01, 0x07];
    /// 1.2.840.113549.1.1.8 — id-mgf1
    pub const MGF1: &[u8] = &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x01, 0x08];
    /// 1.3.101.110 — id-X25519
    pub const X25519: &[u8] = &[0x2B, 0x65, 0x6E];
    /// 1.3.132.1.11.1 — dhSinglePass-stdDH-sha256kdf-scheme
    pub const DH_SINGLEPASS_STDDH_SHA256KDF: &[u8] = &[0x2B, 0x81, 0x04, 0x01, 0x0B, 0x01];
    /// 1.2.840.113549.1.9.16.13.3 — id-ori-kem
    pub const ORI_KEM: &[u8] = &[
        0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x09, 0x10, 0x0D, 0x03,
    ];

    // ── KDFs, MACs, digests ──────────────────────────────────────────

    /// 1.2.840.113549.1.5.12 — id-PBKDF2
    pub const PBKDF2: &[u8] = &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x05, 0x0C];
    /// 1.2.840.113549.1.9.16.3.28 — id-alg-hkdf-with-sha256
    pub const HKDF_SHA256: &[u8] = &[
        0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x09, 0x10, 0x03, 0x1C,
    ];
    /// 1.2.840.113549.2.9 — hmacWithSHA256
    pub const HMAC_SHA256: &[u8] = &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x02, 0x09];
    /// 1.2.840.113549.2.10 — hmacWithSHA384
    pub const HMAC_SHA384: &[u8] = &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x02, 0x0A];
    /// 1.2.840.113549.2.11 — hmacWithSHA512
    pub const HMAC_SHA512: &[u8] = &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x02, 0x0B];
    /// 2.16.840.1.101.3.4.2.1 — sha256
    pub const SHA256: &[u8] = &[0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x01];
    /// 2.16.840.1.101.3.4.2.2 — sha384
    pub const SHA384: &[u8] = &[0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x02];
    /// 2.16.840.1.101.3.4.2.3 — sha512
    pub const SHA512: &[u8] = &[0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x03];

    // ── Attributes ───────────────────────────────────────────────────

    /// 1.2.840.113549.1.9.3 — contentType
    pub const ATTR_CONTENT_TYPE: &[u8] = &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x09, 0x03];
    /// 1.2.840.113549.1.9.4 — messageDigest
    pub const ATTR_MESSAGE_DIGEST: &[u8] =
        &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x09, 0x04];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_enveloped_data() {
        let oid = Oid::new(&[1, 2, 840, 113549, 1, 7, 3]).unwrap();
        assert_eq!(oid.to_der_value(), known::ENVELOPED_DATA);
        let back = Oid::from_der_value(known::ENVELOPED_DATA).unwrap();
        assert_eq!(back, oid);
        assert_eq!(back.to_dot_string(), "1.2.840.113549.1.7.3");
    }

    #[test]
    fn roundtrip_high_first_arc() {
        let oid = Oid::new(&[2, 16, 840, 1, 101, 3, 4, 1, 42]).unwrap();
        assert_eq!(oid.to_der_value(), known::AES256_CBC);
        assert_eq!(
            Oid::from_der_value(known::AES256_CBC).unwrap().arcs(),
            oid.arcs()
        );
    }

    #[test]
    fn rejects_truncated_arc() {
        // Continuation bit set on final octet
        assert!(Oid::from_der_value(&[0x2A, 0x86]).is_err());
    }

    #[test]
    fn rejects_invalid_leading_pair() {
        assert!(Oid::new(&[3, 1]).is_err());
        assert!(Oid::new(&[0, 40]).is_err());
    }
}
