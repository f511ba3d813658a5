//! X.509 AlgorithmIdentifier handling.

use sealwire_codec::{tags, Decoder, Encoder};
use sealwire_types::CodecError;

/// An AlgorithmIdentifier: OID plus optional, algorithm-defined parameters.
///
/// `oid` holds the DER contents octets of the OBJECT IDENTIFIER; `params`
/// holds the complete encoding of the parameter element, whatever its type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlgorithmIdentifier {
    pub oid: Vec<u8>,
    pub params: Option<Vec<u8>>,
}

impl AlgorithmIdentifier {
    /// An identifier with absent parameters.
    pub fn new(oid: &[u8]) -> Self {
        Self {
            oid: oid.to_vec(),
            params: None,
        }
    }

    /// An identifier with the given pre-encoded parameters.
    pub fn with_params(oid: &[u8], params: Vec<u8>) -> Self {
        Self {
            oid: oid.to_vec(),
            params: Some(params),
        }
    }

    /// An identifier with an explicit ASN.1 NULL parameter.
    pub fn with_null_params(oid: &[u8]) -> Self {
        Self {
            oid: oid.to_vec(),
            params: Some(vec![0x05, 0x00]),
        }
    }

    pub fn oid_is(&self, oid: &[u8]) -> bool {
        self.oid == oid
    }

    /// Encode as `SEQUENCE { OID, params? }`.
    pub fn to_der(&self) -> Vec<u8> {
        let mut enc = Encoder::new();
        enc.write_sequence(&self.to_der_contents());
        enc.finish()
    }

    /// Contents octets of the SEQUENCE encoding, for IMPLICIT retagging.
    pub fn to_der_contents(&self) -> Vec<u8> {
        let mut inner = Encoder::new();
        inner.write_oid(&self.oid);
        if let Some(p) = &self.params {
            inner.write_raw(p);
        }
        inner.finish()
    }

    /// Parse from a decoder positioned at the SEQUENCE.
    pub fn read_from(dec: &mut Decoder<'_>) -> Result<Self, CodecError> {
        let mut seq = dec.read_sequence()?;
        let oid = seq.read_oid()?.to_vec();
        let params = if seq.is_empty() {
            None
        } else {
            let (_, raw) = seq.read_raw_tlv()?;
            Some(raw.to_vec())
        };
        if !seq.is_empty() {
            return Err(CodecError::TrailingData);
        }
        Ok(Self { oid, params })
    }

    /// Parse from the contents octets of an IMPLICIT-retagged SEQUENCE.
    pub fn from_der_contents(contents: &[u8]) -> Result<Self, CodecError> {
        let mut seq = Decoder::new(contents);
        let oid = seq.read_oid()?.to_vec();
        let params = if seq.is_empty() {
            None
        } else {
            let (_, raw) = seq.read_raw_tlv()?;
            Some(raw.to_vec())
        };
        if !seq.is_empty() {
            return Err(CodecError::TrailingData);
        }
        Ok(Self { oid, params })
    }

    /// Parse a standalone DER encoding.
    pub fn from_der(der: &[u8]) -> Result<Self, CodecError> {
        let mut dec = Decoder::new(der);
        let out = Self::read_from(&mut dec)?;
        if !dec.is_empty() {
            return Err(CodecError::TrailingData);
        }
        Ok(out)
    }

    /// Parameters as an OCTET STRING value, or an error tag mismatch.
    pub fn params_as_octet_string(&self) -> Result<&[u8], CodecError> {
        let raw = self.params.as_deref().ok_or(CodecError::NullInput)?;
        let mut dec = Decoder::new(raw);
        let tlv = dec.read_tlv()?;
        if !tlv.tag.is_universal(0x04) {
            return Err(CodecError::UnexpectedTag {
                expected: tags::OCTET_STRING,
                got: tlv.tag.number as u8,
            });
        }
        Ok(tlv.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sealwire_codec::oid::known;

    #[test]
    fn roundtrip_absent_params() {
        let alg = AlgorithmIdentifier::new(known::SHA256);
        let der = alg.to_der();
        assert_eq!(AlgorithmIdentifier::from_der(&der).unwrap(), alg);
    }

    #[test]
    fn roundtrip_octet_string_params() {
        let mut iv = Encoder::new();
        iv.write_octet_string(&[0xAA; 16]);
        let alg = AlgorithmIdentifier::with_params(known::AES128_CBC, iv.finish());
        let der = alg.to_der();
        let back = AlgorithmIdentifier::from_der(&der).unwrap();
        assert_eq!(back.params_as_octet_string().unwrap(), &[0xAA; 16]);
    }

    #[test]
    fn rejects_trailing_data() {
        let alg = AlgorithmIdentifier::new(known::SHA256);
        let mut der = alg.to_der();
        der.push(0x00);
        assert!(AlgorithmIdentifier::from_der(&der).is_err());
    }
}
