//! CMS attributes (RFC 5652 section 9.2 / 11).

use sealwire_codec::oid::known;
use sealwire_codec::{tags, Decoder, Encoder};
use sealwire_types::CodecError;

/// A single Attribute: type OID plus a set of values.
///
/// Values are stored as complete DER encodings so that whatever a caller
/// (or a parsed message) put there survives re-encoding byte for byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub oid: Vec<u8>,
    pub values: Vec<Vec<u8>>,
}

impl Attribute {
    pub fn new(oid: &[u8], value: Vec<u8>) -> Self {
        Self {
            oid: oid.to_vec(),
            values: vec![value],
        }
    }

    /// The content-type attribute carrying the given content-type OID.
    pub fn content_type(content_type_oid: &[u8]) -> Self {
        let mut enc = Encoder::new();
        enc.write_oid(content_type_oid);
        Self::new(known::ATTR_CONTENT_TYPE, enc.finish())
    }

    /// The message-digest attribute carrying the given digest bytes.
    pub fn message_digest(digest: &[u8]) -> Self {
        let mut enc = Encoder::new();
        enc.write_octet_string(digest);
        Self::new(known::ATTR_MESSAGE_DIGEST, enc.finish())
    }

    /// Encode as `SEQUENCE { OID, SET OF AttributeValue }`.
    pub fn to_der(&self) -> Vec<u8> {
        let mut set = Vec::new();
        for v in &self.values {
            set.extend_from_slice(v);
        }
        let mut inner = Encoder::new();
        inner.write_oid(&self.oid);
        inner.write_set(&set);
        let mut enc = Encoder::new();
        enc.write_sequence(&inner.finish());
        enc.finish()
    }

    pub fn read_from(dec: &mut Decoder<'_>) -> Result<Self, CodecError> {
        let mut seq = dec.read_sequence()?;
        let oid = seq.read_oid()?.to_vec();
        let mut set = seq.read_set()?;
        let mut values = Vec::new();
        while !set.is_empty() {
            let (_, raw) = set.read_raw_tlv()?;
            values.push(raw.to_vec());
        }
        Ok(Self { oid, values })
    }

    /// The first value as an OCTET STRING, if it is one.
    pub fn first_octet_string(&self) -> Option<&[u8]> {
        let raw = self.values.first()?;
        let mut dec = Decoder::new(raw);
        let tlv = dec.read_tlv().ok()?;
        tlv.tag.is_universal(0x04).then_some(tlv.value)
    }
}

/// An ordered collection of attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributeSet {
    attrs: Vec<Attribute>,
}

impl AttributeSet {
    pub fn new(attrs: Vec<Attribute>) -> Self {
        Self { attrs }
    }

    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Attribute> {
        self.attrs.iter()
    }

    pub fn push(&mut self, attr: Attribute) {
        self.attrs.push(attr);
    }

    pub fn find(&self, oid: &[u8]) -> Option<&Attribute> {
        self.attrs.iter().find(|a| a.oid == oid)
    }

    /// Encode as an IMPLICIT context-tagged SET, preserving caller order.
    pub fn to_implicit_der(&self, tag_num: u8) -> Vec<u8> {
        let mut body = Vec::new();
        for a in &self.attrs {
            body.extend_from_slice(&a.to_der());
        }
        let mut enc = Encoder::new();
        enc.write_context_specific(tag_num, true, &body);
        enc.finish()
    }

    /// Element encodings concatenated in ascending byte order (DER
    /// `SET OF` element order).
    fn canonical_elements(&self) -> Vec<u8> {
        let mut elems: Vec<Vec<u8>> = self.attrs.iter().map(Attribute::to_der).collect();
        elems.sort();
        let mut body = Vec::new();
        for e in &elems {
            body.extend_from_slice(e);
        }
        body
    }

    /// Encode as an IMPLICIT context-tagged SET with the elements in
    /// canonical DER order, byte-identical (past the tag) to
    /// [`to_der_set`](Self::to_der_set).
    pub fn to_implicit_der_sorted(&self, tag_num: u8) -> Vec<u8> {
        let mut enc = Encoder::new();
        enc.write_context_specific(tag_num, true, &self.canonical_elements());
        enc.finish()
    }

    /// The DER `SET OF` encoding used as MAC/signature input: element
    /// encodings in ascending byte order under the outer SET tag.
    pub fn to_der_set(&self) -> Vec<u8> {
        let mut enc = Encoder::new();
        enc.write_tlv(tags::SET, &self.canonical_elements());
        enc.finish()
    }

    /// Parse the contents octets of a context-tagged SET OF Attribute.
    pub fn from_set_contents(contents: &[u8]) -> Result<Self, CodecError> {
        let mut dec = Decoder::new(contents);
        let mut attrs = Vec::new();
        while !dec.is_empty() {
            attrs.push(Attribute::read_from(&mut dec)?);
        }
        Ok(Self { attrs })
    }
}
