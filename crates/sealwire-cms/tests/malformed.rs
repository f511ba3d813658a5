//! Hostile-input behavior: truncation, tampering, and unsupported
//! algorithms must produce errors, never wrong plaintext.

use std::io::Read;

use hex_literal::hex;
use sealwire_cms::generate::EnvelopedDataGenerator;
use sealwire_cms::info::RecipientId;
use sealwire_cms::parse::{CmsEncryptedData, CmsEnvelopedData, EnvelopedDataParser};
use sealwire_cms::recipient::{KekGenerator, KekRecipient, RecipientInfoGenerator};
use sealwire_cms::{CmsError, ContentAlgId};
use sealwire_codec::oid::known;

const KEK: [u8; 16] = [0x6E; 16];

fn message(alg: ContentAlgId, content: &[u8]) -> Vec<u8> {
    let mut gen = EnvelopedDataGenerator::new();
    gen.add_recipient(RecipientInfoGenerator::Kek(
        KekGenerator::new(b"mkek", &KEK).unwrap(),
    ));
    gen.encrypt_to_vec(known::PKCS7_DATA, alg, content).unwrap()
}

fn id() -> RecipientId {
    RecipientId::KekId(b"mkek".to_vec())
}

#[test]
fn truncated_message_errors() {
    let der = message(ContentAlgId::Aes128Gcm, b"about to be cut short");
    for cut in [3, der.len() / 2, der.len() - 2] {
        let truncated = &der[..cut];
        let result = EnvelopedDataParser::new(truncated).and_then(|mut p| {
            let recipient = KekRecipient::new(&KEK);
            let mut reader = p.content_reader(&id(), &recipient)?;
            let mut out = Vec::new();
            reader.read_to_end(&mut out).map_err(CmsError::Io)?;
            Ok(())
        });
        assert!(result.is_err(), "cut at {cut} must not parse");
    }
}

#[test]
fn gcm_tag_truncation_fails() {
    let mut der = message(ContentAlgId::Aes128Gcm, b"tagged");
    // Shorten the last content chunk: 6 content + 16 tag bytes live in
    // one primitive OCTET STRING chunk, followed by five EOC pairs.
    let pos = der.len() - 10 - 24;
    assert_eq!(&der[pos..pos + 2], &[0x04, 22]);
    der[pos + 1] = 21; // drop one tag byte from the chunk
    der.remove(pos + 2 + 21);

    let mut parser = EnvelopedDataParser::new(der.as_slice()).unwrap();
    let recipient = KekRecipient::new(&KEK);
    let mut reader = parser.content_reader(&id(), &recipient).unwrap();
    let mut out = Vec::new();
    assert!(reader.read_to_end(&mut out).is_err());
}

#[test]
fn cbc_ciphertext_tamper_is_opaque() {
    let der = message(ContentAlgId::Aes256Cbc, &[0x5A; 256]);
    // Flip one bit in the second-to-last ciphertext block, which lands in
    // the padding of the final plaintext block; validation must fail
    // without saying why.
    let mut bad = der.clone();
    let idx = bad.len() - 30;
    bad[idx] ^= 0x80;

    let mut msg = CmsEnvelopedData::from_ber(&bad).unwrap();
    let err = msg.decrypt(&id(), &KekRecipient::new(&KEK)).unwrap_err();
    assert_eq!(err.to_string(), "cryptographic operation failed");
}

#[test]
fn unknown_content_algorithm_is_reported_by_oid() {
    let mut msg = CmsEnvelopedData::from_ber(&message(ContentAlgId::Aes128Cbc, b"x")).unwrap();
    // Substitute an algorithm this engine does not implement.
    msg.content_algorithm.oid = hex!("2a864886f70d0302").to_vec(); // rc2-cbc
    let err = msg.decrypt(&id(), &KekRecipient::new(&KEK)).unwrap_err();
    match err {
        CmsError::UnsupportedAlgorithm(name) => {
            assert_eq!(name, "1.2.840.113549.3.2");
        }
        other => panic!("expected UnsupportedAlgorithm, got {other:?}"),
    }
}

#[test]
fn wrong_kek_does_not_reveal_cause() {
    let der = message(ContentAlgId::Aes128Cbc, b"secret");
    let mut parser = EnvelopedDataParser::new(der.as_slice()).unwrap();
    let err = parser
        .content_reader(&id(), &KekRecipient::new(&[0xFF; 16]))
        .map(|_| ())
        .unwrap_err();
    assert_eq!(err.to_string(), "cryptographic operation failed");
}

#[test]
fn unmatched_recipient_is_not_found() {
    let der = message(ContentAlgId::Aes128Cbc, b"secret");
    let mut parser = EnvelopedDataParser::new(der.as_slice()).unwrap();
    assert!(matches!(
        parser.content_reader(
            &RecipientId::KekId(b"other".to_vec()),
            &KekRecipient::new(&KEK)
        ),
        Err(CmsError::RecipientNotFound)
    ));
}

#[test]
fn second_content_reader_is_refused() {
    let der = message(ContentAlgId::Aes128Gcm, b"once only");
    let mut parser = EnvelopedDataParser::new(der.as_slice()).unwrap();
    let recipient = KekRecipient::new(&KEK);
    {
        let mut reader = parser.content_reader(&id(), &recipient).unwrap();
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
    }
    assert!(matches!(
        parser.content_reader(&id(), &recipient),
        Err(CmsError::Sequencing(_))
    ));
}

#[test]
fn garbage_and_wrong_types_are_rejected() {
    // Not ASN.1 at all.
    assert!(EnvelopedDataParser::new(&b"mime: text/plain"[..]).is_err());
    // Structurally fine ContentInfo, but the wrong content type for the
    // parser it is handed to.
    let enveloped = message(ContentAlgId::Aes128Cbc, b"x");
    assert!(matches!(
        CmsEncryptedData::from_ber(&enveloped),
        Err(CmsError::Malformed(_))
    ));
    // An empty SEQUENCE.
    assert!(EnvelopedDataParser::new(&hex!("3000")[..]).is_err());
}

#[test]
fn empty_recipient_set_is_rejected() {
    // ContentInfo { enveloped-data, [0] { SEQUENCE { INTEGER 0, SET {},
    // SEQUENCE { id-data, aes128-cbc SEQ, [0] "" } } } }
    let der = hex!(
        "3080"                                   // ContentInfo
        "06092a864886f70d010703"                 // id-envelopedData
        "a080"                                   // [0]
        "3080"                                   // EnvelopedData
        "020100"                                 // version 0
        "3100"                                   // recipientInfos: empty
        "3080"                                   // EncryptedContentInfo
        "06092a864886f70d010701"                 // id-data
        "301d0609608648016503040102041041414141414141414141414141414141"
        "a0800000"                               // encryptedContent, empty
        "0000"                                   // end EncryptedContentInfo
        "0000"                                   // end EnvelopedData
        "0000"                                   // end [0]
        "0000"                                   // end ContentInfo
    );
    assert!(matches!(
        EnvelopedDataParser::new(&der[..]),
        Err(CmsError::Malformed(_))
    ));
}
