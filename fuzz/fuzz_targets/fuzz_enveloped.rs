#![no_main]
use std::io::Read;

use libfuzzer_sys::fuzz_target;

use sealwire_cms::info::RecipientId;
use sealwire_cms::parse::{
    CmsAuthenticatedData, CmsEncryptedData, CmsEnvelopedData, EnvelopedDataParser,
};
use sealwire_cms::recipient::KekRecipient;

fuzz_target!(|data: &[u8]| {
    let _ = CmsEnvelopedData::from_ber(data);
    let _ = CmsAuthenticatedData::from_ber(data);
    let _ = CmsEncryptedData::from_ber(data);

    // Drive the streaming path with an arbitrary credential too; only
    // errors are acceptable outcomes, never panics.
    if let Ok(mut parser) = EnvelopedDataParser::new(data) {
        let id = RecipientId::KekId(b"fuzz".to_vec());
        let recipient = KekRecipient::new(&[0u8; 16]);
        if let Ok(mut reader) = parser.content_reader(&id, &recipient) {
            let mut out = Vec::new();
            let _ = reader.read_to_end(&mut out);
        }
    }
});
