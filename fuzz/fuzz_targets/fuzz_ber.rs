#![no_main]
use libfuzzer_sys::fuzz_target;

use sealwire_codec::ber::BerReader;
use sealwire_codec::Decoder;

fuzz_target!(|data: &[u8]| {
    // Streaming reader with indefinite-to-definite re-encoding.
    let mut rd = BerReader::new(data);
    let _ = rd.read_tlv();

    // Slice decoder over the same bytes.
    let mut dec = Decoder::new(data);
    while !dec.is_empty() {
        if dec.read_tlv().is_err() {
            break;
        }
    }
});
