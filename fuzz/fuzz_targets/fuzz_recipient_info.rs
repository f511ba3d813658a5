#![no_main]
use libfuzzer_sys::fuzz_target;

use sealwire_cms::info::RecipientInfo;
use sealwire_codec::Decoder;

fuzz_target!(|data: &[u8]| {
    let mut dec = Decoder::new(data);
    if let Ok(info) = RecipientInfo::read_from(&mut dec) {
        // Whatever parsed must re-encode without panicking.
        let _ = info.to_der();
    }
});
