#![no_main]
use libfuzzer_sys::fuzz_target;

use asnwalk_ber::{decode_slice, pkix, BerDecoder, DecoderConfig, Reader};

fuzz_target!(|data: &[u8]| {
    let Ok(module) = pkix::module() else {
        return;
    };
    let config = DecoderConfig::builder().max_depth(32).build();
    let _ = decode_slice(module, "Certificate", config, data);

    let mut sink = std::io::sink();
    let _ = BerDecoder::new(module, Reader::from_slice(data)).dump(Some("Certificate"), &mut sink);
    let _ = BerDecoder::from_slice(data).dump(None, &mut sink);
});
