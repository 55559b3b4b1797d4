#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut rest = data;
    while let Ok((ti, tail)) = asnwalk_ber::parse_tl(rest) {
        if ti.ndef || ti.length > tail.len() {
            break;
        }
        rest = &tail[ti.length..];
    }
});
