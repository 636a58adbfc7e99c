#![no_main]

use libfuzzer_sys::fuzz_target;

use covert_imagegen::Fingerprint;

fuzz_target!(|data: &[u8]| {
    let Ok(raw) = std::str::from_utf8(data) else {
        return;
    };
    // Anything that parses must print back to a form that parses identically.
    if let Ok(fp) = Fingerprint::parse(raw) {
        assert_eq!(Fingerprint::parse(&fp.to_string()).unwrap(), fp);
    }
});
