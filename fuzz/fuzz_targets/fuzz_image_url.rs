#![no_main]

use libfuzzer_sys::fuzz_target;

use covert_imagegen::{normalize_image_url, ResolvedEndpoint};

fuzz_target!(|data: &[u8]| {
    let body = String::from_utf8_lossy(data);
    let endpoint = ResolvedEndpoint::parse("https://svc.test:8443/api").unwrap();
    if let Some(url) = normalize_image_url(&body, &endpoint) {
        assert!(!url.as_str().is_empty());
    }
});
