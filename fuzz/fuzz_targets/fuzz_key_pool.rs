#![no_main]

use libfuzzer_sys::fuzz_target;

use covert_imagegen::KeyPool;

fuzz_target!(|data: &[u8]| {
    let contents = String::from_utf8_lossy(data);
    if let Ok(pool) = KeyPool::parse(&contents) {
        assert!(!pool.is_empty());
        assert!(pool.pick_distinct(pool.len() + 1).len() == pool.len());
    }
});
