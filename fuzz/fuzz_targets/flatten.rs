#![no_main]
use libfuzzer_sys::fuzz_target;
use peflat::{flatten, FlattenConfig};

fuzz_target!(|data: &[u8]| {
    let config = FlattenConfig::default();
    if let Ok(image) = flatten(data, &config) {
        // Every successful image fits the load window.
        if let Some(last) = image.layout().last() {
            assert!(last.end <= config.max_addr);
            assert_eq!(image.image().len() as u64, last.end - image.image_base());
        }
    }
});
