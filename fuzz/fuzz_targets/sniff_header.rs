#![no_main]

use image_converter::engine::{sniff, sniff_with_declared};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = sniff(data);
    let _ = sniff_with_declared(data, Some("image/heic"));
});
