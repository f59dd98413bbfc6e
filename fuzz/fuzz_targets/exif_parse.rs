#![no_main]

//! Fuzz target for the EXIF paths.
//! Exercises orientation(), extract_icc_profile() and preserve() on arbitrary data.

use image_converter::engine::metadata::{extract_icc_profile, orientation, preserve};
use libfuzzer_sys::fuzz_target;

// Smallest valid JPEG: SOI + EOI is enough for the EXIF writer to parse
const JPEG_SHELL: [u8; 4] = [0xFF, 0xD8, 0xFF, 0xD9];

fuzz_target!(|data: &[u8]| {
    let _ = orientation(data);
    let _ = extract_icc_profile(data);
    let _ = preserve(data, JPEG_SHELL.to_vec());
});
