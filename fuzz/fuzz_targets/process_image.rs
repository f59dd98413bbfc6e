#![no_main]

//! Whole pipeline on arbitrary bytes. process_image() must never panic and
//! must never return empty output for non-empty input.

use arbitrary::{Arbitrary, Unstructured};
use image_converter::{fuzz_inspect, ConversionRequest, ImageProcessor, ResizeSpec, TargetFormat};
use libfuzzer_sys::fuzz_target;

#[derive(Arbitrary, Debug)]
struct Knobs {
    target: u8,
    quality: u8,
    depth: u8,
    edge: u16,
}

fuzz_target!(|data: &[u8]| {
    let mut unstructured = Unstructured::new(data);
    let knobs = match Knobs::arbitrary(&mut unstructured) {
        Ok(k) => k,
        Err(_) => return,
    };
    let bytes = unstructured.take_rest().to_vec();
    if bytes.is_empty() {
        return;
    }

    let target = match knobs.target % 5 {
        0 => TargetFormat::Webp,
        1 => TargetFormat::Jpeg,
        2 => TargetFormat::Png,
        3 => TargetFormat::Original,
        _ => TargetFormat::None,
    };
    // Keep allocations small
    let resize = ResizeSpec::longest_edge(u32::from(knobs.edge % 256));
    let _ = fuzz_inspect(&bytes, &resize);

    let request = ConversionRequest::new(bytes, target)
        .with_quality(f32::from(knobs.quality) / 255.0)
        .with_color_depth(f32::from(knobs.depth) / 255.0)
        .with_resize(resize);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("runtime");
    let out = runtime.block_on(ImageProcessor::new().process_image(&request));
    assert!(!out.is_empty());
});
