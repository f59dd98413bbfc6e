#![no_main]

use arbitrary::Arbitrary;
use image_converter::engine::plan;
use image_converter::{EnlargeReduce, ResizeSpec};
use libfuzzer_sys::fuzz_target;

#[derive(Arbitrary, Debug)]
struct PlanInput {
    source_w: u32,
    source_h: u32,
    mode: u8,
    policy: u8,
    a: u32,
    b: u32,
}

fuzz_target!(|input: PlanInput| {
    let spec = match input.mode % 7 {
        0 => ResizeSpec::none(),
        1 => ResizeSpec::fit(input.a, input.b),
        2 => ResizeSpec::fill(input.a, input.b),
        3 => ResizeSpec::longest_edge(input.a),
        4 => ResizeSpec::shortest_edge(input.a),
        5 => ResizeSpec::width(input.a),
        _ => ResizeSpec::height(input.b),
    };
    let policy = match input.policy % 3 {
        0 => EnlargeReduce::Auto,
        1 => EnlargeReduce::Reduce,
        _ => EnlargeReduce::Enlarge,
    };
    let p = plan(input.source_w, input.source_h, &spec.with_policy(policy));
    if let Some(crop) = p.crop {
        assert!(crop.left >= 0.0 && crop.top >= 0.0);
        assert!(crop.width <= input.source_w as f64 && crop.height <= input.source_h as f64);
    }
});
