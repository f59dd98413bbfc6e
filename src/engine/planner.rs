// src/engine/planner.rs
//
// Resize planning: (source dims, ResizeSpec) -> output dims + optional crop.
// Pure arithmetic. Two stages: the mode formula, then the enlarge/reduce clamp.

use crate::ops::{EnlargeReduce, ResizeMode, ResizeSpec};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn aspect_ratio(&self) -> f64 {
        if self.height == 0 {
            return 0.0;
        }
        self.width as f64 / self.height as f64
    }

    pub fn pixels(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

/// Source-space rectangle (fractional pixels) selected for `Fill`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CropRect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResizePlan {
    pub source: Dimensions,
    pub output: Dimensions,
    /// Only set for `Fill` when the aspect ratios differ
    pub crop: Option<CropRect>,
}

impl ResizePlan {
    /// True when drawing the source at `output` is a no-op.
    pub fn is_identity(&self) -> bool {
        self.output == self.source && self.crop.is_none()
    }
}

/// Plan the output dimensions and crop for a source of `source_w` x `source_h`.
pub fn plan(source_w: u32, source_h: u32, spec: &ResizeSpec) -> ResizePlan {
    let source = Dimensions::new(source_w, source_h);
    let keep = ResizePlan {
        source,
        output: source,
        crop: None,
    };

    if spec.is_identity() || source_w == 0 || source_h == 0 {
        return keep;
    }

    let planned = planned_dimensions(source, spec);
    if keeps_source(source, planned, spec.policy) {
        return keep;
    }

    let crop = match spec.mode {
        ResizeMode::Fill => fill_crop(source, planned),
        _ => None,
    };

    ResizePlan {
        source,
        output: planned,
        crop,
    }
}

/// Output dimensions only.
pub fn plan_dimensions(source_w: u32, source_h: u32, spec: &ResizeSpec) -> Dimensions {
    plan(source_w, source_h, spec).output
}

fn planned_dimensions(source: Dimensions, spec: &ResizeSpec) -> Dimensions {
    let sw = source.width as f64;
    let sh = source.height as f64;
    let aspect = sw / sh;

    let (w, h) = match spec.mode {
        ResizeMode::None => (sw, sh),
        ResizeMode::Fit => {
            let tw = spec.width as f64;
            let th = spec.height as f64;
            if aspect > tw / th {
                // Source is wider than the box: width-bound
                (tw, tw / aspect)
            } else {
                (th * aspect, th)
            }
        }
        ResizeMode::Fill => (spec.width as f64, spec.height as f64),
        ResizeMode::LongestEdge => {
            let edge = spec.edge as f64;
            if sw >= sh {
                (edge, edge / aspect)
            } else {
                (edge * aspect, edge)
            }
        }
        ResizeMode::ShortestEdge => {
            let edge = spec.edge as f64;
            if sw <= sh {
                (edge, edge / aspect)
            } else {
                (edge * aspect, edge)
            }
        }
        ResizeMode::Width => {
            let tw = spec.width as f64;
            (tw, tw / aspect)
        }
        ResizeMode::Height => {
            let th = spec.height as f64;
            (th * aspect, th)
        }
    };

    Dimensions::new(round_side(w), round_side(h))
}

fn round_side(value: f64) -> u32 {
    (value.round() as u32).max(1)
}

fn keeps_source(source: Dimensions, planned: Dimensions, policy: EnlargeReduce) -> bool {
    match policy {
        EnlargeReduce::Auto => false,
        EnlargeReduce::Reduce => {
            source.width <= planned.width && source.height <= planned.height
        }
        EnlargeReduce::Enlarge => {
            source.width >= planned.width && source.height >= planned.height
        }
    }
}

/// Centred source rectangle with the output's aspect ratio.
fn fill_crop(source: Dimensions, output: Dimensions) -> Option<CropRect> {
    let sw = source.width as f64;
    let sh = source.height as f64;
    let scale = (output.width as f64 / sw).max(output.height as f64 / sh);
    let width = (output.width as f64 / scale).min(sw);
    let height = (output.height as f64 / scale).min(sh);

    const EPSILON: f64 = 1e-6;
    if (sw - width).abs() < EPSILON && (sh - height).abs() < EPSILON {
        return None;
    }

    Some(CropRect {
        left: (sw - width) / 2.0,
        top: (sh - height) / 2.0,
        width,
        height,
    })
}

/// `scale=W:H` for an FFmpeg filter chain, or `None` when `input` already has
/// the output dimensions.
pub fn scale_filter(input: Dimensions, output: Dimensions) -> Option<String> {
    if input == output {
        None
    } else {
        Some(format!("scale={}:{}", output.width, output.height))
    }
}
