// src/engine.rs
//
// The conversion engine. A request flows through:
// 1. sniff the header, gate on supported formats
// 2. adapt TIFF/HEIC into an intermediate the raster stage can read
// 3. decode, orient, plan and resize the raster
// 4. race the encoders (or hand off to FFmpeg / pngquant)
// 5. carry EXIF into JPEG output
//
// This file is the facade; the stages live in engine/.

// =============================================================================
// SECURITY LIMITS
// =============================================================================

/// Maximum allowed image dimension (width or height).
/// Images larger than 32768x32768 are rejected to prevent decompression bombs.
pub const MAX_DIMENSION: u32 = 32768;

/// Maximum allowed total pixels (width * height).
/// 100 megapixels = 400MB uncompressed RGBA.
pub const MAX_PIXELS: u64 = 100_000_000;

// =============================================================================
// MODULE DECOMPOSITION
// =============================================================================

mod api;
pub mod canvas;
mod common;
pub mod decoder;
pub mod encoder;
pub mod metadata;
mod pipeline;
pub mod planner;
pub mod sniff;

pub use api::{
    CollectingNotifier, DefaultSupportedFormats, ImageProcessor, LogNotifier, Notice, Notifier,
    SupportedFormats,
};
pub use canvas::{select_smallest, EncodingCandidate, Strategy};
pub use common::{run_with_panic_policy, EngineResult};
pub use decoder::{check_dimensions, InputKind};
pub use encoder::QualitySettings;
pub use pipeline::{apply_orientation, color_levels, has_transparency, reduce_color_depth};
pub use planner::{plan, plan_dimensions, scale_filter, CropRect, Dimensions, ResizePlan};
pub use sniff::{sniff, sniff_with_declared, MimeType};
