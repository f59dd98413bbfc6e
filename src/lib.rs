// lib.rs
//
// image-converter: converts vault images to WebP, JPEG, PNG, palette PNG or AVIF
//
// Design goals:
// - Smallest valid output wins (several encoders race per conversion)
// - Never lose the source: any failure returns the original bytes
// - Sniff formats from bytes, not file names
// - Non-blocking async API

// Memory allocator optimization - jemalloc for better performance
// Note: jemalloc is not supported on Windows/MSVC, so we exclude it on that platform
#[cfg(all(feature = "jemalloc", not(target_env = "msvc")))]
#[global_allocator]
static ALLOC: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

pub mod codecs;
pub mod engine;
pub mod error;
pub mod ops;

pub use engine::{
    CollectingNotifier, DefaultSupportedFormats, ImageProcessor, LogNotifier, MimeType, Notice,
    Notifier, SupportedFormats,
};
pub use error::{ConvertError, ErrorKind, Result, Tool};
pub use ops::{ConversionRequest, EnlargeReduce, ResizeMode, ResizeSpec, TargetFormat, ToolSettings};

/// Sniff and plan without encoding. Used by the fuzz targets to exercise the
/// header parsers and dimension math on arbitrary input.
#[cfg(feature = "fuzzing")]
pub fn fuzz_inspect(data: &[u8], spec: &ResizeSpec) -> Option<engine::ResizePlan> {
    let _ = engine::sniff(data);
    let _ = engine::metadata::orientation(data);
    let _ = engine::metadata::extract_icc_profile(data);
    engine::decoder::ensure_dimensions_safe(data).ok()?;
    let img = image::load_from_memory(data).ok()?;
    Some(engine::plan(img.width(), img.height(), spec))
}
