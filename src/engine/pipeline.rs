// src/engine/pipeline.rs
//
// Raster operations applied between decode and encode:
// EXIF auto-orientation, crop + resize to a ResizePlan, PNG colour-depth
// reduction and the transparency probe used by the AVIF path.

use crate::engine::common::EngineResult;
use crate::engine::decoder::check_dimensions;
use crate::engine::planner::{CropRect, ResizePlan};
use crate::error::ConvertError;
use fast_image_resize::{self as fir, ImageBufferError, MulDiv, PixelType, ResizeOptions};
use image::{imageops::FilterType, DynamicImage, RgbImage, RgbaImage};

/// Rotate/flip so that an image carrying EXIF `orientation` displays upright
/// without the tag. Unknown values leave the image untouched.
pub fn apply_orientation(img: DynamicImage, orientation: u16) -> DynamicImage {
    match orientation {
        2 => img.fliph(),
        3 => img.rotate180(),
        4 => img.flipv(),
        5 => img.rotate90().fliph(), // transpose
        6 => img.rotate90(),
        7 => img.rotate270().fliph(), // transverse
        8 => img.rotate270(),
        _ => img,
    }
}

/// Crop (for Fill) and scale `img` to the plan's output.
/// An identity plan returns the image unchanged.
pub fn resize_to_plan(img: DynamicImage, plan: &ResizePlan) -> EngineResult<DynamicImage> {
    if plan.is_identity() {
        return Ok(img);
    }
    let source_dims = (img.width(), img.height());
    let target_dims = (plan.output.width, plan.output.height);
    // Enlargement can push a small source past the decode limits
    check_dimensions(target_dims.0, target_dims.1)?;

    let mut options = default_resize_options();
    if let Some(crop) = plan.crop {
        options = options.crop(crop.left, crop.top, crop.width, crop.height);
    }

    fast_resize_owned_impl(img, target_dims.0, target_dims.1, options, plan.crop)
        .map_err(|reason| ConvertError::resize_failed(source_dims, target_dims, reason))
}

fn default_resize_options() -> ResizeOptions {
    ResizeOptions::new().resize_alg(fir::ResizeAlg::Convolution(fir::FilterType::Lanczos3))
}

fn fast_resize_owned_impl(
    img: DynamicImage,
    dst_width: u32,
    dst_height: u32,
    options: ResizeOptions,
    crop: Option<CropRect>,
) -> std::result::Result<DynamicImage, String> {
    let src_width = img.width();
    let src_height = img.height();

    if src_width == 0 || src_height == 0 || dst_width == 0 || dst_height == 0 {
        return Err("invalid dimensions for resize".to_string());
    }

    // Take ownership of the pixel buffer for RGB/RGBA; everything else goes through RGBA
    let (pixel_type, src_pixels): (PixelType, Vec<u8>) = match img {
        DynamicImage::ImageRgb8(rgb) => (PixelType::U8x3, rgb.into_raw()),
        DynamicImage::ImageRgba8(rgba) => (PixelType::U8x4, rgba.into_raw()),
        other => (PixelType::U8x4, other.to_rgba8().into_raw()),
    };

    fast_resize_internal_impl(
        src_width, src_height, src_pixels, pixel_type, dst_width, dst_height, options, crop,
    )
}

#[inline]
fn requires_premultiply(pixel_type: PixelType) -> bool {
    matches!(pixel_type, PixelType::U8x4)
}

#[allow(clippy::too_many_arguments)]
fn fast_resize_internal_impl(
    src_width: u32,
    src_height: u32,
    mut src_pixels: Vec<u8>,
    pixel_type: PixelType,
    dst_width: u32,
    dst_height: u32,
    options: ResizeOptions,
    crop: Option<CropRect>,
) -> std::result::Result<DynamicImage, String> {
    let pixel_count = (src_width as usize)
        .checked_mul(src_height as usize)
        .ok_or_else(|| "image dimensions overflow during resize".to_string())?;
    let required_bytes = pixel_count
        .checked_mul(pixel_type.size())
        .ok_or_else(|| "image buffer size overflow during resize".to_string())?;

    if src_pixels.len() < required_bytes {
        return Err(format!(
            "fir source image invalid buffer size. expected {required_bytes} bytes, got {} bytes",
            src_pixels.len()
        ));
    }

    let primary_result = match fir::images::Image::from_slice_u8(
        src_width,
        src_height,
        src_pixels.as_mut_slice(),
        pixel_type,
    ) {
        Ok(src_image) => {
            resize_with_source_image(src_image, pixel_type, dst_width, dst_height, &options)
        }
        Err(ImageBufferError::InvalidBufferAlignment) => {
            let aligned_image = copy_pixels_to_aligned_image(
                src_width,
                src_height,
                pixel_type,
                &src_pixels,
                required_bytes,
            )?;
            resize_with_source_image(aligned_image, pixel_type, dst_width, dst_height, &options)
        }
        Err(other) => Err(format!("fir source image error: {other:?}")),
    };

    match primary_result {
        Ok(img) => Ok(img),
        Err(err) => {
            tracing::debug!(%err, "fast resize failed, retrying with image crate");
            resize_with_image_crate_fallback(
                src_pixels, src_width, src_height, pixel_type, dst_width, dst_height, crop,
            )
            .map_err(|fallback_err| format!("{err}; image crate fallback failed: {fallback_err}"))
        }
    }
}

fn copy_pixels_to_aligned_image(
    width: u32,
    height: u32,
    pixel_type: PixelType,
    src_pixels: &[u8],
    required_bytes: usize,
) -> std::result::Result<fir::images::Image<'static>, String> {
    let mut aligned_image = fir::images::Image::new(width, height, pixel_type);
    let aligned_buffer = aligned_image.buffer_mut();
    if aligned_buffer.len() != required_bytes {
        return Err(format!(
            "fir alignment fallback buffer mismatch. expected {required_bytes} bytes, got {} bytes",
            aligned_buffer.len()
        ));
    }
    aligned_buffer.copy_from_slice(&src_pixels[..required_bytes]);
    Ok(aligned_image)
}

fn resize_with_image_crate_fallback(
    src_pixels: Vec<u8>,
    src_width: u32,
    src_height: u32,
    pixel_type: PixelType,
    dst_width: u32,
    dst_height: u32,
    crop: Option<CropRect>,
) -> std::result::Result<DynamicImage, String> {
    let img = match pixel_type {
        PixelType::U8x3 => RgbImage::from_raw(src_width, src_height, src_pixels)
            .map(DynamicImage::ImageRgb8)
            .ok_or_else(|| "failed to build rgb image for fallback resize".to_string())?,
        PixelType::U8x4 => RgbaImage::from_raw(src_width, src_height, src_pixels)
            .map(DynamicImage::ImageRgba8)
            .ok_or_else(|| "failed to build rgba image for fallback resize".to_string())?,
        _ => return Err("fallback resize supports only U8x3/U8x4 pixel types".to_string()),
    };

    let img = match crop {
        Some(rect) => {
            let x = (rect.left.round() as u32).min(src_width.saturating_sub(1));
            let y = (rect.top.round() as u32).min(src_height.saturating_sub(1));
            let w = (rect.width.round() as u32).clamp(1, src_width - x);
            let h = (rect.height.round() as u32).clamp(1, src_height - y);
            img.crop_imm(x, y, w, h)
        }
        None => img,
    };

    Ok(img.resize_exact(dst_width, dst_height, FilterType::Lanczos3))
}

/// Check if an RGBA image is fully opaque (all alpha values are 255)
/// For RGB images, always returns true (no alpha channel)
///
/// Only checks images >=1MP; below that premultiply is cheaper than the scan
fn is_fully_opaque(image: &fir::images::Image, pixel_type: PixelType, width: u32, height: u32) -> bool {
    if pixel_type != PixelType::U8x4 {
        return true;
    }

    const THRESHOLD_PIXELS: u64 = 1_000_000;
    if (width as u64).saturating_mul(height as u64) < THRESHOLD_PIXELS {
        return false;
    }

    image.buffer().iter().skip(3).step_by(4).all(|&alpha| alpha == 255)
}

fn resize_with_source_image(
    mut src_image: fir::images::Image<'_>,
    pixel_type: PixelType,
    dst_width: u32,
    dst_height: u32,
    options: &ResizeOptions,
) -> std::result::Result<DynamicImage, String> {
    let mut dst_image = fir::images::Image::new(dst_width, dst_height, pixel_type);

    let src_width = src_image.width();
    let src_height = src_image.height();
    let needs_premultiply = requires_premultiply(pixel_type)
        && !is_fully_opaque(&src_image, pixel_type, src_width, src_height);

    let mul_div = MulDiv::default();
    if needs_premultiply {
        mul_div
            .multiply_alpha_inplace(&mut src_image)
            .map_err(|e| format!("failed to premultiply alpha: {e}"))?;
    }

    let mut resizer = fir::Resizer::new();
    resizer
        .resize(&src_image, &mut dst_image, options)
        .map_err(|e| format!("fir resize error: {e:?}"))?;

    if needs_premultiply {
        mul_div
            .divide_alpha_inplace(&mut dst_image)
            .map_err(|e| format!("failed to unpremultiply alpha: {e}"))?;
    }

    let dst_pixels = dst_image.into_vec();
    match pixel_type {
        PixelType::U8x3 => {
            let rgb_image = RgbImage::from_raw(dst_width, dst_height, dst_pixels)
                .ok_or("failed to create rgb image from resized data")?;
            Ok(DynamicImage::ImageRgb8(rgb_image))
        }
        PixelType::U8x4 => {
            let rgba_image = RgbaImage::from_raw(dst_width, dst_height, dst_pixels)
                .ok_or("failed to create rgba image from resized data")?;
            Ok(DynamicImage::ImageRgba8(rgba_image))
        }
        _ => Err("unsupported pixel type after resize".to_string()),
    }
}

/// Number of levels per RGB channel for a 0.0-1.0 colour depth.
pub fn color_levels(color_depth: f32) -> u32 {
    let levels = 256f64.powf(color_depth.clamp(0.0, 1.0) as f64).round() as u32;
    levels.clamp(2, 256)
}

/// Quantize each RGB channel to `round(256^color_depth)` evenly spaced
/// levels. Alpha is left as is. A depth of 1.0 is a no-op.
pub fn reduce_color_depth(img: DynamicImage, color_depth: f32) -> DynamicImage {
    let levels = color_levels(color_depth);
    if levels >= 256 {
        return img;
    }

    let step = 255.0 / (levels - 1) as f32;
    let quantize = |v: u8| -> u8 { ((v as f32 / step).round() * step).round().min(255.0) as u8 };

    if img.color().has_alpha() {
        let mut rgba = img.into_rgba8();
        for pixel in rgba.pixels_mut() {
            for channel in &mut pixel.0[..3] {
                *channel = quantize(*channel);
            }
        }
        DynamicImage::ImageRgba8(rgba)
    } else {
        let mut rgb = img.into_rgb8();
        for pixel in rgb.pixels_mut() {
            for channel in &mut pixel.0 {
                *channel = quantize(*channel);
            }
        }
        DynamicImage::ImageRgb8(rgb)
    }
}

/// True when any pixel has alpha < 255.
pub fn has_transparency(img: &DynamicImage) -> bool {
    match img {
        DynamicImage::ImageRgba8(rgba) => rgba.pixels().any(|p| p.0[3] < u8::MAX),
        DynamicImage::ImageLumaA8(la) => la.pixels().any(|p| p.0[1] < u8::MAX),
        other if other.color().has_alpha() => {
            other.to_rgba8().pixels().any(|p| p.0[3] < u8::MAX)
        }
        _ => false,
    }
}
