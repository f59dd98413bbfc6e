// src/engine/encoder.rs
//
// Encoder back-ends. Each raster output format has two independent encoders:
// - native:   mozjpeg / libwebp advanced API / image PNG + oxipng
// - portable: image JpegEncoder / libwebp simple API / image PNG (best + adaptive)
// plus ICC embedding for all three containers.

use crate::engine::common::{run_with_panic_policy, EngineResult};
use crate::engine::MAX_DIMENSION;
use crate::error::ConvertError;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder};
use image::{DynamicImage, ImageEncoder};
use img_parts::{jpeg::Jpeg, png::Png, webp::WebP, Bytes, ImageICC};
use mozjpeg::{ColorSpace, Compress, ScanMode};
use std::borrow::Cow;

type EncoderResult<T> = EngineResult<T>;

/// Derives the per-format encoder knobs from a 0-100 quality.
/// Bands:
/// - High (>=85): visual quality first
/// - Balanced (70-84)
/// - Fast (50-69)
/// - Fastest (<50)
#[derive(Debug, Clone, Copy)]
pub struct QualitySettings {
    quality: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QualityBand {
    High,
    Balanced,
    Fast,
    Fastest,
}

impl QualitySettings {
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.min(100) as f32,
        }
    }

    pub fn quality(&self) -> f32 {
        self.quality
    }

    fn band(&self) -> QualityBand {
        if self.quality >= 85.0 {
            QualityBand::High
        } else if self.quality >= 70.0 {
            QualityBand::Balanced
        } else if self.quality >= 50.0 {
            QualityBand::Fast
        } else {
            QualityBand::Fastest
        }
    }

    pub fn jpeg_smoothing(&self) -> u8 {
        if self.quality >= 90.0 {
            0
        } else if self.quality >= 70.0 {
            5
        } else if self.quality >= 60.0 {
            10
        } else {
            18
        }
    }

    pub fn webp_method(&self) -> i32 {
        4
    }

    pub fn webp_pass(&self) -> i32 {
        1
    }

    pub fn webp_sns_strength(&self) -> i32 {
        match self.band() {
            QualityBand::High => 50,
            QualityBand::Balanced => 70,
            QualityBand::Fast | QualityBand::Fastest => 80,
        }
    }

    pub fn webp_filter_strength(&self) -> i32 {
        if self.quality >= 80.0 {
            20
        } else if self.quality >= 60.0 {
            30
        } else {
            40
        }
    }

    pub fn webp_filter_sharpness(&self) -> i32 {
        match self.band() {
            QualityBand::High => 2,
            QualityBand::Balanced | QualityBand::Fast | QualityBand::Fastest => 0,
        }
    }

    /// oxipng preset; lower quality buys a more exhaustive (slower) search
    pub fn oxipng_preset(&self) -> u8 {
        match self.band() {
            QualityBand::High | QualityBand::Balanced => 2,
            QualityBand::Fast | QualityBand::Fastest => 4,
        }
    }
}

fn validate_dimensions(format: &'static str, w: u32, h: u32) -> EncoderResult<()> {
    if w == 0 || h == 0 {
        return Err(ConvertError::encode_failed(
            format,
            "width or height is zero",
        ));
    }
    if w > MAX_DIMENSION || h > MAX_DIMENSION {
        return Err(ConvertError::dimension_exceeds_limit(w.max(h), MAX_DIMENSION));
    }
    Ok(())
}

fn as_rgb(img: &DynamicImage) -> Cow<'_, image::RgbImage> {
    match img {
        DynamicImage::ImageRgb8(rgb) => Cow::Borrowed(rgb),
        _ => Cow::Owned(img.to_rgb8()),
    }
}

fn as_rgba(img: &DynamicImage) -> Cow<'_, image::RgbaImage> {
    match img {
        DynamicImage::ImageRgba8(rgba) => Cow::Borrowed(rgba),
        _ => Cow::Owned(img.to_rgba8()),
    }
}

// =============================================================================
// JPEG
// =============================================================================

/// mozjpeg, progressive with optimized scans.
pub fn encode_jpeg_native(
    img: &DynamicImage,
    quality: u8,
    icc: Option<&[u8]>,
) -> EncoderResult<Vec<u8>> {
    run_with_panic_policy("encode:jpeg:native", || {
        let settings = QualitySettings::new(quality);
        let rgb = as_rgb(img);
        let (w, h) = rgb.dimensions();
        validate_dimensions("jpeg", w, h)?;
        let pixels: &[u8] = rgb.as_raw();

        let mut comp = Compress::new(ColorSpace::JCS_RGB);
        comp.set_size(w as usize, h as usize);
        comp.set_color_space(ColorSpace::JCS_YCbCr);
        comp.set_quality(settings.quality());
        comp.set_chroma_sampling_pixel_sizes((2, 2), (2, 2));
        comp.set_progressive_mode();
        comp.set_optimize_coding(true);
        comp.set_optimize_scans(true);
        comp.set_scan_optimization_mode(ScanMode::AllComponentsTogether);
        comp.set_smoothing_factor(settings.jpeg_smoothing());

        let estimated_size = (w as usize * h as usize * 3 / 10).max(4096);
        let mut output = Vec::with_capacity(estimated_size);

        let encoded = {
            let mut writer = comp.start_compress(&mut output).map_err(|e| {
                ConvertError::encode_failed("jpeg", format!("mozjpeg: failed to start compress: {e:?}"))
            })?;

            let stride = w as usize * 3;
            for row in pixels.chunks(stride) {
                writer.write_scanlines(row).map_err(|e| {
                    ConvertError::encode_failed(
                        "jpeg",
                        format!("mozjpeg: failed to write scanlines: {e:?}"),
                    )
                })?;
            }

            writer.finish().map_err(|e| {
                ConvertError::encode_failed("jpeg", format!("mozjpeg: failed to finish: {e:?}"))
            })?;

            output
        };

        match icc {
            Some(icc_data) => embed_icc_jpeg(encoded, icc_data),
            None => Ok(encoded),
        }
    })
}

/// Baseline JPEG from the image crate.
pub fn encode_jpeg_portable(
    img: &DynamicImage,
    quality: u8,
    icc: Option<&[u8]>,
) -> EncoderResult<Vec<u8>> {
    run_with_panic_policy("encode:jpeg:portable", || {
        let rgb = as_rgb(img);
        validate_dimensions("jpeg", rgb.width(), rgb.height())?;

        let mut buf = Vec::new();
        // image's encoder rejects quality 0
        JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100))
            .encode_image(&*rgb)
            .map_err(|e| ConvertError::encode_failed("jpeg", e.to_string()))?;

        match icc {
            Some(icc_data) => embed_icc_jpeg(buf, icc_data),
            None => Ok(buf),
        }
    })
}

/// Embed ICC profile into JPEG using img-parts
pub fn embed_icc_jpeg(jpeg_data: Vec<u8>, icc: &[u8]) -> EncoderResult<Vec<u8>> {
    run_with_panic_policy("encode:jpeg:embed_icc", || {
        let mut jpeg = Jpeg::from_bytes(Bytes::from(jpeg_data)).map_err(|e| {
            ConvertError::encode_failed("jpeg", format!("failed to parse JPEG for ICC: {e}"))
        })?;
        jpeg.set_icc_profile(Some(Bytes::copy_from_slice(icc)));

        let mut output = Vec::new();
        jpeg.encoder().write_to(&mut output).map_err(|e| {
            ConvertError::encode_failed("jpeg", format!("failed to write JPEG with ICC: {e}"))
        })?;
        Ok(output)
    })
}

// =============================================================================
// PNG
// =============================================================================

/// image PNG followed by a lossless oxipng re-pack.
pub fn encode_png_native(
    img: &DynamicImage,
    quality: u8,
    icc: Option<&[u8]>,
) -> EncoderResult<Vec<u8>> {
    run_with_panic_policy("encode:png:native", || {
        validate_dimensions("png", img.width(), img.height())?;
        let buf = write_png(img, CompressionType::Fast, PngFilter::Adaptive)?;

        let mut options = oxipng::Options::from_preset(QualitySettings::new(quality).oxipng_preset());
        // Keep ancillary chunks (ICC in particular)
        options.strip = oxipng::StripChunks::None;
        let optimized = oxipng::optimize_from_memory(&buf, &options).map_err(|e| {
            ConvertError::encode_failed("png", format!("oxipng optimization failed: {e}"))
        })?;

        match icc {
            Some(icc_data) => embed_icc_png(optimized, icc_data),
            None => Ok(optimized),
        }
    })
}

/// image PNG, best zlib compression with adaptive filtering.
pub fn encode_png_portable(img: &DynamicImage, icc: Option<&[u8]>) -> EncoderResult<Vec<u8>> {
    run_with_panic_policy("encode:png:portable", || {
        validate_dimensions("png", img.width(), img.height())?;
        let buf = write_png(img, CompressionType::Best, PngFilter::Adaptive)?;
        match icc {
            Some(icc_data) => embed_icc_png(buf, icc_data),
            None => Ok(buf),
        }
    })
}

fn write_png(
    img: &DynamicImage,
    compression: CompressionType,
    filter: PngFilter,
) -> EncoderResult<Vec<u8>> {
    // 16-bit and float layouts are narrowed to 8-bit RGB(A)
    let img: Cow<'_, DynamicImage> = match img {
        DynamicImage::ImageRgb8(_)
        | DynamicImage::ImageRgba8(_)
        | DynamicImage::ImageLuma8(_)
        | DynamicImage::ImageLumaA8(_) => Cow::Borrowed(img),
        other if other.color().has_alpha() => Cow::Owned(DynamicImage::ImageRgba8(other.to_rgba8())),
        other => Cow::Owned(DynamicImage::ImageRgb8(other.to_rgb8())),
    };

    let mut buf = Vec::new();
    PngEncoder::new_with_quality(&mut buf, compression, filter)
        .write_image(img.as_bytes(), img.width(), img.height(), img.color().into())
        .map_err(|e| ConvertError::encode_failed("png", format!("PNG encode failed: {e}")))?;
    Ok(buf)
}

/// Embed ICC profile into PNG using img-parts
pub fn embed_icc_png(png_data: Vec<u8>, icc: &[u8]) -> EncoderResult<Vec<u8>> {
    run_with_panic_policy("encode:png:embed_icc", || {
        let mut png = Png::from_bytes(Bytes::from(png_data)).map_err(|e| {
            ConvertError::encode_failed("png", format!("failed to parse PNG for ICC: {e}"))
        })?;
        png.set_icc_profile(Some(Bytes::copy_from_slice(icc)));

        let mut output = Vec::new();
        png.encoder().write_to(&mut output).map_err(|e| {
            ConvertError::encode_failed("png", format!("failed to write PNG with ICC: {e}"))
        })?;
        Ok(output)
    })
}

// =============================================================================
// WebP
// =============================================================================

/// libwebp advanced API with band-tuned config. Alpha is kept only when present.
pub fn encode_webp_native(
    img: &DynamicImage,
    quality: u8,
    icc: Option<&[u8]>,
) -> EncoderResult<Vec<u8>> {
    run_with_panic_policy("encode:webp:native", || {
        validate_dimensions("webp", img.width(), img.height())?;

        let mut config = webp::WebPConfig::new()
            .map_err(|_| ConvertError::internal_panic("failed to create WebPConfig"))?;
        let settings = QualitySettings::new(quality);
        config.quality = settings.quality();
        config.method = settings.webp_method();
        config.pass = settings.webp_pass();
        config.preprocessing = 0;
        config.sns_strength = settings.webp_sns_strength();
        config.autofilter = 1;
        config.filter_strength = settings.webp_filter_strength();
        config.filter_sharpness = settings.webp_filter_sharpness();

        let encoded = if img.color().has_alpha() {
            let rgba = as_rgba(img);
            webp::Encoder::from_rgba(rgba.as_raw(), rgba.width(), rgba.height())
                .encode_advanced(&config)
                .map(|mem| mem.to_vec())
        } else {
            let rgb = as_rgb(img);
            webp::Encoder::from_rgb(rgb.as_raw(), rgb.width(), rgb.height())
                .encode_advanced(&config)
                .map(|mem| mem.to_vec())
        }
        .map_err(|e| ConvertError::encode_failed("webp", format!("WebP encode failed: {e:?}")))?;

        match icc {
            Some(icc_data) => embed_icc_webp(encoded, icc_data),
            None => Ok(encoded),
        }
    })
}

/// libwebp simple lossy API (default config at the given quality).
pub fn encode_webp_portable(
    img: &DynamicImage,
    quality: u8,
    icc: Option<&[u8]>,
) -> EncoderResult<Vec<u8>> {
    run_with_panic_policy("encode:webp:portable", || {
        validate_dimensions("webp", img.width(), img.height())?;
        let q = quality.min(100) as f32;

        let encoded = if img.color().has_alpha() {
            let rgba = as_rgba(img);
            webp::Encoder::from_rgba(rgba.as_raw(), rgba.width(), rgba.height())
                .encode(q)
                .to_vec()
        } else {
            let rgb = as_rgb(img);
            webp::Encoder::from_rgb(rgb.as_raw(), rgb.width(), rgb.height())
                .encode(q)
                .to_vec()
        };

        if encoded.is_empty() {
            return Err(ConvertError::encode_failed("webp", "libwebp returned no data"));
        }

        match icc {
            Some(icc_data) => embed_icc_webp(encoded, icc_data),
            None => Ok(encoded),
        }
    })
}

/// Embed ICC profile into WebP using img-parts
pub fn embed_icc_webp(webp_data: Vec<u8>, icc: &[u8]) -> EncoderResult<Vec<u8>> {
    run_with_panic_policy("encode:webp:embed_icc", || {
        let mut webp = WebP::from_bytes(Bytes::from(webp_data)).map_err(|e| {
            ConvertError::encode_failed("webp", format!("failed to parse WebP for ICC: {e}"))
        })?;
        webp.set_icc_profile(Some(Bytes::copy_from_slice(icc)));

        let mut output = Vec::new();
        webp.encoder().write_to(&mut output).map_err(|e| {
            ConvertError::encode_failed("webp", format!("failed to write WebP with ICC: {e}"))
        })?;
        Ok(output)
    })
}
