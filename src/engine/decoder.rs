// src/engine/decoder.rs
//
// Decoding: every input kind maps to a Decoder capability.
// - Standard: JPEG (mozjpeg), PNG (zune-png), WebP (libwebp), GIF/BMP (image crate)
// - Tiff: pure-Rust TIFF decoder from the image crate
// - Heic: libheif (optional `heic` feature)
// TIFF and HEIC are also turned into PNG/JPEG intermediates that the rest of
// the pipeline treats as if they were the original input.

use crate::engine::common::{run_with_panic_policy, EngineResult};
use crate::engine::metadata;
use crate::engine::pipeline::apply_orientation;
use crate::engine::planner::Dimensions;
use crate::engine::sniff::MimeType;
use crate::engine::{MAX_DIMENSION, MAX_PIXELS};
use crate::error::ConvertError;
use crate::ops::TargetFormat;
use image::codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder};
use image::{
    DynamicImage, GrayAlphaImage, GrayImage, ImageEncoder, ImageFormat, ImageReader, RgbImage,
    RgbaImage,
};
use mozjpeg::Decompress;
use std::io::Cursor;
use webp::{BitstreamFeatures, Decoder as WebPDecoder};
use zune_core::bytestream::ZCursor;
use zune_core::colorspace::ColorSpace;
use zune_core::options::DecoderOptions;
use zune_png::PngDecoder;

type DecoderResult<T> = EngineResult<T>;

/// Quality of the JPEG intermediate produced from HEIC sources.
const HEIC_JPEG_INTERMEDIATE_QUALITY: u8 = 95;

/// Closed set of input kinds the pipeline distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Tiff,
    Heic,
    Standard,
}

impl InputKind {
    pub fn from_mime(mime: MimeType) -> Self {
        match mime {
            MimeType::Tiff => Self::Tiff,
            MimeType::Heic | MimeType::Heif => Self::Heic,
            _ => Self::Standard,
        }
    }

    pub fn decoder(&self) -> &'static dyn Decoder {
        match self {
            Self::Tiff => &TiffDecoder,
            Self::Heic => &HeicDecoder,
            Self::Standard => &StandardDecoder,
        }
    }

    /// Convert a TIFF/HEIC source into the intermediate the raster stage reads.
    /// Standard inputs need no adapter and return `None`.
    pub fn to_intermediate(
        &self,
        bytes: &[u8],
        target: TargetFormat,
    ) -> DecoderResult<Option<Vec<u8>>> {
        match self {
            Self::Standard => Ok(None),
            Self::Tiff => {
                let img = self.decoder().decode(bytes)?;
                let img = apply_orientation(img, metadata::orientation(bytes).unwrap_or(1));
                encode_png_intermediate(&DynamicImage::ImageRgba8(img.into_rgba8())).map(Some)
            }
            Self::Heic => {
                // libheif already applies the container's rotation/mirror transforms
                let img = self.decoder().decode(bytes)?;
                let out = match heic_intermediate_format(target) {
                    MimeType::Jpeg => encode_jpeg_intermediate(&img)?,
                    _ => encode_png_intermediate(&img)?,
                };
                Ok(Some(out))
            }
        }
    }
}

/// HEIC cannot be the input of WebP/JPEG directly; those go through JPEG,
/// everything else through PNG.
pub fn heic_intermediate_format(target: TargetFormat) -> MimeType {
    match target {
        TargetFormat::Jpeg | TargetFormat::Webp => MimeType::Jpeg,
        _ => MimeType::Png,
    }
}

/// Single decode entry point per input kind.
pub trait Decoder: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> DecoderResult<DynamicImage>;
}

pub struct StandardDecoder;
pub struct TiffDecoder;
pub struct HeicDecoder;

impl Decoder for StandardDecoder {
    fn decode(&self, bytes: &[u8]) -> DecoderResult<DynamicImage> {
        match crate::engine::sniff::sniff(bytes) {
            MimeType::Jpeg => decode_jpeg_mozjpeg(bytes),
            MimeType::Png => decode_png_zune(bytes),
            MimeType::Webp => decode_webp_libwebp(bytes),
            MimeType::Gif | MimeType::Bmp => decode_with_image_crate(bytes),
            other => Err(ConvertError::unsupported_format(other.as_str())),
        }
    }
}

impl Decoder for TiffDecoder {
    fn decode(&self, bytes: &[u8]) -> DecoderResult<DynamicImage> {
        run_with_panic_policy("decode:tiff", || {
            let header = ImageReader::with_format(Cursor::new(bytes), ImageFormat::Tiff);
            let (width, height) = header
                .into_dimensions()
                .map_err(|e| ConvertError::decode_failed("tiff", e.to_string()))?;
            check_dimensions(width, height)?;

            ImageReader::with_format(Cursor::new(bytes), ImageFormat::Tiff)
                .decode()
                .map_err(|e| ConvertError::decode_failed("tiff", e.to_string()))
        })
    }
}

impl Decoder for HeicDecoder {
    #[cfg(feature = "heic")]
    fn decode(&self, bytes: &[u8]) -> DecoderResult<DynamicImage> {
        use libheif_rs::{ColorSpace as HeifColorSpace, HeifContext, LibHeif, RgbChroma};

        run_with_panic_policy("decode:heic", || {
            let heif_err = |e: libheif_rs::HeifError| ConvertError::decode_failed("heic", e.to_string());

            let lib_heif = LibHeif::new();
            let ctx = HeifContext::read_from_bytes(bytes).map_err(heif_err)?;
            let handle = ctx.primary_image_handle().map_err(heif_err)?;
            check_dimensions(handle.width(), handle.height())?;

            let has_alpha = handle.has_alpha_channel();
            let chroma = if has_alpha {
                RgbChroma::Rgba
            } else {
                RgbChroma::Rgb
            };
            let image = lib_heif
                .decode(&handle, HeifColorSpace::Rgb(chroma), None)
                .map_err(heif_err)?;

            let planes = image.planes();
            let plane = planes
                .interleaved
                .ok_or_else(|| ConvertError::decode_failed("heic", "missing interleaved plane"))?;

            let channels = if has_alpha { 4 } else { 3 };
            let width = plane.width;
            let height = plane.height;
            let row_len = width as usize * channels;
            let mut pixels = Vec::with_capacity(row_len * height as usize);
            for row in plane.data.chunks(plane.stride).take(height as usize) {
                let row = row
                    .get(..row_len)
                    .ok_or_else(|| ConvertError::decode_failed("heic", "short plane row"))?;
                pixels.extend_from_slice(row);
            }

            let img = if has_alpha {
                RgbaImage::from_raw(width, height, pixels).map(DynamicImage::ImageRgba8)
            } else {
                RgbImage::from_raw(width, height, pixels).map(DynamicImage::ImageRgb8)
            };
            img.ok_or_else(|| ConvertError::decode_failed("heic", "failed to build image"))
        })
    }

    #[cfg(not(feature = "heic"))]
    fn decode(&self, _bytes: &[u8]) -> DecoderResult<DynamicImage> {
        Err(ConvertError::decode_failed(
            "heic",
            "HEIC support is not enabled in this build",
        ))
    }
}

/// Decode any raster-readable input and apply its EXIF orientation.
pub fn decode_oriented(bytes: &[u8]) -> DecoderResult<DynamicImage> {
    let img = StandardDecoder.decode(bytes)?;
    Ok(match metadata::orientation(bytes) {
        Some(orientation) if orientation != 1 => {
            tracing::debug!(orientation, "applying EXIF orientation");
            apply_orientation(img, orientation)
        }
        _ => img,
    })
}

/// Decode JPEG using mozjpeg (backed by libjpeg-turbo)
pub fn decode_jpeg_mozjpeg(data: &[u8]) -> DecoderResult<DynamicImage> {
    run_with_panic_policy("decode:mozjpeg", || {
        if !data.windows(2).any(|pair| pair == [0xFF, 0xD9]) {
            return Err(ConvertError::decode_failed(
                "jpeg",
                "mozjpeg: missing JPEG EOI marker",
            ));
        }

        let decompress = Decompress::new_mem(data).map_err(|e| {
            ConvertError::decode_failed("jpeg", format!("mozjpeg decompress init failed: {e:?}"))
        })?;

        let mut decompress = decompress.rgb().map_err(|e| {
            ConvertError::decode_failed("jpeg", format!("mozjpeg rgb conversion failed: {e:?}"))
        })?;

        let width = u32::try_from(decompress.width())
            .map_err(|_| ConvertError::dimension_exceeds_limit(u32::MAX, MAX_DIMENSION))?;
        let height = u32::try_from(decompress.height())
            .map_err(|_| ConvertError::dimension_exceeds_limit(u32::MAX, MAX_DIMENSION))?;
        check_dimensions(width, height)?;

        let pixels: Vec<[u8; 3]> = decompress.read_scanlines().map_err(|e| {
            ConvertError::decode_failed("jpeg", format!("mozjpeg: failed to read scanlines: {e:?}"))
        })?;
        let flat_pixels: Vec<u8> = pixels.into_iter().flatten().collect();

        let rgb_image = RgbImage::from_raw(width, height, flat_pixels).ok_or_else(|| {
            ConvertError::decode_failed("jpeg", "mozjpeg: failed to create image from raw data")
        })?;

        Ok(DynamicImage::ImageRgb8(rgb_image))
    })
}

/// Decode GIF/BMP (and anything else the image crate knows) under the panic policy.
pub fn decode_with_image_crate(data: &[u8]) -> DecoderResult<DynamicImage> {
    run_with_panic_policy("decode:image", || {
        ensure_dimensions_safe(data)?;
        image::load_from_memory(data)
            .map_err(|e| ConvertError::decode_failed("image", format!("decode failed: {e}")))
    })
}

/// Decode PNG using zune-png. 16-bit input is stripped to 8-bit.
pub fn decode_png_zune(data: &[u8]) -> DecoderResult<DynamicImage> {
    run_with_panic_policy("decode:png", || {
        ensure_dimensions_safe(data)?;

        let options = DecoderOptions::default().png_set_strip_to_8bit(true);
        let mut decoder = PngDecoder::new_with_options(ZCursor::new(data), options);
        let pixels = decoder
            .decode()
            .map_err(|e| ConvertError::decode_failed("png", format!("decode failed: {e}")))?;

        let info = decoder
            .info()
            .ok_or_else(|| ConvertError::decode_failed("png", "missing header info"))?;

        let width = info.width as u32;
        let height = info.height as u32;
        check_dimensions(width, height)?;

        let buf = match pixels {
            zune_core::result::DecodingResult::U8(v) => v,
            _ => {
                return Err(ConvertError::decode_failed(
                    "png",
                    "unexpected non-U8 pixel buffer",
                ))
            }
        };

        let colorspace = decoder
            .colorspace()
            .ok_or_else(|| ConvertError::decode_failed("png", "missing colorspace"))?;

        let built = match colorspace {
            ColorSpace::RGB => RgbImage::from_raw(width, height, buf).map(DynamicImage::ImageRgb8),
            ColorSpace::RGBA => {
                RgbaImage::from_raw(width, height, buf).map(DynamicImage::ImageRgba8)
            }
            ColorSpace::Luma => {
                GrayImage::from_raw(width, height, buf).map(DynamicImage::ImageLuma8)
            }
            ColorSpace::LumaA => {
                GrayAlphaImage::from_raw(width, height, buf).map(DynamicImage::ImageLumaA8)
            }
            other => {
                return Err(ConvertError::decode_failed(
                    "png",
                    format!("unsupported colorspace {other:?}"),
                ))
            }
        };

        built.ok_or_else(|| ConvertError::decode_failed("png", "pixel buffer size mismatch"))
    })
}

/// Decode WebP using libwebp. Animated WebP falls back to the image crate.
pub fn decode_webp_libwebp(data: &[u8]) -> DecoderResult<DynamicImage> {
    run_with_panic_policy("decode:webp", || {
        // Parse header first to avoid allocating huge buffers on malformed files
        let features = BitstreamFeatures::new(data)
            .ok_or_else(|| ConvertError::decode_failed("webp", "failed to read bitstream features"))?;

        check_dimensions(features.width(), features.height())?;

        if features.has_animation() {
            return image::load_from_memory(data).map_err(|e| {
                ConvertError::decode_failed("webp", format!("animated decode failed: {e}"))
            });
        }

        let decoded = WebPDecoder::new(data)
            .decode()
            .ok_or_else(|| ConvertError::decode_failed("webp", "decode failed"))?;

        check_dimensions(decoded.width(), decoded.height())?;

        Ok(decoded.to_image())
    })
}

/// Check if image dimensions are within safe limits.
/// Returns an error if the image is too large (potential decompression bomb).
pub fn check_dimensions(width: u32, height: u32) -> DecoderResult<()> {
    if width > MAX_DIMENSION || height > MAX_DIMENSION {
        return Err(ConvertError::dimension_exceeds_limit(
            width.max(height),
            MAX_DIMENSION,
        ));
    }
    let pixels = Dimensions::new(width, height).pixels();
    if pixels > MAX_PIXELS {
        return Err(ConvertError::pixel_count_exceeds_limit(pixels, MAX_PIXELS));
    }
    Ok(())
}

/// Inspect encoded bytes and ensure the image dimensions are safe before decoding.
pub fn ensure_dimensions_safe(bytes: &[u8]) -> DecoderResult<()> {
    let cursor = Cursor::new(bytes);
    if let Ok(reader) = ImageReader::new(cursor).with_guessed_format() {
        if let Ok((width, height)) = reader.into_dimensions() {
            return check_dimensions(width, height);
        }
    }
    Ok(())
}

/// Lossless PNG used as an intermediate; fast compression since it is re-encoded anyway.
pub(crate) fn encode_png_intermediate(img: &DynamicImage) -> DecoderResult<Vec<u8>> {
    run_with_panic_policy("intermediate:png", || {
        let mut buf = Vec::new();
        PngEncoder::new_with_quality(&mut buf, CompressionType::Fast, PngFilter::Adaptive)
            .write_image(
                img.as_bytes(),
                img.width(),
                img.height(),
                img.color().into(),
            )
            .map_err(|e| ConvertError::encode_failed("png", e.to_string()))?;
        Ok(buf)
    })
}

fn encode_jpeg_intermediate(img: &DynamicImage) -> DecoderResult<Vec<u8>> {
    run_with_panic_policy("intermediate:jpeg", || {
        let rgb = img.to_rgb8();
        let mut buf = Vec::new();
        image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buf, HEIC_JPEG_INTERMEDIATE_QUALITY)
            .encode_image(&rgb)
            .map_err(|e| ConvertError::encode_failed("jpeg", e.to_string()))?;
        Ok(buf)
    })
}
