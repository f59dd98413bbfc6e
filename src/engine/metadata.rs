// src/engine/metadata.rs
//
// EXIF and ICC handling.
// - orientation(): Orientation tag via kamadak-exif (drives auto-orient at decode)
// - preserve(): copy the source EXIF, minus Orientation, into an encoded JPEG (little_exif)
// - extract_icc_profile(): ICC from JPEG/PNG/WebP containers (img-parts)

use crate::engine::common::{run_with_panic_policy, EngineResult};
use crate::engine::sniff::{sniff, MimeType};
use crate::error::ConvertError;
use img_parts::{jpeg::Jpeg, png::Png, webp::WebP, ImageICC};
use little_exif::exif_tag::ExifTag;
use little_exif::filetype::FileExtension;
use little_exif::metadata::Metadata;
use std::io::Cursor;

/// EXIF Orientation (1-8) of `bytes`, or `None` when absent or invalid.
pub fn orientation(bytes: &[u8]) -> Option<u16> {
    let exif = read_exif(bytes)?;
    let field = exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)?;
    // Short or Long depending on the writer
    let value = field.value.get_uint(0)?;
    let orientation = u16::try_from(value).ok()?;
    (1..=8).contains(&orientation).then_some(orientation)
}

/// True when `bytes` carries a readable EXIF block.
pub fn has_exif(bytes: &[u8]) -> bool {
    read_exif(bytes).is_some()
}

fn read_exif(bytes: &[u8]) -> Option<exif::Exif> {
    let mut cursor = Cursor::new(bytes);
    exif::Reader::new().read_from_container(&mut cursor).ok()
}

fn exif_container(mime: MimeType) -> Option<FileExtension> {
    match mime {
        MimeType::Jpeg => Some(FileExtension::JPEG),
        MimeType::Png => Some(FileExtension::PNG {
            as_zTXt_chunk: false,
        }),
        MimeType::Webp => Some(FileExtension::WEBP),
        MimeType::Tiff => Some(FileExtension::TIFF),
        MimeType::Heic | MimeType::Heif => Some(FileExtension::HEIF),
        _ => None,
    }
}

/// Copy EXIF from `original` into `encoded_jpeg`, dropping Orientation (274).
///
/// The pixels in `encoded_jpeg` are already upright, so a stale Orientation
/// would make viewers rotate twice. A source without EXIF returns the JPEG
/// unchanged. Errors leave it to the caller to keep the EXIF-less JPEG.
pub fn preserve(original: &[u8], encoded_jpeg: Vec<u8>) -> EngineResult<Vec<u8>> {
    if !has_exif(original) {
        return Ok(encoded_jpeg);
    }
    let container = exif_container(sniff(original)).ok_or_else(|| {
        ConvertError::metadata_failed("source container cannot carry EXIF")
    })?;

    run_with_panic_policy("metadata:preserve", move || {
        let source = original.to_vec();
        let mut metadata = Metadata::new_from_vec(&source, container)
            .map_err(|e| ConvertError::metadata_failed(format!("failed to read EXIF: {e}")))?;

        metadata.remove_tag(ExifTag::Orientation(Vec::new()));

        let mut output = encoded_jpeg;
        metadata
            .write_to_vec(&mut output, FileExtension::JPEG)
            .map_err(|e| ConvertError::metadata_failed(format!("failed to write EXIF: {e}")))?;

        tracing::debug!(bytes = output.len(), "EXIF carried into JPEG output");
        Ok(output)
    })
}

/// Extract ICC profile from image data.
/// Supports JPEG (APP2 marker), PNG (iCCP chunk), and WebP (ICCP chunk).
pub fn extract_icc_profile(data: &[u8]) -> Option<Vec<u8>> {
    if data.len() < 12 {
        return None;
    }

    let icc_data = match sniff(data) {
        MimeType::Jpeg => Jpeg::from_bytes(data.to_vec().into())
            .ok()?
            .icc_profile()?
            .to_vec(),
        MimeType::Png => Png::from_bytes(data.to_vec().into())
            .ok()?
            .icc_profile()?
            .to_vec(),
        MimeType::Webp => WebP::from_bytes(data.to_vec().into())
            .ok()?
            .icc_profile()?
            .to_vec(),
        _ => return None,
    };

    if validate_icc_profile(&icc_data) {
        Some(icc_data)
    } else {
        tracing::debug!(len = icc_data.len(), "ignoring malformed ICC profile");
        None
    }
}

/// Validate ICC profile header
/// ICC profiles start with a 128-byte header whose size field matches the data
pub(crate) fn validate_icc_profile(icc_data: &[u8]) -> bool {
    if icc_data.len() < 128 {
        return false;
    }

    let profile_size =
        u32::from_be_bytes([icc_data[0], icc_data[1], icc_data[2], icc_data[3]]) as usize;
    if profile_size != icc_data.len() {
        return false;
    }

    // Major version is 2, 4 or 5 in practice
    if icc_data[8] > 10 {
        return false;
    }

    // CMM type, profile class, colour space and PCS are 4-char ASCII signatures
    let printable = |range: std::ops::Range<usize>| {
        icc_data[range]
            .iter()
            .all(|&b| b == 0 || (32..=126).contains(&b))
    };
    printable(4..8) && printable(12..16) && printable(16..20) && printable(20..24)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use image::{DynamicImage, RgbImage};

    pub fn create_minimal_srgb_icc() -> Vec<u8> {
        let mut icc = vec![0u8; 128];
        icc[0..4].copy_from_slice(&128u32.to_be_bytes());
        icc[4..8].copy_from_slice(b"ADBE");
        icc[8] = 2;
        icc[12..16].copy_from_slice(b"mntr");
        icc[16..20].copy_from_slice(b"RGB ");
        icc[20..24].copy_from_slice(b"XYZ ");
        icc
    }

    pub fn plain_jpeg(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x * 7 % 256) as u8, (y * 3 % 256) as u8, 90])
        }));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Jpeg)
            .unwrap();
        buf
    }

    /// Hash noise at a low quality. Tiny on disk, expensive for any
    /// max-quality re-encode.
    pub fn noisy_jpeg(width: u32, height: u32, quality: u8) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            let h = x.wrapping_mul(2_654_435_761) ^ y.wrapping_mul(40_503).rotate_left(13);
            image::Rgb([(h >> 8) as u8, (h >> 16) as u8, (h >> 24) as u8])
        }));
        let mut buf = Vec::new();
        let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buf, quality);
        img.write_with_encoder(encoder).unwrap();
        buf
    }

    /// Add Orientation and Make tags to a JPEG.
    pub fn tag_orientation(mut jpeg: Vec<u8>, orientation: u16) -> Vec<u8> {
        let mut metadata = Metadata::new();
        metadata.set_tag(ExifTag::Orientation(vec![orientation]));
        metadata.set_tag(ExifTag::Make("TestCam".to_string()));
        metadata.write_to_vec(&mut jpeg, FileExtension::JPEG).unwrap();
        jpeg
    }

    /// JPEG with Orientation and Make tags.
    pub fn jpeg_with_exif(width: u32, height: u32, orientation: u16) -> Vec<u8> {
        tag_orientation(plain_jpeg(width, height), orientation)
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    fn make_tag(bytes: &[u8]) -> Option<String> {
        let exif = read_exif(bytes)?;
        let field = exif.get_field(exif::Tag::Make, exif::In::PRIMARY)?;
        Some(field.display_value().to_string().trim_matches('"').to_string())
    }

    mod orientation_tests {
        use super::*;

        #[test]
        fn test_reads_orientation() {
            assert_eq!(orientation(&jpeg_with_exif(8, 4, 6)), Some(6));
            assert_eq!(orientation(&jpeg_with_exif(8, 4, 3)), Some(3));
        }

        #[test]
        fn test_missing_exif_is_none() {
            assert_eq!(orientation(&plain_jpeg(8, 4)), None);
            assert_eq!(orientation(b"garbage"), None);
            assert_eq!(orientation(&[]), None);
        }
    }

    mod preserve_tests {
        use super::*;

        #[test]
        fn test_strips_orientation_and_keeps_other_tags() {
            let original = jpeg_with_exif(16, 8, 6);
            let encoded = plain_jpeg(8, 16);

            let out = preserve(&original, encoded).unwrap();

            assert!(has_exif(&out));
            assert_eq!(orientation(&out), None);
            assert_eq!(make_tag(&out).as_deref(), Some("TestCam"));
            assert_eq!(&out[0..2], &[0xFF, 0xD8]);
        }

        #[test]
        fn test_source_without_exif_returns_jpeg_unchanged() {
            let encoded = plain_jpeg(8, 8);
            let out = preserve(&plain_jpeg(8, 8), encoded.clone()).unwrap();
            assert_eq!(out, encoded);
        }

        #[test]
        fn test_non_image_source_returns_jpeg_unchanged() {
            let encoded = plain_jpeg(4, 4);
            assert_eq!(preserve(b"not an image", encoded.clone()).unwrap(), encoded);
        }
    }

    mod icc_tests {
        use super::*;
        use img_parts::Bytes;

        #[test]
        fn test_validate_icc_profile() {
            assert!(validate_icc_profile(&create_minimal_srgb_icc()));
            assert!(!validate_icc_profile(&[0u8; 64]));

            let mut wrong_size = create_minimal_srgb_icc();
            wrong_size[0..4].copy_from_slice(&256u32.to_be_bytes());
            assert!(!validate_icc_profile(&wrong_size));

            let mut bad_version = create_minimal_srgb_icc();
            bad_version[8] = 42;
            assert!(!validate_icc_profile(&bad_version));
        }

        #[test]
        fn test_extract_icc_from_jpeg() {
            let icc = create_minimal_srgb_icc();
            let mut jpeg = Jpeg::from_bytes(plain_jpeg(4, 4).into()).unwrap();
            jpeg.set_icc_profile(Some(Bytes::from(icc.clone())));
            let mut data = Vec::new();
            jpeg.encoder().write_to(&mut data).unwrap();

            assert_eq!(extract_icc_profile(&data), Some(icc));
        }

        #[test]
        fn test_extract_icc_none_cases() {
            assert_eq!(extract_icc_profile(&plain_jpeg(4, 4)), None);
            assert_eq!(extract_icc_profile(b"definitely not an image"), None);
            assert_eq!(extract_icc_profile(&[]), None);
        }
    }
}
