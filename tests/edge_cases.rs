// tests/edge_cases.rs
//
// Edge case tests for image-converter
// Tests boundary values, invalid inputs, and the original-bytes fallback

use image::{DynamicImage, GenericImageView, RgbImage};
use image_converter::engine::encoder::{encode_jpeg_native, encode_png_native, encode_webp_native};
use image_converter::engine::{check_dimensions, plan_dimensions, sniff, Dimensions, MimeType};
use image_converter::{
    CollectingNotifier, ConversionRequest, ImageProcessor, ResizeSpec, TargetFormat,
};
use std::sync::Arc;

// Helper function to create test images
fn create_test_image(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    }))
}

// Helper to create valid JPEG of specified size
fn create_valid_jpeg(width: u32, height: u32) -> Vec<u8> {
    let img = create_test_image(width, height);
    let rgb = img.to_rgb8();
    let (w, h) = rgb.dimensions();
    let pixels = rgb.into_raw();

    use mozjpeg::ColorSpace;
    use mozjpeg::Compress;

    let mut comp = Compress::new(ColorSpace::JCS_RGB);
    comp.set_size(w as usize, h as usize);
    comp.set_quality(80.0);
    comp.set_color_space(ColorSpace::JCS_YCbCr);
    comp.set_chroma_sampling_pixel_sizes((2, 2), (2, 2));

    let mut output = Vec::new();
    {
        let mut writer = comp.start_compress(&mut output).unwrap();
        let stride = w as usize * 3;
        for row in pixels.chunks(stride) {
            writer.write_scanlines(row).unwrap();
        }
        writer.finish().unwrap();
    }
    output
}

fn processor() -> (ImageProcessor, Arc<CollectingNotifier>) {
    let notices = Arc::new(CollectingNotifier::new());
    (
        ImageProcessor::new().with_notifier(notices.clone()),
        notices,
    )
}

mod minimal_image_tests {
    use super::*;

    #[test]
    fn test_1x1_encode_jpeg() {
        let img = create_test_image(1, 1);
        let result = encode_jpeg_native(&img, 80, None).unwrap();
        assert_eq!(&result[0..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn test_1x1_encode_png() {
        let img = create_test_image(1, 1);
        let result = encode_png_native(&img, 80, None).unwrap();
        assert_eq!(&result[0..8], &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]);
    }

    #[test]
    fn test_1x1_encode_webp() {
        let img = create_test_image(1, 1);
        let result = encode_webp_native(&img, 80, None).unwrap();
        assert_eq!(&result[0..4], b"RIFF");
    }

    #[tokio::test]
    async fn test_1x1_fit_to_box_upscales() {
        let request = ConversionRequest::new(create_valid_jpeg(1, 1), TargetFormat::Jpeg)
            .with_resize(ResizeSpec::fit(10, 10));
        let out = ImageProcessor::new().try_process(&request).await.unwrap();
        let decoded = image::load_from_memory(&out).unwrap();
        assert_eq!(decoded.dimensions(), (10, 10));
    }
}

mod large_image_tests {
    use super::*;

    #[test]
    fn test_max_dimension_boundary() {
        assert!(check_dimensions(32768, 1).is_ok());
        assert!(check_dimensions(1, 32768).is_ok());
    }

    #[test]
    fn test_exceed_max_dimension() {
        assert!(check_dimensions(32769, 1).is_err());
        assert!(check_dimensions(1, 32769).is_err());
    }

    #[test]
    fn test_exceed_max_pixels() {
        assert!(check_dimensions(10_000, 10_000).is_ok());
        assert!(check_dimensions(10_001, 10_000).is_err());
    }

    #[tokio::test]
    async fn test_enlargement_past_limits_returns_source() {
        let jpeg = create_valid_jpeg(4, 4000);
        let (processor, notices) = processor();
        let request = ConversionRequest::new(jpeg.clone(), TargetFormat::Png)
            .with_resize(ResizeSpec::width(20_000));

        assert_eq!(processor.process_image(&request).await, jpeg);
        assert_eq!(notices.notices().len(), 1);
    }
}

mod corrupted_image_tests {
    use super::*;

    #[tokio::test]
    async fn test_jpeg_header_only() {
        let data = vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10];
        let (processor, notices) = processor();
        let request = ConversionRequest::new(data.clone(), TargetFormat::Webp);

        assert_eq!(processor.process_image(&request).await, data);
        assert_eq!(notices.notices().len(), 1);
    }

    #[tokio::test]
    async fn test_truncated_jpeg() {
        let mut data = create_valid_jpeg(64, 64);
        data.truncate(data.len() / 3);
        let request = ConversionRequest::new(data.clone(), TargetFormat::Png);
        assert_eq!(ImageProcessor::new().process_image(&request).await, data);
    }

    #[tokio::test]
    async fn test_wrong_magic_bytes() {
        // PNG body behind a JPEG signature
        let mut data = create_valid_jpeg(8, 8);
        data[0] = 0x89;
        data[1] = b'P';
        let request = ConversionRequest::new(data.clone(), TargetFormat::Jpeg);
        assert_eq!(ImageProcessor::new().process_image(&request).await, data);
    }

    #[tokio::test]
    async fn test_empty_buffer() {
        let (processor, notices) = processor();
        for target in [TargetFormat::Jpeg, TargetFormat::Avif, TargetFormat::None] {
            let request = ConversionRequest::new(Vec::new(), target);
            assert!(processor.process_image(&request).await.is_empty());
        }
        assert!(notices.notices().is_empty());
    }
}

mod non_image_tests {
    use super::*;

    #[tokio::test]
    async fn test_text_file() {
        let data = b"# heading\n\nnot an image".to_vec();
        assert_eq!(sniff(&data), MimeType::Unknown);

        let (processor, notices) = processor();
        let request = ConversionRequest::new(data.clone(), TargetFormat::Webp)
            .with_file_name("note.md");
        assert_eq!(processor.process_image(&request).await, data);
        assert_eq!(notices.notices()[0].file_name.as_deref(), Some("note.md"));
    }

    #[tokio::test]
    async fn test_declared_mime_does_not_override_signature() {
        let data = create_valid_jpeg(8, 8);
        let request = ConversionRequest::new(data, TargetFormat::Original)
            .with_declared_mime("image/png");
        let out = ImageProcessor::new().try_process(&request).await.unwrap();
        assert_eq!(sniff(&out), MimeType::Jpeg);
    }

    #[tokio::test]
    async fn test_avif_input_is_unsupported() {
        let mut data = vec![0, 0, 0, 0x1C];
        data.extend_from_slice(b"ftypavif");
        data.extend_from_slice(&[0; 16]);
        assert_eq!(sniff(&data), MimeType::Avif);

        let request = ConversionRequest::new(data.clone(), TargetFormat::Jpeg);
        assert!(ImageProcessor::new().try_process(&request).await.is_err());
        assert_eq!(ImageProcessor::new().process_image(&request).await, data);
    }
}

mod quality_boundary_tests {
    use super::*;

    #[tokio::test]
    async fn test_quality_extremes_produce_valid_output() {
        let jpeg = create_valid_jpeg(32, 32);
        for quality in [0.0, 0.01, 0.5, 1.0, 7.5, -3.0, f32::NAN] {
            let request =
                ConversionRequest::new(jpeg.clone(), TargetFormat::Webp).with_quality(quality);
            let out = ImageProcessor::new().try_process(&request).await.unwrap();
            assert!(image::load_from_memory(&out).is_ok(), "quality {quality}");
        }
    }

    #[tokio::test]
    async fn test_color_depth_extremes() {
        let png = {
            let mut buf = Vec::new();
            create_test_image(16, 16)
                .write_to(&mut std::io::Cursor::new(&mut buf), image::ImageFormat::Png)
                .unwrap();
            buf
        };
        for depth in [0.0, 0.1, 0.5, 1.0, 2.0] {
            let request =
                ConversionRequest::new(png.clone(), TargetFormat::Png).with_color_depth(depth);
            let out = ImageProcessor::new().try_process(&request).await.unwrap();
            assert_eq!(sniff(&out), MimeType::Png, "depth {depth}");
        }
    }
}

mod zero_dimension_tests {
    use super::*;

    #[test]
    fn test_zero_targets_keep_source_dimensions() {
        let source = Dimensions::new(640, 480);
        for spec in [
            ResizeSpec::fit(0, 100),
            ResizeSpec::fill(100, 0),
            ResizeSpec::longest_edge(0),
            ResizeSpec::width(0),
            ResizeSpec::height(0),
        ] {
            assert_eq!(plan_dimensions(640, 480, &spec), source, "{spec:?}");
        }
    }

    #[test]
    fn test_zero_source_is_left_alone() {
        assert_eq!(
            plan_dimensions(0, 0, &ResizeSpec::width(100)),
            Dimensions::new(0, 0)
        );
    }
}

mod extreme_aspect_ratio_tests {
    use super::*;

    #[test]
    fn test_sides_never_round_to_zero() {
        let dims = plan_dimensions(10_000, 1, &ResizeSpec::width(100));
        assert_eq!(dims, Dimensions::new(100, 1));

        let dims = plan_dimensions(1, 10_000, &ResizeSpec::longest_edge(50));
        assert_eq!(dims, Dimensions::new(1, 50));
    }

    #[tokio::test]
    async fn test_thin_strip_fill() {
        let jpeg = create_valid_jpeg(400, 2);
        let request = ConversionRequest::new(jpeg, TargetFormat::Png)
            .with_resize(ResizeSpec::fill(10, 10));
        let out = ImageProcessor::new().try_process(&request).await.unwrap();
        assert_eq!(image::load_from_memory(&out).unwrap().dimensions(), (10, 10));
    }
}
