// src/engine/api.rs
//
// ImageProcessor: the public entry point. Owns only shared collaborators;
// every request is an immutable value threaded through the stages.
//
// process_image() never fails. Any error is reported through the Notifier
// and the caller gets the original bytes back.

use crate::codecs::{ffmpeg, pngquant};
use crate::engine::canvas::{self, CanvasJob};
use crate::engine::common::{run_with_panic_policy, EngineResult};
use crate::engine::decoder::{
    check_dimensions, decode_oriented, encode_png_intermediate, InputKind,
};
use crate::engine::metadata;
use crate::engine::pipeline::{has_transparency, resize_to_plan};
use crate::engine::planner::{self, scale_filter};
use crate::engine::sniff::{sniff, sniff_with_declared, MimeType};
use crate::error::{ConvertError, Result, Tool};
use crate::ops::{ConversionRequest, ResizeSpec, TargetFormat};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

/// Input formats the host accepts, plus how it identifies them.
pub trait SupportedFormats: Send + Sync {
    /// `mime` wins when present; otherwise the file name's extension decides.
    fn is_supported(&self, mime: Option<&str>, file_name: Option<&str>) -> bool;

    fn sniff_mime(&self, bytes: &[u8], declared: Option<&str>) -> MimeType;
}

/// JPEG, PNG, WebP, GIF, BMP, TIFF, HEIC and HEIF.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultSupportedFormats;

impl DefaultSupportedFormats {
    pub const SUPPORTED: [MimeType; 8] = [
        MimeType::Jpeg,
        MimeType::Png,
        MimeType::Webp,
        MimeType::Gif,
        MimeType::Bmp,
        MimeType::Tiff,
        MimeType::Heic,
        MimeType::Heif,
    ];
}

impl SupportedFormats for DefaultSupportedFormats {
    fn is_supported(&self, mime: Option<&str>, file_name: Option<&str>) -> bool {
        let resolved = match mime {
            Some(mime) => MimeType::from_mime_str(mime),
            None => file_name
                .and_then(|name| Path::new(name).extension())
                .and_then(|ext| ext.to_str())
                .and_then(MimeType::from_extension),
        };
        resolved.is_some_and(|mime| Self::SUPPORTED.contains(&mime))
    }

    fn sniff_mime(&self, bytes: &[u8], declared: Option<&str>) -> MimeType {
        sniff_with_declared(bytes, declared)
    }
}

/// Advisory message for the user when a conversion fell back to the original.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub file_name: Option<String>,
    pub target: TargetFormat,
    pub reason: String,
}

impl std::fmt::Display for Notice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} was kept unchanged ({} conversion failed): {}",
            self.file_name.as_deref().unwrap_or("image"),
            self.target.as_str(),
            self.reason
        )
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notice: &Notice);
}

/// Writes notices to the `tracing` log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notice: &Notice) {
        tracing::warn!(
            file = notice.file_name.as_deref().unwrap_or(""),
            target_format = notice.target.as_str(),
            reason = %notice.reason,
            "image conversion skipped"
        );
    }
}

/// Keeps every notice in memory. Useful for hosts that batch messages.
#[derive(Debug, Default)]
pub struct CollectingNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl CollectingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().clone()
    }

    pub fn take(&self) -> Vec<Notice> {
        std::mem::take(&mut *self.notices.lock())
    }
}

impl Notifier for CollectingNotifier {
    fn notify(&self, notice: &Notice) {
        self.notices.lock().push(notice.clone());
    }
}

/// Converts image bytes according to a [`ConversionRequest`].
///
/// Cheap to clone; clones share the collaborators. Must be driven from a
/// tokio runtime since raster work runs on the blocking pool.
#[derive(Clone)]
pub struct ImageProcessor {
    formats: Arc<dyn SupportedFormats>,
    notifier: Arc<dyn Notifier>,
}

impl Default for ImageProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ImageProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageProcessor").finish_non_exhaustive()
    }
}

impl ImageProcessor {
    pub fn new() -> Self {
        Self {
            formats: Arc::new(DefaultSupportedFormats),
            notifier: Arc::new(LogNotifier),
        }
    }

    pub fn with_formats(mut self, formats: Arc<dyn SupportedFormats>) -> Self {
        self.formats = formats;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Convert, falling back to the original bytes on any failure.
    pub async fn process_image(&self, request: &ConversionRequest) -> Vec<u8> {
        match self.try_process(request).await {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::warn!(
                    target_format = request.target.as_str(),
                    kind = ?err.kind(),
                    error = %err,
                    "conversion failed, returning original bytes"
                );
                self.notifier.notify(&Notice {
                    file_name: request.file_name.clone(),
                    target: request.target,
                    reason: err.to_string(),
                });
                request.source.to_vec()
            }
        }
    }

    /// Same pipeline as [`process_image`](Self::process_image) with errors surfaced.
    pub async fn try_process(&self, request: &ConversionRequest) -> Result<Vec<u8>> {
        let start = Instant::now();
        let source = &request.source;
        if source.is_empty() {
            return Ok(Vec::new());
        }

        // NONE: pass through, or resize-only at full quality in the source format
        let rerouted;
        let request = match request.target {
            TargetFormat::None if request.resize.is_identity() => {
                tracing::debug!("no conversion requested");
                return Ok(source.to_vec());
            }
            TargetFormat::None => {
                rerouted = request
                    .clone()
                    .with_quality(1.0)
                    .with_target(TargetFormat::Original);
                &rerouted
            }
            _ => request,
        };

        let mime = self
            .formats
            .sniff_mime(source, request.declared_mime.as_deref());
        if mime == MimeType::Unknown {
            return Err(ConvertError::unknown_format(
                request.declared_mime.as_deref(),
            ));
        }
        if !self
            .formats
            .is_supported(Some(mime.as_str()), request.file_name.as_deref())
        {
            return Err(ConvertError::unsupported_format(mime.as_str()));
        }

        let target = match request.target {
            TargetFormat::Original => match original_target(mime) {
                Some(target) => target,
                None if request.resize.is_identity() => {
                    tracing::debug!(format = mime.as_str(), "source format is not re-encodable");
                    return Ok(source.to_vec());
                }
                // Resized pixels still have to be written somewhere lossless
                None => {
                    tracing::debug!(format = mime.as_str(), "resizing into PNG");
                    TargetFormat::Png
                }
            },
            target => target,
        };

        ensure_tool_configured(target, request)?;

        let kind = InputKind::from_mime(mime);
        let working: Arc<Vec<u8>> = if kind == InputKind::Standard {
            Arc::clone(source)
        } else {
            let bytes = Arc::clone(source);
            let intermediate =
                blocking("adapter", move || kind.to_intermediate(&bytes, target)).await?;
            match intermediate {
                Some(bytes) => Arc::new(bytes),
                None => Arc::clone(source),
            }
        };

        let output = match target {
            TargetFormat::Webp | TargetFormat::Jpeg | TargetFormat::Png => {
                let job_request = request.clone();
                let bytes = Arc::clone(&working);
                let mime = raster_mime(target);
                blocking("canvas", move || {
                    canvas::encode(&CanvasJob::new(&bytes, mime, &job_request)).map(|c| c.bytes)
                })
                .await?
            }
            TargetFormat::Pngquant => {
                let png = if is_untouched_png(&working, &request.resize) {
                    working.to_vec()
                } else {
                    let job_request = request.clone();
                    let bytes = Arc::clone(&working);
                    blocking("canvas", move || {
                        let job = CanvasJob::new(&bytes, MimeType::Png, &job_request).full_depth();
                        canvas::encode(&job).map(|c| c.bytes)
                    })
                    .await?
                };
                pngquant::quantize(png, &request.tools).await?
            }
            TargetFormat::Avif => {
                let bytes = Arc::clone(&working);
                let resize = request.resize;
                let input = blocking("avif-input", move || avif_input(&bytes, &resize)).await?;
                ffmpeg::encode_avif(input, &request.tools).await?
            }
            TargetFormat::Original | TargetFormat::None => {
                return Err(ConvertError::unsupported_format(target.as_str()));
            }
        };

        let output = if sniff(&output) == MimeType::Jpeg {
            let original = Arc::clone(source);
            let encoded = output.clone();
            match blocking("metadata", move || metadata::preserve(&original, encoded)).await {
                Ok(with_exif) => with_exif,
                Err(err) => {
                    tracing::warn!(error = %err, "could not carry EXIF into output");
                    output
                }
            }
        } else {
            output
        };

        if !request.allow_larger_files && output.len() > source.len() {
            tracing::info!(
                input_bytes = source.len(),
                output_bytes = output.len(),
                "output larger than source, keeping source"
            );
            return Ok(source.to_vec());
        }

        tracing::info!(
            source_format = mime.as_str(),
            target_format = target.as_str(),
            input_bytes = source.len(),
            output_bytes = output.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "image converted"
        );
        Ok(output)
    }
}

/// ORIGINAL means "same format as the source"; only encodable sources qualify.
/// The caller falls back to PNG when a resize is requested for any other source.
fn original_target(mime: MimeType) -> Option<TargetFormat> {
    match mime {
        MimeType::Jpeg => Some(TargetFormat::Jpeg),
        MimeType::Png => Some(TargetFormat::Png),
        MimeType::Webp => Some(TargetFormat::Webp),
        _ => None,
    }
}

fn raster_mime(target: TargetFormat) -> MimeType {
    match target {
        TargetFormat::Jpeg => MimeType::Jpeg,
        TargetFormat::Webp => MimeType::Webp,
        _ => MimeType::Png,
    }
}

fn ensure_tool_configured(target: TargetFormat, request: &ConversionRequest) -> Result<()> {
    if !target.needs_external_tool() {
        return Ok(());
    }
    let missing = match target {
        TargetFormat::Avif if request.tools.ffmpeg_path.is_none() => Some(Tool::Ffmpeg),
        TargetFormat::Pngquant if request.tools.pngquant_path.is_none() => Some(Tool::Pngquant),
        _ => None,
    };
    match missing {
        Some(tool) => Err(ConvertError::tool_not_configured(tool)),
        None => Ok(()),
    }
}

fn is_untouched_png(bytes: &[u8], resize: &ResizeSpec) -> bool {
    sniff(bytes) == MimeType::Png
        && resize.is_identity()
        && metadata::orientation(bytes).map_or(true, |o| o == 1)
}

/// Pick what FFmpeg reads. JPEG/PNG sources that need no reorientation and no
/// crop go in as-is with a scale filter; anything else is rendered to PNG.
fn avif_input(bytes: &[u8], resize: &ResizeSpec) -> EngineResult<ffmpeg::AvifInput> {
    let source_mime = sniff(bytes);
    if !source_mime.is_raster_decodable() {
        return Err(ConvertError::unsupported_format(source_mime.as_str()));
    }

    let image = decode_oriented(bytes)?;
    let reoriented = metadata::orientation(bytes).is_some_and(|o| o != 1);
    let plan = planner::plan(image.width(), image.height(), resize);
    check_dimensions(plan.output.width, plan.output.height)?;

    if matches!(source_mime, MimeType::Jpeg | MimeType::Png) && !reoriented && plan.crop.is_none()
    {
        return Ok(ffmpeg::AvifInput {
            has_alpha: has_transparency(&image),
            bytes: bytes.to_vec(),
            scale: scale_filter(plan.source, plan.output),
        });
    }

    let image = resize_to_plan(image, &plan)?;
    Ok(ffmpeg::AvifInput {
        has_alpha: has_transparency(&image),
        bytes: encode_png_intermediate(&image)?,
        scale: None,
    })
}

/// Run CPU-bound work on the blocking pool. Panics become `InternalPanic`.
async fn blocking<T, F>(stage: &'static str, f: F) -> EngineResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> EngineResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(move || run_with_panic_policy(stage, f))
        .await
        .map_err(|e| ConvertError::internal_panic(format!("{stage}: task failed: {e}")))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::metadata::test_support::{
        jpeg_with_exif, noisy_jpeg, plain_jpeg, tag_orientation,
    };
    use image::{DynamicImage, RgbaImage};
    use std::io::Cursor;

    fn create_test_png(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_fn(width, height, |x, y| {
            image::Rgba([(x % 256) as u8, (y % 256) as u8, 128, 255])
        }));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    /// BMP has no encoder here, so no source-format candidate competes.
    fn create_test_bmp(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(image::RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x * 5 % 256) as u8, (y * 11 % 256) as u8, 60])
        }));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Bmp)
            .unwrap();
        buf
    }

    fn processor_with_notices() -> (ImageProcessor, Arc<CollectingNotifier>) {
        let notices = Arc::new(CollectingNotifier::new());
        let processor = ImageProcessor::new().with_notifier(notices.clone());
        (processor, notices)
    }

    fn dimensions(bytes: &[u8]) -> (u32, u32) {
        let img = image::load_from_memory(bytes).unwrap();
        (img.width(), img.height())
    }

    mod supported_formats_tests {
        use super::*;

        #[test]
        fn test_mime_decides_when_present() {
            let formats = DefaultSupportedFormats;
            assert!(formats.is_supported(Some("image/jpeg"), Some("x.txt")));
            assert!(formats.is_supported(Some("image/tiff"), None));
            assert!(!formats.is_supported(Some("image/avif"), Some("x.png")));
        }

        #[test]
        fn test_extension_is_the_fallback() {
            let formats = DefaultSupportedFormats;
            assert!(formats.is_supported(None, Some("photo.HEIC")));
            assert!(!formats.is_supported(None, Some("notes.md")));
            assert!(!formats.is_supported(None, Some("no-extension")));
            assert!(!formats.is_supported(None, None));
        }
    }

    mod notice_tests {
        use super::*;

        #[test]
        fn test_display_names_file_and_target() {
            let notice = Notice {
                file_name: Some("cat.png".into()),
                target: TargetFormat::Avif,
                reason: "ffmpeg is not configured".into(),
            };
            let text = notice.to_string();
            assert!(text.contains("cat.png"));
            assert!(text.contains("avif"));
        }

        #[test]
        fn test_collecting_notifier_take_drains() {
            let notifier = CollectingNotifier::new();
            notifier.notify(&Notice {
                file_name: None,
                target: TargetFormat::Png,
                reason: "x".into(),
            });
            assert_eq!(notifier.notices().len(), 1);
            assert_eq!(notifier.take().len(), 1);
            assert!(notifier.notices().is_empty());
        }
    }

    mod dispatch_tests {
        use super::*;

        #[tokio::test]
        async fn test_empty_input_returns_empty() {
            let (processor, notices) = processor_with_notices();
            let request = ConversionRequest::new(Vec::new(), TargetFormat::Webp);
            assert!(processor.process_image(&request).await.is_empty());
            assert!(notices.notices().is_empty());
        }

        #[tokio::test]
        async fn test_none_without_resize_is_passthrough() {
            let png = create_test_png(10, 10);
            let request = ConversionRequest::new(png.clone(), TargetFormat::None);
            assert_eq!(ImageProcessor::new().process_image(&request).await, png);
        }

        #[tokio::test]
        async fn test_none_with_resize_keeps_format() {
            let png = create_test_png(100, 50);
            let request = ConversionRequest::new(png, TargetFormat::None)
                .with_quality(0.2)
                .with_resize(ResizeSpec::width(50));
            let out = ImageProcessor::new().process_image(&request).await;
            assert_eq!(sniff(&out), MimeType::Png);
            assert_eq!(dimensions(&out), (50, 25));
        }

        #[tokio::test]
        async fn test_webp_target() {
            let request = ConversionRequest::new(create_test_bmp(64, 32), TargetFormat::Webp)
                .with_quality(0.8);
            let out = ImageProcessor::new().try_process(&request).await.unwrap();
            assert_eq!(&out[0..4], b"RIFF");
            assert_eq!(&out[8..12], b"WEBP");
        }

        #[tokio::test]
        async fn test_jpeg_target_with_fit() {
            let request = ConversionRequest::new(create_test_bmp(400, 200), TargetFormat::Jpeg)
                .with_quality(0.7)
                .with_resize(ResizeSpec::fit(100, 100));
            let out = ImageProcessor::new().try_process(&request).await.unwrap();
            assert_eq!(&out[0..2], &[0xFF, 0xD8]);
            assert_eq!(dimensions(&out), (100, 50));
        }

        #[tokio::test]
        async fn test_original_resolves_to_source_format() {
            let jpeg = plain_jpeg(40, 20);
            let request = ConversionRequest::new(jpeg, TargetFormat::Original).with_quality(0.5);
            let out = ImageProcessor::new().try_process(&request).await.unwrap();
            assert_eq!(sniff(&out), MimeType::Jpeg);
        }

        #[tokio::test]
        async fn test_original_with_non_encodable_source_returns_source() {
            let img = DynamicImage::ImageRgb8(image::RgbImage::new(8, 8));
            let mut gif = Vec::new();
            img.write_to(&mut Cursor::new(&mut gif), image::ImageFormat::Gif)
                .unwrap();
            let request = ConversionRequest::new(gif.clone(), TargetFormat::Original);
            assert_eq!(
                ImageProcessor::new().try_process(&request).await.unwrap(),
                gif
            );
        }

        #[tokio::test]
        async fn test_resize_without_target_writes_png_for_non_encodable_sources() {
            let img = DynamicImage::ImageRgb8(image::RgbImage::from_fn(200, 100, |x, y| {
                image::Rgb([(x % 256) as u8, (y * 2 % 256) as u8, 40])
            }));
            for format in [
                image::ImageFormat::Bmp,
                image::ImageFormat::Gif,
                image::ImageFormat::Tiff,
            ] {
                let mut source = Vec::new();
                img.write_to(&mut Cursor::new(&mut source), format).unwrap();
                for target in [TargetFormat::None, TargetFormat::Original] {
                    let (processor, notices) = processor_with_notices();
                    let request = ConversionRequest::new(source.clone(), target)
                        .with_resize(ResizeSpec::width(50));
                    let out = processor.process_image(&request).await;

                    assert_eq!(sniff(&out), MimeType::Png, "{format:?} {target:?}");
                    assert_eq!(dimensions(&out), (50, 25), "{format:?} {target:?}");
                    assert!(notices.notices().is_empty());
                }
            }
        }

        #[tokio::test]
        async fn test_rotated_jpeg_at_max_quality_stays_upright() {
            // 96x48 stored, orientation 6 -> upright 48x96
            let jpeg = tag_orientation(noisy_jpeg(96, 48, 10), 6);
            let request = ConversionRequest::new(jpeg.clone(), TargetFormat::Webp)
                .with_quality(1.0);
            let out = ImageProcessor::new().try_process(&request).await.unwrap();

            assert_ne!(out, jpeg);
            assert_eq!(dimensions(&out), (48, 96));
            assert_eq!(metadata::orientation(&out), None);
        }

        #[tokio::test]
        async fn test_jpeg_output_keeps_exif_without_orientation() {
            // 16x8 stored, orientation 6 -> upright 8x16
            let request =
                ConversionRequest::new(jpeg_with_exif(16, 8, 6), TargetFormat::Jpeg)
                    .with_quality(0.8);
            let out = ImageProcessor::new().try_process(&request).await.unwrap();
            assert_eq!(dimensions(&out), (8, 16));
            assert!(metadata::has_exif(&out));
            assert_eq!(metadata::orientation(&out), None);
        }

        #[tokio::test]
        async fn test_larger_output_falls_back_when_disallowed() {
            let jpeg = plain_jpeg(128, 128);
            let request = ConversionRequest::new(jpeg.clone(), TargetFormat::Png)
                .with_allow_larger_files(false);
            let out = ImageProcessor::new().try_process(&request).await.unwrap();
            // A lossless PNG of a photo-like JPEG is larger than the JPEG
            assert_eq!(out, jpeg);
        }
    }

    mod fallback_tests {
        use super::*;
        use crate::error::ErrorKind;

        #[tokio::test]
        async fn test_unknown_bytes_return_source_and_notify() {
            let (processor, notices) = processor_with_notices();
            let request = ConversionRequest::new(b"not an image at all".to_vec(), TargetFormat::Jpeg)
                .with_file_name("notes.bin");

            let out = processor.process_image(&request).await;

            assert_eq!(out, b"not an image at all");
            let notices = notices.notices();
            assert_eq!(notices.len(), 1);
            assert_eq!(notices[0].file_name.as_deref(), Some("notes.bin"));
            assert_eq!(notices[0].target, TargetFormat::Jpeg);
        }

        #[tokio::test]
        async fn test_missing_ffmpeg_never_spawns() {
            let png = create_test_png(8, 8);
            let request = ConversionRequest::new(png.clone(), TargetFormat::Avif);
            let err = ImageProcessor::new().try_process(&request).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::ToolNotConfigured);
            assert_eq!(err.tool(), Some(Tool::Ffmpeg));

            let (processor, notices) = processor_with_notices();
            assert_eq!(processor.process_image(&request).await, png);
            assert_eq!(notices.notices().len(), 1);
        }

        #[test]
        fn test_only_external_targets_need_tools() {
            let request = ConversionRequest::new(Vec::new(), TargetFormat::Png);
            for target in [TargetFormat::Webp, TargetFormat::Jpeg, TargetFormat::Png] {
                assert!(!target.needs_external_tool());
                assert!(ensure_tool_configured(target, &request).is_ok());
            }
            for target in [TargetFormat::Avif, TargetFormat::Pngquant] {
                assert!(target.needs_external_tool());
                assert!(ensure_tool_configured(target, &request).is_err());
            }
        }

        #[tokio::test]
        async fn test_missing_pngquant_returns_source() {
            let png = create_test_png(8, 8);
            let request = ConversionRequest::new(png.clone(), TargetFormat::Pngquant);
            let err = ImageProcessor::new().try_process(&request).await.unwrap_err();
            assert_eq!(err.tool(), Some(Tool::Pngquant));
        }

        #[tokio::test]
        async fn test_truncated_jpeg_returns_source() {
            let mut jpeg = plain_jpeg(64, 64);
            jpeg.truncate(40);
            let (processor, notices) = processor_with_notices();
            let request = ConversionRequest::new(jpeg.clone(), TargetFormat::Webp);
            assert_eq!(processor.process_image(&request).await, jpeg);
            assert_eq!(notices.notices().len(), 1);
        }

        #[tokio::test]
        async fn test_custom_formats_gate() {
            struct PngOnly;
            impl SupportedFormats for PngOnly {
                fn is_supported(&self, mime: Option<&str>, _: Option<&str>) -> bool {
                    mime == Some("image/png")
                }
                fn sniff_mime(&self, bytes: &[u8], declared: Option<&str>) -> MimeType {
                    sniff_with_declared(bytes, declared)
                }
            }

            let processor = ImageProcessor::new().with_formats(Arc::new(PngOnly));
            let request = ConversionRequest::new(plain_jpeg(8, 8), TargetFormat::Webp);
            let err = processor.try_process(&request).await.unwrap_err();
            assert!(matches!(err, ConvertError::UnsupportedFormat { .. }));
        }
    }

    mod avif_input_tests {
        use super::*;

        #[test]
        fn test_jpeg_source_goes_in_verbatim_with_scale() {
            let jpeg = plain_jpeg(400, 200);
            let input = avif_input(&jpeg, &ResizeSpec::fit(100, 100)).unwrap();
            assert_eq!(input.bytes, jpeg);
            assert!(!input.has_alpha);
            assert_eq!(input.scale.as_deref(), Some("scale=100:50"));
        }

        #[test]
        fn test_no_resize_means_no_scale() {
            let jpeg = plain_jpeg(40, 20);
            let input = avif_input(&jpeg, &ResizeSpec::none()).unwrap();
            assert_eq!(input.scale, None);
        }

        #[test]
        fn test_fill_renders_png() {
            let jpeg = plain_jpeg(400, 200);
            let input = avif_input(&jpeg, &ResizeSpec::fill(50, 50)).unwrap();
            assert_eq!(sniff(&input.bytes), MimeType::Png);
            assert_eq!(input.scale, None);
            assert_eq!(dimensions(&input.bytes), (50, 50));
        }

        #[test]
        fn test_reoriented_source_renders_png() {
            let jpeg = jpeg_with_exif(16, 8, 6);
            let input = avif_input(&jpeg, &ResizeSpec::none()).unwrap();
            assert_eq!(sniff(&input.bytes), MimeType::Png);
            assert_eq!(dimensions(&input.bytes), (8, 16));
        }

        #[test]
        fn test_alpha_is_detected() {
            let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(
                4,
                4,
                image::Rgba([10, 20, 30, 0]),
            ));
            let mut png = Vec::new();
            img.write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
                .unwrap();
            assert!(avif_input(&png, &ResizeSpec::none()).unwrap().has_alpha);
        }
    }
}
