// src/engine/canvas.rs
//
// Raster encode stage: decode -> orient -> plan -> crop/scale -> (PNG depth
// reduction) -> race the encoders -> keep the smallest valid candidate.

use crate::engine::common::EngineResult;
use crate::engine::decoder::decode_oriented;
use crate::engine::encoder::{
    encode_jpeg_native, encode_jpeg_portable, encode_png_native, encode_png_portable,
    encode_webp_native, encode_webp_portable,
};
use crate::engine::metadata::extract_icc_profile;
use crate::engine::pipeline::{reduce_color_depth, resize_to_plan};
use crate::engine::planner::{plan, ResizePlan};
use crate::engine::sniff::{sniff, MimeType};
use crate::error::ConvertError;
use crate::ops::{ConversionRequest, ResizeSpec};
use image::DynamicImage;

/// Which encoder produced a candidate. Declaration order is the tie-break order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Native,
    Portable,
    /// Same raster through the source format's encoder (or the source bytes verbatim)
    SourceFormat,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodingCandidate {
    pub strategy: Strategy,
    pub bytes: Vec<u8>,
}

impl EncodingCandidate {
    pub fn new(strategy: Strategy, bytes: Vec<u8>) -> Self {
        Self { strategy, bytes }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Smallest non-empty candidate; on equal size the earliest one wins.
pub fn select_smallest<I>(candidates: I) -> Option<EncodingCandidate>
where
    I: IntoIterator<Item = EncodingCandidate>,
{
    candidates
        .into_iter()
        .filter(|c| !c.is_empty())
        .min_by_key(EncodingCandidate::len)
}

/// Decoded, oriented, cropped and scaled pixels ready for an encoder.
pub struct PreparedRaster {
    pub image: DynamicImage,
    pub plan: ResizePlan,
    pub source_mime: MimeType,
    /// An EXIF orientation other than 1 was applied
    pub reoriented: bool,
}

impl PreparedRaster {
    /// True when the pixels are exactly what the source bytes decode to.
    pub fn is_untouched(&self) -> bool {
        self.plan.is_identity() && !self.reoriented
    }
}

/// Decode `bytes` and bring the raster to the planned output geometry.
pub fn prepare_raster(bytes: &[u8], resize: &ResizeSpec) -> EngineResult<PreparedRaster> {
    let source_mime = sniff(bytes);
    if !source_mime.is_raster_decodable() {
        return Err(ConvertError::unsupported_format(source_mime.as_str()));
    }

    let image = decode_oriented(bytes)?;
    let reoriented = crate::engine::metadata::orientation(bytes).is_some_and(|o| o != 1);
    let plan = plan(image.width(), image.height(), resize);
    let image = resize_to_plan(image, &plan)?;

    tracing::debug!(
        format = source_mime.as_str(),
        width = plan.output.width,
        height = plan.output.height,
        cropped = plan.crop.is_some(),
        "raster prepared"
    );

    Ok(PreparedRaster {
        image,
        plan,
        source_mime,
        reoriented,
    })
}

/// One raster encode. Built from a request; `bytes` may be an adapter
/// intermediate rather than the request's source.
#[derive(Debug, Clone, Copy)]
pub struct CanvasJob<'a> {
    pub bytes: &'a [u8],
    pub target: MimeType,
    /// 0-100
    pub quality: u8,
    pub color_depth: f32,
    pub resize: &'a ResizeSpec,
    /// Quality is at its maximum: the source bytes may stand in for a re-encode
    pub max_quality: bool,
}

impl<'a> CanvasJob<'a> {
    pub fn new(bytes: &'a [u8], target: MimeType, request: &'a ConversionRequest) -> Self {
        Self {
            bytes,
            target,
            quality: request.quality_percent(),
            color_depth: request.effective_color_depth(),
            resize: &request.resize,
            max_quality: request.is_max_quality(),
        }
    }

    /// Keep full colour depth (for outputs that do their own palette work).
    pub fn full_depth(mut self) -> Self {
        self.color_depth = 1.0;
        self
    }
}

/// Run a canvas job and return the winning candidate.
pub fn encode(job: &CanvasJob<'_>) -> EngineResult<EncodingCandidate> {
    if !job.target.is_raster_encodable() {
        return Err(ConvertError::unsupported_format(job.target.as_str()));
    }

    let icc = extract_icc_profile(job.bytes);
    let prepared = prepare_raster(job.bytes, job.resize)?;

    let image = if job.target == MimeType::Png && job.color_depth < 1.0 {
        reduce_color_depth(prepared.image, job.color_depth)
    } else {
        prepared.image
    };
    let raster = PreparedRaster { image, ..prepared };

    encode_prepared(job, &raster, icc.as_deref())
}

/// Race the candidates for an already prepared raster.
pub fn encode_prepared(
    job: &CanvasJob<'_>,
    raster: &PreparedRaster,
    icc: Option<&[u8]>,
) -> EngineResult<EncodingCandidate> {
    let target = job.target;
    let quality = job.quality;
    let image = &raster.image;

    let (native, (portable, source_format)) = rayon::join(
        || encode_with(Strategy::Native, target, image, quality, icc),
        || {
            rayon::join(
                || encode_with(Strategy::Portable, target, image, quality, icc),
                || source_format_candidate(job, raster, icc),
            )
        },
    );

    let candidates = [native, portable]
        .into_iter()
        .chain(source_format)
        .filter_map(|result| match result {
            Ok(candidate) => {
                tracing::debug!(
                    strategy = ?candidate.strategy,
                    bytes = candidate.len(),
                    "candidate encoded"
                );
                Some(candidate)
            }
            Err(err) => {
                tracing::warn!(format = target.as_str(), error = %err, "candidate failed");
                None
            }
        });

    select_smallest(candidates).ok_or_else(|| ConvertError::no_valid_candidate(target.as_str()))
}

fn encode_with(
    strategy: Strategy,
    format: MimeType,
    image: &DynamicImage,
    quality: u8,
    icc: Option<&[u8]>,
) -> EngineResult<EncodingCandidate> {
    let bytes = match (format, strategy) {
        (MimeType::Jpeg, Strategy::Portable) => encode_jpeg_portable(image, quality, icc)?,
        (MimeType::Jpeg, _) => encode_jpeg_native(image, quality, icc)?,
        (MimeType::Webp, Strategy::Portable) => encode_webp_portable(image, quality, icc)?,
        (MimeType::Webp, _) => encode_webp_native(image, quality, icc)?,
        (MimeType::Png, Strategy::Portable) => encode_png_portable(image, icc)?,
        (MimeType::Png, _) => encode_png_native(image, quality, icc)?,
        (other, _) => return Err(ConvertError::unsupported_format(other.as_str())),
    };
    Ok(EncodingCandidate::new(strategy, bytes))
}

/// Third candidate for lossy targets: the raster re-encoded in the source
/// format. At maximum quality with nothing to resize or rotate it is the
/// source itself.
fn source_format_candidate(
    job: &CanvasJob<'_>,
    raster: &PreparedRaster,
    icc: Option<&[u8]>,
) -> Option<EngineResult<EncodingCandidate>> {
    if !matches!(job.target, MimeType::Jpeg | MimeType::Webp) {
        return None;
    }
    let source = raster.source_mime;
    if source == job.target || !source.is_raster_encodable() {
        return None;
    }

    if job.max_quality && raster.is_untouched() {
        return Some(Ok(EncodingCandidate::new(
            Strategy::SourceFormat,
            job.bytes.to_vec(),
        )));
    }

    Some(
        encode_with(Strategy::Native, source, &raster.image, job.quality, icc).map(|c| {
            EncodingCandidate::new(Strategy::SourceFormat, c.bytes)
        }),
    )
}
