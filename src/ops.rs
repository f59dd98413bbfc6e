// src/ops.rs
//
// Conversion request model.
// A request is built once by the caller and passed by reference through every
// stage of the pipeline. Nothing here is mutated after construction.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// How the output dimensions are derived from the source dimensions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ResizeMode {
    /// Keep source dimensions
    #[default]
    None,
    /// Fit inside width x height, preserving aspect ratio
    Fit,
    /// Exactly width x height; the source is centre-cropped to the target aspect
    Fill,
    /// The longer source side becomes `edge`
    LongestEdge,
    /// The shorter source side becomes `edge`
    ShortestEdge,
    /// Fix the width, derive the height
    Width,
    /// Fix the height, derive the width
    Height,
}

/// Policy applied after planning.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EnlargeReduce {
    /// Always use the planned dimensions
    #[default]
    Auto,
    /// Only ever shrink: keep the source when it already fits inside the plan
    Reduce,
    /// Only ever grow: keep the source when it already covers the plan
    Enlarge,
}

/// Requested output encoding.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TargetFormat {
    Webp,
    Jpeg,
    Png,
    /// Palette PNG through the external pngquant binary
    Pngquant,
    /// AVIF through the external ffmpeg binary (libaom-av1)
    Avif,
    /// Re-encode with the source's own format
    Original,
    /// Pass-through, optionally resized
    None,
}

impl TargetFormat {
    pub fn from_str(format: &str) -> Result<Self, String> {
        match format.to_lowercase().as_str() {
            "webp" => Ok(Self::Webp),
            "jpeg" | "jpg" => Ok(Self::Jpeg),
            "png" => Ok(Self::Png),
            "pngquant" => Ok(Self::Pngquant),
            "avif" => Ok(Self::Avif),
            "original" => Ok(Self::Original),
            "none" => Ok(Self::None),
            other => Err(format!("Unsupported target format: {other}")),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Webp => "webp",
            Self::Jpeg => "jpeg",
            Self::Png => "png",
            Self::Pngquant => "pngquant",
            Self::Avif => "avif",
            Self::Original => "original",
            Self::None => "none",
        }
    }

    /// Targets produced by an external executable rather than the raster stage.
    pub fn needs_external_tool(&self) -> bool {
        matches!(self, Self::Pngquant | Self::Avif)
    }
}

/// Resize parameters as the caller supplied them.
///
/// `edge` is shared by `LongestEdge` and `ShortestEdge`. A zero value for a
/// parameter the mode needs means "do not resize".
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ResizeSpec {
    pub mode: ResizeMode,
    pub width: u32,
    pub height: u32,
    pub edge: u32,
    pub policy: EnlargeReduce,
}

impl ResizeSpec {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn fit(width: u32, height: u32) -> Self {
        Self {
            mode: ResizeMode::Fit,
            width,
            height,
            ..Self::default()
        }
    }

    pub fn fill(width: u32, height: u32) -> Self {
        Self {
            mode: ResizeMode::Fill,
            width,
            height,
            ..Self::default()
        }
    }

    pub fn longest_edge(edge: u32) -> Self {
        Self {
            mode: ResizeMode::LongestEdge,
            edge,
            ..Self::default()
        }
    }

    pub fn shortest_edge(edge: u32) -> Self {
        Self {
            mode: ResizeMode::ShortestEdge,
            edge,
            ..Self::default()
        }
    }

    pub fn width(width: u32) -> Self {
        Self {
            mode: ResizeMode::Width,
            width,
            ..Self::default()
        }
    }

    pub fn height(height: u32) -> Self {
        Self {
            mode: ResizeMode::Height,
            height,
            ..Self::default()
        }
    }

    pub fn with_policy(mut self, policy: EnlargeReduce) -> Self {
        self.policy = policy;
        self
    }

    /// True when this spec can never change the source dimensions.
    pub fn is_identity(&self) -> bool {
        match self.mode {
            ResizeMode::None => true,
            ResizeMode::Fit | ResizeMode::Fill => self.width == 0 || self.height == 0,
            ResizeMode::LongestEdge | ResizeMode::ShortestEdge => self.edge == 0,
            ResizeMode::Width => self.width == 0,
            ResizeMode::Height => self.height == 0,
        }
    }
}

pub const DEFAULT_AVIF_CRF: u8 = 23;
pub const DEFAULT_AVIF_PRESET: &str = "medium";
pub const DEFAULT_PNGQUANT_QUALITY: &str = "65-80";
pub const DEFAULT_FFMPEG_TIMEOUT: Duration = Duration::from_secs(10);

/// External tool configuration. Paths are owned by the host's settings;
/// `None` means the tool is not configured and will never be spawned.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolSettings {
    pub ffmpeg_path: Option<PathBuf>,
    pub avif_crf: u8,
    pub avif_preset: String,
    pub ffmpeg_timeout: Duration,
    pub pngquant_path: Option<PathBuf>,
    /// `<lo>-<hi>`, passed verbatim to `pngquant --quality`
    pub pngquant_quality: String,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            ffmpeg_path: None,
            avif_crf: DEFAULT_AVIF_CRF,
            avif_preset: DEFAULT_AVIF_PRESET.to_string(),
            ffmpeg_timeout: DEFAULT_FFMPEG_TIMEOUT,
            pngquant_path: None,
            pngquant_quality: DEFAULT_PNGQUANT_QUALITY.to_string(),
        }
    }
}

impl ToolSettings {
    /// Defaults overlaid with `IMAGE_CONVERTER_*` environment variables.
    /// Unparseable values are logged and ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut settings = Self::default();

        if let Some(path) = lookup("IMAGE_CONVERTER_FFMPEG_PATH").filter(|p| !p.trim().is_empty())
        {
            settings.ffmpeg_path = Some(PathBuf::from(path));
        }
        if let Some(path) =
            lookup("IMAGE_CONVERTER_PNGQUANT_PATH").filter(|p| !p.trim().is_empty())
        {
            settings.pngquant_path = Some(PathBuf::from(path));
        }
        if let Some(raw) = lookup("IMAGE_CONVERTER_AVIF_CRF") {
            match raw.trim().parse::<u8>() {
                Ok(crf) if crf <= 63 => settings.avif_crf = crf,
                _ => tracing::warn!(value = %raw, "ignoring invalid IMAGE_CONVERTER_AVIF_CRF"),
            }
        }
        if let Some(preset) = lookup("IMAGE_CONVERTER_AVIF_PRESET") {
            let preset = preset.trim();
            if !preset.is_empty() {
                settings.avif_preset = preset.to_string();
            }
        }
        if let Some(range) = lookup("IMAGE_CONVERTER_PNGQUANT_QUALITY") {
            if is_quality_range(range.trim()) {
                settings.pngquant_quality = range.trim().to_string();
            } else {
                tracing::warn!(value = %range, "ignoring invalid IMAGE_CONVERTER_PNGQUANT_QUALITY");
            }
        }

        settings
    }

    pub fn with_ffmpeg(mut self, path: impl Into<PathBuf>) -> Self {
        self.ffmpeg_path = Some(path.into());
        self
    }

    pub fn with_pngquant(mut self, path: impl Into<PathBuf>) -> Self {
        self.pngquant_path = Some(path.into());
        self
    }
}

/// `lo-hi` with 0 <= lo <= hi <= 100
fn is_quality_range(range: &str) -> bool {
    let Some((lo, hi)) = range.split_once('-') else {
        return false;
    };
    match (lo.parse::<u8>(), hi.parse::<u8>()) {
        (Ok(lo), Ok(hi)) => lo <= hi && hi <= 100,
        _ => false,
    }
}

/// One conversion call. Immutable once built.
#[derive(Clone, Debug)]
pub struct ConversionRequest {
    pub source: Arc<Vec<u8>>,
    pub target: TargetFormat,
    /// 0.0 - 1.0
    pub quality: f32,
    /// 0.0 - 1.0, PNG only; 1.0 keeps full depth
    pub color_depth: f32,
    pub resize: ResizeSpec,
    /// When false, an output larger than the source is replaced by the source
    pub allow_larger_files: bool,
    pub tools: ToolSettings,
    /// Used only in notices
    pub file_name: Option<String>,
    /// Fallback when the header matches no known signature
    pub declared_mime: Option<String>,
}

impl ConversionRequest {
    pub fn new(source: impl Into<Arc<Vec<u8>>>, target: TargetFormat) -> Self {
        Self {
            source: source.into(),
            target,
            quality: 1.0,
            color_depth: 1.0,
            resize: ResizeSpec::none(),
            allow_larger_files: true,
            tools: ToolSettings::default(),
            file_name: None,
            declared_mime: None,
        }
    }

    pub fn with_target(mut self, target: TargetFormat) -> Self {
        self.target = target;
        self
    }

    pub fn with_quality(mut self, quality: f32) -> Self {
        self.quality = quality;
        self
    }

    pub fn with_color_depth(mut self, color_depth: f32) -> Self {
        self.color_depth = color_depth;
        self
    }

    pub fn with_resize(mut self, resize: ResizeSpec) -> Self {
        self.resize = resize;
        self
    }

    pub fn with_allow_larger_files(mut self, allow: bool) -> Self {
        self.allow_larger_files = allow;
        self
    }

    pub fn with_tools(mut self, tools: ToolSettings) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = Some(name.into());
        self
    }

    pub fn with_declared_mime(mut self, mime: impl Into<String>) -> Self {
        self.declared_mime = Some(mime.into());
        self
    }

    /// Quality on the 0-100 scale the codecs use.
    pub fn quality_percent(&self) -> u8 {
        if !self.quality.is_finite() {
            return 100;
        }
        (self.quality.clamp(0.0, 1.0) * 100.0).round() as u8
    }

    /// True for a quality of 1.0 (or above).
    pub fn is_max_quality(&self) -> bool {
        self.quality_percent() >= 100
    }

    /// Color depth clamped to 0.0 - 1.0; non-finite values mean full depth.
    pub fn effective_color_depth(&self) -> f32 {
        if self.color_depth.is_finite() {
            self.color_depth.clamp(0.0, 1.0)
        } else {
            1.0
        }
    }
}
