// src/codecs/ffmpeg.rs
//
// AVIF via the FFmpeg CLI (libaom-av1). The image goes in on stdin; FFmpeg
// writes to a temp file that is read back and removed on every path.

use crate::codecs::process::run_tool;
use crate::error::{ConvertError, Result, Tool};
use crate::ops::ToolSettings;
use std::ffi::OsString;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use tempfile::TempPath;

const TEMP_PREFIX: &str = "obsidian_image_converter_";

/// What to hand FFmpeg: encoded bytes it can decode, plus how to treat them.
#[derive(Debug, Clone)]
pub struct AvifInput {
    pub bytes: Vec<u8>,
    /// Adds a second stream carrying the alpha plane
    pub has_alpha: bool,
    /// `scale=W:H`, only when the output size differs from the input size
    pub scale: Option<String>,
}

/// Argument vector for one AVIF encode.
pub fn build_ffmpeg_args(
    has_alpha: bool,
    scale: Option<&str>,
    crf: u8,
    preset: &str,
    out_path: &Path,
) -> Vec<OsString> {
    let chain = |base: &str| match scale {
        Some(scale) => format!("{base},{scale}"),
        None => base.to_string(),
    };

    let mut args: Vec<OsString> = vec!["-i".into(), "pipe:0".into()];
    if has_alpha {
        args.extend(
            [
                "-map".to_string(),
                "0".to_string(),
                "-map".to_string(),
                "0".to_string(),
                "-filter:v:0".to_string(),
                chain("format=rgba"),
                "-filter:v:1".to_string(),
                "alphaextract".to_string(),
            ]
            .map(OsString::from),
        );
    } else {
        args.push("-filter:v".into());
        args.push(chain("format=yuv420p").into());
    }
    args.extend(
        [
            "-c:v".to_string(),
            "libaom-av1".to_string(),
            "-crf".to_string(),
            crf.to_string(),
            "-preset".to_string(),
            preset.to_string(),
            "-still-picture".to_string(),
            "1".to_string(),
            "-y".to_string(),
            "-f".to_string(),
            "avif".to_string(),
        ]
        .map(OsString::from),
    );
    args.push(out_path.as_os_str().to_os_string());
    args
}

/// Reserve `<tmp>/obsidian_image_converter_<millis>_<random>.avif`.
///
/// The returned guard deletes the file when dropped.
pub fn reserve_output_path() -> Result<TempPath> {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    let file = tempfile::Builder::new()
        .prefix(&format!("{TEMP_PREFIX}{millis}_"))
        .suffix(".avif")
        .tempfile()
        .map_err(|e| ConvertError::tool_io(Tool::Ffmpeg, e))?;
    Ok(file.into_temp_path())
}

/// Encode `input` to AVIF with the configured FFmpeg.
pub async fn encode_avif(input: AvifInput, settings: &ToolSettings) -> Result<Vec<u8>> {
    let program = settings
        .ffmpeg_path
        .as_deref()
        .ok_or_else(|| ConvertError::tool_not_configured(Tool::Ffmpeg))?;

    let out_path = reserve_output_path()?;
    let args = build_ffmpeg_args(
        input.has_alpha,
        input.scale.as_deref(),
        settings.avif_crf,
        &settings.avif_preset,
        &out_path,
    );

    tracing::debug!(
        has_alpha = input.has_alpha,
        scale = input.scale.as_deref().unwrap_or("none"),
        crf = settings.avif_crf,
        preset = %settings.avif_preset,
        "encoding AVIF"
    );

    // `out_path` is dropped (and the file removed) on every early return
    run_tool(
        Tool::Ffmpeg,
        program,
        &args,
        input.bytes,
        Some(settings.ffmpeg_timeout),
    )
    .await?;

    let encoded = tokio::fs::read(&out_path)
        .await
        .map_err(|e| ConvertError::tool_io(Tool::Ffmpeg, e))?;

    if let Err(e) = out_path.close() {
        tracing::warn!(error = %e, "failed to remove AVIF temp file");
    }

    if encoded.is_empty() {
        return Err(ConvertError::empty_tool_output(Tool::Ffmpeg));
    }
    Ok(encoded)
}
