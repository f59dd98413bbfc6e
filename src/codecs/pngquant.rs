// src/codecs/pngquant.rs
//
// Palette PNG via the pngquant CLI: PNG in on stdin, PNG out on stdout.

use crate::codecs::process::run_tool;
use crate::error::{ConvertError, Result, Tool};
use crate::ops::ToolSettings;
use std::ffi::OsString;

pub fn build_pngquant_args(quality_range: &str) -> Vec<OsString> {
    vec!["--quality".into(), quality_range.into(), "-".into()]
}

/// Quantize an encoded PNG. No timeout is applied.
pub async fn quantize(png: Vec<u8>, settings: &ToolSettings) -> Result<Vec<u8>> {
    let program = settings
        .pngquant_path
        .as_deref()
        .ok_or_else(|| ConvertError::tool_not_configured(Tool::Pngquant))?;

    let args = build_pngquant_args(&settings.pngquant_quality);
    let output = run_tool(Tool::Pngquant, program, &args, png, None).await?;

    if output.stdout.is_empty() {
        return Err(ConvertError::empty_tool_output(Tool::Pngquant));
    }
    Ok(output.stdout)
}
