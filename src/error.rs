// src/error.rs
//
// Unified error handling for image-converter
// Uses thiserror for simple, type-safe error handling
//
// Error Taxonomy:
// - Sniff: header did not identify a usable image type
// - Decode / Encode: codec failures inside the raster stage
// - ToolNotConfigured / Spawn / ProcessExit: external CLI codecs
// - Metadata: EXIF extraction or reinsertion
// - Internal: library bugs (should not happen)

use std::borrow::Cow;
use std::fmt;
use thiserror::Error;

/// Error taxonomy used by callers that want to react to a failure class
/// instead of a concrete variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Unknown header or unsupported input type
    Sniff,
    /// Source bytes could not be turned into pixels
    Decode,
    /// Pixels could not be turned into output bytes
    Encode,
    /// An external tool was requested but no executable path is configured
    ToolNotConfigured,
    /// The OS could not launch the external process
    Spawn,
    /// The external process failed, timed out, or produced nothing
    ProcessExit,
    /// EXIF extraction or reinsertion failed
    Metadata,
    /// Library bugs (should not happen)
    Internal,
}

/// External command-line codecs driven by the converter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    Ffmpeg,
    Pngquant,
}

impl Tool {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tool::Ffmpeg => "ffmpeg",
            Tool::Pngquant => "pngquant",
        }
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// image-converter error types
#[derive(Debug, Error)]
pub enum ConvertError {
    // Sniff Errors
    #[error("Unrecognized image header (declared type: {declared})")]
    UnknownFormat { declared: Cow<'static, str> },

    #[error("Unsupported image format: {format}")]
    UnsupportedFormat { format: Cow<'static, str> },

    // Decode Errors
    #[error("Failed to decode {format}: {message}")]
    DecodeFailed {
        format: Cow<'static, str>,
        message: Cow<'static, str>,
    },

    // Size Limit Errors
    #[error("Image dimension {dimension} exceeds maximum {max}")]
    DimensionExceedsLimit { dimension: u32, max: u32 },

    #[error("Image pixel count {pixels} exceeds maximum {max}")]
    PixelCountExceedsLimit { pixels: u64, max: u64 },

    #[error("Resize failed ({source_width}x{source_height} -> {target_width}x{target_height}): {message}")]
    ResizeFailed {
        source_width: u32,
        source_height: u32,
        target_width: u32,
        target_height: u32,
        message: Cow<'static, str>,
    },

    // Encode Errors
    #[error("Failed to encode as {format}: {message}")]
    EncodeFailed {
        format: Cow<'static, str>,
        message: Cow<'static, str>,
    },

    #[error("Every {format} encoding candidate failed or came back empty")]
    NoValidCandidate { format: Cow<'static, str> },

    // External Tool Errors
    #[error("{tool} executable path is not configured")]
    ToolNotConfigured { tool: Tool },

    #[error("Failed to launch {tool}: {source}")]
    SpawnFailed {
        tool: Tool,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} exited with {}: {stderr}", code.map_or_else(|| "a signal".to_string(), |c| format!("code {c}")))]
    ProcessFailed {
        tool: Tool,
        code: Option<i32>,
        stderr: Cow<'static, str>,
    },

    #[error("{tool} did not finish within {timeout_ms}ms and was killed")]
    ProcessTimeout { tool: Tool, timeout_ms: u64 },

    #[error("I/O with {tool} failed: {source}")]
    ToolIo {
        tool: Tool,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} produced no output")]
    EmptyToolOutput { tool: Tool },

    // Metadata Errors
    #[error("Failed to carry EXIF metadata: {message}")]
    MetadataFailed { message: Cow<'static, str> },

    // Internal Errors
    #[error("Internal error: {message}")]
    InternalPanic { message: Cow<'static, str> },
}

// Constructor Helpers
impl ConvertError {
    pub fn unknown_format(declared: Option<&str>) -> Self {
        Self::UnknownFormat {
            declared: Cow::Owned(declared.unwrap_or("none").to_string()),
        }
    }

    pub fn unsupported_format(format: impl Into<Cow<'static, str>>) -> Self {
        Self::UnsupportedFormat {
            format: format.into(),
        }
    }

    pub fn decode_failed(
        format: impl Into<Cow<'static, str>>,
        message: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::DecodeFailed {
            format: format.into(),
            message: message.into(),
        }
    }

    pub fn dimension_exceeds_limit(dimension: u32, max: u32) -> Self {
        Self::DimensionExceedsLimit { dimension, max }
    }

    pub fn pixel_count_exceeds_limit(pixels: u64, max: u64) -> Self {
        Self::PixelCountExceedsLimit { pixels, max }
    }

    pub fn resize_failed(
        source_dims: (u32, u32),
        target_dims: (u32, u32),
        message: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::ResizeFailed {
            source_width: source_dims.0,
            source_height: source_dims.1,
            target_width: target_dims.0,
            target_height: target_dims.1,
            message: message.into(),
        }
    }

    pub fn encode_failed(
        format: impl Into<Cow<'static, str>>,
        message: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::EncodeFailed {
            format: format.into(),
            message: message.into(),
        }
    }

    pub fn no_valid_candidate(format: impl Into<Cow<'static, str>>) -> Self {
        Self::NoValidCandidate {
            format: format.into(),
        }
    }

    pub fn tool_not_configured(tool: Tool) -> Self {
        Self::ToolNotConfigured { tool }
    }

    pub fn spawn_failed(tool: Tool, source: std::io::Error) -> Self {
        Self::SpawnFailed { tool, source }
    }

    pub fn process_failed(
        tool: Tool,
        code: Option<i32>,
        stderr: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::ProcessFailed {
            tool,
            code,
            stderr: stderr.into(),
        }
    }

    pub fn process_timeout(tool: Tool, timeout_ms: u64) -> Self {
        Self::ProcessTimeout { tool, timeout_ms }
    }

    pub fn tool_io(tool: Tool, source: std::io::Error) -> Self {
        Self::ToolIo { tool, source }
    }

    pub fn empty_tool_output(tool: Tool) -> Self {
        Self::EmptyToolOutput { tool }
    }

    pub fn metadata_failed(message: impl Into<Cow<'static, str>>) -> Self {
        Self::MetadataFailed {
            message: message.into(),
        }
    }

    pub fn internal_panic(message: impl Into<Cow<'static, str>>) -> Self {
        Self::InternalPanic {
            message: message.into(),
        }
    }

    /// Check if this error is recoverable (the caller can fix it by changing
    /// the request or the environment)
    ///
    /// - Sniff, ToolNotConfigured and Spawn errors are recoverable
    ///   (different input, configure the tool, install the tool)
    /// - Codec, process, metadata and internal errors are not
    pub fn is_recoverable(&self) -> bool {
        match self.kind() {
            ErrorKind::Sniff | ErrorKind::ToolNotConfigured | ErrorKind::Spawn => true,
            ErrorKind::Decode
            | ErrorKind::Encode
            | ErrorKind::ProcessExit
            | ErrorKind::Metadata
            | ErrorKind::Internal => false,
        }
    }

    /// Get the error kind for this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownFormat { .. } | Self::UnsupportedFormat { .. } => ErrorKind::Sniff,

            // Limits are hit while decoding, so they share the decode class
            Self::DecodeFailed { .. }
            | Self::DimensionExceedsLimit { .. }
            | Self::PixelCountExceedsLimit { .. } => ErrorKind::Decode,

            Self::ResizeFailed { .. } | Self::EncodeFailed { .. } | Self::NoValidCandidate { .. } => {
                ErrorKind::Encode
            }

            Self::ToolNotConfigured { .. } => ErrorKind::ToolNotConfigured,
            Self::SpawnFailed { .. } => ErrorKind::Spawn,

            Self::ProcessFailed { .. }
            | Self::ProcessTimeout { .. }
            | Self::ToolIo { .. }
            | Self::EmptyToolOutput { .. } => ErrorKind::ProcessExit,

            Self::MetadataFailed { .. } => ErrorKind::Metadata,
            Self::InternalPanic { .. } => ErrorKind::Internal,
        }
    }

    /// The external tool involved, if any.
    pub fn tool(&self) -> Option<Tool> {
        match self {
            Self::ToolNotConfigured { tool }
            | Self::SpawnFailed { tool, .. }
            | Self::ProcessFailed { tool, .. }
            | Self::ProcessTimeout { tool, .. }
            | Self::ToolIo { tool, .. }
            | Self::EmptyToolOutput { tool } => Some(*tool),
            _ => None,
        }
    }
}

// Result type alias
pub type Result<T> = std::result::Result<T, ConvertError>;
