// src/engine/sniff.rs
//
// Magic-byte format detection.
// Only the first SNIFF_WINDOW bytes are inspected; filenames and declared
// MIME types are consulted only when no signature matches.

use bitflags::bitflags;

/// Number of leading bytes the sniffer looks at.
pub const SNIFF_WINDOW: usize = 24;

bitflags! {
    /// What the pipeline can do with a given input type.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Capabilities: u8 {
        /// The raster stage can decode it directly
        const DECODE = 0b0001;
        /// The raster stage can encode it (usable as an output / re-encode target)
        const ENCODE = 0b0010;
        /// Needs a decoder adapter to become a raster-readable intermediate
        const ADAPTER = 0b0100;
    }
}

/// Canonical image MIME types the sniffer can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MimeType {
    Png,
    Gif,
    Jpeg,
    Bmp,
    Heic,
    Heif,
    Avif,
    Tiff,
    Webp,
    Unknown,
}

impl MimeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Gif => "image/gif",
            Self::Jpeg => "image/jpeg",
            Self::Bmp => "image/bmp",
            Self::Heic => "image/heic",
            Self::Heif => "image/heif",
            Self::Avif => "image/avif",
            Self::Tiff => "image/tiff",
            Self::Webp => "image/webp",
            Self::Unknown => "unknown",
        }
    }

    /// Parse a declared MIME type. Parameters (`; charset=...`) and case are ignored.
    pub fn from_mime_str(mime: &str) -> Option<Self> {
        let essence = mime.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
        match essence.as_str() {
            "image/png" | "image/apng" => Some(Self::Png),
            "image/gif" => Some(Self::Gif),
            "image/jpeg" | "image/jpg" | "image/pjpeg" => Some(Self::Jpeg),
            "image/bmp" | "image/x-bmp" | "image/x-ms-bmp" => Some(Self::Bmp),
            "image/heic" | "image/heic-sequence" => Some(Self::Heic),
            "image/heif" | "image/heif-sequence" => Some(Self::Heif),
            "image/avif" => Some(Self::Avif),
            "image/tiff" | "image/tiff-fx" => Some(Self::Tiff),
            "image/webp" => Some(Self::Webp),
            _ => None,
        }
    }

    /// File extensions this type is known by, preferred extension first.
    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            Self::Png => &["png"],
            Self::Gif => &["gif"],
            Self::Jpeg => &["jpg", "jpeg", "jfif"],
            Self::Bmp => &["bmp"],
            Self::Heic => &["heic"],
            Self::Heif => &["heif"],
            Self::Avif => &["avif"],
            Self::Tiff => &["tif", "tiff"],
            Self::Webp => &["webp"],
            Self::Unknown => &[],
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.trim_start_matches('.').to_ascii_lowercase();
        [
            Self::Png,
            Self::Gif,
            Self::Jpeg,
            Self::Bmp,
            Self::Heic,
            Self::Heif,
            Self::Avif,
            Self::Tiff,
            Self::Webp,
        ]
        .into_iter()
        .find(|mime| mime.extensions().contains(&ext.as_str()))
    }

    pub fn capabilities(&self) -> Capabilities {
        match self {
            Self::Png | Self::Jpeg | Self::Webp => Capabilities::DECODE | Capabilities::ENCODE,
            Self::Gif | Self::Bmp => Capabilities::DECODE,
            Self::Tiff | Self::Heic | Self::Heif => Capabilities::ADAPTER,
            Self::Avif | Self::Unknown => Capabilities::empty(),
        }
    }

    pub fn is_raster_decodable(&self) -> bool {
        self.capabilities().contains(Capabilities::DECODE)
    }

    pub fn is_raster_encodable(&self) -> bool {
        self.capabilities().contains(Capabilities::ENCODE)
    }

    pub fn is_heif_family(&self) -> bool {
        matches!(self, Self::Heic | Self::Heif)
    }
}

impl std::fmt::Display for MimeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identify the image type from its leading bytes.
pub fn sniff(bytes: &[u8]) -> MimeType {
    sniff_signature(bytes).unwrap_or(MimeType::Unknown)
}

/// Identify the image type, falling back to `declared` only when no
/// signature matches. A matching signature always wins over the declaration.
pub fn sniff_with_declared(bytes: &[u8], declared: Option<&str>) -> MimeType {
    sniff_signature(bytes)
        .or_else(|| declared.and_then(MimeType::from_mime_str))
        .unwrap_or(MimeType::Unknown)
}

fn sniff_signature(bytes: &[u8]) -> Option<MimeType> {
    let head = &bytes[..bytes.len().min(SNIFF_WINDOW)];

    if head.starts_with(&[0x89, 0x50, 0x4E, 0x47]) {
        return Some(MimeType::Png);
    }
    if head.starts_with(b"GIF8") {
        return Some(MimeType::Gif);
    }
    // FF D8 FF followed by an APPn / JFIF-style marker (Ex)
    if head.len() >= 4 && head.starts_with(&[0xFF, 0xD8, 0xFF]) && head[3] & 0xF0 == 0xE0 {
        return Some(MimeType::Jpeg);
    }
    if head.starts_with(b"BM") {
        return Some(MimeType::Bmp);
    }
    if let Some(mime) = sniff_ftyp(head) {
        return Some(mime);
    }
    if head.starts_with(b"II") || head.starts_with(b"MM") {
        return Some(MimeType::Tiff);
    }
    if head.len() >= 12 && head.starts_with(b"RIFF") && &head[8..12] == b"WEBP" {
        return Some(MimeType::Webp);
    }
    None
}

/// ISO-BMFF `ftyp` box: size (4) + "ftyp" (4) + major brand (4) + minor
/// version (4) + compatible brands.
fn sniff_ftyp(head: &[u8]) -> Option<MimeType> {
    if head.len() < 12 || &head[4..8] != b"ftyp" {
        return None;
    }

    match &head[8..12] {
        b"avif" | b"avis" => Some(MimeType::Avif),
        b"heic" | b"heix" | b"hevc" | b"hevx" => Some(MimeType::Heic),
        b"mif1" | b"msf1" => {
            // Generic HEIF major brand; AVIF files often use it too and list
            // avif among the compatible brands.
            let box_size = u32::from_be_bytes([head[0], head[1], head[2], head[3]]) as usize;
            let end = box_size.min(head.len());
            let is_avif = head
                .get(16..end)
                .unwrap_or(&[])
                .chunks_exact(4)
                .any(|brand| brand == b"avif" || brand == b"avis");
            Some(if is_avif { MimeType::Avif } else { MimeType::Heif })
        }
        _ => None,
    }
}
