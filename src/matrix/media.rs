//! Media helpers: MXC URI parsing, content hashing, and image metadata
//! sniffed from magic bytes and format headers.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Result, StickerbookError};

/// A parsed `mxc://server/media-id` content URI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MxcUri {
    pub server: String,
    pub media_id: String,
}

impl MxcUri {
    pub fn parse(uri: &str) -> Result<Self> {
        let rest = uri
            .strip_prefix("mxc://")
            .ok_or_else(|| StickerbookError::InvalidAddress(uri.to_string()))?;

        let (server, media_id) = rest
            .split_once('/')
            .ok_or_else(|| StickerbookError::InvalidAddress(uri.to_string()))?;

        if server.is_empty() || media_id.is_empty() || media_id.contains('/') {
            return Err(StickerbookError::InvalidAddress(uri.to_string()));
        }

        Ok(Self {
            server: server.to_string(),
            media_id: media_id.to_string(),
        })
    }
}

impl std::fmt::Display for MxcUri {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "mxc://{}/{}", self.server, self.media_id)
    }
}

/// Metadata sniffed from raw image bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageInfo {
    pub width: u32,
    pub height: u32,
    pub size_bytes: u64,
    pub mime_type: String,
}

/// Content ID for raw image bytes: lowercase hex SHA-256.
pub fn hash_image(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Extract dimensions and MIME type from image headers. The MIME type falls
/// back to `application/octet-stream` and dimensions to zero when the format
/// is unrecognized; callers may overlay a transport-reported MIME type.
pub fn image_info(data: &[u8]) -> ImageInfo {
    let mime_type = detect_mime_type(data);
    let (width, height) = match mime_type.as_str() {
        "image/png" => png_dimensions(data),
        "image/jpeg" => jpeg_dimensions(data),
        "image/gif" => gif_dimensions(data),
        "image/webp" => webp_dimensions(data),
        _ => None,
    }
    .unwrap_or((0, 0));

    ImageInfo {
        width,
        height,
        size_bytes: data.len() as u64,
        mime_type,
    }
}

/// Detect an image MIME type from its magic bytes.
pub fn detect_mime_type(data: &[u8]) -> String {
    let mime = if data.starts_with(&[0x89, b'P', b'N', b'G']) {
        "image/png"
    } else if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        "image/jpeg"
    } else if data.starts_with(b"GIF8") {
        "image/gif"
    } else if data.len() >= 12 && data.starts_with(b"RIFF") && &data[8..12] == b"WEBP" {
        "image/webp"
    } else {
        "application/octet-stream"
    };
    mime.to_string()
}

pub fn is_image_mime_type(mime_type: &str) -> bool {
    matches!(
        mime_type,
        "image/png" | "image/jpeg" | "image/gif" | "image/webp"
    )
}

fn be32(data: &[u8], at: usize) -> Option<u32> {
    let bytes = data.get(at..at + 4)?;
    Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn le16(data: &[u8], at: usize) -> Option<u32> {
    let bytes = data.get(at..at + 2)?;
    Some(u16::from_le_bytes([bytes[0], bytes[1]]) as u32)
}

// IHDR is always the first chunk: width/height at fixed offsets.
fn png_dimensions(data: &[u8]) -> Option<(u32, u32)> {
    if data.get(12..16)? != b"IHDR" {
        return None;
    }
    Some((be32(data, 16)?, be32(data, 20)?))
}

// Logical screen descriptor immediately follows the 6-byte header.
fn gif_dimensions(data: &[u8]) -> Option<(u32, u32)> {
    Some((le16(data, 6)?, le16(data, 8)?))
}

// Walk markers until a start-of-frame carrying the dimensions.
fn jpeg_dimensions(data: &[u8]) -> Option<(u32, u32)> {
    let mut pos = 2;
    while pos + 9 < data.len() {
        if data[pos] != 0xFF {
            return None;
        }
        let marker = data[pos + 1];
        let length = u16::from_be_bytes([data[pos + 2], data[pos + 3]]) as usize;
        match marker {
            0xC0..=0xCF if marker != 0xC4 && marker != 0xC8 && marker != 0xCC => {
                let height = u16::from_be_bytes([data[pos + 5], data[pos + 6]]) as u32;
                let width = u16::from_be_bytes([data[pos + 7], data[pos + 8]]) as u32;
                return Some((width, height));
            }
            _ => pos += 2 + length,
        }
    }
    None
}

fn webp_dimensions(data: &[u8]) -> Option<(u32, u32)> {
    match data.get(12..16)? {
        // Extended format: 24-bit little-endian minus-one dimensions.
        b"VP8X" => {
            let w = data.get(24..27)?;
            let h = data.get(27..30)?;
            let width = u32::from_le_bytes([w[0], w[1], w[2], 0]) + 1;
            let height = u32::from_le_bytes([h[0], h[1], h[2], 0]) + 1;
            Some((width, height))
        }
        // Lossy format: 14-bit dimensions after the frame tag.
        b"VP8 " => {
            let width = le16(data, 26)? & 0x3FFF;
            let height = le16(data, 28)? & 0x3FFF;
            Some((width, height))
        }
        // Lossless format: 14-bit dimensions packed after the signature byte.
        b"VP8L" => {
            let bytes = data.get(21..25)?;
            let bits = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
            let width = (bits & 0x3FFF) + 1;
            let height = ((bits >> 14) & 0x3FFF) + 1;
            Some((width, height))
        }
        _ => None,
    }
}
