//! Photo compression pipeline for captures.
//!
//! Images are downscaled to fit a maximum long edge and re-encoded as JPEG
//! before they are written to the local store; other media passes through.

use std::io::Cursor;

use image::{codecs::jpeg::JpegEncoder, DynamicImage, GenericImageView, ImageFormat};

use crate::config::CompressionOptions;
use crate::{Error, Result};

const JPEG_MIME: &str = "image/jpeg";

/// Result of running a capture through the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressedCapture {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    /// Pixel dimensions, when the capture was an image
    pub dimensions: Option<(u32, u32)>,
    /// Whether the bytes were re-encoded
    pub compressed: bool,
}

/// Normalize a captured file before it is persisted or queued.
///
/// Image media is decoded, resized so neither dimension exceeds
/// `options.max_dimension` (aspect ratio preserved, never upscaled), and
/// re-encoded as JPEG. Anything else is returned unchanged. A capture that
/// claims to be an image but cannot be decoded is an error.
pub fn compress_capture(
    bytes: &[u8],
    mime_type: &str,
    options: CompressionOptions,
) -> Result<CompressedCapture> {
    if bytes.is_empty() {
        return Err(Error::Media("Capture bytes cannot be empty".to_string()));
    }
    options
        .validate()
        .map_err(|error| Error::Media(error.to_string()))?;

    if !is_raster_image(bytes, mime_type) {
        if mime_type.trim().to_ascii_lowercase().starts_with("image/") {
            tracing::debug!(
                "Storing {} capture uncompressed ({} bytes): no decoder for this type",
                mime_type.trim(),
                bytes.len()
            );
        }
        return Ok(CompressedCapture {
            bytes: bytes.to_vec(),
            mime_type: mime_type.trim().to_string(),
            dimensions: None,
            compressed: false,
        });
    }

    let source = image::load_from_memory(bytes)
        .map_err(|error| Error::Media(format!("Failed to decode captured image: {error}")))?;

    let (width, height) = source.dimensions();
    let resized = if width <= options.max_dimension && height <= options.max_dimension {
        source
    } else {
        source.thumbnail(options.max_dimension, options.max_dimension)
    };
    let dimensions = resized.dimensions();
    let encoded = encode_jpeg(&resized, options.jpeg_quality)?;

    tracing::debug!(
        "Compressed capture {}x{} -> {}x{} ({} -> {} bytes)",
        width,
        height,
        dimensions.0,
        dimensions.1,
        bytes.len(),
        encoded.len()
    );

    Ok(CompressedCapture {
        bytes: encoded,
        mime_type: JPEG_MIME.to_string(),
        dimensions: Some(dimensions),
        compressed: true,
    })
}

/// Rename a capture file to match re-encoded JPEG output.
pub fn jpeg_filename(filename: &str) -> String {
    let trimmed = filename.trim();
    let stem = match trimmed.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => trimmed,
    };
    let stem = if stem.is_empty() { "capture" } else { stem };
    format!("{stem}.jpg")
}

fn is_raster_image(bytes: &[u8], mime_type: &str) -> bool {
    let mime_type = mime_type.trim().to_ascii_lowercase();
    // Pickers sometimes hand over captures without a usable type
    if mime_type.is_empty() || mime_type == "application/octet-stream" {
        return image::guess_format(bytes).is_ok();
    }
    // Image types the codec does not know (HEIC, SVG) are kept as captured
    mime_type == "image/jpg" || ImageFormat::from_mime_type(&mime_type).is_some()
}

fn encode_jpeg(image: &DynamicImage, quality: u8) -> Result<Vec<u8>> {
    let mut cursor = Cursor::new(Vec::new());
    // JPEG has no alpha channel
    let rgb = image.to_rgb8();
    let mut encoder = JpegEncoder::new_with_quality(&mut cursor, quality);
    encoder
        .encode_image(&rgb)
        .map_err(|error| Error::Media(format!("Failed to encode JPEG capture: {error}")))?;
    Ok(cursor.into_inner())
}
