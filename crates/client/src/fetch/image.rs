//! Inline re-encoding of fetched images.
//!
//! Full-size payloads become `data:` URIs as-is; placeholders are tiny,
//! heavily compressed JPEG thumbnails meant to be shown while the real image
//! loads.

use base64::Engine;
use bytes::Bytes;
use datavault_core::Error;

/// Content type assumed when the server sends none.
pub const DEFAULT_CONTENT_TYPE: &str = "image/jpeg";

/// Bounding box of placeholder thumbnails.
pub const PLACEHOLDER_SIZE: u32 = 32;

/// JPEG quality of placeholder thumbnails.
pub const PLACEHOLDER_QUALITY: u8 = 30;

pub fn is_data_uri(s: &str) -> bool {
    s.starts_with("data:")
}

/// Encode `bytes` as a base64 data URI with the observed content type.
pub fn to_data_uri(content_type: Option<&str>, bytes: &[u8]) -> String {
    let mime = content_type
        .and_then(|ct| ct.split(';').next())
        .map(str::trim)
        .filter(|ct| !ct.is_empty())
        .unwrap_or(DEFAULT_CONTENT_TYPE);
    let payload = base64::engine::general_purpose::STANDARD.encode(bytes);
    format!("data:{mime};base64,{payload}")
}

/// Decode `bytes`, shrink to fit [`PLACEHOLDER_SIZE`] and re-encode as a
/// low-quality JPEG data URI.
pub fn placeholder_data_uri(bytes: &[u8]) -> Result<String, Error> {
    let img = image::load_from_memory(bytes).map_err(|e| Error::ImageEncode(e.to_string()))?;
    let thumb = img.thumbnail(PLACEHOLDER_SIZE, PLACEHOLDER_SIZE).to_rgb8();

    let mut buffer = Vec::new();
    let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buffer, PLACEHOLDER_QUALITY);
    thumb
        .write_with_encoder(encoder)
        .map_err(|e| Error::ImageEncode(e.to_string()))?;

    Ok(to_data_uri(Some("image/jpeg"), &buffer))
}

/// [`placeholder_data_uri`] on the blocking pool.
pub async fn placeholder_data_uri_async(bytes: Bytes) -> Result<String, Error> {
    tokio::task::spawn_blocking(move || placeholder_data_uri(&bytes))
        .await
        .map_err(|e| Error::ImageEncode(format!("thumbnail task failed: {e}")))?
}
