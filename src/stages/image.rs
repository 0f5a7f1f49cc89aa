use image::DynamicImage;

use crate::core::error::AppError;

/// Accepted content types for an identity document or selfie image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageContentType {
    Jpeg,
    Png,
}

impl ImageContentType {
    pub fn from_mime(mime: &str) -> Option<Self> {
        match mime.to_ascii_lowercase().as_str() {
            "image/jpeg" | "image/jpg" => Some(Self::Jpeg),
            "image/png" => Some(Self::Png),
            _ => None,
        }
    }

    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Some(Self::Jpeg)
        } else if bytes.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]) {
            Some(Self::Png)
        } else {
            None
        }
    }
}

/// A decoded raster plus its original bytes and declared content type.
///
/// Owns the decoded pixels for exactly one request/frame; stages receive a
/// borrowed view and must not retain it past the call (§3).
#[derive(Clone)]
pub struct Image {
    pub raster: DynamicImage,
    pub bytes: Vec<u8>,
    pub content_type: ImageContentType,
}

impl Image {
    /// Decode raw bytes, validating dimensions and size cap per §3's
    /// invariants. `max_bytes` of `0` disables the size check (the caller
    /// already enforced it, e.g. via a body-limit layer).
    pub fn decode(bytes: Vec<u8>, max_bytes: usize) -> Result<Self, AppError> {
        if max_bytes > 0 && bytes.len() > max_bytes {
            return Err(AppError::PayloadTooLarge);
        }

        let content_type = ImageContentType::sniff(&bytes)
            .ok_or_else(|| AppError::BadInput("unrecognized image format".to_string()))?;

        let raster = image::load_from_memory(&bytes)
            .map_err(|e| AppError::BadInput(format!("could not decode image: {e}")))?;

        if raster.width() < 1 || raster.height() < 1 {
            return Err(AppError::BadInput("image has zero dimension".to_string()));
        }

        Ok(Image {
            raster,
            bytes,
            content_type,
        })
    }

    pub fn width(&self) -> u32 {
        self.raster.width()
    }

    pub fn height(&self) -> u32 {
        self.raster.height()
    }
}

/// Strip an optional `data:<mime>;base64,` prefix and decode standard
/// base64 (padded or not).
pub fn decode_base64_image(data: &str) -> Result<Vec<u8>, AppError> {
    use base64::{engine::general_purpose, Engine as _};

    let stripped = match data.find(";base64,") {
        Some(idx) => &data[idx + ";base64,".len()..],
        None => data,
    };

    general_purpose::STANDARD
        .decode(stripped.trim())
        .or_else(|_| general_purpose::STANDARD_NO_PAD.decode(stripped.trim()))
        .map_err(|e| AppError::BadInput(format!("invalid base64 image data: {e}")))
}

/// Rectangle within an `Image` plus a detection confidence in `[0, 1]`.
#[derive(Debug, Clone, Copy)]
pub struct FaceBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub confidence: f32,
}
