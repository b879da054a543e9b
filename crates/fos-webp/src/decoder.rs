//! Image Source Decoding
//!
//! The probe hands each sample source to a [`SourceDecoder`]. The default
//! [`ImageDecoder`] decodes data URIs through the `image` crate.

use crate::data_uri::{DataUri, DataUriError};
use image::{GenericImageView, ImageFormat as ImgFormat};

/// Image formats recognized from magic bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg,
    Gif,
    WebP,
    Unknown,
}

impl ImageFormat {
    /// Detect format from magic bytes
    pub fn from_bytes(data: &[u8]) -> Self {
        if data.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]) {
            return Self::Png;
        }

        if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
            return Self::Jpeg;
        }

        if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
            return Self::Gif;
        }

        // RIFF....WEBP
        if data.len() >= 12 && data.starts_with(b"RIFF") && &data[8..12] == b"WEBP" {
            return Self::WebP;
        }

        Self::Unknown
    }

    /// Detect format from a MIME type
    pub fn from_mime(mime: &str) -> Self {
        match mime.to_ascii_lowercase().as_str() {
            "image/png" => Self::Png,
            "image/jpeg" | "image/jpg" => Self::Jpeg,
            "image/gif" => Self::Gif,
            "image/webp" => Self::WebP,
            _ => Self::Unknown,
        }
    }

    fn to_image_format(self) -> Option<ImgFormat> {
        match self {
            Self::Png => Some(ImgFormat::Png),
            Self::Jpeg => Some(ImgFormat::Jpeg),
            Self::Gif => Some(ImgFormat::Gif),
            Self::WebP => Some(ImgFormat::WebP),
            Self::Unknown => None,
        }
    }
}

/// Decoded image size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Both sides are non-zero
    pub fn is_renderable(&self) -> bool {
        self.width > 0 && self.height > 0
    }
}

/// Image decoding errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("unsupported source: {0}")]
    UnsupportedSource(String),

    #[error(transparent)]
    DataUri(#[from] DataUriError),

    #[error("unsupported image format")]
    UnsupportedFormat,

    #[error("decode failed: {0}")]
    DecodeFailed(String),
}

/// Decodes an image source and reports its size
///
/// Implementations are shared between probe tasks and called from the
/// blocking pool.
pub trait SourceDecoder: Send + Sync {
    fn decode(&self, src: &str) -> Result<Dimensions, DecodeError>;
}

/// Decoder backed by the `image` crate
///
/// Only data URIs are resolved; fetching remote sources is the loader's job.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageDecoder;

impl ImageDecoder {
    pub fn new() -> Self {
        Self
    }

    /// Decode raw bytes, sniffing the format from magic bytes first and
    /// falling back to the declared MIME type
    pub fn decode_bytes(&self, data: &[u8], mime: &str) -> Result<Dimensions, DecodeError> {
        let format = match ImageFormat::from_bytes(data) {
            ImageFormat::Unknown => ImageFormat::from_mime(mime),
            detected => detected,
        };
        let img_format = format.to_image_format().ok_or(DecodeError::UnsupportedFormat)?;

        let img = image::load_from_memory_with_format(data, img_format)
            .map_err(|e| DecodeError::DecodeFailed(e.to_string()))?;

        let (width, height) = img.dimensions();
        Ok(Dimensions::new(width, height))
    }
}

impl SourceDecoder for ImageDecoder {
    fn decode(&self, src: &str) -> Result<Dimensions, DecodeError> {
        if !DataUri::is_data_uri(src) {
            return Err(DecodeError::UnsupportedSource(src.to_string()));
        }
        let uri = DataUri::parse(src)?;
        self.decode_bytes(&uri.data, &uri.mime_type)
    }
}
