//! Image decoding and encoding.

use image::{DynamicImage, ImageFormat, codecs::jpeg::JpegEncoder};
use std::io::Cursor;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("Failed to decode image: {0}")]
    Decode(String),

    #[error("Failed to encode {format:?} image: {message}")]
    Encode { format: ImageFormat, message: String },
}

/// Extensions every build can decode
pub const WEB_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif"];

/// Camera-native extensions that need the `heif` feature
pub const HEIF_EXTENSIONS: &[&str] = &["heic", "heif"];

/// Whether [`default_codec`] can decode files with this (lowercase) extension
pub fn can_decode(extension: &str) -> bool {
    WEB_EXTENSIONS.contains(&extension) || (cfg!(feature = "heif") && HEIF_EXTENSIONS.contains(&extension))
}

/// Image codec used to convert camera-native uploads into a web format
pub trait ImageCodec: Send + Sync {
    fn decode(&self, data: &[u8]) -> Result<DynamicImage, CodecError>;

    /// Encode `image` as `format`. `quality` (1-100) applies to lossy formats only.
    fn encode(&self, image: &DynamicImage, format: ImageFormat, quality: u8) -> Result<Vec<u8>, CodecError>;
}

/// Codec backed by the `image` crate. The input format is sniffed from the data.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageRsCodec;

impl ImageCodec for ImageRsCodec {
    fn decode(&self, data: &[u8]) -> Result<DynamicImage, CodecError> {
        image::load_from_memory(data).map_err(|e| CodecError::Decode(e.to_string()))
    }

    fn encode(&self, image: &DynamicImage, format: ImageFormat, quality: u8) -> Result<Vec<u8>, CodecError> {
        encode_with_image_rs(image, format, quality)
    }
}

fn encode_with_image_rs(image: &DynamicImage, format: ImageFormat, quality: u8) -> Result<Vec<u8>, CodecError> {
    let encode_err = |e: image::ImageError| CodecError::Encode {
        format,
        message: e.to_string(),
    };

    let mut buf = Vec::new();
    match format {
        ImageFormat::Jpeg => {
            // JPEG has no alpha channel
            let mut encoder = JpegEncoder::new_with_quality(&mut buf, quality);
            encoder.encode_image(&image.to_rgb8()).map_err(encode_err)?;
        }
        _ => {
            image.write_to(&mut Cursor::new(&mut buf), format).map_err(encode_err)?;
        }
    }
    Ok(buf)
}

/// Codec that reads HEIC/HEIF through libheif and falls back to the `image` crate for
/// everything else.
#[cfg(feature = "heif")]
pub struct LibHeifCodec {
    lib: libheif_rs::LibHeif,
}

#[cfg(feature = "heif")]
impl LibHeifCodec {
    pub fn new() -> Self {
        Self {
            lib: libheif_rs::LibHeif::new(),
        }
    }

    fn decode_heif(&self, data: &[u8]) -> Result<DynamicImage, CodecError> {
        use libheif_rs::{ColorSpace, HeifContext, RgbChroma};

        let decode_err = |e: libheif_rs::HeifError| CodecError::Decode(e.to_string());

        let context = HeifContext::read_from_bytes(data).map_err(decode_err)?;
        let handle = context.primary_image_handle().map_err(decode_err)?;
        let decoded = self
            .lib
            .decode(&handle, ColorSpace::Rgb(RgbChroma::Rgb), None)
            .map_err(decode_err)?;

        let planes = decoded.planes();
        let plane = planes
            .interleaved
            .ok_or_else(|| CodecError::Decode("HEIF image has no interleaved RGB plane".to_string()))?;

        let (width, height) = (plane.width, plane.height);
        let row_len = width as usize * 3;
        let mut pixels = Vec::with_capacity(row_len * height as usize);
        for row in plane.data.chunks(plane.stride).take(height as usize) {
            pixels.extend_from_slice(&row[..row_len]);
        }

        image::RgbImage::from_raw(width, height, pixels)
            .map(DynamicImage::ImageRgb8)
            .ok_or_else(|| CodecError::Decode("HEIF pixel buffer does not match its dimensions".to_string()))
    }
}

#[cfg(feature = "heif")]
impl Default for LibHeifCodec {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "heif")]
impl ImageCodec for LibHeifCodec {
    fn decode(&self, data: &[u8]) -> Result<DynamicImage, CodecError> {
        // ISO-BMFF: the `ftyp` box type sits at offset 4
        if data.get(4..8) == Some(b"ftyp".as_slice()) {
            return self.decode_heif(data);
        }
        image::load_from_memory(data).map_err(|e| CodecError::Decode(e.to_string()))
    }

    fn encode(&self, image: &DynamicImage, format: ImageFormat, quality: u8) -> Result<Vec<u8>, CodecError> {
        encode_with_image_rs(image, format, quality)
    }
}

/// The codec used in production: libheif when built with the `heif` feature, otherwise the
/// pure Rust `image` crate (which cannot read real HEIC files).
pub fn default_codec() -> std::sync::Arc<dyn ImageCodec> {
    #[cfg(feature = "heif")]
    {
        std::sync::Arc::new(LibHeifCodec::new())
    }
    #[cfg(not(feature = "heif"))]
    {
        std::sync::Arc::new(ImageRsCodec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn sample_png() -> Vec<u8> {
        let image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 3, Rgba([200, 10, 10, 128])));
        let mut buf = Vec::new();
        image.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png).unwrap();
        buf
    }

    #[test]
    fn test_decode_sniffs_format() {
        let image = ImageRsCodec.decode(&sample_png()).unwrap();
        assert_eq!((image.width(), image.height()), (4, 3));
    }

    #[test]
    fn test_encode_jpeg_drops_alpha() {
        let codec = ImageRsCodec;
        let image = codec.decode(&sample_png()).unwrap();

        let jpeg = codec.encode(&image, ImageFormat::Jpeg, 90).unwrap();

        assert_eq!(image::guess_format(&jpeg).unwrap(), ImageFormat::Jpeg);
        let decoded = codec.decode(&jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (4, 3));
    }

    #[test]
    fn test_heif_decoding_follows_feature() {
        assert!(can_decode("png"));
        assert!(!can_decode("bmp"));
        assert_eq!(can_decode("heic"), cfg!(feature = "heif"));
    }

    #[cfg(feature = "heif")]
    #[test]
    fn test_libheif_decodes_heic() {
        let heic = crate::test_utils::heic_bytes();
        assert_eq!(heic.get(4..8), Some(b"ftyp".as_slice()));
        assert!(image::load_from_memory(&heic).is_err());

        let image = LibHeifCodec::new().decode(&heic).unwrap();

        assert_eq!((image.width(), image.height()), (16, 8));
    }

    #[cfg(feature = "heif")]
    #[test]
    fn test_libheif_falls_back_for_web_formats() {
        let image = LibHeifCodec::new().decode(&sample_png()).unwrap();
        assert_eq!((image.width(), image.height()), (4, 3));
    }

    #[test]
    fn test_decode_garbage_fails() {
        let err = ImageRsCodec.decode(b"definitely not an image").unwrap_err();
        assert!(matches!(err, CodecError::Decode(_)));
    }
}
