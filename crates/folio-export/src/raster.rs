//! Decoding uploaded images and producing portable encodings.

use std::io::Cursor;

use folio_common::ExportError;
use image::{DynamicImage, ImageFormat, codecs::jpeg::JpegEncoder};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EncodingFormat {
    /// Lossless
    Png,
    /// Lossy
    Jpeg,
}

impl EncodingFormat {
    pub fn mime_type(self) -> &'static str {
        match self {
            EncodingFormat::Png => "image/png",
            EncodingFormat::Jpeg => "image/jpeg",
        }
    }

    pub fn is_lossless(self) -> bool {
        matches!(self, EncodingFormat::Png)
    }
}

impl std::fmt::Display for EncodingFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            EncodingFormat::Png => "png",
            EncodingFormat::Jpeg => "jpeg",
        })
    }
}

/// One candidate encoding of a decoded image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodingResult {
    pub format: EncodingFormat,
    pub data: Vec<u8>,
}

/// Decoded image with every candidate encoding the backend could produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rasterized {
    pub width: u32,
    pub height: u32,
    pub candidates: Vec<EncodingResult>,
}

/// Backend that decodes an uploaded binary and re-encodes it.
///
/// Implementations run on a blocking thread.
pub trait Rasterizer: Send + Sync {
    fn rasterize(&self, filename: &str, data: &[u8]) -> Result<Rasterized, ExportError>;
}

/// Smallest candidate; on equal size the lossless one.
pub fn choose_smaller_encoding(candidates: Vec<EncodingResult>) -> Option<EncodingResult> {
    candidates
        .into_iter()
        .min_by_key(|candidate| (candidate.data.len(), !candidate.format.is_lossless()))
}

/// [`Rasterizer`] backed by the `image` crate, producing PNG and JPEG candidates.
#[derive(Debug, Clone)]
pub struct ImageRasterizer {
    jpeg_quality: u8,
}

impl Default for ImageRasterizer {
    fn default() -> Self {
        Self { jpeg_quality: 92 }
    }
}

impl ImageRasterizer {
    pub fn new(jpeg_quality: u8) -> Self {
        Self {
            jpeg_quality: jpeg_quality.clamp(1, 100),
        }
    }

    fn encode_png(
        &self,
        filename: &str,
        image: &DynamicImage,
    ) -> Result<EncodingResult, ExportError> {
        let mut data = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut data), ImageFormat::Png)
            .map_err(|e| ExportError::Encode {
                filename: filename.to_owned(),
                format: EncodingFormat::Png.to_string(),
                message: e.to_string(),
            })?;
        Ok(EncodingResult {
            format: EncodingFormat::Png,
            data,
        })
    }

    fn encode_jpeg(
        &self,
        filename: &str,
        image: &DynamicImage,
    ) -> Result<EncodingResult, ExportError> {
        // JPEG has no alpha channel; flatten first
        let rgb = image.to_rgb8();
        let mut data = Vec::new();
        JpegEncoder::new_with_quality(&mut data, self.jpeg_quality)
            .encode_image(&rgb)
            .map_err(|e| ExportError::Encode {
                filename: filename.to_owned(),
                format: EncodingFormat::Jpeg.to_string(),
                message: e.to_string(),
            })?;
        Ok(EncodingResult {
            format: EncodingFormat::Jpeg,
            data,
        })
    }
}

impl Rasterizer for ImageRasterizer {
    fn rasterize(&self, filename: &str, data: &[u8]) -> Result<Rasterized, ExportError> {
        let image = image::load_from_memory(data).map_err(|e| ExportError::Decode {
            filename: filename.to_owned(),
            message: e.to_string(),
        })?;

        let mut candidates = vec![self.encode_png(filename, &image)?];
        // JPEG would drop transparency; opaque RGBA still gets a candidate
        let transparent = image.color().has_alpha()
            && image.to_rgba8().pixels().any(|pixel| pixel[3] != u8::MAX);
        if !transparent {
            match self.encode_jpeg(filename, &image) {
                Ok(jpeg) => candidates.push(jpeg),
                Err(e) => tracing::debug!(filename, error = %e, "jpeg candidate skipped"),
            }
        }

        Ok(Rasterized {
            width: image.width(),
            height: image.height(),
            candidates,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage, Rgba, RgbaImage};

    fn encode(image: DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut data = Vec::new();
        image.write_to(&mut Cursor::new(&mut data), format).unwrap();
        data
    }

    #[test]
    fn smaller_candidate_wins() {
        let chosen = choose_smaller_encoding(vec![
            EncodingResult { format: EncodingFormat::Png, data: vec![0; 10] },
            EncodingResult { format: EncodingFormat::Jpeg, data: vec![0; 4] },
        ])
        .unwrap();
        assert_eq!(chosen.format, EncodingFormat::Jpeg);
    }

    #[test]
    fn ties_favour_lossless() {
        let chosen = choose_smaller_encoding(vec![
            EncodingResult { format: EncodingFormat::Jpeg, data: vec![0; 8] },
            EncodingResult { format: EncodingFormat::Png, data: vec![0; 8] },
        ])
        .unwrap();
        assert_eq!(chosen.format, EncodingFormat::Png);
        assert!(choose_smaller_encoding(Vec::new()).is_none());
    }

    #[test]
    fn flat_image_prefers_png() {
        let flat = RgbImage::from_pixel(32, 32, Rgb([200, 30, 30]));
        let png = encode(DynamicImage::ImageRgb8(flat), ImageFormat::Png);

        let rasterized = ImageRasterizer::default().rasterize("flat.png", &png).unwrap();
        assert_eq!((rasterized.width, rasterized.height), (32, 32));
        assert_eq!(rasterized.candidates.len(), 2);
        let chosen = choose_smaller_encoding(rasterized.candidates).unwrap();
        assert_eq!(chosen.format, EncodingFormat::Png);
    }

    #[test]
    fn transparent_image_only_offers_png() {
        let clear = RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 0]));
        let png = encode(DynamicImage::ImageRgba8(clear), ImageFormat::Png);
        let rasterized = ImageRasterizer::default().rasterize("clear.png", &png).unwrap();
        assert_eq!(rasterized.candidates.len(), 1);
        assert_eq!(rasterized.candidates[0].format, EncodingFormat::Png);
    }

    #[test]
    fn opaque_rgba_photo_gets_a_jpeg_candidate() {
        let mut state = 0x2545_f491_u32;
        let noisy = RgbaImage::from_fn(64, 64, |x, y| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            let [a, b, c, _] = state.to_le_bytes();
            let base = ((x + y) * 2) as u8;
            Rgba([base.wrapping_add(a % 32), b, base ^ c, 255])
        });
        let png = encode(DynamicImage::ImageRgba8(noisy), ImageFormat::Png);

        let rasterized = ImageRasterizer::new(75).rasterize("photo.png", &png).unwrap();
        assert_eq!(rasterized.candidates.len(), 2);
        let chosen = choose_smaller_encoding(rasterized.candidates).unwrap();
        assert_eq!(chosen.format, EncodingFormat::Jpeg);
    }

    #[test]
    fn garbage_is_a_decode_error() {
        let err = ImageRasterizer::default()
            .rasterize("broken.png", b"definitely not an image")
            .unwrap_err();
        assert!(matches!(err, ExportError::Decode { .. }));
    }
}
