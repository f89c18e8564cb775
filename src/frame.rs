//! Captured video frames and their wire encoding.

use anyhow::{anyhow, Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use std::time::Instant;

pub const DEFAULT_JPEG_QUALITY: u8 = 80;

/// One frame grabbed from a media stream.
pub struct CapturedFrame {
    image: RgbImage,
    /// Monotonic sequence number within the stream.
    pub sequence: u64,
    pub captured_at: Instant,
}

impl CapturedFrame {
    pub fn new(image: RgbImage, sequence: u64) -> Self {
        Self {
            image,
            sequence,
            captured_at: Instant::now(),
        }
    }

    /// Build from packed RGB24 bytes.
    pub fn from_rgb(pixels: Vec<u8>, width: u32, height: u32, sequence: u64) -> Result<Self> {
        let image = RgbImage::from_raw(width, height, pixels).ok_or_else(|| {
            anyhow!("frame buffer does not match {}x{} rgb24", width, height)
        })?;
        Ok(Self::new(image, sequence))
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn into_image(self) -> RgbImage {
        self.image
    }

    pub fn to_jpeg(&self, quality: u8) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity((self.width() * self.height() / 8) as usize);
        let mut encoder = JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100));
        encoder
            .encode_image(&self.image)
            .context("encode frame as jpeg")?;
        Ok(out)
    }

    /// Base64 JPEG payload as carried in `frame` messages.
    pub fn to_base64_jpeg(&self, quality: u8) -> Result<String> {
        Ok(STANDARD.encode(self.to_jpeg(quality)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_decodable_jpeg() -> Result<()> {
        let frame = CapturedFrame::new(RgbImage::from_pixel(32, 16, image::Rgb([10, 200, 30])), 1);
        let payload = frame.to_base64_jpeg(DEFAULT_JPEG_QUALITY)?;
        let bytes = STANDARD.decode(payload)?;
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
        let decoded = image::load_from_memory(&bytes)?;
        assert_eq!((decoded.width(), decoded.height()), (32, 16));
        Ok(())
    }

    #[test]
    fn rejects_mismatched_buffer() {
        assert!(CapturedFrame::from_rgb(vec![0; 10], 4, 4, 0).is_err());
    }
}
