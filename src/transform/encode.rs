//! Image encoding: rendered page → JPEG/PNG bytes via a reusable [`Canvas`].
//!
//! pdfium renders into RGBA. Neither JPEG nor the PDF image XObjects we emit
//! carry alpha, so every page is first composited onto a white RGB canvas.
//! Each worker owns one canvas for its whole lifetime; the pixel and output
//! buffers are resized in place, so a run over hundreds of same-sized pages
//! allocates them once per worker.

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{DynamicImage, ExtendedColorType, ImageEncoder};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::ArtifactKind;

/// Target encoding for a rasterised page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageEncoding {
    /// Lossy, small. `quality` in 1–100.
    Jpeg { quality: u8 },
    /// Lossless.
    Png,
}

impl ImageEncoding {
    pub fn artifact_kind(&self) -> ArtifactKind {
        match self {
            ImageEncoding::Jpeg { .. } => ArtifactKind::Jpeg,
            ImageEncoding::Png => ArtifactKind::Png,
        }
    }
}

/// Worker-owned RGB drawing surface plus encoder output buffer.
#[derive(Debug, Default)]
pub struct Canvas {
    pixels: Vec<u8>,
    width: u32,
    height: u32,
    encoded: Vec<u8>,
    resizes: usize,
}

impl Canvas {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// How many times the surface changed size. Diagnostic only.
    pub fn resizes(&self) -> usize {
        self.resizes
    }

    /// Composite `image` over white onto the canvas, resizing it if needed.
    pub fn paint(&mut self, image: &DynamicImage) {
        let (width, height) = (image.width(), image.height());
        if (width, height) != (self.width, self.height) {
            self.width = width;
            self.height = height;
            self.resizes += 1;
        }
        let len = width as usize * height as usize * 3;
        self.pixels.clear();
        self.pixels.reserve(len);

        match image {
            DynamicImage::ImageRgba8(rgba) => {
                for px in rgba.pixels() {
                    let [r, g, b, a] = px.0;
                    self.pixels
                        .extend_from_slice(&[over_white(r, a), over_white(g, a), over_white(b, a)]);
                }
            }
            DynamicImage::ImageRgb8(rgb) => self.pixels.extend_from_slice(rgb.as_raw()),
            other => {
                let rgba = other.to_rgba8();
                for px in rgba.pixels() {
                    let [r, g, b, a] = px.0;
                    self.pixels
                        .extend_from_slice(&[over_white(r, a), over_white(g, a), over_white(b, a)]);
                }
            }
        }
    }

    /// Encode the current surface and return a copy of the encoded bytes.
    pub fn encode(&mut self, encoding: ImageEncoding) -> Result<Vec<u8>, image::ImageError> {
        self.encoded.clear();
        match encoding {
            ImageEncoding::Jpeg { quality } => {
                JpegEncoder::new_with_quality(&mut self.encoded, quality.clamp(1, 100)).write_image(
                    &self.pixels,
                    self.width,
                    self.height,
                    ExtendedColorType::Rgb8,
                )?;
            }
            ImageEncoding::Png => {
                PngEncoder::new(&mut self.encoded).write_image(
                    &self.pixels,
                    self.width,
                    self.height,
                    ExtendedColorType::Rgb8,
                )?;
            }
        }
        debug!(
            "Encoded {}x{} canvas → {} bytes ({:?})",
            self.width,
            self.height,
            self.encoded.len(),
            encoding
        );
        Ok(self.encoded.clone())
    }
}

fn over_white(channel: u8, alpha: u8) -> u8 {
    let a = alpha as u16;
    ((channel as u16 * a + 255 * (255 - a) + 127) / 255) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn solid(w: u32, h: u32, px: [u8; 4]) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(w, h, Rgba(px)))
    }

    #[test]
    fn transparent_pixels_become_white() {
        let mut canvas = Canvas::new();
        canvas.paint(&solid(2, 2, [0, 0, 0, 0]));
        assert_eq!(canvas.pixels, vec![255; 12]);
        canvas.paint(&solid(1, 1, [10, 20, 30, 255]));
        assert_eq!(canvas.pixels, vec![10, 20, 30]);
    }

    #[test]
    fn canvas_reuses_buffer_for_same_size() {
        let mut canvas = Canvas::new();
        canvas.paint(&solid(40, 30, [255, 0, 0, 255]));
        let cap = canvas.pixels.capacity();
        canvas.paint(&solid(40, 30, [0, 255, 0, 255]));
        assert_eq!(canvas.pixels.capacity(), cap);
        assert_eq!(canvas.resizes(), 1);

        canvas.paint(&solid(20, 10, [0, 0, 255, 255]));
        assert_eq!(canvas.dimensions(), (20, 10));
        assert_eq!(canvas.resizes(), 2);
        // Shrinking keeps the larger allocation.
        assert_eq!(canvas.pixels.capacity(), cap);
    }

    #[test]
    fn encodes_jpeg_and_png() {
        let mut canvas = Canvas::new();
        canvas.paint(&solid(16, 8, [200, 100, 50, 255]));

        let jpeg = canvas.encode(ImageEncoding::Jpeg { quality: 70 }).unwrap();
        assert_eq!(&jpeg[..3], &[0xFF, 0xD8, 0xFF]);

        let png = canvas.encode(ImageEncoding::Png).unwrap();
        assert_eq!(&png[..8], &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]);

        let decoded = image::load_from_memory(&png).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (16, 8));
    }
}
