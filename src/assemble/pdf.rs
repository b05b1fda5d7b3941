//! Image-only PDF output: each artifact becomes one page whose MediaBox is
//! the source page size and whose content is a single full-page image.

use super::OutputAssembler;
use crate::error::PipelineError;
use crate::transform::{ArtifactKind, PageArtifact};
use image::codecs::jpeg::JpegDecoder;
use image::{ColorType, ImageDecoder};
use lopdf::{dictionary, Document, Object, Stream};
use std::io::{Cursor, Write};
use tracing::debug;

/// Builds a PDF from JPEG or PNG page images.
///
/// `add_page` only reads JPEG headers. PNG decoding, deflating and the
/// document build all happen in `finish`, off the reassembly lock.
#[derive(Default)]
pub struct PdfAssembler {
    pages: Vec<PendingPage>,
}

struct PendingPage {
    image: PageImage,
    width: f32,
    height: f32,
    source_page: usize,
}

enum PageImage {
    Jpeg(ImageXObject),
    Png(Vec<u8>),
}

impl PdfAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}

impl OutputAssembler for PdfAssembler {
    fn add_page(&mut self, artifact: PageArtifact) -> Result<(), PipelineError> {
        let image = match artifact.kind {
            ArtifactKind::Jpeg => PageImage::Jpeg(ImageXObject::from_jpeg(artifact.bytes)?),
            ArtifactKind::Png => PageImage::Png(artifact.bytes),
            ArtifactKind::Text => {
                return Err(PipelineError::Assembly(format!(
                    "page {}: text artifacts cannot be placed in a PDF",
                    artifact.index
                )))
            }
        };
        self.pages.push(PendingPage {
            image,
            width: artifact.geometry.width,
            height: artifact.geometry.height,
            source_page: artifact.source_page,
        });
        Ok(())
    }

    fn finish(self) -> Result<Vec<u8>, PipelineError> {
        if self.pages.is_empty() {
            return Err(PipelineError::NoPagesProcessed {
                total: 0,
                failed: 0,
            });
        }

        let mut document = Document::with_version("1.5");
        let pages_id = document.new_object_id();
        let mut kids: Vec<Object> = Vec::with_capacity(self.pages.len());

        for (position, page) in self.pages.into_iter().enumerate() {
            let image = match page.image {
                PageImage::Jpeg(image) => image,
                PageImage::Png(data) => ImageXObject::from_png(&data)
                    .map_err(|e| at_position(e, position + 1))?,
            };
            let (width, height) = (page.width, page.height);
            let (px_w, px_h) = (image.width, image.height);

            let image_id = document.add_object(image.into_stream());
            let content = format!("q {width} 0 0 {height} 0 0 cm /Im0 Do Q");
            let content_id = document.add_object(Stream::new(dictionary! {}, content.into_bytes()));

            let page_id = document.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Real(width),
                    Object::Real(height),
                ],
                "Resources" => dictionary! {
                    "XObject" => dictionary! { "Im0" => image_id },
                },
                "Contents" => content_id,
            });
            kids.push(page_id.into());

            debug!(
                "PDF page {} (source {}): {}x{} px image on {}x{} pt",
                position + 1,
                page.source_page,
                px_w,
                px_h,
                width,
                height
            );
        }

        let count = kids.len() as i64;
        document.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );
        let catalog_id = document.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        document.trailer.set("Root", catalog_id);
        document.compress();

        let mut buffer = Vec::new();
        document
            .save_to(&mut buffer)
            .map_err(|e| PipelineError::Assembly(format!("PDF serialisation failed: {e}")))?;
        Ok(buffer)
    }
}

fn at_position(err: PipelineError, position: usize) -> PipelineError {
    match err {
        PipelineError::Assembly(detail) => {
            PipelineError::Assembly(format!("output page {position}: {detail}"))
        }
        other => other,
    }
}

/// An image ready to be embedded as a PDF XObject.
struct ImageXObject {
    width: u32,
    height: u32,
    color_space: &'static str,
    filter: &'static str,
    data: Vec<u8>,
}

impl ImageXObject {
    /// JPEG data is embedded as-is under DCTDecode.
    fn from_jpeg(data: Vec<u8>) -> Result<Self, PipelineError> {
        let (width, height, color_type) = {
            let decoder = JpegDecoder::new(Cursor::new(data.as_slice()))
                .map_err(|e| PipelineError::Assembly(format!("Invalid JPEG: {e}")))?;
            let (w, h) = decoder.dimensions();
            (w, h, decoder.color_type())
        };
        let color_space = match color_type {
            ColorType::L8 | ColorType::L16 => "DeviceGray",
            _ => "DeviceRGB",
        };
        Ok(Self {
            width,
            height,
            color_space,
            filter: "DCTDecode",
            data,
        })
    }

    /// PNG data is decoded to RGB and re-compressed under FlateDecode.
    fn from_png(data: &[u8]) -> Result<Self, PipelineError> {
        let image = image::load_from_memory_with_format(data, image::ImageFormat::Png)
            .map_err(|e| PipelineError::Assembly(format!("Invalid PNG: {e}")))?
            .to_rgb8();
        let (width, height) = image.dimensions();

        let compress_err =
            |e: std::io::Error| PipelineError::Assembly(format!("Image compression failed: {e}"));
        let mut encoder =
            flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(image.as_raw()).map_err(compress_err)?;
        let data = encoder.finish().map_err(compress_err)?;

        Ok(Self {
            width,
            height,
            color_space: "DeviceRGB",
            filter: "FlateDecode",
            data,
        })
    }

    fn into_stream(self) -> Stream {
        let dict = dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => self.width as i64,
            "Height" => self.height as i64,
            "ColorSpace" => self.color_space,
            "BitsPerComponent" => 8i64,
            "Filter" => self.filter,
        };
        // Already compressed; Document::compress must leave it alone.
        Stream::new(dict, self.data).with_compression(false)
    }
}
