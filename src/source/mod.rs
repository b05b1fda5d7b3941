//! Page source: open PDF bytes with pdfium and render pages on request.
//!
//! ## Why a dedicated thread?
//!
//! `pdfium-render` wraps the pdfium C++ library, whose document handles
//! borrow the library binding and are not safe to share across async tasks.
//! [`PdfSource::open`] therefore moves the bytes onto one named OS thread that
//! binds pdfium, loads the document once, and then serves render requests
//! from a channel until the last [`PdfSource`] handle is dropped. Workers
//! call [`PdfSource::render`] concurrently; the source serialises the pdfium
//! calls and each caller suspends on its own reply channel, so no worker
//! blocks another while it waits.

pub mod engine;
pub mod input;

pub use input::{resolve_input, SourceBytes};

use crate::error::{PageError, PipelineError};
use crate::output::DocumentMetadata;
use crate::transform::PageGeometry;
use image::DynamicImage;
use pdfium_render::prelude::*;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

/// Render request queue depth per source.
const REQUEST_QUEUE: usize = 64;

/// How a page should be rasterised.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderSpec {
    /// Output DPI; 72 renders one pixel per PDF point.
    pub dpi: u32,
    /// Cap on the longest rendered edge in pixels.
    pub max_pixels: u32,
    /// Draw interactive form field values into the raster.
    pub include_forms: bool,
    /// Draw annotations (comments, stamps, highlights) into the raster.
    pub include_annotations: bool,
}

impl RenderSpec {
    pub fn scale(&self) -> f32 {
        self.dpi as f32 / 72.0
    }
}

/// A rasterised page plus its size in PDF points.
pub struct RenderedPage {
    pub image: DynamicImage,
    pub geometry: PageGeometry,
}

struct RenderRequest {
    page: usize,
    spec: RenderSpec,
    reply: oneshot::Sender<Result<RenderedPage, PageError>>,
}

/// Handle to a loaded PDF. Cheap to share behind an `Arc`.
pub struct PdfSource {
    metadata: DocumentMetadata,
    requests: mpsc::Sender<RenderRequest>,
}

impl PdfSource {
    /// Load `bytes` on the source thread.
    ///
    /// # Errors
    /// Binding failures, corrupt documents and password problems surface
    /// here, before any page work is scheduled.
    pub async fn open(bytes: Vec<u8>, password: Option<String>) -> Result<Self, PipelineError> {
        let (requests, mut inbox) = mpsc::channel::<RenderRequest>(REQUEST_QUEUE);
        let (ready_tx, ready_rx) = oneshot::channel::<Result<DocumentMetadata, PipelineError>>();

        std::thread::Builder::new()
            .name("pdf-source".into())
            .spawn(move || {
                let pdfium = match engine::bind_pdfium() {
                    Ok(p) => p,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                let document = match pdfium.load_pdf_from_byte_vec(bytes, password.as_deref()) {
                    Ok(doc) => doc,
                    Err(e) => {
                        let _ = ready_tx.send(Err(classify_load_error(&e, password.is_some())));
                        return;
                    }
                };

                if ready_tx.send(Ok(read_metadata(&document))).is_err() {
                    return;
                }

                while let Some(req) = inbox.blocking_recv() {
                    let result = render_blocking(&document, req.page, &req.spec);
                    // The worker may have been cancelled; nothing to do then.
                    let _ = req.reply.send(result);
                }
                debug!("pdf-source thread exiting");
            })
            .map_err(|e| PipelineError::Internal(format!("Failed to spawn source thread: {e}")))?;

        let metadata = ready_rx
            .await
            .map_err(|_| PipelineError::Internal("Source thread exited during load".into()))??;

        info!(
            "PDF loaded: {} pages (version {})",
            metadata.page_count, metadata.pdf_version
        );
        Ok(Self { metadata, requests })
    }

    pub fn page_count(&self) -> usize {
        self.metadata.page_count
    }

    pub fn metadata(&self) -> &DocumentMetadata {
        &self.metadata
    }

    /// Render source page `page` (1-indexed).
    pub async fn render(&self, page: usize, spec: RenderSpec) -> Result<RenderedPage, PageError> {
        let (reply, response) = oneshot::channel();
        let closed = || PageError::RenderFailed {
            page,
            detail: "page source closed".into(),
        };

        self.requests
            .send(RenderRequest { page, spec, reply })
            .await
            .map_err(|_| closed())?;
        response.await.map_err(|_| closed())?
    }
}

fn classify_load_error(e: &PdfiumError, had_password: bool) -> PipelineError {
    let err_str = format!("{e:?}");
    if err_str.contains("Password") || err_str.contains("password") {
        if had_password {
            PipelineError::WrongPassword
        } else {
            PipelineError::PasswordRequired
        }
    } else {
        PipelineError::CorruptPdf { detail: err_str }
    }
}

fn render_blocking(
    document: &PdfDocument<'_>,
    page: usize,
    spec: &RenderSpec,
) -> Result<RenderedPage, PageError> {
    let pages = document.pages();
    let total = pages.len() as usize;
    if page == 0 || page > total {
        warn!("Render request for page {} out of range (total={})", page, total);
        return Err(PageError::RenderFailed {
            page,
            detail: format!("out of range (document has {total} pages)"),
        });
    }

    let pdf_page = pages
        .get((page - 1) as u16)
        .map_err(|e| PageError::RenderFailed {
            page,
            detail: format!("{e:?}"),
        })?;

    let geometry = PageGeometry::new(pdf_page.width().value, pdf_page.height().value);

    let render_config = PdfRenderConfig::new()
        .scale_page_by_factor(spec.scale())
        .set_maximum_width(spec.max_pixels as i32)
        .set_maximum_height(spec.max_pixels as i32)
        .render_form_data(spec.include_forms)
        .render_annotations(spec.include_annotations);

    let bitmap = pdf_page
        .render_with_config(&render_config)
        .map_err(|e| PageError::RenderFailed {
            page,
            detail: format!("{e:?}"),
        })?;

    let image = bitmap.as_image();
    debug!(
        "Rendered page {} → {}x{} px",
        page,
        image.width(),
        image.height()
    );

    Ok(RenderedPage { image, geometry })
}

fn read_metadata(document: &PdfDocument<'_>) -> DocumentMetadata {
    let metadata = document.metadata();

    let get_meta = |tag: PdfDocumentMetadataTagType| -> Option<String> {
        metadata.get(tag).and_then(|t| {
            let v = t.value().to_string();
            if v.is_empty() {
                None
            } else {
                Some(v)
            }
        })
    };

    DocumentMetadata {
        title: get_meta(PdfDocumentMetadataTagType::Title),
        author: get_meta(PdfDocumentMetadataTagType::Author),
        subject: get_meta(PdfDocumentMetadataTagType::Subject),
        creator: get_meta(PdfDocumentMetadataTagType::Creator),
        producer: get_meta(PdfDocumentMetadataTagType::Producer),
        creation_date: get_meta(PdfDocumentMetadataTagType::CreationDate),
        modification_date: get_meta(PdfDocumentMetadataTagType::ModificationDate),
        page_count: document.pages().len() as usize,
        pdf_version: format!("{:?}", document.version()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_scale_from_dpi() {
        let spec = RenderSpec {
            dpi: 144,
            max_pixels: 2000,
            include_forms: true,
            include_annotations: false,
        };
        assert!((spec.scale() - 2.0).abs() < f32::EPSILON);
    }
}
