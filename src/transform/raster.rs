//! Render → paint → encode. Backs compress, flatten and image export.

use super::encode::{Canvas, ImageEncoding};
use super::{PageArtifact, PageIndex, PageTransform};
use crate::error::PageError;
use crate::source::{PdfSource, RenderSpec};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Rasterises selected source pages and encodes them as JPEG or PNG.
///
/// Run index `i` maps to source page `pages[i - 1]`, so a run over a page
/// selection still emits artifacts numbered `1..=N`.
pub struct RasterTransform {
    source: Arc<PdfSource>,
    pages: Arc<[usize]>,
    render: RenderSpec,
    encoding: ImageEncoding,
}

impl RasterTransform {
    pub fn new(
        source: Arc<PdfSource>,
        pages: Arc<[usize]>,
        render: RenderSpec,
        encoding: ImageEncoding,
    ) -> Self {
        Self {
            source,
            pages,
            render,
            encoding,
        }
    }
}

/// Look up the source page for run index `index`.
pub(crate) fn source_page(pages: &[usize], index: PageIndex) -> Result<usize, PageError> {
    index
        .checked_sub(1)
        .and_then(|i| pages.get(i).copied())
        .ok_or_else(|| PageError::TransformFailed {
            page: index,
            detail: format!("run index outside selection of {} pages", pages.len()),
        })
}

#[async_trait]
impl PageTransform for RasterTransform {
    type Scratch = Canvas;

    fn create_scratch(&self) -> Canvas {
        Canvas::new()
    }

    async fn transform(
        &self,
        index: PageIndex,
        canvas: &mut Canvas,
    ) -> Result<PageArtifact, PageError> {
        let page = source_page(&self.pages, index)?;
        let rendered = self
            .source
            .render(page, self.render)
            .await
            .map_err(|e| e.at_page(index))?;

        let geometry = rendered.geometry;

        // Pixel work runs on the blocking pool; the canvas travels with it.
        let encoding = self.encoding;
        let mut owned = std::mem::take(canvas);
        let (owned, encoded) = tokio::task::spawn_blocking(move || {
            owned.paint(&rendered.image);
            let encoded = owned.encode(encoding);
            (owned, encoded)
        })
        .await
        .map_err(|e| PageError::EncodeFailed {
            page: index,
            detail: format!("encode task panicked: {e}"),
        })?;
        *canvas = owned;

        let bytes = encoded.map_err(|e| PageError::EncodeFailed {
            page: index,
            detail: e.to_string(),
        })?;

        debug!(
            "Page {} (source {}) → {} bytes {:?}",
            index,
            page,
            bytes.len(),
            encoding
        );

        Ok(
            PageArtifact::new(index, encoding.artifact_kind(), bytes, geometry)
                .with_source_page(page),
        )
    }
}
