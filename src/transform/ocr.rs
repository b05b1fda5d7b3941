//! OCR transform: render a page to PNG and hand it to an [`OcrEngine`].

use super::encode::{Canvas, ImageEncoding};
use super::raster::source_page;
use super::{ArtifactKind, PageArtifact, PageIndex, PageTransform};
use crate::error::PageError;
use crate::source::{PdfSource, RenderSpec};
use async_trait::async_trait;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

/// Text recognition backend.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Short identifier used in logs and errors.
    fn name(&self) -> &str;

    /// Whether the engine can be used on this host.
    async fn is_available(&self) -> bool;

    /// Recognise the text in one PNG image.
    async fn recognize(&self, png: &[u8], language: &str) -> Result<String, String>;
}

/// Runs the `tesseract` CLI, piping the image through stdin and reading
/// plain text from stdout.
#[derive(Debug, Clone)]
pub struct TesseractEngine {
    binary: String,
}

impl Default for TesseractEngine {
    fn default() -> Self {
        Self {
            binary: "tesseract".to_string(),
        }
    }
}

impl TesseractEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific tesseract executable.
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

#[async_trait]
impl OcrEngine for TesseractEngine {
    fn name(&self) -> &str {
        "tesseract"
    }

    async fn is_available(&self) -> bool {
        Command::new(&self.binary)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }

    async fn recognize(&self, png: &[u8], language: &str) -> Result<String, String> {
        let mut child = Command::new(&self.binary)
            .args(["stdin", "stdout", "-l", language, "--psm", "3"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| format!("Failed to run {}: {e}", self.binary))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| "tesseract stdin unavailable".to_string())?;
        let image = png.to_vec();
        // Feed stdin concurrently so a full stdout pipe cannot stall the write.
        let feeder = tokio::spawn(async move {
            let written = stdin.write_all(&image).await;
            drop(stdin);
            written
        });

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| format!("tesseract did not complete: {e}"))?;
        match feeder.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(format!("Failed to send image to tesseract: {e}")),
            Err(e) => return Err(format!("stdin task failed: {e}")),
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(format!("Tesseract failed ({}): {}", output.status, stderr.trim()));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Render → PNG → recognise. Produces one text artifact per page.
pub struct OcrTransform {
    source: Arc<PdfSource>,
    pages: Arc<[usize]>,
    render: RenderSpec,
    engine: Arc<dyn OcrEngine>,
    language: String,
}

impl OcrTransform {
    pub fn new(
        source: Arc<PdfSource>,
        pages: Arc<[usize]>,
        render: RenderSpec,
        engine: Arc<dyn OcrEngine>,
        language: impl Into<String>,
    ) -> Self {
        Self {
            source,
            pages,
            render,
            engine,
            language: language.into(),
        }
    }
}

#[async_trait]
impl PageTransform for OcrTransform {
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

        let mut owned = std::mem::take(canvas);
        let (owned, png) = tokio::task::spawn_blocking(move || {
            owned.paint(&rendered.image);
            let png = owned.encode(ImageEncoding::Png);
            (owned, png)
        })
        .await
        .map_err(|e| PageError::EncodeFailed {
            page: index,
            detail: format!("encode task panicked: {e}"),
        })?;
        *canvas = owned;

        let png = png.map_err(|e| PageError::EncodeFailed {
            page: index,
            detail: e.to_string(),
        })?;

        let text = self
            .engine
            .recognize(&png, &self.language)
            .await
            .map_err(|detail| {
                warn!("{} failed on page {}: {}", self.engine.name(), page, detail);
                PageError::RecognitionFailed {
                    page: index,
                    detail,
                }
            })?;

        debug!("OCR page {} (source {}): {} chars", index, page, text.len());
        Ok(
            PageArtifact::new(index, ArtifactKind::Text, text.into_bytes(), geometry)
                .with_source_page(page),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_binary_is_unavailable() {
        let engine = TesseractEngine::with_binary("/nonexistent/tesseract-binary");
        assert!(!engine.is_available().await);
        let err = engine.recognize(&[], "eng").await.unwrap_err();
        assert!(err.contains("Failed to run"), "got: {err}");
    }

    #[test]
    fn default_binary_name() {
        let engine = TesseractEngine::new();
        assert_eq!(engine.name(), "tesseract");
        assert_eq!(engine.binary, "tesseract");
    }
}
