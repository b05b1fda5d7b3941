//! Per-page transforms: one page in, one [`PageArtifact`] out.
//!
//! The pipeline knows nothing about PDFs. It hands each worker a
//! [`PageIndex`] and a worker-owned scratch value, and expects an artifact
//! back. Concrete transforms:
//!
//! * [`RasterTransform`] — render → draw onto the worker's [`Canvas`] →
//!   JPEG/PNG encode. Used by compress, flatten and image export.
//! * [`OcrTransform`] — render → PNG → [`OcrEngine`] → text.
//!
//! Tests and callers with their own page logic use [`transform_fn`].

pub mod encode;
pub mod ocr;
pub mod raster;

pub use encode::{Canvas, ImageEncoding};
pub use ocr::{OcrEngine, OcrTransform, TesseractEngine};
pub use raster::RasterTransform;

use crate::error::PageError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;

/// 1-based position of a page within a run, in `1..=N`.
pub type PageIndex = usize;

/// Page size in output units (PDF points for documents, pixels for images).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageGeometry {
    pub width: f32,
    pub height: f32,
}

impl PageGeometry {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

/// Payload format of an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArtifactKind {
    Jpeg,
    Png,
    Text,
}

impl ArtifactKind {
    /// File extension used when the artifact is written on its own.
    pub fn extension(&self) -> &'static str {
        match self {
            ArtifactKind::Jpeg => "jpg",
            ArtifactKind::Png => "png",
            ArtifactKind::Text => "txt",
        }
    }
}

/// The result of transforming one page. Produced exactly once per index.
#[derive(Clone, PartialEq)]
pub struct PageArtifact {
    /// Position in the run (drives ordering).
    pub index: PageIndex,
    /// 1-indexed page number in the source document.
    pub source_page: usize,
    pub kind: ArtifactKind,
    pub bytes: Vec<u8>,
    pub geometry: PageGeometry,
}

impl PageArtifact {
    /// Artifact whose source page equals its run index.
    pub fn new(index: PageIndex, kind: ArtifactKind, bytes: Vec<u8>, geometry: PageGeometry) -> Self {
        Self {
            index,
            source_page: index,
            kind,
            bytes,
            geometry,
        }
    }

    pub fn with_source_page(mut self, page: usize) -> Self {
        self.source_page = page;
        self
    }
}

impl std::fmt::Debug for PageArtifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageArtifact")
            .field("index", &self.index)
            .field("source_page", &self.source_page)
            .field("kind", &self.kind)
            .field("bytes", &format_args!("<{} bytes>", self.bytes.len()))
            .field("geometry", &self.geometry)
            .finish()
    }
}

/// Converts one page into an artifact.
///
/// Implementations must be callable concurrently for different indices.
/// Each worker creates one `Scratch` lazily before its first page and reuses
/// it for every page it handles; it is dropped when the worker exits.
#[async_trait]
pub trait PageTransform: Send + Sync + 'static {
    /// Worker-local reusable resource (drawing surface, buffers, …).
    type Scratch: Send + 'static;

    fn create_scratch(&self) -> Self::Scratch;

    async fn transform(
        &self,
        index: PageIndex,
        scratch: &mut Self::Scratch,
    ) -> Result<PageArtifact, PageError>;
}

/// A [`PageTransform`] backed by an async closure, without scratch state.
pub struct FnTransform<F> {
    f: F,
}

/// Wrap an async closure `Fn(PageIndex) -> Future<Output = Result<PageArtifact, PageError>>`.
pub fn transform_fn<F, Fut>(f: F) -> FnTransform<F>
where
    F: Fn(PageIndex) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<PageArtifact, PageError>> + Send + 'static,
{
    FnTransform { f }
}

#[async_trait]
impl<F, Fut> PageTransform for FnTransform<F>
where
    F: Fn(PageIndex) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<PageArtifact, PageError>> + Send + 'static,
{
    type Scratch = ();

    fn create_scratch(&self) {}

    async fn transform(&self, index: PageIndex, _scratch: &mut ()) -> Result<PageArtifact, PageError> {
        (self.f)(index).await
    }
}
