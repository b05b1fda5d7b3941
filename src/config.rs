//! Configuration types for page-batch operations.
//!
//! All behaviour is controlled through [`PipelineConfig`], built via its
//! [`PipelineConfigBuilder`]. Fields left as `None` fall back to the defaults
//! of the [`crate::ops::Operation`] being run, so a single config can drive
//! compression, flattening, image export and OCR.

use crate::error::PipelineError;
use crate::progress::ProgressCallback;
use crate::transform::OcrEngine;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Arc;

/// Worker count used when the platform cannot report its parallelism.
pub const FALLBACK_WORKERS: usize = 4;

/// HTTP download timeout for URL inputs, in seconds.
pub const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 120;

/// Configuration for one page-batch run.
///
/// # Example
/// ```rust
/// use pdfbatch::{FailurePolicy, PipelineConfig};
///
/// let config = PipelineConfig::builder()
///     .workers(4)
///     .dpi(150)
///     .failure_policy(FailurePolicy::FailFast)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Worker-count hint. `None` uses the platform's available parallelism
    /// (falling back to [`FALLBACK_WORKERS`]). The effective pool size is
    /// always `min(hint, pages)`.
    pub workers: Option<usize>,

    /// Override the operation's failure policy.
    pub failure_policy: Option<FailurePolicy>,

    /// Rendering DPI. Range: 72–600. `None` uses the operation default.
    pub dpi: Option<u32>,

    /// JPEG quality for raster outputs. Range: 1–100. `None` uses the operation default.
    pub jpeg_quality: Option<u8>,

    /// Image format for [`crate::ops::Operation::ExportImages`]. Default: PNG.
    pub image_format: Option<ExportFormat>,

    /// Maximum rendered image dimension (width or height) in pixels. Default: 4000.
    ///
    /// Caps the longest edge regardless of DPI so an A0 poster cannot
    /// exhaust memory.
    pub max_rendered_pixels: u32,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Page selection. Default: All pages.
    pub pages: PageSelection,

    /// Separator between pages of an OCR text output. Default: blank line.
    pub page_separator: PageSeparator,

    /// Tesseract language code(s), e.g. `eng` or `eng+deu`. Default: `eng`.
    pub ocr_language: String,

    /// Pre-constructed OCR engine. `None` uses the `tesseract` CLI.
    pub ocr_engine: Option<Arc<dyn OcrEngine>>,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Progress events receiver.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: None,
            failure_policy: None,
            dpi: None,
            jpeg_quality: None,
            image_format: None,
            max_rendered_pixels: 4000,
            password: None,
            pages: PageSelection::default(),
            page_separator: PageSeparator::default(),
            ocr_language: "eng".to_string(),
            ocr_engine: None,
            download_timeout_secs: DEFAULT_DOWNLOAD_TIMEOUT_SECS,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("workers", &self.workers)
            .field("failure_policy", &self.failure_policy)
            .field("dpi", &self.dpi)
            .field("jpeg_quality", &self.jpeg_quality)
            .field("image_format", &self.image_format)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("pages", &self.pages)
            .field("page_separator", &self.page_separator)
            .field("ocr_language", &self.ocr_language)
            .field("ocr_engine", &self.ocr_engine.as_ref().map(|e| e.name()))
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn PipelineProgress>"),
            )
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }

    /// Resolve the effective pool size for a run over `pages` pages.
    ///
    /// Never exceeds the page count; never below one.
    pub fn resolve_workers(&self, pages: usize) -> usize {
        let hint = self.workers.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(FALLBACK_WORKERS)
        });
        hint.min(pages).max(1)
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn workers(mut self, n: usize) -> Self {
        self.config.workers = Some(n);
        self
    }

    pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.config.failure_policy = Some(policy);
        self
    }

    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = Some(dpi);
        self
    }

    pub fn jpeg_quality(mut self, quality: u8) -> Self {
        self.config.jpeg_quality = Some(quality);
        self
    }

    pub fn image_format(mut self, format: ExportFormat) -> Self {
        self.config.image_format = Some(format);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn pages(mut self, selection: PageSelection) -> Self {
        self.config.pages = selection;
        self
    }

    pub fn page_separator(mut self, sep: PageSeparator) -> Self {
        self.config.page_separator = sep;
        self
    }

    pub fn ocr_language(mut self, lang: impl Into<String>) -> Self {
        self.config.ocr_language = lang.into();
        self
    }

    pub fn ocr_engine(mut self, engine: Arc<dyn OcrEngine>) -> Self {
        self.config.ocr_engine = Some(engine);
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, PipelineError> {
        let c = &self.config;
        if c.workers == Some(0) {
            return Err(PipelineError::InvalidConfig(
                "Worker count must be ≥ 1".into(),
            ));
        }
        if let Some(dpi) = c.dpi {
            if !(72..=600).contains(&dpi) {
                return Err(PipelineError::InvalidConfig(format!(
                    "DPI must be 72–600, got {dpi}"
                )));
            }
        }
        if let Some(q) = c.jpeg_quality {
            if !(1..=100).contains(&q) {
                return Err(PipelineError::InvalidConfig(format!(
                    "JPEG quality must be 1–100, got {q}"
                )));
            }
        }
        if c.ocr_language.trim().is_empty() {
            return Err(PipelineError::InvalidConfig(
                "OCR language must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// What a run does when a single page fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailurePolicy {
    /// The first page failure aborts the run: queued pages are cancelled,
    /// in-flight results are discarded, and the error is returned.
    FailFast,
    /// Failed pages are recorded and skipped; the output contains every page
    /// that succeeded, still in page order. Progress still reaches 100%.
    BestEffort,
}

/// Image container for exported pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ExportFormat {
    #[default]
    Png,
    Jpeg,
}

/// Specifies which pages of the PDF to process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageSelection {
    /// Process all pages (default).
    #[default]
    All,
    /// Process a single page (1-indexed).
    Single(usize),
    /// Process a contiguous range of pages (1-indexed, inclusive).
    Range(usize, usize),
    /// Process specific pages (1-indexed, deduplicated).
    Set(Vec<usize>),
}

impl PageSelection {
    /// Expand the selection into a sorted, deduplicated list of 1-indexed
    /// source page numbers that exist in a document of `total_pages` pages.
    pub fn to_page_numbers(&self, total_pages: usize) -> Vec<usize> {
        let mut pages: Vec<usize> = match self {
            PageSelection::All => (1..=total_pages).collect(),
            PageSelection::Single(p) => {
                if *p >= 1 && *p <= total_pages {
                    vec![*p]
                } else {
                    vec![]
                }
            }
            PageSelection::Range(start, end) => {
                let s = (*start).max(1);
                let e = (*end).min(total_pages);
                (s..=e).collect()
            }
            PageSelection::Set(pages) => pages
                .iter()
                .copied()
                .filter(|&p| p >= 1 && p <= total_pages)
                .collect(),
        };
        pages.sort_unstable();
        pages.dedup();
        pages
    }
}

/// How to separate pages in an assembled text output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageSeparator {
    /// Pages joined with a blank line. (default)
    #[default]
    None,
    /// Form feed between pages, like `pdftotext`.
    FormFeed,
    /// Marker line with the page number: "--- page N ---"
    Marker,
    /// Custom string inserted between pages.
    Custom(String),
}

impl PageSeparator {
    /// Render the separator placed before page `page_num` (1-indexed).
    pub fn render(&self, page_num: usize) -> String {
        match self {
            PageSeparator::None => "\n\n".to_string(),
            PageSeparator::FormFeed => "\n\u{000C}".to_string(),
            PageSeparator::Marker => format!("\n\n--- page {page_num} ---\n\n"),
            PageSeparator::Custom(s) => format!("\n\n{s}\n\n"),
        }
    }
}
