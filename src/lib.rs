//! # pdfbatch
//!
//! Page-at-a-time PDF tools (compress, flatten, image export, OCR) on top of
//! a bounded concurrent page pipeline.
//!
//! ## Why a pipeline?
//!
//! Rasterising, encoding and recognising pages is CPU-heavy and independent
//! per page, but every output format needs the pages back in document order.
//! The pipeline runs a fixed pool of workers over the page indices, buffers
//! results that finish early, and appends them to the output strictly in
//! order as soon as the next expected page is ready. Memory stays bounded by
//! the pages that finished ahead of the slowest one.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input      resolve local file or download from URL
//!  ├─ 2. Source     load once with pdfium on a dedicated thread
//!  ├─ 3. Workers    min(W, N) tasks: render → encode (→ OCR), any order
//!  ├─ 4. Reassembly ordered buffer + cursor, emits pages 1..=N in order
//!  └─ 5. Output     PDF / zip / text assembled once all pages are in
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdfbatch::{compress, PipelineConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PipelineConfig::builder().workers(4).build()?;
//!     let output = compress("scan.pdf", &config).await?;
//!     std::fs::write("scan.small.pdf", &output.bytes)?;
//!     eprintln!("{:.0}% of original size", output.size_ratio() * 100.0);
//!     Ok(())
//! }
//! ```
//!
//! Custom per-page work plugs into [`pipeline::run`] through
//! [`PageTransform`] and [`OutputAssembler`].
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdfbatch` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! pdfbatch = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod assemble;
pub mod config;
pub mod error;
pub mod ops;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod source;
pub mod transform;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use assemble::{OutputAssembler, PdfAssembler, TextAssembler, ZipAssembler};
pub use config::{
    ExportFormat, FailurePolicy, PageSelection, PageSeparator, PipelineConfig,
    PipelineConfigBuilder,
};
pub use error::{PageError, PipelineError};
pub use ops::{
    compress, export_images, flatten, inspect, ocr, process, process_bytes, process_sync,
    process_to_file, Operation,
};
pub use output::{DocumentMetadata, OperationOutput, OutputKind, RunOutput, RunStats};
pub use pipeline::{run, RunOptions};
pub use progress::{FractionProgress, NoopProgress, PipelineProgress, ProgressCallback};
pub use transform::{
    transform_fn, ArtifactKind, OcrEngine, PageArtifact, PageGeometry, PageIndex, PageTransform,
    TesseractEngine,
};
