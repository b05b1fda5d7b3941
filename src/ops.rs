//! Document operations built on the page pipeline.
//!
//! Every operation follows the same steps:
//!
//! 1. resolve the input to bytes (path, URL, or caller-supplied buffer)
//! 2. open the bytes on a [`PdfSource`] and expand the page selection
//! 3. build the operation's transform and assembler
//! 4. [`pipeline::run`] with the operation's failure policy
//!
//! | Operation        | Default DPI | Encoding  | Output | Policy      |
//! |------------------|-------------|-----------|--------|-------------|
//! | `Compress`       | 110         | JPEG q60  | PDF    | fail-fast   |
//! | `Flatten`        | 200         | JPEG q90  | PDF    | fail-fast   |
//! | `ExportImages`   | 150         | PNG       | zip    | best-effort |
//! | `Ocr`            | 300         | PNG → text| text   | best-effort |

use crate::assemble::{PdfAssembler, TextAssembler, ZipAssembler};
use crate::config::{
    ExportFormat, FailurePolicy, PageSelection, PipelineConfig, DEFAULT_DOWNLOAD_TIMEOUT_SECS,
};
use crate::error::PipelineError;
use crate::output::{DocumentMetadata, OperationOutput, OutputKind, RunOutput};
use crate::pipeline::{self, RunOptions};
use crate::source::{self, input::ensure_pdf_magic, PdfSource, RenderSpec};
use crate::transform::{
    ImageEncoding, OcrEngine, OcrTransform, RasterTransform, TesseractEngine,
};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// A page-batch operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operation {
    /// Re-render every page as a JPEG to shrink scanned or image-heavy PDFs.
    Compress,
    /// Burn form fields and annotations into page images.
    Flatten,
    /// One image per page, packed into a zip archive.
    ExportImages,
    /// Recognise page text and join it into one document.
    Ocr,
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Compress => "compress",
            Operation::Flatten => "flatten",
            Operation::ExportImages => "images",
            Operation::Ocr => "ocr",
        }
    }

    pub fn default_dpi(&self) -> u32 {
        match self {
            Operation::Compress => 110,
            Operation::Flatten => 200,
            Operation::ExportImages => 150,
            Operation::Ocr => 300,
        }
    }

    pub fn default_jpeg_quality(&self) -> u8 {
        match self {
            Operation::Flatten => 90,
            _ => 60,
        }
    }

    /// Document-producing operations must not silently drop pages, so they
    /// fail fast. Operations whose outputs are per-page collections keep
    /// going and report the gaps.
    pub fn default_policy(&self) -> FailurePolicy {
        match self {
            Operation::Compress | Operation::Flatten => FailurePolicy::FailFast,
            Operation::ExportImages | Operation::Ocr => FailurePolicy::BestEffort,
        }
    }

    pub fn output_kind(&self) -> OutputKind {
        match self {
            Operation::Compress | Operation::Flatten => OutputKind::Pdf,
            Operation::ExportImages => OutputKind::Zip,
            Operation::Ocr => OutputKind::Text,
        }
    }

    pub fn render_spec(&self, config: &PipelineConfig) -> RenderSpec {
        RenderSpec {
            dpi: config.dpi.unwrap_or_else(|| self.default_dpi()),
            max_pixels: config.max_rendered_pixels,
            include_forms: matches!(self, Operation::Compress | Operation::Flatten),
            include_annotations: matches!(self, Operation::Flatten),
        }
    }

    pub fn encoding(&self, config: &PipelineConfig) -> ImageEncoding {
        let jpeg = ImageEncoding::Jpeg {
            quality: config
                .jpeg_quality
                .unwrap_or_else(|| self.default_jpeg_quality()),
        };
        match self {
            Operation::Compress | Operation::Flatten => jpeg,
            Operation::ExportImages => match config.image_format.unwrap_or_default() {
                ExportFormat::Png => ImageEncoding::Png,
                ExportFormat::Jpeg => jpeg,
            },
            Operation::Ocr => ImageEncoding::Png,
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ── Entry points ─────────────────────────────────────────────────────────

/// Run `op` on a PDF file path or HTTP(S) URL.
///
/// # Errors
/// Source problems (missing file, not a PDF, wrong password) are reported
/// before any page work starts. See [`pipeline::run`] for run failures.
pub async fn process(
    input: impl AsRef<str>,
    op: Operation,
    config: &PipelineConfig,
) -> Result<OperationOutput, PipelineError> {
    let input = input.as_ref();
    info!("Starting {}: {}", op, input);
    let resolved = source::resolve_input(input, config.download_timeout_secs).await?;
    run_operation(resolved.bytes, op, config).await
}

/// Run `op` on PDF bytes already in memory.
///
/// # Example
/// ```rust,no_run
/// use pdfbatch::{process_bytes, Operation, PipelineConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let bytes = std::fs::read("scan.pdf")?;
/// let out = process_bytes(bytes, Operation::Compress, &PipelineConfig::default()).await?;
/// println!("{} → {} bytes", out.input_bytes, out.bytes.len());
/// # Ok(())
/// # }
/// ```
pub async fn process_bytes(
    bytes: Vec<u8>,
    op: Operation,
    config: &PipelineConfig,
) -> Result<OperationOutput, PipelineError> {
    ensure_pdf_magic("<memory>", &bytes)?;
    run_operation(bytes, op, config).await
}

pub async fn compress(
    input: impl AsRef<str>,
    config: &PipelineConfig,
) -> Result<OperationOutput, PipelineError> {
    process(input, Operation::Compress, config).await
}

pub async fn flatten(
    input: impl AsRef<str>,
    config: &PipelineConfig,
) -> Result<OperationOutput, PipelineError> {
    process(input, Operation::Flatten, config).await
}

pub async fn export_images(
    input: impl AsRef<str>,
    config: &PipelineConfig,
) -> Result<OperationOutput, PipelineError> {
    process(input, Operation::ExportImages, config).await
}

pub async fn ocr(
    input: impl AsRef<str>,
    config: &PipelineConfig,
) -> Result<OperationOutput, PipelineError> {
    process(input, Operation::Ocr, config).await
}

/// Run `op` and write the result to `output_path`.
///
/// The bytes go to a temporary file in the destination directory which is
/// renamed over `output_path` only once fully written, so a failed run never
/// leaves a truncated file behind.
pub async fn process_to_file(
    input: impl AsRef<str>,
    output_path: impl AsRef<Path>,
    op: Operation,
    config: &PipelineConfig,
) -> Result<OperationOutput, PipelineError> {
    let output = process(input, op, config).await?;
    let path = output_path.as_ref().to_path_buf();
    let bytes = output.bytes.clone();

    tokio::task::spawn_blocking(move || write_atomic(&path, &bytes))
        .await
        .map_err(|e| PipelineError::Internal(format!("Write task panicked: {e}")))??;
    Ok(output)
}

/// Synchronous wrapper around [`process`].
///
/// Creates a temporary tokio runtime internally.
pub fn process_sync(
    input: impl AsRef<str>,
    op: Operation,
    config: &PipelineConfig,
) -> Result<OperationOutput, PipelineError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| PipelineError::Internal(format!("Failed to create tokio runtime: {e}")))?
        .block_on(process(input, op, config))
}

/// Read document metadata without running the pipeline.
pub async fn inspect(
    input: impl AsRef<str>,
    password: Option<&str>,
) -> Result<DocumentMetadata, PipelineError> {
    let resolved =
        source::resolve_input(input.as_ref(), DEFAULT_DOWNLOAD_TIMEOUT_SECS).await?;
    let source = PdfSource::open(resolved.bytes, password.map(str::to_string)).await?;
    Ok(source.metadata().clone())
}

// ── Internal helpers ─────────────────────────────────────────────────────

async fn run_operation(
    bytes: Vec<u8>,
    op: Operation,
    config: &PipelineConfig,
) -> Result<OperationOutput, PipelineError> {
    let input_bytes = bytes.len();

    let engine = if op == Operation::Ocr {
        Some(resolve_ocr_engine(config).await?)
    } else {
        None
    };

    let source = Arc::new(PdfSource::open(bytes, config.password.clone()).await?);
    let metadata = source.metadata().clone();

    let pages = select_pages(&config.pages, source.page_count())?;
    let total = pages.len();
    debug!("{}: {} of {} pages selected", op, total, source.page_count());

    let options = RunOptions::from_config(config, total, op.default_policy());
    let render = op.render_spec(config);

    let run: RunOutput = match (op, engine) {
        (Operation::Ocr, Some(engine)) => {
            let transform = OcrTransform::new(
                Arc::clone(&source),
                pages,
                render,
                engine,
                config.ocr_language.clone(),
            );
            let assembler = TextAssembler::new(config.page_separator.clone());
            pipeline::run(total, transform, assembler, options).await?
        }
        (Operation::ExportImages, _) => {
            let transform =
                RasterTransform::new(Arc::clone(&source), pages, render, op.encoding(config));
            pipeline::run(total, transform, ZipAssembler::new(), options).await?
        }
        (Operation::Compress | Operation::Flatten, _) => {
            let transform =
                RasterTransform::new(Arc::clone(&source), pages, render, op.encoding(config));
            pipeline::run(total, transform, PdfAssembler::new(), options).await?
        }
        (Operation::Ocr, None) => {
            return Err(PipelineError::Internal("OCR engine not resolved".into()))
        }
    };

    info!(
        "{} finished: {} → {} bytes, {}/{} pages",
        op,
        input_bytes,
        run.bytes.len(),
        run.stats.emitted_pages,
        run.stats.total_pages
    );

    Ok(OperationOutput {
        bytes: run.bytes,
        kind: op.output_kind(),
        stats: run.stats,
        failures: run.failures,
        metadata,
        input_bytes,
    })
}

/// Expand the selection against the document.
///
/// A document without pages has nothing to process; a selection that misses
/// every page of a non-empty document is a caller error.
fn select_pages(
    selection: &PageSelection,
    page_count: usize,
) -> Result<Arc<[usize]>, PipelineError> {
    if page_count == 0 {
        return Err(PipelineError::NoPagesProcessed {
            total: 0,
            failed: 0,
        });
    }
    let pages = selection.to_page_numbers(page_count);
    if pages.is_empty() {
        return Err(PipelineError::EmptySelection { total: page_count });
    }
    Ok(pages.into())
}

async fn resolve_ocr_engine(config: &PipelineConfig) -> Result<Arc<dyn OcrEngine>, PipelineError> {
    let engine: Arc<dyn OcrEngine> = match config.ocr_engine {
        Some(ref engine) => Arc::clone(engine),
        None => Arc::new(TesseractEngine::new()),
    };
    if !engine.is_available().await {
        return Err(PipelineError::OcrEngineUnavailable {
            engine: engine.name().to_string(),
            hint: "Install tesseract (e.g. `apt install tesseract-ocr` or `brew install tesseract`) \
                   and make sure it is on PATH."
                .into(),
        });
    }
    Ok(engine)
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), PipelineError> {
    let write_err = |source: std::io::Error| PipelineError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(write_err)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(write_err)?;
    tmp.write_all(bytes).map_err(write_err)?;
    tmp.as_file().sync_all().map_err(write_err)?;
    tmp.persist(path).map_err(|e| write_err(e.error))?;
    debug!("Wrote {} bytes to {}", bytes.len(), path.display());
    Ok(())
}
