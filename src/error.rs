//! Error types for the pdfbatch library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`PipelineError`] — **Fatal**: the operation cannot produce an output
//!   (bad input file, wrong password, every page failed, assembler rejected a
//!   page). Returned as `Err(PipelineError)` from every entry point.
//!
//! * [`PageError`] — a single page failed to render, encode or be recognised.
//!   Under [`crate::config::FailurePolicy::FailFast`] the first one is wrapped
//!   in [`PipelineError::PageTransform`] and aborts the run; under
//!   [`crate::config::FailurePolicy::BestEffort`] it is recorded in
//!   [`crate::output::RunOutput::failures`] and the page slot is skipped.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the pdfbatch library.
#[derive(Debug, Error)]
pub enum PipelineError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The bytes were read, but they are not a PDF.
    #[error("Input '{origin}' is not a valid PDF\nFirst bytes: {magic:?}")]
    NotAPdf { origin: String, magic: [u8; 4] },

    // ── Source errors ─────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF is corrupt: {detail}\nTry repairing with: qpdf input.pdf output.pdf")]
    CorruptPdf { detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired,

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF")]
    WrongPassword,

    /// Selected page numbers fall outside the document.
    #[error("Page selection matches no pages (document has {total} pages)")]
    EmptySelection { total: usize },

    // ── Pipeline errors ───────────────────────────────────────────────────
    /// A page failed while the run was in fail-fast mode.
    #[error("Page {page} failed, aborting: {source}")]
    PageTransform {
        page: usize,
        #[source]
        source: PageError,
    },

    /// The run finished without emitting a single page, so no output
    /// document could be created.
    #[error("No pages processed ({failed}/{total} pages failed)")]
    NoPagesProcessed { total: usize, failed: usize },

    /// Reassembly state was inconsistent when the workers exited.
    ///
    /// This is a scheduler bug, never a data problem.
    #[error("Pipeline invariant violated: {0}")]
    InvariantViolation(String),

    /// The output assembler rejected a page or could not serialise.
    #[error("Failed to assemble output: {0}")]
    Assembly(String),

    // ── OCR errors ────────────────────────────────────────────────────────
    /// The OCR engine binary is missing or not runnable.
    #[error("OCR engine '{engine}' is not available.\n{hint}")]
    OcrEngineUnavailable { engine: String, hint: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Place libpdfium next to the executable, install it system-wide,\n\
or set PDFIUM_LIB_PATH=/path/to/libpdfium.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// `true` for errors raised before any worker started: the source could
    /// not be read, downloaded, or parsed.
    pub fn is_source_error(&self) -> bool {
        matches!(
            self,
            PipelineError::FileNotFound { .. }
                | PipelineError::PermissionDenied { .. }
                | PipelineError::InvalidInput { .. }
                | PipelineError::DownloadFailed { .. }
                | PipelineError::DownloadTimeout { .. }
                | PipelineError::NotAPdf { .. }
                | PipelineError::CorruptPdf { .. }
                | PipelineError::PasswordRequired
                | PipelineError::WrongPassword
        )
    }
}

/// A failure confined to a single page.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum PageError {
    /// Page rasterisation failed.
    #[error("Page {page}: rasterisation failed: {detail}")]
    RenderFailed { page: usize, detail: String },

    /// The rendered surface could not be encoded.
    #[error("Page {page}: image encoding failed: {detail}")]
    EncodeFailed { page: usize, detail: String },

    /// The OCR engine returned an error.
    #[error("Page {page}: text recognition failed: {detail}")]
    RecognitionFailed { page: usize, detail: String },

    /// Any other transform failure (custom transforms).
    #[error("Page {page}: {detail}")]
    TransformFailed { page: usize, detail: String },
}

impl PageError {
    /// The 1-indexed page the error belongs to.
    pub fn page(&self) -> usize {
        match self {
            PageError::RenderFailed { page, .. }
            | PageError::EncodeFailed { page, .. }
            | PageError::RecognitionFailed { page, .. }
            | PageError::TransformFailed { page, .. } => *page,
        }
    }

    /// Re-attribute the error to run index `index`.
    pub fn at_page(mut self, index: usize) -> Self {
        match &mut self {
            PageError::RenderFailed { page, .. }
            | PageError::EncodeFailed { page, .. }
            | PageError::RecognitionFailed { page, .. }
            | PageError::TransformFailed { page, .. } => *page = index,
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_pages_processed_display() {
        let e = PipelineError::NoPagesProcessed {
            total: 4,
            failed: 4,
        };
        let msg = e.to_string();
        assert!(msg.contains("No pages processed"), "got: {msg}");
        assert!(msg.contains("4/4"), "got: {msg}");
    }

    #[test]
    fn page_transform_wraps_page_error() {
        let e = PipelineError::PageTransform {
            page: 2,
            source: PageError::RenderFailed {
                page: 2,
                detail: "bad xobject".into(),
            },
        };
        assert!(e.to_string().contains("Page 2 failed"));
        let source = std::error::Error::source(&e).expect("has source");
        assert!(source.to_string().contains("bad xobject"));
    }

    #[test]
    fn page_error_reports_its_page() {
        let e = PageError::RecognitionFailed {
            page: 7,
            detail: "tesseract exited with 1".into(),
        };
        assert_eq!(e.page(), 7);
        assert_eq!(e.at_page(2).page(), 2);
    }

    #[test]
    fn source_errors_are_classified() {
        assert!(PipelineError::WrongPassword.is_source_error());
        assert!(PipelineError::CorruptPdf {
            detail: "xref".into()
        }
        .is_source_error());
        assert!(!PipelineError::InvariantViolation("x".into()).is_source_error());
    }

    #[test]
    fn page_error_serialises() {
        let e = PageError::EncodeFailed {
            page: 3,
            detail: "buffer size".into(),
        };
        let json = serde_json::to_string(&e).unwrap();
        assert!(json.contains("EncodeFailed"));
    }
}
