//! Result types returned by pipeline runs and operations.

use crate::error::PageError;
use serde::{Deserialize, Serialize};

/// What the core pipeline hands back after a successful run.
#[derive(Debug, Clone)]
pub struct RunOutput {
    /// Serialised output document.
    pub bytes: Vec<u8>,
    pub stats: RunStats,
    /// Pages skipped under the best-effort policy, in page order.
    pub failures: Vec<PageError>,
}

/// Counters collected during one pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    /// Work items in the run (N).
    pub total_pages: usize,
    /// Pages appended to the output.
    pub emitted_pages: usize,
    /// Pages recorded as failed (best-effort only).
    pub failed_pages: usize,
    /// Effective worker pool size, `min(W, N)`.
    pub workers: usize,
    /// Highest number of out-of-order results held at once.
    pub peak_buffered: usize,
    pub duration_ms: u64,
}

/// Kind of bytes an operation produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputKind {
    Pdf,
    Zip,
    Text,
}

impl OutputKind {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputKind::Pdf => "pdf",
            OutputKind::Zip => "zip",
            OutputKind::Text => "txt",
        }
    }

    pub fn media_type(&self) -> &'static str {
        match self {
            OutputKind::Pdf => "application/pdf",
            OutputKind::Zip => "application/zip",
            OutputKind::Text => "text/plain; charset=utf-8",
        }
    }
}

/// Result of a high-level operation such as [`crate::ops::compress`].
#[derive(Debug, Clone, Serialize)]
pub struct OperationOutput {
    #[serde(skip)]
    pub bytes: Vec<u8>,
    pub kind: OutputKind,
    pub stats: RunStats,
    pub failures: Vec<PageError>,
    pub metadata: DocumentMetadata,
    /// Size of the source document in bytes.
    pub input_bytes: usize,
}

impl OperationOutput {
    /// Output size relative to the input; below 1.0 means smaller.
    pub fn size_ratio(&self) -> f64 {
        if self.input_bytes == 0 {
            0.0
        } else {
            self.bytes.len() as f64 / self.input_bytes as f64
        }
    }
}

/// Document-level metadata read from the source PDF.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub creator: Option<String>,
    pub producer: Option<String>,
    pub creation_date: Option<String>,
    pub modification_date: Option<String>,
    pub page_count: usize,
    pub pdf_version: String,
}
