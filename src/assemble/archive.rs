//! Zip archive output for exported page images.

use super::OutputAssembler;
use crate::error::PipelineError;
use crate::transform::{ArtifactKind, PageArtifact};
use std::io::{Cursor, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

/// Writes each artifact as `page-NNN.<ext>`, numbered by source page.
///
/// Image payloads are stored as-is; text is deflated. Entry timestamps are
/// fixed so identical pages always produce identical archives.
pub struct ZipAssembler {
    zip: ZipWriter<Cursor<Vec<u8>>>,
    entries: usize,
}

impl Default for ZipAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl ZipAssembler {
    pub fn new() -> Self {
        Self {
            zip: ZipWriter::new(Cursor::new(Vec::new())),
            entries: 0,
        }
    }

    pub fn entry_name(artifact: &PageArtifact) -> String {
        format!(
            "page-{:03}.{}",
            artifact.source_page,
            artifact.kind.extension()
        )
    }

    pub fn entries(&self) -> usize {
        self.entries
    }
}

impl OutputAssembler for ZipAssembler {
    fn add_page(&mut self, artifact: PageArtifact) -> Result<(), PipelineError> {
        let method = match artifact.kind {
            ArtifactKind::Text => CompressionMethod::Deflated,
            ArtifactKind::Jpeg | ArtifactKind::Png => CompressionMethod::Stored,
        };
        let options = SimpleFileOptions::default()
            .compression_method(method)
            .last_modified_time(DateTime::default());
        let name = Self::entry_name(&artifact);

        self.zip
            .start_file(name.as_str(), options)
            .map_err(|e| PipelineError::Assembly(format!("zip entry {name}: {e}")))?;
        self.zip
            .write_all(&artifact.bytes)
            .map_err(|e| PipelineError::Assembly(format!("zip entry {name}: {e}")))?;
        self.entries += 1;
        Ok(())
    }

    fn finish(self) -> Result<Vec<u8>, PipelineError> {
        if self.entries == 0 {
            return Err(PipelineError::NoPagesProcessed {
                total: 0,
                failed: 0,
            });
        }
        self.zip
            .finish()
            .map(Cursor::into_inner)
            .map_err(|e| PipelineError::Assembly(format!("zip finalisation failed: {e}")))
    }
}
