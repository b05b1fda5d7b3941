//! Plain-text output for OCR runs.

use super::OutputAssembler;
use crate::config::PageSeparator;
use crate::error::PipelineError;
use crate::transform::{ArtifactKind, PageArtifact};

/// Concatenates text artifacts, inserting the separator before every page
/// except the first emitted one.
#[derive(Debug, Default)]
pub struct TextAssembler {
    separator: PageSeparator,
    out: String,
    pages: usize,
}

impl TextAssembler {
    pub fn new(separator: PageSeparator) -> Self {
        Self {
            separator,
            out: String::new(),
            pages: 0,
        }
    }
}

impl OutputAssembler for TextAssembler {
    fn add_page(&mut self, artifact: PageArtifact) -> Result<(), PipelineError> {
        if artifact.kind != ArtifactKind::Text {
            return Err(PipelineError::Assembly(format!(
                "page {}: expected text, got {:?}",
                artifact.index, artifact.kind
            )));
        }
        let text = String::from_utf8(artifact.bytes).map_err(|e| {
            PipelineError::Assembly(format!("page {}: invalid UTF-8: {e}", artifact.index))
        })?;

        if self.pages > 0 {
            self.out.push_str(&self.separator.render(artifact.source_page));
        }
        self.out.push_str(text.trim_end());
        self.pages += 1;
        Ok(())
    }

    fn finish(self) -> Result<Vec<u8>, PipelineError> {
        Ok(self.out.into_bytes())
    }
}
