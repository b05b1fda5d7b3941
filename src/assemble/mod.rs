//! Output assemblers: consume artifacts in page order, serialise once.
//!
//! | Assembler          | Artifacts      | Output                         |
//! |--------------------|----------------|--------------------------------|
//! | [`PdfAssembler`]   | JPEG / PNG     | one image-only PDF page each   |
//! | [`ZipAssembler`]   | any            | `page-NNN.<ext>` zip entries   |
//! | [`TextAssembler`]  | UTF-8 text     | pages joined by a separator    |

pub mod archive;
pub mod pdf;
pub mod text;

pub use archive::ZipAssembler;
pub use pdf::PdfAssembler;
pub use text::TextAssembler;

use crate::error::PipelineError;
use crate::transform::PageArtifact;

/// Receives page artifacts strictly in ascending index order.
///
/// `add_page` is called under the pipeline's reassembly lock, so it should
/// do bounded in-memory work only. `finish` runs on the blocking pool after
/// every page has been added and is never called on a failed run.
pub trait OutputAssembler: Send + 'static {
    fn add_page(&mut self, artifact: PageArtifact) -> Result<(), PipelineError>;

    fn finish(self) -> Result<Vec<u8>, PipelineError>;
}
