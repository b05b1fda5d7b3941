//! In-order reassembly of out-of-order page results.
//!
//! Results land in an ordered map keyed by page index. After every insert the
//! buffer is drained from the cursor: while the map holds `next_to_emit`, that
//! slot is removed, handed to the assembler, and the cursor advances. The
//! output therefore always holds pages `1..next_to_emit` with no gaps, and the
//! map only ever holds indices beyond the cursor.

use crate::assemble::OutputAssembler;
use crate::error::PipelineError;
use crate::transform::{PageArtifact, PageIndex};
use std::collections::BTreeMap;
use tracing::debug;

/// A finished page waiting for its turn.
#[derive(Debug)]
pub enum Slot {
    Ready(PageArtifact),
    /// Best-effort failure: the cursor steps over it without emitting.
    Failed,
}

#[derive(Debug)]
pub struct Reassembly<A> {
    buffer: BTreeMap<PageIndex, Slot>,
    next_to_emit: PageIndex,
    completed: usize,
    emitted: usize,
    peak_buffered: usize,
    assembler: A,
}

impl<A: OutputAssembler> Reassembly<A> {
    pub fn new(assembler: A) -> Self {
        Self {
            buffer: BTreeMap::new(),
            next_to_emit: 1,
            completed: 0,
            emitted: 0,
            peak_buffered: 0,
            assembler,
        }
    }

    /// Record the result for `index`, emit everything now contiguous with the
    /// cursor, and return the updated completion count.
    pub fn accept(&mut self, index: PageIndex, slot: Slot) -> Result<usize, PipelineError> {
        if index < self.next_to_emit || self.buffer.contains_key(&index) {
            return Err(PipelineError::InvariantViolation(format!(
                "page {index} delivered twice (cursor at {})",
                self.next_to_emit
            )));
        }
        self.buffer.insert(index, slot);

        while let Some(slot) = self.buffer.remove(&self.next_to_emit) {
            if let Slot::Ready(artifact) = slot {
                self.assembler.add_page(artifact)?;
                self.emitted += 1;
            }
            self.next_to_emit += 1;
        }

        if !self.buffer.is_empty() {
            debug!(
                "Holding {} page(s) ahead of cursor {}",
                self.buffer.len(),
                self.next_to_emit
            );
        }
        self.peak_buffered = self.peak_buffered.max(self.buffer.len());
        self.completed += 1;
        Ok(self.completed)
    }

    /// Check the end-of-run invariants: nothing left behind, cursor past the last page.
    pub fn verify_drained(&self, total: usize) -> Result<(), PipelineError> {
        if !self.buffer.is_empty() {
            let held: Vec<_> = self.buffer.keys().copied().collect();
            return Err(PipelineError::InvariantViolation(format!(
                "reassembly buffer still holds pages {held:?} (cursor at {})",
                self.next_to_emit
            )));
        }
        if self.next_to_emit != total + 1 {
            return Err(PipelineError::InvariantViolation(format!(
                "cursor at {} after {} pages",
                self.next_to_emit, total
            )));
        }
        Ok(())
    }

    pub fn next_to_emit(&self) -> PageIndex {
        self.next_to_emit
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn emitted(&self) -> usize {
        self.emitted
    }

    pub fn peak_buffered(&self) -> usize {
        self.peak_buffered
    }

    pub fn into_assembler(self) -> A {
        self.assembler
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::{ArtifactKind, PageGeometry};

    #[derive(Debug, Default)]
    struct Recorder {
        order: Vec<PageIndex>,
        reject: Option<PageIndex>,
    }

    impl OutputAssembler for Recorder {
        fn add_page(&mut self, artifact: PageArtifact) -> Result<(), PipelineError> {
            if self.reject == Some(artifact.index) {
                return Err(PipelineError::Assembly("rejected".into()));
            }
            self.order.push(artifact.index);
            Ok(())
        }

        fn finish(self) -> Result<Vec<u8>, PipelineError> {
            Ok(Vec::new())
        }
    }

    fn ready(i: PageIndex) -> Slot {
        Slot::Ready(PageArtifact::new(
            i,
            ArtifactKind::Text,
            vec![],
            PageGeometry::new(1.0, 1.0),
        ))
    }

    #[test]
    fn reverse_arrival_is_emitted_in_order() {
        let mut r = Reassembly::new(Recorder::default());
        for i in (1..=5).rev() {
            r.accept(i, ready(i)).unwrap();
            assert!(r.buffered() == 0 || r.next_to_emit() == 1);
        }
        assert_eq!(r.peak_buffered(), 4);
        r.verify_drained(5).unwrap();
        assert_eq!(r.into_assembler().order, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn buffer_only_holds_indices_past_cursor() {
        let mut r = Reassembly::new(Recorder::default());
        r.accept(3, ready(3)).unwrap();
        r.accept(1, ready(1)).unwrap();
        assert_eq!(r.next_to_emit(), 2);
        assert_eq!(r.buffered(), 1);
        assert!(r.verify_drained(3).is_err());
        r.accept(2, ready(2)).unwrap();
        assert_eq!(r.next_to_emit(), 4);
        r.verify_drained(3).unwrap();
    }

    #[test]
    fn failed_slots_are_skipped() {
        let mut r = Reassembly::new(Recorder::default());
        r.accept(2, Slot::Failed).unwrap();
        r.accept(3, ready(3)).unwrap();
        let completed = r.accept(1, ready(1)).unwrap();
        assert_eq!(completed, 3);
        assert_eq!(r.emitted(), 2);
        r.verify_drained(3).unwrap();
        assert_eq!(r.into_assembler().order, vec![1, 3]);
    }

    #[test]
    fn duplicate_delivery_is_an_invariant_violation() {
        let mut r = Reassembly::new(Recorder::default());
        r.accept(1, ready(1)).unwrap();
        assert!(matches!(
            r.accept(1, ready(1)),
            Err(PipelineError::InvariantViolation(_))
        ));
        r.accept(3, ready(3)).unwrap();
        assert!(matches!(
            r.accept(3, ready(3)),
            Err(PipelineError::InvariantViolation(_))
        ));
    }

    #[test]
    fn assembler_error_propagates() {
        let mut r = Reassembly::new(Recorder {
            reject: Some(2),
            ..Default::default()
        });
        r.accept(1, ready(1)).unwrap();
        assert!(matches!(
            r.accept(2, ready(2)),
            Err(PipelineError::Assembly(_))
        ));
    }

    #[test]
    fn cursor_mismatch_detected() {
        let r = Reassembly::new(Recorder::default());
        assert!(r.verify_drained(2).is_err());
        assert!(r.verify_drained(0).is_ok());
    }
}
