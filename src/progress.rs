//! Progress-callback trait for per-page pipeline events.
//!
//! Inject an [`Arc<dyn PipelineProgress>`] via
//! [`crate::config::PipelineConfigBuilder::progress_callback`] to receive
//! events as workers finish pages.
//!
//! # Ordering
//!
//! `on_progress` is invoked while the pipeline holds its reassembly lock, so
//! the reported `completed` counts are strictly increasing across calls and the
//! last call of a successful run always reports `completed == total`. Keep the
//! implementation cheap: forwarding to a channel or bumping a progress bar is
//! fine, blocking I/O is not.
//!
//! # Example
//!
//! ```rust
//! use pdfbatch::{FractionProgress, PipelineConfig, ProgressCallback};
//! use std::sync::Arc;
//!
//! let progress: ProgressCallback = Arc::new(FractionProgress::new(|fraction| {
//!     eprintln!("{:.0}%", fraction * 100.0);
//! }));
//!
//! let config = PipelineConfig::builder()
//!     .progress_callback(progress)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the pipeline as it processes each page.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
pub trait PipelineProgress: Send + Sync {
    /// Called once before any worker starts.
    fn on_run_start(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// Called after every completed page transform, emitted or buffered.
    ///
    /// # Arguments
    /// * `completed`   — pages finished so far (monotonic, ends at `total_pages`)
    /// * `total_pages` — pages in this run
    fn on_progress(&self, completed: usize, total_pages: usize) {
        let _ = (completed, total_pages);
    }

    /// Called when a page fails under the best-effort policy.
    fn on_page_error(&self, page_num: usize, total_pages: usize, error: &str) {
        let _ = (page_num, total_pages, error);
    }

    /// Called once after the output has been assembled.
    ///
    /// # Arguments
    /// * `total_pages`   — pages in this run
    /// * `emitted_pages` — pages that made it into the output
    fn on_run_complete(&self, total_pages: usize, emitted_pages: usize) {
        let _ = (total_pages, emitted_pages);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgress;

impl PipelineProgress for NoopProgress {}

/// Adapts a `Fn(f64)` receiving `completed / total` in `0.0..=1.0`.
pub struct FractionProgress<F> {
    on_fraction: F,
}

impl<F> FractionProgress<F>
where
    F: Fn(f64) + Send + Sync,
{
    pub fn new(on_fraction: F) -> Self {
        Self { on_fraction }
    }
}

impl<F> PipelineProgress for FractionProgress<F>
where
    F: Fn(f64) + Send + Sync,
{
    fn on_progress(&self, completed: usize, total_pages: usize) {
        (self.on_fraction)(fraction(completed, total_pages));
    }
}

/// `completed / total`, with an empty run counting as finished.
pub fn fraction(completed: usize, total: usize) -> f64 {
    if total == 0 {
        1.0
    } else {
        completed.min(total) as f64 / total as f64
    }
}

/// Convenience alias matching the type stored in [`crate::config::PipelineConfig`].
pub type ProgressCallback = Arc<dyn PipelineProgress>;

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgress;
        cb.on_run_start(5);
        cb.on_progress(1, 5);
        cb.on_page_error(2, 5, "some error");
        cb.on_run_complete(5, 4);
    }

    #[test]
    fn fraction_adapter_reports_ratio() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let cb = FractionProgress::new(move |f| sink.lock().push(f));

        cb.on_progress(1, 4);
        cb.on_progress(2, 4);
        cb.on_progress(4, 4);

        assert_eq!(*seen.lock(), vec![0.25, 0.5, 1.0]);
    }

    #[test]
    fn fraction_handles_empty_and_overflow() {
        assert_eq!(fraction(0, 0), 1.0);
        assert_eq!(fraction(7, 5), 1.0);
        assert_eq!(fraction(0, 3), 0.0);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgress);
        cb.on_run_start(10);
        cb.on_progress(1, 10);
    }
}
