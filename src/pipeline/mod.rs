//! Bounded concurrent page pipeline.
//!
//! ## Data Flow
//!
//! ```text
//!             ┌──────────┐ pop  ┌──────────┐ transform ┌─────────────┐ drain ┌───────────┐
//!  1..=N ───▶ │WorkQueue │ ───▶ │ worker k │ ────────▶ │ Reassembly  │ ────▶ │ Assembler │ ──▶ bytes
//!             └──────────┘      └──────────┘  (any     │ BTreeMap +  │ (in   └───────────┘
//!                                 × min(W,N)   order)  │ cursor      │ order)
//!                                                      └─────────────┘
//! ```
//!
//! 1. [`queue`] — indices `1..=N`, popped smallest-first under a mutex
//! 2. workers — `min(W, N)` tokio tasks, each owning one transform scratch
//! 3. [`reassembly`] — ordered buffer + emit cursor; insert-and-drain,
//!    progress and assembler appends all happen under one lock
//!
//! The assembler is finalised only after every worker has exited and the
//! reassembly invariants hold, so callers never see a partial document.
//! Dropping the future returned by [`run`] aborts all workers.

pub mod queue;
pub mod reassembly;

use crate::assemble::OutputAssembler;
use crate::config::{FailurePolicy, PipelineConfig};
use crate::error::{PageError, PipelineError};
use crate::output::{RunOutput, RunStats};
use crate::progress::ProgressCallback;
use crate::transform::{PageArtifact, PageIndex, PageTransform};
use parking_lot::Mutex;
use queue::WorkQueue;
use reassembly::{Reassembly, Slot};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Per-run scheduling options.
#[derive(Clone)]
pub struct RunOptions {
    /// Worker-count hint W (≥ 1). The pool size is `min(W, N)`.
    pub workers: usize,
    pub policy: FailurePolicy,
    pub progress: Option<ProgressCallback>,
}

impl RunOptions {
    pub fn new(workers: usize) -> Self {
        Self {
            workers,
            policy: FailurePolicy::FailFast,
            progress: None,
        }
    }

    /// Options for a run over `total` pages, falling back to `default_policy`
    /// when the config does not override it.
    pub fn from_config(config: &PipelineConfig, total: usize, default_policy: FailurePolicy) -> Self {
        Self {
            workers: config.resolve_workers(total),
            policy: config.failure_policy.unwrap_or(default_policy),
            progress: config.progress_callback.clone(),
        }
    }

    pub fn policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn progress(mut self, cb: ProgressCallback) -> Self {
        self.progress = Some(cb);
        self
    }
}

impl std::fmt::Debug for RunOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunOptions")
            .field("workers", &self.workers)
            .field("policy", &self.policy)
            .field("progress", &self.progress.as_ref().map(|_| "<dyn PipelineProgress>"))
            .finish()
    }
}

/// Transform `total` pages with a bounded worker pool and assemble the
/// artifacts in ascending page order.
///
/// # Errors
/// * [`PipelineError::NoPagesProcessed`] — `total == 0`, or every page failed
///   under [`FailurePolicy::BestEffort`]
/// * [`PipelineError::PageTransform`] — a page failed under
///   [`FailurePolicy::FailFast`]
/// * [`PipelineError::Assembly`] — the assembler rejected a page or could not
///   serialise
/// * [`PipelineError::InvariantViolation`] — reassembly state inconsistent at
///   completion
pub async fn run<T, A>(
    total: usize,
    transform: T,
    assembler: A,
    options: RunOptions,
) -> Result<RunOutput, PipelineError>
where
    T: PageTransform,
    A: OutputAssembler,
{
    if total == 0 {
        return Err(PipelineError::NoPagesProcessed {
            total: 0,
            failed: 0,
        });
    }

    let started = Instant::now();
    let workers = options.workers.clamp(1, total);
    info!(
        "Starting pipeline: {} pages, {} workers, {:?}",
        total, workers, options.policy
    );

    if let Some(ref cb) = options.progress {
        cb.on_run_start(total);
    }

    let shared = Arc::new(Shared {
        queue: WorkQueue::new(total),
        state: Mutex::new(RunState {
            order: Reassembly::new(assembler),
            failures: Vec::new(),
            aborted: None,
        }),
        total,
        policy: options.policy,
        progress: options.progress.clone(),
    });
    let transform = Arc::new(transform);

    let mut pool = JoinSet::new();
    for worker_id in 0..workers {
        pool.spawn(worker_loop(
            worker_id,
            Arc::clone(&shared),
            Arc::clone(&transform),
        ));
    }

    while let Some(joined) = pool.join_next().await {
        if let Err(e) = joined {
            shared.abort(PipelineError::Internal(format!("worker task failed: {e}")));
        }
    }
    drop(transform);

    let shared = Arc::try_unwrap(shared).map_err(|_| {
        PipelineError::InvariantViolation("pipeline state still shared after workers exited".into())
    })?;
    let RunState {
        order,
        mut failures,
        aborted,
    } = shared.state.into_inner();

    if let Some(e) = aborted {
        warn!("Pipeline aborted: {}", e);
        return Err(e);
    }

    if let Err(e) = order.verify_drained(total) {
        error!("{}", e);
        return Err(e);
    }

    let emitted = order.emitted();
    let peak_buffered = order.peak_buffered();
    if emitted == 0 {
        return Err(PipelineError::NoPagesProcessed {
            total,
            failed: failures.len(),
        });
    }

    let assembler = order.into_assembler();
    let bytes = tokio::task::spawn_blocking(move || assembler.finish())
        .await
        .map_err(|e| PipelineError::Internal(format!("Assembler task panicked: {e}")))??;

    failures.sort_by_key(PageError::page);
    let stats = RunStats {
        total_pages: total,
        emitted_pages: emitted,
        failed_pages: failures.len(),
        workers,
        peak_buffered,
        duration_ms: started.elapsed().as_millis() as u64,
    };

    info!(
        "Pipeline complete: {}/{} pages, {} bytes, {}ms",
        emitted,
        total,
        bytes.len(),
        stats.duration_ms
    );

    if let Some(ref cb) = options.progress {
        cb.on_run_complete(total, emitted);
    }

    Ok(RunOutput {
        bytes,
        stats,
        failures,
    })
}

// ── Internal state ───────────────────────────────────────────────────────

struct Shared<A> {
    queue: WorkQueue,
    state: Mutex<RunState<A>>,
    total: usize,
    policy: FailurePolicy,
    progress: Option<ProgressCallback>,
}

struct RunState<A> {
    order: Reassembly<A>,
    failures: Vec<PageError>,
    /// First fatal error; once set, later results are discarded.
    aborted: Option<PipelineError>,
}

impl<A: OutputAssembler> Shared<A> {
    /// Record one finished transform. Lock order: state, then queue.
    fn complete(&self, index: PageIndex, result: Result<PageArtifact, PageError>) {
        let mut state = self.state.lock();
        if state.aborted.is_some() {
            debug!("Discarding page {} after abort", index);
            return;
        }

        let slot = match result {
            Ok(artifact) if artifact.index != index => {
                let e = PipelineError::InvariantViolation(format!(
                    "transform for page {index} returned artifact for page {}",
                    artifact.index
                ));
                self.abort_locked(&mut state, e);
                return;
            }
            Ok(artifact) => Slot::Ready(artifact),
            Err(e) => match self.policy {
                FailurePolicy::FailFast => {
                    warn!("Page {} failed, cancelling run: {}", index, e);
                    self.abort_locked(
                        &mut state,
                        PipelineError::PageTransform {
                            page: index,
                            source: e,
                        },
                    );
                    return;
                }
                FailurePolicy::BestEffort => {
                    warn!("Page {} failed, skipping: {}", index, e);
                    if let Some(ref cb) = self.progress {
                        cb.on_page_error(e.page(), self.total, &e.to_string());
                    }
                    state.failures.push(e);
                    Slot::Failed
                }
            },
        };

        match state.order.accept(index, slot) {
            Ok(completed) => {
                if let Some(ref cb) = self.progress {
                    cb.on_progress(completed, self.total);
                }
            }
            Err(e) => {
                error!("Reassembly failed at page {}: {}", index, e);
                self.abort_locked(&mut state, e);
            }
        }
    }

    fn abort(&self, e: PipelineError) {
        let mut state = self.state.lock();
        self.abort_locked(&mut state, e);
    }

    fn abort_locked(&self, state: &mut RunState<A>, e: PipelineError) {
        if state.aborted.is_none() {
            state.aborted = Some(e);
        }
        let cancelled = self.queue.close();
        if cancelled > 0 {
            debug!("Cancelled {} queued page(s)", cancelled);
        }
    }
}

async fn worker_loop<T, A>(worker_id: usize, shared: Arc<Shared<A>>, transform: Arc<T>)
where
    T: PageTransform,
    A: OutputAssembler,
{
    debug!("[worker-{}] started", worker_id);
    let mut scratch: Option<T::Scratch> = None;
    let mut handled = 0usize;

    while let Some(index) = shared.queue.pop() {
        let scratch = scratch.get_or_insert_with(|| transform.create_scratch());
        let result = transform.transform(index, scratch).await;
        shared.complete(index, result);
        handled += 1;
    }

    debug!("[worker-{}] exiting after {} page(s)", worker_id, handled);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assemble::TextAssembler;
    use crate::config::PageSeparator;
    use crate::transform::{transform_fn, ArtifactKind, PageGeometry};

    fn text_page(i: PageIndex) -> PageArtifact {
        PageArtifact::new(
            i,
            ArtifactKind::Text,
            format!("page{i}").into_bytes(),
            PageGeometry::new(100.0, 100.0),
        )
    }

    #[tokio::test]
    async fn zero_pages_is_an_error() {
        let t = transform_fn(|i| async move { Ok(text_page(i)) });
        let err = run(0, t, TextAssembler::new(PageSeparator::None), RunOptions::new(4))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::NoPagesProcessed { total: 0, failed: 0 }
        ));
    }

    #[tokio::test]
    async fn single_worker_runs_sequentially() {
        let t = transform_fn(|i| async move { Ok(text_page(i)) });
        let out = run(3, t, TextAssembler::new(PageSeparator::None), RunOptions::new(1))
            .await
            .unwrap();
        assert_eq!(out.bytes, b"page1\n\npage2\n\npage3");
        assert_eq!(out.stats.workers, 1);
        assert_eq!(out.stats.peak_buffered, 0);
    }

    #[tokio::test]
    async fn mismatched_artifact_index_aborts() {
        let t = transform_fn(|i| async move { Ok(text_page(i + 1)) });
        let err = run(2, t, TextAssembler::new(PageSeparator::None), RunOptions::new(1))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvariantViolation(_)));
    }

    #[test]
    fn options_from_config() {
        let config = PipelineConfig::builder()
            .workers(16)
            .failure_policy(FailurePolicy::BestEffort)
            .build()
            .unwrap();
        let opts = RunOptions::from_config(&config, 5, FailurePolicy::FailFast);
        assert_eq!(opts.workers, 5);
        assert_eq!(opts.policy, FailurePolicy::BestEffort);

        let opts = RunOptions::from_config(&PipelineConfig::default(), 5, FailurePolicy::FailFast);
        assert_eq!(opts.policy, FailurePolicy::FailFast);
    }
}
