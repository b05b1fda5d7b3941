//! Integration tests for the concurrent page pipeline.
//!
//! These drive `pdfbatch::run` with synthetic transforms (no pdfium needed)
//! and check ordering, bounded concurrency, progress and failure handling.

use async_trait::async_trait;
use parking_lot::Mutex;
use pdfbatch::transform::{Canvas, ImageEncoding};
use pdfbatch::{
    run, transform_fn, ArtifactKind, FailurePolicy, FractionProgress, OutputAssembler, PageArtifact,
    PageError, PageGeometry, PageIndex, PageSeparator, PageTransform, PdfAssembler,
    PipelineError, PipelineProgress, RunOptions, TextAssembler, ZipAssembler,
};
use rand::Rng;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

// ── Helpers ──────────────────────────────────────────────────────────────────

fn text_page(i: PageIndex) -> PageArtifact {
    PageArtifact::new(
        i,
        ArtifactKind::Text,
        format!("p{i}").into_bytes(),
        PageGeometry::new(612.0, 792.0),
    )
}

fn expected_text(pages: impl IntoIterator<Item = usize>) -> String {
    pages
        .into_iter()
        .map(|i| format!("p{i}"))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn text_assembler() -> TextAssembler {
    TextAssembler::new(PageSeparator::None)
}

fn failed(i: PageIndex) -> PageError {
    PageError::RenderFailed {
        page: i,
        detail: format!("page {i} is broken"),
    }
}

/// Records every progress event in call order.
#[derive(Default)]
struct Recorder {
    started: Mutex<Option<usize>>,
    progress: Mutex<Vec<(usize, usize)>>,
    errors: Mutex<Vec<usize>>,
    completed: Mutex<Option<(usize, usize)>>,
}

impl PipelineProgress for Recorder {
    fn on_run_start(&self, total_pages: usize) {
        *self.started.lock() = Some(total_pages);
    }

    fn on_progress(&self, completed: usize, total_pages: usize) {
        self.progress.lock().push((completed, total_pages));
    }

    fn on_page_error(&self, page_num: usize, _total: usize, _error: &str) {
        self.errors.lock().push(page_num);
    }

    fn on_run_complete(&self, total_pages: usize, emitted_pages: usize) {
        *self.completed.lock() = Some((total_pages, emitted_pages));
    }
}

/// Tracks how many transforms are running at once.
#[derive(Default)]
struct InFlight {
    now: AtomicUsize,
    peak: AtomicUsize,
    calls: AtomicUsize,
}

impl InFlight {
    fn enter(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.now.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.now.fetch_sub(1, Ordering::SeqCst);
    }
}

// ── Ordering ─────────────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn output_is_in_page_order_despite_random_latency() {
    for total in [1usize, 2, 50] {
        let t = transform_fn(|i| async move {
            let ms = rand::thread_rng().gen_range(0..15);
            tokio::time::sleep(Duration::from_millis(ms)).await;
            Ok(text_page(i))
        });
        let out = run(total, t, text_assembler(), RunOptions::new(8))
            .await
            .unwrap();

        assert_eq!(
            String::from_utf8(out.bytes).unwrap(),
            expected_text(1..=total),
            "N={total}"
        );
        assert_eq!(out.stats.emitted_pages, total);
        assert_eq!(out.stats.workers, total.min(8));
        assert!(out.failures.is_empty());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn later_pages_finishing_first_are_buffered_then_drained() {
    // N=5, W=2, page i takes (6 - i) * 20ms: results arrive roughly reversed.
    let recorder = Arc::new(Recorder::default());
    let t = transform_fn(|i| async move {
        tokio::time::sleep(Duration::from_millis((6 - i as u64) * 20)).await;
        Ok(text_page(i))
    });
    let out = run(
        5,
        t,
        text_assembler(),
        RunOptions::new(2).progress(recorder.clone()),
    )
    .await
    .unwrap();

    assert_eq!(String::from_utf8(out.bytes).unwrap(), expected_text(1..=5));
    assert!(out.stats.peak_buffered >= 1, "stats: {:?}", out.stats);
    assert_eq!(
        *recorder.progress.lock(),
        vec![(1, 5), (2, 5), (3, 5), (4, 5), (5, 5)]
    );
    assert_eq!(*recorder.started.lock(), Some(5));
    assert_eq!(*recorder.completed.lock(), Some((5, 5)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn repeated_runs_produce_identical_output() {
    let make = || {
        transform_fn(|i| async move {
            let ms = rand::thread_rng().gen_range(0..10);
            tokio::time::sleep(Duration::from_millis(ms)).await;
            Ok(text_page(i))
        })
    };
    let (a, b) = futures::future::join(
        run(30, make(), text_assembler(), RunOptions::new(3)),
        run(30, make(), text_assembler(), RunOptions::new(7)),
    )
    .await;
    assert_eq!(a.unwrap().bytes, b.unwrap().bytes);
}

// ── Concurrency bound ────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn in_flight_never_exceeds_worker_count() {
    for (total, workers) in [(20usize, 3usize), (2, 8)] {
        let gauge = Arc::new(InFlight::default());
        let g = gauge.clone();
        let t = transform_fn(move |i| {
            let g = g.clone();
            async move {
                g.enter();
                tokio::time::sleep(Duration::from_millis(5)).await;
                g.exit();
                Ok(text_page(i))
            }
        });
        run(total, t, text_assembler(), RunOptions::new(workers))
            .await
            .unwrap();

        let peak = gauge.peak.load(Ordering::SeqCst);
        assert!(peak <= workers.min(total), "peak {peak} for N={total} W={workers}");
        assert_eq!(gauge.calls.load(Ordering::SeqCst), total);
    }
}

/// A transform with worker-owned scratch: counts scratch creations.
struct CanvasTransform {
    scratches: Arc<AtomicUsize>,
}

#[async_trait]
impl PageTransform for CanvasTransform {
    type Scratch = Canvas;

    fn create_scratch(&self) -> Canvas {
        self.scratches.fetch_add(1, Ordering::SeqCst);
        Canvas::new()
    }

    async fn transform(
        &self,
        index: PageIndex,
        canvas: &mut Canvas,
    ) -> Result<PageArtifact, PageError> {
        // Alternate page sizes so the canvas has to resize in place.
        let (w, h) = if index % 2 == 0 { (40, 30) } else { (30, 40) };
        let image = image::DynamicImage::ImageRgba8(image::RgbaImage::from_pixel(
            w,
            h,
            image::Rgba([index as u8, 128, 255, 255]),
        ));
        canvas.paint(&image);
        let bytes = canvas
            .encode(ImageEncoding::Jpeg { quality: 60 })
            .map_err(|e| PageError::EncodeFailed {
                page: index,
                detail: e.to_string(),
            })?;
        tokio::task::yield_now().await;
        Ok(PageArtifact::new(
            index,
            ArtifactKind::Jpeg,
            bytes,
            PageGeometry::new(w as f32 * 2.0, h as f32 * 2.0),
        ))
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn scratch_is_created_at_most_once_per_worker() {
    let scratches = Arc::new(AtomicUsize::new(0));
    let t = CanvasTransform {
        scratches: scratches.clone(),
    };
    let out = run(12, t, PdfAssembler::new(), RunOptions::new(3))
        .await
        .unwrap();

    let created = scratches.load(Ordering::SeqCst);
    assert!((1..=3).contains(&created), "created {created} scratches");

    let doc = lopdf::Document::load_mem(&out.bytes).unwrap();
    assert_eq!(doc.get_pages().len(), 12);
}

// ── Progress ─────────────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn fraction_progress_is_monotonic_and_ends_at_one() {
    let seen = Arc::new(Mutex::new(Vec::<f64>::new()));
    let sink = seen.clone();
    let progress = Arc::new(FractionProgress::new(move |f| sink.lock().push(f)));

    let t = transform_fn(|i| async move {
        let ms = rand::thread_rng().gen_range(0..8);
        tokio::time::sleep(Duration::from_millis(ms)).await;
        Ok(text_page(i))
    });
    run(
        25,
        t,
        text_assembler(),
        RunOptions::new(6).progress(progress),
    )
    .await
    .unwrap();

    let seen = seen.lock();
    assert_eq!(seen.len(), 25);
    assert!(seen.windows(2).all(|w| w[0] < w[1]), "not monotonic: {seen:?}");
    assert_eq!(seen.last().copied(), Some(1.0));
}

#[tokio::test]
async fn empty_run_fires_no_progress() {
    let recorder = Arc::new(Recorder::default());
    let t = transform_fn(|i| async move { Ok(text_page(i)) });
    let err = run(
        0,
        t,
        text_assembler(),
        RunOptions::new(4).progress(recorder.clone()),
    )
    .await
    .unwrap_err();

    assert!(matches!(
        err,
        PipelineError::NoPagesProcessed { total: 0, failed: 0 }
    ));
    assert!(recorder.started.lock().is_none());
    assert!(recorder.progress.lock().is_empty());
}

// ── Failure policies ─────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn fail_fast_aborts_with_the_failing_page() {
    let gauge = Arc::new(InFlight::default());
    let g = gauge.clone();
    let t = transform_fn(move |i| {
        let g = g.clone();
        async move {
            g.enter();
            g.exit();
            if i == 2 {
                Err(failed(i))
            } else {
                Ok(text_page(i))
            }
        }
    });

    let err = run(
        3,
        t,
        text_assembler(),
        RunOptions::new(1).policy(FailurePolicy::FailFast),
    )
    .await
    .unwrap_err();

    match err {
        PipelineError::PageTransform { page, source } => {
            assert_eq!(page, 2);
            assert_eq!(source, failed(2));
        }
        other => panic!("expected PageTransform, got {other:?}"),
    }
    // One worker: page 3 is cancelled before it starts.
    assert_eq!(gauge.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn fail_fast_with_many_workers_still_reports_error() {
    let t = transform_fn(|i| async move {
        tokio::time::sleep(Duration::from_millis(2)).await;
        if i == 17 {
            Err(failed(i))
        } else {
            Ok(text_page(i))
        }
    });
    let err = run(40, t, text_assembler(), RunOptions::new(6))
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::PageTransform { page: 17, .. }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn best_effort_skips_failed_pages_in_order() {
    let recorder = Arc::new(Recorder::default());
    let t = transform_fn(|i| async move {
        let ms = rand::thread_rng().gen_range(0..10);
        tokio::time::sleep(Duration::from_millis(ms)).await;
        if i == 2 || i == 4 {
            Err(failed(i))
        } else {
            Ok(text_page(i))
        }
    });

    let out = run(
        5,
        t,
        text_assembler(),
        RunOptions::new(3)
            .policy(FailurePolicy::BestEffort)
            .progress(recorder.clone()),
    )
    .await
    .unwrap();

    assert_eq!(
        String::from_utf8(out.bytes).unwrap(),
        expected_text([1, 3, 5])
    );
    assert_eq!(out.stats.emitted_pages, 3);
    assert_eq!(out.stats.failed_pages, 2);
    let failed_pages: Vec<_> = out.failures.iter().map(PageError::page).collect();
    assert_eq!(failed_pages, vec![2, 4]);

    let mut errors = recorder.errors.lock().clone();
    errors.sort_unstable();
    assert_eq!(errors, vec![2, 4]);
    assert_eq!(recorder.progress.lock().last(), Some(&(5, 5)));
    assert_eq!(*recorder.completed.lock(), Some((5, 3)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn best_effort_with_every_page_failing_is_an_error() {
    let t = transform_fn(|i| async move { Err::<PageArtifact, _>(failed(i)) });
    let err = run(
        3,
        t,
        text_assembler(),
        RunOptions::new(2).policy(FailurePolicy::BestEffort),
    )
    .await
    .unwrap_err();
    assert!(matches!(
        err,
        PipelineError::NoPagesProcessed { total: 3, failed: 3 }
    ));
}

/// Rejects one page, to exercise assembler failures.
struct PickyAssembler {
    reject: PageIndex,
    finished: Arc<AtomicUsize>,
}

impl OutputAssembler for PickyAssembler {
    fn add_page(&mut self, artifact: PageArtifact) -> Result<(), PipelineError> {
        if artifact.index == self.reject {
            return Err(PipelineError::Assembly(format!(
                "page {} rejected",
                artifact.index
            )));
        }
        Ok(())
    }

    fn finish(self) -> Result<Vec<u8>, PipelineError> {
        self.finished.fetch_add(1, Ordering::SeqCst);
        Ok(Vec::new())
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn assembler_error_aborts_without_finishing() {
    let finished = Arc::new(AtomicUsize::new(0));
    let t = transform_fn(|i| async move { Ok(text_page(i)) });
    let err = run(
        6,
        t,
        PickyAssembler {
            reject: 4,
            finished: finished.clone(),
        },
        RunOptions::new(2).policy(FailurePolicy::BestEffort),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, PipelineError::Assembly(_)));
    assert_eq!(finished.load(Ordering::SeqCst), 0);
}

// ── Real assemblers ──────────────────────────────────────────────────────────

#[test]
fn zip_output_from_a_blocking_caller() {
    let t = transform_fn(|i| async move {
        Ok(PageArtifact::new(
            i,
            ArtifactKind::Png,
            vec![i as u8; 16],
            PageGeometry::new(10.0, 10.0),
        )
        .with_source_page(i + 10))
    });
    let out = tokio_test::block_on(run(4, t, ZipAssembler::new(), RunOptions::new(2))).unwrap();

    let archive = zip::ZipArchive::new(std::io::Cursor::new(out.bytes)).unwrap();
    let names: Vec<_> = archive.file_names().map(String::from).collect();
    let mut sorted = names.clone();
    sorted.sort();
    assert_eq!(
        sorted,
        vec!["page-011.png", "page-012.png", "page-013.png", "page-014.png"]
    );
}
