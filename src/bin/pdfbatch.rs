//! CLI binary for pdfbatch.
//!
//! A thin shim over the library crate that maps subcommands and flags
//! to `PipelineConfig` and reports results.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use pdfbatch::{
    inspect, process, process_to_file, ExportFormat, FailurePolicy, Operation, OperationOutput,
    PageSelection, PageSeparator, PipelineConfig, PipelineProgress, ProgressCallback,
};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Live progress bar. Pages are counted as they complete, in any order;
/// failures are logged above the bar.
struct CliProgressCallback {
    bar: ProgressBar,
    verb: &'static str,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new(verb: &'static str) -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Opening PDF…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            verb,
            errors: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix(self.verb);
        self.bar.reset_eta();
    }
}

impl PipelineProgress for CliProgressCallback {
    fn on_run_start(&self, total_pages: usize) {
        self.activate_bar(total_pages);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("{} {total_pages} pages…", self.verb))
        ));
    }

    fn on_progress(&self, completed: usize, _total: usize) {
        self.bar.set_position(completed as u64);
    }

    fn on_page_error(&self, page_num: usize, total: usize, error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);
        let msg: String = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}",
            red("✗"),
            page_num,
            total,
            red(&msg),
        ));
    }

    fn on_run_complete(&self, total_pages: usize, emitted_pages: usize) {
        self.bar.finish_and_clear();
        let failed = self.errors.load(Ordering::SeqCst);
        if failed == 0 {
            eprintln!(
                "{} {} pages processed",
                green("✔"),
                bold(&emitted_pages.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} pages processed  ({} failed)",
                cyan("⚠"),
                bold(&emitted_pages.to_string()),
                total_pages,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Shrink a scanned PDF (writes scan.compressed.pdf)
  pdfbatch compress scan.pdf

  # Flatten forms and annotations at 300 DPI
  pdfbatch flatten form.pdf --dpi 300 -o flat.pdf

  # Export pages 1-10 as JPEG into a zip
  pdfbatch images book.pdf --pages 1-10 --format jpeg -o pages.zip

  # OCR to stdout, German + English, form-feed between pages
  pdfbatch ocr scan.pdf --lang deu+eng --separator ff

  # Run statistics as JSON
  pdfbatch compress scan.pdf --json

  # Document metadata
  pdfbatch inspect report.pdf

ENVIRONMENT VARIABLES:
  PDFBATCH_WORKERS   Worker count (default: available CPU parallelism)
  PDFBATCH_PASSWORD  PDF user password
  PDFIUM_LIB_PATH    Path to libpdfium
  RUST_LOG           Log filter, overrides --verbose / --quiet
"#;

/// Page-at-a-time PDF tools: compress, flatten, image export and OCR.
#[derive(Parser, Debug)]
#[command(
    name = "pdfbatch",
    version,
    about = "Compress, flatten, export and OCR PDF pages concurrently",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "PDFBATCH_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "PDFBATCH_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Re-render pages as JPEG to reduce file size.
    Compress(RunArgs),
    /// Burn form fields and annotations into the page images.
    Flatten(RunArgs),
    /// Export each page as an image, packed into a zip archive.
    Images {
        #[command(flatten)]
        run: RunArgs,
        /// Image format inside the archive.
        #[arg(long, value_enum, default_value = "png")]
        format: FormatArg,
    },
    /// Recognise page text with tesseract.
    Ocr {
        #[command(flatten)]
        run: RunArgs,
        /// Tesseract language code(s), e.g. eng or deu+eng.
        #[arg(long, env = "PDFBATCH_OCR_LANG", default_value = "eng")]
        lang: String,
        /// Page separator: blank, ff, marker, or a custom string.
        #[arg(long, env = "PDFBATCH_SEPARATOR", default_value = "blank")]
        separator: String,
    },
    /// Print document metadata without processing pages.
    Inspect {
        /// Local PDF file path or HTTP/HTTPS URL.
        input: String,
        /// PDF user password for encrypted documents.
        #[arg(long, env = "PDFBATCH_PASSWORD")]
        password: Option<String>,
        /// Print metadata as JSON.
        #[arg(long)]
        json: bool,
    },
}

/// Flags shared by every page-processing subcommand.
#[derive(Args, Debug)]
struct RunArgs {
    /// Local PDF file path or HTTP/HTTPS URL.
    input: String,

    /// Output file. Defaults to `<input>.<operation>.<ext>` (stdout for ocr).
    #[arg(short, long, env = "PDFBATCH_OUTPUT")]
    output: Option<PathBuf>,

    /// Worker count (default: available CPU parallelism).
    #[arg(short, long, env = "PDFBATCH_WORKERS",
          value_parser = clap::value_parser!(u64).range(1..))]
    workers: Option<u64>,

    /// Rendering DPI (72–600). Default depends on the operation.
    #[arg(long, env = "PDFBATCH_DPI",
          value_parser = clap::value_parser!(u32).range(72..=600))]
    dpi: Option<u32>,

    /// JPEG quality (1–100). Default depends on the operation.
    #[arg(long, env = "PDFBATCH_QUALITY",
          value_parser = clap::value_parser!(u8).range(1..=100))]
    quality: Option<u8>,

    /// Page selection: all, 5, 3-15, or 1,3,5,7.
    #[arg(long, env = "PDFBATCH_PAGES", default_value = "all")]
    pages: String,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "PDFBATCH_PASSWORD")]
    password: Option<String>,

    /// Abort on the first failed page.
    #[arg(long, conflicts_with = "best_effort")]
    fail_fast: bool,

    /// Skip failed pages and keep going.
    #[arg(long)]
    best_effort: bool,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "PDFBATCH_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Print run statistics as JSON on stdout.
    #[arg(long)]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "PDFBATCH_NO_PROGRESS")]
    no_progress: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum FormatArg {
    Png,
    Jpeg,
}

impl From<FormatArg> for ExportFormat {
    fn from(v: FormatArg) -> Self {
        match v {
            FormatArg::Png => ExportFormat::Png,
            FormatArg::Jpeg => ExportFormat::Jpeg,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (op, run, extra) = match cli.command {
        Command::Inspect {
            input,
            password,
            json,
        } => {
            init_logging(cli.verbose, cli.quiet, false);
            return run_inspect(&input, password.as_deref(), json).await;
        }
        Command::Compress(run) => (Operation::Compress, run, Extra::None),
        Command::Flatten(run) => (Operation::Flatten, run, Extra::None),
        Command::Images { run, format } => (Operation::ExportImages, run, Extra::Images(format)),
        Command::Ocr {
            run,
            lang,
            separator,
        } => (Operation::Ocr, run, Extra::Ocr { lang, separator }),
    };

    // INFO logs are noise under a progress bar; the bar is the feedback.
    let show_progress = !cli.quiet && !run.no_progress && !run.json;
    init_logging(cli.verbose, cli.quiet, show_progress);

    let progress_cb: Option<ProgressCallback> = if show_progress {
        let verb = match op {
            Operation::Compress => "Compressing",
            Operation::Flatten => "Flattening",
            Operation::ExportImages => "Exporting",
            Operation::Ocr => "Recognising",
        };
        Some(CliProgressCallback::new(verb) as Arc<dyn PipelineProgress>)
    } else {
        None
    };

    let config = build_config(&run, &extra, progress_cb)?;

    let destination = match (&run.output, op) {
        (Some(path), _) => Some(path.clone()),
        (None, Operation::Ocr) => None,
        (None, _) => Some(default_output_path(&run.input, op)),
    };

    let output = match destination {
        Some(ref path) => process_to_file(&run.input, path, op, &config)
            .await
            .with_context(|| format!("{op} failed"))?,
        None => {
            let output = process(&run.input, op, &config)
                .await
                .with_context(|| format!("{op} failed"))?;
            if !run.json {
                write_stdout(&output.bytes)?;
            }
            output
        }
    };

    if run.json {
        let json = serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
        println!("{json}");
    } else if !cli.quiet {
        print_summary(&output, destination.as_deref(), show_progress);
    }

    Ok(())
}

enum Extra {
    None,
    Images(FormatArg),
    Ocr { lang: String, separator: String },
}

fn init_logging(verbose: bool, quiet: bool, show_progress: bool) {
    let filter = if verbose {
        "debug"
    } else if quiet || show_progress {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(io::stderr)
        .init();
}

async fn run_inspect(input: &str, password: Option<&str>, json: bool) -> Result<()> {
    let meta = inspect(input, password)
        .await
        .context("Failed to inspect PDF")?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&meta).context("Failed to serialize metadata")?
        );
        return Ok(());
    }

    let rows = [
        ("File", Some(input.to_string())),
        ("Title", meta.title.clone()),
        ("Author", meta.author.clone()),
        ("Subject", meta.subject.clone()),
        ("Pages", Some(meta.page_count.to_string())),
        ("PDF version", Some(meta.pdf_version.clone())),
        ("Producer", meta.producer.clone()),
        ("Creator", meta.creator.clone()),
    ];
    for (label, value) in rows {
        if let Some(value) = value {
            println!("{}  {value}", dim(&format!("{label:<12}")));
        }
    }
    Ok(())
}

/// Map CLI args to `PipelineConfig`.
fn build_config(
    run: &RunArgs,
    extra: &Extra,
    progress: Option<ProgressCallback>,
) -> Result<PipelineConfig> {
    let mut builder = PipelineConfig::builder()
        .pages(parse_pages(&run.pages)?)
        .download_timeout_secs(run.download_timeout);

    if let Some(w) = run.workers {
        builder = builder.workers(w as usize);
    }
    if let Some(dpi) = run.dpi {
        builder = builder.dpi(dpi);
    }
    if let Some(q) = run.quality {
        builder = builder.jpeg_quality(q);
    }
    if let Some(ref pwd) = run.password {
        builder = builder.password(pwd.clone());
    }
    if run.fail_fast {
        builder = builder.failure_policy(FailurePolicy::FailFast);
    } else if run.best_effort {
        builder = builder.failure_policy(FailurePolicy::BestEffort);
    }

    match extra {
        Extra::None => {}
        Extra::Images(format) => builder = builder.image_format((*format).into()),
        Extra::Ocr { lang, separator } => {
            builder = builder
                .ocr_language(lang.clone())
                .page_separator(parse_separator(separator));
        }
    }

    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// `scan.pdf` → `scan.compressed.pdf`, `scan.images.zip`, …
fn default_output_path(input: &str, op: Operation) -> PathBuf {
    let stem = Path::new(input.rsplit('/').next().unwrap_or(input))
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("output")
        .to_string();
    let suffix = match op {
        Operation::Compress => "compressed",
        Operation::Flatten => "flattened",
        Operation::ExportImages => "images",
        Operation::Ocr => "ocr",
    };
    PathBuf::from(format!(
        "{stem}.{suffix}.{}",
        op.output_kind().extension()
    ))
}

fn write_stdout(bytes: &[u8]) -> Result<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    handle
        .write_all(bytes)
        .context("Failed to write to stdout")?;
    if !bytes.ends_with(b"\n") {
        handle.write_all(b"\n").ok();
    }
    Ok(())
}

fn print_summary(output: &OperationOutput, destination: Option<&Path>, show_progress: bool) {
    let stats = &output.stats;
    if !show_progress {
        eprintln!(
            "Processed {}/{} pages in {}ms",
            stats.emitted_pages, stats.total_pages, stats.duration_ms
        );
        for failure in &output.failures {
            eprintln!("  {} {}", red("✗"), failure);
        }
    }
    if let Some(path) = destination {
        eprintln!(
            "{}  {} → {} bytes ({:.0}%)  →  {}",
            if stats.failed_pages == 0 {
                green("✔")
            } else {
                cyan("⚠")
            },
            output.input_bytes,
            output.bytes.len(),
            output.size_ratio() * 100.0,
            bold(&path.display().to_string()),
        );
    }
    eprintln!(
        "   {}",
        dim(&format!(
            "{} workers, peak {} buffered, {}ms",
            stats.workers, stats.peak_buffered, stats.duration_ms
        ))
    );
}

/// Parse `--pages` string into `PageSelection`.
fn parse_pages(s: &str) -> Result<PageSelection> {
    let s = s.trim().to_lowercase();
    if s == "all" {
        return Ok(PageSelection::All);
    }
    if let Some((from, to)) = s.split_once('-') {
        let (from, to) = (page_number(from)?, page_number(to)?);
        if from > to {
            anyhow::bail!("page range {from}-{to} runs backwards");
        }
        return Ok(PageSelection::Range(from, to));
    }
    if s.contains(',') {
        let pages = s.split(',').map(page_number).collect::<Result<Vec<_>>>()?;
        return Ok(PageSelection::Set(pages));
    }
    page_number(&s).map(PageSelection::Single)
}

/// One 1-based page number.
fn page_number(s: &str) -> Result<usize> {
    let s = s.trim();
    match s.parse::<usize>() {
        Ok(0) => anyhow::bail!("page numbers start at 1"),
        Ok(n) => Ok(n),
        Err(_) => anyhow::bail!("'{s}' is not a page number"),
    }
}

/// Parse `--separator` string into `PageSeparator`.
fn parse_separator(s: &str) -> PageSeparator {
    match s.to_lowercase().as_str() {
        "blank" | "none" => PageSeparator::None,
        "ff" | "formfeed" => PageSeparator::FormFeed,
        "marker" => PageSeparator::Marker,
        _ => PageSeparator::Custom(s.to_string()),
    }
}
