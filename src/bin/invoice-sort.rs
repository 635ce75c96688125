//! CLI binary for invoice-sort.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ProcessorConfig`, drives a run and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use invoice_sort::{
    runlog, CancelToken, Orchestrator, ProcessingResult, ProcessorConfig, ProgressCallback,
    RunLogEntry, RunMetrics, RunProgressCallback, RunSnapshot, TransferMode,
};
use std::io;
use std::path::{Path, PathBuf};
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
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
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

/// Live progress bar plus one log line per finished invoice. Invoices finish
/// out of order, so every line names its source file.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(TICKS),
        );
        bar.set_prefix("Preparing");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

impl RunProgressCallback for CliProgressCallback {
    fn on_run_start(&self, total_files: usize) {
        self.bar.set_length(total_files as u64);
        self.bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} {prefix:.bold}  \
                 [{bar:42.green/238}] {pos:>3}/{len} invoices  \
                 ⏱ {elapsed_precise}  ETA {eta_precise}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  ")
            .tick_strings(TICKS),
        );
        self.bar.set_prefix("Sorting");
        self.bar.reset_eta();
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Processing {total_files} invoices…"))
        ));
    }

    fn on_file_start(&self, path: &Path) {
        self.bar.set_message(file_name(path));
    }

    fn on_file_retry(&self, path: &Path, attempt: u32, error: &str) {
        self.bar.println(format!(
            "  {} {}  retry {}  {}",
            yellow("↻"),
            file_name(path),
            attempt,
            dim(&truncate(error, 70)),
        ));
    }

    fn on_file_complete(&self, result: &ProcessingResult, _snapshot: &RunSnapshot) {
        let secs = dim(&format!("{:.1}s", result.duration_ms as f64 / 1000.0));
        match (result.destination(), result.error()) {
            (Some(dest), _) => self.bar.println(format!(
                "  {} {}  →  {}  {}",
                green("✓"),
                file_name(&result.source_path),
                file_name(dest),
                secs,
            )),
            (None, Some(e)) => self.bar.println(format!(
                "  {} {}  {}  {}",
                red("✗"),
                file_name(&result.source_path),
                red(&truncate(&e.to_string(), 80)),
                secs,
            )),
            (None, None) => {}
        }
        self.bar.inc(1);
    }

    fn on_run_complete(&self, _metrics: &RunMetrics) {
        self.bar.finish_and_clear();
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() > max_chars {
        let cut: String = s.chars().take(max_chars - 1).collect();
        format!("{cut}\u{2026}")
    } else {
        s.to_string()
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Copy every invoice in a folder into processed_invoices/
  invoice-sort inbox/

  # Move instead of copy, 8 invoices at a time
  invoice-sort inbox/ --move -c 8 -o archive/2025

  # One file, filed under a fixed vendor name
  invoice-sort scan.pdf --vendor-override "Amazon Business"

  # Local model through Ollama
  invoice-sort inbox/ --provider ollama --model qwen3

  # Machine-readable summary, plus an append-only run log
  invoice-sort inbox/ --json --run-log runs.json > result.json

OUTPUT NAMES:
  {Vendor}-{YYYYMMDD}-{items}-{category}-{total}-{vat}.pdf
  e.g. Amazon_Business-20250225-2-computer_hardware-100.00-20.00.pdf
  An existing name gets -1, -2, … appended; nothing is ever overwritten.

VENDOR REGISTRY:
  vendors.yaml maps every vendor spelling seen so far to one canonical name.
  New spellings similar to a known vendor (--similarity-threshold, default
  0.8) become aliases; others create a new vendor. Edit the file freely
  between runs to merge or rename vendors.

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Path to an existing libpdfium (skips auto-download)
  PDFIUM_AUTO_CACHE_DIR   Override the default pdfium cache directory
  RUST_LOG                Log filter, e.g. invoice_sort=debug
"#;

/// Rename and file PDF invoices using an LLM and a canonical vendor registry.
#[derive(Parser, Debug)]
#[command(
    name = "invoice-sort",
    version,
    about = "Rename and file PDF invoices using an LLM and a canonical vendor registry",
    long_about = "Reads each PDF invoice with an LLM (vendor, date, item count, category, total, \
VAT), maps the vendor to a canonical name kept in a YAML registry, and copies or moves the file \
into an output folder under a deterministic name. Supports OpenAI, Anthropic, Google Gemini, \
Ollama and any OpenAI-compatible endpoint.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// A PDF file, or a folder whose PDFs are all processed.
    input: PathBuf,

    /// Folder receiving the renamed invoices.
    #[arg(short, long, env = "INVOICE_SORT_OUTPUT_DIR", default_value = "processed_invoices")]
    output_dir: PathBuf,

    /// Move files instead of copying them.
    #[arg(long = "move", env = "INVOICE_SORT_MOVE")]
    move_files: bool,

    /// Invoices processed concurrently. Default: number of CPUs.
    #[arg(short, long, env = "INVOICE_SORT_CONCURRENCY")]
    concurrency: Option<usize>,

    /// Vendor registry file (created if missing).
    #[arg(long, env = "INVOICE_SORT_VENDORS", default_value = "vendors.yaml")]
    vendors: PathBuf,

    /// File every invoice under this vendor name.
    #[arg(long, env = "INVOICE_SORT_VENDOR_OVERRIDE")]
    vendor_override: Option<String>,

    /// Similarity (0.0–1.0) above which a new spelling joins a known vendor.
    #[arg(long, env = "INVOICE_SORT_SIMILARITY_THRESHOLD", default_value_t = 0.8)]
    similarity_threshold: f64,

    /// LLM model ID (e.g. gpt-4.1-nano, qwen3).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(
        long,
        env = "EDGEQUAKE_PROVIDER",
        long_help = "LLM provider. Auto-detected from API key env vars if not set.\n\
          Supported: openai, anthropic, gemini, azure, ollama, or any OpenAI-compatible URL."
    )]
    provider: Option<String>,

    /// Retries per invoice on transient LLM failures.
    #[arg(long, env = "INVOICE_SORT_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    /// Per-invoice LLM call timeout in seconds.
    #[arg(long, env = "INVOICE_SORT_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// Pages of each invoice sent to the LLM.
    #[arg(long, env = "INVOICE_SORT_MAX_PAGES", default_value_t = 2)]
    max_pages: usize,

    /// Path to a text file containing a custom system prompt.
    #[arg(long, env = "INVOICE_SORT_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Print the run result (RunMetrics) as JSON on stdout.
    #[arg(long, env = "INVOICE_SORT_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "INVOICE_SORT_NO_PROGRESS")]
    no_progress: bool,

    /// Append a summary of this run to a JSON array file.
    #[arg(long, env = "INVOICE_SORT_RUN_LOG")]
    run_log: Option<PathBuf>,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "INVOICE_SORT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "INVOICE_SORT_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs while it is visible.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    ensure_pdf_engine(cli.quiet)?;

    let config = build_config(&cli).await?;
    let mut orchestrator =
        Orchestrator::from_config(config).context("Failed to initialise invoice processing")?;

    if show_progress {
        let cb = CliProgressCallback::new();
        orchestrator = orchestrator.with_progress(cb as ProgressCallback);
    }

    // ── Ctrl-C: stop dispatching, let in-flight invoices finish ───────────
    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        let quiet = cli.quiet;
        tokio::spawn(async move {
            let mut presses = 0;
            while tokio::signal::ctrl_c().await.is_ok() {
                presses += 1;
                match interrupt_action(presses) {
                    Interrupt::Cancel => {
                        if !quiet {
                            eprintln!(
                                "{} {}",
                                yellow("⚠"),
                                "Interrupted: finishing invoices in flight… (Ctrl-C again to quit)"
                            );
                        }
                        cancel.cancel();
                    }
                    Interrupt::ForceQuit => {
                        eprintln!("{} Aborted", red("✘"));
                        std::process::exit(130);
                    }
                }
            }
        });
    }

    let metrics = orchestrator
        .run_path(&cli.input, &cancel)
        .await
        .context("Run failed")?;

    if let Some(ref path) = cli.run_log {
        let entry = RunLogEntry::new(&cli.input, orchestrator.config(), &metrics);
        runlog::append(path, &entry)
            .with_context(|| format!("Failed to write run log {}", path.display()))?;
    }

    if cli.json {
        let json = serde_json::to_string_pretty(&metrics).context("Failed to serialise result")?;
        println!("{json}");
    } else if !cli.quiet {
        print_summary(&metrics, orchestrator.config());
    }

    Ok(())
}

/// What a Ctrl-C press does: the first drains the run, the next one quits.
#[derive(Debug, PartialEq, Eq)]
enum Interrupt {
    Cancel,
    ForceQuit,
}

fn interrupt_action(presses: usize) -> Interrupt {
    if presses <= 1 {
        Interrupt::Cancel
    } else {
        Interrupt::ForceQuit
    }
}

/// Make sure libpdfium is available before any worker needs it.
///
/// With `--features bundled` the library was embedded at compile time and is
/// only extracted here. Otherwise the first run downloads it (~30 MB) into
/// the pdfium-auto cache; later runs find it there immediately.
fn ensure_pdf_engine(quiet: bool) -> Result<()> {
    #[cfg(feature = "bundled")]
    {
        let _ = quiet;
        tokio::task::block_in_place(|| pdfium_auto::ensure_pdfium_library(None))
            .context("Failed to extract bundled PDFium engine")?;
    }

    #[cfg(not(feature = "bundled"))]
    if !pdfium_auto::is_pdfium_cached() {
        if quiet {
            tokio::task::block_in_place(|| pdfium_auto::ensure_pdfium_library(None))
                .context("Failed to download PDFium engine")?;
            return Ok(());
        }

        let dl_bar = ProgressBar::new(0);
        dl_bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} {prefix:.bold}  \
                 [{bar:42.green/238}] {bytes}/{total_bytes}  ETA {eta_precise}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  ")
            .tick_strings(TICKS),
        );
        dl_bar.set_prefix("PDF engine");
        dl_bar.set_message("Connecting…");
        dl_bar.enable_steady_tick(Duration::from_millis(80));

        let bar = dl_bar.clone();
        tokio::task::block_in_place(|| {
            pdfium_auto::ensure_pdfium_library(Some(&|downloaded, total| {
                if let Some(t) = total {
                    if bar.length().unwrap_or(0) != t {
                        bar.set_length(t);
                    }
                }
                bar.set_position(downloaded);
            }))
        })
        .context("Failed to download PDFium engine")?;

        dl_bar.finish_with_message("ready ✓");
    }

    Ok(())
}

/// Map CLI args to `ProcessorConfig`.
async fn build_config(cli: &Cli) -> Result<ProcessorConfig> {
    let mut builder = ProcessorConfig::builder()
        .output_dir(&cli.output_dir)
        .transfer_mode(if cli.move_files {
            TransferMode::Move
        } else {
            TransferMode::Copy
        })
        .vendors_file(&cli.vendors)
        .similarity_threshold(cli.similarity_threshold)
        .max_retries(cli.max_retries)
        .extraction_timeout_secs(cli.api_timeout)
        .max_pages(cli.max_pages);

    if let Some(n) = cli.concurrency {
        builder = builder.concurrency(n);
    }
    if let Some(ref name) = cli.vendor_override {
        builder = builder.vendor_override(name.clone());
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider.clone());
    }
    if let Some(ref path) = cli.system_prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read system prompt from {:?}", path))?;
        builder = builder.system_prompt(prompt);
    }

    builder.build().context("Invalid configuration")
}

fn print_summary(metrics: &RunMetrics, config: &ProcessorConfig) {
    if metrics.attempted == 0 && metrics.skipped == 0 {
        eprintln!("{} No PDF files to process", yellow("⚠"));
        return;
    }

    let mark = if metrics.failed == 0 && !metrics.cancelled {
        green("✔")
    } else if metrics.succeeded == 0 {
        red("✘")
    } else {
        yellow("⚠")
    };
    eprintln!(
        "{}  {} filed, {} failed{}  in {:.1}s  →  {}",
        mark,
        bold(&metrics.succeeded.to_string()),
        if metrics.failed > 0 {
            red(&metrics.failed.to_string())
        } else {
            metrics.failed.to_string()
        },
        if metrics.skipped > 0 {
            format!(", {} skipped", metrics.skipped)
        } else {
            String::new()
        },
        metrics.total_duration_ms as f64 / 1000.0,
        bold(&config.output_dir.display().to_string()),
    );

    for r in metrics.failures() {
        if let Some(e) = r.error() {
            eprintln!("   {} {}  {}", red("✗"), r.source_path.display(), dim(&e.to_string()));
        }
    }

    if let Some(ref e) = metrics.registry_persist_error {
        eprintln!(
            "{} Vendor registry {} was not saved: {}",
            red("✘"),
            config.vendors_file.display(),
            e
        );
    }
}
