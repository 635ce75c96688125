//! Integration tests for the full per-file pipeline.
//!
//! Extraction is replaced by a scripted [`InvoiceExtractor`] keyed by file
//! name, so these tests exercise discovery, retries, vendor resolution,
//! naming and transfer without pdfium or an LLM.
//!
//! Run with:
//!   cargo test --test pipeline

use async_trait::async_trait;
use chrono::NaiveDate;
use futures::StreamExt;
use invoice_sort::{
    CancelToken, ChannelProgressCallback, ExtractionError, FileError, InvoiceExtractor,
    InvoiceFields, Orchestrator, ProcessorConfig, ProcessorConfigBuilder, ProgressCallback,
    RunEvent, TransferMode, VendorEntry, VendorRegistry,
};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

// ── Scripted extractor ───────────────────────────────────────────────────────

#[derive(Clone)]
enum Step {
    Fields(InvoiceFields),
    Transient,
    Permanent,
    /// Sleep before answering; long enough to trip the extraction timeout.
    Slow(Duration, InvoiceFields),
}

#[derive(Default)]
struct ScriptedExtractor {
    scripts: Mutex<HashMap<String, VecDeque<Step>>>,
    calls: AtomicUsize,
    cancel_after: Option<(usize, CancelToken)>,
}

impl ScriptedExtractor {
    fn new() -> Self {
        Self::default()
    }

    fn script(self, file: &str, steps: Vec<Step>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(file.to_string(), steps.into());
        self
    }

    /// Cancel `token` as soon as the `n`-th extraction call starts.
    fn cancel_after(mut self, n: usize, token: CancelToken) -> Self {
        self.cancel_after = Some((n, token));
        self
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InvoiceExtractor for ScriptedExtractor {
    async fn extract(&self, path: &Path) -> Result<InvoiceFields, ExtractionError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((after, ref token)) = self.cancel_after {
            if n >= after {
                token.cancel();
            }
        }

        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        let step = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&name)
            .and_then(|steps| steps.pop_front());

        match step {
            Some(Step::Fields(f)) => Ok(f),
            Some(Step::Transient) => Err(ExtractionError::Transient("429 Too Many Requests".into())),
            Some(Step::Permanent) => Err(ExtractionError::Permanent("no JSON object in reply".into())),
            Some(Step::Slow(delay, f)) => {
                tokio::time::sleep(delay).await;
                Ok(f)
            }
            None => Err(ExtractionError::Permanent(format!("no script for {name}"))),
        }
    }
}

// ── Fixtures ─────────────────────────────────────────────────────────────────

struct Fixture {
    _dir: TempDir,
    inbox: PathBuf,
    out: PathBuf,
    vendors: PathBuf,
}

fn fixture(files: &[&str]) -> Fixture {
    let dir = TempDir::new().unwrap();
    let inbox = dir.path().join("inbox");
    std::fs::create_dir_all(&inbox).unwrap();
    for name in files {
        std::fs::write(inbox.join(name), format!("%PDF-1.4 {name}")).unwrap();
    }
    Fixture {
        out: dir.path().join("out"),
        vendors: dir.path().join("vendors.yaml"),
        inbox,
        _dir: dir,
    }
}

fn builder(f: &Fixture) -> ProcessorConfigBuilder {
    ProcessorConfig::builder()
        .output_dir(&f.out)
        .vendors_file(&f.vendors)
        .concurrency(4)
        .retry_backoff_ms(1)
}

fn orchestrator(config: ProcessorConfig, extractor: Arc<ScriptedExtractor>) -> Orchestrator {
    let registry = VendorRegistry::load(&config.vendors_file, config.match_policy.clone()).unwrap();
    Orchestrator::new(config, Arc::new(registry), extractor)
}

fn fields(vendor: &str, total: f64) -> InvoiceFields {
    InvoiceFields {
        vendor: vendor.into(),
        invoice_date: NaiveDate::from_ymd_opt(2025, 2, 25).unwrap(),
        item_count: 2,
        category: "computer_hardware".into(),
        total_amount: total,
        vat_amount: total / 5.0,
    }
}

fn ok(vendor: &str, total: f64) -> Step {
    Step::Fields(fields(vendor, total))
}

fn names_in(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .map(|rd| {
            rd.filter_map(Result::ok)
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

// ── Naming & vendor resolution ───────────────────────────────────────────────

#[tokio::test]
async fn test_known_vendor_spelling_is_filed_under_canonical_name() {
    let f = fixture(&["scan.pdf"]);
    std::fs::write(
        &f.vendors,
        "vendors:\n  - name: Amazon Business\n    aliases:\n      - Amazon Business\n",
    )
    .unwrap();

    let extractor = Arc::new(
        ScriptedExtractor::new().script("scan.pdf", vec![ok("Amazon Business EU S.à.r.l", 100.0)]),
    );
    let orch = orchestrator(builder(&f).build().unwrap(), extractor);
    let metrics = orch.run_path(&f.inbox, &CancelToken::new()).await.unwrap();

    assert_eq!(metrics.succeeded, 1);
    let dest = metrics.results[0].destination().unwrap();
    assert_eq!(
        dest.file_name().unwrap(),
        "Amazon_Business-20250225-2-computer_hardware-100.00-20.00.pdf"
    );
    assert!(f.inbox.join("scan.pdf").exists(), "copy must keep the source");
    assert_eq!(std::fs::read(dest).unwrap(), b"%PDF-1.4 scan.pdf");

    // The new spelling was learned and persisted.
    assert_eq!(orch.registry().len().await, 1);
    let on_disk = std::fs::read_to_string(&f.vendors).unwrap();
    assert!(on_disk.contains("Amazon Business EU S.à.r.l"), "{on_disk}");
}

#[tokio::test]
async fn test_concurrent_spellings_create_one_vendor() {
    let spellings = [
        "Amazon Business EU S.à.r.l",
        "AMAZON BUSINESS EU SARL",
        "Amazon Business EU",
        "amazon  business eu s.a.r.l.",
    ];
    let files: Vec<String> = (0..12).map(|i| format!("inv{i:02}.pdf")).collect();
    let refs: Vec<&str> = files.iter().map(String::as_str).collect();
    let f = fixture(&refs);

    let mut extractor = ScriptedExtractor::new();
    for (i, name) in files.iter().enumerate() {
        extractor = extractor.script(name, vec![ok(spellings[i % spellings.len()], 10.0 + i as f64)]);
    }
    let orch = orchestrator(builder(&f).concurrency(8).build().unwrap(), Arc::new(extractor));
    let metrics = orch.run_path(&f.inbox, &CancelToken::new()).await.unwrap();

    assert_eq!(metrics.succeeded, 12);
    assert_eq!(orch.registry().len().await, 1);

    let canonical: Vec<&str> = metrics
        .results
        .iter()
        .map(|r| match &r.outcome {
            invoice_sort::Outcome::Success { record, .. } => record.vendor_canonical.as_str(),
            invoice_sort::Outcome::Failed { error } => panic!("unexpected failure: {error}"),
        })
        .collect();
    assert!(canonical.windows(2).all(|w| w[0] == w[1]), "{canonical:?}");
}

#[tokio::test]
async fn test_vendor_override_files_everything_under_one_name() {
    let f = fixture(&["a.pdf", "b.pdf"]);
    let extractor = Arc::new(
        ScriptedExtractor::new()
            .script("a.pdf", vec![ok("AMZN Mktp DE", 12.0)])
            .script("b.pdf", vec![ok("Some Reseller GmbH", 30.0)]),
    );
    let config = builder(&f).vendor_override("Amazon Business").build().unwrap();
    let orch = orchestrator(config, extractor);
    let metrics = orch.run_path(&f.inbox, &CancelToken::new()).await.unwrap();

    assert_eq!(metrics.succeeded, 2);
    for name in names_in(&f.out) {
        assert!(name.starts_with("Amazon_Business-"), "{name}");
    }

    let aliases = orch.registry().alias_map().await;
    assert_eq!(aliases.get("amzn mktp de").map(String::as_str), Some("Amazon Business"));
    assert_eq!(aliases.get("some reseller").map(String::as_str), Some("Amazon Business"));
}

#[tokio::test]
async fn test_identical_invoices_get_numbered_names() {
    let f = fixture(&["one.pdf", "two.pdf"]);
    let extractor = Arc::new(
        ScriptedExtractor::new()
            .script("one.pdf", vec![ok("Acme Ltd", 50.0)])
            .script("two.pdf", vec![ok("Acme Ltd", 50.0)]),
    );
    let orch = orchestrator(builder(&f).build().unwrap(), extractor);
    let metrics = orch.run_path(&f.inbox, &CancelToken::new()).await.unwrap();

    assert_eq!(metrics.succeeded, 2);
    assert_eq!(
        names_in(&f.out),
        vec![
            "Acme-20250225-2-computer_hardware-50.00-10.00-1.pdf".to_string(),
            "Acme-20250225-2-computer_hardware-50.00-10.00.pdf".to_string(),
        ]
    );
}

// ── Failures & retries ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_permanent_failures_do_not_abort_the_batch() {
    let files: Vec<String> = (0..10).map(|i| format!("f{i}.pdf")).collect();
    let refs: Vec<&str> = files.iter().map(String::as_str).collect();
    let f = fixture(&refs);

    let mut extractor = ScriptedExtractor::new();
    for (i, name) in files.iter().enumerate() {
        let step = if i == 3 || i == 7 {
            Step::Permanent
        } else {
            ok("Globex Corporation", 100.0 + i as f64)
        };
        extractor = extractor.script(name, vec![step]);
    }
    let extractor = Arc::new(extractor);
    let orch = orchestrator(builder(&f).build().unwrap(), extractor.clone());
    let metrics = orch.run_path(&f.inbox, &CancelToken::new()).await.unwrap();

    assert_eq!(metrics.attempted, 10);
    assert_eq!(metrics.succeeded, 8);
    assert_eq!(metrics.failed, 2);
    assert_eq!(metrics.results.len(), 10);
    assert_eq!(names_in(&f.out).len(), 8);
    // Permanent failures are never retried.
    assert_eq!(extractor.calls(), 10);

    let mut failed: Vec<String> = metrics
        .failures()
        .map(|r| {
            assert_eq!(r.attempts, 1);
            assert_eq!(r.error().unwrap().kind(), "extraction_permanent");
            r.source_path.file_name().unwrap().to_string_lossy().into_owned()
        })
        .collect();
    failed.sort();
    assert_eq!(failed, vec!["f3.pdf", "f7.pdf"]);
}

#[tokio::test]
async fn test_transient_failures_are_retried_until_limit() {
    let f = fixture(&["flaky.pdf", "down.pdf"]);
    let extractor = Arc::new(
        ScriptedExtractor::new()
            .script(
                "flaky.pdf",
                vec![Step::Transient, Step::Transient, ok("Initech", 9.5)],
            )
            .script("down.pdf", vec![Step::Transient; 5]),
    );
    let orch = orchestrator(builder(&f).max_retries(2).build().unwrap(), extractor.clone());
    let metrics = orch.run_path(&f.inbox, &CancelToken::new()).await.unwrap();

    assert_eq!(metrics.succeeded, 1);
    assert_eq!(metrics.failed, 1);
    assert_eq!(extractor.calls(), 6);

    for r in &metrics.results {
        assert_eq!(r.attempts, 3, "{}", r.source_path.display());
        if !r.is_success() {
            assert!(matches!(
                r.error(),
                Some(FileError::ExtractionTransient { attempts: 3, .. })
            ));
        }
    }
}

#[tokio::test]
async fn test_extraction_timeout_counts_as_transient() {
    let f = fixture(&["slow.pdf"]);
    let extractor = Arc::new(ScriptedExtractor::new().script(
        "slow.pdf",
        vec![
            Step::Slow(Duration::from_secs(30), fields("Hooli", 1.0)),
            ok("Hooli", 1.0),
        ],
    ));
    let config = builder(&f)
        .extraction_timeout_secs(1)
        .max_retries(1)
        .build()
        .unwrap();
    let orch = orchestrator(config, extractor);
    let metrics = orch.run_path(&f.inbox, &CancelToken::new()).await.unwrap();

    assert_eq!(metrics.succeeded, 1);
    assert_eq!(metrics.results[0].attempts, 2);
}

// ── Transfer modes & cancellation ────────────────────────────────────────────

#[tokio::test]
async fn test_move_mode_removes_sources() {
    let f = fixture(&["a.pdf", "b.pdf", "c.pdf"]);
    let extractor = Arc::new(
        ScriptedExtractor::new()
            .script("a.pdf", vec![ok("Acme", 1.0)])
            .script("b.pdf", vec![ok("Acme", 2.0)])
            .script("c.pdf", vec![Step::Permanent]),
    );
    let config = builder(&f).transfer_mode(TransferMode::Move).build().unwrap();
    let orch = orchestrator(config, extractor);
    let metrics = orch.run_path(&f.inbox, &CancelToken::new()).await.unwrap();

    assert_eq!(metrics.succeeded, 2);
    assert_eq!(names_in(&f.out).len(), 2);
    // Only the failed invoice stays behind.
    assert_eq!(names_in(&f.inbox), vec!["c.pdf".to_string()]);
}

#[tokio::test]
async fn test_cancel_stops_dispatch_and_leaves_no_partial_files() {
    let files: Vec<String> = (0..6).map(|i| format!("c{i}.pdf")).collect();
    let refs: Vec<&str> = files.iter().map(String::as_str).collect();
    let f = fixture(&refs);

    let cancel = CancelToken::new();
    let mut extractor = ScriptedExtractor::new().cancel_after(1, cancel.clone());
    for (i, name) in files.iter().enumerate() {
        extractor = extractor.script(name, vec![ok("Umbrella Corp", i as f64)]);
    }
    let orch = orchestrator(builder(&f).concurrency(1).build().unwrap(), Arc::new(extractor));
    let metrics = orch.run_path(&f.inbox, &cancel).await.unwrap();

    assert!(metrics.cancelled);
    assert_eq!(metrics.attempted, 1);
    assert_eq!(metrics.succeeded, 1);
    assert_eq!(metrics.skipped, 5);

    let out = names_in(&f.out);
    assert_eq!(out.len(), 1, "{out:?}");
    assert!(out.iter().all(|n| !n.starts_with(".tmp") && n.ends_with(".pdf")));
}

#[tokio::test]
async fn test_registry_persist_failure_is_reported_not_fatal() {
    let f = fixture(&["a.pdf"]);
    let blocker = f.inbox.parent().unwrap().join("blocker");
    std::fs::write(&blocker, "not a directory").unwrap();
    let registry = VendorRegistry::from_entries(
        Vec::<VendorEntry>::new(),
        Some(blocker.join("vendors.yaml")),
        Default::default(),
    );

    let extractor = Arc::new(ScriptedExtractor::new().script("a.pdf", vec![ok("Acme", 5.0)]));
    let orch = Orchestrator::new(builder(&f).build().unwrap(), Arc::new(registry), extractor);
    let metrics = orch.run_path(&f.inbox, &CancelToken::new()).await.unwrap();

    assert_eq!(metrics.succeeded, 1);
    assert!(metrics.registry_persist_error.is_some());
}

#[tokio::test]
async fn test_missing_input_is_fatal() {
    let f = fixture(&[]);
    let orch = orchestrator(builder(&f).build().unwrap(), Arc::new(ScriptedExtractor::new()));
    let err = orch
        .run_path(&f.inbox.join("nope"), &CancelToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, invoice_sort::InvoiceSortError::InputNotFound { .. }));
}

#[tokio::test]
async fn test_empty_folder_completes_with_zero_files() {
    let f = fixture(&[]);
    let orch = orchestrator(builder(&f).build().unwrap(), Arc::new(ScriptedExtractor::new()));
    let metrics = orch.run_path(&f.inbox, &CancelToken::new()).await.unwrap();
    assert_eq!(metrics.attempted, 0);
    assert!(metrics.results.is_empty());
}

// ── Progress events ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_channel_callback_reports_every_stage() {
    let f = fixture(&["a.pdf", "b.pdf"]);
    let extractor = Arc::new(
        ScriptedExtractor::new()
            .script("a.pdf", vec![Step::Transient, ok("Acme", 1.0)])
            .script("b.pdf", vec![ok("Acme", 2.0)]),
    );
    let (cb, events) = ChannelProgressCallback::new();
    let orch = orchestrator(builder(&f).build().unwrap(), extractor)
        .with_progress(Arc::new(cb) as ProgressCallback);
    let metrics = orch.run_path(&f.inbox, &CancelToken::new()).await.unwrap();
    drop(orch);

    let events: Vec<RunEvent> = events.collect().await;
    assert!(matches!(events.first(), Some(RunEvent::RunStarted { total_files: 2 })));
    assert!(matches!(events.last(), Some(RunEvent::RunCompleted { .. })));

    let count = |pred: fn(&RunEvent) -> bool| events.iter().filter(|e| pred(e)).count();
    assert_eq!(count(|e| matches!(e, RunEvent::FileStarted { .. })), 2);
    assert_eq!(count(|e| matches!(e, RunEvent::FileRetry { attempt: 1, .. })), 1);
    assert_eq!(count(|e| matches!(e, RunEvent::FileCompleted { .. })), 2);

    let last_snapshot = events
        .iter()
        .rev()
        .find_map(|e| match e {
            RunEvent::FileCompleted { snapshot, .. } => Some(*snapshot),
            _ => None,
        })
        .unwrap();
    assert_eq!(last_snapshot.attempted, 2);
    assert_eq!(last_snapshot.succeeded, metrics.succeeded);
}
