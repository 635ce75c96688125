//! Configuration types for an invoice-processing run.
//!
//! Every knob lives in [`ProcessorConfig`], built via its
//! [`ProcessorConfigBuilder`]. The orchestrator receives one immutable value
//! at construction and never consults the environment afterwards, so two runs
//! with equal configs behave identically.

use crate::error::InvoiceSortError;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Legal-entity suffixes stripped from the end of vendor names before
/// matching. Compared case-insensitively with trailing dots ignored.
pub const DEFAULT_LEGAL_SUFFIXES: &[&str] = &[
    "inc",
    "incorporated",
    "ltd",
    "limited",
    "llc",
    "llp",
    "plc",
    "corp",
    "corporation",
    "gmbh",
    "ag",
    "kg",
    "s.a",
    "sas",
    "sarl",
    "s.a.r.l",
    "s.à.r.l",
    "s.à r.l",
    "srl",
    "s.r.l",
    "bv",
    "b.v",
    "nv",
    "n.v",
    "oy",
    "pty",
    "s.p.a",
];

/// Configuration for an invoice-processing run.
///
/// Built via [`ProcessorConfig::builder()`] or using
/// [`ProcessorConfig::default()`].
///
/// # Example
/// ```rust
/// use invoice_sort::{ProcessorConfig, TransferMode};
///
/// let config = ProcessorConfig::builder()
///     .output_dir("sorted")
///     .transfer_mode(TransferMode::Move)
///     .concurrency(4)
///     .build()
///     .unwrap();
/// assert_eq!(config.concurrency, 4);
/// ```
#[derive(Clone)]
pub struct ProcessorConfig {
    /// Directory receiving the renamed invoices. Default: `processed_invoices`.
    pub output_dir: PathBuf,

    /// Copy (default) or move the source file.
    pub transfer_mode: TransferMode,

    /// Maximum number of invoices in flight at once. Default: available parallelism.
    ///
    /// Each in-flight invoice mostly waits on the LLM, so this is effectively
    /// the number of concurrent API calls. Lower it on `429` responses.
    pub concurrency: usize,

    /// Retry attempts after a transient extraction failure. Default: 3.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Per-extraction-call timeout in seconds. Default: 60.
    ///
    /// A timeout counts as a transient failure and is retried.
    pub extraction_timeout_secs: u64,

    /// Vendor registry file. Default: `vendors.yaml`.
    pub vendors_file: PathBuf,

    /// File every invoice under this vendor name; extracted names become aliases.
    pub vendor_override: Option<String>,

    /// Vendor matching policy (similarity threshold, legal suffixes).
    pub match_policy: MatchPolicy,

    /// LLM model identifier, e.g. "gpt-4.1-nano", "qwen3".
    /// If None, uses provider default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    /// If None along with `provider`, auto-detected from the environment.
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature. Default: 0.0 (extraction wants determinism).
    pub temperature: f32,

    /// Maximum tokens the LLM may generate per invoice. Default: 1024.
    pub max_tokens: usize,

    /// Pages of each invoice sent to the LLM. Default: 2.
    ///
    /// Vendor, date and totals are nearly always on the first page; the
    /// second catches totals carried over from a long item list.
    pub max_pages: usize,

    /// Longest edge in pixels when a scanned invoice has to be rasterised. Default: 1600.
    pub max_rendered_pixels: u32,

    /// Custom system prompt. If None, uses built-in default.
    pub system_prompt: Option<String>,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("processed_invoices"),
            transfer_mode: TransferMode::default(),
            concurrency: default_concurrency(),
            max_retries: 3,
            retry_backoff_ms: 500,
            extraction_timeout_secs: 60,
            vendors_file: PathBuf::from("vendors.yaml"),
            vendor_override: None,
            match_policy: MatchPolicy::default(),
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.0,
            max_tokens: 1024,
            max_pages: 2,
            max_rendered_pixels: 1600,
            system_prompt: None,
        }
    }
}

impl fmt::Debug for ProcessorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessorConfig")
            .field("output_dir", &self.output_dir)
            .field("transfer_mode", &self.transfer_mode)
            .field("concurrency", &self.concurrency)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("extraction_timeout_secs", &self.extraction_timeout_secs)
            .field("vendors_file", &self.vendors_file)
            .field("vendor_override", &self.vendor_override)
            .field("match_policy", &self.match_policy)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("max_pages", &self.max_pages)
            .finish()
    }
}

impl ProcessorConfig {
    /// Create a new builder for `ProcessorConfig`.
    pub fn builder() -> ProcessorConfigBuilder {
        ProcessorConfigBuilder {
            config: Self::default(),
        }
    }
}

fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

/// Builder for [`ProcessorConfig`].
#[derive(Debug)]
pub struct ProcessorConfigBuilder {
    config: ProcessorConfig,
}

impl ProcessorConfigBuilder {
    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn transfer_mode(mut self, mode: TransferMode) -> Self {
        self.config.transfer_mode = mode;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn extraction_timeout_secs(mut self, secs: u64) -> Self {
        self.config.extraction_timeout_secs = secs;
        self
    }

    pub fn vendors_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.vendors_file = path.into();
        self
    }

    pub fn vendor_override(mut self, name: impl Into<String>) -> Self {
        self.config.vendor_override = Some(name.into());
        self
    }

    pub fn similarity_threshold(mut self, t: f64) -> Self {
        self.config.match_policy.similarity_threshold = t;
        self
    }

    pub fn match_policy(mut self, policy: MatchPolicy) -> Self {
        self.config.match_policy = policy;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_pages(mut self, n: usize) -> Self {
        self.config.max_pages = n.max(1);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ProcessorConfig, InvoiceSortError> {
        let c = &self.config;
        if c.concurrency == 0 {
            return Err(InvoiceSortError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        let t = c.match_policy.similarity_threshold;
        if !(0.0..=1.0).contains(&t) {
            return Err(InvoiceSortError::InvalidConfig(format!(
                "Similarity threshold must be 0.0–1.0, got {t}"
            )));
        }
        if c.extraction_timeout_secs == 0 {
            return Err(InvoiceSortError::InvalidConfig(
                "Extraction timeout must be ≥ 1 second".into(),
            ));
        }
        if let Some(ref v) = c.vendor_override {
            if v.trim().is_empty() {
                return Err(InvoiceSortError::InvalidConfig(
                    "Vendor override must not be blank".into(),
                ));
            }
        }
        Ok(self.config)
    }
}

// ── Enums & policies ─────────────────────────────────────────────────────

/// What happens to the source file once it has been renamed into the output directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferMode {
    /// Leave the source untouched. (default)
    #[default]
    Copy,
    /// Delete the source once the copy is verified.
    Move,
}

impl fmt::Display for TransferMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferMode::Copy => f.write_str("copy"),
            TransferMode::Move => f.write_str("move"),
        }
    }
}

/// How raw vendor strings are matched against known vendors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchPolicy {
    /// A new spelling joins an existing vendor when its similarity exceeds
    /// this value (0.0–1.0). Default: 0.8.
    ///
    /// "amazon business eu" vs "amazon business" scores 0.83.
    pub similarity_threshold: f64,

    /// Trailing legal-entity suffixes removed during normalisation.
    pub legal_suffixes: Vec<String>,
}

impl Default for MatchPolicy {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.8,
            legal_suffixes: DEFAULT_LEGAL_SUFFIXES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let c = ProcessorConfig::default();
        assert_eq!(c.transfer_mode, TransferMode::Copy);
        assert!(c.concurrency >= 1);
        assert_eq!(c.max_retries, 3);
        assert_eq!(c.vendors_file, PathBuf::from("vendors.yaml"));
        assert_eq!(c.match_policy.similarity_threshold, 0.8);
        assert!(c.match_policy.legal_suffixes.iter().any(|s| s == "gmbh"));
    }

    #[test]
    fn builder_clamps_concurrency() {
        let c = ProcessorConfig::builder().concurrency(0).build().unwrap();
        assert_eq!(c.concurrency, 1);
    }

    #[test]
    fn builder_rejects_bad_threshold() {
        let err = ProcessorConfig::builder()
            .similarity_threshold(1.5)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("threshold"), "got: {err}");
    }

    #[test]
    fn builder_rejects_blank_override() {
        assert!(ProcessorConfig::builder()
            .vendor_override("   ")
            .build()
            .is_err());
    }

    #[test]
    fn transfer_mode_serde_is_lowercase() {
        let json = serde_json::to_string(&TransferMode::Move).unwrap();
        assert_eq!(json, "\"move\"");
        assert_eq!(TransferMode::Copy.to_string(), "copy");
    }

    #[test]
    fn debug_hides_provider() {
        let dbg = format!("{:?}", ProcessorConfig::default());
        assert!(dbg.contains("ProcessorConfig"));
        assert!(dbg.contains("provider: None"));
    }
}
