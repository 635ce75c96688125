//! The default extraction collaborator: pdfium + an `edgequake-llm` provider.
//!
//! One request per invoice. Text-based PDFs send their text layer; scans
//! send page images. Retries are not handled here: the orchestrator owns the
//! retry and timeout policy, this module only classifies each failure as
//! transient or permanent.

use crate::config::ProcessorConfig;
use crate::error::{ExtractionError, InvoiceSortError};
use crate::output::InvoiceFields;
use crate::pipeline::encode::encode_pages;
use crate::pipeline::extract::InvoiceExtractor;
use crate::pipeline::parse::parse_fields;
use crate::pipeline::render::{load_invoice, InvoiceContent};
use crate::prompts::{text_message, DEFAULT_SYSTEM_PROMPT, IMAGE_MESSAGE};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Model used when a provider is named without a model.
pub const DEFAULT_MODEL: &str = "gpt-4.1-nano";

/// Provider error words and status codes worth retrying. Matched on word
/// boundaries so "15000 tokens" is not a 500.
static TRANSIENT_ERROR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:timeout|timed out|rate[ _]?limit(?:ed)?|too many requests|429|500|502|503|504|overloaded|unavailable|connect|connection|reset by peer|broken pipe|temporarily)\b",
    )
    .unwrap()
});

/// Extracts invoice fields by asking an LLM.
pub struct LlmExtractor {
    provider: Arc<dyn LLMProvider>,
    system_prompt: String,
    temperature: f32,
    max_tokens: usize,
    max_pages: usize,
    max_rendered_pixels: u32,
}

impl LlmExtractor {
    /// Build an extractor, resolving the provider from `config` and the
    /// environment.
    pub fn from_config(config: &ProcessorConfig) -> Result<Self, InvoiceSortError> {
        let provider = resolve_provider(config)?;
        Ok(Self::with_provider(provider, config))
    }

    /// Build an extractor around an existing provider.
    pub fn with_provider(provider: Arc<dyn LLMProvider>, config: &ProcessorConfig) -> Self {
        Self {
            provider,
            system_prompt: config
                .system_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_pages: config.max_pages,
            max_rendered_pixels: config.max_rendered_pixels,
        }
    }

    fn options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        }
    }
}

#[async_trait]
impl InvoiceExtractor for LlmExtractor {
    async fn extract(&self, path: &Path) -> Result<InvoiceFields, ExtractionError> {
        let content = load_invoice(path, self.max_pages, self.max_rendered_pixels).await?;

        let user = match content {
            InvoiceContent::Text(text) => ChatMessage::user(text_message(&text)),
            InvoiceContent::Images(images) => {
                ChatMessage::user_with_images(IMAGE_MESSAGE, encode_pages(&images)?)
            }
        };
        let messages = vec![ChatMessage::system(self.system_prompt.as_str()), user];

        let response = self
            .provider
            .chat(&messages, Some(&self.options()))
            .await
            .map_err(|e| classify(&e.to_string()))?;

        debug!(
            "{}: {} prompt tokens, {} completion tokens",
            path.display(),
            response.prompt_tokens,
            response.completion_tokens
        );

        parse_fields(&response.content)
    }
}

/// Classify a provider error message.
pub fn classify(message: &str) -> ExtractionError {
    if TRANSIENT_ERROR.is_match(message) {
        ExtractionError::Transient(message.to_string())
    } else {
        ExtractionError::Permanent(message.to_string())
    }
}

fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, InvoiceSortError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        InvoiceSortError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the LLM provider, from most-specific to least-specific:
///
/// 1. `config.provider`, used as-is
/// 2. `config.provider_name` + `config.model` (default [`DEFAULT_MODEL`])
/// 3. `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`, when both are set
/// 4. OpenAI, when `OPENAI_API_KEY` is set
/// 5. [`ProviderFactory::from_env`] auto-detection
pub fn resolve_provider(config: &ProcessorConfig) -> Result<Arc<dyn LLMProvider>, InvoiceSortError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
        return create_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_provider(&prov, &model);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
            return create_provider("openai", model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| InvoiceSortError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, use --provider ollama, or set EDGEQUAKE_LLM_PROVIDER.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}
