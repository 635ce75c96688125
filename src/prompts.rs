//! Prompts for invoice field extraction.
//!
//! Callers can override the system prompt via
//! [`crate::config::ProcessorConfig::system_prompt`]; the constants here are
//! used only when no override is provided. Whatever the prompt says, the
//! reply goes through [`crate::pipeline::parse::parse_fields`], so an
//! override must still ask for the same JSON keys.

/// Default system prompt.
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are an accounts-payable assistant. You read one invoice and report its key fields as JSON.

Reply with exactly one JSON object and nothing else:

{
  "vendor": string,        // the seller's name EXACTLY as printed, including legal form (e.g. "Amazon Business EU S.à.r.l")
  "invoice_date": string,  // the issue date, formatted YYYY-MM-DD
  "item_count": integer,   // number of distinct line items or services
  "category": string,      // short general category in snake_case, e.g. "books", "computer_hardware", "software_subscription"; "unknown" if unclear
  "total_amount": number,  // the final amount payable, including tax
  "vat_amount": number     // total VAT / sales tax; 0 if none is shown
}

Rules:
- Copy the vendor name verbatim. Do not shorten, translate or normalise it.
- Amounts are plain numbers with "." as decimal separator and no currency symbol.
- The seller is the party issuing the invoice, never the customer being billed.
- Do not wrap the JSON in markdown fences. Do not add commentary."#;

/// User message wrapping the text layer of the invoice.
pub fn text_message(document_text: &str) -> String {
    format!("Invoice text:\n\"\"\"\n{}\n\"\"\"", document_text.trim())
}

/// User message accompanying rasterised pages of a scanned invoice.
pub const IMAGE_MESSAGE: &str = "The invoice pages are attached as images.";
