//! Destination filenames.
//!
//! ```text
//! {vendor}-{YYYYMMDD}-{item_count}-{category}-{total:.2}-{vat:.2}.pdf
//! Amazon_Business-20250225-2-computer_hardware-100.00-20.00.pdf
//! ```
//!
//! The layout is fixed; existing archives depend on it byte for byte.

use crate::output::InvoiceRecord;

/// Extension appended to every built name.
pub const EXTENSION: &str = ".pdf";

/// Upper bound on `-N` suffixes tried before giving up on a base name.
pub const MAX_COLLISION_SUFFIX: u32 = 10_000;

/// Build the base file name for a record.
pub fn build(record: &InvoiceRecord) -> String {
    format!(
        "{}-{}-{}-{}-{:.2}-{:.2}{}",
        sanitize(&record.vendor_canonical),
        record.invoice_date.format("%Y%m%d"),
        record.item_count,
        sanitize(&record.category),
        record.total_amount,
        record.vat_amount,
        EXTENSION
    )
}

/// Replace every char outside `[A-Za-z0-9_-]` with `_` and collapse runs of
/// `_`. An empty result becomes `unknown`.
pub fn sanitize(part: &str) -> String {
    let mut out = String::with_capacity(part.len());
    for c in part.chars() {
        let c = if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
            c
        } else {
            '_'
        };
        if c == '_' && out.ends_with('_') {
            continue;
        }
        out.push(c);
    }
    if out.is_empty() {
        "unknown".to_string()
    } else {
        out
    }
}

/// The `n`th collision candidate for `base`; `n = 0` is `base` itself.
///
/// `candidate("a.pdf", 2) == "a-2.pdf"`.
pub fn candidate(base: &str, n: u32) -> String {
    if n == 0 {
        return base.to_string();
    }
    match base.strip_suffix(EXTENSION) {
        Some(stem) => format!("{stem}-{n}{EXTENSION}"),
        None => format!("{base}-{n}"),
    }
}
