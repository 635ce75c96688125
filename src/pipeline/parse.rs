//! Turn a model's free-text reply into [`InvoiceFields`].
//!
//! Models rarely return exactly what was asked for. Parsing is lenient about
//! presentation and strict about content:
//!
//! | Quirk                                   | Handling                          |
//! |-----------------------------------------|-----------------------------------|
//! | reply wrapped in ```` ```json ```` fences | fences stripped                   |
//! | prose before/after the object           | first `{` to last `}` is used     |
//! | `"42.50"` instead of `42.50`            | numeric strings accepted          |
//! | `"1.234,56"` / `"€ 12,00"`              | currency and separators cleaned   |
//! | `item_category` / `total_vat` keys      | accepted as aliases               |
//! | missing VAT                             | `0.0`                             |
//! | missing category                        | `unknown`                         |
//!
//! A missing vendor, date, item count or total is a permanent failure.

use crate::error::ExtractionError;
use crate::output::InvoiceFields;
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

static RE_FENCED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```(?:json|JSON)?\s*(.*?)\s*```").unwrap());

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d", "%Y/%m/%d", "%d.%m.%Y", "%d/%m/%Y", "%Y%m%d", "%d %B %Y", "%B %d, %Y",
    "%d %b %Y", "%b %d, %Y",
];

/// Parse a model reply into invoice fields.
pub fn parse_fields(reply: &str) -> Result<InvoiceFields, ExtractionError> {
    let object = json_object(reply)?;

    let vendor = string_field(&object, &["vendor", "verbatim_vendor_name", "vendor_name"])
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| permanent("reply has no vendor"))?;

    let date_text = string_field(&object, &["invoice_date", "date"])
        .ok_or_else(|| permanent("reply has no invoice_date"))?;
    let invoice_date = parse_date(&date_text)
        .ok_or_else(|| permanent(format!("unrecognised invoice_date '{date_text}'")))?;

    let item_count = number_field(&object, &["item_count", "items"])
        .ok_or_else(|| permanent("reply has no item_count"))?;
    if item_count < 0.0 || item_count.fract() != 0.0 {
        return Err(permanent(format!("item_count {item_count} is not a whole number")));
    }
    if item_count > u32::MAX as f64 {
        return Err(permanent(format!("item_count {item_count} is out of range")));
    }

    let total_amount = number_field(&object, &["total_amount", "total"])
        .ok_or_else(|| permanent("reply has no total_amount"))?;
    let vat_amount = number_field(&object, &["vat_amount", "total_vat", "vat"]).unwrap_or(0.0);

    let category = string_field(&object, &["category", "item_category"])
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| "unknown".to_string());

    Ok(InvoiceFields {
        vendor: vendor.trim().to_string(),
        invoice_date,
        item_count: item_count as u32,
        category,
        total_amount,
        vat_amount,
    })
}

/// Locate and decode the JSON object in `reply`.
fn json_object(reply: &str) -> Result<Map<String, Value>, ExtractionError> {
    let body = RE_FENCED
        .captures(reply)
        .and_then(|c| c.get(1))
        .map_or(reply, |m| m.as_str());

    let start = body.find('{');
    let end = body.rfind('}');
    let slice = match (start, end) {
        (Some(s), Some(e)) if s < e => &body[s..=e],
        _ => return Err(permanent("reply contains no JSON object")),
    };

    match serde_json::from_str::<Value>(slice) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(permanent("reply JSON is not an object")),
        Err(e) => Err(permanent(format!("reply is not valid JSON: {e}"))),
    }
}

fn lookup<'a>(object: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|k| object.get(*k))
        .find(|v| !v.is_null())
}

fn string_field(object: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    match lookup(object, keys)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn number_field(object: &Map<String, Value>, keys: &[&str]) -> Option<f64> {
    match lookup(object, keys)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_amount(s),
        _ => None,
    }
}

/// Parse an amount written by a human: `"1,234.56"`, `"1.234,56"`,
/// `"€ 12,00"`, `"42"`.
pub fn parse_amount(text: &str) -> Option<f64> {
    let cleaned: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, '.' | ',' | '-'))
        .collect();
    if cleaned.is_empty() {
        return None;
    }

    let last_dot = cleaned.rfind('.');
    let last_comma = cleaned.rfind(',');
    let normalised = match (last_dot, last_comma) {
        // Whichever separator comes last is the decimal point.
        (Some(d), Some(c)) if c > d => cleaned.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => cleaned.replace(',', ""),
        // Commas only: one or two trailing digits mean a decimal comma,
        // exactly three a thousands group.
        (None, Some(c)) if cleaned.len() - c - 1 <= 2 => {
            let (int, frac) = cleaned.split_at(c);
            format!("{}.{}", int.replace(',', ""), &frac[1..])
        }
        (None, Some(_)) => cleaned.replace(',', ""),
        _ => cleaned,
    };
    normalised.parse::<f64>().ok()
}

fn parse_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    DATE_FORMATS
        .iter()
        .find_map(|f| NaiveDate::parse_from_str(text, f).ok())
        .or_else(|| {
            // ISO timestamps: keep the date part.
            text.get(..10)
                .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
        })
}

fn permanent(msg: impl Into<String>) -> ExtractionError {
    ExtractionError::Permanent(msg.into())
}
