//! The ordered extraction pattern set.
//!
//! Each pattern is a matcher object over a common try-extract capability;
//! the extractor dispatches them in order, institution formats before the
//! generic fallbacks. Patterns only report what they actually matched.

#![allow(clippy::expect_used)]

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;

/// Currency token: ISO codes and common symbols.
const CURRENCY: &str = r"NPR|INR|USD|EUR|GBP|Rs\.?|रु|₹|\$|€|£";

/// Amount token: comma-grouped first so `1,500.00` is not split.
const AMOUNT: &str = r"(?:\d{1,3}(?:,\d{3})+|\d+)(?:\.\d{1,2})?";

/// Date token in the formats the supported institutions emit.
const DATE: &str = r"\d{4}-\d{2}-\d{2}|\d{1,2}/\d{1,2}/\d{4}|\d{1,2}-\d{1,2}-\d{4}";

/// Fields one pattern captured from a text.
#[derive(Debug, Clone, Default)]
pub struct FieldCapture {
    /// Extracted amount, if the pattern captures amounts.
    pub amount: Option<f64>,
    /// Currency for the amount.
    pub currency: Option<String>,
    /// Merchant text.
    pub merchant: Option<String>,
    /// Transaction date.
    pub date: Option<NaiveDate>,
    /// Pattern confidence for the fields it captured.
    pub confidence: f64,
}

/// A named extraction pattern.
pub trait TextPattern: Send + Sync {
    /// Stable pattern name, recorded on the candidate for audit.
    fn name(&self) -> &'static str;

    /// Attempts to extract fields from the text. Returns `None` when the
    /// pattern does not apply; never guesses.
    fn try_extract(&self, text: &str) -> Option<FieldCapture>;
}

/// The standard ordered pattern set.
#[must_use]
pub fn standard_patterns() -> Vec<Box<dyn TextPattern>> {
    vec![
        Box::new(PaymentNotice),
        Box::new(DebitAlert),
        Box::new(AmountNearCurrency),
        Box::new(DateAnywhere),
        Box::new(MerchantAfterKeyword),
    ]
}

/// Wallet/payment-service receipts: "Payment of NPR 1,500.00 to Grocery
/// Store on 2024-03-01", "You paid Rs. 350 to Cafe".
struct PaymentNotice;

static PAYMENT_WITH_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?i)(?:payment of|paid|sent)\s+(?P<cur>{CURRENCY})\s*(?P<amt>{AMOUNT})\s+to\s+(?P<merchant>[^\n.]+?)\s+on\s+(?P<date>{DATE})"
    ))
    .expect("valid regex")
});

static PAYMENT_NO_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?i)(?:payment of|paid|sent)\s+(?P<cur>{CURRENCY})\s*(?P<amt>{AMOUNT})\s+to\s+(?P<merchant>[^\n.]+?)\s*(?:[.\n]|$)"
    ))
    .expect("valid regex")
});

impl TextPattern for PaymentNotice {
    fn name(&self) -> &'static str {
        "payment-notice"
    }

    fn try_extract(&self, text: &str) -> Option<FieldCapture> {
        let caps = PAYMENT_WITH_DATE
            .captures(text)
            .or_else(|| PAYMENT_NO_DATE.captures(text))?;
        Some(capture_fields(&caps, 0.95))
    }
}

/// Bank debit/card alerts: "debited by NPR 2,500.00 on 01/03/2024 at
/// Bhatbhateni", "charged USD 42.50 at Coffee House on 2024-05-10".
struct DebitAlert;

static DEBIT_MERCHANT_FIRST: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?i)(?:debited|deducted|charged)(?:\s+(?:by|for|with))?\s+(?P<cur>{CURRENCY})\s*(?P<amt>{AMOUNT})\s+at\s+(?P<merchant>[^\n.]+?)(?:\s+on\s+(?P<date>{DATE})|\s*(?:[.\n]|$))"
    ))
    .expect("valid regex")
});

static DEBIT_DATE_FIRST: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?i)(?:debited|deducted|charged)(?:\s+(?:by|for|with))?\s+(?P<cur>{CURRENCY})\s*(?P<amt>{AMOUNT})(?:\s+on\s+(?P<date>{DATE}))?(?:\s+at\s+(?P<merchant>[^\n.]+?)\s*(?:[.\n]|$))?"
    ))
    .expect("valid regex")
});

impl TextPattern for DebitAlert {
    fn name(&self) -> &'static str {
        "debit-alert"
    }

    fn try_extract(&self, text: &str) -> Option<FieldCapture> {
        let caps = DEBIT_MERCHANT_FIRST
            .captures(text)
            .or_else(|| DEBIT_DATE_FIRST.captures(text))?;
        Some(capture_fields(&caps, 0.9))
    }
}

/// Generic fallback: any amount adjacent to a currency token.
struct AmountNearCurrency;

static CURRENCY_THEN_AMOUNT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"(?i)(?P<cur>{CURRENCY})\s*(?P<amt>{AMOUNT})")).expect("valid regex")
});

static AMOUNT_THEN_CURRENCY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"(?i)(?P<amt>{AMOUNT})\s*(?P<cur>{CURRENCY})")).expect("valid regex")
});

impl TextPattern for AmountNearCurrency {
    fn name(&self) -> &'static str {
        "amount-near-currency"
    }

    fn try_extract(&self, text: &str) -> Option<FieldCapture> {
        let caps = CURRENCY_THEN_AMOUNT
            .captures(text)
            .or_else(|| AMOUNT_THEN_CURRENCY.captures(text))?;
        Some(capture_fields(&caps, 0.6))
    }
}

/// Date fallback: the first recognizable date token anywhere in the text.
struct DateAnywhere;

static ANY_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?P<date>{DATE}|(?:Jan|Feb|Mar|Apr|May|Jun|Jul|Aug|Sep|Oct|Nov|Dec)[a-z]*\s+\d{{1,2}},?\s+\d{{4}})"
    ))
    .expect("valid regex")
});

impl TextPattern for DateAnywhere {
    fn name(&self) -> &'static str {
        "date-anywhere"
    }

    fn try_extract(&self, text: &str) -> Option<FieldCapture> {
        let caps = ANY_DATE.captures(text)?;
        let date = caps.name("date").and_then(|m| parse_date(m.as_str()))?;
        Some(FieldCapture {
            date: Some(date),
            confidence: 0.5,
            ..FieldCapture::default()
        })
    }
}

/// Merchant fallback: a capitalized name after "at"/"to".
struct MerchantAfterKeyword;

static MERCHANT_KEYWORD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b(?:at|to)\s+(?P<merchant>[A-Z][A-Za-z0-9&'\-]*(?:\s+[A-Z][A-Za-z0-9&'\-]*){0,4})",
    )
    .expect("valid regex")
});

impl TextPattern for MerchantAfterKeyword {
    fn name(&self) -> &'static str {
        "merchant-after-keyword"
    }

    fn try_extract(&self, text: &str) -> Option<FieldCapture> {
        let caps = MERCHANT_KEYWORD.captures(text)?;
        let merchant = caps.name("merchant")?.as_str().trim().to_string();
        Some(FieldCapture {
            merchant: Some(merchant),
            confidence: 0.5,
            ..FieldCapture::default()
        })
    }
}

/// Builds a capture from the shared named groups.
fn capture_fields(caps: &regex::Captures<'_>, confidence: f64) -> FieldCapture {
    FieldCapture {
        amount: caps.name("amt").and_then(|m| parse_amount(m.as_str())),
        currency: caps.name("cur").map(|m| normalize_currency(m.as_str())),
        merchant: caps
            .name("merchant")
            .map(|m| m.as_str().trim().to_string())
            .filter(|s| !s.is_empty()),
        date: caps.name("date").and_then(|m| parse_date(m.as_str())),
        confidence,
    }
}

/// Parses an amount token, stripping thousands separators. Zero and
/// unparseable amounts yield `None`.
fn parse_amount(raw: &str) -> Option<f64> {
    let cleaned = raw.replace(',', "");
    let value: f64 = cleaned.parse().ok()?;
    (value > 0.0).then_some(value)
}

/// Normalizes a currency token to an ISO-style code.
fn normalize_currency(raw: &str) -> String {
    let trimmed = raw.trim_end_matches('.');
    match trimmed {
        "रु" => "NPR".to_string(),
        "₹" => "INR".to_string(),
        "$" => "USD".to_string(),
        "€" => "EUR".to_string(),
        "£" => "GBP".to_string(),
        other if other.eq_ignore_ascii_case("rs") => "NPR".to_string(),
        other => other.to_uppercase(),
    }
}

/// Parses a date token in any supported institution format.
fn parse_date(raw: &str) -> Option<NaiveDate> {
    const FORMATS: &[&str] = &[
        "%Y-%m-%d",
        "%d/%m/%Y",
        "%d-%m-%Y",
        "%b %d, %Y",
        "%b %d %Y",
        "%B %d, %Y",
        "%B %d %Y",
    ];

    FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(raw, format).ok())
}
