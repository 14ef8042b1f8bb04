//! Financial classification of messages.
//!
//! Scores whether a message is transaction-relevant from sender-domain
//! allowlist matches and subject/body patterns. Scoring is pure arithmetic
//! over fixed tables, so the same input always classifies the same way.

#![allow(clippy::expect_used)]

use once_cell::sync::Lazy;
use regex::Regex;

use crate::message::Message;

/// Default score threshold for the financial decision.
const DEFAULT_THRESHOLD: f64 = 0.5;

/// Sender domains that are always transaction-relevant: banks, wallets,
/// payment processors.
const FINANCIAL_SENDER_DOMAINS: &[&str] = &[
    "esewa.com.np",
    "khalti.com",
    "imepay.com.np",
    "fonepay.com",
    "nicasiabank.com",
    "nabilbank.com",
    "globalimebank.com",
    "standardchartered.com",
    "paypal.com",
    "stripe.com",
    "wise.com",
    "payoneer.com",
];

/// Domain fragments that suggest a financial sender.
const FINANCIAL_DOMAIN_HINTS: &[&str] = &["bank", "pay", "card", "wallet", "finance"];

/// Subject/body words that suggest a transaction.
const TRANSACTION_KEYWORDS: &[&str] = &[
    "payment",
    "receipt",
    "transaction",
    "debited",
    "credited",
    "invoice",
    "purchase",
    "statement",
    "transfer",
    "paid",
    "charged",
    "withdrawal",
    "deposit",
];

static CURRENCY_AMOUNT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:NPR|INR|USD|EUR|GBP|Rs\.?|रु|₹|\$|€|£)\s*\d").expect("valid regex")
});

/// Classification outcome: the decision plus the score behind it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    /// Whether the message crossed the financial threshold.
    pub financial: bool,
    /// Combined score in [0,1].
    pub score: f64,
}

/// Deterministic financial classifier.
#[derive(Debug, Clone, Copy)]
pub struct FinancialClassifier {
    threshold: f64,
}

impl Default for FinancialClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl FinancialClassifier {
    /// Creates a classifier with the default threshold.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
        }
    }

    /// Overrides the decision threshold.
    #[must_use]
    pub const fn with_threshold(threshold: f64) -> Self {
        Self { threshold }
    }

    /// Classifies from sender, subject, and (when already fetched) body.
    ///
    /// The body is optional because classification runs on listing
    /// metadata before the pipeline spends a fetch on the full body.
    #[must_use]
    pub fn classify(&self, sender: &str, subject: &str, body: Option<&str>) -> Classification {
        let mut score: f64 = 0.0;

        let domain = sender_domain(sender);
        if FINANCIAL_SENDER_DOMAINS
            .iter()
            .any(|known| domain == *known || domain.ends_with(&format!(".{known}")))
        {
            score += 0.6;
        } else if FINANCIAL_DOMAIN_HINTS.iter().any(|hint| domain.contains(hint)) {
            score += 0.3;
        }

        let subject_lower = subject.to_lowercase();
        if TRANSACTION_KEYWORDS
            .iter()
            .any(|kw| subject_lower.contains(kw))
        {
            score += 0.25;
        }
        if CURRENCY_AMOUNT.is_match(subject) {
            score += 0.35;
        }

        if let Some(body) = body {
            let body_lower = body.to_lowercase();
            if TRANSACTION_KEYWORDS.iter().any(|kw| body_lower.contains(kw)) {
                score += 0.1;
            }
            if CURRENCY_AMOUNT.is_match(body) {
                score += 0.2;
            }
        }

        let score = score.min(1.0);
        Classification {
            financial: score >= self.threshold,
            score,
        }
    }

    /// Classifies a stored message from its listing metadata.
    #[must_use]
    pub fn classify_message(&self, message: &Message) -> Classification {
        self.classify(&message.sender, &message.subject, None)
    }

    /// Convenience boolean form of [`Self::classify`].
    #[must_use]
    pub fn is_financial(&self, sender: &str, subject: &str, body: Option<&str>) -> bool {
        self.classify(sender, subject, body).financial
    }
}

/// Lowercased domain part of a sender address.
fn sender_domain(sender: &str) -> String {
    sender
        .rsplit('@')
        .next()
        .unwrap_or("")
        .trim_end_matches('>')
        .to_lowercase()
}
