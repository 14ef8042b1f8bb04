//! Content extraction: transaction candidates from message text and image
//! attachments.
//!
//! Extraction runs an ordered set of named patterns over the text. The
//! first pattern to produce a value for a field wins that field; unmatched
//! fields stay absent rather than guessed. An extraction with no amount is
//! discarded — amount is the one mandatory field.

mod patterns;

pub use patterns::{FieldCapture, TextPattern, standard_patterns};

use bytes::Bytes;
use chrono::NaiveDate;
use serde::Serialize;
use tracing::debug;

use crate::Result;
use crate::candidate::Source;
use mailclerk_recognition::Recognizer;

/// A transaction extracted from text, before staging fills in fallbacks.
#[derive(Debug, Clone, Serialize)]
pub struct Extraction {
    /// Extracted amount.
    pub amount: f64,
    /// Currency code.
    pub currency: String,
    /// Merchant text, if any pattern captured one.
    pub merchant: Option<String>,
    /// Transaction date, if any pattern captured one.
    pub date: Option<NaiveDate>,
    /// Combined confidence in [0,1].
    pub confidence: f64,
    /// Name of the pattern that supplied the amount.
    pub pattern: &'static str,
    /// Extraction source tag.
    pub source: Source,
}

/// Runs the ordered pattern set over message content.
pub struct ContentExtractor {
    patterns: Vec<Box<dyn TextPattern>>,
}

impl std::fmt::Debug for ContentExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentExtractor")
            .field("patterns", &self.patterns.len())
            .finish()
    }
}

impl Default for ContentExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentExtractor {
    /// Creates an extractor with the standard pattern set.
    #[must_use]
    pub fn new() -> Self {
        Self {
            patterns: standard_patterns(),
        }
    }

    /// Creates an extractor with a custom ordered pattern set.
    #[must_use]
    pub fn with_patterns(patterns: Vec<Box<dyn TextPattern>>) -> Self {
        Self { patterns }
    }

    /// Extracts transaction candidates from message text.
    ///
    /// Returns at most one extraction: fields are merged across patterns in
    /// order, and the staging layer only keeps one candidate per message
    /// and source anyway.
    #[must_use]
    pub fn extract_from_text(&self, text: &str) -> Vec<Extraction> {
        let mut amount: Option<(f64, String, f64, &'static str)> = None;
        let mut merchant: Option<String> = None;
        let mut date: Option<NaiveDate> = None;

        for pattern in &self.patterns {
            let Some(capture) = pattern.try_extract(text) else {
                continue;
            };

            if amount.is_none()
                && let (Some(value), Some(currency)) = (capture.amount, capture.currency.clone())
            {
                amount = Some((value, currency, capture.confidence, pattern.name()));
            }
            if merchant.is_none() {
                merchant = capture.merchant;
            }
            if date.is_none() {
                date = capture.date;
            }
        }

        let Some((amount, currency, confidence, pattern)) = amount else {
            // No amount, no candidate.
            return Vec::new();
        };

        debug!(pattern, amount, %currency, "Extracted transaction from text");
        vec![Extraction {
            amount,
            currency,
            merchant,
            date,
            confidence,
            pattern,
            source: Source::TextPattern,
        }]
    }

    /// Extracts transaction candidates from an image attachment.
    ///
    /// Delegates text recovery to the recognition engine, then runs the
    /// same pattern set over the recovered text. The final confidence is
    /// the pattern confidence scaled by the engine's own confidence.
    ///
    /// # Errors
    ///
    /// Returns an error if the recognition engine fails; pattern misses are
    /// not errors, they yield an empty result.
    pub async fn extract_from_attachment(
        &self,
        recognizer: &dyn Recognizer,
        image: Bytes,
    ) -> Result<Vec<Extraction>> {
        let recovered = recognizer.recognize(image).await?;
        let engine_confidence = recovered.bounded_confidence();

        let extractions = self
            .extract_from_text(&recovered.text)
            .into_iter()
            .map(|mut e| {
                e.source = Source::RecognitionEngine;
                e.confidence *= engine_confidence;
                e
            })
            .collect();

        Ok(extractions)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mailclerk_recognition::RecoveredText;

    struct FixedRecognizer {
        text: String,
        confidence: f64,
    }

    #[async_trait]
    impl Recognizer for FixedRecognizer {
        async fn recognize(&self, _image: Bytes) -> mailclerk_recognition::Result<RecoveredText> {
            Ok(RecoveredText {
                text: self.text.clone(),
                confidence: self.confidence,
            })
        }
    }

    #[test]
    fn test_payment_notice_extraction() {
        let extractor = ContentExtractor::new();
        let found = extractor
            .extract_from_text("Payment of NPR 1,500.00 to Grocery Store on 2024-03-01");

        assert_eq!(found.len(), 1);
        let e = &found[0];
        assert_eq!(e.amount, 1500.00);
        assert_eq!(e.currency, "NPR");
        assert_eq!(e.merchant.as_deref(), Some("Grocery Store"));
        assert_eq!(e.date, NaiveDate::from_ymd_opt(2024, 3, 1));
        assert_eq!(e.source, Source::TextPattern);
        assert!(e.confidence > 0.9);
    }

    #[test]
    fn test_no_amount_is_discarded() {
        let extractor = ContentExtractor::new();
        assert!(
            extractor
                .extract_from_text("Thank you for shopping at Grocery Store on 2024-03-01")
                .is_empty()
        );
    }

    #[test]
    fn test_unmatched_fields_stay_absent() {
        let extractor = ContentExtractor::new();
        let found = extractor.extract_from_text("Rs. 250 spent");

        assert_eq!(found.len(), 1);
        assert!(found[0].merchant.is_none());
        assert!(found[0].date.is_none());
    }

    #[test]
    fn test_extraction_is_deterministic() {
        let extractor = ContentExtractor::new();
        let text = "Your card was charged USD 42.50 at Coffee House on 2024-05-10.";

        let first = extractor.extract_from_text(text);
        let second = extractor.extract_from_text(text);
        assert_eq!(first.len(), second.len());
        assert_eq!(first[0].amount, second[0].amount);
        assert_eq!(first[0].merchant, second[0].merchant);
    }

    #[tokio::test]
    async fn test_attachment_confidence_is_scaled() {
        let extractor = ContentExtractor::new();
        let recognizer = FixedRecognizer {
            text: "Payment of NPR 1,500.00 to Grocery Store on 2024-03-01".to_string(),
            confidence: 0.8,
        };

        let found = extractor
            .extract_from_attachment(&recognizer, Bytes::from_static(b"png-bytes"))
            .await
            .unwrap();

        assert_eq!(found.len(), 1);
        let e = &found[0];
        assert_eq!(e.source, Source::RecognitionEngine);
        // Pattern confidence (0.95) scaled by engine confidence (0.8).
        assert!((e.confidence - 0.95 * 0.8).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_attachment_with_no_text_yields_nothing() {
        let extractor = ContentExtractor::new();
        let recognizer = FixedRecognizer {
            text: "blurry unreadable scan".to_string(),
            confidence: 0.3,
        };

        let found = extractor
            .extract_from_attachment(&recognizer, Bytes::from_static(b"png-bytes"))
            .await
            .unwrap();
        assert!(found.is_empty());
    }
}
