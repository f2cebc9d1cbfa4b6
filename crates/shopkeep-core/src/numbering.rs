//! # Document Numbering
//!
//! Human-readable numbers for orders and purchases.
//!
//! ## Format
//! ```text
//!   ORD 261016 0007
//!   ─┬─ ───┬── ──┬─
//!    │     │     └── per-day, per-kind sequence (zero padded to 4)
//!    │     └──────── YYMMDD
//!    └────────────── ORD (sale) │ EX (exchange) │ RF (return) │ PUR (purchase)
//! ```
//!
//! The sequence value comes from an atomically incremented counter row in the
//! database (`shopkeep-db::repository::sequence`); this module only formats.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::types::OrderType;

/// The document families that get their own numbering sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Sale,
    Exchange,
    Return,
    Purchase,
}

impl DocumentKind {
    /// Number prefix.
    pub const fn prefix(&self) -> &'static str {
        match self {
            DocumentKind::Sale => "ORD",
            DocumentKind::Exchange => "EX",
            DocumentKind::Return => "RF",
            DocumentKind::Purchase => "PUR",
        }
    }

    /// Counter scope key, stable across releases.
    pub const fn scope(&self) -> &'static str {
        match self {
            DocumentKind::Sale => "sale",
            DocumentKind::Exchange => "exchange",
            DocumentKind::Return => "return",
            DocumentKind::Purchase => "purchase",
        }
    }
}

impl From<OrderType> for DocumentKind {
    fn from(order_type: OrderType) -> Self {
        match order_type {
            OrderType::Sale => DocumentKind::Sale,
            OrderType::Exchange => DocumentKind::Exchange,
            OrderType::Return => DocumentKind::Return,
        }
    }
}

/// `YYMMDD` day key used both in the number and as the counter partition.
pub fn day_key(date: NaiveDate) -> String {
    date.format("%y%m%d").to_string()
}

/// Formats a document number.
///
/// ```rust
/// use chrono::NaiveDate;
/// use shopkeep_core::numbering::{format_document_number, DocumentKind};
///
/// let day = NaiveDate::from_ymd_opt(2026, 10, 16).unwrap();
/// assert_eq!(format_document_number(DocumentKind::Sale, day, 7), "ORD2610160007");
/// assert_eq!(format_document_number(DocumentKind::Return, day, 12), "RF2610160012");
/// ```
///
/// Past 9999 documents in a day the sequence simply widens; numbers stay
/// unique.
pub fn format_document_number(kind: DocumentKind, date: NaiveDate, sequence: i64) -> String {
    format!("{}{}{:04}", kind.prefix(), day_key(date), sequence)
}

/// Splits a document number into its kind, day key and sequence.
///
/// Returns `None` for anything that does not follow the format.
pub fn parse_document_number(number: &str) -> Option<(DocumentKind, &str, i64)> {
    let kinds = [
        DocumentKind::Purchase,
        DocumentKind::Sale,
        DocumentKind::Exchange,
        DocumentKind::Return,
    ];

    let (kind, rest) = kinds
        .iter()
        .find_map(|k| number.strip_prefix(k.prefix()).map(|rest| (*k, rest)))?;

    if rest.len() < 10 || !rest.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    let (day, seq) = rest.split_at(6);
    let sequence = seq.parse().ok()?;
    Some((kind, day, sequence))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, 5).unwrap()
    }

    #[test]
    fn test_prefixes() {
        assert_eq!(format_document_number(DocumentKind::Sale, day(), 1), "ORD2601050001");
        assert_eq!(format_document_number(DocumentKind::Exchange, day(), 1), "EX2601050001");
        assert_eq!(format_document_number(DocumentKind::Return, day(), 1), "RF2601050001");
        assert_eq!(format_document_number(DocumentKind::Purchase, day(), 1), "PUR2601050001");
    }

    #[test]
    fn test_sequence_widens_past_four_digits() {
        assert_eq!(
            format_document_number(DocumentKind::Sale, day(), 12345),
            "ORD26010512345"
        );
    }

    #[test]
    fn test_parse() {
        assert_eq!(
            parse_document_number("EX2601050042"),
            Some((DocumentKind::Exchange, "260105", 42))
        );
        assert_eq!(parse_document_number("ORD26010"), None);
        assert_eq!(parse_document_number("XYZ2601050001"), None);
    }

    #[test]
    fn test_kind_from_order_type() {
        assert_eq!(DocumentKind::from(OrderType::Return), DocumentKind::Return);
    }
}
