//! Batch validation: partition raw records into valid and rejected sets.
//!
//! The validator gatekeeps, it does not transform — accepted records are
//! passed on in their original raw form and the storage layer normalizes
//! them independently.

use crate::models::{CryptoPrice, FieldViolation, RawPriceRecord};
use tracing::{debug, warn};

// ── Outcome types ─────────────────────────────────────────────────────────────

/// Why one raw record was rejected: its position in the batch, the record
/// itself, and every constraint it violated.
#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    pub index: usize,
    pub record: RawPriceRecord,
    pub violations: Vec<FieldViolation>,
}

/// Result of validating one batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationOutcome {
    /// Accepted records, original order and contents preserved.
    pub valid: Vec<RawPriceRecord>,
    pub rejections: Vec<Rejection>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValidationSummary {
    pub total: usize,
    pub valid: usize,
    pub invalid: usize,
}

impl ValidationSummary {
    /// Fraction of the batch that validated; 0.0 for an empty batch.
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.valid as f64 / self.total as f64
        }
    }
}

impl ValidationOutcome {
    pub fn summary(&self) -> ValidationSummary {
        ValidationSummary {
            total: self.valid.len() + self.rejections.len(),
            valid: self.valid.len(),
            invalid: self.rejections.len(),
        }
    }
}

// ── Validation ────────────────────────────────────────────────────────────────

/// Validate every record independently; one record's failure never aborts
/// the batch. Deterministic for a given input.
pub fn validate(batch: &[RawPriceRecord]) -> ValidationOutcome {
    let mut outcome = ValidationOutcome::default();

    for (index, record) in batch.iter().enumerate() {
        match CryptoPrice::from_raw(record) {
            Ok(_) => {
                debug!("record {} ({}) validated", index + 1, record.display_name());
                outcome.valid.push(record.clone());
            }
            Err(violation) => {
                warn!(
                    "record {} ({}) rejected: {}",
                    index + 1,
                    record.display_name(),
                    violation
                );
                for detail in &violation.violations {
                    warn!("  - {}", detail);
                }
                outcome.rejections.push(Rejection {
                    index,
                    record: record.clone(),
                    violations: violation.violations,
                });
            }
        }
    }

    outcome
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(symbol: &str, price: f64) -> RawPriceRecord {
        serde_json::from_value(json!({
            "id": symbol,
            "symbol": symbol,
            "name": symbol.to_uppercase(),
            "image": format!("https://img.example/{symbol}.png"),
            "current_price": price,
            "market_cap": 1_000_000,
            "market_cap_rank": 1,
            "total_volume": 50_000,
            "high_24h": price * 1.05,
            "low_24h": price * 0.95,
            "price_change_24h": 1.0,
            "price_change_percentage_24h": 0.5,
            "market_cap_change_24h": 100.0,
            "market_cap_change_percentage_24h": 0.4,
            "circulating_supply": 1_000_000.0,
            "ath": price * 2.0,
            "ath_change_percentage": -50.0,
            "ath_date": "2024-01-01T00:00:00Z",
            "atl": price * 0.1,
            "atl_change_percentage": 900.0,
            "atl_date": "2020-01-01T00:00:00Z",
            "last_updated": "2025-01-20T10:30:00Z"
        }))
        .unwrap()
    }

    #[test]
    fn counts_always_add_up() {
        let mut bad = record("eth", 3000.0);
        bad.market_cap_rank = Some(json!(-1));
        let batch = vec![record("btc", 97000.0), bad, record("sol", 200.0)];

        let outcome = validate(&batch);
        let summary = outcome.summary();
        assert_eq!(summary.total, 3);
        assert_eq!(summary.valid + summary.invalid, summary.total);
        assert_eq!(summary.valid, 2);
        assert_eq!(summary.invalid, 1);
    }

    #[test]
    fn empty_batch_has_zero_rate_without_panicking() {
        let outcome = validate(&[]);
        let summary = outcome.summary();
        assert_eq!(summary.total, 0);
        assert_eq!(summary.success_rate(), 0.0);
    }

    #[test]
    fn accepted_records_are_the_originals() {
        let batch = vec![record("btc", 97000.0), record("ada", 0.9)];
        let outcome = validate(&batch);
        assert_eq!(outcome.valid, batch);
    }

    #[test]
    fn rejection_keeps_index_record_and_diagnostics() {
        let mut bad = record("dot", 7.5);
        bad.market_cap_rank = Some(json!(-1));
        let batch = vec![record("btc", 97000.0), bad.clone()];

        let outcome = validate(&batch);
        assert_eq!(outcome.rejections.len(), 1);
        let rejection = &outcome.rejections[0];
        assert_eq!(rejection.index, 1);
        assert_eq!(rejection.record, bad);
        assert!(rejection.violations.iter().any(|f| f.field == "market_cap_rank"));
    }

    #[test]
    fn one_bad_record_never_aborts_the_batch() {
        let mut batch: Vec<RawPriceRecord> =
            (0..5).map(|i| record("btc", 100.0 + i as f64)).collect();
        batch[2].current_price = Some(json!("garbage"));

        let outcome = validate(&batch);
        assert_eq!(outcome.valid.len(), 4);
        assert_eq!(outcome.rejections.len(), 1);
    }

    #[test]
    fn validation_is_deterministic() {
        let mut bad = record("xlm", 0.4);
        bad.symbol = Some(json!("XLM"));
        let batch = vec![record("btc", 97000.0), bad];

        let first = validate(&batch);
        let second = validate(&batch);
        assert_eq!(first, second);
    }
}
