use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

// ── Raw record ────────────────────────────────────────────────────────────────

/// One market entry as received from CoinGecko `/coins/markets` (or the
/// synthetic generator). Values stay loose (`serde_json::Value`) so the
/// validator can report type mismatches per field instead of failing the
/// whole payload decode. Unknown keys are dropped by serde.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawPriceRecord {
    pub id: Option<Value>,
    pub symbol: Option<Value>,
    pub name: Option<Value>,
    pub image: Option<Value>,
    pub current_price: Option<Value>,
    pub market_cap: Option<Value>,
    pub market_cap_rank: Option<Value>,
    pub fully_diluted_valuation: Option<Value>,
    pub total_volume: Option<Value>,
    pub high_24h: Option<Value>,
    pub low_24h: Option<Value>,
    pub price_change_24h: Option<Value>,
    pub price_change_percentage_24h: Option<Value>,
    pub market_cap_change_24h: Option<Value>,
    pub market_cap_change_percentage_24h: Option<Value>,
    pub circulating_supply: Option<Value>,
    pub total_supply: Option<Value>,
    pub max_supply: Option<Value>,
    pub ath: Option<Value>,
    pub ath_change_percentage: Option<Value>,
    pub ath_date: Option<Value>,
    pub atl: Option<Value>,
    pub atl_change_percentage: Option<Value>,
    pub atl_date: Option<Value>,
    pub roi: Option<Value>,
    pub last_updated: Option<Value>,
    pub fetched_at: Option<Value>,
}

impl RawPriceRecord {
    /// Coin name for log lines, "unknown" when absent or non-string.
    pub fn display_name(&self) -> &str {
        self.name
            .as_ref()
            .and_then(Value::as_str)
            .unwrap_or("unknown")
    }
}

// ── Canonical record ──────────────────────────────────────────────────────────

/// Fully validated market entry. Produced by [`CryptoPrice::from_raw`]; the
/// pipeline keeps passing the original raw record downstream, so this type
/// is the validation contract rather than the storage payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CryptoPrice {
    pub id: String,
    pub symbol: String,
    pub name: String,
    pub image: String,
    pub current_price: f64,
    pub market_cap: i64,
    pub market_cap_rank: i64,
    pub fully_diluted_valuation: Option<i64>,
    pub total_volume: i64,
    pub high_24h: f64,
    pub low_24h: f64,
    pub price_change_24h: f64,
    pub price_change_percentage_24h: f64,
    pub market_cap_change_24h: f64,
    pub market_cap_change_percentage_24h: f64,
    pub circulating_supply: f64,
    pub total_supply: Option<f64>,
    pub max_supply: Option<f64>,
    pub ath: f64,
    pub ath_change_percentage: f64,
    pub ath_date: String,
    pub atl: f64,
    pub atl_change_percentage: f64,
    pub atl_date: String,
    pub roi: Option<serde_json::Map<String, Value>>,
    pub last_updated: String,
    pub fetched_at: Option<String>,
}

// ── Violations ────────────────────────────────────────────────────────────────

/// A single violated constraint: field, offending value, reason.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldViolation {
    pub field: &'static str,
    pub value: String,
    pub reason: String,
}

impl std::fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "field '{}': {} - {}", self.field, self.value, self.reason)
    }
}

/// Every constraint a record violated. Checks never short-circuit, so the
/// list is exhaustive for the record.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{} constraint(s) violated", violations.len())]
pub struct SchemaViolation {
    pub violations: Vec<FieldViolation>,
}

// ── Field checks ──────────────────────────────────────────────────────────────
//
// Explicit per-field coercions. Each helper pushes at most one violation and
// returns a placeholder on failure; the caller only keeps the built record
// when the violation list ends up empty.

/// JSON `null` counts as absent, same as a missing key.
fn present(value: Option<&Value>) -> Option<&Value> {
    value.filter(|v| !v.is_null())
}

fn render(value: Option<&Value>) -> String {
    match present(value) {
        None => "null".to_string(),
        Some(v) => {
            let s = v.to_string();
            if s.chars().count() > 120 {
                let mut t: String = s.chars().take(120).collect();
                t.push('…');
                t
            } else {
                s
            }
        }
    }
}

fn violation(
    out: &mut Vec<FieldViolation>,
    field: &'static str,
    value: Option<&Value>,
    reason: &str,
) {
    out.push(FieldViolation {
        field,
        value: render(value),
        reason: reason.to_string(),
    });
}

/// Integer coercion; integral floats are accepted, fractional ones are not.
fn integer_of(value: &Value) -> Option<i64> {
    if let Some(i) = value.as_i64() {
        return Some(i);
    }
    match value.as_f64() {
        Some(f) if f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Some(f as i64),
        _ => None,
    }
}

fn take_string(out: &mut Vec<FieldViolation>, field: &'static str, value: Option<&Value>) -> String {
    match present(value) {
        None => {
            violation(out, field, value, "required but absent");
            String::new()
        }
        Some(Value::String(s)) => s.clone(),
        Some(other) => {
            violation(out, field, Some(other), "expected a string");
            String::new()
        }
    }
}

fn take_non_empty_string(
    out: &mut Vec<FieldViolation>,
    field: &'static str,
    value: Option<&Value>,
) -> String {
    match present(value) {
        None => {
            violation(out, field, value, "required but absent");
            String::new()
        }
        Some(Value::String(s)) => {
            if s.is_empty() {
                violation(out, field, value, "must not be empty");
            }
            s.clone()
        }
        Some(other) => {
            violation(out, field, Some(other), "expected a string");
            String::new()
        }
    }
}

fn take_symbol(out: &mut Vec<FieldViolation>, field: &'static str, value: Option<&Value>) -> String {
    match present(value) {
        None => {
            violation(out, field, value, "required but absent");
            String::new()
        }
        Some(Value::String(s)) => {
            let lower_alnum = s
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit());
            if s.is_empty() || !lower_alnum {
                violation(out, field, value, "must be lowercase alphanumeric");
            }
            s.clone()
        }
        Some(other) => {
            violation(out, field, Some(other), "expected a string");
            String::new()
        }
    }
}

fn take_f64(out: &mut Vec<FieldViolation>, field: &'static str, value: Option<&Value>) -> f64 {
    match present(value) {
        None => {
            violation(out, field, value, "required but absent");
            0.0
        }
        Some(v) => match v.as_f64() {
            Some(f) => f,
            None => {
                violation(out, field, Some(v), "expected a number");
                0.0
            }
        },
    }
}

fn take_non_negative_f64(
    out: &mut Vec<FieldViolation>,
    field: &'static str,
    value: Option<&Value>,
) -> f64 {
    let before = out.len();
    let f = take_f64(out, field, value);
    if out.len() == before && f < 0.0 {
        violation(out, field, present(value), "must be non-negative");
    }
    f
}

fn take_percentage(
    out: &mut Vec<FieldViolation>,
    field: &'static str,
    value: Option<&Value>,
) -> f64 {
    let before = out.len();
    let f = take_f64(out, field, value);
    if out.len() == before && f.abs() > 1000.0 {
        violation(out, field, present(value), "percentage change out of range");
    }
    f
}

fn take_i64(out: &mut Vec<FieldViolation>, field: &'static str, value: Option<&Value>) -> i64 {
    match present(value) {
        None => {
            violation(out, field, value, "required but absent");
            0
        }
        Some(v) => match integer_of(v) {
            Some(i) => i,
            None => {
                violation(out, field, Some(v), "expected an integer");
                0
            }
        },
    }
}

fn take_non_negative_i64(
    out: &mut Vec<FieldViolation>,
    field: &'static str,
    value: Option<&Value>,
) -> i64 {
    let before = out.len();
    let i = take_i64(out, field, value);
    if out.len() == before && i < 0 {
        violation(out, field, present(value), "must be non-negative");
    }
    i
}

fn take_positive_i64(
    out: &mut Vec<FieldViolation>,
    field: &'static str,
    value: Option<&Value>,
) -> i64 {
    let before = out.len();
    let i = take_i64(out, field, value);
    if out.len() == before && i <= 0 {
        violation(out, field, present(value), "must be positive");
    }
    i
}

fn opt_f64(
    out: &mut Vec<FieldViolation>,
    field: &'static str,
    value: Option<&Value>,
) -> Option<f64> {
    let v = present(value)?;
    match v.as_f64() {
        Some(f) => Some(f),
        None => {
            violation(out, field, Some(v), "expected a number");
            None
        }
    }
}

fn opt_i64(
    out: &mut Vec<FieldViolation>,
    field: &'static str,
    value: Option<&Value>,
) -> Option<i64> {
    let v = present(value)?;
    match integer_of(v) {
        Some(i) => Some(i),
        None => {
            violation(out, field, Some(v), "expected an integer");
            None
        }
    }
}

fn opt_string(
    out: &mut Vec<FieldViolation>,
    field: &'static str,
    value: Option<&Value>,
) -> Option<String> {
    match present(value)? {
        Value::String(s) => Some(s.clone()),
        other => {
            violation(out, field, Some(other), "expected a string");
            None
        }
    }
}

fn opt_object(
    out: &mut Vec<FieldViolation>,
    field: &'static str,
    value: Option<&Value>,
) -> Option<serde_json::Map<String, Value>> {
    match present(value)? {
        Value::Object(map) => Some(map.clone()),
        other => {
            violation(out, field, Some(other), "expected an object");
            None
        }
    }
}

// ── Conversion ────────────────────────────────────────────────────────────────

impl CryptoPrice {
    /// Validate a raw record against every constraint at once. Pure: no
    /// side effects, same input always yields the same result.
    pub fn from_raw(raw: &RawPriceRecord) -> Result<Self, SchemaViolation> {
        let mut v = Vec::new();

        let record = CryptoPrice {
            id: take_non_empty_string(&mut v, "id", raw.id.as_ref()),
            symbol: take_symbol(&mut v, "symbol", raw.symbol.as_ref()),
            name: take_non_empty_string(&mut v, "name", raw.name.as_ref()),
            image: take_string(&mut v, "image", raw.image.as_ref()),
            current_price: take_non_negative_f64(&mut v, "current_price", raw.current_price.as_ref()),
            market_cap: take_non_negative_i64(&mut v, "market_cap", raw.market_cap.as_ref()),
            market_cap_rank: take_positive_i64(&mut v, "market_cap_rank", raw.market_cap_rank.as_ref()),
            fully_diluted_valuation: opt_i64(
                &mut v,
                "fully_diluted_valuation",
                raw.fully_diluted_valuation.as_ref(),
            ),
            total_volume: take_non_negative_i64(&mut v, "total_volume", raw.total_volume.as_ref()),
            high_24h: take_non_negative_f64(&mut v, "high_24h", raw.high_24h.as_ref()),
            low_24h: take_non_negative_f64(&mut v, "low_24h", raw.low_24h.as_ref()),
            price_change_24h: take_f64(&mut v, "price_change_24h", raw.price_change_24h.as_ref()),
            price_change_percentage_24h: take_percentage(
                &mut v,
                "price_change_percentage_24h",
                raw.price_change_percentage_24h.as_ref(),
            ),
            market_cap_change_24h: take_f64(
                &mut v,
                "market_cap_change_24h",
                raw.market_cap_change_24h.as_ref(),
            ),
            market_cap_change_percentage_24h: take_percentage(
                &mut v,
                "market_cap_change_percentage_24h",
                raw.market_cap_change_percentage_24h.as_ref(),
            ),
            circulating_supply: take_f64(&mut v, "circulating_supply", raw.circulating_supply.as_ref()),
            total_supply: opt_f64(&mut v, "total_supply", raw.total_supply.as_ref()),
            max_supply: opt_f64(&mut v, "max_supply", raw.max_supply.as_ref()),
            ath: take_f64(&mut v, "ath", raw.ath.as_ref()),
            ath_change_percentage: take_f64(
                &mut v,
                "ath_change_percentage",
                raw.ath_change_percentage.as_ref(),
            ),
            ath_date: take_string(&mut v, "ath_date", raw.ath_date.as_ref()),
            atl: take_f64(&mut v, "atl", raw.atl.as_ref()),
            atl_change_percentage: take_f64(
                &mut v,
                "atl_change_percentage",
                raw.atl_change_percentage.as_ref(),
            ),
            atl_date: take_string(&mut v, "atl_date", raw.atl_date.as_ref()),
            roi: opt_object(&mut v, "roi", raw.roi.as_ref()),
            last_updated: take_string(&mut v, "last_updated", raw.last_updated.as_ref()),
            fetched_at: opt_string(&mut v, "fetched_at", raw.fetched_at.as_ref()),
        };

        if v.is_empty() {
            Ok(record)
        } else {
            Err(SchemaViolation { violations: v })
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
