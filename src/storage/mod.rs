//! DuckDB persistence for validated market records.
//!
//! The repository owns the table schema and all write access. Records arrive
//! still in raw form (the validator gatekeeps without transforming), so every
//! value is normalized onto the fixed column set here: timestamps to
//! `YYYY-MM-DD HH:MM:SS` text, nested `roi` to a JSON string, missing
//! optional numerics to SQL NULL.
//!
//! Single-writer-only: DuckDB holds an exclusive lock on the database file,
//! so a second process fails at `open` instead of corrupting the table.

use crate::models::RawPriceRecord;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use duckdb::{params, Connection};
use serde_json::Value;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("could not create data directory {path:?}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to open DuckDB at {path:?}")]
    Open {
        path: PathBuf,
        #[source]
        source: duckdb::Error,
    },

    #[error("database operation failed")]
    Database(#[from] duckdb::Error),
}

// ── Schema ────────────────────────────────────────────────────────────────────

// Asserted on every run, never altered on append.
const DDL: &str = r#"
CREATE TABLE IF NOT EXISTS validated_crypto_data (
    id                                  VARCHAR,
    symbol                              VARCHAR,
    name                                VARCHAR,
    image                               VARCHAR,
    current_price                       DOUBLE,
    market_cap                          BIGINT,
    market_cap_rank                     INTEGER,
    fully_diluted_valuation             DOUBLE,
    total_volume                        BIGINT,
    high_24h                            DOUBLE,
    low_24h                             DOUBLE,
    price_change_24h                    DOUBLE,
    price_change_percentage_24h         DOUBLE,
    market_cap_change_24h               DOUBLE,
    market_cap_change_percentage_24h    DOUBLE,
    circulating_supply                  DOUBLE,
    total_supply                        DOUBLE,
    max_supply                          DOUBLE,
    ath                                 DOUBLE,
    ath_change_percentage               DOUBLE,
    ath_date                            VARCHAR,
    atl                                 DOUBLE,
    atl_change_percentage               DOUBLE,
    atl_date                            VARCHAR,
    last_updated                        VARCHAR,
    fetched_at                          VARCHAR,
    roi                                 VARCHAR
);

CREATE TABLE IF NOT EXISTS ingest_runs (
    id                  BIGINT PRIMARY KEY,
    source              VARCHAR NOT NULL,
    started_at          TIMESTAMP NOT NULL,
    finished_at         TIMESTAMP,
    status              VARCHAR NOT NULL DEFAULT 'running',
    records_total       INTEGER DEFAULT 0,
    records_valid       INTEGER DEFAULT 0,
    records_invalid     INTEGER DEFAULT 0,
    rows_appended       INTEGER DEFAULT 0,
    error_msg           VARCHAR
);

CREATE TABLE IF NOT EXISTS schema_version (
    version     INTEGER PRIMARY KEY,
    applied_at  TIMESTAMP NOT NULL
);
"#;

const INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_crypto_symbol  ON validated_crypto_data (symbol);
CREATE INDEX IF NOT EXISTS idx_crypto_fetched ON validated_crypto_data (fetched_at);
"#;

const INSERT_SQL: &str = r#"
INSERT INTO validated_crypto_data (
    id, symbol, name, image,
    current_price, market_cap, market_cap_rank,
    fully_diluted_valuation, total_volume,
    high_24h, low_24h,
    price_change_24h, price_change_percentage_24h,
    market_cap_change_24h, market_cap_change_percentage_24h,
    circulating_supply, total_supply, max_supply,
    ath, ath_change_percentage, ath_date,
    atl, atl_change_percentage, atl_date,
    last_updated, fetched_at, roi
) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
"#;

// ── Value normalization ───────────────────────────────────────────────────────

fn text_of(value: &Option<Value>) -> Option<String> {
    value.as_ref().and_then(Value::as_str).map(str::to_string)
}

fn double_of(value: &Option<Value>) -> Option<f64> {
    value.as_ref().and_then(Value::as_f64)
}

fn bigint_of(value: &Option<Value>) -> Option<i64> {
    let v = value.as_ref()?;
    if let Some(i) = v.as_i64() {
        return Some(i);
    }
    match v.as_f64() {
        Some(f) if f.is_finite() && f.abs() < i64::MAX as f64 => Some(f as i64),
        _ => None,
    }
}

/// Parse upstream timestamp strings: RFC 3339 first, then the bare formats
/// seen in practice.
fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(dt);
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return Some(dt);
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return d.and_hms_opt(0, 0, 0);
    }

    None
}

/// Canonical text form for timestamp columns. Unparseable or missing values
/// become an empty string, never NULL.
fn timestamp_text(value: &Option<Value>) -> String {
    text_of(value)
        .as_deref()
        .and_then(parse_datetime)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_default()
}

/// Nested `roi` object flattened to JSON text; empty string when absent.
fn roi_text(value: &Option<Value>) -> String {
    match value {
        Some(v @ Value::Object(_)) => v.to_string(),
        _ => String::new(),
    }
}

// ── Repository ────────────────────────────────────────────────────────────────

pub struct Repository {
    conn: Connection,
}

impl Repository {
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|source| StorageError::CreateDir {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }
        let conn = Connection::open(path).map_err(|source| StorageError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
        })
    }

    /// Assert the schema. Idempotent; existing tables are left untouched.
    pub fn run_migrations(&self) -> Result<(), StorageError> {
        self.conn.execute_batch(DDL)?;
        self.conn.execute_batch(INDEXES)?;
        self.conn.execute(
            "INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (1, ?)",
            params![Utc::now().naive_utc()],
        )?;
        Ok(())
    }

    // ── Market data ───────────────────────────────────────────────────────────

    /// Append validated records in one transaction: all rows land or none do.
    /// Empty input is a no-op that leaves the table untouched.
    pub fn append_records(&self, records: &[RawPriceRecord]) -> Result<usize, StorageError> {
        if records.is_empty() {
            return Ok(0);
        }

        let tx = self.conn.unchecked_transaction()?;
        for record in records {
            tx.execute(
                INSERT_SQL,
                params![
                    text_of(&record.id),
                    text_of(&record.symbol),
                    text_of(&record.name),
                    text_of(&record.image),
                    double_of(&record.current_price),
                    bigint_of(&record.market_cap),
                    bigint_of(&record.market_cap_rank),
                    double_of(&record.fully_diluted_valuation),
                    bigint_of(&record.total_volume),
                    double_of(&record.high_24h),
                    double_of(&record.low_24h),
                    double_of(&record.price_change_24h),
                    double_of(&record.price_change_percentage_24h),
                    double_of(&record.market_cap_change_24h),
                    double_of(&record.market_cap_change_percentage_24h),
                    double_of(&record.circulating_supply),
                    double_of(&record.total_supply),
                    double_of(&record.max_supply),
                    double_of(&record.ath),
                    double_of(&record.ath_change_percentage),
                    timestamp_text(&record.ath_date),
                    double_of(&record.atl),
                    double_of(&record.atl_change_percentage),
                    timestamp_text(&record.atl_date),
                    timestamp_text(&record.last_updated),
                    timestamp_text(&record.fetched_at),
                    roi_text(&record.roi),
                ],
            )?;
        }
        tx.commit()?;

        info!("Appended {} records", records.len());
        Ok(records.len())
    }

    pub fn row_count(&self) -> Result<i64, StorageError> {
        let mut stmt = self
            .conn
            .prepare("SELECT COUNT(*) FROM validated_crypto_data")?;
        Ok(stmt.query_row([], |r| r.get(0))?)
    }

    pub fn coin_count(&self) -> Result<i64, StorageError> {
        let mut stmt = self
            .conn
            .prepare("SELECT COUNT(DISTINCT id) FROM validated_crypto_data")?;
        Ok(stmt.query_row([], |r| r.get(0))?)
    }

    /// Earliest and latest `fetched_at` values; the canonical text format
    /// sorts chronologically.
    pub fn fetched_at_range(&self) -> Result<(Option<String>, Option<String>), StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT MIN(fetched_at), MAX(fetched_at) \
             FROM validated_crypto_data WHERE fetched_at <> ''",
        )?;
        Ok(stmt.query_row([], |r| Ok((r.get(0)?, r.get(1)?)))?)
    }

    // ── Ingest run log ────────────────────────────────────────────────────────

    pub fn begin_ingest_run(&self, source: &str) -> Result<i64, StorageError> {
        let id: i64 = self
            .conn
            .query_row("SELECT COALESCE(MAX(id), 0) + 1 FROM ingest_runs", [], |r| {
                r.get(0)
            })?;
        self.conn.execute(
            "INSERT INTO ingest_runs (id, source, started_at, status) VALUES (?, ?, ?, 'running')",
            params![id, source, Utc::now().naive_utc()],
        )?;
        Ok(id)
    }

    pub fn finish_ingest_run(
        &self,
        run_id: i64,
        total: usize,
        valid: usize,
        invalid: usize,
        rows_appended: usize,
        error: Option<&str>,
    ) -> Result<(), StorageError> {
        self.conn.execute(
            r#"UPDATE ingest_runs SET
               finished_at = ?, status = ?,
               records_total = ?, records_valid = ?, records_invalid = ?,
               rows_appended = ?, error_msg = ?
               WHERE id = ?"#,
            params![
                Utc::now().naive_utc(),
                if error.is_none() { "success" } else { "error" },
                total as i64,
                valid as i64,
                invalid as i64,
                rows_appended as i64,
                error,
                run_id,
            ],
        )?;
        Ok(())
    }

    pub fn run_count(&self) -> Result<i64, StorageError> {
        let mut stmt = self.conn.prepare("SELECT COUNT(*) FROM ingest_runs")?;
        Ok(stmt.query_row([], |r| r.get(0))?)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample(symbol: &str) -> RawPriceRecord {
        serde_json::from_value(json!({
            "id": symbol,
            "symbol": symbol,
            "name": symbol.to_uppercase(),
            "image": format!("https://img.example/{symbol}.png"),
            "current_price": 610.25,
            "market_cap": 9_000_000_000_i64,
            "market_cap_rank": 5,
            "fully_diluted_valuation": 9_900_000_000_i64,
            "total_volume": 420_000_000_i64,
            "high_24h": 625.0,
            "low_24h": 598.5,
            "price_change_24h": -4.75,
            "price_change_percentage_24h": -0.77,
            "market_cap_change_24h": -70_000_000.0,
            "market_cap_change_percentage_24h": -0.77,
            "circulating_supply": 14_750_000.0,
            "total_supply": 14_750_000.0,
            "max_supply": 21_000_000.0,
            "ath": 717.48,
            "ath_change_percentage": -14.9,
            "ath_date": "2024-12-04T10:35:25.220Z",
            "atl": 0.04,
            "atl_change_percentage": 1525512.0,
            "atl_date": "2015-10-20T00:00:00.000Z",
            "roi": {"times": 42.7, "currency": "usd", "percentage": 4270.0},
            "last_updated": "2025-01-20T10:30:00.000Z",
            "fetched_at": "2025-01-20T10:30:05Z"
        }))
        .unwrap()
    }

    fn memory_repo() -> Repository {
        let repo = Repository::open_in_memory().unwrap();
        repo.run_migrations().unwrap();
        repo
    }

    #[test]
    fn timestamp_normalization() {
        let ts = |s: &str| timestamp_text(&Some(json!(s)));
        assert_eq!(ts("2024-12-04T10:35:25.220Z"), "2024-12-04 10:35:25");
        assert_eq!(ts("2025-01-20T10:30:05+02:00"), "2025-01-20 08:30:05");
        assert_eq!(ts("2024-02-20T10:30:00"), "2024-02-20 10:30:00");
        assert_eq!(ts("2024-02-20 10:30:00"), "2024-02-20 10:30:00");
        assert_eq!(ts("2024-02-20"), "2024-02-20 00:00:00");
        assert_eq!(ts("not a date"), "");
        assert_eq!(timestamp_text(&None), "");
        assert_eq!(timestamp_text(&Some(json!(12345))), "");
    }

    #[test]
    fn roi_scalarization() {
        let roi = Some(json!({"times": 2.0, "currency": "usd"}));
        let text = roi_text(&roi);
        let parsed: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed["currency"], "usd");

        assert_eq!(roi_text(&None), "");
        assert_eq!(roi_text(&Some(json!(null))), "");
    }

    #[test]
    fn empty_append_is_a_no_op() {
        let repo = memory_repo();
        assert_eq!(repo.append_records(&[]).unwrap(), 0);
        assert_eq!(repo.row_count().unwrap(), 0);
    }

    #[test]
    fn append_twice_accumulates_rows() {
        let repo = memory_repo();
        // Second migration pass must not disturb the existing table.
        repo.append_records(&[sample("bnb"), sample("eth")]).unwrap();
        repo.run_migrations().unwrap();
        repo.append_records(&[sample("btc")]).unwrap();
        assert_eq!(repo.row_count().unwrap(), 3);
        assert_eq!(repo.coin_count().unwrap(), 3);
    }

    #[test]
    fn round_trip_preserves_scalars() {
        let repo = memory_repo();
        repo.append_records(&[sample("bnb")]).unwrap();

        let row = repo
            .conn
            .query_row(
                "SELECT id, symbol, current_price, market_cap, market_cap_rank, \
                 ath_date, last_updated, roi FROM validated_crypto_data",
                [],
                |r| {
                    Ok((
                        r.get::<_, String>(0)?,
                        r.get::<_, String>(1)?,
                        r.get::<_, f64>(2)?,
                        r.get::<_, i64>(3)?,
                        r.get::<_, i32>(4)?,
                        r.get::<_, String>(5)?,
                        r.get::<_, String>(6)?,
                        r.get::<_, String>(7)?,
                    ))
                },
            )
            .unwrap();

        assert_eq!(row.0, "bnb");
        assert_eq!(row.1, "bnb");
        assert_eq!(row.2, 610.25);
        assert_eq!(row.3, 9_000_000_000);
        assert_eq!(row.4, 5);
        assert_eq!(row.5, "2024-12-04 10:35:25");
        assert_eq!(row.6, "2025-01-20 10:30:00");
        let roi: Value = serde_json::from_str(&row.7).unwrap();
        assert_eq!(roi["times"], json!(42.7));
    }

    #[test]
    fn missing_optionals_become_null_or_empty() {
        let repo = memory_repo();
        let mut record = sample("ada");
        record.fully_diluted_valuation = None;
        record.total_supply = None;
        record.max_supply = None;
        record.roi = None;
        record.fetched_at = None;
        repo.append_records(&[record]).unwrap();

        let (fdv_null, supply_null, roi, fetched): (bool, bool, String, String) = repo
            .conn
            .query_row(
                "SELECT fully_diluted_valuation IS NULL, total_supply IS NULL, roi, fetched_at \
                 FROM validated_crypto_data",
                [],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
            )
            .unwrap();

        assert!(fdv_null);
        assert!(supply_null);
        assert_eq!(roi, "");
        assert_eq!(fetched, "");
    }

    #[test]
    fn non_numeric_value_binds_null_rather_than_failing() {
        let repo = memory_repo();
        let mut odd = sample("eth");
        odd.market_cap = Some(json!("garbage"));
        repo.append_records(&[sample("btc"), odd]).unwrap();

        assert_eq!(repo.row_count().unwrap(), 2);
        let null_cap: bool = repo
            .conn
            .query_row(
                "SELECT market_cap IS NULL FROM validated_crypto_data WHERE id = 'eth'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert!(null_cap);
    }

    #[test]
    fn on_disk_repository_persists_across_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("crypto_data.duckdb");

        {
            let repo = Repository::open(&path).unwrap();
            repo.run_migrations().unwrap();
            repo.append_records(&[sample("btc"), sample("eth")]).unwrap();
        }

        let repo = Repository::open(&path).unwrap();
        repo.run_migrations().unwrap();
        repo.append_records(&[sample("sol")]).unwrap();
        assert_eq!(repo.row_count().unwrap(), 3);
    }

    #[test]
    fn ingest_run_log_records_outcomes() {
        let repo = memory_repo();
        let run_id = repo.begin_ingest_run("synthetic").unwrap();
        repo.finish_ingest_run(run_id, 10, 9, 1, 9, None).unwrap();

        let (status, valid): (String, i64) = repo
            .conn
            .query_row(
                "SELECT status, records_valid FROM ingest_runs WHERE id = ?",
                params![run_id],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .unwrap();
        assert_eq!(status, "success");
        assert_eq!(valid, 9);
        assert_eq!(repo.run_count().unwrap(), 1);

        let failed = repo.begin_ingest_run("live").unwrap();
        repo.finish_ingest_run(failed, 0, 0, 0, 0, Some("timeout"))
            .unwrap();
        let status: String = repo
            .conn
            .query_row(
                "SELECT status FROM ingest_runs WHERE id = ?",
                params![failed],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(status, "error");
    }
}
