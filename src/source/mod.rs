pub mod coingecko;
pub mod synthetic;

pub use coingecko::CoinGeckoSource;
pub use synthetic::SyntheticSource;

use crate::models::RawPriceRecord;
use async_trait::async_trait;
use thiserror::Error;

// ── Errors ────────────────────────────────────────────────────────────────────

/// Upstream fetch or generation failure. Always fatal to the run; the core
/// never retries.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("market data request failed")]
    Request(#[from] reqwest::Error),

    #[error("upstream returned HTTP {status}")]
    Status { status: reqwest::StatusCode },

    #[error("malformed market data payload")]
    Payload(#[from] serde_json::Error),
}

// ── Source trait ──────────────────────────────────────────────────────────────

/// Swappable batch producer. The pipeline treats the live API and the
/// synthetic generator identically.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Short label for logs and the ingest run log.
    fn name(&self) -> &'static str;

    /// Produce one batch of raw records, or fail as a whole.
    async fn fetch_batch(&self) -> Result<Vec<RawPriceRecord>, SourceError>;
}
