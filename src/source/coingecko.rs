//! Live source: the CoinGecko `/coins/markets` endpoint.

use super::{MarketDataSource, SourceError};
use crate::config::SourceConfig;
use crate::models::RawPriceRecord;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::{debug, info};

pub struct CoinGeckoSource {
    client: reqwest::Client,
    markets_url: String,
    vs_currency: String,
    per_page: u32,
}

impl CoinGeckoSource {
    pub fn new(config: &SourceConfig) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_secs))
            .gzip(true)
            .build()?;

        Ok(Self {
            client,
            markets_url: format!("{}/coins/markets", config.base_url.trim_end_matches('/')),
            vs_currency: config.vs_currency.clone(),
            per_page: config.per_page,
        })
    }
}

#[async_trait]
impl MarketDataSource for CoinGeckoSource {
    fn name(&self) -> &'static str {
        "live"
    }

    async fn fetch_batch(&self) -> Result<Vec<RawPriceRecord>, SourceError> {
        info!("Fetching market snapshot from {}", self.markets_url);
        let started = Instant::now();

        let response = self
            .client
            .get(&self.markets_url)
            .query(&[
                ("vs_currency", self.vs_currency.as_str()),
                ("order", "market_cap_desc"),
                ("page", "1"),
                ("sparkline", "false"),
                ("locale", "en"),
            ])
            .query(&[("per_page", self.per_page)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status { status });
        }

        let body = response.text().await?;
        let mut records: Vec<RawPriceRecord> = serde_json::from_str(&body)?;
        debug!("API request completed in {:.2?}", started.elapsed());

        // Stamp when this batch was pulled; storage canonicalizes the format.
        let fetched_at = Value::String(Utc::now().to_rfc3339());
        for record in &mut records {
            record.fetched_at = Some(fetched_at.clone());
        }

        info!("Received {} market records from CoinGecko", records.len());
        Ok(records)
    }
}
