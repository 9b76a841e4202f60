//! Screener API client
//!
//! Fetches pre-computed RSI14 values from the TradingView screener endpoint.
//! Tickers are mapped to screener symbols through the instrument catalog;
//! tickers without a slug, and symbols absent from the response, are simply
//! omitted from the returned map.

use super::{MarketDataSource, Reading};
use crate::catalog::TickerCatalog;
use crate::config::ScreenerConfig;
use crate::error::{Result, SentinelError};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Screener-backed market data source.
pub struct ScreenerClient {
    http: Client,
    base_url: String,
    catalog: Arc<TickerCatalog>,
}

#[derive(Debug, Serialize)]
struct ScanRequest {
    symbols: ScanSymbols,
    columns: Vec<&'static str>,
}

#[derive(Debug, Serialize)]
struct ScanSymbols {
    tickers: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ScanResponse {
    #[serde(default)]
    data: Vec<ScanRow>,
}

#[derive(Debug, Deserialize)]
struct ScanRow {
    /// Screener symbol, e.g. `OSL:EQNR`.
    s: String,
    /// Requested columns in order; here only RSI.
    d: Vec<Option<f64>>,
}

impl ScreenerClient {
    pub fn new(config: &ScreenerConfig, catalog: Arc<TickerCatalog>) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            catalog,
        })
    }
}

#[async_trait]
impl MarketDataSource for ScreenerClient {
    async fn fetch_batch(&self, tickers: &[String]) -> Result<HashMap<String, Reading>> {
        if tickers.is_empty() {
            return Ok(HashMap::new());
        }

        // Map tickers to screener symbols; remember the reverse direction for
        // the response. Tickers without a slug stay unmapped and fail softly.
        let mut slug_to_ticker: HashMap<String, String> = HashMap::new();
        let mut slugs = Vec::with_capacity(tickers.len());
        for ticker in tickers {
            if let Some(instrument) = self.catalog.lookup(ticker) {
                if !instrument.tradingview_slug.is_empty() {
                    slugs.push(instrument.tradingview_slug.clone());
                    slug_to_ticker
                        .insert(instrument.tradingview_slug.clone(), instrument.ticker.clone());
                }
            }
        }

        if slugs.is_empty() {
            return Ok(HashMap::new());
        }

        let url = format!("{}/global/scan", self.base_url);
        let request = ScanRequest {
            symbols: ScanSymbols { tickers: slugs },
            columns: vec!["RSI"],
        };

        let resp = self.http.post(&url).json(&request).send().await?;
        if !resp.status().is_success() {
            return Err(SentinelError::DataFetch(format!(
                "screener returned {}",
                resp.status()
            )));
        }
        let body: ScanResponse = resp.json().await?;

        let trading_date = Utc::now().date_naive();
        let mut readings = HashMap::new();
        for row in body.data {
            let Some(ticker) = slug_to_ticker.get(&row.s) else {
                continue;
            };
            if let Some(Some(rsi)) = row.d.first() {
                readings.insert(
                    ticker.clone(),
                    Reading {
                        rsi: *rsi,
                        trading_date,
                    },
                );
            }
        }

        debug!(
            requested = tickers.len(),
            received = readings.len(),
            "screener batch complete"
        );
        Ok(readings)
    }
}
