//! Market data boundary
//!
//! The screener is queried in fixed-size batches; everything downstream sees
//! a complete mapping of ticker → reading-or-failure.

mod batch;
mod screener;

pub use batch::{BatchFetcher, FetchReport};
pub use screener::ScreenerClient;

use crate::error::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;

/// One RSI14 reading as returned by the data source. Values are forwarded
/// unchanged; the engine never assumes the [0, 100] range holds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub rsi: f64,
    /// Date of the bar the reading belongs to; drives day-granular counting.
    pub trading_date: NaiveDate,
}

/// Fetch outcome for a single ticker.
#[derive(Debug, Clone, PartialEq)]
pub enum TickerFetch {
    Reading(Reading),
    Failed(String),
}

impl TickerFetch {
    pub fn reading(&self) -> Option<Reading> {
        match self {
            TickerFetch::Reading(r) => Some(*r),
            TickerFetch::Failed(_) => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, TickerFetch::Failed(_))
    }
}

/// Source of RSI readings, queried one batch at a time.
///
/// Tickers missing from the returned map are per-ticker failures; a batch
/// that errors as a whole fails every ticker in it. Timeouts are scoped to
/// the individual call.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    async fn fetch_batch(&self, tickers: &[String]) -> Result<HashMap<String, Reading>>;
}
