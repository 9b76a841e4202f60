//! Batch fetch orchestration
//!
//! Partitions a ticker set into fixed-size batches, fetches them with bounded
//! concurrency, and aggregates once every in-flight batch has settled. A
//! failed batch gets one immediate retry, then marks all of its tickers as
//! failed; remaining batches are unaffected. Every requested ticker appears
//! in the result exactly once.

use super::{MarketDataSource, Reading, TickerFetch};
use crate::error::Result;
use chrono::{DateTime, Utc};
use futures_util::stream::{self, StreamExt};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{info, warn};

/// Per-cycle fetch summary for the status line.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchReport {
    pub batches_total: usize,
    pub batches_failed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub failed_tickers: Vec<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl FetchReport {
    pub fn duration_secs(&self) -> f64 {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => (end - start).num_milliseconds() as f64 / 1000.0,
            _ => 0.0,
        }
    }
}

pub struct BatchFetcher {
    source: Arc<dyn MarketDataSource>,
    batch_size: usize,
    max_concurrent: usize,
}

impl BatchFetcher {
    pub fn new(source: Arc<dyn MarketDataSource>, batch_size: usize, max_concurrent: usize) -> Self {
        Self {
            source,
            batch_size: batch_size.max(1),
            max_concurrent: max_concurrent.max(1),
        }
    }

    /// Fetch readings for every ticker in `tickers`.
    pub async fn fetch_readings(
        &self,
        tickers: &BTreeSet<String>,
    ) -> (HashMap<String, TickerFetch>, FetchReport) {
        let started_at = Utc::now();
        let batches: Vec<Vec<String>> = tickers
            .iter()
            .cloned()
            .collect::<Vec<_>>()
            .chunks(self.batch_size)
            .map(|chunk| chunk.to_vec())
            .collect();

        let mut report = FetchReport {
            batches_total: batches.len(),
            started_at: Some(started_at),
            ..Default::default()
        };

        let settled: Vec<(Vec<String>, Result<HashMap<String, Reading>>)> =
            stream::iter(batches)
                .map(|batch| async move {
                    let outcome = self.fetch_batch_with_retry(&batch).await;
                    (batch, outcome)
                })
                .buffer_unordered(self.max_concurrent)
                .collect()
                .await;

        let mut results = HashMap::with_capacity(tickers.len());
        for (batch, outcome) in settled {
            match outcome {
                Ok(readings) => {
                    for ticker in batch {
                        match readings.get(&ticker) {
                            Some(reading) => {
                                results.insert(ticker, TickerFetch::Reading(*reading));
                            }
                            None => {
                                results.insert(
                                    ticker,
                                    TickerFetch::Failed("no reading returned".to_string()),
                                );
                            }
                        }
                    }
                }
                Err(e) => {
                    report.batches_failed += 1;
                    let cause = e.to_string();
                    for ticker in batch {
                        results
                            .insert(ticker, TickerFetch::Failed(format!("batch failed: {cause}")));
                    }
                }
            }
        }

        report.succeeded = results.values().filter(|f| !f.is_failed()).count();
        report.failed = results.len() - report.succeeded;
        report.failed_tickers = results
            .iter()
            .filter(|(_, f)| f.is_failed())
            .map(|(t, _)| t.clone())
            .collect();
        report.failed_tickers.sort();
        report.finished_at = Some(Utc::now());

        info!(
            tickers = results.len(),
            succeeded = report.succeeded,
            failed = report.failed,
            batches = report.batches_total,
            batches_failed = report.batches_failed,
            "fetch cycle complete"
        );

        (results, report)
    }

    /// One immediate retry keeps scan latency predictable for the scheduler's
    /// fixed windows; there is no backoff loop.
    async fn fetch_batch_with_retry(&self, batch: &[String]) -> Result<HashMap<String, Reading>> {
        match self.source.fetch_batch(batch).await {
            Ok(readings) => Ok(readings),
            Err(first) => {
                warn!(size = batch.len(), error = %first, "batch fetch failed, retrying once");
                self.source.fetch_batch(batch).await
            }
        }
    }
}
