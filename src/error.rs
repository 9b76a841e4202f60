//! Error types for the sentinel

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SentinelError>;

#[derive(Error, Debug)]
pub enum SentinelError {
    /// Per-ticker or per-batch market data failure. Non-fatal: the affected
    /// tickers are evaluated as "no data" and the cycle continues.
    #[error("data fetch failed: {0}")]
    DataFetch(String),

    /// Rejected configuration or subscription input. Nothing is mutated.
    #[error("invalid configuration: {0}")]
    ConfigValidation(String),

    /// Store outage. Fatal for the current cycle only; the next scheduled
    /// cycle retries.
    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),

    /// A manual trigger arrived while a cycle held the guild lock.
    #[error("a cycle is already running for this guild")]
    CycleBusy,

    #[error("ticker not in catalog: {0}")]
    CatalogNotFound(String),

    #[error("catalog file invalid: {0}")]
    InvalidCatalog(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl SentinelError {
    /// Whether the error aborts the whole cycle (as opposed to a single
    /// ticker or batch).
    pub fn is_cycle_fatal(&self) -> bool {
        matches!(self, SentinelError::Store(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_errors_are_cycle_fatal() {
        let err = SentinelError::Store(sqlx::Error::PoolClosed);
        assert!(err.is_cycle_fatal());
        assert!(!SentinelError::CycleBusy.is_cycle_fatal());
        assert!(!SentinelError::DataFetch("timeout".into()).is_cycle_fatal());
    }

    #[test]
    fn test_error_display() {
        let err = SentinelError::CatalogNotFound("EQNR.OL".into());
        assert_eq!(err.to_string(), "ticker not in catalog: EQNR.OL");
    }
}
