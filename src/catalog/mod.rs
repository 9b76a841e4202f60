//! Instrument catalog
//!
//! Loads the ticker universe from a CSV file with the header
//! `ticker,name,tradingview_slug` and serves lookups for the scheduler and
//! the screener client. Instruments are immutable for the duration of a scan
//! cycle; `reload` swaps the whole set.

use crate::error::{Result, SentinelError};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const CHART_URL_TEMPLATE: &str =
    "https://www.tradingview.com/chart/?symbol={slug}&interval=1D";

/// One catalog entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instrument {
    pub ticker: String,
    pub name: String,
    /// Screener symbol in `EXCHANGE:TICKER` form, e.g. `OSL:EQNR`.
    pub tradingview_slug: String,
}

impl Instrument {
    /// Chart link for rendered alerts. Empty when the slug is missing.
    pub fn chart_url(&self) -> String {
        if self.tradingview_slug.is_empty() {
            return String::new();
        }
        CHART_URL_TEMPLATE.replace("{slug}", &self.tradingview_slug)
    }
}

/// In-memory instrument catalog keyed by upper-cased ticker.
pub struct TickerCatalog {
    path: PathBuf,
    instruments: HashMap<String, Instrument>,
}

impl TickerCatalog {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let instruments = read_catalog(&path)?;
        info!(count = instruments.len(), path = %path.display(), "loaded instrument catalog");
        Ok(Self { path, instruments })
    }

    /// Re-read the catalog from disk, replacing the current set.
    pub fn reload(&mut self) -> Result<usize> {
        self.instruments = read_catalog(&self.path)?;
        Ok(self.instruments.len())
    }

    pub fn lookup(&self, ticker: &str) -> Option<&Instrument> {
        self.instruments.get(&ticker.to_ascii_uppercase())
    }

    pub fn contains(&self, ticker: &str) -> bool {
        self.lookup(ticker).is_some()
    }

    /// Display name for a ticker, falling back to the ticker itself.
    pub fn display_name(&self, ticker: &str) -> String {
        self.lookup(ticker)
            .map(|i| i.name.clone())
            .unwrap_or_else(|| ticker.to_ascii_uppercase())
    }

    pub fn chart_url(&self, ticker: &str) -> String {
        self.lookup(ticker).map(|i| i.chart_url()).unwrap_or_default()
    }

    /// The full ticker universe, ordered.
    pub fn all_tickers(&self) -> BTreeSet<String> {
        self.instruments.keys().cloned().collect()
    }

    /// Substring search over ticker and name.
    pub fn search(&self, query: &str, limit: usize) -> Vec<&Instrument> {
        let query = query.to_ascii_uppercase();
        let mut hits: Vec<&Instrument> = self
            .instruments
            .values()
            .filter(|i| {
                i.ticker.contains(&query) || i.name.to_ascii_uppercase().contains(&query)
            })
            .collect();
        hits.sort_by(|a, b| a.ticker.cmp(&b.ticker));
        hits.truncate(limit);
        hits
    }

    pub fn len(&self) -> usize {
        self.instruments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instruments.is_empty()
    }
}

fn read_catalog(path: &Path) -> Result<HashMap<String, Instrument>> {
    let raw = std::fs::read_to_string(path)?;
    let mut lines = raw.lines();

    let header = lines
        .next()
        .ok_or_else(|| SentinelError::InvalidCatalog("empty catalog file".into()))?;
    let columns: Vec<&str> = header.split(',').map(str::trim).collect();
    if columns != ["ticker", "name", "tradingview_slug"] {
        return Err(SentinelError::InvalidCatalog(format!(
            "unexpected header: {header}"
        )));
    }

    let mut instruments = HashMap::new();
    for (line_no, line) in lines.enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        if fields.len() != 3 {
            warn!(line = line_no + 2, "skipping malformed catalog row");
            continue;
        }
        let ticker = fields[0].to_ascii_uppercase();
        let name = fields[1].to_string();
        let slug = fields[2].to_string();
        if ticker.is_empty() || name.is_empty() {
            warn!(line = line_no + 2, "skipping catalog row without ticker or name");
            continue;
        }
        if slug.is_empty() {
            warn!(%ticker, "catalog row has no tradingview_slug");
        }
        instruments.insert(
            ticker.clone(),
            Instrument {
                ticker,
                name,
                tradingview_slug: slug,
            },
        );
    }

    Ok(instruments)
}
