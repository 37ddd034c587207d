//! Multi-mode listing fetch.
//!
//! Every trading mode is requested concurrently; the partial datasets are
//! merged in configured mode order once all requests finish.

use bond_common::{Error, Result};
use futures::future::join_all;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::data::{BondDataSource, Dataset, TradingMode};

/// A trading mode that was skipped after failing.
#[derive(Debug, Clone, Serialize)]
pub struct FailedMode {
    pub mode: String,
    pub error: String,
}

/// Merged listing plus what happened along the way.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub dataset: Dataset,
    /// Rows dropped because an earlier mode already had the SECID
    pub duplicates: usize,
    pub failed_modes: Vec<FailedMode>,
}

/// Fetches and merges bond listings across trading modes.
pub struct Fetcher<S: BondDataSource + ?Sized> {
    source: Arc<S>,
    skip_failed_modes: bool,
}

impl<S: BondDataSource + ?Sized> Fetcher<S> {
    pub fn new(source: Arc<S>) -> Self {
        Self {
            source,
            skip_failed_modes: false,
        }
    }

    /// Skip modes whose request fails instead of failing the run.
    pub fn with_skip_failed_modes(mut self, skip: bool) -> Self {
        self.skip_failed_modes = skip;
        self
    }

    /// Fetch all modes and merge them, first-seen SECID wins.
    pub async fn fetch(&self, modes: &[TradingMode]) -> Result<FetchOutcome> {
        if modes.is_empty() {
            return Err(Error::Config("no trading modes configured".into()));
        }

        let started = Instant::now();
        let source = &self.source;

        let results = join_all(modes.iter().map(|mode| async move {
            let result = source.fetch_listing(mode).await;
            (mode, result)
        }))
        .await;

        let mut parts = Vec::with_capacity(results.len());
        let mut failed_modes = Vec::new();
        let mut first_error = None;

        for (mode, result) in results {
            match result {
                Ok(dataset) => {
                    debug!(mode = %mode, rows = dataset.len(), "Mode fetched");
                    parts.push(dataset);
                }
                Err(e) if self.skip_failed_modes => {
                    warn!(mode = %mode, error = %e, "Skipping failed trading mode");
                    failed_modes.push(FailedMode {
                        mode: mode.to_string(),
                        error: e.to_string(),
                    });
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
                Err(e) => return Err(e.with_context(format!("trading mode {}", mode))),
            }
        }

        if parts.is_empty() {
            let error = first_error
                .unwrap_or_else(|| Error::Network("no listing received".into()));
            return Err(error.with_context(format!("all {} trading modes failed", modes.len())));
        }

        let (dataset, duplicates) = merge_first_seen(parts);

        info!(
            source = source.name(),
            modes = modes.len(),
            failed = failed_modes.len(),
            rows = dataset.len(),
            duplicates,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Listings fetched"
        );

        Ok(FetchOutcome {
            dataset,
            duplicates,
            failed_modes,
        })
    }
}

/// Merge datasets in order, keeping the first row for each SECID.
///
/// Returns the merged dataset and the number of dropped duplicates.
pub fn merge_first_seen(parts: Vec<Dataset>) -> (Dataset, usize) {
    let mut merged = Dataset::new();
    let mut seen = HashSet::new();
    let mut duplicates = 0;

    for part in parts {
        for (name, kind) in part.schema() {
            merged.declare(name, *kind);
        }
        for instrument in part.into_instruments() {
            if seen.insert(instrument.secid().to_string()) {
                merged.push(instrument);
            } else {
                duplicates += 1;
            }
        }
    }

    (merged, duplicates)
}
