//! Screener engine module.
//!
//! Runs one screen: fetch listings, filter on listing attributes, enrich the
//! survivors when needed, filter on derived attributes, then sort and trim.

use bond_common::{Config, Error, Result};
use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::Serialize;
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::{debug, info};

use crate::data::fields;
use crate::data::{BondDataSource, Dataset, Instrument, TradingMode};

use super::criteria::CriteriaSet;
use super::enrich::{EnrichOptions, Enricher};
use super::fetcher::{FailedMode, Fetcher};
use super::filter::{self, FilterOutcome, FilterStage};

// ============================================================================
// Screener Result
// ============================================================================

/// Result of a screening run.
#[derive(Debug, Clone, Serialize)]
pub struct ScreenerResult {
    /// Run ID (timestamp-based)
    pub id: String,
    /// Matching bonds, sorted and limited
    pub bonds: Dataset,
    /// Per-stage counts
    pub stages: Vec<FilterOutcome>,
    /// Trading modes requested
    pub modes: Vec<String>,
    /// Modes skipped after failing
    pub failed_modes: Vec<FailedMode>,
    /// Criteria applied, as text
    pub criteria: Vec<String>,
    /// Bonds fetched after de-duplication
    pub total_fetched: usize,
    /// Rows dropped as duplicate SECIDs
    pub duplicates: usize,
    /// Whether per-bond enrichment ran
    pub enriched: bool,
    /// Sort attribute, if any
    pub sorted_by: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_secs: f64,
}

impl ScreenerResult {
    /// Summary string for logging.
    pub fn summary(&self) -> String {
        format!(
            "Screened {} bonds in {:.1}s: {} passed ({:.1}%)",
            self.total_fetched,
            self.duration_secs,
            self.bonds.len(),
            if self.total_fetched > 0 {
                (self.bonds.len() as f64 / self.total_fetched as f64) * 100.0
            } else {
                0.0
            }
        )
    }

    /// Whether any bond carries the given attribute.
    pub fn has_attribute(&self, name: &str) -> bool {
        self.bonds.iter().any(|b| b.get(name).is_some())
    }
}

// ============================================================================
// Screener Engine
// ============================================================================

/// The bond screener.
pub struct ScreenerEngine<S: BondDataSource + ?Sized> {
    source: Arc<S>,
    modes: Vec<TradingMode>,
    criteria: CriteriaSet,
    skip_failed_modes: bool,
    enrich: EnrichOptions,
    sort_by: Option<String>,
    descending: bool,
    limit: Option<usize>,
}

impl<S: BondDataSource + ?Sized> ScreenerEngine<S> {
    /// Create an engine from config.
    ///
    /// Fails with `Error::Config` on a malformed trading mode and with
    /// `Error::InvalidCriterion` on a criterion that cannot be compiled.
    pub fn new(config: &Config, source: Arc<S>) -> Result<Self> {
        let modes = config
            .screener
            .modes
            .iter()
            .map(|m| m.parse::<TradingMode>())
            .collect::<Result<Vec<_>>>()?;
        if modes.is_empty() {
            return Err(Error::Config("no trading modes configured".into()));
        }

        let criteria = CriteriaSet::from_config(&config.screener.criteria)?;
        let sort_by = config.display.sort_by.as_deref().map(fields::canonical);

        let mut enrich = EnrichOptions::from_config(
            &config.screener.enrich,
            config.iss.max_concurrent_requests,
            Local::now().date_naive(),
        );
        let wants = |names: &[&str]| {
            criteria.references_any(names)
                || sort_by.as_deref().map_or(false, |s| names.contains(&s))
        };
        enrich.trade_history |= wants(fields::HISTORY_FIELDS);
        enrich.coupons |= wants(fields::COUPON_FIELDS);

        Ok(Self {
            source,
            modes,
            criteria,
            skip_failed_modes: config.screener.skip_failed_modes,
            enrich,
            sort_by,
            descending: config.display.descending,
            limit: config.display.limit,
        })
    }

    /// Fix the reference date used for history windows and coupon schedules.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.enrich.today = today;
        self
    }

    pub fn criteria(&self) -> &CriteriaSet {
        &self.criteria
    }

    pub fn modes(&self) -> &[TradingMode] {
        &self.modes
    }

    pub fn enrich_options(&self) -> &EnrichOptions {
        &self.enrich
    }

    /// Sort attribute: the configured one, or profit when it is computed.
    pub fn sort_key(&self) -> Option<&str> {
        match &self.sort_by {
            Some(key) => Some(key.as_str()),
            None if self.enrich.coupons => Some(fields::PROFIT),
            None => None,
        }
    }

    /// Run a full screen.
    pub async fn run(&self) -> Result<ScreenerResult> {
        let started_at = Utc::now();
        let id = format!("scan_{}", started_at.format("%Y%m%d_%H%M%S"));
        let modes: Vec<String> = self.modes.iter().map(ToString::to_string).collect();

        info!(
            scan_id = %id,
            modes = ?modes,
            criteria = self.criteria.len(),
            "Starting bond screen"
        );

        // Phase 1: listings
        let fetched = Fetcher::new(Arc::clone(&self.source))
            .with_skip_failed_modes(self.skip_failed_modes)
            .fetch(&self.modes)
            .await?;
        let total_fetched = fetched.dataset.len();
        let mut stages = vec![FilterOutcome::new(
            FilterStage::Fetched,
            total_fetched,
            total_fetched,
        )];

        // Phase 2: listing criteria
        let (listing_criteria, derived_criteria) = self.criteria.split_derived();
        let (listed, outcome) =
            filter::apply_stage(FilterStage::Listing, &fetched.dataset, &listing_criteria)?;
        info!(
            passed = outcome.passed,
            eliminated = outcome.eliminated,
            "Listing filter complete"
        );
        stages.push(outcome);

        // Phase 3: enrichment and derived criteria
        let enriched = self.enrich.is_enabled() && !listed.is_empty();
        let listed = Enricher::new(Arc::clone(&self.source), self.enrich.clone())
            .enrich(listed)
            .await?;

        let passed = if derived_criteria.is_empty() {
            listed
        } else {
            let (passed, outcome) =
                filter::apply_stage(FilterStage::Derived, &listed, &derived_criteria)?;
            info!(
                passed = outcome.passed,
                eliminated = outcome.eliminated,
                "Derived filter complete"
            );
            stages.push(outcome);
            passed
        };

        // Phase 4: order and limit
        let sorted_by = self.sort_key().map(str::to_string);
        let mut bonds = passed.instruments().to_vec();
        if let Some(key) = &sorted_by {
            sort_instruments(&mut bonds, key, self.descending);
            debug!(key = %key, descending = self.descending, "Sorted results");
        }
        let before_limit = bonds.len();
        if let Some(limit) = self.limit {
            bonds.truncate(limit);
        }
        stages.push(FilterOutcome::new(FilterStage::Final, before_limit, bonds.len()));

        let bonds = passed.with_instruments(bonds);
        let completed_at = Utc::now();
        let duration_secs = (completed_at - started_at).num_milliseconds() as f64 / 1000.0;

        let result = ScreenerResult {
            id,
            bonds,
            stages,
            modes,
            failed_modes: fetched.failed_modes,
            criteria: self.criteria.iter().map(ToString::to_string).collect(),
            total_fetched,
            duplicates: fetched.duplicates,
            enriched,
            sorted_by,
            started_at,
            completed_at,
            duration_secs,
        };

        info!("{}", result.summary());
        Ok(result)
    }
}

/// Stable sort on one attribute. Bonds without it go last in either direction.
pub fn sort_instruments(instruments: &mut [Instrument], key: &str, descending: bool) {
    instruments.sort_by(|a, b| match (a.resolve(key), b.resolve(key)) {
        (Some(x), Some(y)) => {
            let ord = x.compare(y).unwrap_or(Ordering::Equal);
            if descending {
                ord.reverse()
            } else {
                ord
            }
        }
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
}
