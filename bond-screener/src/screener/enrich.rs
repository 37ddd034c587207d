//! Per-bond enrichment: trade history, remaining coupons, profit to maturity.

use bond_common::{EnrichConfig, Error, Result};
use chrono::{Duration, NaiveDate};
use futures::stream::{self, StreamExt, TryStreamExt};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

use crate::data::fields;
use crate::data::{BondDataSource, Dataset, Instrument, Value, ValueKind};

/// What to fetch per bond.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrichOptions {
    pub trade_history: bool,
    pub coupons: bool,
    /// Trade history look-back in days
    pub history_days: u32,
    /// Requests in flight at once
    pub max_concurrent: usize,
    /// Reference date for the history window and coupon schedule
    pub today: NaiveDate,
}

impl EnrichOptions {
    pub fn from_config(config: &EnrichConfig, max_concurrent: usize, today: NaiveDate) -> Self {
        Self {
            trade_history: config.trade_history,
            coupons: config.coupons,
            history_days: config.history_days,
            max_concurrent,
            today,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.trade_history || self.coupons
    }

    /// First day of the trade history window.
    ///
    /// Fails with `Error::Config` when the look-back leaves the calendar range.
    pub fn history_from(&self) -> Result<NaiveDate> {
        self.today
            .checked_sub_signed(Duration::days(i64::from(self.history_days)))
            .ok_or_else(|| {
                Error::Config(format!(
                    "history window of {} days before {} is out of range",
                    self.history_days, self.today
                ))
            })
    }
}

/// Adds derived attributes to every bond of a dataset.
pub struct Enricher<S: BondDataSource + ?Sized> {
    source: Arc<S>,
    options: EnrichOptions,
}

impl<S: BondDataSource + ?Sized> Enricher<S> {
    pub fn new(source: Arc<S>, options: EnrichOptions) -> Self {
        Self { source, options }
    }

    pub fn options(&self) -> &EnrichOptions {
        &self.options
    }

    /// Enrich all bonds, keeping input order. The first failed request fails the call.
    pub async fn enrich(&self, dataset: Dataset) -> Result<Dataset> {
        if !self.options.is_enabled() || dataset.is_empty() {
            return Ok(dataset);
        }

        let started = Instant::now();
        let history_from = self.options.history_from()?;

        let enriched: Vec<Instrument> = stream::iter(dataset.iter().cloned())
            .map(|instrument| self.enrich_one(instrument, history_from))
            .buffered(self.options.max_concurrent.max(1))
            .try_collect()
            .await?;

        let mut out = dataset.with_instruments(enriched);
        if self.options.trade_history {
            for name in fields::HISTORY_FIELDS {
                out.declare(name, ValueKind::Number);
            }
        }
        if self.options.coupons {
            for name in fields::COUPON_FIELDS {
                out.declare(name, ValueKind::Number);
            }
        }

        info!(
            bonds = out.len(),
            trade_history = self.options.trade_history,
            coupons = self.options.coupons,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Enrichment complete"
        );

        Ok(out)
    }

    async fn enrich_one(
        &self,
        mut instrument: Instrument,
        history_from: NaiveDate,
    ) -> Result<Instrument> {
        if self.options.trade_history {
            let counts = self
                .source
                .fetch_trade_counts(instrument.board_id(), instrument.secid(), history_from)
                .await?;
            apply_trade_counts(&mut instrument, &counts);
        }

        if self.options.coupons {
            let left = self
                .source
                .fetch_coupon_count(instrument.secid(), self.options.today)
                .await?;
            instrument.set(fields::COUPONS_LEFT, Value::Number(left as f64));
            if let Some(profit) = compute_profit(&instrument) {
                instrument.set(fields::PROFIT, Value::Number(profit));
            }
        }

        Ok(instrument)
    }
}

/// Set `NUMTRADES_MIN` / `NUMTRADES_TOTAL`. No history leaves both absent.
pub fn apply_trade_counts(instrument: &mut Instrument, counts: &[f64]) {
    if counts.is_empty() {
        return;
    }
    let min = counts.iter().copied().fold(f64::INFINITY, f64::min);
    let total: f64 = counts.iter().sum();
    instrument.set(fields::NUMTRADES_MIN, Value::Number(min));
    instrument.set(fields::NUMTRADES_TOTAL, Value::Number(total));
}

/// Income to maturity minus purchase cost, per bond, rounded to kopecks.
///
/// `None` unless face value, price, accrued interest, coupon value and the
/// remaining coupon count are all known.
pub fn compute_profit(instrument: &Instrument) -> Option<f64> {
    let face_value = instrument.face_value()?;
    let price = instrument.price()?;
    let accrued = instrument.accrued_interest()?;
    let coupon = instrument.coupon_value()?;
    let coupons_left = instrument.get(fields::COUPONS_LEFT)?.as_f64()?;

    let cost = face_value * price * 0.01 + accrued;
    let income = face_value + coupon * coupons_left;
    Some(round2(income - cost))
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
