//! Data source abstraction for bond market data.
//!
//! The screener talks to the exchange only through [`BondDataSource`], so
//! tests and alternative transports can stand in for the ISS client.

use async_trait::async_trait;
use bond_common::Result;
use chrono::NaiveDate;

use super::block::TradingMode;
use super::instrument::Dataset;

/// Trait for bond data sources.
#[async_trait]
pub trait BondDataSource: Send + Sync {
    /// Source name for logging (e.g., "iss")
    fn name(&self) -> &'static str;

    /// Fetch every bond listed under a trading mode.
    ///
    /// Fails with `Error::Network` on connection or HTTP failure and with
    /// `Error::Parse` when the response does not match the listing schema.
    async fn fetch_listing(&self, mode: &TradingMode) -> Result<Dataset>;

    /// Daily trade counts for one bond on one board since `from`.
    async fn fetch_trade_counts(
        &self,
        board_id: &str,
        secid: &str,
        from: NaiveDate,
    ) -> Result<Vec<f64>>;

    /// Number of coupons paid on or after `from`.
    async fn fetch_coupon_count(&self, secid: &str, from: NaiveDate) -> Result<usize>;
}
