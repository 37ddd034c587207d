//! ISS REST client.
//!
//! # API Documentation
//! https://iss.moex.com/iss/reference/
//!
//! # Paging
//! Listing endpoints accept `limit=unlimited`; history endpoints page at 100
//! rows and report a `<block>.cursor` table. Both styles are handled by
//! `IssClient::get_paginated`.

use async_trait::async_trait;
use bond_common::{Error, IssConfig, Result};
use chrono::NaiveDate;
use reqwest::header::COOKIE;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::auth::Passport;
use super::block::{listing_dataset, BlockSet, TradingMode};
use super::fields;
use super::instrument::{Dataset, Value};
use super::provider::BondDataSource;

/// Hard stop for runaway paging.
const MAX_PAGES: usize = 1000;

type Params = Vec<(String, String)>;

// ============================================================================
// Retry Policy
// ============================================================================

/// Bounded retry for network failures.
///
/// Parse and criterion errors are returned on the first occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first failure
    pub max_retries: u32,
    /// Pause between attempts
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff: Duration) -> Self {
        Self {
            max_retries,
            backoff,
        }
    }

    /// Single attempt, no retries.
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    pub fn from_config(config: &IssConfig) -> Self {
        Self::new(
            config.max_retries,
            Duration::from_millis(config.retry_backoff_ms),
        )
    }

    /// Run `op`, retrying retryable errors up to `max_retries` times.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.max_retries.saturating_add(1);

        for attempt in 1..=max_attempts {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    warn!(
                        request = %what,
                        attempt,
                        max_attempts,
                        error = %e,
                        "Request failed, retrying..."
                    );
                    if !self.backoff.is_zero() {
                        tokio::time::sleep(self.backoff).await;
                    }
                }
                Err(e) => return Err(e),
            }
        }

        Err(Error::Network(format!("{}: no attempts made", what)))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&IssConfig::default())
    }
}

// ============================================================================
// ISS Client
// ============================================================================

/// Client for the ISS JSON API.
pub struct IssClient {
    /// HTTP client
    client: reqwest::Client,
    /// API root, without trailing slash
    base_url: String,
    /// Listing page size (`None` = unlimited)
    page_size: Option<u32>,
    securities_columns: Vec<String>,
    marketdata_columns: Vec<String>,
    retry: RetryPolicy,
    passport: Option<Passport>,
}

impl IssClient {
    /// Create a client from config.
    pub fn new(config: &IssConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("bond-screener/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            page_size: config.page_size,
            securities_columns: config.securities_columns.clone(),
            marketdata_columns: config.marketdata_columns.clone(),
            retry: RetryPolicy::from_config(config),
            passport: None,
        })
    }

    /// Attach a passport cookie to all further requests.
    pub fn with_passport(mut self, passport: Option<Passport>) -> Self {
        self.passport = passport;
        self
    }

    /// Override the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Underlying HTTP client, shared with the passport request.
    pub fn http(&self) -> &reqwest::Client {
        &self.client
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn is_authenticated(&self) -> bool {
        self.passport.is_some()
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/{}.json", self.base_url, method)
    }

    /// One GET, no retry.
    async fn get_once(&self, url: &str, params: &Params) -> Result<BlockSet> {
        let started = Instant::now();

        let mut request = self.client.get(url).query(params);
        if let Some(passport) = &self.passport {
            request = request.header(COOKIE, passport.cookie_header());
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                Error::Network(format!("request to {} timed out", url))
            } else {
                Error::Network(format!("request to {} failed: {}", url, e))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Network(format!("HTTP {} from {}", status, url)));
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::Network(format!("failed to read body from {}: {}", url, e)))?;

        let blocks = BlockSet::from_json(&body)?;

        debug!(
            url = %url,
            rows = blocks.max_rows(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "ISS response"
        );

        Ok(blocks)
    }

    /// GET with the retry policy applied.
    async fn get(&self, method: &str, params: &Params) -> Result<BlockSet> {
        let url = self.method_url(method);
        self.retry.run(&url, || self.get_once(&url, params)).await
    }

    /// Follow `start` paging until the block is exhausted and merge all pages.
    ///
    /// Stops on the cursor's total when ISS reports one, otherwise on an
    /// empty page or a page shorter than `page_size`.
    async fn get_paginated(
        &self,
        method: &str,
        params: &Params,
        block: &str,
        page_size: Option<u32>,
    ) -> Result<BlockSet> {
        let mut merged = BlockSet::default();
        let mut start: u64 = 0;

        for _ in 0..MAX_PAGES {
            let mut page_params = params.clone();
            page_params.push(("start".into(), start.to_string()));
            if let Some(limit) = page_size {
                page_params.push(("limit".into(), limit.to_string()));
            }

            let page = self.get(method, &page_params).await?;
            let rows = page.rows_in(block) as u64;
            let cursor = page.cursor(block);
            merged.merge(page)?;

            let next = match cursor {
                Some((index, total, size)) if index + size < total => Some(index + size),
                Some(_) => None,
                None => {
                    let short_page = page_size.map_or(false, |n| rows < u64::from(n));
                    if rows == 0 || short_page {
                        None
                    } else {
                        Some(start + rows)
                    }
                }
            };

            match next {
                Some(n) => start = n,
                None => return Ok(merged),
            }
        }

        Err(Error::Parse(format!(
            "{} did not finish paging after {} pages",
            method, MAX_PAGES
        )))
    }

    fn listing_params(&self) -> Params {
        let mut params: Params = vec![
            ("iss.meta".into(), "on".into()),
            (
                "iss.only".into(),
                "securities,marketdata,marketdata_yields".into(),
            ),
        ];

        if !self.securities_columns.is_empty() {
            let mut columns = vec![fields::SECID.to_string(), fields::BOARDID.to_string()];
            for column in &self.securities_columns {
                let column = column.to_uppercase();
                if !columns.contains(&column) {
                    columns.push(column);
                }
            }
            params.push(("securities.columns".into(), columns.join(",")));
        }

        if !self.marketdata_columns.is_empty() {
            let mut columns = vec![fields::SECID.to_string(), fields::BOARDID.to_string()];
            for column in &self.marketdata_columns {
                let column = column.to_uppercase();
                if !columns.contains(&column) {
                    columns.push(column);
                }
            }
            params.push(("marketdata.columns".into(), columns.join(",")));
        }

        params
    }
}

#[async_trait]
impl BondDataSource for IssClient {
    fn name(&self) -> &'static str {
        "iss"
    }

    async fn fetch_listing(&self, mode: &TradingMode) -> Result<Dataset> {
        let method = mode.listing_method();
        let params = self.listing_params();

        let blocks = match self.page_size {
            Some(size) => {
                self.get_paginated(&method, &params, "securities", Some(size))
                    .await?
            }
            None => {
                let mut params = params;
                params.push(("limit".into(), "unlimited".into()));
                self.get(&method, &params).await?
            }
        };

        listing_dataset(&blocks)
    }

    async fn fetch_trade_counts(
        &self,
        board_id: &str,
        secid: &str,
        from: NaiveDate,
    ) -> Result<Vec<f64>> {
        let method = format!(
            "history/engines/stock/markets/bonds/boards/{}/securities/{}",
            board_id, secid
        );
        let params: Params = vec![
            ("iss.meta".into(), "off".into()),
            ("iss.only".into(), "history,history.cursor".into()),
            ("history.columns".into(), "SECID,NUMTRADES".into()),
            ("from".into(), from.format("%Y-%m-%d").to_string()),
        ];

        let blocks = self.get_paginated(&method, &params, "history", None).await?;
        let history = blocks.require("history")?;
        let col = history.require_column("history", fields::NUMTRADES)?;

        Ok(history
            .data
            .iter()
            .filter_map(|row| Value::from_cell(&row[col], None))
            .filter_map(|v| v.as_f64())
            .collect())
    }

    async fn fetch_coupon_count(&self, secid: &str, from: NaiveDate) -> Result<usize> {
        let method = format!("securities/{}/bondization", secid);
        let params: Params = vec![
            ("iss.meta".into(), "off".into()),
            ("iss.only".into(), "coupons".into()),
            ("coupons.columns".into(), "coupondate,secid".into()),
            ("from".into(), from.format("%Y-%m-%d").to_string()),
            ("limit".into(), "unlimited".into()),
        ];

        let blocks = self.get(&method, &params).await?;
        Ok(blocks.require("coupons")?.len())
    }
}
