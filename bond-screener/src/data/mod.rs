//! Bond market data from the Moscow Exchange ISS API.
//!
//! # Endpoints
//! - Listing: `engines/stock/markets/bonds/boardgroups/{group}/securities`
//!   or `engines/stock/markets/bonds/boards/{board}/securities`
//! - Trade history: `history/engines/stock/markets/bonds/boards/{board}/securities/{secid}`
//! - Coupon schedule: `securities/{secid}/bondization`
//!
//! Every ISS JSON response is a set of named blocks, each a table of
//! `columns` plus `data` rows. [`block`] validates and normalizes those
//! tables into [`Instrument`] records.

mod auth;
pub mod block;
mod instrument;
mod iss;
mod provider;

pub use auth::{authenticate, Passport, PASSPORT_COOKIE};
pub use block::{BlockSet, IssBlock, TradingMode};
pub use instrument::{Dataset, Instrument, Value, ValueKind};
pub use iss::{IssClient, RetryPolicy};
pub use provider::BondDataSource;

/// Attribute names (upper-case ISS column names) and their aliases.
pub mod fields {
    pub const SECID: &str = "SECID";
    pub const BOARDID: &str = "BOARDID";
    pub const SHORTNAME: &str = "SHORTNAME";
    pub const SECNAME: &str = "SECNAME";
    pub const FACEUNIT: &str = "FACEUNIT";
    pub const FACEVALUE: &str = "FACEVALUE";
    pub const MATDATE: &str = "MATDATE";
    pub const PREVLEGALCLOSEPRICE: &str = "PREVLEGALCLOSEPRICE";
    pub const PREVPRICE: &str = "PREVPRICE";
    pub const YIELD: &str = "YIELD";
    pub const EFFECTIVEYIELD: &str = "EFFECTIVEYIELD";
    pub const DURATION: &str = "DURATION";
    pub const ACCRUEDINT: &str = "ACCRUEDINT";
    pub const COUPONVALUE: &str = "COUPONVALUE";
    pub const NUMTRADES: &str = "NUMTRADES";

    // Derived by the enricher
    pub const NUMTRADES_MIN: &str = "NUMTRADES_MIN";
    pub const NUMTRADES_TOTAL: &str = "NUMTRADES_TOTAL";
    pub const COUPONS_LEFT: &str = "COUPONS_LEFT";
    pub const PROFIT: &str = "PROFIT";

    /// Attributes computed from trade history.
    pub const HISTORY_FIELDS: &[&str] = &[NUMTRADES_MIN, NUMTRADES_TOTAL];

    /// Attributes computed from the coupon schedule.
    pub const COUPON_FIELDS: &[&str] = &[COUPONS_LEFT, PROFIT];

    /// Columns printed when none are configured.
    pub const DEFAULT_COLUMNS: &[&str] = &[
        SECID,
        BOARDID,
        SHORTNAME,
        FACEUNIT,
        FACEVALUE,
        MATDATE,
        PREVLEGALCLOSEPRICE,
        YIELD,
        DURATION,
    ];

    /// Resolve a user-facing name to its attribute name.
    ///
    /// Names are case-insensitive; a few semantic aliases map onto the
    /// ISS columns that carry them.
    pub fn canonical(name: &str) -> String {
        let upper = name.trim().to_uppercase();
        let resolved = match upper.as_str() {
            "ID" | "TICKER" | "ISIN" => SECID,
            "BOARD" | "MODE" | "TRADING_MODE" => BOARDID,
            "NAME" | "ISSUER" | "ISSUER_NAME" => SECNAME,
            "FACE_UNIT" | "CURRENCY" => FACEUNIT,
            "NOMINAL" | "FACE_VALUE" => FACEVALUE,
            "MATURITY" | "MATURITY_DATE" => MATDATE,
            "PRICE" => PREVLEGALCLOSEPRICE,
            "ACCRUED_INTEREST" => ACCRUEDINT,
            "COUPON" | "COUPON_VALUE" => COUPONVALUE,
            "MIN_TRADES" | "TRADES_MIN" | "LIQUIDITY" => NUMTRADES_MIN,
            "TOTAL_TRADES" => NUMTRADES_TOTAL,
            "COUPONS_REMAINING" => COUPONS_LEFT,
            _ => return upper,
        };
        resolved.to_string()
    }

    /// Column read when the given one is missing on a bond.
    pub fn fallback(name: &str) -> Option<&'static str> {
        match name {
            YIELD => Some(EFFECTIVEYIELD),
            PREVLEGALCLOSEPRICE => Some(PREVPRICE),
            _ => None,
        }
    }

    /// Whether an attribute only exists after enrichment.
    pub fn is_derived(name: &str) -> bool {
        let key = canonical(name);
        HISTORY_FIELDS.contains(&key.as_str()) || COUPON_FIELDS.contains(&key.as_str())
    }

}
