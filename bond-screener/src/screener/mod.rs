//! Bond screener.
//!
//! # Pipeline
//!
//! ```text
//! modes ──▶ Fetcher ──▶ listing criteria ──▶ Enricher ──▶ derived criteria ──▶ sort/limit ──▶ Report
//!          (join_all)                       (buffered)
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use bond_screener::screener::{ScreenerEngine, ScreenerReport, ReportFormat};
//!
//! let engine = ScreenerEngine::new(&config, Arc::new(client))?;
//! let result = engine.run().await?;
//! println!("{}", ScreenerReport::new(&result, &[]).generate(ReportFormat::Table));
//! ```

pub mod criteria;
pub mod engine;
pub mod enrich;
pub mod fetcher;
pub mod filter;
pub mod report;

pub use criteria::{CriteriaSet, Criterion, Operator, Threshold};
pub use engine::{ScreenerEngine, ScreenerResult};
pub use enrich::{compute_profit, EnrichOptions, Enricher};
pub use fetcher::{FailedMode, FetchOutcome, Fetcher};
pub use filter::{FilterOutcome, FilterStage};
pub use report::{ReportFormat, ScreenerReport};
