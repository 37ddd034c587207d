//! Bond Screener Library
//!
//! Screens Moscow Exchange bonds: pulls listings for one or more trading
//! modes from the ISS REST API, keeps the bonds matching a configured set of
//! attribute criteria, and renders the result.
//!
//! # Modules
//!
//! - [`data`]: ISS client, response normalization, instrument model
//! - [`screener`]: criteria, filter engine, fetcher, enricher, reports

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod data;
pub mod screener;

pub use data::{BondDataSource, Dataset, Instrument, IssClient, TradingMode, Value, ValueKind};
pub use screener::{CriteriaSet, ReportFormat, ScreenerEngine, ScreenerReport, ScreenerResult};
