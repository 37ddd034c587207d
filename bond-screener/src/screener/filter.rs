//! Filter engine.
//!
//! Filtering is a pure function of a dataset and a criteria set: no I/O and
//! the input is never modified.

use bond_common::Result;
use serde::Serialize;
use tracing::debug;

use super::criteria::CriteriaSet;
use crate::data::Dataset;

// ============================================================================
// Filter Stage
// ============================================================================

/// Where in the pipeline a set of bonds was counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterStage {
    /// All fetched bonds
    Fetched,
    /// Criteria on listing attributes
    Listing,
    /// Criteria on enriched attributes
    Derived,
    /// After sorting and limit
    Final,
}

impl std::fmt::Display for FilterStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fetched => write!(f, "fetched"),
            Self::Listing => write!(f, "listing criteria"),
            Self::Derived => write!(f, "derived criteria"),
            Self::Final => write!(f, "final"),
        }
    }
}

// ============================================================================
// Filter Outcome
// ============================================================================

/// Counts for one stage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterOutcome {
    pub stage: FilterStage,
    /// Bonds that passed this stage
    pub passed: usize,
    /// Bonds eliminated at this stage
    pub eliminated: usize,
    /// Elimination rate (%)
    pub elimination_rate: f64,
}

impl FilterOutcome {
    pub fn new(stage: FilterStage, input_count: usize, passed_count: usize) -> Self {
        let eliminated = input_count.saturating_sub(passed_count);
        let elimination_rate = if input_count > 0 {
            (eliminated as f64 / input_count as f64) * 100.0
        } else {
            0.0
        };

        Self {
            stage,
            passed: passed_count,
            eliminated,
            elimination_rate,
        }
    }
}

// ============================================================================
// Filtering
// ============================================================================

/// Keep the bonds satisfying every criterion, in input order.
///
/// Fails with `Error::InvalidCriterion` when a criterion cannot be evaluated
/// against the dataset schema or against an individual cell.
pub fn apply(dataset: &Dataset, criteria: &CriteriaSet) -> Result<Dataset> {
    if criteria.is_empty() {
        return Ok(dataset.clone());
    }

    criteria.check_schema(dataset)?;

    let mut passed = Vec::new();
    for instrument in dataset {
        if criteria.matches(instrument)? {
            passed.push(instrument.clone());
        }
    }

    Ok(dataset.with_instruments(passed))
}

/// [`apply`] plus stage counts.
pub fn apply_stage(
    stage: FilterStage,
    dataset: &Dataset,
    criteria: &CriteriaSet,
) -> Result<(Dataset, FilterOutcome)> {
    let passed = apply(dataset, criteria)?;
    let outcome = FilterOutcome::new(stage, dataset.len(), passed.len());

    debug!(
        stage = %stage,
        criteria = criteria.len(),
        input = dataset.len(),
        passed = outcome.passed,
        "Filter stage complete"
    );

    Ok((passed, outcome))
}
