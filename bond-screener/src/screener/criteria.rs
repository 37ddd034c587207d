//! Screening criteria.
//!
//! A criterion compares one instrument attribute against a threshold.
//! Criteria are compiled once from config and checked against the dataset
//! schema before any row is evaluated.

use bond_common::{CriterionConfig, Error, Result};
use serde::Serialize;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::data::fields;
use crate::data::{Dataset, Instrument, Value, ValueKind};

// ============================================================================
// Operator
// ============================================================================

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
}

impl Operator {
    pub const ALL: [Operator; 8] = [
        Self::Eq,
        Self::Ne,
        Self::Lt,
        Self::Le,
        Self::Gt,
        Self::Ge,
        Self::In,
        Self::NotIn,
    ];

    /// `<`, `<=`, `>`, `>=`
    pub fn is_ordering(&self) -> bool {
        matches!(self, Self::Lt | Self::Le | Self::Gt | Self::Ge)
    }

    /// `in`, `not_in`
    pub fn is_membership(&self) -> bool {
        matches!(self, Self::In | Self::NotIn)
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::In => "in",
            Self::NotIn => "not_in",
        }
    }

    fn accepts(&self, ordering: Ordering) -> bool {
        match self {
            Self::Eq | Self::In => ordering == Ordering::Equal,
            Self::Ne | Self::NotIn => ordering != Ordering::Equal,
            Self::Lt => ordering == Ordering::Less,
            Self::Le => ordering != Ordering::Greater,
            Self::Gt => ordering == Ordering::Greater,
            Self::Ge => ordering != Ordering::Less,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for Operator {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "==" | "=" | "eq" => Ok(Self::Eq),
            "!=" | "<>" | "ne" => Ok(Self::Ne),
            "<" | "lt" => Ok(Self::Lt),
            "<=" | "le" | "lte" => Ok(Self::Le),
            ">" | "gt" => Ok(Self::Gt),
            ">=" | "ge" | "gte" => Ok(Self::Ge),
            "in" => Ok(Self::In),
            "not_in" | "not in" | "nin" => Ok(Self::NotIn),
            other => Err(Error::InvalidCriterion(format!(
                "unknown operator '{}'",
                other
            ))),
        }
    }
}

// ============================================================================
// Threshold
// ============================================================================

/// Right-hand side of a criterion.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Threshold {
    Scalar(Value),
    List(Vec<Value>),
}

impl Threshold {
    /// Read a threshold from its config representation.
    ///
    /// Strings in `YYYY-MM-DD` form become dates.
    pub fn from_json(value: &serde_json::Value) -> Result<Self> {
        match value {
            serde_json::Value::Array(items) => items
                .iter()
                .map(scalar_from_json)
                .collect::<Result<Vec<_>>>()
                .map(Self::List),
            other => scalar_from_json(other).map(Self::Scalar),
        }
    }

    fn values(&self) -> &[Value] {
        match self {
            Self::Scalar(v) => std::slice::from_ref(v),
            Self::List(items) => items,
        }
    }
}

impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar(v) => write!(f, "{}", v),
            Self::List(items) => {
                let parts: Vec<String> = items.iter().map(ToString::to_string).collect();
                write!(f, "[{}]", parts.join(", "))
            }
        }
    }
}

fn scalar_from_json(value: &serde_json::Value) -> Result<Value> {
    match value {
        serde_json::Value::Number(n) => n
            .as_f64()
            .map(Value::Number)
            .ok_or_else(|| Error::InvalidCriterion(format!("threshold {} is not a finite number", n))),
        serde_json::Value::String(s) => Ok(Value::parse_date(s.trim())
            .map(Value::Date)
            .unwrap_or_else(|| Value::Text(s.clone()))),
        other => Err(Error::InvalidCriterion(format!(
            "unsupported threshold {}",
            other
        ))),
    }
}

// ============================================================================
// Criterion
// ============================================================================

/// One attribute comparison.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Criterion {
    field: String,
    op: Operator,
    threshold: Threshold,
}

impl Criterion {
    /// Build a criterion, rejecting operator/threshold shapes that cannot be evaluated.
    pub fn new(field: &str, op: Operator, threshold: Threshold) -> Result<Self> {
        let field = fields::canonical(field);
        if field.is_empty() {
            return Err(Error::InvalidCriterion("criterion has no field".into()));
        }

        match (&threshold, op.is_membership()) {
            (Threshold::List(_), false) => {
                return Err(Error::InvalidCriterion(format!(
                    "{} {} needs a single value, got a list",
                    field, op
                )));
            }
            (Threshold::Scalar(_), true) => {
                return Err(Error::InvalidCriterion(format!(
                    "{} {} needs a list of values",
                    field, op
                )));
            }
            _ => {}
        }

        if op.is_ordering() {
            if let Threshold::Scalar(Value::Text(t)) = &threshold {
                return Err(Error::InvalidCriterion(format!(
                    "{} {} cannot order against text '{}'",
                    field, op, t
                )));
            }
        }

        Ok(Self {
            field,
            op,
            threshold,
        })
    }

    /// Compile a config entry.
    pub fn compile(config: &CriterionConfig) -> Result<Self> {
        let op: Operator = config.op.parse()?;
        let threshold = Threshold::from_json(&config.value)
            .map_err(|e| e.with_context(format!("criterion on '{}'", config.field)))?;
        Self::new(&config.field, op, threshold)
    }

    /// Canonical attribute name.
    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn op(&self) -> Operator {
        self.op
    }

    pub fn threshold(&self) -> &Threshold {
        &self.threshold
    }

    pub fn is_derived(&self) -> bool {
        fields::is_derived(&self.field)
    }

    /// Check that this criterion can be evaluated against an attribute kind.
    pub fn check_kind(&self, kind: ValueKind) -> Result<()> {
        if self.op.is_ordering() && kind == ValueKind::Text {
            return Err(Error::InvalidCriterion(format!(
                "{}: cannot apply {} to text attribute",
                self, self.op
            )));
        }

        for value in self.threshold.values() {
            if !kind_compatible(value.kind(), kind) {
                return Err(Error::InvalidCriterion(format!(
                    "{}: {} threshold against {} attribute",
                    self,
                    value.kind(),
                    kind
                )));
            }
        }

        Ok(())
    }

    /// Evaluate against one instrument. A missing attribute never matches.
    pub fn matches(&self, instrument: &Instrument) -> Result<bool> {
        let Some(cell) = instrument.resolve(&self.field) else {
            return Ok(false);
        };
        self.check_kind(cell.kind())?;

        let hit = |threshold: &Value| {
            compare(cell, threshold)
                .map(|ord| ord == Ordering::Equal)
                .unwrap_or(false)
        };

        let result = match (&self.threshold, self.op) {
            (Threshold::List(items), Operator::In) => items.iter().any(hit),
            (Threshold::List(items), Operator::NotIn) => !items.iter().any(hit),
            (Threshold::Scalar(threshold), op) => compare(cell, threshold)
                .map(|ord| op.accepts(ord))
                .unwrap_or(false),
            // shapes are fixed at construction
            (Threshold::List(_), _) => false,
        };

        Ok(result)
    }
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.field, self.op, self.threshold)
    }
}

/// A date threshold may be compared with a text column holding dates.
fn kind_compatible(threshold: ValueKind, attribute: ValueKind) -> bool {
    threshold == attribute || (threshold == ValueKind::Date && attribute == ValueKind::Text)
}

fn compare(cell: &Value, threshold: &Value) -> Option<Ordering> {
    match (cell, threshold) {
        (Value::Text(text), Value::Date(date)) => {
            Some(text.as_str().cmp(date.format("%Y-%m-%d").to_string().as_str()))
        }
        _ => cell.compare(threshold),
    }
}

// ============================================================================
// Criteria Set
// ============================================================================

/// All criteria of a run, ANDed together.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CriteriaSet {
    criteria: Vec<Criterion>,
}

impl CriteriaSet {
    pub fn new(criteria: Vec<Criterion>) -> Self {
        Self { criteria }
    }

    /// Compile every configured criterion, stopping at the first invalid one.
    pub fn from_config(configs: &[CriterionConfig]) -> Result<Self> {
        configs
            .iter()
            .enumerate()
            .map(|(i, c)| {
                Criterion::compile(c).map_err(|e| e.with_context(format!("criteria[{}]", i)))
            })
            .collect::<Result<Vec<_>>>()
            .map(Self::new)
    }

    pub fn len(&self) -> usize {
        self.criteria.len()
    }

    pub fn is_empty(&self) -> bool {
        self.criteria.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Criterion> {
        self.criteria.iter()
    }

    /// Referenced attribute names, first occurrence order.
    pub fn fields(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for criterion in &self.criteria {
            if !seen.contains(&criterion.field()) {
                seen.push(criterion.field());
            }
        }
        seen
    }

    /// Whether any criterion needs one of the given attributes.
    pub fn references_any(&self, names: &[&str]) -> bool {
        self.criteria.iter().any(|c| names.contains(&c.field()))
    }

    pub fn references_derived(&self) -> bool {
        self.criteria.iter().any(Criterion::is_derived)
    }

    /// Split into (listing criteria, derived-attribute criteria).
    pub fn split_derived(&self) -> (CriteriaSet, CriteriaSet) {
        let (derived, listing): (Vec<_>, Vec<_>) =
            self.criteria.iter().cloned().partition(Criterion::is_derived);
        (Self::new(listing), Self::new(derived))
    }

    /// Check every criterion against the kinds the dataset declares.
    ///
    /// Attributes the schema does not know are skipped; rows lacking them
    /// simply fail to match.
    pub fn check_schema(&self, dataset: &Dataset) -> Result<()> {
        for criterion in &self.criteria {
            if let Some(kind) = dataset.kind_of(criterion.field()) {
                criterion.check_kind(kind)?;
            }
        }
        Ok(())
    }

    /// True when every criterion holds.
    pub fn matches(&self, instrument: &Instrument) -> Result<bool> {
        for criterion in &self.criteria {
            if !criterion.matches(instrument)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

impl<'a> IntoIterator for &'a CriteriaSet {
    type Item = &'a Criterion;
    type IntoIter = std::slice::Iter<'a, Criterion>;

    fn into_iter(self) -> Self::IntoIter {
        self.criteria.iter()
    }
}
