//! Typed instrument records and the in-memory dataset.

use chrono::NaiveDate;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use super::fields;

/// ISS placeholder for "no date".
const EMPTY_DATE: &str = "0000-00-00";

// ============================================================================
// Attribute Values
// ============================================================================

/// Kind of an attribute, as reported by ISS column metadata or inferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    Number,
    Date,
    Text,
}

impl ValueKind {
    /// Map an ISS metadata type name ("int32", "double", "date", ...) to a kind.
    pub fn from_iss_type(type_name: &str) -> Self {
        match type_name.to_lowercase().as_str() {
            "int32" | "int64" | "double" | "number" | "int" | "float" => Self::Number,
            "date" => Self::Date,
            _ => Self::Text,
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number => write!(f, "number"),
            Self::Date => write!(f, "date"),
            Self::Text => write!(f, "text"),
        }
    }
}

/// A single attribute value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Number(f64),
    Date(NaiveDate),
    Text(String),
}

impl Value {
    /// Kind of this value.
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Number(_) => ValueKind::Number,
            Self::Date(_) => ValueKind::Date,
            Self::Text(_) => ValueKind::Text,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Self::Date(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Compare two values of the same kind. Values of different kinds are unordered.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Self::Number(a), Self::Number(b)) => a.partial_cmp(b),
            (Self::Date(a), Self::Date(b)) => Some(a.cmp(b)),
            (Self::Text(a), Self::Text(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Parse a `YYYY-MM-DD` string.
    pub fn parse_date(s: &str) -> Option<NaiveDate> {
        if s.len() != 10 || s == EMPTY_DATE {
            return None;
        }
        NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
    }

    /// Convert an ISS JSON cell into a value.
    ///
    /// `hint` comes from the block metadata. Nulls, empty strings and the
    /// ISS empty date become `None`, meaning the attribute is absent.
    pub fn from_cell(cell: &serde_json::Value, hint: Option<ValueKind>) -> Option<Value> {
        match cell {
            serde_json::Value::Null => None,
            serde_json::Value::Number(n) => n.as_f64().map(Value::Number),
            serde_json::Value::Bool(b) => Some(Value::Text(b.to_string())),
            serde_json::Value::String(s) => {
                let s = s.trim();
                if s.is_empty() || s == EMPTY_DATE {
                    return None;
                }
                match hint {
                    Some(ValueKind::Date) => Self::parse_date(s)
                        .map(Value::Date)
                        .or_else(|| Some(Value::Text(s.to_string()))),
                    Some(ValueKind::Number) => s
                        .replace(',', ".")
                        .parse::<f64>()
                        .ok()
                        .map(Value::Number)
                        .or_else(|| Some(Value::Text(s.to_string()))),
                    Some(ValueKind::Text) => Some(Value::Text(s.to_string())),
                    None => Some(
                        Self::parse_date(s)
                            .map(Value::Date)
                            .unwrap_or_else(|| Value::Text(s.to_string())),
                    ),
                }
            }
            other => Some(Value::Text(other.to_string())),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{}", n)
                }
            }
            Self::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Self::Text(s) => write!(f, "{}", s),
        }
    }
}

// ============================================================================
// Instrument
// ============================================================================

/// One bond as reported by the exchange.
///
/// `SECID` and `BOARDID` are always present; they are also stored in the
/// attribute map so criteria can reference them like any other column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Instrument {
    secid: String,
    board_id: String,
    attributes: BTreeMap<String, Value>,
}

impl Instrument {
    /// Create an instrument with its identifying attributes.
    pub fn new(secid: impl Into<String>, board_id: impl Into<String>) -> Self {
        let secid = secid.into();
        let board_id = board_id.into();
        let mut attributes = BTreeMap::new();
        attributes.insert(fields::SECID.to_string(), Value::Text(secid.clone()));
        attributes.insert(fields::BOARDID.to_string(), Value::Text(board_id.clone()));
        Self {
            secid,
            board_id,
            attributes,
        }
    }

    /// Builder-style attribute setter.
    pub fn with(mut self, name: &str, value: Value) -> Self {
        self.set(name, value);
        self
    }

    pub fn secid(&self) -> &str {
        &self.secid
    }

    pub fn board_id(&self) -> &str {
        &self.board_id
    }

    /// Look up an attribute by name or alias.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.attributes.get(&fields::canonical(name))
    }

    /// Like [`Instrument::get`], but falls back to the secondary column for
    /// yield and price when the primary one is missing.
    pub fn resolve(&self, name: &str) -> Option<&Value> {
        let key = fields::canonical(name);
        self.attributes.get(&key).or_else(|| {
            fields::fallback(&key).and_then(|alt| self.attributes.get(alt))
        })
    }

    /// Set an attribute. Identifier columns cannot be overwritten.
    pub fn set(&mut self, name: &str, value: Value) {
        let key = fields::canonical(name);
        if key == fields::SECID || key == fields::BOARDID {
            return;
        }
        self.attributes.insert(key, value);
    }

    /// Set an attribute only if it is not already present.
    pub fn set_if_absent(&mut self, name: &str, value: Value) {
        let key = fields::canonical(name);
        self.attributes.entry(key).or_insert(value);
    }

    pub fn attributes(&self) -> &BTreeMap<String, Value> {
        &self.attributes
    }

    fn number(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(Value::as_f64)
    }

    fn text(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_text)
    }

    pub fn short_name(&self) -> Option<&str> {
        self.text(fields::SHORTNAME)
    }

    /// Issuer / full security name.
    pub fn name(&self) -> Option<&str> {
        self.text(fields::SECNAME)
    }

    pub fn face_unit(&self) -> Option<&str> {
        self.text(fields::FACEUNIT)
    }

    pub fn face_value(&self) -> Option<f64> {
        self.number(fields::FACEVALUE)
    }

    pub fn maturity_date(&self) -> Option<NaiveDate> {
        self.get(fields::MATDATE).and_then(Value::as_date)
    }

    /// Last close price in percent of face value.
    pub fn price(&self) -> Option<f64> {
        self.resolve(fields::PREVLEGALCLOSEPRICE).and_then(Value::as_f64)
    }

    /// Yield in percent.
    pub fn yield_pct(&self) -> Option<f64> {
        self.resolve(fields::YIELD).and_then(Value::as_f64)
    }

    /// Duration in days.
    pub fn duration(&self) -> Option<f64> {
        self.number(fields::DURATION)
    }

    pub fn accrued_interest(&self) -> Option<f64> {
        self.number(fields::ACCRUEDINT)
    }

    pub fn coupon_value(&self) -> Option<f64> {
        self.number(fields::COUPONVALUE)
    }
}

// ============================================================================
// Dataset
// ============================================================================

/// Ordered collection of instruments with a column schema.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Dataset {
    schema: BTreeMap<String, ValueKind>,
    instruments: Vec<Instrument>,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a dataset, inferring the schema from the first non-null cell of each column.
    pub fn from_instruments(instruments: Vec<Instrument>) -> Self {
        let mut dataset = Self::new();
        for instrument in instruments {
            dataset.push(instrument);
        }
        dataset
    }

    /// Append an instrument, recording kinds of columns not yet in the schema.
    pub fn push(&mut self, instrument: Instrument) {
        for (name, value) in instrument.attributes() {
            self.schema.entry(name.clone()).or_insert(value.kind());
        }
        self.instruments.push(instrument);
    }

    /// Declare the kind of a column. The first declaration wins.
    pub fn declare(&mut self, name: &str, kind: ValueKind) {
        self.schema.entry(fields::canonical(name)).or_insert(kind);
    }

    /// Kind of a column, if known.
    pub fn kind_of(&self, name: &str) -> Option<ValueKind> {
        self.schema.get(&fields::canonical(name)).copied()
    }

    pub fn schema(&self) -> &BTreeMap<String, ValueKind> {
        &self.schema
    }

    pub fn len(&self) -> usize {
        self.instruments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instruments.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Instrument> {
        self.instruments.iter()
    }

    pub fn instruments(&self) -> &[Instrument] {
        &self.instruments
    }

    pub fn instruments_mut(&mut self) -> &mut Vec<Instrument> {
        &mut self.instruments
    }

    /// Replace the rows while keeping the schema.
    pub fn with_instruments(&self, instruments: Vec<Instrument>) -> Self {
        Self {
            schema: self.schema.clone(),
            instruments,
        }
    }

    pub fn into_instruments(self) -> Vec<Instrument> {
        self.instruments
    }

    /// Identifiers in dataset order.
    pub fn secids(&self) -> Vec<&str> {
        self.instruments.iter().map(Instrument::secid).collect()
    }
}

impl<'a> IntoIterator for &'a Dataset {
    type Item = &'a Instrument;
    type IntoIter = std::slice::Iter<'a, Instrument>;

    fn into_iter(self) -> Self::IntoIter {
        self.instruments.iter()
    }
}
