//! ISS response blocks and their normalization into instruments.
//!
//! An ISS JSON response looks like:
//!
//! ```text
//! {
//!   "securities": { "metadata": {...}, "columns": ["SECID", ...], "data": [[...], ...] },
//!   "marketdata": { "metadata": {...}, "columns": ["SECID", ...], "data": [[...], ...] }
//! }
//! ```
//!
//! Blocks we do not ask for are ignored. A block we need that is missing,
//! or one whose rows do not line up with its columns, is a parse error.

use bond_common::{Error, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use super::fields;
use super::instrument::{Dataset, Instrument, Value, ValueKind};

/// Listing blocks merged into the securities rows, in priority order.
const MARKETDATA_BLOCKS: &[&str] = &["marketdata", "marketdata_yields"];

// ============================================================================
// Trading Mode
// ============================================================================

/// A trading mode to query: an ISS board group or a single board.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TradingMode {
    /// Numeric board group, e.g. 58 (T+ bonds)
    BoardGroup(u32),
    /// Board id, e.g. "TQOB"
    Board(String),
}

impl TradingMode {
    /// ISS method path of the bond listing for this mode.
    pub fn listing_method(&self) -> String {
        match self {
            Self::BoardGroup(group) => {
                format!("engines/stock/markets/bonds/boardgroups/{}/securities", group)
            }
            Self::Board(board) => format!("engines/stock/markets/bonds/boards/{}/securities", board),
        }
    }
}

impl FromStr for TradingMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let code = s.trim();
        if code.is_empty() {
            return Err(Error::Config("empty trading mode code".into()));
        }

        if code.chars().all(|c| c.is_ascii_digit()) {
            return code
                .parse::<u32>()
                .map(Self::BoardGroup)
                .map_err(|e| Error::Config(format!("invalid board group '{}': {}", code, e)));
        }

        if !code.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(Error::Config(format!("invalid board id '{}'", code)));
        }

        Ok(Self::Board(code.to_uppercase()))
    }
}

impl fmt::Display for TradingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BoardGroup(group) => write!(f, "{}", group),
            Self::Board(board) => write!(f, "{}", board),
        }
    }
}

// ============================================================================
// Blocks
// ============================================================================

/// Column metadata as reported with `iss.meta=on`.
#[derive(Debug, Clone, Deserialize)]
pub struct ColumnMeta {
    #[serde(rename = "type", default)]
    pub type_name: Option<String>,
}

/// One ISS table.
#[derive(Debug, Clone, Deserialize)]
pub struct IssBlock {
    pub columns: Vec<String>,
    pub data: Vec<Vec<serde_json::Value>>,
    #[serde(default)]
    pub metadata: Option<BTreeMap<String, ColumnMeta>>,
}

impl IssBlock {
    /// Upper-case column names and check every row against the column count.
    fn normalize(mut self, name: &str) -> Result<Self> {
        self.columns = self.columns.iter().map(|c| c.to_uppercase()).collect();
        self.metadata = self.metadata.map(|meta| {
            meta.into_iter()
                .map(|(column, m)| (column.to_uppercase(), m))
                .collect()
        });

        for (row_no, row) in self.data.iter().enumerate() {
            if row.len() != self.columns.len() {
                return Err(Error::Parse(format!(
                    "block '{}' row {} has {} cells, expected {}",
                    name,
                    row_no,
                    row.len(),
                    self.columns.len()
                )));
            }
        }

        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        let name = name.to_uppercase();
        self.columns.iter().position(|c| *c == name)
    }

    /// Index of a column the caller cannot do without.
    pub fn require_column(&self, block: &str, name: &str) -> Result<usize> {
        self.column_index(name).ok_or_else(|| {
            Error::Parse(format!("block '{}' is missing column '{}'", block, name))
        })
    }

    /// Per-column kind from metadata, where reported.
    pub fn kinds(&self) -> Vec<Option<ValueKind>> {
        self.columns
            .iter()
            .map(|column| {
                self.metadata
                    .as_ref()
                    .and_then(|meta| meta.get(column))
                    .and_then(|m| m.type_name.as_deref())
                    .map(ValueKind::from_iss_type)
            })
            .collect()
    }

    /// Append the rows of another page of the same block.
    fn append(&mut self, name: &str, other: IssBlock) -> Result<()> {
        if self.columns != other.columns {
            return Err(Error::Parse(format!(
                "block '{}' changed columns between pages",
                name
            )));
        }
        if self.metadata.is_none() {
            self.metadata = other.metadata;
        }
        self.data.extend(other.data);
        Ok(())
    }

    /// Read a cell as a non-empty identifier string.
    fn identifier(&self, block: &str, row_no: usize, column: usize) -> Result<String> {
        match self.data[row_no].get(column) {
            Some(serde_json::Value::String(s)) if !s.trim().is_empty() => Ok(s.trim().to_string()),
            other => Err(Error::Parse(format!(
                "block '{}' row {} has invalid {} {:?}",
                block, row_no, self.columns[column], other
            ))),
        }
    }
}

/// All table blocks of one response (or of several pages merged).
#[derive(Debug, Clone, Default)]
pub struct BlockSet {
    blocks: BTreeMap<String, IssBlock>,
}

impl BlockSet {
    /// Parse a response body.
    ///
    /// Top-level entries that are not tables are skipped.
    pub fn from_json(body: &str) -> Result<Self> {
        let root: serde_json::Value = serde_json::from_str(body)
            .map_err(|e| Error::Parse(format!("response is not JSON: {}", e)))?;

        let object = root
            .as_object()
            .ok_or_else(|| Error::Parse("response is not a JSON object".into()))?;

        let mut blocks = BTreeMap::new();
        for (name, value) in object {
            let is_table = value
                .as_object()
                .map(|o| o.contains_key("columns") || o.contains_key("data"))
                .unwrap_or(false);
            if !is_table {
                continue;
            }

            let name = name.to_lowercase();
            let block: IssBlock = serde_json::from_value(value.clone())
                .map_err(|e| Error::Parse(format!("block '{}': {}", name, e)))?;
            blocks.insert(name.clone(), block.normalize(&name)?);
        }

        Ok(Self { blocks })
    }

    pub fn get(&self, name: &str) -> Option<&IssBlock> {
        self.blocks.get(name)
    }

    /// A block the caller cannot do without.
    pub fn require(&self, name: &str) -> Result<&IssBlock> {
        self.get(name)
            .ok_or_else(|| Error::Parse(format!("response has no '{}' block", name)))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.blocks.keys().map(String::as_str)
    }

    /// Rows in the named block, zero if absent.
    pub fn rows_in(&self, name: &str) -> usize {
        self.get(name).map(IssBlock::len).unwrap_or(0)
    }

    /// Largest row count across data blocks (cursor blocks excluded).
    pub fn max_rows(&self) -> usize {
        self.blocks
            .iter()
            .filter(|(name, _)| !name.ends_with(".cursor"))
            .map(|(_, block)| block.len())
            .max()
            .unwrap_or(0)
    }

    /// Paging cursor `(index, total, pagesize)` for a block, when ISS sends one.
    pub fn cursor(&self, name: &str) -> Option<(u64, u64, u64)> {
        let cursor = self.get(&format!("{}.cursor", name))?;
        let row = cursor.data.first()?;
        let read = |column: &str| -> Option<u64> {
            cursor
                .column_index(column)
                .and_then(|i| row.get(i))
                .and_then(serde_json::Value::as_u64)
        };
        Some((read("INDEX")?, read("TOTAL")?, read("PAGESIZE")?))
    }

    /// Merge another page into this set, appending rows block by block.
    pub fn merge(&mut self, other: BlockSet) -> Result<()> {
        for (name, block) in other.blocks {
            if name.ends_with(".cursor") {
                self.blocks.insert(name, block);
                continue;
            }
            match self.blocks.get_mut(&name) {
                Some(existing) => existing.append(&name, block)?,
                None => {
                    self.blocks.insert(name, block);
                }
            }
        }
        Ok(())
    }
}

// ============================================================================
// Normalization
// ============================================================================

/// Build the listing dataset from a securities response.
///
/// Market data rows are joined onto securities rows by (`SECID`, `BOARDID`),
/// or by `SECID` alone when the block was projected without `BOARDID`.
/// They never overwrite an attribute the securities block already set.
pub fn listing_dataset(blocks: &BlockSet) -> Result<Dataset> {
    let securities = blocks.require("securities")?;
    let secid_col = securities.require_column("securities", fields::SECID)?;
    let board_col = securities.require_column("securities", fields::BOARDID)?;

    let mut dataset = Dataset::new();
    declare_kinds(&mut dataset, securities);

    let kinds = securities.kinds();
    let mut instruments = Vec::with_capacity(securities.len());
    let mut by_key: HashMap<(String, String), usize> = HashMap::new();
    let mut by_secid: HashMap<String, usize> = HashMap::new();

    for row_no in 0..securities.len() {
        let secid = securities.identifier("securities", row_no, secid_col)?;
        let board = securities.identifier("securities", row_no, board_col)?;

        let mut instrument = Instrument::new(secid.clone(), board.clone());
        fill_attributes(&mut instrument, securities, row_no, &kinds, false);

        by_key.entry((secid.clone(), board)).or_insert(instruments.len());
        by_secid.entry(secid).or_insert(instruments.len());
        instruments.push(instrument);
    }

    for name in MARKETDATA_BLOCKS {
        let Some(block) = blocks.get(name) else {
            continue;
        };
        let secid_col = block.require_column(name, fields::SECID)?;
        let board_col = block.column_index(fields::BOARDID);
        declare_kinds(&mut dataset, block);
        let kinds = block.kinds();

        for row_no in 0..block.len() {
            let secid = block.identifier(name, row_no, secid_col)?;
            let target = match board_col {
                Some(col) => {
                    let board = block.identifier(name, row_no, col)?;
                    by_key.get(&(secid, board)).copied()
                }
                None => by_secid.get(&secid).copied(),
            };

            if let Some(idx) = target {
                fill_attributes(&mut instruments[idx], block, row_no, &kinds, true);
            }
        }
    }

    for instrument in instruments {
        dataset.push(instrument);
    }

    Ok(dataset)
}

fn declare_kinds(dataset: &mut Dataset, block: &IssBlock) {
    for (column, kind) in block.columns.iter().zip(block.kinds()) {
        if let Some(kind) = kind {
            dataset.declare(column, kind);
        }
    }
}

fn fill_attributes(
    instrument: &mut Instrument,
    block: &IssBlock,
    row_no: usize,
    kinds: &[Option<ValueKind>],
    keep_existing: bool,
) {
    for (col, cell) in block.data[row_no].iter().enumerate() {
        let column = &block.columns[col];
        if column == fields::SECID || column == fields::BOARDID {
            continue;
        }
        if let Some(value) = Value::from_cell(cell, kinds[col]) {
            if keep_existing {
                instrument.set_if_absent(column, value);
            } else {
                instrument.set(column, value);
            }
        }
    }
}
