//! Report generation module for screener results.
//!
//! Generates reports in various formats:
//! - Plain table (terminal)
//! - Markdown (for documentation)
//! - JSON (for programmatic use)

use serde::Serialize;

use crate::data::fields;
use crate::data::{Instrument, ValueKind};

use super::engine::ScreenerResult;

// ============================================================================
// Report Format
// ============================================================================

/// Supported report formats.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum ReportFormat {
    /// Aligned plain-text columns
    #[default]
    Table,
    /// Markdown format (human-readable)
    Markdown,
    /// JSON array of bonds (machine-readable)
    Json,
}

impl std::fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Table => write!(f, "table"),
            Self::Markdown => write!(f, "markdown"),
            Self::Json => write!(f, "json"),
        }
    }
}

impl std::str::FromStr for ReportFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" | "text" => Ok(Self::Table),
            "markdown" | "md" => Ok(Self::Markdown),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown report format: {}", s)),
        }
    }
}

// ============================================================================
// Screener Report
// ============================================================================

/// Report generator for screener results.
pub struct ScreenerReport<'a> {
    result: &'a ScreenerResult,
    columns: Vec<String>,
}

impl<'a> ScreenerReport<'a> {
    /// Create a report. An empty column list selects the defaults plus any
    /// derived attributes the run computed.
    pub fn new(result: &'a ScreenerResult, columns: &[String]) -> Self {
        let columns = if columns.is_empty() {
            default_columns(result)
        } else {
            columns.iter().map(|c| fields::canonical(c)).collect()
        };
        Self { result, columns }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Generate report in the specified format.
    pub fn generate(&self, format: ReportFormat) -> String {
        match format {
            ReportFormat::Table => self.to_table(),
            ReportFormat::Markdown => self.to_markdown(),
            ReportFormat::Json => self.to_json(),
        }
    }

    fn empty_notice(&self) -> String {
        format!(
            "No bonds matched the criteria ({} screened).",
            self.result.total_fetched
        )
    }

    fn is_numeric(&self, column: &str) -> bool {
        self.result.bonds.kind_of(column) == Some(ValueKind::Number)
    }

    fn rows(&self) -> Vec<Vec<String>> {
        self.result
            .bonds
            .iter()
            .map(|bond| self.columns.iter().map(|c| cell(bond, c)).collect())
            .collect()
    }

    /// Generate aligned plain-text table.
    pub fn to_table(&self) -> String {
        if self.result.bonds.is_empty() {
            return format!("{}\n", self.empty_notice());
        }

        let rows = self.rows();
        let widths: Vec<usize> = self
            .columns
            .iter()
            .enumerate()
            .map(|(i, header)| {
                rows.iter()
                    .map(|r| r[i].chars().count())
                    .chain(std::iter::once(header.chars().count()))
                    .max()
                    .unwrap_or(0)
            })
            .collect();

        let numeric: Vec<bool> = self.columns.iter().map(|c| self.is_numeric(c)).collect();
        let render = |cells: &[String]| -> String {
            let parts: Vec<String> = cells
                .iter()
                .enumerate()
                .map(|(i, text)| {
                    if numeric[i] {
                        format!("{:>width$}", text, width = widths[i])
                    } else {
                        format!("{:<width$}", text, width = widths[i])
                    }
                })
                .collect();
            parts.join("  ").trim_end().to_string()
        };

        let mut out = String::new();
        out.push_str(&render(&self.columns));
        out.push('\n');
        let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
        out.push_str(&rule.join("  "));
        out.push('\n');
        for row in &rows {
            out.push_str(&render(row));
            out.push('\n');
        }
        out
    }

    /// Generate Markdown report.
    pub fn to_markdown(&self) -> String {
        let mut md = String::new();

        md.push_str(&format!("# Bond Screen {}\n\n", self.result.id));
        md.push_str(&format!("{}\n\n", self.result.summary()));

        md.push_str(&format!(
            "- **Trading modes**: {}\n",
            self.result.modes.join(", ")
        ));
        if !self.result.criteria.is_empty() {
            md.push_str(&format!(
                "- **Criteria**: {}\n",
                self.result
                    .criteria
                    .iter()
                    .map(|c| format!("`{}`", c))
                    .collect::<Vec<_>>()
                    .join(", ")
            ));
        }
        if !self.result.failed_modes.is_empty() {
            md.push_str(&format!(
                "- **Skipped modes**: {}\n",
                self.result
                    .failed_modes
                    .iter()
                    .map(|f| f.mode.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ));
        }
        md.push('\n');

        if self.result.bonds.is_empty() {
            md.push_str(&format!("{}\n", self.empty_notice()));
            return md;
        }

        md.push_str(&format!("| {} |\n", self.columns.join(" | ")));
        let align: Vec<&str> = self
            .columns
            .iter()
            .map(|c| if self.is_numeric(c) { "---:" } else { "---" })
            .collect();
        md.push_str(&format!("|{}|\n", align.join("|")));

        for row in self.rows() {
            let escaped: Vec<String> = row.iter().map(|c| c.replace('|', "\\|")).collect();
            md.push_str(&format!("| {} |\n", escaped.join(" | ")));
        }

        md
    }

    /// Generate JSON array of the selected columns per bond.
    pub fn to_json(&self) -> String {
        let bonds: Vec<serde_json::Map<String, serde_json::Value>> = self
            .result
            .bonds
            .iter()
            .map(|bond| {
                self.columns
                    .iter()
                    .map(|c| {
                        let value = bond
                            .get(c)
                            .and_then(|v| serde_json::to_value(v).ok())
                            .unwrap_or(serde_json::Value::Null);
                        (c.clone(), value)
                    })
                    .collect()
            })
            .collect();

        serde_json::to_string_pretty(&bonds).unwrap_or_else(|_| "[]".to_string())
    }
}

fn default_columns(result: &ScreenerResult) -> Vec<String> {
    let mut columns: Vec<String> = fields::DEFAULT_COLUMNS
        .iter()
        .map(|c| c.to_string())
        .collect();
    for derived in [fields::NUMTRADES_MIN, fields::COUPONS_LEFT, fields::PROFIT] {
        if result.has_attribute(derived) {
            columns.push(derived.to_string());
        }
    }
    columns
}

fn cell(bond: &Instrument, column: &str) -> String {
    bond.get(column)
        .map(ToString::to_string)
        .unwrap_or_else(|| "-".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Dataset, Value};
    use crate::screener::fetcher::FailedMode;
    use chrono::{NaiveDate, Utc};

    fn result(bonds: Vec<Instrument>) -> ScreenerResult {
        let now = Utc::now();
        ScreenerResult {
            id: "scan_20260101_000000".into(),
            total_fetched: 10,
            bonds: Dataset::from_instruments(bonds),
            stages: vec![],
            modes: vec!["58".into(), "TQCB".into()],
            failed_modes: vec![FailedMode {
                mode: "TQCB".into(),
                error: "HTTP 503".into(),
            }],
            criteria: vec!["YIELD >= 8".into()],
            duplicates: 0,
            enriched: false,
            sorted_by: None,
            started_at: now,
            completed_at: now,
            duration_secs: 0.5,
        }
    }

    fn sample() -> Vec<Instrument> {
        vec![
            Instrument::new("SU26238RMFS4", "TQOB")
                .with("SHORTNAME", Value::Text("OFZ 26238".into()))
                .with("YIELD", Value::Number(14.25))
                .with("MATDATE", Value::Date(NaiveDate::from_ymd_opt(2041, 5, 15).unwrap())),
            Instrument::new("RU000A1", "TQCB")
                .with("SHORTNAME", Value::Text("A|B".into()))
                .with("YIELD", Value::Number(9.0))
                .with("PROFIT", Value::Number(12.5)),
        ]
    }

    #[test]
    fn test_report_format_parse() {
        assert_eq!("table".parse::<ReportFormat>().unwrap(), ReportFormat::Table);
        assert_eq!("MD".parse::<ReportFormat>().unwrap(), ReportFormat::Markdown);
        assert_eq!("json".parse::<ReportFormat>().unwrap(), ReportFormat::Json);
        assert!("telegram".parse::<ReportFormat>().is_err());
        assert_eq!(ReportFormat::Markdown.to_string(), "markdown");
    }

    #[test]
    fn test_default_columns_include_profit_when_present() {
        let r = result(sample());
        let report = ScreenerReport::new(&r, &[]);
        assert_eq!(report.columns().last().map(String::as_str), Some("PROFIT"));
        assert!(!report.columns().iter().any(|c| c == "COUPONS_LEFT"));
    }

    #[test]
    fn test_table_alignment() {
        let r = result(sample());
        let columns = vec!["secid".to_string(), "yield".to_string()];
        let table = ScreenerReport::new(&r, &columns).to_table();
        let lines: Vec<&str> = table.lines().collect();

        assert_eq!(lines[0], "SECID         YIELD");
        assert_eq!(lines[1], "------------  -----");
        assert_eq!(lines[2], "SU26238RMFS4  14.25");
        assert_eq!(lines[3], "RU000A1           9");
    }

    #[test]
    fn test_markdown() {
        let r = result(sample());
        let columns = vec!["SHORTNAME".to_string(), "PROFIT".to_string()];
        let md = ScreenerReport::new(&r, &columns).to_markdown();

        assert!(md.starts_with("# Bond Screen scan_20260101_000000"));
        assert!(md.contains("`YIELD >= 8`"));
        assert!(md.contains("**Skipped modes**: TQCB"));
        assert!(md.contains("| SHORTNAME | PROFIT |\n|---|---:|"));
        assert!(md.contains("| OFZ 26238 | - |"));
        assert!(md.contains("| A\\|B | 12.5 |"));
    }

    #[test]
    fn test_json() {
        let r = result(sample());
        let columns = vec!["SECID".to_string(), "MATDATE".to_string()];
        let json = ScreenerReport::new(&r, &columns).to_json();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed[0]["SECID"], "SU26238RMFS4");
        assert_eq!(parsed[0]["MATDATE"], "2041-05-15");
        assert!(parsed[1]["MATDATE"].is_null());
    }

    #[test]
    fn test_empty_result() {
        let r = result(vec![]);
        let report = ScreenerReport::new(&r, &[]);
        assert_eq!(
            report.to_table(),
            "No bonds matched the criteria (10 screened).\n"
        );
        assert_eq!(report.to_json(), "[]");
        assert!(report
            .to_markdown()
            .contains("No bonds matched the criteria"));
    }
}
