use std::collections::BTreeMap;
use std::fmt;

use chrono::{NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

/// Identifier addressing a loaded table. It is either the source name or
/// `{source}_{sheet}` for sources holding several sheets.
pub type TableKey = String;

/// Number of rows included in a table preview.
pub const PREVIEW_ROWS: usize = 3;

/// Represents a single spreadsheet cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    /// Plain text.
    Text(String),
    /// Numeric literal. Spreadsheets store integers as floats as well.
    Number(f64),
    /// Date or date-time.
    Date(NaiveDateTime),
    /// Boolean literal.
    Bool(bool),
    /// Blank cell.
    Empty,
}

impl CellValue {
    /// Returns the text representation used both for matching and for values
    /// handed back to callers.
    pub fn as_text(&self) -> String {
        match self {
            CellValue::Text(value) => value.clone(),
            CellValue::Number(value) => format_number(*value),
            CellValue::Date(value) => {
                if value.time().num_seconds_from_midnight() == 0 {
                    value.format("%Y-%m-%d").to_string()
                } else {
                    value.format("%Y-%m-%d %H:%M:%S").to_string()
                }
            }
            CellValue::Bool(value) => value.to_string(),
            CellValue::Empty => String::new(),
        }
    }

    /// True for blank cells, which read as empty text.
    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }
}

fn format_number(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

/// One sheet of master data: trimmed headers plus ordered rows.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

impl Table {
    /// Creates a table from raw header text, trimming every header once.
    pub fn new<I, S>(headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            columns: headers
                .into_iter()
                .map(|header| header.as_ref().trim().to_string())
                .collect(),
            rows: Vec::new(),
        }
    }

    /// Appends a row, padding or truncating it to the column count.
    pub fn push_row(&mut self, mut row: Vec<CellValue>) {
        row.resize(self.columns.len(), CellValue::Empty);
        self.rows.push(row);
    }

    /// Position of the first column whose header equals `name` after trimming.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        let name = name.trim();
        self.columns.iter().position(|column| column == name)
    }

    /// Returns the headers that occur more than once.
    pub fn duplicate_columns(&self) -> Vec<&str> {
        let mut duplicates = Vec::new();
        for (idx, column) in self.columns.iter().enumerate() {
            if self.columns[..idx].contains(column) && !duplicates.contains(&column.as_str()) {
                duplicates.push(column.as_str());
            }
        }
        duplicates
    }
}

/// The lookup table collection built once per session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MasterData {
    tables: BTreeMap<TableKey, Table>,
}

impl MasterData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a table, returning the one previously stored under `key`.
    pub fn insert(&mut self, key: impl Into<TableKey>, table: Table) -> Option<Table> {
        self.tables.insert(key.into(), table)
    }

    pub fn get(&self, key: &str) -> Option<&Table> {
        self.tables.get(key)
    }

    /// Table keys in sorted order.
    pub fn keys(&self) -> Vec<&str> {
        self.tables.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Table)> {
        self.tables.iter().map(|(key, table)| (key.as_str(), table))
    }

    /// Describes every table for display.
    pub fn summaries(&self) -> Vec<TableSummary> {
        self.iter()
            .map(|(key, table)| TableSummary {
                key: key.to_string(),
                row_count: table.rows.len(),
                columns: table.columns.clone(),
                preview: table
                    .rows
                    .iter()
                    .take(PREVIEW_ROWS)
                    .map(|row| row.iter().map(CellValue::as_text).collect())
                    .collect(),
            })
            .collect()
    }
}

/// Shape of a loaded table, used for inspection output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableSummary {
    pub key: TableKey,
    pub row_count: usize,
    pub columns: Vec<String>,
    pub preview: Vec<Vec<String>>,
}

/// A point lookup against the master data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupQuery {
    #[serde(alias = "file_key", alias = "file_name")]
    pub table_key: String,
    pub lookup_column: String,
    pub lookup_value: String,
    pub return_column: String,
}

impl LookupQuery {
    pub fn new(
        table_key: impl Into<String>,
        lookup_column: impl Into<String>,
        lookup_value: impl Into<String>,
        return_column: impl Into<String>,
    ) -> Self {
        Self {
            table_key: table_key.into(),
            lookup_column: lookup_column.into(),
            lookup_value: lookup_value.into(),
            return_column: return_column.into(),
        }
    }
}

/// Result of a lookup. Every variant other than `Found` is a recoverable miss.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupOutcome {
    /// The `return_column` value of the first matching row.
    Found(String),
    /// The requested table key is not loaded.
    UnknownTable {
        requested: String,
        available: Vec<String>,
    },
    /// A requested column does not exist in the table.
    UnknownColumn {
        table: String,
        column: String,
        available: Vec<String>,
    },
    /// No row contains the value.
    NoMatch {
        table: String,
        column: String,
        value: String,
    },
}

impl LookupOutcome {
    pub fn is_found(&self) -> bool {
        matches!(self, LookupOutcome::Found(_))
    }
}

impl fmt::Display for LookupOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LookupOutcome::Found(value) => f.write_str(value),
            LookupOutcome::UnknownTable {
                requested,
                available,
            } => write!(
                f,
                "Master data key '{requested}' not found. Available keys: {}",
                quoted_list(available)
            ),
            LookupOutcome::UnknownColumn {
                table,
                column,
                available,
            } => write!(
                f,
                "Column '{column}' not found in {table}. Available columns: {}",
                quoted_list(available)
            ),
            LookupOutcome::NoMatch {
                table,
                column,
                value,
            } => write!(f, "Value '{value}' not found in {table} column '{column}'"),
        }
    }
}

fn quoted_list(items: &[String]) -> String {
    let quoted: Vec<String> = items.iter().map(|item| format!("'{item}'")).collect();
    format!("[{}]", quoted.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn integral_numbers_render_without_fraction() {
        assert_eq!(CellValue::Number(100.0).as_text(), "100");
        assert_eq!(CellValue::Number(18.5).as_text(), "18.5");
        assert_eq!(CellValue::Number(-3.0).as_text(), "-3");
    }

    #[test]
    fn dates_render_with_time_only_when_present() {
        let day = NaiveDate::from_ymd_opt(2025, 7, 19).unwrap();
        let midnight = day.and_hms_opt(0, 0, 0).unwrap();
        let afternoon = day.and_hms_opt(14, 30, 0).unwrap();
        assert_eq!(CellValue::Date(midnight).as_text(), "2025-07-19");
        assert_eq!(
            CellValue::Date(afternoon).as_text(),
            "2025-07-19 14:30:00"
        );
    }

    #[test]
    fn headers_are_trimmed_on_construction() {
        let table = Table::new([" Tax Code ", "Rate\t"]);
        assert_eq!(table.columns, vec!["Tax Code", "Rate"]);
        assert_eq!(table.column_index("Tax Code"), Some(0));
        assert_eq!(table.column_index(" Tax Code "), Some(0));
    }

    #[test]
    fn short_rows_are_padded() {
        let mut table = Table::new(["A", "B", "C"]);
        table.push_row(vec![CellValue::Text("x".into())]);
        assert_eq!(table.rows[0].len(), 3);
        assert_eq!(table.rows[0][2], CellValue::Empty);
    }

    #[test]
    fn duplicate_columns_are_reported_once() {
        let table = Table::new(["Code", " Code", "Name", "Code "]);
        assert_eq!(table.duplicate_columns(), vec!["Code"]);
        assert_eq!(table.column_index("Code"), Some(0));
    }

    #[test]
    fn unknown_table_message_lists_available_keys() {
        let outcome = LookupOutcome::UnknownTable {
            requested: "missing.xlsx".into(),
            available: vec!["vendors.xlsx".into()],
        };
        assert_eq!(
            outcome.to_string(),
            "Master data key 'missing.xlsx' not found. Available keys: ['vendors.xlsx']"
        );
    }
}
