use std::io::Cursor;
use std::path::Path;

use calamine::{DataType, Ods, Range, Reader, Xls, Xlsb, Xlsx};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use tracing::{debug, info, instrument, warn};

use crate::procure::tools::error::{Result, ToolError};
use crate::procure::tools::model::{CellValue, MasterData, Table};

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const CFB_MAGIC: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

/// Raw spreadsheet bytes together with the name used to address them.
#[derive(Debug, Clone, PartialEq)]
pub struct MasterSource {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl MasterSource {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }

    /// Reads a source from disk, naming it after the file name.
    pub fn from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ToolError::MissingInput(path.to_path_buf()));
        }
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self::new(name, std::fs::read(path)?))
    }
}

/// Container formats understood by the loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpreadsheetFormat {
    Xlsx,
    Xlsb,
    Xls,
    Ods,
}

impl SpreadsheetFormat {
    /// Sniffs the container from its magic bytes, using the extension of
    /// `name` to tell the zip-based formats apart.
    pub fn detect(name: &str, bytes: &[u8]) -> Option<Self> {
        let extension = Path::new(name)
            .extension()
            .map(|ext| ext.to_string_lossy().to_ascii_lowercase());

        if bytes.starts_with(ZIP_MAGIC) {
            return Some(match extension.as_deref() {
                Some("xlsb") => SpreadsheetFormat::Xlsb,
                Some("ods") => SpreadsheetFormat::Ods,
                _ => SpreadsheetFormat::Xlsx,
            });
        }
        if bytes.starts_with(CFB_MAGIC) {
            return Some(SpreadsheetFormat::Xls);
        }
        None
    }
}

/// A source that could not be loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceFailure {
    pub source: String,
    pub reason: String,
}

/// Outcome of loading a batch of sources.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadReport {
    pub tables: MasterData,
    pub failures: Vec<SourceFailure>,
}

impl LoadReport {
    /// True when no table at all could be produced.
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

/// Builds the lookup table collection from a set of sources. A source that
/// fails to parse is skipped and reported; the rest still load.
#[instrument(level = "info", skip_all, fields(source_count = sources.len()))]
pub fn load_master_data(sources: &[MasterSource]) -> LoadReport {
    let mut report = LoadReport::default();

    for source in sources {
        match read_source(source) {
            Ok(sheets) => {
                let single = sheets.len() == 1;
                for (sheet_name, table) in sheets {
                    let key = if single {
                        source.name.clone()
                    } else {
                        format!("{}_{}", source.name, sheet_name)
                    };
                    let duplicates = table.duplicate_columns();
                    if !duplicates.is_empty() {
                        warn!(key = %key, ?duplicates, "duplicate headers after trimming");
                    }
                    info!(
                        key = %key,
                        rows = table.rows.len(),
                        columns = table.columns.len(),
                        "loaded master data table"
                    );
                    if report.tables.insert(key.clone(), table).is_some() {
                        warn!(key = %key, "table key collision, keeping the latest table");
                    }
                }
            }
            Err(error) => {
                warn!(source = %source.name, %error, "skipping unreadable master data source");
                report.failures.push(SourceFailure {
                    source: source.name.clone(),
                    reason: error.to_string(),
                });
            }
        }
    }

    debug!(
        tables = report.tables.len(),
        failures = report.failures.len(),
        "master data load finished"
    );
    report
}

/// Reads every sheet of one source, in workbook order.
pub fn read_source(source: &MasterSource) -> Result<Vec<(String, Table)>> {
    let format = SpreadsheetFormat::detect(&source.name, &source.bytes)
        .ok_or_else(|| ToolError::UnsupportedFormat(source.name.clone()))?;
    let cursor = Cursor::new(source.bytes.clone());

    match format {
        SpreadsheetFormat::Xlsx => {
            let workbook: Xlsx<_> = Xlsx::new(cursor).map_err(|err| spreadsheet(source, err))?;
            read_sheets(workbook, source)
        }
        SpreadsheetFormat::Xlsb => {
            let workbook: Xlsb<_> = Xlsb::new(cursor).map_err(|err| spreadsheet(source, err))?;
            read_sheets(workbook, source)
        }
        SpreadsheetFormat::Xls => {
            let workbook: Xls<_> = Xls::new(cursor).map_err(|err| spreadsheet(source, err))?;
            read_sheets(workbook, source)
        }
        SpreadsheetFormat::Ods => {
            let workbook: Ods<_> = Ods::new(cursor).map_err(|err| spreadsheet(source, err))?;
            read_sheets(workbook, source)
        }
    }
}

fn read_sheets<R>(mut workbook: R, source: &MasterSource) -> Result<Vec<(String, Table)>>
where
    R: Reader<Cursor<Vec<u8>>>,
    R::Error: std::fmt::Display,
{
    let sheet_names = workbook.sheet_names().to_vec();
    let mut sheets = Vec::with_capacity(sheet_names.len());

    for name in sheet_names {
        let range = workbook
            .worksheet_range(&name)
            .ok_or_else(|| ToolError::Spreadsheet {
                source_name: source.name.clone(),
                reason: format!("missing sheet '{name}'"),
            })?
            .map_err(|err| spreadsheet(source, err))?;
        sheets.push((name, range_to_table(&range)));
    }

    Ok(sheets)
}

/// Converts a sheet range into a table, treating the first row as headers.
pub fn range_to_table(range: &Range<DataType>) -> Table {
    let mut rows = range.rows();
    let Some(header_row) = rows.next() else {
        return Table::default();
    };

    let mut table = Table::new(header_row.iter().map(|cell| cell_to_value(cell).as_text()));
    for row in rows {
        let cells: Vec<CellValue> = row.iter().map(cell_to_value).collect();
        if cells.iter().all(CellValue::is_empty) {
            continue;
        }
        table.push_row(cells);
    }
    table
}

fn cell_to_value(cell: &DataType) -> CellValue {
    match cell {
        DataType::String(value) => CellValue::Text(value.clone()),
        DataType::Float(value) => CellValue::Number(*value),
        DataType::Int(value) => CellValue::Number(*value as f64),
        DataType::Bool(value) => CellValue::Bool(*value),
        DataType::DateTime(serial) => excel_serial_to_datetime(*serial)
            .map(CellValue::Date)
            .unwrap_or(CellValue::Number(*serial)),
        DataType::DateTimeIso(iso) => iso_to_datetime(iso)
            .map(CellValue::Date)
            .unwrap_or_else(|| CellValue::Text(iso.clone())),
        DataType::Empty => CellValue::Empty,
        other => CellValue::Text(other.to_string()),
    }
}

/// Converts a 1900-system serial date into a date-time.
fn excel_serial_to_datetime(serial: f64) -> Option<NaiveDateTime> {
    if !serial.is_finite() || serial < 0.0 {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    let millis = (serial * 86_400_000.0).round() as i64;
    epoch.checked_add_signed(Duration::milliseconds(millis))
}

/// Parses the ISO 8601 dates OpenDocument stores, with or without a time.
fn iso_to_datetime(iso: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(iso, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(iso, "%Y-%m-%d")
                .ok()?
                .and_hms_opt(0, 0, 0)
        })
}

fn spreadsheet(source: &MasterSource, err: impl std::fmt::Display) -> ToolError {
    ToolError::Spreadsheet {
        source_name: source.name.clone(),
        reason: err.to_string(),
    }
}
