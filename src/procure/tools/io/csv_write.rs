use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use crate::procure::tools::error::{Result, ToolError};

/// File name used when no custom output name is given.
pub const DEFAULT_OUTPUT_NAME: &str = "procurement_output.csv";

/// One logical record materialised as a single CSV row plus its JSON source.
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledRow {
    /// Field mapping in the order the caller supplied it.
    pub record: Map<String, Value>,
    /// Header line followed by one data line.
    pub csv: String,
    /// The JSON text exactly as received.
    pub json: String,
}

impl AssembledRow {
    /// Pretty JSON form used for the exported `.json` file.
    pub fn to_pretty_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.record)?)
    }

    /// Writes the CSV and JSON artifacts into `dir`, returning their paths.
    pub fn write_to(&self, dir: &Path, custom_name: Option<&str>) -> Result<(PathBuf, PathBuf)> {
        let (csv_name, json_name) = output_file_names(custom_name);
        std::fs::create_dir_all(dir)?;
        let csv_path = dir.join(csv_name);
        let json_path = dir.join(json_name);
        std::fs::write(&csv_path, &self.csv)?;
        std::fs::write(&json_path, self.to_pretty_json()?)?;
        Ok((csv_path, json_path))
    }
}

/// Parses a JSON object and renders it as a single-row CSV. Values are written
/// verbatim; nothing is validated, coerced, or defaulted.
pub fn assemble_row(record_json: &str) -> Result<AssembledRow> {
    let value: Value = serde_json::from_str(record_json)
        .map_err(|err| ToolError::MalformedRecord(err.to_string()))?;
    let Value::Object(record) = value else {
        return Err(ToolError::MalformedRecord(
            "expected a JSON object mapping field names to values".into(),
        ));
    };

    let csv = write_row(&record)?;
    Ok(AssembledRow {
        record,
        csv,
        json: record_json.to_string(),
    })
}

fn write_row(record: &Map<String, Value>) -> Result<String> {
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    writer.write_record(record.keys())?;
    writer.write_record(record.values().map(value_to_cell))?;

    let bytes = writer
        .into_inner()
        .map_err(|err| ToolError::Io(err.into_error()))?;
    String::from_utf8(bytes).map_err(|err| ToolError::MalformedRecord(err.to_string()))
}

fn value_to_cell(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        Value::Bool(flag) => flag.to_string(),
        Value::Number(number) => number.to_string(),
        other => other.to_string(),
    }
}

/// Reads a header-plus-one-row CSV back into an ordered string mapping.
pub fn parse_row(csv_text: &str) -> Result<Map<String, Value>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(csv_text.as_bytes());
    let headers = reader.headers()?.clone();
    let row = reader
        .records()
        .next()
        .transpose()?
        .ok_or_else(|| ToolError::MalformedRecord("CSV has no data row".into()))?;

    Ok(headers
        .iter()
        .zip(row.iter())
        .map(|(header, cell)| (header.to_string(), Value::String(cell.to_string())))
        .collect())
}

/// Resolves the CSV and JSON file names for a session's output.
pub fn output_file_names(custom_name: Option<&str>) -> (String, String) {
    let csv_name = match custom_name.map(str::trim).filter(|name| !name.is_empty()) {
        Some(name) if name.ends_with(".csv") => name.to_string(),
        Some(name) => format!("{name}.csv"),
        None => DEFAULT_OUTPUT_NAME.to_string(),
    };
    let stem = csv_name.strip_suffix(".csv").unwrap_or(&csv_name);
    let json_name = format!("{stem}.json");
    (csv_name, json_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalars_are_rendered_verbatim() {
        let row = assemble_row(r#"{"Qty": 1, "Active": true, "Note": null, "Tags": ["a","b"]}"#)
            .unwrap();
        assert_eq!(row.csv, "Qty,Active,Note,Tags\n1,true,,\"[\"\"a\"\",\"\"b\"\"]\"\n");
    }

    #[test]
    fn non_object_records_are_malformed() {
        assert!(matches!(
            assemble_row("[1, 2]"),
            Err(ToolError::MalformedRecord(_))
        ));
        assert!(matches!(
            assemble_row("{not json"),
            Err(ToolError::MalformedRecord(_))
        ));
    }

    #[test]
    fn output_names_follow_custom_name() {
        assert_eq!(
            output_file_names(Some("march")),
            ("march.csv".to_string(), "march.json".to_string())
        );
        assert_eq!(
            output_file_names(Some("po.csv")),
            ("po.csv".to_string(), "po.json".to_string())
        );
        assert_eq!(
            output_file_names(Some("  ")),
            (
                "procurement_output.csv".to_string(),
                "procurement_output.json".to_string()
            )
        );
    }
}
