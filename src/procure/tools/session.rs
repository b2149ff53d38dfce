use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info, instrument, warn};

use crate::procure::tools::agent::{
    DocumentKind, EMIT_TOOL, ExtractionModel, LOOKUP_TOOL, ModelRequest, SourceDocument,
    ToolHandler,
};
use crate::procure::tools::config::SessionConfig;
use crate::procure::tools::error::{Result, ToolError};
use crate::procure::tools::io::csv_write::{self, AssembledRow};
use crate::procure::tools::io::excel_read::{self, MasterSource, SourceFailure};
use crate::procure::tools::lookup;
use crate::procure::tools::model::{LookupQuery, MasterData};
use crate::procure::tools::prompt::{self, PromptContext};
use crate::procure::tools::schema;

/// Fewest documents a session accepts.
pub const MIN_DOCUMENTS: usize = 2;
/// Most documents a session accepts.
pub const MAX_DOCUMENTS: usize = 4;

/// A single callback issued by the model, as recorded in the transcript.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolCall {
    pub tool: String,
    pub args: Value,
    pub result: String,
}

/// Session-scoped state reachable from tool callbacks: read-only master data,
/// a transcript, and the latest successfully assembled row.
#[derive(Debug)]
pub struct SessionTools<'a> {
    master: &'a MasterData,
    config: SessionConfig,
    transcript: Vec<ToolCall>,
    output: Option<AssembledRow>,
}

impl<'a> SessionTools<'a> {
    pub fn new(master: &'a MasterData, config: SessionConfig) -> Self {
        Self {
            master,
            config,
            transcript: Vec::new(),
            output: None,
        }
    }

    pub fn transcript(&self) -> &[ToolCall] {
        &self.transcript
    }

    pub fn output(&self) -> Option<&AssembledRow> {
        self.output.as_ref()
    }

    pub fn into_parts(self) -> (Vec<ToolCall>, Option<AssembledRow>) {
        (self.transcript, self.output)
    }

    fn lookup(&self, args: &Value) -> String {
        match serde_json::from_value::<LookupQuery>(args.clone()) {
            Ok(query) => {
                let outcome = lookup::lookup(self.master, &query);
                if outcome.is_found() {
                    info!(
                        table = %query.table_key,
                        value = %query.lookup_value,
                        result = %outcome,
                        "lookup succeeded"
                    );
                } else {
                    warn!(table = %query.table_key, value = %query.lookup_value, "{outcome}");
                }
                outcome.to_string()
            }
            Err(err) => format!("Error: invalid {LOOKUP_TOOL} arguments: {err}"),
        }
    }

    fn emit(&mut self, args: &Value) -> String {
        let Some(record_json) = record_argument(args) else {
            return "Error generating CSV: missing 'invoice_data_json' argument".to_string();
        };

        let row = match csv_write::assemble_row(&record_json) {
            Ok(row) => row,
            Err(err) => {
                error!(%err, "record could not be assembled");
                return format!("Error generating CSV: {err}");
            }
        };

        let missing = schema::missing_fields(&row.record, self.config.schema);
        if !missing.is_empty() {
            if self.config.strict_schema {
                warn!(?missing, "rejecting record with missing fields");
                return format!(
                    "Error generating CSV: missing required fields: {}",
                    missing.join(", ")
                );
            }
            warn!(?missing, "record is missing schema fields");
        }

        info!(fields = row.record.len(), "CSV data generated");
        self.output = Some(row);
        "Successfully generated CSV data".to_string()
    }
}

/// Accepts the record either as a JSON string or as an inline object.
fn record_argument(args: &Value) -> Option<String> {
    let value = args
        .get("invoice_data_json")
        .or_else(|| args.get("po_data_json"))
        .or_else(|| args.get("record_json"))?;
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Object(_) => Some(value.to_string()),
        _ => None,
    }
}

impl ToolHandler for SessionTools<'_> {
    fn call(&mut self, name: &str, args: &Value) -> String {
        let result = match name {
            LOOKUP_TOOL => self.lookup(args),
            EMIT_TOOL => self.emit(args),
            other => format!("Error: unknown tool '{other}'"),
        };
        debug!(tool = name, %result, "tool call finished");
        self.transcript.push(ToolCall {
            tool: name.to_string(),
            args: args.clone(),
            result: result.clone(),
        });
        result
    }
}

/// Everything a finished session produced.
#[derive(Debug, Clone)]
pub struct SessionOutcome {
    /// Final text answer of the model, absent when the model call failed.
    pub response_text: Option<String>,
    /// Set when the model failed after a record had already been emitted.
    pub model_failure: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub load_failures: Vec<SourceFailure>,
    pub output: Option<AssembledRow>,
}

impl SessionOutcome {
    /// Writes the CSV and JSON artifacts, if a record was produced.
    pub fn write_outputs(
        &self,
        dir: &Path,
        custom_name: Option<&str>,
    ) -> Result<Option<(PathBuf, PathBuf)>> {
        self.output
            .as_ref()
            .map(|row| row.write_to(dir, custom_name))
            .transpose()
    }
}

/// Checks the document set before anything is sent to the model.
pub fn validate_documents(documents: &[SourceDocument]) -> Result<()> {
    if !(MIN_DOCUMENTS..=MAX_DOCUMENTS).contains(&documents.len()) {
        return Err(ToolError::InvalidDocumentSet(format!(
            "expected between {MIN_DOCUMENTS} and {MAX_DOCUMENTS} documents, got {}",
            documents.len()
        )));
    }
    let mut seen = BTreeSet::new();
    for document in documents {
        if !seen.insert(document.kind) {
            return Err(ToolError::InvalidDocumentSet(format!(
                "more than one {} document",
                document.kind.label()
            )));
        }
        document.validate()?;
    }
    Ok(())
}

/// Runs one processing session: validate documents, load master data, let
/// the model work with the tool callbacks, and collect the results.
#[instrument(
    level = "info",
    skip_all,
    fields(documents = documents.len(), sources = master_sources.len())
)]
pub fn run_session(
    config: &SessionConfig,
    documents: Vec<SourceDocument>,
    master_sources: &[MasterSource],
    model: &dyn ExtractionModel,
) -> Result<SessionOutcome> {
    validate_documents(&documents)?;

    let report = excel_read::load_master_data(master_sources);
    if report.is_empty() {
        return Err(ToolError::NoMasterData);
    }
    info!(tables = report.tables.len(), failures = report.failures.len(), "master data ready");

    let kinds: Vec<DocumentKind> = documents.iter().map(|document| document.kind).collect();
    let keys = report.tables.keys();
    let prompt = prompt::build_prompt(&PromptContext {
        documents: &kinds,
        table_keys: &keys,
        schema: config.schema,
    })?;
    debug!(prompt_len = prompt.len(), "prompt built");

    let request = ModelRequest { prompt, documents };
    let mut tools = SessionTools::new(&report.tables, *config);
    let response = model.generate(&request, &mut tools);
    let (tool_calls, output) = tools.into_parts();

    let (response_text, model_failure) = match response {
        Ok(text) => (Some(text), None),
        Err(err) if output.is_some() => {
            warn!(%err, "model failed after the record was emitted");
            (None, Some(err.to_string()))
        }
        Err(err) => return Err(err),
    };

    Ok(SessionOutcome {
        response_text,
        model_failure,
        tool_calls,
        load_failures: report.failures,
        output,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::procure::tools::model::{CellValue, Table};
    use serde_json::json;

    fn master() -> MasterData {
        let mut table = Table::new(["Name", "Code"]);
        table.push_row(vec![
            CellValue::Text("ACME Corp".into()),
            CellValue::Text("V100".into()),
        ]);
        let mut master = MasterData::new();
        master.insert("vendors.xlsx", table);
        master
    }

    #[test]
    fn lookup_calls_are_recorded() {
        let master = master();
        let mut tools = SessionTools::new(&master, SessionConfig::default());
        let result = tools.call(
            LOOKUP_TOOL,
            &json!({
                "file_key": "vendors.xlsx",
                "lookup_column": "Name",
                "lookup_value": "acme",
                "return_column": "Code"
            }),
        );
        assert_eq!(result, "V100");
        assert_eq!(tools.transcript().len(), 1);
        assert_eq!(tools.transcript()[0].tool, LOOKUP_TOOL);
    }

    #[test]
    fn bad_arguments_are_described_not_raised() {
        let master = master();
        let mut tools = SessionTools::new(&master, SessionConfig::default());
        let result = tools.call(LOOKUP_TOOL, &json!({"file_key": "vendors.xlsx"}));
        assert!(result.starts_with("Error: invalid lookup_tool arguments"));
        assert_eq!(
            tools.call("delete_everything", &json!({})),
            "Error: unknown tool 'delete_everything'"
        );
    }

    #[test]
    fn emit_replaces_the_previous_row() {
        let master = master();
        let mut tools = SessionTools::new(&master, SessionConfig::default());
        tools.call(EMIT_TOOL, &json!({"invoice_data_json": "{\"PO Number\": \"1\"}"}));
        tools.call(EMIT_TOOL, &json!({"invoice_data_json": {"PO Number": "2"}}));
        let row = tools.output().unwrap();
        assert_eq!(row.csv, "PO Number\n2\n");
    }

    #[test]
    fn strict_schema_rejects_incomplete_records() {
        let master = master();
        let config = SessionConfig {
            strict_schema: true,
            ..SessionConfig::default()
        };
        let mut tools = SessionTools::new(&master, config);
        let record = json!({"invoice_data_json": "{\"PO Number\": \"1\"}"});
        let result = tools.call(EMIT_TOOL, &record);
        assert!(result.contains("missing required fields: Document Type"));
        assert!(tools.output().is_none());
    }

    #[test]
    fn malformed_records_keep_previous_output() {
        let master = master();
        let mut tools = SessionTools::new(&master, SessionConfig::default());
        tools.call(EMIT_TOOL, &json!({"invoice_data_json": "{\"A\": \"1\"}"}));
        let result = tools.call(EMIT_TOOL, &json!({"invoice_data_json": "{oops"}));
        assert!(result.starts_with("Error generating CSV"));
        assert_eq!(tools.output().unwrap().csv, "A\n1\n");
    }
}
