//! Boundary to the generative model that reads the documents.
//!
//! The model is a black box reached through [`ExtractionModel`]. While it
//! works it may call back into the crate through a [`ToolHandler`]; the two
//! callbacks it is offered are [`LOOKUP_TOOL`] and [`EMIT_TOOL`].

pub mod gemini;

use std::path::Path;

use serde_json::{Value, json};

use crate::procure::tools::error::{Result, ToolError};

/// Name of the master data lookup callback.
pub const LOOKUP_TOOL: &str = "lookup_tool";
/// Name of the callback that hands over the finished record.
pub const EMIT_TOOL: &str = "generate_csv_tool";

const PDF_MAGIC: &[u8] = b"%PDF-";

/// The kinds of document a session may include.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DocumentKind {
    PurchaseOrder,
    Invoice,
    Contract,
    Ticket,
}

impl DocumentKind {
    pub const ALL: [DocumentKind; 4] = [
        DocumentKind::PurchaseOrder,
        DocumentKind::Invoice,
        DocumentKind::Contract,
        DocumentKind::Ticket,
    ];

    pub fn label(self) -> &'static str {
        match self {
            DocumentKind::PurchaseOrder => "Purchase Order",
            DocumentKind::Invoice => "Tax Invoice",
            DocumentKind::Contract => "Contract",
            DocumentKind::Ticket => "Jira Ticket",
        }
    }

    pub fn file_stem(self) -> &'static str {
        match self {
            DocumentKind::PurchaseOrder => "purchase_order",
            DocumentKind::Invoice => "invoice",
            DocumentKind::Contract => "contract",
            DocumentKind::Ticket => "ticket",
        }
    }
}

/// A PDF handed to the model.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceDocument {
    pub kind: DocumentKind,
    pub name: String,
    pub bytes: Vec<u8>,
}

impl SourceDocument {
    pub fn new(kind: DocumentKind, name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            kind,
            name: name.into(),
            bytes,
        }
    }

    pub fn from_path(kind: DocumentKind, path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ToolError::MissingInput(path.to_path_buf()));
        }
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("{}.pdf", kind.file_stem()));
        Ok(Self::new(kind, name, std::fs::read(path)?))
    }

    /// Rejects anything that is not a PDF.
    pub fn validate(&self) -> Result<()> {
        if self.bytes.is_empty() {
            return Err(self.unreadable("file is empty"));
        }
        if !self.bytes.starts_with(PDF_MAGIC) {
            return Err(self.unreadable("not a PDF document"));
        }
        Ok(())
    }

    fn unreadable(&self, reason: &str) -> ToolError {
        ToolError::UnreadableDocument {
            name: self.name.clone(),
            reason: reason.to_string(),
        }
    }
}

/// Everything the model receives for one session.
#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub prompt: String,
    pub documents: Vec<SourceDocument>,
}

/// Executes one callback issued by the model and returns the text handed
/// back to it. Implementations never fail: problems are described in the
/// returned text.
pub trait ToolHandler {
    fn call(&mut self, name: &str, args: &Value) -> String;
}

/// A generative model able to read documents and issue tool callbacks.
pub trait ExtractionModel {
    /// Runs one interaction to completion and returns the model's final text.
    fn generate(&self, request: &ModelRequest, tools: &mut dyn ToolHandler) -> Result<String>;
}

/// Function declarations advertised to the model.
pub fn tool_declarations() -> Value {
    let string = |description: &str| json!({ "type": "STRING", "description": description });
    json!([
        {
            "name": LOOKUP_TOOL,
            "description": "Looks up a value in a master data table and returns the corresponding \
                            value from another column of the first matching row.",
            "parameters": {
                "type": "OBJECT",
                "properties": {
                    "file_key": string("Master data key, e.g. `codes.xlsx` or `codes.xlsx_Tax`."),
                    "lookup_column": string("Column to search in."),
                    "lookup_value": string("Text to search for (case-insensitive substring)."),
                    "return_column": string("Column whose value is returned.")
                },
                "required": ["file_key", "lookup_column", "lookup_value", "return_column"]
            }
        },
        {
            "name": EMIT_TOOL,
            "description": "Generates the final CSV from the completed record.",
            "parameters": {
                "type": "OBJECT",
                "properties": {
                    "invoice_data_json": string("The completed record as a JSON object string.")
                },
                "required": ["invoice_data_json"]
            }
        }
    ])
}
