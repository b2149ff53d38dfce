use std::path::PathBuf;

use thiserror::Error;

/// Convenient alias for fallible results returned throughout the crate.
pub type Result<T> = std::result::Result<T, ToolError>;

/// Error type covering the different failure cases that can occur while a
/// processing session loads master data, talks to the model, or emits output.
///
/// Lookup misses are absent here: they are reported back to the model
/// as [`LookupOutcome`](crate::model::LookupOutcome) values.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Wrapper for IO failures such as reading inputs or writing outputs.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Raised when JSON parsing or serialization fails.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Errors bubbled up from the CSV writer or reader.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Transport-level failures talking to the model service.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Raised when a spreadsheet source cannot be opened or a sheet read.
    #[error("spreadsheet error in '{source_name}': {reason}")]
    Spreadsheet { source_name: String, reason: String },

    /// Raised when a source is not a recognised spreadsheet container.
    #[error("unsupported spreadsheet format for '{0}'")]
    UnsupportedFormat(String),

    /// Raised when every master data source failed to load.
    #[error("no master data could be loaded")]
    NoMasterData,

    /// Raised when the record handed to output assembly is not a JSON object.
    #[error("malformed record: {0}")]
    MalformedRecord(String),

    /// Raised when a required document is not a readable PDF.
    #[error("document '{name}' is unreadable: {reason}")]
    UnreadableDocument { name: String, reason: String },

    /// Raised when the document set does not satisfy the session rules.
    #[error("invalid document set: {0}")]
    InvalidDocumentSet(String),

    /// Raised when the model service fails or returns nothing usable.
    #[error("model service failure: {0}")]
    ExternalService(String),

    /// Raised when no API credential was supplied.
    #[error("an API key is required")]
    MissingApiKey,

    /// Raised when the user provides a path that does not exist.
    #[error("input file not found: {0}")]
    MissingInput(PathBuf),

    /// Raised when the tracing subscriber fails to initialise.
    #[error("failed to initialise logging: {0}")]
    Logging(String),
}
