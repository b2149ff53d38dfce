//! Core library for the procure-tools command line application.
//!
//! A processing session hands a few procurement PDFs to a generative model and
//! lets it call back into two local operations: a lookup over master data
//! spreadsheets and the assembly of the final record into a CSV row. Spreadsheet
//! and CSV adapters live under [`procure::tools::io`], the lookup table model in
//! [`procure::tools::model`], the lookup itself in [`procure::tools::lookup`],
//! the model boundary in [`procure::tools::agent`], and the orchestration in
//! [`procure::tools::session`].

pub mod procure;

pub use procure::tools::{
    Result, ToolError, agent, config, error, io, lookup, model, prompt, schema, session,
};
