//! Adapters between the in-memory model and external formats: spreadsheet
//! sources on the way in, CSV and JSON records on the way out.

pub mod csv_write;
pub mod excel_read;
