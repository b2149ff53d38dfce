pub mod agent;
pub mod config;
pub mod error;
pub mod io;
pub mod lookup;
pub mod model;
pub mod prompt;
pub mod schema;
pub mod session;

pub use error::{Result, ToolError};
