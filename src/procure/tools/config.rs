use std::fmt;
use std::time::Duration;

use crate::procure::tools::error::{Result, ToolError};
use crate::procure::tools::schema::SchemaVariant;

/// Base URL of the public Gemini API.
pub const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com";
/// Upper bound on model turns that issue tool calls within one session.
pub const DEFAULT_MAX_TOOL_ROUNDS: usize = 16;
/// Per-request HTTP timeout.
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// API credential. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Result<Self> {
        let key = key.into().trim().to_string();
        if key.is_empty() {
            return Err(ToolError::MissingApiKey);
        }
        Ok(Self(key))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(<redacted>)")
    }
}

/// The selectable model identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GeminiModel {
    #[default]
    Pro25,
    Flash25,
    Pro15,
}

impl GeminiModel {
    pub fn as_str(self) -> &'static str {
        match self {
            GeminiModel::Pro25 => "gemini-2.5-pro",
            GeminiModel::Flash25 => "gemini-2.5-flash",
            GeminiModel::Pro15 => "gemini-1.5-pro",
        }
    }
}

impl fmt::Display for GeminiModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Settings for reaching the model service.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub api_key: ApiKey,
    pub model: GeminiModel,
    pub endpoint: String,
    pub timeout: Duration,
    pub max_tool_rounds: usize,
}

impl ModelConfig {
    pub fn new(api_key: ApiKey, model: GeminiModel) -> Self {
        Self {
            api_key,
            model,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
        }
    }
}

/// Settings governing how a session treats the emitted record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionConfig {
    pub schema: SchemaVariant,
    /// Reject records missing schema fields instead of only warning.
    pub strict_schema: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_keys_are_rejected() {
        assert!(matches!(ApiKey::new("   "), Err(ToolError::MissingApiKey)));
        assert_eq!(ApiKey::new(" abc ").unwrap().expose(), "abc");
    }

    #[test]
    fn keys_are_redacted_in_debug_output() {
        let key = ApiKey::new("secret-value").unwrap();
        assert!(!format!("{key:?}").contains("secret"));
    }
}
