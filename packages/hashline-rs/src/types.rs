use serde::Deserialize;
use serde_json::Value;

use crate::error::HashToolError;

/// `path` wins over the legacy `filePath`; a blank result is a structural error.
fn requested_path<'a>(path: &'a Option<String>, file_path: &'a Option<String>) -> Result<&'a str, HashToolError> {
    match path.as_deref().or(file_path.as_deref()) {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(HashToolError::InvalidFilePath(
            "path/filePath must be a non-empty file path".to_string(),
        )),
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadArgs {
    pub path: Option<String>,
    pub file_path: Option<String>,
    pub offset: Option<usize>,
    pub limit: Option<usize>,
    pub start_line: Option<usize>,
    pub end_line: Option<usize>,
    /// Accepted for older callers; responses are always fully populated.
    pub want: Option<Value>,
}

impl ReadArgs {
    pub fn requested_path(&self) -> Result<&str, HashToolError> {
        requested_path(&self.path, &self.file_path)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    #[default]
    Literal,
    Regex,
}

impl SearchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchMode::Literal => "literal",
            SearchMode::Regex => "regex",
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchArgs {
    pub file_path: Option<String>,
    pub path: Option<String>,
    pub query: String,
    pub mode: Option<SearchMode>,
    pub context_lines: Option<usize>,
    pub start_line: Option<usize>,
    pub end_line: Option<usize>,
    pub max_matches: Option<usize>,
    pub max_bytes: Option<u64>,
    pub max_result_bytes: Option<usize>,
    pub want_targets: Option<bool>,
}

impl SearchArgs {
    pub fn requested_path(&self) -> Result<&str, HashToolError> {
        requested_path(&self.path, &self.file_path)
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ReturnOptions {
    pub context_lines: Option<usize>,
    pub include_changed_block: Option<bool>,
    pub include_file_after: Option<bool>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct EditArgs {
    pub path: Option<String>,
    #[serde(rename = "filePath")]
    pub file_path: Option<String>,
    pub base_rev: Option<String>,
    pub auto_base_rev: Option<bool>,
    /// Legacy alias for `auto_base_rev`.
    pub use_current_rev: Option<bool>,
    pub create_if_missing: Option<bool>,
    pub safe_reapply: Option<bool>,
    /// Array of operations or a JSON-encoded array string; validated by `ops::parse_ops`.
    #[serde(default)]
    pub ops: Value,
    #[serde(rename = "maxBytes")]
    pub max_bytes: Option<u64>,
    #[serde(rename = "return")]
    pub return_options: Option<ReturnOptions>,
}

impl EditArgs {
    pub fn requested_path(&self) -> Result<&str, HashToolError> {
        requested_path(&self.path, &self.file_path)
    }

    pub fn auto_base_rev(&self) -> bool {
        self.auto_base_rev.or(self.use_current_rev).unwrap_or(false)
    }

    /// An empty `base_rev` counts as absent.
    pub fn explicit_base_rev(&self) -> Option<&str> {
        self.base_rev.as_deref().filter(|value| !value.is_empty())
    }
}
