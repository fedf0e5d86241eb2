use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::HashToolError;
use crate::text::{
    ByteLimitPolicy, AUTO_BOOST_MAX_BYTES, DEFAULT_LINE_HASH_PREFIX, DEFAULT_MAX_BYTES,
    HARD_CAP_BYTES, MAX_LINE_HASH_PREFIX, MIN_LINE_HASH_PREFIX,
};

pub const MAX_OUTPUT_LINES: usize = 200;
pub const DEFAULT_MAX_MATCHES: usize = 10;
pub const MAX_CONTEXT_LINES: usize = 20;
pub const DEFAULT_EDIT_CONTEXT_LINES: usize = 1;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct HashToolsConfig {
    pub default_max_bytes: u64,
    pub auto_boost_max_bytes: u64,
    pub hard_cap_bytes: u64,
    pub line_hash_prefix: usize,
    /// Ceiling on line records in any single response.
    pub max_output_lines: usize,
    pub default_read_limit: usize,
    pub default_max_matches: usize,
    pub max_context_lines: usize,
    pub default_edit_context_lines: usize,
}

impl Default for HashToolsConfig {
    fn default() -> Self {
        Self {
            default_max_bytes: DEFAULT_MAX_BYTES,
            auto_boost_max_bytes: AUTO_BOOST_MAX_BYTES,
            hard_cap_bytes: HARD_CAP_BYTES,
            line_hash_prefix: DEFAULT_LINE_HASH_PREFIX,
            max_output_lines: MAX_OUTPUT_LINES,
            default_read_limit: MAX_OUTPUT_LINES,
            default_max_matches: DEFAULT_MAX_MATCHES,
            max_context_lines: MAX_CONTEXT_LINES,
            default_edit_context_lines: DEFAULT_EDIT_CONTEXT_LINES,
        }
    }
}

impl HashToolsConfig {
    pub fn validate(&self) -> Result<(), HashToolError> {
        if !(MIN_LINE_HASH_PREFIX..=MAX_LINE_HASH_PREFIX).contains(&self.line_hash_prefix) {
            return Err(HashToolError::InvalidConfig(format!(
                "lineHashPrefix must be between {MIN_LINE_HASH_PREFIX} and {MAX_LINE_HASH_PREFIX}, got {}",
                self.line_hash_prefix
            )));
        }

        let positive = [
            ("defaultMaxBytes", self.default_max_bytes),
            ("autoBoostMaxBytes", self.auto_boost_max_bytes),
            ("hardCapBytes", self.hard_cap_bytes),
            ("maxOutputLines", self.max_output_lines as u64),
            ("defaultReadLimit", self.default_read_limit as u64),
            ("defaultMaxMatches", self.default_max_matches as u64),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(HashToolError::InvalidConfig(format!("{name} must be positive")));
            }
        }

        if self.default_edit_context_lines > self.max_context_lines {
            return Err(HashToolError::InvalidConfig(format!(
                "defaultEditContextLines ({}) exceeds maxContextLines ({})",
                self.default_edit_context_lines, self.max_context_lines
            )));
        }

        Ok(())
    }

    pub fn byte_limit_policy(&self) -> ByteLimitPolicy {
        ByteLimitPolicy {
            default_bytes: self.default_max_bytes,
            auto_boost_bytes: self.auto_boost_max_bytes,
            hard_cap_bytes: self.hard_cap_bytes,
        }
    }
}

pub fn parse_config(value: &Value) -> Result<HashToolsConfig, HashToolError> {
    let config: HashToolsConfig = serde_json::from_value(value.clone())
        .map_err(|error| HashToolError::InvalidConfig(error.to_string()))?;
    config.validate()?;
    Ok(config)
}

/// Everything a single tool call needs from its host: the worktree root the
/// path is resolved against and the limits in force.
#[derive(Clone, Debug)]
pub struct ToolContext {
    pub worktree: PathBuf,
    pub config: HashToolsConfig,
}

impl ToolContext {
    pub fn new(worktree: impl Into<PathBuf>) -> Self {
        Self::with_config(worktree, HashToolsConfig::default())
    }

    pub fn with_config(worktree: impl Into<PathBuf>, config: HashToolsConfig) -> Self {
        Self {
            worktree: worktree.into(),
            config,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_object_yields_defaults() {
        let config = parse_config(&json!({})).expect("defaults");
        assert_eq!(config, HashToolsConfig::default());
        assert_eq!(config.max_output_lines, 200);
        assert_eq!(config.byte_limit_policy().hard_cap_bytes, 16 * 1024 * 1024);
    }

    #[test]
    fn overrides_are_camel_case() {
        let config = parse_config(&json!({ "maxOutputLines": 50, "lineHashPrefix": 16 }))
            .expect("overrides");
        assert_eq!(config.max_output_lines, 50);
        assert_eq!(config.line_hash_prefix, 16);
        assert_eq!(config.default_max_matches, DEFAULT_MAX_MATCHES);
    }

    #[test]
    fn rejects_unknown_fields_and_bad_values() {
        let unknown = parse_config(&json!({ "maxLines": 5 })).expect_err("unknown field");
        assert_eq!(unknown.code(), "INVALID_CONFIG");

        let prefix = parse_config(&json!({ "lineHashPrefix": 8 })).expect_err("prefix");
        assert!(prefix.to_string().contains("lineHashPrefix"));

        let zero = parse_config(&json!({ "maxOutputLines": 0 })).expect_err("zero");
        assert!(zero.to_string().contains("maxOutputLines"));

        let context = parse_config(&json!({ "maxContextLines": 0, "defaultEditContextLines": 1 }))
            .expect_err("context");
        assert!(context.to_string().contains("defaultEditContextLines"));
    }
}
