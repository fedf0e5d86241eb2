use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::config::{HashToolsConfig, ToolContext};
use crate::error::HashToolError;
use crate::types::{EditArgs, ReadArgs, SearchArgs};
use crate::{edit, read, search};

const TOOL_NAMES: [&str; 3] = [read::TOOL_NAME, search::TOOL_NAME, edit::TOOL_NAME];

fn parse_args<T: DeserializeOwned>(args: Value, tool: &'static str) -> Result<T, HashToolError> {
    serde_json::from_value(args).map_err(|error| HashToolError::invalid_arguments(tool, error.to_string()))
}

/// The three hash-anchored tools bound to one worktree. Holds no state
/// between calls beyond the context itself.
#[derive(Clone, Debug)]
pub struct HashTools {
    context: ToolContext,
}

impl HashTools {
    pub fn new(context: ToolContext) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &ToolContext {
        &self.context
    }

    pub fn read(&self, args: &ReadArgs) -> Result<String, HashToolError> {
        read::read_file(&self.context, args)
    }

    pub fn search(&self, args: &SearchArgs) -> Result<String, HashToolError> {
        search::search_file(&self.context, args)
    }

    pub fn edit(&self, args: &EditArgs) -> Result<String, HashToolError> {
        edit::edit_file(&self.context, args)
    }

    /// Dispatches raw JSON arguments by tool name.
    pub fn invoke(&self, tool: &str, args: Value) -> Result<String, HashToolError> {
        match tool {
            read::TOOL_NAME => self.read(&parse_args(args, read::TOOL_NAME)?),
            search::TOOL_NAME => self.search(&parse_args(args, search::TOOL_NAME)?),
            edit::TOOL_NAME => self.edit(&parse_args(args, edit::TOOL_NAME)?),
            other => Err(HashToolError::invalid_arguments(
                "invoke",
                format!("unknown tool \"{other}\" (available: {})", TOOL_NAMES.join(", ")),
            )),
        }
    }
}

/// Tool definitions whose bounds follow the given limits.
pub fn tool_list(config: &HashToolsConfig) -> Vec<Value> {
    let max_context = config.max_context_lines;
    vec![
        tool_definition(
            read::TOOL_NAME,
            &format!(
                "Read a text file as numbered, hash-tagged lines with its revision (up to {} lines per call).",
                config.max_output_lines
            ),
            json!({
                "type": "object",
                "properties": {
                    "path": { "type": "string", "description": "Absolute or relative path to a file inside the worktree" },
                    "filePath": { "type": "string", "description": "Alias for path" },
                    "offset": { "type": "integer", "minimum": 0 },
                    "limit": { "type": "integer", "minimum": 1 },
                    "startLine": { "type": "integer", "minimum": 1 },
                    "endLine": { "type": "integer", "minimum": 1 },
                    "want": { "type": "object" }
                },
                "additionalProperties": false
            }),
            true,
        ),
        tool_definition(
            search::TOOL_NAME,
            "Search a text file and return matching lines with their tags and optional edit targets.",
            json!({
                "type": "object",
                "properties": {
                    "filePath": { "type": "string" },
                    "path": { "type": "string" },
                    "query": { "type": "string" },
                    "mode": { "type": "string", "enum": ["literal", "regex"] },
                    "contextLines": { "type": "integer", "minimum": 0, "maximum": max_context },
                    "startLine": { "type": "integer", "minimum": 1 },
                    "endLine": { "type": "integer", "minimum": 1 },
                    "maxMatches": { "type": "integer", "minimum": 1 },
                    "maxBytes": { "type": "integer", "minimum": 1 },
                    "maxResultBytes": { "type": "integer", "minimum": 1 },
                    "wantTargets": { "type": "boolean" }
                },
                "required": ["query"],
                "additionalProperties": false
            }),
            true,
        ),
        tool_definition(
            edit::TOOL_NAME,
            "Apply hash-anchored edits (replace_line | replace_block | append_to_file | set_file) checked against base_rev.",
            json!({
                "type": "object",
                "properties": {
                    "path": { "type": "string" },
                    "filePath": { "type": "string" },
                    "base_rev": { "type": "string" },
                    "auto_base_rev": { "type": "boolean" },
                    "use_current_rev": { "type": "boolean" },
                    "create_if_missing": { "type": "boolean" },
                    "safe_reapply": { "type": "boolean" },
                    "ops": {
                        "description": "Array of operations or a JSON-encoded array string",
                        "oneOf": [{ "type": "array", "minItems": 1 }, { "type": "string" }]
                    },
                    "maxBytes": { "type": "integer", "minimum": 1 },
                    "return": {
                        "type": "object",
                        "properties": {
                            "context_lines": { "type": "integer", "minimum": 0, "maximum": max_context },
                            "include_changed_block": { "type": "boolean" },
                            "include_file_after": { "type": "boolean" }
                        },
                        "additionalProperties": false
                    }
                },
                "required": ["ops"],
                "additionalProperties": false
            }),
            false,
        ),
    ]
}

fn tool_definition(name: &str, description: &str, input_schema: Value, read_only: bool) -> Value {
    json!({
        "name": name,
        "description": description,
        "inputSchema": input_schema,
        "annotations": {
            "readOnly": read_only,
            "requiresConfirmation": false,
        }
    })
}
