use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::HashToolError;
use crate::text::{MAX_LINE_HASH_PREFIX, MIN_LINE_HASH_PREFIX};

pub const SUPPORTED_OPS: [&str; 4] = ["replace_line", "replace_block", "append_to_file", "set_file"];

const OPS_EXAMPLE: &str =
    r#"[{"op":"replace_line","target":{"n":1,"h":"aaaaaaaaaa"},"newText":"..."}]"#;

/// A line anchored by number and by the hash its text had when observed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LineTarget {
    pub n: usize,
    /// Lowercase hex, 10 to 16 characters.
    pub h: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BoundaryKind {
    Sof,
    Eof,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BlockRef {
    Line(LineTarget),
    Boundary(BoundaryKind),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ApplyOp {
    ReplaceLine { target: LineTarget, text: String },
    ReplaceBlock { start: BlockRef, end: BlockRef, lines: Vec<String> },
    AppendToFile { lines: Vec<String> },
    SetFile { lines: Vec<String> },
}

impl ApplyOp {
    pub fn name(&self) -> &'static str {
        match self {
            ApplyOp::ReplaceLine { .. } => "replace_line",
            ApplyOp::ReplaceBlock { .. } => "replace_block",
            ApplyOp::AppendToFile { .. } => "append_to_file",
            ApplyOp::SetFile { .. } => "set_file",
        }
    }
}

/// Wire shape of one operation. Targets and line arrays stay untyped here so
/// their errors can name the offending field.
#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case", deny_unknown_fields)]
enum RawOp {
    ReplaceLine {
        target: Value,
        #[serde(rename = "newText")]
        new_text: Option<String>,
        text: Option<String>,
        content: Option<String>,
        line: Option<String>,
    },
    ReplaceBlock {
        start: Value,
        end: Value,
        lines: Option<Value>,
    },
    AppendToFile {
        lines: Option<Value>,
    },
    SetFile {
        lines: Option<Value>,
    },
}

/// Accepts an array of operations or a JSON-encoded array string.
pub fn parse_ops(value: &Value) -> Result<Vec<ApplyOp>, HashToolError> {
    let decoded;
    let value = match value {
        Value::String(encoded) => {
            decoded = serde_json::from_str::<Value>(encoded).map_err(|_| {
                HashToolError::invalid_op(
                    None,
                    format!("ops must be array or JSON-encoded array string (example: {OPS_EXAMPLE})"),
                )
            })?;
            &decoded
        }
        other => other,
    };

    let Value::Array(items) = value else {
        return Err(HashToolError::invalid_op(
            None,
            format!(
                "ops must be an array of operations (supported ops: {})",
                SUPPORTED_OPS.join(" | ")
            ),
        ));
    };
    if items.is_empty() {
        return Err(HashToolError::invalid_op(None, "ops must contain at least one operation"));
    }

    items
        .iter()
        .enumerate()
        .map(|(index, item)| parse_op(index, item))
        .collect()
}

fn parse_op(index: usize, item: &Value) -> Result<ApplyOp, HashToolError> {
    let Value::Object(fields) = item else {
        return Err(HashToolError::invalid_op(Some(index), "operation must be an object"));
    };

    let op_name = fields.get("op").and_then(Value::as_str);
    if !op_name.is_some_and(|name| SUPPORTED_OPS.contains(&name)) {
        let shown = fields.get("op").map(Value::to_string).unwrap_or_else(|| "undefined".to_string());
        return Err(HashToolError::invalid_op(
            Some(index),
            format!(
                "Unsupported operation: {} (supported: {})",
                shown.trim_matches('"'),
                SUPPORTED_OPS.join(" | ")
            ),
        ));
    }
    if fields.contains_key("return") {
        return Err(HashToolError::invalid_op(
            Some(index),
            "\"return\" is a top-level argument and must not be inside an operation",
        ));
    }

    let raw: RawOp = serde_json::from_value(item.clone())
        .map_err(|error| HashToolError::invalid_op(Some(index), error))?;

    match raw {
        RawOp::ReplaceLine {
            target,
            new_text,
            text,
            content,
            line,
        } => {
            let target = parse_line_target(&target, index, "target")?;
            let Some(text) = new_text.or(text).or(content).or(line) else {
                return Err(HashToolError::invalid_op(
                    Some(index),
                    "replace_line requires string field \"newText\" (aliases: text|content|line)",
                ));
            };
            Ok(ApplyOp::ReplaceLine { target, text })
        }
        RawOp::ReplaceBlock { start, end, lines } => Ok(ApplyOp::ReplaceBlock {
            start: parse_block_ref(&start, index, "start")?,
            end: parse_block_ref(&end, index, "end")?,
            lines: parse_lines(lines.as_ref(), index)?,
        }),
        RawOp::AppendToFile { lines } => Ok(ApplyOp::AppendToFile {
            lines: parse_lines(lines.as_ref(), index)?,
        }),
        RawOp::SetFile { lines } => Ok(ApplyOp::SetFile {
            lines: parse_lines(lines.as_ref(), index)?,
        }),
    }
}

fn as_object<'a>(value: &'a Value, index: usize, field: &str) -> Result<&'a Map<String, Value>, HashToolError> {
    value
        .as_object()
        .ok_or_else(|| HashToolError::invalid_op(Some(index), format!("field \"{field}\" must be object")))
}

fn parse_line_target(value: &Value, index: usize, field: &str) -> Result<LineTarget, HashToolError> {
    let object = as_object(value, index, field)?;
    if let Some(unknown) = object.keys().find(|key| !matches!(key.as_str(), "n" | "h")) {
        return Err(HashToolError::invalid_op(
            Some(index),
            format!("field \"{field}\" has unknown key \"{unknown}\""),
        ));
    }

    let n = object
        .get("n")
        .and_then(Value::as_u64)
        .filter(|n| *n > 0)
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| {
            HashToolError::invalid_op(Some(index), format!("field \"{field}.n\" must be positive integer"))
        })?;

    let h = object
        .get("h")
        .and_then(Value::as_str)
        .filter(|h| is_line_hash(h))
        .ok_or_else(|| {
            HashToolError::invalid_op(
                Some(index),
                format!(
                    "field \"{field}.h\" must be {MIN_LINE_HASH_PREFIX}-{MAX_LINE_HASH_PREFIX} hex chars"
                ),
            )
        })?;

    Ok(LineTarget {
        n,
        h: h.to_ascii_lowercase(),
    })
}

fn is_line_hash(value: &str) -> bool {
    (MIN_LINE_HASH_PREFIX..=MAX_LINE_HASH_PREFIX).contains(&value.len())
        && value.chars().all(|c| c.is_ascii_hexdigit())
}

fn parse_block_ref(value: &Value, index: usize, field: &str) -> Result<BlockRef, HashToolError> {
    let object = as_object(value, index, field)?;
    let Some(kind) = object.get("kind") else {
        return parse_line_target(value, index, field).map(BlockRef::Line);
    };

    if object.len() > 1 {
        return Err(HashToolError::invalid_op(
            Some(index),
            format!("field \"{field}\" boundary must only contain \"kind\""),
        ));
    }
    match kind.as_str() {
        Some("SOF" | "start") => Ok(BlockRef::Boundary(BoundaryKind::Sof)),
        Some("EOF" | "end") => Ok(BlockRef::Boundary(BoundaryKind::Eof)),
        _ => Err(HashToolError::invalid_op(
            Some(index),
            format!("field \"{field}.kind\" must be one of SOF | EOF | start | end"),
        )),
    }
}

fn parse_lines(value: Option<&Value>, index: usize) -> Result<Vec<String>, HashToolError> {
    let Some(value) = value else {
        return Ok(Vec::new());
    };
    let Value::Array(items) = value else {
        return Err(HashToolError::invalid_op(Some(index), "field \"lines\" must be string[]"));
    };

    items
        .iter()
        .map(|item| {
            item.as_str().map(str::to_string).ok_or_else(|| {
                HashToolError::invalid_op(Some(index), "field \"lines\" must contain only strings")
            })
        })
        .collect()
}
