use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Structural request defects. These are surfaced to the host as thrown
/// errors, never as `ERROR`/`CONFLICT` payloads.
#[derive(Debug, Error)]
pub enum HashToolError {
    #[error("{message}")]
    InvalidOpSchema { message: String },
    #[error("{0}")]
    InvalidFilePath(String),
    #[error("invalid {tool} arguments: {message}")]
    InvalidArguments { tool: &'static str, message: String },
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

impl HashToolError {
    pub fn code(&self) -> &'static str {
        match self {
            HashToolError::InvalidOpSchema { .. } => "INVALID_OP_SCHEMA",
            HashToolError::InvalidFilePath(_) => "INVALID_FILE_PATH",
            HashToolError::InvalidArguments { .. } => "INVALID_ARGUMENTS",
            HashToolError::InvalidConfig(_) => "INVALID_CONFIG",
        }
    }

    pub(crate) fn invalid_op(op_index: Option<usize>, message: impl fmt::Display) -> Self {
        let label = match op_index {
            Some(index) => format!("ops[{index}]"),
            None => "ops".to_string(),
        };
        HashToolError::InvalidOpSchema {
            message: format!("{label}: {message}"),
        }
    }

    pub(crate) fn invalid_arguments(tool: &'static str, message: impl Into<String>) -> Self {
        HashToolError::InvalidArguments {
            tool,
            message: message.into(),
        }
    }
}

/// Codes carried by `ERROR <CODE>` payloads.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    NotFound,
    FileTooLarge,
    BinaryFileUnsupported,
    PathOutsideWorktree,
    ReadFailed,
    WriteFailed,
    ParentNotFound,
    FilepathIsDirectory,
    InvalidRegex,
    InvalidLineRange,
    InvalidRange,
    OverlappingOps,
    InvalidOpCombination,
    BaseRevMissing,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::FileTooLarge => "FILE_TOO_LARGE",
            ErrorCode::BinaryFileUnsupported => "BINARY_FILE_UNSUPPORTED",
            ErrorCode::PathOutsideWorktree => "PATH_OUTSIDE_WORKTREE",
            ErrorCode::ReadFailed => "READ_FAILED",
            ErrorCode::WriteFailed => "WRITE_FAILED",
            ErrorCode::ParentNotFound => "PARENT_NOT_FOUND",
            ErrorCode::FilepathIsDirectory => "FILEPATH_IS_DIRECTORY",
            ErrorCode::InvalidRegex => "INVALID_REGEX",
            ErrorCode::InvalidLineRange => "INVALID_LINE_RANGE",
            ErrorCode::InvalidRange => "INVALID_RANGE",
            ErrorCode::OverlappingOps => "OVERLAPPING_OPS",
            ErrorCode::InvalidOpCombination => "INVALID_OP_COMBINATION",
            ErrorCode::BaseRevMissing => "BASE_REV_MISSING",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Taxonomy reported as `CONFLICT_KIND`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConflictKind {
    BaseRevMismatch,
    CreateBaseRevMismatch,
    HashMismatch,
    TargetOutOfRange,
    AmbiguousReapply,
    InvalidBlockRange,
}

impl ConflictKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictKind::BaseRevMismatch => "BASE_REV_MISMATCH",
            ConflictKind::CreateBaseRevMismatch => "CREATE_BASE_REV_MISMATCH",
            ConflictKind::HashMismatch => "HASH_MISMATCH",
            ConflictKind::TargetOutOfRange => "TARGET_OUT_OF_RANGE",
            ConflictKind::AmbiguousReapply => "AMBIGUOUS_REAPPLY",
            ConflictKind::InvalidBlockRange => "INVALID_BLOCK_RANGE",
        }
    }
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_op_labels_index() {
        let error = HashToolError::invalid_op(Some(2), "field \"lines\" must be string[]");
        assert_eq!(error.code(), "INVALID_OP_SCHEMA");
        assert_eq!(error.to_string(), "ops[2]: field \"lines\" must be string[]");

        let error = HashToolError::invalid_op(None, "ops must not be empty");
        assert_eq!(error.to_string(), "ops: ops must not be empty");
    }

    #[test]
    fn codes_render_screaming_snake_case() {
        assert_eq!(ErrorCode::FilepathIsDirectory.to_string(), "FILEPATH_IS_DIRECTORY");
        assert_eq!(ConflictKind::AmbiguousReapply.to_string(), "AMBIGUOUS_REAPPLY");
        assert_eq!(
            serde_json::to_value(ErrorCode::FilepathIsDirectory).expect("serialize"),
            serde_json::json!(ErrorCode::FilepathIsDirectory.as_str())
        );
    }
}
