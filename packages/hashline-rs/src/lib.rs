//! Hash-anchored, conflict-aware text editing.
//!
//! Files are read as numbered lines tagged with a truncated content hash, and
//! edits are accepted only while the touched lines still carry the hashes the
//! caller observed. Each tool call re-derives identity from the file on disk.

pub mod config;
pub mod error;
pub mod logging;
pub mod ops;
pub mod text;
pub mod tools;
pub mod types;

mod edit;
mod file;
mod path_security;
mod plan;
mod read;
mod response;
mod search;

#[cfg(feature = "napi")]
mod binding;

pub use config::{parse_config, HashToolsConfig, ToolContext};
pub use edit::{edit_file, NEW_FILE_REV};
pub use error::{ConflictKind, ErrorCode, HashToolError};
pub use ops::{parse_ops, ApplyOp, BlockRef, BoundaryKind, LineTarget};
pub use read::read_file;
pub use response::REFRESH_HINT;
pub use search::{parse_regex, search_file};
pub use text::{file_revision, line_hash, split_lines_canonical, LineEnding, LineRecord};
pub use tools::{tool_list, HashTools};
pub use types::{EditArgs, ReadArgs, ReturnOptions, SearchArgs, SearchMode};
