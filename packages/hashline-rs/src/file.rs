use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::ToolContext;
use crate::error::ErrorCode;
use crate::path_security::{ensure_inside_worktree, to_workspace_path};
use crate::response::ErrorReport;
use crate::text::{
    decode_utf8, detect_line_ending, file_revision, split_lines_canonical, ByteLimitResolution, LineEnding,
};

const FILE_TOO_LARGE_ACTION: &str = "Split the file or narrow the requested range, then retry";

/// A text file decoded into canonical lines, plus the identity derived from it.
#[derive(Clone, Debug)]
pub(crate) struct LoadedFile {
    pub absolute_path: PathBuf,
    pub display_path: String,
    pub line_ending: LineEnding,
    pub lines: Vec<String>,
    pub rev: String,
    pub byte_len: u64,
    pub created: bool,
}

#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct LoadOptions {
    /// Caller-supplied read guard, checked in addition to the admission policy.
    pub max_bytes: Option<u64>,
    pub create_if_missing: bool,
}

pub(crate) fn load_text_file(
    ctx: &ToolContext,
    requested: &str,
    options: LoadOptions,
) -> Result<LoadedFile, ErrorReport> {
    let absolute_path = ensure_inside_worktree(requested, &ctx.worktree).map_err(|error| {
        let code = if error.is_escape() {
            ErrorCode::PathOutsideWorktree
        } else {
            ErrorCode::ReadFailed
        };
        ErrorReport::new(code, requested, error.to_string())
    })?;
    let display_path = to_workspace_path(&absolute_path, &ctx.worktree);

    let metadata = match fs::metadata(&absolute_path) {
        Ok(metadata) => metadata,
        Err(error) if error.kind() == ErrorKind::NotFound && options.create_if_missing => {
            let lines: Vec<String> = Vec::new();
            let rev = file_revision(&lines);
            return Ok(LoadedFile {
                absolute_path,
                display_path,
                line_ending: LineEnding::Lf,
                lines,
                rev,
                byte_len: 0,
                created: true,
            });
        }
        Err(error) => return Err(read_error(&display_path, &error)),
    };

    if metadata.is_dir() {
        return Err(directory_error(&display_path));
    }

    let byte_len = metadata.len();
    let limit = ctx.config.byte_limit_policy().resolve(byte_len);
    if !limit.admits(byte_len) {
        return Err(
            ErrorReport::new(ErrorCode::FileTooLarge, &display_path, "File is larger than the hard cap")
                .detail("ACTUAL_BYTES", byte_len)
                .detail("HARD_CAP_BYTES", limit.hard_cap_bytes)
                .detail("RECOMMENDED_ACTION", FILE_TOO_LARGE_ACTION),
        );
    }
    if limit.auto_boosted {
        debug!(
            path = %display_path,
            bytes = byte_len,
            limit = limit.effective_limit_bytes,
            "auto-boosted byte limit"
        );
    }
    if let Some(max_bytes) = options.max_bytes.filter(|max_bytes| byte_len > *max_bytes) {
        return Err(ErrorReport::new(
            ErrorCode::FileTooLarge,
            &display_path,
            format!("File is larger than maxBytes ({max_bytes})"),
        )
        .detail("ACTUAL_BYTES", byte_len));
    }

    let raw = fs::read(&absolute_path).map_err(|error| read_error(&display_path, &error))?;
    let read_len = raw.len() as u64;
    recheck_read_size(&display_path, &limit, options.max_bytes, read_len)?;
    let line_ending = detect_line_ending(&raw);
    let text = decode_utf8(&raw).map_err(|error| {
        ErrorReport::new(ErrorCode::BinaryFileUnsupported, &display_path, error.to_string())
            .with_line_ending(line_ending)
    })?;

    let lines = split_lines_canonical(text);
    let rev = file_revision(&lines);

    Ok(LoadedFile {
        absolute_path,
        display_path,
        line_ending,
        lines,
        rev,
        byte_len: read_len,
        created: false,
    })
}

/// The file may have grown between the metadata check and the read.
fn recheck_read_size(
    display_path: &str,
    limit: &ByteLimitResolution,
    max_bytes: Option<u64>,
    read_len: u64,
) -> Result<(), ErrorReport> {
    if limit.admits(read_len) && max_bytes.is_none_or(|max_bytes| read_len <= max_bytes) {
        return Ok(());
    }
    Err(
        ErrorReport::new(ErrorCode::FileTooLarge, display_path, "File grew past its byte limit while reading")
            .detail("ACTUAL_BYTES", read_len)
            .detail("HARD_CAP_BYTES", limit.hard_cap_bytes)
            .detail("RECOMMENDED_ACTION", FILE_TOO_LARGE_ACTION),
    )
}

fn read_error(display_path: &str, error: &std::io::Error) -> ErrorReport {
    match error.kind() {
        ErrorKind::NotFound => ErrorReport::new(
            ErrorCode::NotFound,
            display_path,
            format!("File not found: {display_path}"),
        ),
        ErrorKind::IsADirectory => directory_error(display_path),
        _ => ErrorReport::new(ErrorCode::ReadFailed, display_path, error.to_string()),
    }
}

fn directory_error(display_path: &str) -> ErrorReport {
    ErrorReport::new(
        ErrorCode::FilepathIsDirectory,
        display_path,
        format!("Path points to a directory, expected file: {display_path}"),
    )
}

/// Maps a failed write onto the result vocabulary.
pub(crate) fn write_error(display_path: &str, error: &std::io::Error) -> ErrorReport {
    match error.kind() {
        ErrorKind::NotFound | ErrorKind::NotADirectory => ErrorReport::new(
            ErrorCode::ParentNotFound,
            display_path,
            format!("Parent directory does not exist for: {display_path}"),
        ),
        ErrorKind::IsADirectory => directory_error(display_path),
        _ => ErrorReport::new(
            ErrorCode::WriteFailed,
            display_path,
            format!("Failed to write file: {display_path} ({error})"),
        ),
    }
}

/// Writes through a sibling temp file and renames it over `path`. The parent
/// directory must already exist; an existing file keeps its permissions.
pub(crate) fn write_atomic(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let parent = path.parent().ok_or_else(|| std::io::Error::from(ErrorKind::NotFound))?;
    if path.is_dir() {
        return Err(std::io::Error::from(ErrorKind::IsADirectory));
    }
    let permissions = fs::metadata(path).ok().map(|metadata| metadata.permissions());

    let (temp_path, mut file) = create_temp_file(parent, path)?;
    let written = file
        .write_all(data)
        .and_then(|()| file.sync_all())
        .and_then(|()| match &permissions {
            Some(permissions) => fs::set_permissions(&temp_path, permissions.clone()),
            None => Ok(()),
        });
    drop(file);

    if let Err(error) = written.and_then(|()| fs::rename(&temp_path, path)) {
        let _ = fs::remove_file(&temp_path);
        return Err(error);
    }
    Ok(())
}

fn create_temp_file(parent: &Path, path: &Path) -> std::io::Result<(PathBuf, fs::File)> {
    let stem = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_string());

    let mut counter = 0u32;
    loop {
        let candidate = parent.join(format!(".{stem}.{}.{counter}.tmp", std::process::id()));
        match OpenOptions::new().write(true).create_new(true).open(&candidate) {
            Ok(file) => return Ok((candidate, file)),
            Err(error) if error.kind() == ErrorKind::AlreadyExists => counter += 1,
            Err(error) => return Err(error),
        }
    }
}
