use crate::config::ToolContext;
use crate::error::{ErrorCode, HashToolError};
use crate::file::{load_text_file, LoadOptions};
use crate::response::{ErrorReport, Payload};
use crate::text::lines_to_records;
use crate::types::ReadArgs;

pub const TOOL_NAME: &str = "hashread";

/// Resolved pagination window, before it is clipped to the file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Window {
    offset: usize,
    limit: usize,
}

/// Returns a window of hash-tagged lines. Windows past the end of the file are
/// `OK` with no records; only an explicit `startLine > endLine` is `INVALID_RANGE`.
pub fn read_file(ctx: &ToolContext, args: &ReadArgs) -> Result<String, HashToolError> {
    let requested = args.requested_path()?;
    validate(args)?;

    let file = match load_text_file(ctx, requested, LoadOptions::default()) {
        Ok(file) => file,
        Err(report) => return Ok(report.with_encoding().render()),
    };
    let total_lines = file.lines.len();

    let window = match resolve_window(ctx, args, total_lines) {
        Ok(window) => window,
        Err(message) => {
            return Ok(ErrorReport::new(ErrorCode::InvalidRange, &file.display_path, message)
                .with_rev(&file.rev)
                .with_encoding()
                .with_line_ending(file.line_ending)
                .with_total_lines(total_lines)
                .render());
        }
    };

    let start = window.offset.min(total_lines);
    let end = window.offset.saturating_add(window.limit).min(total_lines);
    let selected = &file.lines[start..end];
    let returned = selected.len();
    let consumed = window.offset.saturating_add(returned);
    let has_more = consumed < total_lines;
    let next_offset = if has_more {
        consumed.to_string()
    } else {
        "-".to_string()
    };

    let mut payload = Payload::status("OK");
    payload
        .field("PATH", &file.display_path)
        .field("REV", &file.rev)
        .field("ENCODING", "utf-8")
        .field("LINE_ENDING", file.line_ending.as_str())
        .field("TOTAL_LINES", total_lines)
        .field(
            "RANGE",
            format!(
                "offset={} limit={} returned={returned} has_more={has_more} next_offset={next_offset}",
                window.offset, window.limit
            ),
        )
        .separator()
        .records(&lines_to_records(
            selected,
            window.offset.saturating_add(1),
            ctx.config.line_hash_prefix,
        ));

    Ok(payload.finish())
}

fn validate(args: &ReadArgs) -> Result<(), HashToolError> {
    let positive = [
        ("limit", args.limit),
        ("startLine", args.start_line),
        ("endLine", args.end_line),
    ];
    for (name, value) in positive {
        if value == Some(0) {
            return Err(HashToolError::invalid_arguments(
                TOOL_NAME,
                format!("{name} must be a positive integer"),
            ));
        }
    }
    Ok(())
}

/// The legacy 1-based `startLine`/`endLine` pair takes precedence over
/// `offset`/`limit`. Either way the window never exceeds the output ceiling.
fn resolve_window(ctx: &ToolContext, args: &ReadArgs, total_lines: usize) -> Result<Window, String> {
    let max_lines = ctx.config.max_output_lines;

    if args.start_line.is_none() && args.end_line.is_none() {
        return Ok(Window {
            offset: args.offset.unwrap_or(0),
            limit: args.limit.unwrap_or(ctx.config.default_read_limit).min(max_lines),
        });
    }

    let start_line = args.start_line.unwrap_or(1);
    let end_line = args.end_line.unwrap_or_else(|| total_lines.max(start_line));
    if start_line > end_line {
        return Err(format!(
            "Invalid line range: startLine={start_line}, endLine={end_line}"
        ));
    }

    Ok(Window {
        offset: start_line - 1,
        limit: (end_line - start_line + 1).min(max_lines),
    })
}
