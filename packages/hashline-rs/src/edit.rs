use tracing::{debug, info, warn};

use crate::config::ToolContext;
use crate::error::{ConflictKind, ErrorCode, HashToolError};
use crate::file::{load_text_file, write_atomic, write_error, LoadOptions, LoadedFile};
use crate::ops::{parse_ops, ApplyOp};
use crate::plan::{apply_plans, order_plans, ApplyPlan, Resolver};
use crate::response::{Conflict, ErrorReport, Payload, Rejection};
use crate::text::{file_revision, join_with_line_ending, lines_to_records, LineRecord};
use crate::types::EditArgs;

pub const TOOL_NAME: &str = "hashedit";

/// Sentinel base revision for a file that does not exist yet.
pub const NEW_FILE_REV: &str = "NEW";

/// Response options after defaults are applied.
#[derive(Clone, Copy, Debug)]
struct ReturnSettings {
    context_lines: usize,
    include_changed_block: bool,
    include_file_after: bool,
}

impl ReturnSettings {
    fn from_args(ctx: &ToolContext, args: &EditArgs) -> Result<Self, HashToolError> {
        let options = args.return_options.clone().unwrap_or_default();
        let context_lines = options
            .context_lines
            .unwrap_or(ctx.config.default_edit_context_lines);
        if context_lines > ctx.config.max_context_lines {
            return Err(HashToolError::invalid_arguments(
                TOOL_NAME,
                format!(
                    "return.context_lines must be at most {}, got {context_lines}",
                    ctx.config.max_context_lines
                ),
            ));
        }

        Ok(Self {
            context_lines,
            include_changed_block: options.include_changed_block.unwrap_or(true),
            include_file_after: options.include_file_after.unwrap_or(false),
        })
    }
}

/// The base revision a batch is checked against, and where it came from.
#[derive(Clone, Debug, PartialEq, Eq)]
struct BaseRev {
    value: Option<String>,
    auto: bool,
}

pub fn edit_file(ctx: &ToolContext, args: &EditArgs) -> Result<String, HashToolError> {
    let requested = args.requested_path()?;
    let ops = parse_ops(&args.ops)?;
    if args.max_bytes == Some(0) {
        return Err(HashToolError::invalid_arguments(
            TOOL_NAME,
            "maxBytes must be a positive integer",
        ));
    }
    let settings = ReturnSettings::from_args(ctx, args)?;

    match run_batch(ctx, requested, args, &ops, settings) {
        Ok(output) => Ok(output),
        Err(rejection) => Ok(rejection.render()),
    }
}

fn run_batch(
    ctx: &ToolContext,
    requested: &str,
    args: &EditArgs,
    ops: &[ApplyOp],
    settings: ReturnSettings,
) -> Result<String, Rejection> {
    let file = load_text_file(
        ctx,
        requested,
        LoadOptions {
            max_bytes: args.max_bytes,
            create_if_missing: args.create_if_missing.unwrap_or(false),
        },
    )?;

    let base_rev = resolve_base_rev(args, &file);
    validate_base_rev(&file, &base_rev)?;

    if ops.len() > 1 && ops.iter().any(|op| matches!(op, ApplyOp::SetFile { .. })) {
        return Err(ErrorReport::new(
            ErrorCode::InvalidOpCombination,
            &file.display_path,
            "set_file cannot be combined with other operations",
        )
        .with_rev(&file.rev)
        .into());
    }

    let resolver = Resolver {
        lines: &file.lines,
        prefix_len: ctx.config.line_hash_prefix,
        context_lines: settings.context_lines,
        safe_reapply: args.safe_reapply.unwrap_or(false),
    };
    let mut plans = resolver
        .resolve_ops(ops)
        .map_err(|conflict| conflict_rejection(&file, conflict))?;

    order_plans(&mut plans).map_err(|overlap| {
        ErrorReport::new(
            ErrorCode::OverlappingOps,
            &file.display_path,
            format!(
                "Overlapping replace operations are not allowed (ops[{}] and ops[{}])",
                overlap.first, overlap.second
            ),
        )
        .with_rev(&file.rev)
    })?;
    let next_lines = apply_plans(&file.lines, &mut plans);
    let new_rev = file_revision(&next_lines);

    if file.created || next_lines != file.lines {
        let content = join_with_line_ending(&next_lines, file.line_ending);
        if let Err(error) = write_atomic(&file.absolute_path, content.as_bytes()) {
            warn!(path = %file.display_path, error = %error, "failed to write edit batch");
            return Err(write_error(&file.display_path, &error).with_rev(&file.rev).into());
        }
        info!(
            path = %file.display_path,
            rev_before = %file.rev,
            rev_after = %new_rev,
            ops = ops.len(),
            bytes_before = file.byte_len,
            bytes_after = content.len(),
            created = file.created,
            "applied edit batch"
        );
    } else {
        debug!(path = %file.display_path, rev = %file.rev, "edit batch changed nothing; skipping write");
    }

    plans.sort_by_key(|plan| plan.source_index);
    let report = EditReport {
        ctx,
        file: &file,
        base_rev: &base_rev,
        new_rev: &new_rev,
        next_lines: &next_lines,
        plans: &plans,
        settings,
    };
    Ok(report.render())
}

fn resolve_base_rev(args: &EditArgs, file: &LoadedFile) -> BaseRev {
    if let Some(explicit) = args.explicit_base_rev() {
        return BaseRev {
            value: Some(explicit.to_string()),
            auto: false,
        };
    }
    if !args.auto_base_rev() {
        return BaseRev {
            value: None,
            auto: false,
        };
    }

    let value = if file.created {
        NEW_FILE_REV.to_string()
    } else {
        file.rev.clone()
    };
    BaseRev {
        value: Some(value),
        auto: true,
    }
}

fn validate_base_rev(file: &LoadedFile, base_rev: &BaseRev) -> Result<(), Rejection> {
    match (&base_rev.value, file.created) {
        (None, true) => Ok(()),
        (None, false) => Err(ErrorReport::new(
            ErrorCode::BaseRevMissing,
            &file.display_path,
            "base_rev is required (or set auto_base_rev)",
        )
        .with_rev(&file.rev)
        .with_hint("Run hashread to get REV, then pass it as base_rev.")
        .into()),
        (Some(value), true) if value != NEW_FILE_REV => Err(conflict_rejection(
            file,
            Conflict::new(
                ConflictKind::CreateBaseRevMismatch,
                None,
                "base_rev mismatch for create_if_missing",
            )
            .expected(format!("base_rev {NEW_FILE_REV}"))
            .actual(format!("base_rev {value}")),
        )),
        (Some(value), false) if *value != file.rev => Err(conflict_rejection(
            file,
            Conflict::new(ConflictKind::BaseRevMismatch, None, "base_rev mismatch")
                .expected(format!("base_rev {value}"))
                .actual(format!("current_rev {}", file.rev)),
        )),
        _ => Ok(()),
    }
}

fn conflict_rejection(file: &LoadedFile, conflict: Conflict) -> Rejection {
    Rejection::Conflict {
        path: file.display_path.clone(),
        current_rev: file.rev.clone(),
        conflict,
    }
}

struct EditReport<'a> {
    ctx: &'a ToolContext,
    file: &'a LoadedFile,
    base_rev: &'a BaseRev,
    new_rev: &'a str,
    next_lines: &'a [String],
    /// In source order.
    plans: &'a [ApplyPlan],
    settings: ReturnSettings,
}

impl EditReport<'_> {
    fn render(&self) -> String {
        let mut payload = Payload::status("OK");
        payload
            .field("PATH", &self.file.display_path)
            .field("REV_BEFORE", &self.file.rev)
            .field("REV_AFTER", self.new_rev)
            .field(
                "BASE_REV",
                self.base_rev.value.as_deref().unwrap_or(NEW_FILE_REV),
            )
            .field("ENCODING", "utf-8")
            .field("LINE_ENDING", self.file.line_ending.as_str())
            .field("TOTAL_LINES", self.next_lines.len());
        if self.base_rev.auto {
            payload.field("AUTO_BASE_REV", true);
        }
        if self.file.created {
            payload.field("CREATED", true);
        }
        if self.file.rev == self.new_rev {
            payload.field("NO_OP", true);
        }

        payload.field("OPS", self.plans.len());
        for plan in self.plans {
            payload.line(format!(
                "OP {} {} OK line_delta={} no_op={} safe_reapplied={}",
                plan.source_index,
                plan.op_name,
                plan.line_delta,
                !plan.did_change,
                plan.safe_reapplied
            ));
        }

        if self.settings.include_changed_block {
            self.render_changed(&mut payload);
        }
        if self.settings.include_file_after {
            self.render_file_after(&mut payload);
        }

        payload.finish()
    }

    fn records(&self, start: usize, end: usize) -> Vec<LineRecord> {
        let end = end.min(self.next_lines.len());
        let start = start.min(end);
        lines_to_records(
            &self.next_lines[start..end],
            start + 1,
            self.ctx.config.line_hash_prefix,
        )
    }

    /// Per-op previews of the result around each replacement, bounded in
    /// total by the output line ceiling.
    fn render_changed(&self, payload: &mut Payload) {
        let context = self.settings.context_lines;
        let mut budget = self.ctx.config.max_output_lines;
        let mut truncated = false;

        payload.separator();
        for plan in self.plans {
            let block_start = plan.new_start;
            let block_end = block_start + plan.replacement.len().max(1);
            let block = self.records(block_start, block_end);
            let block_end = block_start + block.len();
            let before = self.records(block_start.saturating_sub(context), block_start);
            let after = self.records(block_end, block_end + context);

            let needed = before.len() + block.len() + after.len();
            if needed > budget {
                truncated = true;
                break;
            }
            budget -= needed;

            payload.line(format!(
                "CHANGED {} start={} end={}",
                plan.source_index,
                block_start + 1,
                block_end
            ));
            if !before.is_empty() {
                payload.line("CHANGED_BEFORE").records(&before);
            }
            payload.line("CHANGED_BLOCK").records(&block);
            if !after.is_empty() {
                payload.line("CHANGED_AFTER").records(&after);
            }
        }
        if truncated {
            payload.field("CHANGED_TRUNCATED", true);
        }
    }

    fn render_file_after(&self, payload: &mut Payload) {
        let total = self.next_lines.len();
        let shown = total.min(self.ctx.config.max_output_lines);
        payload
            .separator()
            .line(format!(
                "FILE_AFTER returned={shown} total={total} truncated={}",
                shown < total
            ))
            .records(&self.records(0, shown));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HashToolsConfig;
    use crate::text::{line_hash, DEFAULT_LINE_HASH_PREFIX};
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    fn args(value: serde_json::Value) -> EditArgs {
        serde_json::from_value(value).expect("edit args")
    }

    fn h(text: &str) -> String {
        line_hash(text, DEFAULT_LINE_HASH_PREFIX)
    }

    #[test]
    fn replace_line_writes_without_trailing_terminator() {
        let temp = TempDir::new().expect("tempdir");
        fs::write(temp.path().join("a.txt"), "one\ntwo\n").expect("write");
        let ctx = ToolContext::new(temp.path());
        let rev = file_revision(&["one", "two"]);

        let output = edit_file(
            &ctx,
            &args(json!({
                "path": "a.txt",
                "base_rev": rev,
                "ops": [{ "op": "replace_line", "target": { "n": 2, "h": h("two") }, "newText": "TWO" }]
            })),
        )
        .expect("edit");

        assert!(output.starts_with("OK\nPATH a.txt\n"));
        assert!(output.contains("OP 0 replace_line OK line_delta=0 no_op=false safe_reapplied=false"));
        assert!(output.contains(&format!("REV_AFTER {}", file_revision(&["one", "TWO"]))));
        assert_eq!(fs::read_to_string(temp.path().join("a.txt")).expect("read"), "one\nTWO");
    }

    #[test]
    fn missing_base_rev_and_combination_errors() {
        let temp = TempDir::new().expect("tempdir");
        fs::write(temp.path().join("a.txt"), "x\n").expect("write");
        let ctx = ToolContext::new(temp.path());

        let missing = edit_file(
            &ctx,
            &args(json!({ "path": "a.txt", "ops": [{ "op": "set_file", "lines": [] }] })),
        )
        .expect("payload");
        assert!(missing.starts_with("ERROR BASE_REV_MISSING"));

        let combined = edit_file(
            &ctx,
            &args(json!({
                "path": "a.txt",
                "auto_base_rev": true,
                "ops": [{ "op": "set_file", "lines": [] }, { "op": "append_to_file", "lines": ["y"] }]
            })),
        )
        .expect("payload");
        assert!(combined.starts_with("ERROR INVALID_OP_COMBINATION"));
        assert_eq!(fs::read_to_string(temp.path().join("a.txt")).expect("read"), "x\n");
    }

    #[test]
    fn create_requires_new_sentinel() {
        let temp = TempDir::new().expect("tempdir");
        let ctx = ToolContext::new(temp.path());

        let conflict = edit_file(
            &ctx,
            &args(json!({
                "path": "new.txt",
                "create_if_missing": true,
                "base_rev": "abc",
                "ops": [{ "op": "append_to_file", "lines": ["x"] }]
            })),
        )
        .expect("payload");
        assert!(conflict.starts_with("CONFLICT"));
        assert!(conflict.contains("CONFLICT_KIND CREATE_BASE_REV_MISMATCH"));
        assert!(conflict.contains("FAILED_OP_INDEX -"));
        assert!(!temp.path().join("new.txt").exists());

        let created = edit_file(
            &ctx,
            &args(json!({
                "path": "new.txt",
                "create_if_missing": true,
                "base_rev": "NEW",
                "ops": [{ "op": "append_to_file", "lines": ["x"] }]
            })),
        )
        .expect("payload");
        assert!(created.contains("CREATED true"));
        assert!(created.contains("BASE_REV NEW"));
    }

    #[test]
    fn overlapping_ops_do_not_touch_disk() {
        let temp = TempDir::new().expect("tempdir");
        fs::write(temp.path().join("a.txt"), "a\nb\n").expect("write");
        let ctx = ToolContext::new(temp.path());

        let output = edit_file(
            &ctx,
            &args(json!({
                "path": "a.txt",
                "auto_base_rev": true,
                "ops": [
                    { "op": "replace_line", "target": { "n": 1, "h": h("a") }, "text": "A" },
                    { "op": "replace_block", "start": { "kind": "SOF" }, "end": { "kind": "EOF" }, "lines": [] }
                ]
            })),
        )
        .expect("payload");
        assert!(output.starts_with("ERROR OVERLAPPING_OPS"));
        assert_eq!(fs::read_to_string(temp.path().join("a.txt")).expect("read"), "a\nb\n");
    }

    #[test]
    fn no_op_batch_leaves_file_untouched() {
        let temp = TempDir::new().expect("tempdir");
        fs::write(temp.path().join("a.txt"), "same\n").expect("write");
        let ctx = ToolContext::new(temp.path());

        let output = edit_file(
            &ctx,
            &args(json!({
                "path": "a.txt",
                "use_current_rev": true,
                "ops": [{ "op": "replace_line", "target": { "n": 1, "h": h("same") }, "content": "same" }]
            })),
        )
        .expect("edit");
        assert!(output.contains("AUTO_BASE_REV true"));
        assert!(output.contains("NO_OP true"));
        assert!(output.contains("line_delta=0 no_op=true"));
        assert_eq!(fs::read_to_string(temp.path().join("a.txt")).expect("read"), "same\n");
    }

    #[test]
    fn changed_preview_and_file_after() {
        let temp = TempDir::new().expect("tempdir");
        fs::write(temp.path().join("a.txt"), "a\nb\nc\n").expect("write");
        let ctx = ToolContext::new(temp.path());

        let output = edit_file(
            &ctx,
            &args(json!({
                "path": "a.txt",
                "auto_base_rev": true,
                "ops": [{ "op": "replace_line", "target": { "n": 2, "h": h("b") }, "text": "B" }],
                "return": { "context_lines": 1, "include_file_after": true }
            })),
        )
        .expect("edit");

        assert!(output.contains(&format!(
            "CHANGED 0 start=2 end=2\nCHANGED_BEFORE\n1L:{} a\nCHANGED_BLOCK\n2L:{} B\nCHANGED_AFTER\n3L:{} c",
            h("a"),
            h("B"),
            h("c")
        )));
        assert!(output.contains("FILE_AFTER returned=3 total=3 truncated=false"));
    }

    #[test]
    fn changed_previews_stop_at_the_output_ceiling() {
        let temp = TempDir::new().expect("tempdir");
        fs::write(temp.path().join("a.txt"), "a\nb\nc\nd\n").expect("write");
        let config = HashToolsConfig {
            max_output_lines: 2,
            ..HashToolsConfig::default()
        };
        let ctx = ToolContext::with_config(temp.path(), config);

        let output = edit_file(
            &ctx,
            &args(json!({
                "path": "a.txt",
                "auto_base_rev": true,
                "ops": [
                    { "op": "replace_line", "target": { "n": 1, "h": h("a") }, "text": "A" },
                    { "op": "replace_line", "target": { "n": 2, "h": h("b") }, "text": "B" },
                    { "op": "replace_line", "target": { "n": 3, "h": h("c") }, "text": "C" }
                ],
                "return": { "context_lines": 0 }
            })),
        )
        .expect("edit");

        assert!(output.contains("CHANGED 0 start=1 end=1"));
        assert!(output.contains("CHANGED 1 start=2 end=2"));
        assert!(!output.contains("CHANGED 2 "));
        assert!(output.ends_with("CHANGED_TRUNCATED true"));
        assert_eq!(fs::read_to_string(temp.path().join("a.txt")).expect("read"), "A\nB\nC\nd");
    }

    #[test]
    fn create_under_missing_directory_is_parent_not_found() {
        let temp = TempDir::new().expect("tempdir");
        let ctx = ToolContext::new(temp.path());

        let output = edit_file(
            &ctx,
            &args(json!({
                "path": "no/such/a.txt",
                "create_if_missing": true,
                "ops": [{ "op": "append_to_file", "lines": ["x"] }]
            })),
        )
        .expect("payload");

        assert!(output.starts_with("ERROR PARENT_NOT_FOUND\nPATH no/such/a.txt"));
        assert!(!temp.path().join("no").exists());
    }

    #[test]
    fn return_options_are_validated() {
        let temp = TempDir::new().expect("tempdir");
        let ctx = ToolContext::new(temp.path());
        let error = edit_file(
            &ctx,
            &args(json!({
                "path": "a.txt",
                "ops": [{ "op": "set_file", "lines": [] }],
                "return": { "context_lines": 99 }
            })),
        )
        .expect_err("too much context");
        assert_eq!(error.code(), "INVALID_ARGUMENTS");
    }
}
