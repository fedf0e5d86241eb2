use regex::{Regex, RegexBuilder};

use crate::config::ToolContext;
use crate::error::{ErrorCode, HashToolError};
use crate::file::{load_text_file, LoadOptions};
use crate::response::{ErrorReport, Payload};
use crate::text::{make_line_record, LineRecord};
use crate::types::{SearchArgs, SearchMode};

pub const TOOL_NAME: &str = "hashgrep";

const REGEX_HINT: &str = "Use raw pattern (\"foo.*bar\") or delimited form (\"/foo.*bar/i\").";

/// Splits `/pattern/flags` on the last unescaped `/`. Anything else is a raw
/// pattern with default flags.
fn split_delimited(query: &str) -> Option<(String, &str)> {
    let body = query.strip_prefix('/')?;
    let bytes = body.as_bytes();

    let mut index = bytes.len();
    while index > 0 {
        index -= 1;
        if bytes[index] != b'/' {
            continue;
        }
        let backslashes = bytes[..index].iter().rev().take_while(|byte| **byte == b'\\').count();
        if backslashes % 2 == 0 {
            let pattern = body[..index].replace("\\/", "/");
            return Some((pattern, &body[index + 1..]));
        }
    }
    None
}

/// Compiles a search query. Flags: `i` case-insensitive, `m` multi-line,
/// `s` dot matches newline, `x` verbose; `u` is always on and `g`/`y` have no
/// meaning for per-line matching.
pub fn parse_regex(query: &str) -> Result<Regex, String> {
    let (pattern, flags) = match split_delimited(query) {
        Some((pattern, flags)) => (pattern, flags),
        None => (query.to_string(), "u"),
    };

    let mut builder = RegexBuilder::new(&pattern);
    builder.unicode(true);

    let mut seen = String::new();
    for flag in flags.chars() {
        if seen.contains(flag) {
            return Err(format!("duplicate flag '{flag}'"));
        }
        seen.push(flag);
        match flag {
            'i' => {
                builder.case_insensitive(true);
            }
            'm' => {
                builder.multi_line(true);
            }
            's' => {
                builder.dot_matches_new_line(true);
            }
            'x' => {
                builder.ignore_whitespace(true);
            }
            'u' | 'g' | 'y' => {}
            other => return Err(format!("unsupported flag '{other}'")),
        }
    }

    builder
        .build()
        .map_err(|error| error.to_string().split_whitespace().collect::<Vec<_>>().join(" "))
}

enum Matcher {
    Literal(String),
    Regex(Regex),
}

impl Matcher {
    fn is_match(&self, line: &str) -> bool {
        match self {
            Matcher::Literal(needle) => line.contains(needle.as_str()),
            Matcher::Regex(regex) => regex.is_match(line),
        }
    }
}

#[derive(Debug)]
struct MatchRecord {
    record: LineRecord,
    before: Vec<LineRecord>,
    after: Vec<LineRecord>,
}

impl MatchRecord {
    fn output_lines(&self) -> usize {
        1 + self.before.len() + self.after.len()
    }
}

/// Header values echoed in every success payload.
struct SearchSummary<'a> {
    path: &'a str,
    rev: &'a str,
    total_lines: usize,
    mode: SearchMode,
    context_lines: usize,
    max_matches: usize,
    start_line: usize,
    end_line: usize,
    want_targets: bool,
}

impl SearchSummary<'_> {
    fn render(&self, matches: &[MatchRecord], truncated: bool) -> String {
        let mut payload = Payload::status("OK");
        payload
            .field("PATH", self.path)
            .field("REV", self.rev)
            .field("TOTAL_LINES", self.total_lines)
            .field("MODE", self.mode.as_str())
            .field("CONTEXT_LINES", self.context_lines)
            .field("MAX_MATCHES", self.max_matches)
            .field(
                "SEARCH_RANGE",
                format!("start={} end={}", self.start_line, self.end_line),
            )
            .field("MATCH_COUNT", matches.len());
        if truncated {
            payload.field("TRUNCATED", true);
        }

        payload.separator();
        for found in matches {
            payload.line(found.record.to_string());
        }

        if self.context_lines > 0 && matches.iter().any(|found| found.output_lines() > 1) {
            payload.separator();
            for (index, found) in matches.iter().enumerate() {
                if !found.before.is_empty() {
                    payload.line(format!("CTX_BEFORE {}", index + 1)).records(&found.before);
                }
                if !found.after.is_empty() {
                    payload.line(format!("CTX_AFTER {}", index + 1)).records(&found.after);
                }
            }
        }

        if self.want_targets {
            payload.separator().line("TARGETS");
            for found in matches {
                payload.line(format!("TARGET n={} h={}", found.record.n, found.record.h));
            }
        }

        payload.finish()
    }
}

/// Trims `before`/`after` until they fit `budget`, taking from the larger side
/// first so the window stays centred on the match.
fn fit_context(mut before: usize, mut after: usize, budget: usize) -> (usize, usize) {
    while before + after > budget {
        if before >= after {
            before -= 1;
        } else {
            after -= 1;
        }
    }
    (before, after)
}

fn validate(ctx: &ToolContext, args: &SearchArgs) -> Result<(), HashToolError> {
    let positive = [
        ("startLine", args.start_line),
        ("endLine", args.end_line),
        ("maxMatches", args.max_matches),
        ("maxResultBytes", args.max_result_bytes),
    ];
    for (name, value) in positive {
        if value == Some(0) {
            return Err(HashToolError::invalid_arguments(
                TOOL_NAME,
                format!("{name} must be a positive integer"),
            ));
        }
    }
    if args.max_bytes == Some(0) {
        return Err(HashToolError::invalid_arguments(
            TOOL_NAME,
            "maxBytes must be a positive integer",
        ));
    }
    if let Some(context_lines) = args.context_lines {
        if context_lines > ctx.config.max_context_lines {
            return Err(HashToolError::invalid_arguments(
                TOOL_NAME,
                format!(
                    "contextLines must be at most {}, got {context_lines}",
                    ctx.config.max_context_lines
                ),
            ));
        }
    }
    Ok(())
}

pub fn search_file(ctx: &ToolContext, args: &SearchArgs) -> Result<String, HashToolError> {
    let requested = args.requested_path()?;
    validate(ctx, args)?;

    let file = match load_text_file(
        ctx,
        requested,
        LoadOptions {
            max_bytes: args.max_bytes,
            create_if_missing: false,
        },
    ) {
        Ok(file) => file,
        Err(report) => return Ok(report.render()),
    };
    let total_lines = file.lines.len();
    let prefix = ctx.config.line_hash_prefix;

    let start_line = args.start_line.unwrap_or(1);
    let end_line = args.end_line.unwrap_or(total_lines);
    if args.end_line.is_some() && start_line > end_line {
        return Ok(ErrorReport::new(
            ErrorCode::InvalidLineRange,
            &file.display_path,
            format!("startLine ({start_line}) cannot be greater than endLine ({end_line})"),
        )
        .with_rev(&file.rev)
        .render());
    }

    let mode = args.mode.unwrap_or_default();
    let matcher = match mode {
        SearchMode::Literal => Matcher::Literal(args.query.clone()),
        SearchMode::Regex => match parse_regex(&args.query) {
            Ok(regex) => Matcher::Regex(regex),
            Err(detail) => {
                return Ok(ErrorReport::new(
                    ErrorCode::InvalidRegex,
                    &file.display_path,
                    format!(
                        "Invalid regex: {} ({detail}). Tip: escape special chars or use mode=\"literal\".",
                        args.query
                    ),
                )
                .with_rev(&file.rev)
                .with_hint(REGEX_HINT)
                .render());
            }
        },
    };

    let context_lines = args.context_lines.unwrap_or(0);
    let max_matches = args
        .max_matches
        .unwrap_or(ctx.config.default_max_matches);
    let line_budget = ctx.config.max_output_lines;

    let mut matches: Vec<MatchRecord> = Vec::new();
    let mut used_lines = 0usize;
    let mut truncated = false;

    // 0-based inclusive scan bounds; an empty range leaves `first > last`.
    let first = start_line - 1;
    let last = end_line.min(total_lines);
    for index in first..last {
        let text = &file.lines[index];
        if !matcher.is_match(text) {
            continue;
        }
        if matches.len() >= max_matches {
            break;
        }
        if used_lines >= line_budget {
            truncated = true;
            break;
        }

        let wanted_before = context_lines.min(index - first);
        let wanted_after = context_lines.min(last - 1 - index);
        let remaining = line_budget - used_lines - 1;
        let (before, after) = fit_context(wanted_before, wanted_after, remaining);

        let found = MatchRecord {
            record: make_line_record(index + 1, text, prefix),
            before: (index - before..index)
                .map(|n| make_line_record(n + 1, &file.lines[n], prefix))
                .collect(),
            after: (index + 1..=index + after)
                .map(|n| make_line_record(n + 1, &file.lines[n], prefix))
                .collect(),
        };
        used_lines += found.output_lines();
        matches.push(found);

        if (before, after) != (wanted_before, wanted_after) {
            truncated = true;
            break;
        }
    }

    let summary = SearchSummary {
        path: &file.display_path,
        rev: &file.rev,
        total_lines,
        mode,
        context_lines,
        max_matches,
        start_line,
        end_line,
        want_targets: args.want_targets.unwrap_or(false),
    };

    let Some(max_result_bytes) = args.max_result_bytes else {
        return Ok(summary.render(&matches, truncated));
    };

    loop {
        let output = summary.render(&matches, truncated);
        if output.len() <= max_result_bytes || matches.is_empty() {
            return Ok(output);
        }
        matches.pop();
        truncated = true;
    }
}
