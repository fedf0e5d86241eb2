use std::fmt::Display;

use crate::error::{ConflictKind, ErrorCode};
use crate::text::{LineEnding, LineRecord};

pub const REFRESH_HINT: &str =
    "Run hashread to refresh current {n,h} line tags/hashes, then retry the operation with updated targets.";

/// Newline-delimited response under construction. Field values are flattened
/// to a single line so the payload stays line-oriented.
#[derive(Debug, Default)]
pub(crate) struct Payload {
    lines: Vec<String>,
}

impl Payload {
    pub fn status(status: &str) -> Self {
        Self {
            lines: vec![status.to_string()],
        }
    }

    pub fn field(&mut self, key: &str, value: impl Display) -> &mut Self {
        let value = value.to_string().replace(['\r', '\n'], " ");
        self.lines.push(format!("{key} {value}"));
        self
    }

    pub fn line(&mut self, line: impl Into<String>) -> &mut Self {
        self.lines.push(line.into());
        self
    }

    pub fn separator(&mut self) -> &mut Self {
        self.line("---")
    }

    pub fn records(&mut self, records: &[LineRecord]) -> &mut Self {
        self.lines.extend(records.iter().map(LineRecord::to_string));
        self
    }

    pub fn finish(&self) -> String {
        self.lines.join("\n")
    }
}

fn or_dash(value: Option<&str>) -> &str {
    match value {
        Some(value) if !value.is_empty() => value,
        _ => "-",
    }
}

/// An `ERROR <CODE>` result: the request was well formed but unsatisfiable.
#[derive(Debug)]
pub(crate) struct ErrorReport {
    pub code: ErrorCode,
    pub path: String,
    pub message: String,
    pub rev: Option<String>,
    pub hint: Option<String>,
    pub encoding: bool,
    pub line_ending: Option<LineEnding>,
    pub total_lines: Option<usize>,
    pub details: Vec<(&'static str, String)>,
}

impl ErrorReport {
    pub fn new(code: ErrorCode, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code,
            path: path.into(),
            message: message.into(),
            rev: None,
            hint: None,
            encoding: false,
            line_ending: None,
            total_lines: None,
            details: Vec::new(),
        }
    }

    pub fn with_rev(mut self, rev: impl Into<String>) -> Self {
        self.rev = Some(rev.into());
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn with_line_ending(mut self, line_ending: LineEnding) -> Self {
        self.line_ending = Some(line_ending);
        self
    }

    pub fn with_total_lines(mut self, total_lines: usize) -> Self {
        self.total_lines = Some(total_lines);
        self
    }

    /// Adds the `ENCODING` line Reader payloads always carry.
    pub fn with_encoding(mut self) -> Self {
        self.encoding = true;
        self
    }

    pub fn detail(mut self, key: &'static str, value: impl Display) -> Self {
        self.details.push((key, value.to_string()));
        self
    }

    pub fn render(&self) -> String {
        let mut payload = Payload::status(&format!("ERROR {}", self.code));
        payload
            .field("PATH", or_dash(Some(&self.path)))
            .field("REV", or_dash(self.rev.as_deref()))
            .field("MESSAGE", &self.message);

        if self.encoding {
            payload.field("ENCODING", "utf-8");
        }
        if let Some(line_ending) = self.line_ending {
            payload.field("LINE_ENDING", line_ending.as_str());
        }
        if let Some(total_lines) = self.total_lines {
            payload.field("TOTAL_LINES", total_lines);
        }
        for (key, value) in &self.details {
            payload.field(key, value);
        }
        if let Some(hint) = &self.hint {
            payload.field("HINT", hint);
        }

        payload.finish()
    }
}

/// Divergence between the caller's view of the file and its current content.
#[derive(Debug)]
pub(crate) struct Conflict {
    pub kind: ConflictKind,
    pub failed_op_index: Option<usize>,
    pub message: String,
    pub expected: Vec<String>,
    pub actual: Vec<String>,
    pub context: Vec<LineRecord>,
    pub candidates: Vec<LineRecord>,
}

impl Conflict {
    pub fn new(kind: ConflictKind, failed_op_index: Option<usize>, message: impl Into<String>) -> Self {
        Self {
            kind,
            failed_op_index,
            message: message.into(),
            expected: Vec::new(),
            actual: Vec::new(),
            context: Vec::new(),
            candidates: Vec::new(),
        }
    }

    pub fn expected(mut self, line: impl Into<String>) -> Self {
        self.expected.push(line.into());
        self
    }

    pub fn actual(mut self, line: impl Into<String>) -> Self {
        self.actual.push(line.into());
        self
    }

    pub fn render(&self, path: &str, current_rev: &str) -> String {
        let mut payload = Payload::status("CONFLICT");
        payload
            .field("PATH", or_dash(Some(path)))
            .field("REV", current_rev)
            .field("CONFLICT_KIND", self.kind)
            .field(
                "FAILED_OP_INDEX",
                self.failed_op_index
                    .map(|index| index.to_string())
                    .unwrap_or_else(|| "-".to_string()),
            )
            .field("MESSAGE", &self.message)
            .field("HINT", REFRESH_HINT);

        if !self.expected.is_empty() {
            payload.line("EXPECTED");
            for line in &self.expected {
                payload.line(line.replace(['\r', '\n'], " "));
            }
        }
        if !self.actual.is_empty() {
            payload.line("ACTUAL");
            for line in &self.actual {
                payload.line(line.replace(['\r', '\n'], " "));
            }
        }
        if !self.context.is_empty() {
            payload.line("CONTEXT").records(&self.context);
        }
        if !self.candidates.is_empty() {
            payload.line("CANDIDATES").records(&self.candidates);
        }

        payload.finish()
    }
}

/// Either terminal branch of an Editor call.
#[derive(Debug)]
pub(crate) enum Rejection {
    Error(ErrorReport),
    Conflict {
        path: String,
        current_rev: String,
        conflict: Conflict,
    },
}

impl Rejection {
    pub fn render(&self) -> String {
        match self {
            Rejection::Error(report) => report.render(),
            Rejection::Conflict {
                path,
                current_rev,
                conflict,
            } => conflict.render(path, current_rev),
        }
    }
}

impl From<ErrorReport> for Rejection {
    fn from(report: ErrorReport) -> Self {
        Rejection::Error(report)
    }
}
