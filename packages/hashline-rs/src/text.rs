use std::fmt;

use sha2::{Digest, Sha256};
use thiserror::Error;

pub const DEFAULT_MAX_BYTES: u64 = 2 * 1024 * 1024;
pub const AUTO_BOOST_MAX_BYTES: u64 = 8 * 1024 * 1024;
pub const HARD_CAP_BYTES: u64 = 16 * 1024 * 1024;
pub const DEFAULT_LINE_HASH_PREFIX: usize = 12;
pub const MIN_LINE_HASH_PREFIX: usize = 10;
pub const MAX_LINE_HASH_PREFIX: usize = 16;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LineEnding {
    Lf,
    Crlf,
}

impl LineEnding {
    pub fn as_str(&self) -> &'static str {
        match self {
            LineEnding::Lf => "LF",
            LineEnding::Crlf => "CRLF",
        }
    }

    pub fn separator(&self) -> &'static str {
        match self {
            LineEnding::Lf => "\n",
            LineEnding::Crlf => "\r\n",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LineRecord {
    pub n: usize,
    pub h: String,
    pub t: String,
}

impl fmt::Display for LineRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}L:{} {}", self.n, self.h, self.t)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Binary file is not supported")]
    NulByte,
    #[error("File must be valid UTF-8")]
    InvalidUtf8,
}

/// Normalizes `\r\n` and lone `\r` to `\n`, splits, and drops the empty
/// element left by a final terminator. A lone terminator yields no lines.
pub fn split_lines_canonical(text: &str) -> Vec<String> {
    let normalized = text.replace("\r\n", "\n").replace('\r', "\n");
    if normalized == "\n" {
        return Vec::new();
    }

    let mut lines: Vec<String> = normalized.split('\n').map(str::to_string).collect();
    if lines.last().is_some_and(|line| line.is_empty()) {
        lines.pop();
    }
    lines
}

pub fn line_hash(text: &str, prefix_len: usize) -> String {
    let prefix_len = prefix_len.clamp(MIN_LINE_HASH_PREFIX, MAX_LINE_HASH_PREFIX);
    let mut digest = hex::encode(Sha256::digest(text.as_bytes()));
    digest.truncate(prefix_len);
    digest
}

/// True when `expected` (already lowercase) is a prefix of the line's hash.
pub fn line_hash_matches(text: &str, expected: &str) -> bool {
    line_hash(text, expected.len()) == expected
}

/// Full-length SHA-256 over the lines joined by `\n`.
pub fn file_revision<S: AsRef<str>>(lines: &[S]) -> String {
    let mut hasher = Sha256::new();
    for (index, line) in lines.iter().enumerate() {
        if index > 0 {
            hasher.update(b"\n");
        }
        hasher.update(line.as_ref().as_bytes());
    }
    hex::encode(hasher.finalize())
}

pub fn detect_line_ending(raw: &[u8]) -> LineEnding {
    if raw.windows(2).any(|pair| pair == b"\r\n") {
        LineEnding::Crlf
    } else {
        LineEnding::Lf
    }
}

pub fn decode_utf8(raw: &[u8]) -> Result<&str, DecodeError> {
    if raw.contains(&0) {
        return Err(DecodeError::NulByte);
    }
    std::str::from_utf8(raw).map_err(|_| DecodeError::InvalidUtf8)
}

pub fn join_with_line_ending<S: AsRef<str>>(lines: &[S], line_ending: LineEnding) -> String {
    let separator = line_ending.separator();
    let mut output = String::new();
    for (index, line) in lines.iter().enumerate() {
        if index > 0 {
            output.push_str(separator);
        }
        output.push_str(line.as_ref());
    }
    output
}

pub fn make_line_record(n: usize, text: &str, prefix_len: usize) -> LineRecord {
    LineRecord {
        n,
        h: line_hash(text, prefix_len),
        t: text.to_string(),
    }
}

/// Builds records for `lines`, numbering the first one `start_at`.
pub fn lines_to_records<S: AsRef<str>>(lines: &[S], start_at: usize, prefix_len: usize) -> Vec<LineRecord> {
    lines
        .iter()
        .enumerate()
        .map(|(offset, line)| make_line_record(start_at + offset, line.as_ref(), prefix_len))
        .collect()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ByteLimitPolicy {
    pub default_bytes: u64,
    pub auto_boost_bytes: u64,
    pub hard_cap_bytes: u64,
}

impl Default for ByteLimitPolicy {
    fn default() -> Self {
        Self {
            default_bytes: DEFAULT_MAX_BYTES,
            auto_boost_bytes: AUTO_BOOST_MAX_BYTES,
            hard_cap_bytes: HARD_CAP_BYTES,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ByteLimitResolution {
    pub effective_limit_bytes: u64,
    pub hard_cap_bytes: u64,
    pub auto_boosted: bool,
}

impl ByteLimitResolution {
    pub fn admits(&self, actual_bytes: u64) -> bool {
        actual_bytes <= self.hard_cap_bytes
    }
}

impl ByteLimitPolicy {
    pub fn resolve(&self, actual_bytes: u64) -> ByteLimitResolution {
        let default_bytes = self.default_bytes.max(1);
        let auto_boost_bytes = self.auto_boost_bytes.max(default_bytes);
        let hard_cap_bytes = self.hard_cap_bytes.max(auto_boost_bytes);

        if actual_bytes <= default_bytes {
            return ByteLimitResolution {
                effective_limit_bytes: default_bytes,
                hard_cap_bytes,
                auto_boosted: false,
            };
        }

        ByteLimitResolution {
            effective_limit_bytes: hard_cap_bytes.min(auto_boost_bytes.max(actual_bytes)),
            hard_cap_bytes,
            auto_boosted: true,
        }
    }
}
