use std::ops::Range;

use tracing::debug;

use crate::error::ConflictKind;
use crate::ops::{ApplyOp, BlockRef, BoundaryKind, LineTarget};
use crate::response::Conflict;
use crate::text::{line_hash_matches, lines_to_records, make_line_record, LineRecord};

/// One operation resolved against the base lines.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct ApplyPlan {
    pub source_index: usize,
    pub op_name: &'static str,
    /// Base lines replaced by `replacement`; empty for a pure insertion.
    pub range: Range<usize>,
    pub replacement: Vec<String>,
    pub line_delta: isize,
    pub did_change: bool,
    pub safe_reapplied: bool,
    /// Index of the first replacement line in the result, set by `apply_plans`.
    pub new_start: usize,
}

impl ApplyPlan {
    fn new(
        source_index: usize,
        op_name: &'static str,
        base: &[String],
        range: Range<usize>,
        replacement: Vec<String>,
        safe_reapplied: bool,
    ) -> Self {
        let removed = &base[range.clone()];
        Self {
            source_index,
            op_name,
            line_delta: replacement.len() as isize - removed.len() as isize,
            did_change: removed != replacement.as_slice(),
            new_start: range.start,
            range,
            replacement,
            safe_reapplied,
        }
    }

    fn is_insertion(&self) -> bool {
        self.range.is_empty()
    }
}

/// Resolves targets against the lines as they are now.
pub(crate) struct Resolver<'a> {
    pub lines: &'a [String],
    pub prefix_len: usize,
    pub context_lines: usize,
    pub safe_reapply: bool,
}

impl Resolver<'_> {
    pub fn resolve_ops(&self, ops: &[ApplyOp]) -> Result<Vec<ApplyPlan>, Conflict> {
        ops.iter()
            .enumerate()
            .map(|(index, op)| self.resolve_op(index, op))
            .collect()
    }

    fn resolve_op(&self, index: usize, op: &ApplyOp) -> Result<ApplyPlan, Conflict> {
        let total = self.lines.len();
        let (range, replacement, relocated) = match op {
            ApplyOp::ReplaceLine { target, text } => {
                let (line, relocated) = self.resolve_line_target(target, index, "target")?;
                (line..line + 1, vec![text.clone()], relocated)
            }
            ApplyOp::ReplaceBlock { start, end, lines } => {
                let (range, relocated) = self.resolve_block(start, end, index)?;
                (range, lines.clone(), relocated)
            }
            ApplyOp::AppendToFile { lines } => (total..total, lines.clone(), false),
            ApplyOp::SetFile { lines } => (0..total, lines.clone(), false),
        };

        Ok(ApplyPlan::new(index, op.name(), self.lines, range, replacement, relocated))
    }

    fn resolve_block(
        &self,
        start: &BlockRef,
        end: &BlockRef,
        op_index: usize,
    ) -> Result<(Range<usize>, bool), Conflict> {
        let total = self.lines.len();

        // `start_index` is an insertion point, `end_index` an inclusive line.
        let (start_index, start_relocated) = match start {
            BlockRef::Line(target) => self.resolve_line_target(target, op_index, "start")?,
            BlockRef::Boundary(BoundaryKind::Sof) => (0, false),
            BlockRef::Boundary(BoundaryKind::Eof) => (total, false),
        };
        let (end_index, end_relocated) = match end {
            BlockRef::Line(target) => {
                let (line, relocated) = self.resolve_line_target(target, op_index, "end")?;
                (line as isize, relocated)
            }
            BlockRef::Boundary(BoundaryKind::Sof) => (0, false),
            BlockRef::Boundary(BoundaryKind::Eof) => (total as isize - 1, false),
        };

        if end_index < start_index as isize - 1 {
            let mut conflict = Conflict::new(
                ConflictKind::InvalidBlockRange,
                Some(op_index),
                "invalid replace_block range: end precedes start",
            )
            .expected(format!("start {} end {}", describe_ref(start), describe_ref(end)))
            .actual(format!("start_index={start_index} end_index={end_index}"));
            conflict.context = self.context_around(start_index.min(total.saturating_sub(1)));
            return Err(conflict);
        }

        let end_exclusive = usize::try_from(end_index + 1)
            .unwrap_or(0)
            .min(total)
            .max(start_index);
        Ok((start_index..end_exclusive, start_relocated || end_relocated))
    }

    fn resolve_line_target(
        &self,
        target: &LineTarget,
        op_index: usize,
        label: &str,
    ) -> Result<(usize, bool), Conflict> {
        let total = self.lines.len();
        let in_range = (1..=total).contains(&target.n);
        if in_range && line_hash_matches(&self.lines[target.n - 1], &target.h) {
            return Ok((target.n - 1, false));
        }

        let candidates = self.candidates(&target.h);
        let expected = format!("{label} n={} h={}", target.n, target.h);

        if self.safe_reapply {
            match candidates.as_slice() {
                [only] => {
                    debug!(
                        op_index,
                        from = target.n,
                        to = only.n,
                        hash = %target.h,
                        "safe reapply relocated target"
                    );
                    return Ok((only.n - 1, true));
                }
                [_, _, ..] => {
                    let mut conflict = Conflict::new(
                        ConflictKind::AmbiguousReapply,
                        Some(op_index),
                        format!(
                            "{label} hash matches {} lines; refusing to guess",
                            candidates.len()
                        ),
                    )
                    .expected(expected);
                    if in_range {
                        conflict = conflict
                            .actual(make_line_record(target.n, &self.lines[target.n - 1], self.prefix_len).to_string());
                    }
                    conflict.context = self.context_around(target.n.min(total) - 1);
                    conflict.candidates = candidates;
                    return Err(conflict);
                }
                [] => {}
            }
        }

        let mut conflict = if in_range {
            let actual = make_line_record(target.n, &self.lines[target.n - 1], self.prefix_len);
            Conflict::new(
                ConflictKind::HashMismatch,
                Some(op_index),
                format!("{label} hash mismatch"),
            )
            .expected(expected)
            .actual(actual.to_string())
        } else {
            Conflict::new(
                ConflictKind::TargetOutOfRange,
                Some(op_index),
                format!("{label} line is out of range"),
            )
            .expected(expected)
            .actual(format!("total_lines={total}"))
        };
        if total > 0 {
            conflict.context = self.context_around(target.n.min(total) - 1);
        }
        conflict.candidates = candidates;
        Err(conflict)
    }

    fn candidates(&self, expected_hash: &str) -> Vec<LineRecord> {
        self.lines
            .iter()
            .enumerate()
            .filter(|(_, line)| line_hash_matches(line, expected_hash))
            .map(|(index, line)| make_line_record(index + 1, line, self.prefix_len))
            .collect()
    }

    fn context_around(&self, index: usize) -> Vec<LineRecord> {
        if self.lines.is_empty() {
            return Vec::new();
        }
        let index = index.min(self.lines.len() - 1);
        let start = index.saturating_sub(self.context_lines);
        let end = (index + self.context_lines + 1).min(self.lines.len());
        lines_to_records(&self.lines[start..end], start + 1, self.prefix_len)
    }
}

fn describe_ref(block_ref: &BlockRef) -> String {
    match block_ref {
        BlockRef::Line(target) => format!("n={} h={}", target.n, target.h),
        BlockRef::Boundary(BoundaryKind::Sof) => "SOF".to_string(),
        BlockRef::Boundary(BoundaryKind::Eof) => "EOF".to_string(),
    }
}

/// Source indices of the first two plans found touching the same lines.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Overlap {
    pub first: usize,
    pub second: usize,
}

/// Sorts plans into layout order, `(start, insertions first, source index)`,
/// and rejects batches where two plans claim the same lines. An insertion
/// strictly inside a replaced range counts as overlapping.
pub(crate) fn order_plans(plans: &mut [ApplyPlan]) -> Result<(), Overlap> {
    plans.sort_by_key(|plan| (plan.range.start, !plan.is_insertion(), plan.source_index));

    let mut covered: Option<(usize, usize)> = None;
    for plan in plans.iter() {
        if let Some((end, owner)) = covered {
            if plan.range.start < end {
                return Err(Overlap {
                    first: owner.min(plan.source_index),
                    second: owner.max(plan.source_index),
                });
            }
        }
        if !plan.is_insertion() && covered.is_none_or(|(end, _)| plan.range.end > end) {
            covered = Some((plan.range.end, plan.source_index));
        }
    }
    Ok(())
}

/// Applies ordered plans to a copy of `base`, last position first so earlier
/// indices stay valid, and records where each replacement landed.
pub(crate) fn apply_plans(base: &[String], plans: &mut [ApplyPlan]) -> Vec<String> {
    let mut shift: isize = 0;
    for plan in plans.iter_mut() {
        plan.new_start = (plan.range.start as isize + shift) as usize;
        shift += plan.line_delta;
    }

    let mut lines = base.to_vec();
    for plan in plans.iter().rev() {
        lines.splice(plan.range.clone(), plan.replacement.iter().cloned());
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::{line_hash, DEFAULT_LINE_HASH_PREFIX};

    fn lines(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    fn target(n: usize, text: &str) -> LineTarget {
        LineTarget {
            n,
            h: line_hash(text, DEFAULT_LINE_HASH_PREFIX),
        }
    }

    fn resolver(lines: &[String], safe_reapply: bool) -> Resolver<'_> {
        Resolver {
            lines,
            prefix_len: DEFAULT_LINE_HASH_PREFIX,
            context_lines: 1,
            safe_reapply,
        }
    }

    fn run(base: &[String], ops: &[ApplyOp]) -> Vec<String> {
        let mut plans = resolver(base, false).resolve_ops(ops).expect("resolve");
        order_plans(&mut plans).expect("no overlap");
        apply_plans(base, &mut plans)
    }

    #[test]
    fn replace_block_grows_file() {
        let base = lines(&["a", "b", "c", "d"]);
        let ops = [ApplyOp::ReplaceBlock {
            start: BlockRef::Line(target(2, "b")),
            end: BlockRef::Line(target(3, "c")),
            lines: lines(&["B", "C", "X"]),
        }];
        let mut plans = resolver(&base, false).resolve_ops(&ops).expect("resolve");
        assert_eq!(plans[0].range, 1..3);
        assert_eq!(plans[0].line_delta, 1);
        order_plans(&mut plans).expect("order");
        assert_eq!(apply_plans(&base, &mut plans), lines(&["a", "B", "C", "X", "d"]));
    }

    #[test]
    fn boundaries_resolve_to_file_edges() {
        let base = lines(&["a", "b"]);
        let prepend = ApplyOp::ReplaceBlock {
            start: BlockRef::Boundary(BoundaryKind::Sof),
            end: BlockRef::Line(target(1, "a")),
            lines: lines(&["A"]),
        };
        let append = ApplyOp::ReplaceBlock {
            start: BlockRef::Boundary(BoundaryKind::Eof),
            end: BlockRef::Boundary(BoundaryKind::Eof),
            lines: lines(&["c"]),
        };
        assert_eq!(run(&base, &[prepend, append]), lines(&["A", "b", "c"]));

        let whole = ApplyOp::ReplaceBlock {
            start: BlockRef::Boundary(BoundaryKind::Sof),
            end: BlockRef::Boundary(BoundaryKind::Eof),
            lines: Vec::new(),
        };
        assert!(run(&base, &[whole]).is_empty());
    }

    #[test]
    fn boundary_block_on_empty_file_is_insertion() {
        let base: Vec<String> = Vec::new();
        let ops = [ApplyOp::ReplaceBlock {
            start: BlockRef::Boundary(BoundaryKind::Sof),
            end: BlockRef::Boundary(BoundaryKind::Eof),
            lines: lines(&["x"]),
        }];
        let plans = resolver(&base, false).resolve_ops(&ops).expect("resolve");
        assert_eq!(plans[0].range, 0..0);
        assert_eq!(run(&base, &ops), lines(&["x"]));
    }

    #[test]
    fn reversed_block_is_invalid_range() {
        let base = lines(&["a", "b", "c"]);
        let ops = [ApplyOp::ReplaceBlock {
            start: BlockRef::Line(target(3, "c")),
            end: BlockRef::Line(target(1, "a")),
            lines: Vec::new(),
        }];
        let conflict = resolver(&base, false).resolve_ops(&ops).expect_err("invalid range");
        assert_eq!(conflict.kind, ConflictKind::InvalidBlockRange);
        assert_eq!(conflict.failed_op_index, Some(0));
    }

    #[test]
    fn stale_hash_reports_context_and_candidates() {
        let base = lines(&["one", "two", "moved", "four"]);
        let ops = [ApplyOp::ReplaceLine {
            target: target(2, "moved"),
            text: "x".to_string(),
        }];
        let conflict = resolver(&base, false).resolve_ops(&ops).expect_err("mismatch");
        assert_eq!(conflict.kind, ConflictKind::HashMismatch);
        assert_eq!(conflict.context.iter().map(|record| record.n).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(conflict.candidates.len(), 1);
        assert_eq!(conflict.candidates[0].n, 3);
        assert!(conflict.actual[0].starts_with("2L:"));
    }

    #[test]
    fn out_of_range_target_is_reported() {
        let base = lines(&["one"]);
        let ops = [ApplyOp::ReplaceLine {
            target: target(5, "one"),
            text: "x".to_string(),
        }];
        let conflict = resolver(&base, false).resolve_ops(&ops).expect_err("out of range");
        assert_eq!(conflict.kind, ConflictKind::TargetOutOfRange);
        assert_eq!(conflict.actual, vec!["total_lines=1".to_string()]);
        assert_eq!(conflict.candidates.len(), 1);
    }

    #[test]
    fn safe_reapply_relocates_unique_match_only() {
        let base = lines(&["header", "inserted", "target"]);
        let ops = [ApplyOp::ReplaceLine {
            target: target(2, "target"),
            text: "TARGET".to_string(),
        }];
        let plans = resolver(&base, true).resolve_ops(&ops).expect("relocated");
        assert_eq!(plans[0].range, 2..3);
        assert!(plans[0].safe_reapplied);

        let ambiguous = lines(&["dup", "other", "dup"]);
        let ops = [ApplyOp::ReplaceLine {
            target: target(2, "dup"),
            text: "x".to_string(),
        }];
        let conflict = resolver(&ambiguous, true).resolve_ops(&ops).expect_err("ambiguous");
        assert_eq!(conflict.kind, ConflictKind::AmbiguousReapply);
        assert_eq!(conflict.candidates.len(), 2);
    }

    #[test]
    fn overlapping_plans_are_rejected() {
        let base = lines(&["a", "b", "c", "d"]);
        let ops = [
            ApplyOp::ReplaceBlock {
                start: BlockRef::Line(target(1, "a")),
                end: BlockRef::Line(target(3, "c")),
                lines: Vec::new(),
            },
            ApplyOp::ReplaceLine {
                target: target(2, "b"),
                text: "x".to_string(),
            },
        ];
        let mut plans = resolver(&base, false).resolve_ops(&ops).expect("resolve");
        assert_eq!(order_plans(&mut plans), Err(Overlap { first: 0, second: 1 }));
    }

    #[test]
    fn insertion_inside_replacement_overlaps_but_edges_do_not() {
        let base = lines(&["a", "b", "c"]);
        let replace = ApplyOp::ReplaceBlock {
            start: BlockRef::Line(target(1, "a")),
            end: BlockRef::Line(target(2, "b")),
            lines: lines(&["AB"]),
        };
        let inside = ApplyOp::ReplaceBlock {
            start: BlockRef::Line(target(2, "b")),
            end: BlockRef::Line(target(1, "a")),
            lines: lines(&["ins"]),
        };
        let mut plans = resolver(&base, false)
            .resolve_ops(&[replace.clone(), inside])
            .expect("resolve");
        assert!(order_plans(&mut plans).is_err());

        let at_start = ApplyOp::ReplaceBlock {
            start: BlockRef::Boundary(BoundaryKind::Sof),
            end: BlockRef::Boundary(BoundaryKind::Sof),
            lines: lines(&["top"]),
        };
        let base_two = lines(&["a", "b"]);
        let replace_second = ApplyOp::ReplaceLine {
            target: target(2, "b"),
            text: "B".to_string(),
        };
        let append = ApplyOp::AppendToFile {
            lines: lines(&["tail"]),
        };
        assert_eq!(
            run(&base_two, &[append, replace_second, at_start]),
            lines(&["top", "B", "tail"])
        );
    }

    #[test]
    fn insertions_at_one_point_keep_source_order() {
        let base = lines(&["a"]);
        let ops = [
            ApplyOp::AppendToFile { lines: lines(&["1"]) },
            ApplyOp::AppendToFile { lines: lines(&["2"]) },
        ];
        assert_eq!(run(&base, &ops), lines(&["a", "1", "2"]));
    }

    #[test]
    fn new_start_accounts_for_earlier_growth() {
        let base = lines(&["a", "b", "c"]);
        let ops = [
            ApplyOp::ReplaceLine {
                target: target(3, "c"),
                text: "C".to_string(),
            },
            ApplyOp::ReplaceBlock {
                start: BlockRef::Line(target(1, "a")),
                end: BlockRef::Line(target(1, "a")),
                lines: lines(&["a1", "a2", "a3"]),
            },
        ];
        let mut plans = resolver(&base, false).resolve_ops(&ops).expect("resolve");
        order_plans(&mut plans).expect("order");
        let result = apply_plans(&base, &mut plans);
        assert_eq!(result, lines(&["a1", "a2", "a3", "b", "C"]));

        let replaced_c = plans.iter().find(|plan| plan.source_index == 0).expect("plan");
        assert_eq!(replaced_c.new_start, 4);
        assert_eq!(result[replaced_c.new_start], "C");
    }

    #[test]
    fn identical_replacement_is_no_change() {
        let base = lines(&["same"]);
        let ops = [ApplyOp::ReplaceLine {
            target: target(1, "same"),
            text: "same".to_string(),
        }];
        let plans = resolver(&base, false).resolve_ops(&ops).expect("resolve");
        assert!(!plans[0].did_change);
        assert_eq!(plans[0].line_delta, 0);
    }
}
