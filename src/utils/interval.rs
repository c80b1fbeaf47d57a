//! Half-open integer interval algebra.
//!
//! All intervals are `[start, end)` in unix seconds. The scheduler, rollup,
//! status builder and analytics all reduce availability questions to these
//! few operations, so this module stays pure and allocation-conscious.

/// A half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    pub start: i64,
    pub end: i64,
}

impl Interval {
    pub fn new(start: i64, end: i64) -> Self {
        Self { start, end }
    }

    pub fn width(&self) -> i64 {
        (self.end - self.start).max(0)
    }
}

/// A check observation projected onto the time axis, for [`build_unknown`].
#[derive(Debug, Clone, Copy)]
pub struct CoveragePoint {
    pub at: i64,
    pub is_unknown: bool,
}

/// Sort by start and coalesce overlapping or touching intervals.
///
/// The result is sorted and strictly non-overlapping; zero-width inputs are
/// dropped.
pub fn merge(mut intervals: Vec<Interval>) -> Vec<Interval> {
    intervals.retain(|i| i.end > i.start);
    if intervals.is_empty() {
        return intervals;
    }
    intervals.sort_by_key(|i| i.start);

    let mut out: Vec<Interval> = Vec::with_capacity(intervals.len());
    for next in intervals {
        match out.last_mut() {
            Some(prev) if next.start <= prev.end => {
                prev.end = prev.end.max(next.end);
            }
            _ => out.push(next),
        }
    }
    out
}

/// Total width of a set of intervals. Only meaningful on merged input if the
/// caller wants a deduplicated total.
pub fn sum(intervals: &[Interval]) -> i64 {
    intervals.iter().map(Interval::width).sum()
}

/// Total width of the intersection of two merged, sorted interval sets.
pub fn overlap(a: &[Interval], b: &[Interval]) -> i64 {
    let mut total = 0;
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        let x = a[i];
        let y = b[j];
        total += (x.end.min(y.end) - x.start.max(y.start)).max(0);
        if x.end < y.end {
            i += 1;
        } else {
            j += 1;
        }
    }
    total
}

/// Clip an interval to a range, or `None` if nothing remains.
pub fn clip(i: Interval, range: Interval) -> Option<Interval> {
    let start = i.start.max(range.start);
    let end = i.end.min(range.end);
    if end > start {
        Some(Interval::new(start, end))
    } else {
        None
    }
}

/// Build the unknown sub-intervals of `[range_start, range_end)` given a
/// chronologically ordered check sequence.
///
/// A check at `t` covers `[t, t + 2*interval_sec)`; the doubled window
/// absorbs scheduling jitter and matches the staleness threshold used by the
/// public status builder. Uncovered gaps are unknown, as is the coverage of
/// any check that itself reported `unknown`. Checks before `range_start` may
/// carry coverage into the range; with no checks at all the whole range is
/// unknown.
pub fn build_unknown(
    range_start: i64,
    range_end: i64,
    interval_sec: i64,
    checks: &[CoveragePoint],
) -> Vec<Interval> {
    if range_end <= range_start {
        return Vec::new();
    }
    let window = (2 * interval_sec).max(1);
    let range = Interval::new(range_start, range_end);

    let mut out = Vec::new();
    let mut covered_until = range_start;

    for check in checks {
        if check.at >= range_end {
            break;
        }
        if check.at + window <= range_start {
            continue;
        }
        if check.at > covered_until {
            out.push(Interval::new(covered_until, check.at));
        }
        if check.is_unknown {
            out.push(Interval::new(check.at, check.at + window));
        }
        covered_until = covered_until.max(check.at + window);
    }

    if covered_until < range_end {
        out.push(Interval::new(covered_until, range_end));
    }

    merge(out.into_iter().filter_map(|i| clip(i, range)).collect())
}
