use std::collections::HashMap;

use crate::model::Span;

// ── Overlap Layout Algorithm ─────────────────────────────────────
//
// Lays out one staff member's bookings for one day into side-by-side render
// columns. Two rules drive it:
// - no two intervals sharing a column may overlap in time;
// - every interval in a cluster of transitively-overlapping intervals
//   reports the same total_columns, so the UI can split width evenly.
//
// Pure function over a snapshot — safe to call on every render.

/// Column placement for one interval. `column` is zero-based;
/// `total_columns` is shared by the interval's whole overlap cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutAssignment {
    pub span: Span,
    pub column: usize,
    pub total_columns: usize,
}

/// Arena-indexed union-find over interval indices.
struct UnionFind {
    parent: Vec<usize>,
    size: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            size: vec![1; n],
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]]; // path halving
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let (mut ra, mut rb) = (self.find(a), self.find(b));
        if ra == rb {
            return;
        }
        if self.size[ra] < self.size[rb] {
            std::mem::swap(&mut ra, &mut rb);
        }
        self.parent[rb] = ra;
        self.size[ra] += self.size[rb];
    }
}

/// Assign each interval the lowest-numbered column free at its start time and
/// compute per-cluster column counts.
///
/// Deterministic: intervals are processed by start ascending, duration
/// descending (longer bookings claim lower columns), input index last. The
/// output is parallel to the input slice, so callers keep their own
/// association between spans and bookings.
///
/// Zero- or negative-duration spans are rejected upstream and never reach
/// this function.
pub fn layout_day(spans: &[Span]) -> Vec<LayoutAssignment> {
    let n = spans.len();
    if n == 0 {
        return Vec::new();
    }
    debug_assert!(spans.iter().all(|s| s.end > s.start));

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| {
        spans[a]
            .start
            .cmp(&spans[b].start)
            .then(spans[b].duration_ms().cmp(&spans[a].duration_ms()))
            .then(a.cmp(&b))
    });

    let mut column = vec![0usize; n];
    // Per column: end of the most recently placed interval.
    let mut col_ends: Vec<i64> = Vec::new();
    let mut clusters = UnionFind::new(n);
    // Indices of intervals still open at the sweep position.
    let mut active: Vec<usize> = Vec::new();

    for &i in &order {
        let span = spans[i];

        // Anything that ended by now can't overlap this or any later interval
        // (starts are non-decreasing).
        active.retain(|&j| spans[j].end > span.start);
        // Every remaining active interval overlaps this one: its start is
        // <= span.start (sort order) and its end is > span.start.
        for &j in &active {
            clusters.union(i, j);
        }
        active.push(i);

        match col_ends.iter().position(|&end| end <= span.start) {
            Some(c) => {
                col_ends[c] = span.end;
                column[i] = c;
            }
            None => {
                col_ends.push(span.end);
                column[i] = col_ends.len() - 1;
            }
        }
    }

    // total_columns = 1 + widest column used within the cluster.
    let mut cluster_width: HashMap<usize, usize> = HashMap::new();
    for i in 0..n {
        let root = clusters.find(i);
        let w = cluster_width.entry(root).or_insert(0);
        *w = (*w).max(column[i]);
    }

    (0..n)
        .map(|i| LayoutAssignment {
            span: spans[i],
            column: column[i],
            total_columns: cluster_width[&clusters.find(i)] + 1,
        })
        .collect()
}
