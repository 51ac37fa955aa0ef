//! Assignment of detections to tracks
//!
//! [`GlobalNearestNeighbor`] finds the assignment minimizing total cost where
//! leaving a track or a detection unassigned costs half the gate. It solves
//! the extended `(n + m) × (m + n)` problem
//!
//! ```text
//!          detections        dummy tracks
//!        ┌──────────────┬───────────────────┐
//! tracks │  C (n × m)   │  diag(g/2), ∞ off │
//!        ├──────────────┼───────────────────┤
//! dummy  │  diag(g/2)   │   0               │
//!        └──────────────┴───────────────────┘
//! ```
//!
//! with the Hungarian solver, so a pair is only taken when its cost is below
//! the gate. Among optimal assignments of equal cost the one pairing the
//! lowest detection with the lowest track wins: the solver's duals give the
//! subgraph of tight pairs and [`canonical_assignment`] walks it column by
//! column. [`GreedyNearestNeighbor`] is a cheaper, suboptimal alternative.

use std::collections::VecDeque;

use std::fmt::Debug;

use log::trace;
use nalgebra::DMatrix;

use super::builder::CostMatrix;
use crate::common::association::hungarian::{hungarian, validate_costs, HungarianResult};
use crate::errors::AssociationError;

/// One assigned pair, as matrix indices
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Match {
    /// Row of the track
    pub track_index: usize,
    /// Column of the detection
    pub detection_index: usize,
    /// Cost of the pair
    pub cost: f64,
}

/// Solution of one association problem
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Association {
    /// Assigned pairs, ascending track index
    pub matches: Vec<Match>,
    /// Rows without a detection, ascending
    pub unmatched_tracks: Vec<usize>,
    /// Columns without a track, ascending
    pub unmatched_detections: Vec<usize>,
}

impl Association {
    /// Total cost of the assigned pairs
    pub fn total_cost(&self) -> f64 {
        self.matches.iter().map(|m| m.cost).sum()
    }

    /// Detection assigned to a row
    pub fn detection_for(&self, track_index: usize) -> Option<usize> {
        self.matches
            .iter()
            .find(|m| m.track_index == track_index)
            .map(|m| m.detection_index)
    }

    fn from_pairs(costs: &DMatrix<f64>, mut pairs: Vec<(usize, usize)>) -> Self {
        let (n, m) = costs.shape();
        pairs.sort_unstable();
        let mut track_used = vec![false; n];
        let mut detection_used = vec![false; m];
        let matches = pairs
            .into_iter()
            .map(|(i, j)| {
                track_used[i] = true;
                detection_used[j] = true;
                Match {
                    track_index: i,
                    detection_index: j,
                    cost: costs[(i, j)],
                }
            })
            .collect();
        Self {
            matches,
            unmatched_tracks: (0..n).filter(|&i| !track_used[i]).collect(),
            unmatched_detections: (0..m).filter(|&j| !detection_used[j]).collect(),
        }
    }
}

/// Assignment strategy
pub trait Associator: Send + Sync + Debug {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Assign detections to tracks.
    ///
    /// Pairs with infinite cost are never assigned; pairs with cost at or
    /// above `gate_threshold` are never preferred over leaving both
    /// unassigned.
    fn associate(&self, costs: &CostMatrix, gate_threshold: f64) -> Result<Association, AssociationError>;
}

fn check(costs: &CostMatrix) -> Result<(), AssociationError> {
    let (rows, cols) = costs.costs.shape();
    let (expected_rows, expected_cols) = (costs.track_ids.len(), costs.detection_ids.len());
    if rows != expected_rows || cols != expected_cols {
        return Err(AssociationError::ShapeMismatch {
            rows,
            cols,
            expected_rows,
            expected_cols,
        });
    }
    validate_costs(&costs.costs)
}

/// Extended square matrix with non-assignment cost `non_assignment`
pub fn extended_cost_matrix(costs: &DMatrix<f64>, non_assignment: f64) -> DMatrix<f64> {
    let (n, m) = costs.shape();
    let size = n + m;
    let mut ext = DMatrix::from_element(size, size, f64::INFINITY);
    ext.view_mut((0, 0), (n, m)).copy_from(costs);
    for i in 0..n {
        ext[(i, m + i)] = non_assignment;
    }
    for j in 0..m {
        ext[(n + j, j)] = non_assignment;
    }
    ext.view_mut((n, m), (m, n)).fill(0.0);
    ext
}

/// Globally optimal assignment with a dummy row and column per item
#[derive(Debug, Clone, Copy, Default)]
pub struct GlobalNearestNeighbor;

impl Associator for GlobalNearestNeighbor {
    fn name(&self) -> &'static str {
        "gnn"
    }

    fn associate(&self, costs: &CostMatrix, gate_threshold: f64) -> Result<Association, AssociationError> {
        check(costs)?;
        let (n, m) = costs.costs.shape();
        if n == 0 || m == 0 {
            return Ok(Association::from_pairs(&costs.costs, Vec::new()));
        }

        // Pairs at the gate would tie with leaving both unassigned
        let admissible = costs
            .costs
            .map(|c| if c < gate_threshold { c } else { f64::INFINITY });
        let extended = extended_cost_matrix(&admissible, 0.5 * gate_threshold);
        let solution = hungarian(&extended)?;
        let pairs: Vec<(usize, usize)> = canonical_assignment(&extended, &solution, m)
            .into_iter()
            .enumerate()
            .filter(|&(i, j)| i < n && j < m && admissible[(i, j)].is_finite())
            .collect();

        trace!(
            "gnn: {}x{} matrix, {} admissible, {} assigned, extended cost {:.4}",
            n,
            m,
            costs.num_admissible(),
            pairs.len(),
            solution.cost
        );
        Ok(Association::from_pairs(&costs.costs, pairs))
    }
}

/// Lexicographically smallest optimal assignment of a square matrix.
///
/// Every optimal assignment uses only pairs with zero reduced cost under the
/// solver's duals. Columns `0..priority_cols` are fixed in ascending order,
/// each to the lowest row that still admits a perfect matching on the tight
/// pairs; a row is freed by rotating an alternating path. Returns the column
/// of each row.
pub fn canonical_assignment(cost: &DMatrix<f64>, solution: &HungarianResult, priority_cols: usize) -> Vec<usize> {
    let size = cost.nrows();
    let mut col_of: Vec<usize> = solution.row_to_col.iter().map(|c| c.unwrap_or(usize::MAX)).collect();
    let mut row_of: Vec<usize> = solution.col_to_row.iter().map(|r| r.unwrap_or(usize::MAX)).collect();
    if col_of.contains(&usize::MAX) || row_of.contains(&usize::MAX) {
        return col_of;
    }

    let scale = cost.iter().filter(|c| c.is_finite()).fold(1.0_f64, |acc, c| acc.max(c.abs()));
    let tolerance = 1e-9 * scale;
    let tight = |i: usize, j: usize| {
        let c = cost[(i, j)];
        c.is_finite() && (c - solution.row_duals[i] - solution.col_duals[j]).abs() <= tolerance
    };

    let mut fixed_row = vec![false; size];
    let mut fixed_col = vec![false; size];
    for j in 0..priority_cols.min(size) {
        for r in (0..size).filter(|&r| !fixed_row[r] && tight(r, j)) {
            if row_of[j] == r {
                break;
            }
            // Row `row_of[j]` must reach column `col_of[r]` through tight free pairs
            let (start, target) = (row_of[j], col_of[r]);
            let mut parent = vec![usize::MAX; size];
            let mut queue = VecDeque::from([start]);
            let mut seen_row = vec![false; size];
            seen_row[start] = true;
            let mut found = false;
            'search: while let Some(i) = queue.pop_front() {
                for c in 0..size {
                    if fixed_col[c] || c == j || parent[c] != usize::MAX || !tight(i, c) {
                        continue;
                    }
                    parent[c] = i;
                    if c == target {
                        found = true;
                        break 'search;
                    }
                    let next = row_of[c];
                    if !seen_row[next] && next != r {
                        seen_row[next] = true;
                        queue.push_back(next);
                    }
                }
            }
            if !found {
                continue;
            }

            let mut c = target;
            loop {
                let i = parent[c];
                let previous = col_of[i];
                col_of[i] = c;
                row_of[c] = i;
                if i == start {
                    break;
                }
                c = previous;
            }
            col_of[r] = j;
            row_of[j] = r;
            break;
        }
        fixed_col[j] = true;
        fixed_row[row_of[j]] = true;
    }
    col_of
}

/// Repeatedly takes the cheapest remaining admissible pair
#[derive(Debug, Clone, Copy, Default)]
pub struct GreedyNearestNeighbor;

impl Associator for GreedyNearestNeighbor {
    fn name(&self) -> &'static str {
        "greedy"
    }

    fn associate(&self, costs: &CostMatrix, gate_threshold: f64) -> Result<Association, AssociationError> {
        check(costs)?;
        let c = &costs.costs;
        let mut candidates: Vec<(f64, usize, usize)> = costs
            .gated
            .iter()
            .enumerate()
            .flat_map(|(i, cols)| cols.iter().map(move |&j| (i, j)))
            .filter(|&(i, j)| c[(i, j)] < gate_threshold)
            .map(|(i, j)| (c[(i, j)], i, j))
            .collect();
        candidates.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.2.cmp(&b.2)).then(a.1.cmp(&b.1)));

        let mut track_used = vec![false; c.nrows()];
        let mut detection_used = vec![false; c.ncols()];
        let mut pairs = Vec::new();
        for (_, i, j) in candidates {
            if !track_used[i] && !detection_used[j] {
                track_used[i] = true;
                detection_used[j] = true;
                pairs.push((i, j));
            }
        }
        Ok(Association::from_pairs(c, pairs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DetectionId, TrackId};

    const INF: f64 = f64::INFINITY;

    fn matrix(rows: usize, cols: usize, values: &[f64]) -> CostMatrix {
        CostMatrix::from_costs(
            (1..=rows as u64).map(TrackId).collect(),
            (1..=cols as u64).map(DetectionId).collect(),
            DMatrix::from_row_slice(rows, cols, values),
        )
    }

    #[test]
    fn test_extended_matrix_layout() {
        let ext = extended_cost_matrix(&DMatrix::from_element(2, 1, 1.0), 4.0);
        assert_eq!(ext.shape(), (3, 3));
        assert_eq!(ext[(0, 1)], 4.0);
        assert_eq!(ext[(0, 2)], INF);
        assert_eq!(ext[(1, 2)], 4.0);
        assert_eq!(ext[(2, 0)], 4.0);
        assert_eq!(ext[(2, 1)], 0.0);
    }

    #[test]
    fn test_gnn_beats_greedy() {
        // Greedy takes (0,0)=1 then is forced into (1,1)=8; optimal is 2 + 2
        let costs = matrix(2, 2, &[1.0, 2.0, 2.0, 8.0]);
        let gnn = GlobalNearestNeighbor.associate(&costs, 9.21).unwrap();
        let greedy = GreedyNearestNeighbor.associate(&costs, 9.21).unwrap();
        assert!((gnn.total_cost() - 4.0).abs() < 1e-12);
        assert!((greedy.total_cost() - 9.0).abs() < 1e-12);
    }

    #[test]
    fn test_unassigned_when_cheaper() {
        // Pairing costs 8 > 2 · (gate / 2) = 5, so both stay unassigned
        let costs = matrix(1, 1, &[8.0]);
        let result = GlobalNearestNeighbor.associate(&costs, 5.0).unwrap();
        assert!(result.matches.is_empty());
        assert_eq!(result.unmatched_tracks, vec![0]);
        assert_eq!(result.unmatched_detections, vec![0]);
    }

    #[test]
    fn test_rectangular_and_gated() {
        let costs = matrix(3, 2, &[INF, 1.0, 2.0, INF, INF, INF]);
        let result = GlobalNearestNeighbor.associate(&costs, 9.21).unwrap();
        assert_eq!(result.detection_for(0), Some(1));
        assert_eq!(result.detection_for(1), Some(0));
        assert_eq!(result.unmatched_tracks, vec![2]);
        assert!(result.unmatched_detections.is_empty());
    }

    #[test]
    fn test_empty() {
        let costs = matrix(0, 3, &[]);
        let result = GlobalNearestNeighbor.associate(&costs, 9.21).unwrap();
        assert_eq!(result.unmatched_detections, vec![0, 1, 2]);
    }

    #[test]
    fn test_malformed_cost_aborts() {
        let costs = matrix(1, 2, &[1.0, f64::NAN]);
        assert!(matches!(
            GlobalNearestNeighbor.associate(&costs, 9.21),
            Err(AssociationError::MalformedCost { row: 0, col: 1, .. })
        ));
    }

    #[test]
    fn test_shape_mismatch() {
        let mut costs = matrix(2, 2, &[1.0, 2.0, 3.0, 4.0]);
        costs.track_ids.pop();
        assert!(matches!(
            GreedyNearestNeighbor.associate(&costs, 9.21),
            Err(AssociationError::ShapeMismatch { .. })
        ));
    }
}
