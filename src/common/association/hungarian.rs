//! Hungarian algorithm for optimal assignment
//!
//! Shortest-augmenting-path formulation (Jonker-Volgenant family) of the
//! Hungarian method. Finds the minimum-cost assignment in a rectangular cost
//! matrix where every row (or every column, whichever side is smaller) must be
//! assigned. `f64::INFINITY` marks a forbidden pair.
//!
//! Column scans run in ascending index order; among equally short paths a
//! free column is preferred, then the lowest index. Identical inputs always
//! produce identical assignments.

use nalgebra::DMatrix;

use crate::errors::AssociationError;

/// Hungarian algorithm result
#[derive(Debug, Clone, PartialEq)]
pub struct HungarianResult {
    /// `row_to_col[i]` is the column assigned to row `i` (if any)
    pub row_to_col: Vec<Option<usize>>,
    /// `col_to_row[j]` is the row assigned to column `j` (if any)
    pub col_to_row: Vec<Option<usize>>,
    /// Total cost of the assignment
    pub cost: f64,
    /// Row potentials `u` with `u[i] + v[j] <= cost[(i, j)]`
    pub row_duals: Vec<f64>,
    /// Column potentials `v`, equality holds on assigned pairs
    pub col_duals: Vec<f64>,
}

impl HungarianResult {
    fn empty(rows: usize, cols: usize) -> Self {
        Self {
            row_to_col: vec![None; rows],
            col_to_row: vec![None; cols],
            cost: 0.0,
            row_duals: vec![0.0; rows],
            col_duals: vec![0.0; cols],
        }
    }

    /// Assigned (row, col) pairs in ascending row order
    pub fn pairs(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.row_to_col
            .iter()
            .enumerate()
            .filter_map(|(i, c)| c.map(|j| (i, j)))
    }
}

/// Validate a cost matrix: NaN and negative infinity are rejected.
pub fn validate_costs(cost: &DMatrix<f64>) -> Result<(), AssociationError> {
    for i in 0..cost.nrows() {
        for j in 0..cost.ncols() {
            let value = cost[(i, j)];
            if value.is_nan() || value == f64::NEG_INFINITY {
                return Err(AssociationError::MalformedCost {
                    row: i,
                    col: j,
                    value,
                });
            }
        }
    }
    Ok(())
}

/// Minimum-cost assignment.
///
/// # Arguments
/// * `cost` - Cost matrix (rows × cols). `f64::INFINITY` for impossible pairs.
///
/// # Returns
/// The assignment, or [`AssociationError::Infeasible`] when the smaller side
/// cannot be fully assigned without using a forbidden pair.
pub fn hungarian(cost: &DMatrix<f64>) -> Result<HungarianResult, AssociationError> {
    validate_costs(cost)?;

    let (rows, cols) = cost.shape();
    if rows == 0 || cols == 0 {
        return Ok(HungarianResult::empty(rows, cols));
    }

    // Solver requires rows <= cols
    let transposed = rows > cols;
    let work = if transposed {
        cost.transpose()
    } else {
        cost.clone()
    };

    let (col4row, u, v) = solve(&work)?;

    let mut result = HungarianResult::empty(rows, cols);
    if transposed {
        result.row_duals = v;
        result.col_duals = u;
    } else {
        result.row_duals = u;
        result.col_duals = v;
    }
    for (r, &c) in col4row.iter().enumerate() {
        let (i, j) = if transposed { (c, r) } else { (r, c) };
        result.row_to_col[i] = Some(j);
        result.col_to_row[j] = Some(i);
        result.cost += cost[(i, j)];
    }

    Ok(result)
}

/// Dual variables and search state for one solve
struct Workspace {
    u: Vec<f64>,
    v: Vec<f64>,
    shortest: Vec<f64>,
    path: Vec<usize>,
    col4row: Vec<Option<usize>>,
    row4col: Vec<Option<usize>>,
    visited_rows: Vec<bool>,
    visited_cols: Vec<bool>,
    remaining: Vec<usize>,
}

impl Workspace {
    fn new(rows: usize, cols: usize) -> Self {
        Self {
            u: vec![0.0; rows],
            v: vec![0.0; cols],
            shortest: vec![f64::INFINITY; cols],
            path: vec![usize::MAX; cols],
            col4row: vec![None; rows],
            row4col: vec![None; cols],
            visited_rows: vec![false; rows],
            visited_cols: vec![false; cols],
            remaining: Vec::with_capacity(cols),
        }
    }
}

/// Assign every row of a rows <= cols matrix, returning the final duals
fn solve(cost: &DMatrix<f64>) -> Result<(Vec<usize>, Vec<f64>, Vec<f64>), AssociationError> {
    let (rows, cols) = cost.shape();
    let mut ws = Workspace::new(rows, cols);

    for cur_row in 0..rows {
        let (sink, min_val) = augmenting_path(cost, &mut ws, cur_row)?;

        // Update dual variables
        ws.u[cur_row] += min_val;
        for i in 0..rows {
            if ws.visited_rows[i] && i != cur_row {
                if let Some(j) = ws.col4row[i] {
                    ws.u[i] += min_val - ws.shortest[j];
                }
            }
        }
        for j in 0..cols {
            if ws.visited_cols[j] {
                ws.v[j] -= min_val - ws.shortest[j];
            }
        }

        // Augment along the alternating path back to cur_row
        let mut j = sink;
        loop {
            let i = ws.path[j];
            ws.row4col[j] = Some(i);
            let previous = ws.col4row[i].replace(j);
            if i == cur_row {
                break;
            }
            j = previous.ok_or(AssociationError::Infeasible)?;
        }
    }

    let col4row = ws
        .col4row
        .into_iter()
        .map(|c| c.ok_or(AssociationError::Infeasible))
        .collect::<Result<Vec<_>, _>>()?;
    Ok((col4row, ws.u, ws.v))
}

/// Dijkstra-like search for the shortest augmenting path from `cur_row`
fn augmenting_path(
    cost: &DMatrix<f64>,
    ws: &mut Workspace,
    cur_row: usize,
) -> Result<(usize, f64), AssociationError> {
    let cols = cost.ncols();
    let mut min_val = 0.0;

    ws.remaining.clear();
    ws.remaining.extend(0..cols);
    ws.visited_rows.fill(false);
    ws.visited_cols.fill(false);
    ws.shortest.fill(f64::INFINITY);

    let mut i = cur_row;
    loop {
        ws.visited_rows[i] = true;

        let mut lowest = f64::INFINITY;
        let mut index = None;
        for (it, &j) in ws.remaining.iter().enumerate() {
            let reduced = min_val + cost[(i, j)] - ws.u[i] - ws.v[j];
            if reduced < ws.shortest[j] {
                ws.path[j] = i;
                ws.shortest[j] = reduced;
            }
            let free = ws.row4col[j].is_none();
            let better = ws.shortest[j] < lowest
                || (ws.shortest[j] == lowest && free && index.is_some_and(|k: usize| {
                    ws.row4col[ws.remaining[k]].is_some()
                }));
            if better {
                lowest = ws.shortest[j];
                index = Some(it);
            }
        }

        min_val = lowest;
        let index = match index {
            Some(index) if min_val.is_finite() => index,
            _ => return Err(AssociationError::Infeasible),
        };

        // Order-preserving removal keeps the ascending scan stable
        let j = ws.remaining.remove(index);
        ws.visited_cols[j] = true;

        match ws.row4col[j] {
            None => return Ok((j, min_val)),
            Some(next) => i = next,
        }
    }
}
