//! Minimum-cost bipartite assignment over float costs, solved with
//! `kuhn_munkres_min` on a padded square integer matrix.
//!
//! Costs are scaled to integers and multiplied by a factor larger than any
//! possible sum of index distances; the distance `|row - col|` is then added
//! so that equal-cost assignments resolve toward the original order.

use pathfinding::kuhn_munkres::{Weights, kuhn_munkres_min};

const COST_SCALE: f64 = 1_000_000.0;

#[derive(Debug, Clone, PartialEq)]
pub struct CostMatrix {
    rows: usize,
    cols: usize,
    cells: Vec<f64>,
}

impl CostMatrix {
    pub fn from_fn(rows: usize, cols: usize, mut cost: impl FnMut(usize, usize) -> f64) -> Self {
        let mut cells = Vec::<f64>::with_capacity(rows * cols);
        for row in 0..rows {
            for col in 0..cols {
                cells.push(cost(row, col));
            }
        }
        Self { rows, cols, cells }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.cells[row * self.cols + col]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub pairs: Vec<(usize, usize)>,
    pub total_cost: f64,
}

impl Assignment {
    pub fn col_for_row(&self, row: usize) -> Option<usize> {
        self.pairs
            .iter()
            .find(|(assigned_row, _)| *assigned_row == row)
            .map(|(_, col)| *col)
    }
}

struct PaddedCosts {
    cells: Vec<i64>,
    size: usize,
}

impl PaddedCosts {
    fn new(costs: &CostMatrix, pad_cost: f64) -> Self {
        let size = costs.rows.max(costs.cols);
        let order_factor = (size * size + 1) as i64;
        let mut cells = Vec::<i64>::with_capacity(size * size);
        for row in 0..size {
            for col in 0..size {
                let cost = if row < costs.rows && col < costs.cols {
                    let value = costs.get(row, col);
                    if value.is_finite() { value } else { pad_cost }
                } else {
                    pad_cost
                };
                let scaled = (cost * COST_SCALE).round() as i64;
                cells.push(
                    scaled
                        .saturating_mul(order_factor)
                        .saturating_add(row.abs_diff(col) as i64),
                );
            }
        }
        Self { cells, size }
    }
}

impl Weights<i64> for PaddedCosts {
    fn rows(&self) -> usize {
        self.size
    }

    fn columns(&self) -> usize {
        self.size
    }

    fn at(&self, row: usize, col: usize) -> i64 {
        self.cells[row * self.size + col]
    }

    fn neg(&self) -> Self {
        Self {
            cells: self.cells.iter().map(|value| -value).collect(),
            size: self.size,
        }
    }
}

/// Solves the assignment for `costs`, padding with `pad_cost` cells.
/// Non-finite costs are treated as `pad_cost`.
pub fn solve(costs: &CostMatrix, pad_cost: f64) -> Assignment {
    if costs.rows == 0 || costs.cols == 0 {
        return Assignment {
            pairs: Vec::new(),
            total_cost: 0.0,
        };
    }

    let padded = PaddedCosts::new(costs, pad_cost);
    let (_, col_of_row) = kuhn_munkres_min(&padded);

    let pairs = col_of_row
        .into_iter()
        .enumerate()
        .filter(|(row, col)| *row < costs.rows && *col < costs.cols)
        .collect::<Vec<(usize, usize)>>();
    let total_cost = pairs.iter().map(|(row, col)| costs.get(*row, *col)).sum();

    Assignment { pairs, total_cost }
}
