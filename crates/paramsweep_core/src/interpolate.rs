//! Filling failed cases from their successful neighbours
//!
//! A case is valid when its first output is finite. Every output column of
//! every invalid case is replaced by a linear estimate over the valid cases'
//! input points. Cases outside the convex hull of the valid points stay NaN.

#[cfg(feature = "parallel")]
use rayon::prelude::*;
use tracing::info;

use crate::error::{Result, ShapeError};
use crate::matrix::Matrix;

/// Scattered-data interpolation kernel.
///
/// `points` holds one valid sample per row, already rescaled. Returns one
/// estimate per row of `queries`, NaN where the kernel cannot interpolate.
pub trait ScatteredInterpolator: Send + Sync {
    fn interpolate(&self, points: &Matrix, values: &[f64], queries: &Matrix) -> Vec<f64>;
}

/// Piecewise linear interpolation over the Delaunay simplices of the samples.
///
/// In one dimension this brackets the query with its nearest neighbours on
/// each side. In higher dimensions the enclosing simplex is found by lifting
/// every sample onto the paraboloid `z = |p - q|^2` and taking the lowest
/// convex combination of lifted samples that reproduces the query. The
/// optimal basis of that linear program is the Delaunay simplex containing
/// `q`; when the program is infeasible the query is outside the hull.
/// Where several simplices tie (cocircular samples on a regular grid) any of
/// them may be used, so non-linear outputs can differ slightly from another
/// triangulation of the same points.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearSimplexInterpolator;

const FEASIBILITY_TOL: f64 = 1e-9;
const PIVOT_TOL: f64 = 1e-12;

impl ScatteredInterpolator for LinearSimplexInterpolator {
    fn interpolate(&self, points: &Matrix, values: &[f64], queries: &Matrix) -> Vec<f64> {
        if points.is_empty() {
            return vec![f64::NAN; queries.rows()];
        }
        match points.cols() {
            0 => vec![values[0]; queries.rows()],
            1 => {
                let mut samples: Vec<(f64, f64)> =
                    points.data().iter().copied().zip(values.iter().copied()).collect();
                samples.sort_by(|a, b| a.0.total_cmp(&b.0));
                queries.data().iter().map(|&q| interpolate_1d(&samples, q)).collect()
            }
            _ => queries
                .iter_rows()
                .map(|q| match enclosing_simplex(points, q) {
                    Some(weights) => weights.iter().map(|&(i, w)| w * values[i]).sum(),
                    None => f64::NAN,
                })
                .collect(),
        }
    }
}

fn interpolate_1d(samples: &[(f64, f64)], q: f64) -> f64 {
    let upper = samples.partition_point(|&(x, _)| x < q);
    if let Some(&(x, v)) = samples.get(upper) {
        if x == q {
            return v;
        }
    }
    if upper == 0 || upper == samples.len() {
        return f64::NAN;
    }
    let (x0, v0) = samples[upper - 1];
    let (x1, v1) = samples[upper];
    let t = (q - x0) / (x1 - x0);
    v0 + t * (v1 - v0)
}

fn distance_sq(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Dense simplex tableau for `min c.x` subject to `A x = b`, `x >= 0`.
///
/// Column `cols` of each row holds the right-hand side. Pivoting follows
/// Bland's rule, which cannot cycle on the degenerate programs regular grids
/// produce.
struct Tableau {
    rows: usize,
    cols: usize,
    cells: Vec<f64>,
    basis: Vec<usize>,
}

impl Tableau {
    fn at(&self, r: usize, c: usize) -> f64 {
        self.cells[r * (self.cols + 1) + c]
    }

    fn rhs(&self, r: usize) -> f64 {
        self.at(r, self.cols)
    }

    fn pivot(&mut self, r: usize, c: usize) {
        let width = self.cols + 1;
        let p = self.at(r, c);
        for j in 0..width {
            self.cells[r * width + j] /= p;
        }
        for other in 0..self.rows {
            if other == r {
                continue;
            }
            let factor = self.at(other, c);
            if factor == 0.0 {
                continue;
            }
            for j in 0..width {
                self.cells[other * width + j] -= factor * self.cells[r * width + j];
            }
        }
        self.basis[r] = c;
    }

    /// Minimize `cost` letting only columns below `enterable` join the basis.
    /// `None` if the program is unbounded or fails to converge.
    fn minimize(&mut self, cost: &[f64], enterable: usize) -> Option<()> {
        let max_iterations = 50 * (self.cols + self.rows);
        for _ in 0..max_iterations {
            let entering = (0..enterable).find(|&c| {
                let reduced = cost[c]
                    - (0..self.rows)
                        .map(|r| cost[self.basis[r]] * self.at(r, c))
                        .sum::<f64>();
                reduced < -FEASIBILITY_TOL && !self.basis.contains(&c)
            });
            let Some(c) = entering else {
                return Some(());
            };

            let mut leaving: Option<(f64, usize)> = None;
            for r in 0..self.rows {
                let a = self.at(r, c);
                if a <= PIVOT_TOL {
                    continue;
                }
                let ratio = self.rhs(r).max(0.0) / a;
                let better = match leaving {
                    None => true,
                    Some((best, br)) => {
                        ratio < best - PIVOT_TOL
                            || (ratio <= best + PIVOT_TOL && self.basis[r] < self.basis[br])
                    }
                };
                if better {
                    leaving = Some((ratio, r));
                }
            }
            let (_, r) = leaving?;
            self.pivot(r, c);
        }
        None
    }
}

/// Vertices and barycentric weights of the Delaunay simplex containing `q`,
/// or `None` when `q` lies outside the convex hull of `points`.
fn enclosing_simplex(points: &Matrix, q: &[f64]) -> Option<Vec<(usize, f64)>> {
    let n = points.rows();
    let d = q.len();
    let rows = d + 1;
    let cols = n + rows;

    // sum_i w_i p_i = q and sum_i w_i = 1, one artificial column per row
    let mut cells = vec![0.0; rows * (cols + 1)];
    for r in 0..rows {
        let target = if r < d { q[r] } else { 1.0 };
        let sign = if target < 0.0 { -1.0 } else { 1.0 };
        let row = &mut cells[r * (cols + 1)..(r + 1) * (cols + 1)];
        for (i, cell) in row[..n].iter_mut().enumerate() {
            *cell = sign * if r < d { points.row(i)[r] } else { 1.0 };
        }
        row[n + r] = 1.0;
        row[cols] = sign * target;
    }
    let mut tableau = Tableau {
        rows,
        cols,
        cells,
        basis: (n..cols).collect(),
    };

    let mut cost = vec![0.0; cols];
    cost[n..].fill(1.0);
    tableau.minimize(&cost, cols)?;
    let infeasibility: f64 = (0..rows)
        .filter(|&r| tableau.basis[r] >= n)
        .map(|r| tableau.rhs(r))
        .sum();
    if infeasibility > FEASIBILITY_TOL {
        return None;
    }

    // Drive remaining artificials out; rows with no sample entry are redundant
    for r in 0..rows {
        if tableau.basis[r] >= n {
            if let Some(c) = (0..n).find(|&c| tableau.at(r, c).abs() > PIVOT_TOL) {
                tableau.pivot(r, c);
            }
        }
    }

    for (i, c) in cost[..n].iter_mut().enumerate() {
        *c = distance_sq(points.row(i), q);
    }
    cost[n..].fill(0.0);
    tableau.minimize(&cost, n)?;

    Some(
        (0..rows)
            .filter(|&r| tableau.basis[r] < n)
            .map(|r| (tableau.basis[r], tableau.rhs(r).max(0.0)))
            .collect(),
    )
}

/// Per-dimension affine map onto `[0, 1]` fitted to the valid points
struct Rescaling {
    lower: Vec<f64>,
    span: Vec<f64>,
}

impl Rescaling {
    fn fit(points: &Matrix) -> Self {
        let dims = points.cols();
        let mut lower = vec![f64::INFINITY; dims];
        let mut upper = vec![f64::NEG_INFINITY; dims];
        for row in points.iter_rows() {
            for (j, &x) in row.iter().enumerate() {
                lower[j] = lower[j].min(x);
                upper[j] = upper[j].max(x);
            }
        }
        let span = lower.iter().zip(&upper).map(|(l, u)| u - l).collect();
        Self { lower, span }
    }

    /// Scale a row, dropping constant dimensions. `None` if the row leaves a
    /// constant dimension, which puts it outside the hull.
    fn apply(&self, row: &[f64]) -> Option<Vec<f64>> {
        let mut scaled = Vec::with_capacity(row.len());
        for ((&x, &lower), &span) in row.iter().zip(&self.lower).zip(&self.span) {
            if span > 0.0 {
                scaled.push((x - lower) / span);
            } else if x != lower {
                return None;
            }
        }
        Some(scaled)
    }
}

/// Replace outputs of invalid cases with interpolated estimates.
///
/// `inputs` and `results` are the global combination array and results
/// matrix. Rows whose first output is finite are returned unchanged.
pub fn interp_nan_values(
    inputs: &Matrix,
    results: &Matrix,
    interpolator: &dyn ScatteredInterpolator,
) -> Result<Matrix> {
    if inputs.rows() != results.rows() {
        return Err(ShapeError::BufferMismatch {
            context: "interpolation rows",
            expected: inputs.rows(),
            actual: results.rows(),
        }
        .into());
    }
    let mut clean = results.clone();
    if results.cols() == 0 {
        return Ok(clean);
    }

    let (valid, invalid): (Vec<usize>, Vec<usize>) =
        (0..results.rows()).partition(|&i| results.row(i)[0].is_finite());
    if valid.is_empty() || invalid.is_empty() {
        return Ok(clean);
    }

    let raw_points: Vec<Vec<f64>> = valid.iter().map(|&i| inputs.row(i).to_vec()).collect();
    let rescaling = Rescaling::fit(&Matrix::from_rows(&raw_points, inputs.cols())?);
    let scaled_points: Vec<Vec<f64>> = raw_points
        .iter()
        .filter_map(|row| rescaling.apply(row))
        .collect();
    let dims = scaled_points.first().map_or(0, Vec::len);
    let points = Matrix::from_rows(&scaled_points, dims)?;

    // Queries that leave a constant dimension cannot be estimated
    let scaled_queries: Vec<Option<Vec<f64>>> =
        invalid.iter().map(|&i| rescaling.apply(inputs.row(i))).collect();
    let reachable: Vec<usize> = (0..invalid.len())
        .filter(|&q| scaled_queries[q].is_some())
        .collect();
    let query_rows: Vec<Vec<f64>> = scaled_queries.into_iter().flatten().collect();
    let queries = Matrix::from_rows(&query_rows, dims)?;

    let estimate_column = |j: usize| {
        let values: Vec<f64> = valid.iter().map(|&i| results.row(i)[j]).collect();
        interpolator.interpolate(&points, &values, &queries)
    };

    #[cfg(feature = "parallel")]
    let columns: Vec<Vec<f64>> = (0..results.cols())
        .into_par_iter()
        .map(estimate_column)
        .collect();

    #[cfg(not(feature = "parallel"))]
    let columns: Vec<Vec<f64>> = (0..results.cols()).map(estimate_column).collect();

    for (j, column) in columns.iter().enumerate() {
        for (&q, &estimate) in reachable.iter().zip(column) {
            clean.set(invalid[q], j, estimate);
        }
    }

    let filled = (0..invalid.len())
        .filter(|&q| clean.row(invalid[q])[0].is_finite())
        .count();
    info!(invalid = invalid.len(), filled, "interpolated failed cases");
    Ok(clean)
}
