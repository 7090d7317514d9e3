//! Dense row-major `f64` matrix used for combination arrays and result tables.

use serde::{Deserialize, Serialize};

use crate::error::ShapeError;

/// Two-dimensional array with a flat row-major backing store.
///
/// Row `i` occupies `data[i * cols..(i + 1) * cols]`, which keeps the layout
/// contiguous for broadcasts and gathers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Matrix {
    data: Vec<f64>,
    rows: usize,
    cols: usize,
}

/// The global case table: one row per case, one column per sweep parameter
pub type CombinationArray = Matrix;

impl Matrix {
    /// Create a matrix filled with `value`
    pub fn filled(rows: usize, cols: usize, value: f64) -> Self {
        Self {
            data: vec![value; rows * cols],
            rows,
            cols,
        }
    }

    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self::filled(rows, cols, 0.0)
    }

    /// Create a matrix from row-major data
    pub fn from_data(rows: usize, cols: usize, data: Vec<f64>) -> Result<Self, ShapeError> {
        let expected = rows.checked_mul(cols).ok_or(ShapeError::CountOverflow)?;
        if data.len() != expected {
            return Err(ShapeError::BufferMismatch {
                context: "matrix data",
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { data, rows, cols })
    }

    /// Create a matrix from a list of equally sized rows
    pub fn from_rows(rows: &[Vec<f64>], cols: usize) -> Result<Self, ShapeError> {
        let mut data = Vec::with_capacity(rows.len() * cols);
        for (i, row) in rows.iter().enumerate() {
            if row.len() != cols {
                return Err(ShapeError::RaggedRow {
                    row: i,
                    expected: cols,
                    actual: row.len(),
                });
            }
            data.extend_from_slice(row);
        }
        Ok(Self {
            data,
            rows: rows.len(),
            cols,
        })
    }

    /// Stack column vectors side by side. All columns must have `rows` entries.
    pub fn from_columns(columns: &[Vec<f64>], rows: usize) -> Result<Self, ShapeError> {
        let cols = columns.len();
        let mut matrix = Self::zeros(rows, cols);
        for (j, column) in columns.iter().enumerate() {
            if column.len() != rows {
                return Err(ShapeError::BufferMismatch {
                    context: "column stack",
                    expected: rows,
                    actual: column.len(),
                });
            }
            for (i, &v) in column.iter().enumerate() {
                matrix.data[i * cols + j] = v;
            }
        }
        Ok(matrix)
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    pub fn row(&self, i: usize) -> &[f64] {
        &self.data[i * self.cols..(i + 1) * self.cols]
    }

    pub fn row_mut(&mut self, i: usize) -> &mut [f64] {
        &mut self.data[i * self.cols..(i + 1) * self.cols]
    }

    pub fn get(&self, i: usize, j: usize) -> Option<f64> {
        if i < self.rows && j < self.cols {
            Some(self.data[i * self.cols + j])
        } else {
            None
        }
    }

    pub fn set(&mut self, i: usize, j: usize, value: f64) {
        self.data[i * self.cols + j] = value;
    }

    /// Copy of column `j`
    pub fn column(&self, j: usize) -> Vec<f64> {
        (0..self.rows).map(|i| self.data[i * self.cols + j]).collect()
    }

    pub fn iter_rows(&self) -> impl Iterator<Item = &[f64]> {
        // chunks_exact panics on zero; a zero-width matrix has no row data
        let width = self.cols.max(1);
        self.data
            .chunks_exact(width)
            .take(if self.cols == 0 { 0 } else { self.rows })
    }

    /// Underlying row-major data
    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f64] {
        &mut self.data
    }

    pub fn into_data(self) -> Vec<f64> {
        self.data
    }

    /// Copy of the rows in `range`
    pub fn slice_rows(&self, range: std::ops::Range<usize>) -> Matrix {
        let start = range.start * self.cols;
        let end = range.end * self.cols;
        Matrix {
            data: self.data[start..end].to_vec(),
            rows: range.end - range.start,
            cols: self.cols,
        }
    }

    /// Sort rows ascending by the values in column `j` (NaN sorts last)
    pub fn sort_rows_by_column(&mut self, j: usize) {
        if self.rows < 2 || j >= self.cols {
            return;
        }
        let mut order: Vec<usize> = (0..self.rows).collect();
        order.sort_by(|&a, &b| {
            let (va, vb) = (self.data[a * self.cols + j], self.data[b * self.cols + j]);
            va.partial_cmp(&vb).unwrap_or_else(|| va.is_nan().cmp(&vb.is_nan()))
        });
        let mut sorted = Vec::with_capacity(self.data.len());
        for i in order {
            sorted.extend_from_slice(self.row(i));
        }
        self.data = sorted;
    }

    /// Horizontal concatenation `[self | other]`
    pub fn hstack(&self, other: &Matrix) -> Result<Matrix, ShapeError> {
        if self.rows != other.rows {
            return Err(ShapeError::BufferMismatch {
                context: "hstack",
                expected: self.rows,
                actual: other.rows,
            });
        }
        let cols = self.cols + other.cols;
        let mut data = Vec::with_capacity(self.rows * cols);
        for i in 0..self.rows {
            data.extend_from_slice(self.row(i));
            data.extend_from_slice(other.row(i));
        }
        Ok(Matrix {
            data,
            rows: self.rows,
            cols,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_columns_is_row_major() {
        let m = Matrix::from_columns(&[vec![1.0, 2.0], vec![3.0, 4.0]], 2).unwrap();
        assert_eq!(m.data(), &[1.0, 3.0, 2.0, 4.0]);
        assert_eq!(m.row(1), &[2.0, 4.0]);
        assert_eq!(m.column(1), vec![3.0, 4.0]);
    }

    #[test]
    fn test_from_data_rejects_wrong_length() {
        assert!(Matrix::from_data(2, 2, vec![1.0; 3]).is_err());
    }

    #[test]
    fn test_from_rows_rejects_ragged() {
        let err = Matrix::from_rows(&[vec![1.0, 2.0], vec![3.0]], 2).unwrap_err();
        assert_eq!(
            err,
            ShapeError::RaggedRow {
                row: 1,
                expected: 2,
                actual: 1
            }
        );
    }

    #[test]
    fn test_sort_rows_by_first_column() {
        let mut m = Matrix::from_rows(&[vec![3.0, 30.0], vec![1.0, 10.0], vec![2.0, 20.0]], 2)
            .unwrap();
        m.sort_rows_by_column(0);
        assert_eq!(m.column(0), vec![1.0, 2.0, 3.0]);
        assert_eq!(m.column(1), vec![10.0, 20.0, 30.0]);
    }

    #[test]
    fn test_hstack_and_slice() {
        let a = Matrix::from_rows(&[vec![1.0], vec![2.0], vec![3.0]], 1).unwrap();
        let b = Matrix::from_rows(&[vec![10.0], vec![20.0], vec![30.0]], 1).unwrap();
        let c = a.hstack(&b).unwrap();
        assert_eq!(c.cols(), 2);
        assert_eq!(c.row(2), &[3.0, 30.0]);

        let s = c.slice_rows(1..3);
        assert_eq!(s.rows(), 2);
        assert_eq!(s.row(0), &[2.0, 20.0]);
    }

    #[test]
    fn test_iter_rows_zero_width() {
        let m = Matrix::zeros(3, 0);
        assert_eq!(m.iter_rows().count(), 0);
        let m = Matrix::zeros(3, 2);
        assert_eq!(m.iter_rows().count(), 3);
    }
}
