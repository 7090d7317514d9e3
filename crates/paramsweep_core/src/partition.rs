//! Balanced contiguous split of the combination array across workers.

use std::ops::Range;

use crate::error::ShapeError;
use crate::matrix::{CombinationArray, Matrix};

/// Row range owned by `rank` when `rows` rows are split over `size` workers.
///
/// The first `rows % size` ranks get one extra row. Concatenating the ranges
/// for ranks `0..size` yields `0..rows`.
pub fn chunk_range(rank: usize, rows: usize, size: usize) -> Result<Range<usize>, ShapeError> {
    if rank >= size {
        return Err(ShapeError::RankOutOfRange { rank, size });
    }
    let base = rows / size;
    let extra = rows % size;
    let start = rank * base + rank.min(extra);
    let len = base + usize::from(rank < extra);
    Ok(start..start + len)
}

/// One worker's share of the combination array
#[derive(Debug, Clone, PartialEq)]
pub struct LocalChunk {
    /// Global row indices covered by `values`
    pub range: Range<usize>,
    pub values: Matrix,
}

impl LocalChunk {
    pub fn len(&self) -> usize {
        self.values.rows()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Copy out the rows `rank` owns
pub fn local_chunk(
    combos: &CombinationArray,
    rank: usize,
    size: usize,
) -> Result<LocalChunk, ShapeError> {
    let range = chunk_range(rank, combos.rows(), size)?;
    Ok(LocalChunk {
        values: combos.slice_rows(range.clone()),
        range,
    })
}
