//! Merging per-worker results into global state
//!
//! Rows from each worker are placed at the offset given by the cumulative
//! local counts in rank order, which matches the partitioner's block
//! assignment. Both functions must be called by every worker of the group.

use tracing::info;

use crate::comm::{Communicator, coordinator_outcome};
use crate::error::{Result, ShapeError};
use crate::matrix::Matrix;
use crate::skeleton::OutputSkeleton;
use crate::status::{decode_statuses, encode_statuses};

fn element_counts(row_counts: &[usize], cols: usize) -> std::result::Result<Vec<usize>, ShapeError> {
    row_counts
        .iter()
        .map(|&rows| rows.checked_mul(cols).ok_or(ShapeError::CountOverflow))
        .collect()
}

/// Assemble the global results matrix and hand a copy to every worker.
///
/// `total_rows` is the size of the combination array; the gathered row
/// counts must add up to it.
pub fn aggregate_results(
    local: &Matrix,
    total_rows: usize,
    comm: &dyn Communicator,
) -> Result<Matrix> {
    let cols = local.cols();
    let row_counts = comm.all_gather_count(local.rows())?;
    let gathered_rows: usize = row_counts.iter().sum();
    if gathered_rows != total_rows {
        return Err(ShapeError::BufferMismatch {
            context: "aggregated result rows",
            expected: total_rows,
            actual: gathered_rows,
        }
        .into());
    }

    let counts = element_counts(&row_counts, cols)?;
    let gathered = comm.gather_varcount_f64(local.data(), &counts, 0);
    let gathered = coordinator_outcome(comm, gathered)?;

    let len = total_rows.checked_mul(cols).ok_or(ShapeError::CountOverflow)?;
    let mut buf = gathered.unwrap_or_else(|| vec![0.0; len]);
    comm.broadcast_f64(&mut buf, 0)?;

    if comm.is_coordinator() {
        info!(rows = total_rows, outputs = cols, workers = comm.size(), "aggregated results");
    }
    Ok(Matrix::from_data(total_rows, cols, buf)?)
}

/// Merge every worker's skeleton on the coordinator.
///
/// Value arrays are gathered leaf by leaf, statuses travel as integer codes.
/// The coordinator returns the global skeleton truncated to `total_cases`;
/// other workers get their local skeleton back.
pub fn aggregate_skeleton(
    local: OutputSkeleton,
    total_cases: usize,
    comm: &dyn Communicator,
) -> Result<OutputSkeleton> {
    let counts = comm.all_gather_count(local.len())?;
    let is_root = comm.is_coordinator();

    // Run every collective before looking at any error; a worker that bails
    // out early would leave the rest waiting at the next gather.
    let gathered_leaves: Vec<Result<Option<Vec<f64>>>> = local
        .leaves()
        .map(|(_, record)| comm.gather_varcount_f64(&record.value, &counts, 0))
        .collect();
    let codes = encode_statuses(&local.solve_status);
    let gathered = comm.gather_varcount_i64(&codes, &counts, 0);

    let gathered_leaves = gathered_leaves.into_iter().collect::<Result<Vec<_>>>()?;
    let gathered = gathered?;

    match gathered {
        Some(mut codes) if is_root => {
            let mut global = local;
            // Every worker sees the same leaves in the same order
            for ((_, target), values) in global.leaves_mut().zip(gathered_leaves) {
                if let Some(mut values) = values {
                    values.truncate(total_cases);
                    target.value = values;
                }
            }
            codes.truncate(total_cases);
            global.solve_status = decode_statuses(&codes)?;
            info!(cases = global.len(), "aggregated output skeleton");
            Ok(global)
        }
        _ => Ok(local),
    }
}
